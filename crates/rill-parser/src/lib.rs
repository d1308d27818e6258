use la_arena::Arena;
use rill_ast::{Ast, Expr, ExprId, Prim};
use rill_lexer::{lex, Span, Token};
use smol_str::SmolStr;

#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.span.start, self.span.end, self.message)
    }
}

/// How many arguments a function may take; the engine names them.
pub const MAX_ARGS: usize = 3;

pub fn parse(source: &str) -> (Ast, Vec<ParseError>) {
    let (tokens, lex_errors) = lex(source);
    let mut parser = Parser::new(tokens);
    let mut errors: Vec<ParseError> = lex_errors
        .into_iter()
        .map(|span| ParseError {
            message: "unexpected character".into(),
            span,
        })
        .collect();
    let root = parser.parse_program();
    errors.append(&mut parser.errors);
    let root = root.unwrap_or_else(|| parser.alloc(Expr::Nil, Span::new(0, 0)));
    (
        Ast {
            exprs: parser.exprs,
            root,
            spans: parser.spans,
        },
        errors,
    )
}

struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    exprs: Arena<Expr>,
    spans: Vec<(ExprId, Span)>,
    /// Names bound by enclosing lambdas and lets; a bound name never
    /// resolves to a primitive.
    scopes: Vec<SmolStr>,
    errors: Vec<ParseError>,
}

impl Parser {
    fn new(tokens: Vec<(Token, Span)>) -> Self {
        Self {
            tokens,
            pos: 0,
            exprs: Arena::new(),
            spans: Vec::new(),
            scopes: Vec::new(),
            errors: Vec::new(),
        }
    }

    // ── Token helpers ─────────────────────────────────────────────

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek2(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        self.tokens.get(self.pos).map(|(_, s)| *s).unwrap_or_else(|| {
            self.tokens
                .last()
                .map(|(_, s)| Span::new(s.end, s.end))
                .unwrap_or(Span::new(0, 0))
        })
    }

    fn advance(&mut self) -> (Token, Span) {
        let tok = self.tokens[self.pos].clone();
        self.pos += 1;
        tok
    }

    fn check(&self, expected: &Token) -> bool {
        self.peek() == Some(expected)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Option<Span> {
        if self.check(expected) {
            let (_, span) = self.advance();
            Some(span)
        } else {
            let span = self.peek_span();
            self.error(
                format!("expected {:?}, found {:?}", expected, self.peek()),
                span,
            );
            None
        }
    }

    fn error(&mut self, message: String, span: Span) {
        self.errors.push(ParseError { message, span });
    }

    fn alloc(&mut self, expr: Expr, span: Span) -> ExprId {
        let id = self.exprs.alloc(expr);
        self.spans.push((id, span));
        id
    }

    // ── Grammar ───────────────────────────────────────────────────

    fn parse_program(&mut self) -> Option<ExprId> {
        let root = self.fterm()?;
        if !self.at_end() {
            let span = self.peek_span();
            self.error("junk at end of program".into(), span);
        }
        Some(root)
    }

    /// A term with optional trailing field loads: `e.x.y`.
    fn fterm(&mut self) -> Option<ExprId> {
        let mut e = self.term()?;
        while self.eat(&Token::Dot) {
            let span = self.peek_span();
            let name = self.expect_ident()?;
            e = self.alloc(Expr::Field { name, rec: e }, span);
        }
        Some(e)
    }

    fn term(&mut self) -> Option<ExprId> {
        let span = self.peek_span();
        match self.peek() {
            Some(Token::Int(_)) => {
                let (tok, span) = self.advance();
                let Token::Int(i) = tok else { unreachable!() };
                // The literal 0 is the nil constant.
                Some(self.alloc(if i == 0 { Expr::Nil } else { Expr::Int(i) }, span))
            }
            Some(Token::Flt(_)) => {
                let (tok, span) = self.advance();
                let Token::Flt(f) = tok else { unreachable!() };
                Some(self.alloc(Expr::Flt(f), span))
            }
            Some(Token::Str(_)) => {
                let (tok, span) = self.advance();
                let Token::Str(s) = tok else { unreachable!() };
                Some(self.alloc(Expr::Str(s), span))
            }
            Some(Token::LParen) => self.apply(),
            Some(Token::LBrace) => self.lambda(),
            Some(Token::AtBrace) => self.strukt(),
            Some(Token::Ident(_)) => {
                if self.peek2() == Some(&Token::Assign) {
                    return self.let_expr();
                }
                let (tok, span) = self.advance();
                let Token::Ident(name) = tok else { unreachable!() };
                let expr = match Prim::from_name(&name) {
                    Some(p) if !self.scopes.contains(&name) => Expr::Prim(p),
                    _ => Expr::Ident(name),
                };
                Some(self.alloc(expr, span))
            }
            other => {
                self.error(format!("unexpected {:?}", other), span);
                None
            }
        }
    }

    fn apply(&mut self) -> Option<ExprId> {
        let open = self.expect(&Token::LParen)?;
        let fun = self.fterm()?;
        let mut args = Vec::new();
        while !self.check(&Token::RParen) && !self.at_end() {
            args.push(self.fterm()?);
        }
        self.expect(&Token::RParen)?;
        if args.len() > MAX_ARGS {
            self.error(format!("at most {} arguments", MAX_ARGS), open);
        }

        // A nil-guarding if-test inserts an upcast around the then-arm.
        // This is a syntactic transform only.
        if matches!(self.exprs[fun], Expr::Prim(Prim::If)) && args.len() == 3 {
            if let Expr::Ident(name) = &self.exprs[args[0]] {
                let name = name.clone();
                let id = self.alloc(Expr::Ident(name.clone()), open);
                let notnil = self.alloc(Expr::Prim(Prim::NotNil), open);
                let guard = self.alloc(
                    Expr::Apply {
                        fun: notnil,
                        args: vec![id],
                    },
                    open,
                );
                let then_fn = self.alloc(
                    Expr::Lambda {
                        params: vec![name],
                        body: args[1],
                    },
                    open,
                );
                args[1] = self.alloc(
                    Expr::Apply {
                        fun: then_fn,
                        args: vec![guard],
                    },
                    open,
                );
            }
        }
        Some(self.alloc(Expr::Apply { fun, args }, open))
    }

    fn lambda(&mut self) -> Option<ExprId> {
        let open = self.expect(&Token::LBrace)?;
        let mut params = Vec::new();
        while let Some(Token::Ident(_)) = self.peek() {
            params.push(self.expect_ident()?);
        }
        self.expect(&Token::Arrow)?;
        if params.len() > MAX_ARGS {
            self.error(format!("at most {} parameters", MAX_ARGS), open);
        }
        let depth = self.scopes.len();
        self.scopes.extend(params.iter().cloned());
        let body = self.fterm();
        self.scopes.truncate(depth);
        let body = body?;
        self.expect(&Token::RBrace)?;
        Some(self.alloc(Expr::Lambda { params, body }, open))
    }

    fn let_expr(&mut self) -> Option<ExprId> {
        let span = self.peek_span();
        let name = self.expect_ident()?;
        self.expect(&Token::Assign)?;
        // The definition may refer to the name (recursion), so it is in
        // scope on both sides.
        self.scopes.push(name.clone());
        let def = self.fterm();
        let body = def.and_then(|_| {
            self.expect(&Token::Semi)?;
            self.fterm()
        });
        self.scopes.pop();
        let (def, body) = (def?, body?);
        Some(self.alloc(Expr::Let { name, def, body }, span))
    }

    fn strukt(&mut self) -> Option<ExprId> {
        let open = self.expect(&Token::AtBrace)?;
        let mut flds = Vec::new();
        while !self.check(&Token::RBrace) && !self.at_end() {
            let name = self.expect_ident()?;
            self.expect(&Token::Assign)?;
            let e = self.fterm()?;
            flds.push((name, e));
            self.eat(&Token::Comma);
        }
        self.expect(&Token::RBrace)?;
        Some(self.alloc(Expr::Struct { flds }, open))
    }

    fn expect_ident(&mut self) -> Option<SmolStr> {
        if let Some(Token::Ident(_)) = self.peek() {
            let (tok, _) = self.advance();
            let Token::Ident(s) = tok else { unreachable!() };
            Some(s)
        } else {
            let span = self.peek_span();
            self.error(format!("expected identifier, found {:?}", self.peek()), span);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Ast {
        let (ast, errors) = parse(src);
        assert!(errors.is_empty(), "parse errors in {:?}: {:?}", src, errors);
        ast
    }

    fn roundtrip(src: &str) -> String {
        let ast = parse_ok(src);
        ast.print(ast.root)
    }

    #[test]
    fn constants() {
        assert_eq!(roundtrip("5"), "5");
        assert_eq!(roundtrip("1.2"), "1.2");
        assert_eq!(roundtrip("\"abc\""), "\"abc\"");
        assert_eq!(roundtrip("0"), "0");
    }

    #[test]
    fn lambda_apply() {
        assert_eq!(roundtrip("{ x -> x }"), "{ x -> x }");
        assert_eq!(roundtrip("(pair 3 \"abc\")"), "(pair 3 \"abc\")");
    }

    #[test]
    fn let_and_fields() {
        assert_eq!(roundtrip("x = 5; x.n"), "x = 5; x.n");
        assert_eq!(roundtrip("@{ a = 1, b = 2 }"), "@{ a = 1, b = 2}");
    }

    #[test]
    fn field_of_number_is_not_a_float() {
        let ast = parse_ok("2.x");
        match &ast.exprs[ast.root] {
            Expr::Field { name, .. } => assert_eq!(name, "x"),
            e => panic!("expected field, got {:?}", e),
        }
    }

    #[test]
    fn if_on_ident_synthesizes_guard() {
        // (if p p 0) becomes (if p ({ p -> p } (notnil p)) 0)
        assert_eq!(roundtrip("(if p p 0)"), "(if p ({ p -> p } (notnil p)) 0)");
    }

    #[test]
    fn if_on_non_ident_is_untouched() {
        assert_eq!(roundtrip("(if (eq0 1) 2 3)"), "(if (eq0 1) 2 3)");
    }

    #[test]
    fn primitives_are_shadowable() {
        let ast = parse_ok("pair = { x -> x }; (pair 3)");
        // The use of `pair` in the body refers to the let, not the primitive.
        fn count_prims(ast: &Ast) -> usize {
            ast.exprs
                .iter()
                .filter(|(_, e)| matches!(e, Expr::Prim(_)))
                .count()
        }
        assert_eq!(count_prims(&ast), 0);
    }

    #[test]
    fn junk_at_end_is_an_error() {
        let (_, errors) = parse("5 5");
        assert!(!errors.is_empty());
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(roundtrip("// hi\n5 // bye"), "5");
    }
}
