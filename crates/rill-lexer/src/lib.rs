use logos::Logos;
use smol_str::SmolStr;

/// Source span as byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

fn parse_string(lex: &mut logos::Lexer<Token>) -> SmolStr {
    let slice = lex.slice();
    SmolStr::new(&slice[1..slice.len() - 1])
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("@{")]
    AtBrace,
    #[token("->")]
    Arrow,
    #[token("=")]
    Assign,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,

    /// A decimal number with a fractional part. `2.x` is not a float: the
    /// token regex requires a digit after the dot, so a field access lexes
    /// as `Int Dot Ident`.
    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Flt(f64),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    /// Double-quoted, no escapes.
    #[regex(r#""[^"]*""#, parse_string)]
    Str(SmolStr),

    /// `*`, `+` and `?` are ordinary identifier characters; the arithmetic
    /// primitives are plain bindings.
    #[regex(r"[a-zA-Z_*?+][a-zA-Z0-9_*?+/]*", |lex| SmolStr::new(lex.slice()))]
    Ident(SmolStr),
}

/// Tokenize; the second vec holds spans of unrecognized characters.
pub fn lex(source: &str) -> (Vec<(Token, Span)>, Vec<Span>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut lexer = Token::lexer(source);
    while let Some(result) = lexer.next() {
        let span = Span::new(lexer.span().start as u32, lexer.span().end as u32);
        match result {
            Ok(tok) => tokens.push((tok, span)),
            Err(()) => errors.push(span),
        }
    }
    (tokens, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_tokens(src: &str) -> Vec<Token> {
        let (tokens, errors) = lex(src);
        assert!(errors.is_empty(), "lex errors in {:?}: {:?}", src, errors);
        tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_numbers() {
        assert_eq!(lex_tokens("5"), vec![Token::Int(5)]);
        assert_eq!(lex_tokens("1.2"), vec![Token::Flt(1.2)]);
        assert_eq!(lex_tokens("0"), vec![Token::Int(0)]);
    }

    #[test]
    fn test_dot_ambiguity() {
        // 2.3 is a float; 2.x is a field load off the constant 2
        assert_eq!(lex_tokens("2.3"), vec![Token::Flt(2.3)]);
        assert_eq!(
            lex_tokens("2.x"),
            vec![Token::Int(2), Token::Dot, Token::Ident("x".into())]
        );
    }

    #[test]
    fn test_operators_are_idents() {
        assert_eq!(
            lex_tokens("(* + dec)"),
            vec![
                Token::LParen,
                Token::Ident("*".into()),
                Token::Ident("+".into()),
                Token::Ident("dec".into()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_lambda_and_struct() {
        assert_eq!(
            lex_tokens("{ x -> @{ a = 1, } }"),
            vec![
                Token::LBrace,
                Token::Ident("x".into()),
                Token::Arrow,
                Token::AtBrace,
                Token::Ident("a".into()),
                Token::Assign,
                Token::Int(1),
                Token::Comma,
                Token::RBrace,
                Token::RBrace,
            ]
        );
    }

    #[test]
    fn test_strings_and_comments() {
        assert_eq!(
            lex_tokens("\"abc\" // trailing\n\"\""),
            vec![Token::Str("abc".into()), Token::Str("".into())]
        );
    }

    #[test]
    fn test_spans() {
        let (tokens, _) = lex("(f 1)");
        assert_eq!(tokens[0], (Token::LParen, Span::new(0, 1)));
        assert_eq!(tokens[1], (Token::Ident("f".into()), Span::new(1, 2)));
        assert_eq!(tokens[2], (Token::Int(1), Span::new(3, 4)));
        assert_eq!(tokens[3], (Token::RParen, Span::new(4, 5)));
    }
}
