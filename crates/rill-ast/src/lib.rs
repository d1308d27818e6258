use la_arena::{Arena, Idx};
use smol_str::SmolStr;
use std::fmt;

pub use rill_lexer::Span;

// ── ID types ──────────────────────────────────────────────────────

pub type ExprId = Idx<Expr>;

// ── Program ───────────────────────────────────────────────────────

/// A parsed source file: an expression arena plus the root expression.
#[derive(Debug, Clone)]
pub struct Ast {
    pub exprs: Arena<Expr>,
    pub root: ExprId,
    pub spans: Vec<(ExprId, Span)>,
}

impl Ast {
    pub fn span(&self, id: ExprId) -> Option<Span> {
        self.spans
            .iter()
            .find(|(e, _)| *e == id)
            .map(|(_, s)| *s)
    }
}

// ── Expressions ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Expr {
    /// Integer constant. The literal `0` parses to `Nil` instead.
    Int(i64),
    Flt(f64),
    Str(SmolStr),
    /// The nil constant, written `0`.
    Nil,
    Ident(SmolStr),
    /// A use of a pre-bound primitive; each use site is its own instance.
    Prim(Prim),
    Apply {
        fun: ExprId,
        args: Vec<ExprId>,
    },
    Lambda {
        params: Vec<SmolStr>,
        body: ExprId,
    },
    Let {
        name: SmolStr,
        def: ExprId,
        body: ExprId,
    },
    Struct {
        flds: Vec<(SmolStr, ExprId)>,
    },
    Field {
        name: SmolStr,
        rec: ExprId,
    },
}

/// The pre-bound primitives. `NotNil` has no surface syntax; the parser
/// synthesizes it for nil-guarded `if`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prim {
    If,
    Pair,
    Triple,
    Eq,
    Eq0,
    IsEmpty,
    NotNil,
    Mul,
    Add,
    Dec,
    Str,
    Factor,
}

impl Prim {
    pub fn name(self) -> &'static str {
        match self {
            Prim::If => "if",
            Prim::Pair => "pair",
            Prim::Triple => "triple",
            Prim::Eq => "eq",
            Prim::Eq0 => "eq0",
            Prim::IsEmpty => "isempty",
            Prim::NotNil => "notnil",
            Prim::Mul => "*",
            Prim::Add => "+",
            Prim::Dec => "dec",
            Prim::Str => "str",
            Prim::Factor => "factor",
        }
    }

    /// Lookup for the parser. `NotNil` is internal and not nameable.
    pub fn from_name(name: &str) -> Option<Prim> {
        Some(match name {
            "if" => Prim::If,
            "pair" => Prim::Pair,
            "triple" => Prim::Triple,
            "eq" => Prim::Eq,
            "eq0" => Prim::Eq0,
            "isempty" => Prim::IsEmpty,
            "*" => Prim::Mul,
            "+" => Prim::Add,
            "dec" => Prim::Dec,
            "str" => Prim::Str,
            "factor" => Prim::Factor,
            _ => return None,
        })
    }

    pub fn nargs(self) -> usize {
        match self {
            Prim::If | Prim::Triple => 3,
            Prim::Pair | Prim::Eq | Prim::Mul | Prim::Add => 2,
            _ => 1,
        }
    }
}

// ── Pretty printing ───────────────────────────────────────────────

impl Ast {
    pub fn print(&self, id: ExprId) -> String {
        let mut s = String::new();
        self.print_into(id, &mut s);
        s
    }

    fn print_into(&self, id: ExprId, out: &mut String) {
        use fmt::Write as _;
        match &self.exprs[id] {
            Expr::Int(i) => {
                let _ = write!(out, "{}", i);
            }
            Expr::Flt(f) => {
                let _ = write!(out, "{}", f);
            }
            Expr::Str(s) => {
                let _ = write!(out, "\"{}\"", s);
            }
            Expr::Nil => out.push('0'),
            Expr::Ident(n) => out.push_str(n),
            Expr::Prim(p) => out.push_str(p.name()),
            Expr::Apply { fun, args } => {
                out.push('(');
                self.print_into(*fun, out);
                for a in args {
                    out.push(' ');
                    self.print_into(*a, out);
                }
                out.push(')');
            }
            Expr::Lambda { params, body } => {
                out.push_str("{ ");
                for p in params {
                    out.push_str(p);
                    out.push(' ');
                }
                out.push_str("-> ");
                self.print_into(*body, out);
                out.push_str(" }");
            }
            Expr::Let { name, def, body } => {
                out.push_str(name);
                out.push_str(" = ");
                self.print_into(*def, out);
                out.push_str("; ");
                self.print_into(*body, out);
            }
            Expr::Struct { flds } => {
                out.push_str("@{");
                for (i, (n, e)) in flds.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push(' ');
                    out.push_str(n);
                    out.push_str(" = ");
                    self.print_into(*e, out);
                }
                out.push('}');
            }
            Expr::Field { name, rec } => {
                self.print_into(*rec, out);
                out.push('.');
                out.push_str(name);
            }
        }
    }
}
