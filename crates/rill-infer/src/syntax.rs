//! The analysis tree. One node per post-parse expression, flattened to a
//! tagged sum; every node carries its current HM type-var and its current
//! flow type, both falling monotonically over a run.

use crate::tv::TvId;
use rill_ast::Prim;
use rill_types::Ty;
use smol_str::SmolStr;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct SynId(pub u32);

/// A frame of the non-generative environment: one type-var per enclosing
/// lambda parameter or let binding.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct NgId(pub u32);

#[derive(Debug)]
pub struct Ng {
    pub par: Option<NgId>,
    pub tv: TvId,
}

/// Reserved argument labels; the leading space keeps them apart from
/// record field names.
pub const ARG_NAMES: [&str; 3] = [" x", " y", " z"];
pub const RET: &str = "ret";
/// Union-find forward label.
pub const FWD: &str = ">>";
/// Nilable wrapper label.
pub const NIL_LBL: &str = "?";

#[derive(Debug)]
pub struct Syntax {
    pub par: Option<SynId>,
    pub nongen: Option<NgId>,
    /// Current HM type-var; subject to union-find redirects.
    pub hmt: TvId,
    /// Current flow type; falls monotonically.
    pub flow: Ty,
    pub kind: SynKind,
}

#[derive(Debug)]
pub enum SynKind {
    Con {
        con: Ty,
    },
    Ident(IdentState),
    Lambda(LambdaState),
    Let(LetState),
    Apply {
        fun: SynId,
        args: Vec<SynId>,
    },
    /// The boundary to unknown callers of the whole program.
    Root {
        body: SynId,
    },
    Struct {
        alias: u32,
        ids: Vec<SmolStr>,
        flds: Vec<SynId>,
    },
    Field {
        name: SmolStr,
        rec: SynId,
    },
}

#[derive(Debug)]
pub struct IdentState {
    pub name: SmolStr,
    /// The binding site, found in the pre-pass.
    pub def: Option<SynId>,
    /// Which argument of a lambda binder.
    pub idx: usize,
    /// The binder's type-var.
    pub idt: TvId,
    /// Let-bound outside the enclosing binders: re-instantiate at each use.
    pub fresh: bool,
}

#[derive(Debug)]
pub struct LetState {
    pub name: SmolStr,
    pub def: SynId,
    pub body: SynId,
    pub targ: TvId,
    /// Identifiers referring to this binding.
    pub refs: Vec<SynId>,
}

#[derive(Debug)]
pub struct LambdaState {
    /// Set when this lambda is a primitive with a built-in transfer
    /// function and no body.
    pub prim: Option<Prim>,
    pub params: Vec<SmolStr>,
    pub body: Option<SynId>,
    /// HM argument type-vars.
    pub targs: Vec<TvId>,
    /// Flow argument types, met over all discovered call sites.
    pub types: Vec<Ty>,
    /// Identifiers referring to each argument.
    pub refs: Vec<Vec<SynId>>,
    /// Unique function index.
    pub fidx: u32,
    /// Applies calling this lambda, found during constant propagation.
    pub applys: Vec<SynId>,
}
