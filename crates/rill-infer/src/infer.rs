//! The inference session and its worklist driver.
//!
//! All formerly-global state lives here: the syntax arena, the type-var
//! arena, the non-generative stack frames, the index allocators, and the
//! enable/freeze flags. The driver runs the passes in order: prep, main
//! loop, root-argument widening, freeze, error finalization.

use crate::syntax::{
    IdentState, LambdaState, LetState, Ng, NgId, SynId, SynKind, Syntax, ARG_NAMES, RET,
};
use crate::tv::{Tv, TvId};
use crate::work::Work;
use crate::Mode;
use rill_ast::{Ast, Expr, ExprId, Prim};
use rill_types::{Bits, Obj, StructObj, Ty, TyMem, World, CUTOFF};
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("parse errors: {0:?}")]
    Parse(Vec<String>),
    #[error("{name} is undefined")]
    Undefined { name: String },
    #[error("analysis did not settle within {0} iterations")]
    NoProgress(usize),
}

/// Session options.
#[derive(Clone, Copy, Debug)]
pub struct Opts {
    pub do_hm: bool,
    pub do_gcp: bool,
    pub do_lift: bool,
    /// Nonzero scrambles worklist pop order; confluence tests only.
    pub seed: u64,
    pub iter_limit: usize,
}

impl Default for Opts {
    fn default() -> Opts {
        Opts {
            do_hm: true,
            do_gcp: true,
            do_lift: true,
            seed: 0,
            iter_limit: 10_000,
        }
    }
}

/// The result of a run: the root's printed scheme, its flow type, the
/// flow type with callee returns expanded to signatures, the final
/// memory, and any errors.
#[derive(Debug)]
pub struct Analysis {
    pub hm: String,
    pub flow: Ty,
    pub flow_sig: Ty,
    pub mem: TyMem,
    pub errs: Vec<String>,
    pub iters: usize,
}

pub struct Infer {
    pub(crate) syns: Vec<Syntax>,
    pub(crate) tvs: Vec<Tv>,
    pub(crate) ngs: Vec<Ng>,
    pub(crate) work: Work,
    pub(crate) world: World,
    /// fidx -> lambda node.
    pub(crate) funs: HashMap<u32, SynId>,
    pub(crate) root: SynId,
    pub(crate) do_hm: bool,
    pub(crate) do_gcp: bool,
    pub(crate) do_lift: bool,
    pub(crate) freeze: bool,
    iter_limit: usize,
    /// All pair allocations share one alias class; same for triples.
    pair_alias: u32,
    triple_alias: u32,
    /// Lift audit trail, debug builds only.
    pub(crate) lifts: HashMap<(SynId, TvId), Vec<(Ty, Ty)>>,
}

impl Infer {
    pub fn new(opts: Opts) -> Infer {
        let mut world = World::new();
        let pair_alias = world.new_alias(Ty::REC_ALIAS);
        let triple_alias = world.new_alias(Ty::REC_ALIAS);
        Infer {
            syns: Vec::new(),
            tvs: Vec::new(),
            ngs: Vec::new(),
            work: Work::new(opts.seed),
            world,
            funs: HashMap::new(),
            root: SynId(0),
            do_hm: opts.do_hm,
            do_gcp: opts.do_gcp,
            do_lift: opts.do_lift,
            freeze: false,
            iter_limit: opts.iter_limit,
            pair_alias,
            triple_alias,
            lifts: HashMap::new(),
        }
    }

    /// Parse tree to analysis tree to fixed point to answers.
    pub fn analyze(ast: &Ast, opts: Opts) -> Result<Analysis, RunError> {
        let mut inf = Infer::new(opts);
        let body = inf.build(ast, ast.root);
        let root = inf.new_syn(Syntax {
            par: None,
            nongen: None,
            hmt: TvId::NONE,
            flow: Ty::XScalar,
            kind: SynKind::Root { body },
        });
        inf.root = root;
        inf.syn_mut(body).par = Some(root);

        let size = inf.prep_tree(root, None, None)?;
        let init_tvs = inf.tvs.len();

        // Pass 1: everything starts high and falls.
        inf.freeze = false;
        let mut iters = inf.main_loop()?;
        debug_assert!(inf.more_work());

        // Pass 2: give up on precise root argument types.
        inf.update_root_args();
        iters += inf.main_loop()?;
        debug_assert!(inf.more_work());

        // Pass 3: HM freezes; flow keeps falling.
        inf.freeze = true;
        for i in 0..inf.syns.len() {
            let s = SynId(i as u32);
            inf.add_val_work(s, None);
            inf.work.add(s);
        }
        iters += inf.main_loop()?;
        debug_assert!(inf.more_work());

        // Pass 4: error finalization; no types change.
        inf.pass4();

        log::debug!(
            "prog size: {}, initial tvs: {}, final tvs: {}, worklist iters: {}",
            size,
            init_tvs,
            inf.tvs.len(),
            iters
        );

        let hm = inf.p(inf.syn(root).hmt);
        let flow = inf.syn(root).flow.clone();
        let flow_sig = inf.flow_type();
        let mem = inf.final_mem();
        let errs = inf.errors();
        Ok(Analysis {
            hm,
            flow,
            flow_sig,
            mem,
            errs,
            iters,
        })
    }

    // ── Arena plumbing ───────────────────────────────────────────

    pub(crate) fn syn(&self, s: SynId) -> &Syntax {
        &self.syns[s.0 as usize]
    }

    pub(crate) fn syn_mut(&mut self, s: SynId) -> &mut Syntax {
        &mut self.syns[s.0 as usize]
    }

    fn new_syn(&mut self, syn: Syntax) -> SynId {
        let id = SynId(self.syns.len() as u32);
        self.syns.push(syn);
        id
    }

    fn new_ng(&mut self, par: Option<NgId>, tv: TvId) -> NgId {
        let id = NgId(self.ngs.len() as u32);
        self.ngs.push(Ng { par, tv });
        id
    }

    // ── Build: post-parse tree to analysis tree ──────────────────

    fn build(&mut self, ast: &Ast, e: ExprId) -> SynId {
        let kind = match &ast.exprs[e] {
            Expr::Int(i) => SynKind::Con { con: Ty::int(*i) },
            Expr::Flt(f) => SynKind::Con { con: Ty::flt(*f) },
            Expr::Str(s) => SynKind::Con {
                con: Ty::str_con(s),
            },
            Expr::Nil => SynKind::Con { con: Ty::Nil },
            Expr::Ident(name) => SynKind::Ident(IdentState {
                name: name.clone(),
                def: None,
                idx: 0,
                idt: TvId::NONE,
                fresh: false,
            }),
            Expr::Prim(p) => {
                let n = p.nargs();
                return self.build_lambda(Some(*p), prim_params(n), None);
            }
            Expr::Lambda { params, body } => {
                let body = self.build(ast, *body);
                return self.build_lambda(None, params.clone(), Some(body));
            }
            Expr::Apply { fun, args } => {
                let fun = self.build(ast, *fun);
                let args = args.iter().map(|a| self.build(ast, *a)).collect();
                SynKind::Apply { fun, args }
            }
            Expr::Let { name, def, body } => {
                let def = self.build(ast, *def);
                let body = self.build(ast, *body);
                let targ = self.make_leaf();
                SynKind::Let(LetState {
                    name: name.clone(),
                    def,
                    body,
                    targ,
                    refs: Vec::new(),
                })
            }
            Expr::Struct { flds } => {
                let alias = self.world.new_alias(Ty::REC_ALIAS);
                let mut ids = Vec::new();
                let mut fs = Vec::new();
                for (n, fe) in flds {
                    ids.push(n.clone());
                    fs.push(self.build(ast, *fe));
                }
                SynKind::Struct {
                    alias,
                    ids,
                    flds: fs,
                }
            }
            Expr::Field { name, rec } => {
                let rec = self.build(ast, *rec);
                SynKind::Field {
                    name: name.clone(),
                    rec,
                }
            }
        };
        let id = self.new_syn(Syntax {
            par: None,
            nongen: None,
            hmt: TvId::NONE,
            flow: Ty::XScalar,
            kind,
        });
        self.fix_children(id);
        id
    }

    fn build_lambda(
        &mut self,
        prim: Option<Prim>,
        params: Vec<SmolStr>,
        body: Option<SynId>,
    ) -> SynId {
        let fidx = self.world.new_fidx();
        let n = params.len();
        let targs = match prim {
            // A primitive's arg vars come off its signature, in prep.
            Some(_) => vec![TvId::NONE; n],
            None => (0..n).map(|_| self.make_leaf()).collect(),
        };
        let id = self.new_syn(Syntax {
            par: None,
            nongen: None,
            hmt: TvId::NONE,
            flow: Ty::XScalar,
            kind: SynKind::Lambda(LambdaState {
                prim,
                params,
                body,
                targs,
                types: vec![Ty::XScalar; n],
                refs: vec![Vec::new(); n],
                fidx,
                applys: Vec::new(),
            }),
        });
        self.funs.insert(fidx, id);
        self.fix_children(id);
        id
    }

    /// Parent links for just-built children.
    fn fix_children(&mut self, id: SynId) {
        for c in self.children(id) {
            self.syn_mut(c).par = Some(id);
        }
    }

    pub(crate) fn children(&self, s: SynId) -> Vec<SynId> {
        match &self.syn(s).kind {
            SynKind::Con { .. } | SynKind::Ident(_) => Vec::new(),
            SynKind::Lambda(l) => l.body.into_iter().collect(),
            SynKind::Let(l) => vec![l.def, l.body],
            SynKind::Apply { fun, args } => {
                let mut v = vec![*fun];
                v.extend(args);
                v
            }
            SynKind::Root { body } => vec![*body],
            SynKind::Struct { flds, .. } => flds.clone(),
            SynKind::Field { rec, .. } => vec![*rec],
        }
    }

    // ── Pre-pass ─────────────────────────────────────────────────

    fn prep_impl(&mut self, s: SynId, par: Option<SynId>, nongen: Option<NgId>, hmt: TvId) {
        let syn = self.syn_mut(s);
        syn.par = par;
        syn.nongen = nongen;
        syn.hmt = hmt;
        syn.flow = Ty::XScalar;
        self.work.add(s);
    }

    fn prep_tree(
        &mut self,
        s: SynId,
        par: Option<SynId>,
        nongen: Option<NgId>,
    ) -> Result<usize, RunError> {
        match &self.syn(s).kind {
            SynKind::Con { con } => {
                let con = con.clone();
                // A '0' turns into a nilable leaf.
                let hmt = if con == Ty::Nil {
                    let leaf = self.make_leaf();
                    self.make_nil(leaf)
                } else {
                    self.make_base(con)
                };
                self.prep_impl(s, par, nongen, hmt);
                Ok(1)
            }
            SynKind::Ident(st) => {
                let name = st.name.clone();
                let hmt = self.make_leaf();
                self.prep_impl(s, par, nongen, hmt);
                // Register in every enclosing binder of the same name.
                let mut up = par;
                while let Some(p) = up {
                    self.prep_lookup_deps(p, s, &name);
                    up = self.syn(p).par;
                }
                // Resolve to the nearest binder.
                let mut up = par;
                while let Some(p) = up {
                    match &self.syn(p).kind {
                        SynKind::Lambda(l) if l.prim.is_none() => {
                            if let Some(i) = l.params.iter().position(|a| a == &name) {
                                let idt = self.lambda_targ(p, i);
                                let st = self.ident_mut(s);
                                st.def = Some(p);
                                st.idx = i;
                                st.idt = idt;
                                st.fresh = false;
                                return Ok(1);
                            }
                        }
                        SynKind::Let(l) if l.name == name => {
                            let targ = l.targ;
                            let idt = self.find(targ);
                            let fresh = !self.nongen_in(idt, nongen);
                            let st = self.ident_mut(s);
                            st.def = Some(p);
                            st.idx = usize::MAX;
                            st.idt = idt;
                            st.fresh = fresh;
                            return Ok(1);
                        }
                        _ => {}
                    }
                    up = self.syn(p).par;
                }
                Err(RunError::Undefined {
                    name: name.to_string(),
                })
            }
            SynKind::Lambda(l) if l.prim.is_some() => {
                let prim = l.prim.unwrap();
                let fidx = l.fidx;
                let sig = self.prim_sig(prim);
                let hmt = self.make_fun(Bits::make0(fidx), &sig);
                self.prep_impl(s, par, nongen, hmt);
                for (i, name) in ARG_NAMES.iter().take(sig.len() - 1).enumerate() {
                    let t = self.arg(hmt, name).expect("signature has its args");
                    self.push_update(t, s);
                    if let SynKind::Lambda(l) = &mut self.syn_mut(s).kind {
                        l.targs[i] = t;
                    }
                }
                Ok(1)
            }
            SynKind::Lambda(l) => {
                let body = l.body.unwrap();
                let targs = l.targs.clone();
                let fidx = l.fidx;
                let hmt = self.make_leaf();
                self.prep_impl(s, par, nongen, hmt);
                // Extend the non-generative set with the parameters.
                let mut vs = nongen;
                for &t in &targs {
                    vs = Some(self.new_ng(vs, t));
                }
                let cnt = self.prep_tree(body, Some(s), vs)? + 1;
                // Pre-unify with the required function shape.
                let mut sig = targs;
                sig.push(self.syn_find(body));
                let fun = self.make_fun(Bits::make0(fidx), &sig);
                let me = self.syn_find(s);
                self.unify(me, fun, Mode::Run);
                Ok(cnt)
            }
            SynKind::Let(l) => {
                let (def, body, targ) = (l.def, l.body, l.targ);
                // The body's var is the let's var; prep it first.
                self.syn_mut(s).par = par;
                self.syn_mut(s).nongen = nongen;
                self.syn_mut(s).flow = Ty::XScalar;
                self.work.add(s);
                let ng = self.new_ng(nongen, targ);
                let cnt = self.prep_tree(body, Some(s), nongen)?
                    + self.prep_tree(def, Some(s), Some(ng))?;
                self.syn_mut(s).hmt = self.syn(body).hmt;
                let d = self.syn_find(def);
                let t = self.find(targ);
                self.unify(t, d, Mode::Run);
                Ok(cnt + 1)
            }
            SynKind::Apply { fun, args } => {
                let (fun, args) = (*fun, args.clone());
                let hmt = self.make_leaf();
                self.prep_impl(s, par, nongen, hmt);
                let mut cnt = 1 + self.prep_tree(fun, Some(s), nongen)?;
                for a in args {
                    cnt += self.prep_tree(a, Some(s), nongen)?;
                }
                Ok(cnt)
            }
            SynKind::Root { body } => {
                let body = *body;
                let hmt = self.make_leaf();
                self.prep_impl(s, par, nongen, hmt);
                Ok(1 + self.prep_tree(body, Some(s), nongen)?)
            }
            SynKind::Struct { alias, ids, flds } => {
                let (alias, ids, flds) = (*alias, ids.clone(), flds.clone());
                let hmt = self.make_struct_tv(Bits::make0(alias), None, false);
                self.prep_impl(s, par, nongen, hmt);
                let mut cnt = 1;
                let mut fs = Vec::new();
                for (id, f) in ids.iter().zip(&flds) {
                    cnt += self.prep_tree(*f, Some(s), nongen)?;
                    fs.push((id.clone(), self.syn_find(*f)));
                }
                if !fs.is_empty() {
                    let mut args = crate::tv::Args::default();
                    for (k, v) in fs {
                        args.insert(&k, v);
                    }
                    self.tv_mut(hmt).args = Some(args);
                }
                Ok(cnt)
            }
            SynKind::Field { rec, .. } => {
                let rec = *rec;
                let hmt = self.make_leaf();
                self.prep_impl(s, par, nongen, hmt);
                Ok(1 + self.prep_tree(rec, Some(s), nongen)?)
            }
        }
    }

    /// Register an identifier on any binder of the same name, for
    /// revisits (deps) and flow propagation (refs).
    fn prep_lookup_deps(&mut self, binder: SynId, id: SynId, name: &str) {
        match &self.syn(binder).kind {
            SynKind::Lambda(l) if l.prim.is_none() => {
                if let Some(i) = l.params.iter().position(|a| a == name) {
                    let targ = l.targs[i];
                    self.push_update(targ, id);
                    if let SynKind::Lambda(l) = &mut self.syn_mut(binder).kind {
                        l.refs[i].push(id);
                    }
                }
            }
            SynKind::Let(l) if l.name == name => {
                let targ = l.targ;
                self.push_update(targ, id);
                if let SynKind::Let(l) = &mut self.syn_mut(binder).kind {
                    l.refs.push(id);
                }
            }
            _ => {}
        }
    }

    /// A primitive's signature vars; the last is the return.
    fn prim_sig(&mut self, p: Prim) -> Vec<TvId> {
        match p {
            Prim::If => {
                let a = self.make_leaf();
                let b = self.make_leaf();
                let c = self.make_leaf();
                let r = self.make_leaf();
                vec![a, b, c, r]
            }
            Prim::Pair => {
                let a = self.make_leaf();
                let b = self.make_leaf();
                let r = self.make_struct_tv(
                    Bits::make0(self.pair_alias),
                    Some(vec![("0".into(), a), ("1".into(), b)]),
                    false,
                );
                vec![a, b, r]
            }
            Prim::Triple => {
                let a = self.make_leaf();
                let b = self.make_leaf();
                let c = self.make_leaf();
                let r = self.make_struct_tv(
                    Bits::make0(self.triple_alias),
                    Some(vec![("0".into(), a), ("1".into(), b), ("2".into(), c)]),
                    false,
                );
                vec![a, b, c, r]
            }
            Prim::Eq => {
                let a = self.make_leaf();
                let r = self.make_base(Ty::BOOL);
                vec![a, a, r]
            }
            Prim::Eq0 => {
                let a = self.make_base(Ty::INT64);
                let r = self.make_base(Ty::BOOL);
                vec![a, r]
            }
            Prim::IsEmpty => {
                let a = self.make_base(Ty::strptr());
                let r = self.make_base(Ty::BOOL);
                vec![a, r]
            }
            Prim::NotNil => {
                let a = self.make_leaf();
                let r = self.make_leaf();
                vec![a, r]
            }
            Prim::Mul | Prim::Add => {
                let a = self.make_base(Ty::INT64);
                let b = self.make_base(Ty::INT64);
                let r = self.make_base(Ty::INT64);
                vec![a, b, r]
            }
            Prim::Dec => {
                let a = self.make_base(Ty::INT64);
                let r = self.make_base(Ty::INT64);
                vec![a, r]
            }
            Prim::Str => {
                let a = self.make_base(Ty::INT64);
                let r = self.make_base(Ty::strptr());
                vec![a, r]
            }
            Prim::Factor => {
                let a = self.make_base(Ty::FLT64);
                let r = self.make_base(Ty::FLT64);
                vec![a, r]
            }
        }
    }

    // ── Kind accessors ───────────────────────────────────────────

    fn ident_mut(&mut self, s: SynId) -> &mut IdentState {
        match &mut self.syn_mut(s).kind {
            SynKind::Ident(st) => st,
            _ => unreachable!(),
        }
    }

    pub(crate) fn lambda(&self, s: SynId) -> &LambdaState {
        match &self.syn(s).kind {
            SynKind::Lambda(l) => l,
            _ => unreachable!(),
        }
    }

    pub(crate) fn lambda_mut(&mut self, s: SynId) -> &mut LambdaState {
        match &mut self.syn_mut(s).kind {
            SynKind::Lambda(l) => l,
            _ => unreachable!(),
        }
    }

    /// A lambda argument's var, found and memoized.
    pub(crate) fn lambda_targ(&mut self, s: SynId, i: usize) -> TvId {
        let t = self.lambda(s).targs[i];
        let f = self.find(t);
        if f != t {
            self.lambda_mut(s).targs[i] = f;
        }
        f
    }

    // ── HM transfer functions ────────────────────────────────────

    pub(crate) fn hm_step(&mut self, s: SynId, m: Mode) -> bool {
        match &self.syn(s).kind {
            SynKind::Con { .. } | SynKind::Let(_) => false,
            SynKind::Ident(st) => {
                let (idt0, fresh) = (st.idt, st.fresh);
                let idt = self.find(idt0);
                if idt != idt0 {
                    self.ident_mut(s).idt = idt;
                }
                let hmt = self.syn_find(s);
                let nongen = self.syn(s).nongen;
                if fresh {
                    self.fresh_unify(idt, hmt, nongen, m)
                } else {
                    self.unify(idt, hmt, m)
                }
            }
            SynKind::Lambda(l) => match l.prim {
                Some(Prim::If) => self.if_hm(s, m),
                Some(Prim::NotNil) => self.notnil_hm(s, m),
                Some(_) => false,
                None => {
                    let n = l.targs.len();
                    let body = l.body.unwrap();
                    let mut progress = false;
                    for i in 0..n {
                        let old = self.syn_find(s);
                        let targ = self.lambda_targ(s, i);
                        if let Some(a) = self.arg(old, ARG_NAMES[i]) {
                            progress |= self.unify(a, targ, m);
                        }
                        if progress && m.test() {
                            return true;
                        }
                    }
                    let old = self.syn_find(s);
                    let b = self.syn_find(body);
                    if let Some(r) = self.arg(old, RET) {
                        progress |= self.unify(r, b, m);
                    }
                    progress
                }
            },
            SynKind::Apply { .. }
            | SynKind::Root { .. }
            | SynKind::Struct { .. }
            | SynKind::Field { .. } => self.hm_step2(s, m),
        }
    }

    fn hm_step2(&mut self, s: SynId, m: Mode) -> bool {
        match &self.syn(s).kind {
            SynKind::Root { body } => {
                let body = *body;
                let me = self.syn_find(s);
                let b = self.syn_find(body);
                self.unify(me, b, m)
            }
            SynKind::Apply { fun, args } => {
                let (fun, args) = (*fun, args.clone());
                let tfun = self.syn_find(fun);
                if !self.tv(tfun).is_fun() {
                    if args.len() > ARG_NAMES.len() {
                        if self.tv(tfun).err.is_some() {
                            return false;
                        }
                        if m.test() {
                            return true;
                        }
                        self.tv_mut(tfun).err =
                            Some(format!("Bad argument count {}", args.len()));
                        return true;
                    }
                    if m.test() {
                        return true;
                    }
                    let mut sig: Vec<TvId> = Vec::new();
                    for &a in &args {
                        sig.push(self.syn_find(a));
                    }
                    sig.push(self.syn_find(s));
                    let nfun = self.make_fun(Bits::empty(), &sig);
                    return self.unify(tfun, nfun, m);
                }
                // Pairwise the formals against the actuals.
                let mut progress = false;
                let mut tfun = tfun;
                for (i, &a) in args.iter().enumerate().take(ARG_NAMES.len()) {
                    let actual = self.syn_find(a);
                    if let Some(formal) = self.arg(tfun, ARG_NAMES[i]) {
                        progress |= self.unify(formal, actual, m);
                    }
                    if progress && m.test() {
                        return true;
                    }
                    tfun = self.find(tfun);
                }
                let me = self.syn_find(s);
                if let Some(r) = self.arg(tfun, RET) {
                    progress |= self.unify(me, r, m);
                }
                progress
            }
            SynKind::Struct { ids, flds, .. } => {
                let (ids, flds) = (ids.clone(), flds.clone());
                let rec = self.syn_find(s);
                self.push_update(rec, s);
                let mut progress = false;
                for (id, f) in ids.iter().zip(&flds) {
                    let rec = self.syn_find(s);
                    if let Some(fld) = self.arg(rec, id) {
                        let ft = self.syn_find(*f);
                        progress |= self.unify(fld, ft, m);
                    }
                    if progress && m.test() {
                        return true;
                    }
                }
                progress
            }
            SynKind::Field { name, rec } => {
                let (name, rec) = (name.clone(), *rec);
                let me = self.syn_find(s);
                let trec = self.syn_find(rec);
                self.push_update(trec, s);
                if let Some(fld) = self.arg(trec, &name) {
                    return self.unify(fld, me, m);
                }
                // Add struct-ness if possible, then the field.
                let tv = self.tv(trec);
                if (!tv.is_struct() && !tv.is_nil()) || (tv.is_struct() && tv.is_open()) {
                    if m.test() {
                        return true;
                    }
                    if !self.tv(trec).is_struct() {
                        let tv = self.tv_mut(trec);
                        tv.open = true;
                        tv.aliases = Some(Bits::empty());
                        if tv.args.is_none() {
                            tv.args = Some(crate::tv::Args::default());
                        }
                    }
                    self.add_fld(trec, &name, me, m);
                    return true;
                }
                // Closed or not a record: the field is missing.
                if self.tv(me).err.is_some() {
                    return false;
                }
                if m.test() {
                    return true;
                }
                self.tv_mut(me).err = Some(format!("Missing field {}", name));
                true
            }
            _ => unreachable!(),
        }
    }

    /// `if` reads the predicate's flow to skip constraints from arms that
    /// cannot run.
    fn if_hm(&mut self, s: SynId, m: Mode) -> bool {
        let me = self.syn_find(s);
        let Some(rez) = self.arg(me, RET) else { return false };
        if self.do_gcp {
            let pred = self.lambda(s).types[0].clone();
            let known_false =
                pred == Ty::FALSE || pred == Ty::Nil || pred == Ty::XNil;
            if known_false {
                let t2 = self.lambda_targ(s, 2);
                return self.unify(rez, t2, m);
            }
            let known_true = if pred.above_center() {
                !pred.may_nil()
            } else {
                !pred.must_nil()
            };
            if known_true {
                let t1 = self.lambda_targ(s, 1);
                return self.unify(rez, t1, m);
            }
            if pred.above_center() {
                return false; // Wait until the predicate falls
            }
        }
        // Both sides reach the result.
        let t1 = self.lambda_targ(s, 1);
        let p1 = self.unify(rez, t1, m);
        let rez = self.find(rez);
        let t2 = self.lambda_targ(s, 2);
        let p2 = self.unify(rez, t2, m);
        p1 | p2
    }

    /// Strip a nil off the argument: the return is the not-nil view.
    fn notnil_hm(&mut self, s: SynId, m: Mode) -> bool {
        let arg = self.lambda_targ(s, 0);
        let fun = self.syn_find(s);
        debug_assert!(self.tv(fun).is_fun());
        let Some(ret) = self.arg(fun, RET) else { return false };
        // Already nil-checked shapes make no progress.
        if arg == ret {
            return false;
        }
        if self.tv(arg).is_nil() && self.arg(arg, crate::syntax::NIL_LBL) == Some(ret) {
            return false;
        }
        if self.tv(arg).is_base() && self.tv(ret).is_base() {
            return false;
        }
        if self.tv(arg).is_struct() && self.tv(ret).is_struct() {
            let mut progress = false;
            let a = self.tv(arg).aliases.clone().unwrap();
            let r = self.tv(ret).aliases.clone().unwrap();
            let mt = a.meet(&r);
            let amt = mt.set(rill_types::NIL_IDX);
            let rmt = mt.clear(rill_types::NIL_IDX);
            if amt != a {
                if m.test() {
                    return true;
                }
                self.tv_mut(arg).aliases = Some(amt);
                progress = true;
            }
            if rmt != r {
                if m.test() {
                    return true;
                }
                self.tv_mut(ret).aliases = Some(rmt);
                progress = true;
            }
            return self.unify_flds_top(arg, ret, m) | progress;
        }
        if m.test() {
            return true;
        }
        if self.tv(arg).is_nil() && self.tv(ret).is_nil() {
            return self.unify(arg, ret, m);
        }
        // Unify the arg with a nilable view of the return.
        let nil = self.make_nil(ret);
        let nil = self.find(nil);
        self.unify(nil, arg, m)
    }

    // ── GCP transfer functions ───────────────────────────────────

    pub(crate) fn val_step(&mut self, s: SynId, m: Mode) -> Ty {
        match &self.syn(s).kind {
            SynKind::Con { con } => con.clone(),
            SynKind::Ident(st) => match st.def {
                Some(d) => match &self.syn(d).kind {
                    SynKind::Let(l) => self.syn(l.def).flow.clone(),
                    SynKind::Lambda(l) => l.types[st.idx].clone(),
                    _ => Ty::Scalar,
                },
                None => Ty::Scalar,
            },
            SynKind::Lambda(l) => {
                let fidx = l.fidx;
                let nargs = l.params.len() as u32;
                let ret = match l.prim {
                    Some(p) => {
                        let types = l.types.clone();
                        self.prim_apply(p, &types)
                    }
                    None => self.syn(l.body.unwrap()).flow.clone(),
                };
                Ty::fun(Bits::make0(fidx), nargs, ret)
            }
            SynKind::Let(l) => self.syn(l.body).flow.clone(),
            SynKind::Apply { .. } => self.apply_val(s, m),
            SynKind::Root { .. } => self.root_val(s, m),
            SynKind::Struct { alias, ids, flds } => {
                let (alias, ids, flds) = (*alias, ids.clone(), flds.clone());
                let fs = ids
                    .iter()
                    .zip(&flds)
                    .map(|(n, f)| (n.clone(), self.syn(*f).flow.clone()))
                    .collect();
                let obj =
                    Obj::Struct(StructObj::make(fs, false)).approx(&Bits::make0(alias), CUTOFF);
                Ty::ptr(alias, obj)
            }
            SynKind::Field { name, rec } => {
                let trec = self.syn(*rec).flow.clone();
                if trec.above_center() || trec == Ty::Nil {
                    return Ty::XScalar;
                }
                if let Ty::Ptr(p) = &trec {
                    // The pointer carries this alias class's object: the
                    // memory lattice lookup at this pointer.
                    match &*p.obj {
                        Obj::Struct(ts) => {
                            if let Some(f) = ts.fld(name) {
                                return f.clone();
                            }
                            if ts.any {
                                return Ty::XScalar;
                            }
                        }
                        Obj::XObj => return Ty::XScalar,
                        _ => {}
                    }
                }
                Ty::Scalar
            }
        }
    }

    /// Register newly visible callees and meet the actuals into their
    /// formals; the result is the callees' combined return.
    fn apply_val_inner(&mut self, s: SynId, fun: SynId, args: &[SynId], m: Mode) -> Ty {
        let flow = self.syn(fun).flow.clone();
        let Ty::Fun(tfp) = &flow else {
            return flow.oob();
        };
        if tfp.fidxs.is_empty() {
            return Ty::XScalar;
        }
        if self.do_hm {
            let tf = self.syn_find(fun);
            if !self.tv(tf).is_fun() {
                return Ty::XScalar; // Nothing callable yet; stay high
            }
        }
        // 'All functions' arrives via Root; no local lambda to update.
        if m.run() && !tfp.fidxs.is_all() {
            for fidx in tfp.fidxs.iter() {
                if fidx == rill_types::NIL_IDX {
                    continue;
                }
                let Some(&lam) = self.funs.get(&fidx) else { continue };
                if self.lambda(lam).applys.contains(&s) {
                    continue;
                }
                // A new call site: all actuals meet into the formals.
                self.lambda_mut(lam).applys.push(s);
                for (i, &a) in args.iter().enumerate() {
                    let af = self.syn(a).flow.clone();
                    self.arg_meet(lam, i, &af);
                }
                if self.lambda(lam).prim.is_some() {
                    self.work.add(lam); // Primitives re-apply arguments
                }
            }
        }
        flow
    }

    fn apply_val(&mut self, s: SynId, m: Mode) -> Ty {
        let SynKind::Apply { fun, args } = &self.syn(s).kind else {
            unreachable!()
        };
        let (fun, args) = (*fun, args.clone());
        let flow = self.apply_val_inner(s, fun, &args, m);
        let Ty::Fun(tfp) = flow else { return flow };
        let mut ret = (*tfp.ret).clone();
        if self.do_lift && self.do_hm {
            debug_assert!(self.syn(s).flow.isa(&ret));
            let rezt2 = self.syn_find(s);
            let lift = self.hm_apply_lift(&args, rezt2, &ret, s);
            debug_assert!(self.syn(s).flow.isa(&lift));
            ret = lift;
        }
        ret
    }

    /// Root is nearly an apply with no arguments: its flow is the body's,
    /// with the return lifted through the body's HM return.
    fn root_val(&mut self, s: SynId, m: Mode) -> Ty {
        let SynKind::Root { body } = &self.syn(s).kind else {
            unreachable!()
        };
        let body = *body;
        self.apply_val_inner(s, body, &[], m);
        let flow = self.syn(body).flow.clone();
        let fun = self.syn_find(body);
        if !self.tv(fun).is_fun() {
            return flow;
        }
        let Ty::Fun(tfp) = &flow else { return flow };
        let mut ret = (*tfp.ret).clone();
        if self.do_lift && self.do_hm {
            if let Some(rt2) = self.arg(fun, RET) {
                ret = self.hm_apply_lift(&[], rt2, &ret, s);
            }
        }
        Ty::Fun(rill_types::FunPtr {
            fidxs: tfp.fidxs.clone(),
            nargs: tfp.nargs,
            ret: Box::new(ret),
        })
    }

    /// Meet a call site's actual into a lambda formal and wake its users.
    pub(crate) fn arg_meet(&mut self, lam: SynId, argn: usize, cflow: &Ty) {
        let l = self.lambda(lam);
        if argn >= l.types.len() {
            return;
        }
        let old = l.types[argn].clone();
        let mt = old.meet(cflow);
        if mt == old {
            return;
        }
        self.lambda_mut(lam).types[argn] = mt;
        let refs = self.lambda(lam).refs[argn].clone();
        self.work.add_all(refs);
        if self.lambda(lam).prim.is_some() {
            self.work.add(lam);
        }
    }

    /// Primitive transfer functions over the met argument flows.
    fn prim_apply(&mut self, p: Prim, flows: &[Ty]) -> Ty {
        match p {
            Prim::Pair => self.tuple_apply(self.pair_alias, flows),
            Prim::Triple => self.tuple_apply(self.triple_alias, flows),
            Prim::If => {
                let (pred, t1, t2) = (&flows[0], &flows[1], &flows[2]);
                if *pred == Ty::FALSE || *pred == Ty::Nil || *pred == Ty::XNil {
                    return t2.clone(); // False only
                }
                if pred.above_center() {
                    return Ty::XScalar; // Delay until the predicate falls
                }
                if !pred.must_nil() {
                    return t1.clone(); // True only
                }
                t1.meet(t2)
            }
            Prim::Eq => {
                let (x0, x1) = (&flows[0], &flows[1]);
                if x0.above_center() || x1.above_center() {
                    return Ty::BOOL.dual();
                }
                if x0.is_con() && x1.is_con() && x0 == x1 {
                    return Ty::TRUE;
                }
                Ty::BOOL
            }
            Prim::Eq0 => {
                let pred = &flows[0];
                if pred.above_center() {
                    return if pred.may_nil() {
                        Ty::BOOL.dual()
                    } else {
                        Ty::FALSE
                    };
                }
                if *pred == Ty::All {
                    return Ty::BOOL;
                }
                if *pred == Ty::FALSE || *pred == Ty::Nil || *pred == Ty::XNil {
                    return Ty::TRUE;
                }
                if &pred.meet(&Ty::Nil) != pred {
                    return Ty::FALSE; // Cannot be nil, so cannot be zero
                }
                Ty::BOOL
            }
            Prim::IsEmpty => {
                let pred = &flows[0];
                if pred.above_center() {
                    return Ty::BOOL.dual();
                }
                match pred.get_str() {
                    Some(s) => Ty::int(i64::from(s.is_empty())),
                    None => Ty::BOOL,
                }
            }
            Prim::NotNil => {
                let val = &flows[0];
                if *val == Ty::XNil {
                    return Ty::XScalar; // The not-nil of nil is empty
                }
                val.join(&Ty::NScalr)
            }
            Prim::Mul => {
                let (t0, t1) = (&flows[0], &flows[1]);
                if t0.above_center() || t1.above_center() {
                    return Ty::INT64.dual();
                }
                match (int_con(t0), int_con(t1)) {
                    (Some(0), _) | (_, Some(0)) => Ty::int(0),
                    (Some(a), Some(b)) => Ty::int(a.wrapping_mul(b)),
                    _ => Ty::INT64,
                }
            }
            Prim::Add => {
                let (t0, t1) = (&flows[0], &flows[1]);
                if t0.above_center() || t1.above_center() {
                    return Ty::INT64.dual();
                }
                match (int_con(t0), int_con(t1)) {
                    (Some(a), Some(b)) => Ty::int(a.wrapping_add(b)),
                    _ => Ty::INT64,
                }
            }
            Prim::Dec => {
                let t0 = &flows[0];
                if t0.above_center() {
                    return Ty::INT64.dual();
                }
                match int_con(t0) {
                    Some(a) => Ty::int(a.wrapping_sub(1)),
                    None => Ty::INT64,
                }
            }
            Prim::Str => {
                let i = &flows[0];
                if i.above_center() {
                    return Ty::strptr().dual();
                }
                match int_con(i) {
                    Some(a) => Ty::str_con(&a.to_string()),
                    None => Ty::strptr(),
                }
            }
            Prim::Factor => {
                let flt = &flows[0];
                if flt.above_center() {
                    return Ty::FLT64.dual();
                }
                Ty::FLT64
            }
        }
    }

    fn tuple_apply(&self, alias: u32, flows: &[Ty]) -> Ty {
        let fs = flows
            .iter()
            .enumerate()
            .map(|(i, t)| (SmolStr::new(i.to_string()), t.clone()))
            .collect();
        let obj = Obj::Struct(StructObj::make(fs, false)).approx(&Bits::make0(alias), CUTOFF);
        Ty::ptr(alias, obj)
    }

    // ── Neighbor scheduling ──────────────────────────────────────

    /// After HM progress at `s`, wake the nodes whose own HM step reads
    /// what just changed.
    pub(crate) fn add_hm_work(&mut self, s: SynId) {
        match &self.syn(s).kind {
            SynKind::Con { .. } | SynKind::Root { .. } => {}
            SynKind::Ident(st) => {
                let idt = st.idt;
                if let Some(par) = self.syn(s).par {
                    self.work.add(par);
                    let png = self.syn(par).nongen;
                    let idt = self.find(idt);
                    if self.nongen_in(idt, png) {
                        // Captured by some enclosing binder: dependents of
                        // the binder's var must also revisit.
                        self.add_deps_work(idt, Mode::Run);
                    }
                    if let SynKind::Apply { fun, .. } = &self.syn(par).kind {
                        let fun = *fun;
                        if matches!(
                            &self.syn(fun).kind,
                            SynKind::Lambda(l) if l.prim == Some(Prim::NotNil)
                        ) {
                            self.work.add(fun);
                        }
                    }
                }
            }
            SynKind::Lambda(l) => {
                debug_assert!(l.prim.is_some(), "plain lambda never re-progresses");
            }
            SynKind::Let(l) => {
                let (def, body) = (l.def, l.body);
                if let Some(par) = self.syn(s).par {
                    self.work.add(par);
                }
                self.work.add(body);
                self.work.add(def);
                let d = self.syn_find(def);
                for dep in self.tv(d).deps.clone() {
                    self.work.add(dep);
                }
            }
            SynKind::Apply { args, .. } => {
                let args = args.clone();
                if let Some(par) = self.syn(s).par {
                    self.work.add(par);
                }
                self.work.add_all(args);
            }
            SynKind::Struct { flds, .. } => {
                let flds = flds.clone();
                if let Some(par) = self.syn(s).par {
                    self.work.add(par);
                }
                self.work.add_all(flds);
            }
            SynKind::Field { rec, .. } => {
                let rec = *rec;
                if let Some(par) = self.syn(s).par {
                    self.work.add(par);
                }
                self.work.add(rec);
                self.add_hm_work(rec);
            }
        }
    }

    /// After flow progress at `child`, wake the parts of parent `s` that
    /// consume it.
    pub(crate) fn add_val_work(&mut self, s: SynId, child: Option<SynId>) {
        match &self.syn(s).kind {
            SynKind::Lambda(_) => {
                // The body fell: the lambda and every call site recompute.
                self.work.add(s);
                let applys = self.lambda(s).applys.clone();
                self.work.add_all(applys);
            }
            SynKind::Let(l) => {
                if child == Some(l.def) {
                    let refs = l.refs.clone();
                    self.work.add_all(refs);
                } else {
                    self.work.add(s);
                }
            }
            SynKind::Apply { fun, args } => {
                let (fun, args) = (*fun, args.clone());
                if child == Some(fun) {
                    self.work.add(s);
                    return;
                }
                if self.do_lift && self.do_hm {
                    self.work.add(s); // An input fell; the lift may give less
                }
                let flow = self.syn(fun).flow.clone();
                let Ty::Fun(tfp) = &flow else { return };
                if tfp.fidxs.is_empty() || tfp.fidxs.is_all() {
                    return;
                }
                let Some(child) = child else { return };
                let Some(argn) = args.iter().position(|&a| a == child) else {
                    return;
                };
                let cf = self.syn(child).flow.clone();
                for fidx in tfp.fidxs.clone().iter() {
                    if let Some(&lam) = self.funs.get(&fidx) {
                        self.arg_meet(lam, argn, &cf);
                    }
                }
            }
            SynKind::Root { .. } => {
                self.work.add(s);
            }
            _ => {
                self.work.add(s);
            }
        }
    }

    // ── Driver ───────────────────────────────────────────────────

    fn main_loop(&mut self) -> Result<usize, RunError> {
        let mut cnt = 0usize;
        while let Some(s) = self.work.pop() {
            cnt += 1;
            if cnt >= self.iter_limit {
                return Err(RunError::NoProgress(self.iter_limit));
            }
            if self.do_hm {
                let old = self.syn(s).hmt;
                if self.hm_step(s, Mode::Run) {
                    debug_assert_eq!(
                        self.debug_find(self.syn(s).hmt),
                        self.debug_find(old),
                        "hm progress moved the node's class"
                    );
                    self.add_hm_work(s);
                }
            }
            if self.do_gcp {
                let old = self.syn(s).flow.clone();
                let t = self.val_step(s, Mode::Run);
                if t != old {
                    debug_assert!(old.isa(&t), "flow rose: {} to {}", old, t);
                    self.syn_mut(s).flow = t;
                    if let Some(par) = self.syn(s).par {
                        self.add_val_work(par, Some(s));
                    }
                }
            }
            // Very expensive audit: every node that could progress is on
            // the worklist. Debug builds only.
            debug_assert!(self.more_work());
        }
        Ok(cnt)
    }

    /// True if every node that would make progress is queued (or the
    /// progress is impossible, post-freeze).
    pub(crate) fn more_work(&mut self) -> bool {
        for i in 0..self.syns.len() {
            let s = SynId(i as u32);
            if self.do_hm && (!self.work.on(s) || self.freeze) && self.hm_step(s, Mode::Test) {
                return false;
            }
            if self.do_gcp {
                let t = self.val_step(s, Mode::Test);
                let flow = &self.syn(s).flow;
                if !flow.isa(&t) {
                    return false;
                }
                if !self.work.on(s) && *flow != t {
                    return false;
                }
            }
        }
        true
    }

    // ── Pass 2: root argument widening ───────────────────────────

    /// Escaping functions are assumed called with the widest compatible
    /// arguments.
    fn update_root_args(&mut self) {
        if self.do_hm {
            let mut visit = HashSet::new();
            let r = self.syn_find(self.root);
            self.widen_bases(false, r, &mut visit);
        }
        let SynKind::Root { body } = &self.syn(self.root).kind else {
            unreachable!()
        };
        let flow = self.syn(*body).flow.clone();
        if self.do_gcp && !flow.above_center() {
            let mut visit = HashSet::new();
            self.walk_root_funs(&flow, &mut visit);
        }
    }

    /// Base leaves in escaping function argument position widen to their
    /// base class.
    fn widen_bases(&mut self, funarg: bool, t: TvId, visit: &mut HashSet<TvId>) {
        if !visit.insert(t) {
            return;
        }
        if funarg && self.tv(t).is_base() {
            let f = self.tv(t).flow.clone().unwrap();
            self.tv_mut(t).flow = Some(f.widen());
        }
        let funarg = self.tv(t).is_fun();
        for key in self
            .tv(t)
            .args
            .as_ref()
            .map_or(Vec::new(), crate::tv::Args::keys)
        {
            if key == RET {
                continue; // Returns are not arguments
            }
            if let Some(c) = self.arg(t, &key) {
                self.widen_bases(funarg, c, visit);
            }
        }
    }

    fn walk_root_funs(&mut self, flow: &Ty, visit: &mut HashSet<Ty>) {
        if !visit.insert(flow.clone()) {
            return;
        }
        if let Ty::Fun(tfp) = flow {
            if tfp.fidxs.is_all() {
                return; // Every function; the effect is already total
            }
            for fidx in tfp.fidxs.iter() {
                if fidx == rill_types::NIL_IDX {
                    continue;
                }
                let Some(&lam) = self.funs.get(&fidx) else { continue };
                let n = self.lambda(lam).types.len();
                for i in 0..n {
                    let aflow = if self.do_hm {
                        let targ = self.lambda_targ(lam, i);
                        self.as_flow(targ)
                    } else {
                        Ty::Scalar
                    };
                    self.arg_meet(lam, i, &aflow);
                }
                if self.lambda(lam).prim.is_some() {
                    self.work.add(lam);
                }
            }
        }
        // Functions may hide inside escaping records.
        if let Ty::Ptr(p) = flow {
            if let Obj::Struct(s) = &*p.obj {
                for (_, t) in &s.flds {
                    self.walk_root_funs(t, visit);
                }
            }
        }
    }

    // ── Pass 4: error finalization ───────────────────────────────

    fn pass4(&mut self) {
        for i in 0..self.syns.len() {
            let s = SynId(i as u32);
            let me = self.syn_find(s);
            if let SynKind::Field { name, rec } = &self.syn(s).kind {
                let (name, rec) = (name.clone(), *rec);
                let trec = self.syn_find(rec);
                if !self.tv(me).is_err()
                    && self.tv(trec).is_err2()
                    && self.tv(trec).is_struct()
                    && self.tv(trec).is_open()
                {
                    // Struct-ness was speculative; report the miss.
                    self.tv_mut(trec).aliases = None;
                    let p = self.p(trec);
                    self.tv_mut(me).err = Some(format!("Missing field {} in {}", name, p));
                }
                let err = self.tv(me).err.clone();
                if let Some(err) = err {
                    let fldt2 = self.tv(trec).args.as_ref().and_then(|a| a.get(&name));
                    let fld_err = fldt2.map_or(true, |f| {
                        let f = self.debug_find(f);
                        self.tv(f).is_err()
                    });
                    if self.tv(trec).is_struct() && !self.tv(trec).is_open() && fld_err {
                        if fldt2.is_some() {
                            self.tv_mut(trec).args.as_mut().unwrap().remove(&name);
                        }
                        let p = self.p(trec);
                        self.tv_mut(me).err = Some(format!("{} in {}", err, p));
                    }
                }
                let nil_rec = self.tv(trec).is_nil()
                    || self
                        .tv(trec)
                        .aliases
                        .as_ref()
                        .map_or(false, |a| a.test(rill_types::NIL_IDX));
                if nil_rec {
                    self.tv_mut(me).err =
                        Some(format!("May be nil when loading field {}", name));
                }
            }
            // A nil anywhere in an error set spreads to every channel, so
            // later unifications cannot observe a nil appearing.
            if self.tv(me).is_err2() && self.tv(me).has_nil() {
                self.add_nil_tv(me);
            }
        }
    }

    // ── Results ──────────────────────────────────────────────────

    /// The root flow with every callee return expanded to a signature,
    /// bounded on cycles.
    pub fn flow_type(&mut self) -> Ty {
        let flow = self.syn(self.root).flow.clone();
        let mut visit = HashSet::new();
        self.add_sig(&flow, &mut visit)
    }

    fn add_sig(&mut self, t: &Ty, visit: &mut HashSet<Ty>) -> Ty {
        if !visit.insert(t.clone()) {
            return t.clone();
        }
        if let Ty::Fun(tfp) = t {
            let rez = if tfp.fidxs.is_all() {
                Ty::Scalar
            } else {
                let mut rez = Ty::XScalar;
                for fidx in tfp.fidxs.iter() {
                    if fidx == rill_types::NIL_IDX {
                        continue;
                    }
                    let Some(&lam) = self.funs.get(&fidx) else { continue };
                    let r = match self.lambda(lam).prim {
                        Some(p) => {
                            let types = self.lambda(lam).types.clone();
                            self.prim_apply(p, &types)
                        }
                        None => self.syn(self.lambda(lam).body.unwrap()).flow.clone(),
                    };
                    rez = rez.meet(&r);
                }
                rez
            };
            let rez = self.add_sig(&rez, visit);
            return Ty::Fun(rill_types::FunPtr {
                fidxs: tfp.fidxs.clone(),
                nargs: tfp.nargs,
                ret: Box::new(rez),
            });
        }
        t.clone()
    }

    /// Final memory: every allocation site's object, met into its alias
    /// class.
    pub fn final_mem(&mut self) -> TyMem {
        let mut mem = TyMem::xmem();
        for i in 0..self.syns.len() {
            let s = SynId(i as u32);
            let obj = match &self.syn(s).kind {
                SynKind::Struct { alias, .. } => {
                    let alias = *alias;
                    match &self.syn(s).flow {
                        Ty::Ptr(p) => Some((alias, (*p.obj).clone())),
                        _ => None,
                    }
                }
                SynKind::Lambda(l) if matches!(l.prim, Some(Prim::Pair | Prim::Triple)) => {
                    match &self.syn(s).flow {
                        Ty::Fun(f) => match &*f.ret {
                            Ty::Ptr(p) => {
                                let alias = if l.prim == Some(Prim::Pair) {
                                    self.pair_alias
                                } else {
                                    self.triple_alias
                                };
                                Some((alias, (*p.obj).clone()))
                            }
                            _ => None,
                        },
                        _ => None,
                    }
                }
                _ => None,
            };
            if let Some((alias, obj)) = obj {
                mem = mem.st_alias(alias, &obj, &self.world.alias_tree);
            }
        }
        mem
    }

    /// Collected error strings, in node order.
    pub fn errors(&mut self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for i in 0..self.syns.len() {
            let s = SynId(i as u32);
            let t = self.debug_find(self.syn(s).hmt);
            if self.tv(t).is_err() {
                let msg = match &self.tv(t).err {
                    Some(e) => e.clone(),
                    None => self.p(t),
                };
                if seen.insert(msg.clone()) {
                    out.push(msg);
                }
            }
        }
        out
    }
}

fn int_con(t: &Ty) -> Option<i64> {
    match t {
        Ty::Int(rill_types::Int::Con(c)) => Some(*c),
        _ => None,
    }
}

fn prim_params(n: usize) -> Vec<SmolStr> {
    ["x", "y", "z"][..n].iter().map(|s| SmolStr::new(s)).collect()
}
