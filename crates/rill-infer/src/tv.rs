//! The type-variable graph: a shared mutable DAG (cycles allowed) with
//! in-place union-find, structural unification, fresh instantiation over
//! the non-generative environment, and errors carried as extra channels on
//! the node itself.
//!
//! Unification never fails. Incompatible channels end up co-resident on
//! the surviving node (`is_err2`), or displaced into `eflow`; either way
//! later unification keeps working and the error only grows.

use crate::infer::Infer;
use crate::syntax::{NgId, SynId, SynKind, FWD, NIL_LBL};
use crate::Mode;
use rill_types::{Bits, Ty, NIL_IDX};
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TvId(pub u32);

impl TvId {
    /// Placeholder before the pre-pass assigns the real var.
    pub const NONE: TvId = TvId(u32::MAX);
}

/// Ordered-insertion mapping from label to type-var.
#[derive(Clone, Default, Debug)]
pub struct Args(Vec<(SmolStr, TvId)>);

impl Args {
    pub fn get(&self, key: &str) -> Option<TvId> {
        self.0
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| *v)
    }

    pub fn insert(&mut self, key: &str, val: TvId) {
        match self.0.iter_mut().find(|(k, _)| k.as_str() == key) {
            Some((_, v)) => *v = val,
            None => self.0.push((SmolStr::new(key), val)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<TvId> {
        let i = self.0.iter().position(|(k, _)| k.as_str() == key)?;
        Some(self.0.remove(i).1)
    }

    pub fn keys(&self) -> Vec<SmolStr> {
        self.0.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<TvId> {
        self.0.iter().map(|(_, v)| *v).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A node of the graph. Which of `flow`/`fidxs`/`aliases` are present
/// classifies the node; two or more present is a unification error kept
/// alive for reporting.
#[derive(Clone, Default, Debug)]
pub struct Tv {
    pub args: Option<Args>,
    pub flow: Option<Ty>,
    /// Secondary base carried when two incompatible bases unified.
    pub eflow: Option<Ty>,
    pub fidxs: Option<Bits>,
    pub aliases: Option<Bits>,
    /// Struct-specific: more fields may still unify in.
    pub open: bool,
    pub err: Option<String>,
    /// Syntax nodes to revisit when this var changes.
    pub deps: Vec<SynId>,
}

impl Tv {
    pub fn is_leaf(&self) -> bool {
        self.args.is_none() && self.flow.is_none() && self.aliases.is_none()
    }

    pub fn forwarded(&self) -> Option<TvId> {
        self.args.as_ref()?.get(FWD)
    }

    pub fn is_nil(&self) -> bool {
        self.args.as_ref().map_or(false, |a| a.get(NIL_LBL).is_some())
    }

    pub fn is_base(&self) -> bool {
        self.flow.is_some()
    }

    pub fn is_fun(&self) -> bool {
        self.fidxs.is_some()
    }

    pub fn is_struct(&self) -> bool {
        self.aliases.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_err(&self) -> bool {
        self.err.is_some() || self.is_err2()
    }

    /// Two or more channels occupied: a "cannot unify" in-place error.
    pub fn is_err2(&self) -> bool {
        usize::from(self.flow.is_some())
            + usize::from(self.eflow.is_some())
            + usize::from(self.fidxs.is_some())
            + usize::from(self.aliases.is_some())
            >= 2
    }

    pub fn size(&self) -> usize {
        self.args.as_ref().map_or(0, Args::len)
    }

    /// Any portion allows for nil.
    pub fn has_nil(&self) -> bool {
        if self.flow.as_ref().map_or(false, Ty::must_nil) {
            return true;
        }
        if self.eflow.as_ref().map_or(false, Ty::must_nil) {
            return true;
        }
        if self.fidxs.as_ref().map_or(false, |f| f.test(NIL_IDX)) {
            return true;
        }
        if self.aliases.as_ref().map_or(false, |a| a.test(NIL_IDX)) {
            return true;
        }
        false
    }
}

/// Session maps for one outermost unify / fresh-unify call.
#[derive(Default)]
pub struct Sess {
    /// Cycle map: (left,right) pairs already being unified.
    dups: HashMap<(u32, u32), TvId>,
    /// Fresh map: original -> copy.
    vars: HashMap<TvId, TvId>,
}

impl Infer {
    // ── Allocation ───────────────────────────────────────────────

    pub(crate) fn new_tv(&mut self, tv: Tv) -> TvId {
        let id = TvId(self.tvs.len() as u32);
        self.tvs.push(tv);
        id
    }

    pub(crate) fn make_leaf(&mut self) -> TvId {
        self.new_tv(Tv::default())
    }

    pub(crate) fn make_base(&mut self, flow: Ty) -> TvId {
        debug_assert!(!matches!(flow, Ty::Fun(_)));
        self.new_tv(Tv {
            flow: Some(flow),
            ..Tv::default()
        })
    }

    pub(crate) fn make_nil(&mut self, inner: TvId) -> TvId {
        let mut args = Args::default();
        args.insert(NIL_LBL, inner);
        self.new_tv(Tv {
            args: Some(args),
            ..Tv::default()
        })
    }

    /// A function var; the last var is the return.
    pub(crate) fn make_fun(&mut self, fidxs: Bits, t2s: &[TvId]) -> TvId {
        let mut args = Args::default();
        for (i, t) in t2s[..t2s.len() - 1].iter().enumerate() {
            args.insert(crate::syntax::ARG_NAMES[i], *t);
        }
        args.insert(crate::syntax::RET, t2s[t2s.len() - 1]);
        self.new_tv(Tv {
            args: Some(args),
            fidxs: Some(fidxs),
            ..Tv::default()
        })
    }

    pub(crate) fn make_struct_tv(
        &mut self,
        aliases: Bits,
        flds: Option<Vec<(SmolStr, TvId)>>,
        open: bool,
    ) -> TvId {
        let args = flds.map(|fs| {
            let mut a = Args::default();
            for (k, v) in fs {
                a.insert(&k, v);
            }
            a
        });
        self.new_tv(Tv {
            args,
            aliases: Some(aliases),
            open,
            ..Tv::default()
        })
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn tv(&self, t: TvId) -> &Tv {
        &self.tvs[t.0 as usize]
    }

    pub(crate) fn tv_mut(&mut self, t: TvId) -> &mut Tv {
        &mut self.tvs[t.0 as usize]
    }

    /// Union-find lookup without compression or nil fixup; safe for
    /// asserts and printing.
    pub fn debug_find(&self, t: TvId) -> TvId {
        let mut u = t;
        while let Some(next) = self.tv(u).forwarded() {
            u = next;
        }
        u
    }

    /// Union-find find: compresses the forward chain, then dissolves a
    /// nilable-of-non-leaf in place.
    pub(crate) fn find(&mut self, t: TvId) -> TvId {
        let u = self.find0(t);
        if self.tv(u).is_nil() {
            self.find_nil(u)
        } else {
            u
        }
    }

    fn find0(&mut self, t: TvId) -> TvId {
        let u = self.debug_find(t);
        // Compress the chain
        let mut v = t;
        while let Some(next) = self.tv(v).forwarded() {
            if next != u {
                self.tv_mut(v).args.as_mut().unwrap().insert(FWD, u);
            }
            v = next;
        }
        u
    }

    /// Nil-of-leaf is canonical; nil of anything else folds nil into the
    /// child's channels and lifts its structure in place.
    fn find_nil(&mut self, u: TvId) -> TvId {
        let inner_raw = self.tv(u).args.as_ref().unwrap().get(NIL_LBL).unwrap();
        let inner = self.find(inner_raw);
        if self.tv(inner).is_leaf() {
            self.tv_mut(u).args.as_mut().unwrap().insert(NIL_LBL, inner);
            return u;
        }
        // Fold the non-leaf child in.
        self.tv_mut(u).args.as_mut().unwrap().remove(NIL_LBL);
        let n = self.tv(inner).clone();
        if let Some(f) = &n.flow {
            self.tv_mut(u).flow = Some(f.meet(&Ty::Nil));
        }
        if let Some(f) = &n.eflow {
            self.tv_mut(u).eflow = Some(f.meet(&Ty::Nil));
        }
        if let Some(f) = &n.fidxs {
            self.tv_mut(u).fidxs = Some(f.set(NIL_IDX));
        }
        if let Some(a) = &n.aliases {
            self.tv_mut(u).aliases = Some(a.set(NIL_IDX));
            self.tv_mut(u).open = n.open;
        }
        if n.is_nil() {
            let inner2 = n.args.as_ref().unwrap().get(NIL_LBL).unwrap();
            self.tv_mut(u).args.as_mut().unwrap().insert(NIL_LBL, inner2);
        } else if let Some(args) = &n.args {
            for (k, v) in args.keys().into_iter().zip(args.values()) {
                self.tv_mut(u).args.as_mut().unwrap().insert(&k, v);
            }
        }
        if self.tv(u).args.as_ref().map_or(false, Args::is_empty) {
            self.tv_mut(u).args = None;
        }
        // The child keeps living; its watchers move over.
        for dep in self.tv(inner).deps.clone() {
            self.push_update(u, dep);
        }
        u
    }

    /// Find on a child slot, memoizing the shortened path.
    pub(crate) fn arg(&mut self, t: TvId, key: &str) -> Option<TvId> {
        let child = self.tv(t).args.as_ref()?.get(key)?;
        let f = self.find(child);
        if f != child {
            if let Some(args) = self.tv_mut(t).args.as_mut() {
                args.insert(key, f);
            }
        }
        Some(f)
    }

    /// Find on a syntax node's type-var, memoizing.
    pub(crate) fn syn_find(&mut self, s: SynId) -> TvId {
        let t = self.syn(s).hmt;
        let f = self.find(t);
        if f != t {
            self.syn_mut(s).hmt = f;
        }
        f
    }

    // ── Union ────────────────────────────────────────────────────

    /// This becomes that; all the hard channel bits merge into `that`.
    fn union(&mut self, this: TvId, that: TvId, m: Mode) -> bool {
        debug_assert!(self.tv(this).forwarded().is_none());
        debug_assert!(self.tv(that).forwarded().is_none());
        if this == that {
            return false;
        }
        if m.test() {
            return true;
        }

        self.unify_base(this, that, Mode::Run);
        if let Some(f) = self.tv(this).fidxs.clone() {
            let merged = match &self.tv(that).fidxs {
                Some(g) => f.meet(g),
                None => f,
            };
            self.tv_mut(that).fidxs = Some(merged);
        }
        if let Some(a) = self.tv(this).aliases.clone() {
            let (merged, open) = match &self.tv(that).aliases {
                Some(b) => (a.meet(b), self.tv(that).open & self.tv(this).open),
                None => (a, self.tv(this).open),
            };
            self.tv_mut(that).aliases = Some(merged);
            self.tv_mut(that).open = open;
        }
        if let Some(args) = self.tv(this).args.clone() {
            if self.tv(that).args.is_none() {
                self.tv_mut(that).args = Some(args);
            } else {
                for (k, v) in args.keys().into_iter().zip(args.values()) {
                    self.tv_mut(that).args.as_mut().unwrap().insert(&k, v);
                }
            }
        }
        if let Some(e) = self.tv(this).err.clone() {
            if self.tv(that).err.is_none() {
                self.tv_mut(that).err = Some(e);
            }
        }

        self.add_deps_work(that, m);
        self.add_deps_work(this, m);
        self.union_hard(this, that)
    }

    /// Install the forward; `this` keeps nothing else.
    fn union_hard(&mut self, this: TvId, that: TvId) -> bool {
        debug_assert!(self.tv(this).forwarded().is_none());
        debug_assert!(self.tv(that).forwarded().is_none());
        // Watchers migrate before the forward goes in.
        for dep in self.tv(this).deps.clone() {
            self.push_update(that, dep);
        }
        let mut args = Args::default();
        args.insert(FWD, that);
        *self.tv_mut(this) = Tv {
            args: Some(args),
            ..Tv::default()
        };
        true
    }

    /// Merge base flows: one primary survives by a fixed priority, the
    /// loser lands in `eflow` so the error is never dropped.
    fn unify_base(&mut self, this: TvId, that: TvId, m: Mode) -> bool {
        fn pri(t: &Option<Ty>) -> i32 {
            match t {
                Some(Ty::Int(_)) => 3,
                Some(Ty::Flt(_)) => 2,
                Some(_) => 1,
                None => 0,
            }
        }
        let mut sf = self.tv(this).flow.clone();
        let mut hf = self.tv(that).flow.clone();
        if sf.is_none() && hf.is_none() {
            return false;
        }
        let se = self.tv(this).eflow.clone();
        let he = self.tv(that).eflow.clone();
        let of = hf.clone();
        let oe = he.clone();

        let mut nf = of.clone();
        let cmp = pri(&sf) - pri(&hf);
        if cmp == 0 {
            nf = Some(sf.as_ref().unwrap().meet(hf.as_ref().unwrap()));
            sf = se;
            hf = he;
        } else if cmp > 0 {
            nf = sf.clone();
            sf = se;
        } else {
            hf = he;
        }
        let mut ne = oe.clone();
        if sf.is_some() || hf.is_some() {
            let cmp2 = pri(&sf) - pri(&hf);
            ne = if cmp2 == 0 {
                Some(sf.as_ref().unwrap().meet(hf.as_ref().unwrap()))
            } else if cmp2 > 0 {
                sf
            } else {
                hf
            };
        }
        let progress = of != nf || oe != ne;
        if m.run() && progress {
            self.tv_mut(that).flow = nf;
            self.tv_mut(that).eflow = ne;
        }
        progress
    }

    // ── Unify ────────────────────────────────────────────────────

    /// Structural in-place unification; returns whether progress was (or
    /// would be) made.
    pub(crate) fn unify(&mut self, this: TvId, that: TvId, m: Mode) -> bool {
        if this == that {
            return false;
        }
        let a = self.find(this);
        let b = self.find(that);
        let mut sess = Sess::default();
        self.unify_rec(a, b, &mut sess, m)
    }

    fn unify_rec(&mut self, this: TvId, that: TvId, sess: &mut Sess, m: Mode) -> bool {
        debug_assert!(self.tv(this).forwarded().is_none());
        debug_assert!(self.tv(that).forwarded().is_none());
        if this == that {
            return false;
        }

        // Any leaf unifies immediately; smaller id survives a leaf pair.
        if self.tv(this).is_leaf() && self.tv(that).is_leaf() && this < that {
            return self.union(that, this, m);
        }
        if self.tv(this).is_leaf() {
            return self.union(this, that, m);
        }
        if self.tv(that).is_leaf() {
            return self.union(that, this, m);
        }

        // Two bases union by smaller id.
        if self.tv(this).is_base() && self.tv(that).is_base() {
            return if this < that {
                self.union(that, this, m)
            } else {
                self.union(this, that, m)
            };
        }

        // Nilable against non-nil.
        if self.tv(this).is_nil() && !self.tv(that).is_nil() {
            return self.unify_nil(that, this, m);
        }
        if self.tv(that).is_nil() && !self.tv(this).is_nil() {
            return self.unify_nil(this, that, m);
        }

        // Cycle check: seen this pair, the cycle is closed.
        let key = (this.0, that.0);
        if sess.dups.contains_key(&key) {
            return false;
        }
        sess.dups.insert(key, that);

        if m.test() {
            return true; // Will definitely make progress
        }

        let both_struct = self.tv(this).is_struct() && self.tv(that).is_struct();
        let both_fun = self.tv(this).is_fun() && self.tv(that).is_fun();
        if both_struct || both_fun {
            self.unify_flds(this, that, sess, m);
        }
        let a = self.find(this);
        let b = self.find(that);
        self.union(a, b, m)
    }

    /// Align and unify the argument maps of two same-shaped vars. Also
    /// called at top level by the not-nil primitive.
    pub(crate) fn unify_flds(
        &mut self,
        this: TvId,
        that: TvId,
        sess: &mut Sess,
        m: Mode,
    ) -> bool {
        let mut this = this;
        let mut that = that;
        let mut progress = false;
        for key in self.tv(this).args.as_ref().map_or(Vec::new(), Args::keys) {
            let Some(fthis) = self.arg(this, &key) else { continue };
            match self.arg(that, &key) {
                None => {
                    progress = true;
                    if self.tv(that).is_open() {
                        self.add_fld(that, &key, fthis, m);
                    } else {
                        self.del_fld(this, &key, m);
                    }
                }
                Some(fthat) => progress |= self.unify_rec(fthis, fthat, sess, m),
            }
            this = self.find(this);
            that = self.find(that);
        }
        // Mirror: fields only on the right.
        for key in self.tv(that).args.as_ref().map_or(Vec::new(), Args::keys) {
            if self.arg(this, &key).is_none() {
                progress = true;
                let fthat = self.arg(that, &key).unwrap();
                if self.tv(this).is_open() {
                    self.add_fld(this, &key, fthat, m);
                } else {
                    self.del_fld(that, &key, m);
                }
            }
        }
        debug_assert!(self.tv(that).forwarded().is_none());
        progress
    }

    /// Top-level field alignment, for the not-nil primitive's
    /// struct-vs-struct case.
    pub(crate) fn unify_flds_top(&mut self, this: TvId, that: TvId, m: Mode) -> bool {
        let mut sess = Sess::default();
        self.unify_flds(this, that, &mut sess, m)
    }

    pub(crate) fn add_fld(&mut self, this: TvId, id: &str, fld: TvId, m: Mode) -> bool {
        if m.test() {
            return true;
        }
        if self.tv(this).args.is_none() {
            self.tv_mut(this).args = Some(Args::default());
        }
        for dep in self.tv(this).deps.clone() {
            self.push_update(fld, dep);
        }
        self.tv_mut(this).args.as_mut().unwrap().insert(id, fld);
        self.add_deps_work(this, m);
        true
    }

    pub(crate) fn del_fld(&mut self, this: TvId, id: &str, m: Mode) -> bool {
        if m.test() {
            return true;
        }
        self.add_deps_work(this, m);
        let args = self.tv_mut(this).args.as_mut().unwrap();
        args.remove(id);
        if args.is_empty() {
            self.tv_mut(this).args = None;
        }
        true
    }

    /// `that` is the nilable; `this` (not nil) is copied, nil-stripped,
    /// and unified into the nilable's inner leaf; the nilable forwards to
    /// the union.
    fn unify_nil(&mut self, this: TvId, that: TvId, m: Mode) -> bool {
        debug_assert!(!self.tv(this).is_nil() && self.tv(that).is_nil());
        if m.test() {
            return true;
        }
        let leaf = self.arg(that, NIL_LBL).unwrap();
        debug_assert!(self.tv(leaf).is_leaf());
        self.add_deps_work(leaf, m);
        let mut copy = self.tv(this).clone();
        strip_nil(&mut copy);
        let copy = self.new_tv(copy);
        let p = self.union(leaf, copy, m);
        self.union_hard(this, that) | p
    }

    // ── Fresh instantiation ──────────────────────────────────────

    /// Unify a lazily made alpha-fresh copy of `this` with `that`. Leaves
    /// reachable from the non-generative environment are not copied.
    pub(crate) fn fresh_unify(
        &mut self,
        this: TvId,
        that: TvId,
        nongen: Option<NgId>,
        m: Mode,
    ) -> bool {
        let a = self.find(this);
        let b = self.find(that);
        let mut sess = Sess::default();
        let before = self.tvs.len();
        let progress = self.fresh_rec(a, b, nongen, &mut sess, m);
        debug_assert!(m.run() || before == self.tvs.len(), "allocated while testing");
        progress
    }

    fn fresh_rec(
        &mut self,
        this: TvId,
        that: TvId,
        nongen: Option<NgId>,
        sess: &mut Sess,
        m: Mode,
    ) -> bool {
        debug_assert!(self.tv(this).forwarded().is_none());
        debug_assert!(self.tv(that).forwarded().is_none());

        // Already mapped: the prior copy also unifies with that.
        if let Some(&prior) = sess.vars.get(&this) {
            let p = self.find(prior);
            return self.unify_rec(p, that, sess, m);
        }
        if self.cycle_equals(this, that) {
            sess.vars.insert(this, that);
            return false;
        }
        // The occurs check: captured by an enclosing binder, unify as-is.
        if self.nongen_in(this, nongen) {
            let p = self.unify_rec(this, that, sess, m);
            sess.vars.insert(this, that);
            return p;
        }
        if self.tv(this).is_leaf() {
            sess.vars.insert(this, that);
            return false;
        }
        if self.tv(that).is_leaf() {
            // RHS is a free var: union with a deep copy of LHS.
            if m.test() {
                return true;
            }
            let copy = self.fresh_copy(this, nongen, sess);
            let p = self.union(that, copy, m);
            sess.vars.insert(this, copy);
            return p;
        }

        // Nilable LHS against plain RHS: nil folds into RHS channels.
        if self.tv(this).is_nil() && !self.tv(that).is_nil() {
            let mut progress = false;
            let t = self.tv(that).clone();
            if let Some(f) = &t.flow {
                let mt = f.meet(&Ty::Nil);
                if &mt != f {
                    if m.test() {
                        return true;
                    }
                    progress = true;
                    self.tv_mut(that).flow = Some(mt);
                }
            }
            if let Some(f) = &t.eflow {
                let mt = f.meet(&Ty::Nil);
                if &mt != f {
                    if m.test() {
                        return true;
                    }
                    progress = true;
                    self.tv_mut(that).eflow = Some(mt);
                }
            }
            if let Some(f) = &t.fidxs {
                let mt = f.set(NIL_IDX);
                if &mt != f {
                    if m.test() {
                        return true;
                    }
                    progress = true;
                    self.tv_mut(that).fidxs = Some(mt);
                }
            }
            if let Some(a) = &t.aliases {
                let mt = a.set(NIL_IDX);
                if &mt != a {
                    if m.test() {
                        return true;
                    }
                    progress = true;
                    self.tv_mut(that).aliases = Some(mt);
                }
            }
            if progress {
                self.add_deps_work(that, m);
            }
            sess.vars.insert(this, that);
            return progress;
        }
        // Plain LHS against nilable RHS: fresh copy, strip nil, unify with
        // the inner leaf.
        if self.tv(that).is_nil() && !self.tv(this).is_nil() {
            if m.test() {
                return true;
            }
            let leaf = self.arg(that, NIL_LBL).unwrap();
            let copy_id = self.fresh_copy(this, nongen, sess);
            let mut copy = self.tv(copy_id).clone();
            strip_nil(&mut copy);
            *self.tv_mut(copy_id) = copy;
            self.unify_rec(copy_id, leaf, sess, m);
            sess.vars.insert(this, that);
            return true;
        }

        // Channel-wise progress.
        let mut progress = false;
        if self.tv(this).flow.is_some() {
            progress |= self.unify_base(this, that, m);
            if progress && m.test() {
                return true;
            }
        }
        if let Some(f) = self.tv(this).fidxs.clone() {
            let mt = match &self.tv(that).fidxs {
                Some(g) => f.meet(g),
                None => f,
            };
            if Some(&mt) != self.tv(that).fidxs.as_ref() {
                if m.test() {
                    return true;
                }
                progress = true;
                if !self.tv(that).is_fun() && self.tv(that).args.is_none() {
                    // Error case; bring over the function's shape too.
                    self.tv_mut(that).args = self.tv(this).args.clone();
                }
                self.tv_mut(that).fidxs = Some(mt);
            }
        }
        if let Some(a) = self.tv(this).aliases.clone() {
            let mt = match &self.tv(that).aliases {
                Some(b) => a.meet(b),
                None => a,
            };
            if Some(&mt) != self.tv(that).aliases.as_ref() {
                if m.test() {
                    return true;
                }
                progress = true;
                if !self.tv(that).is_struct() && self.tv(that).args.is_none() {
                    self.tv_mut(that).args = self.tv(this).args.clone();
                }
                self.tv_mut(that).aliases = Some(mt);
            }
        }
        if let Some(e) = self.tv(this).err.clone() {
            if self.tv(that).err.is_none() {
                if m.test() {
                    return true;
                }
                progress = true;
                self.tv_mut(that).err = Some(e);
            }
        }

        // Early map entry stops cycles.
        sess.vars.insert(this, that);
        if self.tv(this).args.is_none() && self.tv(that).args.is_none() {
            return progress;
        }

        // Structural recursion, lazy on the LHS.
        let mut that = that;
        let mut missing = self.tv(this).size() != self.tv(that).size();
        for key in self.tv(this).args.as_ref().map_or(Vec::new(), Args::keys) {
            let Some(lhs) = self.arg(this, &key) else { continue };
            match self.arg(that, &key) {
                None => {
                    missing = true;
                    let lhs_err = self.tv(lhs).is_err();
                    if self.tv(this).is_open() || self.tv(that).is_open() || lhs_err {
                        if m.test() {
                            return true;
                        }
                        let nrhs = self.fresh_copy(lhs, nongen, sess);
                        if !self.tv(that).is_open() {
                            self.tv_mut(nrhs).err = Some(format!("Missing field {}", key));
                        }
                        progress |= self.add_fld(that, &key, nrhs, m);
                    } // Else neither side is open; the field is not needed.
                }
                Some(rhs) => {
                    progress |= self.fresh_rec(lhs, rhs, nongen, sess, m);
                }
            }
            that = self.find(that);
            if progress && m.test() {
                return true;
            }
        }
        // Extra RHS fields: a closed LHS removes them.
        if missing && self.tv(this).is_struct() && !self.tv(this).is_open() {
            for key in self.tv(that).args.as_ref().map_or(Vec::new(), Args::keys) {
                if self.arg(this, &key).is_none() {
                    if m.test() {
                        return true;
                    }
                    progress |= self.del_fld(that, &key, m);
                }
            }
        }
        if self.tv(this).aliases.is_some() && self.tv(that).open && !self.tv(this).open {
            if m.test() {
                return true;
            }
            progress = true;
            self.tv_mut(that).open = false;
        }
        if progress {
            self.add_deps_work(that, m);
        }
        progress
    }

    /// Deep copy, reusing prior copies so cycles copy as cycles, and
    /// leaving non-generative leaves shared.
    fn fresh_copy(&mut self, this: TvId, nongen: Option<NgId>, sess: &mut Sess) -> TvId {
        debug_assert!(self.tv(this).forwarded().is_none());
        if let Some(&r) = sess.vars.get(&this) {
            return r;
        }
        if self.nongen_in(this, nongen) {
            sess.vars.insert(this, this);
            return this;
        }
        let mut tv = self.tv(this).clone();
        if tv.is_leaf() {
            tv.deps.clear();
        }
        let t = self.new_tv(tv);
        sess.vars.insert(this, t);
        for key in self.tv(this).args.as_ref().map_or(Vec::new(), Args::keys) {
            if let Some(c) = self.arg(this, &key) {
                let fc = self.fresh_copy(c, nongen, sess);
                self.tv_mut(t).args.as_mut().unwrap().insert(&key, fc);
            }
        }
        t
    }

    // ── Occurs check ─────────────────────────────────────────────

    /// Does `this` occur inside any enclosing binder's type?
    pub(crate) fn nongen_in(&mut self, this: TvId, nongen: Option<NgId>) -> bool {
        let mut visit = HashSet::new();
        let mut frame = nongen;
        while let Some(ng) = frame {
            let tv = self.ngs[ng.0 as usize].tv;
            let t = self.find(tv);
            self.ngs[ng.0 as usize].tv = t;
            if self.occurs_in(this, t, &mut visit) {
                return true;
            }
            frame = self.ngs[ng.0 as usize].par;
        }
        false
    }

    fn occurs_in(&mut self, this: TvId, x: TvId, visit: &mut HashSet<TvId>) -> bool {
        if this == x {
            return true;
        }
        if !visit.insert(x) {
            return false;
        }
        for key in self.tv(x).args.as_ref().map_or(Vec::new(), Args::keys) {
            if let Some(c) = self.arg(x, &key) {
                if self.occurs_in(this, c, visit) {
                    return true;
                }
            }
        }
        false
    }

    // ── Cycle-aware equality ─────────────────────────────────────

    pub(crate) fn cycle_equals(&mut self, this: TvId, that: TvId) -> bool {
        let mut cdups = HashMap::new();
        self.cycle_eq_rec(this, that, &mut cdups)
    }

    fn cycle_eq_rec(
        &mut self,
        this: TvId,
        that: TvId,
        cdups: &mut HashMap<TvId, TvId>,
    ) -> bool {
        debug_assert!(self.tv(this).forwarded().is_none());
        debug_assert!(self.tv(that).forwarded().is_none());
        if this == that {
            return true;
        }
        let (a, b) = (self.tv(this), self.tv(that));
        if a.flow != b.flow || a.eflow != b.eflow || a.fidxs != b.fidxs || a.aliases != b.aliases
        {
            return false;
        }
        if a.err.is_some() && a.err != b.err {
            return false;
        }
        if a.is_leaf() {
            return false; // Two leaves must be the same leaf
        }
        if a.size() != b.size() {
            return false;
        }
        if a.args.is_none() && b.args.is_none() {
            return true;
        }
        // A revisited pair stalls the decision: assume equal here and let a
        // disagreement surface elsewhere.
        if let Some(&tc) = cdups.get(&this) {
            return tc == that;
        }
        cdups.insert(this, that);
        for key in self.tv(this).args.as_ref().map_or(Vec::new(), Args::keys) {
            let Some(ca) = self.arg(this, &key) else { return false };
            let Some(cb) = self.arg(that, &key) else { return false };
            if !self.cycle_eq_rec(ca, cb, cdups) {
                return false;
            }
        }
        true
    }

    // ── HM type to conservative flow type ────────────────────────

    /// The widest flow type compatible with this var; used to model
    /// arguments arriving from unknown callers.
    pub(crate) fn as_flow(&mut self, this: TvId) -> Ty {
        let mut adups = HashMap::new();
        self.as_flow_rec(this, &mut adups)
    }

    fn as_flow_rec(&mut self, this: TvId, adups: &mut HashMap<TvId, Ty>) -> Ty {
        let t = self.find(this);
        let tv = self.tv(t);
        if tv.is_leaf() || tv.is_nil() {
            return Ty::Scalar;
        }
        if tv.is_base() {
            return tv.flow.clone().unwrap();
        }
        if tv.is_fun() {
            if let Some(v) = adups.get(&t) {
                return v.clone();
            }
            adups.insert(t, Ty::XScalar);
            let nargs = (self.tv(t).size() - 1) as u32;
            let ret = match self.arg(t, crate::syntax::RET) {
                Some(r) => self.as_flow_rec(r, adups),
                None => Ty::Scalar,
            };
            return Ty::fun(Bits::all(), nargs, ret);
        }
        if tv.is_struct() {
            let aliases = tv.aliases.clone().unwrap();
            if adups.contains_key(&t) {
                // A cycle widens to the unspecific object.
                return Ty::Ptr(rill_types::MemPtr {
                    aliases,
                    obj: Box::new(rill_types::Obj::Obj),
                });
            }
            adups.insert(t, Ty::Scalar);
            let open = self.tv(t).is_open();
            let mut flds = Vec::new();
            for key in self.tv(t).args.as_ref().map_or(Vec::new(), Args::keys) {
                if let Some(c) = self.arg(t, &key) {
                    flds.push((key.clone(), self.as_flow_rec(c, adups)));
                }
            }
            return Ty::Ptr(rill_types::MemPtr {
                aliases,
                obj: Box::new(rill_types::Obj::Struct(rill_types::StructObj {
                    any: false,
                    open,
                    flds: {
                        let mut f = flds;
                        f.sort_by(|a, b| a.0.cmp(&b.0));
                        f
                    },
                })),
            });
        }
        Ty::Scalar
    }

    // ── Deps ─────────────────────────────────────────────────────

    /// Register a syntax node to be revisited when this var (or anything
    /// reachable from it) changes.
    pub(crate) fn push_update(&mut self, this: TvId, syn: SynId) {
        let mut visit = HashSet::new();
        let t = self.debug_find(this);
        self.push_update_rec(t, syn, &mut visit);
    }

    fn push_update_rec(&mut self, this: TvId, syn: SynId, visit: &mut HashSet<TvId>) {
        if !visit.insert(this) {
            return;
        }
        if !self.tv(this).deps.contains(&syn) {
            self.tv_mut(this).deps.push(syn);
        }
        for c in self.tv(this).args.as_ref().map_or(Vec::new(), Args::values) {
            let c = self.debug_find(c);
            self.push_update_rec(c, syn, visit);
        }
    }

    /// Enqueue every watcher; a watcher that is a lambda's argument also
    /// re-enqueues that lambda's call sites.
    pub(crate) fn add_deps_work(&mut self, this: TvId, m: Mode) {
        if m.test() {
            return;
        }
        let mut visit = HashSet::new();
        self.add_deps_work_rec(this, &mut visit);
    }

    fn add_deps_work_rec(&mut self, this: TvId, visit: &mut HashSet<TvId>) {
        for dep in self.tv(this).deps.clone() {
            self.work.add(dep);
            if let Some(par) = self.syn(dep).par {
                if let SynKind::Lambda(lam) = &self.syn(par).kind {
                    let applys = lam.applys.clone();
                    self.work.add_all(applys);
                }
            }
        }
        if !visit.insert(this) {
            return;
        }
        for c in self.tv(this).args.as_ref().map_or(Vec::new(), Args::values) {
            let c = self.debug_find(c);
            self.add_deps_work_rec(c, visit);
        }
    }

    // ── Nil helpers ──────────────────────────────────────────────

    pub(crate) fn add_nil_tv(&mut self, this: TvId) {
        let tv = self.tv_mut(this);
        if let Some(f) = &tv.flow {
            tv.flow = Some(f.meet(&Ty::Nil));
        }
        if let Some(f) = &tv.eflow {
            tv.eflow = Some(f.meet(&Ty::Nil));
        }
        if let Some(f) = &tv.fidxs {
            tv.fidxs = Some(f.set(NIL_IDX));
        }
        if let Some(a) = &tv.aliases {
            tv.aliases = Some(a.set(NIL_IDX));
        }
    }
}

/// Strip the nil possibility from every channel of a detached node.
pub(crate) fn strip_nil(tv: &mut Tv) {
    if let Some(f) = &tv.flow {
        tv.flow = Some(f.remove_nil());
    }
    if let Some(f) = &tv.eflow {
        tv.eflow = Some(f.remove_nil());
    }
    if let Some(f) = &tv.fidxs {
        tv.fidxs = Some(f.clear(NIL_IDX));
    }
    if let Some(a) = &tv.aliases {
        tv.aliases = Some(a.clear(NIL_IDX));
    }
}
