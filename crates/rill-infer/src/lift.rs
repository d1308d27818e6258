//! The HM-to-GCP lift at apply sites.
//!
//! Call-site flow results meet over every caller and decay toward Scalar;
//! the HM type knows how polymorphic variables split back apart per site.
//! Walk each actual's HM type and flow type in parallel to map leaf vars
//! to flows, then walk the result the same way and `join` matching leaves
//! back in. The lift may only tighten, and must be monotone over the run;
//! `record_lift` audits both.

use crate::infer::Infer;
use crate::syntax::{SynId, NIL_LBL, RET};
use crate::tv::{Args, TvId};
use rill_types::{FunPtr, MemPtr, Obj, StructObj, Ty};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub(crate) struct LiftCtx {
    /// Leaf/base var -> flow seen on the inputs.
    t2map: HashMap<TvId, Ty>,
    /// (var, flow) pairs already walked on the way in.
    wdups_in: HashSet<(TvId, Ty)>,
    /// Struct vars already walked on the way out.
    wdups_out: HashSet<TvId>,
    /// Function indices on the output walk, guarding recursive returns.
    wbs: HashSet<u32>,
}

impl Infer {
    /// Attempt to tighten an apply's return `ret` using the HM result var
    /// `rezt2` and the actual arguments.
    pub(crate) fn hm_apply_lift(
        &mut self,
        args: &[SynId],
        rezt2: TvId,
        ret: &Ty,
        apply: SynId,
    ) -> Ty {
        let mut ctx = LiftCtx::default();
        for &a in args {
            ctx.wdups_in.clear();
            let t2 = self.syn_find(a);
            let flow = self.syn(a).flow.clone();
            self.walk_types_in(t2, &flow, &mut ctx);
        }
        ctx.wdups_out.clear();
        ctx.wbs.clear();
        let lift = self.walk_types_out(rezt2, ret, apply, &mut ctx);
        if &lift == ret {
            ret.clone()
        } else {
            ret.join(&lift)
        }
    }

    /// Walk an input var and its flow in parallel, recording the flow seen
    /// at every leaf and base. Repeats combine: `join` while running,
    /// `meet` once frozen.
    fn walk_types_in(&mut self, t2: TvId, t: &Ty, ctx: &mut LiftCtx) {
        let t2 = self.find(t2);
        if !ctx.wdups_in.insert((t2, t.clone())) {
            return;
        }
        let tv = self.tv(t2);
        if tv.is_leaf() || tv.is_base() {
            let freeze = self.freeze;
            ctx.t2map
                .entry(t2)
                .and_modify(|old| {
                    *old = if freeze { old.meet(t) } else { old.join(t) };
                })
                .or_insert_with(|| t.clone());
            return;
        }
        if tv.is_nil() {
            if let Some(inner) = self.arg(t2, NIL_LBL) {
                self.walk_types_in(inner, &t.join(&Ty::NScalr), ctx);
            }
            return;
        }
        if tv.is_fun() {
            // Walk returns, not arguments.
            let fret = match t {
                Ty::Fun(f) => (*f.ret).clone(),
                _ => t.oob(),
            };
            if let Some(r) = self.arg(t2, RET) {
                self.walk_types_in(r, &fret, ctx);
            }
            return;
        }
        if tv.is_struct() {
            for key in self.tv(t2).args.as_ref().map_or(Vec::new(), Args::keys) {
                if let Some(c) = self.arg(t2, &key) {
                    let ft = at_fld(t, &key);
                    self.walk_types_in(c, &ft, ctx);
                }
            }
        }
    }

    /// Walk the output var and flow in parallel, replacing leaves with
    /// their mapped input flows where that tightens.
    fn walk_types_out(&mut self, t2: TvId, t: &Ty, apply: SynId, ctx: &mut LiftCtx) -> Ty {
        let t2 = self.find(t2);
        if *t == Ty::XScalar || *t == Ty::XNScalr {
            return t.clone(); // Cannot lift any more
        }
        if self.tv(t2).is_err() {
            return self.record_lift(apply, t2, t, Ty::Scalar);
        }

        if self.tv(t2).is_leaf() {
            if let Some(rez) = self.lift_leaf(apply, t2, t, true, ctx) {
                return rez;
            }
            // Post-freeze: exact leaf hits only.
            let xt = match ctx.t2map.get(&t2) {
                None => return t.clone(),
                Some(xt) => xt.clone(),
            };
            if &xt == t {
                return t.clone();
            }
            self.push_update(t2, apply); // The lift depends on this leaf
            return self.record_lift(apply, t2, t, xt);
        }

        if self.tv(t2).is_base() {
            return match self.lift_leaf(apply, t2, t, false, ctx) {
                Some(rez) => rez,
                None => t.clone(),
            };
        }

        if self.tv(t2).is_nil() {
            let inner = self.arg(t2, NIL_LBL).unwrap();
            let tnil = self.walk_types_out(inner, &t.remove_nil(), apply, ctx);
            let rez = tnil.meet(&Ty::Nil);
            return self.record_lift(apply, t2, t, rez);
        }

        if self.tv(t2).is_fun() {
            let t = if *t == Ty::Scalar || *t == Ty::All {
                Ty::generic_fun()
            } else {
                t.clone()
            };
            let Ty::Fun(tfp) = &t else {
                return t.clone(); // Flow lost function shape; no lift
            };
            let fidxs: Vec<u32> = tfp.fidxs.iter().collect();
            if fidxs.iter().any(|f| ctx.wbs.contains(f)) {
                return t.clone(); // Recursive function return
            }
            ctx.wbs.extend(fidxs.iter().copied());
            let tret = (*tfp.ret).clone();
            let trlift = match self.arg(t2, RET) {
                Some(r) => self.walk_types_out(r, &tret, apply, ctx),
                None => tret,
            };
            let rez = Ty::Fun(FunPtr {
                fidxs: tfp.fidxs.clone(),
                nargs: tfp.nargs,
                ret: Box::new(trlift),
            });
            for f in &fidxs {
                ctx.wbs.remove(f);
            }
            return self.record_lift(apply, t2, &t, rez);
        }

        if self.tv(t2).is_struct() {
            let Ty::Ptr(tmp) = t else {
                let rez = if t.must_nil() { Ty::Scalar } else { Ty::NScalr };
                return self.record_lift(apply, t2, t, rez);
            };
            let Obj::Struct(ts0) = &*tmp.obj else {
                return t.clone(); // Not a record object; no lift
            };
            if ts0.any {
                return self.record_lift(apply, t2, t, Ty::Scalar);
            }
            if !ctx.wdups_out.insert(t2) {
                return t.clone(); // Recursive struct, stop cycles
            }
            let ts0 = ts0.clone();
            let aliases = tmp.aliases.clone();
            // Fields in both walk recursively; solo GCP fields pass
            // through while the HM side is still open; solo HM fields
            // wait for GCP to catch up.
            let mut flds = Vec::new();
            for key in self.tv(t2).args.as_ref().map_or(Vec::new(), Args::keys) {
                if let Some(f0) = ts0.fld(&key) {
                    let f0 = f0.clone();
                    let c = self.arg(t2, &key).unwrap();
                    flds.push((key.clone(), self.walk_types_out(c, &f0, apply, ctx)));
                }
            }
            if self.tv(t2).is_open() && !self.freeze {
                for (n, ft) in &ts0.flds {
                    if self.tv(t2).args.as_ref().and_then(|a| a.get(n)).is_none() {
                        flds.push((n.clone(), ft.clone()));
                    }
                }
            }
            flds.sort_by(|a, b| a.0.cmp(&b.0));
            let rez = Ty::Ptr(MemPtr {
                aliases,
                obj: Box::new(Obj::Struct(StructObj {
                    any: false,
                    open: ts0.open,
                    flds,
                })),
            });
            return self.record_lift(apply, t2, t, rez);
        }

        t.clone()
    }

    /// Pre-freeze leaf handling: a free output slot can be lifted to the
    /// join of every mapped input leaf (and base, for a leaf output).
    fn lift_leaf(
        &mut self,
        apply: SynId,
        t2: TvId,
        t: &Ty,
        with_bases: bool,
        ctx: &mut LiftCtx,
    ) -> Option<Ty> {
        if self.freeze {
            return None;
        }
        let mut keys = Vec::new();
        let mut jt = Ty::Scalar;
        for (&k, v) in &ctx.t2map {
            let tv = self.tv(k);
            if tv.is_leaf() || (with_bases && tv.is_base()) {
                jt = jt.join(v);
                keys.push(k);
            }
        }
        if jt == Ty::Scalar || t.isa(&jt) {
            return Some(jt); // No lift
        }
        // The lift leans on these staying leaves.
        for k in keys {
            self.push_update(k, apply);
        }
        Some(self.record_lift(apply, t2, t, jt))
    }

    /// Returns the lifted type, auditing that the lift only tightens and
    /// that stronger inputs keep producing stronger outputs.
    fn record_lift(&mut self, apply: SynId, t2: TvId, t: &Ty, rez: Ty) -> Ty {
        #[cfg(debug_assertions)]
        {
            let tv = self.tv(t2);
            if !t.isa(&rez) && (tv.is_leaf() || tv.is_base()) {
                let entries = self.lifts.entry((apply, t2)).or_default();
                for (t0, r0) in entries.iter() {
                    debug_assert!(
                        !t0.isa(t) || r0.isa(&rez),
                        "non-monotone lift at {:?}: {} -> {} after {} -> {}",
                        apply,
                        t,
                        rez,
                        t0,
                        r0,
                    );
                }
                entries.push((t.clone(), rez.clone()));
            }
        }
        let _ = (apply, t2);
        rez
    }
}

fn at_fld(t: &Ty, id: &str) -> Ty {
    let Ty::Ptr(tmp) = t else { return t.oob() };
    let Obj::Struct(ts) = &*tmp.obj else { return t.oob() };
    match ts.fld(id) {
        Some(f) => f.clone(),
        None => {
            if ts.any {
                Ty::XScalar
            } else {
                Ty::Scalar
            }
        }
    }
}
