//! Printing type-vars as schemes: fresh vars name `A`, `B`, ... then
//! `V{n}`; shared or cyclic sub-terms get a name on first sight and a bare
//! reference afterwards. Read-only: walks `debug_find` so printing never
//! canonicalizes.

use crate::infer::Infer;
use crate::syntax::{NIL_LBL, RET};
use crate::tv::TvId;
use rill_types::NIL_IDX;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

struct Printer<'a> {
    inf: &'a Infer,
    names: HashMap<TvId, String>,
    vcnt: usize,
    dups: HashSet<TvId>,
    visit: HashSet<TvId>,
}

impl Infer {
    /// Print the scheme rooted at a var.
    pub fn p(&self, t: TvId) -> String {
        let mut pr = Printer {
            inf: self,
            names: HashMap::new(),
            vcnt: 0,
            dups: HashSet::new(),
            visit: HashSet::new(),
        };
        let mut seen = HashSet::new();
        pr.get_dups(t, &mut seen);
        let mut out = String::new();
        pr.str(&mut out, t);
        out
    }
}

impl<'a> Printer<'a> {
    fn find(&self, t: TvId) -> TvId {
        self.inf.debug_find(t)
    }

    fn get_dups(&mut self, t: TvId, seen: &mut HashSet<TvId>) {
        let t = self.find(t);
        if !seen.insert(t) {
            self.dups.insert(t);
            return;
        }
        if let Some(args) = &self.inf.tv(t).args {
            for c in args.values() {
                self.get_dups(c, seen);
            }
        }
    }

    fn vname(&mut self, out: &mut String, t: TvId) {
        if let Some(n) = self.names.get(&t) {
            out.push_str(n);
            return;
        }
        let n = if self.vcnt < 26 {
            ((b'A' + self.vcnt as u8) as char).to_string()
        } else {
            format!("V{}", self.vcnt)
        };
        self.vcnt += 1;
        out.push_str(&n);
        self.names.insert(t, n);
    }

    fn str(&mut self, out: &mut String, t: TvId) {
        let t = self.find(t);
        let tv = self.inf.tv(t);

        if tv.is_leaf() && tv.err.is_none() {
            self.vname(out, t);
            return;
        }

        // Shared sub-terms name themselves once.
        if self.dups.contains(&t) {
            self.vname(out, t);
            if !self.visit.insert(t) {
                return;
            }
            out.push(':');
        }

        if tv.is_err() {
            if tv.is_err2() {
                out.push_str("Cannot unify ");
                let mut first = true;
                let mut sep = |out: &mut String, first: &mut bool| {
                    if !*first {
                        out.push_str(" and ");
                    }
                    *first = false;
                };
                if tv.is_fun() {
                    sep(out, &mut first);
                    self.str_fun(out, t);
                }
                if let Some(f) = &tv.flow {
                    sep(out, &mut first);
                    let _ = write!(out, "{}", f);
                }
                if let Some(f) = &tv.eflow {
                    sep(out, &mut first);
                    let _ = write!(out, "{}", f);
                }
                if tv.is_struct() {
                    sep(out, &mut first);
                    self.str_struct(out, t);
                }
                return;
            }
            out.push_str(tv.err.as_ref().unwrap());
            return;
        }

        if tv.is_base() {
            let _ = write!(out, "{}", tv.flow.as_ref().unwrap());
            return;
        }
        if tv.is_fun() {
            self.str_fun(out, t);
            return;
        }
        if tv.is_struct() {
            self.str_struct(out, t);
            return;
        }
        if tv.is_nil() {
            let inner = tv.args.as_ref().unwrap().get(NIL_LBL).unwrap();
            self.str(out, inner);
            out.push('?');
            return;
        }

        // A forwarded or otherwise structural var; print the parts.
        out.push_str("( ");
        if let Some(args) = &self.inf.tv(t).args {
            for k in args.keys() {
                let _ = write!(out, "{}:", k);
                self.str(out, args.get(&k).unwrap());
                out.push(' ');
            }
        }
        out.push(')');
    }

    fn str_fun(&mut self, out: &mut String, t: TvId) {
        out.push_str("{ ");
        let args = self.inf.tv(t).args.clone().unwrap_or_default();
        let mut keys = args.keys();
        keys.sort();
        for k in &keys {
            if !k.starts_with(' ') {
                continue; // Record fields on an error node
            }
            self.str(out, args.get(k).unwrap());
            out.push(' ');
        }
        out.push_str("-> ");
        match args.get(RET) {
            Some(r) => self.str(out, r),
            None => out.push('_'),
        }
        out.push_str(" }");
    }

    fn str_struct(&mut self, out: &mut String, t: TvId) {
        let tv = self.inf.tv(t);
        let nil = tv.aliases.as_ref().map_or(false, |a| a.test(NIL_IDX));
        let args = tv.args.clone().unwrap_or_default();
        let mut keys = args.keys();
        keys.sort();
        out.push_str("@{");
        let mut first = true;
        for k in &keys {
            if k.starts_with(' ') || k == RET {
                continue; // Function slots on an error node
            }
            if !first {
                out.push_str(", ");
            }
            let _ = write!(out, "{}=", k);
            self.str(out, args.get(k).unwrap());
            first = false;
        }
        if self.inf.tv(t).is_open() {
            if !first {
                out.push_str(", ");
            }
            out.push_str("...");
        }
        out.push('}');
        if nil {
            out.push('?');
        }
    }
}
