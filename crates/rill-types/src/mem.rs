//! The memory lattice: alias class -> object type.
//!
//! Slot 0 is reserved (memory is never nil), slot 1 is the parent-of-all
//! default. A missing child inherits the nearest present ancestor in the
//! alias tree. Canonical form stores no duplicate of an ancestor and trims
//! trailing defaults.

use crate::bits::{Bits, Tree, ALL_IDX, NIL_IDX};
use crate::ty::{MemPtr, Obj};
use std::fmt;

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct TyMem {
    /// `slots[0]` is always `None`; `slots[1]` is always `Some`.
    slots: Vec<Option<Obj>>,
}

impl TyMem {
    /// Every alias filled with anything: the "don't care" memory.
    pub fn xmem() -> TyMem {
        TyMem {
            slots: vec![None, Some(Obj::XObj)],
        }
    }

    /// Every alias filled with something.
    pub fn mem() -> TyMem {
        TyMem {
            slots: vec![None, Some(Obj::Obj)],
        }
    }

    /// Canonicalize and build: defaults the root slot, collapses slots that
    /// duplicate an ancestor, trims the tail.
    pub fn make(mut slots: Vec<Option<Obj>>, tree: &Tree) -> TyMem {
        if slots.len() < 2 {
            slots.resize(2, None);
        }
        slots[0] = None;
        if slots[1].is_none() {
            slots[1] = Some(Obj::XObj);
        }
        for i in 2..slots.len() {
            if slots[i].is_none() {
                continue;
            }
            let mut par = tree.parent(i as u32);
            loop {
                if slots.get(par as usize).map_or(false, |s| s.is_some()) {
                    if slots[par as usize] == slots[i] {
                        slots[i] = None;
                    }
                    break;
                }
                if par == ALL_IDX {
                    break;
                }
                par = tree.parent(par);
            }
        }
        while slots.len() > 2 && slots.last().map_or(false, |s| s.is_none()) {
            slots.pop();
        }
        TyMem { slots }
    }

    /// The object at an alias; missing children inherit their parent.
    pub fn at(&self, mut alias: u32, tree: &Tree) -> &Obj {
        loop {
            if let Some(Some(obj)) = self.slots.get(alias as usize) {
                return obj;
            }
            debug_assert!(alias != NIL_IDX, "memory lookup through nil");
            alias = tree.parent(alias);
        }
    }

    pub fn meet(&self, that: &TyMem, tree: &Tree) -> TyMem {
        if self == that {
            return self.clone();
        }
        let len = self.slots.len().max(that.slots.len());
        let mut slots: Vec<Option<Obj>> = vec![None; len];
        for (i, slot) in slots.iter_mut().enumerate().skip(1) {
            let a = self.slots.get(i).map_or(&None, |s| s);
            let b = that.slots.get(i).map_or(&None, |s| s);
            if a.is_none() && b.is_none() && i != 1 {
                continue;
            }
            *slot = Some(self.at(i as u32, tree).meet(that.at(i as u32, tree)));
        }
        TyMem::make(slots, tree)
    }

    pub fn dual(&self) -> TyMem {
        TyMem {
            slots: self
                .slots
                .iter()
                .map(|s| s.as_ref().map(Obj::dual))
                .collect(),
        }
    }

    /// Meet (or join, above center) of everything loadable through a pointer.
    pub fn ld(&self, ptr: &MemPtr, tree: &Tree) -> Obj {
        let any = ptr.aliases.above_center();
        let mut obj = if any { Obj::Obj } else { Obj::XObj };
        for alias in ptr.aliases.iter() {
            if alias == NIL_IDX {
                continue; // nil on a join is ignored; failure is the caller's
            }
            let x = self.at(alias, tree);
            obj = if any { obj.join(x) } else { obj.meet(x) };
        }
        obj
    }

    /// Memory after a field store through a pointer.
    pub fn st(&self, ptr: &MemPtr, fld: &str, val: &crate::ty::Ty, tree: &Tree) -> TyMem {
        let mut slots = self.slots.clone();
        let max = ptr.aliases.max() as usize;
        if slots.len() <= max {
            slots.resize(max + 1, None);
        }
        for alias in ptr.aliases.iter() {
            if alias == NIL_IDX {
                continue;
            }
            slots[alias as usize] = Some(self.at(alias, tree).update(fld, val));
        }
        TyMem::make(slots, tree)
    }

    /// Install an allocation site's object, meeting with what is there.
    pub fn st_alias(&self, alias: u32, obj: &Obj, tree: &Tree) -> TyMem {
        let mut slots = self.slots.clone();
        if slots.len() <= alias as usize {
            slots.resize(alias as usize + 1, None);
        }
        let merged = self.at(alias, tree).meet(obj);
        slots[alias as usize] = Some(merged);
        TyMem::make(slots, tree)
    }

    pub fn above_center(&self) -> bool {
        self.slots[1].as_ref().map_or(false, Obj::above_center)
    }
}

impl fmt::Display for TyMem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.slots.len() == 2 {
            return match self.slots[1] {
                Some(Obj::XObj) => write!(f, "[~mem]"),
                Some(Obj::Obj) => write!(f, "[mem]"),
                _ => write!(f, "[..]"),
            };
        }
        write!(f, "[")?;
        for (i, slot) in self.slots.iter().enumerate().skip(1) {
            if let Some(obj) = slot {
                write!(f, "{}#:{},", i, obj)?;
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::{StructObj, Ty};

    fn tree_with(n: usize) -> Tree {
        let mut t = Tree::new();
        t.split(ALL_IDX); // 2: records
        t.split(ALL_IDX); // 3: strings
        for _ in 0..n {
            t.split(2);
        }
        t
    }

    fn rec(fld: &str, t: Ty) -> Obj {
        Obj::Struct(StructObj::make(vec![(fld.into(), t)], false))
    }

    #[test]
    fn missing_child_inherits_parent() {
        let tree = tree_with(2); // aliases 4, 5 under 2
        let m = TyMem::make(
            vec![None, Some(Obj::XObj), Some(rec("x", Ty::int(3)))],
            &tree,
        );
        assert_eq!(m.at(4, &tree), &rec("x", Ty::int(3)));
        assert_eq!(m.at(5, &tree), &rec("x", Ty::int(3)));
        assert_eq!(m.at(3, &tree), &Obj::XObj);
    }

    #[test]
    fn duplicate_of_parent_collapses() {
        let tree = tree_with(2);
        let obj = rec("x", Ty::int(3));
        let mut slots = vec![None, Some(Obj::XObj), Some(obj.clone())];
        slots.resize(5, None);
        slots[4] = Some(obj.clone());
        let m = TyMem::make(slots, &tree);
        // Slot 4 duplicated its parent 2 and must be gone; lookups still work.
        let m2 = TyMem::make(vec![None, Some(Obj::XObj), Some(obj.clone())], &tree);
        assert_eq!(m, m2);
        assert_eq!(m.at(4, &tree), &obj);
    }

    #[test]
    fn trailing_defaults_trim() {
        let tree = tree_with(2);
        let mut slots = vec![None, Some(Obj::XObj)];
        slots.resize(6, None);
        let m = TyMem::make(slots, &tree);
        assert_eq!(m, TyMem::xmem());
    }

    #[test]
    fn meet_is_elementwise_with_inheritance() {
        let tree = tree_with(2);
        let a = TyMem::xmem().st_alias(4, &rec("x", Ty::int(3)), &tree);
        let b = TyMem::xmem().st_alias(4, &rec("x", Ty::int(4)), &tree);
        let m = a.meet(&b, &tree);
        match m.at(4, &tree) {
            Obj::Struct(s) => assert_eq!(s.fld("x"), Some(&Ty::Int(crate::ty::Int::All(8)))),
            o => panic!("expected struct, got {:?}", o),
        }
    }

    #[test]
    fn ld_meets_over_aliases() {
        let tree = tree_with(2);
        let m = TyMem::xmem()
            .st_alias(4, &rec("x", Ty::int(3)), &tree)
            .st_alias(5, &rec("x", Ty::int(5)), &tree);
        let ptr = MemPtr {
            aliases: Bits::make0(4).set(5).set(NIL_IDX),
            obj: Box::new(Obj::Obj),
        };
        let got = m.ld(&ptr, &tree);
        match got {
            Obj::Struct(s) => assert_eq!(s.fld("x"), Some(&Ty::Int(crate::ty::Int::All(8)))),
            o => panic!("expected struct, got {:?}", o),
        }
    }

    #[test]
    fn st_updates_through_pointer() {
        let tree = tree_with(1);
        let m = TyMem::xmem().st_alias(4, &rec("x", Ty::int(3)), &tree);
        let ptr = MemPtr {
            aliases: Bits::make0(4),
            obj: Box::new(Obj::Obj),
        };
        let m2 = m.st(&ptr, "x", &Ty::int(4), &tree);
        match m2.at(4, &tree) {
            Obj::Struct(s) => assert_eq!(s.fld("x"), Some(&Ty::Int(crate::ty::Int::All(8)))),
            o => panic!("expected struct, got {:?}", o),
        }
    }
}
