//! The flow-type lattice for constant propagation.
//!
//! Flow types are immutable values with structural equality; `meet` moves
//! strictly down the lattice, `join` is `dual . meet . dual`. Constants sit
//! on the centerline: `5` meets `int64` to `int64`, and the duals (`~int64`)
//! sit above. `Scalar`/`~Scalar` bound the world of all values, with
//! `nScalar` the not-nil variant.
//!
//! Recursive struct types are kept finite: `approx` widens a pointer that
//! re-enters its own alias class past the cutoff to the unspecific object.

use crate::bits::{Bits, ALL_IDX, NIL_IDX};
use smol_str::SmolStr;
use std::fmt;

/// Precision bound for self-referential allocations.
pub const CUTOFF: u32 = 1;

/// `f64` with bitwise equality and hashing, so flow types can be map keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct F64(u64);

impl F64 {
    pub fn new(f: f64) -> F64 {
        F64(f.to_bits())
    }
    pub fn get(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl fmt::Debug for F64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Int {
    /// Above center: any integer that fits the width.
    Any(u8),
    /// A centerline constant.
    Con(i64),
    /// Below center: all integers of the width.
    All(u8),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Flt {
    Any(u8),
    Con(F64),
    All(u8),
}

/// String objects: the sub-lattice under the string alias class.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Str {
    Any,
    Con(SmolStr),
    All,
}

/// A record object: labeled fields, optionally open to more.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct StructObj {
    pub any: bool,
    pub open: bool,
    /// Sorted by label.
    pub flds: Vec<(SmolStr, Ty)>,
}

/// What an alias class may hold.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Obj {
    /// Above everything storable.
    XObj,
    Str(Str),
    Struct(StructObj),
    /// Below everything storable.
    Obj,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FunPtr {
    pub fidxs: Bits,
    pub nargs: u32,
    pub ret: Box<Ty>,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MemPtr {
    pub aliases: Bits,
    pub obj: Box<Obj>,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Ty {
    Any,
    All,
    XScalar,
    Scalar,
    XNScalr,
    NScalr,
    XNil,
    Nil,
    Int(Int),
    Flt(Flt),
    Fun(FunPtr),
    Ptr(MemPtr),
}

fn int_width(c: i64) -> u8 {
    if c == 0 || c == 1 {
        1
    } else if i8::try_from(c).is_ok() {
        8
    } else if i16::try_from(c).is_ok() {
        16
    } else if i32::try_from(c).is_ok() {
        32
    } else {
        64
    }
}

fn flt_width(f: f64) -> u8 {
    if (f as f32) as f64 == f {
        32
    } else {
        64
    }
}

impl Int {
    fn meet(self, that: Int) -> Int {
        use Int::*;
        match (self, that) {
            (All(a), All(b)) => All(a.max(b)),
            (Any(a), Any(b)) => Any(a.min(b)),
            (Con(a), Con(b)) => {
                if a == b {
                    Con(a)
                } else {
                    All(int_width(a).max(int_width(b)))
                }
            }
            (Con(c), All(w)) | (All(w), Con(c)) => All(w.max(int_width(c))),
            (Con(c), Any(w)) | (Any(w), Con(c)) => {
                if int_width(c) <= w {
                    Con(c)
                } else {
                    All(int_width(c))
                }
            }
            (Any(a), All(b)) | (All(b), Any(a)) => All(a.max(b)),
        }
    }

    fn dual(self) -> Int {
        match self {
            Int::Any(w) => Int::All(w),
            Int::Con(c) => Int::Con(c),
            Int::All(w) => Int::Any(w),
        }
    }

    fn must_nil(self) -> bool {
        matches!(self, Int::All(_) | Int::Con(0))
    }
}

impl Flt {
    fn meet(self, that: Flt) -> Flt {
        use Flt::*;
        match (self, that) {
            (All(a), All(b)) => All(a.max(b)),
            (Any(a), Any(b)) => Any(a.min(b)),
            (Con(a), Con(b)) => {
                if a == b {
                    Con(a)
                } else {
                    All(flt_width(a.get()).max(flt_width(b.get())))
                }
            }
            (Con(c), All(w)) | (All(w), Con(c)) => All(w.max(flt_width(c.get()))),
            (Con(c), Any(w)) | (Any(w), Con(c)) => {
                if flt_width(c.get()) <= w {
                    Con(c)
                } else {
                    All(flt_width(c.get()))
                }
            }
            (Any(a), All(b)) | (All(b), Any(a)) => All(a.max(b)),
        }
    }

    fn dual(self) -> Flt {
        match self {
            Flt::Any(w) => Flt::All(w),
            Flt::Con(c) => Flt::Con(c),
            Flt::All(w) => Flt::Any(w),
        }
    }

    fn must_nil(self) -> bool {
        match self {
            Flt::All(_) => true,
            Flt::Con(c) => c.get() == 0.0,
            Flt::Any(_) => false,
        }
    }
}

impl Str {
    fn meet(&self, that: &Str) -> Str {
        use Str::*;
        match (self, that) {
            (All, _) | (_, All) => All,
            (Any, s) | (s, Any) => s.clone(),
            (Con(a), Con(b)) => {
                if a == b {
                    Con(a.clone())
                } else {
                    All
                }
            }
        }
    }

    fn dual(&self) -> Str {
        match self {
            Str::Any => Str::All,
            Str::Con(c) => Str::Con(c.clone()),
            Str::All => Str::Any,
        }
    }
}

impl StructObj {
    pub fn make(mut flds: Vec<(SmolStr, Ty)>, open: bool) -> StructObj {
        flds.sort_by(|a, b| a.0.cmp(&b.0));
        StructObj {
            any: false,
            open,
            flds,
        }
    }

    pub fn fld(&self, name: &str) -> Option<&Ty> {
        self.flds
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, t)| t)
    }

    fn dual(&self) -> StructObj {
        StructObj {
            any: !self.any,
            open: self.open,
            flds: self
                .flds
                .iter()
                .map(|(n, t)| (n.clone(), t.dual()))
                .collect(),
        }
    }

    /// Meet of two below-center records: common fields meet; a field one
    /// side is missing widens away unless the other side is open.
    fn meet_low(&self, that: &StructObj) -> StructObj {
        let mut flds = Vec::new();
        for (n, t) in &self.flds {
            match that.fld(n) {
                Some(t2) => flds.push((n.clone(), t.meet(t2))),
                None if that.open => flds.push((n.clone(), t.clone())),
                None => {}
            }
        }
        for (n, t) in &that.flds {
            if self.fld(n).is_none() && self.open {
                flds.push((n.clone(), t.clone()));
            }
        }
        StructObj::make(flds, self.open && that.open)
    }

    fn meet(&self, that: &StructObj) -> StructObj {
        match (self.any, that.any) {
            (false, false) => self.meet_low(that),
            (true, true) => self.dual().meet_low(&that.dual()).dual(),
            (true, false) => that.clone(),
            (false, true) => self.clone(),
        }
    }

    fn above_center(&self) -> bool {
        self.any
    }
}

impl Obj {
    pub fn meet(&self, that: &Obj) -> Obj {
        match (self, that) {
            (Obj::Obj, _) | (_, Obj::Obj) => Obj::Obj,
            (Obj::XObj, o) | (o, Obj::XObj) => o.clone(),
            (Obj::Str(a), Obj::Str(b)) => Obj::Str(a.meet(b)),
            (Obj::Struct(a), Obj::Struct(b)) => Obj::Struct(a.meet(b)),
            (Obj::Str(_), Obj::Struct(_)) | (Obj::Struct(_), Obj::Str(_)) => Obj::Obj,
        }
    }

    pub fn join(&self, that: &Obj) -> Obj {
        self.dual().meet(&that.dual()).dual()
    }

    pub fn dual(&self) -> Obj {
        match self {
            Obj::XObj => Obj::Obj,
            Obj::Obj => Obj::XObj,
            Obj::Str(s) => Obj::Str(s.dual()),
            Obj::Struct(s) => Obj::Struct(s.dual()),
        }
    }

    pub fn isa(&self, that: &Obj) -> bool {
        &self.meet(that) == that
    }

    pub fn above_center(&self) -> bool {
        match self {
            Obj::XObj => true,
            Obj::Obj => false,
            Obj::Str(s) => matches!(s, Str::Any),
            Obj::Struct(s) => s.above_center(),
        }
    }

    /// Widen pointers in this object's fields that re-enter the given alias
    /// class past `cutoff` levels, before the object is installed at an
    /// allocation site.
    pub fn approx(&self, aliases: &Bits, cutoff: u32) -> Obj {
        match self {
            Obj::Struct(s) => Obj::Struct(StructObj {
                any: s.any,
                open: s.open,
                flds: s
                    .flds
                    .iter()
                    .map(|(n, t)| (n.clone(), t.approx_rec(aliases, 0, cutoff)))
                    .collect(),
            }),
            o => o.clone(),
        }
    }

    /// Monotone field update, for memory stores.
    pub fn update(&self, fld: &str, val: &Ty) -> Obj {
        match self {
            Obj::Struct(s) => {
                let mut s2 = s.clone();
                match s2.flds.iter_mut().find(|(n, _)| n.as_str() == fld) {
                    Some((_, t)) => *t = t.meet(val),
                    None => {
                        s2.flds.push((SmolStr::new(fld), val.clone()));
                        s2.flds.sort_by(|a, b| a.0.cmp(&b.0));
                    }
                }
                Obj::Struct(s2)
            }
            _ => self.clone(),
        }
    }
}

impl Ty {
    // ── Constructors ─────────────────────────────────────────────

    pub fn int(c: i64) -> Ty {
        Ty::Int(Int::Con(c))
    }

    pub fn flt(f: f64) -> Ty {
        Ty::Flt(Flt::Con(F64::new(f)))
    }

    pub const INT64: Ty = Ty::Int(Int::All(64));
    pub const BOOL: Ty = Ty::Int(Int::All(1));
    pub const TRUE: Ty = Ty::Int(Int::Con(1));
    pub const FALSE: Ty = Ty::Int(Int::Con(0));
    pub const FLT64: Ty = Ty::Flt(Flt::All(64));

    /// The alias index all strings share.
    pub const STR_ALIAS: u32 = 3;
    /// The parent alias index of all records.
    pub const REC_ALIAS: u32 = 2;

    pub fn str_con(s: &str) -> Ty {
        Ty::Ptr(MemPtr {
            aliases: Bits::make0(Ty::STR_ALIAS),
            obj: Box::new(Obj::Str(Str::Con(SmolStr::new(s)))),
        })
    }

    pub fn strptr() -> Ty {
        Ty::Ptr(MemPtr {
            aliases: Bits::make0(Ty::STR_ALIAS),
            obj: Box::new(Obj::Str(Str::All)),
        })
    }

    pub fn ptr(alias: u32, obj: Obj) -> Ty {
        Ty::Ptr(MemPtr {
            aliases: Bits::make0(alias),
            obj: Box::new(obj),
        })
    }

    pub fn fun(fidxs: Bits, nargs: u32, ret: Ty) -> Ty {
        Ty::Fun(FunPtr {
            fidxs,
            nargs,
            ret: Box::new(ret),
        })
    }

    /// The function pointer naming every function.
    pub fn generic_fun() -> Ty {
        Ty::fun(Bits::all(), 1, Ty::Scalar)
    }

    // ── Lattice ──────────────────────────────────────────────────

    pub fn meet(&self, that: &Ty) -> Ty {
        use Ty::*;
        if self == that {
            return self.clone();
        }
        match (self, that) {
            (All, _) | (_, All) => All,
            (Any, t) | (t, Any) => t.clone(),
            (Scalar, _) | (_, Scalar) => Scalar,
            (XScalar, t) | (t, XScalar) => t.clone(),

            (NScalr, XNil) | (XNil, NScalr) => Scalar,
            (NScalr, t) | (t, NScalr) => {
                if t.must_nil() {
                    Scalar
                } else {
                    NScalr
                }
            }
            (XNScalr, XNil) | (XNil, XNScalr) => Scalar,
            (XNScalr, Nil) | (Nil, XNScalr) => Scalar,
            // Above center the not-nil constraint narrows the other side;
            // below center the other side already decides.
            (XNScalr, t) | (t, XNScalr) => {
                if t.above_center() {
                    t.remove_nil()
                } else {
                    t.clone()
                }
            }

            (Nil, XNil) | (XNil, Nil) => Nil,
            (Nil, t) | (t, Nil) => {
                if t.above_center() {
                    Nil
                } else if t.must_nil() {
                    t.clone()
                } else {
                    t.add_nil()
                }
            }
            (XNil, t) | (t, XNil) => {
                if t.above_center() {
                    Nil
                } else if t.must_nil() {
                    t.clone()
                } else {
                    t.add_nil()
                }
            }

            (Int(a), Int(b)) => Int(a.meet(*b)),
            (Flt(a), Flt(b)) => Flt(a.meet(*b)),
            (Fun(a), Fun(b)) => Fun(FunPtr {
                fidxs: a.fidxs.meet(&b.fidxs),
                nargs: if a.nargs == b.nargs {
                    a.nargs
                } else {
                    a.nargs.max(b.nargs)
                },
                ret: Box::new(a.ret.meet(&b.ret)),
            }),
            (Ptr(a), Ptr(b)) => Ptr(MemPtr {
                aliases: a.aliases.meet(&b.aliases),
                obj: Box::new(a.obj.meet(&b.obj)),
            }),

            // Unrelated value classes fall out of them all.
            (a, b) => {
                if a.must_nil() || b.must_nil() {
                    Scalar
                } else {
                    NScalr
                }
            }
        }
    }

    pub fn join(&self, that: &Ty) -> Ty {
        self.dual().meet(&that.dual()).dual()
    }

    pub fn dual(&self) -> Ty {
        use Ty::*;
        match self {
            Any => All,
            All => Any,
            XScalar => Scalar,
            Scalar => XScalar,
            XNScalr => NScalr,
            NScalr => XNScalr,
            XNil => Nil,
            Nil => XNil,
            Int(i) => Int(i.dual()),
            Flt(f) => Flt(f.dual()),
            Fun(f) => Fun(FunPtr {
                fidxs: f.fidxs.dual(),
                nargs: f.nargs,
                ret: Box::new(f.ret.dual()),
            }),
            Ptr(p) => Ptr(MemPtr {
                aliases: p.aliases.dual(),
                obj: Box::new(p.obj.dual()),
            }),
        }
    }

    /// True if `self` falls to `that` under `meet`.
    pub fn isa(&self, that: &Ty) -> bool {
        &self.meet(that) == that
    }

    pub fn above_center(&self) -> bool {
        use Ty::*;
        match self {
            Any | XScalar | XNScalr | XNil => true,
            Int(i) => matches!(i, self::Int::Any(_)),
            Flt(f) => matches!(f, self::Flt::Any(_)),
            Fun(f) => f.fidxs.above_center(),
            Ptr(p) => p.aliases.above_center(),
            _ => false,
        }
    }

    /// Definitely includes nil. Only meaningful below center.
    pub fn must_nil(&self) -> bool {
        use Ty::*;
        match self {
            All | Scalar | Nil => true,
            Int(i) => i.must_nil(),
            Flt(f) => f.must_nil(),
            Fun(f) => !f.fidxs.above_center() && f.fidxs.test(NIL_IDX),
            Ptr(p) => !p.aliases.above_center() && p.aliases.test(NIL_IDX),
            _ => false,
        }
    }

    /// May fall to nil. Only meaningful above center.
    pub fn may_nil(&self) -> bool {
        use Ty::*;
        match self {
            Any | XScalar | XNil => true,
            Int(i) => matches!(i, self::Int::Any(_)),
            Flt(f) => matches!(f, self::Flt::Any(_)),
            Fun(f) => f.fidxs.above_center() && f.fidxs.test(NIL_IDX),
            Ptr(p) => p.aliases.above_center() && p.aliases.test(NIL_IDX),
            t => t.must_nil(),
        }
    }

    fn add_nil(&self) -> Ty {
        use Ty::*;
        match self {
            Int(self::Int::Con(c)) => Int(self::Int::All(int_width(*c))),
            Int(i) => Int(*i),
            Flt(self::Flt::Con(c)) => Flt(self::Flt::All(flt_width(c.get()))),
            Flt(f) => Flt(*f),
            Fun(f) => Fun(FunPtr {
                fidxs: f.fidxs.set(NIL_IDX),
                nargs: f.nargs,
                ret: f.ret.clone(),
            }),
            Ptr(p) => Ptr(MemPtr {
                aliases: p.aliases.set(NIL_IDX),
                obj: p.obj.clone(),
            }),
            NScalr => Scalar,
            XNScalr => XScalar,
            t => t.clone(),
        }
    }

    /// Strip the nil possibility where the type can express that.
    pub fn remove_nil(&self) -> Ty {
        use Ty::*;
        match self {
            Nil | XNil => XNScalr,
            Scalar => NScalr,
            XScalar => XNScalr,
            Fun(f) => Fun(FunPtr {
                fidxs: f.fidxs.clear(NIL_IDX),
                nargs: f.nargs,
                ret: f.ret.clone(),
            }),
            Ptr(p) => Ptr(MemPtr {
                aliases: p.aliases.clear(NIL_IDX),
                obj: p.obj.clone(),
            }),
            t => t.clone(),
        }
    }

    /// Out-of-bounds default: which side of center we fall off to.
    pub fn oob(&self) -> Ty {
        if self.above_center() {
            Ty::XScalar
        } else {
            Ty::Scalar
        }
    }

    /// Widen a constant to its base class; escaping-function inputs use this.
    pub fn widen(&self) -> Ty {
        use Ty::*;
        match self {
            Int(_) => Ty::INT64,
            Flt(_) => Ty::FLT64,
            Ptr(p) => match &*p.obj {
                Obj::Str(_) => Ptr(MemPtr {
                    aliases: p.aliases.clone(),
                    obj: Box::new(Obj::Str(self::Str::All)),
                }),
                _ => self.clone(),
            },
            t => t.clone(),
        }
    }

    pub fn is_con(&self) -> bool {
        use Ty::*;
        match self {
            Nil | XNil => true,
            Int(self::Int::Con(_)) | Flt(self::Flt::Con(_)) => true,
            Ptr(p) => matches!(&*p.obj, Obj::Str(self::Str::Con(_))),
            _ => false,
        }
    }

    pub fn get_str(&self) -> Option<&SmolStr> {
        match self {
            Ty::Ptr(p) => match &*p.obj {
                Obj::Str(Str::Con(s)) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    /// Widen pointers that re-enter their own alias class past `cutoff`
    /// levels deep, keeping flow types finite for self-referential shapes.
    pub fn approx(&self, aliases: &Bits, cutoff: u32) -> Ty {
        self.approx_rec(aliases, 0, cutoff)
    }

    fn approx_rec(&self, aliases: &Bits, depth: u32, cutoff: u32) -> Ty {
        match self {
            Ty::Ptr(p) => {
                let hit = p.aliases.iter().any(|a| a != NIL_IDX && aliases.test(a));
                let d = depth + u32::from(hit);
                if hit && d > cutoff {
                    return Ty::Ptr(MemPtr {
                        aliases: p.aliases.clone(),
                        obj: Box::new(Obj::Obj),
                    });
                }
                let obj = match &*p.obj {
                    Obj::Struct(s) => Obj::Struct(StructObj {
                        any: s.any,
                        open: s.open,
                        flds: s
                            .flds
                            .iter()
                            .map(|(n, t)| (n.clone(), t.approx_rec(aliases, d, cutoff)))
                            .collect(),
                    }),
                    o => o.clone(),
                };
                Ty::Ptr(MemPtr {
                    aliases: p.aliases.clone(),
                    obj: Box::new(obj),
                })
            }
            Ty::Fun(f) => Ty::Fun(FunPtr {
                fidxs: f.fidxs.clone(),
                nargs: f.nargs,
                ret: Box::new(f.ret.approx_rec(aliases, depth, cutoff)),
            }),
            t => t.clone(),
        }
    }
}

// ── Printing ─────────────────────────────────────────────────────

impl fmt::Display for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Obj::XObj => write!(f, "~obj"),
            Obj::Obj => write!(f, "obj"),
            Obj::Str(Str::Con(s)) => write!(f, "\"{}\"", s),
            Obj::Str(Str::All) => write!(f, "str"),
            Obj::Str(Str::Any) => write!(f, "~str"),
            Obj::Struct(s) => {
                write!(f, "@{{")?;
                let mut first = true;
                for (n, t) in &s.flds {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", n, t)?;
                    first = false;
                }
                if s.open {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Ty::*;
        match self {
            Any => write!(f, "any"),
            All => write!(f, "all"),
            XScalar => write!(f, "~Scalar"),
            Scalar => write!(f, "Scalar"),
            XNScalr => write!(f, "~nScalar"),
            NScalr => write!(f, "nScalar"),
            XNil => write!(f, "~nil"),
            Nil => write!(f, "nil"),
            Int(self::Int::Con(c)) => write!(f, "{}", c),
            Int(self::Int::All(w)) => write!(f, "int{}", w),
            Int(self::Int::Any(w)) => write!(f, "~int{}", w),
            Flt(self::Flt::Con(c)) => {
                let v = c.get();
                if v == v.trunc() {
                    write!(f, "{:.1}", v)
                } else {
                    write!(f, "{}", v)
                }
            }
            Flt(self::Flt::All(w)) => write!(f, "flt{}", w),
            Flt(self::Flt::Any(w)) => write!(f, "~flt{}", w),
            Fun(p) => {
                write!(f, "{}{{ {} -> {} }}", p.fidxs, p.nargs, p.ret)
            }
            Ptr(p) => {
                let nil = !p.aliases.above_center() && p.aliases.test(NIL_IDX);
                match &*p.obj {
                    Obj::Str(_) => write!(f, "{}", p.obj)?,
                    _ => write!(f, "*{}", p.obj)?,
                }
                if nil {
                    write!(f, "?")?;
                }
                Ok(())
            }
        }
    }
}

/// Allocators for the two index spaces, plus their split trees.
#[derive(Debug, Clone)]
pub struct World {
    pub fun_tree: crate::bits::Tree,
    pub alias_tree: crate::bits::Tree,
}

impl World {
    pub fn new() -> World {
        let mut alias_tree = crate::bits::Tree::new();
        let rec = alias_tree.split(ALL_IDX);
        let strs = alias_tree.split(ALL_IDX);
        debug_assert_eq!(rec, Ty::REC_ALIAS);
        debug_assert_eq!(strs, Ty::STR_ALIAS);
        World {
            fun_tree: crate::bits::Tree::new(),
            alias_tree,
        }
    }

    /// A fresh function index; they all split from the root.
    pub fn new_fidx(&mut self) -> u32 {
        self.fun_tree.split(ALL_IDX)
    }

    /// A fresh alias class refining `parent`.
    pub fn new_alias(&mut self, parent: u32) -> u32 {
        self.alias_tree.split(parent)
    }
}

impl Default for World {
    fn default() -> World {
        World::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meet_constants_widen() {
        assert_eq!(Ty::int(3).meet(&Ty::int(3)), Ty::int(3));
        assert_eq!(Ty::int(3).meet(&Ty::int(4)), Ty::Int(Int::All(8)));
        assert_eq!(Ty::int(3).meet(&Ty::INT64), Ty::INT64);
    }

    #[test]
    fn meet_with_extremes() {
        for t in [Ty::int(5), Ty::strptr(), Ty::Nil, Ty::Scalar] {
            assert_eq!(Ty::Any.meet(&t), t);
            assert_eq!(Ty::All.meet(&t), Ty::All);
            assert_eq!(Ty::XScalar.meet(&t), t);
            assert_eq!(Ty::Scalar.meet(&t), Ty::Scalar);
        }
    }

    #[test]
    fn nil_folds_into_pointers() {
        let p = Ty::ptr(4, Obj::Struct(StructObj::make(vec![], false)));
        let pn = Ty::Nil.meet(&p);
        match &pn {
            Ty::Ptr(mp) => assert!(mp.aliases.test(NIL_IDX)),
            _ => panic!("expected pointer"),
        }
        assert!(pn.must_nil());
        assert!(!p.must_nil());
    }

    #[test]
    fn nil_meets_ints() {
        assert_eq!(Ty::Nil.meet(&Ty::INT64), Ty::INT64);
        assert_eq!(Ty::Nil.meet(&Ty::int(3)), Ty::Int(Int::All(8)));
        assert_eq!(Ty::Nil.meet(&Ty::Int(Int::Any(64))), Ty::Nil);
    }

    #[test]
    fn dual_is_involution() {
        let samples = [
            Ty::int(5),
            Ty::INT64,
            Ty::FLT64,
            Ty::Nil,
            Ty::Scalar,
            Ty::NScalr,
            Ty::strptr(),
            Ty::fun(Bits::make0(2), 1, Ty::int(3)),
        ];
        for t in &samples {
            assert_eq!(&t.dual().dual(), t);
        }
    }

    #[test]
    fn isa_reflexive_and_scalar_bottoms() {
        let samples = [Ty::int(5), Ty::INT64, Ty::strptr(), Ty::Nil];
        for t in &samples {
            assert!(t.isa(t));
            assert!(t.isa(&Ty::Scalar));
            assert!(Ty::XScalar.isa(t));
        }
    }

    #[test]
    fn meet_commutes_on_samples() {
        let samples = [
            Ty::int(5),
            Ty::int(0),
            Ty::INT64,
            Ty::flt(1.2),
            Ty::Nil,
            Ty::XNil,
            Ty::Scalar,
            Ty::NScalr,
            Ty::XNScalr,
            Ty::strptr(),
            Ty::str_con("abc"),
            Ty::fun(Bits::make0(2), 1, Ty::int(3)),
        ];
        for a in &samples {
            for b in &samples {
                assert_eq!(a.meet(b), b.meet(a), "meet({}, {})", a, b);
            }
        }
    }

    #[test]
    fn join_lifts() {
        // join only climbs
        let j = Ty::Scalar.join(&Ty::int(5));
        assert_eq!(j, Ty::int(5));
        assert_eq!(Ty::Scalar.join(&Ty::Scalar), Ty::Scalar);
    }

    #[test]
    fn widen_constants() {
        assert_eq!(Ty::int(5).widen(), Ty::INT64);
        assert_eq!(Ty::str_con("abc").widen(), Ty::strptr());
        assert_eq!(Ty::flt(1.2).widen(), Ty::FLT64);
    }

    #[test]
    fn approx_widens_nested_same_alias() {
        let inner = Ty::ptr(
            4,
            Obj::Struct(StructObj::make(vec![("0".into(), Ty::int(1))], false)),
        );
        let mid = Ty::ptr(
            4,
            Obj::Struct(StructObj::make(vec![("0".into(), inner)], false)),
        );
        let outer = Obj::Struct(StructObj::make(vec![("0".into(), mid)], false));
        // Approximating an allocation at alias 4: depth-1 re-entry is kept,
        // depth-2 widens to the raw object.
        let t = Ty::ptr(4, outer.approx(&Bits::make0(4), CUTOFF));
        let s = t.to_string();
        assert!(s.contains("0=*obj"), "got {}", s);
        assert!(s.starts_with("*@{0=*@{"), "got {}", s);
    }

    #[test]
    fn display_forms() {
        assert_eq!(Ty::int(5).to_string(), "5");
        assert_eq!(Ty::INT64.to_string(), "int64");
        assert_eq!(Ty::BOOL.to_string(), "int1");
        assert_eq!(Ty::str_con("abc").to_string(), "\"abc\"");
        assert_eq!(Ty::flt(1.2).to_string(), "1.2");
        assert_eq!(Ty::flt(3.0).to_string(), "3.0");
        assert_eq!(Ty::Nil.to_string(), "nil");
    }
}
