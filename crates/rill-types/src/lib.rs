//! Lattice types for the rill analyzer: splittable index bitsets, the
//! flow-type lattice, and the alias-indexed memory type.

pub mod bits;
pub mod mem;
pub mod ty;

pub use bits::{Bits, Tree, ALL_IDX, NIL_IDX};
pub use mem::TyMem;
pub use ty::{Flt, FunPtr, Int, MemPtr, Obj, Str, StructObj, Ty, World, CUTOFF, F64};
