//! The lowering value model
//!
//! Every lowered expression yields a [`LowerValue`]: a name stem, the
//! source type, one or two [`Atom`]s and a representation flag. An atom
//! pairs an IR value with its location: `Register` atoms hold the object
//! itself, `Memory` atoms hold its address. A value is `Packed` when one
//! atom carries the whole object and `Unpacked` when it is exploded into
//! its natural parts, which is the form dynamic array references take:
//! `(pointer, count)`.

use lumen_ast::SemaTypeId;
use lumen_ir::Value;
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueLocation {
    Register,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Atom {
    pub value: Value,
    pub location: ValueLocation,
}

impl Atom {
    pub fn register(value: Value) -> Self {
        Self { value, location: ValueLocation::Register }
    }

    pub fn memory(value: Value) -> Self {
        Self { value, location: ValueLocation::Memory }
    }

    pub fn is_register(self) -> bool {
        self.location == ValueLocation::Register
    }

    pub fn is_memory(self) -> bool {
        self.location == ValueLocation::Memory
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Packed,
    Unpacked,
}

#[derive(Debug, Clone)]
pub struct LowerValue {
    pub name: String,
    pub ty: SemaTypeId,
    pub atoms: SmallVec<[Atom; 2]>,
    pub repr: Representation,
}

impl LowerValue {
    pub fn packed(name: impl Into<String>, ty: SemaTypeId, atom: Atom) -> Self {
        Self {
            name: name.into(),
            ty,
            atoms: SmallVec::from_slice(&[atom]),
            repr: Representation::Packed,
        }
    }

    pub fn unpacked(name: impl Into<String>, ty: SemaTypeId, atoms: &[Atom]) -> Self {
        Self {
            name: name.into(),
            ty,
            atoms: SmallVec::from_slice(atoms),
            repr: Representation::Unpacked,
        }
    }

    pub fn is_packed(&self) -> bool {
        self.repr == Representation::Packed
    }

    /// The only atom of a packed value.
    pub fn single(&self) -> Atom {
        debug_assert!(self.is_packed(), "single() requires a packed value");
        self.atoms[0]
    }
}
