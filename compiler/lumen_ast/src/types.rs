//! Semantic types and lifetime metadata
//!
//! The analyzed source program's type system, as the lowerer consumes it.
//! Every lifetime-relevant type carries a [`LifetimeMetadata`] record with
//! one entry per operation kind.

use serde::{Deserialize, Serialize};

/// Handle to a semantic type owned by the symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SemaTypeId(pub u32);

/// Handle to a function entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

/// Handle to a variable or parameter entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SemaType {
    Void,
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 8-bit integer, the element of string data.
    Byte,
    /// 64-bit float.
    Float,
    Struct {
        name: String,
        members: Vec<StructMember>,
    },
    /// Fixed-length array.
    Array {
        elem: SemaTypeId,
        len: u64,
    },
    /// Reference to an array of runtime length; lowers unpacked to
    /// `(pointer, count)`.
    DynArrayRef {
        elem: SemaTypeId,
    },
    /// Reference to a single object.
    Reference {
        pointee: SemaTypeId,
    },
    /// Raw pointer.
    Pointer {
        pointee: SemaTypeId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructMember {
    pub name: String,
    pub ty: SemaTypeId,
}

/// The four lifetime operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifetimeOpKind {
    DefaultConstruct,
    CopyConstruct,
    MoveConstruct,
    Destruct,
}

/// How one lifetime operation of a type is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifetimeOperation {
    /// memset/memcpy or nothing.
    Trivial,
    /// Call a user-defined function.
    Nontrivial(FunctionId),
    /// Expand structurally (member-wise, element-wise).
    NontrivialInline,
    /// Statically forbidden; reaching lowering with this is an analyzer
    /// bug.
    Deleted,
}

/// Lifetime metadata of a type: one entry per operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifetimeMetadata {
    pub default_construct: LifetimeOperation,
    pub copy_construct: LifetimeOperation,
    pub move_construct: LifetimeOperation,
    pub destruct: LifetimeOperation,
}

impl LifetimeMetadata {
    pub const TRIVIAL: LifetimeMetadata = LifetimeMetadata {
        default_construct: LifetimeOperation::Trivial,
        copy_construct: LifetimeOperation::Trivial,
        move_construct: LifetimeOperation::Trivial,
        destruct: LifetimeOperation::Trivial,
    };

    pub fn operation(&self, kind: LifetimeOpKind) -> LifetimeOperation {
        match kind {
            LifetimeOpKind::DefaultConstruct => self.default_construct,
            LifetimeOpKind::CopyConstruct => self.copy_construct,
            LifetimeOpKind::MoveConstruct => self.move_construct,
            LifetimeOpKind::Destruct => self.destruct,
        }
    }

    pub fn is_trivial(&self) -> bool {
        *self == Self::TRIVIAL
    }

    pub fn has_nontrivial_destructor(&self) -> bool {
        !matches!(self.destruct, LifetimeOperation::Trivial)
    }
}
