//! SSA values and use-edges
//!
//! Every entity that can appear as an operand lives in the context's value
//! arena: parameters, constants, global variables, functions, foreign
//! functions, basic blocks and instructions. A [`Value`] is an arena index
//! plus generation, so destroyed values are detected rather than aliased.
//!
//! Operand slots are tracked edges: a user records its operands in order,
//! and every operand records the user once per slot. Replacing a value
//! rewrites each user's matching slots and moves the edges over.

use crate::instruction::InstData;
use crate::types::Ty;
use lumen_common::{ApFloat, ApInt};
use smallvec::SmallVec;

/// Handle to a value in the context arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(pub(crate) generational_arena::Index);

/// A basic block, by its value handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block(pub Value);

/// A function, by its value handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Function(pub Value);

impl Block {
    pub fn value(self) -> Value {
        self.0
    }
}

impl Function {
    pub fn value(self) -> Value {
        self.0
    }
}

/// Alignment, validity and provenance facts attached to a pointer-typed
/// value. `provenance` is a weak back-reference: if the referent is
/// destroyed the arena slot vacates and lookups return `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointerInfo {
    pub align: u64,
    pub valid_size: Option<u64>,
    pub provenance: Option<Value>,
    pub static_offset: Option<i64>,
    pub non_null: bool,
    pub non_escaping: bool,
}

/// The payload stored per arena slot.
#[derive(Debug, Clone)]
pub struct ValueData {
    pub kind: ValueKind,
    pub ty: Ty,
    pub name: Option<String>,
    /// One entry per operand slot that references this value.
    pub users: Vec<Value>,
    pub ptr_info: Option<PointerInfo>,
}

impl ValueData {
    pub(crate) fn new(kind: ValueKind, ty: Ty, name: Option<String>) -> Self {
        Self { kind, ty, name, users: Vec::new(), ptr_info: None }
    }
}

/// Data of a basic block. Blocks are values (their type is `label`) so
/// branch targets and phi predecessor slots participate in use-edges.
#[derive(Debug, Clone, Default)]
pub struct BlockData {
    pub instructions: Vec<Value>,
    /// One entry per incoming control-flow edge; phi arguments align with
    /// this list position-wise.
    pub predecessors: Vec<Value>,
    pub parent: Option<Value>,
}

/// Data of a function with a body.
#[derive(Debug, Clone)]
pub struct FunctionData {
    pub return_ty: Ty,
    pub params: Vec<Value>,
    pub blocks: Vec<Value>,
    /// Bumped on every mutation; analyses cache against it.
    pub version: u64,
    /// Position in the owning module, used for codegen labels.
    pub id: u32,
}

/// Signature of a function whose body lives outside the module. The
/// `(slot, index)` pair addresses the host's foreign-function table.
#[derive(Debug, Clone)]
pub struct ForeignFunctionData {
    pub return_ty: Ty,
    pub param_tys: Vec<Ty>,
    pub slot: u32,
    pub index: u32,
    pub lib_index: u32,
    /// Pure functions are eligible for compile-time evaluation.
    pub pure_fn: bool,
}

/// A module-owned global variable. The value's own type is `ptr`; the
/// stored object has `value_ty`.
#[derive(Debug, Clone)]
pub struct GlobalData {
    pub value_ty: Ty,
    pub initializer: Option<Value>,
    pub is_const: bool,
}

#[derive(Debug, Clone)]
pub enum ValueKind {
    Parameter { function: Value, index: usize },
    IntConst(ApInt),
    FloatConst(ApFloat),
    NullPointer,
    Undef,
    StructConst { elems: Vec<Value> },
    ArrayConst { elems: Vec<Value> },
    Global(GlobalData),
    Function(FunctionData),
    ForeignFunction(ForeignFunctionData),
    Block(BlockData),
    Inst(InstData),
    /// Parser-internal placeholder for a name used before its definition.
    /// Never survives a successful parse.
    ForwardRef,
}

impl ValueKind {
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            ValueKind::IntConst(_)
                | ValueKind::FloatConst(_)
                | ValueKind::NullPointer
                | ValueKind::Undef
                | ValueKind::StructConst { .. }
                | ValueKind::ArrayConst { .. }
        )
    }
}

/// Operand storage used by instructions.
pub type Operands = SmallVec<[Value; 2]>;
