//! Calling conventions
//!
//! Computed per function from the source parameter and return types.
//! Small trivially-copyable values travel in registers; dynamic array
//! references are passed unpacked as two arguments; larger or
//! nontrivially-constructed values pass by address with the caller
//! allocating. Large or nontrivial returns receive an implicit leading
//! out pointer and the nominal IR return type becomes void.

use lumen_ast::{SemaFunction, SemaType, SemaTypeId, SymbolTable};

/// Values at or below this size are register candidates.
pub const PREFERRED_REGISTER_SIZE: u64 = 16;

/// Per-argument placement rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassingConvention {
    /// The packed value itself.
    Register,
    /// Caller-allocated; the address is passed.
    Memory,
    /// Two register arguments: `(pointer, count)`.
    Unpacked,
}

#[derive(Debug, Clone)]
pub struct CallingConvention {
    pub return_pc: PassingConvention,
    pub params: Vec<PassingConvention>,
}

impl CallingConvention {
    /// `true` if the function returns through a caller-supplied pointer.
    pub fn returns_via_memory(&self) -> bool {
        self.return_pc == PassingConvention::Memory
    }
}

/// Approximate byte size of a sema type; mirrors the IR layout rules.
pub fn sema_size(sym: &SymbolTable, ty: SemaTypeId) -> u64 {
    match sym.type_of(ty) {
        SemaType::Void => 0,
        SemaType::Bool | SemaType::Byte => 1,
        SemaType::Int | SemaType::Float => 8,
        SemaType::Reference { .. } | SemaType::Pointer { .. } => 8,
        SemaType::DynArrayRef { .. } => 16,
        SemaType::Array { elem, len } => sema_size(sym, *elem) * len,
        SemaType::Struct { members, .. } => {
            // Conservative: members padded to 8 bytes keeps this an upper
            // bound of the real layout.
            members.iter().map(|m| sema_size(sym, m.ty).max(8)).sum()
        }
    }
}

fn passing_convention(sym: &SymbolTable, ty: SemaTypeId) -> PassingConvention {
    match sym.type_of(ty) {
        SemaType::DynArrayRef { .. } => PassingConvention::Unpacked,
        _ => {
            let trivial = sym.lifetime_of(ty).is_trivial();
            if trivial && sema_size(sym, ty) <= PREFERRED_REGISTER_SIZE {
                PassingConvention::Register
            } else {
                PassingConvention::Memory
            }
        }
    }
}

fn return_convention(sym: &SymbolTable, ty: SemaTypeId) -> PassingConvention {
    match sym.type_of(ty) {
        SemaType::Void => PassingConvention::Register,
        SemaType::DynArrayRef { .. } => PassingConvention::Unpacked,
        _ => passing_convention(sym, ty),
    }
}

/// Computes the calling convention of one function.
pub fn compute_cc(sym: &SymbolTable, function: &SemaFunction) -> CallingConvention {
    CallingConvention {
        return_pc: return_convention(sym, function.return_ty),
        params: function
            .params
            .iter()
            .map(|&ty| passing_convention(sym, ty))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_ast::{LifetimeMetadata, LifetimeOperation, StructMember};

    #[test]
    fn small_trivial_values_pass_in_registers() {
        let sym = SymbolTable::new();
        let f = SemaFunction {
            name: "f".into(),
            params: vec![sym.int(), sym.bool_()],
            return_ty: sym.int(),
            builtin_index: None,
        };
        let cc = compute_cc(&sym, &f);
        assert_eq!(cc.params, vec![PassingConvention::Register, PassingConvention::Register]);
        assert_eq!(cc.return_pc, PassingConvention::Register);
    }

    #[test]
    fn dynamic_array_references_pass_unpacked() {
        let sym = SymbolTable::new();
        let f = SemaFunction {
            name: "g".into(),
            params: vec![sym.str_pointer()],
            return_ty: sym.void(),
            builtin_index: None,
        };
        let cc = compute_cc(&sym, &f);
        assert_eq!(cc.params, vec![PassingConvention::Unpacked]);
    }

    #[test]
    fn large_or_nontrivial_values_pass_by_address() {
        let mut sym = SymbolTable::new();
        let int = sym.int();
        let big = sym.add_struct(
            "Big",
            vec![
                StructMember { name: "a".into(), ty: int },
                StructMember { name: "b".into(), ty: int },
                StructMember { name: "c".into(), ty: int },
            ],
            LifetimeMetadata::TRIVIAL,
        );
        let dtor = lumen_ast::FunctionId(0);
        let guarded = sym.add_struct(
            "Guarded",
            vec![StructMember { name: "x".into(), ty: int }],
            LifetimeMetadata {
                destruct: LifetimeOperation::Nontrivial(dtor),
                copy_construct: LifetimeOperation::NontrivialInline,
                ..LifetimeMetadata::TRIVIAL
            },
        );
        let f = SemaFunction {
            name: "h".into(),
            params: vec![big, guarded],
            return_ty: big,
            builtin_index: None,
        };
        let cc = compute_cc(&sym, &f);
        assert_eq!(cc.params, vec![PassingConvention::Memory, PassingConvention::Memory]);
        assert!(cc.returns_via_memory());
    }
}
