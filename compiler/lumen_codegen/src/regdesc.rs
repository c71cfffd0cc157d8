//! Register descriptor
//!
//! Per-function mapping from SSA values to abstract register indices with
//! a monotonic next-index counter. Constants resolve to immediates;
//! pointer-typed values resolve to `(reg, 0, 0)` memory addresses unless
//! their immediate provenance carries a statically known offset, in which
//! case `(base_reg, offset, shift)` is used. Aggregates occupy one
//! register per scalar leaf, allocated contiguously.

use crate::asm::{Element, MemoryAddress, RegisterIndex, Value64};
use hashbrown::HashMap;
use lumen_ir::{Context, Ty, TypeData, Value, ValueKind};

#[derive(Debug, Default)]
pub struct RegisterDescriptor {
    values: HashMap<Value, usize>,
    next_index: usize,
}

impl RegisterDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.next_index = 0;
    }

    /// Registers consumed so far; the `enterFn` frame size.
    pub fn used_registers(&self) -> usize {
        self.next_index
    }

    /// Declares the function parameters at the bottom of the frame.
    pub fn declare_parameters(&mut self, ctx: &Context, params: &[Value]) {
        debug_assert!(self.values.is_empty() && self.next_index == 0);
        for &param in params {
            let width = register_width(ctx, ctx.value_ty(param));
            let index = self.next_index;
            self.next_index += width;
            self.values.insert(param, index);
        }
    }

    /// The base register of a value, allocating on first sight.
    pub fn register_of(&mut self, ctx: &Context, value: Value) -> usize {
        if let Some(&index) = self.values.get(&value) {
            return index;
        }
        let width = register_width(ctx, ctx.value_ty(value)).max(1);
        let index = self.next_index;
        self.next_index += width;
        self.values.insert(value, index);
        index
    }

    /// Reserves a contiguous block of registers.
    pub fn allocate_automatic(&mut self, count: usize) -> usize {
        let index = self.next_index;
        self.next_index += count;
        index
    }

    /// A scratch register.
    pub fn make_temporary(&mut self) -> usize {
        self.allocate_automatic(1)
    }

    /// Resolves a value to an operand element: constants become
    /// immediates, everything else a register.
    pub fn resolve(&mut self, ctx: &Context, value: Value) -> Element {
        match &ctx.value_data(value).kind {
            ValueKind::IntConst(v) if v.width() == 64 => {
                Element::Value64(Value64::signed(v.as_i64()))
            }
            ValueKind::IntConst(v) => Element::Value64(Value64::unsigned(v.as_u64())),
            ValueKind::FloatConst(v) => Element::Value64(Value64::float(v.as_f64())),
            ValueKind::NullPointer => Element::Value64(Value64::unsigned(0)),
            ValueKind::Undef => Element::Value64(Value64::unsigned(0)),
            _ => Element::Register(RegisterIndex::new(self.register_of(ctx, value))),
        }
    }

    /// Resolves a pointer-typed value to a memory address.
    pub fn resolve_addr(&mut self, ctx: &Context, address: Value) -> MemoryAddress {
        debug_assert!(ctx.type_data(ctx.value_ty(address)).is_pointer());
        // A statically known provenance offset folds into the address.
        if let (Some(prov), Some(offset)) =
            (ctx.provenance(address), ctx.static_provenance_offset(address))
        {
            if self.values.contains_key(&prov) && (0..256).contains(&offset) {
                let base = self.register_of(ctx, prov);
                return MemoryAddress::new(base as u8, offset as u8, 0);
            }
        }
        let reg = self.register_of(ctx, address);
        MemoryAddress::new(reg as u8, 0, 0)
    }

    /// Memory address of `address` displaced by a byte offset.
    pub fn resolve_addr_offset(&mut self, ctx: &Context, address: Value, offset: u64) -> MemoryAddress {
        let base = self.resolve_addr(ctx, address);
        let total = u64::from(base.offset) + offset;
        debug_assert!(total < 256, "address offset exceeds one byte");
        MemoryAddress::new(base.ptr_reg, total as u8, base.offset_shift)
    }
}

/// Number of registers a value of this type occupies: one per scalar leaf.
pub fn register_width(ctx: &Context, ty: Ty) -> usize {
    match ctx.type_data(ty) {
        TypeData::Void | TypeData::Label => 0,
        TypeData::Integral { .. } | TypeData::Float { .. } | TypeData::Pointer => 1,
        TypeData::Array { elem, count } => register_width(ctx, *elem) * (*count as usize),
        TypeData::Struct { elems, .. } => {
            elems.iter().map(|&e| register_width(ctx, e)).sum()
        }
    }
}

/// Scalar leaves of a type as `(register offset, byte offset, type)`
/// triples, in declaration order.
pub fn flatten_leaves(ctx: &Context, ty: Ty) -> Vec<(usize, u64, Ty)> {
    let mut leaves = Vec::new();
    walk_leaves(ctx, ty, &mut 0, 0, &mut leaves);
    leaves
}

fn walk_leaves(
    ctx: &Context,
    ty: Ty,
    reg_offset: &mut usize,
    byte_offset: u64,
    leaves: &mut Vec<(usize, u64, Ty)>,
) {
    match ctx.type_data(ty).clone() {
        TypeData::Void | TypeData::Label => {}
        TypeData::Integral { .. } | TypeData::Float { .. } | TypeData::Pointer => {
            leaves.push((*reg_offset, byte_offset, ty));
            *reg_offset += 1;
        }
        TypeData::Array { elem, count } => {
            let elem_layout = ctx.layout_of(elem);
            let stride = (elem_layout.size + elem_layout.align - 1) & !(elem_layout.align - 1);
            for i in 0..count {
                walk_leaves(ctx, elem, reg_offset, byte_offset + i * stride, leaves);
            }
        }
        TypeData::Struct { elems, .. } => {
            for (index, member) in elems.iter().enumerate() {
                let offset = ctx.member_offset(ty, index as u32);
                walk_leaves(ctx, *member, reg_offset, byte_offset + offset, leaves);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_span_one_register_per_leaf() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_ty(64);
        let i8_ty = ctx.int_ty(8);
        let inner = ctx.anon_struct_ty(vec![i8_ty, i64_ty]);
        let outer = ctx.anon_struct_ty(vec![inner, i64_ty]);
        assert_eq!(register_width(&ctx, outer), 3);
        let leaves = flatten_leaves(&ctx, outer);
        assert_eq!(leaves.len(), 3);
        // (register offset, byte offset): i8 at 0, i64 at 8, i64 at 16.
        assert_eq!(leaves[0].0, 0);
        assert_eq!(leaves[0].1, 0);
        assert_eq!(leaves[1].1, 8);
        assert_eq!(leaves[2].1, 16);
    }

    #[test]
    fn the_counter_is_monotonic() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_ty(64);
        let function = ctx.create_function("f", i64_ty, vec![(i64_ty, "a".to_string())]);
        let param = function.params(&ctx)[0];
        let mut rd = RegisterDescriptor::new();
        rd.declare_parameters(&ctx, &[param]);
        assert_eq!(rd.register_of(&ctx, param), 0);
        let first = rd.allocate_automatic(4);
        let second = rd.make_temporary();
        assert_eq!(first, 1);
        assert_eq!(second, 5);
        assert_eq!(rd.used_registers(), 6);
    }

    #[test]
    fn constants_resolve_to_immediates() {
        let mut ctx = Context::new();
        let seven = ctx.int_const(7, 64);
        let mut rd = RegisterDescriptor::new();
        assert!(matches!(rd.resolve(&ctx, seven), Element::Value64(_)));
    }
}
