//! Pointer provenance queries
//!
//! Alias questions are answered from `PointerInfo` attached at pointer
//! creation: two pointers with distinct allocation provenances cannot
//! alias, and pointers with the same provenance but different static
//! offsets address disjoint memory.

use lumen_ir::{Context, InstOp, Value, ValueKind};

/// The allocation a pointer is statically known to originate from, chasing
/// attached provenance and direct allocas/globals.
pub fn allocation_of(ctx: &Context, ptr: Value) -> Option<Value> {
    if let Some(prov) = ctx.provenance(ptr) {
        return allocation_of(ctx, prov).or(Some(prov));
    }
    match &ctx.value_data(ptr).kind {
        ValueKind::Global(_) => Some(ptr),
        ValueKind::Inst(data) => match data.op {
            InstOp::Alloca { .. } => Some(ptr),
            InstOp::Gep { .. } => allocation_of(ctx, data.operands[0]),
            _ => None,
        },
        _ => None,
    }
}

/// `true` if the two pointers provably never address overlapping memory.
pub fn no_alias(ctx: &Context, a: Value, b: Value) -> bool {
    if a == b {
        return false;
    }
    let (alloc_a, alloc_b) = match (allocation_of(ctx, a), allocation_of(ctx, b)) {
        (Some(x), Some(y)) => (x, y),
        _ => return false,
    };
    if alloc_a != alloc_b {
        return true;
    }
    // Same allocation: disjoint if both carry static offsets and the
    // accessed ranges cannot overlap. Without sizes, require different
    // offsets with known valid sizes.
    match (
        ctx.static_provenance_offset(a),
        ctx.static_provenance_offset(b),
        ctx.ptr_info(a).and_then(|i| i.valid_size),
        ctx.ptr_info(b).and_then(|i| i.valid_size),
    ) {
        (Some(off_a), Some(off_b), Some(size_a), Some(size_b)) => {
            let end_a = off_a + size_a as i64;
            let end_b = off_b + size_b as i64;
            end_a <= off_b || end_b <= off_a
        }
        _ => false,
    }
}
