//! The context: owner of types, constants and the value arena
//!
//! A `Context` interns types and most constants by structural key and owns
//! every value of every module built against it. It is non-shared and
//! non-reentrant; all mutation goes through `&mut self`.

use crate::instruction::InstData;
use crate::types::{round_up, Layout, Ty, TypeData, TypeKey};
use crate::value::{PointerInfo, Value, ValueData, ValueKind};
use generational_arena::Arena;
use hashbrown::HashMap;
use lumen_common::{ApFloat, ApInt};

#[derive(Default)]
pub struct Context {
    types: Vec<TypeData>,
    type_map: HashMap<TypeKey, Ty>,
    named_structs: HashMap<String, Ty>,

    pub(crate) values: Arena<ValueData>,

    int_consts: HashMap<(u64, u32), Value>,
    float_consts: HashMap<(u64, u32), Value>,
    null_const: Option<Value>,
    undef_consts: HashMap<Ty, Value>,

    name_counter: u64,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    // ## Types

    fn intern_type(&mut self, key: TypeKey, data: TypeData) -> Ty {
        if let Some(&ty) = self.type_map.get(&key) {
            return ty;
        }
        let ty = Ty(self.types.len() as u32);
        self.types.push(data);
        self.type_map.insert(key, ty);
        ty
    }

    pub fn void_ty(&mut self) -> Ty {
        self.intern_type(TypeKey::Void, TypeData::Void)
    }

    pub fn int_ty(&mut self, width: u32) -> Ty {
        assert!(matches!(width, 1 | 8 | 16 | 32 | 64), "unsupported integral width {width}");
        self.intern_type(TypeKey::Integral(width), TypeData::Integral { width })
    }

    pub fn bool_ty(&mut self) -> Ty {
        self.int_ty(1)
    }

    pub fn float_ty(&mut self, width: u32) -> Ty {
        assert!(matches!(width, 32 | 64), "unsupported float width {width}");
        self.intern_type(TypeKey::Float(width), TypeData::Float { width })
    }

    pub fn ptr_ty(&mut self) -> Ty {
        self.intern_type(TypeKey::Pointer, TypeData::Pointer)
    }

    pub fn label_ty(&mut self) -> Ty {
        self.intern_type(TypeKey::Label, TypeData::Label)
    }

    pub fn array_ty(&mut self, elem: Ty, count: u64) -> Ty {
        self.intern_type(TypeKey::Array(elem, count), TypeData::Array { elem, count })
    }

    /// Anonymous structs are interned by their element sequence.
    pub fn anon_struct_ty(&mut self, elems: Vec<Ty>) -> Ty {
        self.intern_type(TypeKey::AnonStruct(elems.clone()), TypeData::Struct { name: None, elems })
    }

    /// Declares a named struct type, unique per module. Returns `None` if
    /// the name is already taken.
    pub fn declare_struct_ty(&mut self, name: impl Into<String>, elems: Vec<Ty>) -> Option<Ty> {
        let name = name.into();
        if self.named_structs.contains_key(&name) {
            return None;
        }
        let ty = Ty(self.types.len() as u32);
        self.types.push(TypeData::Struct { name: Some(name.clone()), elems });
        self.named_structs.insert(name, ty);
        Some(ty)
    }

    pub fn struct_ty_by_name(&self, name: &str) -> Option<Ty> {
        self.named_structs.get(name).copied()
    }

    pub fn type_data(&self, ty: Ty) -> &TypeData {
        &self.types[ty.0 as usize]
    }

    /// Size and alignment with standard padding rules. Pointers are 8 bytes,
    /// `i1` occupies one byte in memory.
    pub fn layout_of(&self, ty: Ty) -> Layout {
        match self.type_data(ty) {
            TypeData::Void | TypeData::Label => Layout { size: 0, align: 1 },
            TypeData::Integral { width } | TypeData::Float { width } => {
                Layout::scalar(u64::from(*width).div_ceil(8))
            }
            TypeData::Pointer => Layout::scalar(8),
            TypeData::Array { elem, count } => {
                let elem_layout = self.layout_of(*elem);
                let stride = round_up(elem_layout.size, elem_layout.align);
                Layout { size: stride * count, align: elem_layout.align }
            }
            TypeData::Struct { elems, .. } => {
                let mut size = 0;
                let mut align = 1;
                for &member in elems {
                    let member_layout = self.layout_of(member);
                    size = round_up(size, member_layout.align) + member_layout.size;
                    align = align.max(member_layout.align);
                }
                Layout { size: round_up(size, align), align }
            }
        }
    }

    pub fn size_of(&self, ty: Ty) -> u64 {
        self.layout_of(ty).size
    }

    pub fn align_of(&self, ty: Ty) -> u64 {
        self.layout_of(ty).align
    }

    /// Byte offset of a struct member.
    pub fn member_offset(&self, ty: Ty, index: u32) -> u64 {
        let TypeData::Struct { elems, .. } = self.type_data(ty) else {
            panic!("member_offset on non-struct type");
        };
        let mut offset = 0;
        for (i, &member) in elems.iter().enumerate() {
            let member_layout = self.layout_of(member);
            offset = round_up(offset, member_layout.align);
            if i as u32 == index {
                return offset;
            }
            offset += member_layout.size;
        }
        panic!("member index {index} out of range");
    }

    /// Resolves a chain of constant member indices against an aggregate
    /// type. Returns `None` if any index is out of range.
    pub fn aggregate_member_ty(&self, ty: Ty, indices: &[u32]) -> Option<Ty> {
        let mut current = ty;
        for &index in indices {
            current = match self.type_data(current) {
                TypeData::Struct { elems, .. } => *elems.get(index as usize)?,
                TypeData::Array { elem, count } => {
                    if u64::from(index) >= *count {
                        return None;
                    }
                    *elem
                }
                _ => return None,
            };
        }
        Some(current)
    }

    // ## Values

    pub(crate) fn alloc_value(&mut self, data: ValueData) -> Value {
        Value(self.values.insert(data))
    }

    pub fn value_data(&self, value: Value) -> &ValueData {
        &self.values[value.0]
    }

    pub fn value_data_mut(&mut self, value: Value) -> &mut ValueData {
        &mut self.values[value.0]
    }

    /// `Some` while the value is alive, `None` after destruction. Weak
    /// back-references (pointer provenance, SCEV unknowns) go through this.
    pub fn try_value_data(&self, value: Value) -> Option<&ValueData> {
        self.values.get(value.0)
    }

    pub fn is_alive(&self, value: Value) -> bool {
        self.values.contains(value.0)
    }

    pub fn value_ty(&self, value: Value) -> Ty {
        self.values[value.0].ty
    }

    pub fn value_name<'a>(&'a self, value: Value) -> Option<&'a str> {
        self.values[value.0].name.as_deref()
    }

    pub fn set_value_name(&mut self, value: Value, name: impl Into<String>) {
        self.values[value.0].name = Some(name.into());
    }

    pub fn value_users(&self, value: Value) -> &[Value] {
        &self.values[value.0].users
    }

    pub fn ptr_info(&self, value: Value) -> Option<&PointerInfo> {
        self.values[value.0].ptr_info.as_ref()
    }

    pub fn set_ptr_info(&mut self, value: Value, info: PointerInfo) {
        debug_assert!(self.type_data(self.value_ty(value)).is_pointer());
        self.values[value.0].ptr_info = Some(info);
    }

    /// The provenance of a pointer, if attached and still alive.
    pub fn provenance(&self, value: Value) -> Option<Value> {
        let prov = self.ptr_info(value)?.provenance?;
        self.is_alive(prov).then_some(prov)
    }

    pub fn static_provenance_offset(&self, value: Value) -> Option<i64> {
        self.ptr_info(value)?.static_offset
    }

    /// Generates a fresh name from a stem, for values synthesized by passes
    /// and builders.
    pub fn unique_name(&mut self, stem: &str) -> String {
        self.name_counter += 1;
        format!("{stem}.{}", self.name_counter)
    }

    // ## Use-edges

    /// Registers one use-edge per operand slot of `user`.
    pub(crate) fn register_uses(&mut self, user: Value) {
        let operands: Vec<Value> = match &self.values[user.0].kind {
            ValueKind::Inst(data) => data.operands.to_vec(),
            _ => return,
        };
        for op in operands {
            self.values[op.0].users.push(user);
        }
    }

    fn unregister_use(&mut self, operand: Value, user: Value) {
        // One occurrence per slot; remove a single entry.
        if let Some(data) = self.values.get_mut(operand.0) {
            if let Some(pos) = data.users.iter().position(|&u| u == user) {
                data.users.swap_remove(pos);
            }
        }
    }

    /// Rewrites operand slot `slot` of `user`, maintaining use lists on both
    /// the old and the new operand.
    pub fn set_operand(&mut self, user: Value, slot: usize, new: Value) {
        let old = match &self.values[user.0].kind {
            ValueKind::Inst(data) => data.operands[slot],
            _ => panic!("set_operand on non-instruction"),
        };
        if old == new {
            return;
        }
        self.unregister_use(old, user);
        match &mut self.values[user.0].kind {
            ValueKind::Inst(data) => data.operands[slot] = new,
            _ => unreachable!(),
        }
        self.values[new.0].users.push(user);
    }

    /// Drops all outgoing edges of `user` and empties its operand list.
    pub fn clear_operands(&mut self, user: Value) {
        let operands: Vec<Value> = match &self.values[user.0].kind {
            ValueKind::Inst(data) => data.operands.to_vec(),
            _ => return,
        };
        for op in &operands {
            self.unregister_use(*op, user);
        }
        if let ValueKind::Inst(data) = &mut self.values[user.0].kind {
            data.operands.clear();
        }
    }

    /// Replaces every use of `old` with `new` by walking `old`'s user list
    /// and rewriting each matching slot. O(uses).
    pub fn replace_all_uses_with(&mut self, old: Value, new: Value) {
        if old == new {
            return;
        }
        let users = std::mem::take(&mut self.values[old.0].users);
        for user in &users {
            let slots: Vec<usize> = match &self.values[user.0].kind {
                ValueKind::Inst(data) => data
                    .operands
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &op)| (op == old).then_some(i))
                    .collect(),
                _ => Vec::new(),
            };
            if let ValueKind::Inst(data) = &mut self.values[user.0].kind {
                for slot in slots {
                    data.operands[slot] = new;
                }
            }
            self.values[new.0].users.push(*user);
        }
    }

    /// Destroys a detached instruction. The instruction must have no users
    /// left; its outgoing edges are dropped first.
    pub fn destroy_inst(&mut self, inst: Value) {
        self.clear_operands(inst);
        debug_assert!(
            self.values[inst.0].users.is_empty(),
            "destroying an instruction that still has users"
        );
        self.values.remove(inst.0);
    }

    /// Removes a parser placeholder after all its uses were rewritten.
    pub(crate) fn destroy_placeholder(&mut self, value: Value) {
        debug_assert!(matches!(self.values[value.0].kind, ValueKind::ForwardRef));
        self.values.remove(value.0);
    }

    /// Mutable access to an instruction's operation payload. Operand lists
    /// must be changed through [`Context::set_operand`] so use-edges stay
    /// consistent; the operation itself carries no edges.
    pub fn inst_op_mut(&mut self, inst: Value) -> &mut crate::instruction::InstOp {
        match &mut self.values[inst.0].kind {
            ValueKind::Inst(data) => &mut data.op,
            _ => panic!("not an instruction"),
        }
    }

    /// Clones a detached copy of an instruction. Operands initially
    /// reference the same values as the original (with use-edges
    /// registered); callers remap them with [`Context::set_operand`]. The
    /// clone's name is freshened from the original's.
    pub fn clone_instruction(&mut self, inst: Value) -> Value {
        let data = match &self.values[inst.0].kind {
            ValueKind::Inst(data) => {
                let mut clone = data.clone();
                clone.parent = None;
                clone
            }
            _ => panic!("not an instruction"),
        };
        let ty = self.value_ty(inst);
        let name = self.value_name(inst).map(|n| n.to_string());
        let name = name.map(|n| self.unique_name(&n));
        let clone = self.alloc_value(ValueData::new(ValueKind::Inst(data), ty, name));
        self.register_uses(clone);
        clone
    }

    pub(crate) fn inst_data_mut(&mut self, inst: Value) -> &mut InstData {
        match &mut self.values[inst.0].kind {
            ValueKind::Inst(data) => data,
            _ => panic!("not an instruction"),
        }
    }

    // ## Constants

    /// Integer constants are uniqued by (bits, width).
    pub fn int_constant(&mut self, value: ApInt) -> Value {
        let key = (value.bits(), value.width());
        if let Some(&v) = self.int_consts.get(&key) {
            return v;
        }
        let ty = self.int_ty(value.width());
        let v = self.alloc_value(ValueData::new(ValueKind::IntConst(value), ty, None));
        self.int_consts.insert(key, v);
        v
    }

    pub fn int_const(&mut self, value: i64, width: u32) -> Value {
        self.int_constant(ApInt::from_i64(value, width))
    }

    pub fn bool_const(&mut self, value: bool) -> Value {
        self.int_constant(ApInt::truth(value))
    }

    /// Float constants are uniqued by (bit pattern, width).
    pub fn float_constant(&mut self, value: ApFloat) -> Value {
        let key = (value.bits(), value.width());
        if let Some(&v) = self.float_consts.get(&key) {
            return v;
        }
        let ty = self.float_ty(value.width());
        let v = self.alloc_value(ValueData::new(ValueKind::FloatConst(value), ty, None));
        self.float_consts.insert(key, v);
        v
    }

    pub fn null_pointer(&mut self) -> Value {
        if let Some(v) = self.null_const {
            return v;
        }
        let ty = self.ptr_ty();
        let v = self.alloc_value(ValueData::new(ValueKind::NullPointer, ty, None));
        self.null_const = Some(v);
        v
    }

    /// One undef value per type.
    pub fn undef(&mut self, ty: Ty) -> Value {
        if let Some(&v) = self.undef_consts.get(&ty) {
            return v;
        }
        let v = self.alloc_value(ValueData::new(ValueKind::Undef, ty, None));
        self.undef_consts.insert(ty, v);
        v
    }

    /// Struct constants have identity per construction (not interned).
    pub fn struct_constant(&mut self, ty: Ty, elems: Vec<Value>) -> Value {
        debug_assert!(matches!(self.type_data(ty), TypeData::Struct { .. }));
        self.alloc_value(ValueData::new(ValueKind::StructConst { elems }, ty, None))
    }

    pub fn array_constant(&mut self, ty: Ty, elems: Vec<Value>) -> Value {
        debug_assert!(matches!(self.type_data(ty), TypeData::Array { .. }));
        self.alloc_value(ValueData::new(ValueKind::ArrayConst { elems }, ty, None))
    }

    /// String literals lower to `i8` arrays.
    pub fn string_constant(&mut self, text: &str) -> Value {
        let i8_ty = self.int_ty(8);
        let elems: Vec<Value> = text
            .bytes()
            .map(|b| self.int_constant(ApInt::new(u64::from(b), 8)))
            .collect();
        let ty = self.array_ty(i8_ty, elems.len() as u64);
        self.array_constant(ty, elems)
    }

    /// The constant integral value of `value`, if it is one.
    pub fn as_int_constant(&self, value: Value) -> Option<ApInt> {
        match &self.values[value.0].kind {
            ValueKind::IntConst(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float_constant(&self, value: Value) -> Option<ApFloat> {
        match &self.values[value.0].kind {
            ValueKind::FloatConst(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_constant(&self, value: Value) -> bool {
        self.values[value.0].kind.is_constant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn types_are_interned_by_structural_key() {
        let mut ctx = Context::new();
        assert_eq!(ctx.int_ty(64), ctx.int_ty(64));
        assert_ne!(ctx.int_ty(64), ctx.int_ty(32));
        let i64_ty = ctx.int_ty(64);
        let a = ctx.anon_struct_ty(vec![i64_ty, i64_ty]);
        let b = ctx.anon_struct_ty(vec![i64_ty, i64_ty]);
        assert_eq!(a, b);
    }

    #[test]
    fn named_structs_are_unique_per_module() {
        let mut ctx = Context::new();
        let i64_ty = ctx.int_ty(64);
        assert!(ctx.declare_struct_ty("X", vec![i64_ty]).is_some());
        assert!(ctx.declare_struct_ty("X", vec![i64_ty]).is_none());
        assert!(ctx.struct_ty_by_name("X").is_some());
    }

    #[test]
    fn constants_are_uniqued_by_value_and_width() {
        let mut ctx = Context::new();
        assert_eq!(ctx.int_const(7, 64), ctx.int_const(7, 64));
        assert_ne!(ctx.int_const(7, 64), ctx.int_const(7, 32));
        let f = ApFloat::from_f64(1.5, 64);
        assert_eq!(ctx.float_constant(f), ctx.float_constant(f));
        let i64_ty = ctx.int_ty(64);
        assert_eq!(ctx.undef(i64_ty), ctx.undef(i64_ty));
        assert_eq!(ctx.null_pointer(), ctx.null_pointer());
    }

    #[test]
    fn struct_layout_follows_padding_rules() {
        let mut ctx = Context::new();
        let i8_ty = ctx.int_ty(8);
        let i64_ty = ctx.int_ty(64);
        let ty = ctx.anon_struct_ty(vec![i8_ty, i64_ty, i8_ty]);
        let layout = ctx.layout_of(ty);
        assert_eq!(ctx.member_offset(ty, 0), 0);
        assert_eq!(ctx.member_offset(ty, 1), 8);
        assert_eq!(ctx.member_offset(ty, 2), 16);
        assert_eq!(layout.size, 24);
        assert_eq!(layout.align, 8);
    }
}
