//! Function builder: insertion cursor over a pending function
//!
//! Used by the lowerer, the textual parser and tests. Local allocations go
//! to the top of the entry block so they dominate every use.

use crate::context::Context;
use crate::instruction::{
    ArithmeticOp, CompareMode, CompareOp, Conversion, Inst, PhiMapping, UnaryArithmeticOp,
};
use crate::types::Ty;
use crate::value::{Block, Function, Value};

pub struct FunctionBuilder<'ctx> {
    pub ctx: &'ctx mut Context,
    function: Function,
    current: Option<Block>,
    /// Number of allocas already placed at the top of the entry block.
    entry_allocas: usize,
}

impl<'ctx> FunctionBuilder<'ctx> {
    pub fn new(ctx: &'ctx mut Context, function: Function) -> Self {
        let current = function.entry(ctx);
        Self { ctx, function, current, entry_allocas: 0 }
    }

    pub fn function(&self) -> Function {
        self.function
    }

    pub fn current_block(&self) -> Block {
        self.current.expect("no insertion block")
    }

    pub fn set_insert_block(&mut self, block: Block) {
        self.current = Some(block);
    }

    /// Allocates a detached block.
    pub fn new_block(&mut self, name: impl Into<String>) -> Block {
        self.ctx.create_block(name)
    }

    /// Appends a block to the function and moves the cursor to it.
    pub fn add_block(&mut self, block: Block) -> Block {
        self.function.add_block(self.ctx, block);
        self.current = Some(block);
        block
    }

    /// Allocates and appends a block, moving the cursor to it.
    pub fn add_new_block(&mut self, name: impl Into<String>) -> Block {
        let block = self.new_block(name);
        self.add_block(block)
    }

    /// Appends an already constructed instruction at the cursor.
    pub fn insert(&mut self, inst: Value) -> Value {
        self.current_block().push_inst(self.ctx, inst);
        inst
    }

    /// Emits an `alloca` at the top of the entry block, regardless of the
    /// cursor.
    pub fn add_alloca(&mut self, allocated: Ty, name: impl Into<String>) -> Value {
        let entry = self.function.entry(self.ctx).expect("function has no entry block");
        let inst = Inst::alloca(self.ctx, allocated, name);
        entry.insert_inst(self.ctx, self.entry_allocas, inst);
        self.entry_allocas += 1;
        inst
    }

    pub fn load(&mut self, addr: Value, loaded: Ty, name: impl Into<String>) -> Value {
        let inst = Inst::load(self.ctx, addr, loaded, name);
        self.insert(inst)
    }

    pub fn store(&mut self, addr: Value, value: Value) -> Value {
        let inst = Inst::store(self.ctx, addr, value);
        self.insert(inst)
    }

    pub fn gep(
        &mut self,
        inbounds_ty: Ty,
        base: Value,
        array_index: Value,
        member_indices: impl IntoIterator<Item = u32>,
        name: impl Into<String>,
    ) -> Value {
        let inst = Inst::gep(self.ctx, inbounds_ty, base, array_index, member_indices, true, name);
        self.insert(inst)
    }

    pub fn arith(&mut self, op: ArithmeticOp, lhs: Value, rhs: Value, name: impl Into<String>) -> Value {
        let inst = Inst::arith(self.ctx, op, lhs, rhs, name);
        self.insert(inst)
    }

    pub fn unary_arith(&mut self, op: UnaryArithmeticOp, operand: Value, name: impl Into<String>) -> Value {
        let inst = Inst::unary_arith(self.ctx, op, operand, name);
        self.insert(inst)
    }

    pub fn compare(
        &mut self,
        mode: CompareMode,
        op: CompareOp,
        lhs: Value,
        rhs: Value,
        name: impl Into<String>,
    ) -> Value {
        let inst = Inst::compare(self.ctx, mode, op, lhs, rhs, name);
        self.insert(inst)
    }

    pub fn convert(&mut self, conv: Conversion, operand: Value, target: Ty, name: impl Into<String>) -> Value {
        let inst = Inst::convert(self.ctx, conv, operand, target, name);
        self.insert(inst)
    }

    pub fn insert_value(
        &mut self,
        base: Value,
        inserted: Value,
        indices: impl IntoIterator<Item = u32>,
        name: impl Into<String>,
    ) -> Value {
        let inst = Inst::insert_value(self.ctx, base, inserted, indices, name);
        self.insert(inst)
    }

    pub fn extract_value(
        &mut self,
        base: Value,
        indices: impl IntoIterator<Item = u32>,
        name: impl Into<String>,
    ) -> Value {
        let inst = Inst::extract_value(self.ctx, base, indices, name);
        self.insert(inst)
    }

    pub fn goto(&mut self, target: Block) -> Value {
        let inst = Inst::goto(self.ctx, target);
        self.insert(inst)
    }

    pub fn branch(&mut self, cond: Value, then_target: Block, else_target: Block) -> Value {
        let inst = Inst::branch(self.ctx, cond, then_target, else_target);
        self.insert(inst)
    }

    pub fn ret(&mut self, value: Option<Value>) -> Value {
        let inst = Inst::ret(self.ctx, value);
        self.insert(inst)
    }

    pub fn call(
        &mut self,
        return_ty: Ty,
        callee: Value,
        args: impl IntoIterator<Item = Value>,
        name: impl Into<String>,
    ) -> Value {
        let inst = Inst::call(self.ctx, return_ty, callee, args, name);
        self.insert(inst)
    }

    pub fn phi(&mut self, ty: Ty, args: &[PhiMapping], name: impl Into<String>) -> Value {
        let inst = Inst::phi(self.ctx, ty, args, name);
        let block = self.current_block();
        let index = block.first_non_phi(self.ctx);
        block.insert_inst(self.ctx, index, inst);
        inst
    }

    pub fn select(&mut self, cond: Value, then_value: Value, else_value: Value, name: impl Into<String>) -> Value {
        let inst = Inst::select(self.ctx, cond, then_value, else_value, name);
        self.insert(inst)
    }
}
