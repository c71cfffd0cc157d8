//! Basic block and function handles
//!
//! A block is a non-empty ordered list of instructions ending in a
//! terminator, with all phis first. Each block tracks one predecessor entry
//! per incoming control-flow edge; phi arguments align with that list
//! position-wise. A function owns its parameters and blocks; the first
//! block is the entry.

use crate::context::Context;
use crate::instruction::PhiMapping;
use crate::types::Ty;
use crate::value::{Block, BlockData, Function, FunctionData, Value, ValueData, ValueKind};
use smallvec::SmallVec;

impl Context {
    /// Creates a detached basic block.
    pub fn create_block(&mut self, name: impl Into<String>) -> Block {
        let label = self.label_ty();
        let value = self.alloc_value(ValueData::new(
            ValueKind::Block(BlockData::default()),
            label,
            Some(name.into()),
        ));
        Block(value)
    }

    /// Creates a function with parameter values. The function id is assigned
    /// when the function is added to a module.
    pub fn create_function(
        &mut self,
        name: impl Into<String>,
        return_ty: Ty,
        params: impl IntoIterator<Item = (Ty, String)>,
    ) -> Function {
        let ptr = self.ptr_ty();
        let func_value = self.alloc_value(ValueData::new(
            ValueKind::Function(FunctionData {
                return_ty,
                params: Vec::new(),
                blocks: Vec::new(),
                version: 0,
                id: u32::MAX,
            }),
            ptr,
            Some(name.into()),
        ));
        let params: Vec<Value> = params
            .into_iter()
            .enumerate()
            .map(|(index, (ty, param_name))| {
                self.alloc_value(ValueData::new(
                    ValueKind::Parameter { function: func_value, index },
                    ty,
                    Some(param_name),
                ))
            })
            .collect();
        match &mut self.value_data_mut(func_value).kind {
            ValueKind::Function(data) => data.params = params,
            _ => unreachable!(),
        }
        Function(func_value)
    }
}

impl Block {
    pub fn data<'a>(&self, ctx: &'a Context) -> &'a BlockData {
        match &ctx.value_data(self.0).kind {
            ValueKind::Block(data) => data,
            _ => panic!("not a basic block"),
        }
    }

    fn data_mut<'a>(&self, ctx: &'a mut Context) -> &'a mut BlockData {
        match &mut ctx.value_data_mut(self.0).kind {
            ValueKind::Block(data) => data,
            _ => panic!("not a basic block"),
        }
    }

    pub fn name<'a>(&self, ctx: &'a Context) -> &'a str {
        ctx.value_name(self.0).unwrap_or("")
    }

    pub fn parent(&self, ctx: &Context) -> Option<Function> {
        self.data(ctx).parent.map(Function)
    }

    fn bump_parent_version(&self, ctx: &mut Context) {
        if let Some(function) = self.parent(ctx) {
            function.bump_version(ctx);
        }
    }

    pub fn instructions<'a>(&self, ctx: &'a Context) -> &'a [Value] {
        &self.data(ctx).instructions
    }

    pub fn is_empty(&self, ctx: &Context) -> bool {
        self.data(ctx).instructions.is_empty()
    }

    /// Appends an instruction, taking ownership.
    pub fn push_inst(&self, ctx: &mut Context, inst: Value) {
        let index = self.data(ctx).instructions.len();
        self.insert_inst(ctx, index, inst);
    }

    /// Inserts an instruction at a position in the block.
    pub fn insert_inst(&self, ctx: &mut Context, index: usize, inst: Value) {
        debug_assert!(inst.inst_data(ctx).is_some_and(|d| d.parent.is_none()), "instruction already attached");
        ctx.inst_data_mut(inst).parent = Some(self.0);
        self.data_mut(ctx).instructions.insert(index, inst);
        self.bump_parent_version(ctx);
    }

    /// Inserts an instruction directly before another instruction of this
    /// block.
    pub fn insert_inst_before(&self, ctx: &mut Context, before: Value, inst: Value) {
        let index = self.inst_index(ctx, before).expect("before-instruction not in block");
        self.insert_inst(ctx, index, inst);
    }

    pub fn inst_index(&self, ctx: &Context, inst: Value) -> Option<usize> {
        self.data(ctx).instructions.iter().position(|&i| i == inst)
    }

    /// Detaches an instruction without destroying it.
    pub fn detach_inst(&self, ctx: &mut Context, inst: Value) {
        let index = self.inst_index(ctx, inst).expect("instruction not in block");
        self.data_mut(ctx).instructions.remove(index);
        ctx.inst_data_mut(inst).parent = None;
        self.bump_parent_version(ctx);
    }

    /// Detaches and destroys an instruction. The instruction must have no
    /// remaining users.
    pub fn erase_inst(&self, ctx: &mut Context, inst: Value) {
        self.detach_inst(ctx, inst);
        ctx.destroy_inst(inst);
    }

    pub fn terminator(&self, ctx: &Context) -> Option<Value> {
        let last = *self.data(ctx).instructions.last()?;
        last.is_terminator(ctx).then_some(last)
    }

    /// The phi instructions at the top of the block.
    pub fn phis(&self, ctx: &Context) -> Vec<Value> {
        self.data(ctx)
            .instructions
            .iter()
            .copied()
            .take_while(|inst| inst.is_phi(ctx))
            .collect()
    }

    /// Index of the first non-phi instruction.
    pub fn first_non_phi(&self, ctx: &Context) -> usize {
        self.data(ctx)
            .instructions
            .iter()
            .position(|inst| !inst.is_phi(ctx))
            .unwrap_or_else(|| self.data(ctx).instructions.len())
    }

    pub fn is_entry(&self, ctx: &Context) -> bool {
        self.parent(ctx)
            .is_some_and(|function| function.entry(ctx) == Some(*self))
    }

    pub fn predecessors(&self, ctx: &Context) -> Vec<Block> {
        self.data(ctx).predecessors.iter().map(|&v| Block(v)).collect()
    }

    pub fn predecessor_count(&self, ctx: &Context) -> usize {
        self.data(ctx).predecessors.len()
    }

    pub fn is_predecessor(&self, ctx: &Context, pred: Block) -> bool {
        self.data(ctx).predecessors.contains(&pred.0)
    }

    pub fn has_single_predecessor(&self, ctx: &Context) -> bool {
        self.predecessor_count(ctx) == 1
    }

    pub fn single_predecessor(&self, ctx: &Context) -> Option<Block> {
        match self.data(ctx).predecessors.as_slice() {
            [single] => Some(Block(*single)),
            _ => None,
        }
    }

    pub fn successors(&self, ctx: &Context) -> SmallVec<[Block; 2]> {
        match self.terminator(ctx) {
            Some(term) => term.successors(ctx),
            None => SmallVec::new(),
        }
    }

    pub fn has_single_successor(&self, ctx: &Context) -> bool {
        self.successors(ctx).len() == 1
    }

    pub fn single_successor(&self, ctx: &Context) -> Option<Block> {
        match self.successors(ctx).as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }

    pub fn add_predecessor(&self, ctx: &mut Context, pred: Block) {
        self.data_mut(ctx).predecessors.push(pred.0);
        self.bump_parent_version(ctx);
    }

    /// Removes a predecessor edge and drops the corresponding argument of
    /// every phi in this block.
    pub fn remove_predecessor(&self, ctx: &mut Context, pred: Block) {
        let index = self
            .data(ctx)
            .predecessors
            .iter()
            .position(|&p| p == pred.0)
            .expect("not a predecessor");
        self.data_mut(ctx).predecessors.remove(index);
        for phi in self.phis(ctx) {
            phi_remove_arg(ctx, phi, index);
        }
        self.bump_parent_version(ctx);
    }

    /// Re-targets the predecessor entry `old` to `new` and rewrites phi
    /// predecessor slots accordingly.
    pub fn update_predecessor(&self, ctx: &mut Context, old: Block, new: Block) {
        let index = self
            .data(ctx)
            .predecessors
            .iter()
            .position(|&p| p == old.0)
            .expect("not a predecessor");
        self.data_mut(ctx).predecessors[index] = new.0;
        for phi in self.phis(ctx) {
            let args = phi.phi_args(ctx);
            let slot = args.len() + index;
            ctx.set_operand(phi, slot, new.0);
        }
        self.bump_parent_version(ctx);
    }

    /// Moves all instructions of `other` to the end of this block.
    pub fn splice_from(&self, ctx: &mut Context, other: Block) {
        let moved = std::mem::take(&mut other.data_mut(ctx).instructions);
        for &inst in &moved {
            ctx.inst_data_mut(inst).parent = Some(self.0);
        }
        self.data_mut(ctx).instructions.extend(moved);
        self.bump_parent_version(ctx);
    }
}

/// Removes the argument at `index` from a phi, keeping value and block
/// halves aligned.
pub fn phi_remove_arg(ctx: &mut Context, phi: Value, index: usize) {
    let args = phi.phi_args(ctx);
    let n = args.len();
    debug_assert!(index < n, "phi argument index out of range");
    ctx.unregister_phi_slots(phi, index, n);
}

impl Context {
    pub(crate) fn unregister_phi_slots(&mut self, phi: Value, index: usize, n: usize) {
        // Drop the use-edges of the removed value and block slots, then
        // rebuild the operand list without them.
        let (value_op, block_op) = {
            let data = self.value_data(phi);
            match &data.kind {
                ValueKind::Inst(inst) => (inst.operands[index], inst.operands[n + index]),
                _ => panic!("not a phi"),
            }
        };
        self.remove_one_user(value_op, phi);
        self.remove_one_user(block_op, phi);
        let inst = self.inst_data_mut(phi);
        inst.operands.remove(n + index);
        inst.operands.remove(index);
    }

    pub(crate) fn remove_one_user(&mut self, value: Value, user: Value) {
        if let Some(data) = self.values.get_mut(value.0) {
            if let Some(pos) = data.users.iter().position(|&u| u == user) {
                data.users.swap_remove(pos);
            }
        }
    }

    /// Replaces all arguments of a phi at once, maintaining use-edges.
    pub fn phi_set_args(&mut self, phi: Value, args: &[PhiMapping]) {
        self.clear_operands(phi);
        {
            let inst = self.inst_data_mut(phi);
            inst.operands.extend(args.iter().map(|a| a.value));
            inst.operands.extend(args.iter().map(|a| a.pred.0));
        }
        self.register_uses(phi);
    }

    /// Appends an argument to a phi; the caller keeps the owning block's
    /// predecessor list in sync.
    pub fn phi_add_arg(&mut self, phi: Value, mapping: PhiMapping) {
        let n = phi.phi_args(self).len();
        {
            let inst = self.inst_data_mut(phi);
            inst.operands.insert(n, mapping.value);
            inst.operands.push(mapping.pred.0);
        }
        self.values[mapping.value.0].users.push(phi);
        self.values[mapping.pred.0 .0].users.push(phi);
    }
}

impl Function {
    pub fn data<'a>(&self, ctx: &'a Context) -> &'a FunctionData {
        match &ctx.value_data(self.0).kind {
            ValueKind::Function(data) => data,
            _ => panic!("not a function"),
        }
    }

    fn data_mut<'a>(&self, ctx: &'a mut Context) -> &'a mut FunctionData {
        match &mut ctx.value_data_mut(self.0).kind {
            ValueKind::Function(data) => data,
            _ => panic!("not a function"),
        }
    }

    pub fn name<'a>(&self, ctx: &'a Context) -> &'a str {
        ctx.value_name(self.0).unwrap_or("")
    }

    pub fn return_ty(&self, ctx: &Context) -> Ty {
        self.data(ctx).return_ty
    }

    pub fn params<'a>(&self, ctx: &'a Context) -> &'a [Value] {
        &self.data(ctx).params
    }

    pub fn blocks(&self, ctx: &Context) -> Vec<Block> {
        self.data(ctx).blocks.iter().map(|&v| Block(v)).collect()
    }

    pub fn entry(&self, ctx: &Context) -> Option<Block> {
        self.data(ctx).blocks.first().map(|&v| Block(v))
    }

    pub fn id(&self, ctx: &Context) -> u32 {
        self.data(ctx).id
    }

    pub(crate) fn set_id(&self, ctx: &mut Context, id: u32) {
        self.data_mut(ctx).id = id;
    }

    pub fn version(&self, ctx: &Context) -> u64 {
        self.data(ctx).version
    }

    pub fn bump_version(&self, ctx: &mut Context) {
        self.data_mut(ctx).version += 1;
    }

    /// Appends a block, taking ownership.
    pub fn add_block(&self, ctx: &mut Context, block: Block) {
        debug_assert!(block.data(ctx).parent.is_none(), "block already attached");
        block.data_mut(ctx).parent = Some(self.0);
        self.data_mut(ctx).blocks.push(block.0);
        self.bump_version(ctx);
    }

    /// Inserts a block directly after an existing block.
    pub fn insert_block_after(&self, ctx: &mut Context, after: Block, block: Block) {
        debug_assert!(block.data(ctx).parent.is_none(), "block already attached");
        let index = self
            .data(ctx)
            .blocks
            .iter()
            .position(|&b| b == after.0)
            .expect("anchor block not in function");
        block.data_mut(ctx).parent = Some(self.0);
        self.data_mut(ctx).blocks.insert(index + 1, block.0);
        self.bump_version(ctx);
    }

    /// Detaches and destroys a block: removes it from its successors'
    /// predecessor lists and destroys all contained instructions in block
    /// order.
    pub fn remove_block(&self, ctx: &mut Context, block: Block) {
        for succ in block.successors(ctx) {
            if succ.is_predecessor(ctx, block) {
                succ.remove_predecessor(ctx, block);
            }
        }
        let index = self
            .data(ctx)
            .blocks
            .iter()
            .position(|&b| b == block.0)
            .expect("block not in function");
        self.data_mut(ctx).blocks.remove(index);
        let instructions = std::mem::take(&mut block.data_mut(ctx).instructions);
        for &inst in &instructions {
            ctx.clear_operands(inst);
        }
        for inst in instructions {
            ctx.destroy_inst(inst);
        }
        debug_assert!(
            ctx.value_users(block.0).is_empty(),
            "destroying a block that is still referenced"
        );
        ctx.values.remove(block.0 .0);
        self.bump_version(ctx);
    }

    /// All instructions of the function in block order.
    pub fn instructions(&self, ctx: &Context) -> Vec<Value> {
        self.blocks(ctx)
            .into_iter()
            .flat_map(|block| block.instructions(ctx).to_vec())
            .collect()
    }
}
