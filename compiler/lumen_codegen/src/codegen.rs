//! IR to assembly-stream code generation
//!
//! One pass per function: critical edges are split on the IR, a register
//! descriptor maps SSA values to abstract registers (one register per
//! scalar leaf; aggregates occupy contiguous blocks), and each basic block
//! is emitted behind a local label. Phi nodes are resolved by emitting
//! `mov`s into each predecessor directly before its terminator. A compare
//! whose only user is the block's own branch fuses into a conditional
//! jump selected from the comparison operation.
//!
//! Calls use a register-window convention: arguments are moved into a
//! window at the top of the caller's frame, the callee sees the window as
//! its first registers and leaves the return value there. Window
//! registers are emitted relative and relocated once the frame size is
//! known.

use crate::asm::{AsmInstruction, AssemblyStream, Element, Label, RegisterIndex, Value64};
use crate::regdesc::{flatten_leaves, register_width, RegisterDescriptor};
use hashbrown::{HashMap, HashSet};
use lumen_common::{LumenError, LumenResult};
use lumen_ir::{
    ArithmeticOp, Block, CompareMode, Context, Conversion, Function, Inst, InstOp, Module, Ty,
    TypeData, UnaryArithmeticOp, Value, ValueKind,
};
use log::debug;

/// Byte offsets of globals in the program's data image.
pub type GlobalLayout = HashMap<Value, u64>;

/// Lays the module's globals out in a flat data image; the assembler
/// writes their initializers there.
pub fn layout_globals(ctx: &Context, module: &Module) -> (GlobalLayout, u64) {
    let mut layout = GlobalLayout::new();
    let mut offset = 0u64;
    for &global in module.globals() {
        let ValueKind::Global(data) = &ctx.value_data(global).kind else {
            continue;
        };
        let l = ctx.layout_of(data.value_ty);
        offset = (offset + l.align - 1) & !(l.align - 1);
        layout.insert(global, offset);
        offset += l.size;
    }
    (layout, offset)
}

/// Generates the assembly stream for a whole module.
pub fn generate_module(ctx: &mut Context, module: &Module) -> LumenResult<AssemblyStream> {
    let (globals, _) = layout_globals(ctx, module);
    let mut stream = AssemblyStream::new();
    for &function in module.functions() {
        split_critical_edges(ctx, function);
        let mut gen = FunctionCodeGen::new(ctx, &globals);
        let body = gen.run(function)?;
        stream.extend(body);
    }
    stream.push(Element::EndOfProgram);
    Ok(stream)
}

/// Splits edges from a multi-successor block into a multi-predecessor
/// block by inserting a forwarding block.
pub fn split_critical_edges(ctx: &mut Context, function: Function) -> bool {
    let mut changed = false;
    for block in function.blocks(ctx) {
        let Some(term) = block.terminator(ctx) else {
            continue;
        };
        let succs = term.successors(ctx);
        if succs.len() < 2 {
            continue;
        }
        for (slot, succ) in succs.iter().enumerate() {
            if succ.predecessor_count(ctx) < 2 {
                continue;
            }
            let name = ctx.unique_name("split");
            let split = ctx.create_block(name);
            function.insert_block_after(ctx, block, split);
            let forward = Inst::goto(ctx, *succ);
            split.push_inst(ctx, forward);
            // Branch operand slots: [cond, then, else].
            ctx.set_operand(term, slot + 1, split.0);
            succ.update_predecessor(ctx, block, split);
            split.add_predecessor(ctx, block);
            changed = true;
        }
    }
    changed
}

struct FunctionCodeGen<'a> {
    ctx: &'a mut Context,
    globals: &'a GlobalLayout,
    rd: RegisterDescriptor,
    block_index: HashMap<Block, u32>,
    /// Moves appended to a block just before its terminator, resolving the
    /// phis of its successors.
    pending_phi_moves: HashMap<Block, Vec<(usize, Ty, Value)>>,
    /// Compares that fuse into their block's branch.
    fused_compares: HashSet<Value>,
    body: AssemblyStream,
    /// `(element index, relative window register)` pairs relocated to the
    /// top of the frame once its size is known.
    window_fixups: Vec<(usize, usize)>,
    max_window: usize,
}

impl<'a> FunctionCodeGen<'a> {
    fn new(ctx: &'a mut Context, globals: &'a GlobalLayout) -> Self {
        Self {
            ctx,
            globals,
            rd: RegisterDescriptor::new(),
            block_index: HashMap::new(),
            pending_phi_moves: HashMap::new(),
            fused_compares: HashSet::new(),
            body: AssemblyStream::new(),
            window_fixups: Vec::new(),
            max_window: 0,
        }
    }

    fn run(&mut self, function: Function) -> LumenResult<AssemblyStream> {
        let fid = function.id(self.ctx);
        debug!("codegen: function @{}", function.name(self.ctx));
        let params = function.params(self.ctx).to_vec();
        self.rd.declare_parameters(self.ctx, &params);

        let blocks = function.blocks(self.ctx);
        for (index, &block) in blocks.iter().enumerate() {
            self.block_index.insert(block, index as u32);
        }

        // Phi destinations and the moves that feed them.
        for &block in &blocks {
            for phi in block.phis(self.ctx) {
                let dst = self.rd.register_of(self.ctx, phi);
                let ty = self.ctx.value_ty(phi);
                for arg in phi.phi_args(self.ctx) {
                    self.pending_phi_moves
                        .entry(arg.pred)
                        .or_default()
                        .push((dst, ty, arg.value));
                }
            }
        }

        // Compare/branch fusion candidates.
        for &block in &blocks {
            let Some(term) = block.terminator(self.ctx) else {
                continue;
            };
            let Some(data) = term.inst_data(self.ctx) else {
                continue;
            };
            if !matches!(data.op, InstOp::Branch) {
                continue;
            }
            let cond = data.operands[0];
            let fusable = cond
                .inst_data(self.ctx)
                .is_some_and(|d| matches!(d.op, InstOp::Compare { .. }) && d.parent == Some(block.0))
                && self.ctx.value_users(cond).len() == 1;
            if fusable {
                self.fused_compares.insert(cond);
            }
        }

        for &block in &blocks {
            let index = self.block_index[&block];
            self.body.label(Label::block(fid, index));
            for inst in block.instructions(self.ctx).to_vec() {
                if inst.is_terminator(self.ctx) {
                    self.emit_pending_phi_moves(block);
                    self.emit_terminator(fid, inst)?;
                } else {
                    self.emit_inst(inst)?;
                }
            }
        }

        // Relocate call windows to the top of the finished frame.
        let frame = self.rd.used_registers();
        for &(position, relative) in &self.window_fixups {
            let absolute = frame + relative;
            match &mut self.body.elements[position] {
                Element::Register(reg) => {
                    reg.index = u8::try_from(absolute)
                        .map_err(|_| LumenError::codegen_error("register frame overflow"))?;
                }
                Element::Value8(base) => {
                    *base = u8::try_from(absolute)
                        .map_err(|_| LumenError::codegen_error("register frame overflow"))?;
                }
                other => unreachable!("window fixup on {other:?}"),
            }
        }

        let mut out = AssemblyStream::new();
        out.label(Label::function(fid));
        out.instruction(AsmInstruction::EnterFn);
        out.push(Element::Value16((frame + self.max_window) as u16));
        out.extend(std::mem::take(&mut self.body));
        Ok(out)
    }

    // ## Operand resolution

    /// Resolves a value to an operand element. Constants become
    /// immediates, globals their data-image address, functions their
    /// label, everything else a register.
    fn resolve_operand(&mut self, value: Value) -> Element {
        match &self.ctx.value_data(value).kind {
            ValueKind::Global(_) => {
                Element::Value64(Value64::unsigned(self.globals[&value]))
            }
            ValueKind::Function(data) => Element::Label(Label::function(data.id)),
            _ => self.rd.resolve(self.ctx, value),
        }
    }

    /// The memory operand for an access through `address` at `byte_off`.
    fn address_of(&mut self, address: Value, byte_off: u64) -> Element {
        if matches!(self.ctx.value_data(address).kind, ValueKind::Global(_)) {
            // Materialize the data-image address into a scratch register.
            let offset = self.globals[&address];
            let tmp = self.rd.make_temporary();
            self.binary(
                AsmInstruction::Mov,
                reg(tmp),
                Element::Value64(Value64::unsigned(offset)),
            );
            debug_assert!(byte_off < 256);
            return Element::Memory(crate::asm::MemoryAddress::new(tmp as u8, byte_off as u8, 0));
        }
        Element::Memory(self.rd.resolve_addr_offset(self.ctx, address, byte_off))
    }

    /// Resolves an operand, forcing non-register forms into a scratch
    /// register.
    fn operand_in_register(&mut self, value: Value) -> Element {
        let resolved = self.resolve_operand(value);
        match resolved {
            Element::Register(_) => resolved,
            other => {
                let tmp = self.rd.make_temporary();
                self.binary(AsmInstruction::Mov, reg(tmp), other);
                reg(tmp)
            }
        }
    }

    // ## Emission helpers

    fn binary(&mut self, family: AsmInstruction, a: Element, b: Element) {
        self.body.instruction(family);
        self.body.push(a);
        self.body.push(b);
    }

    fn unary(&mut self, family: AsmInstruction, a: Element) {
        self.body.instruction(family);
        self.body.push(a);
    }

    /// Pushes a window-relative register and records it for relocation.
    fn push_window_reg(&mut self, relative: usize) {
        self.max_window = self.max_window.max(relative + 1);
        self.window_fixups.push((self.body.elements.len(), relative));
        self.body.push(Element::Register(RegisterIndex { index: 0 }));
    }

    fn push_window_base(&mut self, relative: usize) {
        self.window_fixups.push((self.body.elements.len(), relative));
        self.body.push(Element::Value8(0));
    }

    fn emit_pending_phi_moves(&mut self, block: Block) {
        let Some(moves) = self.pending_phi_moves.get(&block).cloned() else {
            return;
        };
        for (dst, ty, value) in moves {
            self.emit_mov_value(dst, ty, value);
        }
    }

    /// Moves a value of any type into the register block at `dst`.
    fn emit_mov_value(&mut self, dst: usize, ty: Ty, value: Value) {
        let width = register_width(self.ctx, ty);
        if width == 0 {
            return;
        }
        if let Some(leaves) = constant_leaves(self.ctx, value) {
            for (i, leaf) in leaves.into_iter().enumerate() {
                self.binary(AsmInstruction::Mov, reg(dst + i), Element::Value64(leaf));
            }
            return;
        }
        if width == 1 {
            let src = self.resolve_operand(value);
            self.binary(AsmInstruction::Mov, reg(dst), src);
            return;
        }
        let src = self.rd.register_of(self.ctx, value);
        for i in 0..width {
            self.binary(AsmInstruction::Mov, reg(dst + i), reg(src + i));
        }
    }

    /// Moves a value into the call window at relative offset `rel`.
    fn emit_mov_to_window(&mut self, rel: usize, ty: Ty, value: Value) {
        let width = register_width(self.ctx, ty);
        if width == 0 {
            return;
        }
        if let Some(leaves) = constant_leaves(self.ctx, value) {
            for (i, leaf) in leaves.into_iter().enumerate() {
                self.body.instruction(AsmInstruction::Mov);
                self.push_window_reg(rel + i);
                self.body.push(Element::Value64(leaf));
            }
            return;
        }
        if width == 1 {
            let src = self.resolve_operand(value);
            self.body.instruction(AsmInstruction::Mov);
            self.push_window_reg(rel);
            self.body.push(src);
            return;
        }
        let src = self.rd.register_of(self.ctx, value);
        for i in 0..width {
            self.body.instruction(AsmInstruction::Mov);
            self.push_window_reg(rel + i);
            self.body.push(reg(src + i));
        }
    }

    // ## Instructions

    fn emit_inst(&mut self, inst: Value) -> LumenResult<()> {
        let data = inst.inst_data(self.ctx).expect("instruction").clone();
        match &data.op {
            InstOp::Alloca { allocated } => {
                if !data.operands.is_empty() {
                    return Err(LumenError::codegen_error(
                        "dynamic-count alloca reaches code generation",
                    ));
                }
                let size = self.ctx.size_of(*allocated);
                let dst = self.rd.register_of(self.ctx, inst);
                self.body.instruction(AsmInstruction::Alloca);
                self.body.push(reg(dst));
                self.body.push(Element::Value16(size as u16));
            }
            InstOp::Load { loaded } => {
                let addr = data.operands[0];
                let dst = self.rd.register_of(self.ctx, inst);
                for (reg_off, byte_off, _) in flatten_leaves(self.ctx, *loaded) {
                    let mem = self.address_of(addr, byte_off);
                    self.binary(AsmInstruction::Mov, reg(dst + reg_off), mem);
                }
            }
            InstOp::Store => {
                let addr = data.operands[0];
                let value = data.operands[1];
                let ty = self.ctx.value_ty(value);
                let leaves = flatten_leaves(self.ctx, ty);
                let const_leaves = constant_leaves(self.ctx, value);
                for (i, (reg_off, byte_off, _)) in leaves.into_iter().enumerate() {
                    let src = match &const_leaves {
                        Some(values) => {
                            // Memory stores take a register source.
                            let tmp = self.rd.make_temporary();
                            self.binary(AsmInstruction::Mov, reg(tmp), Element::Value64(values[i]));
                            tmp
                        }
                        None => self.rd.register_of(self.ctx, value) + reg_off,
                    };
                    let mem = self.address_of(addr, byte_off);
                    self.binary(AsmInstruction::Mov, mem, reg(src));
                }
            }
            InstOp::Gep { inbounds_ty, member_indices, .. } => {
                let base = data.operands[0];
                let array_index = data.operands[1];
                let dst = self.rd.register_of(self.ctx, inst);
                let layout = self.ctx.layout_of(*inbounds_ty);
                let stride = (layout.size + layout.align - 1) & !(layout.align - 1);
                let (_, member_off, _) = member_path(self.ctx, *inbounds_ty, member_indices);
                let base_resolved = self.resolve_operand(base);
                self.binary(AsmInstruction::Mov, reg(dst), base_resolved);
                match self.ctx.as_int_constant(array_index) {
                    Some(index) => {
                        let total = index.as_i64() * stride as i64 + member_off as i64;
                        if total != 0 {
                            self.binary(
                                AsmInstruction::Add,
                                reg(dst),
                                Element::Value64(Value64::signed(total)),
                            );
                        }
                    }
                    None => {
                        let tmp = self.rd.make_temporary();
                        let index = self.resolve_operand(array_index);
                        self.binary(AsmInstruction::Mov, reg(tmp), index);
                        self.binary(
                            AsmInstruction::Mul,
                            reg(tmp),
                            Element::Value64(Value64::unsigned(stride)),
                        );
                        self.binary(AsmInstruction::Add, reg(dst), reg(tmp));
                        if member_off != 0 {
                            self.binary(
                                AsmInstruction::Add,
                                reg(dst),
                                Element::Value64(Value64::unsigned(member_off)),
                            );
                        }
                    }
                }
            }
            InstOp::Arith(op) => {
                let dst = self.rd.register_of(self.ctx, inst);
                let lhs = self.resolve_operand(data.operands[0]);
                let rhs = self.resolve_operand(data.operands[1]);
                self.binary(AsmInstruction::Mov, reg(dst), lhs);
                self.binary(arith_family(*op), reg(dst), rhs);
            }
            InstOp::UnaryArith(op) => {
                let dst = self.rd.register_of(self.ctx, inst);
                let operand = self.resolve_operand(data.operands[0]);
                match op {
                    UnaryArithmeticOp::BitwiseNot => {
                        self.binary(AsmInstruction::Mov, reg(dst), operand);
                        self.unary(AsmInstruction::BNt, reg(dst));
                    }
                    UnaryArithmeticOp::LogicalNot => {
                        self.binary(AsmInstruction::Mov, reg(dst), operand);
                        self.unary(AsmInstruction::LNt, reg(dst));
                    }
                    UnaryArithmeticOp::Negate => {
                        let ty = self.ctx.value_ty(inst);
                        if self.ctx.type_data(ty).is_float() {
                            self.binary(
                                AsmInstruction::Mov,
                                reg(dst),
                                Element::Value64(Value64::float(0.0)),
                            );
                            self.binary(AsmInstruction::FSub, reg(dst), operand);
                        } else {
                            self.binary(
                                AsmInstruction::Mov,
                                reg(dst),
                                Element::Value64(Value64::signed(0)),
                            );
                            self.binary(AsmInstruction::Sub, reg(dst), operand);
                        }
                    }
                }
            }
            InstOp::Compare { mode, op } => {
                if self.fused_compares.contains(&inst) {
                    // Emitted with the branch.
                    return Ok(());
                }
                let lhs = self.operand_in_register(data.operands[0]);
                let rhs = self.resolve_operand(data.operands[1]);
                self.binary(compare_family(*mode), lhs, rhs);
                let dst = self.rd.register_of(self.ctx, inst);
                self.unary(crate::opcode::set_for_compare(*op), reg(dst));
            }
            InstOp::Convert(conv) => self.emit_convert(inst, *conv, data.operands[0]),
            InstOp::ExtractValue { indices } => {
                let base = data.operands[0];
                let base_ty = self.ctx.value_ty(base);
                let (reg_off, _, member_ty) = member_path(self.ctx, base_ty, indices);
                let dst = self.rd.register_of(self.ctx, inst);
                let width = register_width(self.ctx, member_ty);
                match constant_leaves(self.ctx, base) {
                    Some(leaves) => {
                        for i in 0..width {
                            self.binary(
                                AsmInstruction::Mov,
                                reg(dst + i),
                                Element::Value64(leaves[reg_off + i]),
                            );
                        }
                    }
                    None => {
                        let src = self.rd.register_of(self.ctx, base);
                        for i in 0..width {
                            self.binary(AsmInstruction::Mov, reg(dst + i), reg(src + reg_off + i));
                        }
                    }
                }
            }
            InstOp::InsertValue { indices } => {
                let base = data.operands[0];
                let inserted = data.operands[1];
                let base_ty = self.ctx.value_ty(base);
                let dst = self.rd.register_of(self.ctx, inst);
                self.emit_mov_value(dst, base_ty, base);
                let (reg_off, _, member_ty) = member_path(self.ctx, base_ty, indices);
                self.emit_mov_value(dst + reg_off, member_ty, inserted);
            }
            InstOp::Select => {
                // cond is i1, so `0 - cond` is an all-ones or all-zero
                // mask and each leaf is `(then & mask) | (else & !mask)`.
                let dst = self.rd.register_of(self.ctx, inst);
                let ty = self.ctx.value_ty(inst);
                let width = register_width(self.ctx, ty);
                let cond = self.operand_in_register(data.operands[0]);
                let mask = self.rd.make_temporary();
                self.binary(AsmInstruction::Mov, reg(mask), Element::Value64(Value64::signed(0)));
                self.binary(AsmInstruction::Sub, reg(mask), cond);
                let then_tmp = self.rd.allocate_automatic(width);
                let else_tmp = self.rd.allocate_automatic(width);
                self.emit_mov_value(then_tmp, ty, data.operands[1]);
                self.emit_mov_value(else_tmp, ty, data.operands[2]);
                for i in 0..width {
                    self.binary(AsmInstruction::And, reg(then_tmp + i), reg(mask));
                    self.unary(AsmInstruction::BNt, reg(mask));
                    self.binary(AsmInstruction::And, reg(else_tmp + i), reg(mask));
                    self.unary(AsmInstruction::BNt, reg(mask));
                    self.binary(AsmInstruction::Mov, reg(dst + i), reg(then_tmp + i));
                    self.binary(AsmInstruction::Or, reg(dst + i), reg(else_tmp + i));
                }
            }
            InstOp::Call => self.emit_call(inst, &data.operands)?,
            InstOp::Phi => {
                // Resolved through predecessor moves; the destination
                // register was allocated up front.
            }
            InstOp::Goto | InstOp::Branch | InstOp::Return => {
                unreachable!("terminators are emitted separately")
            }
        }
        Ok(())
    }

    fn emit_convert(&mut self, inst: Value, conv: Conversion, operand: Value) {
        let dst = self.rd.register_of(self.ctx, inst);
        let resolved = self.resolve_operand(operand);
        self.binary(AsmInstruction::Mov, reg(dst), resolved);
        let target = self.ctx.value_ty(inst);
        let source = self.ctx.value_ty(operand);
        match conv {
            Conversion::Bitcast => {}
            Conversion::Zext => {
                if let Some(width) = self.ctx.type_data(source).bit_width() {
                    if width < 64 {
                        let mask = (1u64 << width) - 1;
                        self.binary(
                            AsmInstruction::And,
                            reg(dst),
                            Element::Value64(Value64::unsigned(mask)),
                        );
                    }
                }
            }
            Conversion::Trunc => {
                if let Some(width) = self.ctx.type_data(target).bit_width() {
                    if width < 64 {
                        let mask = (1u64 << width) - 1;
                        self.binary(
                            AsmInstruction::And,
                            reg(dst),
                            Element::Value64(Value64::unsigned(mask)),
                        );
                    }
                }
            }
            Conversion::Sext => {
                if let Some(width) = self.ctx.type_data(source).bit_width() {
                    if width < 64 {
                        let shift = Element::Value64(Value64::unsigned(64 - u64::from(width)));
                        self.binary(AsmInstruction::Sl, reg(dst), shift);
                        self.binary(AsmInstruction::Asr, reg(dst), shift);
                    }
                }
            }
            Conversion::UtoF => self.unary(AsmInstruction::Utof, reg(dst)),
            Conversion::StoF => self.unary(AsmInstruction::Stof, reg(dst)),
            Conversion::FtoU => self.unary(AsmInstruction::Ftou, reg(dst)),
            Conversion::FtoS => self.unary(AsmInstruction::Ftos, reg(dst)),
            Conversion::Fext => self.unary(AsmInstruction::Fext, reg(dst)),
            Conversion::Ftrunc => self.unary(AsmInstruction::Ftrunc, reg(dst)),
        }
    }

    fn emit_call(&mut self, inst: Value, operands: &[Value]) -> LumenResult<()> {
        let callee = operands[0];
        let args = &operands[1..];
        let ret_ty = self.ctx.value_ty(inst);
        let ret_width = register_width(self.ctx, ret_ty);
        let mut rel = 0usize;
        for &arg in args {
            let ty = self.ctx.value_ty(arg);
            self.emit_mov_to_window(rel, ty, arg);
            rel += register_width(self.ctx, ty);
        }
        self.max_window = self.max_window.max(rel.max(ret_width));
        match &self.ctx.value_data(callee).kind {
            ValueKind::Function(data) => {
                let label = Label::function(data.id);
                self.body.instruction(AsmInstruction::Call);
                self.body.push(Element::Label(label));
                self.push_window_base(0);
            }
            ValueKind::ForeignFunction(data) => {
                let address = crate::ffi::ForeignFuncAddress::new(data.slot, data.index).packed();
                self.body.instruction(AsmInstruction::CallExt);
                self.push_window_base(0);
                self.body.push(Element::Value32(address));
            }
            _ => {
                let target = self.operand_in_register(callee);
                self.body.instruction(AsmInstruction::CallInd);
                self.body.push(target);
                self.push_window_base(0);
            }
        }
        if ret_width > 0 {
            let dst = self.rd.register_of(self.ctx, inst);
            for i in 0..ret_width {
                self.body.instruction(AsmInstruction::Mov);
                self.body.push(reg(dst + i));
                self.push_window_reg(i);
            }
        }
        Ok(())
    }

    fn emit_terminator(&mut self, fid: u32, inst: Value) -> LumenResult<()> {
        let data = inst.inst_data(self.ctx).expect("terminator").clone();
        match data.op {
            InstOp::Goto => {
                let target = self.block_index[&Block(data.operands[0])];
                self.unary(AsmInstruction::Jmp, Element::Label(Label::block(fid, target)));
            }
            InstOp::Branch => {
                let cond = data.operands[0];
                let then_label = Label::block(fid, self.block_index[&Block(data.operands[1])]);
                let else_label = Label::block(fid, self.block_index[&Block(data.operands[2])]);
                let fused = if self.fused_compares.contains(&cond) {
                    let cond_data = cond.inst_data(self.ctx).expect("compare").clone();
                    match cond_data.op {
                        InstOp::Compare { mode, op } => {
                            Some((mode, op, cond_data.operands[0], cond_data.operands[1]))
                        }
                        _ => None,
                    }
                } else {
                    None
                };
                match fused {
                    Some((mode, op, lhs, rhs)) => {
                        let lhs = self.operand_in_register(lhs);
                        let rhs = self.resolve_operand(rhs);
                        self.binary(compare_family(mode), lhs, rhs);
                        self.unary(crate::opcode::jump_for_compare(op), Element::Label(then_label));
                    }
                    None => {
                        let cond = self.operand_in_register(cond);
                        self.unary(AsmInstruction::UTest, cond);
                        self.unary(AsmInstruction::Jne, Element::Label(then_label));
                    }
                }
                self.unary(AsmInstruction::Jmp, Element::Label(else_label));
            }
            InstOp::Return => {
                if let Some(&value) = data.operands.first() {
                    let ty = self.ctx.value_ty(value);
                    self.emit_mov_value(0, ty, value);
                }
                self.body.instruction(AsmInstruction::Ret);
            }
            _ => unreachable!("not a terminator"),
        }
        Ok(())
    }
}

fn reg(index: usize) -> Element {
    Element::Register(RegisterIndex::new(index))
}

fn arith_family(op: ArithmeticOp) -> AsmInstruction {
    match op {
        ArithmeticOp::Add => AsmInstruction::Add,
        ArithmeticOp::Sub => AsmInstruction::Sub,
        ArithmeticOp::Mul => AsmInstruction::Mul,
        ArithmeticOp::UDiv => AsmInstruction::Div,
        ArithmeticOp::SDiv => AsmInstruction::IDiv,
        ArithmeticOp::URem => AsmInstruction::Rem,
        ArithmeticOp::SRem => AsmInstruction::IRem,
        ArithmeticOp::FAdd => AsmInstruction::FAdd,
        ArithmeticOp::FSub => AsmInstruction::FSub,
        ArithmeticOp::FMul => AsmInstruction::FMul,
        ArithmeticOp::FDiv => AsmInstruction::FDiv,
        ArithmeticOp::LShL => AsmInstruction::Sl,
        ArithmeticOp::LShR => AsmInstruction::Sr,
        ArithmeticOp::AShL => AsmInstruction::Asl,
        ArithmeticOp::AShR => AsmInstruction::Asr,
        ArithmeticOp::And => AsmInstruction::And,
        ArithmeticOp::Or => AsmInstruction::Or,
        ArithmeticOp::XOr => AsmInstruction::XOr,
    }
}

fn compare_family(mode: CompareMode) -> AsmInstruction {
    match mode {
        CompareMode::Unsigned => AsmInstruction::UCmp,
        CompareMode::Signed => AsmInstruction::ICmp,
        CompareMode::Float => AsmInstruction::FCmp,
    }
}

/// Walks constant member indices through an aggregate type, returning the
/// register offset, byte offset and type of the addressed member.
fn member_path(ctx: &Context, ty: Ty, indices: &[u32]) -> (usize, u64, Ty) {
    let mut reg_off = 0usize;
    let mut byte_off = 0u64;
    let mut current = ty;
    for &index in indices {
        match ctx.type_data(current).clone() {
            TypeData::Struct { elems, .. } => {
                for &member in elems.iter().take(index as usize) {
                    reg_off += register_width(ctx, member);
                }
                byte_off += ctx.member_offset(current, index);
                current = elems[index as usize];
            }
            TypeData::Array { elem, .. } => {
                let layout = ctx.layout_of(elem);
                let stride = (layout.size + layout.align - 1) & !(layout.align - 1);
                reg_off += register_width(ctx, elem) * index as usize;
                byte_off += stride * u64::from(index);
                current = elem;
            }
            _ => panic!("member index into non-aggregate type"),
        }
    }
    (reg_off, byte_off, current)
}

/// Per-leaf immediates of a constant value, if it is one.
pub(crate) fn constant_leaves(ctx: &Context, value: Value) -> Option<Vec<Value64>> {
    match &ctx.value_data(value).kind {
        // Narrow integers materialize zero-extended so registers hold the
        // masked bit pattern.
        ValueKind::IntConst(v) if v.width() == 64 => Some(vec![Value64::signed(v.as_i64())]),
        ValueKind::IntConst(v) => Some(vec![Value64::unsigned(v.as_u64())]),
        ValueKind::FloatConst(v) => Some(vec![Value64::float(v.as_f64())]),
        ValueKind::NullPointer => Some(vec![Value64::unsigned(0)]),
        ValueKind::Undef => {
            let width = register_width(ctx, ctx.value_ty(value));
            Some(vec![Value64::unsigned(0); width.max(1)])
        }
        ValueKind::StructConst { elems } | ValueKind::ArrayConst { elems } => {
            let mut leaves = Vec::new();
            for &elem in elems {
                leaves.extend(constant_leaves(ctx, elem)?);
            }
            Some(leaves)
        }
        _ => None,
    }
}
