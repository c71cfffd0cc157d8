//! AST to SSA lowering
//!
//! Converts the decorated AST into IR while implementing value categories,
//! reference lifetimes, calling conventions and in-place construction of
//! non-trivial aggregates. All local allocations land at the top of the
//! entry block; structured statements lower by standard SSA construction
//! with a loop stack for `break`/`continue`; cleanup stacks drive
//! destructor emission on every exit path.

use crate::cc::{compute_cc, sema_size, CallingConvention, PassingConvention};
use crate::value::{Atom, LowerValue, Representation, ValueLocation};
use hashbrown::HashMap;
use lumen_ast::{
    BinaryOp, CleanupStack, ConstantValue, ConversionKind, Expr, ExprKind, FunctionDef,
    FunctionId, GlobalDef, LifetimeOpKind, LifetimeOperation, Program, SemaType, SemaTypeId, Stmt,
    SymbolTable, UnaryOp, ValueCategory, VariableId,
};
use lumen_common::{LumenError, LumenResult};
use lumen_ir::{
    setup_invariants, ArithmeticOp, Block, Builtin, CompareMode, CompareOp, Context, Conversion,
    Function as IrFunction, FunctionBuilder, InstOp, Module, PhiMapping, Ty, Value as IrValue,
};
use log::debug;

/// Lowers a whole decorated program into a fresh module.
pub fn lower_program(
    sym: &SymbolTable,
    ctx: &mut Context,
    name: &str,
    program: &Program,
) -> LumenResult<Module> {
    let mut module = Module::new(name);
    let mut types = TypeMap::default();
    let mut functions: HashMap<FunctionId, IrValue> = HashMap::new();
    let mut ccs: HashMap<FunctionId, CallingConvention> = HashMap::new();

    // Declarations first so calls and global initializers resolve.
    for (id, function) in sym.functions() {
        let cc = compute_cc(sym, function);
        let ir_value = declare_function(sym, ctx, &mut module, &mut types, id, &cc)?;
        functions.insert(id, ir_value);
        ccs.insert(id, cc);
    }

    // Globals: constant-initialized cells, or cell + init flag + getter.
    let mut globals: HashMap<VariableId, GlobalCell> = HashMap::new();
    let mut getter_defs: Vec<(IrFunction, GlobalDef)> = Vec::new();
    for def in &program.globals {
        let variable = sym.variable(def.variable);
        let ty = lower_type(&mut types, ctx, sym, variable.ty);
        if def.constant_init {
            let init = def
                .init
                .as_ref()
                .and_then(|e| lower_constant_expr(ctx, &mut types, sym, e));
            let Some(init) = init else {
                return Err(LumenError::lowering_error(format!(
                    "global '{}' lacks a constant initializer",
                    variable.name
                )));
            };
            let cell = module.add_global(ctx, &variable.name, ty, Some(init), true);
            globals.insert(def.variable, GlobalCell { cell, flag: None, getter: None });
        } else {
            let cell = module.add_global(ctx, &variable.name, ty, None, false);
            let bool_ty = ctx.bool_ty();
            let flag_init = ctx.bool_const(false);
            let flag = module.add_global(
                ctx,
                format!("{}.init", variable.name),
                bool_ty,
                Some(flag_init),
                false,
            );
            let ptr = ctx.ptr_ty();
            let getter =
                ctx.create_function(format!("{}.get", variable.name), ptr, Vec::new());
            module.add_function(ctx, getter);
            globals
                .insert(def.variable, GlobalCell { cell, flag: Some(flag), getter: Some(getter) });
            getter_defs.push((getter, def.clone()));
        }
    }

    // Getter bodies: test the flag, run the initializer once, return the
    // cell address.
    for (getter, def) in getter_defs {
        let cell_info = globals[&def.variable].clone();
        let flag = cell_info.flag.expect("guarded global has a flag");
        let entry = ctx.create_block("entry");
        getter.add_block(ctx, entry);
        let mut fg = FuncGen::new(sym, ctx, &mut module, &mut types, &functions, &ccs, &globals, getter, None);
        let init_block = fg.b.new_block("init");
        let done_block = fg.b.new_block("done");
        let bool_ty = fg.b.ctx.bool_ty();
        let loaded = fg.b.load(flag, bool_ty, "is.init");
        fg.b.branch(loaded, done_block, init_block);
        fg.b.add_block(init_block);
        if let Some(init) = &def.init {
            let variable = sym.variable(def.variable);
            fg.construct_into(cell_info.cell, variable.ty, init)?;
        }
        let true_const = fg.b.ctx.bool_const(true);
        fg.b.store(flag, true_const);
        fg.b.goto(done_block);
        fg.b.add_block(done_block);
        fg.b.ret(Some(cell_info.cell));
        setup_invariants(ctx, getter);
    }

    // Function bodies.
    for def in &program.functions {
        let ir_value = functions[&def.function];
        let function = IrFunction(ir_value);
        debug!("irgen: lowering @{}", sym.function(def.function).name);
        let entry = ctx.create_block("entry");
        function.add_block(ctx, entry);
        let cc = ccs[&def.function].clone();
        let mut fg = FuncGen::new(
            sym,
            ctx,
            &mut module,
            &mut types,
            &functions,
            &ccs,
            &globals,
            function,
            Some((def, &cc)),
        );
        fg.bind_parameters(def, &cc);
        for stmt in &def.body {
            fg.lower_stmt(stmt)?;
        }
        fg.emit_cleanup_stack(&def.cleanups)?;
        prune_unreachable(ctx, function);
        setup_invariants(ctx, function);
    }

    Ok(module)
}

#[derive(Debug, Clone)]
struct GlobalCell {
    cell: IrValue,
    flag: Option<IrValue>,
    getter: Option<IrFunction>,
}

/// Removes continuation blocks stranded behind `return`/`break`/`continue`.
/// Runs before invariant setup, so only terminator edges exist yet.
fn prune_unreachable(ctx: &mut Context, function: IrFunction) {
    let Some(entry) = function.entry(ctx) else {
        return;
    };
    let mut reachable: hashbrown::HashSet<Block> = hashbrown::HashSet::new();
    let mut worklist = vec![entry];
    while let Some(block) = worklist.pop() {
        if !reachable.insert(block) {
            continue;
        }
        for succ in block.successors(ctx) {
            worklist.push(succ);
        }
    }
    let dead: Vec<Block> = function
        .blocks(ctx)
        .into_iter()
        .filter(|b| !reachable.contains(b))
        .collect();
    for &block in &dead {
        for inst in block.instructions(ctx).to_vec() {
            ctx.clear_operands(inst);
        }
    }
    for block in dead {
        for inst in block.instructions(ctx).to_vec() {
            let ty = ctx.value_ty(inst);
            let undef = ctx.undef(ty);
            ctx.replace_all_uses_with(inst, undef);
        }
        function.remove_block(ctx, block);
    }
}

type TypeMap = HashMap<SemaTypeId, Ty>;

/// Lowers a sema type to its packed IR representation. Dynamic array
/// references pack into an anonymous `(ptr, i64)` struct.
fn lower_type(cache: &mut TypeMap, ctx: &mut Context, sym: &SymbolTable, id: SemaTypeId) -> Ty {
    if let Some(&ty) = cache.get(&id) {
        return ty;
    }
    let ty = match sym.type_of(id).clone() {
        SemaType::Void => ctx.void_ty(),
        SemaType::Bool => ctx.bool_ty(),
        SemaType::Int => ctx.int_ty(64),
        SemaType::Byte => ctx.int_ty(8),
        SemaType::Float => ctx.float_ty(64),
        SemaType::Reference { .. } | SemaType::Pointer { .. } => ctx.ptr_ty(),
        SemaType::DynArrayRef { .. } => {
            let ptr = ctx.ptr_ty();
            let count = ctx.int_ty(64);
            ctx.anon_struct_ty(vec![ptr, count])
        }
        SemaType::Array { elem, len } => {
            let elem = lower_type(cache, ctx, sym, elem);
            ctx.array_ty(elem, len)
        }
        SemaType::Struct { name, members } => {
            let elems: Vec<Ty> = members
                .iter()
                .map(|m| lower_type(cache, ctx, sym, m.ty))
                .collect();
            match ctx.declare_struct_ty(&name, elems.clone()) {
                Some(ty) => ty,
                // Redeclared name (e.g. across modules): fall back to the
                // existing type.
                None => ctx.struct_ty_by_name(&name).expect("struct exists"),
            }
        }
    };
    cache.insert(id, ty);
    ty
}

fn declare_function(
    sym: &SymbolTable,
    ctx: &mut Context,
    module: &mut Module,
    types: &mut TypeMap,
    id: FunctionId,
    cc: &CallingConvention,
) -> LumenResult<IrValue> {
    let function = sym.function(id);
    if let Some(index) = function.builtin_index {
        let builtin = Builtin::ALL
            .into_iter()
            .find(|b| b.index() == index)
            .ok_or_else(|| {
                LumenError::lowering_error(format!("unknown builtin index {index}"))
            })?;
        return Ok(module.builtin(ctx, builtin));
    }

    let mut params: Vec<(Ty, String)> = Vec::new();
    let ptr = ctx.ptr_ty();
    if cc.returns_via_memory() {
        params.push((ptr, "ret.addr".to_string()));
    }
    for (index, (&ty, &pc)) in function.params.iter().zip(&cc.params).enumerate() {
        match pc {
            PassingConvention::Register => {
                let lowered = lower_type(types, ctx, sym, ty);
                params.push((lowered, format!("p{index}")));
            }
            PassingConvention::Memory => params.push((ptr, format!("p{index}.addr"))),
            PassingConvention::Unpacked => {
                let count = ctx.int_ty(64);
                params.push((ptr, format!("p{index}.data")));
                params.push((count, format!("p{index}.count")));
            }
        }
    }
    let return_ty = if cc.returns_via_memory() {
        ctx.void_ty()
    } else {
        lower_type(types, ctx, sym, function.return_ty)
    };
    let ir_function = ctx.create_function(&function.name, return_ty, params);
    module.add_function(ctx, ir_function);
    Ok(ir_function.0)
}

/// Evaluates an initializer expression to an IR constant, if possible.
fn lower_constant_expr(
    ctx: &mut Context,
    types: &mut TypeMap,
    sym: &SymbolTable,
    expr: &Expr,
) -> Option<IrValue> {
    match (&expr.kind, expr.constant) {
        (_, Some(ConstantValue::Int(v))) => {
            let width = if sym.type_of(expr.ty) == &SemaType::Byte { 8 } else { 64 };
            Some(ctx.int_const(v, width))
        }
        (_, Some(ConstantValue::Bool(v))) => Some(ctx.bool_const(v)),
        (_, Some(ConstantValue::Float(v))) => {
            Some(ctx.float_constant(lumen_common::ApFloat::from_f64(v, 64)))
        }
        (ExprKind::StructLiteral { ty, fields }, _) => {
            let lowered = lower_type(types, ctx, sym, *ty);
            let elems: Vec<IrValue> = fields
                .iter()
                .map(|f| lower_constant_expr(ctx, types, sym, f))
                .collect::<Option<Vec<_>>>()?;
            Some(ctx.struct_constant(lowered, elems))
        }
        _ => None,
    }
}

struct LoopTargets {
    continue_target: Block,
    break_target: Block,
    scope_depth: usize,
}

struct FuncGen<'a, 'b> {
    sym: &'a SymbolTable,
    b: FunctionBuilder<'b>,
    module: &'b mut Module,
    types: &'b mut TypeMap,
    functions: &'b HashMap<FunctionId, IrValue>,
    ccs: &'b HashMap<FunctionId, CallingConvention>,
    globals: &'b HashMap<VariableId, GlobalCell>,
    objects: HashMap<VariableId, LowerValue>,
    scopes: Vec<Vec<VariableId>>,
    loops: Vec<LoopTargets>,
    /// The caller-supplied out pointer, when returning via memory.
    ret_out: Option<IrValue>,
    ret_ty: Option<SemaTypeId>,
}

impl<'a, 'b> FuncGen<'a, 'b> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        sym: &'a SymbolTable,
        ctx: &'b mut Context,
        module: &'b mut Module,
        types: &'b mut TypeMap,
        functions: &'b HashMap<FunctionId, IrValue>,
        ccs: &'b HashMap<FunctionId, CallingConvention>,
        globals: &'b HashMap<VariableId, GlobalCell>,
        function: IrFunction,
        def: Option<(&FunctionDef, &CallingConvention)>,
    ) -> Self {
        let ret_out = def
            .filter(|(_, cc)| cc.returns_via_memory())
            .map(|_| function.params(ctx)[0]);
        let ret_ty = def.map(|(d, _)| sym.function(d.function).return_ty);
        Self {
            sym,
            b: FunctionBuilder::new(ctx, function),
            module,
            types,
            functions,
            ccs,
            globals,
            objects: HashMap::new(),
            scopes: vec![Vec::new()],
            loops: Vec::new(),
            ret_out,
            ret_ty,
        }
    }

    fn lower_ty(&mut self, id: SemaTypeId) -> Ty {
        lower_type(self.types, self.b.ctx, self.sym, id)
    }

    fn fresh(&mut self, stem: &str) -> String {
        self.b.ctx.unique_name(stem)
    }

    // ## Parameter binding

    fn bind_parameters(&mut self, def: &FunctionDef, cc: &CallingConvention) {
        let params = self.b.function().params(self.b.ctx).to_vec();
        let mut index = usize::from(cc.returns_via_memory());
        for (&variable, &pc) in def.params.iter().zip(&cc.params) {
            let sema_ty = self.sym.variable(variable).ty;
            let name = self.sym.variable(variable).name.clone();
            match pc {
                PassingConvention::Register => {
                    // Register parameters become addressable locals.
                    let lowered = self.lower_ty(sema_ty);
                    let slot = self.b.add_alloca(lowered, format!("{name}.addr"));
                    self.b.store(slot, params[index]);
                    self.objects
                        .insert(variable, LowerValue::packed(name, sema_ty, Atom::memory(slot)));
                    index += 1;
                }
                PassingConvention::Memory => {
                    self.objects.insert(
                        variable,
                        LowerValue::packed(name, sema_ty, Atom::memory(params[index])),
                    );
                    index += 1;
                }
                PassingConvention::Unpacked => {
                    let atoms =
                        [Atom::register(params[index]), Atom::register(params[index + 1])];
                    self.objects
                        .insert(variable, LowerValue::unpacked(name, sema_ty, &atoms));
                    index += 2;
                }
            }
        }
    }

    // ## Atoms and representations

    /// Loads a memory atom into a register, or returns the register atom.
    fn to_register(&mut self, atom: Atom, ty: Ty, name: &str) -> IrValue {
        match atom.location {
            ValueLocation::Register => atom.value,
            ValueLocation::Memory => {
                let fresh = self.fresh(name);
                self.b.load(atom.value, ty, fresh)
            }
        }
    }

    /// Spills a register atom to an entry-block alloca, or returns the
    /// memory atom's address.
    fn to_memory(&mut self, atom: Atom, ty: Ty, name: &str) -> IrValue {
        match atom.location {
            ValueLocation::Memory => atom.value,
            ValueLocation::Register => {
                let fresh = self.fresh(name);
                let slot = self.b.add_alloca(ty, fresh);
                self.b.store(slot, atom.value);
                slot
            }
        }
    }

    /// Coalesces an unpacked value into a single atom.
    fn pack(&mut self, value: LowerValue) -> LowerValue {
        if value.is_packed() {
            return value;
        }
        let packed_ty = self.lower_ty(value.ty);
        let i64_ty = self.b.ctx.int_ty(64);
        let ptr_ty = self.b.ctx.ptr_ty();
        let ptr_reg = self.to_register(value.atoms[0], ptr_ty, &value.name);
        let count_reg = self.to_register(value.atoms[1], i64_ty, &value.name);
        let undef = self.b.ctx.undef(packed_ty);
        let name = self.fresh(&value.name);
        let with_ptr = self.b.insert_value(undef, ptr_reg, [0], name);
        let name = self.fresh(&value.name);
        let packed = self.b.insert_value(with_ptr, count_reg, [1], name);
        LowerValue::packed(value.name, value.ty, Atom::register(packed))
    }

    /// Explodes a packed value into its natural atoms.
    fn unpack(&mut self, value: LowerValue) -> LowerValue {
        if value.repr == Representation::Unpacked {
            return value;
        }
        if !matches!(self.sym.type_of(value.ty), SemaType::DynArrayRef { .. }) {
            return value;
        }
        let packed_ty = self.lower_ty(value.ty);
        let atom = value.single();
        let atoms: Vec<Atom> = match atom.location {
            ValueLocation::Register => {
                let name = self.fresh(&format!("{}.data", value.name));
                let ptr = self.b.extract_value(atom.value, [0], name);
                let name = self.fresh(&format!("{}.count", value.name));
                let count = self.b.extract_value(atom.value, [1], name);
                vec![Atom::register(ptr), Atom::register(count)]
            }
            ValueLocation::Memory => {
                let zero = self.b.ctx.int_const(0, 64);
                let name = self.fresh(&format!("{}.data.addr", value.name));
                let ptr_addr = self.b.gep(packed_ty, atom.value, zero, [0], name);
                let name = self.fresh(&format!("{}.count.addr", value.name));
                let count_addr = self.b.gep(packed_ty, atom.value, zero, [1], name);
                vec![Atom::memory(ptr_addr), Atom::memory(count_addr)]
            }
        };
        LowerValue::unpacked(value.name, value.ty, &atoms)
    }

    // ## Statements

    fn lower_stmt(&mut self, stmt: &Stmt) -> LumenResult<()> {
        match stmt {
            Stmt::Var { variable, init } => self.lower_var(*variable, init.as_ref()),
            Stmt::Expr { expr, cleanups } => {
                self.get_value(expr)?;
                self.emit_cleanup_stack(cleanups)
            }
            Stmt::Block { body, cleanups } => {
                self.scopes.push(Vec::new());
                for stmt in body {
                    self.lower_stmt(stmt)?;
                }
                self.emit_cleanup_stack(cleanups)?;
                self.scopes.pop();
                Ok(())
            }
            Stmt::If { cond, then_branch, else_branch } => {
                self.lower_if(cond, then_branch, else_branch.as_deref())
            }
            Stmt::While { cond, body, is_do_while } => {
                self.lower_while(cond, body, *is_do_while)
            }
            Stmt::For { init, cond, increment, body } => {
                self.lower_for(init, cond, increment, body)
            }
            Stmt::Break => self.lower_jump(true),
            Stmt::Continue => self.lower_jump(false),
            Stmt::Return { value, cleanups } => self.lower_return(value.as_ref(), cleanups),
        }
    }

    fn lower_var(&mut self, variable: VariableId, init: Option<&Expr>) -> LumenResult<()> {
        let info = self.sym.variable(variable).clone();
        let lowered = self.lower_ty(info.ty);
        let slot = self.b.add_alloca(lowered, format!("{}.addr", info.name));
        match init {
            Some(expr) => self.construct_into(slot, info.ty, expr)?,
            None => self.default_construct(slot, info.ty)?,
        }
        self.objects
            .insert(variable, LowerValue::packed(info.name, info.ty, Atom::memory(slot)));
        self.scopes.last_mut().expect("a scope is open").push(variable);
        Ok(())
    }

    fn lower_if(
        &mut self,
        cond: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> LumenResult<()> {
        let cond_value = self.rvalue_register(cond)?;
        let block_name = self.b.ctx.unique_name("if.then");
        let then_block = self.b.new_block(block_name);
        let block_name = self.b.ctx.unique_name("if.end");
        let end_block = self.b.new_block(block_name);
        let else_block = match else_branch {
            Some(_) => {
                let block_name = self.b.ctx.unique_name("if.else");
                self.b.new_block(block_name)
            }
            None => end_block,
        };
        self.b.branch(cond_value, then_block, else_block);
        self.b.add_block(then_block);
        self.lower_stmt(then_branch)?;
        self.b.goto(end_block);
        if let Some(else_branch) = else_branch {
            self.b.add_block(else_block);
            self.lower_stmt(else_branch)?;
            self.b.goto(end_block);
        }
        self.b.add_block(end_block);
        Ok(())
    }

    fn lower_while(&mut self, cond: &Expr, body: &Stmt, is_do_while: bool) -> LumenResult<()> {
        let block_name = self.b.ctx.unique_name("loop.header");
        let header = self.b.new_block(block_name);
        let block_name = self.b.ctx.unique_name("loop.body");
        let body_block = self.b.new_block(block_name);
        let block_name = self.b.ctx.unique_name("loop.end");
        let end = self.b.new_block(block_name);
        self.b.goto(if is_do_while { body_block } else { header });
        self.b.add_block(header);
        let cond_value = self.rvalue_register(cond)?;
        self.b.branch(cond_value, body_block, end);
        self.b.add_block(body_block);
        self.loops.push(LoopTargets {
            continue_target: header,
            break_target: end,
            scope_depth: self.scopes.len(),
        });
        self.lower_stmt(body)?;
        self.loops.pop();
        self.b.goto(header);
        self.b.add_block(end);
        Ok(())
    }

    fn lower_for(
        &mut self,
        init: &Stmt,
        cond: &Expr,
        increment: &Expr,
        body: &Stmt,
    ) -> LumenResult<()> {
        self.scopes.push(Vec::new());
        self.lower_stmt(init)?;
        let block_name = self.b.ctx.unique_name("for.header");
        let header = self.b.new_block(block_name);
        let block_name = self.b.ctx.unique_name("for.body");
        let body_block = self.b.new_block(block_name);
        let block_name = self.b.ctx.unique_name("for.inc");
        let inc_block = self.b.new_block(block_name);
        let block_name = self.b.ctx.unique_name("for.end");
        let end = self.b.new_block(block_name);
        self.b.goto(header);
        self.b.add_block(header);
        let cond_value = self.rvalue_register(cond)?;
        self.b.branch(cond_value, body_block, end);
        self.b.add_block(body_block);
        self.loops.push(LoopTargets {
            continue_target: inc_block,
            break_target: end,
            scope_depth: self.scopes.len(),
        });
        self.lower_stmt(body)?;
        self.loops.pop();
        self.b.goto(inc_block);
        self.b.add_block(inc_block);
        self.get_value(increment)?;
        self.b.goto(header);
        self.b.add_block(end);
        // Objects declared by the init statement die with the loop.
        let scope = self.scopes.pop().expect("for scope");
        for variable in scope.into_iter().rev() {
            self.destroy_variable(variable)?;
        }
        Ok(())
    }

    fn lower_jump(&mut self, is_break: bool) -> LumenResult<()> {
        let Some(target) = self.loops.last().map(|l| {
            (
                if is_break { l.break_target } else { l.continue_target },
                l.scope_depth,
            )
        }) else {
            return Err(LumenError::lowering_error("break/continue outside a loop"));
        };
        // Destroy objects of scopes opened inside the loop.
        let (block, depth) = target;
        let to_destroy: Vec<VariableId> = self.scopes[depth..]
            .iter()
            .flat_map(|scope| scope.iter().copied())
            .collect();
        for variable in to_destroy.into_iter().rev() {
            self.destroy_variable(variable)?;
        }
        self.b.goto(block);
        // Unreachable continuation; a fresh block keeps construction legal
        // until invariant setup prunes it.
        let block_name = self.b.ctx.unique_name("jump.after");
        let cont = self.b.new_block(block_name);
        self.b.add_block(cont);
        Ok(())
    }

    fn lower_return(
        &mut self,
        value: Option<&Expr>,
        cleanups: &CleanupStack,
    ) -> LumenResult<()> {
        match (value, self.ret_out) {
            (Some(expr), Some(out)) => {
                let ret_ty = self.ret_ty.expect("memory return has a type");
                let lowered = self.get_value(expr)?;
                let packed = self.pack(lowered);
                let atom = packed.single();
                let replaced = atom.is_memory() && self.replace_backing_alloca(atom.value, out);
                if !replaced {
                    self.copy_into(out, ret_ty, &packed)?;
                }
                self.emit_cleanup_stack(cleanups)?;
                self.b.ret(None);
            }
            (Some(expr), None) => {
                let result = self.rvalue_register(expr)?;
                self.emit_cleanup_stack(cleanups)?;
                self.b.ret(Some(result));
            }
            (None, _) => {
                self.emit_cleanup_stack(cleanups)?;
                self.b.ret(None);
            }
        }
        let block_name = self.b.ctx.unique_name("return.after");
        let cont = self.b.new_block(block_name);
        self.b.add_block(cont);
        Ok(())
    }

    /// If `addr` is an alloca of the current function, rewires it to the
    /// caller-supplied out pointer and removes it, avoiding the copy-out.
    fn replace_backing_alloca(&mut self, addr: IrValue, out: IrValue) -> bool {
        let is_alloca = addr
            .inst_data(self.b.ctx)
            .is_some_and(|d| matches!(d.op, InstOp::Alloca { .. }) && d.operands.is_empty());
        if !is_alloca {
            return false;
        }
        self.b.ctx.replace_all_uses_with(addr, out);
        let block = addr.parent_block(self.b.ctx);
        block.erase_inst(self.b.ctx, addr);
        true
    }

    // ## Cleanups

    fn emit_cleanup_stack(&mut self, cleanups: &CleanupStack) -> LumenResult<()> {
        for entry in cleanups.in_destruction_order() {
            self.destroy_variable(entry.object)?;
        }
        Ok(())
    }

    fn destroy_variable(&mut self, variable: VariableId) -> LumenResult<()> {
        let Some(object) = self.objects.get(&variable).cloned() else {
            return Ok(());
        };
        if object.is_packed() && object.single().is_memory() {
            self.destroy(object.single().value, object.ty)?;
        }
        Ok(())
    }

    // ## Lifetime operations

    fn default_construct(&mut self, dest: IrValue, ty: SemaTypeId) -> LumenResult<()> {
        match self.sym.lifetime_of(ty).default_construct {
            LifetimeOperation::Trivial => {
                let lowered = self.lower_ty(ty);
                if self.b.ctx.type_data(lowered).is_aggregate() {
                    let size = self.b.ctx.size_of(lowered);
                    self.call_memset(dest, size, 0);
                } else {
                    let zero = self.zero_of(lowered);
                    self.b.store(dest, zero);
                }
                Ok(())
            }
            LifetimeOperation::Nontrivial(ctor) => {
                let callee = self.functions[&ctor];
                let void = self.b.ctx.void_ty();
                self.b.call(void, callee, [dest], "");
                Ok(())
            }
            LifetimeOperation::NontrivialInline => {
                self.structural_op(dest, None, ty, LifetimeOpKind::DefaultConstruct)
            }
            LifetimeOperation::Deleted => {
                panic!("lowering a deleted default constructor is a semantic analyzer bug")
            }
        }
    }

    fn copy_construct(&mut self, dest: IrValue, src: IrValue, ty: SemaTypeId) -> LumenResult<()> {
        match self.sym.lifetime_of(ty).copy_construct {
            LifetimeOperation::Trivial => {
                let lowered = self.lower_ty(ty);
                if self.b.ctx.type_data(lowered).is_aggregate() {
                    let size = self.b.ctx.size_of(lowered);
                    self.call_memcpy(dest, src, size);
                } else {
                    let name = self.fresh("copy");
                    let value = self.b.load(src, lowered, name);
                    self.b.store(dest, value);
                }
                Ok(())
            }
            LifetimeOperation::Nontrivial(ctor) => {
                let callee = self.functions[&ctor];
                let void = self.b.ctx.void_ty();
                self.b.call(void, callee, [dest, src], "");
                Ok(())
            }
            LifetimeOperation::NontrivialInline => {
                self.structural_op(dest, Some(src), ty, LifetimeOpKind::CopyConstruct)
            }
            LifetimeOperation::Deleted => {
                panic!("lowering a deleted copy constructor is a semantic analyzer bug")
            }
        }
    }

    fn destroy(&mut self, object: IrValue, ty: SemaTypeId) -> LumenResult<()> {
        match self.sym.lifetime_of(ty).destruct {
            LifetimeOperation::Trivial => Ok(()),
            LifetimeOperation::Nontrivial(dtor) => {
                let callee = self.functions[&dtor];
                let void = self.b.ctx.void_ty();
                self.b.call(void, callee, [object], "");
                Ok(())
            }
            LifetimeOperation::NontrivialInline => {
                self.structural_op(object, None, ty, LifetimeOpKind::Destruct)
            }
            LifetimeOperation::Deleted => {
                panic!("lowering a deleted destructor is a semantic analyzer bug")
            }
        }
    }

    /// Expands a lifetime operation structurally: field-wise over structs,
    /// through a count-bounded loop over arrays.
    fn structural_op(
        &mut self,
        dest: IrValue,
        src: Option<IrValue>,
        ty: SemaTypeId,
        kind: LifetimeOpKind,
    ) -> LumenResult<()> {
        match self.sym.type_of(ty).clone() {
            SemaType::Struct { members, .. } => {
                let lowered = self.lower_ty(ty);
                let zero = self.b.ctx.int_const(0, 64);
                let member_order: Vec<usize> = if kind == LifetimeOpKind::Destruct {
                    (0..members.len()).rev().collect()
                } else {
                    (0..members.len()).collect()
                };
                for index in member_order {
                    let member_ty = members[index].ty;
                    let name = self.fresh(&format!("{}.addr", members[index].name));
                    let dest_member =
                        self.b.gep(lowered, dest, zero, [index as u32], name);
                    let src_member = match src {
                        Some(src) => {
                            let name = self.fresh(&format!("{}.src", members[index].name));
                            Some(self.b.gep(lowered, src, zero, [index as u32], name))
                        }
                        None => None,
                    };
                    self.apply_lifetime_op(dest_member, src_member, member_ty, kind)?;
                }
                Ok(())
            }
            SemaType::Array { elem, len } => {
                let count = self.b.ctx.int_const(len as i64, 64);
                self.element_loop(dest, src, elem, count, kind)
            }
            _ => {
                // Scalars expand to their trivial forms.
                match (kind, src) {
                    (LifetimeOpKind::Destruct, _) => Ok(()),
                    (_, Some(src)) => {
                        let lowered = self.lower_ty(ty);
                        let name = self.fresh("elem");
                        let value = self.b.load(src, lowered, name);
                        self.b.store(dest, value);
                        Ok(())
                    }
                    (_, None) => {
                        let lowered = self.lower_ty(ty);
                        let zero = self.zero_of(lowered);
                        self.b.store(dest, zero);
                        Ok(())
                    }
                }
            }
        }
    }

    fn apply_lifetime_op(
        &mut self,
        dest: IrValue,
        src: Option<IrValue>,
        ty: SemaTypeId,
        kind: LifetimeOpKind,
    ) -> LumenResult<()> {
        match kind {
            LifetimeOpKind::DefaultConstruct => self.default_construct(dest, ty),
            LifetimeOpKind::CopyConstruct | LifetimeOpKind::MoveConstruct => {
                self.copy_construct(dest, src.expect("copy needs a source"), ty)
            }
            LifetimeOpKind::Destruct => self.destroy(dest, ty),
        }
    }

    /// Emits a count-bounded loop applying a lifetime operation per
    /// element.
    fn element_loop(
        &mut self,
        dest: IrValue,
        src: Option<IrValue>,
        elem: SemaTypeId,
        count: IrValue,
        kind: LifetimeOpKind,
    ) -> LumenResult<()> {
        let elem_ty = self.lower_ty(elem);
        let i64_ty = self.b.ctx.int_ty(64);
        let zero = self.b.ctx.int_const(0, 64);
        let one = self.b.ctx.int_const(1, 64);
        let pre = self.b.current_block();
        let block_name = self.b.ctx.unique_name("lifetime.header");
        let header = self.b.new_block(block_name);
        let block_name = self.b.ctx.unique_name("lifetime.body");
        let body = self.b.new_block(block_name);
        let block_name = self.b.ctx.unique_name("lifetime.end");
        let end = self.b.new_block(block_name);
        self.b.goto(header);
        self.b.add_block(header);
        let name = self.fresh("idx");
        let index = self.b.phi(i64_ty, &[PhiMapping { pred: pre, value: zero }], name);
        let name = self.fresh("in.range");
        let in_range =
            self.b.compare(CompareMode::Unsigned, CompareOp::Less, index, count, name);
        self.b.branch(in_range, body, end);
        self.b.add_block(body);
        let name = self.fresh("elem.addr");
        let dest_elem = self.b.gep(elem_ty, dest, index, [0u32; 0], name);
        let src_elem = match src {
            Some(src) => {
                let name = self.fresh("elem.src");
                Some(self.b.gep(elem_ty, src, index, [0u32; 0], name))
            }
            None => None,
        };
        self.apply_lifetime_op(dest_elem, src_elem, elem, kind)?;
        let name = self.fresh("idx.next");
        let next = self.b.arith(ArithmeticOp::Add, index, one, name);
        let body_end = self.b.current_block();
        self.b.goto(header);
        self.b.ctx.phi_add_arg(index, PhiMapping { pred: body_end, value: next });
        self.b.add_block(end);
        Ok(())
    }

    fn call_memcpy(&mut self, dest: IrValue, src: IrValue, size: u64) {
        let memcpy = self.module.builtin(self.b.ctx, Builtin::Memcpy);
        let size_const = self.b.ctx.int_const(size as i64, 64);
        let void = self.b.ctx.void_ty();
        self.b.call(void, memcpy, [dest, size_const, src, size_const], "");
    }

    fn call_memset(&mut self, dest: IrValue, size: u64, value: i64) {
        let memset = self.module.builtin(self.b.ctx, Builtin::Memset);
        let size_const = self.b.ctx.int_const(size as i64, 64);
        let value_const = self.b.ctx.int_const(value, 64);
        let void = self.b.ctx.void_ty();
        self.b.call(void, memset, [dest, size_const, value_const], "");
    }

    fn zero_of(&mut self, ty: Ty) -> IrValue {
        if self.b.ctx.type_data(ty).is_float() {
            let width = self.b.ctx.type_data(ty).bit_width().unwrap_or(64);
            self.b.ctx.float_constant(lumen_common::ApFloat::zero(width))
        } else if self.b.ctx.type_data(ty).is_pointer() {
            self.b.ctx.null_pointer()
        } else {
            let width = self.b.ctx.type_data(ty).bit_width().unwrap_or(64);
            self.b.ctx.int_constant(lumen_common::ApInt::zero(width))
        }
    }

    // ## Construction into a destination

    /// Constructs the value of `expr` into the object at `dest`,
    /// preferring in-place construction for aggregates.
    fn construct_into(&mut self, dest: IrValue, ty: SemaTypeId, expr: &Expr) -> LumenResult<()> {
        if let ExprKind::StructLiteral { ty: literal_ty, fields } = &expr.kind {
            let members = match self.sym.type_of(*literal_ty).clone() {
                SemaType::Struct { members, .. } => members,
                _ => return Err(LumenError::lowering_error("struct literal of non-struct type")),
            };
            let lowered = self.lower_ty(*literal_ty);
            let zero = self.b.ctx.int_const(0, 64);
            for (index, (field, member)) in fields.iter().zip(&members).enumerate() {
                let name = self.fresh(&format!("{}.addr", member.name));
                let member_addr = self.b.gep(lowered, dest, zero, [index as u32], name);
                self.construct_into(member_addr, member.ty, field)?;
            }
            return Ok(());
        }
        let value = self.get_value(expr)?;
        let packed = self.pack(value);
        self.copy_into(dest, ty, &packed)
    }

    /// Copies an already computed packed value into `dest`.
    fn copy_into(&mut self, dest: IrValue, ty: SemaTypeId, packed: &LowerValue) -> LumenResult<()> {
        let atom = packed.single();
        match atom.location {
            ValueLocation::Register => {
                self.b.store(dest, atom.value);
                Ok(())
            }
            ValueLocation::Memory => self.copy_construct(dest, atom.value, ty),
        }
    }

    // ## Expressions

    /// Lowers an expression and forces the packed result into a register.
    fn rvalue_register(&mut self, expr: &Expr) -> LumenResult<IrValue> {
        let value = self.get_value(expr)?;
        let packed = self.pack(value);
        let lowered = self.lower_ty(packed.ty);
        let name = packed.name.clone();
        Ok(self.to_register(packed.single(), lowered, &name))
    }

    fn get_value(&mut self, expr: &Expr) -> LumenResult<LowerValue> {
        match &expr.kind {
            ExprKind::IntLiteral(v) => {
                let width = if self.sym.type_of(expr.ty) == &SemaType::Byte { 8 } else { 64 };
                let constant = self.b.ctx.int_const(*v, width);
                Ok(LowerValue::packed("int", expr.ty, Atom::register(constant)))
            }
            ExprKind::BoolLiteral(v) => {
                let constant = self.b.ctx.bool_const(*v);
                Ok(LowerValue::packed("bool", expr.ty, Atom::register(constant)))
            }
            ExprKind::FloatLiteral(v) => {
                let constant =
                    self.b.ctx.float_constant(lumen_common::ApFloat::from_f64(*v, 64));
                Ok(LowerValue::packed("float", expr.ty, Atom::register(constant)))
            }
            ExprKind::StringLiteral(text) => {
                let data = self.b.ctx.string_constant(text);
                let data_ty = self.b.ctx.value_ty(data);
                let name = self.fresh("str");
                let cell = self.module.add_global(self.b.ctx, name, data_ty, Some(data), true);
                let count = self.b.ctx.int_const(text.len() as i64, 64);
                Ok(LowerValue::unpacked(
                    "str",
                    expr.ty,
                    &[Atom::register(cell), Atom::register(count)],
                ))
            }
            ExprKind::Variable(id) => self
                .objects
                .get(id)
                .cloned()
                .ok_or_else(|| LumenError::lowering_error("use of unbound variable")),
            ExprKind::Global(id) => self.global_value(*id),
            ExprKind::Unary { op, operand } => self.lower_unary(expr, *op, operand),
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(expr, *op, lhs, rhs),
            ExprKind::Assign { target, value } => {
                let target_value = self.get_value(target)?;
                let packed_target = self.pack(target_value);
                let atom = packed_target.single();
                if !atom.is_memory() {
                    return Err(LumenError::lowering_error("assignment to a non-lvalue"));
                }
                // Assignment to a live object: destroy, then re-construct.
                self.destroy(atom.value, target.ty)?;
                self.construct_into(atom.value, target.ty, value)?;
                Ok(LowerValue::packed("assign", expr.ty, atom))
            }
            ExprKind::MemberAccess { base, member } => self.lower_member(expr, base, *member),
            ExprKind::Subscript { base, index } => self.lower_subscript(expr, base, index),
            ExprKind::AddressOf(inner) => {
                let value = self.get_value(inner)?;
                let packed = self.pack(value);
                let atom = packed.single();
                if !atom.is_memory() {
                    return Err(LumenError::lowering_error("address-of a non-lvalue"));
                }
                Ok(LowerValue::packed("addr", expr.ty, Atom::register(atom.value)))
            }
            ExprKind::Deref(inner) => {
                let pointer = self.rvalue_register(inner)?;
                Ok(LowerValue::packed("deref", expr.ty, Atom::memory(pointer)))
            }
            ExprKind::Call { function, args } => self.lower_call(expr, *function, args),
            ExprKind::Conditional { cond, then_value, else_value } => {
                self.lower_conditional(expr, cond, then_value, else_value)
            }
            ExprKind::StructLiteral { ty, fields } => {
                // Free-standing literal: construct into a temporary.
                let lowered = self.lower_ty(*ty);
                let name = self.fresh("lit.addr");
                let slot = self.b.add_alloca(lowered, name);
                let literal = Expr {
                    kind: ExprKind::StructLiteral { ty: *ty, fields: fields.clone() },
                    ty: expr.ty,
                    category: ValueCategory::RValue,
                    constant: None,
                };
                self.construct_into(slot, *ty, &literal)?;
                Ok(LowerValue::packed("lit", expr.ty, Atom::memory(slot)))
            }
            ExprKind::Conversion { conversion, operand } => {
                self.lower_conversion(expr, *conversion, operand)
            }
        }
    }

    fn global_value(&mut self, id: VariableId) -> LumenResult<LowerValue> {
        let cell = self
            .globals
            .get(&id)
            .cloned()
            .ok_or_else(|| LumenError::lowering_error("use of undeclared global"))?;
        let ty = self.sym.variable(id).ty;
        match cell.getter {
            // Guarded globals are reached through their getter.
            Some(getter) => {
                let ptr = self.b.ctx.ptr_ty();
                let name = self.fresh("global.addr");
                let addr = self.b.call(ptr, getter.0, [], name);
                Ok(LowerValue::packed("global", ty, Atom::memory(addr)))
            }
            None => Ok(LowerValue::packed("global", ty, Atom::memory(cell.cell))),
        }
    }

    fn lower_unary(&mut self, expr: &Expr, op: UnaryOp, operand: &Expr) -> LumenResult<LowerValue> {
        let value = self.rvalue_register(operand)?;
        let ir_op = match op {
            UnaryOp::Negate => lumen_ir::UnaryArithmeticOp::Negate,
            UnaryOp::BitwiseNot => lumen_ir::UnaryArithmeticOp::BitwiseNot,
            UnaryOp::LogicalNot => lumen_ir::UnaryArithmeticOp::LogicalNot,
        };
        let name = self.fresh("un");
        let result = self.b.unary_arith(ir_op, value, name);
        Ok(LowerValue::packed("un", expr.ty, Atom::register(result)))
    }

    fn lower_binary(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> LumenResult<LowerValue> {
        // Short-circuit forms first.
        if matches!(op, BinaryOp::LogicalAnd | BinaryOp::LogicalOr) {
            return self.lower_short_circuit(expr, op, lhs, rhs);
        }
        let is_float = self.sym.type_of(lhs.ty) == &SemaType::Float;
        let lhs_value = self.rvalue_register(lhs)?;
        let rhs_value = self.rvalue_register(rhs)?;
        if let Some(cmp) = comparison_op(op) {
            let mode = if is_float { CompareMode::Float } else { CompareMode::Signed };
            let name = self.fresh("cmp");
            let result = self.b.compare(mode, cmp, lhs_value, rhs_value, name);
            return Ok(LowerValue::packed("cmp", expr.ty, Atom::register(result)));
        }
        let ir_op = match (op, is_float) {
            (BinaryOp::Add, false) => ArithmeticOp::Add,
            (BinaryOp::Sub, false) => ArithmeticOp::Sub,
            (BinaryOp::Mul, false) => ArithmeticOp::Mul,
            (BinaryOp::Div, false) => ArithmeticOp::SDiv,
            (BinaryOp::Rem, false) => ArithmeticOp::SRem,
            (BinaryOp::Add, true) => ArithmeticOp::FAdd,
            (BinaryOp::Sub, true) => ArithmeticOp::FSub,
            (BinaryOp::Mul, true) => ArithmeticOp::FMul,
            (BinaryOp::Div, true) => ArithmeticOp::FDiv,
            (BinaryOp::BitAnd, _) => ArithmeticOp::And,
            (BinaryOp::BitOr, _) => ArithmeticOp::Or,
            (BinaryOp::BitXor, _) => ArithmeticOp::XOr,
            (BinaryOp::ShiftLeft, _) => ArithmeticOp::LShL,
            (BinaryOp::ShiftRight, _) => ArithmeticOp::AShR,
            (other, _) => {
                return Err(LumenError::lowering_error(format!(
                    "unsupported binary operation {other:?}"
                )))
            }
        };
        let name = self.fresh("bin");
        let result = self.b.arith(ir_op, lhs_value, rhs_value, name);
        Ok(LowerValue::packed("bin", expr.ty, Atom::register(result)))
    }

    fn lower_short_circuit(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> LumenResult<LowerValue> {
        let lhs_value = self.rvalue_register(lhs)?;
        let lhs_end = self.b.current_block();
        let block_name = self.b.ctx.unique_name("logic.rhs");
        let rhs_block = self.b.new_block(block_name);
        let block_name = self.b.ctx.unique_name("logic.end");
        let end_block = self.b.new_block(block_name);
        match op {
            BinaryOp::LogicalAnd => self.b.branch(lhs_value, rhs_block, end_block),
            _ => self.b.branch(lhs_value, end_block, rhs_block),
        };
        self.b.add_block(rhs_block);
        let rhs_value = self.rvalue_register(rhs)?;
        let rhs_end = self.b.current_block();
        self.b.goto(end_block);
        self.b.add_block(end_block);
        let short_value = self.b.ctx.bool_const(matches!(op, BinaryOp::LogicalOr));
        let bool_ty = self.b.ctx.bool_ty();
        let name = self.fresh("logic");
        let phi = self.b.phi(
            bool_ty,
            &[
                PhiMapping { pred: lhs_end, value: short_value },
                PhiMapping { pred: rhs_end, value: rhs_value },
            ],
            name,
        );
        Ok(LowerValue::packed("logic", expr.ty, Atom::register(phi)))
    }

    fn lower_member(&mut self, expr: &Expr, base: &Expr, member: u32) -> LumenResult<LowerValue> {
        let base_value = self.get_value(base)?;
        let packed = self.pack(base_value);
        let base_ir_ty = self.lower_ty(base.ty);
        let atom = packed.single();
        match atom.location {
            ValueLocation::Memory => {
                let zero = self.b.ctx.int_const(0, 64);
                let name = self.fresh("member.addr");
                let addr = self.b.gep(base_ir_ty, atom.value, zero, [member], name);
                Ok(LowerValue::packed("member", expr.ty, Atom::memory(addr)))
            }
            ValueLocation::Register => {
                let name = self.fresh("member");
                let value = self.b.extract_value(atom.value, [member], name);
                Ok(LowerValue::packed("member", expr.ty, Atom::register(value)))
            }
        }
    }

    fn lower_subscript(&mut self, expr: &Expr, base: &Expr, index: &Expr) -> LumenResult<LowerValue> {
        let index_value = self.rvalue_register(index)?;
        match self.sym.type_of(base.ty).clone() {
            SemaType::Array { elem, .. } => {
                let base_value = self.get_value(base)?;
                let packed = self.pack(base_value);
                let atom = packed.single();
                if !atom.is_memory() {
                    return Err(LumenError::lowering_error("subscript of a register array"));
                }
                let elem_ty = self.lower_ty(elem);
                let name = self.fresh("elem.addr");
                let addr = self.b.gep(elem_ty, atom.value, index_value, [0u32; 0], name);
                Ok(LowerValue::packed("elem", expr.ty, Atom::memory(addr)))
            }
            SemaType::DynArrayRef { elem } => {
                let base_value = self.get_value(base)?;
                let unpacked = self.unpack(base_value);
                let ptr_ty = self.b.ctx.ptr_ty();
                let name = unpacked.name.clone();
                let data = self.to_register(unpacked.atoms[0], ptr_ty, &name);
                let elem_ty = self.lower_ty(elem);
                let name = self.fresh("elem.addr");
                let addr = self.b.gep(elem_ty, data, index_value, [0u32; 0], name);
                Ok(LowerValue::packed("elem", expr.ty, Atom::memory(addr)))
            }
            _ => Err(LumenError::lowering_error("subscript of a non-array value")),
        }
    }

    fn lower_call(
        &mut self,
        expr: &Expr,
        function: FunctionId,
        args: &[Expr],
    ) -> LumenResult<LowerValue> {
        let cc = self.ccs[&function].clone();
        let callee = self.functions[&function];
        let sema_fn = self.sym.function(function).clone();
        let mut ir_args: Vec<IrValue> = Vec::new();
        let ret_slot = if cc.returns_via_memory() {
            let ret_ty = self.lower_ty(sema_fn.return_ty);
            let name = self.fresh("call.ret");
            let slot = self.b.add_alloca(ret_ty, name);
            ir_args.push(slot);
            Some(slot)
        } else {
            None
        };
        for (arg, &pc) in args.iter().zip(&cc.params) {
            match pc {
                PassingConvention::Register => {
                    let value = self.rvalue_register(arg)?;
                    ir_args.push(value);
                }
                PassingConvention::Memory => {
                    // The caller allocates and copy-constructs the argument
                    // object.
                    let lowered = self.lower_ty(arg.ty);
                    let name = self.fresh("arg.addr");
                    let slot = self.b.add_alloca(lowered, name);
                    self.construct_into(slot, arg.ty, arg)?;
                    ir_args.push(slot);
                }
                PassingConvention::Unpacked => {
                    let value = self.get_value(arg)?;
                    let unpacked = self.unpack(value);
                    let ptr_ty = self.b.ctx.ptr_ty();
                    let i64_ty = self.b.ctx.int_ty(64);
                    let name = unpacked.name.clone();
                    let data = self.to_register(unpacked.atoms[0], ptr_ty, &name);
                    let count = self.to_register(unpacked.atoms[1], i64_ty, &name);
                    ir_args.push(data);
                    ir_args.push(count);
                }
            }
        }
        let return_ty = if cc.returns_via_memory() {
            self.b.ctx.void_ty()
        } else {
            self.lower_ty(sema_fn.return_ty)
        };
        let name = self.fresh("call");
        let call = self.b.call(return_ty, callee, ir_args, name);
        match ret_slot {
            Some(slot) => Ok(LowerValue::packed("call", expr.ty, Atom::memory(slot))),
            None => Ok(LowerValue::packed("call", expr.ty, Atom::register(call))),
        }
    }

    fn lower_conditional(
        &mut self,
        expr: &Expr,
        cond: &Expr,
        then_value: &Expr,
        else_value: &Expr,
    ) -> LumenResult<LowerValue> {
        let trivial = self.sym.lifetime_of(expr.ty).is_trivial()
            && sema_size(self.sym, expr.ty) <= crate::cc::PREFERRED_REGISTER_SIZE;
        let cond_reg = self.rvalue_register(cond)?;
        let block_name = self.b.ctx.unique_name("cond.then");
        let then_block = self.b.new_block(block_name);
        let block_name = self.b.ctx.unique_name("cond.else");
        let else_block = self.b.new_block(block_name);
        let block_name = self.b.ctx.unique_name("cond.end");
        let end_block = self.b.new_block(block_name);
        self.b.branch(cond_reg, then_block, else_block);
        if trivial {
            self.b.add_block(then_block);
            let then_reg = self.rvalue_register(then_value)?;
            let then_end = self.b.current_block();
            self.b.goto(end_block);
            self.b.add_block(else_block);
            let else_reg = self.rvalue_register(else_value)?;
            let else_end = self.b.current_block();
            self.b.goto(end_block);
            self.b.add_block(end_block);
            let lowered = self.lower_ty(expr.ty);
            let name = self.fresh("cond");
            let phi = self.b.phi(
                lowered,
                &[
                    PhiMapping { pred: then_end, value: then_reg },
                    PhiMapping { pred: else_end, value: else_reg },
                ],
                name,
            );
            Ok(LowerValue::packed("cond", expr.ty, Atom::register(phi)))
        } else {
            // Nontrivial arms construct into a shared temporary.
            let lowered = self.lower_ty(expr.ty);
            let name = self.fresh("cond.addr");
            let slot = self.b.add_alloca(lowered, name);
            self.b.add_block(then_block);
            self.construct_into(slot, expr.ty, then_value)?;
            self.b.goto(end_block);
            self.b.add_block(else_block);
            self.construct_into(slot, expr.ty, else_value)?;
            self.b.goto(end_block);
            self.b.add_block(end_block);
            Ok(LowerValue::packed("cond", expr.ty, Atom::memory(slot)))
        }
    }

    fn lower_conversion(
        &mut self,
        expr: &Expr,
        conversion: ConversionKind,
        operand: &Expr,
    ) -> LumenResult<LowerValue> {
        match conversion {
            ConversionKind::ArrayToDynRef => {
                let value = self.get_value(operand)?;
                let packed = self.pack(value);
                let atom = packed.single();
                if !atom.is_memory() {
                    return Err(LumenError::lowering_error("array decay needs an lvalue"));
                }
                let len = match self.sym.type_of(operand.ty) {
                    SemaType::Array { len, .. } => *len,
                    _ => return Err(LumenError::lowering_error("array decay of non-array")),
                };
                let count = self.b.ctx.int_const(len as i64, 64);
                Ok(LowerValue::unpacked(
                    "decay",
                    expr.ty,
                    &[Atom::register(atom.value), Atom::register(count)],
                ))
            }
            _ => {
                let value = self.rvalue_register(operand)?;
                let target = self.lower_ty(expr.ty);
                let (conv, name) = match conversion {
                    ConversionKind::IntToFloat => (Conversion::StoF, "to.float"),
                    ConversionKind::FloatToInt => (Conversion::FtoS, "to.int"),
                    ConversionKind::IntToByte => (Conversion::Trunc, "to.byte"),
                    ConversionKind::ByteToInt => (Conversion::Sext, "to.int"),
                    ConversionKind::ArrayToDynRef => unreachable!(),
                };
                let fresh = self.fresh(name);
                let result = self.b.convert(conv, value, target, fresh);
                Ok(LowerValue::packed(name, expr.ty, Atom::register(result)))
            }
        }
    }
}

fn comparison_op(op: BinaryOp) -> Option<CompareOp> {
    match op {
        BinaryOp::Equal => Some(CompareOp::Equal),
        BinaryOp::NotEqual => Some(CompareOp::NotEqual),
        BinaryOp::Less => Some(CompareOp::Less),
        BinaryOp::LessEq => Some(CompareOp::LessEq),
        BinaryOp::Greater => Some(CompareOp::Greater),
        BinaryOp::GreaterEq => Some(CompareOp::GreaterEq),
        _ => None,
    }
}
