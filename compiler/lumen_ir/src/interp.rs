//! Reference IR interpreter
//!
//! A direct, slow executor over the SSA IR used to check semantic
//! preservation: for a pass P and function F, `run(F, I)` must equal
//! `run(P(F), I)`, including the trace of external calls. Loads and
//! stores to distinct addresses are not observable; calls to non-pure
//! foreign functions are.
//!
//! Memory is a flat byte array. Allocas bump-allocate per activation;
//! globals are materialized once at construction. The step budget guards
//! against non-terminating inputs.

use crate::context::Context;
use crate::instruction::{ArithmeticOp, CompareMode, CompareOp, Conversion, InstOp, UnaryArithmeticOp};
use crate::module::{Builtin, Module};
use crate::types::{Ty, TypeData};
use crate::value::{Block, Function, Value, ValueKind};
use hashbrown::HashMap;
use lumen_common::{ApFloat, ApInt, LumenError, LumenResult};

/// A runtime value. Aggregates hold their members in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum RtValue {
    Int(ApInt),
    Float(ApFloat),
    Ptr(u64),
    Aggregate(Vec<RtValue>),
    Undef,
}

impl RtValue {
    pub fn as_int(&self) -> LumenResult<ApInt> {
        match self {
            RtValue::Int(v) => Ok(*v),
            RtValue::Undef => Ok(ApInt::zero(64)),
            other => Err(LumenError::invalid_ir(format!("expected an integer, got {other:?}"))),
        }
    }

    pub fn as_float(&self) -> LumenResult<ApFloat> {
        match self {
            RtValue::Float(v) => Ok(*v),
            RtValue::Undef => Ok(ApFloat::zero(64)),
            other => Err(LumenError::invalid_ir(format!("expected a float, got {other:?}"))),
        }
    }

    pub fn as_ptr(&self) -> LumenResult<u64> {
        match self {
            RtValue::Ptr(v) => Ok(*v),
            RtValue::Int(v) => Ok(v.as_u64()),
            RtValue::Undef => Ok(0),
            other => Err(LumenError::invalid_ir(format!("expected a pointer, got {other:?}"))),
        }
    }

    pub fn truthy(&self) -> LumenResult<bool> {
        Ok(!self.as_int()?.is_zero())
    }
}

/// The observable outcome of one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub result: Option<RtValue>,
    /// One entry per external (non-pure foreign) call, in order.
    pub trace: Vec<String>,
}

pub struct Interpreter<'a> {
    ctx: &'a Context,
    module: &'a Module,
    memory: Vec<u8>,
    globals: HashMap<Value, u64>,
    steps: u64,
    step_budget: u64,
    trace: Vec<String>,
}

impl<'a> Interpreter<'a> {
    pub fn new(ctx: &'a Context, module: &'a Module) -> Self {
        let mut interp = Self {
            ctx,
            module,
            // Address zero stays unmapped so null dereferences fail.
            memory: vec![0; 8],
            globals: HashMap::new(),
            steps: 0,
            step_budget: 1_000_000,
            trace: Vec::new(),
        };
        interp.materialize_globals();
        interp
    }

    pub fn with_step_budget(mut self, budget: u64) -> Self {
        self.step_budget = budget;
        self
    }

    fn materialize_globals(&mut self) {
        for &global in self.module.globals() {
            let ValueKind::Global(data) = &self.ctx.value_data(global).kind else {
                continue;
            };
            let address = self.allocate(data.value_ty);
            if let Some(init) = data.initializer {
                let value = self.constant_value(init);
                // Initializers are constants; the store cannot fail.
                let _ = self.store(address, data.value_ty, &value);
            }
            self.globals.insert(global, address);
        }
    }

    fn allocate(&mut self, ty: Ty) -> u64 {
        let layout = self.ctx.layout_of(ty);
        let align = layout.align.max(1);
        let base = (self.memory.len() as u64 + align - 1) & !(align - 1);
        self.memory.resize((base + layout.size.max(1)) as usize, 0);
        base
    }

    /// Runs a function by name with integer/float arguments mapped to its
    /// parameters.
    pub fn run_by_name(&mut self, name: &str, args: &[RtValue]) -> LumenResult<Execution> {
        let function = self
            .module
            .function_by_name(self.ctx, name)
            .ok_or_else(|| LumenError::invalid_ir(format!("no function @{name}")))?;
        self.run(function, args)
    }

    pub fn run(&mut self, function: Function, args: &[RtValue]) -> LumenResult<Execution> {
        self.trace.clear();
        let result = self.call_function(function, args.to_vec())?;
        Ok(Execution { result, trace: std::mem::take(&mut self.trace) })
    }

    fn call_function(
        &mut self,
        function: Function,
        args: Vec<RtValue>,
    ) -> LumenResult<Option<RtValue>> {
        let params = function.params(self.ctx);
        if params.len() != args.len() {
            return Err(LumenError::invalid_ir(format!(
                "@{} expects {} arguments, got {}",
                function.name(self.ctx),
                params.len(),
                args.len()
            )));
        }
        let mut env: HashMap<Value, RtValue> = HashMap::new();
        for (&param, arg) in params.iter().zip(args) {
            env.insert(param, arg);
        }
        let entry = function
            .entry(self.ctx)
            .ok_or_else(|| LumenError::invalid_ir("function without a body"))?;

        let mut current = entry;
        let mut previous: Option<Block> = None;
        loop {
            // Phis read their operands against the entry state of the
            // block, so evaluate them as a batch first.
            let phis = current.phis(self.ctx);
            if !phis.is_empty() {
                let incoming = previous.ok_or_else(|| {
                    LumenError::invalid_ir("phi in a block entered without a predecessor")
                })?;
                let mut updates = Vec::with_capacity(phis.len());
                for phi in &phis {
                    let arg = phi
                        .phi_args(self.ctx)
                        .into_iter()
                        .find(|a| a.pred == incoming)
                        .ok_or_else(|| {
                            LumenError::invalid_ir("phi lacks an argument for the taken edge")
                        })?;
                    updates.push((*phi, self.value_of(&env, arg.value)?));
                }
                for (phi, value) in updates {
                    env.insert(phi, value);
                }
            }

            let instructions: Vec<Value> =
                current.instructions(self.ctx)[current.first_non_phi(self.ctx)..].to_vec();
            let mut jumped = false;
            for inst in instructions {
                self.steps += 1;
                if self.steps > self.step_budget {
                    return Err(LumenError::invalid_ir("interpreter step budget exhausted"));
                }
                let data = inst.inst_data(self.ctx).expect("instruction").clone();
                match &data.op {
                    InstOp::Goto => {
                        previous = Some(current);
                        current = Block(data.operands[0]);
                        jumped = true;
                        break;
                    }
                    InstOp::Branch => {
                        let cond = self.value_of(&env, data.operands[0])?.truthy()?;
                        previous = Some(current);
                        current = Block(data.operands[if cond { 1 } else { 2 }]);
                        jumped = true;
                        break;
                    }
                    InstOp::Return => {
                        let result = match data.operands.first() {
                            Some(&v) => Some(self.value_of(&env, v)?),
                            None => None,
                        };
                        return Ok(result);
                    }
                    _ => {
                        let result = self.eval_inst(&mut env, inst)?;
                        if let Some(result) = result {
                            env.insert(inst, result);
                        }
                    }
                }
            }
            if !jumped {
                return Err(LumenError::invalid_ir("block fell through without a terminator"));
            }
        }
    }

    fn value_of(&self, env: &HashMap<Value, RtValue>, value: Value) -> LumenResult<RtValue> {
        if let Some(known) = env.get(&value) {
            return Ok(known.clone());
        }
        match &self.ctx.value_data(value).kind {
            ValueKind::Global(_) => {
                let address = self.globals.get(&value).copied().ok_or_else(|| {
                    LumenError::invalid_ir("global without materialized storage")
                })?;
                Ok(RtValue::Ptr(address))
            }
            kind if kind.is_constant() => Ok(self.constant_value(value)),
            ValueKind::Function(_) | ValueKind::ForeignFunction(_) => {
                // Function addresses are opaque handles; use the arena id.
                Ok(RtValue::Ptr(value.0.into_raw_parts().0 as u64 + 1))
            }
            _ => Err(LumenError::invalid_ir("use of a value with no computed state")),
        }
    }

    fn constant_value(&self, value: Value) -> RtValue {
        match &self.ctx.value_data(value).kind {
            ValueKind::IntConst(v) => RtValue::Int(*v),
            ValueKind::FloatConst(v) => RtValue::Float(*v),
            ValueKind::NullPointer => RtValue::Ptr(0),
            ValueKind::Undef => RtValue::Undef,
            ValueKind::StructConst { elems } | ValueKind::ArrayConst { elems } => {
                RtValue::Aggregate(elems.iter().map(|&e| self.constant_value(e)).collect())
            }
            _ => RtValue::Undef,
        }
    }

    fn eval_inst(
        &mut self,
        env: &mut HashMap<Value, RtValue>,
        inst: Value,
    ) -> LumenResult<Option<RtValue>> {
        let data = inst.inst_data(self.ctx).expect("instruction").clone();
        let result = match &data.op {
            InstOp::Alloca { allocated } => {
                let count = match data.operands.first() {
                    Some(&count) => self.value_of(env, count)?.as_int()?.as_u64(),
                    None => 1,
                };
                let address = if count <= 1 {
                    self.allocate(*allocated)
                } else {
                    let elem_layout = self.ctx.layout_of(*allocated);
                    let base = self.allocate(*allocated);
                    let extra = elem_layout.size * (count - 1);
                    self.memory.resize(self.memory.len() + extra as usize, 0);
                    base
                };
                Some(RtValue::Ptr(address))
            }
            InstOp::Load { loaded } => {
                let address = self.value_of(env, data.operands[0])?.as_ptr()?;
                Some(self.load(address, *loaded)?)
            }
            InstOp::Store => {
                let address = self.value_of(env, data.operands[0])?.as_ptr()?;
                let value = self.value_of(env, data.operands[1])?;
                let ty = self.ctx.value_ty(data.operands[1]);
                self.store(address, ty, &value)?;
                None
            }
            InstOp::Gep { inbounds_ty, member_indices, .. } => {
                let base = self.value_of(env, data.operands[0])?.as_ptr()?;
                let index = self.value_of(env, data.operands[1])?.as_int()?.as_i64();
                let layout = self.ctx.layout_of(*inbounds_ty);
                let stride = (layout.size + layout.align - 1) & !(layout.align - 1);
                let mut address = base.wrapping_add((index * stride as i64) as u64);
                let mut ty = *inbounds_ty;
                for &member in member_indices {
                    match self.ctx.type_data(ty).clone() {
                        TypeData::Struct { elems, .. } => {
                            address += self.ctx.member_offset(ty, member);
                            ty = elems[member as usize];
                        }
                        TypeData::Array { elem, .. } => {
                            let elem_layout = self.ctx.layout_of(elem);
                            let elem_stride = (elem_layout.size + elem_layout.align - 1)
                                & !(elem_layout.align - 1);
                            address += elem_stride * u64::from(member);
                            ty = elem;
                        }
                        _ => return Err(LumenError::invalid_ir("member index into scalar")),
                    }
                }
                Some(RtValue::Ptr(address))
            }
            InstOp::Arith(op) => {
                let lhs = self.value_of(env, data.operands[0])?;
                let rhs = self.value_of(env, data.operands[1])?;
                Some(eval_arith(*op, &lhs, &rhs)?)
            }
            InstOp::UnaryArith(op) => {
                let operand = self.value_of(env, data.operands[0])?;
                Some(match op {
                    UnaryArithmeticOp::BitwiseNot => RtValue::Int(operand.as_int()?.bitnot()),
                    UnaryArithmeticOp::LogicalNot => RtValue::Int(operand.as_int()?.lognot()),
                    UnaryArithmeticOp::Negate => match operand {
                        RtValue::Float(v) => RtValue::Float(v.neg()),
                        other => RtValue::Int(other.as_int()?.wrapping_neg()),
                    },
                })
            }
            InstOp::Compare { mode, op } => {
                let lhs = self.value_of(env, data.operands[0])?;
                let rhs = self.value_of(env, data.operands[1])?;
                Some(RtValue::Int(ApInt::truth(eval_compare(*mode, *op, &lhs, &rhs)?)))
            }
            InstOp::Convert(conv) => {
                let operand = self.value_of(env, data.operands[0])?;
                let target = self.ctx.value_ty(inst);
                Some(eval_convert(*conv, &operand, self.ctx.type_data(target))?)
            }
            InstOp::InsertValue { indices } => {
                let mut base = self.value_of(env, data.operands[0])?;
                let inserted = self.value_of(env, data.operands[1])?;
                if matches!(base, RtValue::Undef) {
                    base = self.undef_aggregate(self.ctx.value_ty(inst));
                }
                let mut slot = &mut base;
                for &index in indices {
                    match slot {
                        RtValue::Aggregate(elems) => slot = &mut elems[index as usize],
                        _ => return Err(LumenError::invalid_ir("insert into a scalar")),
                    }
                }
                *slot = inserted;
                Some(base)
            }
            InstOp::ExtractValue { indices } => {
                let mut value = self.value_of(env, data.operands[0])?;
                for &index in indices {
                    value = match value {
                        RtValue::Aggregate(mut elems) => {
                            if index as usize >= elems.len() {
                                return Err(LumenError::invalid_ir("extract out of range"));
                            }
                            elems.swap_remove(index as usize)
                        }
                        RtValue::Undef => RtValue::Undef,
                        _ => return Err(LumenError::invalid_ir("extract from a scalar")),
                    };
                }
                Some(value)
            }
            InstOp::Select => {
                let cond = self.value_of(env, data.operands[0])?.truthy()?;
                let value = self.value_of(env, data.operands[if cond { 1 } else { 2 }])?;
                Some(value)
            }
            InstOp::Call => {
                let callee = data.operands[0];
                let mut args = Vec::with_capacity(data.operands.len() - 1);
                for &arg in &data.operands[1..] {
                    args.push(self.value_of(env, arg)?);
                }
                self.eval_call(callee, args)?
            }
            InstOp::Phi | InstOp::Goto | InstOp::Branch | InstOp::Return => {
                unreachable!("handled by the block driver")
            }
        };
        Ok(result)
    }

    fn undef_aggregate(&self, ty: Ty) -> RtValue {
        match self.ctx.type_data(ty) {
            TypeData::Struct { elems, .. } => {
                RtValue::Aggregate(elems.iter().map(|&e| self.undef_aggregate(e)).collect())
            }
            TypeData::Array { elem, count } => {
                RtValue::Aggregate(vec![self.undef_aggregate(*elem); *count as usize])
            }
            _ => RtValue::Undef,
        }
    }

    fn eval_call(&mut self, callee: Value, args: Vec<RtValue>) -> LumenResult<Option<RtValue>> {
        match &self.ctx.value_data(callee).kind {
            ValueKind::Function(_) => self.call_function(Function(callee), args),
            ValueKind::ForeignFunction(_) => {
                let name = self.ctx.value_name(callee).unwrap_or("").to_string();
                self.eval_foreign(&name, args)
            }
            _ => Err(LumenError::invalid_ir("indirect calls are outside the reference scope")),
        }
    }

    fn eval_foreign(&mut self, name: &str, args: Vec<RtValue>) -> LumenResult<Option<RtValue>> {
        let builtin = Builtin::from_name(name);
        match builtin {
            Some(Builtin::AbsF64) => {
                Ok(Some(RtValue::Float(ApFloat::from_f64(args[0].as_float()?.as_f64().abs(), 64))))
            }
            Some(Builtin::SqrtF64) => {
                Ok(Some(RtValue::Float(ApFloat::from_f64(args[0].as_float()?.as_f64().sqrt(), 64))))
            }
            Some(Builtin::PowF64) => Ok(Some(RtValue::Float(ApFloat::from_f64(
                args[0].as_float()?.as_f64().powf(args[1].as_float()?.as_f64()),
                64,
            )))),
            Some(Builtin::Memcpy) => {
                let dest = args[0].as_ptr()? as usize;
                let size = args[1].as_int()?.as_u64() as usize;
                let src = args[2].as_ptr()? as usize;
                if dest + size > self.memory.len() || src + size > self.memory.len() {
                    return Err(LumenError::invalid_ir("memcpy out of bounds"));
                }
                self.memory.copy_within(src..src + size, dest);
                Ok(None)
            }
            Some(Builtin::Memset) => {
                let dest = args[0].as_ptr()? as usize;
                let size = args[1].as_int()?.as_u64() as usize;
                let byte = args[2].as_int()?.as_u64() as u8;
                if dest + size > self.memory.len() {
                    return Err(LumenError::invalid_ir("memset out of bounds"));
                }
                self.memory[dest..dest + size].fill(byte);
                Ok(None)
            }
            Some(Builtin::Alloc) => {
                let size = args[0].as_int()?.as_u64();
                let base = self.memory.len() as u64;
                self.memory.resize((base + size.max(1)) as usize, 0);
                Ok(Some(RtValue::Ptr(base)))
            }
            Some(Builtin::Dealloc) => Ok(None),
            // Output builtins and unknown foreign functions are observable.
            _ => {
                let rendered: Vec<String> = args.iter().map(|a| format!("{a:?}")).collect();
                self.trace.push(format!("{name}({})", rendered.join(", ")));
                Ok(Some(RtValue::Undef))
            }
        }
    }

    // ## Memory access

    fn load(&self, address: u64, ty: Ty) -> LumenResult<RtValue> {
        if address == 0 {
            return Err(LumenError::invalid_ir("null dereference"));
        }
        match self.ctx.type_data(ty).clone() {
            TypeData::Integral { width } => {
                let size = (width as usize).div_ceil(8);
                let bytes = self.read_bytes(address, size)?;
                let mut raw = [0u8; 8];
                raw[..size].copy_from_slice(&bytes);
                Ok(RtValue::Int(ApInt::new(u64::from_le_bytes(raw), width)))
            }
            TypeData::Float { width } => {
                let size = (width as usize) / 8;
                let bytes = self.read_bytes(address, size)?;
                let mut raw = [0u8; 8];
                raw[..size].copy_from_slice(&bytes);
                let bits = u64::from_le_bytes(raw);
                let value = if width == 32 {
                    f64::from(f32::from_bits(bits as u32))
                } else {
                    f64::from_bits(bits)
                };
                Ok(RtValue::Float(ApFloat::from_f64(value, width)))
            }
            TypeData::Pointer => {
                let bytes = self.read_bytes(address, 8)?;
                Ok(RtValue::Ptr(u64::from_le_bytes(bytes.try_into().unwrap())))
            }
            TypeData::Struct { elems, .. } => {
                let mut members = Vec::with_capacity(elems.len());
                for (index, &member) in elems.iter().enumerate() {
                    let offset = self.ctx.member_offset(ty, index as u32);
                    members.push(self.load(address + offset, member)?);
                }
                Ok(RtValue::Aggregate(members))
            }
            TypeData::Array { elem, count } => {
                let layout = self.ctx.layout_of(elem);
                let stride = (layout.size + layout.align - 1) & !(layout.align - 1);
                let mut members = Vec::with_capacity(count as usize);
                for i in 0..count {
                    members.push(self.load(address + i * stride, elem)?);
                }
                Ok(RtValue::Aggregate(members))
            }
            TypeData::Void | TypeData::Label => Ok(RtValue::Undef),
        }
    }

    fn store(&mut self, address: u64, ty: Ty, value: &RtValue) -> LumenResult<()> {
        if address == 0 {
            return Err(LumenError::invalid_ir("null store"));
        }
        match self.ctx.type_data(ty).clone() {
            TypeData::Integral { width } => {
                let size = (width as usize).div_ceil(8);
                let bits = value.as_int()?.as_u64();
                self.write_bytes(address, &bits.to_le_bytes()[..size])
            }
            TypeData::Float { width } => {
                let size = (width as usize) / 8;
                let bits = value.as_float()?.bits();
                self.write_bytes(address, &bits.to_le_bytes()[..size])
            }
            TypeData::Pointer => self.write_bytes(address, &value.as_ptr()?.to_le_bytes()),
            TypeData::Struct { elems, .. } => {
                let members = match value {
                    RtValue::Aggregate(members) => members.clone(),
                    RtValue::Undef => vec![RtValue::Undef; elems.len()],
                    _ => return Err(LumenError::invalid_ir("storing a scalar as a struct")),
                };
                for (index, (&member_ty, member)) in elems.iter().zip(&members).enumerate() {
                    let offset = self.ctx.member_offset(ty, index as u32);
                    self.store(address + offset, member_ty, member)?;
                }
                Ok(())
            }
            TypeData::Array { elem, count } => {
                let members = match value {
                    RtValue::Aggregate(members) => members.clone(),
                    RtValue::Undef => vec![RtValue::Undef; count as usize],
                    _ => return Err(LumenError::invalid_ir("storing a scalar as an array")),
                };
                let layout = self.ctx.layout_of(elem);
                let stride = (layout.size + layout.align - 1) & !(layout.align - 1);
                for (i, member) in members.iter().enumerate() {
                    self.store(address + i as u64 * stride, elem, member)?;
                }
                Ok(())
            }
            TypeData::Void | TypeData::Label => Ok(()),
        }
    }

    fn read_bytes(&self, address: u64, size: usize) -> LumenResult<&[u8]> {
        let start = address as usize;
        self.memory
            .get(start..start + size)
            .ok_or_else(|| LumenError::invalid_ir("load out of bounds"))
    }

    fn write_bytes(&mut self, address: u64, bytes: &[u8]) -> LumenResult<()> {
        let start = address as usize;
        let slot = self
            .memory
            .get_mut(start..start + bytes.len())
            .ok_or_else(|| LumenError::invalid_ir("store out of bounds"))?;
        slot.copy_from_slice(bytes);
        Ok(())
    }
}

fn eval_arith(op: ArithmeticOp, lhs: &RtValue, rhs: &RtValue) -> LumenResult<RtValue> {
    if op.is_float() {
        let a = lhs.as_float()?;
        let b = rhs.as_float()?;
        let result = match op {
            ArithmeticOp::FAdd => a.add(b),
            ArithmeticOp::FSub => a.sub(b),
            ArithmeticOp::FMul => a.mul(b),
            _ => a.div(b),
        };
        return Ok(RtValue::Float(result));
    }
    let a = lhs.as_int()?;
    let b = rhs.as_int()?;
    let division = |r: Option<ApInt>| {
        r.map(RtValue::Int)
            .ok_or_else(|| LumenError::invalid_ir("division by zero"))
    };
    let result = match op {
        ArithmeticOp::Add => RtValue::Int(a.wrapping_add(b)),
        ArithmeticOp::Sub => RtValue::Int(a.wrapping_sub(b)),
        ArithmeticOp::Mul => RtValue::Int(a.wrapping_mul(b)),
        ArithmeticOp::SDiv => division(a.sdiv(b))?,
        ArithmeticOp::UDiv => division(a.udiv(b))?,
        ArithmeticOp::SRem => division(a.srem(b))?,
        ArithmeticOp::URem => division(a.urem(b))?,
        ArithmeticOp::LShL | ArithmeticOp::AShL => RtValue::Int(a.shl(b)),
        ArithmeticOp::LShR => RtValue::Int(a.lshr(b)),
        ArithmeticOp::AShR => RtValue::Int(a.ashr(b)),
        ArithmeticOp::And => RtValue::Int(a.bitand(b)),
        ArithmeticOp::Or => RtValue::Int(a.bitor(b)),
        ArithmeticOp::XOr => RtValue::Int(a.bitxor(b)),
        _ => unreachable!("float ops handled above"),
    };
    Ok(result)
}

fn eval_compare(mode: CompareMode, op: CompareOp, lhs: &RtValue, rhs: &RtValue) -> LumenResult<bool> {
    use std::cmp::Ordering;
    let ordering = match mode {
        CompareMode::Signed => Some(lhs.as_int()?.scmp(rhs.as_int()?)),
        CompareMode::Unsigned => match (lhs, rhs) {
            (RtValue::Ptr(a), RtValue::Ptr(b)) => Some(a.cmp(b)),
            _ => Some(lhs.as_int()?.ucmp(rhs.as_int()?)),
        },
        CompareMode::Float => lhs.as_float()?.fcmp(rhs.as_float()?),
    };
    let result = match ordering {
        None => matches!(op, CompareOp::NotEqual),
        Some(ordering) => match op {
            CompareOp::Equal => ordering == Ordering::Equal,
            CompareOp::NotEqual => ordering != Ordering::Equal,
            CompareOp::Less => ordering == Ordering::Less,
            CompareOp::LessEq => ordering != Ordering::Greater,
            CompareOp::Greater => ordering == Ordering::Greater,
            CompareOp::GreaterEq => ordering != Ordering::Less,
        },
    };
    Ok(result)
}

fn eval_convert(conv: Conversion, operand: &RtValue, target: &TypeData) -> LumenResult<RtValue> {
    let width = target.bit_width().unwrap_or(64);
    let result = match conv {
        Conversion::Zext => RtValue::Int(operand.as_int()?.zext(width)),
        Conversion::Sext => RtValue::Int(operand.as_int()?.sext(width)),
        Conversion::Trunc => RtValue::Int(operand.as_int()?.trunc(width)),
        Conversion::Fext | Conversion::Ftrunc => RtValue::Float(operand.as_float()?.convert(width)),
        Conversion::UtoF => RtValue::Float(ApFloat::from_f64(operand.as_int()?.as_u64() as f64, width)),
        Conversion::StoF => RtValue::Float(ApFloat::from_f64(operand.as_int()?.as_i64() as f64, width)),
        Conversion::FtoU => RtValue::Int(ApInt::new(operand.as_float()?.as_f64() as u64, width)),
        Conversion::FtoS => RtValue::Int(ApInt::from_i64(operand.as_float()?.as_f64() as i64, width)),
        Conversion::Bitcast => operand.clone(),
    };
    Ok(result)
}
