//! Instruction kinds, operand layouts and typed constructors
//!
//! An instruction is a value whose kind is [`ValueKind::Inst`]. The operand
//! list is flat; each [`InstOp`] documents its slot layout. Blocks appear as
//! operands of terminators and in the block half of phi operand lists, so
//! control-flow edges are ordinary use-edges.

use crate::context::Context;
use crate::types::{Ty, TypeData};
use crate::value::{Block, Operands, Value, ValueData, ValueKind};
use smallvec::SmallVec;
use std::fmt;

/// Binary arithmetic and bitwise operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    FAdd,
    FSub,
    FMul,
    FDiv,
    LShL,
    LShR,
    AShL,
    AShR,
    And,
    Or,
    XOr,
}

impl ArithmeticOp {
    pub fn is_float(self) -> bool {
        matches!(self, Self::FAdd | Self::FSub | Self::FMul | Self::FDiv)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::SDiv => "sdiv",
            Self::UDiv => "udiv",
            Self::SRem => "srem",
            Self::URem => "urem",
            Self::FAdd => "fadd",
            Self::FSub => "fsub",
            Self::FMul => "fmul",
            Self::FDiv => "fdiv",
            Self::LShL => "lshl",
            Self::LShR => "lshr",
            Self::AShL => "ashl",
            Self::AShR => "ashr",
            Self::And => "and",
            Self::Or => "or",
            Self::XOr => "xor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryArithmeticOp {
    BitwiseNot,
    LogicalNot,
    Negate,
}

impl UnaryArithmeticOp {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::BitwiseNot => "bnt",
            Self::LogicalNot => "lnt",
            Self::Negate => "neg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareMode {
    Signed,
    Unsigned,
    Float,
}

impl CompareMode {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Signed => "scmp",
            Self::Unsigned => "ucmp",
            Self::Float => "fcmp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

impl CompareOp {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Equal => "eq",
            Self::NotEqual => "neq",
            Self::Less => "ls",
            Self::LessEq => "leq",
            Self::Greater => "grt",
            Self::GreaterEq => "geq",
        }
    }

    /// The relation with operand order flipped: `a op b` iff `b inverse(op) a`.
    pub fn inverse(self) -> Self {
        match self {
            Self::Equal => Self::Equal,
            Self::NotEqual => Self::NotEqual,
            Self::Less => Self::Greater,
            Self::LessEq => Self::GreaterEq,
            Self::Greater => Self::Less,
            Self::GreaterEq => Self::LessEq,
        }
    }

    /// The logical negation: `!(a op b)` iff `a negated(op) b`.
    pub fn negated(self) -> Self {
        match self {
            Self::Equal => Self::NotEqual,
            Self::NotEqual => Self::Equal,
            Self::Less => Self::GreaterEq,
            Self::LessEq => Self::Greater,
            Self::Greater => Self::LessEq,
            Self::GreaterEq => Self::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conversion {
    Zext,
    Sext,
    Trunc,
    Fext,
    Ftrunc,
    UtoF,
    StoF,
    FtoU,
    FtoS,
    Bitcast,
}

impl Conversion {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Zext => "zext",
            Self::Sext => "sext",
            Self::Trunc => "trunc",
            Self::Fext => "fext",
            Self::Ftrunc => "ftrunc",
            Self::UtoF => "utof",
            Self::StoF => "stof",
            Self::FtoU => "ftou",
            Self::FtoS => "ftos",
            Self::Bitcast => "bitcast",
        }
    }
}

/// Constant aggregate member indices used by GEP / insert / extract.
pub type MemberIndices = SmallVec<[u32; 4]>;

/// The operation of an instruction. Slot layouts:
///
/// | op | operands |
/// |---|---|
/// | `Alloca` | `[]` or `[count]` |
/// | `Load` | `[addr]` |
/// | `Store` | `[addr, value]` |
/// | `Gep` | `[base, array_index]` |
/// | `Arith` | `[lhs, rhs]` |
/// | `UnaryArith` | `[operand]` |
/// | `Compare` | `[lhs, rhs]` |
/// | `Convert` | `[operand]` |
/// | `InsertValue` | `[base, inserted]` |
/// | `ExtractValue` | `[base]` |
/// | `Goto` | `[target]` |
/// | `Branch` | `[cond, then, else]` |
/// | `Return` | `[]` or `[value]` |
/// | `Call` | `[callee, args..]` |
/// | `Phi` | `[v0..vn-1, b0..bn-1]` |
/// | `Select` | `[cond, then, else]` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstOp {
    Alloca { allocated: Ty },
    Load { loaded: Ty },
    Store,
    Gep { inbounds_ty: Ty, member_indices: MemberIndices, inbounds: bool },
    Arith(ArithmeticOp),
    UnaryArith(UnaryArithmeticOp),
    Compare { mode: CompareMode, op: CompareOp },
    Convert(Conversion),
    InsertValue { indices: MemberIndices },
    ExtractValue { indices: MemberIndices },
    Goto,
    Branch,
    Return,
    Call,
    Phi,
    Select,
}

impl InstOp {
    pub fn is_terminator(&self) -> bool {
        matches!(self, InstOp::Goto | InstOp::Branch | InstOp::Return)
    }
}

/// Instruction payload: operation, flat operand list, owning block.
#[derive(Debug, Clone)]
pub struct InstData {
    pub op: InstOp,
    pub operands: Operands,
    pub parent: Option<Value>,
}

/// A `(predecessor, value)` pair of a phi node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhiMapping {
    pub pred: Block,
    pub value: Value,
}

/// Typed instruction constructors. Each creates a detached instruction
/// value with registered operand use-edges; attach it with
/// [`Block::push_inst`](crate::Block::push_inst) or through the builder.
pub struct Inst;

impl Inst {
    fn make(ctx: &mut Context, op: InstOp, operands: Operands, ty: Ty, name: Option<String>) -> Value {
        let name = name.filter(|n| !n.is_empty());
        let value = ctx.alloc_value(ValueData::new(
            ValueKind::Inst(InstData { op, operands, parent: None }),
            ty,
            name,
        ));
        ctx.register_uses(value);
        value
    }

    pub fn alloca(ctx: &mut Context, allocated: Ty, name: impl Into<String>) -> Value {
        let ptr = ctx.ptr_ty();
        Self::make(ctx, InstOp::Alloca { allocated }, Operands::new(), ptr, Some(name.into()))
    }

    pub fn alloca_count(ctx: &mut Context, allocated: Ty, count: Value, name: impl Into<String>) -> Value {
        let ptr = ctx.ptr_ty();
        Self::make(
            ctx,
            InstOp::Alloca { allocated },
            Operands::from_slice(&[count]),
            ptr,
            Some(name.into()),
        )
    }

    pub fn load(ctx: &mut Context, addr: Value, loaded: Ty, name: impl Into<String>) -> Value {
        debug_assert!(ctx.type_data(ctx.value_ty(addr)).is_pointer(), "load address must be a pointer");
        Self::make(ctx, InstOp::Load { loaded }, Operands::from_slice(&[addr]), loaded, Some(name.into()))
    }

    pub fn store(ctx: &mut Context, addr: Value, value: Value) -> Value {
        debug_assert!(ctx.type_data(ctx.value_ty(addr)).is_pointer(), "store address must be a pointer");
        let void = ctx.void_ty();
        Self::make(ctx, InstOp::Store, Operands::from_slice(&[addr, value]), void, None)
    }

    pub fn gep(
        ctx: &mut Context,
        inbounds_ty: Ty,
        base: Value,
        array_index: Value,
        member_indices: impl IntoIterator<Item = u32>,
        inbounds: bool,
        name: impl Into<String>,
    ) -> Value {
        let ptr = ctx.ptr_ty();
        Self::make(
            ctx,
            InstOp::Gep { inbounds_ty, member_indices: member_indices.into_iter().collect(), inbounds },
            Operands::from_slice(&[base, array_index]),
            ptr,
            Some(name.into()),
        )
    }

    pub fn arith(ctx: &mut Context, op: ArithmeticOp, lhs: Value, rhs: Value, name: impl Into<String>) -> Value {
        let ty = ctx.value_ty(lhs);
        debug_assert_eq!(ty, ctx.value_ty(rhs), "arithmetic operand type mismatch");
        Self::make(ctx, InstOp::Arith(op), Operands::from_slice(&[lhs, rhs]), ty, Some(name.into()))
    }

    pub fn unary_arith(ctx: &mut Context, op: UnaryArithmeticOp, operand: Value, name: impl Into<String>) -> Value {
        let ty = ctx.value_ty(operand);
        Self::make(ctx, InstOp::UnaryArith(op), Operands::from_slice(&[operand]), ty, Some(name.into()))
    }

    pub fn compare(
        ctx: &mut Context,
        mode: CompareMode,
        op: CompareOp,
        lhs: Value,
        rhs: Value,
        name: impl Into<String>,
    ) -> Value {
        debug_assert_eq!(ctx.value_ty(lhs), ctx.value_ty(rhs), "compare operand type mismatch");
        let b = ctx.bool_ty();
        Self::make(
            ctx,
            InstOp::Compare { mode, op },
            Operands::from_slice(&[lhs, rhs]),
            b,
            Some(name.into()),
        )
    }

    pub fn convert(ctx: &mut Context, conv: Conversion, operand: Value, target: Ty, name: impl Into<String>) -> Value {
        Self::make(ctx, InstOp::Convert(conv), Operands::from_slice(&[operand]), target, Some(name.into()))
    }

    pub fn insert_value(
        ctx: &mut Context,
        base: Value,
        inserted: Value,
        indices: impl IntoIterator<Item = u32>,
        name: impl Into<String>,
    ) -> Value {
        let ty = ctx.value_ty(base);
        Self::make(
            ctx,
            InstOp::InsertValue { indices: indices.into_iter().collect() },
            Operands::from_slice(&[base, inserted]),
            ty,
            Some(name.into()),
        )
    }

    pub fn extract_value(
        ctx: &mut Context,
        base: Value,
        indices: impl IntoIterator<Item = u32>,
        name: impl Into<String>,
    ) -> Value {
        let indices: MemberIndices = indices.into_iter().collect();
        let base_ty = ctx.value_ty(base);
        let ty = ctx
            .aggregate_member_ty(base_ty, &indices)
            .expect("extract_value indices must address a member");
        Self::make(ctx, InstOp::ExtractValue { indices }, Operands::from_slice(&[base]), ty, Some(name.into()))
    }

    pub fn goto(ctx: &mut Context, target: Block) -> Value {
        let void = ctx.void_ty();
        Self::make(ctx, InstOp::Goto, Operands::from_slice(&[target.0]), void, None)
    }

    pub fn branch(ctx: &mut Context, cond: Value, then_target: Block, else_target: Block) -> Value {
        debug_assert_eq!(ctx.value_ty(cond), ctx.bool_ty(), "branch condition must be i1");
        let void = ctx.void_ty();
        Self::make(
            ctx,
            InstOp::Branch,
            Operands::from_slice(&[cond, then_target.0, else_target.0]),
            void,
            None,
        )
    }

    pub fn ret(ctx: &mut Context, value: Option<Value>) -> Value {
        let void = ctx.void_ty();
        let operands = match value {
            Some(v) => Operands::from_slice(&[v]),
            None => Operands::new(),
        };
        Self::make(ctx, InstOp::Return, operands, void, None)
    }

    pub fn call(
        ctx: &mut Context,
        return_ty: Ty,
        callee: Value,
        args: impl IntoIterator<Item = Value>,
        name: impl Into<String>,
    ) -> Value {
        let mut operands = Operands::from_slice(&[callee]);
        operands.extend(args);
        let name = name.into();
        let name = if ctx.type_data(return_ty).is_void() { None } else { Some(name) };
        Self::make(ctx, InstOp::Call, operands, return_ty, name)
    }

    pub fn phi(ctx: &mut Context, ty: Ty, args: &[PhiMapping], name: impl Into<String>) -> Value {
        let mut operands = Operands::with_capacity(args.len() * 2);
        operands.extend(args.iter().map(|a| a.value));
        operands.extend(args.iter().map(|a| a.pred.0));
        Self::make(ctx, InstOp::Phi, operands, ty, Some(name.into()))
    }

    pub fn select(ctx: &mut Context, cond: Value, then_value: Value, else_value: Value, name: impl Into<String>) -> Value {
        debug_assert_eq!(ctx.value_ty(cond), ctx.bool_ty(), "select condition must be i1");
        let ty = ctx.value_ty(then_value);
        debug_assert_eq!(ty, ctx.value_ty(else_value), "select arm type mismatch");
        Self::make(
            ctx,
            InstOp::Select,
            Operands::from_slice(&[cond, then_value, else_value]),
            ty,
            Some(name.into()),
        )
    }
}

impl Value {
    /// The instruction payload, if this value is an instruction.
    pub fn inst_data<'a>(&self, ctx: &'a Context) -> Option<&'a InstData> {
        match &ctx.value_data(*self).kind {
            ValueKind::Inst(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_inst(&self, ctx: &Context) -> bool {
        self.inst_data(ctx).is_some()
    }

    pub fn is_terminator(&self, ctx: &Context) -> bool {
        self.inst_data(ctx).is_some_and(|data| data.op.is_terminator())
    }

    pub fn is_phi(&self, ctx: &Context) -> bool {
        self.inst_data(ctx).is_some_and(|data| matches!(data.op, InstOp::Phi))
    }

    /// An expression is an instruction that is neither a phi nor a
    /// terminator.
    pub fn is_expression(&self, ctx: &Context) -> bool {
        self.inst_data(ctx)
            .is_some_and(|data| !data.op.is_terminator() && !matches!(data.op, InstOp::Phi))
    }

    /// The block this instruction belongs to. Panics if detached or not an
    /// instruction.
    pub fn parent_block(&self, ctx: &Context) -> Block {
        Block(self.inst_data(ctx).expect("not an instruction").parent.expect("detached instruction"))
    }

    pub fn operands<'a>(&self, ctx: &'a Context) -> &'a [Value] {
        match &ctx.value_data(*self).kind {
            ValueKind::Inst(data) => &data.operands,
            _ => &[],
        }
    }

    /// Phi arguments in predecessor-list order.
    pub fn phi_args(&self, ctx: &Context) -> Vec<PhiMapping> {
        let data = self.inst_data(ctx).expect("not an instruction");
        debug_assert!(matches!(data.op, InstOp::Phi));
        let n = data.operands.len() / 2;
        (0..n)
            .map(|i| PhiMapping { pred: Block(data.operands[n + i]), value: data.operands[i] })
            .collect()
    }

    /// Successor blocks of a terminator, in operand order. A terminator
    /// whose edges were already cleared has none.
    pub fn successors(&self, ctx: &Context) -> SmallVec<[Block; 2]> {
        let data = self.inst_data(ctx).expect("not an instruction");
        match data.op {
            InstOp::Goto if data.operands.len() == 1 => {
                SmallVec::from_slice(&[Block(data.operands[0])])
            }
            InstOp::Branch if data.operands.len() == 3 => {
                SmallVec::from_slice(&[Block(data.operands[1]), Block(data.operands[2])])
            }
            _ => SmallVec::new(),
        }
    }

    /// For a call, the callee operand.
    pub fn callee(&self, ctx: &Context) -> Value {
        let data = self.inst_data(ctx).expect("not an instruction");
        debug_assert!(matches!(data.op, InstOp::Call));
        data.operands[0]
    }

    /// For a call, the argument operands.
    pub fn call_args<'a>(&self, ctx: &'a Context) -> &'a [Value] {
        let data = self.inst_data(ctx).expect("not an instruction");
        debug_assert!(matches!(data.op, InstOp::Call));
        &data.operands[1..]
    }

    /// Checks the typing rule of this instruction's result. Used by the
    /// validator.
    pub(crate) fn check_result_type(&self, ctx: &Context) -> Result<(), String> {
        let data = match self.inst_data(ctx) {
            Some(data) => data,
            None => return Ok(()),
        };
        let ty = ctx.value_ty(*self);
        let ok = match &data.op {
            InstOp::Alloca { .. } | InstOp::Gep { .. } => ctx.type_data(ty).is_pointer(),
            InstOp::Load { loaded } => ty == *loaded,
            InstOp::Store | InstOp::Goto | InstOp::Branch | InstOp::Return => ctx.type_data(ty).is_void(),
            InstOp::Arith(_) => ty == ctx.value_ty(data.operands[0]) && ty == ctx.value_ty(data.operands[1]),
            InstOp::UnaryArith(_) => ty == ctx.value_ty(data.operands[0]),
            InstOp::Compare { .. } => ctx.type_data(ty).is_bool(),
            InstOp::Convert(_) => true,
            InstOp::InsertValue { .. } => ty == ctx.value_ty(data.operands[0]),
            InstOp::ExtractValue { indices } => {
                let base_ty = ctx.value_ty(data.operands[0]);
                ctx.aggregate_member_ty(base_ty, indices) == Some(ty)
            }
            InstOp::Call => true,
            InstOp::Phi => data.operands[..data.operands.len() / 2]
                .iter()
                .all(|v| matches!(&ctx.value_data(*v).kind, ValueKind::ForwardRef) || ctx.value_ty(*v) == ty),
            InstOp::Select => ty == ctx.value_ty(data.operands[1]) && ty == ctx.value_ty(data.operands[2]),
        };
        if ok {
            Ok(())
        } else {
            Err(format!("instruction {:?} violates its typing rule", data.op))
        }
    }
}

impl TypeData {
    /// True for types a `Branch` condition may have.
    pub fn is_bool(&self) -> bool {
        matches!(self, TypeData::Integral { width: 1 })
    }
}
