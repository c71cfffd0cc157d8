//! Assembly element stream
//!
//! The code generator emits a linear stream of tagged elements:
//! instruction families, labels, register indices, memory addresses,
//! immediates and an end-of-program sentinel. An instruction family (e.g.
//! `mov`) expands into one of several concrete opcodes based on the kinds
//! of its operands; the assembler performs that lookup and resolves labels
//! to byte offsets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Instruction families. The exact opcode is deduced from the operand
/// kinds by the assembler (e.g. `mov` becomes `movRR`, `movRV`, `movRM` or
/// `movMR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AsmInstruction {
    /// Function prologue; operand: Value16 register frame size.
    EnterFn,
    /// Reserve automatic storage; operands: destination register,
    /// Value16 byte size. The register receives the address.
    Alloca,
    Mov,
    Call,
    CallInd,
    CallExt,
    Ret,
    Terminate,
    Jmp,
    Je,
    Jne,
    Jl,
    Jle,
    Jg,
    Jge,
    UCmp,
    ICmp,
    FCmp,
    UTest,
    ITest,
    Sete,
    Setne,
    Setl,
    Setle,
    Setg,
    Setge,
    LNt,
    BNt,
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Rem,
    IRem,
    FAdd,
    FSub,
    FMul,
    FDiv,
    Sl,
    Sr,
    Asl,
    Asr,
    And,
    Or,
    XOr,
    /// Scalar conversions, in place on a register.
    Utof,
    Stof,
    Ftou,
    Ftos,
    Fext,
    Ftrunc,
}

impl AsmInstruction {
    /// Number of operand elements the family carries in the stream.
    pub fn arity(self) -> usize {
        use AsmInstruction as I;
        match self {
            I::Ret | I::Terminate => 0,
            I::EnterFn
            | I::Jmp
            | I::Je
            | I::Jne
            | I::Jl
            | I::Jle
            | I::Jg
            | I::Jge
            | I::UTest
            | I::ITest
            | I::Sete
            | I::Setne
            | I::Setl
            | I::Setle
            | I::Setg
            | I::Setge
            | I::LNt
            | I::BNt
            | I::Utof
            | I::Stof
            | I::Ftou
            | I::Ftos
            | I::Fext
            | I::Ftrunc => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for AsmInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EnterFn => "enterfn",
            Self::Alloca => "alloca",
            Self::Mov => "mov",
            Self::Call => "call",
            Self::CallInd => "callind",
            Self::CallExt => "callext",
            Self::Ret => "ret",
            Self::Terminate => "terminate",
            Self::Jmp => "jmp",
            Self::Je => "je",
            Self::Jne => "jne",
            Self::Jl => "jl",
            Self::Jle => "jle",
            Self::Jg => "jg",
            Self::Jge => "jge",
            Self::UCmp => "ucmp",
            Self::ICmp => "icmp",
            Self::FCmp => "fcmp",
            Self::UTest => "utest",
            Self::ITest => "itest",
            Self::Sete => "sete",
            Self::Setne => "setne",
            Self::Setl => "setl",
            Self::Setle => "setle",
            Self::Setg => "setg",
            Self::Setge => "setge",
            Self::LNt => "lnt",
            Self::BNt => "bnt",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::IDiv => "idiv",
            Self::Rem => "rem",
            Self::IRem => "irem",
            Self::FAdd => "fadd",
            Self::FSub => "fsub",
            Self::FMul => "fmul",
            Self::FDiv => "fdiv",
            Self::Sl => "sl",
            Self::Sr => "sr",
            Self::Asl => "asl",
            Self::Asr => "asr",
            Self::And => "and",
            Self::Or => "or",
            Self::XOr => "xor",
            Self::Utof => "utof",
            Self::Stof => "stof",
            Self::Ftou => "ftou",
            Self::Ftos => "ftos",
            Self::Fext => "fext",
            Self::Ftrunc => "ftrunc",
        };
        f.write_str(name)
    }
}

/// A label: function id plus block index. `FUNCTION_BEGIN` marks the
/// function's own label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub function_id: u32,
    pub block_index: u32,
}

impl Label {
    pub const FUNCTION_BEGIN: u32 = u32::MAX;

    pub fn function(function_id: u32) -> Self {
        Self { function_id, block_index: Self::FUNCTION_BEGIN }
    }

    pub fn block(function_id: u32, block_index: u32) -> Self {
        Self { function_id, block_index }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.block_index == Self::FUNCTION_BEGIN {
            write!(f, "F{}", self.function_id)
        } else {
            write!(f, "F{}.L{}", self.function_id, self.block_index)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisterIndex {
    pub index: u8,
}

impl RegisterIndex {
    pub fn new(index: usize) -> Self {
        Self { index: u8::try_from(index).expect("register index fits one byte") }
    }
}

impl fmt::Display for RegisterIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R[{}]", self.index)
    }
}

/// `[R[ptr] + offset << shift]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryAddress {
    pub ptr_reg: u8,
    pub offset: u8,
    pub offset_shift: u8,
}

impl MemoryAddress {
    pub fn new(ptr_reg: u8, offset: u8, offset_shift: u8) -> Self {
        Self { ptr_reg, offset, offset_shift }
    }
}

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MEMORY[R[{}] + {} * (1 << {})]",
            self.ptr_reg, self.offset, self.offset_shift
        )
    }
}

/// Origin of a 64-bit immediate; only consulted when printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value64Kind {
    Unsigned,
    Signed,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Value64 {
    pub value: u64,
    pub kind: Value64Kind,
}

impl Value64 {
    pub fn unsigned(value: u64) -> Self {
        Self { value, kind: Value64Kind::Unsigned }
    }

    pub fn signed(value: i64) -> Self {
        Self { value: value as u64, kind: Value64Kind::Signed }
    }

    pub fn float(value: f64) -> Self {
        Self { value: value.to_bits(), kind: Value64Kind::Float }
    }
}

impl fmt::Display for Value64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Value64Kind::Unsigned => write!(f, "{}", self.value),
            Value64Kind::Signed => write!(f, "{}", self.value as i64),
            Value64Kind::Float => write!(f, "{}", f64::from_bits(self.value)),
        }
    }
}

/// One element of the assembly stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Element {
    Instruction(AsmInstruction),
    Label(Label),
    Register(RegisterIndex),
    Memory(MemoryAddress),
    Value8(u8),
    Value16(u16),
    Value32(u32),
    Value64(Value64),
    EndOfProgram,
}

/// Operand-kind discriminator used by the opcode selection tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Instruction = 0,
    Label = 1,
    Register = 2,
    Memory = 3,
    Value8 = 4,
    Value16 = 5,
    Value32 = 6,
    Value64 = 7,
    EndOfProgram = 8,
}

pub const OPERAND_KIND_COUNT: usize = 9;

impl Element {
    pub fn kind(&self) -> OperandKind {
        match self {
            Element::Instruction(_) => OperandKind::Instruction,
            Element::Label(_) => OperandKind::Label,
            Element::Register(_) => OperandKind::Register,
            Element::Memory(_) => OperandKind::Memory,
            Element::Value8(_) => OperandKind::Value8,
            Element::Value16(_) => OperandKind::Value16,
            Element::Value32(_) => OperandKind::Value32,
            Element::Value64(_) => OperandKind::Value64,
            Element::EndOfProgram => OperandKind::EndOfProgram,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Instruction(inst) => write!(f, "{inst}"),
            Element::Label(label) => write!(f, "{label}:"),
            Element::Register(reg) => write!(f, "{reg}"),
            Element::Memory(mem) => write!(f, "{mem}"),
            Element::Value8(v) => write!(f, "{v}"),
            Element::Value16(v) => write!(f, "{v}"),
            Element::Value32(v) => write!(f, "{v}"),
            Element::Value64(v) => write!(f, "{v}"),
            Element::EndOfProgram => write!(f, "<end>"),
        }
    }
}

/// The linear element stream produced by code generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssemblyStream {
    pub elements: Vec<Element>,
}

impl AssemblyStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, element: Element) {
        self.elements.push(element);
    }

    pub fn instruction(&mut self, inst: AsmInstruction) {
        self.push(Element::Instruction(inst));
    }

    pub fn label(&mut self, label: Label) {
        self.push(Element::Label(label));
    }

    pub fn register(&mut self, index: usize) {
        self.push(Element::Register(RegisterIndex::new(index)));
    }

    pub fn extend(&mut self, other: AssemblyStream) {
        self.elements.extend(other.elements);
    }

    /// Human-readable listing, one instruction per line. Operand counts
    /// follow each family's arity, so label operands of jumps and calls
    /// stay on the instruction line while block labels start fresh lines.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        let mut line = String::new();
        let mut remaining = 0usize;
        let mut first_operand = true;
        let mut flush = |line: &mut String, out: &mut String| {
            if !line.is_empty() {
                out.push_str(line.trim_end());
                out.push('\n');
                line.clear();
            }
        };
        for element in &self.elements {
            match element {
                Element::Instruction(inst) => {
                    flush(&mut line, &mut out);
                    line = format!("  {inst} ");
                    remaining = inst.arity();
                    first_operand = true;
                }
                Element::Label(label) if remaining == 0 => {
                    flush(&mut line, &mut out);
                    out.push_str(&format!("{label}:\n"));
                }
                Element::EndOfProgram => {}
                operand => {
                    if !first_operand {
                        line.push_str(", ");
                    }
                    match operand {
                        Element::Label(label) => line.push_str(&format!("{label}")),
                        other => line.push_str(&format!("{other}")),
                    }
                    first_operand = false;
                    remaining = remaining.saturating_sub(1);
                }
            }
        }
        flush(&mut line, &mut out);
        out
    }
}
