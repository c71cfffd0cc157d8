//! Concrete opcodes and the family -> opcode selection tables
//!
//! An assembly instruction family expands to one of several concrete
//! opcodes based on the operand-kind pair; the lookup is a constant-time
//! table index. Jump families map straight through the unary table.

use crate::asm::{AsmInstruction, Element, OperandKind, OPERAND_KIND_COUNT};
use lumen_common::{LumenError, LumenResult};
use serde::{Deserialize, Serialize};

/// Concrete VM opcodes. Suffixes name the operand kinds: R register, V
/// immediate, M memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum OpCode {
    enterFn,
    alloca_,
    movRR,
    movRV,
    movRM,
    movMR,
    /// Register receives the resolved byte offset of a label.
    movRL,
    call,
    callInd,
    callExt,
    ret,
    terminate,
    jmp,
    je,
    jne,
    jl,
    jle,
    jg,
    jge,
    ucmpRR,
    ucmpRV,
    icmpRR,
    icmpRV,
    fcmpRR,
    fcmpRV,
    utest,
    itest,
    sete,
    setne,
    setl,
    setle,
    setg,
    setge,
    lnt,
    bnt,
    addRR,
    addRV,
    addRM,
    subRR,
    subRV,
    subRM,
    mulRR,
    mulRV,
    mulRM,
    divRR,
    divRV,
    divRM,
    idivRR,
    idivRV,
    idivRM,
    remRR,
    remRV,
    remRM,
    iremRR,
    iremRV,
    iremRM,
    faddRR,
    faddRV,
    faddRM,
    fsubRR,
    fsubRV,
    fsubRM,
    fmulRR,
    fmulRV,
    fmulRM,
    fdivRR,
    fdivRV,
    fdivRM,
    slRR,
    slRV,
    srRR,
    srRV,
    aslRR,
    aslRV,
    asrRR,
    asrRV,
    andRR,
    andRV,
    orRR,
    orRV,
    xorRR,
    xorRV,
    utof,
    stof,
    ftou,
    ftos,
    fext,
    ftrunc,
}

impl OpCode {
    /// Total encoded operand width in bytes (the opcode byte excluded).
    /// Labels encode as 4-byte offsets.
    pub fn operand_bytes(self) -> usize {
        use OpCode::*;
        match self {
            enterFn => 2,
            alloca_ => 1 + 2,
            movRR => 2,
            movRV => 1 + 8,
            movRM | movMR => 1 + 3,
            movRL => 1 + 4,
            call => 4 + 1,
            callInd => 1 + 1,
            callExt => 1 + 4,
            ret | terminate => 0,
            jmp | je | jne | jl | jle | jg | jge => 4,
            ucmpRR | icmpRR | fcmpRR => 2,
            ucmpRV | icmpRV | fcmpRV => 1 + 8,
            utest | itest => 1,
            sete | setne | setl | setle | setg | setge => 1,
            lnt | bnt => 1,
            addRR | subRR | mulRR | divRR | idivRR | remRR | iremRR | faddRR | fsubRR
            | fmulRR | fdivRR | slRR | srRR | aslRR | asrRR | andRR | orRR | xorRR => 2,
            addRV | subRV | mulRV | divRV | idivRV | remRV | iremRV | faddRV | fsubRV
            | fmulRV | fdivRV | slRV | srRV | aslRV | asrRV | andRV | orRV | xorRV => 1 + 8,
            addRM | subRM | mulRM | divRM | idivRM | remRM | iremRM | faddRM | fsubRM
            | fmulRM | fdivRM => 1 + 3,
            utof | stof | ftou | ftos | fext | ftrunc => 1,
        }
    }
}

/// A `(kind(a), kind(b)) -> opcode` table for one binary family.
struct OpCodeTable {
    entries: [Option<OpCode>; OPERAND_KIND_COUNT * OPERAND_KIND_COUNT],
}

impl OpCodeTable {
    const fn new(pairs: &[(OperandKind, OperandKind, OpCode)]) -> Self {
        let mut entries = [None; OPERAND_KIND_COUNT * OPERAND_KIND_COUNT];
        let mut i = 0;
        while i < pairs.len() {
            let (a, b, opcode) = pairs[i];
            entries[a as usize * OPERAND_KIND_COUNT + b as usize] = Some(opcode);
            i += 1;
        }
        Self { entries }
    }

    fn select(&self, a: OperandKind, b: OperandKind) -> Option<OpCode> {
        self.entries[a as usize * OPERAND_KIND_COUNT + b as usize]
    }
}

use OperandKind::{Label as L, Memory as M, Register as R, Value64 as V};

const MOV_TABLE: OpCodeTable = OpCodeTable::new(&[
    (R, R, OpCode::movRR),
    (R, V, OpCode::movRV),
    (R, M, OpCode::movRM),
    (M, R, OpCode::movMR),
    (R, L, OpCode::movRL),
]);

macro_rules! arith_table {
    ($name:ident, $rr:ident, $rv:ident, $rm:ident) => {
        const $name: OpCodeTable = OpCodeTable::new(&[
            (R, R, OpCode::$rr),
            (R, V, OpCode::$rv),
            (R, M, OpCode::$rm),
        ]);
    };
    ($name:ident, $rr:ident, $rv:ident) => {
        const $name: OpCodeTable = OpCodeTable::new(&[
            (R, R, OpCode::$rr),
            (R, V, OpCode::$rv),
        ]);
    };
}

arith_table!(ADD_TABLE, addRR, addRV, addRM);
arith_table!(SUB_TABLE, subRR, subRV, subRM);
arith_table!(MUL_TABLE, mulRR, mulRV, mulRM);
arith_table!(DIV_TABLE, divRR, divRV, divRM);
arith_table!(IDIV_TABLE, idivRR, idivRV, idivRM);
arith_table!(REM_TABLE, remRR, remRV, remRM);
arith_table!(IREM_TABLE, iremRR, iremRV, iremRM);
arith_table!(FADD_TABLE, faddRR, faddRV, faddRM);
arith_table!(FSUB_TABLE, fsubRR, fsubRV, fsubRM);
arith_table!(FMUL_TABLE, fmulRR, fmulRV, fmulRM);
arith_table!(FDIV_TABLE, fdivRR, fdivRV, fdivRM);
arith_table!(SL_TABLE, slRR, slRV);
arith_table!(SR_TABLE, srRR, srRV);
arith_table!(ASL_TABLE, aslRR, aslRV);
arith_table!(ASR_TABLE, asrRR, asrRV);
arith_table!(AND_TABLE, andRR, andRV);
arith_table!(OR_TABLE, orRR, orRV);
arith_table!(XOR_TABLE, xorRR, xorRV);
arith_table!(UCMP_TABLE, ucmpRR, ucmpRV);
arith_table!(ICMP_TABLE, icmpRR, icmpRV);
arith_table!(FCMP_TABLE, fcmpRR, fcmpRV);

/// Maps a family with no register/value operand variance.
pub fn map_unary_instruction(inst: AsmInstruction) -> LumenResult<OpCode> {
    use AsmInstruction as I;
    let opcode = match inst {
        I::EnterFn => OpCode::enterFn,
        I::Alloca => OpCode::alloca_,
        I::Call => OpCode::call,
        I::CallInd => OpCode::callInd,
        I::CallExt => OpCode::callExt,
        I::Ret => OpCode::ret,
        I::Terminate => OpCode::terminate,
        I::Jmp => OpCode::jmp,
        I::Je => OpCode::je,
        I::Jne => OpCode::jne,
        I::Jl => OpCode::jl,
        I::Jle => OpCode::jle,
        I::Jg => OpCode::jg,
        I::Jge => OpCode::jge,
        I::UTest => OpCode::utest,
        I::ITest => OpCode::itest,
        I::Sete => OpCode::sete,
        I::Setne => OpCode::setne,
        I::Setl => OpCode::setl,
        I::Setle => OpCode::setle,
        I::Setg => OpCode::setg,
        I::Setge => OpCode::setge,
        I::LNt => OpCode::lnt,
        I::BNt => OpCode::bnt,
        I::Utof => OpCode::utof,
        I::Stof => OpCode::stof,
        I::Ftou => OpCode::ftou,
        I::Ftos => OpCode::ftos,
        I::Fext => OpCode::fext,
        I::Ftrunc => OpCode::ftrunc,
        other => {
            return Err(LumenError::assembler_error(format!(
                "family {other} requires binary operand selection"
            )))
        }
    };
    Ok(opcode)
}

/// Selects the concrete opcode of a binary family from its operand kinds.
pub fn map_binary_instruction(
    inst: AsmInstruction,
    a: &Element,
    b: &Element,
) -> LumenResult<OpCode> {
    use AsmInstruction as I;
    let table = match inst {
        I::Mov => &MOV_TABLE,
        I::Add => &ADD_TABLE,
        I::Sub => &SUB_TABLE,
        I::Mul => &MUL_TABLE,
        I::Div => &DIV_TABLE,
        I::IDiv => &IDIV_TABLE,
        I::Rem => &REM_TABLE,
        I::IRem => &IREM_TABLE,
        I::FAdd => &FADD_TABLE,
        I::FSub => &FSUB_TABLE,
        I::FMul => &FMUL_TABLE,
        I::FDiv => &FDIV_TABLE,
        I::Sl => &SL_TABLE,
        I::Sr => &SR_TABLE,
        I::Asl => &ASL_TABLE,
        I::Asr => &ASR_TABLE,
        I::And => &AND_TABLE,
        I::Or => &OR_TABLE,
        I::XOr => &XOR_TABLE,
        I::UCmp => &UCMP_TABLE,
        I::ICmp => &ICMP_TABLE,
        I::FCmp => &FCMP_TABLE,
        other => {
            return Err(LumenError::assembler_error(format!(
                "family {other} has no binary selection table"
            )))
        }
    };
    table.select(a.kind(), b.kind()).ok_or_else(|| {
        LumenError::assembler_error(format!(
            "no opcode for {inst} with operand kinds {:?}, {:?}",
            a.kind(),
            b.kind()
        ))
    })
}

/// Maps an IR comparison operation to the conditional-jump family.
pub fn jump_for_compare(op: lumen_ir::CompareOp) -> AsmInstruction {
    match op {
        lumen_ir::CompareOp::Equal => AsmInstruction::Je,
        lumen_ir::CompareOp::NotEqual => AsmInstruction::Jne,
        lumen_ir::CompareOp::Less => AsmInstruction::Jl,
        lumen_ir::CompareOp::LessEq => AsmInstruction::Jle,
        lumen_ir::CompareOp::Greater => AsmInstruction::Jg,
        lumen_ir::CompareOp::GreaterEq => AsmInstruction::Jge,
    }
}

/// Maps an IR comparison operation to the flag-materializing set family.
pub fn set_for_compare(op: lumen_ir::CompareOp) -> AsmInstruction {
    match op {
        lumen_ir::CompareOp::Equal => AsmInstruction::Sete,
        lumen_ir::CompareOp::NotEqual => AsmInstruction::Setne,
        lumen_ir::CompareOp::Less => AsmInstruction::Setl,
        lumen_ir::CompareOp::LessEq => AsmInstruction::Setle,
        lumen_ir::CompareOp::Greater => AsmInstruction::Setg,
        lumen_ir::CompareOp::GreaterEq => AsmInstruction::Setge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{MemoryAddress, RegisterIndex, Value64};

    fn reg() -> Element {
        Element::Register(RegisterIndex { index: 0 })
    }

    fn val() -> Element {
        Element::Value64(Value64::unsigned(1))
    }

    fn mem() -> Element {
        Element::Memory(MemoryAddress::new(0, 0, 0))
    }

    #[test]
    fn mov_selects_by_operand_kinds() {
        assert_eq!(map_binary_instruction(AsmInstruction::Mov, &reg(), &reg()).unwrap(), OpCode::movRR);
        assert_eq!(map_binary_instruction(AsmInstruction::Mov, &reg(), &val()).unwrap(), OpCode::movRV);
        assert_eq!(map_binary_instruction(AsmInstruction::Mov, &reg(), &mem()).unwrap(), OpCode::movRM);
        assert_eq!(map_binary_instruction(AsmInstruction::Mov, &mem(), &reg()).unwrap(), OpCode::movMR);
    }

    #[test]
    fn unsupported_pairs_are_rejected() {
        assert!(map_binary_instruction(AsmInstruction::Mov, &mem(), &mem()).is_err());
        assert!(map_binary_instruction(AsmInstruction::UCmp, &mem(), &reg()).is_err());
    }

    #[test]
    fn jump_families_follow_the_comparison_op() {
        use lumen_ir::CompareOp;
        assert_eq!(jump_for_compare(CompareOp::Equal), AsmInstruction::Je);
        assert_eq!(jump_for_compare(CompareOp::Less), AsmInstruction::Jl);
        assert_eq!(jump_for_compare(CompareOp::GreaterEq), AsmInstruction::Jge);
        assert_eq!(set_for_compare(CompareOp::NotEqual), AsmInstruction::Setne);
    }
}
