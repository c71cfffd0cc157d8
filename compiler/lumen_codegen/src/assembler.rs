//! Assembler: element stream to bytecode program
//!
//! Two passes over the stream: the first groups elements into
//! instructions, selects concrete opcodes from the operand kinds and
//! assigns byte offsets to labels; the second encodes operands, patching
//! label references to resolved offsets. The output carries a program
//! header, the data image of the globals, the linear code section and the
//! foreign-function descriptor table.

use crate::asm::{AsmInstruction, AssemblyStream, Element, Label};
use crate::ffi::ForeignFunctionDecl;
use crate::opcode::{map_binary_instruction, map_unary_instruction, OpCode};
use hashbrown::HashMap;
use lumen_common::{LumenError, LumenResult};
use serde::{Deserialize, Serialize};

pub const PROGRAM_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramHeader {
    pub version: u32,
    pub data_size: u64,
    pub code_size: u64,
    /// Id of the function execution starts in.
    pub entry_function: u32,
}

/// The assembled bytecode program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub header: ProgramHeader,
    pub data: Vec<u8>,
    pub code: Vec<u8>,
    pub foreign_functions: Vec<ForeignFunctionDecl>,
}

/// Byte offsets of every label in the code section.
pub type LabelOffsets = HashMap<Label, u32>;

struct GroupedInstruction {
    family: AsmInstruction,
    operands: Vec<Element>,
}

enum StreamItem {
    Instruction(GroupedInstruction),
    Label(Label),
}

/// Groups the flat element stream into labels and instructions with their
/// operand lists. Operand counts follow the family arity, so a label
/// element is a block label exactly when no instruction is incomplete.
fn group(stream: &AssemblyStream) -> LumenResult<Vec<StreamItem>> {
    let mut items = Vec::new();
    let mut current: Option<(GroupedInstruction, usize)> = None;
    for element in &stream.elements {
        if let Some((inst, remaining)) = current.take() {
            if remaining == 0 {
                items.push(StreamItem::Instruction(inst));
            } else {
                current = Some((inst, remaining));
            }
        }
        match element {
            Element::Instruction(family) => {
                if let Some((incomplete, _)) = current.take() {
                    return Err(LumenError::assembler_error(format!(
                        "missing operands for {}",
                        incomplete.family
                    )));
                }
                let arity = family.arity();
                current =
                    Some((GroupedInstruction { family: *family, operands: Vec::new() }, arity));
            }
            Element::Label(label) if current.is_none() => {
                items.push(StreamItem::Label(*label));
            }
            Element::EndOfProgram => {}
            operand => match &mut current {
                Some((inst, remaining)) => {
                    inst.operands.push(*operand);
                    *remaining -= 1;
                }
                None => {
                    return Err(LumenError::assembler_error(
                        "operand element outside any instruction",
                    ))
                }
            },
        }
    }
    if let Some((inst, remaining)) = current {
        if remaining != 0 {
            return Err(LumenError::assembler_error(format!(
                "missing operands for {}",
                inst.family
            )));
        }
        items.push(StreamItem::Instruction(inst));
    }
    Ok(items)
}

fn select_opcode(inst: &GroupedInstruction) -> LumenResult<OpCode> {
    match inst.operands.as_slice() {
        [a, b] if is_selectable(inst.family) => map_binary_instruction(inst.family, a, b),
        _ => map_unary_instruction(inst.family),
    }
}

/// Families whose opcode depends on the operand kinds.
fn is_selectable(family: AsmInstruction) -> bool {
    use AsmInstruction as I;
    matches!(
        family,
        I::Mov
            | I::Add
            | I::Sub
            | I::Mul
            | I::Div
            | I::IDiv
            | I::Rem
            | I::IRem
            | I::FAdd
            | I::FSub
            | I::FMul
            | I::FDiv
            | I::Sl
            | I::Sr
            | I::Asl
            | I::Asr
            | I::And
            | I::Or
            | I::XOr
            | I::UCmp
            | I::ICmp
            | I::FCmp
    )
}

fn encoded_size(element: &Element) -> usize {
    match element {
        Element::Register(_) => 1,
        Element::Memory(_) => 3,
        Element::Value8(_) => 1,
        Element::Value16(_) => 2,
        Element::Value32(_) => 4,
        Element::Value64(_) => 8,
        Element::Label(_) => 4,
        Element::Instruction(_) | Element::EndOfProgram => 0,
    }
}

/// Assembles a stream into a program against a prebuilt data image and
/// descriptor table.
pub fn assemble(
    stream: &AssemblyStream,
    data: Vec<u8>,
    foreign_functions: Vec<ForeignFunctionDecl>,
    entry_function: u32,
) -> LumenResult<Program> {
    let items = group(stream)?;

    // First pass: opcodes and label offsets.
    let mut offsets = LabelOffsets::new();
    let mut opcodes = Vec::new();
    let mut offset = 0u32;
    for item in &items {
        match item {
            StreamItem::Label(label) => {
                if offsets.insert(*label, offset).is_some() {
                    return Err(LumenError::assembler_error(format!(
                        "duplicate label {label}"
                    )));
                }
            }
            StreamItem::Instruction(inst) => {
                let opcode = select_opcode(inst)?;
                let operand_bytes: usize = inst.operands.iter().map(encoded_size).sum();
                if operand_bytes != opcode.operand_bytes() {
                    return Err(LumenError::assembler_error(format!(
                        "operand size mismatch for {:?}: {} vs {}",
                        opcode,
                        operand_bytes,
                        opcode.operand_bytes()
                    )));
                }
                opcodes.push(opcode);
                offset += 1 + operand_bytes as u32;
            }
        }
    }

    // Second pass: byte emission with label resolution.
    let mut code = Vec::with_capacity(offset as usize);
    let mut opcode_iter = opcodes.into_iter();
    for item in &items {
        let StreamItem::Instruction(inst) = item else {
            continue;
        };
        let opcode = opcode_iter.next().expect("one opcode per instruction");
        code.push(opcode as u8);
        for operand in &inst.operands {
            match operand {
                Element::Register(r) => code.push(r.index),
                Element::Memory(m) => {
                    code.push(m.ptr_reg);
                    code.push(m.offset);
                    code.push(m.offset_shift);
                }
                Element::Value8(v) => code.push(*v),
                Element::Value16(v) => code.extend_from_slice(&v.to_le_bytes()),
                Element::Value32(v) => code.extend_from_slice(&v.to_le_bytes()),
                Element::Value64(v) => code.extend_from_slice(&v.value.to_le_bytes()),
                Element::Label(label) => {
                    let target = offsets.get(label).ok_or_else(|| {
                        LumenError::assembler_error(format!("unresolved label {label}"))
                    })?;
                    code.extend_from_slice(&target.to_le_bytes());
                }
                Element::Instruction(_) | Element::EndOfProgram => unreachable!(),
            }
        }
    }

    Ok(Program {
        header: ProgramHeader {
            version: PROGRAM_VERSION,
            data_size: data.len() as u64,
            code_size: code.len() as u64,
            entry_function,
        },
        data,
        code,
        foreign_functions,
    })
}
