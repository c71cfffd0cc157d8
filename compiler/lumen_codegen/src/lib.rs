//! Instruction selection and bytecode emission
//!
//! Converts SSA IR into a linear assembly stream for a register-based VM
//! with 256 general-purpose registers and byte-addressed memory, then
//! assembles the stream into a bytecode program: header, data image of
//! the globals, code section and foreign-function descriptor table.

pub mod asm;
pub mod assembler;
pub mod codegen;
pub mod ffi;
pub mod opcode;
pub mod regdesc;

pub use asm::{
    AsmInstruction, AssemblyStream, Element, Label, MemoryAddress, OperandKind, RegisterIndex,
    Value64, Value64Kind,
};
pub use assembler::{assemble, Program, ProgramHeader, PROGRAM_VERSION};
pub use codegen::{generate_module, layout_globals, split_critical_edges};
pub use ffi::{build_descriptor_table, ForeignFuncAddress, ForeignFunctionDecl};
pub use opcode::OpCode;
pub use regdesc::RegisterDescriptor;

use lumen_common::LumenResult;
use lumen_ir::{Context, Module, ValueKind};

/// Generates and assembles a whole module: the convenience entry point of
/// the backend. Execution starts in `@main` when present, else in the
/// first function.
pub fn compile_module(ctx: &mut Context, module: &Module) -> LumenResult<Program> {
    let stream = generate_module(ctx, module)?;
    let data = build_data_image(ctx, module);
    let foreign = build_descriptor_table(ctx, module);
    let entry = module
        .function_by_name(ctx, "main")
        .map(|f| f.id(ctx))
        .unwrap_or(0);
    assemble(&stream, data, foreign, entry)
}

/// Writes every constant-initialized global into the flat data image.
pub fn build_data_image(ctx: &Context, module: &Module) -> Vec<u8> {
    let (layout, total) = layout_globals(ctx, module);
    let mut image = vec![0u8; total as usize];
    for &global in module.globals() {
        let ValueKind::Global(data) = &ctx.value_data(global).kind else {
            continue;
        };
        let Some(init) = data.initializer else {
            continue;
        };
        let base = layout[&global] as usize;
        let leaves = regdesc::flatten_leaves(ctx, data.value_ty);
        let Some(values) = codegen::constant_leaves(ctx, init) else {
            continue;
        };
        for ((_, byte_off, leaf_ty), value) in leaves.into_iter().zip(values) {
            let size = ctx.size_of(leaf_ty) as usize;
            let bytes = value.value.to_le_bytes();
            let start = base + byte_off as usize;
            image[start..start + size].copy_from_slice(&bytes[..size]);
        }
    }
    image
}
