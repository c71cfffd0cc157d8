//! Textual IR printer
//!
//! Deterministic, line-oriented ASCII. `parse(print(module))` yields an
//! equivalent module; printing that module again yields identical text.

use crate::context::Context;
use crate::instruction::{InstOp, MemberIndices};
use crate::module::Module;
use crate::types::TypeData;
use crate::types::Ty;
use crate::value::{Block, Function, Value, ValueKind};
use std::fmt::Write;

/// Prints a whole module: struct types, globals, foreign declarations, then
/// functions.
pub fn print_module(ctx: &Context, module: &Module) -> String {
    let mut out = String::new();
    for &ty in module.struct_types() {
        let TypeData::Struct { name: Some(name), elems } = ctx.type_data(ty) else {
            continue;
        };
        let members: Vec<String> = elems.iter().map(|&e| type_name(ctx, e)).collect();
        let _ = writeln!(out, "struct @{name} {{ {} }}", members.join(", "));
    }
    if !module.struct_types().is_empty() {
        out.push('\n');
    }
    for &global in module.globals() {
        let ValueKind::Global(data) = &ctx.value_data(global).kind else {
            continue;
        };
        let keyword = if data.is_const { "constant" } else { "global" };
        let name = ctx.value_name(global).unwrap_or("");
        let ty = type_name(ctx, data.value_ty);
        match data.initializer {
            Some(init) => {
                let _ = writeln!(out, "@{name} = {keyword} {ty} {}", value_name(ctx, init));
            }
            None => {
                let _ = writeln!(out, "@{name} = {keyword} {ty} undef");
            }
        }
    }
    if !module.globals().is_empty() {
        out.push('\n');
    }
    for &foreign in module.foreign_functions() {
        let ValueKind::ForeignFunction(data) = &ctx.value_data(foreign).kind else {
            continue;
        };
        let params: Vec<String> = data.param_tys.iter().map(|&t| type_name(ctx, t)).collect();
        let _ = writeln!(
            out,
            "ext func {} @{}({})",
            type_name(ctx, data.return_ty),
            ctx.value_name(foreign).unwrap_or(""),
            params.join(", ")
        );
    }
    if !module.foreign_functions().is_empty() {
        out.push('\n');
    }
    for (i, &function) in module.functions().iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&print_function(ctx, function));
    }
    out
}

/// Prints one function definition.
pub fn print_function(ctx: &Context, function: Function) -> String {
    let mut out = String::new();
    let params: Vec<String> = function
        .params(ctx)
        .iter()
        .map(|&p| {
            format!("{} %{}", type_name(ctx, ctx.value_ty(p)), ctx.value_name(p).unwrap_or(""))
        })
        .collect();
    let _ = writeln!(
        out,
        "func {} @{}({}) {{",
        type_name(ctx, function.return_ty(ctx)),
        function.name(ctx),
        params.join(", ")
    );
    for block in function.blocks(ctx) {
        let _ = writeln!(out, "%{}:", block.name(ctx));
        for &inst in block.instructions(ctx) {
            let _ = writeln!(out, "  {}", print_inst(ctx, inst));
        }
    }
    out.push_str("}\n");
    out
}

/// The name of a type in the textual syntax.
pub fn type_name(ctx: &Context, ty: Ty) -> String {
    match ctx.type_data(ty) {
        TypeData::Void => "void".to_string(),
        TypeData::Integral { width } => format!("i{width}"),
        TypeData::Float { width } => format!("f{width}"),
        TypeData::Pointer => "ptr".to_string(),
        TypeData::Label => "label".to_string(),
        TypeData::Array { elem, count } => {
            format!("[{count} x {}]", type_name(ctx, *elem))
        }
        TypeData::Struct { name: Some(name), .. } => format!("@{name}"),
        TypeData::Struct { name: None, elems } => {
            let members: Vec<String> = elems.iter().map(|&e| type_name(ctx, e)).collect();
            format!("{{ {} }}", members.join(", "))
        }
    }
}

/// How a value is referenced as an operand: `%local`, `@global`, or a
/// literal for constants.
pub fn value_name(ctx: &Context, value: Value) -> String {
    match &ctx.value_data(value).kind {
        ValueKind::IntConst(v) => format!("{v}"),
        ValueKind::FloatConst(v) => format!("{v}"),
        ValueKind::NullPointer => "null".to_string(),
        ValueKind::Undef => "undef".to_string(),
        ValueKind::StructConst { elems } => {
            let parts: Vec<String> = elems.iter().map(|&e| typed_operand(ctx, e)).collect();
            format!("{{ {} }}", parts.join(", "))
        }
        ValueKind::ArrayConst { elems } => {
            if let Some(text) = printable_string(ctx, elems) {
                format!("\"{text}\"")
            } else {
                let parts: Vec<String> = elems.iter().map(|&e| typed_operand(ctx, e)).collect();
                format!("[{}]", parts.join(", "))
            }
        }
        ValueKind::Global(_) | ValueKind::Function(_) | ValueKind::ForeignFunction(_) => {
            format!("@{}", ctx.value_name(value).unwrap_or(""))
        }
        _ => format!("%{}", ctx.value_name(value).unwrap_or("")),
    }
}

fn printable_string(ctx: &Context, elems: &[Value]) -> Option<String> {
    let mut text = String::new();
    for &elem in elems {
        let byte = ctx.as_int_constant(elem)?;
        if byte.width() != 8 {
            return None;
        }
        match byte.as_u64() as u8 {
            b'"' => text.push_str("\\\""),
            b'\\' => text.push_str("\\\\"),
            b'\n' => text.push_str("\\n"),
            b'\t' => text.push_str("\\t"),
            b'\0' => text.push_str("\\0"),
            b @ 0x20..=0x7e => text.push(b as char),
            _ => return None,
        }
    }
    Some(text)
}

/// `<type> <value>` as operands are written.
fn typed_operand(ctx: &Context, value: Value) -> String {
    format!("{} {}", type_name(ctx, ctx.value_ty(value)), value_name(ctx, value))
}

fn label_operand(ctx: &Context, block: Value) -> String {
    format!("label %{}", ctx.value_name(block).unwrap_or(""))
}

fn indices_suffix(indices: &MemberIndices) -> String {
    indices.iter().map(|i| format!(", {i}")).collect()
}

/// Prints a single instruction line (without indentation).
pub fn print_inst(ctx: &Context, inst: Value) -> String {
    let data = inst.inst_data(ctx).expect("not an instruction");
    let result = match ctx.value_name(inst) {
        Some(name) if !ctx.type_data(ctx.value_ty(inst)).is_void() => format!("%{name} = "),
        _ => String::new(),
    };
    let ops = &data.operands;
    let body = match &data.op {
        InstOp::Alloca { allocated } => {
            let ty = type_name(ctx, *allocated);
            match ops.first() {
                Some(&count) => format!("alloca {ty}, {}", typed_operand(ctx, count)),
                None => format!("alloca {ty}"),
            }
        }
        InstOp::Load { loaded } => {
            format!("load {}, {}", type_name(ctx, *loaded), typed_operand(ctx, ops[0]))
        }
        InstOp::Store => {
            format!("store {}, {}", typed_operand(ctx, ops[0]), typed_operand(ctx, ops[1]))
        }
        InstOp::Gep { inbounds_ty, member_indices, inbounds } => {
            format!(
                "getelementptr {}{}, {}, {}{}",
                if *inbounds { "inbounds " } else { "" },
                type_name(ctx, *inbounds_ty),
                typed_operand(ctx, ops[0]),
                typed_operand(ctx, ops[1]),
                indices_suffix(member_indices)
            )
        }
        InstOp::Arith(op) => {
            format!("{} {}, {}", op.keyword(), typed_operand(ctx, ops[0]), typed_operand(ctx, ops[1]))
        }
        InstOp::UnaryArith(op) => format!("{} {}", op.keyword(), typed_operand(ctx, ops[0])),
        InstOp::Compare { mode, op } => {
            format!(
                "{} {} {}, {}",
                mode.keyword(),
                op.keyword(),
                typed_operand(ctx, ops[0]),
                typed_operand(ctx, ops[1])
            )
        }
        InstOp::Convert(conv) => {
            format!(
                "{} {} to {}",
                conv.keyword(),
                typed_operand(ctx, ops[0]),
                type_name(ctx, ctx.value_ty(inst))
            )
        }
        InstOp::InsertValue { indices } => {
            format!(
                "insert_value {}, {}{}",
                typed_operand(ctx, ops[0]),
                typed_operand(ctx, ops[1]),
                indices_suffix(indices)
            )
        }
        InstOp::ExtractValue { indices } => {
            format!("extract_value {}{}", typed_operand(ctx, ops[0]), indices_suffix(indices))
        }
        InstOp::Goto => format!("goto {}", label_operand(ctx, ops[0])),
        InstOp::Branch => {
            format!(
                "branch {}, {}, {}",
                typed_operand(ctx, ops[0]),
                label_operand(ctx, ops[1]),
                label_operand(ctx, ops[2])
            )
        }
        InstOp::Return => match ops.first() {
            Some(&value) => format!("return {}", typed_operand(ctx, value)),
            None => "return".to_string(),
        },
        InstOp::Call => {
            let args: String = ops[1..]
                .iter()
                .map(|&a| format!(", {}", typed_operand(ctx, a)))
                .collect();
            format!(
                "call {} {}{args}",
                type_name(ctx, ctx.value_ty(inst)),
                value_name(ctx, ops[0])
            )
        }
        InstOp::Phi => {
            let n = ops.len() / 2;
            let args: Vec<String> = (0..n)
                .map(|i| format!("[{}, {}]", label_operand(ctx, ops[n + i]), value_name(ctx, ops[i])))
                .collect();
            format!("phi {} {}", type_name(ctx, ctx.value_ty(inst)), args.join(", "))
        }
        InstOp::Select => {
            format!(
                "select {}, {}, {}",
                typed_operand(ctx, ops[0]),
                typed_operand(ctx, ops[1]),
                typed_operand(ctx, ops[2])
            )
        }
    };
    let meta = ptr_info_suffix(ctx, inst);
    format!("{result}{body}{meta}")
}

fn ptr_info_suffix(ctx: &Context, inst: Value) -> String {
    let Some(info) = ctx.ptr_info(inst) else {
        return String::new();
    };
    let mut parts = vec![format!("align: {}", info.align)];
    if let Some(valid_size) = info.valid_size {
        parts.push(format!("validsize: {valid_size}"));
    }
    if let Some(prov) = info.provenance {
        if ctx.is_alive(prov) {
            parts.push(format!("provenance: ptr {}", value_name(ctx, prov)));
        }
    }
    if let Some(offset) = info.static_offset {
        parts.push(format!("offset: {offset}"));
    }
    if info.non_null {
        parts.push("nonnull".to_string());
    }
    if info.non_escaping {
        parts.push("noescape".to_string());
    }
    format!(" !ptr({})", parts.join(", "))
}

/// Convenience used by tests and logging.
pub fn block_label(ctx: &Context, block: Block) -> String {
    format!("%{}", block.name(ctx))
}
