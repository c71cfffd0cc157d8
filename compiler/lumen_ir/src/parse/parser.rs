//! Textual IR parser
//!
//! Builds a module against a caller-supplied context. One parse issue
//! aborts the current global definition; parsing continues at the next
//! top-level definition for robustness in batched inputs, and a non-empty
//! issue vector invalidates the whole result (callers use a throwaway
//! module).
//!
//! Forward references inside a function body resolve through placeholder
//! values that are replaced when the referent is declared; leftovers at
//! end-of-function report "use of undeclared identifier".

use super::issue::{ParseIssue, SemanticReason};
use super::lexer::Lexer;
use super::token::{Token, TokenKind};
use crate::context::Context;
use crate::instruction::{
    ArithmeticOp, CompareMode, CompareOp, Conversion, Inst, PhiMapping, UnaryArithmeticOp,
};
use crate::invariant::setup_invariants;
use crate::module::{Builtin, Module};
use crate::types::{Ty, TypeData};
use crate::value::{Block, Function, PointerInfo, Value, ValueData, ValueKind};
use hashbrown::HashMap;
use lumen_common::{ApFloat, ApInt};

/// Parses a textual IR module. On any issue the partially built module is
/// discarded and the issue vector is returned.
pub fn parse_module(ctx: &mut Context, name: &str, source: &str) -> Result<Module, Vec<ParseIssue>> {
    let mut parser = Parser {
        ctx,
        module: Module::new(name),
        lexer: Lexer::new(source),
        peeked: None,
        issues: Vec::new(),
        globals: HashMap::new(),
        global_placeholders: HashMap::new(),
        locals: HashMap::new(),
        local_placeholders: HashMap::new(),
        current_function: None,
        next_foreign_index: 0,
    };
    parser.run();
    if parser.issues.is_empty() {
        Ok(parser.module)
    } else {
        Err(parser.issues)
    }
}

type Parse<T> = Result<T, ParseIssue>;

struct Parser<'ctx, 'src> {
    ctx: &'ctx mut Context,
    module: Module,
    lexer: Lexer<'src>,
    peeked: Option<Token>,
    issues: Vec<ParseIssue>,
    globals: HashMap<String, Value>,
    global_placeholders: HashMap<String, (Token, Value)>,
    locals: HashMap<String, Value>,
    local_placeholders: HashMap<String, (Token, Value)>,
    current_function: Option<Function>,
    next_foreign_index: u32,
}

impl<'ctx, 'src> Parser<'ctx, 'src> {
    fn run(&mut self) {
        loop {
            match self.peek() {
                Ok(token) if token.kind == TokenKind::EndOfFile => break,
                Ok(_) => {}
                Err(issue) => {
                    self.issues.push(issue);
                    break;
                }
            }
            if let Err(issue) = self.parse_top_level() {
                self.issues.push(issue);
                self.recover();
            }
        }
        // Unresolved references to global names.
        let pending: Vec<Token> =
            self.global_placeholders.values().map(|(token, _)| token.clone()).collect();
        for token in pending {
            self.issues.push(ParseIssue::semantic(token, SemanticReason::UseOfUndeclaredIdentifier));
        }
    }

    /// Skips ahead to the next plausible top-level definition.
    fn recover(&mut self) {
        loop {
            match self.peek() {
                Err(_) => {
                    self.peeked = None;
                }
                Ok(token) => match token.kind {
                    TokenKind::EndOfFile
                    | TokenKind::Structure
                    | TokenKind::FunctionKw
                    | TokenKind::Ext
                    | TokenKind::GlobalIdentifier => return,
                    _ => {
                        let _ = self.eat();
                    }
                },
            }
        }
    }

    // ## Token plumbing

    fn peek(&mut self) -> Parse<Token> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        Ok(self.peeked.clone().unwrap())
    }

    fn eat(&mut self) -> Parse<Token> {
        let token = self.peek()?;
        self.peeked = None;
        Ok(token)
    }

    fn expect(&mut self, kind: TokenKind) -> Parse<Token> {
        let token = self.eat()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(ParseIssue::syntax(token))
        }
    }

    fn accept(&mut self, kind: TokenKind) -> Parse<Option<Token>> {
        if self.peek()?.kind == kind {
            Ok(Some(self.eat()?))
        } else {
            Ok(None)
        }
    }

    // ## Top level

    fn parse_top_level(&mut self) -> Parse<()> {
        let token = self.peek()?;
        match token.kind {
            TokenKind::Structure => self.parse_struct(),
            TokenKind::Ext => self.parse_foreign_function(),
            TokenKind::FunctionKw => self.parse_function(),
            TokenKind::GlobalIdentifier => self.parse_global(),
            _ => Err(ParseIssue::syntax(self.eat()?)),
        }
    }

    fn parse_struct(&mut self) -> Parse<()> {
        self.expect(TokenKind::Structure)?;
        let name = self.expect(TokenKind::GlobalIdentifier)?;
        self.expect(TokenKind::OpenBrace)?;
        let mut elems = Vec::new();
        if self.peek()?.kind != TokenKind::CloseBrace {
            loop {
                elems.push(self.parse_type()?);
                if self.accept(TokenKind::Comma)?.is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::CloseBrace)?;
        let Some(ty) = self.ctx.declare_struct_ty(&name.text, elems) else {
            return Err(ParseIssue::semantic(name, SemanticReason::Redeclaration));
        };
        self.module.add_struct_type(ty);
        Ok(())
    }

    fn parse_global(&mut self) -> Parse<()> {
        let name = self.expect(TokenKind::GlobalIdentifier)?;
        self.expect(TokenKind::Assign)?;
        let keyword = self.eat()?;
        let is_const = match keyword.kind {
            TokenKind::Global => false,
            TokenKind::ConstantKw => true,
            _ => return Err(ParseIssue::syntax(keyword)),
        };
        let ty = self.parse_type()?;
        let value_token = self.peek()?;
        let init = self.parse_value(ty)?;
        if !self.ctx.is_constant(init) {
            return Err(ParseIssue::semantic(value_token, SemanticReason::ExpectedConstantValue));
        }
        let global = self.module.add_global(self.ctx, &name.text, ty, Some(init), is_const);
        self.register_global(name, global)
    }

    fn parse_foreign_function(&mut self) -> Parse<()> {
        self.expect(TokenKind::Ext)?;
        self.expect(TokenKind::FunctionKw)?;
        let return_ty_token = self.peek()?;
        let return_ty = self.parse_type()?;
        if !self.is_ffi_safe(return_ty) {
            return Err(ParseIssue::semantic(return_ty_token, SemanticReason::InvalidFfiType));
        }
        let name = self.expect(TokenKind::GlobalIdentifier)?;
        self.expect(TokenKind::OpenParen)?;
        let mut param_tys = Vec::new();
        if self.peek()?.kind != TokenKind::CloseParen {
            loop {
                let param_token = self.peek()?;
                let param = self.parse_type()?;
                if !self.is_ffi_safe(param) || self.ctx.type_data(param).is_void() {
                    return Err(ParseIssue::semantic(param_token, SemanticReason::InvalidFfiType));
                }
                param_tys.push(param);
                if self.accept(TokenKind::Comma)?.is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::CloseParen)?;
        // Builtins keep their reserved slot and index; other foreign
        // functions are numbered in declaration order.
        let (slot, index, pure_fn) = match Builtin::from_name(&name.text) {
            Some(builtin) => (Builtin::SLOT, builtin.index(), builtin.is_pure()),
            None => {
                let index = self.next_foreign_index;
                self.next_foreign_index += 1;
                (1, index, false)
            }
        };
        let foreign = self.module.declare_foreign_function(
            self.ctx,
            &name.text,
            return_ty,
            param_tys,
            slot,
            index,
            pure_fn,
        );
        self.register_global(name, foreign)
    }

    fn is_ffi_safe(&self, ty: Ty) -> bool {
        matches!(
            self.ctx.type_data(ty),
            TypeData::Void | TypeData::Integral { .. } | TypeData::Float { .. } | TypeData::Pointer
        )
    }

    fn parse_function(&mut self) -> Parse<()> {
        self.expect(TokenKind::FunctionKw)?;
        let return_ty = self.parse_type()?;
        let name = self.expect(TokenKind::GlobalIdentifier)?;
        self.expect(TokenKind::OpenParen)?;
        let mut params = Vec::new();
        if self.peek()?.kind != TokenKind::CloseParen {
            loop {
                let ty = self.parse_type()?;
                let param_name = self.expect(TokenKind::LocalIdentifier)?;
                params.push((ty, param_name));
                if self.accept(TokenKind::Comma)?.is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::CloseParen)?;
        self.expect(TokenKind::OpenBrace)?;

        let function = self.ctx.create_function(
            &name.text,
            return_ty,
            params.iter().map(|(ty, token)| (*ty, token.text.clone())),
        );
        // Register before the body so recursive calls resolve.
        self.module.add_function(self.ctx, function);
        self.register_global(name, function.0)?;
        self.current_function = Some(function);
        self.locals.clear();
        self.local_placeholders.clear();
        let param_values = function.params(self.ctx).to_vec();
        for (value, (_, token)) in param_values.into_iter().zip(params) {
            self.register_local(token, value)?;
        }

        while self.accept(TokenKind::CloseBrace)?.is_none() {
            self.parse_basic_block(function)?;
        }

        // Leftover local placeholders are uses of undeclared identifiers.
        let pending: Vec<Token> =
            self.local_placeholders.values().map(|(token, _)| token.clone()).collect();
        self.local_placeholders.clear();
        if let Some(token) = pending.into_iter().next() {
            return Err(ParseIssue::semantic(token, SemanticReason::UseOfUndeclaredIdentifier));
        }

        setup_invariants(self.ctx, function);
        self.align_phi_arguments(function);
        self.current_function = None;
        Ok(())
    }

    /// Reorders every phi's arguments to match its block's predecessor
    /// list, which is built from terminator edges during invariant setup.
    fn align_phi_arguments(&mut self, function: Function) {
        for block in function.blocks(self.ctx) {
            let preds = block.predecessors(self.ctx);
            for phi in block.phis(self.ctx) {
                let args = phi.phi_args(self.ctx);
                if args.len() != preds.len() {
                    continue;
                }
                let reordered: Option<Vec<PhiMapping>> = preds
                    .iter()
                    .map(|&pred| args.iter().find(|a| a.pred == pred).copied())
                    .collect();
                if let Some(reordered) = reordered {
                    if reordered.as_slice() != args.as_slice() {
                        self.ctx.phi_set_args(phi, &reordered);
                    }
                }
            }
        }
    }

    fn parse_basic_block(&mut self, function: Function) -> Parse<()> {
        let name = self.expect(TokenKind::LocalIdentifier)?;
        self.expect(TokenKind::Colon)?;
        let block = self.ctx.create_block(&name.text);
        function.add_block(self.ctx, block);
        self.register_local(name, block.0)?;
        loop {
            let token = self.peek()?;
            match token.kind {
                TokenKind::CloseBrace => return Ok(()),
                TokenKind::LocalIdentifier => {
                    // Either a block header (`%name:`) or an instruction
                    // result (`%name = ...`). Decide on the following token.
                    let ident = self.eat()?;
                    let next = self.peek()?;
                    match next.kind {
                        TokenKind::Colon => {
                            self.peeked = Some(ident);
                            return Ok(());
                        }
                        TokenKind::Assign => {
                            self.eat()?;
                            let inst = self.parse_instruction(Some(ident.clone()))?;
                            block.push_inst(self.ctx, inst);
                            self.register_local(ident, inst)?;
                        }
                        _ => return Err(ParseIssue::syntax(next)),
                    }
                }
                _ => {
                    let inst = self.parse_instruction(None)?;
                    block.push_inst(self.ctx, inst);
                }
            }
        }
    }

    // ## Types

    fn parse_type(&mut self) -> Parse<Ty> {
        let token = self.eat()?;
        match token.kind {
            TokenKind::Void => Ok(self.ctx.void_ty()),
            TokenKind::Ptr => Ok(self.ctx.ptr_ty()),
            TokenKind::LabelKw => Ok(self.ctx.label_ty()),
            TokenKind::IntType => {
                if !matches!(token.width, 1 | 8 | 16 | 32 | 64) {
                    return Err(ParseIssue::semantic(token, SemanticReason::InvalidType));
                }
                Ok(self.ctx.int_ty(token.width))
            }
            TokenKind::FloatType => {
                if !matches!(token.width, 32 | 64) {
                    return Err(ParseIssue::semantic(token, SemanticReason::InvalidType));
                }
                Ok(self.ctx.float_ty(token.width))
            }
            TokenKind::OpenBracket => {
                let count_token = self.expect(TokenKind::IntLiteral)?;
                let count = count_token
                    .text
                    .parse::<u64>()
                    .map_err(|_| ParseIssue::syntax(count_token))?;
                self.expect(TokenKind::ArrayOf)?;
                let elem = self.parse_type()?;
                self.expect(TokenKind::CloseBracket)?;
                Ok(self.ctx.array_ty(elem, count))
            }
            TokenKind::OpenBrace => {
                let mut elems = Vec::new();
                if self.peek()?.kind != TokenKind::CloseBrace {
                    loop {
                        elems.push(self.parse_type()?);
                        if self.accept(TokenKind::Comma)?.is_none() {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::CloseBrace)?;
                Ok(self.ctx.anon_struct_ty(elems))
            }
            TokenKind::GlobalIdentifier => self
                .ctx
                .struct_ty_by_name(&token.text)
                .ok_or(ParseIssue::semantic(token, SemanticReason::ExpectedType)),
            _ => Err(ParseIssue::semantic(token, SemanticReason::ExpectedType)),
        }
    }

    // ## Values

    fn parse_typed_value(&mut self) -> Parse<Value> {
        let ty = self.parse_type()?;
        self.parse_value(ty)
    }

    fn parse_value(&mut self, expected: Ty) -> Parse<Value> {
        let token = self.eat()?;
        match token.kind {
            TokenKind::IntLiteral => {
                let TypeData::Integral { width } = self.ctx.type_data(expected) else {
                    return Err(ParseIssue::semantic(token, SemanticReason::TypeMismatch));
                };
                let width = *width;
                let Some(value) = ApInt::from_str_radix(&token.text, width) else {
                    return Err(ParseIssue::syntax(token));
                };
                Ok(self.ctx.int_constant(value))
            }
            TokenKind::FloatLiteral => {
                let TypeData::Float { width } = self.ctx.type_data(expected) else {
                    return Err(ParseIssue::semantic(token, SemanticReason::TypeMismatch));
                };
                let width = *width;
                let Some(value) = ApFloat::parse(&token.text, width) else {
                    return Err(ParseIssue::syntax(token));
                };
                Ok(self.ctx.float_constant(value))
            }
            TokenKind::NullLiteral => {
                if !self.ctx.type_data(expected).is_pointer() {
                    return Err(ParseIssue::semantic(token, SemanticReason::TypeMismatch));
                }
                Ok(self.ctx.null_pointer())
            }
            TokenKind::UndefLiteral => Ok(self.ctx.undef(expected)),
            TokenKind::StringLiteral => {
                let i8_ty = self.ctx.int_ty(8);
                let wanted = self.ctx.array_ty(i8_ty, token.text.len() as u64);
                if expected != wanted {
                    return Err(ParseIssue::semantic(token, SemanticReason::TypeMismatch));
                }
                Ok(self.ctx.string_constant(&token.text))
            }
            TokenKind::OpenBrace => {
                let TypeData::Struct { .. } = self.ctx.type_data(expected) else {
                    return Err(ParseIssue::semantic(token, SemanticReason::TypeMismatch));
                };
                let mut elems = Vec::new();
                if self.peek()?.kind != TokenKind::CloseBrace {
                    loop {
                        elems.push(self.parse_typed_value()?);
                        if self.accept(TokenKind::Comma)?.is_none() {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::CloseBrace)?;
                Ok(self.ctx.struct_constant(expected, elems))
            }
            TokenKind::OpenBracket => {
                let TypeData::Array { .. } = self.ctx.type_data(expected) else {
                    return Err(ParseIssue::semantic(token, SemanticReason::TypeMismatch));
                };
                let mut elems = Vec::new();
                if self.peek()?.kind != TokenKind::CloseBracket {
                    loop {
                        elems.push(self.parse_typed_value()?);
                        if self.accept(TokenKind::Comma)?.is_none() {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::CloseBracket)?;
                Ok(self.ctx.array_constant(expected, elems))
            }
            TokenKind::LocalIdentifier => self.local_ref(token, expected),
            TokenKind::GlobalIdentifier => self.global_ref(token, expected),
            _ => Err(ParseIssue::syntax(token)),
        }
    }

    fn local_ref(&mut self, token: Token, expected: Ty) -> Parse<Value> {
        if let Some(&value) = self.locals.get(&token.text) {
            if self.ctx.value_ty(value) != expected {
                return Err(ParseIssue::semantic(token, SemanticReason::TypeMismatch));
            }
            return Ok(value);
        }
        if let Some(&(_, placeholder)) = self.local_placeholders.get(&token.text).as_ref() {
            return Ok(*placeholder);
        }
        let placeholder = self
            .ctx
            .alloc_value(ValueData::new(ValueKind::ForwardRef, expected, Some(token.text.clone())));
        self.local_placeholders.insert(token.text.clone(), (token, placeholder));
        Ok(placeholder)
    }

    fn global_ref(&mut self, token: Token, expected: Ty) -> Parse<Value> {
        if let Some(&value) = self.globals.get(&token.text) {
            if self.ctx.value_ty(value) != expected {
                return Err(ParseIssue::semantic(token, SemanticReason::TypeMismatch));
            }
            return Ok(value);
        }
        if let Some(&(_, placeholder)) = self.global_placeholders.get(&token.text).as_ref() {
            return Ok(*placeholder);
        }
        let placeholder = self
            .ctx
            .alloc_value(ValueData::new(ValueKind::ForwardRef, expected, Some(token.text.clone())));
        self.global_placeholders.insert(token.text.clone(), (token, placeholder));
        Ok(placeholder)
    }

    /// A `label %name` block reference.
    fn block_ref(&mut self, token: Token) -> Parse<Block> {
        let label = self.ctx.label_ty();
        Ok(Block(self.local_ref(token, label)?))
    }

    fn register_local(&mut self, token: Token, value: Value) -> Parse<()> {
        if self.locals.contains_key(&token.text) {
            return Err(ParseIssue::semantic(token, SemanticReason::Redeclaration));
        }
        if let Some((use_token, placeholder)) = self.local_placeholders.remove(&token.text) {
            if self.ctx.value_ty(placeholder) != self.ctx.value_ty(value) {
                return Err(ParseIssue::semantic(use_token, SemanticReason::TypeMismatch));
            }
            self.ctx.replace_all_uses_with(placeholder, value);
            self.ctx.destroy_placeholder(placeholder);
        }
        self.locals.insert(token.text, value);
        Ok(())
    }

    fn register_global(&mut self, token: Token, value: Value) -> Parse<()> {
        if self.globals.contains_key(&token.text) {
            return Err(ParseIssue::semantic(token, SemanticReason::Redeclaration));
        }
        if let Some((use_token, placeholder)) = self.global_placeholders.remove(&token.text) {
            if self.ctx.value_ty(placeholder) != self.ctx.value_ty(value) {
                return Err(ParseIssue::semantic(use_token, SemanticReason::TypeMismatch));
            }
            self.ctx.replace_all_uses_with(placeholder, value);
            self.ctx.destroy_placeholder(placeholder);
        }
        self.globals.insert(token.text, value);
        Ok(())
    }

    // ## Instructions

    fn parse_instruction(&mut self, result: Option<Token>) -> Parse<Value> {
        let token = self.eat()?;
        let name = result.map(|t| t.text).unwrap_or_default();
        let inst = match token.kind {
            TokenKind::Alloca => {
                let allocated = self.parse_type()?;
                match self.accept(TokenKind::Comma)? {
                    Some(_) => {
                        let count = self.parse_typed_value()?;
                        Inst::alloca_count(self.ctx, allocated, count, name)
                    }
                    None => Inst::alloca(self.ctx, allocated, name),
                }
            }
            TokenKind::Load => {
                let loaded = self.parse_type()?;
                self.expect(TokenKind::Comma)?;
                let addr_token = self.peek()?;
                let addr = self.parse_typed_value()?;
                if !self.ctx.type_data(self.ctx.value_ty(addr)).is_pointer() {
                    return Err(ParseIssue::semantic(addr_token, SemanticReason::TypeMismatch));
                }
                Inst::load(self.ctx, addr, loaded, name)
            }
            TokenKind::Store => {
                let addr_token = self.peek()?;
                let addr = self.parse_typed_value()?;
                if !self.ctx.type_data(self.ctx.value_ty(addr)).is_pointer() {
                    return Err(ParseIssue::semantic(addr_token, SemanticReason::TypeMismatch));
                }
                self.expect(TokenKind::Comma)?;
                let value = self.parse_typed_value()?;
                Inst::store(self.ctx, addr, value)
            }
            TokenKind::GetElementPointer => {
                let inbounds = self.accept(TokenKind::Inbounds)?.is_some();
                let inbounds_ty = self.parse_type()?;
                self.expect(TokenKind::Comma)?;
                let base = self.parse_typed_value()?;
                self.expect(TokenKind::Comma)?;
                let array_index = self.parse_typed_value()?;
                let mut member_indices = Vec::new();
                while self.accept(TokenKind::Comma)?.is_some() {
                    let index_token = self.expect(TokenKind::IntLiteral)?;
                    let index = index_token
                        .text
                        .parse::<u32>()
                        .map_err(|_| ParseIssue::syntax(index_token))?;
                    member_indices.push(index);
                }
                Inst::gep(self.ctx, inbounds_ty, base, array_index, member_indices, inbounds, name)
            }
            kind if arithmetic_op(kind).is_some() => {
                let op = arithmetic_op(kind).unwrap();
                let lhs = self.parse_typed_value()?;
                self.expect(TokenKind::Comma)?;
                let rhs_token = self.peek()?;
                let rhs = self.parse_typed_value()?;
                if self.ctx.value_ty(lhs) != self.ctx.value_ty(rhs) {
                    return Err(ParseIssue::semantic(rhs_token, SemanticReason::TypeMismatch));
                }
                Inst::arith(self.ctx, op, lhs, rhs, name)
            }
            TokenKind::Neg | TokenKind::Bnt | TokenKind::Lnt => {
                let op = match token.kind {
                    TokenKind::Neg => UnaryArithmeticOp::Negate,
                    TokenKind::Bnt => UnaryArithmeticOp::BitwiseNot,
                    _ => UnaryArithmeticOp::LogicalNot,
                };
                let operand = self.parse_typed_value()?;
                Inst::unary_arith(self.ctx, op, operand, name)
            }
            TokenKind::SCmp | TokenKind::UCmp | TokenKind::FCmp => {
                let mode = match token.kind {
                    TokenKind::SCmp => CompareMode::Signed,
                    TokenKind::UCmp => CompareMode::Unsigned,
                    _ => CompareMode::Float,
                };
                let op_token = self.eat()?;
                let Some(op) = compare_op(op_token.kind) else {
                    return Err(ParseIssue::syntax(op_token));
                };
                let lhs = self.parse_typed_value()?;
                self.expect(TokenKind::Comma)?;
                let rhs_token = self.peek()?;
                let rhs = self.parse_typed_value()?;
                if self.ctx.value_ty(lhs) != self.ctx.value_ty(rhs) {
                    return Err(ParseIssue::semantic(rhs_token, SemanticReason::TypeMismatch));
                }
                Inst::compare(self.ctx, mode, op, lhs, rhs, name)
            }
            kind if conversion_op(kind).is_some() => {
                let conv = conversion_op(kind).unwrap();
                let operand = self.parse_typed_value()?;
                self.expect(TokenKind::To)?;
                let target = self.parse_type()?;
                Inst::convert(self.ctx, conv, operand, target, name)
            }
            TokenKind::InsertValue => {
                let base = self.parse_typed_value()?;
                self.expect(TokenKind::Comma)?;
                let inserted = self.parse_typed_value()?;
                let indices = self.parse_member_indices()?;
                Inst::insert_value(self.ctx, base, inserted, indices, name)
            }
            TokenKind::ExtractValue => {
                let base_token = self.peek()?;
                let base = self.parse_typed_value()?;
                let indices = self.parse_member_indices()?;
                let base_ty = self.ctx.value_ty(base);
                if self.ctx.aggregate_member_ty(base_ty, &indices).is_none() {
                    return Err(ParseIssue::semantic(base_token, SemanticReason::TypeMismatch));
                }
                Inst::extract_value(self.ctx, base, indices, name)
            }
            TokenKind::Goto => {
                self.expect(TokenKind::LabelKw)?;
                let target_token = self.expect(TokenKind::LocalIdentifier)?;
                let target = self.block_ref(target_token)?;
                Inst::goto(self.ctx, target)
            }
            TokenKind::Branch => {
                let cond_token = self.peek()?;
                let cond = self.parse_typed_value()?;
                if !self.ctx.type_data(self.ctx.value_ty(cond)).is_bool() {
                    return Err(ParseIssue::semantic(cond_token, SemanticReason::TypeMismatch));
                }
                self.expect(TokenKind::Comma)?;
                self.expect(TokenKind::LabelKw)?;
                let then_token = self.expect(TokenKind::LocalIdentifier)?;
                let then_target = self.block_ref(then_token)?;
                self.expect(TokenKind::Comma)?;
                self.expect(TokenKind::LabelKw)?;
                let else_token = self.expect(TokenKind::LocalIdentifier)?;
                let else_target = self.block_ref(else_token)?;
                Inst::branch(self.ctx, cond, then_target, else_target)
            }
            TokenKind::Return => {
                let function = self.current_function.expect("return outside function");
                let return_ty = function.return_ty(self.ctx);
                if self.ctx.type_data(return_ty).is_void() {
                    Inst::ret(self.ctx, None)
                } else {
                    let value_token = self.peek()?;
                    let ty = self.parse_type()?;
                    if ty != return_ty {
                        return Err(ParseIssue::semantic(value_token, SemanticReason::TypeMismatch));
                    }
                    let value = self.parse_value(ty)?;
                    Inst::ret(self.ctx, Some(value))
                }
            }
            TokenKind::Call => {
                let return_ty = self.parse_type()?;
                let callee_token = self.eat()?;
                let ptr = self.ctx.ptr_ty();
                let callee = match callee_token.kind {
                    TokenKind::GlobalIdentifier => self.global_ref(callee_token, ptr)?,
                    TokenKind::LocalIdentifier => self.local_ref(callee_token, ptr)?,
                    _ => return Err(ParseIssue::syntax(callee_token)),
                };
                let mut args = Vec::new();
                while self.accept(TokenKind::Comma)?.is_some() {
                    args.push(self.parse_typed_value()?);
                }
                Inst::call(self.ctx, return_ty, callee, args, name)
            }
            TokenKind::Phi => {
                let ty = self.parse_type()?;
                let mut args = Vec::new();
                loop {
                    self.expect(TokenKind::OpenBracket)?;
                    self.expect(TokenKind::LabelKw)?;
                    let pred_token = self.expect(TokenKind::LocalIdentifier)?;
                    let pred = self.block_ref(pred_token)?;
                    self.expect(TokenKind::Comma)?;
                    let value = self.parse_value(ty)?;
                    self.expect(TokenKind::CloseBracket)?;
                    args.push(PhiMapping { pred, value });
                    if self.accept(TokenKind::Comma)?.is_none() {
                        break;
                    }
                }
                Inst::phi(self.ctx, ty, &args, name)
            }
            TokenKind::Select => {
                let cond_token = self.peek()?;
                let cond = self.parse_typed_value()?;
                if !self.ctx.type_data(self.ctx.value_ty(cond)).is_bool() {
                    return Err(ParseIssue::semantic(cond_token, SemanticReason::TypeMismatch));
                }
                self.expect(TokenKind::Comma)?;
                let then_value = self.parse_typed_value()?;
                self.expect(TokenKind::Comma)?;
                let else_token = self.peek()?;
                let else_value = self.parse_typed_value()?;
                if self.ctx.value_ty(then_value) != self.ctx.value_ty(else_value) {
                    return Err(ParseIssue::semantic(else_token, SemanticReason::TypeMismatch));
                }
                Inst::select(self.ctx, cond, then_value, else_value, name)
            }
            _ => return Err(ParseIssue::syntax(token)),
        };
        if self.accept(TokenKind::MetaPtr)?.is_some() {
            let info = self.parse_ptr_info()?;
            self.ctx.set_ptr_info(inst, info);
        }
        Ok(inst)
    }

    fn parse_member_indices(&mut self) -> Parse<Vec<u32>> {
        let mut indices = Vec::new();
        while self.accept(TokenKind::Comma)?.is_some() {
            let index_token = self.expect(TokenKind::IntLiteral)?;
            let index = index_token
                .text
                .parse::<u32>()
                .map_err(|_| ParseIssue::syntax(index_token))?;
            indices.push(index);
        }
        Ok(indices)
    }

    fn parse_ptr_info(&mut self) -> Parse<PointerInfo> {
        self.expect(TokenKind::OpenParen)?;
        let mut info = PointerInfo::default();
        loop {
            let key = self.expect(TokenKind::Word)?;
            match key.text.as_str() {
                "align" => {
                    self.expect(TokenKind::Colon)?;
                    let value = self.expect(TokenKind::IntLiteral)?;
                    info.align = value.text.parse().map_err(|_| ParseIssue::syntax(value))?;
                }
                "validsize" => {
                    self.expect(TokenKind::Colon)?;
                    let value = self.expect(TokenKind::IntLiteral)?;
                    info.valid_size =
                        Some(value.text.parse().map_err(|_| ParseIssue::syntax(value))?);
                }
                "offset" => {
                    self.expect(TokenKind::Colon)?;
                    let value = self.expect(TokenKind::IntLiteral)?;
                    info.static_offset =
                        Some(value.text.parse().map_err(|_| ParseIssue::syntax(value))?);
                }
                "provenance" => {
                    self.expect(TokenKind::Colon)?;
                    self.expect(TokenKind::Ptr)?;
                    let ptr = self.ctx.ptr_ty();
                    let target_token = self.eat()?;
                    let value = match target_token.kind {
                        TokenKind::LocalIdentifier => self.local_ref(target_token, ptr)?,
                        TokenKind::GlobalIdentifier => self.global_ref(target_token, ptr)?,
                        _ => return Err(ParseIssue::syntax(target_token)),
                    };
                    info.provenance = Some(value);
                }
                "nonnull" => info.non_null = true,
                "noescape" => info.non_escaping = true,
                _ => return Err(ParseIssue::semantic(key, SemanticReason::UnexpectedId)),
            }
            if self.accept(TokenKind::Comma)?.is_none() {
                break;
            }
        }
        self.expect(TokenKind::CloseParen)?;
        Ok(info)
    }
}

fn arithmetic_op(kind: TokenKind) -> Option<ArithmeticOp> {
    use TokenKind::*;
    let op = match kind {
        Add => ArithmeticOp::Add,
        Sub => ArithmeticOp::Sub,
        Mul => ArithmeticOp::Mul,
        SDiv => ArithmeticOp::SDiv,
        UDiv => ArithmeticOp::UDiv,
        SRem => ArithmeticOp::SRem,
        URem => ArithmeticOp::URem,
        FAdd => ArithmeticOp::FAdd,
        FSub => ArithmeticOp::FSub,
        FMul => ArithmeticOp::FMul,
        FDiv => ArithmeticOp::FDiv,
        LShL => ArithmeticOp::LShL,
        LShR => ArithmeticOp::LShR,
        AShL => ArithmeticOp::AShL,
        AShR => ArithmeticOp::AShR,
        And => ArithmeticOp::And,
        Or => ArithmeticOp::Or,
        XOr => ArithmeticOp::XOr,
        _ => return None,
    };
    Some(op)
}

fn compare_op(kind: TokenKind) -> Option<CompareOp> {
    use TokenKind::*;
    let op = match kind {
        Equal => CompareOp::Equal,
        NotEqual => CompareOp::NotEqual,
        Less => CompareOp::Less,
        LessEq => CompareOp::LessEq,
        Greater => CompareOp::Greater,
        GreaterEq => CompareOp::GreaterEq,
        _ => return None,
    };
    Some(op)
}

fn conversion_op(kind: TokenKind) -> Option<Conversion> {
    use TokenKind::*;
    let conv = match kind {
        Zext => Conversion::Zext,
        Sext => Conversion::Sext,
        Trunc => Conversion::Trunc,
        Fext => Conversion::Fext,
        Ftrunc => Conversion::Ftrunc,
        UtoF => Conversion::UtoF,
        StoF => Conversion::StoF,
        FtoU => Conversion::FtoU,
        FtoS => Conversion::FtoS,
        Bitcast => Conversion::Bitcast,
        _ => return None,
    };
    Some(conv)
}
