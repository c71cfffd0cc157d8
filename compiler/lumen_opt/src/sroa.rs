//! Scalar replacement of aggregates
//!
//! For allocas whose uses are loads, stores and GEPs with constant member
//! indices and a constant zero array index, an access tree records which
//! sub-fields are touched. The alloca is split into one alloca per leaf of
//! the tree; aggregate loads become scalar loads rebuilt with
//! `insert_value` chains, aggregate stores become `extract_value` chains
//! followed by scalar stores. Allocas with non-constant or out-of-range
//! indices are skipped.

use crate::common::finish_pass;
use hashbrown::HashMap;
use lumen_ir::{Context, Function, Inst, InstOp, Ty, TypeData, Value};
use log::trace;

/// Arrays wider than this are not worth splitting.
const MAX_ARRAY_SPLIT: u64 = 16;

pub fn sroa(ctx: &mut Context, function: Function) -> bool {
    let Some(entry) = function.entry(ctx) else {
        return finish_pass(ctx, function, false);
    };
    let mut changed = false;
    let allocas: Vec<(Value, Ty)> = entry
        .instructions(ctx)
        .iter()
        .filter_map(|&inst| match inst.inst_data(ctx) {
            Some(data) if data.operands.is_empty() => match data.op {
                InstOp::Alloca { allocated } => Some((inst, allocated)),
                _ => None,
            },
            _ => None,
        })
        .collect();
    for (alloca, allocated) in allocas {
        if split_alloca(ctx, alloca, allocated) {
            changed = true;
        }
    }
    finish_pass(ctx, function, changed)
}

#[derive(Default)]
struct AccessNode {
    ty: Option<Ty>,
    /// Indexed children; `None` for members that are never accessed
    /// individually (filled in by completion when needed).
    children: Vec<Option<AccessNode>>,
    replacement: Option<Value>,
}

impl AccessNode {
    fn at(&mut self, index: usize) -> &mut AccessNode {
        if index >= self.children.len() {
            self.children.resize_with(index + 1, || None);
        }
        self.children[index].get_or_insert_with(AccessNode::default)
    }

    fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    fn walk(&self, path: &[u32]) -> &AccessNode {
        match path {
            [] => self,
            [first, rest @ ..] => self.children[*first as usize]
                .as_ref()
                .expect("access path exists")
                .walk(rest),
        }
    }

    /// Visits every leaf with its path relative to this node.
    fn leaf_walk(&self, path: &mut Vec<u32>, visit: &mut impl FnMut(&AccessNode, &[u32])) {
        if self.is_leaf() {
            visit(self, path);
            return;
        }
        for (index, child) in self.children.iter().enumerate() {
            if let Some(child) = child {
                path.push(index as u32);
                child.leaf_walk(path, visit);
                path.pop();
            }
        }
    }
}

fn split_alloca(ctx: &mut Context, alloca: Value, allocated: Ty) -> bool {
    let mut geps = Vec::new();
    if !collect_accesses(ctx, alloca, &mut geps) || geps.is_empty() {
        return false;
    }

    // Transform chains of GEPs into single GEPs based on the alloca.
    for &gep in &geps {
        flatten_gep_chain(ctx, gep);
    }
    // Unused address computations and loads just get in the way.
    geps.retain(|&gep| {
        clean_unused_loads(ctx, gep);
        if ctx.value_users(gep).is_empty() {
            let block = gep.parent_block(ctx);
            block.erase_inst(ctx, gep);
            false
        } else {
            true
        }
    });
    clean_unused_loads(ctx, alloca);

    // Build and complete the access tree.
    let mut root = AccessNode { ty: Some(allocated), ..AccessNode::default() };
    let mut paths: HashMap<Value, Vec<u32>> = HashMap::new();
    paths.insert(alloca, Vec::new());
    for &gep in &geps {
        let InstOp::Gep { member_indices, .. } = &gep.inst_data(ctx).expect("gep").op else {
            unreachable!();
        };
        let path: Vec<u32> = member_indices.to_vec();
        let mut node = &mut root;
        for &index in &path {
            node = node.at(index as usize);
        }
        node.ty = ctx.aggregate_member_ty(allocated, &path);
        paths.insert(gep, path);
    }
    if !complete_tree(ctx, &mut root) {
        return false;
    }

    // One fresh alloca per leaf, placed alongside the original.
    let entry = alloca.parent_block(ctx);
    let position = entry.inst_index(ctx, alloca).expect("alloca in entry");
    let stem = ctx.value_name(alloca).unwrap_or("agg").to_string();
    let mut created: Vec<(Vec<u32>, Value)> = Vec::new();
    let mut leaf_tys: Vec<(Vec<u32>, Ty)> = Vec::new();
    root.leaf_walk(&mut Vec::new(), &mut |node, path| {
        leaf_tys.push((path.to_vec(), node.ty.expect("leaf has a type")));
    });
    for (path, ty) in &leaf_tys {
        let name = ctx.unique_name(&format!("{stem}.slice"));
        let slice = Inst::alloca(ctx, *ty, name);
        entry.insert_inst(ctx, position, slice);
        created.push((path.clone(), slice));
    }
    set_replacements(&mut root, &created, &mut Vec::new());

    trace!("sroa: splitting {stem} into {} slices", created.len());

    // Rewrite accesses through each GEP, then through the alloca itself.
    for &gep in &geps {
        let node_path = paths[&gep].clone();
        rewrite_accesses(ctx, gep, root.walk(&node_path));
        debug_assert!(ctx.value_users(gep).is_empty());
        let block = gep.parent_block(ctx);
        block.erase_inst(ctx, gep);
    }
    rewrite_accesses(ctx, alloca, &root);
    debug_assert!(ctx.value_users(alloca).is_empty());
    entry.erase_inst(ctx, alloca);
    true
}

/// Checks promotability and gathers the transitive GEP users.
fn collect_accesses(ctx: &Context, base: Value, geps: &mut Vec<Value>) -> bool {
    for &user in ctx.value_users(base) {
        let Some(data) = user.inst_data(ctx) else {
            return false;
        };
        match &data.op {
            InstOp::Load { .. } => {}
            InstOp::Store => {
                if data.operands[1] == base {
                    // The address escapes by being stored.
                    return false;
                }
            }
            InstOp::Gep { member_indices, .. } => {
                let array_index = data.operands[1];
                let zero_index =
                    ctx.as_int_constant(array_index).is_some_and(|c| c.is_zero());
                if !zero_index || member_indices.is_empty() {
                    return false;
                }
                geps.push(user);
                if !collect_accesses(ctx, user, geps) {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}

/// Rebases `gep (gep base, 0, [a]), 0, [b]` onto `base` with path `[a, b]`.
fn flatten_gep_chain(ctx: &mut Context, gep: Value) {
    loop {
        let data = gep.inst_data(ctx).expect("gep");
        let InstOp::Gep { member_indices: ref outer, .. } = data.op else {
            unreachable!();
        };
        let outer = outer.clone();
        let base = data.operands[0];
        let Some(base_data) = base.inst_data(ctx) else {
            return;
        };
        let InstOp::Gep {
            inbounds_ty: base_ty, member_indices: ref inner, ..
        } = base_data.op
        else {
            return;
        };
        let mut combined = inner.clone();
        combined.extend(outer);
        let base_base = base_data.operands[0];
        let base_index = base_data.operands[1];
        ctx.set_operand(gep, 0, base_base);
        ctx.set_operand(gep, 1, base_index);
        if let InstOp::Gep { inbounds_ty, member_indices, .. } = ctx.inst_op_mut(gep) {
            *inbounds_ty = base_ty;
            *member_indices = combined;
        }
    }
}

fn clean_unused_loads(ctx: &mut Context, address: Value) {
    let loads: Vec<Value> = ctx
        .value_users(address)
        .iter()
        .copied()
        .filter(|&user| {
            matches!(user.inst_data(ctx).map(|d| &d.op), Some(InstOp::Load { .. }))
                && ctx.value_users(user).is_empty()
        })
        .collect();
    for load in loads {
        let block = load.parent_block(ctx);
        block.erase_inst(ctx, load);
    }
}

/// Expands interior nodes so every member of a directly accessed aggregate
/// has a leaf. Fails (returns false) on unsplittable shapes.
fn complete_tree(ctx: &Context, node: &mut AccessNode) -> bool {
    if node.children.iter().any(Option::is_some) {
        let Some(ty) = node.ty else {
            return false;
        };
        match ctx.type_data(ty).clone() {
            TypeData::Struct { elems, .. } => {
                for (index, member) in elems.iter().enumerate() {
                    let child = node.at(index);
                    if child.ty.is_none() {
                        child.ty = Some(*member);
                    }
                }
            }
            TypeData::Array { elem, count } => {
                if count > MAX_ARRAY_SPLIT {
                    return false;
                }
                for index in 0..count {
                    let child = node.at(index as usize);
                    if child.ty.is_none() {
                        child.ty = Some(elem);
                    }
                }
            }
            _ => return false,
        }
    }
    for child in node.children.iter_mut().flatten() {
        if !complete_tree(ctx, child) {
            return false;
        }
    }
    true
}

fn set_replacements(node: &mut AccessNode, created: &[(Vec<u32>, Value)], path: &mut Vec<u32>) {
    if node.is_leaf() {
        let slice = created
            .iter()
            .find(|(p, _)| p == path)
            .map(|&(_, v)| v)
            .expect("every leaf has a slice alloca");
        node.replacement = Some(slice);
        return;
    }
    for index in 0..node.children.len() {
        if node.children[index].is_some() {
            path.push(index as u32);
            let child = node.children[index].as_mut().unwrap();
            set_replacements(child, created, path);
            path.pop();
        }
    }
}

/// Rewrites the loads and stores hanging off one address to use the slice
/// allocas.
fn rewrite_accesses(ctx: &mut Context, address: Value, node: &AccessNode) {
    let users: Vec<Value> = ctx.value_users(address).to_vec();
    for user in users {
        let Some(data) = user.inst_data(ctx) else {
            continue;
        };
        let block = user.parent_block(ctx);
        match data.op.clone() {
            InstOp::Load { loaded } => {
                if let Some(slice) = node.replacement {
                    ctx.set_operand(user, 0, slice);
                    continue;
                }
                // Aggregate load: scalar loads stitched with insert_value.
                let mut aggregate = ctx.undef(loaded);
                let mut leaves: Vec<(Vec<u32>, Value, Ty)> = Vec::new();
                node.leaf_walk(&mut Vec::new(), &mut |leaf, path| {
                    leaves.push((
                        path.to_vec(),
                        leaf.replacement.expect("leaf has a slice"),
                        leaf.ty.expect("leaf has a type"),
                    ));
                });
                for (path, slice, ty) in leaves {
                    let name = ctx.unique_name("slice.load");
                    let scalar = Inst::load(ctx, slice, ty, name);
                    block.insert_inst_before(ctx, user, scalar);
                    let name = ctx.unique_name("slice.agg");
                    let inserted =
                        Inst::insert_value(ctx, aggregate, scalar, path.iter().copied(), name);
                    block.insert_inst_before(ctx, user, inserted);
                    aggregate = inserted;
                }
                ctx.replace_all_uses_with(user, aggregate);
                block.erase_inst(ctx, user);
            }
            InstOp::Store => {
                if let Some(slice) = node.replacement {
                    ctx.set_operand(user, 0, slice);
                    continue;
                }
                let stored = user.operands(ctx)[1];
                let mut leaves: Vec<(Vec<u32>, Value)> = Vec::new();
                node.leaf_walk(&mut Vec::new(), &mut |leaf, path| {
                    leaves.push((path.to_vec(), leaf.replacement.expect("leaf has a slice")));
                });
                for (path, slice) in leaves {
                    let name = ctx.unique_name("slice.val");
                    let extracted = Inst::extract_value(ctx, stored, path.iter().copied(), name);
                    block.insert_inst_before(ctx, user, extracted);
                    let store = Inst::store(ctx, slice, extracted);
                    block.insert_inst_before(ctx, user, store);
                }
                block.erase_inst(ctx, user);
            }
            InstOp::Gep { .. } => {
                // Handled separately through the GEP list.
            }
            _ => unreachable!("non-promotable user survived the gather phase"),
        }
    }
}
