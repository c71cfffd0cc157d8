//! Dominance and post-dominance
//!
//! Computed with the iterative data-flow algorithm over reverse-postorder
//! numberings (Cooper/Harvey/Kennedy). Post-dominance runs the same
//! algorithm on the reverse CFG with a virtual exit synthesized when the
//! function has multiple (or no) exit blocks.

use crate::context::Context;
use crate::value::{Block, Function};
use hashbrown::HashMap;

/// Immediate-dominator tree plus dominance frontiers.
///
/// Unreachable blocks are absent from every map; queries about them return
/// `false`/empty.
#[derive(Debug, Clone)]
pub struct DominanceInfo {
    /// `None` means the block's immediate dominator is the (virtual) root.
    idom: HashMap<Block, Option<Block>>,
    children: HashMap<Block, Vec<Block>>,
    frontiers: HashMap<Block, Vec<Block>>,
    /// Reachable blocks in reverse postorder of the traversed graph.
    order: Vec<Block>,
}

impl DominanceInfo {
    /// Dominator tree over the forward CFG. The root is the entry block.
    pub fn compute(ctx: &Context, function: Function) -> Self {
        let blocks = function.blocks(ctx);
        let index: HashMap<Block, usize> =
            blocks.iter().enumerate().map(|(i, &b)| (b, i)).collect();
        let n = blocks.len();
        let mut succs = vec![Vec::new(); n];
        let mut preds = vec![Vec::new(); n];
        for (i, block) in blocks.iter().enumerate() {
            for succ in block.successors(ctx) {
                let j = index[&succ];
                succs[i].push(j);
                preds[j].push(i);
            }
        }
        let graph = Graph { n, succs, preds, root: 0, virtual_root: false };
        Self::from_graph(&graph, |i| blocks[i])
    }

    /// Dominator tree over the reverse CFG rooted at a virtual exit.
    pub fn compute_post(ctx: &Context, function: Function) -> Self {
        let blocks = function.blocks(ctx);
        let index: HashMap<Block, usize> =
            blocks.iter().enumerate().map(|(i, &b)| (b, i)).collect();
        let n = blocks.len();
        // Node n is the virtual exit; edges are reversed.
        let mut succs = vec![Vec::new(); n + 1];
        let mut preds = vec![Vec::new(); n + 1];
        for (i, block) in blocks.iter().enumerate() {
            let forward: Vec<usize> = block
                .successors(ctx)
                .iter()
                .map(|succ| index[succ])
                .collect();
            if forward.is_empty() {
                // Exit block: reverse edge from the virtual exit.
                succs[n].push(i);
                preds[i].push(n);
            }
            for j in forward {
                succs[j].push(i);
                preds[i].push(j);
            }
        }
        let graph = Graph { n: n + 1, succs, preds, root: n, virtual_root: true };
        Self::from_graph(&graph, |i| {
            debug_assert!(i < n, "virtual exit must not surface");
            blocks[i]
        })
    }

    fn from_graph(graph: &Graph, block_of: impl Fn(usize) -> Block) -> Self {
        let (rpo, rpo_number) = graph.reverse_postorder();
        let idoms = graph.compute_idoms(&rpo, &rpo_number);
        let frontiers = graph.compute_frontiers(&idoms, &rpo);

        let mut result = Self {
            idom: HashMap::new(),
            children: HashMap::new(),
            frontiers: HashMap::new(),
            order: Vec::new(),
        };
        let is_virtual = |node: usize| graph.virtual_root && node == graph.root;
        for &node in &rpo {
            if is_virtual(node) {
                continue;
            }
            let block = block_of(node);
            result.order.push(block);
            let parent_block = match idoms[node].filter(|&p| p != node) {
                Some(p) if !is_virtual(p) => Some(block_of(p)),
                _ => None,
            };
            result.idom.insert(block, parent_block);
            if let Some(parent_block) = parent_block {
                result.children.entry(parent_block).or_default().push(block);
            }
            let front: Vec<Block> = frontiers[node]
                .iter()
                .filter(|&&f| !is_virtual(f))
                .map(|&f| block_of(f))
                .collect();
            result.frontiers.insert(block, front);
        }
        result
    }

    /// `true` if this info covers `block` (i.e. it is reachable).
    pub fn contains(&self, block: Block) -> bool {
        self.idom.contains_key(&block)
    }

    /// The immediate dominator; `None` for the root and for blocks whose
    /// immediate dominator is the virtual exit.
    pub fn idom(&self, block: Block) -> Option<Block> {
        self.idom.get(&block).copied().flatten()
    }

    /// Dominator-tree children.
    pub fn children(&self, block: Block) -> &[Block] {
        self.children.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The dominance frontier of `block`.
    pub fn frontier(&self, block: Block) -> &[Block] {
        self.frontiers.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reachable blocks in reverse postorder.
    pub fn order(&self) -> &[Block] {
        &self.order
    }

    /// `true` if `a` dominates `b` (reflexively).
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        if !self.contains(a) || !self.contains(b) {
            return false;
        }
        let mut current = Some(b);
        while let Some(block) = current {
            if block == a {
                return true;
            }
            current = self.idom(block);
        }
        false
    }

    /// Preorder walk of the dominator subtree rooted at `block`.
    pub fn traverse_preorder(&self, block: Block, visit: &mut impl FnMut(Block)) {
        visit(block);
        for &child in self.children(block) {
            self.traverse_preorder(child, visit);
        }
    }

    /// Iterated dominance frontier of a set of blocks (phi insertion sites).
    pub fn iterated_frontier(&self, blocks: &[Block]) -> Vec<Block> {
        let mut result: Vec<Block> = Vec::new();
        let mut worklist: Vec<Block> = blocks.to_vec();
        let mut seen: hashbrown::HashSet<Block> = worklist.iter().copied().collect();
        while let Some(block) = worklist.pop() {
            for &front in self.frontier(block) {
                if seen.insert(front) {
                    worklist.push(front);
                }
                if !result.contains(&front) {
                    result.push(front);
                }
            }
        }
        result
    }
}

struct Graph {
    n: usize,
    succs: Vec<Vec<usize>>,
    preds: Vec<Vec<usize>>,
    root: usize,
    virtual_root: bool,
}

impl Graph {
    fn reverse_postorder(&self) -> (Vec<usize>, Vec<usize>) {
        let mut visited = vec![false; self.n];
        let mut postorder = Vec::with_capacity(self.n);
        // Iterative DFS; the stack holds (node, next-successor-index).
        let mut stack = vec![(self.root, 0usize)];
        visited[self.root] = true;
        while let Some(&mut (node, ref mut next)) = stack.last_mut() {
            if *next < self.succs[node].len() {
                let succ = self.succs[node][*next];
                *next += 1;
                if !visited[succ] {
                    visited[succ] = true;
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(node);
                stack.pop();
            }
        }
        let rpo: Vec<usize> = postorder.into_iter().rev().collect();
        let mut rpo_number = vec![usize::MAX; self.n];
        for (i, &node) in rpo.iter().enumerate() {
            rpo_number[node] = i;
        }
        (rpo, rpo_number)
    }

    fn compute_idoms(&self, rpo: &[usize], rpo_number: &[usize]) -> Vec<Option<usize>> {
        let mut idom: Vec<Option<usize>> = vec![None; self.n];
        idom[self.root] = Some(self.root);
        let mut changed = true;
        while changed {
            changed = false;
            for &node in rpo.iter().skip(1) {
                let mut new_idom: Option<usize> = None;
                for &pred in &self.preds[node] {
                    if idom[pred].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => self.intersect(pred, current, &idom, rpo_number),
                    });
                }
                if new_idom.is_some() && idom[node] != new_idom {
                    idom[node] = new_idom;
                    changed = true;
                }
            }
        }
        idom
    }

    fn intersect(&self, a: usize, b: usize, idom: &[Option<usize>], rpo_number: &[usize]) -> usize {
        let (mut a, mut b) = (a, b);
        while a != b {
            while rpo_number[a] > rpo_number[b] {
                a = idom[a].expect("processed node has an idom");
            }
            while rpo_number[b] > rpo_number[a] {
                b = idom[b].expect("processed node has an idom");
            }
        }
        a
    }

    fn compute_frontiers(&self, idom: &[Option<usize>], rpo: &[usize]) -> Vec<Vec<usize>> {
        let mut frontiers = vec![Vec::new(); self.n];
        for &node in rpo {
            if self.preds[node].len() < 2 {
                continue;
            }
            let stop = idom[node].expect("reachable join has an idom");
            for &pred in &self.preds[node] {
                if idom[pred].is_none() {
                    // Unreachable predecessor.
                    continue;
                }
                let mut runner = pred;
                while runner != stop {
                    if !frontiers[runner].contains(&node) {
                        frontiers[runner].push(node);
                    }
                    let next = idom[runner].expect("reachable node has an idom");
                    if next == runner {
                        // Reached the root without meeting the idom; the
                        // node itself dominates this predecessor chain.
                        break;
                    }
                    runner = next;
                }
            }
        }
        frontiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Inst;

    /// entry -> {left, right} -> join
    fn diamond(ctx: &mut Context) -> (Function, [Block; 4]) {
        let i64_ty = ctx.int_ty(64);
        let bool_ty = ctx.bool_ty();
        let function = ctx.create_function("f", i64_ty, vec![(bool_ty, "c".to_string())]);
        let blocks = [
            ctx.create_block("entry"),
            ctx.create_block("left"),
            ctx.create_block("right"),
            ctx.create_block("join"),
        ];
        for block in blocks {
            function.add_block(ctx, block);
        }
        let cond = function.params(ctx)[0];
        let branch = Inst::branch(ctx, cond, blocks[1], blocks[2]);
        blocks[0].push_inst(ctx, branch);
        for side in [blocks[1], blocks[2]] {
            let goto = Inst::goto(ctx, blocks[3]);
            side.push_inst(ctx, goto);
        }
        let ret = Inst::ret(ctx, None);
        blocks[3].push_inst(ctx, ret);
        crate::invariant::setup_invariants(ctx, function);
        (function, blocks)
    }

    #[test]
    fn diamond_joins_at_the_branch_block() {
        let mut ctx = Context::new();
        let (function, [entry, left, right, join]) = diamond(&mut ctx);
        let dom = DominanceInfo::compute(&ctx, function);
        assert_eq!(dom.idom(join), Some(entry));
        assert_eq!(dom.idom(left), Some(entry));
        assert!(dom.dominates(entry, join));
        assert!(!dom.dominates(left, join));
        assert_eq!(dom.frontier(left), &[join]);
        assert_eq!(dom.frontier(right), &[join]);
    }

    #[test]
    fn iterated_frontier_finds_phi_sites() {
        let mut ctx = Context::new();
        let (function, [_, left, right, join]) = diamond(&mut ctx);
        let dom = DominanceInfo::compute(&ctx, function);
        assert_eq!(dom.iterated_frontier(&[left, right]), vec![join]);
    }

    #[test]
    fn post_dominance_mirrors_the_diamond() {
        let mut ctx = Context::new();
        let (function, [entry, left, right, join]) = diamond(&mut ctx);
        let postdom = DominanceInfo::compute_post(&ctx, function);
        assert_eq!(postdom.idom(entry), Some(join));
        assert_eq!(postdom.idom(left), Some(join));
        assert_eq!(postdom.idom(right), Some(join));
        assert!(postdom.dominates(join, entry));
        assert!(postdom.dominates(join, left));
        assert_eq!(postdom.idom(join), None);
    }
}
