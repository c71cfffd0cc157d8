//! Loop nest forest
//!
//! A natural loop is a back-edge target (the header) together with all
//! blocks that can reach the back-edge source (a latch) without passing
//! through the header. Nested loops form a forest ordered by block-set
//! containment.

use hashbrown::HashSet;
use lumen_ir::{Block, Context, DominanceInfo, Function};

/// One natural loop.
#[derive(Debug, Clone)]
pub struct Loop {
    pub header: Block,
    /// Sources of back edges into the header.
    pub latches: Vec<Block>,
    /// All blocks of the loop, header included.
    pub blocks: HashSet<Block>,
    /// `(from, to)` edges leaving the loop.
    pub exiting_edges: Vec<(Block, Block)>,
    /// Index of the enclosing loop in the forest, if any.
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// The loop nest forest of a function.
#[derive(Debug, Clone, Default)]
pub struct LoopNestForest {
    loops: Vec<Loop>,
    roots: Vec<usize>,
}

impl LoopNestForest {
    pub fn compute(ctx: &Context, function: Function, dom: &DominanceInfo) -> Self {
        let mut loops: Vec<Loop> = Vec::new();

        // Back edges: u -> h where h dominates u. Multiple latches of the
        // same header merge into one loop.
        for &block in dom.order() {
            for succ in block.successors(ctx) {
                if !dom.dominates(succ, block) {
                    continue;
                }
                let header = succ;
                let latch = block;
                match loops.iter_mut().find(|l| l.header == header) {
                    Some(existing) => {
                        existing.latches.push(latch);
                        collect_loop_blocks(ctx, header, latch, &mut existing.blocks);
                    }
                    None => {
                        let mut blocks = HashSet::new();
                        blocks.insert(header);
                        collect_loop_blocks(ctx, header, latch, &mut blocks);
                        loops.push(Loop {
                            header,
                            latches: vec![latch],
                            blocks,
                            exiting_edges: Vec::new(),
                            parent: None,
                            children: Vec::new(),
                        });
                    }
                }
            }
        }

        for l in &mut loops {
            for &block in &l.blocks {
                for succ in block.successors(ctx) {
                    if !l.blocks.contains(&succ) {
                        l.exiting_edges.push((block, succ));
                    }
                }
            }
        }

        // Nesting: the parent of a loop is the smallest strictly larger loop
        // containing its header.
        let mut order: Vec<usize> = (0..loops.len()).collect();
        order.sort_by_key(|&i| loops[i].blocks.len());
        for position in 0..order.len() {
            let inner = order[position];
            for &outer in &order[position + 1..] {
                if loops[outer].blocks.contains(&loops[inner].header)
                    && loops[outer].blocks.len() > loops[inner].blocks.len()
                {
                    loops[inner].parent = Some(outer);
                    loops[outer].children.push(inner);
                    break;
                }
            }
        }
        let roots = (0..loops.len()).filter(|&i| loops[i].parent.is_none()).collect();
        Self { loops, roots }
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    pub fn roots(&self) -> impl Iterator<Item = &Loop> {
        self.roots.iter().map(|&i| &self.loops[i])
    }

    /// The innermost loop containing `block`, if any.
    pub fn innermost_containing(&self, block: Block) -> Option<&Loop> {
        self.loops
            .iter()
            .filter(|l| l.blocks.contains(&block))
            .min_by_key(|l| l.blocks.len())
    }

    /// The loop headed by `header`, if any.
    pub fn loop_with_header(&self, header: Block) -> Option<&Loop> {
        self.loops.iter().find(|l| l.header == header)
    }
}

/// Walks predecessors from the latch, stopping at the header.
fn collect_loop_blocks(ctx: &Context, header: Block, latch: Block, blocks: &mut HashSet<Block>) {
    let mut worklist = vec![latch];
    while let Some(block) = worklist.pop() {
        if block == header || !blocks.insert(block) {
            continue;
        }
        for pred in block.predecessors(ctx) {
            worklist.push(pred);
        }
    }
}
