//! Dominance, loop forest and scalar evolution tests

use lumen_analysis::{FunctionAnalyses, Scev};
use lumen_ir::{parse_module, Context, Function};
use pretty_assertions::assert_eq;

const LOOP_FN: &str = r#"
func i64 @count(i64 %n) {
%entry:
  goto label %header
%header:
  %i = phi i64 [label %entry, 0], [label %body, %next]
  %c = scmp ls i64 %i, i64 %n
  branch i1 %c, label %body, label %exit
%body:
  %next = add i64 %i, i64 1
  goto label %header
%exit:
  return i64 %i
}
"#;

fn parse_one(ctx: &mut Context, source: &str) -> Function {
    let module = parse_module(ctx, "test", source).expect("parses");
    module.functions()[0]
}

fn block_named(ctx: &Context, function: Function, name: &str) -> lumen_ir::Block {
    function
        .blocks(ctx)
        .into_iter()
        .find(|b| b.name(ctx) == name)
        .expect("block exists")
}

#[test]
fn dominators_follow_the_cfg() {
    let mut ctx = Context::new();
    let function = parse_one(&mut ctx, LOOP_FN);
    let mut analyses = FunctionAnalyses::new();
    let dom = analyses.dominance(&ctx, function);

    let entry = block_named(&ctx, function, "entry");
    let header = block_named(&ctx, function, "header");
    let body = block_named(&ctx, function, "body");
    let exit = block_named(&ctx, function, "exit");

    assert_eq!(dom.idom(entry), None);
    assert_eq!(dom.idom(header), Some(entry));
    assert_eq!(dom.idom(body), Some(header));
    assert_eq!(dom.idom(exit), Some(header));
    assert!(dom.dominates(header, exit));
    assert!(!dom.dominates(body, exit));

    // The loop header is its own dominance frontier through the back edge.
    assert!(dom.frontier(body).contains(&header));
}

#[test]
fn post_dominators_run_on_the_reverse_cfg() {
    let mut ctx = Context::new();
    let function = parse_one(&mut ctx, LOOP_FN);
    let mut analyses = FunctionAnalyses::new();
    let postdom = analyses.post_dominance(&ctx, function);

    let entry = block_named(&ctx, function, "entry");
    let header = block_named(&ctx, function, "header");
    let exit = block_named(&ctx, function, "exit");

    assert!(postdom.dominates(exit, entry), "exit post-dominates entry");
    assert!(postdom.dominates(header, entry));
    assert_eq!(postdom.idom(exit), None, "exit answers to the virtual exit");
}

#[test]
fn loop_forest_identifies_the_natural_loop() {
    let mut ctx = Context::new();
    let function = parse_one(&mut ctx, LOOP_FN);
    let mut analyses = FunctionAnalyses::new();
    let forest = analyses.loop_forest(&ctx, function);

    let header = block_named(&ctx, function, "header");
    let body = block_named(&ctx, function, "body");
    let exit = block_named(&ctx, function, "exit");

    assert_eq!(forest.loops().len(), 1);
    let l = forest.loop_with_header(header).expect("loop found");
    assert_eq!(l.latches, vec![body]);
    assert!(l.blocks.contains(&body));
    assert!(!l.blocks.contains(&exit));
    assert!(l.exiting_edges.contains(&(header, exit)));
}

#[test]
fn nested_loops_form_a_forest() {
    let mut ctx = Context::new();
    let source = r#"
func i64 @nest(i64 %n) {
%entry:
  goto label %outer
%outer:
  %i = phi i64 [label %entry, 0], [label %outer.latch, %i.next]
  %oc = scmp ls i64 %i, i64 %n
  branch i1 %oc, label %inner, label %exit
%inner:
  %j = phi i64 [label %outer, 0], [label %inner, %j.next]
  %j.next = add i64 %j, i64 1
  %ic = scmp ls i64 %j.next, i64 %n
  branch i1 %ic, label %inner, label %outer.latch
%outer.latch:
  %i.next = add i64 %i, i64 1
  goto label %outer
%exit:
  return i64 %i
}
"#;
    let function = parse_one(&mut ctx, source);
    let mut analyses = FunctionAnalyses::new();
    let forest = analyses.loop_forest(&ctx, function);

    let outer = block_named(&ctx, function, "outer");
    let inner = block_named(&ctx, function, "inner");
    assert_eq!(forest.loops().len(), 2);
    let inner_loop = forest.loop_with_header(inner).expect("inner loop");
    let outer_loop = forest.loop_with_header(outer).expect("outer loop");
    assert!(outer_loop.blocks.contains(&inner));
    assert_eq!(forest.innermost_containing(inner).expect("innermost").header, inner);
    assert!(inner_loop.parent.is_some(), "inner loop nests inside the outer");
}

#[test]
fn scalar_evolution_classifies_the_counter() {
    let mut ctx = Context::new();
    let function = parse_one(&mut ctx, LOOP_FN);
    let mut analyses = FunctionAnalyses::new();
    let scev = analyses.scalar_evolution(&ctx, function);

    let header = block_named(&ctx, function, "header");
    let phi = header.phis(&ctx)[0];
    match scev.of(phi) {
        Some(Scev::AddRec { base, step, header: h }) => {
            assert_eq!(*h, header);
            assert_eq!(base.as_constant().map(|c| c.as_i64()), Some(0));
            assert_eq!(step.as_constant().map(|c| c.as_i64()), Some(1));
        }
        other => panic!("expected an add recurrence, got {other:?}"),
    }
}

#[test]
fn analyses_recompute_after_mutation() {
    let mut ctx = Context::new();
    let function = parse_one(&mut ctx, LOOP_FN);
    let mut analyses = FunctionAnalyses::new();
    let before = analyses.dominance(&ctx, function);
    // Any mutation bumps the version; the next getter recomputes.
    function.bump_version(&mut ctx);
    let after = analyses.dominance(&ctx, function);
    assert!(!std::rc::Rc::ptr_eq(&before, &after), "cache invalidated by mutation");
    let again = analyses.dominance(&ctx, function);
    assert!(std::rc::Rc::ptr_eq(&after, &again), "stable while unchanged");
}
