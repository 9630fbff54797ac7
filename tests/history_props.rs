//! Property tests for the unified undo/redo history.
//!
//! Invariants checked against a plain `Vec` model:
//! 1. `len() <= capacity` after every operation.
//! 2. `-1 <= pointer < len`, and `pointer == len - 1` right after a commit.
//! 3. Undo/redo restore exactly the surfaces recorded at the target entry.
//! 4. Committing after undo drops every redo entry.
//! 5. Undoing everything then redoing everything returns to the final state.

use image::{Rgba, RgbaImage};
use linefill::canvas::{BackgroundKind, LayerStack, SurfaceKind};
use linefill::components::history::{CommitOutcome, HistoryKind, HistoryManager};
use proptest::prelude::*;

const SIZE: u32 = 8;

#[derive(Debug, Clone)]
enum Op {
    Pencil { x: u32, y: u32, shade: u8 },
    Eraser { x: u32, y: u32 },
    Undo,
    Redo,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..SIZE, 0..SIZE, 1u8..=255).prop_map(|(x, y, shade)| Op::Pencil { x, y, shade }),
        1 => (0..SIZE, 0..SIZE).prop_map(|(x, y)| Op::Eraser { x, y }),
        2 => Just(Op::Undo),
        2 => Just(Op::Redo),
    ]
}

fn fresh_stack() -> LayerStack {
    let img = RgbaImage::from_pixel(SIZE, SIZE, Rgba([255, 255, 255, 255]));
    LayerStack::initialize(&img, BackgroundKind::LineArt, 50, 4096).unwrap()
}

type PaintState = (Vec<u8>, Vec<u8>);

fn paint_state(stack: &LayerStack) -> PaintState {
    (
        stack.surface(SurfaceKind::Interaction).as_raw().to_vec(),
        stack.surface(SurfaceKind::Fill).as_raw().to_vec(),
    )
}

/// Apply one mutating op to the stack and commit it.
fn paint_and_commit(op: &Op, stack: &mut LayerStack, history: &mut HistoryManager) -> CommitOutcome {
    match *op {
        Op::Pencil { x, y, shade } => {
            stack
                .surface_mut(SurfaceKind::Interaction)
                .put_pixel(x, y, [shade, 0, 0, 255]);
            history.commit(HistoryKind::Pencil, stack)
        }
        Op::Eraser { x, y } => {
            stack.surface_mut(SurfaceKind::Interaction).put_pixel(x, y, [0, 0, 0, 0]);
            stack.surface_mut(SurfaceKind::Fill).put_pixel(x, y, [0, 0, 0, 0]);
            stack.mark_fill_inexact();
            history.commit(HistoryKind::Eraser, stack)
        }
        Op::Undo | Op::Redo => unreachable!("not a painting op"),
    }
}

proptest! {
    #[test]
    fn history_matches_model(
        capacity in 2usize..10,
        ops in proptest::collection::vec(op_strategy(), 0..80),
    ) {
        let mut stack = fresh_stack();
        let mut history = HistoryManager::new(capacity);
        history.reset(&stack);

        let mut model: Vec<PaintState> = vec![paint_state(&stack)];
        let mut ptr = 0usize;

        for op in &ops {
            match op {
                Op::Pencil { .. } | Op::Eraser { .. } => {
                    let outcome = paint_and_commit(op, &mut stack, &mut history);
                    prop_assert_eq!(outcome, CommitOutcome::Recorded);
                    model.truncate(ptr + 1);
                    model.push(paint_state(&stack));
                    if model.len() > capacity {
                        model.remove(0);
                    }
                    ptr = model.len() - 1;
                    prop_assert_eq!(history.pointer(), history.len() as isize - 1);
                    prop_assert!(!history.can_redo());
                }
                Op::Undo => {
                    let undone = history.undo(&mut stack).unwrap();
                    if ptr > 0 {
                        prop_assert!(undone.is_some());
                        ptr -= 1;
                    } else {
                        prop_assert!(undone.is_none());
                    }
                }
                Op::Redo => {
                    let redone = history.redo(&mut stack).unwrap();
                    if ptr + 1 < model.len() {
                        prop_assert!(redone.is_some());
                        ptr += 1;
                    } else {
                        prop_assert!(redone.is_none());
                    }
                }
            }

            prop_assert!(history.len() <= capacity);
            prop_assert!(history.pointer() >= -1);
            prop_assert!(history.pointer() < history.len() as isize);
            prop_assert_eq!(history.len(), model.len());
            prop_assert_eq!(history.pointer(), ptr as isize);
            prop_assert_eq!(paint_state(&stack), model[ptr].clone());
        }
    }

    #[test]
    fn undo_all_then_redo_all_round_trips(
        ops in proptest::collection::vec(
            prop_oneof![
                (0..SIZE, 0..SIZE, 1u8..=255).prop_map(|(x, y, shade)| Op::Pencil { x, y, shade }),
                (0..SIZE, 0..SIZE).prop_map(|(x, y)| Op::Eraser { x, y }),
            ],
            1..30,
        ),
    ) {
        let mut stack = fresh_stack();
        let pristine = paint_state(&stack);
        let mut history = HistoryManager::new(50);
        history.reset(&stack);

        for op in &ops {
            paint_and_commit(op, &mut stack, &mut history);
        }
        let last = paint_state(&stack);

        let mut undos = 0;
        while history.undo(&mut stack).unwrap().is_some() {
            undos += 1;
        }
        prop_assert_eq!(undos, ops.len());
        prop_assert_eq!(paint_state(&stack), pristine);
        prop_assert_eq!(history.pointer(), 0);

        while history.redo(&mut stack).unwrap().is_some() {}
        prop_assert_eq!(paint_state(&stack), last);
        prop_assert_eq!(history.pointer(), history.len() as isize - 1);
    }
}
