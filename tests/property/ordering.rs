// Test-specific lint overrides: property tests use unwrap freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::cast_possible_truncation,
    clippy::missing_panics_doc
)]

//! Property-based tests for dense board ordering.
//!
//! Uses proptest to verify:
//! 1. Any sequence of add/remove/move leaves every column and the column
//!    list numbered exactly `0..n`.
//! 2. Moving a task preserves the relative order of untouched siblings.
//! 3. Applying the same `task.moved` twice equals applying it once.
//! 4. Arbitrary drop targets resolve to a position that is in range.

use proptest::prelude::*;
use syncboard_proto::model::{Board, Column, ColumnId, Task, TaskId};
use syncboard_proto::order::{self, DropTarget};

const COLUMNS: [&str; 3] = ["A", "B", "C"];

/// A structural operation on a three-column board.
#[derive(Debug, Clone)]
enum Op {
    Add { column: usize, position: u32 },
    Remove { pick: usize },
    Move { pick: usize, to: usize, position: u32 },
    MoveColumn { column: usize, position: u32 },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 0..8u32).prop_map(|(column, position)| Op::Add { column, position }),
        any::<usize>().prop_map(|pick| Op::Remove { pick }),
        (any::<usize>(), 0..3usize, 0..8u32)
            .prop_map(|(pick, to, position)| Op::Move { pick, to, position }),
        (0..3usize, 0..5u32).prop_map(|(column, position)| Op::MoveColumn { column, position }),
    ]
}

fn empty_board() -> Board {
    let mut board = Board::new("b", "Board");
    for (i, id) in COLUMNS.iter().enumerate() {
        board
            .columns
            .push(Column::new(*id, "b", *id, order::to_position(i)));
    }
    board
}

/// Board with `counts[i]` tasks in column `i`.
fn board_with(counts: &[usize]) -> Board {
    let mut board = empty_board();
    let mut next = 0;
    for (column, count) in counts.iter().enumerate() {
        for i in 0..*count {
            let id = format!("t{next}");
            next += 1;
            board.columns[column]
                .tasks
                .push(Task::new(id.as_str(), COLUMNS[column], id.as_str(), i as u32));
        }
    }
    board
}

fn all_task_ids(board: &Board) -> Vec<TaskId> {
    board
        .columns
        .iter()
        .flat_map(|c| c.tasks.iter().map(|t| t.id.clone()))
        .collect()
}

fn apply(board: &mut Board, op: &Op, next_id: &mut usize) {
    match op {
        Op::Add { column, position } => {
            let id = format!("n{next_id}");
            *next_id += 1;
            board
                .insert_task(Task::new(id.as_str(), COLUMNS[*column], "new", *position))
                .unwrap();
        }
        Op::Remove { pick } => {
            let ids = all_task_ids(board);
            if !ids.is_empty() {
                board.remove_task(&ids[pick % ids.len()]).unwrap();
            }
        }
        Op::Move { pick, to, position } => {
            let ids = all_task_ids(board);
            if !ids.is_empty() {
                let id = &ids[pick % ids.len()];
                let from = board.task(id).unwrap().column_id.clone();
                board
                    .move_task(id, &from, &ColumnId::new(COLUMNS[*to]), *position)
                    .unwrap();
            }
        }
        Op::MoveColumn { column, position } => {
            board
                .move_column(&ColumnId::new(COLUMNS[*column]), *position)
                .unwrap();
        }
    }
}

proptest! {
    #[test]
    fn positions_stay_dense(ops in prop::collection::vec(arb_op(), 0..64)) {
        let mut board = empty_board();
        let mut next_id = 0;
        for op in &ops {
            apply(&mut board, op, &mut next_id);
            prop_assert!(board.is_dense(), "not dense after {:?}", op);
            for column in &board.columns {
                for task in &column.tasks {
                    prop_assert_eq!(&task.column_id, &column.id);
                }
            }
        }
    }

    #[test]
    fn move_preserves_sibling_order(
        counts in prop::collection::vec(1..6usize, 3),
        pick in any::<usize>(),
        to in 0..3usize,
        position in 0..8u32,
    ) {
        let mut board = board_with(&counts);
        let ids = all_task_ids(&board);
        let moved = ids[pick % ids.len()].clone();
        let from = board.task(&moved).unwrap().column_id.clone();
        let to = ColumnId::new(COLUMNS[to]);

        let others = |board: &Board, column: &ColumnId| -> Vec<TaskId> {
            board
                .column(column)
                .unwrap()
                .tasks
                .iter()
                .filter(|t| t.id != moved)
                .map(|t| t.id.clone())
                .collect()
        };
        let before_from = others(&board, &from);
        let before_to = others(&board, &to);

        board.move_task(&moved, &from, &to, position).unwrap();

        prop_assert_eq!(others(&board, &from), before_from);
        prop_assert_eq!(others(&board, &to), before_to);
        let landed = board.task(&moved).unwrap();
        prop_assert_eq!(&landed.column_id, &to);
        let len = board.column(&to).unwrap().tasks.len() as u32;
        prop_assert_eq!(landed.position, position.min(len - 1));
    }

    #[test]
    fn duplicate_move_delivery_is_idempotent(
        counts in prop::collection::vec(0..6usize, 3),
        pick in any::<usize>(),
        to in 0..3usize,
        position in 0..8u32,
    ) {
        let mut board = board_with(&counts);
        let ids = all_task_ids(&board);
        prop_assume!(!ids.is_empty());
        let moved = ids[pick % ids.len()].clone();
        let from = board.task(&moved).unwrap().column_id.clone();
        let to = ColumnId::new(COLUMNS[to]);

        board.move_task(&moved, &from, &to, position).unwrap();
        let once = board.clone();
        board.move_task(&moved, &from, &to, position).unwrap();
        prop_assert_eq!(board, once);
    }

    #[test]
    fn drop_resolution_in_range(count in 0..10usize, pick in any::<usize>(), on_sibling in any::<bool>()) {
        let board = board_with(&[count, 0, 0]);
        let tasks = &board.columns[0].tasks;
        let target_id = if count > 0 { tasks[pick % count].id.clone() } else { TaskId::new("none") };
        let target = if on_sibling { DropTarget::Sibling(&target_id) } else { DropTarget::Container };
        let position = order::resolve_drop_position(tasks, target);
        prop_assert!(position as usize <= count);
    }
}
