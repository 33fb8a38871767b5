//! Hard-constraint resolution.
//!
//! Three passes run in a fixed order: dependency ordering, deadline
//! compliance, focus-session minimum. A later pass can undo an earlier one
//! (extending a focus block may push it past a dependent's start), so the
//! passes sweep until nothing changes. Each sweep is bounded and the number
//! of sweeps is capped, so resolution always terminates. Constraints that
//! cannot be met together are left as-is for anomaly detection.

use chrono::Duration;
use std::collections::HashMap;
use tracing::debug;

use super::{dependency_floor, task_index};
use crate::schedule::{sort_blocks, BlockKind, ConstraintKind, SchedulingConstraint, TimeBlock};
use crate::storage::ConstraintConfig;
use crate::task::Task;

/// Applies dependency, deadline and focus-minimum constraints to a block list.
#[derive(Debug, Clone)]
pub struct ConstraintSolver {
    min_focus_minutes: i64,
    dependency_gap: Duration,
}

impl Default for ConstraintSolver {
    fn default() -> Self {
        Self::new(&ConstraintConfig::default())
    }
}

impl ConstraintSolver {
    pub fn new(config: &ConstraintConfig) -> Self {
        Self {
            min_focus_minutes: config.min_focus_minutes.max(0),
            dependency_gap: Duration::minutes(config.dependency_gap_minutes.max(0)),
        }
    }

    pub fn dependency_gap(&self) -> Duration {
        self.dependency_gap
    }

    /// Resolve hard constraints. Deterministic and side-effect free.
    ///
    /// Protected blocks, blocks without a task and blocks of completed tasks
    /// are never moved. Running this on its own output changes nothing.
    pub fn resolve(
        &self,
        blocks: &[TimeBlock],
        tasks: &[Task],
        constraints: &[SchedulingConstraint],
    ) -> Vec<TimeBlock> {
        let index = task_index(tasks);
        let focus_cap = SchedulingConstraint::find(constraints, ConstraintKind::MaxFocusTime)
            .map(|minutes| minutes.round() as i64);

        let mut out = blocks.to_vec();
        let max_sweeps = out.len() + 2;
        for sweep in 1..=max_sweeps {
            let mut changed = self.order_dependencies(&mut out, &index);
            changed |= self.meet_deadlines(&mut out, &index);
            changed |= self.extend_focus(&mut out, &index, focus_cap);
            if !changed {
                debug!(sweeps = sweep, blocks = out.len(), "constraints resolved");
                break;
            }
            if sweep == max_sweeps {
                debug!(sweeps = sweep, "constraint sweeps exhausted");
            }
        }

        sort_blocks(&mut out);
        out
    }

    /// Shift blocks that start before their dependencies end (plus gap).
    fn order_dependencies(&self, blocks: &mut [TimeBlock], index: &HashMap<&str, &Task>) -> bool {
        let mut changed = false;
        for i in 0..blocks.len() {
            let Some(task) = movable_task(&blocks[i], index) else {
                continue;
            };
            let Some(floor) = dependency_floor(task, blocks, self.dependency_gap) else {
                continue;
            };
            if blocks[i].start < floor {
                debug!(task_id = %task.id, from = %blocks[i].start, to = %floor, "shifted after dependencies");
                blocks[i].shift_to(floor);
                changed = true;
            }
        }
        changed
    }

    /// Pull blocks that end after their deadline back so they end on it.
    ///
    /// Never moves a block before its dependency floor; overdue tasks are
    /// left where they are.
    fn meet_deadlines(&self, blocks: &mut [TimeBlock], index: &HashMap<&str, &Task>) -> bool {
        let mut changed = false;
        for i in 0..blocks.len() {
            let Some(task) = movable_task(&blocks[i], index) else {
                continue;
            };
            let Some(deadline) = task.deadline else {
                continue;
            };
            if task.overdue || blocks[i].end <= deadline {
                continue;
            }

            let mut start = deadline - blocks[i].duration();
            if let Some(floor) = dependency_floor(task, blocks, self.dependency_gap) {
                start = start.max(floor);
            }
            if start < blocks[i].start {
                debug!(task_id = %task.id, from = %blocks[i].start, to = %start, "shifted to meet deadline");
                blocks[i].shift_to(start);
                changed = true;
            }
        }
        changed
    }

    /// Extend short focus blocks to the minimum, moving only the end.
    fn extend_focus(
        &self,
        blocks: &mut [TimeBlock],
        index: &HashMap<&str, &Task>,
        focus_cap: Option<i64>,
    ) -> bool {
        let target = match focus_cap {
            Some(cap) => self.min_focus_minutes.min(cap.max(0)),
            None => self.min_focus_minutes,
        };

        let mut changed = false;
        for block in blocks.iter_mut() {
            let Some(task) = movable_task(block, index) else {
                continue;
            };
            let is_focus = block.kind == BlockKind::Focus || task.focus_protected;
            if is_focus && block.duration_minutes() < target {
                block.end = block.start + Duration::minutes(target);
                changed = true;
            }
        }
        changed
    }
}

fn movable_task<'a>(block: &TimeBlock, index: &HashMap<&str, &'a Task>) -> Option<&'a Task> {
    if block.is_protected {
        return None;
    }
    let task = index.get(block.task_id.as_deref()?).copied()?;
    (!task.completed).then_some(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn block(task: &Task, start: DateTime<Utc>, end: DateTime<Utc>) -> TimeBlock {
        TimeBlock::for_task(task, start, end, 0)
    }

    fn find<'a>(blocks: &'a [TimeBlock], task_id: &str) -> &'a TimeBlock {
        blocks
            .iter()
            .find(|b| b.task_id.as_deref() == Some(task_id))
            .unwrap()
    }

    #[test]
    fn dependent_moves_after_dependency() {
        let a = Task::new("A", 60).with_id("a");
        let b = Task::new("B", 30).with_id("b").with_dependencies(["a"]);
        let blocks = vec![block(&b, at(8, 0), at(8, 30)), block(&a, at(8, 35), at(9, 35))];
        let out = ConstraintSolver::default().resolve(&blocks, &[a, b], &[]);
        let moved = find(&out, "b");
        assert_eq!(moved.start, at(9, 40));
        assert_eq!(moved.duration_minutes(), 30);
    }

    #[test]
    fn block_shifts_back_to_deadline() {
        let task = Task::new("Report", 120).with_id("r").with_deadline(at(9, 0));
        let blocks = vec![block(&task, at(8, 0), at(10, 0))];
        let out = ConstraintSolver::default().resolve(&blocks, &[task], &[]);
        assert_eq!(out[0].start, at(7, 0));
        assert_eq!(out[0].end, at(9, 0));
    }

    #[test]
    fn deadline_shift_stops_at_dependency_floor() {
        let a = Task::new("A", 60).with_id("a");
        let b = Task::new("B", 60)
            .with_id("b")
            .with_dependencies(["a"])
            .with_deadline(at(9, 30));
        let blocks = vec![block(&a, at(8, 0), at(9, 0)), block(&b, at(9, 5), at(10, 5))];
        let out = ConstraintSolver::default().resolve(&blocks, &[a, b], &[]);
        assert_eq!(find(&out, "b").start, at(9, 5));
    }

    #[test]
    fn overdue_tasks_keep_their_slot() {
        let mut task = Task::new("Late", 60).with_id("l").with_deadline(at(7, 0));
        task.overdue = true;
        let blocks = vec![block(&task, at(8, 0), at(9, 0))];
        let out = ConstraintSolver::default().resolve(&blocks, &[task], &[]);
        assert_eq!(out[0].start, at(8, 0));
    }

    #[test]
    fn short_focus_block_is_extended() {
        let task = Task::new("Focus", 20).with_id("f").focus();
        let blocks = vec![block(&task, at(8, 0), at(8, 20))];
        let out = ConstraintSolver::default().resolve(&blocks, &[task], &[]);
        assert_eq!(out[0].start, at(8, 0));
        assert_eq!(out[0].end, at(8, 30));
    }

    #[test]
    fn focus_extension_respects_max_focus_time() {
        let task = Task::new("Focus", 20).with_id("f").focus();
        let blocks = vec![block(&task, at(8, 0), at(8, 20))];
        let cap = vec![SchedulingConstraint::new(ConstraintKind::MaxFocusTime, 25.0)];
        let out = ConstraintSolver::default().resolve(&blocks, &[task], &cap);
        assert_eq!(out[0].end, at(8, 25));
    }

    #[test]
    fn protected_and_completed_blocks_stay_put() {
        let mut done = Task::new("Done", 60).with_id("d").with_deadline(at(8, 0));
        done.completed = true;
        let meeting = TimeBlock::fixed("m", "Sync", at(9, 0), at(10, 0));
        let blocks = vec![block(&done, at(8, 0), at(9, 0)), meeting];
        let out = ConstraintSolver::default().resolve(&blocks, &[done], &[]);
        assert_eq!(out, blocks);
    }

    #[test]
    fn resolve_is_idempotent() {
        let a = Task::new("A", 20).with_id("a").focus();
        let b = Task::new("B", 60)
            .with_id("b")
            .with_dependencies(["a"])
            .with_deadline(at(9, 0));
        let c = Task::new("C", 45).with_id("c").with_dependencies(["b"]);
        let tasks = vec![a.clone(), b.clone(), c.clone()];
        let blocks = vec![
            block(&c, at(8, 0), at(8, 45)),
            block(&b, at(8, 50), at(9, 50)),
            block(&a, at(9, 55), at(10, 15)),
        ];
        let solver = ConstraintSolver::default();
        let once = solver.resolve(&blocks, &tasks, &[]);
        let twice = solver.resolve(&once, &tasks, &[]);
        assert_eq!(once, twice);
        assert!(find(&once, "b").start >= find(&once, "a").end + Duration::minutes(5));
        assert!(find(&once, "c").start >= find(&once, "b").end + Duration::minutes(5));
    }
}
