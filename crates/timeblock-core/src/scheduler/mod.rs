//! Initial placement and hard-constraint resolution.
//!
//! - [`Placer`] packs tasks greedily into the working window around fixed blocks
//! - [`ConstraintSolver`] enforces dependency order, deadlines and the focus minimum
//!
//! The free functions below are shared with the later optimization passes
//! so every pass agrees on what "free" and "after its dependencies" mean.

mod placer;
mod solver;

pub use placer::Placer;
pub use solver::ConstraintSolver;

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::schedule::TimeBlock;
use crate::task::Task;

/// Index tasks by id.
pub(crate) fn task_index(tasks: &[Task]) -> HashMap<&str, &Task> {
    tasks.iter().map(|t| (t.id.as_str(), t)).collect()
}

/// Earliest start allowed for `task`: latest dependency end plus `gap`.
///
/// Dependencies without a block (completed earlier, unknown ids) impose
/// nothing, and neither does a task listing itself.
pub(crate) fn dependency_floor(task: &Task, blocks: &[TimeBlock], gap: Duration) -> Option<DateTime<Utc>> {
    if task.dependencies.is_empty() {
        return None;
    }
    blocks
        .iter()
        .filter(|b| {
            b.task_id.as_deref().is_some_and(|id| {
                id != task.id && task.dependencies.iter().any(|d| d == id)
            })
        })
        .map(|b| b.end)
        .max()
        .map(|end| end + gap)
}

/// Latest end allowed for `task`: earliest start among blocks of tasks that
/// depend on it, less `gap`.
pub(crate) fn dependents_ceiling(
    task: &Task,
    blocks: &[TimeBlock],
    tasks: &HashMap<&str, &Task>,
    gap: Duration,
) -> Option<DateTime<Utc>> {
    blocks
        .iter()
        .filter(|b| {
            b.task_id
                .as_deref()
                .and_then(|id| tasks.get(id))
                .is_some_and(|t| t.id != task.id && t.dependencies.iter().any(|d| *d == task.id))
        })
        .map(|b| b.start - gap)
        .min()
}

/// Whether `[start, end + buffer)` is clear of every block except `skip`.
///
/// Other blocks occupy their own break buffer as well.
pub(crate) fn is_free(
    blocks: &[TimeBlock],
    skip: Option<usize>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    buffer: Duration,
) -> bool {
    let occupied_end = end + buffer;
    blocks
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != skip)
        .all(|(_, b)| !(b.start < occupied_end && b.occupied_until() > start))
}
