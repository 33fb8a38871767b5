//! Greedy initial placement.
//!
//! Tasks are sorted by priority, deadline and focus protection, then packed
//! one after another from the window start. Fixed blocks are treated as
//! immovable obstacles. The result is a starting point for later passes,
//! which may retime any unprotected block.

use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use tracing::debug;

use crate::schedule::{sort_blocks, TimeBlock};
use crate::storage::PlacementConfig;
use crate::task::Task;

/// Initial block generator.
#[derive(Debug, Clone)]
pub struct Placer {
    break_buffer_minutes: i64,
    focus_break_minutes: i64,
    max_iterations: u32,
}

impl Default for Placer {
    fn default() -> Self {
        Self::new(&PlacementConfig::default())
    }
}

impl Placer {
    pub fn new(config: &PlacementConfig) -> Self {
        Self {
            break_buffer_minutes: config.break_buffer_minutes.max(0),
            focus_break_minutes: config.focus_break_minutes.max(0),
            max_iterations: config.slot_search_max_iterations.max(1),
        }
    }

    /// Enforce a minimum break length on both the buffer and the focus break.
    pub fn with_min_break(mut self, minutes: i64) -> Self {
        let minutes = minutes.max(0);
        self.break_buffer_minutes = self.break_buffer_minutes.max(minutes);
        self.focus_break_minutes = self.focus_break_minutes.max(minutes);
        self
    }

    pub fn break_buffer_minutes(&self) -> i64 {
        self.break_buffer_minutes
    }

    /// Placement order: priority desc, deadline asc (none last), focus first.
    ///
    /// The sort is stable, so ties keep the caller's order.
    pub fn sort_tasks(tasks: &[Task]) -> Vec<&Task> {
        let mut sorted: Vec<&Task> = tasks.iter().collect();
        sorted.sort_by(|a, b| {
            b.current_priority()
                .cmp(&a.current_priority())
                .then_with(|| match (a.deadline, b.deadline) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                })
                .then_with(|| b.focus_protected.cmp(&a.focus_protected))
        });
        sorted
    }

    /// Pack `tasks` into the window around `fixed_blocks`.
    ///
    /// Completed tasks and tasks without a positive estimate are skipped. A
    /// task longer than what remains of the window is still placed and may
    /// end after `window_end`.
    pub fn place_initial(
        &self,
        tasks: &[Task],
        fixed_blocks: &[TimeBlock],
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Vec<TimeBlock> {
        let mut blocks: Vec<TimeBlock> = fixed_blocks.to_vec();
        let buffer = Duration::minutes(self.break_buffer_minutes);
        let mut cursor = window_start;

        for task in Self::sort_tasks(tasks) {
            if task.completed || task.estimated_minutes <= 0 {
                continue;
            }

            let duration = task.estimated_duration();
            let start = self.find_slot(&blocks, cursor, duration, buffer);
            let end = start + duration;
            debug!(task_id = %task.id, %start, %end, "placed task");

            blocks.push(TimeBlock::for_task(task, start, end, self.break_buffer_minutes));
            cursor = end + buffer;

            if task.focus_protected && end < window_end && self.focus_break_minutes > 0 {
                let next_start = blocks.iter().filter(|b| b.start >= end).map(|b| b.start).min();
                let mut break_end = (end + Duration::minutes(self.focus_break_minutes)).min(window_end);
                if let Some(next) = next_start {
                    break_end = break_end.min(next);
                }
                if break_end > end {
                    blocks.push(TimeBlock::break_block(end, break_end));
                    cursor = cursor.max(break_end);
                }
            }
        }

        sort_blocks(&mut blocks);
        blocks
    }

    /// Earliest start at or after `from` where `duration` plus `buffer` fits.
    ///
    /// On a conflict the candidate jumps to the end (plus buffer) of the
    /// latest conflicting block; when no boundary lies ahead it steps by one
    /// minute. The number of steps is capped, after which the last candidate
    /// is returned as-is and any overlap is left for anomaly detection.
    pub fn find_slot(
        &self,
        occupied: &[TimeBlock],
        from: DateTime<Utc>,
        duration: Duration,
        buffer: Duration,
    ) -> DateTime<Utc> {
        let mut candidate = from;
        for _ in 0..self.max_iterations {
            let occupied_end = candidate + duration + buffer;
            let boundary = occupied
                .iter()
                .filter(|b| b.start < occupied_end && b.occupied_until() > candidate)
                .map(|b| b.occupied_until())
                .max();

            match boundary {
                None => return candidate,
                Some(next) if next > candidate => candidate = next,
                Some(_) => candidate += Duration::minutes(1),
            }
        }
        candidate
    }
}
