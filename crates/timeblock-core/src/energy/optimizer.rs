//! Energy-aware block alignment.
//!
//! Every work block is stamped with the energy level of the hour it starts
//! in. Unprotected blocks whose task prefers a different level are moved up
//! to a few hours away when a trusted pattern promises a better match.

use chrono::{DateTime, Duration, Timelike, Utc};
use std::collections::HashMap;
use tracing::debug;

use super::{EnergyModel, EnergyPattern};
use crate::schedule::{PlanWindow, TimeBlock};
use crate::scheduler::{dependency_floor, dependents_ceiling, is_free, task_index};
use crate::storage::EnergyConfig;
use crate::task::Task;

/// Moves unprotected blocks toward hours that fit their task's energy needs.
#[derive(Debug, Clone)]
pub struct EnergyOptimizer {
    match_threshold: f64,
    confidence_threshold: f64,
    search_radius_hours: i64,
    dependency_gap: Duration,
    window: PlanWindow,
}

impl EnergyOptimizer {
    pub fn new(config: &EnergyConfig, window: PlanWindow) -> Self {
        Self {
            match_threshold: config.match_threshold,
            confidence_threshold: config.confidence_threshold,
            search_radius_hours: config.search_radius_hours.max(0),
            dependency_gap: Duration::minutes(5),
            window,
        }
    }

    /// Override the relocation threshold (energy alignment constraint).
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.match_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_dependency_gap(mut self, gap: Duration) -> Self {
        self.dependency_gap = gap;
        self
    }

    /// How well `pattern`'s hour suits `task`.
    ///
    /// `None` when the task states no preference. Focus-protected tasks are
    /// discounted by the hour's focus success rate.
    pub fn energy_match(task: &Task, pattern: &EnergyPattern) -> Option<f64> {
        let preferred = task.preferred_energy?;
        let base = preferred.match_score(pattern.level);
        Some(if task.focus_protected {
            base * pattern.focus_success_rate.clamp(0.0, 1.0)
        } else {
            base
        })
    }

    /// Align blocks with the energy model.
    pub fn align(&self, blocks: &[TimeBlock], tasks: &[Task], model: &EnergyModel) -> Vec<TimeBlock> {
        let index = task_index(tasks);
        let mut out = blocks.to_vec();

        for i in 0..out.len() {
            if out[i].is_protected || !out[i].is_work() {
                continue;
            }
            let Some(task) = out[i].task_id.as_deref().and_then(|id| index.get(id).copied()) else {
                continue;
            };
            if task.completed {
                continue;
            }

            let pattern = model.pattern(out[i].start_hour());
            let Some(current) = Self::energy_match(task, pattern) else {
                continue;
            };
            if current >= self.match_threshold || pattern.confidence <= self.confidence_threshold {
                continue;
            }

            if let Some((start, score)) = self.best_nearby_slot(&out, i, task, &index, model, current) {
                debug!(
                    task_id = %task.id,
                    from = %out[i].start,
                    to = %start,
                    before = current,
                    after = score,
                    "relocated block for energy"
                );
                out[i].shift_to(start);
            }
        }

        for block in out.iter_mut().filter(|b| b.is_work()) {
            block.energy_level = Some(model.level_at(block.start_hour()));
        }
        out
    }

    /// Nearest strictly better slot within the search radius, best match first.
    fn best_nearby_slot(
        &self,
        blocks: &[TimeBlock],
        i: usize,
        task: &Task,
        tasks: &HashMap<&str, &Task>,
        model: &EnergyModel,
        current: f64,
    ) -> Option<(DateTime<Utc>, f64)> {
        let block = &blocks[i];
        let duration = block.duration();
        let buffer = Duration::minutes(block.break_buffer_minutes.max(0));
        let floor = dependency_floor(task, blocks, self.dependency_gap);
        let ceiling = dependents_ceiling(task, blocks, tasks, self.dependency_gap);
        let deadline = task.deadline.filter(|_| !task.overdue);

        let mut best: Option<(DateTime<Utc>, f64)> = None;
        for offset in 1..=self.search_radius_hours {
            for direction in [-1, 1] {
                let start = block.start + Duration::hours(offset * direction);
                let end = start + duration;

                let Some(score) = Self::energy_match(task, model.pattern(start.hour() as u8)) else {
                    continue;
                };
                if score <= current || best.is_some_and(|(_, s)| score <= s) {
                    continue;
                }
                if !self.window.contains(start, end)
                    || floor.is_some_and(|f| start < f)
                    || ceiling.is_some_and(|c| end > c)
                    || deadline.is_some_and(|d| end > d)
                    || !is_free(blocks, Some(i), start, end, buffer)
                {
                    continue;
                }
                best = Some((start, score));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::SessionOutcome;
    use crate::task::EnergyLevel;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn window() -> PlanWindow {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        PlanWindow::for_date(date, "08:00", "20:00").unwrap()
    }

    /// Seeded model with enough observations at every hour to be trusted.
    fn confident_model() -> EnergyModel {
        let mut patterns: Vec<EnergyPattern> = EnergyModel::new().patterns().to_vec();
        for p in &mut patterns {
            p.confidence = 0.9;
            p.sample_count = 20;
        }
        EnergyModel::from_patterns(patterns)
    }

    #[test]
    fn low_match_block_moves_to_better_hour() {
        // 13:00 is medium; 11:00 is the nearest peak hour
        let task = Task::new("Design", 60).with_id("t").with_energy(EnergyLevel::Peak);
        let blocks = vec![TimeBlock::for_task(&task, at(13, 0), at(14, 0), 5)];
        let optimizer = EnergyOptimizer::new(&EnergyConfig::default(), window());
        let out = optimizer.align(&blocks, &[task], &confident_model());
        assert_eq!(out[0].start.hour(), 11);
        assert_eq!(out[0].duration_minutes(), 60);
        assert_eq!(out[0].energy_level, Some(EnergyLevel::Peak));
    }

    #[test]
    fn untrusted_patterns_do_not_move_blocks() {
        let task = Task::new("Design", 60).with_id("t").with_energy(EnergyLevel::Peak);
        let blocks = vec![TimeBlock::for_task(&task, at(20, 0), at(21, 0), 5)];
        let optimizer = EnergyOptimizer::new(&EnergyConfig::default(), window());
        let out = optimizer.align(&blocks, &[task], &EnergyModel::new());
        assert_eq!(out[0].start, at(20, 0));
        assert_eq!(out[0].energy_level, Some(EnergyLevel::Low));
    }

    #[test]
    fn protected_blocks_are_never_moved() {
        let task = Task::new("Design", 60).with_id("t").with_energy(EnergyLevel::Peak);
        let mut block = TimeBlock::for_task(&task, at(13, 0), at(14, 0), 0);
        block.is_protected = true;
        let optimizer = EnergyOptimizer::new(&EnergyConfig::default(), window());
        let out = optimizer.align(&[block.clone()], &[task], &confident_model());
        assert_eq!(out[0].start, block.start);
    }

    #[test]
    fn relocation_avoids_occupied_slots() {
        let task = Task::new("Design", 60).with_id("t").with_energy(EnergyLevel::Peak);
        let blocks = vec![
            TimeBlock::fixed("m1", "Planning", at(10, 0), at(12, 0)),
            TimeBlock::for_task(&task, at(13, 0), at(14, 0), 5),
        ];
        let optimizer = EnergyOptimizer::new(&EnergyConfig::default(), window());
        let out = optimizer.align(&blocks, &[task], &confident_model());
        // 11:00 and 10:00 collide with the meeting; nothing else in range is peak
        let moved = &out[1];
        assert_ne!(moved.start.hour(), 10);
        assert_ne!(moved.start.hour(), 11);
    }

    #[test]
    fn relocation_respects_deadline() {
        let task = Task::new("Design", 60)
            .with_id("t")
            .with_energy(EnergyLevel::Low)
            .with_deadline(at(15, 0));
        // 11:00 is peak; medium at 12:00 is the best reachable match
        let blocks = vec![TimeBlock::for_task(&task, at(11, 0), at(12, 0), 0)];
        let optimizer = EnergyOptimizer::new(&EnergyConfig::default(), window());
        let out = optimizer.align(&blocks, &[task], &confident_model());
        assert_eq!(out[0].start, at(12, 0));
        assert!(out[0].end <= at(15, 0));
    }

    #[test]
    fn relocation_keeps_dependencies_before_dependents() {
        // 11:00 is the nearest free peak hour, but it lies past the dependent review
        let design = Task::new("Design", 60).with_id("d").with_energy(EnergyLevel::Peak);
        let review = Task::new("Review", 60).with_id("r").with_dependencies(["d"]);
        let blocks = vec![
            TimeBlock::for_task(&design, at(8, 0), at(9, 0), 5),
            TimeBlock::for_task(&review, at(9, 5), at(10, 5), 5),
        ];
        let optimizer = EnergyOptimizer::new(&EnergyConfig::default(), window());
        let out = optimizer.align(&blocks, &[design, review], &confident_model());

        let design_block = &out[0];
        let review_block = &out[1];
        assert!(design_block.end + Duration::minutes(5) <= review_block.start);
        assert_eq!(design_block.start, at(8, 0));
    }

    #[test]
    fn focus_match_is_discounted_by_success_rate() {
        let mut model = EnergyModel::new();
        for _ in 0..4 {
            model.record_session(SessionOutcome {
                hour: 10,
                expected_minutes: 25,
                actual_minutes: 25,
                completed: true,
                focus_success: false,
            });
        }
        let task = Task::new("Deep", 60).with_energy(EnergyLevel::Peak).focus();
        let pattern = model.pattern(10);
        let score = EnergyOptimizer::energy_match(&task, pattern).unwrap();
        assert!(score < 0.01);
    }

    #[test]
    fn threshold_override_disables_relocation() {
        let task = Task::new("Design", 60).with_id("t").with_energy(EnergyLevel::Peak);
        let blocks = vec![TimeBlock::for_task(&task, at(13, 0), at(14, 0), 5)];
        let optimizer = EnergyOptimizer::new(&EnergyConfig::default(), window()).with_threshold(0.0);
        let out = optimizer.align(&blocks, &[task], &confident_model());
        assert_eq!(out[0].start, at(13, 0));
    }
}
