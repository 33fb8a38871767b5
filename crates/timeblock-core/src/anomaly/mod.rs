//! Post-placement anomaly detection and repair.
//!
//! [`AnomalyDetector`] is read-only: it inspects a block list and reports
//! what is wrong, each with a suggested correction. [`RepairLoop`] applies
//! those suggestions through a fixed handler table, one correction per
//! anomaly per pass, and re-detects until the plan is clean, nothing more
//! can be fixed, or the pass cap is reached.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::energy::EnergyModel;
use crate::schedule::{BlockKind, PlanWindow, TimeBlock};
use crate::scheduler::{dependency_floor, dependents_ceiling, is_free, task_index, Placer};
use crate::task::Task;

/// Observed/estimated ratio above which a block is flagged.
const OVERESTIMATION_RATIO: f64 = 1.5;
/// Observed/estimated ratio below which a block is flagged.
const UNDERESTIMATION_RATIO: f64 = 0.7;
/// Duration suggested for an overestimated block, as a multiple of the estimate.
const OVERESTIMATION_FACTOR: f64 = 1.2;
/// Duration suggested for an underestimated block, as a multiple of the estimate.
const UNDERESTIMATION_FACTOR: f64 = 1.3;
/// Tasks wanting at least this energy ordinal are checked for mismatches.
const DEMANDING_ENERGY: u8 = 3;
/// Hours at or below this ordinal are too low for demanding tasks.
const EXHAUSTED_ENERGY: u8 = 1;

/// A detected inconsistency, with its suggested correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// Observed duration far above the estimate
    Overestimation {
        block_id: String,
        task_id: String,
        ratio: f64,
        suggested_minutes: i64,
    },
    /// Observed duration far below the estimate
    Underestimation {
        block_id: String,
        task_id: String,
        ratio: f64,
        suggested_minutes: i64,
    },
    /// Demanding task sitting in a low-energy hour
    EnergyMismatch {
        block_id: String,
        task_id: String,
        hour: u8,
        suggested_hour: Option<u8>,
    },
    /// Block starts before its dependencies are done
    DependencyConflict {
        block_id: String,
        task_id: String,
        dependency_id: String,
        suggested_start: DateTime<Utc>,
    },
    /// Two blocks share time; `block_id` is the one to move
    Overlap {
        block_id: String,
        other_block_id: String,
    },
    /// Block still ends after its task's deadline
    DeadlineMissed {
        block_id: String,
        task_id: String,
        deadline: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Work block reaching outside the working window
    OutsideWindow { block_id: String, task_id: String },
}

/// Discriminant of [`Anomaly`], used to key the repair table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Overestimation,
    Underestimation,
    EnergyMismatch,
    DependencyConflict,
    Overlap,
    DeadlineMissed,
    OutsideWindow,
}

impl Anomaly {
    pub fn kind(&self) -> AnomalyKind {
        match self {
            Anomaly::Overestimation { .. } => AnomalyKind::Overestimation,
            Anomaly::Underestimation { .. } => AnomalyKind::Underestimation,
            Anomaly::EnergyMismatch { .. } => AnomalyKind::EnergyMismatch,
            Anomaly::DependencyConflict { .. } => AnomalyKind::DependencyConflict,
            Anomaly::Overlap { .. } => AnomalyKind::Overlap,
            Anomaly::DeadlineMissed { .. } => AnomalyKind::DeadlineMissed,
            Anomaly::OutsideWindow { .. } => AnomalyKind::OutsideWindow,
        }
    }

    /// Block the anomaly is about.
    pub fn block_id(&self) -> &str {
        match self {
            Anomaly::Overestimation { block_id, .. }
            | Anomaly::Underestimation { block_id, .. }
            | Anomaly::EnergyMismatch { block_id, .. }
            | Anomaly::DependencyConflict { block_id, .. }
            | Anomaly::Overlap { block_id, .. }
            | Anomaly::DeadlineMissed { block_id, .. }
            | Anomaly::OutsideWindow { block_id, .. } => block_id,
        }
    }

    /// Whether `other` reports the same problem on the same blocks.
    fn same_issue(&self, other: &Anomaly) -> bool {
        if self.kind() != other.kind() || self.block_id() != other.block_id() {
            return false;
        }
        match (self, other) {
            (Anomaly::Overlap { other_block_id: a, .. }, Anomaly::Overlap { other_block_id: b, .. }) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::Overestimation { task_id, ratio, suggested_minutes, .. } => write!(
                f,
                "{task_id}: runs {ratio:.2}x its estimate, suggest {suggested_minutes} min"
            ),
            Anomaly::Underestimation { task_id, ratio, suggested_minutes, .. } => write!(
                f,
                "{task_id}: runs {ratio:.2}x its estimate, suggest {suggested_minutes} min"
            ),
            Anomaly::EnergyMismatch { task_id, hour, suggested_hour, .. } => match suggested_hour {
                Some(h) => write!(f, "{task_id}: low energy at {hour:02}:00, suggest {h:02}:00"),
                None => write!(f, "{task_id}: low energy at {hour:02}:00, no better hour today"),
            },
            Anomaly::DependencyConflict { task_id, dependency_id, suggested_start, .. } => write!(
                f,
                "{task_id}: starts before {dependency_id} ends, suggest {}",
                suggested_start.format("%H:%M")
            ),
            Anomaly::Overlap { block_id, other_block_id } => {
                write!(f, "{block_id} overlaps {other_block_id}")
            }
            Anomaly::DeadlineMissed { task_id, deadline, end, .. } => write!(
                f,
                "{task_id}: ends {} after deadline {}",
                end.format("%H:%M"),
                deadline.format("%Y-%m-%d %H:%M")
            ),
            Anomaly::OutsideWindow { task_id, .. } => {
                write!(f, "{task_id}: outside the working window")
            }
        }
    }
}

/// Read-only anomaly detection.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    window: PlanWindow,
    dependency_gap: Duration,
    min_focus_minutes: i64,
}

impl AnomalyDetector {
    pub fn new(window: PlanWindow) -> Self {
        Self {
            window,
            dependency_gap: Duration::minutes(5),
            min_focus_minutes: 30,
        }
    }

    pub fn with_dependency_gap(mut self, gap: Duration) -> Self {
        self.dependency_gap = gap;
        self
    }

    /// Focus blocks are expected to last at least this long.
    pub fn with_min_focus_minutes(mut self, minutes: i64) -> Self {
        self.min_focus_minutes = minutes.max(0);
        self
    }

    /// Detect anomalies. Blocks of completed tasks are not inspected.
    pub fn detect(&self, blocks: &[TimeBlock], tasks: &[Task], model: &EnergyModel) -> Vec<Anomaly> {
        let index = task_index(tasks);
        let mut anomalies = Vec::new();

        for block in blocks {
            let Some(task) = block.task_id.as_deref().and_then(|id| index.get(id).copied()) else {
                continue;
            };
            if task.completed {
                continue;
            }
            self.check_duration(block, task, &mut anomalies);
            self.check_energy(block, task, model, &mut anomalies);
            self.check_dependencies(block, task, blocks, &mut anomalies);

            if let Some(deadline) = task.deadline {
                if block.end > deadline {
                    anomalies.push(Anomaly::DeadlineMissed {
                        block_id: block.id.clone(),
                        task_id: task.id.clone(),
                        deadline,
                        end: block.end,
                    });
                }
            }
            if block.is_work() && !self.window.contains(block.start, block.end) {
                anomalies.push(Anomaly::OutsideWindow {
                    block_id: block.id.clone(),
                    task_id: task.id.clone(),
                });
            }
        }

        self.check_overlaps(blocks, &mut anomalies);
        anomalies
    }

    fn check_duration(&self, block: &TimeBlock, task: &Task, out: &mut Vec<Anomaly>) {
        if task.estimated_minutes <= 0 {
            return;
        }
        // Without actuals the block itself is the observation, and a focus
        // block is allowed its minimum length.
        let (observed, estimate) = match task.actual_duration() {
            Some(actual) => (actual.num_minutes(), task.estimated_minutes),
            None if task.focus_protected => (
                block.duration_minutes(),
                task.estimated_minutes.max(self.min_focus_minutes),
            ),
            None => (block.duration_minutes(), task.estimated_minutes),
        };
        let estimate = estimate as f64;
        let ratio = observed as f64 / estimate;

        if ratio > OVERESTIMATION_RATIO {
            out.push(Anomaly::Overestimation {
                block_id: block.id.clone(),
                task_id: task.id.clone(),
                ratio,
                suggested_minutes: (estimate * OVERESTIMATION_FACTOR).round() as i64,
            });
        } else if ratio < UNDERESTIMATION_RATIO {
            out.push(Anomaly::Underestimation {
                block_id: block.id.clone(),
                task_id: task.id.clone(),
                ratio,
                suggested_minutes: (estimate * UNDERESTIMATION_FACTOR).round() as i64,
            });
        }
    }

    fn check_energy(&self, block: &TimeBlock, task: &Task, model: &EnergyModel, out: &mut Vec<Anomaly>) {
        let Some(preferred) = task.preferred_energy else {
            return;
        };
        let hour = block.start_hour();
        if preferred.ordinal() < DEMANDING_ENERGY || model.level_at(hour).ordinal() > EXHAUSTED_ENERGY {
            return;
        }
        let suggested_hour = (hour + 1..24).find(|h| model.level_at(*h).ordinal() >= DEMANDING_ENERGY);
        out.push(Anomaly::EnergyMismatch {
            block_id: block.id.clone(),
            task_id: task.id.clone(),
            hour,
            suggested_hour,
        });
    }

    fn check_dependencies(&self, block: &TimeBlock, task: &Task, blocks: &[TimeBlock], out: &mut Vec<Anomaly>) {
        let latest = blocks
            .iter()
            .filter(|b| {
                b.task_id
                    .as_deref()
                    .is_some_and(|id| id != task.id && task.dependencies.iter().any(|d| d == id))
            })
            .max_by_key(|b| b.end);
        let Some(dependency) = latest else {
            return;
        };
        let suggested_start = dependency.end + self.dependency_gap;
        if block.start < suggested_start {
            out.push(Anomaly::DependencyConflict {
                block_id: block.id.clone(),
                task_id: task.id.clone(),
                dependency_id: dependency.task_id.clone().unwrap_or_default(),
                suggested_start,
            });
        }
    }

    /// Breaks are soft filler and never count as overlapping.
    fn check_overlaps(&self, blocks: &[TimeBlock], out: &mut Vec<Anomaly>) {
        let mut ordered: Vec<&TimeBlock> = blocks.iter().filter(|b| b.kind != BlockKind::Break).collect();
        ordered.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));

        for (i, first) in ordered.iter().enumerate() {
            for second in ordered.iter().skip(i + 1) {
                if second.start >= first.end {
                    break;
                }
                let (mover, other) = if !second.is_protected {
                    (second, first)
                } else if !first.is_protected {
                    (first, second)
                } else {
                    continue;
                };
                out.push(Anomaly::Overlap {
                    block_id: mover.id.clone(),
                    other_block_id: other.id.clone(),
                });
            }
        }
    }
}

/// Everything a repair handler needs besides the blocks themselves.
struct RepairContext<'a> {
    tasks: HashMap<&'a str, &'a Task>,
    model: &'a EnergyModel,
    placer: &'a Placer,
    window: PlanWindow,
    dependency_gap: Duration,
}

type Handler = fn(&RepairContext<'_>, &Anomaly, &mut [TimeBlock]) -> bool;

/// Anomaly kind -> correction. Flag-only kinds have no handler.
const HANDLERS: [(AnomalyKind, Option<Handler>); 7] = [
    (AnomalyKind::Overestimation, Some(resize_block)),
    (AnomalyKind::Underestimation, Some(resize_block)),
    (AnomalyKind::EnergyMismatch, Some(move_to_energy_hour)),
    (AnomalyKind::DependencyConflict, Some(shift_after_dependency)),
    (AnomalyKind::Overlap, Some(relocate_overlap)),
    (AnomalyKind::DeadlineMissed, None),
    (AnomalyKind::OutsideWindow, None),
];

fn handler_for(kind: AnomalyKind) -> Option<Handler> {
    HANDLERS.iter().find(|(k, _)| *k == kind).and_then(|(_, h)| *h)
}

/// Index of a block the repair loop may change, if any.
fn movable_index(ctx: &RepairContext<'_>, blocks: &[TimeBlock], block_id: &str) -> Option<usize> {
    let i = blocks.iter().position(|b| b.id == block_id)?;
    let block = &blocks[i];
    if block.is_protected {
        return None;
    }
    if let Some(task_id) = block.task_id.as_deref() {
        if ctx.tasks.get(task_id).is_some_and(|t| t.completed) {
            return None;
        }
    }
    Some(i)
}

fn resize_block(ctx: &RepairContext<'_>, anomaly: &Anomaly, blocks: &mut [TimeBlock]) -> bool {
    let (Anomaly::Overestimation { block_id, suggested_minutes, .. }
    | Anomaly::Underestimation { block_id, suggested_minutes, .. }) = anomaly
    else {
        return false;
    };
    let Some(i) = movable_index(ctx, blocks, block_id) else {
        return false;
    };
    let end = blocks[i].start + Duration::minutes(*suggested_minutes);
    if *suggested_minutes <= 0 || blocks[i].end == end {
        return false;
    }
    blocks[i].end = end;
    true
}

fn move_to_energy_hour(ctx: &RepairContext<'_>, anomaly: &Anomaly, blocks: &mut [TimeBlock]) -> bool {
    let Anomaly::EnergyMismatch {
        block_id,
        suggested_hour: Some(first_hour),
        ..
    } = anomaly
    else {
        return false;
    };
    let Some(i) = movable_index(ctx, blocks, block_id) else {
        return false;
    };
    let block = &blocks[i];
    let duration = block.duration();
    let buffer = Duration::minutes(block.break_buffer_minutes.max(0));
    let date = block.start.date_naive();
    let task = block.task_id.as_deref().and_then(|id| ctx.tasks.get(id)).copied();
    let floor = task.and_then(|t| dependency_floor(t, blocks, ctx.dependency_gap));
    let ceiling = task.and_then(|t| dependents_ceiling(t, blocks, &ctx.tasks, ctx.dependency_gap));

    for hour in *first_hour..24 {
        if ctx.model.level_at(hour).ordinal() < DEMANDING_ENERGY {
            continue;
        }
        let Some(time) = NaiveTime::from_hms_opt(hour as u32, 0, 0) else {
            continue;
        };
        let start = Utc.from_utc_datetime(&date.and_time(time));
        let end = start + duration;
        if ctx.window.contains(start, end)
            && floor.map_or(true, |f| start >= f)
            && ceiling.map_or(true, |c| end <= c)
            && is_free(blocks, Some(i), start, end, buffer)
        {
            blocks[i].shift_to(start);
            return true;
        }
    }
    false
}

fn shift_after_dependency(ctx: &RepairContext<'_>, anomaly: &Anomaly, blocks: &mut [TimeBlock]) -> bool {
    let Anomaly::DependencyConflict {
        block_id,
        suggested_start,
        ..
    } = anomaly
    else {
        return false;
    };
    let Some(i) = movable_index(ctx, blocks, block_id) else {
        return false;
    };
    if blocks[i].start >= *suggested_start {
        return false;
    }
    blocks[i].shift_to(*suggested_start);
    true
}

fn relocate_overlap(ctx: &RepairContext<'_>, anomaly: &Anomaly, blocks: &mut [TimeBlock]) -> bool {
    let Anomaly::Overlap { block_id, .. } = anomaly else {
        return false;
    };
    let Some(i) = movable_index(ctx, blocks, block_id) else {
        return false;
    };
    let block = &blocks[i];
    let duration = block.duration();
    let buffer = Duration::minutes(block.break_buffer_minutes.max(0));
    let task = block.task_id.as_deref().and_then(|id| ctx.tasks.get(id)).copied();
    let floor = task.and_then(|t| dependency_floor(t, blocks, ctx.dependency_gap));
    let ceiling = task.and_then(|t| dependents_ceiling(t, blocks, &ctx.tasks, ctx.dependency_gap));
    let from = floor.map_or(block.start, |f| f.max(block.start));

    let others: Vec<TimeBlock> = blocks
        .iter()
        .enumerate()
        .filter(|(j, b)| *j != i && b.kind != BlockKind::Break)
        .map(|(_, b)| b.clone())
        .collect();
    let start = ctx.placer.find_slot(&others, from, duration, buffer);
    if start == blocks[i].start {
        return false;
    }
    // Moving past a dependent would only trade this overlap for a conflict.
    if ceiling.is_some_and(|c| start + duration > c) {
        return false;
    }
    blocks[i].shift_to(start);
    true
}

/// Detect/repair loop with a pass cap.
#[derive(Debug, Clone)]
pub struct RepairLoop {
    max_passes: u32,
    placer: Placer,
}

/// Result of running the repair loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    pub blocks: Vec<TimeBlock>,
    /// Anomalies still present after the last pass
    pub remaining: Vec<Anomaly>,
    pub passes: u32,
    pub corrections: usize,
}

impl RepairLoop {
    pub fn new(max_passes: u32, placer: Placer) -> Self {
        Self {
            max_passes: max_passes.max(1),
            placer,
        }
    }

    /// Repair `blocks` until clean, stuck, or out of passes.
    pub fn run(
        &self,
        detector: &AnomalyDetector,
        blocks: Vec<TimeBlock>,
        tasks: &[Task],
        model: &EnergyModel,
    ) -> RepairOutcome {
        let ctx = RepairContext {
            tasks: task_index(tasks),
            model,
            placer: &self.placer,
            window: detector.window,
            dependency_gap: detector.dependency_gap,
        };

        let mut blocks = blocks;
        let mut corrections = 0;
        let mut passes = 0;

        while passes < self.max_passes {
            let anomalies = detector.detect(&blocks, tasks, model);
            if anomalies.is_empty() {
                break;
            }
            passes += 1;

            let mut applied = 0;
            for anomaly in &anomalies {
                let Some(handler) = handler_for(anomaly.kind()) else {
                    continue;
                };
                // Once a correction has landed, later reports may be stale:
                // act on the current version or skip it if it is gone.
                let current = if applied == 0 {
                    Some(anomaly.clone())
                } else {
                    detector
                        .detect(&blocks, tasks, model)
                        .into_iter()
                        .find(|a| a.same_issue(anomaly))
                };
                let Some(anomaly) = current else {
                    continue;
                };
                if handler(&ctx, &anomaly, &mut blocks) {
                    debug!(pass = passes, kind = ?anomaly.kind(), block_id = anomaly.block_id(), "applied correction");
                    applied += 1;
                }
            }
            corrections += applied;
            if applied == 0 {
                break;
            }
        }

        crate::schedule::sort_blocks(&mut blocks);
        let remaining = detector.detect(&blocks, tasks, model);
        RepairOutcome {
            blocks,
            remaining,
            passes,
            corrections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::EnergyLevel;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn window() -> PlanWindow {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        PlanWindow::for_date(date, "08:00", "20:00").unwrap()
    }

    fn kinds(anomalies: &[Anomaly]) -> Vec<AnomalyKind> {
        anomalies.iter().map(Anomaly::kind).collect()
    }

    #[test]
    fn clean_plan_has_no_anomalies() {
        let task = Task::new("Write", 60).with_id("t");
        let blocks = vec![TimeBlock::for_task(&task, at(9, 0), at(10, 0), 5)];
        let found = AnomalyDetector::new(window()).detect(&blocks, &[task], &EnergyModel::new());
        assert!(found.is_empty());
    }

    #[test]
    fn actual_overrun_is_flagged_with_suggestion() {
        let mut task = Task::new("Write", 60).with_id("t");
        task.actual_start = Some(at(9, 0));
        task.actual_end = Some(at(10, 40));
        let blocks = vec![TimeBlock::for_task(&task, at(9, 0), at(10, 0), 5)];
        let found = AnomalyDetector::new(window()).detect(&blocks, &[task], &EnergyModel::new());
        match &found[0] {
            Anomaly::Overestimation { suggested_minutes, .. } => assert_eq!(*suggested_minutes, 72),
            other => panic!("unexpected anomaly {other:?}"),
        }
    }

    #[test]
    fn short_block_is_flagged_as_underestimation() {
        let task = Task::new("Write", 100).with_id("t");
        let blocks = vec![TimeBlock::for_task(&task, at(9, 0), at(10, 0), 5)];
        let found = AnomalyDetector::new(window()).detect(&blocks, &[task], &EnergyModel::new());
        assert_eq!(kinds(&found), vec![AnomalyKind::Underestimation]);
    }

    #[test]
    fn energy_mismatch_suggests_next_strong_hour() {
        let task = Task::new("Design", 60).with_id("t").with_energy(EnergyLevel::Peak);
        let blocks = vec![TimeBlock::for_task(&task, at(5, 0), at(6, 0), 5)];
        let found = AnomalyDetector::new(window()).detect(&blocks, &[task], &EnergyModel::new());
        assert!(found.contains(&Anomaly::EnergyMismatch {
            block_id: blocks[0].id.clone(),
            task_id: "t".to_string(),
            hour: 5,
            suggested_hour: Some(9),
        }));
    }

    #[test]
    fn dependency_conflict_and_overlap_are_repaired() {
        let a = Task::new("A", 60).with_id("a");
        let b = Task::new("B", 60).with_id("b").with_dependencies(["a"]);
        let tasks = vec![a.clone(), b.clone()];
        let blocks = vec![
            TimeBlock::for_task(&a, at(9, 0), at(10, 0), 5),
            TimeBlock::for_task(&b, at(9, 30), at(10, 30), 5),
        ];
        let detector = AnomalyDetector::new(window());
        let model = EnergyModel::new();
        let found = detector.detect(&blocks, &tasks, &model);
        assert!(kinds(&found).contains(&AnomalyKind::DependencyConflict));
        assert!(kinds(&found).contains(&AnomalyKind::Overlap));

        let outcome = RepairLoop::new(3, Placer::default()).run(&detector, blocks, &tasks, &model);
        assert!(outcome.remaining.is_empty(), "{:?}", outcome.remaining);
        let moved = outcome.blocks.iter().find(|x| x.task_id.as_deref() == Some("b")).unwrap();
        assert_eq!(moved.start, at(10, 5));
    }

    #[test]
    fn chained_overruns_are_repaired_in_order() {
        let tasks: Vec<Task> = (0..4)
            .map(|k| {
                let task = Task::new(format!("Step {k}"), 60).with_id(format!("s{k}"));
                if k == 0 {
                    task
                } else {
                    task.with_dependencies([format!("s{}", k - 1)])
                }
            })
            .collect();
        // Placed 65 minutes apart, then stretched to 72 minutes each.
        let blocks: Vec<TimeBlock> = tasks
            .iter()
            .enumerate()
            .map(|(k, t)| {
                let start = at(8, 0) + Duration::minutes(65 * k as i64);
                TimeBlock::for_task(t, start, start + Duration::minutes(72), 5)
            })
            .collect();

        let detector = AnomalyDetector::new(window());
        let outcome = RepairLoop::new(3, Placer::default()).run(&detector, blocks, &tasks, &EnergyModel::new());

        assert!(outcome.remaining.is_empty(), "{:?}", outcome.remaining);
        assert_eq!(outcome.corrections, 3);
        for (k, block) in outcome.blocks.iter().enumerate() {
            assert_eq!(block.task_id.as_deref(), Some(format!("s{k}").as_str()));
            assert_eq!(block.start, at(8, 0) + Duration::minutes(77 * k as i64));
            assert_eq!(block.duration_minutes(), 72);
        }
    }

    #[test]
    fn overlap_relocation_never_passes_a_dependent() {
        let a = Task::new("A", 60).with_id("a");
        let b = Task::new("B", 60).with_id("b").with_dependencies(["a"]);
        let tasks = vec![a.clone(), b.clone()];
        let meeting = TimeBlock::fixed("m", "Review", at(9, 30), at(10, 30));
        let blocks = vec![
            TimeBlock::for_task(&a, at(9, 0), at(10, 0), 5),
            meeting,
            TimeBlock::for_task(&b, at(10, 5), at(11, 5), 5),
        ];
        let a_id = blocks[0].id.clone();

        let detector = AnomalyDetector::new(window());
        let outcome = RepairLoop::new(3, Placer::default()).run(&detector, blocks, &tasks, &EnergyModel::new());

        let placed_a = outcome.blocks.iter().find(|x| x.id == a_id).unwrap();
        let placed_b = outcome.blocks.iter().find(|x| x.task_id.as_deref() == Some("b")).unwrap();
        assert_eq!(placed_a.start, at(9, 0));
        assert_eq!(placed_b.start, at(10, 30));
        assert_eq!(
            outcome.remaining,
            vec![Anomaly::Overlap {
                block_id: a_id,
                other_block_id: "m".to_string(),
            }]
        );
    }

    #[test]
    fn same_issue_matches_kind_and_blocks() {
        let overlap = |other: &str| Anomaly::Overlap {
            block_id: "b".to_string(),
            other_block_id: other.to_string(),
        };
        assert!(overlap("m").same_issue(&overlap("m")));
        assert!(!overlap("m").same_issue(&overlap("n")));

        let conflict = |minute| Anomaly::DependencyConflict {
            block_id: "b".to_string(),
            task_id: "t".to_string(),
            dependency_id: "a".to_string(),
            suggested_start: at(10, minute),
        };
        assert!(conflict(5).same_issue(&conflict(20)));
        assert!(!conflict(5).same_issue(&overlap("m")));
    }

    #[test]
    fn protected_overlaps_move_the_unprotected_block() {
        let task = Task::new("Write", 60).with_id("t");
        let meeting = TimeBlock::fixed("m", "Sync", at(9, 30), at(10, 0));
        let block = TimeBlock::for_task(&task, at(9, 0), at(10, 0), 5);
        let detector = AnomalyDetector::new(window());
        let found = detector.detect(&[meeting.clone(), block.clone()], &[task.clone()], &EnergyModel::new());
        assert_eq!(
            found,
            vec![Anomaly::Overlap {
                block_id: block.id.clone(),
                other_block_id: "m".to_string(),
            }]
        );

        let outcome = RepairLoop::new(3, Placer::default()).run(
            &detector,
            vec![meeting, block],
            &[task],
            &EnergyModel::new(),
        );
        assert_eq!(outcome.blocks[1].start, at(10, 0));
        assert!(outcome.remaining.is_empty());
    }

    #[test]
    fn flag_only_anomalies_stop_the_loop() {
        let task = Task::new("Report", 120).with_id("r").with_deadline(at(9, 0));
        let blocks = vec![TimeBlock::for_task(&task, at(7, 0), at(9, 0), 5)];
        let detector = AnomalyDetector::new(window());
        let outcome = RepairLoop::new(3, Placer::default()).run(&detector, blocks, &[task], &EnergyModel::new());
        assert_eq!(outcome.passes, 1);
        assert_eq!(outcome.corrections, 0);
        assert_eq!(kinds(&outcome.remaining), vec![AnomalyKind::OutsideWindow]);
    }

    #[test]
    fn every_kind_has_a_table_entry() {
        for kind in [
            AnomalyKind::Overestimation,
            AnomalyKind::Underestimation,
            AnomalyKind::EnergyMismatch,
            AnomalyKind::DependencyConflict,
            AnomalyKind::Overlap,
            AnomalyKind::DeadlineMissed,
            AnomalyKind::OutsideWindow,
        ] {
            assert!(HANDLERS.iter().any(|(k, _)| *k == kind));
        }
        assert!(handler_for(AnomalyKind::DeadlineMissed).is_none());
        assert!(handler_for(AnomalyKind::Overlap).is_some());
    }

    #[test]
    fn anomalies_serialize_with_kind_tag() {
        let anomaly = Anomaly::OutsideWindow {
            block_id: "b".to_string(),
            task_id: "t".to_string(),
        };
        let json = serde_json::to_value(&anomaly).unwrap();
        assert_eq!(json["kind"], "outside_window");
        assert!(anomaly.to_string().contains("outside"));
    }
}
