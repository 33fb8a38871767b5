//! Daily plan generation.
//!
//! [`PlannerEngine::generate_daily_plan`] is the single entry point callers
//! use. It runs the whole pipeline synchronously on a snapshot of inputs:
//!
//! 1. Reject malformed tasks and fixed blocks (reported as warnings)
//! 2. Resolve priorities against goals, deadlines and constraints
//! 3. Greedy placement around the fixed blocks
//! 4. Hard-constraint resolution
//! 5. Energy alignment
//! 6. Feedback-driven duration correction
//! 7. Detect/repair loop
//! 8. Scoring
//!
//! The engine holds no mutable state. Persisting the plan and keeping the
//! "current plan" for a date are the caller's job.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::anomaly::{Anomaly, AnomalyDetector, RepairLoop};
use crate::energy::{EnergyModel, EnergyOptimizer};
use crate::error::{PlanWarning, Result, ValidationError};
use crate::learning::{AdaptiveLearner, LearningInsights};
use crate::priority::PriorityResolver;
use crate::reschedule::{Replanner, ReschedulingEngine};
use crate::schedule::{
    sort_blocks, ConstraintKind, DailyPlan, PlanWindow, SchedulingConstraint, SchedulingFeedback, TimeBlock,
};
use crate::scheduler::{ConstraintSolver, Placer};
use crate::scoring::PlanScorer;
use crate::storage::PlannerConfig;
use crate::task::{Goal, Task};

/// Everything one planning run needs besides history and energy patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningInput {
    pub date: NaiveDate,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub goals: Vec<Goal>,
    /// Calendar obligations; always treated as protected
    #[serde(default)]
    pub fixed_blocks: Vec<TimeBlock>,
    #[serde(default)]
    pub constraints: Vec<SchedulingConstraint>,
}

impl PlanningInput {
    pub fn new(date: NaiveDate, tasks: Vec<Task>) -> Self {
        Self {
            date,
            tasks,
            goals: Vec::new(),
            fixed_blocks: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn with_goals(mut self, goals: Vec<Goal>) -> Self {
        self.goals = goals;
        self
    }

    pub fn with_fixed_blocks(mut self, blocks: Vec<TimeBlock>) -> Self {
        self.fixed_blocks = blocks;
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<SchedulingConstraint>) -> Self {
        self.constraints = constraints;
        self
    }
}

/// A generated plan with everything the caller may want to show next to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub plan: DailyPlan,
    /// Problems the repair loop could not fix
    pub anomalies: Vec<Anomaly>,
    /// Inputs that were rejected or deferred
    pub warnings: Vec<PlanWarning>,
    pub insights: LearningInsights,
}

/// Orchestrates the planning pipeline.
#[derive(Debug, Clone, Default)]
pub struct PlannerEngine {
    config: PlannerConfig,
    model: EnergyModel,
    feedback: Vec<SchedulingFeedback>,
}

impl PlannerEngine {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            model: EnergyModel::new(),
            feedback: Vec::new(),
        }
    }

    pub fn with_energy_model(mut self, model: EnergyModel) -> Self {
        self.model = model;
        self
    }

    /// Feedback history, oldest first.
    pub fn with_feedback(mut self, feedback: Vec<SchedulingFeedback>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn energy_model(&self) -> &EnergyModel {
        &self.model
    }

    pub fn feedback(&self) -> &[SchedulingFeedback] {
        &self.feedback
    }

    /// Working window for `date` from the configured start and end times.
    pub fn window(&self, date: NaiveDate) -> Result<PlanWindow> {
        Ok(PlanWindow::for_date(date, &self.config.window.start, &self.config.window.end)?)
    }

    /// Run the full pipeline for one date.
    ///
    /// Malformed tasks and blocks are dropped and reported in
    /// [`PlanOutcome::warnings`]; unsatisfiable constraints show up as
    /// anomalies. An error is returned only for an unusable configuration.
    pub fn generate_daily_plan(&self, input: &PlanningInput) -> Result<PlanOutcome> {
        self.config.validate()?;
        let window = self.window(input.date)?;
        let constraints = &input.constraints;

        let mut warnings = Vec::new();
        let tasks = validate_tasks(&input.tasks, &mut warnings);
        let fixed = validate_fixed_blocks(&input.fixed_blocks, &mut warnings);

        let deadline_escalation = SchedulingConstraint::find(constraints, ConstraintKind::DeadlinePriority)
            .map_or(true, |value| value != 0.0);
        let resolver = PriorityResolver::new().with_deadline_escalation(deadline_escalation);
        let prioritized = resolver.prioritize(&tasks, &input.goals, window.start);
        let (tasks, deferred) = resolver.apply_constraints(prioritized, constraints);
        warnings.extend(deferred);
        debug!(date = %input.date, tasks = tasks.len(), "priorities resolved");

        let mut placer = Placer::new(&self.config.placement);
        if let Some(minutes) = SchedulingConstraint::find(constraints, ConstraintKind::MinBreakTime) {
            placer = placer.with_min_break(minutes.round() as i64);
        }
        let blocks = placer.place_initial(&tasks, &fixed, window.start, window.end);
        debug!(date = %input.date, blocks = blocks.len(), "initial placement");

        let solver = ConstraintSolver::new(&self.config.constraints);
        let blocks = solver.resolve(&blocks, &tasks, constraints);

        let gap = solver.dependency_gap();
        let mut optimizer = EnergyOptimizer::new(&self.config.energy, window).with_dependency_gap(gap);
        if let Some(threshold) = SchedulingConstraint::find(constraints, ConstraintKind::EnergyAlignment) {
            optimizer = optimizer.with_threshold(threshold);
        }
        let blocks = optimizer.align(&blocks, &tasks, &self.model);

        let learner = AdaptiveLearner::new(&self.config.learning);
        let blocks = learner.apply_learning(&blocks, &tasks, &self.feedback, input.date);
        let insights = learner.insights(&self.feedback, &tasks, input.date);

        let detector = self.detector(window, constraints);
        let repair = RepairLoop::new(self.config.repair.max_passes, placer);
        let outcome = repair.run(&detector, blocks, &tasks, &self.model);
        debug!(
            date = %input.date,
            passes = outcome.passes,
            corrections = outcome.corrections,
            remaining = outcome.remaining.len(),
            "repair loop finished"
        );

        let plan = self.assemble(input.date, outcome.blocks, tasks);
        info!(
            date = %plan.date,
            blocks = plan.blocks.len(),
            score = plan.productivity_score,
            anomalies = outcome.remaining.len(),
            warnings = warnings.len(),
            "generated daily plan"
        );

        Ok(PlanOutcome {
            plan,
            anomalies: outcome.remaining,
            warnings,
            insights,
        })
    }

    /// Bind goals and constraints so the rescheduler can trigger full replans.
    pub fn with_context<'a>(
        &'a self,
        goals: &'a [Goal],
        constraints: &'a [SchedulingConstraint],
    ) -> PlanContext<'a> {
        PlanContext {
            engine: self,
            goals,
            constraints,
        }
    }

    /// Rescheduler sharing this engine's window, thresholds and energy model.
    pub fn rescheduler(&self, date: NaiveDate) -> Result<ReschedulingEngine> {
        let window = self.window(date)?;
        Ok(ReschedulingEngine::new(
            &self.config.reschedule,
            self.detector(window, &[]),
            self.model.clone(),
        ))
    }

    fn detector(&self, window: PlanWindow, constraints: &[SchedulingConstraint]) -> AnomalyDetector {
        let mut min_focus = self.config.constraints.min_focus_minutes;
        if let Some(cap) = SchedulingConstraint::find(constraints, ConstraintKind::MaxFocusTime) {
            min_focus = min_focus.min(cap.max(0.0).round() as i64);
        }
        AnomalyDetector::new(window)
            .with_dependency_gap(Duration::minutes(self.config.constraints.dependency_gap_minutes))
            .with_min_focus_minutes(min_focus)
    }

    /// Attach referenced tasks and compute the plan's scores.
    ///
    /// Completed tasks that finished on `date` count as referenced so the
    /// completion rate reflects the day's work.
    fn assemble(&self, date: NaiveDate, mut blocks: Vec<TimeBlock>, tasks: Vec<Task>) -> DailyPlan {
        sort_blocks(&mut blocks);
        let referenced: HashSet<&str> = blocks.iter().filter_map(|b| b.task_id.as_deref()).collect();
        let tasks: Vec<Task> = tasks
            .into_iter()
            .filter(|t| {
                referenced.contains(t.id.as_str())
                    || (t.completed && t.actual_end.is_some_and(|end| end.date_naive() == date))
            })
            .collect();

        let mut plan = DailyPlan::empty(date);
        plan.completion_rate = DailyPlan::compute_completion_rate(&tasks);
        plan.adherence_score = DailyPlan::compute_adherence(&blocks, &tasks);
        plan.blocks = blocks;
        plan.tasks = tasks;
        plan.productivity_score = PlanScorer::default().score(&plan);
        plan
    }
}

/// A planner bound to goals and constraints, usable as a [`Replanner`].
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    engine: &'a PlannerEngine,
    goals: &'a [Goal],
    constraints: &'a [SchedulingConstraint],
}

impl Replanner for PlanContext<'_> {
    fn replan(&self, date: NaiveDate, tasks: &[Task], fixed_blocks: &[TimeBlock]) -> Result<PlanOutcome> {
        let input = PlanningInput {
            date,
            tasks: tasks.to_vec(),
            goals: self.goals.to_vec(),
            fixed_blocks: fixed_blocks.to_vec(),
            constraints: self.constraints.to_vec(),
        };
        self.engine.generate_daily_plan(&input)
    }
}

/// Drop tasks that cannot be planned: non-positive estimates, duplicate ids,
/// and members of dependency cycles.
fn validate_tasks(tasks: &[Task], warnings: &mut Vec<PlanWarning>) -> Vec<Task> {
    let mut seen = HashSet::new();
    let mut valid = Vec::with_capacity(tasks.len());
    for task in tasks {
        let reason = if !seen.insert(task.id.as_str()) {
            Some("duplicate task id".to_string())
        } else if !task.completed && task.estimated_minutes <= 0 {
            Some(
                ValidationError::NonPositiveDuration {
                    id: task.id.clone(),
                    minutes: task.estimated_minutes,
                }
                .to_string(),
            )
        } else if let (Some(start), Some(end)) = (task.actual_start, task.actual_end) {
            (end <= start).then(|| ValidationError::InvalidTimeRange { start, end }.to_string())
        } else {
            None
        };

        match reason {
            Some(reason) => {
                warn!(task_id = %task.id, %reason, "rejected task");
                warnings.push(PlanWarning::InvalidTask {
                    task_id: task.id.clone(),
                    reason,
                });
            }
            None => valid.push(task.clone()),
        }
    }

    let cyclic = cyclic_tasks(&valid);
    if cyclic.is_empty() {
        return valid;
    }
    valid
        .into_iter()
        .filter(|task| {
            if !cyclic.contains(task.id.as_str()) {
                return true;
            }
            warn!(task_id = %task.id, "rejected task in dependency cycle");
            warnings.push(PlanWarning::InvalidTask {
                task_id: task.id.clone(),
                reason: "dependency cycle".to_string(),
            });
            false
        })
        .collect()
}

/// Ids of tasks that can reach themselves through their dependencies.
fn cyclic_tasks(tasks: &[Task]) -> HashSet<String> {
    let edges: HashMap<&str, Vec<&str>> = tasks
        .iter()
        .map(|t| (t.id.as_str(), t.dependencies.iter().map(String::as_str).collect()))
        .collect();

    let mut cyclic = HashSet::new();
    for task in tasks {
        let mut stack: Vec<&str> = edges.get(task.id.as_str()).cloned().unwrap_or_default();
        let mut visited = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == task.id {
                cyclic.insert(task.id.clone());
                break;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(next) = edges.get(id) {
                stack.extend(next.iter().copied());
            }
        }
    }
    cyclic
}

/// Drop fixed blocks with a bad range, a duplicate id, or overlapping an
/// earlier fixed block. Survivors are marked protected.
fn validate_fixed_blocks(blocks: &[TimeBlock], warnings: &mut Vec<PlanWarning>) -> Vec<TimeBlock> {
    let mut ordered: Vec<TimeBlock> = blocks.to_vec();
    sort_blocks(&mut ordered);

    let mut seen = HashSet::new();
    let mut kept: Vec<TimeBlock> = Vec::with_capacity(ordered.len());
    for mut block in ordered {
        if let Err(e) = block.validate() {
            warn!(block_id = %block.id, error = %e, "rejected fixed block");
            warnings.push(PlanWarning::InvalidBlock {
                block_id: block.id.clone(),
                reason: e.to_string(),
            });
            continue;
        }
        if !seen.insert(block.id.clone()) {
            warnings.push(PlanWarning::InvalidBlock {
                block_id: block.id.clone(),
                reason: "duplicate block id".to_string(),
            });
            continue;
        }
        if let Some(other) = kept.iter().find(|k| k.overlaps_block(&block)) {
            warn!(block_id = %block.id, other = %other.id, "fixed block overlaps another");
            warnings.push(PlanWarning::OverlappingFixedBlock {
                block_id: block.id.clone(),
                other_block_id: other.id.clone(),
            });
            continue;
        }
        block.is_protected = true;
        kept.push(block);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Priority;
    use chrono::{DateTime, TimeZone, Utc};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[test]
    fn empty_input_yields_empty_plan() {
        let outcome = PlannerEngine::default()
            .generate_daily_plan(&PlanningInput::new(date(), Vec::new()))
            .unwrap();
        assert!(outcome.plan.blocks.is_empty());
        assert_eq!(outcome.plan.productivity_score, 0.0);
        assert!(outcome.anomalies.is_empty());
    }

    #[test]
    fn invalid_tasks_are_rejected_individually() {
        let tasks = vec![
            Task::new("Good", 30).with_id("good"),
            Task::new("Zero", 0).with_id("zero"),
            Task::new("Again", 30).with_id("good"),
        ];
        let outcome = PlannerEngine::default()
            .generate_daily_plan(&PlanningInput::new(date(), tasks))
            .unwrap();
        assert_eq!(outcome.plan.tasks.len(), 1);
        assert_eq!(outcome.warnings.len(), 2);
        assert!(outcome
            .warnings
            .iter()
            .all(|w| matches!(w, PlanWarning::InvalidTask { .. })));
    }

    #[test]
    fn dependency_cycle_members_are_rejected() {
        let tasks = vec![
            Task::new("A", 30).with_id("a").with_dependencies(["b"]),
            Task::new("B", 30).with_id("b").with_dependencies(["a"]),
            Task::new("C", 30).with_id("c").with_dependencies(["a"]),
        ];
        let outcome = PlannerEngine::default()
            .generate_daily_plan(&PlanningInput::new(date(), tasks))
            .unwrap();
        let ids: Vec<_> = outcome.plan.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
        assert_eq!(outcome.warnings.len(), 2);
    }

    #[test]
    fn overlapping_fixed_blocks_keep_the_earlier_one() {
        let fixed = vec![
            TimeBlock::fixed("m1", "Standup", at(9, 0), at(10, 0)),
            TimeBlock::fixed("m2", "Review", at(9, 30), at(10, 30)),
            TimeBlock::fixed("m3", "Broken", at(12, 0), at(11, 0)),
        ];
        let outcome = PlannerEngine::default()
            .generate_daily_plan(&PlanningInput::new(date(), Vec::new()).with_fixed_blocks(fixed))
            .unwrap();
        let ids: Vec<_> = outcome.plan.blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["m1"]);
        assert!(outcome.warnings.contains(&PlanWarning::OverlappingFixedBlock {
            block_id: "m2".into(),
            other_block_id: "m1".into(),
        }));
    }

    #[test]
    fn work_hour_budget_defers_tasks() {
        let tasks = vec![
            Task::new("First", 120).with_id("a").with_priority(Priority::High),
            Task::new("Second", 120).with_id("b"),
        ];
        let input = PlanningInput::new(date(), tasks)
            .with_constraints(vec![SchedulingConstraint::new(ConstraintKind::MaxWorkHours, 3.0)]);
        let outcome = PlannerEngine::default().generate_daily_plan(&input).unwrap();
        assert!(outcome.plan.block_for_task("a").is_some());
        assert!(outcome.plan.block_for_task("b").is_none());
        assert_eq!(
            outcome.warnings,
            vec![PlanWarning::DeferredByWorkHours { task_id: "b".into() }]
        );
    }

    #[test]
    fn min_break_constraint_widens_buffers() {
        let tasks = vec![
            Task::new("A", 60).with_id("a").with_priority(Priority::High),
            Task::new("B", 60).with_id("b"),
        ];
        let input = PlanningInput::new(date(), tasks)
            .with_constraints(vec![SchedulingConstraint::new(ConstraintKind::MinBreakTime, 20.0)]);
        let outcome = PlannerEngine::default().generate_daily_plan(&input).unwrap();
        assert_eq!(outcome.plan.block_for_task("b").unwrap().start, at(9, 20));
    }

    #[test]
    fn invalid_config_is_an_error() {
        let mut config = PlannerConfig::default();
        config.repair.max_passes = 0;
        let engine = PlannerEngine {
            config,
            ..PlannerEngine::default()
        };
        let result = engine.generate_daily_plan(&PlanningInput::new(date(), Vec::new()));
        assert!(matches!(result, Err(crate::error::CoreError::Config(_))));
    }

    #[test]
    fn plan_context_replans_with_bound_goals() {
        let engine = PlannerEngine::default();
        let goals = vec![Goal::new("g", "Ship release")];
        let context = engine.with_context(&goals, &[]);
        let tasks = vec![Task::new("Write release notes", 30).with_id("t")];
        let outcome = context.replan(date(), &tasks, &[]).unwrap();
        assert_eq!(outcome.plan.block_for_task("t").unwrap().start, at(8, 0));
    }
}
