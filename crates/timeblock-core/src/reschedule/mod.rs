//! Incremental rescheduling driven by live events.
//!
//! The engine is a small state machine (`Idle -> Evaluating -> Applying ->
//! Idle`). Each event is evaluated against the current plan to pick a
//! strategy:
//!
//! - Overtime within the escalation limit shifts the rest of the day locally
//! - Larger overtime and significant priority changes trigger a full replan
//! - Minor priority changes are recorded on the plan without moving blocks
//!
//! Every strategy returns a new plan; the caller decides whether it becomes
//! the active plan for the date.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::anomaly::{Anomaly, AnomalyDetector};
use crate::energy::EnergyModel;
use crate::error::{Result, ValidationError};
use crate::planner::PlanOutcome;
use crate::schedule::{BlockKind, DailyPlan, TimeBlock};
use crate::scoring::PlanScorer;
use crate::storage::RescheduleConfig;
use crate::task::{Priority, Task};

/// Full replan collaborator.
///
/// Implemented by [`crate::planner::PlanContext`]; tests can substitute
/// their own.
pub trait Replanner {
    fn replan(&self, date: NaiveDate, tasks: &[Task], fixed_blocks: &[TimeBlock]) -> Result<PlanOutcome>;
}

/// Rescheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RescheduleState {
    Idle,
    Evaluating,
    Applying,
}

impl fmt::Display for RescheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RescheduleState::Idle => write!(f, "idle"),
            RescheduleState::Evaluating => write!(f, "evaluating"),
            RescheduleState::Applying => write!(f, "applying"),
        }
    }
}

/// Live event that may invalidate the current plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RescheduleEvent {
    /// A task ran past its planned end
    Overtime { task_id: String, overtime_minutes: i64 },
    /// A task's priority was edited
    PriorityChange {
        task_id: String,
        priority: Priority,
        at: DateTime<Utc>,
    },
}

impl RescheduleEvent {
    pub fn task_id(&self) -> &str {
        match self {
            RescheduleEvent::Overtime { task_id, .. } | RescheduleEvent::PriorityChange { task_id, .. } => task_id,
        }
    }
}

/// How an event is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RescheduleStrategy {
    /// Extend the late block and push everything after it
    LocalShift,
    /// Run the whole pipeline again
    GlobalReplan,
    /// Update the plan's task data only
    RecordOnly,
}

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq)]
pub enum RescheduleOutcome {
    Shifted {
        plan: DailyPlan,
        anomalies: Vec<Anomaly>,
        /// Ids of blocks moved by the cascade
        shifted: Vec<String>,
    },
    Replanned {
        outcome: Box<PlanOutcome>,
        /// Score of the plan that was replaced
        previous_score: f64,
    },
    Recorded {
        plan: DailyPlan,
    },
}

impl RescheduleOutcome {
    pub fn plan(&self) -> &DailyPlan {
        match self {
            RescheduleOutcome::Shifted { plan, .. } | RescheduleOutcome::Recorded { plan } => plan,
            RescheduleOutcome::Replanned { outcome, .. } => &outcome.plan,
        }
    }

    pub fn into_plan(self) -> DailyPlan {
        match self {
            RescheduleOutcome::Shifted { plan, .. } | RescheduleOutcome::Recorded { plan } => plan,
            RescheduleOutcome::Replanned { outcome, .. } => outcome.plan,
        }
    }

    pub fn strategy(&self) -> RescheduleStrategy {
        match self {
            RescheduleOutcome::Shifted { .. } => RescheduleStrategy::LocalShift,
            RescheduleOutcome::Replanned { .. } => RescheduleStrategy::GlobalReplan,
            RescheduleOutcome::Recorded { .. } => RescheduleStrategy::RecordOnly,
        }
    }

    /// Whether a replan scored higher than the plan it replaces.
    pub fn improved(&self) -> Option<bool> {
        match self {
            RescheduleOutcome::Replanned { outcome, previous_score } => {
                Some(outcome.plan.productivity_score > *previous_score)
            }
            _ => None,
        }
    }
}

/// Applies live events to an existing plan.
#[derive(Debug, Clone)]
pub struct ReschedulingEngine {
    state: RescheduleState,
    escalation_minutes: i64,
    replan_threshold: Priority,
    detector: AnomalyDetector,
    model: EnergyModel,
    scorer: PlanScorer,
}

impl ReschedulingEngine {
    pub fn new(config: &RescheduleConfig, detector: AnomalyDetector, model: EnergyModel) -> Self {
        Self {
            state: RescheduleState::Idle,
            escalation_minutes: config.escalation_minutes.max(0),
            replan_threshold: config.replan_threshold,
            detector,
            model,
            scorer: PlanScorer::default(),
        }
    }

    pub fn state(&self) -> RescheduleState {
        self.state
    }

    /// Pick a strategy for `event` without changing anything.
    ///
    /// # Errors
    /// The task is not part of the plan, or the overtime is not positive.
    pub fn decide(&self, plan: &DailyPlan, event: &RescheduleEvent) -> Result<RescheduleStrategy> {
        let task = plan.task(event.task_id()).ok_or_else(|| ValidationError::NotFound {
            kind: "task".to_string(),
            id: event.task_id().to_string(),
        })?;

        match event {
            RescheduleEvent::Overtime { overtime_minutes, .. } => {
                if *overtime_minutes <= 0 {
                    return Err(ValidationError::InvalidValue {
                        field: "overtime_minutes".to_string(),
                        message: format!("must be positive, got {overtime_minutes}"),
                    }
                    .into());
                }
                if task.completed {
                    return Err(ValidationError::InvalidValue {
                        field: "task_id".to_string(),
                        message: format!("task '{}' is already completed", task.id),
                    }
                    .into());
                }
                if plan.block_for_task(&task.id).is_none() {
                    return Err(ValidationError::NotFound {
                        kind: "block".to_string(),
                        id: task.id.clone(),
                    }
                    .into());
                }
                Ok(if *overtime_minutes > self.escalation_minutes {
                    RescheduleStrategy::GlobalReplan
                } else {
                    RescheduleStrategy::LocalShift
                })
            }
            RescheduleEvent::PriorityChange { priority, at, .. } => {
                let old = task.current_priority();
                let new = *priority;
                let threshold = self.replan_threshold;
                let critical = old == Priority::Critical || new == Priority::Critical;
                let crosses_threshold = (old >= threshold) != (new >= threshold);
                let overdue = task.is_past_deadline(*at);

                Ok(if old != new && (critical || crosses_threshold || task.focus_protected || overdue) {
                    RescheduleStrategy::GlobalReplan
                } else {
                    RescheduleStrategy::RecordOnly
                })
            }
        }
    }

    /// Handle one event. The engine is back in `Idle` when this returns,
    /// whether or not handling succeeded.
    pub fn handle(
        &mut self,
        plan: &DailyPlan,
        event: &RescheduleEvent,
        replanner: &dyn Replanner,
    ) -> Result<RescheduleOutcome> {
        self.transition(RescheduleState::Evaluating);
        let result = self.decide(plan, event).and_then(|strategy| {
            self.transition(RescheduleState::Applying);
            self.apply(strategy, plan, event, replanner)
        });
        self.transition(RescheduleState::Idle);

        if let Ok(outcome) = &result {
            info!(
                task_id = event.task_id(),
                strategy = ?outcome.strategy(),
                score = outcome.plan().productivity_score,
                "rescheduled"
            );
        }
        result
    }

    fn transition(&mut self, next: RescheduleState) {
        debug!(from = %self.state, to = %next, "reschedule state");
        self.state = next;
    }

    fn apply(
        &self,
        strategy: RescheduleStrategy,
        plan: &DailyPlan,
        event: &RescheduleEvent,
        replanner: &dyn Replanner,
    ) -> Result<RescheduleOutcome> {
        match (strategy, event) {
            (RescheduleStrategy::LocalShift, RescheduleEvent::Overtime { overtime_minutes, .. }) => {
                Ok(self.shift_after_overtime(plan, event, Duration::minutes(*overtime_minutes)))
            }
            (RescheduleStrategy::GlobalReplan, _) => {
                let tasks = updated_tasks(plan, event);
                let fixed: Vec<TimeBlock> = plan
                    .blocks
                    .iter()
                    .filter(|b| b.is_protected && b.task_id.is_none())
                    .cloned()
                    .collect();
                let outcome = replanner.replan(plan.date, &tasks, &fixed)?;
                Ok(RescheduleOutcome::Replanned {
                    outcome: Box::new(outcome),
                    previous_score: plan.productivity_score,
                })
            }
            _ => {
                let mut updated = plan.clone();
                updated.tasks = updated_tasks(plan, event);
                updated.productivity_score = self.scorer.score(&updated);
                Ok(RescheduleOutcome::Recorded { plan: updated })
            }
        }
    }

    /// Extend the late task's block and push every later unprotected block
    /// back by at least the overtime, keeping order and buffers.
    ///
    /// A block that would land on a protected block continues after it, and
    /// the blocks behind it follow. The late task's estimate grows by the
    /// overtime so the longer block is not reported as overestimated.
    fn shift_after_overtime(&self, plan: &DailyPlan, event: &RescheduleEvent, delta: Duration) -> RescheduleOutcome {
        let task_id = event.task_id();
        let mut updated = plan.clone();
        updated.tasks = updated_tasks(plan, event);
        crate::schedule::sort_blocks(&mut updated.blocks);
        let mut shifted = Vec::new();

        let late = updated
            .blocks
            .iter()
            .position(|b| b.is_work() && b.task_id.as_deref() == Some(task_id));
        if let Some(i) = late {
            let original_end = updated.blocks[i].end;
            updated.blocks[i].end += delta;

            let completed = |block: &TimeBlock| {
                block
                    .task_id
                    .as_deref()
                    .and_then(|id| plan.task(id))
                    .is_some_and(|t| t.completed)
            };
            let moving: Vec<usize> = updated
                .blocks
                .iter()
                .enumerate()
                .filter(|(j, b)| *j != i && !b.is_protected && b.start >= original_end && !completed(b))
                .map(|(j, _)| j)
                .collect();
            let staying: Vec<TimeBlock> = updated
                .blocks
                .iter()
                .enumerate()
                .filter(|(j, b)| *j != i && !moving.contains(j) && b.kind != BlockKind::Break)
                .map(|(_, b)| b.clone())
                .collect();

            let mut end_floor = updated.blocks[i].end;
            let mut occupied_floor = updated.blocks[i].occupied_until();
            for j in moving {
                let block = &mut updated.blocks[j];
                let duration = block.end - block.start;
                let buffer = Duration::minutes(block.break_buffer_minutes.max(0));
                // Breaks sit directly after their block; work keeps the buffer.
                let floor = if block.kind == BlockKind::Break { end_floor } else { occupied_floor };
                let mut start = (block.start + delta).max(floor);
                while let Some(obstacle) = staying
                    .iter()
                    .find(|s| s.start < start + duration + buffer && s.occupied_until() > start)
                {
                    start = obstacle.occupied_until();
                }
                block.start = start;
                block.end = start + duration;
                end_floor = end_floor.max(block.end);
                occupied_floor = occupied_floor.max(block.occupied_until());
                shifted.push(block.id.clone());
            }
        }

        crate::schedule::sort_blocks(&mut updated.blocks);
        updated.productivity_score = self.scorer.score(&updated);
        let anomalies = self.detector.detect(&updated.blocks, &updated.tasks, &self.model);
        debug!(task_id, shifted = shifted.len(), minutes = delta.num_minutes(), "cascaded overtime");

        RescheduleOutcome::Shifted {
            plan: updated,
            anomalies,
            shifted,
        }
    }
}

/// The plan's tasks with the event applied.
fn updated_tasks(plan: &DailyPlan, event: &RescheduleEvent) -> Vec<Task> {
    let mut tasks = plan.tasks.clone();
    let Some(task) = tasks.iter_mut().find(|t| t.id == event.task_id()) else {
        return tasks;
    };
    match event {
        RescheduleEvent::Overtime { overtime_minutes, .. } => {
            task.estimated_minutes += overtime_minutes;
        }
        RescheduleEvent::PriorityChange { priority, .. } => {
            task.priority = *priority;
            task.effective_priority = Some(*priority);
        }
    }
    tasks
}
