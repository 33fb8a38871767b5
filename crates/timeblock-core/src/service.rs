//! Caller-side orchestration around the planner.
//!
//! [`PlanningService`] owns the collaborators the engine must not touch:
//! it loads snapshots from the store and calendar, runs the pipeline,
//! saves the result, and hands focus windows and reminders on. Collaborator
//! failures that the plan can live without are logged and reported as
//! warnings instead of aborting.

use chrono::{Duration, NaiveDate};
use tracing::{debug, warn};

use crate::energy::{EnergyModel, SessionOutcome};
use crate::error::{CoreError, PlanWarning, Result, ValidationError};
use crate::integrations::{
    CalendarSource, FocusLockExecutor, FocusWindow, NoopSink, NotificationRequest, NotificationScheduler,
};
use crate::planner::{PlanOutcome, PlannerEngine, PlanningInput};
use crate::reschedule::{RescheduleEvent, RescheduleOutcome};
use crate::schedule::{BlockKind, DailyPlan, FeedbackLog, SchedulingFeedback};
use crate::storage::{PlanStore, PlannerConfig};

/// Store + calendar + sinks wired around a [`PlannerEngine`].
pub struct PlanningService<S, C> {
    store: S,
    calendar: C,
    config: PlannerConfig,
    focus_lock: Box<dyn FocusLockExecutor>,
    notifier: Box<dyn NotificationScheduler>,
}

/// What was handed to the focus executor and notifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatched {
    pub focus_windows: Vec<FocusWindow>,
    pub notifications: Vec<NotificationRequest>,
}

impl<S: PlanStore, C: CalendarSource> PlanningService<S, C> {
    pub fn new(store: S, calendar: C, config: PlannerConfig) -> Self {
        Self {
            store,
            calendar,
            config,
            focus_lock: Box::new(NoopSink),
            notifier: Box::new(NoopSink),
        }
    }

    pub fn with_focus_lock(mut self, executor: impl FocusLockExecutor + 'static) -> Self {
        self.focus_lock = Box::new(executor);
        self
    }

    pub fn with_notifier(mut self, notifier: impl NotificationScheduler + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Persisted energy model, or the seeded one when nothing is stored.
    pub fn energy_model(&self) -> Result<EnergyModel> {
        let patterns = self.store.load_energy_patterns()?;
        Ok(if patterns.is_empty() {
            EnergyModel::new()
        } else {
            EnergyModel::from_patterns(patterns)
        })
    }

    /// Engine loaded with history. Missing history degrades to defaults.
    fn engine(&self, warnings: &mut Vec<PlanWarning>) -> PlannerEngine {
        let model = self.energy_model().unwrap_or_else(|e| {
            degrade("energy patterns", &e, warnings);
            EnergyModel::new()
        });
        let feedback = self.store.load_feedback().unwrap_or_else(|e| {
            degrade("feedback", &e, warnings);
            Vec::new()
        });
        // The store trims on append; a retention lowered since then applies here.
        let log = FeedbackLog::from_records(self.config.learning.feedback_retention, feedback);
        PlannerEngine::new(self.config.clone())
            .with_energy_model(model)
            .with_feedback(log.to_vec())
    }

    /// Plan `date` from stored tasks, goals and constraints plus the
    /// calendar, save it, and dispatch its focus blocks.
    pub fn plan_day(&self, date: NaiveDate) -> Result<PlanOutcome> {
        let mut degraded = Vec::new();
        let engine = self.engine(&mut degraded);

        let fixed_blocks = match self.calendar.fixed_blocks(date) {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!(calendar = self.calendar.name(), error = %e, "calendar unavailable; planning without fixed blocks");
                degraded.push(PlanWarning::CollaboratorUnavailable {
                    collaborator: self.calendar.name().to_string(),
                    reason: e.to_string(),
                });
                Vec::new()
            }
        };

        let input = PlanningInput::new(date, self.store.load_tasks()?)
            .with_goals(self.store.load_goals()?)
            .with_constraints(self.store.load_constraints()?)
            .with_fixed_blocks(fixed_blocks);

        let mut outcome = engine.generate_daily_plan(&input)?;
        degraded.append(&mut outcome.warnings);
        outcome.warnings = degraded;
        self.store.save_plan(&outcome.plan)?;
        self.dispatch(&outcome.plan);
        Ok(outcome)
    }

    /// Apply a live event to the stored plan for `date` and save the result.
    ///
    /// # Errors
    /// No plan is stored for `date`, or the event does not fit the plan.
    pub fn reschedule(&self, date: NaiveDate, event: &RescheduleEvent) -> Result<RescheduleOutcome> {
        let plan = self.store.load_plan(date)?.ok_or_else(|| ValidationError::NotFound {
            kind: "plan".to_string(),
            id: date.to_string(),
        })?;

        let mut degraded = Vec::new();
        let engine = self.engine(&mut degraded);
        let goals = self.store.load_goals()?;
        let constraints = self.store.load_constraints()?;

        let mut rescheduler = engine.rescheduler(date)?;
        let outcome = rescheduler.handle(&plan, event, &engine.with_context(&goals, &constraints))?;

        if let RescheduleEvent::PriorityChange { task_id, priority, .. } = event {
            if let Some(mut task) = self.store.load_tasks()?.into_iter().find(|t| &t.id == task_id) {
                task.priority = *priority;
                self.store.save_task(&task)?;
            }
        }

        self.store.save_plan(outcome.plan())?;
        self.dispatch(outcome.plan());
        Ok(outcome)
    }

    /// Append a feedback record, fold it into the energy model, and mark
    /// the task as executed once actual times are known.
    pub fn record_feedback(&self, record: &SchedulingFeedback) -> Result<()> {
        self.store
            .append_feedback(record, self.config.learning.feedback_retention)?;

        if let Some(session) = SessionOutcome::from_feedback(record) {
            let mut model = self.energy_model()?;
            model.record_session(session);
            self.store.save_energy_patterns(model.patterns())?;
        }

        if let (Some(start), Some(end)) = (record.actual_start, record.actual_end) {
            let tasks = self.store.load_tasks()?;
            if let Some(mut task) = tasks.into_iter().find(|t| t.id == record.task_id) {
                task.actual_start = Some(start);
                task.actual_end = Some(end);
                task.completed = true;
                self.store.save_task(&task)?;
            }
        }
        debug!(task_id = %record.task_id, "recorded feedback");
        Ok(())
    }

    /// Hand focus blocks to the executor and, if enabled, the notifier.
    ///
    /// Both are fire-and-forget; failures are logged and skipped.
    pub fn dispatch(&self, plan: &DailyPlan) -> Dispatched {
        let mut dispatched = Dispatched::default();
        let lead_time = Duration::minutes(self.config.notifications.lead_minutes.max(0));

        for block in plan.blocks.iter().filter(|b| b.kind == BlockKind::Focus) {
            let Some(task) = block.task_id.as_deref().and_then(|id| plan.task(id)) else {
                continue;
            };
            if task.completed {
                continue;
            }

            let window = FocusWindow {
                task_id: task.id.clone(),
                start: block.start,
                end: block.end,
            };
            match self.focus_lock.schedule_focus(&window) {
                Ok(()) => dispatched.focus_windows.push(window),
                Err(e) => warn!(task_id = %task.id, error = %e, "focus executor rejected window"),
            }

            if !self.config.notifications.enabled {
                continue;
            }
            let request = NotificationRequest {
                task_title: task.title.clone(),
                block_start: block.start,
                lead_time,
            };
            match self.notifier.schedule(&request) {
                Ok(()) => dispatched.notifications.push(request),
                Err(e) => warn!(task_id = %task.id, error = %e, "notification not scheduled"),
            }
        }
        dispatched
    }
}

fn degrade(what: &str, error: &CoreError, warnings: &mut Vec<PlanWarning>) {
    warn!(collaborator = "store", error = %error, "{what} unavailable; planning without it");
    warnings.push(PlanWarning::CollaboratorUnavailable {
        collaborator: "store".to_string(),
        reason: format!("{what}: {error}"),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use crate::storage::SqliteStore;
    use crate::task::Task;

    struct DeniedCalendar;

    impl CalendarSource for DeniedCalendar {
        fn name(&self) -> &str {
            "denied"
        }

        fn fixed_blocks(&self, _date: NaiveDate) -> std::result::Result<Vec<crate::schedule::TimeBlock>, CollaboratorError> {
            Err(CollaboratorError::AccessDenied {
                collaborator: "denied".into(),
            })
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    #[test]
    fn calendar_failure_degrades_to_warning() {
        let store = SqliteStore::open_memory().unwrap();
        store.save_task(&Task::new("Write", 30).with_id("w")).unwrap();
        let service = PlanningService::new(store, DeniedCalendar, PlannerConfig::default());

        let outcome = service.plan_day(date()).unwrap();
        assert!(outcome.plan.block_for_task("w").is_some());
        assert!(matches!(
            outcome.warnings.first(),
            Some(PlanWarning::CollaboratorUnavailable { collaborator, .. }) if collaborator == "denied"
        ));
        assert!(service.store().load_plan(date()).unwrap().is_some());
    }

    #[test]
    fn planning_uses_only_retained_feedback() {
        let store = SqliteStore::open_memory().unwrap();
        let start = chrono::Utc::now();
        for id in ["a", "b", "c"] {
            let record = SchedulingFeedback::new(id, start, start + Duration::minutes(30));
            store.append_feedback(&record, 10).unwrap();
        }
        let mut config = PlannerConfig::default();
        config.learning.feedback_retention = 2;
        let service = PlanningService::new(store, crate::integrations::EmptyCalendar, config);

        let engine = service.engine(&mut Vec::new());
        let ids: Vec<&str> = engine.feedback().iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn reschedule_without_plan_is_not_found() {
        let store = SqliteStore::open_memory().unwrap();
        let service = PlanningService::new(store, crate::integrations::EmptyCalendar, PlannerConfig::default());
        let event = RescheduleEvent::Overtime {
            task_id: "x".into(),
            overtime_minutes: 10,
        };
        assert!(service.reschedule(date(), &event).is_err());
    }
}
