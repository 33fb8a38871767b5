//! # Timeblock Core Library
//!
//! Turns tasks, goals, calendar obligations and past performance into a
//! conflict-free daily schedule, then keeps that schedule coherent as the
//! day drifts from plan. The `timeblock` CLI is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Planner**: a pure pipeline (`generate_daily_plan`) from a snapshot of
//!   inputs to a scored [`DailyPlan`]
//! - **Rescheduler**: incremental repair for overtime and priority edits
//! - **Storage**: SQLite-backed [`PlanStore`] and TOML configuration
//! - **Integrations**: collaborator traits for calendars, focus enforcement
//!   and notifications
//!
//! ## Key Components
//!
//! - [`PlannerEngine`]: pipeline orchestration
//! - [`Placer`] and [`ConstraintSolver`]: placement and hard constraints
//! - [`EnergyModel`] and [`EnergyOptimizer`]: per-hour energy estimates
//! - [`AdaptiveLearner`]: duration corrections from feedback
//! - [`AnomalyDetector`] and [`RepairLoop`]: residual problem detection
//! - [`ReschedulingEngine`]: live event handling
//! - [`PlanScorer`]: plan quality

pub mod anomaly;
pub mod energy;
pub mod error;
pub mod integrations;
pub mod learning;
pub mod planner;
pub mod priority;
pub mod reschedule;
pub mod schedule;
pub mod scheduler;
pub mod scoring;
pub mod service;
pub mod storage;
pub mod task;

pub use anomaly::{Anomaly, AnomalyDetector, AnomalyKind, RepairLoop, RepairOutcome};
pub use energy::{EnergyModel, EnergyOptimizer, EnergyPattern, SessionOutcome};
pub use error::{CollaboratorError, ConfigError, CoreError, DatabaseError, PlanWarning, ValidationError};
pub use integrations::{CalendarSource, FocusLockExecutor, FocusWindow, NotificationRequest, NotificationScheduler};
pub use learning::{AdaptiveLearner, LearningInsights};
pub use planner::{PlanContext, PlanOutcome, PlannerEngine, PlanningInput};
pub use priority::PriorityResolver;
pub use reschedule::{
    RescheduleEvent, RescheduleOutcome, RescheduleState, RescheduleStrategy, Replanner, ReschedulingEngine,
};
pub use schedule::{
    BlockKind, ConstraintKind, DailyPlan, PlanWindow, SchedulingConstraint, SchedulingFeedback, TimeBlock,
};
pub use scheduler::{ConstraintSolver, Placer};
pub use scoring::{PlanScorer, ScoreBreakdown};
pub use service::PlanningService;
pub use storage::{PlanStore, PlannerConfig, SqliteStore};
pub use task::{EnergyLevel, Goal, Priority, Task};
