//! Collaborators that sit outside the planning pipeline.
//!
//! The planner never talks to calendars, focus enforcement or notification
//! systems directly. [`crate::service::PlanningService`] reads fixed blocks
//! from a [`CalendarSource`] before planning and hands focus windows and
//! reminders to the executor and scheduler afterwards.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::schedule::TimeBlock;

/// Read-only source of calendar obligations for a date.
///
/// Returned blocks are treated as protected. Failures are not fatal: the
/// service logs them and plans with no fixed blocks.
pub trait CalendarSource {
    /// Unique identifier (e.g. "google", "ics").
    fn name(&self) -> &str;

    fn fixed_blocks(&self, date: NaiveDate) -> Result<Vec<TimeBlock>, CollaboratorError>;
}

/// Interval during which focus enforcement should be active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusWindow {
    pub task_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Receives focus-protected block boundaries. Enforcement is its business.
pub trait FocusLockExecutor {
    fn schedule_focus(&self, window: &FocusWindow) -> Result<(), CollaboratorError>;
}

/// Reminder for an upcoming focus block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub task_title: String,
    pub block_start: DateTime<Utc>,
    /// How long before `block_start` to notify
    #[serde(with = "minutes")]
    pub lead_time: Duration,
}

impl NotificationRequest {
    pub fn fire_at(&self) -> DateTime<Utc> {
        self.block_start - self.lead_time
    }
}

/// Fire-and-forget notification sink.
pub trait NotificationScheduler {
    fn schedule(&self, request: &NotificationRequest) -> Result<(), CollaboratorError>;
}

/// Calendar source with nothing on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCalendar;

impl CalendarSource for EmptyCalendar {
    fn name(&self) -> &str {
        "none"
    }

    fn fixed_blocks(&self, _date: NaiveDate) -> Result<Vec<TimeBlock>, CollaboratorError> {
        Ok(Vec::new())
    }
}

/// Executor and scheduler that drop everything they are given.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl FocusLockExecutor for NoopSink {
    fn schedule_focus(&self, _window: &FocusWindow) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

impl NotificationScheduler for NoopSink {
    fn schedule(&self, _request: &NotificationRequest) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// Serialize a [`Duration`] as whole minutes.
mod minutes {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_minutes())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::minutes(i64::deserialize(deserializer)?))
    }
}
