//! Schedule types: time blocks, plans, constraints and feedback records.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::ValidationError;
use crate::task::{EnergyLevel, Task};

/// Type of time block.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// Deep-work block for a focus-protected task
    Focus,
    /// Regular task block
    Task,
    /// Break block
    Break,
    /// Externally fixed meeting or calendar event
    Meeting,
}

/// A scheduled time interval, optionally tied to a task.
///
/// Blocks with `is_protected` set are never moved by optimization passes.
/// Externally fixed blocks (meetings) are always protected and carry no task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeBlock {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub task_id: Option<String>,
    pub kind: BlockKind,
    #[serde(default)]
    pub is_protected: bool,
    /// Energy level of the hour the block sits in, stamped by energy alignment
    #[serde(default)]
    pub energy_level: Option<EnergyLevel>,
    /// Break kept free after the block, in minutes
    #[serde(default)]
    pub break_buffer_minutes: i64,
    #[serde(default)]
    pub label: Option<String>,
}

impl TimeBlock {
    /// Block for a task, movable by later passes.
    pub fn for_task(task: &Task, start: DateTime<Utc>, end: DateTime<Utc>, break_buffer_minutes: i64) -> Self {
        Self {
            id: format!("block-{}", uuid::Uuid::new_v4()),
            start,
            end,
            task_id: Some(task.id.clone()),
            kind: if task.focus_protected {
                BlockKind::Focus
            } else {
                BlockKind::Task
            },
            is_protected: false,
            energy_level: None,
            break_buffer_minutes,
            label: Some(task.title.clone()),
        }
    }

    /// Externally fixed block such as a meeting.
    pub fn fixed(id: impl Into<String>, label: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            start,
            end,
            task_id: None,
            kind: BlockKind::Meeting,
            is_protected: true,
            energy_level: None,
            break_buffer_minutes: 0,
            label: Some(label.into()),
        }
    }

    /// Break block.
    pub fn break_block(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: format!("break-{}", uuid::Uuid::new_v4()),
            start,
            end,
            task_id: None,
            kind: BlockKind::Break,
            is_protected: false,
            energy_level: None,
            break_buffer_minutes: 0,
            label: Some("Break".to_string()),
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration().num_minutes()
    }

    /// End including the trailing break buffer.
    pub fn occupied_until(&self) -> DateTime<Utc> {
        self.end + Duration::minutes(self.break_buffer_minutes.max(0))
    }

    /// Check if this block overlaps a time range.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }

    pub fn overlaps_block(&self, other: &TimeBlock) -> bool {
        self.overlaps(other.start, other.end)
    }

    /// Move the block so it starts at `start`, keeping its duration.
    pub fn shift_to(&mut self, start: DateTime<Utc>) {
        let duration = self.duration();
        self.start = start;
        self.end = start + duration;
    }

    pub fn shift_by(&mut self, delta: Duration) {
        self.start += delta;
        self.end += delta;
    }

    pub fn start_hour(&self) -> u8 {
        self.start.hour() as u8
    }

    pub fn is_work(&self) -> bool {
        matches!(self.kind, BlockKind::Focus | BlockKind::Task)
    }

    /// Reject blocks whose end is not after their start.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.end <= self.start {
            return Err(ValidationError::InvalidTimeRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

/// Working-hours window for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PlanWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Build a window from `HH:MM` strings on `date`.
    ///
    /// An end time at or before the start time rolls over to the next day.
    pub fn for_date(date: NaiveDate, start_hhmm: &str, end_hhmm: &str) -> Result<Self, ValidationError> {
        let start_time = parse_hhmm(start_hhmm)?;
        let end_time = parse_hhmm(end_hhmm)?;
        let start = Utc.from_utc_datetime(&date.and_time(start_time));
        let mut end = Utc.from_utc_datetime(&date.and_time(end_time));
        if end <= start {
            end += Duration::days(1);
        }
        Self::new(start, end)
    }

    pub fn contains(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start >= self.start && end <= self.end
    }

    pub fn date(&self) -> NaiveDate {
        self.start.date_naive()
    }
}

/// Parse `HH:MM` into a time of day.
pub fn parse_hhmm(value: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|e| ValidationError::InvalidValue {
        field: "time".to_string(),
        message: format!("'{value}' is not HH:MM ({e})"),
    })
}

/// Kind of user- or policy-supplied scheduling constraint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ConstraintKind {
    /// Cumulative focus minutes per day
    MaxFocusTime,
    /// Minimum break minutes between blocks
    MinBreakTime,
    /// Energy match threshold below which blocks are relocated
    EnergyAlignment,
    /// Non-zero enables deadline escalation
    DeadlinePriority,
    /// Maximum share of the day one category may take
    CategoryBalance,
    /// Work hours per day
    MaxWorkHours,
}

/// A scheduling constraint: kind plus numeric value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulingConstraint {
    #[serde(default = "new_constraint_id")]
    pub id: String,
    pub kind: ConstraintKind,
    pub value: f64,
}

fn new_constraint_id() -> String {
    format!("constraint-{}", uuid::Uuid::new_v4())
}

impl SchedulingConstraint {
    pub fn new(kind: ConstraintKind, value: f64) -> Self {
        Self {
            id: new_constraint_id(),
            kind,
            value,
        }
    }

    /// Value of the last constraint of `kind`, if any.
    pub fn find(constraints: &[SchedulingConstraint], kind: ConstraintKind) -> Option<f64> {
        constraints
            .iter()
            .rev()
            .find(|c| c.kind == kind && c.value.is_finite())
            .map(|c| c.value)
    }
}

/// Planned vs actual record for one executed block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulingFeedback {
    pub task_id: String,
    pub planned_start: DateTime<Utc>,
    pub planned_end: DateTime<Utc>,
    #[serde(default)]
    pub actual_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_end: Option<DateTime<Utc>>,
    /// User rating 1-5
    #[serde(default)]
    pub rating: Option<u8>,
}

impl SchedulingFeedback {
    pub fn new(task_id: impl Into<String>, planned_start: DateTime<Utc>, planned_end: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.into(),
            planned_start,
            planned_end,
            actual_start: None,
            actual_end: None,
            rating: None,
        }
    }

    pub fn with_actual(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.actual_start = Some(start);
        self.actual_end = Some(end);
        self
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating.clamp(1, 5));
        self
    }

    pub fn planned_minutes(&self) -> i64 {
        (self.planned_end - self.planned_start).num_minutes()
    }

    pub fn actual_minutes(&self) -> Option<i64> {
        match (self.actual_start, self.actual_end) {
            (Some(s), Some(e)) => Some((e - s).num_minutes()),
            _ => None,
        }
    }

    /// min(planned, actual) / max(planned, actual), once the actual is known.
    pub fn accuracy(&self) -> Option<f64> {
        let planned = self.planned_minutes();
        let actual = self.actual_minutes()?;
        if planned <= 0 || actual <= 0 {
            return None;
        }
        Some(planned.min(actual) as f64 / planned.max(actual) as f64)
    }

    pub fn planned_hour(&self) -> u8 {
        self.planned_start.hour() as u8
    }
}

/// Append-only feedback log that keeps the most recent `capacity` records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackLog {
    capacity: usize,
    records: VecDeque<SchedulingFeedback>,
}

impl FeedbackLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: VecDeque::new(),
        }
    }

    pub fn from_records(capacity: usize, records: impl IntoIterator<Item = SchedulingFeedback>) -> Self {
        let mut log = Self::new(capacity);
        for record in records {
            log.append(record);
        }
        log
    }

    /// Append a record, evicting the oldest when full.
    pub fn append(&mut self, record: SchedulingFeedback) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchedulingFeedback> {
        self.records.iter()
    }

    pub fn to_vec(&self) -> Vec<SchedulingFeedback> {
        self.records.iter().cloned().collect()
    }
}

/// A finished plan for one date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyPlan {
    pub date: NaiveDate,
    /// Blocks ordered by start time
    pub blocks: Vec<TimeBlock>,
    /// Tasks referenced by the blocks
    pub tasks: Vec<Task>,
    pub productivity_score: f64,
    pub adherence_score: f64,
    pub completion_rate: f64,
    pub generated_at: DateTime<Utc>,
}

impl DailyPlan {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            blocks: Vec::new(),
            tasks: Vec::new(),
            productivity_score: 0.0,
            adherence_score: 0.0,
            completion_rate: 0.0,
            generated_at: Utc::now(),
        }
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn block_for_task(&self, task_id: &str) -> Option<&TimeBlock> {
        self.blocks
            .iter()
            .find(|b| b.task_id.as_deref() == Some(task_id))
    }

    /// Share of referenced tasks that are completed.
    pub fn compute_completion_rate(tasks: &[Task]) -> f64 {
        if tasks.is_empty() {
            return 0.0;
        }
        tasks.iter().filter(|t| t.completed).count() as f64 / tasks.len() as f64
    }

    /// Mean planned-vs-actual accuracy over tasks that have been executed.
    pub fn compute_adherence(blocks: &[TimeBlock], tasks: &[Task]) -> f64 {
        let scores: Vec<f64> = tasks
            .iter()
            .filter_map(|task| {
                let actual = task.actual_duration()?.num_minutes();
                let planned = blocks
                    .iter()
                    .find(|b| b.task_id.as_deref() == Some(task.id.as_str()))
                    .map(|b| b.duration_minutes())
                    .unwrap_or(task.estimated_minutes);
                if planned <= 0 || actual <= 0 {
                    return None;
                }
                Some(planned.min(actual) as f64 / planned.max(actual) as f64)
            })
            .collect();
        if scores.is_empty() {
            return 0.0;
        }
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

/// Sort blocks by start, then end.
pub fn sort_blocks(blocks: &mut [TimeBlock]) {
    blocks.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[test]
    fn window_rolls_over_midnight() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let window = PlanWindow::for_date(date, "22:00", "02:00").unwrap();
        assert_eq!((window.end - window.start).num_hours(), 4);
    }

    #[test]
    fn window_rejects_bad_time() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert!(PlanWindow::for_date(date, "8am", "20:00").is_err());
    }

    #[test]
    fn feedback_accuracy_is_symmetric() {
        let over = SchedulingFeedback::new("t", at(9, 0), at(10, 0)).with_actual(at(9, 0), at(11, 0));
        let under = SchedulingFeedback::new("t", at(9, 0), at(11, 0)).with_actual(at(9, 0), at(10, 0));
        assert_eq!(over.accuracy(), Some(0.5));
        assert_eq!(under.accuracy(), Some(0.5));
        assert_eq!(SchedulingFeedback::new("t", at(9, 0), at(10, 0)).accuracy(), None);
    }

    #[test]
    fn feedback_log_keeps_most_recent() {
        let mut log = FeedbackLog::new(2);
        for id in ["a", "b", "c"] {
            log.append(SchedulingFeedback::new(id, at(9, 0), at(10, 0)));
        }
        let ids: Vec<_> = log.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn block_validation_rejects_empty_range() {
        let block = TimeBlock::fixed("m", "Meeting", at(10, 0), at(10, 0));
        assert!(block.validate().is_err());
    }

    #[test]
    fn last_constraint_of_kind_wins() {
        let constraints = vec![
            SchedulingConstraint::new(ConstraintKind::MaxWorkHours, 8.0),
            SchedulingConstraint::new(ConstraintKind::MaxWorkHours, 6.0),
        ];
        assert_eq!(
            SchedulingConstraint::find(&constraints, ConstraintKind::MaxWorkHours),
            Some(6.0)
        );
        assert_eq!(
            SchedulingConstraint::find(&constraints, ConstraintKind::MinBreakTime),
            None
        );
    }
}
