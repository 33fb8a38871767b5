//! Task and goal types consumed by the planner.
//!
//! A task is the unit the placer turns into a time block. Its `priority` is
//! what the user set; `effective_priority` is what priority resolution
//! decided for the current plan and is recomputed on every run.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Task priority, ordered `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// All priorities from lowest to highest.
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];

    /// Ordinal value, 1 (low) to 4 (critical).
    pub fn ordinal(self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
            Priority::Critical => 4,
        }
    }

    /// Ordinal scaled into (0, 1].
    pub fn normalized(self) -> f64 {
        self.ordinal() as f64 / 4.0
    }

    /// One notch up, saturating at critical.
    pub fn raised(self) -> Priority {
        match self {
            Priority::Low => Priority::Medium,
            Priority::Medium => Priority::High,
            Priority::High | Priority::Critical => Priority::Critical,
        }
    }

    /// One notch down, saturating at low.
    pub fn lowered(self) -> Priority {
        match self {
            Priority::Critical => Priority::High,
            Priority::High => Priority::Medium,
            Priority::Medium | Priority::Low => Priority::Low,
        }
    }

    /// Raise to `floor` if currently below it.
    pub fn at_least(self, floor: Priority) -> Priority {
        self.max(floor)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" | "med" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" | "crit" => Ok(Priority::Critical),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// Energy level, used both for task preference and hourly patterns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    /// Low energy (e.g., end of day)
    Low,
    /// Medium energy (default)
    Medium,
    /// High energy
    High,
    /// Best hours of the day
    Peak,
}

impl EnergyLevel {
    /// Ordinal value, 1 (low) to 4 (peak).
    pub fn ordinal(self) -> u8 {
        match self {
            EnergyLevel::Low => 1,
            EnergyLevel::Medium => 2,
            EnergyLevel::High => 3,
            EnergyLevel::Peak => 4,
        }
    }

    /// Bucket a 0.0-1.0 energy score into a level.
    pub fn from_score(score: f64) -> EnergyLevel {
        if score < 0.35 {
            EnergyLevel::Low
        } else if score < 0.55 {
            EnergyLevel::Medium
        } else if score < 0.75 {
            EnergyLevel::High
        } else {
            EnergyLevel::Peak
        }
    }

    /// Representative score for a level (midpoint of its bucket).
    pub fn score(self) -> f64 {
        match self {
            EnergyLevel::Low => 0.2,
            EnergyLevel::Medium => 0.45,
            EnergyLevel::High => 0.65,
            EnergyLevel::Peak => 0.85,
        }
    }

    /// How well an hour at `available` suits a task wanting `self`.
    ///
    /// 1.0 on an exact match, otherwise `max(0, 1 - |diff| / 4)`.
    pub fn match_score(self, available: EnergyLevel) -> f64 {
        if self == available {
            return 1.0;
        }
        let diff = (self.ordinal() as f64 - available.ordinal() as f64).abs();
        (1.0 - diff / 4.0).max(0.0)
    }
}

impl Default for EnergyLevel {
    fn default() -> Self {
        EnergyLevel::Medium
    }
}

impl fmt::Display for EnergyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnergyLevel::Low => "low",
            EnergyLevel::Medium => "medium",
            EnergyLevel::High => "high",
            EnergyLevel::Peak => "peak",
        };
        f.write_str(s)
    }
}

impl FromStr for EnergyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(EnergyLevel::Low),
            "medium" | "med" => Ok(EnergyLevel::Medium),
            "high" => Ok(EnergyLevel::High),
            "peak" => Ok(EnergyLevel::Peak),
            other => Err(format!("unknown energy level '{other}'")),
        }
    }
}

/// A unit of work to be placed on the day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique identifier
    pub id: String,
    /// Task title
    pub title: String,
    /// Optional description, also used for goal keyword matching
    #[serde(default)]
    pub description: Option<String>,
    /// User-assigned priority
    pub priority: Priority,
    /// Priority decided by the last resolution pass
    #[serde(default)]
    pub effective_priority: Option<Priority>,
    /// Estimated duration in minutes
    pub estimated_minutes: i64,
    /// Hard deadline
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    /// Tasks that must finish before this one starts
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Preferred energy level for this kind of work
    #[serde(default)]
    pub preferred_energy: Option<EnergyLevel>,
    /// Deep-work task; gets a focus block and a trailing break
    #[serde(default)]
    pub focus_protected: bool,
    /// Complexity in [0, 1]
    #[serde(default)]
    pub complexity: f64,
    /// Category used for goal matching and balance constraints
    #[serde(default)]
    pub category: Option<String>,
    /// Explicitly linked goal
    #[serde(default)]
    pub goal_id: Option<String>,
    /// Whether the task is completed
    #[serde(default)]
    pub completed: bool,
    /// Deadline already passed when the plan window opened
    #[serde(default)]
    pub overdue: bool,
    /// Actual start, set after execution
    #[serde(default)]
    pub actual_start: Option<DateTime<Utc>>,
    /// Actual end, set after execution
    #[serde(default)]
    pub actual_end: Option<DateTime<Utc>>,
    /// Goal alignment in [0, 1], set by priority resolution
    #[serde(default)]
    pub goal_alignment: f64,
}

impl Task {
    /// Create a new task with default values and a generated id.
    pub fn new(title: impl Into<String>, estimated_minutes: i64) -> Self {
        Task {
            id: format!("task-{}", uuid::Uuid::new_v4()),
            title: title.into(),
            description: None,
            priority: Priority::Medium,
            effective_priority: None,
            estimated_minutes,
            deadline: None,
            dependencies: Vec::new(),
            preferred_energy: None,
            focus_protected: false,
            complexity: 0.5,
            category: None,
            goal_id: None,
            completed: false,
            overdue: false,
            actual_start: None,
            actual_end: None,
            goal_alignment: 0.0,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_energy(mut self, energy: EnergyLevel) -> Self {
        self.preferred_energy = Some(energy);
        self
    }

    pub fn with_complexity(mut self, complexity: f64) -> Self {
        self.complexity = complexity.clamp(0.0, 1.0);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn focus(mut self) -> Self {
        self.focus_protected = true;
        self
    }

    /// Priority used for placement: resolved if available, else user-set.
    pub fn current_priority(&self) -> Priority {
        self.effective_priority.unwrap_or(self.priority)
    }

    /// Estimated duration.
    pub fn estimated_duration(&self) -> Duration {
        Duration::minutes(self.estimated_minutes)
    }

    /// Actual duration once both timestamps are known.
    pub fn actual_duration(&self) -> Option<Duration> {
        match (self.actual_start, self.actual_end) {
            (Some(start), Some(end)) if end > start => Some(end - start),
            _ => None,
        }
    }

    /// Whether the deadline is before `reference`.
    pub fn is_past_deadline(&self, reference: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| d < reference)
    }

    /// Lowercased title + description, for keyword matching.
    pub fn text(&self) -> String {
        match &self.description {
            Some(desc) => format!("{} {}", self.title, desc).to_lowercase(),
            None => self.title.to_lowercase(),
        }
    }
}

/// A long-term goal that tasks can serve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    /// Progress in [0, 1]
    #[serde(default)]
    pub progress: f64,
}

impl Goal {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            category: None,
            deadline: None,
            progress: 0.0,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = progress.clamp(0.0, 1.0);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Finished goals no longer pull tasks up.
    pub fn is_active(&self) -> bool {
        self.progress < 1.0
    }

    /// Lowercased title + description, for keyword matching.
    pub fn text(&self) -> String {
        match &self.description {
            Some(desc) => format!("{} {}", self.title, desc).to_lowercase(),
            None => self.title.to_lowercase(),
        }
    }
}
