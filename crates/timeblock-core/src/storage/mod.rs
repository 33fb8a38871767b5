mod config;
pub mod sqlite;

pub use config::{
    ConstraintConfig, EnergyConfig, LearningConfig, NotificationsConfig, PlacementConfig,
    PlannerConfig, RepairConfig, RescheduleConfig, WindowConfig,
};
pub use sqlite::SqliteStore;

use chrono::NaiveDate;
use std::path::PathBuf;

use crate::energy::EnergyPattern;
use crate::error::{ConfigError, Result};
use crate::schedule::{DailyPlan, SchedulingConstraint, SchedulingFeedback};
use crate::task::{Goal, Task};

/// Returns the data directory.
///
/// `TIMEBLOCK_DATA_DIR` overrides the location entirely. Otherwise
/// `~/.config/timeblock[-dev]/`, where `TIMEBLOCK_ENV=dev` selects the
/// development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("TIMEBLOCK_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("TIMEBLOCK_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("timeblock-dev")
            } else {
                base_dir.join("timeblock")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDirUnavailable(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

/// Persistence collaborator.
///
/// The planner never touches storage; callers load snapshots through this
/// trait before planning and save the result afterwards. Saving a plan for
/// a date replaces whatever was stored for that date.
pub trait PlanStore {
    fn load_tasks(&self) -> Result<Vec<Task>>;
    fn save_task(&self, task: &Task) -> Result<()>;

    fn load_goals(&self) -> Result<Vec<Goal>>;
    fn save_goal(&self, goal: &Goal) -> Result<()>;

    fn load_constraints(&self) -> Result<Vec<SchedulingConstraint>>;
    fn save_constraint(&self, constraint: &SchedulingConstraint) -> Result<()>;

    /// Feedback records, oldest to newest.
    fn load_feedback(&self) -> Result<Vec<SchedulingFeedback>>;
    /// Append a record, trimming the log to `retention` entries.
    fn append_feedback(&self, record: &SchedulingFeedback, retention: usize) -> Result<()>;

    fn load_plan(&self, date: NaiveDate) -> Result<Option<DailyPlan>>;
    fn save_plan(&self, plan: &DailyPlan) -> Result<()>;

    fn load_energy_patterns(&self) -> Result<Vec<EnergyPattern>>;
    fn save_energy_patterns(&self, patterns: &[EnergyPattern]) -> Result<()>;

    fn save_tasks(&self, tasks: &[Task]) -> Result<()> {
        for task in tasks {
            self.save_task(task)?;
        }
        Ok(())
    }
}
