//! TOML-based planner configuration.
//!
//! Holds the policy defaults every pipeline stage reads: working window,
//! buffers, thresholds, iteration caps. Per-day scheduling constraints are
//! inputs to the planner and live in the store, not here.
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::{ConfigError, CoreError, Result};
use crate::task::Priority;

/// Working-hours window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowConfig {
    /// Window start, HH:MM
    #[serde(default = "default_window_start")]
    pub start: String,
    /// Window end, HH:MM
    #[serde(default = "default_window_end")]
    pub end: String,
}

/// Initial placement settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacementConfig {
    /// Buffer kept after each task block
    #[serde(default = "default_break_buffer")]
    pub break_buffer_minutes: i64,
    /// Explicit break inserted after a focus-protected task
    #[serde(default = "default_focus_break")]
    pub focus_break_minutes: i64,
    /// Cap on slot-search steps per task
    #[serde(default = "default_slot_iterations")]
    pub slot_search_max_iterations: u32,
}

/// Hard-constraint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstraintConfig {
    /// Shortest allowed focus block
    #[serde(default = "default_min_focus")]
    pub min_focus_minutes: i64,
    /// Gap between a dependency's end and its dependent's start
    #[serde(default = "default_dependency_gap")]
    pub dependency_gap_minutes: i64,
}

/// Energy alignment settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnergyConfig {
    /// Blocks matching worse than this are candidates for relocation
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    /// Patterns below this confidence are not trusted for relocation
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Hours searched on each side of the current slot
    #[serde(default = "default_search_radius")]
    pub search_radius_hours: i64,
}

/// Adaptive learning settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearningConfig {
    /// Average accuracy below which blocks get a buffer
    #[serde(default = "default_accuracy_threshold")]
    pub accuracy_threshold: f64,
    /// Share of the estimated shortfall added as buffer
    #[serde(default = "default_extension_factor")]
    pub extension_factor: f64,
    /// Feedback records kept
    #[serde(default = "default_feedback_retention")]
    pub feedback_retention: usize,
}

/// Anomaly repair settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepairConfig {
    /// Detect/repair passes before giving up
    #[serde(default = "default_repair_passes")]
    pub max_passes: u32,
}

/// Rescheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RescheduleConfig {
    /// Overtime above this escalates to a full replan
    #[serde(default = "default_escalation_minutes")]
    pub escalation_minutes: i64,
    /// Priority changes crossing this level trigger a replan
    #[serde(default = "default_replan_threshold")]
    pub replan_threshold: Priority,
}

/// Focus-block notification settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_lead_minutes")]
    pub lead_minutes: i64,
}

/// Planner configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PlannerConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub constraints: ConstraintConfig,
    #[serde(default)]
    pub energy: EnergyConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub repair: RepairConfig,
    #[serde(default)]
    pub reschedule: RescheduleConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

// Default functions
fn default_window_start() -> String {
    "08:00".into()
}
fn default_window_end() -> String {
    "20:00".into()
}
fn default_break_buffer() -> i64 {
    5
}
fn default_focus_break() -> i64 {
    15
}
fn default_slot_iterations() -> u32 {
    1440
}
fn default_min_focus() -> i64 {
    30
}
fn default_dependency_gap() -> i64 {
    5
}
fn default_match_threshold() -> f64 {
    0.6
}
fn default_confidence_threshold() -> f64 {
    0.5
}
fn default_search_radius() -> i64 {
    3
}
fn default_accuracy_threshold() -> f64 {
    0.8
}
fn default_extension_factor() -> f64 {
    0.5
}
fn default_feedback_retention() -> usize {
    500
}
fn default_repair_passes() -> u32 {
    3
}
fn default_escalation_minutes() -> i64 {
    60
}
fn default_replan_threshold() -> Priority {
    Priority::High
}
fn default_true() -> bool {
    true
}
fn default_lead_minutes() -> i64 {
    10
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            start: default_window_start(),
            end: default_window_end(),
        }
    }
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            break_buffer_minutes: default_break_buffer(),
            focus_break_minutes: default_focus_break(),
            slot_search_max_iterations: default_slot_iterations(),
        }
    }
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            min_focus_minutes: default_min_focus(),
            dependency_gap_minutes: default_dependency_gap(),
        }
    }
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            confidence_threshold: default_confidence_threshold(),
            search_radius_hours: default_search_radius(),
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            accuracy_threshold: default_accuracy_threshold(),
            extension_factor: default_extension_factor(),
            feedback_retention: default_feedback_retention(),
        }
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_passes: default_repair_passes(),
        }
    }
}

impl Default for RescheduleConfig {
    fn default() -> Self {
        Self {
            escalation_minutes: default_escalation_minutes(),
            replan_threshold: default_replan_threshold(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lead_minutes: default_lead_minutes(),
        }
    }
}

impl PlannerConfig {
    /// Default location of the config file.
    pub fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if missing.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
                .into()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
            .into()),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Check values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };
        if self.repair.max_passes == 0 {
            return Err(invalid("repair.max_passes", "must be at least 1"));
        }
        if self.placement.slot_search_max_iterations == 0 {
            return Err(invalid("placement.slot_search_max_iterations", "must be at least 1"));
        }
        if self.placement.break_buffer_minutes < 0 || self.placement.focus_break_minutes < 0 {
            return Err(invalid("placement", "break lengths cannot be negative"));
        }
        if self.constraints.min_focus_minutes < 0 || self.constraints.dependency_gap_minutes < 0 {
            return Err(invalid("constraints", "minutes cannot be negative"));
        }
        if !(0.0..=1.0).contains(&self.energy.match_threshold) {
            return Err(invalid("energy.match_threshold", "must be within 0.0-1.0"));
        }
        if self.energy.search_radius_hours < 0 {
            return Err(invalid("energy.search_radius_hours", "cannot be negative"));
        }
        if self.learning.feedback_retention == 0 {
            return Err(invalid("learning.feedback_retention", "must be at least 1"));
        }
        crate::schedule::parse_hhmm(&self.window.start)
            .map_err(|e| invalid("window.start", &e.to_string()))?;
        crate::schedule::parse_hhmm(&self.window.end)
            .map_err(|e| invalid("window.end", &e.to_string()))?;
        Ok(())
    }

    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let bad_value = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| bad_value(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| bad_value(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(bad_value(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| bad_value(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key without saving.
    ///
    /// The updated config is validated before it replaces `self`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: PlannerConfig = serde_json::from_value(json).map_err(|e| {
            CoreError::Config(ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = PlannerConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: PlannerConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: PlannerConfig = toml::from_str("[window]\nstart = \"09:30\"\n").unwrap();
        assert_eq!(parsed.window.start, "09:30");
        assert_eq!(parsed.window.end, "20:00");
        assert_eq!(parsed.repair.max_passes, 3);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = PlannerConfig::default();
        assert_eq!(cfg.get("window.start").as_deref(), Some("08:00"));
        assert_eq!(cfg.get("constraints.min_focus_minutes").as_deref(), Some("30"));
        assert_eq!(cfg.get("reschedule.replan_threshold").as_deref(), Some("high"));
        assert!(cfg.get("window.missing").is_none());
    }

    #[test]
    fn set_updates_number_and_float() {
        let mut cfg = PlannerConfig::default();
        cfg.set("repair.max_passes", "5").unwrap();
        cfg.set("energy.match_threshold", "0.7").unwrap();
        assert_eq!(cfg.repair.max_passes, 5);
        assert_eq!(cfg.energy.match_threshold, 0.7);
    }

    #[test]
    fn set_rejects_unknown_key_and_invalid_values() {
        let mut cfg = PlannerConfig::default();
        assert!(cfg.set("window.nonexistent", "x").is_err());
        assert!(cfg.set("notifications.enabled", "maybe").is_err());
        assert!(cfg.set("repair.max_passes", "0").is_err());
        assert!(cfg.set("window.start", "noon").is_err());
        assert_eq!(cfg, PlannerConfig::default());
    }

    #[test]
    fn load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = PlannerConfig::load_from(&path).unwrap();
        assert_eq!(cfg, PlannerConfig::default());
        assert!(path.exists());

        let mut changed = cfg.clone();
        changed.set("window.end", "18:00").unwrap();
        changed.save_to(&path).unwrap();
        assert_eq!(PlannerConfig::load_from(&path).unwrap().window.end, "18:00");
    }
}
