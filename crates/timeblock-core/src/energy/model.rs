//! Hourly energy patterns and the model that maintains them.
//!
//! Patterns start from a seeded default day curve and move toward observed
//! behaviour as sessions complete. They are never removed, only decayed
//! toward the seed or overwritten.

use serde::{Deserialize, Serialize};

use crate::schedule::SchedulingFeedback;
use crate::task::EnergyLevel;

/// Energy estimate for one hour of the day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnergyPattern {
    /// Hour of day (0-23)
    pub hour: u8,
    /// Bucketed energy level
    pub level: EnergyLevel,
    /// Running energy score (0.0-1.0) the level is derived from
    pub energy_score: f64,
    /// Confidence level (0.0-1.0)
    pub confidence: f64,
    /// Running task completion rate
    pub completion_rate: f64,
    /// Running focus-session success rate
    pub focus_success_rate: f64,
    /// Number of sessions observed at this hour
    pub sample_count: u64,
}

impl EnergyPattern {
    /// Seeded pattern for an hour before any observation.
    pub fn seeded(hour: u8) -> Self {
        let level = seed_level(hour);
        Self {
            hour,
            level,
            energy_score: level.score(),
            confidence: 0.0,
            completion_rate: 0.75,
            focus_success_rate: 1.0,
            sample_count: 0,
        }
    }

    /// Calculate confidence from sample count.
    pub fn calculate_confidence(sample_count: u64, min_samples: u64) -> f64 {
        match sample_count {
            0 => 0.0,
            1..=2 => 0.1,
            3..=5 => 0.3,
            6..=10 => 0.6,
            _ => {
                // Approaches 1.0 asymptotically
                let excess = sample_count.saturating_sub(min_samples) as f64;
                (0.8 + 0.2 * (1.0 - (-excess / 10.0).exp())).min(1.0)
            }
        }
    }
}

/// Default day curve: slow start, morning peak, post-lunch dip, evening fade.
fn seed_level(hour: u8) -> EnergyLevel {
    match hour {
        9..=11 => EnergyLevel::Peak,
        14..=16 => EnergyLevel::High,
        6..=8 | 12..=13 | 17..=19 => EnergyLevel::Medium,
        _ => EnergyLevel::Low,
    }
}

/// Outcome of one session, fed into the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOutcome {
    /// Hour the session started
    pub hour: u8,
    /// Planned duration in minutes
    pub expected_minutes: i64,
    /// Actual duration in minutes
    pub actual_minutes: i64,
    /// Whether the task got done
    pub completed: bool,
    /// Whether the focus session held without interruption
    pub focus_success: bool,
}

impl SessionOutcome {
    /// Session observed through a feedback record, once its actual times are known.
    ///
    /// The focus session counts as held when the estimate was accurate or the
    /// user rated it well.
    pub fn from_feedback(record: &SchedulingFeedback) -> Option<Self> {
        let actual = record.actual_minutes()?;
        let accurate = record.accuracy().is_some_and(|a| a >= 0.8);
        let rated_well = record.rating.is_some_and(|r| r >= 4);
        Some(Self {
            hour: record.planned_hour(),
            expected_minutes: record.planned_minutes(),
            actual_minutes: actual,
            completed: true,
            focus_success: accurate || rated_well,
        })
    }
}

/// Per-hour energy model.
///
/// Always holds one pattern per hour; deserialized input is routed through
/// [`EnergyModel::from_patterns`] so short or unordered lists are repaired.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "StoredEnergyModel")]
pub struct EnergyModel {
    patterns: Vec<EnergyPattern>,
    /// Minimum samples needed for high confidence
    pub min_samples_for_confidence: u64,
}

/// Serialized form of [`EnergyModel`] before the hours are filled in.
#[derive(Deserialize)]
struct StoredEnergyModel {
    #[serde(default)]
    patterns: Vec<EnergyPattern>,
    #[serde(default = "default_min_samples")]
    min_samples_for_confidence: u64,
}

fn default_min_samples() -> u64 {
    5
}

impl From<StoredEnergyModel> for EnergyModel {
    fn from(stored: StoredEnergyModel) -> Self {
        let mut model = Self::from_patterns(stored.patterns);
        model.min_samples_for_confidence = stored.min_samples_for_confidence;
        model
    }
}

impl Default for EnergyModel {
    fn default() -> Self {
        Self::new()
    }
}

impl EnergyModel {
    /// Create a model seeded with the default curve.
    pub fn new() -> Self {
        Self {
            patterns: (0..24).map(EnergyPattern::seeded).collect(),
            min_samples_for_confidence: default_min_samples(),
        }
    }

    /// Build from persisted patterns; missing hours fall back to the seed.
    pub fn from_patterns(patterns: impl IntoIterator<Item = EnergyPattern>) -> Self {
        let mut model = Self::new();
        for pattern in patterns {
            if pattern.hour < 24 {
                let hour = pattern.hour as usize;
                model.patterns[hour] = pattern;
            }
        }
        model
    }

    /// Rebuild from scratch out of the feedback log.
    pub fn from_feedback(history: &[SchedulingFeedback]) -> Self {
        let mut model = Self::new();
        for outcome in history.iter().filter_map(SessionOutcome::from_feedback) {
            model.record_session(outcome);
        }
        model
    }

    pub fn patterns(&self) -> &[EnergyPattern] {
        &self.patterns
    }

    /// Pattern for an hour (wraps past 23).
    pub fn pattern(&self, hour: u8) -> &EnergyPattern {
        &self.patterns[(hour % 24) as usize]
    }

    pub fn level_at(&self, hour: u8) -> EnergyLevel {
        self.pattern(hour).level
    }

    /// Fold one observed session into the pattern for its hour.
    pub fn record_session(&mut self, outcome: SessionOutcome) {
        let min_samples = self.min_samples_for_confidence;
        let pattern = &mut self.patterns[(outcome.hour % 24) as usize];
        pattern.sample_count += 1;
        let n = pattern.sample_count as f64;

        let completed = if outcome.completed { 1.0 } else { 0.0 };
        let focused = if outcome.focus_success { 1.0 } else { 0.0 };
        pattern.completion_rate += (completed - pattern.completion_rate) / n;
        pattern.focus_success_rate += (focused - pattern.focus_success_rate) / n;

        // Focus quality (actual / expected), capped at 1
        let quality = if outcome.expected_minutes > 0 {
            (outcome.actual_minutes.max(0) as f64 / outcome.expected_minutes as f64).min(1.0)
        } else {
            0.5
        };
        let session_energy = 0.6 * completed + 0.4 * quality;

        // The seed counts as one prior observation
        pattern.energy_score += (session_energy - pattern.energy_score) / (n + 1.0);
        pattern.level = EnergyLevel::from_score(pattern.energy_score);
        pattern.confidence = EnergyPattern::calculate_confidence(pattern.sample_count, min_samples);
    }

    /// Pull every pattern back toward its seed by `factor` (0 = reset, 1 = keep).
    pub fn decay(&mut self, factor: f64) {
        let factor = factor.clamp(0.0, 1.0);
        let min_samples = self.min_samples_for_confidence;
        for pattern in &mut self.patterns {
            let seed = EnergyPattern::seeded(pattern.hour);
            pattern.energy_score = seed.energy_score + (pattern.energy_score - seed.energy_score) * factor;
            pattern.level = EnergyLevel::from_score(pattern.energy_score);
            pattern.sample_count = (pattern.sample_count as f64 * factor).floor() as u64;
            pattern.confidence = EnergyPattern::calculate_confidence(pattern.sample_count, min_samples);
        }
    }

    /// Hours at or above `min_level`.
    pub fn recommended_hours(&self, min_level: EnergyLevel) -> Vec<u8> {
        self.patterns
            .iter()
            .filter(|p| p.level >= min_level)
            .map(|p| p.hour)
            .collect()
    }

    /// Render the model as an ASCII chart.
    pub fn render_ascii_chart(&self) -> String {
        let mut output = String::from("\nEnergy by hour:\n");
        output.push_str(&"─".repeat(50));
        output.push('\n');

        for pattern in &self.patterns {
            let bar_length = ((pattern.energy_score * 30.0) as usize).min(30);
            let bar = "█".repeat(bar_length);
            let empty = " ".repeat(30 - bar_length);

            let conf_indicator = if pattern.confidence >= 0.6 {
                "●"
            } else if pattern.confidence >= 0.3 {
                "○"
            } else {
                "·"
            };

            output.push_str(&format!(
                "{:02}:00 {}{}{} {:<6} {:.0}%\n",
                pattern.hour,
                bar,
                empty,
                conf_indicator,
                pattern.level.to_string(),
                pattern.energy_score * 100.0
            ));
        }

        output.push_str(&"─".repeat(50));
        output.push_str("\n● High conf  ○ Medium  · Low\n");
        output
    }
}
