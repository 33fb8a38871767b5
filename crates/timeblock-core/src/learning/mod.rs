//! Adaptive learning from planned-vs-actual feedback.
//!
//! Feedback records are folded into per-hour accuracy, per-priority median
//! durations and day-level multipliers. Blocks at hours where estimates have
//! historically run short get a bounded buffer appended to their end.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::schedule::{SchedulingFeedback, TimeBlock};
use crate::scheduler::task_index;
use crate::storage::LearningConfig;
use crate::task::{Priority, Task};

/// Accuracy at or above which an hour counts as a best hour.
const BEST_HOUR_ACCURACY: f64 = 0.9;
/// Records needed before an hour can be a best hour.
const BEST_HOUR_MIN_RECORDS: usize = 3;
/// Accuracy below which an hour counts as a conflict hour.
const CONFLICT_ACCURACY: f64 = 0.6;
/// Mean rating at or below which an hour counts as a conflict hour.
const CONFLICT_RATING: f64 = 2.0;
/// Fallback extensions never exceed this share of the block.
const MAX_FALLBACK_SHARE: f64 = 0.25;
/// Weight applied when most planned tasks are high or critical.
const HIGH_PRIORITY_DAY_WEIGHT: f64 = 1.1;

/// Duration inflation by month (January first). Summer and December slip more.
const SEASONAL_TABLE: [f64; 12] = [1.0, 1.0, 1.0, 1.0, 1.0, 1.05, 1.1, 1.1, 1.0, 1.0, 1.0, 1.1];

/// Aggregated feedback for one hour of the day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HourStats {
    pub records: usize,
    pub mean_accuracy: f64,
    #[serde(default)]
    pub mean_rating: Option<f64>,
}

/// Statistics derived from a feedback history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    /// Hour of day -> accuracy and rating aggregates
    pub hours: BTreeMap<u8, HourStats>,
    /// Median actual minutes per priority
    pub priority_medians: BTreeMap<Priority, i64>,
    /// Monday-first multipliers, clamped to 0.8-1.2
    pub weekday_multipliers: [f64; 7],
}

impl LearningStats {
    /// Fold `history` into statistics. `tasks` resolves priorities for medians.
    pub fn from_feedback(history: &[SchedulingFeedback], tasks: &[Task]) -> Self {
        let index = task_index(tasks);

        let mut hour_acc: BTreeMap<u8, Vec<f64>> = BTreeMap::new();
        let mut hour_ratings: HashMap<u8, Vec<u8>> = HashMap::new();
        let mut weekday_acc: [Vec<f64>; 7] = Default::default();
        let mut durations: BTreeMap<Priority, Vec<i64>> = BTreeMap::new();

        for record in history {
            let hour = record.planned_hour();
            if let Some(rating) = record.rating {
                hour_ratings.entry(hour).or_default().push(rating);
            }
            let Some(accuracy) = record.accuracy() else {
                continue;
            };
            hour_acc.entry(hour).or_default().push(accuracy);
            let weekday = record.planned_start.weekday().num_days_from_monday() as usize;
            weekday_acc[weekday].push(accuracy);

            if let (Some(task), Some(actual)) = (index.get(record.task_id.as_str()), record.actual_minutes()) {
                durations.entry(task.current_priority()).or_default().push(actual);
            }
        }

        let mut hours = BTreeMap::new();
        for hour in hour_acc.keys().chain(hour_ratings.keys()).copied() {
            let accuracies = hour_acc.get(&hour).map(Vec::as_slice).unwrap_or_default();
            let ratings = hour_ratings.get(&hour).map(Vec::as_slice).unwrap_or_default();
            hours.insert(
                hour,
                HourStats {
                    records: accuracies.len(),
                    mean_accuracy: mean(accuracies).unwrap_or(0.0),
                    mean_rating: mean(&ratings.iter().map(|r| *r as f64).collect::<Vec<_>>()),
                },
            );
        }

        let overall = mean(&weekday_acc.iter().flatten().copied().collect::<Vec<_>>());
        let mut weekday_multipliers = [1.0; 7];
        if let Some(overall) = overall {
            for (day, accuracies) in weekday_acc.iter().enumerate() {
                if let Some(day_mean) = mean(accuracies).filter(|m| *m > 0.0) {
                    weekday_multipliers[day] = (overall / day_mean).clamp(0.8, 1.2);
                }
            }
        }

        let priority_medians = durations
            .into_iter()
            .map(|(priority, mut values)| (priority, median(&mut values)))
            .collect();

        Self {
            hours,
            priority_medians,
            weekday_multipliers,
        }
    }

    pub fn weekday_multiplier(&self, date: NaiveDate) -> f64 {
        self.weekday_multipliers[date.weekday().num_days_from_monday() as usize]
    }
}

/// Hours and multipliers worth surfacing to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningInsights {
    /// Hours where estimates hold (accuracy >= 0.9 over 3+ records)
    pub best_hours: Vec<u8>,
    /// Hours where estimates fail or ratings are poor
    pub conflict_hours: Vec<u8>,
    pub priority_medians: BTreeMap<Priority, i64>,
    pub weekday_multiplier: f64,
    pub seasonal_multiplier: f64,
    pub high_priority_weight: f64,
    /// Product of the three day-level multipliers
    pub date_multiplier: f64,
}

/// Applies feedback-derived corrections to blocks.
#[derive(Debug, Clone)]
pub struct AdaptiveLearner {
    accuracy_threshold: f64,
    extension_factor: f64,
}

impl Default for AdaptiveLearner {
    fn default() -> Self {
        Self::new(&LearningConfig::default())
    }
}

impl AdaptiveLearner {
    pub fn new(config: &LearningConfig) -> Self {
        Self {
            accuracy_threshold: config.accuracy_threshold,
            extension_factor: config.extension_factor.max(0.0),
        }
    }

    /// Summarize `history` for the plan date.
    pub fn insights(&self, history: &[SchedulingFeedback], tasks: &[Task], date: NaiveDate) -> LearningInsights {
        let stats = LearningStats::from_feedback(history, tasks);
        self.insights_from(&stats, tasks, date)
    }

    fn insights_from(&self, stats: &LearningStats, tasks: &[Task], date: NaiveDate) -> LearningInsights {
        let best_hours = stats
            .hours
            .iter()
            .filter(|(_, s)| s.records >= BEST_HOUR_MIN_RECORDS && s.mean_accuracy >= BEST_HOUR_ACCURACY)
            .map(|(h, _)| *h)
            .collect();
        let conflict_hours = stats
            .hours
            .iter()
            .filter(|(_, s)| {
                (s.records > 0 && s.mean_accuracy < CONFLICT_ACCURACY)
                    || s.mean_rating.is_some_and(|r| r <= CONFLICT_RATING)
            })
            .map(|(h, _)| *h)
            .collect();

        let weekday_multiplier = stats.weekday_multiplier(date);
        let seasonal_multiplier = seasonal_multiplier(date);
        let high_priority_weight = high_priority_weight(tasks);

        LearningInsights {
            best_hours,
            conflict_hours,
            priority_medians: stats.priority_medians.clone(),
            weekday_multiplier,
            seasonal_multiplier,
            high_priority_weight,
            date_multiplier: weekday_multiplier * seasonal_multiplier * high_priority_weight,
        }
    }

    /// Extend blocks whose hour has a record of running over.
    ///
    /// With feedback at the block's hour (same task preferred, otherwise any
    /// task) and mean accuracy under the threshold, the block grows by
    /// `duration * (1 - accuracy) * factor`. Without hour feedback, a block
    /// shorter than the median actual duration for its priority grows by at
    /// most a quarter of its length. Protected blocks and blocks of completed
    /// tasks are left alone.
    pub fn apply_learning(
        &self,
        blocks: &[TimeBlock],
        tasks: &[Task],
        history: &[SchedulingFeedback],
        date: NaiveDate,
    ) -> Vec<TimeBlock> {
        let mut out = blocks.to_vec();
        if history.is_empty() {
            return out;
        }

        let index = task_index(tasks);
        let stats = LearningStats::from_feedback(history, tasks);
        let date_multiplier = self.insights_from(&stats, tasks, date).date_multiplier;

        for block in out.iter_mut() {
            if block.is_protected || !block.is_work() {
                continue;
            }
            let Some(task) = block.task_id.as_deref().and_then(|id| index.get(id).copied()) else {
                continue;
            };
            if task.completed {
                continue;
            }

            let minutes = block.duration_minutes() as f64;
            let hour = block.start_hour();
            let mut own = Vec::new();
            let mut any = Vec::new();
            for record in history.iter().filter(|r| r.planned_hour() == hour) {
                if let Some(accuracy) = record.accuracy() {
                    if record.task_id == task.id {
                        own.push(accuracy);
                    }
                    any.push(accuracy);
                }
            }
            let relevant = if own.is_empty() { any } else { own };

            let extension = match mean(&relevant) {
                Some(accuracy) if accuracy < self.accuracy_threshold => {
                    minutes * (1.0 - accuracy) * self.extension_factor
                }
                Some(_) => 0.0,
                None => match stats.priority_medians.get(&task.current_priority()) {
                    Some(&typical) if typical as f64 > minutes => ((typical as f64 - minutes)
                        * self.extension_factor
                        * date_multiplier)
                        .min(minutes * MAX_FALLBACK_SHARE),
                    _ => 0.0,
                },
            };

            let extension = extension.round() as i64;
            if extension > 0 {
                debug!(task_id = %task.id, hour, extension, "extended block from feedback");
                block.end += Duration::minutes(extension);
            }
        }
        out
    }
}

pub fn seasonal_multiplier(date: NaiveDate) -> f64 {
    SEASONAL_TABLE[date.month0() as usize]
}

/// 1.1 when at least half of the open tasks are high or critical.
fn high_priority_weight(tasks: &[Task]) -> f64 {
    let open: Vec<&Task> = tasks.iter().filter(|t| !t.completed).collect();
    if open.is_empty() {
        return 1.0;
    }
    let high = open
        .iter()
        .filter(|t| t.current_priority() >= Priority::High)
        .count();
    if high * 2 >= open.len() {
        HIGH_PRIORITY_DAY_WEIGHT
    } else {
        1.0
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn median(values: &mut [i64]) -> i64 {
    values.sort_unstable();
    let len = values.len();
    if len == 0 {
        0
    } else if len % 2 == 1 {
        values[len / 2]
    } else {
        (values[len / 2 - 1] + values[len / 2]) / 2
    }
}
