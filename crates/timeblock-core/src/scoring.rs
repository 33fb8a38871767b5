//! Plan quality scoring.
//!
//! A finished plan is scored as a weighted sum of five terms, each in [0, 1]:
//!
//! | Term | Weight | Score |
//! |------|--------|-------|
//! | focus | 0.3 | focus hours / 6, capped at 1 |
//! | completion | 0.2 | completed / referenced tasks |
//! | energy | 0.2 | mean energy match of blocks with a preference |
//! | priority | 0.2 | mean normalized priority of scheduled tasks |
//! | breaks | 0.1 | `1 - 5 * |break/work - 0.175|`, floored at 0 |
//!
//! The score is reported with the plan and used to compare a replan with
//! the plan it replaces.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::schedule::{BlockKind, DailyPlan};

/// Individual objective term with weight and score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveTerm {
    /// Term name
    pub name: String,
    /// Weight for this term (0.0 to 1.0)
    pub weight: f64,
    /// Raw score (0.0 to 1.0, higher is better)
    pub score: f64,
    /// Weighted contribution
    pub contribution: f64,
}

impl ObjectiveTerm {
    pub fn new(name: impl Into<String>, weight: f64, score: f64) -> Self {
        let weight = weight.clamp(0.0, 1.0);
        let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            name: name.into(),
            weight,
            score,
            contribution: weight * score,
        }
    }
}

/// Complete scoring breakdown for explainability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub terms: Vec<ObjectiveTerm>,
    /// Total weighted score (0.0 to 1.0)
    pub total_score: f64,
}

impl ScoreBreakdown {
    fn from_terms(terms: Vec<ObjectiveTerm>) -> Self {
        let total: f64 = terms.iter().map(|t| t.contribution).sum();
        Self {
            terms,
            total_score: total.clamp(0.0, 1.0),
        }
    }

    pub fn term(&self, name: &str) -> Option<&ObjectiveTerm> {
        self.terms.iter().find(|t| t.name == name)
    }
}

/// Weights for each objective term
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub focus: f64,
    pub completion: f64,
    pub energy: f64,
    pub priority: f64,
    pub breaks: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            focus: 0.3,
            completion: 0.2,
            energy: 0.2,
            priority: 0.2,
            breaks: 0.1,
        }
    }
}

/// Scores finished plans.
#[derive(Debug, Clone)]
pub struct PlanScorer {
    weights: ScoreWeights,
    /// Focus hours that earn the full focus term
    focus_target_hours: f64,
    ideal_break_ratio: f64,
}

impl Default for PlanScorer {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            focus_target_hours: 6.0,
            ideal_break_ratio: 0.175,
        }
    }
}

impl PlanScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self {
            weights,
            ..Self::default()
        }
    }

    /// Productivity score in [0, 1]. The empty plan scores 0.
    pub fn score(&self, plan: &DailyPlan) -> f64 {
        self.breakdown(plan).total_score
    }

    pub fn breakdown(&self, plan: &DailyPlan) -> ScoreBreakdown {
        let w = &self.weights;
        ScoreBreakdown::from_terms(vec![
            ObjectiveTerm::new("focus", w.focus, self.focus_score(plan)),
            ObjectiveTerm::new(
                "completion",
                w.completion,
                DailyPlan::compute_completion_rate(&plan.tasks),
            ),
            ObjectiveTerm::new("energy", w.energy, energy_score(plan)),
            ObjectiveTerm::new("priority", w.priority, priority_score(plan)),
            ObjectiveTerm::new("breaks", w.breaks, self.break_score(plan)),
        ])
    }

    fn focus_score(&self, plan: &DailyPlan) -> f64 {
        let focus_minutes: i64 = plan
            .blocks
            .iter()
            .filter(|b| b.kind == BlockKind::Focus)
            .map(|b| b.duration_minutes().max(0))
            .sum();
        (focus_minutes as f64 / 60.0 / self.focus_target_hours).min(1.0)
    }

    /// Break blocks and trailing buffers count as break time.
    fn break_score(&self, plan: &DailyPlan) -> f64 {
        let mut work = 0i64;
        let mut rest = 0i64;
        for block in &plan.blocks {
            match block.kind {
                BlockKind::Break => rest += block.duration_minutes().max(0),
                BlockKind::Focus | BlockKind::Task => {
                    work += block.duration_minutes().max(0);
                    rest += block.break_buffer_minutes.max(0);
                }
                BlockKind::Meeting => {}
            }
        }
        if work == 0 {
            return 0.0;
        }
        let ratio = rest as f64 / work as f64;
        (1.0 - (ratio - self.ideal_break_ratio).abs() * 5.0).max(0.0)
    }
}

fn energy_score(plan: &DailyPlan) -> f64 {
    let matches: Vec<f64> = plan
        .blocks
        .iter()
        .filter_map(|block| {
            let task = plan.task(block.task_id.as_deref()?)?;
            let preferred = task.preferred_energy?;
            Some(preferred.match_score(block.energy_level?))
        })
        .collect();
    if matches.is_empty() {
        return 0.0;
    }
    matches.iter().sum::<f64>() / matches.len() as f64
}

fn priority_score(plan: &DailyPlan) -> f64 {
    let scheduled: HashSet<&str> = plan
        .blocks
        .iter()
        .filter(|b| b.is_work())
        .filter_map(|b| b.task_id.as_deref())
        .collect();
    let priorities: Vec<f64> = plan
        .tasks
        .iter()
        .filter(|t| scheduled.contains(t.id.as_str()))
        .map(|t| t.current_priority().normalized())
        .collect();
    if priorities.is_empty() {
        return 0.0;
    }
    priorities.iter().sum::<f64>() / priorities.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::TimeBlock;
    use crate::task::{EnergyLevel, Priority, Task};
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn plan_with(blocks: Vec<TimeBlock>, tasks: Vec<Task>) -> DailyPlan {
        let mut plan = DailyPlan::empty(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        plan.blocks = blocks;
        plan.tasks = tasks;
        plan
    }

    #[test]
    fn empty_plan_scores_zero() {
        let plan = plan_with(Vec::new(), Vec::new());
        assert_eq!(PlanScorer::default().score(&plan), 0.0);
    }

    #[test]
    fn breakdown_matches_weighted_terms() {
        let task = Task::new("Deep", 360)
            .with_id("d")
            .with_priority(Priority::Critical)
            .with_energy(EnergyLevel::Peak)
            .focus();
        let mut block = TimeBlock::for_task(&task, at(8, 0), at(14, 0), 0);
        block.energy_level = Some(EnergyLevel::Peak);
        // 63 minutes of break: exactly 17.5% of 360
        let rest = TimeBlock::break_block(at(14, 0), at(15, 3));
        let plan = plan_with(vec![block, rest], vec![task]);

        let breakdown = PlanScorer::default().breakdown(&plan);
        assert_eq!(breakdown.term("focus").unwrap().score, 1.0);
        assert_eq!(breakdown.term("completion").unwrap().score, 0.0);
        assert_eq!(breakdown.term("energy").unwrap().score, 1.0);
        assert_eq!(breakdown.term("priority").unwrap().score, 1.0);
        assert!((breakdown.term("breaks").unwrap().score - 1.0).abs() < 1e-9);
        assert!((breakdown.total_score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn no_break_time_is_penalized() {
        let task = Task::new("Work", 60).with_id("w");
        let block = TimeBlock::for_task(&task, at(8, 0), at(9, 0), 0);
        let plan = plan_with(vec![block], vec![task]);
        let breaks = PlanScorer::default().breakdown(&plan);
        assert!((breaks.term("breaks").unwrap().score - 0.125).abs() < 1e-9);
    }

    #[test]
    fn score_stays_in_bounds_with_extreme_weights() {
        let task = Task::new("Work", 600).with_id("w").focus();
        let block = TimeBlock::for_task(&task, at(8, 0), at(18, 0), 0);
        let plan = plan_with(vec![block], vec![task]);
        let scorer = PlanScorer::new(ScoreWeights {
            focus: 1.0,
            completion: 1.0,
            energy: 1.0,
            priority: 1.0,
            breaks: 1.0,
        });
        let score = scorer.score(&plan);
        assert!((0.0..=1.0).contains(&score));
    }
}
