//! Priority resolution.
//!
//! Adjusts each task's effective priority from three signals and orders the
//! list for placement:
//! - Goal alignment (category, deadline proximity, goal progress, keywords)
//! - Deadline escalation (tasks due soon are forced up)
//! - Scheduling constraints (focus cap, category balance, work-hour budget)
//!
//! Priorities only ever move one explicit notch at a time through
//! [`Priority::raised`] / [`Priority::lowered`], or up to a floor through
//! [`Priority::at_least`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::PlanWarning;
use crate::schedule::{ConstraintKind, SchedulingConstraint};
use crate::task::{Goal, Priority, Task};

/// Weights of the goal alignment components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentWeights {
    /// Task category matches the goal's (or the task links the goal)
    pub category: f64,
    /// Task deadline close to the goal deadline, linear over the window
    pub deadline: f64,
    /// Associated goal is less than half done
    pub progress: f64,
    /// Per shared keyword
    pub keyword: f64,
    /// Cap on the keyword component
    pub keyword_cap: f64,
    /// Deadline proximity window in days
    pub deadline_window_days: i64,
}

impl Default for AlignmentWeights {
    fn default() -> Self {
        Self {
            category: 0.4,
            deadline: 0.3,
            progress: 0.2,
            keyword: 0.2,
            keyword_cap: 0.5,
            deadline_window_days: 30,
        }
    }
}

/// Weights of the combined ordering score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingWeights {
    pub priority: f64,
    pub alignment: f64,
    pub urgency: f64,
    /// Weight of `1 - complexity`
    pub simplicity: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            priority: 0.4,
            alignment: 0.3,
            urgency: 0.2,
            simplicity: 0.1,
        }
    }
}

/// Alignment above which a task is raised one notch.
const BOOST_THRESHOLD: f64 = 0.8;
/// Alignment below which a non-critical task is lowered one notch.
const LOWER_THRESHOLD: f64 = 0.3;
/// Minimum keyword length considered for overlap.
const MIN_KEYWORD_LEN: usize = 4;

/// Resolves effective priorities and placement order.
#[derive(Debug, Clone, Default)]
pub struct PriorityResolver {
    alignment: AlignmentWeights,
    ranking: RankingWeights,
    skip_deadline_escalation: bool,
}

impl PriorityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(alignment: AlignmentWeights, ranking: RankingWeights) -> Self {
        Self {
            alignment,
            ranking,
            skip_deadline_escalation: false,
        }
    }

    /// Turn deadline escalation on or off.
    pub fn with_deadline_escalation(mut self, enabled: bool) -> Self {
        self.skip_deadline_escalation = !enabled;
        self
    }

    /// Resolve priorities against `goals` as of `reference` (the plan window start).
    ///
    /// Returns the tasks ordered by combined score, highest first, with
    /// `effective_priority`, `goal_alignment` and `overdue` filled in.
    /// Completed tasks pass through unchanged at the end of the list.
    pub fn prioritize(&self, tasks: &[Task], goals: &[Goal], reference: DateTime<Utc>) -> Vec<Task> {
        let active_goals: Vec<&Goal> = goals.iter().filter(|g| g.is_active()).collect();

        let mut scored: Vec<(f64, Task)> = Vec::with_capacity(tasks.len());
        let mut completed: Vec<Task> = Vec::new();

        for task in tasks {
            if task.completed {
                completed.push(task.clone());
                continue;
            }

            let mut task = task.clone();
            task.overdue = task.is_past_deadline(reference);
            task.goal_alignment = self.goal_alignment(&task, &active_goals);

            let mut priority = task.priority;
            if !active_goals.is_empty() {
                if task.goal_alignment > BOOST_THRESHOLD {
                    priority = priority.raised();
                } else if task.goal_alignment < LOWER_THRESHOLD && priority != Priority::Critical {
                    priority = priority.lowered();
                }
            }
            if !self.skip_deadline_escalation {
                priority = escalate_for_deadline(priority, task.deadline, reference);
            }
            task.effective_priority = Some(priority);

            let score = self.combined_score(&task, reference);
            debug!(
                task_id = %task.id,
                priority = %priority,
                alignment = task.goal_alignment,
                score,
                "resolved priority"
            );
            scored.push((score, task));
        }

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored
            .into_iter()
            .map(|(_, task)| task)
            .chain(completed)
            .collect()
    }

    /// Apply scheduling constraints to already-ordered tasks.
    ///
    /// - Work-hour budget: tasks that no longer fit are deferred and reported
    /// - Focus cap: focus tasks past the cumulative cap are lowered one notch
    /// - Category balance: tasks past their category's share are lowered one notch
    pub fn apply_constraints(
        &self,
        tasks: Vec<Task>,
        constraints: &[SchedulingConstraint],
    ) -> (Vec<Task>, Vec<PlanWarning>) {
        let mut warnings = Vec::new();

        let mut kept = match SchedulingConstraint::find(constraints, ConstraintKind::MaxWorkHours) {
            Some(hours) => {
                let budget = (hours.max(0.0) * 60.0).round() as i64;
                let mut used = 0i64;
                let mut kept = Vec::with_capacity(tasks.len());
                for task in tasks {
                    if task.completed {
                        kept.push(task);
                        continue;
                    }
                    if used + task.estimated_minutes > budget {
                        debug!(task_id = %task.id, budget, used, "deferred by work-hour budget");
                        warnings.push(PlanWarning::DeferredByWorkHours {
                            task_id: task.id.clone(),
                        });
                        continue;
                    }
                    used += task.estimated_minutes;
                    kept.push(task);
                }
                kept
            }
            None => tasks,
        };

        if let Some(cap) = SchedulingConstraint::find(constraints, ConstraintKind::MaxFocusTime) {
            let cap = cap.max(0.0).round() as i64;
            let mut focus_minutes = 0i64;
            for task in kept.iter_mut().filter(|t| t.focus_protected && !t.completed) {
                focus_minutes += task.estimated_minutes;
                if focus_minutes > cap {
                    lower(task);
                }
            }
        }

        if let Some(share) = SchedulingConstraint::find(constraints, ConstraintKind::CategoryBalance) {
            let total: i64 = kept
                .iter()
                .filter(|t| !t.completed)
                .map(|t| t.estimated_minutes)
                .sum();
            let allowance = share.clamp(0.0, 1.0) * total as f64;
            let mut per_category: HashMap<String, i64> = HashMap::new();
            for task in kept.iter_mut().filter(|t| !t.completed) {
                let Some(category) = task.category.as_ref().map(|c| c.to_lowercase()) else {
                    continue;
                };
                let used = per_category.entry(category).or_insert(0);
                *used += task.estimated_minutes;
                if *used as f64 > allowance {
                    lower(task);
                }
            }
        }

        (kept, warnings)
    }

    /// Best alignment of `task` against any active goal, in [0, 1].
    pub fn goal_alignment(&self, task: &Task, goals: &[&Goal]) -> f64 {
        let task_words = keywords(&task.text());
        goals
            .iter()
            .map(|goal| self.alignment_with(task, &task_words, goal))
            .fold(0.0, f64::max)
    }

    fn alignment_with(&self, task: &Task, task_words: &HashSet<String>, goal: &Goal) -> f64 {
        let w = &self.alignment;
        let linked = task.goal_id.as_deref() == Some(goal.id.as_str());
        let same_category = match (&task.category, &goal.category) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        };
        let associated = linked || same_category;

        let mut score = 0.0;
        if associated {
            score += w.category;
            if goal.progress < 0.5 {
                score += w.progress;
            }
        }

        if let (Some(task_deadline), Some(goal_deadline)) = (task.deadline, goal.deadline) {
            let window = w.deadline_window_days.max(1) as f64;
            let apart_days = (task_deadline - goal_deadline).num_minutes().abs() as f64 / (24.0 * 60.0);
            if apart_days <= window {
                score += w.deadline * (1.0 - apart_days / window);
            }
        }

        let shared = keywords(&goal.text()).intersection(task_words).count();
        score += (shared as f64 * w.keyword).min(w.keyword_cap);

        score.clamp(0.0, 1.0)
    }

    fn combined_score(&self, task: &Task, reference: DateTime<Utc>) -> f64 {
        let w = &self.ranking;
        w.priority * task.current_priority().normalized()
            + w.alignment * task.goal_alignment
            + w.urgency * urgency_bucket(task.deadline, reference)
            + w.simplicity * (1.0 - task.complexity.clamp(0.0, 1.0))
    }
}

fn lower(task: &mut Task) {
    let current = task.current_priority();
    task.effective_priority = Some(current.lowered());
}

/// Force priorities up as the deadline approaches.
///
/// Within a day (or overdue) the task becomes critical; within three days it
/// is raised to at least medium, within a week to at least high.
fn escalate_for_deadline(
    priority: Priority,
    deadline: Option<DateTime<Utc>>,
    reference: DateTime<Utc>,
) -> Priority {
    let Some(deadline) = deadline else {
        return priority;
    };
    let remaining = deadline - reference;
    if remaining <= Duration::days(1) {
        Priority::Critical
    } else if remaining <= Duration::days(3) {
        priority.at_least(Priority::Medium)
    } else if remaining <= Duration::days(7) {
        priority.at_least(Priority::High)
    } else {
        priority
    }
}

/// Deadline urgency in [0, 1], bucketed.
fn urgency_bucket(deadline: Option<DateTime<Utc>>, reference: DateTime<Utc>) -> f64 {
    let Some(deadline) = deadline else {
        return 0.0;
    };
    let remaining = deadline - reference;
    if remaining <= Duration::days(1) {
        1.0
    } else if remaining <= Duration::days(3) {
        0.75
    } else if remaining <= Duration::days(7) {
        0.5
    } else if remaining <= Duration::days(30) {
        0.25
    } else {
        0.0
    }
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_KEYWORD_LEN)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
    }

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn higher_priority_sorts_first_without_goals() {
        let tasks = vec![
            Task::new("Low", 60).with_id("low").with_priority(Priority::Low),
            Task::new("Critical", 60).with_id("crit").with_priority(Priority::Critical),
        ];
        let out = PriorityResolver::new().prioritize(&tasks, &[], reference());
        assert_eq!(ids(&out), vec!["crit", "low"]);
        assert_eq!(out[1].effective_priority, Some(Priority::Low));
    }

    #[test]
    fn aligned_task_is_boosted() {
        let goal = Goal::new("g1", "Launch marketing website")
            .with_category("marketing")
            .with_progress(0.2);
        let task = Task::new("Write website launch copy", 60)
            .with_id("t")
            .with_category("Marketing")
            .with_priority(Priority::Medium);
        let out = PriorityResolver::new().prioritize(&[task], &[goal], reference());
        // 0.4 category + 0.2 progress + 0.4 keywords ("website", "launch")
        assert!((out[0].goal_alignment - 1.0).abs() < 1e-9);
        assert_eq!(out[0].effective_priority, Some(Priority::High));
    }

    #[test]
    fn unaligned_task_is_lowered_but_not_critical() {
        let goal = Goal::new("g1", "Learn Spanish").with_category("language");
        let tasks = vec![
            Task::new("Fix printer", 30).with_id("a").with_priority(Priority::High),
            Task::new("Pay taxes", 30).with_id("b").with_priority(Priority::Critical),
        ];
        let out = PriorityResolver::new().prioritize(&tasks, &[goal], reference());
        let a = out.iter().find(|t| t.id == "a").unwrap();
        let b = out.iter().find(|t| t.id == "b").unwrap();
        assert_eq!(a.effective_priority, Some(Priority::Medium));
        assert_eq!(b.effective_priority, Some(Priority::Critical));
    }

    #[test]
    fn keyword_bonus_is_capped() {
        let goal = Goal::new("g1", "alpha bravo charlie delta echo");
        let task = Task::new("alpha bravo charlie delta", 30);
        let alignment = PriorityResolver::new().goal_alignment(&task, &[&goal]);
        assert!((alignment - 0.5).abs() < 1e-9);
    }

    #[test]
    fn deadline_proximity_falls_off_linearly() {
        let goal = Goal::new("g1", "Quarterly review").with_deadline(reference() + Duration::days(30));
        let task = Task::new("Prepare slides", 30).with_deadline(reference() + Duration::days(15));
        let alignment = PriorityResolver::new().goal_alignment(&task, &[&goal]);
        assert!((alignment - 0.15).abs() < 1e-9);
    }

    #[test]
    fn deadline_escalation_follows_distance_bands() {
        let r = reference();
        let due = |days: i64| Some(r + Duration::days(days));
        assert_eq!(escalate_for_deadline(Priority::Low, due(1), r), Priority::Critical);
        assert_eq!(escalate_for_deadline(Priority::Low, due(2), r), Priority::Medium);
        assert_eq!(escalate_for_deadline(Priority::Low, due(3), r), Priority::Medium);
        assert_eq!(escalate_for_deadline(Priority::Low, due(5), r), Priority::High);
        assert_eq!(escalate_for_deadline(Priority::Low, due(7), r), Priority::High);
        assert_eq!(escalate_for_deadline(Priority::Low, due(20), r), Priority::Low);
        assert_eq!(escalate_for_deadline(Priority::High, due(2), r), Priority::High);
        assert_eq!(escalate_for_deadline(Priority::Critical, due(5), r), Priority::Critical);
    }

    #[test]
    fn escalation_can_be_disabled() {
        let task = Task::new("Soon", 30)
            .with_priority(Priority::Low)
            .with_deadline(reference() + Duration::hours(3));
        let out = PriorityResolver::new()
            .with_deadline_escalation(false)
            .prioritize(&[task], &[], reference());
        assert_eq!(out[0].effective_priority, Some(Priority::Low));
    }

    #[test]
    fn past_deadline_marks_overdue() {
        let task = Task::new("Late", 30).with_deadline(reference() - Duration::hours(1));
        let out = PriorityResolver::new().prioritize(&[task], &[], reference());
        assert!(out[0].overdue);
        assert_eq!(out[0].effective_priority, Some(Priority::Critical));
    }

    #[test]
    fn completed_tasks_pass_through_unchanged() {
        let mut done = Task::new("Done", 30).with_id("done").with_priority(Priority::Critical);
        done.completed = true;
        let open = Task::new("Open", 30).with_id("open").with_priority(Priority::Low);
        let out = PriorityResolver::new().prioritize(&[done.clone(), open], &[], reference());
        assert_eq!(ids(&out), vec!["open", "done"]);
        assert_eq!(out[1], done);
    }

    #[test]
    fn work_hour_budget_defers_overflow() {
        let tasks = vec![
            Task::new("A", 120).with_id("a"),
            Task::new("B", 90).with_id("b"),
            Task::new("C", 30).with_id("c"),
        ];
        let limit = vec![SchedulingConstraint::new(ConstraintKind::MaxWorkHours, 2.5)];
        let (kept, warnings) = PriorityResolver::new().apply_constraints(tasks, &limit);
        assert_eq!(ids(&kept), vec!["a", "c"]);
        assert_eq!(
            warnings,
            vec![PlanWarning::DeferredByWorkHours {
                task_id: "b".to_string()
            }]
        );
    }

    #[test]
    fn focus_cap_lowers_later_focus_tasks() {
        let tasks = vec![
            Task::new("Deep 1", 90).with_id("a").with_priority(Priority::High).focus(),
            Task::new("Deep 2", 90).with_id("b").with_priority(Priority::High).focus(),
        ];
        let cap = vec![SchedulingConstraint::new(ConstraintKind::MaxFocusTime, 120.0)];
        let (kept, _) = PriorityResolver::new().apply_constraints(tasks, &cap);
        assert_eq!(kept[0].current_priority(), Priority::High);
        assert_eq!(kept[1].current_priority(), Priority::Medium);
    }

    #[test]
    fn category_balance_lowers_dominant_category() {
        let tasks = vec![
            Task::new("Mail 1", 60).with_id("a").with_category("admin"),
            Task::new("Mail 2", 60).with_id("b").with_category("admin"),
            Task::new("Code", 60).with_id("c").with_category("dev"),
        ];
        let balance = vec![SchedulingConstraint::new(ConstraintKind::CategoryBalance, 0.5)];
        let (kept, _) = PriorityResolver::new().apply_constraints(tasks, &balance);
        assert_eq!(kept[0].current_priority(), Priority::Medium);
        assert_eq!(kept[1].current_priority(), Priority::Low);
        assert_eq!(kept[2].current_priority(), Priority::Medium);
    }
}
