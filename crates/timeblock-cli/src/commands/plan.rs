//! Plan generation and live rescheduling commands.

use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use serde_json::json;
use tracing::debug;
use timeblock_core::{
    BlockKind, CalendarSource, CollaboratorError, DailyPlan, PlanStore, PlanWarning, PlannerConfig, PlanningService,
    Priority, RescheduleEvent, RescheduleOutcome, SqliteStore, TimeBlock,
};

use super::{parse_clock, parse_date, print_json, CmdResult};

#[derive(Subcommand)]
pub enum PlanAction {
    /// Generate and save the plan for a day
    Generate {
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
        /// Busy interval as HH:MM-HH:MM; repeat for several
        #[arg(long = "busy")]
        busy: Vec<String>,
    },
    /// Show the saved plan for a day
    Show {
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// Report that a task ran over its planned end
    Overtime {
        /// Task ID
        task_id: String,
        /// Minutes past the planned end
        minutes: i64,
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// Change a task's priority and reschedule if needed
    Priority {
        /// Task ID
        task_id: String,
        /// low, medium, high or critical
        priority: String,
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },
}

/// Busy intervals given on the command line, served as calendar blocks.
struct BusyCalendar {
    blocks: Vec<TimeBlock>,
}

impl BusyCalendar {
    fn parse(date: NaiveDate, specs: &[String]) -> Result<Self, Box<dyn std::error::Error>> {
        let mut blocks = Vec::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            let (start, end) = spec
                .split_once('-')
                .ok_or_else(|| format!("invalid busy interval '{spec}' (expected HH:MM-HH:MM)"))?;
            blocks.push(TimeBlock::fixed(
                format!("busy-{}", i + 1),
                "Busy",
                parse_clock(date, start)?,
                parse_clock(date, end)?,
            ));
        }
        Ok(Self { blocks })
    }
}

impl CalendarSource for BusyCalendar {
    fn name(&self) -> &str {
        "command line"
    }

    fn fixed_blocks(&self, _date: NaiveDate) -> Result<Vec<TimeBlock>, CollaboratorError> {
        Ok(self.blocks.clone())
    }
}

fn service(calendar: BusyCalendar) -> Result<PlanningService<SqliteStore, BusyCalendar>, Box<dyn std::error::Error>> {
    let store = SqliteStore::open()?;
    let config = PlannerConfig::load()?;
    Ok(PlanningService::new(store, calendar, config))
}

pub fn run(action: PlanAction, json: bool) -> CmdResult {
    match action {
        PlanAction::Generate { date, busy } => {
            let date = parse_date(date.as_deref())?;
            debug!(%date, busy = busy.len(), "generating plan");
            let service = service(BusyCalendar::parse(date, &busy)?)?;
            let outcome = service.plan_day(date)?;
            if json {
                return print_json(&outcome);
            }
            print_plan(&outcome.plan);
            if !outcome.anomalies.is_empty() {
                println!("\nAnomalies:");
                for anomaly in &outcome.anomalies {
                    println!("  - {anomaly}");
                }
            }
            if !outcome.warnings.is_empty() {
                println!("\nWarnings:");
                for warning in &outcome.warnings {
                    println!("  - {}", describe_warning(warning));
                }
            }
            if !outcome.insights.best_hours.is_empty() {
                let hours: Vec<String> = outcome.insights.best_hours.iter().map(|h| format!("{h:02}:00")).collect();
                println!("\nEstimates hold best at: {}", hours.join(", "));
            }
        }
        PlanAction::Show { date } => {
            let date = parse_date(date.as_deref())?;
            let store = SqliteStore::open()?;
            match store.load_plan(date)? {
                Some(plan) if json => print_json(&plan)?,
                Some(plan) => print_plan(&plan),
                None => return Err(format!("no plan for {date}; run `timeblock plan generate` first").into()),
            }
        }
        PlanAction::Overtime { task_id, minutes, date } => {
            let date = parse_date(date.as_deref())?;
            let event = RescheduleEvent::Overtime {
                task_id,
                overtime_minutes: minutes,
            };
            reschedule(date, &event, json)?;
        }
        PlanAction::Priority { task_id, priority, date } => {
            let date = parse_date(date.as_deref())?;
            let priority: Priority = priority.parse()?;
            let event = RescheduleEvent::PriorityChange {
                task_id,
                priority,
                at: Utc::now(),
            };
            reschedule(date, &event, json)?;
        }
    }
    Ok(())
}

fn reschedule(date: NaiveDate, event: &RescheduleEvent, json: bool) -> CmdResult {
    let service = service(BusyCalendar { blocks: Vec::new() })?;
    let outcome = service.reschedule(date, event)?;

    if json {
        return print_json(&json!({
            "strategy": outcome.strategy(),
            "improved": outcome.improved(),
            "plan": outcome.plan(),
        }));
    }

    match &outcome {
        RescheduleOutcome::Shifted { shifted, anomalies, .. } => {
            println!("Shifted {} block(s) after {}", shifted.len(), event.task_id());
            for anomaly in anomalies {
                println!("  - {anomaly}");
            }
        }
        RescheduleOutcome::Replanned { previous_score, outcome: replanned } => {
            println!(
                "Replanned the day (score {:.2} -> {:.2})",
                previous_score, replanned.plan.productivity_score
            );
        }
        RescheduleOutcome::Recorded { .. } => {
            println!("Recorded change to {}; no blocks moved", event.task_id());
        }
    }
    println!();
    print_plan(outcome.plan());
    Ok(())
}

fn print_plan(plan: &DailyPlan) {
    println!(
        "Plan for {} (score {:.2}, adherence {:.2}, completion {:.0}%)",
        plan.date,
        plan.productivity_score,
        plan.adherence_score,
        plan.completion_rate * 100.0
    );
    if plan.blocks.is_empty() {
        println!("  (nothing scheduled)");
        return;
    }
    for block in &plan.blocks {
        let label = block
            .task_id
            .as_deref()
            .and_then(|id| plan.task(id))
            .map(|t| t.title.as_str())
            .or(block.label.as_deref())
            .unwrap_or("");
        println!(
            "  {}-{}  {:<7} {}{}",
            block.start.format("%H:%M"),
            block.end.format("%H:%M"),
            kind_name(block.kind),
            label,
            if block.is_protected { "  [protected]" } else { "" }
        );
    }
}

fn kind_name(kind: BlockKind) -> &'static str {
    match kind {
        BlockKind::Focus => "focus",
        BlockKind::Task => "task",
        BlockKind::Break => "break",
        BlockKind::Meeting => "meeting",
    }
}

fn describe_warning(warning: &PlanWarning) -> String {
    match warning {
        PlanWarning::InvalidTask { task_id, reason } => format!("task {task_id} skipped: {reason}"),
        PlanWarning::InvalidBlock { block_id, reason } => format!("block {block_id} skipped: {reason}"),
        PlanWarning::OverlappingFixedBlock { block_id, other_block_id } => {
            format!("block {block_id} overlaps {other_block_id} and was dropped")
        }
        PlanWarning::DeferredByWorkHours { task_id } => format!("task {task_id} deferred: work hours used up"),
        PlanWarning::CollaboratorUnavailable { collaborator, reason } => {
            format!("{collaborator} unavailable: {reason}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_intervals_become_protected_blocks() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let calendar = BusyCalendar::parse(date, &["09:00-09:30".to_string()]).unwrap();
        let blocks = calendar.fixed_blocks(date).unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].is_protected);
        assert_eq!(blocks[0].duration_minutes(), 30);
    }

    #[test]
    fn malformed_busy_interval_is_rejected() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert!(BusyCalendar::parse(date, &["09:00".to_string()]).is_err());
    }
}
