//! Recording planned vs actual execution.

use clap::Subcommand;
use timeblock_core::{PlanStore, PlannerConfig, PlanningService, SchedulingFeedback, SqliteStore};
use timeblock_core::integrations::EmptyCalendar;

use super::{parse_clock, parse_date, print_json, CmdResult};

#[derive(Subcommand)]
pub enum FeedbackAction {
    /// Record how a planned block actually went
    Record {
        /// Task ID
        task_id: String,
        /// Actual start, HH:MM
        #[arg(long)]
        actual_start: String,
        /// Actual end, HH:MM
        #[arg(long)]
        actual_end: String,
        /// Planned start, HH:MM; defaults to the saved plan's block
        #[arg(long)]
        planned_start: Option<String>,
        /// Planned end, HH:MM; defaults to the saved plan's block
        #[arg(long)]
        planned_end: Option<String>,
        /// Rating from 1 to 5
        #[arg(long)]
        rating: Option<u8>,
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// List recorded feedback, oldest first
    List,
}

pub fn run(action: FeedbackAction, json: bool) -> CmdResult {
    let store = SqliteStore::open()?;

    match action {
        FeedbackAction::Record {
            task_id,
            actual_start,
            actual_end,
            planned_start,
            planned_end,
            rating,
            date,
        } => {
            let date = parse_date(date.as_deref())?;
            let (planned_start, planned_end) = match (planned_start, planned_end) {
                (Some(start), Some(end)) => (parse_clock(date, &start)?, parse_clock(date, &end)?),
                (None, None) => {
                    let plan = store
                        .load_plan(date)?
                        .ok_or_else(|| format!("no plan for {date}; pass --planned-start and --planned-end"))?;
                    let block = plan
                        .block_for_task(&task_id)
                        .ok_or_else(|| format!("task {task_id} is not in the plan for {date}"))?;
                    (block.start, block.end)
                }
                _ => return Err("--planned-start and --planned-end go together".into()),
            };

            let actual_start = parse_clock(date, &actual_start)?;
            let actual_end = parse_clock(date, &actual_end)?;
            if actual_end <= actual_start || planned_end <= planned_start {
                return Err("end must be after start".into());
            }

            let mut record = SchedulingFeedback::new(task_id, planned_start, planned_end)
                .with_actual(actual_start, actual_end);
            if let Some(rating) = rating {
                if !(1..=5).contains(&rating) {
                    return Err(format!("rating must be 1-5, got {rating}").into());
                }
                record = record.with_rating(rating);
            }

            let service = PlanningService::new(store, EmptyCalendar, PlannerConfig::load()?);
            service.record_feedback(&record)?;
            if json {
                print_json(&record)?;
            } else {
                let accuracy = record.accuracy().unwrap_or_default();
                println!("Feedback recorded for {} (accuracy {:.2})", record.task_id, accuracy);
            }
        }
        FeedbackAction::List => {
            let records = store.load_feedback()?;
            if json {
                return print_json(&records);
            }
            if records.is_empty() {
                println!("No feedback");
            }
            for r in &records {
                println!(
                    "{}  {:<20} planned {:>4}m  actual {:>4}m",
                    r.planned_start.format("%Y-%m-%d %H:%M"),
                    r.task_id,
                    r.planned_minutes(),
                    r.actual_minutes().map(|m| m.to_string()).unwrap_or_else(|| "-".into())
                );
            }
        }
    }
    Ok(())
}
