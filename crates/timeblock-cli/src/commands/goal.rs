use clap::Subcommand;
use timeblock_core::{Goal, PlanStore, SqliteStore};
use uuid::Uuid;

use super::{parse_instant, print_json, CmdResult};

#[derive(Subcommand)]
pub enum GoalAction {
    /// Add a goal
    Add {
        /// Goal title
        title: String,
        /// Category shared with the tasks that serve it
        #[arg(long)]
        category: Option<String>,
        /// Deadline (RFC 3339 or "YYYY-MM-DD HH:MM", UTC)
        #[arg(long)]
        deadline: Option<String>,
        /// Progress in [0, 1]
        #[arg(long, default_value = "0")]
        progress: f64,
        /// Goal description
        #[arg(long)]
        description: Option<String>,
    },
    /// List goals
    List,
}

pub fn run(action: GoalAction, json: bool) -> CmdResult {
    let store = SqliteStore::open()?;

    match action {
        GoalAction::Add {
            title,
            category,
            deadline,
            progress,
            description,
        } => {
            if !(0.0..=1.0).contains(&progress) {
                return Err(format!("progress must be within [0, 1], got {progress}").into());
            }
            let mut goal = Goal::new(format!("goal-{}", Uuid::new_v4()), title).with_progress(progress);
            if let Some(category) = category {
                goal = goal.with_category(category);
            }
            if let Some(deadline) = deadline {
                goal = goal.with_deadline(parse_instant(&deadline)?);
            }
            if let Some(description) = description {
                goal = goal.with_description(description);
            }
            store.save_goal(&goal)?;
            if json {
                print_json(&goal)?;
            } else {
                println!("Goal created: {}", goal.id);
            }
        }
        GoalAction::List => {
            let goals = store.load_goals()?;
            if json {
                return print_json(&goals);
            }
            if goals.is_empty() {
                println!("No goals");
            }
            for goal in &goals {
                println!(
                    "{:>3.0}%  {}  [{}]{}",
                    goal.progress * 100.0,
                    goal.title,
                    goal.id,
                    goal.category.as_deref().map(|c| format!("  #{c}")).unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}
