//! Task management commands for CLI.

use chrono::Utc;
use clap::Subcommand;
use timeblock_core::{EnergyLevel, PlanStore, Priority, SqliteStore, Task};

use super::{parse_instant, print_json, split_list, CmdResult};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Add a task
    Add {
        /// Task title
        title: String,
        /// Estimated minutes
        #[arg(long, default_value = "30")]
        minutes: i64,
        /// low, medium, high or critical
        #[arg(long, default_value = "medium")]
        priority: String,
        /// Deadline (RFC 3339 or "YYYY-MM-DD HH:MM", UTC)
        #[arg(long)]
        deadline: Option<String>,
        /// Comma-separated IDs of tasks that must finish first
        #[arg(long)]
        depends_on: Option<String>,
        /// Preferred energy level: low, medium, high or peak
        #[arg(long)]
        energy: Option<String>,
        /// Deep-work task that gets a focus block
        #[arg(long)]
        focus: bool,
        /// Complexity in [0, 1]
        #[arg(long)]
        complexity: Option<f64>,
        /// Category for goal matching and balance constraints
        #[arg(long)]
        category: Option<String>,
        /// Linked goal ID
        #[arg(long)]
        goal: Option<String>,
        /// Task description
        #[arg(long)]
        description: Option<String>,
        /// Explicit ID instead of a generated one
        #[arg(long)]
        id: Option<String>,
    },
    /// List tasks
    List {
        /// Include completed tasks
        #[arg(long)]
        all: bool,
    },
    /// Mark a task completed
    Done {
        /// Task ID
        id: String,
    },
}

pub fn run(action: TaskAction, json: bool) -> CmdResult {
    let store = SqliteStore::open()?;

    match action {
        TaskAction::Add {
            title,
            minutes,
            priority,
            deadline,
            depends_on,
            energy,
            focus,
            complexity,
            category,
            goal,
            description,
            id,
        } => {
            let mut task = Task::new(title, minutes)
                .with_priority(priority.parse::<Priority>()?)
                .with_dependencies(split_list(depends_on));
            if let Some(id) = id {
                task = task.with_id(id);
            }
            if let Some(deadline) = deadline {
                task = task.with_deadline(parse_instant(&deadline)?);
            }
            if let Some(energy) = energy {
                task = task.with_energy(energy.parse::<EnergyLevel>()?);
            }
            if focus {
                task = task.focus();
            }
            if let Some(complexity) = complexity {
                task = task.with_complexity(complexity);
            }
            if let Some(category) = category {
                task = task.with_category(category);
            }
            if let Some(description) = description {
                task = task.with_description(description);
            }
            task.goal_id = goal;

            store.save_task(&task)?;
            if json {
                print_json(&task)?;
            } else {
                println!("Task created: {}", task.id);
            }
        }
        TaskAction::List { all } => {
            let tasks: Vec<Task> = store
                .load_tasks()?
                .into_iter()
                .filter(|t| all || !t.completed)
                .collect();
            if json {
                return print_json(&tasks);
            }
            if tasks.is_empty() {
                println!("No tasks");
            }
            for task in &tasks {
                let deadline = task
                    .deadline
                    .map(|d| format!("  due {}", d.format("%Y-%m-%d %H:%M")))
                    .unwrap_or_default();
                println!(
                    "{} {:<8} {:>4}m  {}  [{}]{}",
                    if task.completed { "x" } else { " " },
                    task.priority.to_string(),
                    task.estimated_minutes,
                    task.title,
                    task.id,
                    deadline
                );
            }
        }
        TaskAction::Done { id } => {
            let mut task = store
                .load_tasks()?
                .into_iter()
                .find(|t| t.id == id)
                .ok_or_else(|| format!("task not found: {id}"))?;
            task.completed = true;
            if task.actual_end.is_none() {
                task.actual_end = Some(Utc::now());
            }
            store.save_task(&task)?;
            if json {
                print_json(&task)?;
            } else {
                println!("Task completed: {}", task.id);
            }
        }
    }
    Ok(())
}
