//! Energy curve display.

use clap::Subcommand;
use timeblock_core::{EnergyLevel, EnergyModel, PlanStore, SqliteStore};

use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum EnergyAction {
    /// Show the learned energy curve
    Show,
    /// Hours at or above an energy level
    Recommend {
        /// low, medium, high or peak
        #[arg(long, default_value = "high")]
        min_level: String,
    },
}

pub fn run(action: EnergyAction, json: bool) -> CmdResult {
    let store = SqliteStore::open()?;
    let patterns = store.load_energy_patterns()?;
    let model = if patterns.is_empty() {
        EnergyModel::new()
    } else {
        EnergyModel::from_patterns(patterns)
    };

    match action {
        EnergyAction::Show => {
            if json {
                return print_json(model.patterns());
            }
            print!("{}", model.render_ascii_chart());
            let observed: u64 = model.patterns().iter().map(|p| p.sample_count).sum();
            if observed == 0 {
                println!("\nNo sessions recorded yet; showing the default curve.");
            }
        }
        EnergyAction::Recommend { min_level } => {
            let level: EnergyLevel = min_level.parse()?;
            let hours = model.recommended_hours(level);
            if json {
                return print_json(&hours);
            }
            if hours.is_empty() {
                println!("No hours at {level} or above");
            } else {
                let labels: Vec<String> = hours.iter().map(|h| format!("{h:02}:00")).collect();
                println!("Hours at {level} or above: {}", labels.join(", "));
            }
        }
    }
    Ok(())
}
