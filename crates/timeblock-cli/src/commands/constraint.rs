use clap::{Subcommand, ValueEnum};
use timeblock_core::{ConstraintKind, PlanStore, SchedulingConstraint, SqliteStore};

use super::{print_json, CmdResult};

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    /// Focus minutes per day
    MaxFocusTime,
    /// Minutes of break between blocks
    MinBreakTime,
    /// Energy match threshold in [0, 1]
    EnergyAlignment,
    /// 0 disables deadline escalation
    DeadlinePriority,
    /// Largest share of the day for one category, in [0, 1]
    CategoryBalance,
    /// Work hours per day
    MaxWorkHours,
}

impl From<KindArg> for ConstraintKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::MaxFocusTime => ConstraintKind::MaxFocusTime,
            KindArg::MinBreakTime => ConstraintKind::MinBreakTime,
            KindArg::EnergyAlignment => ConstraintKind::EnergyAlignment,
            KindArg::DeadlinePriority => ConstraintKind::DeadlinePriority,
            KindArg::CategoryBalance => ConstraintKind::CategoryBalance,
            KindArg::MaxWorkHours => ConstraintKind::MaxWorkHours,
        }
    }
}

#[derive(Subcommand)]
pub enum ConstraintAction {
    /// Add a constraint; the latest one of a kind wins
    Add {
        #[arg(value_enum)]
        kind: KindArg,
        value: f64,
    },
    /// List constraints
    List,
}

pub fn run(action: ConstraintAction, json: bool) -> CmdResult {
    let store = SqliteStore::open()?;

    match action {
        ConstraintAction::Add { kind, value } => {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("constraint value must be a non-negative number, got {value}").into());
            }
            let constraint = SchedulingConstraint::new(kind.into(), value);
            store.save_constraint(&constraint)?;
            if json {
                print_json(&constraint)?;
            } else {
                println!("Constraint added: {}", constraint.id);
            }
        }
        ConstraintAction::List => {
            let constraints = store.load_constraints()?;
            if json {
                return print_json(&constraints);
            }
            if constraints.is_empty() {
                println!("No constraints");
            }
            for c in &constraints {
                println!("{:<18} {:>8}  [{}]", format!("{:?}", c.kind), c.value, c.id);
            }
        }
    }
    Ok(())
}
