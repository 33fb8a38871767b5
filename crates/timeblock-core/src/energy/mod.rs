//! Energy patterns and energy-aware block alignment.
//!
//! The model keeps one [`EnergyPattern`] per hour of the day, learned from
//! session history. The optimizer uses it to move movable blocks toward
//! hours that suit the task's preferred energy level.

mod model;
mod optimizer;

pub use model::{EnergyModel, EnergyPattern, SessionOutcome};
pub use optimizer::EnergyOptimizer;
