//! Defense: hold evaluation and non-combat move planning.

pub mod hold;
pub mod noncombat;

pub use hold::{assess_allied_territories, assess_hold, HoldAssessment};
pub use noncombat::{defense_priority, plan_non_combat_move, NonCombatPlan};
