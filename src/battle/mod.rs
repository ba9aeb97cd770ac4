//! Battle estimation: support allocation, strength heuristics, dice
//! simulation, and the estimator that combines them.

pub mod estimator;
pub mod result;
pub mod simulate;
pub mod strength;
pub mod support;

pub use estimator::{
    calculate_battle_results, check_if_no_attackers_or_defenders, estimate,
    estimate_attack_battle_results, estimate_defend_battle_results, Perspective,
};
pub use result::BattleResult;
pub use strength::{
    battle_participants, difference_from_strengths, estimate_strength, has_local_land_superiority,
    has_local_naval_superiority, hit_points, is_overwhelming_win, strength_difference, MEDIUM_RANGE,
    SHORT_RANGE,
};
pub use support::{total_power, unit_powers, UnitPower};
