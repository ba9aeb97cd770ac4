//! Option discovery: which units can reach which targets this turn.

pub mod attack_option;
pub mod discovery;
pub mod enemy;
pub mod scramble;
pub mod sort;

pub use attack_option::{AmphibRoute, AttackOption};
pub use discovery::{
    air_distance, can_air_land_after_attack, discover, discover_all, find_amphib_routes,
    has_landing_spot,
    movable_units, naval_reach, select_cargo, OptionMaps, Targets, UnitClass,
};
pub use enemy::{find_max_enemy_attacks, EnemyAttack, EnemyAttacks};
pub use scramble::{find_scramble_options, scramble_candidates};
pub use sort::{
    sort_unit_move_options, sort_unit_needed_options, sort_unit_needed_options_then_attack,
    SortedOptions, UnitOptions,
};
