//! Strategic evaluation.
//!
//! Scores territories from the acting player's perspective: how valuable
//! each is to hold or take, given enemy capitals, factories, nearby enemy
//! production, and land-mass size.

pub mod value;

pub use value::{
    find_territory_values, min_cost_per_hit_point, territory_attack_value, TerritoryValues,
};
