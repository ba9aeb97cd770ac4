//! Battle outcome summaries.

use serde::{Deserialize, Serialize};

use crate::board::UnitId;

/// Probabilistic summary of a battle, from the attacker's side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleResult {
    /// Attacker win probability, 0-100.
    pub win_percentage: f64,
    /// Expected defender loss minus attacker loss, in TUV.
    pub tuv_swing: f64,
    /// Whether the attacker keeps a land unit (any unit at sea).
    pub has_land_unit_remaining: bool,
    pub average_attackers_remaining: Vec<UnitId>,
    pub average_defenders_remaining: Vec<UnitId>,
    pub battle_rounds: f64,
    /// Simulated battles behind this estimate (0 = resolved analytically).
    pub simulated_runs: u32,
}

impl BattleResult {
    /// Result for a battle that does not take place.
    pub fn empty() -> Self {
        BattleResult {
            win_percentage: 0.0,
            tuv_swing: 0.0,
            has_land_unit_remaining: false,
            average_attackers_remaining: Vec::new(),
            average_defenders_remaining: Vec::new(),
            battle_rounds: 0.0,
            simulated_runs: 0,
        }
    }

    /// Certain loss with every defender surviving.
    pub fn loss(defenders: &[UnitId]) -> Self {
        BattleResult {
            win_percentage: 0.0,
            tuv_swing: -999.0,
            has_land_unit_remaining: false,
            average_attackers_remaining: Vec::new(),
            average_defenders_remaining: defenders.to_vec(),
            battle_rounds: 1.0,
            simulated_runs: 0,
        }
    }

    /// Whether the attack clears `threshold` and leaves a unit able to hold.
    pub fn is_win(&self, threshold: f64) -> bool {
        self.win_percentage >= threshold && self.has_land_unit_remaining
    }
}
