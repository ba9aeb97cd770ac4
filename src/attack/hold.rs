//! Counter-attack checks for territories we plan to take.

use std::collections::BTreeSet;

use crate::battle::{calculate_battle_results, estimate_attack_battle_results, BattleResult};
use crate::board::{GameState, TerritoryId, UnitId};
use crate::options::find_max_enemy_attacks;

use super::AttackPlanner;

/// Attackers that stay behind after a battle: everything but air.
pub(super) fn non_air(state: &GameState, units: &[UnitId]) -> Vec<UnitId> {
    units
        .iter()
        .copied()
        .filter(|u| !state.type_of(*u).is_air())
        .collect()
}

/// Whether a conquered territory survives the enemy counter-attack `counter`.
pub(super) fn holds_against(land: bool, counter: &BattleResult, min_win: f64) -> bool {
    (land && !counter.has_land_unit_remaining)
        || counter.tuv_swing < 0.0
        || counter.win_percentage < min_win
}

impl AttackPlanner<'_, '_> {
    /// Recomputes the strongest enemy attack on every territory, treating
    /// enemy units in `cleared` as destroyed by our own attacks.
    pub(super) fn refresh_enemy_attacks(&mut self, cleared: &BTreeSet<TerritoryId>) {
        let ctx = self.ctx;
        let everything: BTreeSet<TerritoryId> = ctx.state.territory_ids().collect();
        self.enemy = find_max_enemy_attacks(ctx, &everything, cleared);
        for (t, opt) in self.maps.territories.iter_mut() {
            opt.max_enemy_units = self.enemy.units(*t);
            opt.max_enemy_bombard = self.enemy.bombard(*t);
        }
    }

    /// Marks every target holdable or not, assuming its full reachable force
    /// attacks and the non-air survivors face the enemy counter-attack.
    ///
    /// Land is never held when it is worth clearly less than the places its
    /// attackers would leave.
    pub(super) fn determine_territories_that_can_be_held(&mut self) {
        let ctx = self.ctx;
        let state = ctx.state;
        let min_win = ctx.min_win_percentage();
        for (&t, opt) in self.maps.territories.iter_mut() {
            if opt.is_strafing {
                opt.can_hold = false;
                continue;
            }
            let land = state.territory(t).is_land();
            let attackers = opt.max_attackers();
            if land {
                let sources: Vec<f64> = attackers
                    .iter()
                    .filter(|u| !state.type_of(**u).is_air())
                    .filter_map(|u| state.location(*u))
                    .map(|from| self.values.get(from))
                    .collect();
                if !sources.is_empty() {
                    let average = sources.iter().sum::<f64>() / sources.len() as f64;
                    if self.values.get(t) < 0.75 * average {
                        opt.can_hold = false;
                        continue;
                    }
                }
            }
            let Some(enemy) = self.enemy.get(t) else {
                opt.can_hold = true;
                continue;
            };
            let defenders = opt.defenders(ctx);
            let bombard: Vec<UnitId> = opt.max_bombard_units.iter().copied().collect();
            let result = estimate_attack_battle_results(ctx, t, &attackers, &defenders, &bombard);
            let survivors = non_air(state, &result.average_attackers_remaining);
            let counter = calculate_battle_results(
                &ctx.as_player(enemy.player),
                t,
                &enemy.all_units(),
                &survivors,
                &enemy.bombard,
            );
            opt.can_hold = holds_against(land, &counter, min_win);
        }
    }
}
