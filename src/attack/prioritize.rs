//! Target pruning and ranking.

use std::collections::BTreeSet;

use crate::battle::{
    battle_participants, estimate_attack_battle_results, estimate_strength, strength_difference,
};
use crate::board::{TerritoryId, UnitId};
use crate::eval::territory_attack_value;

use super::{flag, AttackPlanner};

/// Neutral attacks at or below this strength difference are not overkill.
pub(super) const NEUTRAL_OVERKILL: f64 = 500.0;
const EMPTY_LAND_BONUS: f64 = 10.0;
const FACTORY_BONUS: f64 = 5.0;
/// Minimum attack value while the capital lacks local superiority.
const DEFENSIVE_MIN_VALUE: f64 = 10.0;

impl AttackPlanner<'_, '_> {
    /// Estimates every target against the full reachable force, falling back
    /// to amphibious cargo and bombardment, and drops targets that would not
    /// be won or would lose value.
    pub(super) fn remove_territories_that_cant_be_conquered(&mut self) {
        let ctx = self.ctx;
        let state = ctx.state;
        let threshold = ctx.win_percentage();
        let mut doomed = Vec::new();
        for (&t, opt) in self.maps.territories.iter_mut() {
            let defenders = opt.defenders(ctx);
            let direct: Vec<UnitId> = opt.max_units.iter().copied().collect();
            let mut result = estimate_attack_battle_results(ctx, t, &direct, &defenders, &[]);
            if result.win_percentage < threshold && !opt.max_amphib_units.is_empty() {
                let bombard: Vec<UnitId> = opt.max_bombard_units.iter().copied().collect();
                result = estimate_attack_battle_results(
                    ctx,
                    t,
                    &opt.max_attackers(),
                    &defenders,
                    &bombard,
                );
                opt.need_amphib_units = true;
            }
            if result.win_percentage < threshold {
                doomed.push((t, "cannot be conquered"));
            } else if result.tuv_swing < 0.0 && !state.is_neutral_land(t) {
                doomed.push((t, "loses value"));
            }
            opt.max_result = Some(result);
        }
        for (t, reason) in doomed {
            self.remove_target(t, reason);
        }
    }

    /// Scores every remaining target and ranks them best first.
    pub(super) fn prioritize_attack_options(&mut self) {
        let ctx = self.ctx;
        let state = ctx.state;
        let capital = state.capital_of(ctx.player);
        let min_value = if self.defensive { DEFENSIVE_MIN_VALUE } else { 0.0 };

        let mut scored: Vec<(TerritoryId, f64)> = Vec::with_capacity(self.maps.territories.len());
        for (&t, opt) in &self.maps.territories {
            let terr = state.territory(t);
            let defenders = battle_participants(state, t, &opt.defenders(ctx));
            let neutral = state.is_neutral_land(t);
            let swing = if neutral {
                -estimate_strength(state, t, &defenders, false) / 5.0
            } else {
                opt.max_result.as_ref().map_or(0.0, |r| r.tuv_swing)
            };
            // Overkill on big garrisons adds less than the swing suggests
            let size_factor = if swing < 0.0 {
                1.0
            } else {
                1.0 / (defenders.len() as f64 + 1.0) + 0.5
            };
            let production = terr.production as f64;
            let production_weight =
                (1.0 + flag(terr.is_land()) + flag(opt.can_hold))
                    * (1.0 - 0.5 * flag(opt.need_amphib_units));
            let empty = flag(terr.is_land() && defenders.is_empty());
            let factory = flag(state.has_factory(t));
            let enemy_capital = flag(terr.is_capital() && state.is_enemy_territory(t, ctx.player));
            let borders_capital = capital.is_some_and(|c| terr.neighbors().any(|n| n == c));
            let near_capital = flag(!neutral && borders_capital);

            let mut value = (size_factor * swing
                + production_weight * production
                + EMPTY_LAND_BONUS * empty
                + FACTORY_BONUS * factory)
                * (1.0 + 4.0 * enemy_capital)
                * (1.0 + 2.0 * near_capital)
                * (1.0 - 0.9 * flag(neutral));
            if neutral && value <= 0.0 {
                value = self.rescore_neutral(t, value, &opt.max_attackers(), &defenders);
            }
            scored.push((t, value));
        }

        let mut doomed = Vec::new();
        scored.retain(|(t, value)| {
            let keep = *value > min_value;
            if !keep {
                doomed.push(*t);
            }
            keep
        });
        // Stable: equal scores keep territory order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (t, value) in &scored {
            if let Some(opt) = self.maps.territories.get_mut(t) {
                opt.value = *value;
                let win = opt.max_result.as_ref().map_or(0.0, |r| r.win_percentage);
                ctx.observer().territory_scored(ctx.name(*t), *value, win);
            }
        }
        self.prioritized = scored.into_iter().map(|(t, _)| t).collect();
        for t in doomed {
            self.remove_target(t, "not worth attacking");
        }
    }

    /// A neutral is worth a little if it opens a path to enemy land we cannot
    /// reach yet, or if we can take it with crushing force.
    fn rescore_neutral(
        &self,
        t: TerritoryId,
        value: f64,
        attackers: &[UnitId],
        defenders: &[UnitId],
    ) -> f64 {
        let ctx = self.ctx;
        let state = ctx.state;
        let nearby_enemy: f64 = state
            .territory(t)
            .neighbors()
            .filter(|n| {
                state.is_enemy_territory(*n, ctx.player) && !self.maps.territories.contains_key(n)
            })
            .map(|n| territory_attack_value(ctx, n))
            .filter(|v| *v > 0.0)
            .sum();
        if nearby_enemy > 0.0 {
            return nearby_enemy * 0.001 / (1.0 - value);
        }
        let difference = strength_difference(state, t, attackers, defenders);
        if difference > NEUTRAL_OVERKILL {
            return difference * 0.00001 / (1.0 - value);
        }
        value
    }

    /// Drops ranked targets that would be lost straight back or only expose us:
    /// empty sea zones and neutrals we cannot hold, cheap amphibious grabs,
    /// and neutrals whose attackers would leave an enemy border open.
    pub(super) fn remove_territories_that_arent_worth_attacking(&mut self) {
        let ctx = self.ctx;
        let state = ctx.state;
        let mut doomed = Vec::new();
        for &t in &self.prioritized {
            let Some(opt) = self.maps.territories.get(&t) else {
                continue;
            };
            let terr = state.territory(t);
            let countered = !opt.max_enemy_units.is_empty();
            let empty_sea = terr.is_water() && !state.has_enemy_units(t, ctx.player);
            if empty_sea && !opt.can_hold && countered {
                doomed.push((t, "empty sea zone cannot be held"));
                continue;
            }
            let neutral = state.is_neutral_land(t);
            let cheap_neutral = neutral
                && strength_difference(state, t, &opt.max_attackers(), &opt.defenders(ctx))
                        <= NEUTRAL_OVERKILL;
            if terr.is_land() && !opt.can_hold && countered {
                if cheap_neutral {
                    doomed.push((t, "neutral cannot be held"));
                    continue;
                }
                if opt.need_amphib_units && opt.value < 2.0 {
                    doomed.push((t, "amphibious attack not worth it"));
                    continue;
                }
            }
            if cheap_neutral && self.neutral_attack_exposes_border(t) {
                doomed.push((t, "attackers guard an enemy border"));
            }
        }
        for (t, reason) in doomed {
            self.remove_target(t, reason);
        }
    }

    fn neutral_attack_exposes_border(&self, t: TerritoryId) -> bool {
        let state = self.ctx.state;
        let player = self.ctx.player;
        let Some(opt) = self.maps.territories.get(&t) else {
            return false;
        };
        let ranked: BTreeSet<TerritoryId> = self.prioritized.iter().copied().collect();
        state.territory(t).neighbors().any(|from| {
            state.is_allied_territory(from, player)
                && opt.max_units.iter().any(|u| state.location(*u) == Some(from))
                && state
                    .territory(from)
                    .neighbors()
                    .any(|n| state.is_enemy_territory(n, player) && !ranked.contains(&n))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::AttackPlanner;
    use crate::board::{GameState, PlayerId, StateBuilder, TerritoryId};
    use crate::context::{EngineConfig, PlanningContext};

    struct Map {
        state: GameState,
        rich: TerritoryId,
        poor: TerritoryId,
        fortress: TerritoryId,
    }

    fn map() -> Map {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let inf = b.infantry();
        let arm = b.armour();
        let home = b.land("Home", 5, Some(red));
        let rich = b.land("Rich", 6, Some(blue));
        let poor = b.land("Poor", 3, Some(blue));
        let fortress = b.land("Fortress", 2, Some(blue));
        b.connect(home, rich);
        b.connect(home, poor);
        b.connect(home, fortress);
        b.add_units(red, arm, home, 5);
        b.add_unit(blue, inf, rich);
        b.add_unit(blue, inf, poor);
        b.add_units(blue, inf, fortress, 12);
        Map {
            state: b.build(),
            rich,
            poor,
            fortress,
        }
    }

    fn ctx(state: &GameState) -> PlanningContext<'_> {
        PlanningContext::new(state, PlayerId(0), EngineConfig { seed: 4, ..Default::default() })
    }

    #[test]
    fn unwinnable_targets_are_removed() {
        let m = map();
        let c = ctx(&m.state);
        let mut planner = AttackPlanner::new(&c);
        planner.remove_territories_that_cant_be_conquered();
        assert!(!planner.maps.territories.contains_key(&m.fortress));
        assert!(planner.maps.territories.contains_key(&m.rich));
        assert!(planner
            .maps
            .unit_options
            .values()
            .all(|targets| !targets.contains(&m.fortress)));
    }

    #[test]
    fn richer_target_ranks_first() {
        let m = map();
        let c = ctx(&m.state);
        let mut planner = AttackPlanner::new(&c);
        planner.remove_territories_that_cant_be_conquered();
        planner.prioritize_attack_options();
        assert_eq!(planner.prioritized, vec![m.rich, m.poor]);
        assert!(planner.maps.territories[&m.rich].value > planner.maps.territories[&m.poor].value);
    }
}
