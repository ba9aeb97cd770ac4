//! Purchase planner driver and the defend stages.
//!
//! Stages run in a fixed order and each spends what the previous ones left:
//!
//! 1. defenders for threatened land,
//! 2. general land units where they matter,
//! 3. defenders for threatened sea zones,
//! 4. at most one new factory,
//! 5. warships, then transports with their cargo,
//! 6. leftover production, then upgrades of cheap units.
//!
//! Candidate units are judged on what-if copies of the snapshot carrying the
//! planned units, so the hold evaluator and superiority checks see them
//! without any planner-specific code.

use std::collections::BTreeSet;

use rand::rngs::SmallRng;
use rand::Rng;

use crate::battle::{
    estimate_defend_battle_results, has_local_land_superiority, BattleResult, SHORT_RANGE,
};
use crate::board::{GameState, TerritoryId, UnitId, UnitTypeId};
use crate::context::PlanningContext;
use crate::defense::defense_priority;
use crate::error::EngineError;
use crate::eval::find_territory_values;
use crate::observer::PlanPhase;
use crate::options::{find_max_enemy_attacks, EnemyAttacks};

use super::option::{PurchaseCatalog, PurchaseOption};
use super::place::{find_production_sites, Budget, ProductionSite};
use super::{PurchasePlan, TentativePlacement};

/// Random stream of weighted purchase picks.
const PICK_STREAM: u64 = 0x7075_7263;

/// `(site, place)` index of a place territory.
pub(super) type PlaceRef = (usize, usize);

pub(super) struct PurchasePlanner<'c, 'a> {
    pub(super) ctx: &'c PlanningContext<'a>,
    pub(super) catalog: PurchaseCatalog,
    pub(super) budget: Budget,
    pub(super) sites: Vec<ProductionSite>,
    pub(super) enemy: EnemyAttacks,
    /// Factories bought this turn, placed but not producing.
    pub(super) new_factories: Vec<(TerritoryId, UnitTypeId)>,
    rng: SmallRng,
}

impl<'c, 'a> PurchasePlanner<'c, 'a> {
    pub(super) fn new(ctx: &'c PlanningContext<'a>, budget: u32) -> Self {
        let state = ctx.state;
        let player = ctx.player;
        let mut sites = find_production_sites(state, player);

        let mut watched: BTreeSet<TerritoryId> = state
            .territories
            .iter()
            .filter(|t| t.is_land() && t.owner == Some(player))
            .map(|t| t.id)
            .collect();
        watched.extend(sites.iter().flat_map(|s| s.places.iter().map(|p| p.territory)));
        let enemy = find_max_enemy_attacks(ctx, &watched, &BTreeSet::new());

        let values = find_territory_values(
            ctx,
            &BTreeSet::new(),
            &BTreeSet::new(),
            watched.iter().copied(),
        );
        for place in sites.iter_mut().flat_map(|s| s.places.iter_mut()) {
            place.strategic_value = values.get(place.territory);
        }

        PurchasePlanner {
            ctx,
            catalog: PurchaseCatalog::new(state, player),
            budget: Budget::new(budget),
            sites,
            enemy,
            new_factories: Vec::new(),
            rng: ctx.rng(&[PICK_STREAM, player.0 as u64]),
        }
    }

    pub(super) fn state(&self) -> &'a GameState {
        self.ctx.state
    }

    pub(super) fn is_capital(&self, t: TerritoryId) -> bool {
        self.state().capital_of(self.ctx.player) == Some(t)
    }

    /// Unit types planned for `t` across all sites.
    pub(super) fn planned_at(&self, t: TerritoryId) -> Vec<UnitTypeId> {
        self.sites
            .iter()
            .flat_map(|s| s.places.iter())
            .filter(|p| p.territory == t)
            .flat_map(|p| p.place.iter().copied())
            .collect()
    }

    /// Types of our own units in `t`, planned ones and `extra` included.
    pub(super) fn local_types(
        &self,
        around: &[TerritoryId],
        extra: &[UnitTypeId],
    ) -> Vec<UnitTypeId> {
        let state = self.state();
        let mut types: Vec<UnitTypeId> = around
            .iter()
            .flat_map(|t| state.owned_units(*t, self.ctx.player))
            .map(|u| state.unit(u).kind)
            .collect();
        for t in around {
            types.extend(self.planned_at(*t));
        }
        types.extend(extra.iter().copied());
        types
    }

    /// Snapshot copy with every planned unit on the board, plus `extra` in
    /// `at`. Returns the ids the extra units received.
    pub(super) fn what_if(
        &self,
        at: TerritoryId,
        extra: &[UnitTypeId],
    ) -> (GameState, Vec<UnitId>) {
        let mut additions: Vec<(UnitTypeId, TerritoryId)> = self
            .sites
            .iter()
            .flat_map(|s| s.places.iter())
            .flat_map(|p| p.place.iter().map(move |u| (*u, p.territory)))
            .collect();
        let planned = additions.len();
        additions.extend(extra.iter().map(|u| (*u, at)));
        let (state, ids) = self.state().with_added_units(self.ctx.player, &additions);
        let extra_ids = ids[planned..].to_vec();
        (state, extra_ids)
    }

    /// Strongest enemy attack on `t` against its defenders, planned units,
    /// and `extra`.
    pub(super) fn defend_result(
        &self,
        t: TerritoryId,
        extra: &[UnitTypeId],
    ) -> Option<BattleResult> {
        let attack = self.enemy.get(t)?;
        let (hypo, _) = self.what_if(t, extra);
        let hctx = self.ctx.with_state(&hypo);
        let defenders = hypo.allied_units(t, self.ctx.player);
        Some(estimate_defend_battle_results(
            &hctx,
            t,
            &attack.all_units(),
            &defenders,
            &attack.bombard,
        ))
    }

    /// Options that fit both the budget and `production` free slots.
    pub(super) fn affordable<'o>(
        &self,
        options: &[&'o PurchaseOption],
        production: u32,
    ) -> Vec<&'o PurchaseOption> {
        options
            .iter()
            .copied()
            .filter(|o| {
                self.budget.fits(o.cost) && (!o.uses_production() || o.quantity <= production)
            })
            .collect()
    }

    /// Picks among scored options: the best one, or a draw weighted by
    /// score when ties are randomised. Nothing is picked when every score
    /// is zero.
    pub(super) fn choose<'o>(
        &mut self,
        scored: &[(&'o PurchaseOption, f64)],
    ) -> Option<&'o PurchaseOption> {
        let total: f64 = scored.iter().map(|(_, s)| s.max(0.0)).sum();
        if total <= 0.0 {
            return None;
        }
        if self.ctx.config.randomize_ties && total.is_finite() {
            let mut roll = self.rng.gen::<f64>() * total;
            for (o, s) in scored {
                roll -= s.max(0.0);
                if roll <= 0.0 {
                    return Some(*o);
                }
            }
        }
        let mut best: Option<(&PurchaseOption, f64)> = None;
        for (o, s) in scored {
            if best.map_or(true, |(_, b)| *s > b) {
                best = Some((*o, *s));
            }
        }
        best.map(|(o, _)| o)
    }

    pub(super) fn place(&mut self, at: PlaceRef, option: &PurchaseOption, stage: &str) {
        let (si, pi) = at;
        let place = &mut self.sites[si].places[pi];
        for _ in 0..option.quantity {
            place.place.push(option.unit_type);
        }
        let t = place.territory;
        self.ctx
            .observer()
            .purchase_committed(stage, &option.name, self.ctx.name(t), self.budget.remaining());
    }

    /// Place territories needing defenders, most important first.
    fn prioritize_territories_to_defend(&mut self, land: bool) -> Vec<PlaceRef> {
        let state = self.state();
        let player = self.ctx.player;
        let mut seen = BTreeSet::new();
        let mut needs = Vec::new();
        for (si, site) in self.sites.iter().enumerate() {
            for (pi, place) in site.places.iter().enumerate() {
                let t = place.territory;
                let terr = state.territory(t);
                if terr.is_land() != land || !seen.insert(t) {
                    continue;
                }
                let Some(attack) = self.enemy.get(t) else {
                    continue;
                };
                if terr.is_water() && place.defenders.is_empty() {
                    continue;
                }
                needs.push(((si, pi), attack.all_units()));
            }
        }

        let mut ranked = Vec::new();
        for ((si, pi), attackers) in needs {
            let t = self.sites[si].places[pi].territory;
            let Some(result) = self.defend_result(t, &[]) else {
                continue;
            };
            let water = state.territory(t).is_water();
            let own = state.owned_units(t, player);
            let hold_value = if water { state.tuv(&own) / 8.0 } else { 0.0 };
            let only_air =
                !attackers.is_empty() && attackers.iter().all(|u| state.type_of(*u).is_air());
            let falls = (!water && result.has_land_unit_remaining)
                || result.tuv_swing > hold_value
                || (self.is_capital(t)
                    && !only_air
                    && result.win_percentage > 100.0 - self.ctx.win_percentage());
            if !falls {
                continue;
            }
            let place = &mut self.sites[si].places[pi];
            let defender_value = if water && own.is_empty() {
                0.0
            } else {
                state.tuv(&place.defenders)
            };
            place.defense_value = defense_priority(state, t, defender_value);
            place.min_result = Some(result);
            if place.defense_value > 0.0 {
                ranked.push(((si, pi), place.defense_value));
            }
        }
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.into_iter().map(|(r, _)| r).collect()
    }

    /// Whether a defend result means `t` now holds.
    fn holds(&self, t: TerritoryId, result: &BattleResult) -> bool {
        if self.is_capital(t) {
            result.win_percentage < 100.0 - self.ctx.win_percentage() && result.tuv_swing <= 0.0
        } else {
            !result.has_land_unit_remaining && result.tuv_swing <= 0.0
        }
    }

    /// Buys the best defender one at a time until the territory holds, then
    /// keeps the lot only if it was worth the money.
    fn purchase_defenders(
        &mut self,
        prioritized: &[PlaceRef],
        land: bool,
    ) -> Result<(), EngineError> {
        let state = self.state();
        let player = self.ctx.player;
        let catalog = self.catalog.clone();
        let mut options = if land {
            let mut o = catalog.land_fodder();
            o.extend(catalog.land_zero_move());
            o
        } else {
            catalog.sea_defense()
        };
        options.extend(catalog.air());
        options.dedup_by_key(|o| o.unit_type);

        for &(si, pi) in prioritized {
            self.ctx.check_cancelled()?;
            if self.budget.is_empty() {
                return Ok(());
            }
            let t = self.sites[si].places[pi].territory;
            let Some(min_result) = self.sites[si].places[pi].min_result.clone() else {
                continue;
            };
            let attackers = self.enemy.units(t);
            let own: Vec<UnitId> = state.owned_units(t, player);
            let mut need_destroyer = attackers.iter().any(|u| state.type_of(*u).capabilities.sub)
                && !own.iter().any(|u| state.type_of(*u).capabilities.destroyer);
            let mut unused_carrier = state.carrier_free_capacity(t, player);

            let mut to_place: Vec<UnitTypeId> = Vec::new();
            let mut bought: Vec<&PurchaseOption> = Vec::new();
            let mut final_result = min_result.clone();
            loop {
                let production = self.sites[si].remaining().saturating_sub(to_place.len() as u32);
                let candidates = self.affordable(&options, production);
                let local = self.local_types(&[t], &to_place);
                let scored: Vec<(&PurchaseOption, f64)> = candidates
                    .into_iter()
                    .filter(|o| land || !o.is_air() || o.carrier_cost <= unused_carrier)
                    .map(|o| {
                        let score = if land {
                            o.defense_efficiency_at(state, 1, &local)
                        } else {
                            o.sea_defense_efficiency(state, &local, need_destroyer, unused_carrier)
                        };
                        (o, score)
                    })
                    .collect();
                let Some(selected) = self.choose(&scored) else {
                    break;
                };
                if !self.budget.hold(selected) {
                    break;
                }
                if selected.destroyer {
                    need_destroyer = false;
                }
                if selected.is_carrier() {
                    unused_carrier += selected.carrier_capacity;
                }
                if selected.is_air() {
                    let room = selected.carrier_cost * selected.quantity;
                    unused_carrier = unused_carrier.saturating_sub(room);
                }
                for _ in 0..selected.quantity {
                    to_place.push(selected.unit_type);
                }
                bought.push(selected);
                if let Some(result) = self.defend_result(t, &to_place) {
                    final_result = result;
                }
                if self.holds(t, &final_result) {
                    break;
                }
            }

            let superiority = land && has_local_land_superiority(self.ctx, t, SHORT_RANGE);
            let pending = self.budget.pending_cost() as f64;
            let worth = !final_result.has_land_unit_remaining
                || final_result.tuv_swing - pending / 2.0 < min_result.tuv_swing
                || self.is_capital(t)
                || superiority;
            if !bought.is_empty() && worth {
                self.budget.confirm();
                for option in bought {
                    self.place((si, pi), option, "defend");
                }
            } else {
                self.budget.rollback();
                self.sites[si].places[pi].can_hold = false;
                self.ctx.observer().attack_dropped(
                    self.ctx.name(t),
                    "cannot be defended by purchase",
                );
            }
        }
        Ok(())
    }

    fn into_plan(self) -> PurchasePlan {
        let mut placements: Vec<TentativePlacement> = Vec::new();
        for place in self.sites.iter().flat_map(|s| s.places.iter()) {
            if place.place.is_empty() {
                continue;
            }
            match placements.iter_mut().find(|p| p.territory == place.territory) {
                Some(existing) => existing.units.extend(place.place.iter().copied()),
                None => placements.push(TentativePlacement {
                    territory: place.territory,
                    units: place.place.clone(),
                }),
            }
        }
        for (t, kind) in &self.new_factories {
            placements.push(TentativePlacement {
                territory: *t,
                units: vec![*kind],
            });
        }
        let mut cannot_hold: Vec<TerritoryId> = self
            .sites
            .iter()
            .flat_map(|s| s.places.iter())
            .filter(|p| !p.can_hold)
            .map(|p| p.territory)
            .collect();
        cannot_hold.sort();
        cannot_hold.dedup();
        PurchasePlan {
            purchases: self.budget.purchases(),
            placements,
            cannot_hold,
            budget: self.budget.total(),
            spent: self.budget.spent(),
        }
    }
}

/// Plans the purchase phase for `ctx.player` with `budget` resources.
pub fn plan_purchase(ctx: &PlanningContext, budget: u32) -> Result<PurchasePlan, EngineError> {
    ctx.observer().phase_started(PlanPhase::Purchase, ctx.player_name());
    let mut planner = PurchasePlanner::new(ctx, budget);
    let cheapest = planner.catalog.cheapest();
    let nowhere_to_place = planner.sites.is_empty() && !ctx.config.purchase_factories;
    if cheapest.map_or(true, |c| c > budget) || nowhere_to_place {
        ctx.observer().note("nothing affordable to purchase");
        ctx.observer().phase_finished(PlanPhase::Purchase, 0);
        return Ok(planner.into_plan());
    }

    let land = planner.prioritize_territories_to_defend(true);
    planner.purchase_defenders(&land, true)?;

    let prioritized_land = planner.prioritize_land_territories();
    planner.purchase_land_units(&prioritized_land)?;

    let sea = planner.prioritize_territories_to_defend(false);
    planner.purchase_defenders(&sea, false)?;

    planner.purchase_factory(&prioritized_land)?;

    let prioritized_sea = planner.prioritize_sea_territories();
    planner.purchase_sea_and_amphib_units(&prioritized_sea)?;

    planner.purchase_with_remaining_production()?;
    planner.upgrade_units_with_remaining_budget()?;

    let plan = planner.into_plan();
    ctx.observer().phase_finished(PlanPhase::Purchase, plan.placements.len());
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{PlayerId, StateBuilder};
    use crate::context::EngineConfig;

    fn ctx(state: &GameState) -> PlanningContext<'_> {
        PlanningContext::new(state, PlayerId(0), EngineConfig { seed: 5, ..Default::default() })
    }

    #[test]
    fn budget_below_cheapest_option_buys_nothing() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let inf = b.infantry();
        let fac = b.factory();
        b.sell(red, inf);
        let home = b.land("Home", 3, Some(red));
        b.add_unit(red, fac, home);
        let state = b.build();

        let plan = plan_purchase(&ctx(&state), 2).unwrap();
        assert!(plan.purchases.is_empty());
        assert!(plan.placements.is_empty());
        assert_eq!(plan.spent, 0);
    }

    #[test]
    fn threatened_capital_buys_defenders_first() {
        // Cap borders an enemy stack
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let inf = b.infantry();
        let arm = b.armour();
        let fac = b.factory();
        b.sell(red, inf);
        b.sell(red, arm);
        let cap = b.land("Cap", 8, Some(red));
        let front = b.land("Front", 2, Some(blue));
        b.connect(cap, front);
        b.capital(cap, red);
        b.add_unit(red, fac, cap);
        b.add_units(red, inf, cap, 1);
        b.add_units(blue, inf, front, 3);
        let state = b.build();

        let plan = plan_purchase(&ctx(&state), 20).unwrap();
        assert!(plan.spent <= 20);
        let placed: usize = plan
            .placements
            .iter()
            .filter(|p| p.territory == cap)
            .map(|p| p.units.len())
            .sum();
        assert!(placed > 0);
        assert!(!plan.cannot_hold.contains(&cap));
    }

    #[test]
    fn weighted_pick_skips_zero_scores() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let inf = b.infantry();
        let arm = b.armour();
        b.sell(red, inf);
        b.sell(red, arm);
        let _ = b.land("Home", 1, Some(red));
        let state = b.build();
        let c = ctx(&state);
        let mut planner = PurchasePlanner::new(&c, 10);
        let catalog = planner.catalog.clone();
        let all = catalog.all();
        assert!(planner.choose(&[(&all[0], 0.0), (&all[1], 0.0)]).is_none());
        let picked = planner.choose(&[(&all[0], 0.0), (&all[1], 2.0)]).unwrap();
        assert_eq!(picked.unit_type, arm);
    }
}
