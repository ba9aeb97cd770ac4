//! Safety checks run on the committed attacks: border guards, exposed
//! transports, the capital, and fleets stuck in contested water.

use std::collections::{BTreeMap, BTreeSet};

use crate::battle::calculate_battle_results;
use crate::board::{find_route, GameState, PlayerId, TerritoryId, UnitId, UnitTypeId};
use crate::context::PlanningContext;
use crate::defense::hold::assess_hold;
use crate::error::EngineError;
use crate::options::find_max_enemy_attacks;

use super::orders::{MoveKind, MoveOrder};
use super::{flag, AttackPlanner};

/// Best land defender per cost the player can buy, as many as the capital
/// can place and the treasury affords.
fn hypothetical_defenders(
    state: &GameState,
    player: PlayerId,
    capital: TerritoryId,
) -> Vec<(UnitTypeId, TerritoryId)> {
    if !state.has_factory(capital) {
        return Vec::new();
    }
    let owner = state.player(player);
    let best = owner
        .production
        .iter()
        .filter(|rule| rule.cost > 0)
        .filter(|rule| {
            let ut = state.unit_type(rule.unit_type);
            ut.is_land() && !ut.is_infrastructure()
        })
        .map(|rule| {
            let ut = state.unit_type(rule.unit_type);
            let defense =
                (ut.strength(false) * ut.rolls(false) + 2 * ut.hit_points) * rule.quantity.max(1);
            (rule, defense as f64 / rule.cost as f64)
        })
        .max_by(|(a, ea), (b, eb)| ea.total_cmp(eb).then_with(|| b.cost.cmp(&a.cost)));
    let Some((rule, _)) = best else {
        return Vec::new();
    };
    let count = (owner.resources / rule.cost).min(state.territory(capital).production)
        * rule.quantity.max(1);
    vec![(rule.unit_type, capital); count as usize]
}

impl AttackPlanner<'_, '_> {
    /// Keeps one cheap land unit home in every owned territory that borders
    /// an enemy army we are not attacking and would otherwise be empty.
    pub(super) fn move_one_defender_to_land_territories_bordering_enemy(&mut self) {
        let ctx = self.ctx;
        let state = ctx.state;
        let player = ctx.player;
        let attacked: BTreeSet<TerritoryId> = self.prioritized.iter().copied().collect();

        for terr in state.territories.iter().filter(|t| t.is_land() && t.owner == Some(player)) {
            let threatened = terr.neighbors().any(|n| {
                !attacked.contains(&n)
                    && state.territory(n).is_land()
                    && state.enemy_units(n, player).iter().any(|u| {
                        let ut = state.type_of(*u);
                        ut.is_land() && ut.movement > 0 && !ut.is_infrastructure()
                    })
            });
            if !threatened {
                continue;
            }
            let land: Vec<UnitId> = state
                .allied_units(terr.id, player)
                .into_iter()
                .filter(|u| {
                    let ut = state.type_of(*u);
                    ut.is_land() && !ut.is_infrastructure()
                })
                .collect();
            let stays = land.iter().any(|u| {
                state.unit(*u).owner != player
                    || self.already_moved.contains(u)
                    || !self.maps.unit_options.contains_key(u)
            });
            if stays {
                continue;
            }
            let guard = land
                .iter()
                .copied()
                .min_by_key(|u| (state.type_of(*u).cost, *u));
            if let Some(guard) = guard {
                self.maps.unit_options.remove(&guard);
                self.already_moved.insert(guard);
                ctx.observer().note(&format!("keeping a defender in {}", terr.name));
            }
        }
    }

    /// Drops attacks whose transports or bombarding ships would be sunk for
    /// more than the attack is worth.
    pub(super) fn remove_territories_where_transports_are_exposed(&mut self) {
        let ctx = self.ctx;
        let state = ctx.state;
        let assigned = self.maps.assigned_units();
        let mut doomed = Vec::new();

        for &t in &self.prioritized {
            let Some(opt) = self.maps.territories.get_mut(&t) else {
                continue;
            };
            let mut ships_by_sea: BTreeMap<TerritoryId, Vec<UnitId>> = BTreeMap::new();
            for (transport, sea) in opt.transport_unload_from() {
                ships_by_sea.entry(*sea).or_default().push(*transport);
            }
            for (ship, sea) in opt.bombard() {
                ships_by_sea.entry(*sea).or_default().push(*ship);
            }
            if ships_by_sea.is_empty() {
                continue;
            }

            let mut enemy_swing = 0.0;
            for (sea, ships) in &ships_by_sea {
                let Some(attack) = self.enemy.get(*sea) else {
                    continue;
                };
                let enemy_ctx = ctx.as_player(attack.player);
                let attackers = attack.all_units();
                let mut escorted: Vec<UnitId> = state
                    .allied_units(*sea, ctx.player)
                    .into_iter()
                    .filter(|u| !assigned.contains(u))
                    .collect();
                escorted.extend(ships.iter().copied());
                let full = calculate_battle_results(
                    &enemy_ctx,
                    *sea,
                    &attackers,
                    &escorted,
                    &attack.bombard,
                );
                let bare = calculate_battle_results(
                    &enemy_ctx,
                    *sea,
                    &attackers,
                    ships,
                    &attack.bombard,
                );
                let swing = full.tuv_swing.min(bare.tuv_swing);
                if swing > 0.0 {
                    enemy_swing += swing;
                }
            }

            let terr = state.territory(t);
            let capital = flag(terr.is_capital());
            let gain = opt.result(ctx).tuv_swing + terr.production as f64 * (1.0 + 3.0 * capital);
            if 0.5 * enemy_swing > gain {
                doomed.push(t);
            }
        }
        for t in doomed {
            self.remove_target(t, "transports exposed");
        }
    }

    /// Allied units left standing at the capital once the attacks move out,
    /// plus planned purchases and the land army one step away.
    fn capital_defenders(
        &self,
        hypo: &GameState,
        capital: TerritoryId,
        placed: &[UnitId],
    ) -> Vec<UnitId> {
        let player = self.ctx.player;
        let assigned = self.maps.assigned_units();
        let mut defenders: Vec<UnitId> = hypo
            .allied_units(capital, player)
            .into_iter()
            .filter(|u| !assigned.contains(u))
            .collect();
        for p in placed {
            if !defenders.contains(p) {
                defenders.push(*p);
            }
        }
        for n in hypo.territory(capital).neighbors() {
            if !hypo.territory(n).is_land() {
                continue;
            }
            defenders.extend(hypo.owned_units(n, player).into_iter().filter(|u| {
                let ut = hypo.type_of(*u);
                ut.is_land()
                    && !ut.is_infrastructure()
                    && hypo.movement_left(*u) > 0
                    && !assigned.contains(u)
            }));
        }
        defenders
    }

    /// Gives up attacks, worst value per capital defender first, until the
    /// capital would survive the strongest enemy attack with the defenders
    /// left behind and what the treasury can still place.
    pub(super) fn remove_attacks_until_capital_can_be_held(&mut self) -> Result<(), EngineError> {
        let ctx = self.ctx;
        let state = ctx.state;
        let Some(capital) = state.capital_of(ctx.player) else {
            return Ok(());
        };
        let additions = hypothetical_defenders(state, ctx.player, capital);
        let (hypo, placed) = state.with_added_units(ctx.player, &additions);
        let hctx = ctx.with_state(&hypo);
        let targets = BTreeSet::from([capital]);

        loop {
            ctx.check_cancelled()?;
            let cleared: BTreeSet<TerritoryId> = self.prioritized.iter().copied().collect();
            let enemy = find_max_enemy_attacks(&hctx, &targets, &cleared);
            let Some(attack) = enemy.get(capital) else {
                return Ok(());
            };
            let defenders = self.capital_defenders(&hypo, capital, &placed);
            let attackers = attack.all_units();
            let hold = assess_hold(&hctx, capital, &attackers, &attack.bombard, &defenders);
            if hold.can_hold {
                return Ok(());
            }

            let near_capital = |u: &UnitId| {
                state.location(*u).is_some_and(|l| {
                    l == capital
                        || (state.territory(l).is_land()
                            && state.territory(capital).neighbors().any(|n| n == l))
                })
            };
            let mut worst: Option<(TerritoryId, f64)> = None;
            for &t in &self.prioritized {
                let Some(opt) = self.maps.territories.get(&t) else {
                    continue;
                };
                let from_home = opt.attackers().iter().filter(|u| near_capital(u)).count();
                if from_home == 0 {
                    continue;
                }
                let ratio = from_home as f64 / opt.value.max(0.1);
                if worst.map_or(true, |(_, r)| ratio > r) {
                    worst = Some((t, ratio));
                }
            }
            match worst {
                Some((t, _)) => self.remove_target(t, "capital would fall"),
                None => return Ok(()),
            }
        }
    }

    /// Moves our ships out of water shared with enemy units we are not
    /// attacking, to the neighbouring enemy-free zone with the most friends.
    pub(super) fn contested_sea_orders(&self) -> Vec<MoveOrder> {
        let ctx = self.ctx;
        let state = ctx.state;
        let player = ctx.player;
        let attacked: BTreeSet<TerritoryId> = self.prioritized.iter().copied().collect();
        let assigned = self.maps.assigned_units();
        let mut orders = Vec::new();

        for terr in state.territories.iter().filter(|t| t.is_water()) {
            if attacked.contains(&terr.id) || !state.has_enemy_units(terr.id, player) {
                continue;
            }
            let refuge = terr
                .neighbors()
                .filter(|n| state.territory(*n).is_water() && !state.has_enemy_units(*n, player))
                .max_by(|a, b| {
                    let (fa, fb) = (
                        state.allied_units(*a, player).len(),
                        state.allied_units(*b, player).len(),
                    );
                    fa.cmp(&fb).then_with(|| b.cmp(a))
                });
            let Some(refuge) = refuge else {
                continue;
            };
            let Some(route) = find_route(state, terr.id, refuge, |x| x.is_water()) else {
                continue;
            };
            let mut units = Vec::new();
            for u in state.owned_units(terr.id, player) {
                let ut = state.type_of(u);
                if !ut.is_sea() || assigned.contains(&u) || self.already_moved.contains(&u) {
                    continue;
                }
                if state.movement_left(u) < route.cost {
                    ctx.observer().unit_skipped(u, "cannot leave contested water");
                    continue;
                }
                units.push(u);
            }
            if !units.is_empty() {
                orders.push(MoveOrder {
                    units,
                    route,
                    kind: MoveKind::Reposition,
                });
            }
        }
        orders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::StateBuilder;
    use crate::context::EngineConfig;

    fn ctx(state: &GameState) -> PlanningContext<'_> {
        PlanningContext::new(state, PlayerId(0), EngineConfig { seed: 3, ..Default::default() })
    }

    #[test]
    fn lone_border_unit_stays_home() {
        // Outpost borders Camp, where a Blue army sits out of reach of attack
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let inf = b.infantry();
        let outpost = b.land("Outpost", 1, Some(red));
        let camp = b.land("Camp", 1, Some(blue));
        b.connect(outpost, camp);
        let guard = b.add_unit(red, inf, outpost);
        b.add_units(blue, inf, camp, 4);
        let state = b.build();
        let c = ctx(&state);

        let mut planner = AttackPlanner::new(&c);
        assert!(planner.maps.unit_options.contains_key(&guard));
        planner.move_one_defender_to_land_territories_bordering_enemy();
        assert!(planner.already_moved.contains(&guard));
        assert!(!planner.maps.unit_options.contains_key(&guard));
    }

    #[test]
    fn defender_catalogue_fills_capital_production() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let inf = b.infantry();
        let arm = b.armour();
        let factory = b.factory();
        b.sell(red, inf);
        b.sell(red, arm);
        b.resources(red, 100);
        let home = b.land("Home", 4, Some(red));
        b.capital(home, red);
        b.add_unit(red, factory, home);
        let state = b.build();

        let planned = hypothetical_defenders(&state, red, home);
        assert_eq!(planned.len(), 4);
        assert!(planned.iter().all(|(kind, t)| *kind == inf && *t == home));
    }

    #[test]
    fn capital_keeps_its_garrison() {
        // Capital next to a large enemy army; the only target lies the other way
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let inf = b.infantry();
        let arm = b.armour();
        let home = b.land("Home", 4, Some(red));
        let prize = b.land("Prize", 3, Some(blue));
        let staging = b.land("Staging", 1, Some(blue));
        b.connect(home, prize);
        b.connect(home, staging);
        b.capital(home, red);
        b.add_units(red, arm, home, 4);
        b.add_unit(blue, inf, prize);
        b.add_units(blue, arm, staging, 4);
        let state = b.build();
        let c = ctx(&state);

        let mut planner = AttackPlanner::new(&c);
        planner.prioritized = vec![prize];
        let tanks: Vec<UnitId> = state.owned_units(home, red);
        if let Some(opt) = planner.maps.territories.get_mut(&prize) {
            opt.value = 5.0;
            for u in &tanks {
                opt.add_unit(*u);
            }
        }
        planner.remove_attacks_until_capital_can_be_held().unwrap();
        assert!(planner.prioritized.is_empty());
    }

    #[test]
    fn ships_leave_contested_water() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let destroyer = b.destroyer();
        let sub = b.submarine();
        let shared = b.water("Shared");
        let open = b.water("Open");
        b.connect(shared, open);
        let ship = b.add_unit(red, destroyer, shared);
        b.add_unit(blue, sub, shared);
        let state = b.build();
        let c = ctx(&state);

        let mut planner = AttackPlanner::new(&c);
        planner.prioritized.clear();
        let orders = planner.contested_sea_orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].units, vec![ship]);
        assert_eq!(orders[0].route.end(), open);
        assert_eq!(orders[0].kind, MoveKind::Reposition);
    }
}
