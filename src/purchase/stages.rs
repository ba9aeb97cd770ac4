//! Land, factory, sea, and upgrade stages.

use std::collections::BTreeSet;

use crate::battle::{
    has_local_land_superiority, has_local_naval_superiority, strength_difference, MEDIUM_RANGE,
    SHORT_RANGE,
};
use crate::board::TerritoryId;
use crate::defense::assess_hold;
use crate::error::EngineError;
use crate::eval::find_territory_values;

use super::option::PurchaseOption;
use super::planner::{PlaceRef, PurchasePlanner};

/// Land radius counted when looking for enemy pressure.
const PRESSURE_RADIUS: u32 = 9;
/// Enemy distance assumed when no enemy land is reachable.
const FAR_FROM_ENEMY: u32 = 10;

impl PurchasePlanner<'_, '_> {
    fn nearest_enemy_land(&self, t: TerritoryId) -> Option<u32> {
        let state = self.state();
        let land = &self.ctx.distances().land;
        state
            .territories
            .iter()
            .filter(|x| {
                x.is_land()
                    && (state.is_enemy_territory(x.id, self.ctx.player)
                        || state.is_neutral_land(x.id))
            })
            .filter_map(|x| land.get(t, x.id))
            .filter(|d| *d > 0)
            .min()
    }

    /// Holdable factory land worth reinforcing: near the front or without
    /// local superiority. Best strategic value first.
    pub(super) fn prioritize_land_territories(&self) -> Vec<PlaceRef> {
        let state = self.state();
        let player = self.ctx.player;
        let land = &self.ctx.distances().land;
        let mut ranked: Vec<(PlaceRef, f64)> = Vec::new();
        for (si, site) in self.sites.iter().enumerate() {
            let place = site.land();
            let t = place.territory;
            if place.strategic_value < 1.0 || !place.can_hold {
                continue;
            }
            let enemy_neighbor = state
                .territory(t)
                .neighbors()
                .any(|n| state.is_enemy_territory(n, player));
            let nearby_enemy = land
                .within(t, PRESSURE_RADIUS)
                .into_iter()
                .filter(|n| state.is_enemy_territory(*n, player))
                .count();
            if enemy_neighbor
                || nearby_enemy >= 3
                || !has_local_land_superiority(self.ctx, t, SHORT_RANGE)
            {
                ranked.push(((si, 0), place.strategic_value));
            }
        }
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.into_iter().map(|(r, _)| r).collect()
    }

    /// Fills each prioritized factory with a mix of fodder and attack or
    /// defence units. The fodder share shrinks the farther the enemy is.
    pub(super) fn purchase_land_units(
        &mut self,
        prioritized: &[PlaceRef],
    ) -> Result<(), EngineError> {
        let state = self.state();
        let ctx = self.ctx;
        let land = &ctx.distances().land;
        let catalog = self.catalog.clone();
        let fodder = catalog.land_fodder();
        let attack = catalog.land_attack();
        let defense = catalog.land_defense();

        for &(si, pi) in prioritized {
            self.ctx.check_cancelled()?;
            let t = self.sites[si].places[pi].territory;
            if self.sites[si].remaining() == 0 || self.budget.is_empty() {
                continue;
            }
            let enemy_distance = self.nearest_enemy_land(t).unwrap_or(FAR_FROM_ENEMY);
            let fodder_percent = 80.0 - 5.0 * enemy_distance as f64;
            let around = land.within(t, 2);

            let mut added_fodder = 0u32;
            let mut added = 0u32;
            let mut attack_minus_defense = 0.0;
            let mut select_fodder = true;
            loop {
                let production = self.sites[si].remaining();
                let local = self.local_types(&around, &[]);
                let defense_options = self.affordable(&defense, production);
                let attack_options = self.affordable(&attack, production);
                let fodder_options = self.affordable(&fodder, production);
                let (scored, is_fodder): (Vec<(&PurchaseOption, f64)>, bool) =
                    if !select_fodder && attack_minus_defense > 0.0 && !defense_options.is_empty() {
                        let s = defense_options
                            .into_iter()
                            .map(|o| (o, o.defense_efficiency_at(state, enemy_distance, &local)))
                            .collect();
                        (s, false)
                    } else if !select_fodder && !attack_options.is_empty() {
                        let s = attack_options
                            .into_iter()
                            .map(|o| (o, o.attack_efficiency_at(state, enemy_distance, &local)))
                            .collect();
                        (s, false)
                    } else {
                        let s = fodder_options
                            .into_iter()
                            .map(|o| (o, o.fodder_efficiency(state, enemy_distance, &local)))
                            .collect();
                        (s, true)
                    };
                let Some(selected) = self.choose(&scored) else {
                    break;
                };
                if !self.budget.buy(selected) {
                    break;
                }
                self.place((si, pi), selected, "land");
                added += selected.quantity;
                if is_fodder {
                    added_fodder += selected.quantity;
                }
                attack_minus_defense += selected.attack - selected.defense;
                select_fodder = added_fodder as f64 / added as f64 * 100.0 <= fodder_percent;
            }
        }
        Ok(())
    }

    /// Buys one factory once existing production is used up, at the most
    /// valuable safe territory. Cheap land units bought earlier are given
    /// back when the money is short.
    pub(super) fn purchase_factory(
        &mut self,
        prioritized_land: &[PlaceRef],
    ) -> Result<(), EngineError> {
        if !self.ctx.config.purchase_factories || !self.new_factories.is_empty() {
            return Ok(());
        }
        if self.sites.iter().any(|s| s.remaining() > 0) {
            return Ok(());
        }
        let catalog = self.catalog.clone();
        let Some(factory) = catalog.factories().into_iter().min_by_key(|o| o.cost) else {
            return Ok(());
        };
        self.ctx.check_cancelled()?;
        let state = self.state();
        let ctx = self.ctx;
        let player = ctx.player;
        let land = &ctx.distances().land;
        let surplus = self.budget.remaining() >= 2 * factory.cost;
        let min_production = if surplus { 2 } else { 3 };

        let candidates: Vec<TerritoryId> = state
            .territories
            .iter()
            .filter(|t| t.is_land() && t.owner == Some(player) && !state.has_factory(t.id))
            .filter(|t| t.production >= min_production)
            .map(|t| t.id)
            .collect();
        let values = find_territory_values(
            ctx,
            &BTreeSet::new(),
            &BTreeSet::new(),
            candidates.iter().copied(),
        );

        let mut best: Option<(TerritoryId, f64)> = None;
        for t in candidates {
            let attackers = self.enemy.units(t);
            let defenders = state.allied_units(t, player);
            if !assess_hold(self.ctx, t, &attackers, &self.enemy.bombard(t), &defenders).can_hold {
                continue;
            }
            if !has_local_land_superiority(self.ctx, t, MEDIUM_RANGE) {
                continue;
            }
            let coastal = state.territory(t).neighbors().any(|n| state.territory(n).is_water());
            let pressure = land
                .within(t, 2)
                .into_iter()
                .filter(|n| state.is_enemy_territory(*n, player))
                .count();
            if !coastal && pressure < 2 {
                continue;
            }
            let value = values.get(t) * state.territory(t).production as f64;
            if best.map_or(true, |(_, v)| value > v) {
                best = Some((t, value));
            }
        }
        let Some((target, _)) = best else {
            return Ok(());
        };

        // Give back the priciest land units until the factory fits
        let mut refunds: Vec<(PlaceRef, &PurchaseOption)> = Vec::new();
        for &(si, pi) in prioritized_land {
            for kind in &self.sites[si].places[pi].place {
                if let Some(o) = catalog.get(*kind).filter(|o| o.is_land() && o.quantity == 1) {
                    refunds.push(((si, pi), o));
                }
            }
        }
        refunds.sort_by(|a, b| b.1.cost.cmp(&a.1.cost));
        let mut freed = 0;
        let mut take = 0;
        while self.budget.remaining() + freed < factory.cost && take < refunds.len() {
            freed += refunds[take].1.cost;
            take += 1;
        }
        if self.budget.remaining() + freed < factory.cost {
            return Ok(());
        }
        for ((si, pi), option) in refunds.into_iter().take(take) {
            let place = &mut self.sites[si].places[pi].place;
            if let Some(i) = place.iter().position(|k| *k == option.unit_type) {
                place.remove(i);
                self.budget.refund(option);
            }
        }
        if self.budget.buy(factory) {
            self.new_factories.push((target, factory.unit_type));
            self.ctx
                .observer()
                .purchase_committed(
                    "factory",
                    &factory.name,
                    self.ctx.name(target),
                    self.budget.remaining(),
                );
        }
        Ok(())
    }

    /// Holdable sea zones next to our factories, valued up where our
    /// transports gather and down where the fleet first needs defending.
    pub(super) fn prioritize_sea_territories(&self) -> Vec<PlaceRef> {
        let player = self.ctx.player;
        let mut seen = BTreeSet::new();
        let mut ranked: Vec<(PlaceRef, f64)> = Vec::new();
        for si in 0..self.sites.len() {
            for pi in 1..self.sites[si].places.len() {
                let place = &self.sites[si].places[pi];
                let t = place.territory;
                if place.strategic_value <= 0.0 || !place.can_hold || !seen.insert(t) {
                    continue;
                }
                let (hypo, _) = self.what_if(t, &[]);
                let units = hypo.allied_units(t, player);
                let transports = units
                    .iter()
                    .filter(|u| hypo.unit(**u).owner == player && hypo.type_of(**u).is_transport())
                    .count();
                let warships = units.iter().filter(|u| !hypo.type_of(**u).is_transport()).count();
                let attackers = self.enemy.units(t);
                let outgunned = !attackers.is_empty()
                    && strength_difference(&hypo, t, &attackers, &units) > 50.0;
                let hctx = self.ctx.with_state(&hypo);
                let need = outgunned || !has_local_naval_superiority(&hctx, t);
                let value = place.strategic_value
                    * (1.0 + transports as f64 + 0.1 * warships as f64)
                    / (1.0 + if need { 3.0 } else { 0.0 });
                ranked.push(((si, pi), value));
            }
        }
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.into_iter().map(|(r, _)| r).collect()
    }

    /// Enemy land a transport leaving `t` could unload into this turn.
    fn amphib_targets(&self, t: TerritoryId, reach: u32) -> Vec<TerritoryId> {
        let state = self.state();
        let water = &self.ctx.distances().water;
        let mut targets: BTreeSet<TerritoryId> = BTreeSet::new();
        for sea in water.within(t, reach) {
            for n in state.territory(sea).neighbors() {
                if state.is_enemy_territory(n, self.ctx.player) {
                    targets.insert(n);
                }
            }
        }
        targets.into_iter().collect()
    }

    /// Warships until the zone has local naval superiority, then transports
    /// loaded with the best cargo, at most one per reachable landing target.
    pub(super) fn purchase_sea_and_amphib_units(
        &mut self,
        prioritized: &[PlaceRef],
    ) -> Result<(), EngineError> {
        let state = self.state();
        let player = self.ctx.player;
        let catalog = self.catalog.clone();
        let warships = catalog.sea_defense();
        let transports = catalog.transports();
        let cargo_options = if self.ctx.config.allow_amphibious {
            catalog.amphib()
        } else {
            Vec::new()
        };

        for &(si, pi) in prioritized {
            self.ctx.check_cancelled()?;
            let t = self.sites[si].places[pi].territory;
            let attackers = self.enemy.units(t);
            let need_destroyer = attackers.iter().any(|u| state.type_of(*u).capabilities.sub);

            loop {
                let (hypo, _) = self.what_if(t, &[]);
                if has_local_naval_superiority(&self.ctx.with_state(&hypo), t) {
                    break;
                }
                let production = self.sites[si].remaining();
                let local = self.local_types(&[t], &[]);
                let has_destroyer =
                    local.iter().any(|k| state.unit_type(*k).capabilities.destroyer);
                let unused_carrier = hypo.carrier_free_capacity(t, player);
                let scored: Vec<(&PurchaseOption, f64)> = self
                    .affordable(&warships, production)
                    .into_iter()
                    .map(|o| {
                        let score =
                            o.sea_defense_efficiency(
                                state,
                                &local,
                                need_destroyer && !has_destroyer,
                                unused_carrier,
                            );
                        (o, score)
                    })
                    .collect();
                let Some(selected) = self.choose(&scored) else {
                    break;
                };
                if !self.budget.buy(selected) {
                    break;
                }
                self.place((si, pi), selected, "sea");
            }

            if cargo_options.is_empty() {
                continue;
            }
            let reach = transports.iter().map(|o| o.movement).max().unwrap_or(0);
            let targets = self.amphib_targets(t, reach);
            let mut loaded = 0;
            while loaded < targets.len() {
                let production = self.sites[si].remaining();
                let scored: Vec<(&PurchaseOption, f64)> = self
                    .affordable(&transports, production)
                    .into_iter()
                    .map(|o| (o, o.transport_efficiency))
                    .collect();
                let Some(transport) = self.choose(&scored) else {
                    break;
                };
                if !self.budget.hold(transport) {
                    break;
                }
                let mut space = transport.transport_capacity;
                let mut slots = production.saturating_sub(transport.quantity);
                let local = self.local_types(&[self.sites[si].territory], &[]);
                let mut cargo: Vec<&PurchaseOption> = Vec::new();
                loop {
                    let scored: Vec<(&PurchaseOption, f64)> = self
                        .affordable(&cargo_options, slots)
                        .into_iter()
                        .filter(|o| o.transport_cost * o.quantity <= space)
                        .map(|o| (o, o.amphib_efficiency(state, &local)))
                        .collect();
                    let Some(selected) = self.choose(&scored) else {
                        break;
                    };
                    if !self.budget.hold(selected) {
                        break;
                    }
                    space -= selected.transport_cost * selected.quantity;
                    slots -= selected.quantity;
                    cargo.push(selected);
                }
                if cargo.is_empty() {
                    self.budget.rollback();
                    break;
                }
                self.budget.confirm();
                self.place((si, pi), transport, "transport");
                for option in cargo {
                    self.place((si, 0), option, "amphib");
                }
                loaded += 1;
            }
        }
        Ok(())
    }

    /// Spends leftover production on the strongest attackers at holdable
    /// factories, most valuable first.
    pub(super) fn purchase_with_remaining_production(&mut self) -> Result<(), EngineError> {
        let state = self.state();
        let catalog = self.catalog.clone();
        let mut options = catalog.land();
        options.extend(catalog.air());

        let mut order: Vec<(usize, f64)> = self
            .sites
            .iter()
            .enumerate()
            .filter(|(_, s)| s.land().can_hold)
            .map(|(i, s)| (i, s.land().strategic_value))
            .collect();
        order.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (si, _) in order {
            self.ctx.check_cancelled()?;
            let t = self.sites[si].territory;
            let enemy_distance = self.nearest_enemy_land(t).unwrap_or(FAR_FROM_ENEMY);
            loop {
                let production = self.sites[si].remaining();
                if production == 0 || self.budget.is_empty() {
                    break;
                }
                let local = self.local_types(&[t], &[]);
                let scored: Vec<(&PurchaseOption, f64)> = self
                    .affordable(&options, production)
                    .into_iter()
                    .map(|o| (o, o.attack_efficiency_at(state, enemy_distance, &local)))
                    .collect();
                let Some(selected) = self.choose(&scored) else {
                    break;
                };
                if !self.budget.buy(selected) {
                    break;
                }
                self.place((si, 0), selected, "remaining");
            }
        }
        Ok(())
    }

    /// Swaps the cheapest placed land units for longer-range or air units
    /// while money allows, starting far from the front.
    pub(super) fn upgrade_units_with_remaining_budget(&mut self) -> Result<(), EngineError> {
        if self.budget.is_empty() {
            return Ok(());
        }
        let catalog = self.catalog.clone();
        let mut order: Vec<(usize, f64)> = self
            .sites
            .iter()
            .enumerate()
            .filter(|(_, s)| s.land().can_hold)
            .map(|(i, s)| (i, s.land().strategic_value))
            .collect();
        order.sort_by(|a, b| a.1.total_cmp(&b.1));

        for (si, value) in order {
            self.ctx.check_cancelled()?;
            let mut upgrades_left = self.sites[si].capacity / 3;
            let mut options: Vec<&PurchaseOption> = catalog.land();
            options.extend(catalog.air());
            while upgrades_left > 0 {
                let cheapest = self.sites[si]
                    .land()
                    .place
                    .iter()
                    .filter_map(|k| options.iter().copied().find(|o| o.unit_type == *k))
                    .min_by_key(|o| o.cost);
                let Some(cheapest) = cheapest else {
                    break;
                };
                let budget_after_refund = self.budget.remaining() + cheapest.cost;
                let floor = cheapest.upgrade_efficiency(value);
                let mut best: Option<(&PurchaseOption, f64)> = None;
                for o in &options {
                    if o.cost <= cheapest.cost
                        || o.cost > budget_after_refund
                        || o.quantity > cheapest.quantity
                    {
                        continue;
                    }
                    if !(o.is_air()
                        || value >= 0.25
                        || o.transport_cost <= cheapest.transport_cost)
                    {
                        continue;
                    }
                    let mut efficiency = o.upgrade_efficiency(value);
                    if o.is_air() {
                        efficiency *= 10.0;
                    }
                    if efficiency > best.map_or(floor, |(_, e)| e) {
                        best = Some((*o, efficiency));
                    }
                }
                let Some((upgrade, _)) = best else {
                    options.retain(|o| o.unit_type != cheapest.unit_type);
                    continue;
                };
                let place = &mut self.sites[si].places[0].place;
                let removable = place.iter().filter(|k| **k == cheapest.unit_type).count() as u32;
                if removable < cheapest.quantity {
                    options.retain(|o| o.unit_type != cheapest.unit_type);
                    continue;
                }
                for _ in 0..cheapest.quantity {
                    if let Some(i) = place.iter().position(|k| *k == cheapest.unit_type) {
                        place.remove(i);
                    }
                }
                self.budget.refund(cheapest);
                if self.budget.buy(upgrade) {
                    self.place((si, 0), upgrade, "upgrade");
                }
                upgrades_left = upgrades_left.saturating_sub(cheapest.quantity);
            }
        }
        Ok(())
    }
}
