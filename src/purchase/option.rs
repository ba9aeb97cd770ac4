//! Purchase options and their cost efficiencies.
//!
//! Every production rule of the acting player becomes one `PurchaseOption`
//! with its raw combat numbers already scaled by quantity. The planner never
//! compares options on raw stats; it compares the efficiency metrics below,
//! each normalised by cost.
//!
//! The distance- and support-aware metrics are raised to a high power
//! before they are compared, so a weighted random pick stays close to the
//! argmax.

use serde::{Deserialize, Serialize};

use crate::board::{Domain, GameState, PlayerId, ProductionRule, SupportKind, UnitTypeId};

/// Exponent sharpening the composite efficiencies.
const SHARPNESS: i32 = 30;

/// A single entry of the production catalogue with derived efficiencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOption {
    pub unit_type: UnitTypeId,
    pub name: String,
    pub domain: Domain,
    pub cost: u32,
    /// Units delivered per purchase.
    pub quantity: u32,
    pub movement: u32,
    /// Hit points of the whole purchase, zero for infrastructure.
    pub hit_points: f64,
    /// Attack of the whole purchase, rolls included.
    pub attack: f64,
    pub defense: f64,
    /// `attack` plus the marine bonus, used when landing from transports.
    pub amphib_attack: f64,
    pub transport_capacity: u32,
    pub transport_cost: u32,
    pub carrier_capacity: u32,
    pub carrier_cost: u32,
    pub infrastructure: bool,
    pub factory: bool,
    pub destroyer: bool,
    pub sub: bool,

    pub cost_per_hit_point: f64,
    pub hit_point_efficiency: f64,
    pub attack_efficiency: f64,
    pub defense_efficiency: f64,
    pub transport_efficiency: f64,
    pub carrier_efficiency: f64,

    dice_sides: f64,
}

impl PurchaseOption {
    pub fn new(state: &GameState, rule: &ProductionRule) -> Self {
        let ut = state.unit_type(rule.unit_type);
        let qty = rule.quantity.max(1);
        let q = qty as f64;
        let cost = rule.cost.max(1) as f64;
        let dice = state.dice_sides.max(1) as f64;
        let hp = if ut.is_infrastructure() {
            0.0
        } else {
            (ut.hit_points * qty) as f64
        };
        let attack = (ut.strength(true) * ut.rolls(true)) as f64 * q;
        let defense = (ut.strength(false) * ut.rolls(false)) as f64 * q;
        let amphib_attack = attack + 0.5 * ut.marine_bonus as f64 * q;
        let a = attack * 6.0 / dice;
        let d = defense * 6.0 / dice;
        PurchaseOption {
            unit_type: rule.unit_type,
            name: ut.name.clone(),
            domain: ut.domain,
            cost: rule.cost,
            quantity: qty,
            movement: ut.movement,
            hit_points: hp,
            attack,
            defense,
            amphib_attack,
            transport_capacity: ut.transport_capacity * qty,
            transport_cost: ut.transport_cost,
            carrier_capacity: ut.carrier_capacity * qty,
            carrier_cost: ut.carrier_cost,
            infrastructure: ut.is_infrastructure(),
            factory: ut.capabilities.factory,
            destroyer: ut.capabilities.destroyer,
            sub: ut.capabilities.sub,
            cost_per_hit_point: if hp > 0.0 { cost / hp } else { f64::INFINITY },
            hit_point_efficiency: (hp + 0.2 * a + 0.2 * d) / cost,
            attack_efficiency: (1.0 + hp) * (hp + a + 0.5 * d) / cost,
            defense_efficiency: (1.0 + hp) * (hp + 0.5 * a + d) / cost,
            transport_efficiency: (ut.transport_capacity * qty) as f64 / cost,
            carrier_efficiency: (ut.carrier_capacity * qty) as f64 / cost,
            dice_sides: dice,
        }
    }

    pub fn is_land(&self) -> bool {
        self.domain == Domain::Land
    }

    pub fn is_air(&self) -> bool {
        self.domain == Domain::Air
    }

    pub fn is_sea(&self) -> bool {
        self.domain == Domain::Sea
    }

    pub fn is_transport(&self) -> bool {
        self.transport_capacity > 0
    }

    pub fn is_carrier(&self) -> bool {
        self.carrier_capacity > 0
    }

    /// Land unit a transport can carry.
    pub fn is_transportable(&self) -> bool {
        self.is_land() && self.transport_cost > 0 && !self.infrastructure
    }

    /// Whether buying this uses a slot of the factory's production.
    pub fn uses_production(&self) -> bool {
        !self.factory
    }

    /// Movement discount for land units bought far from the enemy: 1 for
    /// adjacent fronts, growing with both distance and the unit's speed.
    fn land_distance_factor(&self, enemy_distance: u32) -> f64 {
        if self.movement == 0 {
            return 0.1;
        }
        let distance = (enemy_distance as f64 - 1.5).max(0.0);
        let m = 2f64.powi(self.movement as i32 - 1);
        let move_factor = 1.0 + 2.0 * (m - 1.0) / m;
        move_factor.powf(distance / 5.0)
    }

    /// Expected bonus this purchase adds as a supporter, given the unit types
    /// that would stand next to it.
    pub fn support_factor(&self, state: &GameState, local: &[UnitTypeId], defending: bool) -> f64 {
        let mut total = 0.0;
        for rule in state.support_rules.iter().filter(|r| r.supporter == self.unit_type) {
            if !rule.applies(!defending) {
                continue;
            }
            let added = rule.number * self.quantity;
            let supporters = local.iter().filter(|t| **t == rule.supporter).count() as u32;
            let provided = supporters * rule.number;
            let supportable = local.iter().filter(|t| rule.supported.contains(t)).count() as u32;
            let extra = supportable.saturating_sub(provided);
            let ratio = (2.0 * extra as f64 / (supportable + added) as f64).min(1.0);
            let bonus = match rule.kind {
                SupportKind::Strength => rule.bonus as f64,
                SupportKind::Rolls => rule.bonus as f64 * self.dice_sides * 0.75,
            };
            total += (added as f64 * 0.9).powf(0.9) * bonus * ratio;
        }
        total
    }

    fn composite(
        &self,
        attack_factor: f64,
        defense_factor: f64,
        support: (f64, f64),
        distance_factor: f64,
        sea_factor: f64,
    ) -> f64 {
        let q = self.quantity as f64;
        let scale = 6.0 / self.dice_sides;
        let attack = attack_factor * (self.attack + support.0 * q) * scale;
        let defense = defense_factor * (self.defense + support.1 * q) * scale;
        let base = (2.0 * self.hit_points + attack + defense)
            * (3.0 + self.hit_points / q)
            * distance_factor
            * sea_factor
            / self.cost.max(1) as f64;
        base.max(0.0).powi(SHARPNESS) / q
    }

    fn supports(&self, state: &GameState, local: &[UnitTypeId]) -> (f64, f64) {
        (self.support_factor(state, local, false), self.support_factor(state, local, true))
    }

    /// Cheap hit points that still fight a little.
    pub fn fodder_efficiency(
        &self,
        state: &GameState,
        enemy_distance: u32,
        local: &[UnitTypeId],
    ) -> f64 {
        let distance = self.land_distance_factor(enemy_distance).sqrt();
        self.composite(0.25, 0.25, self.supports(state, local), distance, 1.0)
    }

    pub fn attack_efficiency_at(
        &self,
        state: &GameState,
        enemy_distance: u32,
        local: &[UnitTypeId],
    ) -> f64 {
        let distance = self.land_distance_factor(enemy_distance);
        self.composite(1.25, 0.75, self.supports(state, local), distance, 1.0)
    }

    pub fn defense_efficiency_at(
        &self,
        state: &GameState,
        enemy_distance: u32,
        local: &[UnitTypeId],
    ) -> f64 {
        let distance = self.land_distance_factor(enemy_distance);
        self.composite(0.75, 1.25, self.supports(state, local), distance, 1.0)
    }

    /// Naval defence value. Air only counts when it has a free carrier deck.
    pub fn sea_defense_efficiency(
        &self,
        state: &GameState,
        local: &[UnitTypeId],
        need_destroyer: bool,
        unused_carrier_capacity: u32,
    ) -> f64 {
        if self.is_air()
            && (self.carrier_cost == 0 || self.carrier_cost > unused_carrier_capacity)
        {
            return 0.0;
        }
        let mut sea_factor = 1.0;
        if need_destroyer && self.destroyer {
            sea_factor = 8.0;
        }
        if self.is_air() || (self.is_carrier() && unused_carrier_capacity == 0) {
            sea_factor = 4.0;
        }
        self.composite(0.75, 1.0, self.supports(state, local), self.movement as f64, sea_factor)
    }

    /// Value as transport cargo: landing attack, per transport slot.
    pub fn amphib_efficiency(&self, state: &GameState, local: &[UnitTypeId]) -> f64 {
        let (sup_a, sup_d) = self.supports(state, local);
        let q = self.quantity as f64;
        let scale = 6.0 / self.dice_sides;
        let attack = (self.amphib_attack + sup_a * q) * scale;
        let defense = (self.defense + sup_d * q) * scale;
        let transport_factor = (1.0 / self.transport_cost.max(1) as f64).powf(0.2);
        let base = (2.0 * self.hit_points + attack + defense)
            * (3.0 + self.hit_points / q)
            * transport_factor
            / self.cost.max(1) as f64;
        base.max(0.0).powi(SHARPNESS) / q
    }

    /// Score of replacing cheap units by this one: long range far from the
    /// front, defence close to it.
    pub fn upgrade_efficiency(&self, strategic_value: f64) -> f64 {
        let multiplier = if strategic_value >= 1.0 {
            self.defense_efficiency
        } else {
            self.movement as f64
        };
        self.attack_efficiency * multiplier * self.cost as f64 / self.quantity as f64
    }
}

/// The acting player's production catalogue, grouped the way the planner
/// asks for it.
#[derive(Debug, Clone, Default)]
pub struct PurchaseCatalog {
    options: Vec<PurchaseOption>,
}

impl PurchaseCatalog {
    pub fn new(state: &GameState, player: PlayerId) -> Self {
        let options = state
            .player(player)
            .production
            .iter()
            .map(|rule| PurchaseOption::new(state, rule))
            .collect();
        PurchaseCatalog { options }
    }

    pub fn all(&self) -> &[PurchaseOption] {
        &self.options
    }

    pub fn get(&self, unit_type: UnitTypeId) -> Option<&PurchaseOption> {
        self.options.iter().find(|o| o.unit_type == unit_type)
    }

    /// Cost of the cheapest purchase, if the catalogue is not empty.
    pub fn cheapest(&self) -> Option<u32> {
        self.options.iter().map(|o| o.cost).min()
    }

    fn matching(&self, keep: impl Fn(&PurchaseOption) -> bool) -> Vec<&PurchaseOption> {
        self.options.iter().filter(|o| keep(o)).collect()
    }

    /// Mobile land combat units.
    pub fn land(&self) -> Vec<&PurchaseOption> {
        self.matching(|o| {
            o.is_land()
                && !o.infrastructure
                && o.movement > 0
                && (o.attack > 0.0 || o.defense > 0.0)
        })
    }

    /// Land units with the cheapest hit points.
    pub fn land_fodder(&self) -> Vec<&PurchaseOption> {
        let land = self.land();
        let min = land.iter().map(|o| o.cost_per_hit_point).fold(f64::INFINITY, f64::min);
        land.into_iter().filter(|o| o.cost_per_hit_point <= min).collect()
    }

    pub fn land_attack(&self) -> Vec<&PurchaseOption> {
        self.land().into_iter().filter(|o| o.attack >= o.defense).collect()
    }

    pub fn land_defense(&self) -> Vec<&PurchaseOption> {
        self.land().into_iter().filter(|o| o.defense >= o.attack).collect()
    }

    /// Static land defences that never move.
    pub fn land_zero_move(&self) -> Vec<&PurchaseOption> {
        self.matching(|o| o.is_land() && !o.infrastructure && o.movement == 0 && o.defense > 0.0)
    }

    pub fn air(&self) -> Vec<&PurchaseOption> {
        self.matching(|o| o.is_air() && (o.attack > 0.0 || o.defense > 0.0))
    }

    /// Warships, carriers included, transports excluded.
    pub fn sea_defense(&self) -> Vec<&PurchaseOption> {
        self.matching(|o| o.is_sea() && !o.is_transport() && (o.defense > 0.0 || o.is_carrier()))
    }

    pub fn transports(&self) -> Vec<&PurchaseOption> {
        self.matching(|o| o.is_sea() && o.is_transport())
    }

    pub fn amphib(&self) -> Vec<&PurchaseOption> {
        self.land().into_iter().filter(|o| o.is_transportable()).collect()
    }

    pub fn factories(&self) -> Vec<&PurchaseOption> {
        self.matching(|o| o.factory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::StateBuilder;

    fn catalog() -> (GameState, PurchaseCatalog) {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let inf = b.infantry();
        let art = b.artillery();
        let arm = b.armour();
        let ftr = b.fighter();
        let trn = b.transport();
        let dd = b.destroyer();
        let fac = b.factory();
        for t in [inf, art, arm, ftr, trn, dd, fac] {
            b.sell(red, t);
        }
        let _ = b.land("Home", 3, Some(red));
        let state = b.build();
        let catalog = PurchaseCatalog::new(&state, red);
        (state, catalog)
    }

    fn by_name<'c>(c: &'c PurchaseCatalog, name: &str) -> &'c PurchaseOption {
        c.all().iter().find(|o| o.name == name).unwrap()
    }

    #[test]
    fn infantry_has_the_cheapest_hit_points() {
        let (_, c) = catalog();
        let fodder: Vec<&str> = c.land_fodder().iter().map(|o| o.name.as_str()).collect();
        assert_eq!(fodder, vec!["infantry"]);
        let inf = by_name(&c, "infantry");
        let arm = by_name(&c, "armour");
        assert!(inf.hit_point_efficiency > arm.hit_point_efficiency);
        assert!(arm.attack_efficiency > 0.0);
    }

    #[test]
    fn catalogue_groups() {
        let (_, c) = catalog();
        let names = |v: Vec<&PurchaseOption>| v.iter().map(|o| o.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(c.transports()), vec!["transport"]);
        assert_eq!(names(c.sea_defense()), vec!["destroyer"]);
        assert_eq!(names(c.air()), vec!["fighter"]);
        assert_eq!(names(c.factories()), vec!["factory"]);
        assert!(names(c.amphib()).contains(&"infantry".to_string()));
        assert_eq!(c.cheapest(), Some(3));
        let fac = by_name(&c, "factory");
        assert_eq!(fac.hit_points, 0.0);
        assert!(!fac.uses_production());
    }

    #[test]
    fn faster_units_gain_value_far_from_the_front() {
        let (state, c) = catalog();
        let inf = by_name(&c, "infantry");
        let arm = by_name(&c, "armour");
        let near = arm.attack_efficiency_at(&state, 1, &[]) / inf.attack_efficiency_at(
            &state,
            1,
            &[],
        );
        let far = arm.attack_efficiency_at(&state, 8, &[]) / inf.attack_efficiency_at(
            &state,
            8,
            &[],
        );
        assert!(far > near);
    }

    #[test]
    fn air_needs_a_carrier_deck_at_sea() {
        let (state, c) = catalog();
        let ftr = by_name(&c, "fighter");
        assert_eq!(ftr.sea_defense_efficiency(&state, &[], false, 0), 0.0);
        assert!(ftr.sea_defense_efficiency(&state, &[], false, 2) > 0.0);
        let dd = by_name(&c, "destroyer");
        let hunting = dd.sea_defense_efficiency(&state, &[], true, 0);
        assert!(hunting > dd.sea_defense_efficiency(&state, &[], false, 0));
    }

    #[test]
    fn supporter_values_units_it_can_boost() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let inf = b.infantry();
        let art = b.artillery();
        b.sell(red, art);
        let _ = b.land("Home", 3, Some(red));
        let state = b.build();
        let c = PurchaseCatalog::new(&state, red);
        let artillery = c.get(art).unwrap();
        assert!(artillery.support_factor(&state, &[inf, inf], false) > 0.0);
        assert_eq!(artillery.support_factor(&state, &[], false), 0.0);
        // Offence-only support
        assert_eq!(artillery.support_factor(&state, &[inf, inf], true), 0.0);
        // Already covered by the artillery standing there
        assert_eq!(artillery.support_factor(&state, &[inf, art], false), 0.0);
    }
}
