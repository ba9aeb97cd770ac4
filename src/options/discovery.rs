//! Option discovery.
//!
//! Enumerates, per unit capability class, which target territories every
//! movable unit could contribute to this turn, and folds the result into one
//! `AttackOption` per target. Discovery never moves anything; it only reads
//! the snapshot.

use std::collections::{BTreeMap, BTreeSet};

use crate::board::{
    find_route, reachable_within, GameState, PlayerId, Territory, TerritoryId, UnitId, UnitType,
};
use crate::context::PlanningContext;

use super::attack_option::{AmphibRoute, AttackOption};

/// Territories a discovery pass treats as targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets {
    set: BTreeSet<TerritoryId>,
}

impl Targets {
    /// Enemy land, anything holding enemy units, and neutral land when
    /// neutrals may be attacked.
    pub fn natural(ctx: &PlanningContext) -> Self {
        let state = ctx.state;
        let set = state
            .territories
            .iter()
            .filter(|t| t.is_passable())
            .filter(|t| {
                state.is_enemy_territory(t.id, ctx.player)
                    || state.has_enemy_units(t.id, ctx.player)
                    || (ctx.config.attack_neutrals && state.is_neutral_land(t.id))
            })
            .map(|t| t.id)
            .collect();
        Targets { set }
    }

    /// Exactly the given territories.
    pub fn only(set: impl IntoIterator<Item = TerritoryId>) -> Self {
        Targets {
            set: set.into_iter().collect(),
        }
    }

    pub fn contains(&self, t: TerritoryId) -> bool {
        self.set.contains(&t)
    }

    pub fn iter(&self) -> impl Iterator<Item = TerritoryId> + '_ {
        self.set.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

/// Movement capability class used to pick a discovery rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitClass {
    Naval,
    Land,
    Blitz,
    Air,
    Amphibious,
}

impl UnitClass {
    pub const ALL: [UnitClass; 5] = [
        UnitClass::Naval,
        UnitClass::Land,
        UnitClass::Blitz,
        UnitClass::Air,
        UnitClass::Amphibious,
    ];

    /// Class a unit type is discovered under, if it can attack at all.
    pub fn of(ut: &UnitType) -> Option<UnitClass> {
        if ut.is_infrastructure() {
            return None;
        }
        if ut.is_transport() {
            return Some(UnitClass::Amphibious);
        }
        if ut.is_air() {
            return (ut.attack > 0).then_some(UnitClass::Air);
        }
        if ut.is_sea() {
            return (ut.attack > 0).then_some(UnitClass::Naval);
        }
        if ut.capabilities.blitz {
            Some(UnitClass::Blitz)
        } else {
            Some(UnitClass::Land)
        }
    }
}

/// Everything a discovery pass found.
#[derive(Debug, Clone, Default)]
pub struct OptionMaps {
    pub territories: BTreeMap<TerritoryId, AttackOption>,
    /// Direct attackers to the targets they can reach.
    pub unit_options: BTreeMap<UnitId, BTreeSet<TerritoryId>>,
    /// Transport to amphibious legs by target.
    pub transport_options: BTreeMap<UnitId, BTreeMap<TerritoryId, AmphibRoute>>,
    /// Bombarding ship to target to the sea zones it can fire from.
    pub bombard_options: BTreeMap<UnitId, BTreeMap<TerritoryId, BTreeSet<TerritoryId>>>,
}

impl OptionMaps {
    fn add_unit_option(&mut self, unit: UnitId, t: TerritoryId) {
        self.unit_options.entry(unit).or_default().insert(t);
    }

    /// Every unit currently assigned anywhere, transports and bombarders included.
    pub fn assigned_units(&self) -> BTreeSet<UnitId> {
        let mut used = BTreeSet::new();
        for opt in self.territories.values() {
            used.extend(opt.units().iter().copied());
            for (transport, cargo) in opt.amphib_attacks() {
                used.insert(*transport);
                used.extend(cargo.iter().copied());
            }
            used.extend(opt.bombard().keys().copied());
        }
        used
    }

    pub fn clear_assignments(&mut self) {
        for opt in self.territories.values_mut() {
            opt.clear_assigned();
        }
    }

    /// Targets with at least one assigned unit.
    pub fn attacked(&self) -> Vec<TerritoryId> {
        self.territories
            .values()
            .filter(|o| o.is_assigned())
            .map(|o| o.territory)
            .collect()
    }

    fn build_territories(&mut self, state: &GameState) {
        for (unit, targets) in &self.unit_options {
            for t in targets {
                self.territories
                    .entry(*t)
                    .or_insert_with(|| AttackOption::new(*t))
                    .max_units
                    .insert(*unit);
            }
        }

        // Capacity-limited cargo, never counting a unit twice for one target
        let unit_options = &self.unit_options;
        let mut used: BTreeMap<TerritoryId, BTreeSet<UnitId>> = BTreeMap::new();
        for (transport, routes) in &self.transport_options {
            for (t, route) in routes {
                let taken = used.entry(*t).or_default();
                let candidates: Vec<UnitId> = route
                    .cargo
                    .iter()
                    .copied()
                    .filter(|u| !taken.contains(u) && !reaches_by_land(unit_options, *u, *t))
                    .collect();
                let chosen = select_cargo(state, *transport, &candidates);
                if chosen.is_empty() {
                    continue;
                }
                taken.extend(chosen.iter().copied());
                self.territories
                    .entry(*t)
                    .or_insert_with(|| AttackOption::new(*t))
                    .max_amphib_units
                    .extend(chosen);
            }
        }

        for (unit, targets) in &self.bombard_options {
            for t in targets.keys() {
                if let Some(opt) = self.territories.get_mut(t) {
                    opt.max_bombard_units.insert(*unit);
                }
            }
        }
    }
}

/// Units of `ctx.player` in `sources` that can still move this phase.
pub fn movable_units(ctx: &PlanningContext, sources: &[TerritoryId]) -> Vec<(UnitId, TerritoryId)> {
    let state = ctx.state;
    let mut units = Vec::new();
    for &t in sources {
        for u in state.owned_units(t, ctx.player) {
            let unit = state.unit(u);
            if unit.transported_by.is_some() || state.movement_left(u) == 0 {
                continue;
            }
            if state.type_of(u).is_infrastructure() {
                continue;
            }
            units.push((u, t));
        }
    }
    units
}

/// Water a fleet can reach without passing enemy warships.
pub fn naval_reach(
    ctx: &PlanningContext,
    from: TerritoryId,
    movement: u32,
) -> BTreeSet<TerritoryId> {
    let state = ctx.state;
    let player = ctx.player;
    reachable_within(state, from, movement, |x| {
        x.is_water() && !state.has_enemy_sea_combatants(x.id, player)
    })
    .into_keys()
    .filter(|t| state.territory(*t).is_water())
    .collect()
}

fn no_anti_air(state: &GameState, player: PlayerId) -> impl Fn(&Territory) -> bool + '_ {
    move |x: &Territory| x.is_passable() && !state.has_enemy_anti_air(x.id, player)
}

/// Whether an air unit in `at` with `remaining` movement can reach a landing spot.
pub fn has_landing_spot(
    ctx: &PlanningContext,
    ut: &UnitType,
    at: TerritoryId,
    remaining: u32,
) -> bool {
    let state = ctx.state;
    reachable_within(state, at, remaining, |x| x.is_passable())
        .into_keys()
        .filter(|x| *x != at)
        .any(|x| {
            state.is_allied_territory(x, ctx.player)
                || (ut.can_land_on_carrier()
                    && state.territory(x).is_water()
                    && state.carrier_free_capacity(x, ctx.player) >= ut.carrier_cost)
        })
}

/// Whether `unit` could land safely after attacking `t` from where it stands.
pub fn can_air_land_after_attack(ctx: &PlanningContext, unit: UnitId, t: TerritoryId) -> bool {
    let state = ctx.state;
    let Some(from) = state.location(unit) else {
        return false;
    };
    let movement = state.movement_left(unit);
    let Some(route) = find_route(state, from, t, no_anti_air(state, ctx.player)) else {
        return false;
    };
    if route.cost >= movement {
        return false;
    }
    has_landing_spot(ctx, state.type_of(unit), t, movement - route.cost)
}

/// Movement an air unit spends reaching `t` around enemy anti-air.
pub fn air_distance(ctx: &PlanningContext, unit: UnitId, t: TerritoryId) -> Option<u32> {
    let state = ctx.state;
    let from = state.location(unit)?;
    find_route(state, from, t, no_anti_air(state, ctx.player)).map(|r| r.cost)
}

fn air_targets(
    ctx: &PlanningContext,
    unit: UnitId,
    from: TerritoryId,
    targets: &Targets,
) -> Vec<TerritoryId> {
    let state = ctx.state;
    let ut = state.type_of(unit);
    let movement = state.movement_left(unit);
    if movement < 2 {
        return Vec::new();
    }
    let mut reach = reachable_within(state, from, movement - 1, no_anti_air(state, ctx.player));
    if !reach.keys().any(|t| targets.contains(*t)) {
        reach = reachable_within(state, from, movement - 1, |x| x.is_passable());
    }
    reach
        .into_iter()
        .filter(|(t, _)| *t != from && targets.contains(*t))
        .filter(|(t, cost)| {
            let remaining = movement - cost;
            remaining * 2 >= movement || has_landing_spot(ctx, ut, *t, remaining)
        })
        .map(|(t, _)| t)
        .collect()
}

fn land_targets(
    ctx: &PlanningContext,
    unit: UnitId,
    from: TerritoryId,
    targets: &Targets,
    blitz: bool,
) -> Vec<TerritoryId> {
    let state = ctx.state;
    let movement = state.movement_left(unit);
    let mut found: BTreeSet<TerritoryId> = state
        .territory(from)
        .edges
        .iter()
        .filter(|e| e.cost <= movement)
        .map(|e| e.to)
        .filter(|t| state.territory(*t).is_land() && targets.contains(*t))
        .collect();
    if blitz && movement >= 2 {
        let player = ctx.player;
        let through = reachable_within(state, from, movement.min(2), |x| {
            x.is_land() && !state.has_enemy_units(x.id, player) && !state.is_neutral_land(x.id)
        });
        found.extend(
            through
                .into_keys()
                .filter(|t| *t != from && state.territory(*t).is_land() && targets.contains(*t)),
        );
    }
    found.into_iter().collect()
}

fn is_loadable(state: &GameState, unit: UnitId, transport: &UnitType) -> bool {
    let ut = state.type_of(unit);
    ut.is_land()
        && ut.is_transportable()
        && ut.transport_cost <= transport.transport_capacity
        && state.movement_left(unit) > 0
        && state.unit(unit).transported_by.is_none()
}

/// Breadth-first expansion of a transport's movement, collecting loadable
/// cargo and the land targets it could unload into.
pub fn find_amphib_routes(
    ctx: &PlanningContext,
    transport: UnitId,
    at: TerritoryId,
    targets: &Targets,
) -> BTreeMap<TerritoryId, AmphibRoute> {
    let state = ctx.state;
    let player = ctx.player;
    let tt = state.type_of(transport);
    let movement = state.movement_left(transport);

    let mut routes: BTreeMap<TerritoryId, AmphibRoute> = BTreeMap::new();
    let mut visited = BTreeSet::from([at]);
    let mut layer = vec![at];
    let mut load_from = BTreeSet::new();
    let mut cargo: BTreeSet<UnitId> = state.cargo_of(transport).into_iter().collect();

    for step in 0..=movement {
        for &sea in &layer {
            for n in state.territory(sea).neighbors() {
                if !state.is_allied_territory(n, player) {
                    continue;
                }
                let loadable: Vec<UnitId> = state
                    .owned_units(n, player)
                    .into_iter()
                    .filter(|u| is_loadable(state, *u, tt))
                    .collect();
                if !loadable.is_empty() {
                    load_from.insert(n);
                    cargo.extend(loadable);
                }
            }
        }
        if !cargo.is_empty() {
            for &sea in &layer {
                for n in state.territory(sea).neighbors() {
                    if !state.territory(n).is_land() || !targets.contains(n) {
                        continue;
                    }
                    if routes.get(&n).map_or(true, |r| r.cargo.len() < cargo.len()) {
                        routes.insert(
                            n,
                            AmphibRoute {
                                unload_from: sea,
                                load_from: load_from.clone(),
                                cargo: cargo.clone(),
                            },
                        );
                    }
                }
            }
        }
        if step == movement {
            break;
        }
        let mut next = Vec::new();
        for &sea in &layer {
            for n in state.territory(sea).neighbors() {
                let terr = state.territory(n);
                if terr.is_water()
                    && !state.has_enemy_sea_combatants(n, player)
                    && visited.insert(n)
                {
                    next.push(n);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        layer = next;
    }
    routes
}

/// Picks cargo for one transport: strongest attackers first, interleaved
/// roughly one-for-one with cheap defensive units, within capacity.
pub fn select_cargo(state: &GameState, transport: UnitId, candidates: &[UnitId]) -> Vec<UnitId> {
    let capacity = state.type_of(transport).transport_capacity;
    let mut chosen: Vec<UnitId> = state
        .cargo_of(transport)
        .into_iter()
        .filter(|u| candidates.contains(u))
        .collect();
    let mut used: u32 = chosen.iter().map(|u| state.type_of(*u).transport_cost).sum();

    let by_attack = |a: &UnitId, b: &UnitId| {
        let (ta, tb) = (state.type_of(*a), state.type_of(*b));
        tb.attack.cmp(&ta.attack).then_with(|| a.cmp(b))
    };
    let rest = candidates.iter().copied().filter(|u| !chosen.contains(u));
    let (mut strong, mut fodder): (Vec<UnitId>, Vec<UnitId>) = rest.partition(|u| {
        let ut = state.type_of(*u);
        ut.attack >= ut.defense
    });
    strong.sort_by(by_attack);
    fodder.sort_by(by_attack);

    let (mut i, mut j) = (0, 0);
    let mut take_strong = true;
    loop {
        let pick = if take_strong && i < strong.len() {
            i += 1;
            strong[i - 1]
        } else if j < fodder.len() {
            j += 1;
            fodder[j - 1]
        } else if i < strong.len() {
            i += 1;
            strong[i - 1]
        } else {
            break;
        };
        take_strong = !take_strong;
        let cost = state.type_of(pick).transport_cost;
        if used + cost <= capacity {
            used += cost;
            chosen.push(pick);
        }
    }
    chosen
}

/// Adds the options of one capability class to `maps`.
pub fn discover(
    ctx: &PlanningContext,
    class: UnitClass,
    sources: &[TerritoryId],
    targets: &Targets,
    maps: &mut OptionMaps,
) {
    let state = ctx.state;
    for (unit, from) in movable_units(ctx, sources) {
        if UnitClass::of(state.type_of(unit)) != Some(class) {
            continue;
        }
        match class {
            UnitClass::Naval => {
                for t in naval_reach(ctx, from, state.movement_left(unit)) {
                    if targets.contains(t) {
                        maps.add_unit_option(unit, t);
                    }
                }
            }
            UnitClass::Land | UnitClass::Blitz => {
                for t in land_targets(ctx, unit, from, targets, class == UnitClass::Blitz) {
                    maps.add_unit_option(unit, t);
                }
            }
            UnitClass::Air => {
                for t in air_targets(ctx, unit, from, targets) {
                    maps.add_unit_option(unit, t);
                }
            }
            UnitClass::Amphibious => {
                if !state.territory(from).is_water() {
                    continue;
                }
                let routes = find_amphib_routes(ctx, unit, from, targets);
                if !routes.is_empty() {
                    maps.transport_options.insert(unit, routes);
                }
            }
        }
    }
}

/// Sea units able to bombard the landing targets found so far.
fn discover_bombard(ctx: &PlanningContext, sources: &[TerritoryId], maps: &mut OptionMaps) {
    let state = ctx.state;
    let landings: BTreeSet<TerritoryId> = maps
        .transport_options
        .values()
        .flat_map(|routes| routes.keys().copied())
        .collect();
    if landings.is_empty() {
        return;
    }
    for (unit, from) in movable_units(ctx, sources) {
        let ut = state.type_of(unit);
        if !ut.is_sea() || ut.bombard == 0 || ut.is_transport() {
            continue;
        }
        let reach = naval_reach(ctx, from, state.movement_left(unit));
        for &t in &landings {
            let seas: BTreeSet<TerritoryId> = state
                .territory(t)
                .neighbors()
                .filter(|s| reach.contains(s))
                .collect();
            if !seas.is_empty() {
                maps.bombard_options.entry(unit).or_default().insert(t, seas);
            }
        }
    }
}

fn reaches_by_land(
    unit_options: &BTreeMap<UnitId, BTreeSet<TerritoryId>>,
    unit: UnitId,
    t: TerritoryId,
) -> bool {
    unit_options.get(&unit).is_some_and(|opts| opts.contains(&t))
}

/// Removes cargo that could already attack the target directly, then legs
/// left with nothing to carry.
fn remove_duplicate_landings(maps: &mut OptionMaps) {
    let unit_options = &maps.unit_options;
    for routes in maps.transport_options.values_mut() {
        routes.retain(|t, route| {
            route.cargo.retain(|c| !reaches_by_land(unit_options, *c, *t));
            !route.cargo.is_empty()
        });
    }
    maps.transport_options.retain(|_, routes| !routes.is_empty());
}

/// Full discovery for every class, from every territory in `sources`.
pub fn discover_all(
    ctx: &PlanningContext,
    sources: &[TerritoryId],
    targets: &Targets,
) -> OptionMaps {
    let mut maps = OptionMaps::default();
    for class in UnitClass::ALL {
        if class == UnitClass::Amphibious && !ctx.config.allow_amphibious {
            continue;
        }
        discover(ctx, class, sources, targets, &mut maps);
    }
    remove_duplicate_landings(&mut maps);
    discover_bombard(ctx, sources, &mut maps);
    maps.build_territories(ctx.state);
    maps
}
