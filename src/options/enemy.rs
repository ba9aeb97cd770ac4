//! Maximal enemy attacks.
//!
//! For every enemy player, runs full discovery from that player's point of
//! view against a set of territories we care about, then keeps the single
//! strongest attacking force per territory.

use std::collections::{BTreeMap, BTreeSet};

use crate::battle::estimate_strength;
use crate::board::{PlayerId, TerritoryId, UnitId};
use crate::context::PlanningContext;

use super::discovery::{discover_all, Targets};

/// The strongest attack one enemy player can mount on a territory.
#[derive(Debug, Clone, PartialEq)]
pub struct EnemyAttack {
    pub player: PlayerId,
    pub units: Vec<UnitId>,
    pub amphib_units: Vec<UnitId>,
    pub bombard: Vec<UnitId>,
}

impl EnemyAttack {
    /// Direct attackers and amphibious cargo together.
    pub fn all_units(&self) -> Vec<UnitId> {
        let mut all = self.units.clone();
        all.extend(self.amphib_units.iter().filter(|u| !self.units.contains(u)).copied());
        all
    }
}

/// Strongest enemy attack per territory.
#[derive(Debug, Clone, Default)]
pub struct EnemyAttacks {
    by_territory: BTreeMap<TerritoryId, EnemyAttack>,
}

impl EnemyAttacks {
    pub fn get(&self, t: TerritoryId) -> Option<&EnemyAttack> {
        self.by_territory.get(&t)
    }

    /// Attacking units for `t`, empty if nobody can reach it.
    pub fn units(&self, t: TerritoryId) -> Vec<UnitId> {
        self.get(t).map(EnemyAttack::all_units).unwrap_or_default()
    }

    pub fn bombard(&self, t: TerritoryId) -> Vec<UnitId> {
        self.get(t).map(|a| a.bombard.clone()).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TerritoryId, &EnemyAttack)> {
        self.by_territory.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.by_territory.is_empty()
    }
}

/// Finds the strongest enemy attack on each of `targets`.
///
/// Units standing in `cleared` are assumed destroyed by our own attacks and
/// never join a counter-attack.
pub fn find_max_enemy_attacks(
    ctx: &PlanningContext,
    targets: &BTreeSet<TerritoryId>,
    cleared: &BTreeSet<TerritoryId>,
) -> EnemyAttacks {
    let state = ctx.state;
    let sources: Vec<TerritoryId> =
        state.territory_ids().filter(|t| !cleared.contains(t)).collect();
    let wanted = Targets::only(targets.iter().copied());
    let mut attacks = EnemyAttacks::default();

    for enemy in state.enemies_of(ctx.player) {
        let ectx = ctx.as_player(enemy);
        let maps = discover_all(&ectx, &sources, &wanted);
        for (t, opt) in maps.territories {
            let units: Vec<UnitId> = opt.max_units.iter().copied().collect();
            let amphib_units: Vec<UnitId> = opt.max_amphib_units.iter().copied().collect();
            if units.is_empty() && amphib_units.is_empty() {
                continue;
            }
            let candidate = EnemyAttack {
                player: enemy,
                units,
                amphib_units,
                bombard: opt.max_bombard_units.iter().copied().collect(),
            };
            let keep = match attacks.by_territory.get(&t) {
                None => true,
                Some(current) => is_stronger(ctx, t, &candidate, current),
            };
            if keep {
                attacks.by_territory.insert(t, candidate);
            }
        }
    }
    attacks
}

/// Prefers attacks that can conquer land, then greater strength.
fn is_stronger(
    ctx: &PlanningContext,
    t: TerritoryId,
    candidate: &EnemyAttack,
    current: &EnemyAttack,
) -> bool {
    let state = ctx.state;
    if state.territory(t).is_land() {
        let has_land = |a: &EnemyAttack| a.all_units().iter().any(|u| state.type_of(*u).is_land());
        match (has_land(candidate), has_land(current)) {
            (true, false) => return true,
            (false, true) => return false,
            _ => {}
        }
    }
    let a = estimate_strength(state, t, &candidate.all_units(), true);
    let b = estimate_strength(state, t, &current.all_units(), true);
    a > b
}
