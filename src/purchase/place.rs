//! Where purchased units can go, and what they cost so far.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::battle::BattleResult;
use crate::board::{GameState, PlayerId, TerritoryId, UnitId, UnitTypeId};

use super::option::PurchaseOption;

/// A territory eligible to receive purchased units.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceTerritory {
    pub territory: TerritoryId,
    /// Allied units already standing there.
    pub defenders: Vec<UnitId>,
    pub strategic_value: f64,
    /// Priority among territories needing defenders.
    pub defense_value: f64,
    /// Cleared when no affordable purchase saves the territory.
    pub can_hold: bool,
    /// Enemy attack result against the current defenders.
    pub min_result: Option<BattleResult>,
    /// Unit types tentatively placed here this turn.
    pub place: Vec<UnitTypeId>,
}

impl PlaceTerritory {
    pub fn new(state: &GameState, territory: TerritoryId, player: PlayerId) -> Self {
        PlaceTerritory {
            territory,
            defenders: state.allied_units(territory, player),
            strategic_value: 0.0,
            defense_value: 0.0,
            can_hold: true,
            min_result: None,
            place: Vec::new(),
        }
    }
}

/// A factory and the territories it can place into: its own land first,
/// then every adjacent sea zone.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductionSite {
    pub territory: TerritoryId,
    /// Units the factory can place this turn.
    pub capacity: u32,
    pub places: Vec<PlaceTerritory>,
}

impl ProductionSite {
    pub fn placed(&self) -> u32 {
        self.places.iter().map(|p| p.place.len() as u32).sum()
    }

    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.placed())
    }

    pub fn land(&self) -> &PlaceTerritory {
        &self.places[0]
    }
}

/// Every owned factory of `player` that can produce this turn.
pub fn find_production_sites(state: &GameState, player: PlayerId) -> Vec<ProductionSite> {
    state
        .territories
        .iter()
        .filter(|t| {
            t.is_land() && t.owner == Some(player) && t.production > 0 && state.has_factory(t.id)
        })
        .map(|t| {
            let mut places = vec![PlaceTerritory::new(state, t.id, player)];
            places.extend(
                t.neighbors()
                    .filter(|n| state.territory(*n).is_water())
                    .map(|n| PlaceTerritory::new(state, n, player)),
            );
            ProductionSite {
                territory: t.id,
                capacity: t.production,
                places,
            }
        })
        .collect()
}

/// Purchases of one production rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseCount {
    pub unit_type: UnitTypeId,
    pub name: String,
    /// Times the rule is bought.
    pub count: u32,
    /// Units delivered in total.
    pub units: u32,
    pub cost: u32,
}

/// Spending against the turn's resources.
///
/// Purchases are either committed at once or held pending until the
/// planner decides whether they helped; pending ones roll back as a group.
/// Nothing is recorded unless it fits what is left.
#[derive(Debug, Clone, Default)]
pub struct Budget {
    total: u32,
    spent: u32,
    committed: BTreeMap<UnitTypeId, PurchaseCount>,
    pending: Vec<(UnitTypeId, String, u32, u32)>,
}

impl Budget {
    pub fn new(total: u32) -> Self {
        Budget {
            total,
            ..Default::default()
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn spent(&self) -> u32 {
        self.spent
    }

    pub fn pending_cost(&self) -> u32 {
        self.pending.iter().map(|p| p.2).sum()
    }

    /// What is left once pending purchases are counted.
    pub fn remaining(&self) -> u32 {
        self.total - self.spent - self.pending_cost()
    }

    pub fn fits(&self, cost: u32) -> bool {
        cost <= self.remaining()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn record(&mut self, unit_type: UnitTypeId, name: &str, cost: u32, quantity: u32) {
        let entry = self.committed.entry(unit_type).or_insert_with(|| PurchaseCount {
            unit_type,
            name: name.to_string(),
            count: 0,
            units: 0,
            cost: 0,
        });
        entry.count += 1;
        entry.units += quantity;
        entry.cost += cost;
        self.spent += cost;
    }

    pub fn buy(&mut self, option: &PurchaseOption) -> bool {
        if !self.fits(option.cost) {
            return false;
        }
        self.record(option.unit_type, &option.name, option.cost, option.quantity);
        true
    }

    pub fn hold(&mut self, option: &PurchaseOption) -> bool {
        if !self.fits(option.cost) {
            return false;
        }
        self.pending
            .push((option.unit_type, option.name.clone(), option.cost, option.quantity));
        true
    }

    pub fn confirm(&mut self) {
        for (unit_type, name, cost, quantity) in std::mem::take(&mut self.pending) {
            self.record(unit_type, &name, cost, quantity);
        }
    }

    pub fn rollback(&mut self) {
        self.pending.clear();
    }

    /// Undoes one committed purchase of `option`.
    pub fn refund(&mut self, option: &PurchaseOption) -> bool {
        let Some(entry) = self.committed.get_mut(&option.unit_type) else {
            return false;
        };
        if entry.count == 0 {
            return false;
        }
        entry.count -= 1;
        entry.units -= option.quantity;
        entry.cost -= option.cost;
        self.spent -= option.cost;
        if entry.count == 0 {
            self.committed.remove(&option.unit_type);
        }
        true
    }

    pub fn purchases(&self) -> Vec<PurchaseCount> {
        self.committed.values().cloned().collect()
    }
}
