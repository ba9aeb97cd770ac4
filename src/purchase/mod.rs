//! Purchase Planner: what to buy with the turn's resources and where the
//! new units go.
//!
//! `option` scores every production rule, `place` tracks factories and the
//! budget, `planner` and `stages` run the staged pipeline, and `placement`
//! turns the tentative plan into placements that respect factory capacity.

mod option;
mod place;
mod placement;
mod planner;
mod stages;

use serde::{Deserialize, Serialize};

use crate::board::{TerritoryId, UnitTypeId};

pub use option::{PurchaseCatalog, PurchaseOption};
pub use place::{find_production_sites, Budget, PlaceTerritory, ProductionSite, PurchaseCount};
pub use placement::{plan_placement, Placement};
pub use planner::plan_purchase;

/// Units the planner intends to place in one territory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TentativePlacement {
    pub territory: TerritoryId,
    pub units: Vec<UnitTypeId>,
}

/// Result of the purchase phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PurchasePlan {
    /// Purchases per production rule. Their cost sums to `spent`.
    pub purchases: Vec<PurchaseCount>,
    pub placements: Vec<TentativePlacement>,
    /// Threatened territories no affordable purchase could save.
    pub cannot_hold: Vec<TerritoryId>,
    pub budget: u32,
    pub spent: u32,
}

impl PurchasePlan {
    /// Units bought, counting each rule's quantity.
    pub fn unit_count(&self) -> u32 {
        self.purchases.iter().map(|p| p.units).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.purchases.is_empty()
    }
}
