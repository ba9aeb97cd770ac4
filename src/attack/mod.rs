//! Combat-move planning.
//!
//! Turns discovered attack options into a committed set of attacks:
//!
//! 1. drop targets the full reachable force cannot take,
//! 2. score and rank the rest,
//! 3. grow a frontier of top-ranked targets while every one of them can be
//!    won with the units allocated to it,
//! 4. re-check the committed set against enemy counter-attacks, exposed
//!    transports, and the safety of the capital,
//! 5. emit move orders.
//!
//! One `AttackPlanner` owns the option maps for a pass and each step
//! is a method on it; the steps live in sibling files by concern.

mod allocate;
mod commit;
mod hold;
pub mod orders;
mod prioritize;
mod safety;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::battle::{has_local_land_superiority, MEDIUM_RANGE};
use crate::board::{TerritoryId, UnitId};
use crate::context::PlanningContext;
use crate::error::EngineError;
use crate::eval::{find_territory_values, TerritoryValues};
use crate::observer::PlanPhase;
use crate::options::{discover_all, EnemyAttacks, OptionMaps, Targets};

pub(crate) use orders::group_moves;
pub use orders::{unit_route, MoveKind, MoveOrder};

/// One committed attack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAttack {
    pub territory: TerritoryId,
    /// Every attacking unit, amphibious cargo included.
    pub units: Vec<UnitId>,
    pub bombard: Vec<UnitId>,
    pub win_percentage: f64,
    pub tuv_swing: f64,
    /// Hit and retreat rather than conquer.
    pub strafing: bool,
    pub can_hold: bool,
}

/// Output of a combat-move pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombatPlan {
    pub attacks: Vec<PlannedAttack>,
    pub orders: Vec<MoveOrder>,
}

pub(crate) fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Working state of one combat-move pass.
pub(crate) struct AttackPlanner<'c, 'a> {
    ctx: &'c PlanningContext<'a>,
    maps: OptionMaps,
    enemy: EnemyAttacks,
    values: TerritoryValues,
    /// The capital lacks local land superiority; only clearly worthwhile
    /// attacks are kept.
    defensive: bool,
    /// Units reserved for something other than attacking.
    already_moved: BTreeSet<UnitId>,
    /// Targets still under consideration, best first.
    prioritized: Vec<TerritoryId>,
}

impl<'c, 'a> AttackPlanner<'c, 'a> {
    pub(crate) fn new(ctx: &'c PlanningContext<'a>) -> Self {
        let state = ctx.state;
        let sources: Vec<TerritoryId> = state.territory_ids().collect();
        let maps = discover_all(ctx, &sources, &Targets::natural(ctx));
        let defensive = state
            .capital_of(ctx.player)
            .is_some_and(|c| !has_local_land_superiority(ctx, c, MEDIUM_RANGE));
        let values = find_territory_values(
            ctx,
            &BTreeSet::new(),
            &BTreeSet::new(),
            state.territory_ids(),
        );
        AttackPlanner {
            ctx,
            maps,
            enemy: EnemyAttacks::default(),
            values,
            defensive,
            already_moved: BTreeSet::new(),
            prioritized: Vec::new(),
        }
    }

    /// Forgets a target everywhere: its option, every unit's option list,
    /// transport legs, bombard slots, and the ranking.
    fn remove_target(&mut self, t: TerritoryId, reason: &str) {
        let known = self.maps.territories.remove(&t).is_some();
        let ranked = self.prioritized.contains(&t);
        if !known && !ranked {
            return;
        }
        self.prioritized.retain(|x| *x != t);
        for targets in self.maps.unit_options.values_mut() {
            targets.remove(&t);
        }
        self.maps.unit_options.retain(|_, targets| !targets.is_empty());
        for routes in self.maps.transport_options.values_mut() {
            routes.remove(&t);
        }
        self.maps.transport_options.retain(|_, routes| !routes.is_empty());
        for slots in self.maps.bombard_options.values_mut() {
            slots.remove(&t);
        }
        self.maps.bombard_options.retain(|_, slots| !slots.is_empty());
        self.ctx.observer().attack_dropped(self.ctx.name(t), reason);
    }

    /// Ranked targets plus the sea zones their transports unload from.
    fn cleared_by_attacks(&self) -> BTreeSet<TerritoryId> {
        let state = self.ctx.state;
        let mut cleared: BTreeSet<TerritoryId> = self.prioritized.iter().copied().collect();
        for t in &self.prioritized {
            let Some(opt) = self.maps.territories.get(t) else {
                continue;
            };
            if opt.need_amphib_units {
                let seas =
                    state.territory(*t).neighbors().filter(|n| state.territory(*n).is_water());
                cleared.extend(seas);
            }
        }
        cleared
    }

    fn into_plan(mut self) -> CombatPlan {
        let ctx = self.ctx;
        let mut orders = self.attack_orders();
        orders.extend(self.contested_sea_orders());
        let mut attacks = Vec::new();
        for t in &self.prioritized {
            let Some(opt) = self.maps.territories.get_mut(t) else {
                continue;
            };
            if !opt.is_assigned() {
                continue;
            }
            let result = opt.result(ctx).clone();
            attacks.push(PlannedAttack {
                territory: *t,
                units: opt.attackers(),
                bombard: opt.bombard().keys().copied().collect(),
                win_percentage: result.win_percentage,
                tuv_swing: result.tuv_swing,
                strafing: opt.is_strafing,
                can_hold: opt.can_hold,
            });
        }
        CombatPlan { attacks, orders }
    }
}

/// Plans the combat-move phase for `ctx.player`.
pub fn plan_combat_move(ctx: &PlanningContext) -> Result<CombatPlan, EngineError> {
    ctx.observer().phase_started(PlanPhase::CombatMove, ctx.player_name());
    let mut planner = AttackPlanner::new(ctx);

    planner.remove_territories_that_cant_be_conquered();
    ctx.check_cancelled()?;

    let everything: BTreeSet<TerritoryId> = planner.maps.territories.keys().copied().collect();
    planner.refresh_enemy_attacks(&everything);
    planner.determine_territories_that_can_be_held();
    planner.prioritize_attack_options();
    planner.remove_territories_that_arent_worth_attacking();
    ctx.check_cancelled()?;

    planner.determine_territories_to_attack()?;

    let cleared = planner.cleared_by_attacks();
    planner.refresh_enemy_attacks(&cleared);
    planner.determine_territories_that_can_be_held();
    planner.remove_territories_that_arent_worth_attacking();

    planner.move_one_defender_to_land_territories_bordering_enemy();
    planner.determine_units_to_attack_with()?;
    planner.remove_territories_where_transports_are_exposed();
    planner.remove_attacks_until_capital_can_be_held()?;
    ctx.check_cancelled()?;

    let plan = planner.into_plan();
    ctx.observer().phase_finished(PlanPhase::CombatMove, plan.orders.len());
    Ok(plan)
}
