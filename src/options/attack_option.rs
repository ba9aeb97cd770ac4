//! Per-target attack bookkeeping.
//!
//! An `AttackOption` records the largest force that could reach a target,
//! the subset currently assigned to it, and a cached battle estimate that
//! is dropped whenever the assignment changes.

use std::collections::{BTreeMap, BTreeSet};

use crate::battle::{estimate, BattleResult, Perspective};
use crate::board::{TerritoryId, UnitId};
use crate::context::PlanningContext;

/// One amphibious assault leg: where a transport unloads and what it may carry.
#[derive(Debug, Clone, PartialEq)]
pub struct AmphibRoute {
    /// Sea zone the transport unloads from.
    pub unload_from: TerritoryId,
    /// Land territories the cargo can be picked up from.
    pub load_from: BTreeSet<TerritoryId>,
    /// Land units that could be carried along this leg.
    pub cargo: BTreeSet<UnitId>,
}

/// Attack bookkeeping for a single target territory.
#[derive(Debug, Clone)]
pub struct AttackOption {
    pub territory: TerritoryId,
    /// Units able to attack directly.
    pub max_units: BTreeSet<UnitId>,
    /// Cargo that transports could land here, limited by capacity.
    pub max_amphib_units: BTreeSet<UnitId>,
    /// Sea units able to bombard this territory.
    pub max_bombard_units: BTreeSet<UnitId>,
    /// Strongest enemy counter-attack against this territory.
    pub max_enemy_units: Vec<UnitId>,
    pub max_enemy_bombard: Vec<UnitId>,
    /// The attack needs amphibious cargo to win.
    pub need_amphib_units: bool,
    /// Attack to inflict losses and retreat, not to conquer.
    pub is_strafing: bool,
    pub can_hold: bool,
    pub value: f64,
    /// Smallest strength difference that has already proven enough.
    pub strength_estimate: f64,
    /// Estimate with the full reachable force.
    pub max_result: Option<BattleResult>,
    units: Vec<UnitId>,
    amphib_attacks: BTreeMap<UnitId, Vec<UnitId>>,
    transport_unload_from: BTreeMap<UnitId, TerritoryId>,
    bombard: BTreeMap<UnitId, TerritoryId>,
    result: Option<BattleResult>,
}

impl AttackOption {
    pub fn new(territory: TerritoryId) -> Self {
        AttackOption {
            territory,
            max_units: BTreeSet::new(),
            max_amphib_units: BTreeSet::new(),
            max_bombard_units: BTreeSet::new(),
            max_enemy_units: Vec::new(),
            max_enemy_bombard: Vec::new(),
            need_amphib_units: false,
            is_strafing: false,
            can_hold: true,
            value: 0.0,
            strength_estimate: f64::INFINITY,
            max_result: None,
            units: Vec::new(),
            amphib_attacks: BTreeMap::new(),
            transport_unload_from: BTreeMap::new(),
            bombard: BTreeMap::new(),
            result: None,
        }
    }

    /// Directly assigned units.
    pub fn units(&self) -> &[UnitId] {
        &self.units
    }

    /// Transport to cargo of every amphibious leg.
    pub fn amphib_attacks(&self) -> &BTreeMap<UnitId, Vec<UnitId>> {
        &self.amphib_attacks
    }

    pub fn transport_unload_from(&self) -> &BTreeMap<UnitId, TerritoryId> {
        &self.transport_unload_from
    }

    /// Bombarding unit to the sea zone it fires from.
    pub fn bombard(&self) -> &BTreeMap<UnitId, TerritoryId> {
        &self.bombard
    }

    /// Everything that fights: direct units plus landed cargo.
    pub fn attackers(&self) -> Vec<UnitId> {
        let mut all = self.units.clone();
        for cargo in self.amphib_attacks.values() {
            all.extend(cargo.iter().copied());
        }
        all
    }

    /// Full reachable force: direct and amphibious, each unit once.
    pub fn max_attackers(&self) -> Vec<UnitId> {
        self.max_units.union(&self.max_amphib_units).copied().collect()
    }

    pub fn is_assigned(&self) -> bool {
        !self.units.is_empty() || !self.amphib_attacks.is_empty()
    }

    /// Assigns a direct attacker. Units outside `max_units` are refused.
    pub fn add_unit(&mut self, unit: UnitId) -> bool {
        if !self.max_units.contains(&unit) || self.units.contains(&unit) {
            return false;
        }
        self.units.push(unit);
        self.result = None;
        true
    }

    /// Assigns an amphibious leg. Cargo outside `max_amphib_units` is dropped.
    pub fn add_amphib(
        &mut self,
        transport: UnitId,
        cargo: Vec<UnitId>,
        unload_from: TerritoryId,
    ) -> bool {
        let cargo: Vec<UnitId> = cargo
            .into_iter()
            .filter(|u| self.max_amphib_units.contains(u))
            .collect();
        if cargo.is_empty() {
            return false;
        }
        self.amphib_attacks.insert(transport, cargo);
        self.transport_unload_from.insert(transport, unload_from);
        self.result = None;
        true
    }

    pub fn add_bombard(&mut self, unit: UnitId, from: TerritoryId) -> bool {
        if !self.max_bombard_units.contains(&unit) {
            return false;
        }
        self.bombard.insert(unit, from);
        self.result = None;
        true
    }

    pub fn remove_unit(&mut self, unit: UnitId) {
        let before = self.units.len();
        self.units.retain(|u| *u != unit);
        if self.units.len() != before {
            self.result = None;
        }
    }

    /// Drops every assignment.
    pub fn clear_assigned(&mut self) {
        self.units.clear();
        self.amphib_attacks.clear();
        self.transport_unload_from.clear();
        self.bombard.clear();
        self.result = None;
    }

    pub fn invalidate(&mut self) {
        self.result = None;
    }

    /// Units that would defend against `ctx.player`.
    pub fn defenders(&self, ctx: &PlanningContext) -> Vec<UnitId> {
        ctx.state.defending_units(self.territory, ctx.player)
    }

    /// Estimate for the current assignment, recomputed after any change.
    pub fn result(&mut self, ctx: &PlanningContext) -> &BattleResult {
        if self.result.is_none() {
            let attackers = self.attackers();
            let defenders = self.defenders(ctx);
            let bombard: Vec<UnitId> = self.bombard.keys().copied().collect();
            self.result = Some(estimate(
                ctx,
                self.territory,
                &attackers,
                &defenders,
                &bombard,
                Perspective::Attacker,
            ));
        }
        self.result.get_or_insert_with(BattleResult::empty)
    }

    /// Cached result, if the assignment has not changed since it was computed.
    pub fn cached_result(&self) -> Option<&BattleResult> {
        self.result.as_ref()
    }

    /// Whether the current assignment already clears the win threshold.
    pub fn currently_wins(&mut self, ctx: &PlanningContext) -> bool {
        let threshold = ctx.win_percentage();
        self.result(ctx).is_win(threshold)
    }
}
