//! Planning observers.
//!
//! The planner reports what it is doing through an injected `PlanObserver`
//! instead of logging directly. `TracingObserver` forwards to `tracing`,
//! `NullObserver` discards, and `RecordingObserver` keeps events in memory
//! so tests can assert on them.

use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::board::UnitId;

/// The planning pass an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanPhase {
    CombatMove,
    NonCombatMove,
    Purchase,
    Placement,
    Battle,
}

impl PlanPhase {
    pub const fn name(self) -> &'static str {
        match self {
            PlanPhase::CombatMove => "combat",
            PlanPhase::NonCombatMove => "noncombat",
            PlanPhase::Purchase => "purchase",
            PlanPhase::Placement => "place",
            PlanPhase::Battle => "battle",
        }
    }
}

/// Receives planning events. Every method defaults to a no-op.
pub trait PlanObserver: Send + Sync {
    fn phase_started(&self, _phase: PlanPhase, _player: &str) {}
    fn phase_finished(&self, _phase: PlanPhase, _orders: usize) {}
    fn territory_scored(&self, _territory: &str, _value: f64, _win_percentage: f64) {}
    fn allocation_round(&self, _frontier: usize, _candidates: usize, _feasible: bool) {}
    fn attack_dropped(&self, _territory: &str, _reason: &str) {}
    fn purchase_committed(&self, _stage: &str, _unit: &str, _territory: &str, _remaining: u32) {}
    fn unit_skipped(&self, _unit: UnitId, _reason: &str) {}
    fn search_timeout(&self, _phase: PlanPhase, _kept: usize) {}
    fn note(&self, _message: &str) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PlanObserver for TracingObserver {
    fn phase_started(&self, phase: PlanPhase, player: &str) {
        info!(phase = phase.name(), player, "planning started");
    }

    fn phase_finished(&self, phase: PlanPhase, orders: usize) {
        info!(phase = phase.name(), orders, "planning finished");
    }

    fn territory_scored(&self, territory: &str, value: f64, win_percentage: f64) {
        debug!(territory, value, win_percentage, "attack option scored");
    }

    fn allocation_round(&self, frontier: usize, candidates: usize, feasible: bool) {
        debug!(frontier, candidates, feasible, "allocation round");
    }

    fn attack_dropped(&self, territory: &str, reason: &str) {
        debug!(territory, reason, "attack dropped");
    }

    fn purchase_committed(&self, stage: &str, unit: &str, territory: &str, remaining: u32) {
        debug!(stage, unit, territory, remaining, "purchase committed");
    }

    fn unit_skipped(&self, unit: UnitId, reason: &str) {
        debug!(unit = unit.0, reason, "unit skipped");
    }

    fn search_timeout(&self, phase: PlanPhase, kept: usize) {
        warn!(phase = phase.name(), kept, "time budget exhausted, committing best feasible plan");
    }

    fn note(&self, message: &str) {
        debug!("{}", message);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl PlanObserver for NullObserver {}

/// An observed event, as stored by `RecordingObserver`.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanEvent {
    PhaseStarted(PlanPhase),
    PhaseFinished(PlanPhase, usize),
    TerritoryScored(String),
    AllocationRound { frontier: usize, candidates: usize, feasible: bool },
    AttackDropped(String),
    PurchaseCommitted { stage: String, unit: String },
    UnitSkipped(UnitId),
    SearchTimeout(PlanPhase),
}

/// Records events in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<PlanEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events in arrival order.
    pub fn events(&self) -> Vec<PlanEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn push(&self, event: PlanEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl PlanObserver for RecordingObserver {
    fn phase_started(&self, phase: PlanPhase, _player: &str) {
        self.push(PlanEvent::PhaseStarted(phase));
    }

    fn phase_finished(&self, phase: PlanPhase, orders: usize) {
        self.push(PlanEvent::PhaseFinished(phase, orders));
    }

    fn territory_scored(&self, territory: &str, _value: f64, _win_percentage: f64) {
        self.push(PlanEvent::TerritoryScored(territory.to_string()));
    }

    fn allocation_round(&self, frontier: usize, candidates: usize, feasible: bool) {
        self.push(PlanEvent::AllocationRound {
            frontier,
            candidates,
            feasible,
        });
    }

    fn attack_dropped(&self, territory: &str, _reason: &str) {
        self.push(PlanEvent::AttackDropped(territory.to_string()));
    }

    fn purchase_committed(&self, stage: &str, unit: &str, _territory: &str, _remaining: u32) {
        self.push(PlanEvent::PurchaseCommitted {
            stage: stage.to_string(),
            unit: unit.to_string(),
        });
    }

    fn unit_skipped(&self, unit: UnitId, _reason: &str) {
        self.push(PlanEvent::UnitSkipped(unit));
    }

    fn search_timeout(&self, phase: PlanPhase, _kept: usize) {
        self.push(PlanEvent::SearchTimeout(phase));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_observer_keeps_order() {
        let obs = RecordingObserver::new();
        obs.phase_started(PlanPhase::Purchase, "Red");
        obs.attack_dropped("Front", "loses");
        obs.phase_finished(PlanPhase::Purchase, 2);
        assert_eq!(
            obs.events(),
            vec![
                PlanEvent::PhaseStarted(PlanPhase::Purchase),
                PlanEvent::AttackDropped("Front".to_string()),
                PlanEvent::PhaseFinished(PlanPhase::Purchase, 2),
            ]
        );
    }

    #[test]
    fn null_observer_accepts_everything() {
        let obs = NullObserver;
        obs.note("ignored");
        obs.search_timeout(PlanPhase::CombatMove, 0);
    }
}
