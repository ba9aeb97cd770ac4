//! Planning context and engine configuration.
//!
//! A `PlanningContext` bundles everything one planning pass reads: the
//! immutable snapshot, the acting player, configuration, the observer, the
//! cancellation flag, the wall-clock deadline, and the distance matrices.
//! It is cheap to clone, so enemy-perspective queries take a copy with a
//! different acting player instead of mutating shared state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::board::{Distances, GameState, PlayerId, TerritoryId};
use crate::error::EngineError;
use crate::observer::{PlanObserver, TracingObserver};

/// Tunable planner parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Win percentage an attack must reach to be committed.
    pub win_percentage: f64,
    /// Lower bound used by the second allocation pass and for strafing.
    pub min_win_percentage: f64,
    /// Wall-clock budget per planning pass (milliseconds).
    pub time_budget_ms: u64,
    /// Worker threads for battle estimation (0 = rayon default).
    pub threads: usize,
    /// Random seed (0 = use entropy).
    pub seed: u64,
    /// Simulated battles per estimate (0 = adaptive to army size).
    pub simulation_runs: u32,
    /// Round cap of a single simulated battle.
    pub max_battle_rounds: u32,
    /// Break exact ties with seeded coin flips instead of stable order.
    pub randomize_ties: bool,
    /// Consider neutral territories as attack targets.
    pub attack_neutrals: bool,
    /// Allow the purchase planner to buy production facilities.
    pub purchase_factories: bool,
    /// Plan transport-borne attacks.
    pub allow_amphibious: bool,
    /// An attacker retreats below this win percentage when losing value.
    pub retreat_win_percentage: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            win_percentage: 90.0,
            min_win_percentage: 70.0,
            time_budget_ms: 5000,
            threads: 4,
            seed: 0,
            simulation_runs: 0,
            max_battle_rounds: 20,
            randomize_ties: false,
            attack_neutrals: true,
            purchase_factories: true,
            allow_amphibious: true,
            retreat_win_percentage: 40.0,
        }
    }
}

impl EngineConfig {
    /// Applies a named option from its textual value.
    ///
    /// Returns `false` when the name is unknown or the value does not parse.
    pub fn set_option(&mut self, name: &str, value: &str) -> bool {
        fn parse<T: std::str::FromStr>(v: &str, slot: &mut T) -> bool {
            match v.parse::<T>() {
                Ok(parsed) => {
                    *slot = parsed;
                    true
                }
                Err(_) => false,
            }
        }
        match name {
            "WinPercentage" => parse(value, &mut self.win_percentage),
            "MinWinPercentage" => parse(value, &mut self.min_win_percentage),
            "TimeBudget" => parse(value, &mut self.time_budget_ms),
            "Threads" => parse(value, &mut self.threads),
            "Seed" => parse(value, &mut self.seed),
            "SimulationRuns" => parse(value, &mut self.simulation_runs),
            "MaxBattleRounds" => parse(value, &mut self.max_battle_rounds),
            "RandomizeTies" => parse(value, &mut self.randomize_ties),
            "AttackNeutrals" => parse(value, &mut self.attack_neutrals),
            "PurchaseFactories" => parse(value, &mut self.purchase_factories),
            "AllowAmphibious" => parse(value, &mut self.allow_amphibious),
            "RetreatWinPercentage" => parse(value, &mut self.retreat_win_percentage),
            _ => false,
        }
    }
}

/// Everything a planning pass reads, passed explicitly through every call.
#[derive(Clone)]
pub struct PlanningContext<'a> {
    pub state: &'a GameState,
    pub player: PlayerId,
    pub config: Arc<EngineConfig>,
    observer: Arc<dyn PlanObserver>,
    cancel: Arc<AtomicBool>,
    deadline: Instant,
    distances: Arc<Distances>,
    seed: u64,
}

impl<'a> PlanningContext<'a> {
    /// Creates a context with a tracing observer and a fresh cancel flag.
    pub fn new(state: &'a GameState, player: PlayerId, config: EngineConfig) -> Self {
        let seed = if config.seed == 0 {
            rand::random::<u64>() | 1
        } else {
            config.seed
        };
        let deadline = Instant::now() + Duration::from_millis(config.time_budget_ms);
        PlanningContext {
            state,
            player,
            config: Arc::new(config),
            observer: Arc::new(TracingObserver),
            cancel: Arc::new(AtomicBool::new(false)),
            deadline,
            distances: Arc::new(Distances::compute(state)),
            seed,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PlanObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = deadline;
        self
    }

    /// Same pass, seen from another player's perspective.
    pub fn as_player(&self, player: PlayerId) -> Self {
        let mut ctx = self.clone();
        ctx.player = player;
        ctx
    }

    /// Same pass over a what-if copy of the snapshot. The copy must share
    /// the map, so distances are reused.
    pub fn with_state<'b>(&self, state: &'b GameState) -> PlanningContext<'b> {
        PlanningContext {
            state,
            player: self.player,
            config: self.config.clone(),
            observer: self.observer.clone(),
            cancel: self.cancel.clone(),
            deadline: self.deadline,
            distances: self.distances.clone(),
            seed: self.seed,
        }
    }

    pub fn observer(&self) -> &dyn PlanObserver {
        self.observer.as_ref()
    }

    pub fn distances(&self) -> &Distances {
        &self.distances
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Returns `Err(Cancelled)` once the host has stopped the turn.
    pub fn check_cancelled(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn time_exceeded(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn win_percentage(&self) -> f64 {
        self.config.win_percentage
    }

    pub fn min_win_percentage(&self) -> f64 {
        self.config.min_win_percentage
    }

    /// Seed of an independent random stream keyed by `parts`.
    pub fn stream_seed(&self, parts: &[u64]) -> u64 {
        let mut h = mix(self.seed);
        for p in parts {
            h = mix(h ^ p.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        }
        h
    }

    /// A deterministic RNG keyed by `parts`.
    pub fn rng(&self, parts: &[u64]) -> SmallRng {
        SmallRng::seed_from_u64(self.stream_seed(parts))
    }

    pub fn name(&self, t: TerritoryId) -> &'a str {
        &self.state.territory(t).name
    }

    pub fn player_name(&self) -> &'a str {
        &self.state.player(self.player).name
    }
}

/// SplitMix64 finaliser.
pub(crate) fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::StateBuilder;

    fn tiny_state() -> GameState {
        let mut b = StateBuilder::new();
        let p = b.player("P", 0);
        let _ = b.land("A", 1, Some(p));
        b.build()
    }

    #[test]
    fn default_config_values() {
        let c = EngineConfig::default();
        assert_eq!(c.win_percentage, 90.0);
        assert_eq!(c.max_battle_rounds, 20);
        assert!(!c.randomize_ties);
    }

    #[test]
    fn partial_json_overrides_named_fields_only() {
        let c: EngineConfig =
            serde_json::from_str(r#"{"win_percentage": 80.0, "seed": 7}"#).unwrap();
        assert_eq!(c.win_percentage, 80.0);
        assert_eq!(c.seed, 7);
        assert_eq!(c.time_budget_ms, 5000);
    }

    #[test]
    fn set_option_parses_known_names() {
        let mut c = EngineConfig::default();
        assert!(c.set_option("WinPercentage", "75"));
        assert_eq!(c.win_percentage, 75.0);
        assert!(c.set_option("RandomizeTies", "true"));
        assert!(c.randomize_ties);
        assert!(!c.set_option("WinPercentage", "lots"));
        assert!(!c.set_option("Nope", "1"));
    }

    #[test]
    fn streams_are_deterministic_for_fixed_seed() {
        let state = tiny_state();
        let config = EngineConfig {
            seed: 42,
            ..Default::default()
        };
        let a = PlanningContext::new(&state, PlayerId(0), config.clone());
        let b = PlanningContext::new(&state, PlayerId(0), config);
        assert_eq!(a.stream_seed(&[1, 2]), b.stream_seed(&[1, 2]));
        assert_ne!(a.stream_seed(&[1, 2]), a.stream_seed(&[2, 1]));
    }

    #[test]
    fn cancel_flag_is_shared() {
        let state = tiny_state();
        let flag = Arc::new(AtomicBool::new(false));
        let ctx = PlanningContext::new(&state, PlayerId(0), EngineConfig::default())
            .with_cancel(flag.clone());
        assert!(ctx.check_cancelled().is_ok());
        flag.store(true, Ordering::Relaxed);
        assert!(matches!(ctx.check_cancelled(), Err(EngineError::Cancelled)));
        assert!(ctx.as_player(PlayerId(0)).is_cancelled());
    }
}
