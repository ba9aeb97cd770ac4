//! The engine: one entry point per decision the game loop asks for.
//!
//! `ProAiEngine` owns the configuration, a rayon worker pool sized by it,
//! the observer, and a cancel token. Every call builds a fresh
//! `PlanningContext` over the snapshot it is handed and runs the matching
//! planner inside the pool, so estimator parallelism never touches the
//! global rayon pool. Nothing is remembered between calls except the
//! strafing targets of the last combat plan, which retreat decisions use.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::attack::{plan_combat_move, CombatPlan};
use crate::board::{GameState, PlayerId, TerritoryId, UnitId};
use crate::context::{EngineConfig, PlanningContext};
use crate::decisions::{
    decide_retreat, decide_scramble, decide_sub_attack, select_casualties, BattleContext,
    CasualtyRequest,
    CasualtySelection,
};
use crate::defense::{plan_non_combat_move, NonCombatPlan};
use crate::error::EngineError;
use crate::observer::{PlanObserver, TracingObserver};
use crate::purchase::{plan_placement, plan_purchase, Placement, PurchasePlan};

/// Shared stop flag for the planning pass in flight.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the running pass to stop. It returns `EngineError::Cancelled`
    /// and no orders.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Re-arms the token for the next pass.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    fn flag(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

/// Pro AI decision engine.
pub struct ProAiEngine {
    config: EngineConfig,
    pool: ThreadPool,
    observer: Arc<dyn PlanObserver>,
    cancel: CancelToken,
    strafing: Mutex<BTreeSet<TerritoryId>>,
}

impl ProAiEngine {
    /// Creates an engine whose worker pool has `config.threads` threads.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let pool = ThreadPoolBuilder::new().num_threads(config.threads).build()?;
        Ok(ProAiEngine {
            config,
            pool,
            observer: Arc::new(TracingObserver),
            cancel: CancelToken::new(),
            strafing: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn PlanObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replaces the configuration, rebuilding the pool when the thread
    /// count changes.
    pub fn set_config(&mut self, config: EngineConfig) -> Result<(), EngineError> {
        if config.threads != self.config.threads {
            self.pool = ThreadPoolBuilder::new().num_threads(config.threads).build()?;
        }
        self.config = config;
        Ok(())
    }

    /// Token that cancels whichever pass is running.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Forgets per-game memory and re-arms the cancel token.
    pub fn new_game(&self) {
        self.cancel.reset();
        if let Ok(mut strafing) = self.strafing.lock() {
            strafing.clear();
        }
    }

    fn context<'a>(
        &self,
        state: &'a GameState,
        player: PlayerId,
    ) -> Result<PlanningContext<'a>, EngineError> {
        if player.0 as usize >= state.players.len() {
            return Err(EngineError::UnknownPlayer(player));
        }
        Ok(PlanningContext::new(state, player, self.config.clone())
            .with_observer(self.observer.clone())
            .with_cancel(self.cancel.flag()))
    }

    fn run<T: Send>(
        &self,
        state: &GameState,
        player: PlayerId,
        f: impl FnOnce(&PlanningContext) -> Result<T, EngineError> + Send,
    ) -> Result<T, EngineError> {
        let ctx = self.context(state, player)?;
        self.pool.install(|| f(&ctx))
    }

    /// Attacks for this turn, with the moves that carry them out.
    pub fn plan_combat_move(
        &self,
        state: &GameState,
        player: PlayerId,
    ) -> Result<CombatPlan, EngineError> {
        let plan = self.run(state, player, plan_combat_move)?;
        if let Ok(mut strafing) = self.strafing.lock() {
            *strafing = plan.attacks.iter().filter(|a| a.strafing).map(|a| a.territory).collect();
        }
        Ok(plan)
    }

    /// Reinforcing and repositioning moves after combat.
    pub fn plan_non_combat_move(
        &self,
        state: &GameState,
        player: PlayerId,
    ) -> Result<NonCombatPlan, EngineError> {
        self.run(state, player, plan_non_combat_move)
    }

    pub fn plan_purchase(
        &self,
        state: &GameState,
        player: PlayerId,
        budget: u32,
    ) -> Result<PurchasePlan, EngineError> {
        self.run(state, player, |ctx| plan_purchase(ctx, budget))
    }

    pub fn plan_placement(
        &self,
        state: &GameState,
        player: PlayerId,
        plan: &PurchasePlan,
    ) -> Result<Vec<Placement>, EngineError> {
        self.run(state, player, |ctx| plan_placement(ctx, plan))
    }

    /// Retreat target for `player` in `battle`, if it should leave. Battles
    /// at territories the last combat plan meant to strafe count as
    /// strafing.
    pub fn decide_retreat(
        &self,
        state: &GameState,
        player: PlayerId,
        battle: &BattleContext,
        candidates: &[TerritoryId],
    ) -> Result<Option<TerritoryId>, EngineError> {
        let mut battle = battle.clone();
        if let Ok(strafing) = self.strafing.lock() {
            battle.strafing |= battle.attacker == player && strafing.contains(&battle.territory);
        }
        self.run(state, player, |ctx| decide_retreat(ctx, &battle, candidates))
    }

    pub fn decide_scramble(
        &self,
        state: &GameState,
        player: PlayerId,
        battle: &BattleContext,
    ) -> Result<Option<BTreeMap<TerritoryId, Vec<UnitId>>>, EngineError> {
        self.run(state, player, |ctx| decide_scramble(ctx, battle))
    }

    /// Casualties for `player`; always exactly `request.hits` of them.
    pub fn select_casualties(
        &self,
        state: &GameState,
        player: PlayerId,
        request: &CasualtyRequest,
    ) -> Result<CasualtySelection, EngineError> {
        self.run(state, player, |ctx| select_casualties(ctx, request))
    }

    pub fn decide_sub_attack(
        &self,
        state: &GameState,
        player: PlayerId,
        battle: &BattleContext,
    ) -> Result<bool, EngineError> {
        self.run(state, player, |ctx| decide_sub_attack(ctx, battle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::StateBuilder;

    fn engine() -> ProAiEngine {
        ProAiEngine::new(EngineConfig {
            seed: 9,
            threads: 2,
            ..Default::default()
        })
        .unwrap()
    }

    fn skirmish() -> (GameState, PlayerId, TerritoryId) {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let inf = b.infantry();
        let arm = b.armour();
        let home = b.land("Home", 3, Some(red));
        let target = b.land("Target", 2, Some(blue));
        b.connect(home, target);
        b.add_units(red, arm, home, 4);
        b.add_units(blue, inf, target, 1);
        (b.build(), red, target)
    }

    #[test]
    fn unknown_player_is_rejected() {
        let (state, _, _) = skirmish();
        let err = engine().plan_combat_move(&state, PlayerId(7)).unwrap_err();
        assert!(matches!(err, EngineError::UnknownPlayer(PlayerId(7))));
    }

    #[test]
    fn cancelled_engine_returns_no_orders() {
        let (state, red, _) = skirmish();
        let engine = engine();
        engine.cancel_token().cancel();
        assert!(matches!(
            engine.plan_combat_move(&state, red),
            Err(EngineError::Cancelled)
        ));
        engine.new_game();
        assert!(engine.plan_combat_move(&state, red).is_ok());
    }

    #[test]
    fn same_seed_gives_same_plan() {
        let (state, red, target) = skirmish();
        let a = engine().plan_combat_move(&state, red).unwrap();
        let b = engine().plan_combat_move(&state, red).unwrap();
        assert_eq!(a, b);
        assert!(a.attacks.iter().any(|x| x.territory == target));
    }
}
