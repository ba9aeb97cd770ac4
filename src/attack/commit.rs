//! Final unit commitment.
//!
//! After the frontier search the ranked targets are known to be winnable.
//! This pass allocates once more, tops attacks up with units that would
//! otherwise idle, then weighs every attack against the counter-attack it
//! invites. The worst offender is strafed, dropped, or stops counting as
//! held, and the pass repeats until every attack stands on its own.

use crate::battle::{calculate_battle_results, is_overwhelming_win, BattleResult};
use crate::board::{TerritoryId, UnitId};
use crate::context::PlanningContext;
use crate::error::EngineError;
use crate::options::{
    can_air_land_after_attack, sort_unit_move_options, AttackOption, EnemyAttacks, UnitOptions,
};

use super::hold::{holds_against, non_air};
use super::{flag, AttackPlanner};

/// Battles expected to last this many rounds are worth the losses even at a
/// negative attack value.
const LONG_BATTLE_ROUNDS: f64 = 4.0;

enum Verdict {
    Keep,
    Strafe(TerritoryId),
    Drop(TerritoryId),
    GiveUpHold(TerritoryId),
}

/// How one committed attack fares against its counter-attack.
struct Evaluation {
    fails: bool,
    strafe_ok: bool,
    downgrade: bool,
}

/// Enemy counter-attack against the survivors of our attack on `t`. When we
/// mean to hold, units left over from the allocation may reinforce.
fn counter_attack(
    ctx: &PlanningContext,
    enemy: &EnemyAttacks,
    opt: &AttackOption,
    result: &BattleResult,
    reserves: &[UnitId],
) -> Option<BattleResult> {
    let state = ctx.state;
    let attack = enemy.get(opt.territory)?;
    let enemy_ctx = ctx.as_player(attack.player);
    let attackers = attack.all_units();
    let survivors = non_air(state, &result.average_attackers_remaining);
    let counter = calculate_battle_results(
        &enemy_ctx,
        opt.territory,
        &attackers,
        &survivors,
        &attack.bombard,
    );
    if !opt.can_hold || counter.tuv_swing <= 0.0 || reserves.is_empty() {
        return Some(counter);
    }
    let mut reinforced = survivors;
    reinforced.extend_from_slice(reserves);
    let helped = calculate_battle_results(
        &enemy_ctx,
        opt.territory,
        &attackers,
        &reinforced,
        &attack.bombard,
    );
    Some(if helped.tuv_swing < counter.tuv_swing {
        helped
    } else {
        counter
    })
}

impl AttackPlanner<'_, '_> {
    /// Commits units to the ranked targets, giving up the attacks that cost
    /// more than they gain until the rest are all worth it.
    pub(super) fn determine_units_to_attack_with(&mut self) -> Result<(), EngineError> {
        loop {
            self.ctx.check_cancelled()?;
            let targets = self.prioritized.clone();
            let remaining = self.try_to_attack_territories(&targets);
            let remaining = self.add_safe_air(remaining);
            let remaining = self.add_holding_units(remaining);
            let remaining = self.add_sea_units(remaining);

            match self.judge(&targets, &remaining) {
                Verdict::Keep => return Ok(()),
                Verdict::Strafe(t) => {
                    if let Some(opt) = self.maps.territories.get_mut(&t) {
                        opt.is_strafing = true;
                        opt.can_hold = false;
                    }
                    self.ctx.observer().note(&format!("strafing {}", self.ctx.name(t)));
                }
                Verdict::Drop(t) => self.remove_target(t, "not worth the counter-attack"),
                Verdict::GiveUpHold(t) => {
                    if let Some(opt) = self.maps.territories.get_mut(&t) {
                        opt.can_hold = false;
                    }
                }
            }
        }
    }

    /// Spare air joins the weakest attack it can safely land from, unless
    /// anti-air defends or the battle is already decided.
    fn add_safe_air(&mut self, mut remaining: UnitOptions) -> UnitOptions {
        let ctx = self.ctx;
        let state = ctx.state;
        for (u, ts) in sort_unit_move_options(ctx, &remaining) {
            if !state.type_of(u).is_air() {
                continue;
            }
            let mut best: Option<(TerritoryId, f64)> = None;
            for t in ts {
                let safe = can_air_land_after_attack(ctx, u, t)
                    || (state.has_factory(t) && state.is_enemy_territory(t, ctx.player));
                if !safe || state.has_enemy_anti_air(t, ctx.player) {
                    continue;
                }
                let Some(opt) = self.maps.territories.get_mut(&t) else {
                    continue;
                };
                if is_overwhelming_win(state, t, &opt.attackers(), &opt.defenders(ctx)) {
                    continue;
                }
                let win = opt.result(ctx).win_percentage;
                if best.map_or(true, |(_, w)| win < w) {
                    best = Some((t, win));
                }
            }
            if let Some((t, _)) = best {
                if self.maps.territories.get_mut(&t).is_some_and(|o| o.add_unit(u)) {
                    remaining.remove(&u);
                }
            }
        }
        remaining
    }

    /// Spare land and sea units strengthen attacks we mean to hold while the
    /// battle is still expected to drag on.
    fn add_holding_units(&mut self, mut remaining: UnitOptions) -> UnitOptions {
        let ctx = self.ctx;
        let state = ctx.state;
        for (u, ts) in sort_unit_move_options(ctx, &remaining) {
            if state.type_of(u).is_air() {
                continue;
            }
            let mut best: Option<(TerritoryId, f64)> = None;
            for t in ts {
                let Some(opt) = self.maps.territories.get_mut(&t) else {
                    continue;
                };
                if !opt.can_hold
                    || is_overwhelming_win(state, t, &opt.attackers(), &opt.defenders(ctx))
                {
                    continue;
                }
                let result = opt.result(ctx);
                if result.battle_rounds <= 2.0 {
                    continue;
                }
                let win = result.win_percentage;
                if best.map_or(true, |(_, w)| win < w) {
                    best = Some((t, win));
                }
            }
            if let Some((t, _)) = best {
                if self.maps.territories.get_mut(&t).is_some_and(|o| o.add_unit(u)) {
                    remaining.remove(&u);
                }
            }
        }
        remaining
    }

    /// A spare ship joins a sea battle only when it adds more value than a
    /// third of its own cost.
    fn add_sea_units(&mut self, mut remaining: UnitOptions) -> UnitOptions {
        let ctx = self.ctx;
        let state = ctx.state;
        for (u, ts) in sort_unit_move_options(ctx, &remaining) {
            let ut = state.type_of(u);
            if !ut.is_sea() {
                continue;
            }
            let margin = ut.cost as f64 / 3.0;
            for t in ts {
                let Some(opt) = self.maps.territories.get_mut(&t) else {
                    continue;
                };
                let before = opt.result(ctx).tuv_swing;
                if !opt.add_unit(u) {
                    continue;
                }
                let after = opt.result(ctx).tuv_swing;
                if after - margin > before {
                    remaining.remove(&u);
                    break;
                }
                opt.remove_unit(u);
            }
        }
        remaining
    }

    fn judge(&mut self, targets: &[TerritoryId], remaining: &UnitOptions) -> Verdict {
        let state = self.ctx.state;
        let mut worst: Option<(TerritoryId, Evaluation)> = None;
        let mut last_downgrade = None;
        for &t in targets {
            // Reserves that could still move in after the battle
            let reserves: Vec<UnitId> = remaining
                .iter()
                .filter(|(_, ts)| ts.contains(&t))
                .map(|(u, _)| *u)
                .filter(|u| !state.type_of(*u).is_air())
                .collect();
            let Some(eval) = self.evaluate(t, &reserves) else {
                continue;
            };
            if eval.downgrade {
                last_downgrade = Some(t);
            }
            if eval.fails {
                worst = Some((t, eval));
            }
        }
        match (worst, last_downgrade) {
            (Some((t, eval)), _) if eval.strafe_ok => Verdict::Strafe(t),
            (Some((t, _)), _) => Verdict::Drop(t),
            (None, Some(t)) => Verdict::GiveUpHold(t),
            (None, None) => Verdict::Keep,
        }
    }

    fn evaluate(&mut self, t: TerritoryId, reserves: &[UnitId]) -> Option<Evaluation> {
        let ctx = self.ctx;
        let state = ctx.state;
        let min_win = ctx.min_win_percentage();
        let opt = self.maps.territories.get_mut(&t)?;
        let result = opt.result(ctx).clone();
        let attackers = opt.attackers();
        let terr = state.territory(t);
        let land = terr.is_land();

        let counter = counter_attack(ctx, &self.enemy, opt, &result, reserves);
        let (can_hold, counter_swing) = match counter {
            Some(counter) => (holds_against(land, &counter, min_win), counter.tuv_swing.max(0.0)),
            None => (true, 0.0),
        };

        let production = terr.production as f64;
        let factory = flag(state.has_factory(t));
        let exposed_landing = flag(!opt.amphib_attacks().is_empty() && !can_hold);
        let capital_income = match terr.capital_of {
            Some(owner) if terr.is_capital() && state.is_enemy_territory(t, ctx.player) => {
                state.income(owner) as f64
            }
            _ => 0.0,
        };
        let hold_bonus = flag(can_hold) * (1.0 + 1.5 * factory);
        let territory_value = (1.0 + flag(land) - exposed_landing + factory + hold_bonus)
            * production
            + capital_income;
        let attack_value =
            1.0 + result.tuv_swing + territory_value * result.win_percentage / 100.0
                    - counter_swing * 2.0 / 3.0;

        let neutral = state.is_neutral_land(t);
        let flexible = attackers
            .iter()
            .all(|u| self.maps.unit_options.get(u).is_some_and(|ts| ts.len() > 1));
        let fails = !opt.is_strafing
            && (result.win_percentage < min_win
                || !result.has_land_unit_remaining
                || (neutral && !can_hold)
                || (attack_value < 0.0
                    && (!neutral || flexible || result.battle_rounds >= LONG_BATTLE_ROUNDS)));

        Some(Evaluation {
            fails,
            strafe_ok: !neutral && result.tuv_swing > 0.0 && result.win_percentage >= min_win,
            downgrade: opt.can_hold && (!can_hold || counter_swing > result.tuv_swing),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{GameState, PlayerId, StateBuilder};
    use crate::context::EngineConfig;

    fn ctx(state: &GameState) -> PlanningContext<'_> {
        PlanningContext::new(state, PlayerId(0), EngineConfig { seed: 21, ..Default::default() })
    }

    fn ready<'c, 'a>(ctx: &'c PlanningContext<'a>) -> AttackPlanner<'c, 'a> {
        let mut planner = AttackPlanner::new(ctx);
        planner.remove_territories_that_cant_be_conquered();
        let all = planner.maps.territories.keys().copied().collect();
        planner.refresh_enemy_attacks(&all);
        planner.determine_territories_that_can_be_held();
        planner.prioritize_attack_options();
        planner
    }

    #[test]
    fn safe_attack_is_kept_and_held() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let inf = b.infantry();
        let arm = b.armour();
        let home = b.land("Home", 3, Some(red));
        let target = b.land("Target", 4, Some(blue));
        b.connect(home, target);
        b.add_units(red, arm, home, 4);
        b.add_unit(blue, inf, target);
        let state = b.build();
        let c = ctx(&state);

        let mut planner = ready(&c);
        planner.determine_units_to_attack_with().unwrap();
        assert_eq!(planner.prioritized, vec![target]);
        let opt = &planner.maps.territories[&target];
        assert!(opt.can_hold && !opt.is_strafing);
        assert!(opt.is_assigned());
    }

    #[test]
    fn exposed_attack_stops_counting_as_held() {
        // Taking Target leaves the survivors facing a large army from Depot
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let inf = b.infantry();
        let arm = b.armour();
        let home = b.land("Home", 3, Some(red));
        let target = b.land("Target", 4, Some(blue));
        let depot = b.land("Depot", 1, Some(blue));
        b.connect(home, target);
        b.connect(target, depot);
        b.add_units(red, arm, home, 4);
        b.add_unit(blue, inf, target);
        b.add_units(blue, arm, depot, 10);
        let state = b.build();
        let c = ctx(&state);

        let mut planner = ready(&c);
        planner.determine_units_to_attack_with().unwrap();
        if let Some(opt) = planner.maps.territories.get(&target) {
            assert!(!opt.can_hold);
        }
    }
}
