//! Hold evaluation.
//!
//! Answers one question for the non-combat, purchase, and attack planners:
//! given the defenders a territory would have and the strongest enemy
//! attack against it, does it survive? Capitals are held to a stricter
//! bound than ordinary territories.

use std::collections::BTreeSet;

use crate::battle::{battle_participants, estimate_defend_battle_results, BattleResult};
use crate::board::{TerritoryId, UnitId};
use crate::context::PlanningContext;
use crate::options::{find_max_enemy_attacks, EnemyAttacks};

/// Outcome of a hold check, with the enemy as attacker.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldAssessment {
    pub territory: TerritoryId,
    pub result: BattleResult,
    pub can_hold: bool,
}

/// Whether `t` survives `attackers` (plus bombarding `bombard`) with
/// `defenders` standing in it.
///
/// Ordinary land falls when the enemy keeps a land unit with at least the
/// minimum win percentage; water falls when the enemy gains value with that
/// probability. A capital falls as soon as the enemy wins more than
/// `100 - win_percentage` percent of the time with a land unit left.
pub fn assess_hold(
    ctx: &PlanningContext,
    t: TerritoryId,
    attackers: &[UnitId],
    bombard: &[UnitId],
    defenders: &[UnitId],
) -> HoldAssessment {
    let state = ctx.state;
    if battle_participants(state, t, attackers).is_empty() {
        return HoldAssessment {
            territory: t,
            result: BattleResult::empty(),
            can_hold: true,
        };
    }
    let result = estimate_defend_battle_results(ctx, t, attackers, defenders, bombard);
    let terr = state.territory(t);
    let can_hold = if terr.is_capital() && terr.is_land() {
        let only_air = attackers.iter().all(|u| state.type_of(*u).is_air());
        only_air
            || !result.has_land_unit_remaining
            || result.win_percentage <= 100.0 - ctx.win_percentage()
    } else if terr.is_land() {
        !result.has_land_unit_remaining || result.win_percentage < ctx.min_win_percentage()
    } else {
        result.tuv_swing <= 0.0 || result.win_percentage < ctx.min_win_percentage()
    };
    HoldAssessment {
        territory: t,
        result,
        can_hold,
    }
}

/// Hold checks for every allied territory that some enemy can reach, with
/// the defenders currently standing there.
pub fn assess_allied_territories(ctx: &PlanningContext) -> (EnemyAttacks, Vec<HoldAssessment>) {
    let state = ctx.state;
    let allied: BTreeSet<TerritoryId> = state
        .territories
        .iter()
        .filter(|t| {
            state.is_allied_territory(t.id, ctx.player)
                || (t.is_water() && !state.owned_units(t.id, ctx.player).is_empty())
        })
        .map(|t| t.id)
        .collect();
    let enemy = find_max_enemy_attacks(ctx, &allied, &BTreeSet::new());
    let assessments = allied
        .iter()
        .filter_map(|t| {
            let attack = enemy.get(*t)?;
            let defenders = state.allied_units(*t, ctx.player);
            Some(assess_hold(ctx, *t, &attack.all_units(), &attack.bombard, &defenders))
        })
        .collect();
    (enemy, assessments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{GameState, PlayerId, StateBuilder};
    use crate::context::EngineConfig;

    fn border(defenders: usize, attackers: usize, capital: bool) -> (GameState, TerritoryId) {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let inf = b.infantry();
        let arm = b.armour();
        let home = b.land("Home", 4, Some(red));
        let front = b.land("Front", 2, Some(blue));
        b.connect(home, front);
        if capital {
            b.capital(home, red);
        }
        b.add_units(red, inf, home, defenders);
        b.add_units(blue, arm, front, attackers);
        (b.build(), home)
    }

    fn ctx(state: &GameState) -> PlanningContext<'_> {
        PlanningContext::new(state, PlayerId(0), EngineConfig { seed: 5, ..Default::default() })
    }

    #[test]
    fn unreachable_territory_holds() {
        let (state, home) = border(1, 0, false);
        let c = ctx(&state);
        let hold = assess_hold(&c, home, &[], &[], &state.allied_units(home, PlayerId(0)));
        assert!(hold.can_hold);
        assert_eq!(hold.result.win_percentage, 0.0);
    }

    #[test]
    fn heavy_garrison_holds_light_attack() {
        let (state, home) = border(8, 1, false);
        let c = ctx(&state);
        let (_, assessments) = assess_allied_territories(&c);
        let home_check = assessments.iter().find(|a| a.territory == home);
        assert!(home_check.is_some_and(|a| a.can_hold));
    }

    #[test]
    fn empty_territory_falls_to_any_land_attack() {
        let (state, home) = border(0, 2, false);
        let c = ctx(&state);
        let (_, assessments) = assess_allied_territories(&c);
        let home_check = assessments.iter().find(|a| a.territory == home);
        assert!(home_check.is_some_and(|a| !a.can_hold));
    }

    #[test]
    fn capital_bound_is_stricter() {
        // Three tanks against three infantry: a contested fight, which a
        // capital must not accept
        let (capital, home) = border(3, 3, true);
        let c = ctx(&capital);
        let check = assess_allied_territories(&c).1.into_iter().find(|a| a.territory == home);
        assert!(check.is_some_and(|a| !a.can_hold && a.result.win_percentage > 10.0));
    }
}
