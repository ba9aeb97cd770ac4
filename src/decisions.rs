//! Decisions taken while a battle is being fought: retreat, scramble,
//! casualty choice, and whether submarines should attack.
//!
//! Each decision reads a `BattleContext` describing the battle in progress
//! and the planning context of the player asked.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::battle::{
    calculate_battle_results, estimate_defend_battle_results, estimate_strength,
    strength_difference, BattleResult,
};
use crate::board::{GameState, PlayerId, TerritoryId, UnitId};
use crate::context::PlanningContext;
use crate::error::EngineError;
use crate::options::scramble_candidates;

/// Strength difference above which a winning attacker stays.
const PRESS_ON_DIFFERENCE: f64 = 50.0;
/// A casualty this much dearer than the next one is saved for later.
const EXPENSIVE_RATIO: f64 = 1.5;

/// A battle in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleContext {
    pub territory: TerritoryId,
    pub attacker: PlayerId,
    pub attackers: Vec<UnitId>,
    pub defenders: Vec<UnitId>,
    #[serde(default)]
    pub amphibious: bool,
    /// The attack was planned to kill units rather than take the territory.
    #[serde(default)]
    pub strafing: bool,
}

impl BattleContext {
    fn validate(&self, state: &GameState) -> Result<(), EngineError> {
        check_territory(state, self.territory)?;
        check_units(state, self.attackers.iter().chain(&self.defenders))
    }

    fn is_attacker(&self, player: PlayerId) -> bool {
        self.attacker == player
    }

    /// Units on the other side from `player`.
    fn enemy_units(&self, player: PlayerId) -> &[UnitId] {
        if self.is_attacker(player) {
            &self.defenders
        } else {
            &self.attackers
        }
    }
}

fn check_territory(state: &GameState, t: TerritoryId) -> Result<(), EngineError> {
    if t.index() < state.territories.len() {
        Ok(())
    } else {
        Err(EngineError::UnknownTerritory(t))
    }
}

fn check_units<'u>(
    state: &GameState,
    units: impl IntoIterator<Item = &'u UnitId>,
) -> Result<(), EngineError> {
    match units.into_iter().find(|u| u.0 as usize >= state.units.len()) {
        Some(u) => Err(EngineError::UnknownUnit(*u)),
        None => Ok(()),
    }
}

/// Where to retreat to, if at all.
///
/// Amphibious assaults never retreat. A strafing or clearly stronger
/// attacker stays while it still has a land unit (or fights at sea).
/// Otherwise the attacker leaves when the odds or the value trade turn
/// against it, and a defender submerges when the attacker is gaining value.
pub fn decide_retreat(
    ctx: &PlanningContext,
    battle: &BattleContext,
    candidates: &[TerritoryId],
) -> Result<Option<TerritoryId>, EngineError> {
    let state = ctx.state;
    battle.validate(state)?;
    for t in candidates {
        check_territory(state, *t)?;
    }
    let t = battle.territory;
    if battle.amphibious || candidates.is_empty() {
        return Ok(None);
    }

    let attacking = battle.is_attacker(ctx.player);
    let difference = strength_difference(state, t, &battle.attackers, &battle.defenders);
    let still_fighting = state.territory(t).is_water()
        || battle.attackers.iter().any(|u| state.type_of(*u).is_land());
    if attacking && (battle.strafing || difference > PRESS_ON_DIFFERENCE) && still_fighting {
        return Ok(None);
    }

    let result = calculate_battle_results(ctx, t, &battle.attackers, &battle.defenders, &[]);
    let leave = if attacking {
        result.win_percentage < ctx.config.retreat_win_percentage || result.tuv_swing < 0.0
    } else {
        result.tuv_swing > 0.0
    };
    if !leave {
        return Ok(None);
    }

    let best = candidates
        .iter()
        .copied()
        .map(|c| {
            let allied = state.allied_units(c, ctx.player);
            (c, estimate_strength(state, c, &allied, false))
        })
        .fold(None, |best: Option<(TerritoryId, f64)>, (c, s)| match best {
            Some((_, b)) if b >= s => best,
            _ => Some((c, s)),
        });
    if let Some((target, _)) = best {
        ctx.observer().note(&format!(
            "retreating from {} to {} at {:.0}% win",
            ctx.name(t),
            ctx.name(target),
            result.win_percentage
        ));
    }
    Ok(best.map(|(c, _)| c))
}

fn defence_holds(state: &GameState, t: TerritoryId, result: &BattleResult) -> bool {
    if state.territory(t).is_land() {
        !result.has_land_unit_remaining
    } else {
        result.tuv_swing <= 0.0
    }
}

/// Air units to scramble into the defended territory, grouped by base.
///
/// Nothing is scrambled when the defence already holds, or when even every
/// scrambler together loses and only makes the trade worse. Otherwise
/// scramblers join strongest first until the defence holds.
pub fn decide_scramble(
    ctx: &PlanningContext,
    battle: &BattleContext,
) -> Result<Option<BTreeMap<TerritoryId, Vec<UnitId>>>, EngineError> {
    let state = ctx.state;
    battle.validate(state)?;
    let t = battle.territory;
    let candidates = scramble_candidates(ctx, t);
    if candidates.is_empty() {
        return Ok(None);
    }

    let without = estimate_defend_battle_results(ctx, t, &battle.attackers, &battle.defenders, &[]);
    if defence_holds(state, t, &without) {
        return Ok(None);
    }
    let mut everyone = battle.defenders.clone();
    everyone.extend(candidates.iter().map(|(u, _)| *u));
    let with_all = estimate_defend_battle_results(ctx, t, &battle.attackers, &everyone, &[]);
    if !defence_holds(state, t, &with_all) && with_all.tuv_swing > without.tuv_swing {
        return Ok(None);
    }

    let mut defenders = battle.defenders.clone();
    let mut scramble: BTreeMap<TerritoryId, Vec<UnitId>> = BTreeMap::new();
    for (unit, base) in candidates {
        ctx.check_cancelled()?;
        defenders.push(unit);
        scramble.entry(base).or_default().push(unit);
        let result = estimate_defend_battle_results(ctx, t, &battle.attackers, &defenders, &[]);
        if defence_holds(state, t, &result) {
            break;
        }
    }
    Ok(Some(scramble))
}

/// Hits to assign and the rules engine's own suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasualtyRequest {
    pub battle: BattleContext,
    pub select_from: Vec<UnitId>,
    pub default_killed: Vec<UnitId>,
    #[serde(default)]
    pub default_damaged: Vec<UnitId>,
    pub hits: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasualtySelection {
    pub killed: Vec<UnitId>,
    pub damaged: Vec<UnitId>,
}

impl CasualtySelection {
    pub fn len(&self) -> usize {
        self.killed.len() + self.damaged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Moves planes ahead of the carrier they sit on, so a carrier is lost only
/// after its planes.
fn interleave_carriers_and_planes(state: &GameState, units: Vec<UnitId>) -> Vec<UnitId> {
    let mut ordered = units;
    let mut i = 0;
    while i < ordered.len() {
        let ut = state.type_of(ordered[i]);
        if !ut.is_carrier() {
            i += 1;
            continue;
        }
        let owner = state.unit(ordered[i]).owner;
        let mut space = ut.carrier_capacity;
        let mut planes = Vec::new();
        let mut j = i + 1;
        while j < ordered.len() && space > 0 {
            let pt = state.type_of(ordered[j]);
            if pt.can_land_on_carrier()
                && state.unit(ordered[j]).owner == owner
                && pt.carrier_cost <= space
            {
                space -= pt.carrier_cost;
                planes.push(ordered.remove(j));
            } else {
                j += 1;
            }
        }
        let moved = planes.len();
        for (k, plane) in planes.into_iter().enumerate() {
            ordered.insert(i + k, plane);
        }
        i += moved + 1;
    }
    ordered
}

/// Chooses which units die.
///
/// With no enemy left the cheapest units go first. Otherwise the host's
/// order is bubbled so that a unit dearer than `1.5x` its neighbour dies
/// later, unless we are a defender that is losing anyway and only trying
/// to survive. The answer always has exactly the requested number of
/// casualties; a suggestion that disagrees with the hit count is a caller
/// error.
pub fn select_casualties(
    ctx: &PlanningContext,
    request: &CasualtyRequest,
) -> Result<CasualtySelection, EngineError> {
    let state = ctx.state;
    let battle = &request.battle;
    battle.validate(state)?;
    check_units(
        state,
        request
            .select_from
            .iter()
            .chain(&request.default_killed)
            .chain(&request.default_damaged),
    )?;

    let suggested = request.default_killed.len() + request.default_damaged.len();
    if suggested != request.hits {
        return Err(EngineError::CasualtyCountMismatch {
            requested: request.hits,
            provided: suggested,
        });
    }
    if request.default_killed.is_empty() {
        return Ok(CasualtySelection {
            killed: Vec::new(),
            damaged: request.default_damaged.clone(),
        });
    }

    let mut sorted = request.select_from.clone();
    if battle.enemy_units(ctx.player).is_empty() {
        sorted.sort_by(|a, b| state.unit_value(*a).total_cmp(&state.unit_value(*b)).then(a.cmp(b)));
    } else {
        let mut need_check = true;
        if !battle.is_attacker(ctx.player) {
            let survivors: Vec<UnitId> = battle
                .defenders
                .iter()
                .copied()
                .filter(|u| !request.default_killed.contains(u))
                .collect();
            let difference = strength_difference(
                state,
                battle.territory,
                &battle.attackers,
                &survivors,
            );
            let min_difference = if state.low_luck { 60.0 } else { 55.0 };
            if difference > min_difference {
                need_check = false;
            }
        }
        while need_check {
            need_check = false;
            for i in 0..sorted.len().saturating_sub(1) {
                if state.unit_value(sorted[i]) > EXPENSIVE_RATIO * state.unit_value(sorted[i + 1]) {
                    sorted.swap(i, i + 1);
                    need_check = true;
                }
            }
        }
    }

    let ordered = interleave_carriers_and_planes(state, sorted);
    let killed: Vec<UnitId> = ordered.into_iter().take(request.default_killed.len()).collect();
    let selection = CasualtySelection {
        killed,
        damaged: request.default_damaged.clone(),
    };
    if selection.len() != request.hits {
        return Err(EngineError::CasualtyCountMismatch {
            requested: request.hits,
            provided: selection.len(),
        });
    }
    Ok(selection)
}

/// Submarines attack only when they are expected to gain value.
pub fn decide_sub_attack(
    ctx: &PlanningContext,
    battle: &BattleContext,
) -> Result<bool, EngineError> {
    battle.validate(ctx.state)?;
    let result = calculate_battle_results(
        ctx,
        battle.territory,
        &battle.attackers,
        &battle.defenders,
        &[],
    );
    Ok(result.tuv_swing > 0.0)
}
