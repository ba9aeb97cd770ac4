//! Scenario JSON: a `GameState` as the host sends it.
//!
//! Decoding is plain serde. Everything the planner later indexes by id is
//! then checked, since a dangling id would otherwise panic deep inside a
//! planning pass. Ids must equal their position in their array.

use std::collections::BTreeSet;

use crate::board::{GameState, PlayerId, TerritoryId, UnitId, UnitTypeId};

/// Why a scenario was refused.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("malformed scenario json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} at index {index} carries id {id}")]
    IdMismatch { kind: &'static str, index: usize, id: u32 },

    #[error("{from:?} borders unknown territory {to:?}")]
    BadAdjacency { from: TerritoryId, to: TerritoryId },

    #[error("{context} references unknown territory {territory:?}")]
    UnknownTerritory { territory: TerritoryId, context: String },

    #[error("{context} references unknown player {player:?}")]
    UnknownPlayer { player: PlayerId, context: String },

    #[error("{context} references unknown unit {unit:?}")]
    UnknownUnit { unit: UnitId, context: String },

    #[error("{context} references unknown unit type {unit_type:?}")]
    UnknownUnitType { unit_type: UnitTypeId, context: String },

    #[error("unit {0:?} is listed in two garrisons")]
    DuplicateUnit(UnitId),

    #[error("dice must have at least one side")]
    NoDice,
}

/// Decodes and validates a scenario.
pub fn load_scenario(json: &str) -> Result<GameState, SnapshotError> {
    let mut state: GameState = serde_json::from_str(json)?;
    validate(&state)?;
    state.reindex();
    Ok(state)
}

/// Serialises a state back to scenario JSON.
pub fn save_scenario(state: &GameState) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string(state)?)
}

fn check_ids(kind: &'static str, ids: impl Iterator<Item = u32>) -> Result<(), SnapshotError> {
    for (index, id) in ids.enumerate() {
        if id as usize != index {
            return Err(SnapshotError::IdMismatch { kind, index, id });
        }
    }
    Ok(())
}

/// Referential integrity of a decoded state.
pub fn validate(state: &GameState) -> Result<(), SnapshotError> {
    if state.dice_sides == 0 {
        return Err(SnapshotError::NoDice);
    }
    check_ids("player", state.players.iter().map(|p| p.id.0 as u32))?;
    check_ids("unit type", state.unit_types.iter().map(|t| t.id.0 as u32))?;
    check_ids("territory", state.territories.iter().map(|t| t.id.0))?;
    check_ids("unit", state.units.iter().map(|u| u.id.0))?;

    let player = |p: PlayerId, context: &str| {
        if (p.0 as usize) < state.players.len() {
            Ok(())
        } else {
            Err(SnapshotError::UnknownPlayer {
                player: p,
                context: context.to_string(),
            })
        }
    };
    let unit_type = |k: UnitTypeId, context: &str| {
        if (k.0 as usize) < state.unit_types.len() {
            Ok(())
        } else {
            Err(SnapshotError::UnknownUnitType {
                unit_type: k,
                context: context.to_string(),
            })
        }
    };

    for p in &state.players {
        for rule in &p.production {
            unit_type(rule.unit_type, &format!("production of {}", p.name))?;
        }
    }
    for rule in &state.support_rules {
        unit_type(rule.supporter, &format!("support rule {}", rule.name))?;
        for k in &rule.supported {
            unit_type(*k, &format!("support rule {}", rule.name))?;
        }
    }

    let mut garrisoned = BTreeSet::new();
    for t in &state.territories {
        for edge in &t.edges {
            if edge.to.index() >= state.territories.len() {
                return Err(SnapshotError::BadAdjacency { from: t.id, to: edge.to });
            }
        }
        if let Some(owner) = t.owner {
            player(owner, &t.name)?;
        }
        if let Some(capital) = t.capital_of {
            player(capital, &t.name)?;
        }
        for u in &t.units {
            if u.0 as usize >= state.units.len() {
                return Err(SnapshotError::UnknownUnit {
                    unit: *u,
                    context: t.name.clone(),
                });
            }
            if !garrisoned.insert(*u) {
                return Err(SnapshotError::DuplicateUnit(*u));
            }
        }
    }

    for u in &state.units {
        let context = format!("unit {}", u.id.0);
        player(u.owner, &context)?;
        unit_type(u.kind, &context)?;
        if let Some(transport) = u.transported_by {
            if transport.0 as usize >= state.units.len() {
                return Err(SnapshotError::UnknownUnit {
                    unit: transport,
                    context,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::StateBuilder;

    fn sample() -> GameState {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let inf = b.infantry();
        let home = b.land("Home", 3, Some(red));
        let sea = b.water("Sea");
        b.connect(home, sea);
        b.add_units(red, inf, home, 2);
        b.build()
    }

    #[test]
    fn saved_scenario_loads_back() {
        let state = sample();
        let json = save_scenario(&state).unwrap();
        let loaded = load_scenario(&json).unwrap();
        assert_eq!(loaded.units.len(), 2);
        assert_eq!(loaded.location(UnitId(1)), state.location(UnitId(1)));
    }

    #[test]
    fn dangling_adjacency_is_rejected() {
        let mut state = sample();
        state.territories[0].edges[0].to = TerritoryId(42);
        let json = save_scenario(&state).unwrap();
        assert!(matches!(
            load_scenario(&json),
            Err(SnapshotError::BadAdjacency { to: TerritoryId(42), .. })
        ));
    }

    #[test]
    fn unit_in_two_garrisons_is_rejected() {
        let mut state = sample();
        let u = state.territories[0].units[0];
        state.territories[1].units.push(u);
        let json = save_scenario(&state).unwrap();
        assert!(matches!(load_scenario(&json), Err(SnapshotError::DuplicateUnit(_))));
    }

    #[test]
    fn garbage_is_a_json_error() {
        assert!(matches!(load_scenario("{not json"), Err(SnapshotError::Json(_))));
    }
}
