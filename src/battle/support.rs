//! Support bonus allocation.
//!
//! Supporting units boost a finite number of friendly units. Rules are
//! handed out strongest bonus first; within a rule the weakest eligible
//! units are boosted first and units already at the die cap are skipped so
//! no support is wasted.

use crate::board::{GameState, SupportKind, UnitId};

/// Strength and dice of one unit in a battle after support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitPower {
    pub unit: UnitId,
    pub strength: u32,
    pub rolls: u32,
}

/// Computes per-unit power for one side of a battle.
///
/// Infrastructure is excluded. `marines` lists attackers landing from
/// transports, which add their marine bonus.
pub fn unit_powers(
    state: &GameState,
    units: &[UnitId],
    attacking: bool,
    marines: &[UnitId],
) -> Vec<UnitPower> {
    let dice = state.dice_sides as i64;
    let mut strengths: Vec<i64> = Vec::with_capacity(units.len());
    let mut powers: Vec<UnitPower> = Vec::with_capacity(units.len());

    for &u in units {
        let ut = state.type_of(u);
        if !ut.is_combatant() {
            continue;
        }
        let mut strength = ut.strength(attacking) as i64;
        if attacking && marines.contains(&u) {
            strength += ut.marine_bonus as i64;
        }
        strengths.push(strength);
        powers.push(UnitPower {
            unit: u,
            strength: 0,
            rolls: ut.rolls(attacking),
        });
    }

    let mut rules: Vec<_> = state
        .support_rules
        .iter()
        .filter(|r| r.applies(attacking) && r.bonus != 0)
        .collect();
    rules.sort_by(|a, b| b.bonus.cmp(&a.bonus).then_with(|| a.name.cmp(&b.name)));

    for rule in rules {
        let mut available: u32 = units
            .iter()
            .filter(|u| state.unit(**u).kind == rule.supporter)
            .count() as u32
            * rule.number;
        if available == 0 {
            continue;
        }

        let mut candidates: Vec<usize> = (0..powers.len())
            .filter(|&i| rule.supported.contains(&state.unit(powers[i].unit).kind))
            .collect();
        candidates.sort_by_key(|&i| (strengths[i], powers[i].unit));

        for i in candidates {
            if available == 0 {
                break;
            }
            match rule.kind {
                SupportKind::Strength => {
                    if rule.bonus > 0 && strengths[i] >= dice {
                        continue;
                    }
                    strengths[i] += rule.bonus as i64;
                }
                SupportKind::Rolls => {
                    let rolls = powers[i].rolls as i64 + rule.bonus as i64;
                    powers[i].rolls = rolls.max(0) as u32;
                }
            }
            available -= 1;
        }
    }

    for (p, s) in powers.iter_mut().zip(strengths) {
        p.strength = s.clamp(0, dice) as u32;
    }
    powers
}

/// Sum of strength times rolls.
pub fn total_power(powers: &[UnitPower]) -> u32 {
    powers.iter().map(|p| p.strength * p.rolls).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{PlayerId, StateBuilder, SupportRule};

    #[test]
    fn artillery_supports_one_infantry_on_attack() {
        let mut b = StateBuilder::new();
        let p = b.player("P", 0);
        let inf = b.infantry();
        let art = b.artillery();
        let t = b.land("T", 1, Some(p));
        let i1 = b.add_unit(p, inf, t);
        let i2 = b.add_unit(p, inf, t);
        let a = b.add_unit(p, art, t);
        let state = b.build();

        let powers = unit_powers(&state, &[i1, i2, a], true, &[]);
        let boosted = powers.iter().filter(|x| x.strength == 2 && x.unit != a).count();
        assert_eq!(boosted, 1);
        assert_eq!(total_power(&powers), 2 + 1 + 2);

        let defending = unit_powers(&state, &[i1, i2, a], false, &[]);
        assert_eq!(total_power(&defending), 6);
    }

    #[test]
    fn strength_is_capped_at_die_sides() {
        let mut b = StateBuilder::new();
        let p = b.player("P", 0);
        let strong = b.unit_type(crate::board::UnitType {
            name: "elite".into(),
            attack: 6,
            ..Default::default()
        });
        let booster = b.unit_type(crate::board::UnitType {
            name: "booster".into(),
            ..Default::default()
        });
        b.support(SupportRule {
            name: "boost".into(),
            supporter: booster,
            supported: vec![strong],
            bonus: 2,
            number: 1,
            offence: true,
            defence: false,
            kind: SupportKind::Strength,
        });
        let t = b.land("T", 0, Some(p));
        let e = b.add_unit(p, strong, t);
        let s = b.add_unit(p, booster, t);
        let state = b.build();
        let powers = unit_powers(&state, &[e, s], true, &[]);
        assert_eq!(powers[0].strength, 6);
        assert_eq!(state.unit(e).owner, PlayerId(0));
    }

    #[test]
    fn infrastructure_has_no_power() {
        let mut b = StateBuilder::new();
        let p = b.player("P", 0);
        let f = b.factory();
        let t = b.land("T", 0, Some(p));
        let u = b.add_unit(p, f, t);
        let state = b.build();
        assert!(unit_powers(&state, &[u], false, &[]).is_empty());
    }

    #[test]
    fn marines_gain_bonus() {
        let mut b = StateBuilder::new();
        let p = b.player("P", 0);
        let marine = b.unit_type(crate::board::UnitType {
            name: "marine".into(),
            attack: 1,
            marine_bonus: 1,
            ..Default::default()
        });
        let t = b.land("T", 0, Some(p));
        let m = b.add_unit(p, marine, t);
        let state = b.build();
        assert_eq!(unit_powers(&state, &[m], true, &[m])[0].strength, 2);
        assert_eq!(unit_powers(&state, &[m], true, &[])[0].strength, 1);
    }
}
