//! Dice-based attrition simulation of a single battle.
//!
//! Each call plays one battle to completion (or the round cap) with a
//! caller-supplied RNG. The estimator runs many of these independently and
//! aggregates the outcomes.

use rand::rngs::SmallRng;
use rand::Rng;

use crate::board::UnitId;

/// One fighting unit inside the simulation.
#[derive(Debug, Clone)]
pub(crate) struct Fighter {
    pub unit: UnitId,
    pub hp: u32,
    pub strength: u32,
    pub rolls: u32,
    pub value: f64,
    pub air: bool,
    pub sub: bool,
}

/// One side of a simulated battle.
#[derive(Debug, Clone, Default)]
pub(crate) struct Side {
    /// Fighters in casualty order: earlier entries are lost first.
    pub fighters: Vec<Fighter>,
    pub has_destroyer: bool,
    /// Anti-air batteries as `(strength, shots)`, firing in the first round only.
    pub anti_air: Vec<(u32, u32)>,
    /// Shore bombardment strengths, firing in the first round only.
    pub bombard: Vec<u32>,
}

impl Side {
    fn alive(&self) -> impl Iterator<Item = &Fighter> {
        self.fighters.iter().filter(|f| f.hp > 0)
    }

    fn any_alive(&self) -> bool {
        self.fighters.iter().any(|f| f.hp > 0)
    }
}

/// Outcome of one simulated battle.
#[derive(Debug, Clone)]
pub(crate) struct SimOutcome {
    pub attacker_won: bool,
    pub rounds: u32,
    pub attackers_left: Vec<UnitId>,
    pub defenders_left: Vec<UnitId>,
    pub attacker_loss: f64,
    pub defender_loss: f64,
}

/// Rules shared by every round.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DiceRules {
    pub dice_sides: u32,
    pub low_luck: bool,
    pub max_rounds: u32,
}

/// Hits sorted by which targets they may select.
#[derive(Debug, Default, Clone, Copy)]
struct Hits {
    /// From subs: cannot hit air.
    sub: u32,
    /// From air: cannot hit subs unless a friendly destroyer is present.
    air: u32,
    /// From everything else.
    general: u32,
}

fn roll_group(strengths: &[(u32, u32)], rules: DiceRules, rng: &mut SmallRng) -> u32 {
    if rules.low_luck {
        let power: u32 = strengths.iter().map(|(s, r)| s * r).sum();
        let mut hits = power / rules.dice_sides;
        let rest = power % rules.dice_sides;
        if rest > 0 && rng.gen_range(0..rules.dice_sides) < rest {
            hits += 1;
        }
        hits
    } else {
        let mut hits = 0;
        for &(strength, rolls) in strengths {
            for _ in 0..rolls {
                if rng.gen_range(0..rules.dice_sides) < strength {
                    hits += 1;
                }
            }
        }
        hits
    }
}

/// Rolls for the selected fighters of a side.
fn fire(
    side: &Side,
    select: impl Fn(&Fighter) -> bool,
    rules: DiceRules,
    rng: &mut SmallRng,
) -> Hits {
    let mut sub = Vec::new();
    let mut air = Vec::new();
    let mut general = Vec::new();
    for f in side.alive().filter(|f| select(f)) {
        let entry = (f.strength, f.rolls);
        if f.sub {
            sub.push(entry);
        } else if f.air {
            air.push(entry);
        } else {
            general.push(entry);
        }
    }
    Hits {
        sub: roll_group(&sub, rules, rng),
        air: roll_group(&air, rules, rng),
        general: roll_group(&general, rules, rng),
    }
}

/// Removes up to `count` hit points from fighters accepted by `allow`.
fn apply_hits(side: &mut Side, count: u32, allow: impl Fn(&Fighter) -> bool) -> f64 {
    let mut lost = 0.0;
    for _ in 0..count {
        let target = side
            .fighters
            .iter()
            .position(|f| f.hp > 1 && allow(f))
            .or_else(|| side.fighters.iter().position(|f| f.hp > 0 && allow(f)));
        let Some(i) = target else { break };
        side.fighters[i].hp -= 1;
        if side.fighters[i].hp == 0 {
            lost += side.fighters[i].value;
        }
    }
    lost
}

/// Applies hits to a side; multi-hit-point units absorb damage first.
fn take_hits(side: &mut Side, hits: Hits, firer_has_destroyer: bool) -> f64 {
    apply_hits(side, hits.sub, |f| !f.air)
        + apply_hits(side, hits.air, |f| firer_has_destroyer || !f.sub)
        + apply_hits(side, hits.general, |_| true)
}

/// Plays one battle to completion.
pub(crate) fn simulate_battle(
    attacker: &Side,
    defender: &Side,
    rules: DiceRules,
    rng: &mut SmallRng,
) -> SimOutcome {
    let mut att = attacker.clone();
    let mut def = defender.clone();
    let mut attacker_loss = 0.0;
    let mut defender_loss = 0.0;
    let mut rounds = 0;

    // Opening fire: anti-air against attacking air, bombardment against defenders
    let air_count = att.alive().filter(|f| f.air).count() as u32;
    if air_count > 0 && !def.anti_air.is_empty() {
        let mut shots_left = air_count;
        let mut aa_hits = 0;
        for &(strength, shots) in &def.anti_air {
            let shots = shots.min(shots_left);
            shots_left -= shots;
            aa_hits += roll_group(&[(strength, shots)], rules, rng);
        }
        attacker_loss += apply_hits(&mut att, aa_hits, |f| f.air);
    }
    if !att.bombard.is_empty() {
        let strengths: Vec<(u32, u32)> = att.bombard.iter().map(|s| (*s, 1)).collect();
        let hits = roll_group(&strengths, rules, rng);
        defender_loss += take_hits(
            &mut def,
            Hits {
                general: hits,
                ..Default::default()
            },
            true,
        );
    }

    while rounds < rules.max_rounds && att.any_alive() && def.any_alive() {
        rounds += 1;

        // Subs strike first when the enemy has no destroyer
        let att_first = !def.has_destroyer;
        let def_first = !att.has_destroyer;
        let att_sub_hits = if att_first {
            fire(&att, |f| f.sub, rules, rng)
        } else {
            Hits::default()
        };
        let def_sub_hits = if def_first {
            fire(&def, |f| f.sub, rules, rng)
        } else {
            Hits::default()
        };
        defender_loss += take_hits(&mut def, att_sub_hits, att.has_destroyer);
        attacker_loss += take_hits(&mut att, def_sub_hits, def.has_destroyer);

        let att_hits = fire(&att, |f| !(f.sub && att_first), rules, rng);
        let def_hits = fire(&def, |f| !(f.sub && def_first), rules, rng);
        defender_loss += take_hits(&mut def, att_hits, att.has_destroyer);
        attacker_loss += take_hits(&mut att, def_hits, def.has_destroyer);

        let att_power: u32 = att.alive().map(|f| f.strength * f.rolls).sum();
        let def_power: u32 = def.alive().map(|f| f.strength * f.rolls).sum();
        if att_power == 0 && def_power == 0 {
            break;
        }
    }

    let attackers_left: Vec<UnitId> = att.alive().map(|f| f.unit).collect();
    let defenders_left: Vec<UnitId> = def.alive().map(|f| f.unit).collect();
    SimOutcome {
        attacker_won: defenders_left.is_empty() && !attackers_left.is_empty(),
        rounds,
        attackers_left,
        defenders_left,
        attacker_loss,
        defender_loss,
    }
}
