//! Property tests over generated skirmishes.
//!
//! Scenarios are a home territory with a factory facing one or two enemy
//! territories. Army sizes, budgets and seeds are drawn by proptest; the
//! planners must keep their accounting invariants on every draw.

use std::collections::BTreeSet;

use proptest::prelude::*;

use proai::battle::{estimate_attack_battle_results, strength_difference};
use proai::board::{GameState, PlayerId, StateBuilder, TerritoryId, UnitId};
use proai::decisions::{BattleContext, CasualtyRequest};
use proai::{EngineConfig, PlanningContext, ProAiEngine};

/// Parameters of one generated skirmish.
#[derive(Debug, Clone)]
struct Skirmish {
    infantry: usize,
    armour: usize,
    defenders: Vec<usize>,
    resources: u32,
    seed: u64,
}

fn arb_skirmish() -> impl Strategy<Value = Skirmish> {
    let defenders = proptest::collection::vec(0usize..5, 1..3);
    (0usize..6, 0usize..5, defenders, 0u32..40, 1u64..10_000).prop_map(
        |(infantry, armour, defenders, resources, seed)| Skirmish {
            infantry,
            armour,
            defenders,
            resources,
            seed,
        },
    )
}

fn build(s: &Skirmish) -> (GameState, Vec<TerritoryId>) {
    let mut b = StateBuilder::new();
    let red = b.player("Red", 0);
    let blue = b.player("Blue", 1);
    let inf = b.infantry();
    let arm = b.armour();
    let art = b.artillery();
    let fac = b.factory();
    for kind in [inf, arm, art] {
        b.sell(red, kind);
    }
    b.resources(red, s.resources);
    let home = b.land("Home", 4, Some(red));
    b.capital(home, red);
    b.add_unit(red, fac, home);
    b.add_units(red, inf, home, s.infantry);
    b.add_units(red, arm, home, s.armour);

    let mut targets = Vec::new();
    for (i, count) in s.defenders.iter().enumerate() {
        let t = b.land(&format!("Target{i}"), 2 + i as u32, Some(blue));
        b.connect(home, t);
        b.add_units(blue, inf, t, *count);
        targets.push(t);
    }
    (b.build(), targets)
}

fn engine(seed: u64) -> ProAiEngine {
    ProAiEngine::new(EngineConfig {
        seed,
        threads: 1,
        simulation_runs: 24,
        ..Default::default()
    })
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn purchases_never_exceed_the_budget(s in arb_skirmish()) {
        let (state, _) = build(&s);
        let plan = engine(s.seed).plan_purchase(&state, PlayerId(0), s.resources).unwrap();
        prop_assert!(plan.spent <= plan.budget);
        prop_assert_eq!(plan.budget, s.resources);
        prop_assert_eq!(plan.purchases.iter().map(|p| p.cost).sum::<u32>(), plan.spent);

        let placed: usize = plan.placements.iter().map(|p| p.units.len()).sum();
        prop_assert!(placed as u32 <= plan.unit_count());
    }

    #[test]
    fn attacks_only_use_own_units_once(s in arb_skirmish()) {
        let (state, targets) = build(&s);
        let plan = engine(s.seed).plan_combat_move(&state, PlayerId(0)).unwrap();
        let mut used = BTreeSet::new();
        for attack in &plan.attacks {
            prop_assert!(targets.contains(&attack.territory));
            prop_assert!((0.0..=100.0).contains(&attack.win_percentage));
            for u in &attack.units {
                prop_assert!(used.insert(*u));
                prop_assert_eq!(state.unit(*u).owner, PlayerId(0));
            }
        }
        let ordered: BTreeSet<UnitId> =
            plan.orders.iter().flat_map(|o| o.units.iter().copied()).collect();
        prop_assert!(used.is_subset(&ordered));
    }

    #[test]
    fn estimates_are_percentages(s in arb_skirmish()) {
        let (state, targets) = build(&s);
        let ctx = PlanningContext::new(
            &state,
            PlayerId(0),
            EngineConfig { seed: s.seed, simulation_runs: 24, ..Default::default() },
        );
        let attackers = state.owned_units(TerritoryId(0), PlayerId(0))
            .into_iter()
            .filter(|u| state.type_of(*u).is_combatant())
            .collect::<Vec<_>>();
        for t in targets {
            let defenders = state.defending_units(t, PlayerId(0));
            let result = estimate_attack_battle_results(&ctx, t, &attackers, &defenders, &[]);
            prop_assert!((0.0..=100.0).contains(&result.win_percentage));
            prop_assert!(result.average_attackers_remaining.iter().all(|u| attackers.contains(u)));
        }
    }

    #[test]
    fn an_extra_armour_never_weakens_the_attack(s in arb_skirmish()) {
        let bigger = Skirmish { armour: s.armour + 1, ..s.clone() };
        let (state, targets) = build(&bigger);
        let with = state.owned_units(TerritoryId(0), PlayerId(0))
            .into_iter()
            .filter(|u| state.type_of(*u).is_combatant())
            .collect::<Vec<_>>();
        let extra = *with.iter().max().unwrap();
        let without = with.iter().copied().filter(|u| *u != extra).collect::<Vec<_>>();
        prop_assume!(!without.is_empty());

        let ctx = PlanningContext::new(
            &state,
            PlayerId(0),
            EngineConfig { seed: s.seed, simulation_runs: 300, ..Default::default() },
        );
        for t in targets {
            let defenders = state.defending_units(t, PlayerId(0));
            let stronger = strength_difference(&state, t, &with, &defenders);
            prop_assert!(stronger >= strength_difference(&state, t, &without, &defenders));

            // Sampled estimates only agree up to noise
            let stronger = estimate_attack_battle_results(&ctx, t, &with, &defenders, &[]);
            let weaker = estimate_attack_battle_results(&ctx, t, &without, &defenders, &[]);
            prop_assert!(stronger.win_percentage + 15.0 >= weaker.win_percentage,
                "{} with the armour, {} without", stronger.win_percentage, weaker.win_percentage);
        }
    }

    #[test]
    fn casualty_count_matches_hits(s in arb_skirmish(), hits in 0usize..4) {
        let (state, targets) = build(&s);
        let home = TerritoryId(0);
        let mine = state.owned_units(home, PlayerId(0))
            .into_iter()
            .filter(|u| state.type_of(*u).is_combatant())
            .collect::<Vec<_>>();
        prop_assume!(hits <= mine.len());
        let attackers = state.defending_units(targets[0], PlayerId(0));
        let request = CasualtyRequest {
            battle: BattleContext {
                territory: home,
                attacker: PlayerId(1),
                attackers,
                defenders: mine.clone(),
                amphibious: false,
                strafing: false,
            },
            select_from: mine.clone(),
            default_killed: mine[..hits].to_vec(),
            default_damaged: Vec::new(),
            hits,
        };
        let selection = engine(s.seed).select_casualties(&state, PlayerId(0), &request).unwrap();
        prop_assert_eq!(selection.len(), hits);
        prop_assert!(selection.killed.iter().all(|u| mine.contains(u)));
    }
}
