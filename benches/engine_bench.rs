use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::BTreeSet;
use std::time::Duration;

use proai::battle::{calculate_battle_results, estimate_attack_battle_results, strength_difference};
use proai::board::{GameState, PlayerId, StateBuilder, TerritoryId, UnitId};
use proai::eval::find_territory_values;
use proai::{EngineConfig, PlanningContext, ProAiEngine};

/// A ring of eight land territories around an inner sea, Red and Blue
/// holding opposite halves with mixed armies and a factory each.
fn theatre() -> GameState {
    let mut b = StateBuilder::new();
    let red = b.player("Red", 0);
    let blue = b.player("Blue", 1);
    let inf = b.infantry();
    let art = b.artillery();
    let arm = b.armour();
    let ftr = b.fighter();
    let dd = b.destroyer();
    let tr = b.transport();
    let fac = b.factory();
    for p in [red, blue] {
        for kind in [inf, art, arm, ftr, dd, tr] {
            b.sell(p, kind);
        }
        b.resources(p, 40);
    }

    let sea = b.water("Inner Sea");
    let mut ring = Vec::new();
    for i in 0..8 {
        let owner = if i < 4 { red } else { blue };
        let t = b.land(&format!("Region{i}"), 1 + (i % 3) as u32, Some(owner));
        b.connect(t, sea);
        ring.push(t);
    }
    for i in 0..8 {
        b.connect(ring[i], ring[(i + 1) % 8]);
    }
    b.capital(ring[0], red);
    b.capital(ring[6], blue);
    b.add_unit(red, fac, ring[0]);
    b.add_unit(blue, fac, ring[6]);

    for (i, t) in ring.iter().enumerate() {
        let owner = if i < 4 { red } else { blue };
        b.add_units(owner, inf, *t, 3);
        b.add_units(owner, art, *t, 1 + i % 2);
        b.add_units(owner, arm, *t, i % 3);
    }
    b.add_units(red, ftr, ring[1], 2);
    b.add_units(blue, ftr, ring[5], 2);
    b.add_units(red, dd, sea, 1);
    b.add_units(red, tr, sea, 1);
    b.build()
}

fn config() -> EngineConfig {
    EngineConfig {
        seed: 17,
        ..Default::default()
    }
}

fn front(state: &GameState) -> (TerritoryId, Vec<UnitId>, Vec<UnitId>) {
    let attackers = [TerritoryId(3), TerritoryId(2)]
        .iter()
        .flat_map(|t| state.owned_units(*t, PlayerId(0)))
        .filter(|u| state.type_of(*u).is_land())
        .collect();
    let target = TerritoryId(4);
    (target, attackers, state.defending_units(target, PlayerId(0)))
}

fn bench_strength_difference(c: &mut Criterion) {
    let state = theatre();
    let (t, att, def) = front(&state);
    c.bench_function("strength_difference", |b| {
        b.iter(|| strength_difference(black_box(&state), t, black_box(&att), black_box(&def)))
    });
}

fn bench_battle_estimate(c: &mut Criterion) {
    let state = theatre();
    let (t, att, def) = front(&state);
    let ctx = PlanningContext::new(&state, PlayerId(0), config());
    let mut group = c.benchmark_group("battle");
    group.bench_function("estimate_attack", |b| {
        b.iter(|| {
            let (att, def) = (black_box(&att), black_box(&def));
            estimate_attack_battle_results(black_box(&ctx), t, att, def, &[])
        })
    });
    group.bench_function("simulate_100_runs", |b| {
        let ctx = PlanningContext::new(
            &state,
            PlayerId(0),
            EngineConfig {
                simulation_runs: 100,
                ..config()
            },
        );
        b.iter(|| {
            calculate_battle_results(black_box(&ctx), t, black_box(&att), black_box(&def), &[])
        })
    });
    group.finish();
}

fn bench_territory_values(c: &mut Criterion) {
    let state = theatre();
    let ctx = PlanningContext::new(&state, PlayerId(0), config());
    let empty = BTreeSet::new();
    c.bench_function("territory_values", |b| {
        b.iter(|| find_territory_values(black_box(&ctx), &empty, &empty, state.territory_ids()))
    });
}

fn bench_plan_combat_move(c: &mut Criterion) {
    let state = theatre();
    let engine = ProAiEngine::new(config()).unwrap();
    let mut group = c.benchmark_group("plan");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));
    group.bench_function("combat_move", |b| {
        b.iter(|| engine.plan_combat_move(black_box(&state), PlayerId(0)))
    });
    group.bench_function("non_combat_move", |b| {
        b.iter(|| engine.plan_non_combat_move(black_box(&state), PlayerId(0)))
    });
    group.finish();
}

fn bench_plan_purchase(c: &mut Criterion) {
    let state = theatre();
    let engine = ProAiEngine::new(config()).unwrap();
    let mut group = c.benchmark_group("purchase");
    group.sample_size(10);
    group.bench_function("budget_40", |b| {
        b.iter(|| engine.plan_purchase(black_box(&state), PlayerId(0), 40))
    });
    group.finish();
}

fn bench_state_clone(c: &mut Criterion) {
    let state = theatre();
    c.bench_function("game_state_clone", |b| b.iter(|| black_box(&state).clone()));
}

criterion_group!(
    benches,
    bench_strength_difference,
    bench_battle_estimate,
    bench_territory_values,
    bench_plan_combat_move,
    bench_plan_purchase,
    bench_state_clone,
);
criterion_main!(benches);
