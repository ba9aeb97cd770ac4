//! Integration tests for the proai engine binary and library.
//!
//! The first half drives the line protocol by spawning the engine process,
//! sending commands via stdin, and checking stdout. The second half runs
//! whole planning passes through `ProAiEngine` on small scenarios.

use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::process::{Command, Stdio};

use proai::attack::{CombatPlan, MoveKind};
use proai::battle::estimate_attack_battle_results;
use proai::board::{GameState, PlayerId, StateBuilder, TerritoryId};
use proai::protocol::save_scenario;
use proai::purchase::PurchasePlan;
use proai::rules::{execute, ReferenceRules, RulesEngine};
use proai::{EngineConfig, PlanningContext, ProAiEngine};

/// Sends a sequence of commands to the engine and collects stdout lines.
fn run_engine(commands: &[&str]) -> Vec<String> {
    let exe = env!("CARGO_BIN_EXE_proai");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to start proai");

    let mut stdin = child.stdin.take().unwrap();
    let stdout = child.stdout.take().unwrap();
    let reader = std::io::BufReader::new(stdout);

    for cmd in commands {
        writeln!(stdin, "{}", cmd).unwrap();
    }
    stdin.flush().unwrap();
    drop(stdin);

    let lines: Vec<String> = reader.lines().map(|l| l.unwrap()).collect();
    let status = child.wait().expect("failed to wait on child");
    assert!(status.success());
    lines
}

/// Red holds a factory capital next to a lightly held Blue territory.
fn frontier() -> GameState {
    let mut b = StateBuilder::new();
    let red = b.player("Red", 0);
    let blue = b.player("Blue", 1);
    let inf = b.infantry();
    let arm = b.armour();
    let fac = b.factory();
    b.sell(red, inf);
    b.sell(red, arm);
    b.resources(red, 20);
    let home = b.land("Home", 4, Some(red));
    let border = b.land("Border", 2, Some(blue));
    let rear = b.land("Rear", 3, Some(blue));
    b.connect(home, border);
    b.connect(border, rear);
    b.capital(home, red);
    b.capital(rear, blue);
    b.add_unit(red, fac, home);
    b.add_units(red, arm, home, 4);
    b.add_units(red, inf, home, 3);
    b.add_units(blue, inf, border, 1);
    b.add_units(blue, inf, rear, 2);
    b.build()
}

fn payload<'a>(lines: &'a [String], keyword: &str) -> Option<&'a str> {
    lines
        .iter()
        .find_map(|l| l.strip_prefix(keyword).and_then(|rest| rest.strip_prefix(' ')))
}

#[test]
fn proai_handshake() {
    let lines = run_engine(&["proai", "quit"]);

    assert_eq!(lines.first().map(String::as_str), Some("id name proai"));
    assert!(lines.iter().any(|l| l.starts_with("id author ")));
    assert_eq!(lines.last().map(String::as_str), Some("proaiok"));

    let options: Vec<&String> = lines.iter().filter(|l| l.starts_with("option ")).collect();
    assert!(!options.is_empty(), "handshake should include option declarations");
    for opt in &options {
        assert!(opt.contains(" type "), "option line missing type: {}", opt);
        assert!(opt.contains(" default "), "option line missing default: {}", opt);
    }
}

#[test]
fn isready_response() {
    let lines = run_engine(&["isready", "quit"]);
    assert_eq!(lines, vec!["readyok".to_string()]);
}

#[test]
fn unknown_and_empty_lines_are_ignored() {
    let lines = run_engine(&["foobar", "", "  ", "go sideways", "isready", "quit"]);
    assert_eq!(lines, vec!["readyok".to_string()]);
}

#[test]
fn malformed_scenario_produces_no_output() {
    let lines = run_engine(&["scenario {not json", "player Red", "go combat", "isready", "quit"]);
    assert_eq!(lines, vec!["readyok".to_string()]);
}

#[test]
fn purchase_and_placement_over_protocol() {
    let scenario = format!("scenario {}", save_scenario(&frontier()).unwrap());
    let lines = run_engine(&[
        "setoption name Seed value 3",
        "setoption name Threads value 1",
        &scenario,
        "player Red",
        "go purchase",
        "go place",
        "quit",
    ]);

    let purchase = payload(&lines, "purchase").expect("no purchase line");
    let plan: PurchasePlan = serde_json::from_str(purchase).unwrap();
    assert_eq!(plan.budget, 20);
    assert!(plan.spent <= plan.budget);
    assert!(!plan.is_empty());
    assert!(payload(&lines, "placement").is_some());
}

#[test]
fn combat_orders_over_protocol() {
    let scenario = format!("scenario {}", save_scenario(&frontier()).unwrap());
    let lines = run_engine(&[
        "setoption name Seed value 3",
        &scenario,
        "player Red",
        "go combat",
        "quit",
    ]);

    let orders = payload(&lines, "orders").expect("no orders line");
    let plan: CombatPlan = serde_json::from_str(orders).unwrap();
    assert!(plan.attacks.iter().any(|a| a.territory == TerritoryId(1)));
    assert!(!plan.orders.is_empty());
}

#[test]
fn newgame_forgets_the_scenario() {
    let scenario = format!("scenario {}", save_scenario(&frontier()).unwrap());
    let lines = run_engine(&[&scenario, "player Red", "newgame", "go purchase", "quit"]);
    assert!(lines.is_empty());
}

fn engine(seed: u64) -> ProAiEngine {
    ProAiEngine::new(EngineConfig {
        seed,
        threads: 2,
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn seeded_plans_are_reproducible() {
    let state = frontier();
    let a = engine(21).plan_combat_move(&state, PlayerId(0)).unwrap();
    let b = engine(21).plan_combat_move(&state, PlayerId(0)).unwrap();
    assert_eq!(a, b);

    let pa = engine(21).plan_purchase(&state, PlayerId(0), 20).unwrap();
    let pb = engine(21).plan_purchase(&state, PlayerId(0), 20).unwrap();
    assert_eq!(pa, pb);
}

#[test]
fn attacks_use_each_unit_once_and_meet_the_threshold() {
    let state = frontier();
    let plan = engine(4).plan_combat_move(&state, PlayerId(0)).unwrap();
    let mut seen = BTreeSet::new();
    for attack in &plan.attacks {
        let floor = EngineConfig::default().min_win_percentage;
        assert!(attack.win_percentage >= floor || attack.strafing);
        for u in &attack.units {
            assert!(seen.insert(*u), "unit {:?} assigned twice", u);
            assert_eq!(state.unit(*u).owner, PlayerId(0));
        }
    }
}

#[test]
fn empty_garrison_is_a_certain_win() {
    let mut b = StateBuilder::new();
    let red = b.player("Red", 0);
    let blue = b.player("Blue", 1);
    let inf = b.infantry();
    let home = b.land("Home", 2, Some(red));
    let empty = b.land("Empty", 1, Some(blue));
    b.connect(home, empty);
    let attackers = b.add_units(red, inf, home, 1);
    let state = b.build();

    let ctx = PlanningContext::new(&state, red, EngineConfig::default());
    let result = estimate_attack_battle_results(&ctx, empty, &attackers, &[], &[]);
    assert_eq!(result.win_percentage, 100.0);
    assert_eq!(result.tuv_swing, 0.0);
    assert!(result.has_land_unit_remaining);
}

#[test]
fn overwhelming_force_skips_simulation() {
    let mut b = StateBuilder::new();
    let red = b.player("Red", 0);
    let blue = b.player("Blue", 1);
    let inf = b.infantry();
    let arm = b.armour();
    let home = b.land("Home", 2, Some(red));
    let target = b.land("Target", 1, Some(blue));
    b.connect(home, target);
    let attackers = b.add_units(red, arm, home, 12);
    let defenders = b.add_units(blue, inf, target, 1);
    let state = b.build();

    let ctx = PlanningContext::new(&state, red, EngineConfig { seed: 1, ..Default::default() });
    let result = estimate_attack_battle_results(&ctx, target, &attackers, &defenders, &[]);
    assert_eq!(result.simulated_runs, 0);
    assert!(result.win_percentage >= 99.0);
    assert!(result.tuv_swing > 0.0);
}

#[test]
fn contested_targets_still_yield_a_plan() {
    // One armoured stack, two targets it can only win one at a time
    let mut b = StateBuilder::new();
    let red = b.player("Red", 0);
    let blue = b.player("Blue", 1);
    let inf = b.infantry();
    let arm = b.armour();
    let home = b.land("Home", 3, Some(red));
    let first = b.land("First", 6, Some(blue));
    let second = b.land("Second", 2, Some(blue));
    b.connect(home, first);
    b.connect(home, second);
    b.add_units(red, arm, home, 5);
    b.add_units(blue, inf, first, 2);
    b.add_units(blue, inf, second, 2);
    let state = b.build();

    let plan = engine(8).plan_combat_move(&state, red).unwrap();
    assert!(!plan.attacks.is_empty());
    assert!(plan.attacks.iter().all(|a| a.territory == first || a.territory == second));
    assert!(!plan.orders.is_empty());
}

#[test]
fn budget_below_cheapest_option_is_not_an_error() {
    let state = frontier();
    let plan = engine(2).plan_purchase(&state, PlayerId(0), 1).unwrap();
    assert!(plan.is_empty());
    assert_eq!(plan.spent, 0);
    assert!(engine(2).plan_placement(&state, PlayerId(0), &plan).unwrap().is_empty());
}

#[test]
fn non_combat_moves_stay_on_friendly_ground() {
    let state = frontier();
    let plan = engine(6).plan_non_combat_move(&state, PlayerId(0)).unwrap();
    for order in &plan.orders {
        let end = order.route.end();
        assert!(
            !state.is_enemy_territory(end, PlayerId(0)),
            "non-combat move into enemy {:?}",
            end
        );
    }
}

#[test]
fn reference_rules_accept_the_planned_turn() {
    let state = frontier();
    let red = PlayerId(0);
    let engine = engine(5);
    let mut rules = ReferenceRules::new(state.clone());

    let combat = engine.plan_combat_move(&state, red).unwrap();
    for order in &combat.orders {
        execute(&mut rules, order).unwrap();
        for u in &order.units {
            assert_eq!(rules.current_game_state().location(*u), Some(order.route.end()));
        }
    }

    let purchase = engine.plan_purchase(&state, red, 20).unwrap();
    rules.apply_purchase(red, &purchase.purchases).unwrap();
    assert_eq!(rules.current_game_state().player(red).resources, 20 - purchase.spent);

    let placements = engine.plan_placement(&state, red, &purchase).unwrap();
    for p in &placements {
        rules.apply_placement(red, &p.units, p.territory).unwrap();
    }
    let placed: usize = placements.iter().map(|p| p.units.len()).sum();
    assert_eq!(rules.unplaced(red).len() + placed, purchase.unit_count() as usize);
}

#[test]
fn planned_amphibious_assault_is_executable() {
    // Home(6 armour) - Sea(3 transports) - Island(1 blue infantry)
    let mut b = StateBuilder::new();
    let red = b.player("Red", 0);
    let blue = b.player("Blue", 1);
    let inf = b.infantry();
    let arm = b.armour();
    let tr = b.transport();
    let home = b.land("Home", 3, Some(red));
    let sea = b.water("Sea");
    let island = b.land("Island", 2, Some(blue));
    b.connect(home, sea);
    b.connect(sea, island);
    b.capital(home, red);
    b.add_units(red, arm, home, 6);
    b.add_units(red, tr, sea, 3);
    b.add_units(blue, inf, island, 1);
    let state = b.build();

    let plan = engine(9).plan_combat_move(&state, red).unwrap();
    assert!(plan.attacks.iter().any(|a| a.territory == island));
    assert!(plan.orders.iter().any(|o| matches!(o.kind, MoveKind::Load { .. })));

    let mut rules = ReferenceRules::new(state);
    for order in &plan.orders {
        execute(&mut rules, order).unwrap();
    }
    let landed: Vec<_> = plan
        .orders
        .iter()
        .filter(|o| matches!(o.kind, MoveKind::Unload { .. }))
        .flat_map(|o| o.units.iter().copied())
        .collect();
    assert!(!landed.is_empty());
    let after = rules.current_game_state();
    for u in landed {
        assert_eq!(after.location(u), Some(island));
        assert_eq!(after.unit(u).transported_by, None);
    }
}
