//! The line protocol session behind the binary.
//!
//! Holds the engine, the loaded scenario, the acting player, and the last
//! purchase plan between commands. Answers go to `out` one line each;
//! problems are logged and never written to `out`, so the host only ever
//! reads protocol lines.

use std::io::{self, BufRead, Write};

use serde::Serialize;
use tracing::{info, warn};

use crate::board::{GameState, PlayerId};
use crate::context::EngineConfig;
use crate::decisions::{BattleContext, CasualtyRequest};
use crate::engine::ProAiEngine;
use crate::error::EngineError;
use crate::purchase::PurchasePlan;

use super::parser::{parse_command, Command, GoPhase};
use super::scenario::load_scenario;

/// Options announced in the handshake, with their types.
const OPTIONS: &[(&str, &str)] = &[
    ("WinPercentage", "string"),
    ("MinWinPercentage", "string"),
    ("TimeBudget", "spin"),
    ("Threads", "spin"),
    ("Seed", "spin"),
    ("SimulationRuns", "spin"),
    ("MaxBattleRounds", "spin"),
    ("RandomizeTies", "check"),
    ("AttackNeutrals", "check"),
    ("PurchaseFactories", "check"),
    ("AllowAmphibious", "check"),
    ("RetreatWinPercentage", "string"),
];

/// State carried between protocol commands.
pub struct Session {
    engine: ProAiEngine,
    state: Option<GameState>,
    player: Option<PlayerId>,
    last_purchase: Option<PurchasePlan>,
}

impl Session {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Ok(Session {
            engine: ProAiEngine::new(config)?,
            state: None,
            player: None,
            last_purchase: None,
        })
    }

    pub fn engine(&self) -> &ProAiEngine {
        &self.engine
    }

    /// Reads commands until `quit` or end of input.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> io::Result<()> {
        for line in input.lines() {
            let Some(cmd) = parse_command(&line?) else {
                continue;
            };
            if !self.handle(cmd, out)? {
                break;
            }
            out.flush()?;
        }
        out.flush()
    }

    /// Executes one command. Returns `false` once the session should end.
    pub fn handle<W: Write>(&mut self, cmd: Command, out: &mut W) -> io::Result<bool> {
        match cmd {
            Command::Proai => self.handshake(out)?,
            Command::IsReady => writeln!(out, "readyok")?,
            Command::SetOption { name, value } => self.set_option(&name, value.as_deref()),
            Command::Config { json } => self.load_config(&json),
            Command::Scenario { json } => match load_scenario(&json) {
                Ok(state) => {
                    info!(
                        territories = state.territories.len(),
                        units = state.units.len(),
                        "scenario loaded",
                    );
                    self.state = Some(state);
                    self.last_purchase = None;
                }
                Err(e) => warn!(error = %e, "scenario rejected"),
            },
            Command::Player { name } => {
                match self.state.as_ref().and_then(|s| s.player_by_name(&name)) {
                    Some(p) => self.player = Some(p),
                    None => warn!(player = %name, "unknown player"),
                }
            }
            Command::Go(phase) => self.go(phase, out)?,
            Command::Retreat { json } => self.retreat(&json, out)?,
            Command::Scramble { json } => self.scramble(&json, out)?,
            Command::Casualties { json } => self.casualties(&json, out)?,
            Command::Stop => self.engine.cancel_token().cancel(),
            Command::NewGame => {
                self.engine.new_game();
                self.state = None;
                self.player = None;
                self.last_purchase = None;
            }
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn handshake<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "id name proai")?;
        writeln!(out, "id author proai")?;
        let config = serde_json::to_value(self.engine.config()).unwrap_or_default();
        for (name, kind) in OPTIONS {
            let key = option_key(name);
            let default = config.get(&key).map(|v| v.to_string()).unwrap_or_default();
            writeln!(out, "option name {name} type {kind} default {default}")?;
        }
        writeln!(out, "proaiok")
    }

    fn set_option(&mut self, name: &str, value: Option<&str>) {
        let mut config = self.engine.config().clone();
        if !config.set_option(name, value.unwrap_or("true")) {
            warn!(option = name, value = ?value, "option not applied");
            return;
        }
        if let Err(e) = self.engine.set_config(config) {
            warn!(error = %e, "option not applied");
        }
    }

    fn load_config(&mut self, json: &str) {
        match serde_json::from_str::<EngineConfig>(json) {
            Ok(config) => {
                if let Err(e) = self.engine.set_config(config) {
                    warn!(error = %e, "config not applied");
                }
            }
            Err(e) => warn!(error = %e, "malformed config"),
        }
    }

    fn go<W: Write>(&mut self, phase: GoPhase, out: &mut W) -> io::Result<()> {
        let Some((state, player)) = ready(&self.state, self.player) else {
            return Ok(());
        };
        self.engine.cancel_token().reset();
        let engine = &self.engine;
        match phase {
            GoPhase::Combat => {
                if let Some(plan) = report(engine.plan_combat_move(state, player)) {
                    answer(out, "orders", &plan)?;
                }
            }
            GoPhase::NonCombat => {
                if let Some(plan) = report(engine.plan_non_combat_move(state, player)) {
                    answer(out, "orders", &plan)?;
                }
            }
            GoPhase::Purchase(budget) => {
                let budget = budget.unwrap_or_else(|| state.player(player).resources);
                if let Some(plan) = report(engine.plan_purchase(state, player, budget)) {
                    answer(out, "purchase", &plan)?;
                    self.last_purchase = Some(plan);
                }
            }
            GoPhase::Place => {
                let Some(plan) = &self.last_purchase else {
                    warn!("nothing purchased to place");
                    return Ok(());
                };
                if let Some(placements) = report(engine.plan_placement(state, player, plan)) {
                    answer(out, "placement", &placements)?;
                }
            }
        }
        Ok(())
    }

    fn retreat<W: Write>(&self, json: &str, out: &mut W) -> io::Result<()> {
        #[derive(serde::Deserialize)]
        struct Query {
            battle: BattleContext,
            candidates: Vec<crate::board::TerritoryId>,
        }
        let Some((state, player)) = ready(&self.state, self.player) else {
            return Ok(());
        };
        let Some(query) = decode::<Query>(json) else {
            return Ok(());
        };
        let decision =
            self.engine.decide_retreat(state, player, &query.battle, &query.candidates);
        if let Some(target) = report(decision) {
            answer(out, "retreat", &target)?;
        }
        Ok(())
    }

    fn scramble<W: Write>(&self, json: &str, out: &mut W) -> io::Result<()> {
        let Some((state, player)) = ready(&self.state, self.player) else {
            return Ok(());
        };
        let Some(battle) = decode::<BattleContext>(json) else {
            return Ok(());
        };
        if let Some(scramble) = report(self.engine.decide_scramble(state, player, &battle)) {
            answer(out, "scramble", &scramble)?;
        }
        Ok(())
    }

    fn casualties<W: Write>(&self, json: &str, out: &mut W) -> io::Result<()> {
        let Some((state, player)) = ready(&self.state, self.player) else {
            return Ok(());
        };
        let Some(request) = decode::<CasualtyRequest>(json) else {
            return Ok(());
        };
        if let Some(selection) = report(self.engine.select_casualties(state, player, &request)) {
            answer(out, "casualties", &selection)?;
        }
        Ok(())
    }
}

fn ready(state: &Option<GameState>, player: Option<PlayerId>) -> Option<(&GameState, PlayerId)> {
    match (state, player) {
        (Some(state), Some(player)) => Some((state, player)),
        (None, _) => {
            warn!("no scenario loaded");
            None
        }
        (_, None) => {
            warn!("no player selected");
            None
        }
    }
}

/// JSON key of a protocol option name: `WinPercentage` -> `win_percentage`.
fn option_key(name: &str) -> String {
    let key = match name {
        "TimeBudget" => "TimeBudgetMs",
        other => other,
    };
    let mut out = String::new();
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn decode<T: serde::de::DeserializeOwned>(json: &str) -> Option<T> {
    match serde_json::from_str(json) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, "malformed request");
            None
        }
    }
}

fn report<T>(result: Result<T, EngineError>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, "planning failed");
            None
        }
    }
}

fn answer<W: Write, T: Serialize>(out: &mut W, keyword: &str, value: &T) -> io::Result<()> {
    let json = serde_json::to_string(value).map_err(io::Error::other)?;
    writeln!(out, "{keyword} {json}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::StateBuilder;
    use crate::protocol::scenario::save_scenario;

    fn session() -> Session {
        Session::new(EngineConfig {
            seed: 1,
            threads: 1,
            ..Default::default()
        })
        .unwrap()
    }

    fn scenario_json() -> String {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let inf = b.infantry();
        let fac = b.factory();
        b.sell(red, inf);
        b.resources(red, 9);
        let home = b.land("Home", 3, Some(red));
        let away = b.land("Away", 2, Some(blue));
        b.connect(home, away);
        b.add_unit(red, fac, home);
        b.add_units(red, inf, home, 2);
        b.add_units(blue, inf, away, 1);
        save_scenario(&b.build()).unwrap()
    }

    fn run(s: &mut Session, lines: &[String]) -> String {
        let mut out = Vec::new();
        s.run(lines.join("\n").as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn handshake_lists_options() {
        let out = run(&mut session(), &["proai".to_string()]);
        assert!(out.starts_with("id name proai"));
        assert!(out.contains("option name WinPercentage type string default 90.0"));
        assert!(out.contains("option name TimeBudget type spin default 5000"));
        assert!(out.trim_end().ends_with("proaiok"));
    }

    #[test]
    fn option_keys_follow_config_fields() {
        assert_eq!(option_key("WinPercentage"), "win_percentage");
        assert_eq!(option_key("TimeBudget"), "time_budget_ms");
        assert_eq!(option_key("Seed"), "seed");
    }

    #[test]
    fn go_without_scenario_writes_nothing() {
        let out = run(&mut session(), &["go combat".to_string()]);
        assert!(out.is_empty());
    }

    #[test]
    fn purchase_then_place() {
        let mut s = session();
        let out = run(
            &mut s,
            &[
                format!("scenario {}", scenario_json()),
                "player Red".to_string(),
                "go purchase".to_string(),
                "go place".to_string(),
            ],
        );
        let purchase = out.lines().find(|l| l.starts_with("purchase ")).unwrap();
        let payload = purchase.strip_prefix("purchase ").unwrap();
        let plan: PurchasePlan = serde_json::from_str(payload).unwrap();
        assert!(plan.spent <= 9);
        assert!(out.lines().any(|l| l.starts_with("placement ")));
    }

    #[test]
    fn quit_stops_reading() {
        let out = run(&mut session(), &["quit".to_string(), "isready".to_string()]);
        assert!(out.is_empty());
    }
}
