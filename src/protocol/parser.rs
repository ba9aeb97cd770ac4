//! Command parser.
//!
//! Parses incoming protocol lines into structured `Command` variants that
//! the session loop dispatches on. Payload commands (`config`, `scenario`,
//! and the battle decisions) carry the rest of the line as raw JSON.

use tracing::warn;

/// Which decision a `go` asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoPhase {
    Combat,
    NonCombat,
    /// Purchase with an optional budget override; the player's resources
    /// otherwise.
    Purchase(Option<u32>),
    /// Placement of the last purchase plan.
    Place,
}

/// A parsed host-to-engine command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Handshake; engine answers with id and option lines, then `proaiok`.
    Proai,

    /// Synchronization ping; engine must reply `readyok`.
    IsReady,

    /// Set an engine option: `setoption name <id> [value <x>]`.
    SetOption { name: String, value: Option<String> },

    /// Replace the whole configuration from a JSON object.
    Config { json: String },

    /// Load a game state snapshot from JSON.
    Scenario { json: String },

    /// Select the acting player by name.
    Player { name: String },

    /// Plan one phase for the acting player.
    Go(GoPhase),

    /// Retreat decision for a battle given as JSON.
    Retreat { json: String },

    /// Scramble decision for a battle given as JSON.
    Scramble { json: String },

    /// Casualty selection for a request given as JSON.
    Casualties { json: String },

    /// Cancel the pass in flight.
    Stop,

    /// Reset engine state for a new game.
    NewGame,

    /// Terminate the engine process.
    Quit,
}

/// Parses a single line of input into a `Command`.
///
/// Returns `None` for empty lines or unrecognized commands. Malformed
/// arguments for known commands also return `None` after a warning.
pub fn parse_command(line: &str) -> Option<Command> {
    let trimmed = line.trim();
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    let first = *tokens.first()?;

    match first {
        "proai" => Some(Command::Proai),
        "isready" => Some(Command::IsReady),
        "quit" => Some(Command::Quit),
        "newgame" => Some(Command::NewGame),
        "stop" => Some(Command::Stop),

        "setoption" => parse_setoption(&tokens),
        "player" => parse_player(&tokens),
        "go" => parse_go(&tokens),
        "config" => payload(trimmed, first).map(|json| Command::Config { json }),
        "scenario" => payload(trimmed, first).map(|json| Command::Scenario { json }),
        "retreat" => payload(trimmed, first).map(|json| Command::Retreat { json }),
        "scramble" => payload(trimmed, first).map(|json| Command::Scramble { json }),
        "casualties" => payload(trimmed, first).map(|json| Command::Casualties { json }),

        other => {
            warn!(command = other, "unknown command");
            None
        }
    }
}

/// Everything after the keyword, which must be non-empty.
fn payload(line: &str, keyword: &str) -> Option<String> {
    let rest = line.strip_prefix(keyword).unwrap_or("").trim();
    if rest.is_empty() {
        warn!(command = keyword, "missing json payload");
        return None;
    }
    Some(rest.to_string())
}

/// Parses `setoption name <id> [value <x>]`.
fn parse_setoption(tokens: &[&str]) -> Option<Command> {
    if tokens.len() < 3 || tokens[1] != "name" {
        warn!("malformed setoption: expected 'setoption name <id> [value <x>]'");
        return None;
    }

    let (name, value) = match tokens.iter().position(|&t| t == "value") {
        Some(vi) => {
            let name_parts = &tokens[2..vi];
            if name_parts.is_empty() {
                warn!("malformed setoption: empty name");
                return None;
            }
            let value_parts = &tokens[vi + 1..];
            let value = (!value_parts.is_empty()).then(|| value_parts.join(" "));
            (name_parts.join(" "), value)
        }
        None => (tokens[2..].join(" "), None),
    };

    Some(Command::SetOption { name, value })
}

/// Parses `player <name>`; names may contain spaces.
fn parse_player(tokens: &[&str]) -> Option<Command> {
    if tokens.len() < 2 {
        warn!("malformed player: expected 'player <name>'");
        return None;
    }
    Some(Command::Player {
        name: tokens[1..].join(" "),
    })
}

/// Parses `go combat|noncombat|purchase [<budget>]|place`.
fn parse_go(tokens: &[&str]) -> Option<Command> {
    let phase = match tokens.get(1).copied() {
        Some("combat") => GoPhase::Combat,
        Some("noncombat") => GoPhase::NonCombat,
        Some("place") => GoPhase::Place,
        Some("purchase") => match tokens.get(2) {
            None => GoPhase::Purchase(None),
            Some(v) => match v.parse::<u32>() {
                Ok(budget) => GoPhase::Purchase(Some(budget)),
                Err(_) => {
                    warn!(value = *v, "invalid purchase budget");
                    return None;
                }
            },
        },
        other => {
            warn!(phase = ?other, "unknown go phase");
            return None;
        }
    };
    Some(Command::Go(phase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_commands() {
        assert_eq!(parse_command("proai"), Some(Command::Proai));
        assert_eq!(parse_command("isready"), Some(Command::IsReady));
        assert_eq!(parse_command("quit"), Some(Command::Quit));
        assert_eq!(parse_command("newgame"), Some(Command::NewGame));
        assert_eq!(parse_command("stop"), Some(Command::Stop));
    }

    #[test]
    fn parse_empty_line_returns_none() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
        assert_eq!(parse_command("\t"), None);
    }

    #[test]
    fn parse_unknown_command_returns_none() {
        assert_eq!(parse_command("foobar"), None);
    }

    #[test]
    fn parse_setoption_with_value() {
        let cmd = parse_command("setoption name WinPercentage value 85").unwrap();
        assert_eq!(
            cmd,
            Command::SetOption {
                name: "WinPercentage".to_string(),
                value: Some("85".to_string()),
            }
        );
    }

    #[test]
    fn parse_setoption_no_value() {
        let cmd = parse_command("setoption name RandomizeTies").unwrap();
        assert_eq!(
            cmd,
            Command::SetOption {
                name: "RandomizeTies".to_string(),
                value: None,
            }
        );
    }

    #[test]
    fn parse_setoption_malformed_returns_none() {
        assert_eq!(parse_command("setoption"), None);
        assert_eq!(parse_command("setoption foo"), None);
        assert_eq!(parse_command("setoption name value 3"), None);
    }

    #[test]
    fn parse_payload_keeps_json_intact() {
        let cmd = parse_command(r#"scenario {"players": [], "units": [ ]}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Scenario {
                json: r#"{"players": [], "units": [ ]}"#.to_string(),
            }
        );
        assert_eq!(parse_command("config"), None);
    }

    #[test]
    fn parse_player_with_spaces() {
        assert_eq!(
            parse_command("player British Empire"),
            Some(Command::Player {
                name: "British Empire".to_string()
            })
        );
        assert_eq!(parse_command("player"), None);
    }

    #[test]
    fn parse_go_phases() {
        assert_eq!(parse_command("go combat"), Some(Command::Go(GoPhase::Combat)));
        assert_eq!(parse_command("go noncombat"), Some(Command::Go(GoPhase::NonCombat)));
        assert_eq!(parse_command("go place"), Some(Command::Go(GoPhase::Place)));
        assert_eq!(parse_command("go purchase"), Some(Command::Go(GoPhase::Purchase(None))));
        assert_eq!(
            parse_command("go purchase 42"),
            Some(Command::Go(GoPhase::Purchase(Some(42))))
        );
        assert_eq!(parse_command("go purchase lots"), None);
        assert_eq!(parse_command("go"), None);
        assert_eq!(parse_command("go dance"), None);
    }
}
