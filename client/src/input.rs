//! Typed command parsing
//!
//! Every line the player types becomes either a [`ClientMessage`] or a
//! local command. Anything unrecognized is reported locally and never
//! reaches the server.

use shared::ClientMessage;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send(ClientMessage),
    /// `sync <code>`: the caller attaches its cached state before sending
    Sync { code: String },
    Show,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("unknown command '{0}' (type 'help')")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("'{0}' is not a number")]
    NotANumber(String),
}

pub const HELP: &str = "\
commands:
  create <name> <max-players>     host a new session
  join <code> <name>              join a session
  leave <code>                    leave a session
  ready <code> <on|off>           toggle readiness
  start <code> [seed]             start the game (host only)
  deploy <territory> <n>          place armies
  attack <from> <to> <n>          attack with n armies (1-3)
  move <n>                        armies to move after a conquest
  fortify <from> <to> <n>         move armies between your territories
  next                            advance to the next phase
  sync <code>                     ask for the authoritative state
  show                            print the board
  list                            list live sessions
  quit";

fn number<T: std::str::FromStr>(word: &str) -> Result<T, InputError> {
    word.parse()
        .map_err(|_| InputError::NotANumber(word.to_string()))
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, InputError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = words.split_first() else {
        return Ok(None);
    };

    let command = match (verb.to_ascii_lowercase().as_str(), args) {
        ("create", [name, max]) => Command::Send(ClientMessage::SessionCreate {
            host_name: name.to_string(),
            max_players: number(max)?,
        }),
        ("create", _) => return Err(InputError::Usage("create <name> <max-players>")),

        ("join", [code, name]) => Command::Send(ClientMessage::SessionJoin {
            code: code.to_string(),
            player_name: name.to_string(),
        }),
        ("join", _) => return Err(InputError::Usage("join <code> <name>")),

        ("leave", [code]) => Command::Send(ClientMessage::SessionLeave {
            code: code.to_string(),
        }),
        ("leave", _) => return Err(InputError::Usage("leave <code>")),

        ("ready", [code, flag]) => {
            let ready = match flag.to_ascii_lowercase().as_str() {
                "on" | "yes" | "true" => true,
                "off" | "no" | "false" => false,
                _ => return Err(InputError::Usage("ready <code> <on|off>")),
            };
            Command::Send(ClientMessage::PlayerReady {
                code: code.to_string(),
                ready,
            })
        }
        ("ready", _) => return Err(InputError::Usage("ready <code> <on|off>")),

        ("start", [code]) => Command::Send(ClientMessage::SessionStart {
            code: code.to_string(),
            seed: None,
        }),
        ("start", [code, seed]) => Command::Send(ClientMessage::SessionStart {
            code: code.to_string(),
            seed: Some(number(seed)?),
        }),
        ("start", _) => return Err(InputError::Usage("start <code> [seed]")),

        ("deploy", [territory, count]) => Command::Send(ClientMessage::Deploy {
            territory: territory.to_string(),
            count: number(count)?,
        }),
        ("deploy", _) => return Err(InputError::Usage("deploy <territory> <n>")),

        ("attack", [from, to, count]) => Command::Send(ClientMessage::Attack {
            attacker: from.to_string(),
            defender: to.to_string(),
            committed_armies: number(count)?,
        }),
        ("attack", _) => return Err(InputError::Usage("attack <from> <to> <n>")),

        ("move", [count]) => Command::Send(ClientMessage::CompleteConquest {
            transfer_count: number(count)?,
        }),
        ("move", _) => return Err(InputError::Usage("move <n>")),

        ("fortify", [from, to, count]) => Command::Send(ClientMessage::Fortify {
            source: from.to_string(),
            target: to.to_string(),
            count: number(count)?,
        }),
        ("fortify", _) => return Err(InputError::Usage("fortify <from> <to> <n>")),

        ("next", []) => Command::Send(ClientMessage::AdvancePhase),
        ("sync", [code]) => Command::Sync {
            code: code.to_string(),
        },
        ("sync", _) => return Err(InputError::Usage("sync <code>")),
        ("list", []) => Command::Send(ClientMessage::ListSessions),
        ("show", []) => Command::Show,
        ("help", _) => Command::Help,
        ("quit", _) | ("exit", _) => Command::Quit,
        _ => return Err(InputError::Unknown(verb.to_string())),
    };
    Ok(Some(command))
}
