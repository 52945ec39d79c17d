//! Plain-text rendering of notifications and the board

use shared::{AttackReport, GameState, ServerMessage, SessionSnapshot};
use std::fmt::Write;

pub fn render_session(session: &SessionSnapshot) -> String {
    let mut out = format!(
        "session {} [{}] host {} ({}/{} players)",
        session.code,
        session.lifecycle.as_str(),
        session.host_id,
        session.players.len(),
        session.max_players
    );
    for player in &session.players {
        let _ = write!(
            out,
            "\n  {:<12} {:<7} {}{}{}",
            player.id,
            player.color,
            if player.ready { "ready " } else { "" },
            if player.connected { "" } else { "offline " },
            if player.eliminated { "eliminated" } else { "" },
        );
    }
    out
}

/// Board grouped by owner, with the turn header first.
pub fn render_board(state: &GameState) -> String {
    let current = state.current_player().map(String::as_str).unwrap_or("-");
    let mut out = format!(
        "turn {} | phase {} | current {} | v{}",
        state.turn_number,
        state.phase.as_str(),
        current,
        state.version
    );
    if let Some(winner) = &state.winner {
        let _ = write!(out, " | winner {}", winner);
    }
    if let Some(pending) = &state.pending_conquest {
        let _ = write!(
            out,
            "\n  move {}-{} armies from {} into {}",
            pending.min_transfer, pending.max_transfer, pending.from, pending.to
        );
    }

    for player in &state.active_players {
        let _ = write!(
            out,
            "\n{} ({} territories, {} to deploy)",
            player,
            state.territory_count(player),
            state.remaining_to_deploy(player)
        );
        for territory in state.territories_owned_by(player) {
            let _ = write!(out, "\n  {:<24} {:>3}", territory.id, territory.armies);
        }
    }
    out
}

fn render_attack(report: &AttackReport) -> String {
    format!(
        "{} {:?} vs {} {:?}: attacker -{}, defender -{}{}",
        report.attacker,
        report.attacker_dice,
        report.defender,
        report.defender_dice,
        report.attacker_losses,
        report.defender_losses,
        if report.conquered { " (conquered)" } else { "" }
    )
}

/// One line (or block) describing a notification for the terminal.
pub fn render_message(message: &ServerMessage) -> String {
    match message {
        ServerMessage::Welcome {
            player_id,
            session_code,
        } => match session_code {
            Some(code) => format!("welcome back {}, resuming session {}", player_id, code),
            None => format!("welcome {}", player_id),
        },
        ServerMessage::Disconnected { reason } => format!("disconnected: {}", reason),
        ServerMessage::SessionUpdate { session } => render_session(session),
        ServerMessage::PlayersUpdate { code, roster } => {
            format!("{}: {} player(s) in roster", code, roster.len())
        }
        ServerMessage::SessionClosed { code } => format!("left session {}", code),
        ServerMessage::GameStateUpdate { state, .. } => render_board(state),
        ServerMessage::AttackResult { report, .. } => render_attack(report),
        ServerMessage::TurnStart {
            current_player_id,
            turn_number,
        } => format!("turn {}: {} to play", turn_number, current_player_id),
        ServerMessage::ValidationError { reason } => format!("rejected: {}", reason),
        ServerMessage::SessionError { reason } => format!("session error: {}", reason),
        ServerMessage::SyncResult { code, resolution } => {
            format!("{} synced ({})", code, resolution.as_str())
        }
        ServerMessage::SessionList { sessions } => {
            if sessions.is_empty() {
                return "no live sessions".to_string();
            }
            sessions
                .iter()
                .map(|s| {
                    format!(
                        "{}  {} player(s)  {}  turn {}",
                        s.code,
                        s.player_count,
                        s.lifecycle.as_str(),
                        s.turn_number
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}
