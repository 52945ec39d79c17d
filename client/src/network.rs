use crate::game::ClientGameState;
use crate::input::{parse_command, Command, HELP};
use crate::rendering::{render_board, render_message};
use log::{debug, error, info, warn};
use shared::protocol::{decode_server, encode, MAX_DATAGRAM_SIZE};
use shared::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::interval;

/// Keeps the server's connection timeout from firing while idle.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    connected: bool,
    game_state: ClientGameState,
}

impl Client {
    pub async fn new(server_addr: &str, player_id: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            connected: false,
            game_state: ClientGameState::new(player_id),
        })
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to {} as {}", self.server_addr, self.game_state.player_id);
        let hello = ClientMessage::Hello {
            client_version: PROTOCOL_VERSION,
            player_id: self.game_state.player_id.clone(),
        };
        self.send_message(&hello).await
    }

    async fn send_message(&self, message: &ClientMessage) -> Result<(), Box<dyn std::error::Error>> {
        debug!("-> {}", message.kind());
        let data = encode(message)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match &message {
            ServerMessage::Welcome { .. } => self.connected = true,
            ServerMessage::Disconnected { reason } => {
                warn!("Server dropped us: {}", reason);
                self.connected = false;
            }
            _ => {}
        }
        self.game_state.apply_server_message(&message);
        println!("{}", render_message(&message));
        if self.game_state.is_my_turn() && matches!(message, ServerMessage::TurnStart { .. }) {
            println!("(your turn)");
        }
    }

    /// Runs one typed line. Returns false when the user quits.
    async fn handle_line(&mut self, line: &str) -> Result<bool, Box<dyn std::error::Error>> {
        let command = match parse_command(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(true),
            Err(e) => {
                println!("{}", e);
                return Ok(true);
            }
        };

        match command {
            Command::Send(message) => self.send_message(&message).await?,
            Command::Sync { code } => {
                let local_state = self.game_state.local_state_for(&code);
                self.send_message(&ClientMessage::SyncRequest { code, local_state })
                    .await?;
            }
            Command::Show => match &self.game_state.game {
                Some(state) => println!("{}", render_board(state)),
                None => println!("no game in progress"),
            },
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut heartbeat = interval(HEARTBEAT_INTERVAL);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => match decode_server(&buffer[..len]) {
                            Ok(message) => self.handle_message(message),
                            Err(e) => warn!("Undecodable datagram from server: {}", e),
                        },
                        Err(e) => error!("Error receiving datagram: {}", e),
                    }
                },

                line = lines.next_line() => {
                    match line? {
                        Some(line) => {
                            if !self.handle_line(&line).await? {
                                break;
                            }
                        }
                        None => break,
                    }
                },

                _ = heartbeat.tick() => {
                    if self.connected {
                        self.send_message(&ClientMessage::Heartbeat).await?;
                    }
                },
            }
        }

        if self.connected {
            let _ = self.send_message(&ClientMessage::Disconnect).await;
        }

        Ok(())
    }
}
