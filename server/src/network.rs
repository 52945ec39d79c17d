//! Server network layer: UDP transport around the dispatcher

use crate::client_manager::{BindResult, ClientManager};
use crate::config::ServerConfig;
use crate::dispatch::{Dispatcher, Outcome};
use crate::persistence::PersistOp;
use log::{debug, error, info, warn};
use shared::protocol::{decode_client, encode, MAX_DATAGRAM_SIZE};
use shared::{get_timestamp, ClientMessage, ServerMessage, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// How often stored sessions are checked for expiry.
const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerEvent {
    DatagramReceived {
        message: ClientMessage,
        addr: SocketAddr,
    },
    ClientTimeout {
        player_id: String,
    },
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum OutboundMessage {
    Send {
        message: ServerMessage,
        addr: SocketAddr,
    },
}

/// Main server coordinating transport, dispatch and housekeeping
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    dispatcher: Dispatcher,
    tick_duration: Duration,
    idle_turn_timeout: Option<Duration>,
    session_max_age: Duration,

    // Communication channels
    persist_tx: mpsc::UnboundedSender<PersistOp>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: Option<mpsc::UnboundedReceiver<OutboundMessage>>,
}

impl Server {
    pub async fn new(
        config: &ServerConfig,
        dispatcher: Dispatcher,
        persist_tx: mpsc::UnboundedSender<PersistOp>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(
                config.max_clients,
                config.client_timeout,
            ))),
            dispatcher,
            tick_duration: config.tick_duration,
            idle_turn_timeout: config.idle_turn_timeout,
            session_max_age: config.session_max_age,
            persist_tx,
            event_tx,
            event_rx,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sender that can stop the main loop with [`ServerEvent::Shutdown`]
    pub fn event_sender(&self) -> mpsc::UnboundedSender<ServerEvent> {
        self.event_tx.clone()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode_client(&buffer[..len]) {
                        Ok(message) => {
                            if event_tx
                                .send(ServerEvent::DatagramReceived { message, addr })
                                .is_err()
                            {
                                debug!("Main loop gone, receiver stopping");
                                break;
                            }
                        }
                        Err(e) => warn!("Undecodable datagram from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that drains the outgoing queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let Some(mut outbound_rx) = self.outbound_rx.take() else {
            return;
        };

        tokio::spawn(async move {
            while let Some(OutboundMessage::Send { message, addr }) = outbound_rx.recv().await {
                match encode(&message) {
                    Ok(bytes) => {
                        if let Err(e) = socket.send_to(&bytes, addr).await {
                            error!("Failed to send to {}: {}", addr, e);
                        }
                    }
                    Err(e) => error!("Failed to encode message for {}: {}", addr, e),
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for player_id in timed_out {
                    if event_tx.send(ServerEvent::ClientTimeout { player_id }).is_err() {
                        return;
                    }
                }
            }
        });
    }

    fn send(&self, message: ServerMessage, addr: SocketAddr) {
        if let Err(e) = self.outbound_tx.send(OutboundMessage::Send { message, addr }) {
            error!("Failed to queue message for sending: {}", e);
        }
    }

    /// Queues deliveries to their recipients' addresses and hands
    /// persistence work to the worker.
    async fn deliver(&self, outcome: Outcome) {
        {
            let clients = self.clients.read().await;
            for delivery in outcome.deliveries {
                match clients.addr_of(&delivery.recipient) {
                    Some(addr) => self.send(delivery.message, addr),
                    None => debug!("No connection for {}, dropping notification", delivery.recipient),
                }
            }
        }

        for op in outcome.persistence {
            if self.persist_tx.send(op).is_err() {
                error!("Persistence worker is gone; change not saved");
            }
        }
    }

    async fn handle_datagram(&mut self, message: ClientMessage, addr: SocketAddr) {
        let now = get_timestamp();

        if let ClientMessage::Hello {
            client_version,
            player_id,
        } = &message
        {
            if *client_version != PROTOCOL_VERSION {
                warn!(
                    "Rejecting {} from {}: protocol {} (server speaks {})",
                    player_id, addr, client_version, PROTOCOL_VERSION
                );
                let reason = format!("protocol version {} required", PROTOCOL_VERSION);
                self.send(ServerMessage::Disconnected { reason }, addr);
                return;
            }

            let (bound, displaced) = {
                let mut clients = self.clients.write().await;
                clients.bind(player_id, addr)
            };
            if let Some(other) = displaced {
                let outcome = self.dispatcher.disconnect(&other, now);
                self.deliver(outcome).await;
            }
            if bound == BindResult::Full {
                let reason = "Server full".to_string();
                self.send(ServerMessage::Disconnected { reason }, addr);
                return;
            }

            let player_id = player_id.clone();
            let outcome = self.dispatcher.handle(&player_id, Some(addr), message, now);
            self.deliver(outcome).await;
            return;
        }

        let player_id = {
            let mut clients = self.clients.write().await;
            clients.touch(addr)
        };
        let Some(player_id) = player_id else {
            debug!("{} from unknown address {}", message.kind(), addr);
            let reason = "send hello first".to_string();
            self.send(ServerMessage::Disconnected { reason }, addr);
            return;
        };

        let leaving = matches!(message, ClientMessage::Disconnect);
        let outcome = self.dispatcher.handle(&player_id, Some(addr), message, now);
        self.deliver(outcome).await;

        if leaving {
            let mut clients = self.clients.write().await;
            clients.remove(&player_id);
        }
    }

    async fn tick(&mut self) {
        let outcome = self.dispatcher.sweep(get_timestamp(), self.idle_turn_timeout);
        if !outcome.is_empty() {
            self.deliver(outcome).await;
        }
    }

    fn sweep_expired_sessions(&mut self) {
        let now = get_timestamp();
        let evicted = self.dispatcher.evict_expired(now, self.session_max_age);
        for op in evicted.persistence {
            if self.persist_tx.send(op).is_err() {
                error!("Persistence worker is gone; eviction not saved");
            }
        }

        let op = PersistOp::SweepExpired {
            now,
            max_age: self.session_max_age,
        };
        if self.persist_tx.send(op).is_err() {
            error!("Persistence worker is gone; expiry sweep skipped");
        }
    }

    /// Main server loop; returns after a [`ServerEvent::Shutdown`]
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut expiry_interval = interval(EXPIRY_SWEEP_INTERVAL);
        expiry_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Server started with {} restored session(s)",
            self.dispatcher.store().len()
        );

        loop {
            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Some(ServerEvent::DatagramReceived { message, addr }) => {
                            self.handle_datagram(message, addr).await;
                        }
                        Some(ServerEvent::ClientTimeout { player_id }) => {
                            let outcome = self.dispatcher.disconnect(&player_id, get_timestamp());
                            self.deliver(outcome).await;
                        }
                        Some(ServerEvent::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                }

                _ = tick_interval.tick() => {
                    self.tick().await;
                }

                _ = expiry_interval.tick() => {
                    self.sweep_expired_sessions();
                }
            }
        }

        Ok(())
    }
}
