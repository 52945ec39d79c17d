//! Connection tracking for the UDP server
//!
//! A datagram socket has no notion of a connection, so the server keeps
//! one here: a client announces its player identifier with `Hello` and
//! from then on every datagram from that address is attributed to that
//! player. Silence longer than the configured timeout counts as a
//! disconnect.

use log::info;
use shared::PlayerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A bound client connection
#[derive(Debug)]
pub struct Client {
    /// Player identifier announced in `Hello`
    pub player_id: PlayerId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    pub fn new(player_id: &str, addr: SocketAddr) -> Self {
        Self {
            player_id: player_id.to_string(),
            addr,
            last_seen: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if nothing arrived from this client within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Result of binding a player to an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindResult {
    /// A new connection was registered
    Bound,
    /// The player was already connected from another address, which has
    /// been replaced
    Moved { previous: SocketAddr },
    /// The same player re-sent `Hello` from the same address
    Refreshed,
    /// The server is at capacity
    Full,
}

/// Tracks which player is behind which address
pub struct ClientManager {
    clients: HashMap<PlayerId, Client>,
    max_clients: usize,
    timeout: Duration,
}

impl ClientManager {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
            timeout,
        }
    }

    /// Binds `player_id` to `addr`. Another player previously bound to
    /// the same address is unbound and returned in the second slot.
    pub fn bind(&mut self, player_id: &str, addr: SocketAddr) -> (BindResult, Option<PlayerId>) {
        let displaced = self
            .find_by_addr(addr)
            .filter(|existing| *existing != player_id)
            .map(str::to_string);
        if let Some(other) = &displaced {
            self.remove(other);
        }

        if let Some(client) = self.clients.get_mut(player_id) {
            client.touch();
            if client.addr == addr {
                return (BindResult::Refreshed, displaced);
            }
            let previous = client.addr;
            client.addr = addr;
            info!("Player {} moved from {} to {}", player_id, previous, addr);
            return (BindResult::Moved { previous }, displaced);
        }

        if self.clients.len() >= self.max_clients {
            return (BindResult::Full, displaced);
        }

        info!("Player {} connected from {}", player_id, addr);
        self.clients
            .insert(player_id.to_string(), Client::new(player_id, addr));
        (BindResult::Bound, displaced)
    }

    /// Removes a player's connection. Returns true if one existed.
    pub fn remove(&mut self, player_id: &str) -> bool {
        if let Some(client) = self.clients.remove(player_id) {
            info!("Player {} at {} disconnected", client.player_id, client.addr);
            true
        } else {
            false
        }
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<&str> {
        self.clients
            .values()
            .find(|client| client.addr == addr)
            .map(|client| client.player_id.as_str())
    }

    pub fn addr_of(&self, player_id: &str) -> Option<SocketAddr> {
        self.clients.get(player_id).map(|client| client.addr)
    }

    /// Records activity from `addr`, returning the player behind it
    pub fn touch(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        let client = self.clients.values_mut().find(|client| client.addr == addr)?;
        client.touch();
        Some(client.player_id.clone())
    }

    /// Removes and returns every player silent for longer than the
    /// configured timeout
    pub fn check_timeouts(&mut self) -> Vec<PlayerId> {
        let timeout = self.timeout;
        let timed_out: Vec<PlayerId> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(timeout))
            .map(|client| client.player_id.clone())
            .collect();

        for player_id in &timed_out {
            info!("Player {} timed out", player_id);
            self.remove(player_id);
        }

        timed_out
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
