//! Command line arguments and the runtime configuration derived from them.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Defender keeps the territory when the highest dice are equal.
pub const DEFENDER_WINS_TIES: bool = true;

/// Floor on per-turn reinforcements when territory count is low.
pub const DEFAULT_MIN_REINFORCEMENT: u32 = 3;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Authoritative multiplayer Risk server", long_about = None)]
pub struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Housekeeping sweeps per second
    #[arg(short, long, default_value = "1")]
    pub tick_rate: u32,

    /// Directory for persisted session snapshots
    #[arg(short, long, default_value = "./sessions")]
    pub data_dir: PathBuf,

    /// JSON map definition; the classic world map is used when omitted
    #[arg(short, long)]
    pub map: Option<PathBuf>,

    /// Minimum armies granted at the start of each turn
    #[arg(long, default_value_t = DEFAULT_MIN_REINFORCEMENT)]
    pub min_reinforcement: u32,

    /// Seconds of silence before a connection is dropped
    #[arg(long, default_value = "30")]
    pub client_timeout_secs: u64,

    /// Seconds a disconnected player may hold the turn (0 disables)
    #[arg(long, default_value = "120")]
    pub idle_turn_secs: u64,

    /// Age after which finished or abandoned sessions are deleted from disk
    #[arg(long, default_value = "86400")]
    pub session_max_age_secs: u64,

    /// Maximum number of simultaneous connections
    #[arg(long, default_value = "64")]
    pub max_clients: usize,
}

/// Tunable game rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleConfig {
    pub min_reinforcement: u32,
    pub defender_wins_ties: bool,
    /// Only one fortification move per turn
    pub single_fortification: bool,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            min_reinforcement: DEFAULT_MIN_REINFORCEMENT,
            defender_wins_ties: DEFENDER_WINS_TIES,
            single_fortification: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub tick_duration: Duration,
    pub data_dir: PathBuf,
    pub map_path: Option<PathBuf>,
    pub rules: RuleConfig,
    pub client_timeout: Duration,
    pub idle_turn_timeout: Option<Duration>,
    pub session_max_age: Duration,
    pub max_clients: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        let tick_rate = args.tick_rate.max(1);
        Self {
            bind_addr: format!("{}:{}", args.host, args.port),
            tick_duration: Duration::from_secs_f32(1.0 / tick_rate as f32),
            data_dir: args.data_dir,
            map_path: args.map,
            rules: RuleConfig {
                min_reinforcement: args.min_reinforcement,
                ..RuleConfig::default()
            },
            client_timeout: Duration::from_secs(args.client_timeout_secs),
            idle_turn_timeout: (args.idle_turn_secs > 0)
                .then(|| Duration::from_secs(args.idle_turn_secs)),
            session_max_age: Duration::from_secs(args.session_max_age_secs),
            max_clients: args.max_clients,
        }
    }
}
