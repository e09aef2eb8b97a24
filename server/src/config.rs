//! Runtime configuration for the server.
//!
//! Built by the binary from command-line arguments; library users and tests
//! construct it directly, usually starting from `ServerConfig::default()`.

use std::path::PathBuf;
use std::time::Duration;

/// Operator credentials accepted by `AdminLogin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub user: String,
    pub pass: String,
}

impl AdminCredentials {
    pub fn matches(&self, user: &str, pass: &str) -> bool {
        self.user == user && self.pass == pass
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the UDP socket binds to, e.g. `127.0.0.1:3000`
    pub bind_addr: String,
    /// Fixed simulation period
    pub tick_duration: Duration,
    /// Maximum number of concurrent connections
    pub max_clients: usize,
    /// Silence after which a connection is dropped
    pub client_timeout: Duration,
    /// Directory holding `settings.json` and `stats.json`
    pub data_dir: PathBuf,
    /// `None` disables admin login entirely
    pub admin: Option<AdminCredentials>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            tick_duration: Duration::from_millis(shared::TICK_MS),
            max_clients: 256,
            client_timeout: Duration::from_secs(5),
            data_dir: PathBuf::from("data"),
            admin: None,
        }
    }
}
