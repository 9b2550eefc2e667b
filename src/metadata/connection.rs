//! Publisher connection strings.
//!
//! A subscription addresses its publisher cluster with a URL of the form
//! `crate://host[:port][,host[:port]]*[?opt=val(&opt=val)*]`. Hosts without a
//! port get the default of the connection mode: 4300 for `sniff` (peer
//! discovery over the cluster transport), 5432 for `pg_tunnel` (tunneling
//! over the PostgreSQL wire protocol). Option names are whitelisted; anything
//! else is rejected at parse time so typos surface in the DDL statement, not
//! at connect time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Literal scheme every connection string must carry.
pub const SCHEME: &str = "crate://";

const SETTING_USER: &str = "user";
const SETTING_PASSWORD: &str = "password";
const SETTING_SSLMODE: &str = "sslmode";
const SETTING_MODE: &str = "mode";

const RECOGNIZED_SETTINGS: [&str; 4] =
    [SETTING_USER, SETTING_PASSWORD, SETTING_SSLMODE, SETTING_MODE];

/// User-visible, non-retriable parse failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("The connection string must start with \"crate://\" but was: \"{0}\"")]
    MissingScheme(String),
    #[error("Connection string argument '{0}' is not supported")]
    UnsupportedArgument(String),
    #[error("Invalid connection mode `{0}`, supported modes are: `sniff`, `pg_tunnel`")]
    InvalidMode(String),
}

/// Transport used to reach the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    /// Cluster-internal transport with peer discovery.
    #[default]
    Sniff,
    /// Tunnel over the PostgreSQL wire protocol.
    PgTunnel,
}

impl ConnectionMode {
    pub fn default_port(self) -> u16 {
        match self {
            ConnectionMode::Sniff => 4300,
            ConnectionMode::PgTunnel => 5432,
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::Sniff => write!(f, "sniff"),
            ConnectionMode::PgTunnel => write!(f, "pg_tunnel"),
        }
    }
}

impl FromStr for ConnectionMode {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sniff" => Ok(ConnectionMode::Sniff),
            "pg_tunnel" => Ok(ConnectionMode::PgTunnel),
            other => Err(ConnectionError::InvalidMode(other.to_string())),
        }
    }
}

/// Parsed, validated publisher address plus its recognized options.
///
/// Hosts are normalized to always carry an explicit port. The raw `password`
/// value is kept for connecting but never rendered; any log or system-table
/// exposure goes through [`ConnectionInfo::safe_connection_string`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    hosts: Vec<String>,
    settings: BTreeMap<String, String>,
}

impl ConnectionInfo {
    /// Parse a `crate://` URL.
    pub fn from_url(url: &str) -> Result<Self, ConnectionError> {
        let rest = url
            .strip_prefix(SCHEME)
            .ok_or_else(|| ConnectionError::MissingScheme(url.to_string()))?;
        let (host_part, query) = match rest.split_once('?') {
            Some((hosts, query)) => (hosts, Some(query)),
            None => (rest, None),
        };

        let mut settings = BTreeMap::new();
        if let Some(query) = query {
            for pair in query.split('&').filter(|pair| !pair.is_empty()) {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                if !RECOGNIZED_SETTINGS.contains(&key) {
                    return Err(ConnectionError::UnsupportedArgument(key.to_string()));
                }
                settings.insert(key.to_string(), value.to_string());
            }
        }

        // Validate the mode eagerly; the default port depends on it.
        let mode = match settings.get(SETTING_MODE) {
            Some(raw) => raw.parse::<ConnectionMode>()?,
            None => ConnectionMode::default(),
        };
        let default_port = mode.default_port();
        let hosts = host_part
            .split(',')
            .map(|host| normalize_host(host, default_port))
            .collect();

        Ok(Self { hosts, settings })
    }

    /// Hosts in declaration order, each with an explicit port.
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// The recognized options as parsed, including credentials.
    pub fn settings(&self) -> &BTreeMap<String, String> {
        &self.settings
    }

    /// Connection mode; defaults to sniff. Values arriving through the
    /// cluster-state framework were validated at parse time.
    pub fn mode(&self) -> ConnectionMode {
        self.settings
            .get(SETTING_MODE)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    pub fn user(&self) -> Option<&str> {
        self.settings.get(SETTING_USER).map(String::as_str)
    }

    pub fn password(&self) -> Option<&str> {
        self.settings.get(SETTING_PASSWORD).map(String::as_str)
    }

    pub fn sslmode(&self) -> Option<&str> {
        self.settings.get(SETTING_SSLMODE).map(String::as_str)
    }

    /// Redacted rendering for logs, error messages, and system tables.
    ///
    /// Credentials are masked with `*`, every host carries its port, the mode
    /// is always explicit, and `sslmode` survives only in pg_tunnel mode
    /// (sniff ignores it).
    pub fn safe_connection_string(&self) -> String {
        let mode = self.mode();
        let mut args: Vec<String> = Vec::new();
        if self.settings.contains_key(SETTING_USER) {
            args.push(format!("{SETTING_USER}=*"));
        }
        if self.settings.contains_key(SETTING_PASSWORD) {
            args.push(format!("{SETTING_PASSWORD}=*"));
        }
        args.push(format!("{SETTING_MODE}={mode}"));
        if mode == ConnectionMode::PgTunnel {
            if let Some(sslmode) = self.sslmode() {
                args.push(format!("{SETTING_SSLMODE}={sslmode}"));
            }
        }
        format!("{SCHEME}{}?{}", self.hosts.join(","), args.join("&"))
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.safe_connection_string())
    }
}

fn normalize_host(host: &str, default_port: u16) -> String {
    if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:{default_port}")
    }
}
