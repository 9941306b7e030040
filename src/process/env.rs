//! Server environments.
//!
//! Origin and edge servers are configured entirely through environment
//! variables. Each role has a typed struct that is checked when it is built and
//! turned into `(key, value)` pairs only at the spawn boundary.

use super::types::ProcessError;
use crate::topology::HostRole;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Environment variables understood by the servers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKey {
    Port,
    HostName,
    EdgeServers,
    Origin,
    RedisPort,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::Port => "PORT",
            EnvKey::HostName => "HOST_NAME",
            EnvKey::EdgeServers => "EDGE_SERVERS",
            EnvKey::Origin => "ORIGIN",
            EnvKey::RedisPort => "REDIS_PORT",
        }
    }
}

impl fmt::Display for EnvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn var(key: EnvKey, value: impl ToString) -> (String, String) {
    (key.as_str().to_string(), value.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginEnv {
    port: u16,
}

impl OriginEnv {
    pub fn new(port: u16) -> Result<Self, ProcessError> {
        if port == 0 {
            return Err(ProcessError::InvalidEnvironment {
                role: HostRole::Origin,
                reason: "PORT cannot be 0".to_string(),
            });
        }
        Ok(Self { port })
    }

    pub fn to_env(&self) -> Vec<(String, String)> {
        vec![var(EnvKey::Port, self.port)]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeEnv {
    port: u16,
    host_name: Ipv4Addr,
    edge_servers: Vec<SocketAddrV4>,
    origin: SocketAddrV4,
    redis_port: u16,
}

impl EdgeEnv {
    /// `edge_servers` lists every edge including this one, on the backbone
    pub fn new(
        host_name: Ipv4Addr,
        port: u16,
        edge_servers: Vec<SocketAddrV4>,
        origin: SocketAddrV4,
        redis_port: u16,
    ) -> Result<Self, ProcessError> {
        let invalid = |reason: String| ProcessError::InvalidEnvironment {
            role: HostRole::Edge,
            reason,
        };
        if port == 0 || redis_port == 0 {
            return Err(invalid("PORT and REDIS_PORT must be non-zero".to_string()));
        }
        if port == redis_port {
            return Err(invalid(format!("PORT and REDIS_PORT are both {}", port)));
        }
        if origin.port() == 0 {
            return Err(invalid("ORIGIN has no port".to_string()));
        }
        if !edge_servers.contains(&SocketAddrV4::new(host_name, port)) {
            return Err(invalid(format!("{}:{} is missing from EDGE_SERVERS", host_name, port)));
        }
        Ok(Self {
            port,
            host_name,
            edge_servers,
            origin,
            redis_port,
        })
    }

    pub fn to_env(&self) -> Vec<(String, String)> {
        let peers: Vec<String> = self.edge_servers.iter().map(|a| a.to_string()).collect();
        vec![
            var(EnvKey::Port, self.port),
            var(EnvKey::HostName, self.host_name),
            var(EnvKey::EdgeServers, peers.join(",")),
            var(EnvKey::Origin, self.origin),
            var(EnvKey::RedisPort, self.redis_port),
        ]
    }
}
