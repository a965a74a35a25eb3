use std::{
    fs::File,
    io::{self, BufReader},
    net::{Ipv4Addr, SocketAddr},
    path::Path,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::Party;

/// Port of the first party in the default local configuration. The second party uses the next one.
pub const DEFAULT_BASE_PORT: u16 = 7700;

/// Seconds to wait for a message from the peer before aborting.
pub const DEFAULT_RECEIVE_TIMEOUT_SECS: u64 = 300;

/// Configuration of networked two-party transport.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct NetworkConfig {
    pub parties: Vec<NetworkPartyConfig>,
    #[serde(default = "default_receive_timeout_secs")]
    pub receive_timeout_secs: u64,
}

fn default_receive_timeout_secs() -> u64 {
    DEFAULT_RECEIVE_TIMEOUT_SECS
}

/// Details about party in networked protocol.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct NetworkPartyConfig {
    pub address: SocketAddr,
}

impl NetworkConfig {
    /// Load configuration from JSON file.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: NetworkConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Both parties on localhost, on consecutive ports starting at `base_port`.
    pub fn localhost(base_port: u16) -> Self {
        let party = |port| NetworkPartyConfig {
            address: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
        };
        Self {
            parties: vec![party(base_port), party(base_port + 1)],
            receive_timeout_secs: DEFAULT_RECEIVE_TIMEOUT_SECS,
        }
    }

    /// How long to wait for the peer once connected.
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs)
    }

    /// Configuration of given party.
    pub fn party(&self, party: Party) -> &NetworkPartyConfig {
        &self.parties[party.id()]
    }

    fn validate(&self) -> io::Result<()> {
        if self.parties.len() != 2 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Expected 2 parties, found {}", self.parties.len()),
            ));
        }
        if self.receive_timeout_secs == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Receive timeout must be positive",
            ));
        }
        Ok(())
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::localhost(DEFAULT_BASE_PORT)
    }
}
