//! Node configuration and peer addressing.

use crate::{error::NodeError, schedule::Schedule, NodeId};
use std::{collections::HashMap, path::PathBuf, time::Duration};

pub const BASE_PORT: u16 = 6000;
pub const HOST_TEMPLATE: &str = "device{id}";
pub const SEND_ATTEMPTS: u32 = 5;
pub const SEND_BACKOFF: Duration = Duration::from_secs(1);
pub const WARMUP: Duration = Duration::from_secs(5);
pub const HOLD: Duration = Duration::from_secs(10);
pub const RESOURCE_FILE: &str = "resource.txt";

/// Resolves a node id to the host it runs on.
///
/// Hosts listed explicitly win; every other node is named after the template, where `{id}` is
/// replaced by the node id.
#[derive(Debug, Clone)]
pub struct AddressBook {
    template: String,
    hosts: HashMap<NodeId, String>,
}

impl AddressBook {
    pub fn from_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            hosts: HashMap::new(),
        }
    }

    /// Every node on the same host, e.g. `127.0.0.1` for a local cluster.
    pub fn single_host(host: impl Into<String>) -> Self {
        Self::from_template(host)
    }

    pub fn insert(&mut self, node: NodeId, host: impl Into<String>) {
        self.hosts.insert(node, host.into());
    }

    /// Parses a `<id>=<host>` pair, as given on the command line.
    pub fn push_entry(&mut self, entry: &str) -> Result<(), NodeError> {
        let (node, host) = entry
            .split_once('=')
            .ok_or_else(|| NodeError::Config(format!("expected <id>=<host>, got {entry:?}")))?;
        let node = node
            .trim()
            .parse::<NodeId>()
            .map_err(|e| NodeError::Config(format!("bad node id in {entry:?}: {e}")))?;
        let host = host.trim();
        if host.is_empty() {
            return Err(NodeError::Config(format!("empty host in {entry:?}")));
        }
        self.insert(node, host);
        Ok(())
    }

    pub fn resolve(&self, node: NodeId) -> String {
        match self.hosts.get(&node) {
            Some(host) => host.clone(),
            None => self.template.replace("{id}", &node.to_string()),
        }
    }
}

impl Default for AddressBook {
    fn default() -> Self {
        Self::from_template(HOST_TEMPLATE)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node_id: NodeId,
    pub nodes: u32,
    pub base_port: u16,
    pub peers: AddressBook,
    pub send_attempts: u32,
    pub send_backoff: Duration,
    pub warmup: Duration,
    pub hold: Duration,
    pub schedule: Schedule,
    /// Give up on a request that isn't fully granted within this long. `None` waits forever.
    pub acquire_timeout: Option<Duration>,
    pub resource_path: PathBuf,
}

impl Config {
    pub fn new(node_id: NodeId, nodes: u32) -> Self {
        Self {
            node_id,
            nodes,
            base_port: BASE_PORT,
            peers: AddressBook::default(),
            send_attempts: SEND_ATTEMPTS,
            send_backoff: SEND_BACKOFF,
            warmup: WARMUP,
            hold: HOLD,
            schedule: Schedule::default(),
            acquire_timeout: None,
            resource_path: PathBuf::from(RESOURCE_FILE),
        }
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.nodes == 0 {
            return Err(NodeError::Config("the cluster needs at least one node".into()));
        }
        if !(1..=self.nodes).contains(&self.node_id) {
            return Err(NodeError::Config(format!(
                "node id {} is outside 1..={}",
                self.node_id, self.nodes
            )));
        }
        if self.send_attempts == 0 {
            return Err(NodeError::Config("send attempts must be at least 1".into()));
        }
        let last_port = u64::from(self.base_port) + u64::from(self.nodes) - 1;
        if last_port > u64::from(u16::MAX) {
            return Err(NodeError::Config(format!(
                "ports {}..={last_port} don't fit in u16",
                self.base_port
            )));
        }
        self.schedule.validate()
    }

    /// Port node `node` listens on: `base_port + node - 1`.
    pub fn port_for(&self, node: NodeId) -> u16 {
        port_for(self.base_port, node)
    }

    pub fn own_port(&self) -> u16 {
        self.port_for(self.node_id)
    }
}

pub fn port_for(base_port: u16, node: NodeId) -> u16 {
    (u32::from(base_port) + node.saturating_sub(1)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_names_every_node() {
        let book = AddressBook::default();
        assert_eq!(book.resolve(1), "device1");
        assert_eq!(book.resolve(12), "device12");
    }

    #[test]
    fn explicit_hosts_override_the_template() {
        let mut book = AddressBook::single_host("127.0.0.1");
        book.push_entry("2=10.0.0.2").unwrap();
        assert_eq!(book.resolve(1), "127.0.0.1");
        assert_eq!(book.resolve(2), "10.0.0.2");
    }

    #[test]
    fn bad_entries_are_rejected() {
        let mut book = AddressBook::default();
        assert!(book.push_entry("10.0.0.2").is_err());
        assert!(book.push_entry("two=10.0.0.2").is_err());
        assert!(book.push_entry("2=").is_err());
    }

    #[test]
    fn ports_follow_node_ids() {
        let config = Config::new(3, 4);
        assert_eq!(config.port_for(1), 6000);
        assert_eq!(config.own_port(), 6002);
        assert_eq!(config.port_for(4), 6003);
    }

    #[test]
    fn validation() {
        assert!(Config::new(1, 4).validate().is_ok());
        assert!(Config::new(0, 4).validate().is_err());
        assert!(Config::new(5, 4).validate().is_err());
        assert!(Config::new(1, 0).validate().is_err());

        let mut config = Config::new(1, 4);
        config.base_port = u16::MAX - 1;
        assert!(config.validate().is_err());
    }
}
