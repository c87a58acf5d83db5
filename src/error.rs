//! Error types.

use crate::{arbiter::State, NodeId};
use std::{error::Error, fmt, io, time::Duration};

/// Failure to deliver one message to one peer.
#[derive(Debug)]
pub enum SendError {
    /// The peer refused connections for every attempt.
    Unreachable { node: NodeId, attempts: u32 },
    UnknownPeer(NodeId),
    Io(io::Error),
    Codec(String),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Unreachable { node, attempts } => {
                write!(f, "node {node} unreachable after {attempts} attempts")
            }
            SendError::UnknownPeer(node) => write!(f, "no address known for node {node}"),
            SendError::Io(e) => write!(f, "IO error: {e}"),
            SendError::Codec(e) => write!(f, "codec error: {e}"),
        }
    }
}

impl Error for SendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SendError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SendError {
    fn from(e: io::Error) -> Self {
        SendError::Io(e)
    }
}

/// Failure of one node operation.
#[derive(Debug)]
pub enum NodeError {
    /// Not every peer granted the request in time; the request was withdrawn.
    AcquireTimeout {
        waited: Duration,
        received: u32,
        needed: u32,
    },
    /// The resource action failed while the resource was held.
    Action(Box<dyn Error + Send + Sync>),
    /// Acquiring needs the node to be idle; it was wanting or holding already.
    NotIdle(State),
    Bind { port: u16, source: io::Error },
    Config(String),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::AcquireTimeout {
                waited,
                received,
                needed,
            } => write!(
                f,
                "gave up acquiring after {waited:?} with {received} of {needed} grants"
            ),
            NodeError::Action(e) => write!(f, "resource action failed: {e}"),
            NodeError::NotIdle(state) => write!(f, "node is {state:?}, not idle"),
            NodeError::Bind { port, source } => {
                write!(f, "couldn't listen on port {port}: {source}")
            }
            NodeError::Config(e) => write!(f, "invalid configuration: {e}"),
        }
    }
}

impl Error for NodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NodeError::Action(e) => Some(e.as_ref()),
            NodeError::Bind { source, .. } => Some(source),
            _ => None,
        }
    }
}
