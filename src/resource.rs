//! The resource the cluster serializes access to, and the step that uses it.

use crate::{error::NodeError, NodeId};
use std::{
    error::Error,
    future::Future,
    path::PathBuf,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::{fs::OpenOptions, io::AsyncWriteExt, time::sleep};

/// Action performed while the node holds the resource.
///
/// It runs once per hold, with no other node holding at the same time.
pub trait ResourceAction: Send + Sync {
    fn perform(
        &self,
        node: NodeId,
    ) -> impl Future<Output = Result<(), Box<dyn Error + Send + Sync>>> + Send;
}

/// Appends one line per access to a shared file, then keeps the resource for `hold`.
#[derive(Debug, Clone)]
pub struct AppendLine {
    pub path: PathBuf,
    pub hold: Duration,
}

impl AppendLine {
    pub fn new(path: impl Into<PathBuf>, hold: Duration) -> Self {
        Self {
            path: path.into(),
            hold,
        }
    }
}

impl ResourceAction for AppendLine {
    async fn perform(&self, node: NodeId) -> Result<(), Box<dyn Error + Send + Sync>> {
        let accessed_at = SystemTime::now().duration_since(UNIX_EPOCH)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(
            format!(
                "node {node} accessed at {}.{:06}\n",
                accessed_at.as_secs(),
                accessed_at.subsec_micros()
            )
            .as_bytes(),
        )
        .await?;
        file.flush().await?;
        file.sync_data().await?;

        sleep(self.hold).await;
        Ok(())
    }
}

/// Runs the action exactly once. Failures are not retried.
pub async fn run_critical_section<A: ResourceAction>(
    action: &A,
    node: NodeId,
) -> Result<(), NodeError> {
    action.perform(node).await.map_err(NodeError::Action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Failing(AtomicU32);

    impl ResourceAction for Failing {
        async fn perform(&self, _node: NodeId) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err("disk full".into())
        }
    }

    #[tokio::test]
    async fn append_line_adds_one_line_per_access() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resource.txt");
        let action = AppendLine::new(&path, Duration::ZERO);

        run_critical_section(&action, 1).await.unwrap();
        run_critical_section(&action, 2).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("node 1 accessed at "));
        assert!(lines[1].starts_with("node 2 accessed at "));
    }

    #[tokio::test]
    async fn failures_are_reported_once() {
        let action = Failing(AtomicU32::new(0));
        let result = run_critical_section(&action, 3).await;
        assert!(matches!(result, Err(NodeError::Action(_))));
        assert_eq!(action.0.load(Ordering::SeqCst), 1);
    }
}
