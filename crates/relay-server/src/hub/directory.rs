//! Named hubs, created on first use.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::{info, warn};

use super::actor::HubHandle;
use super::coordinator::Coordinator;

/// A running hub and the task driving its actor.
#[derive(Debug)]
struct HubEntry {
    handle: HubHandle,
    task: AbortHandle,
}

impl HubEntry {
    fn is_running(&self) -> bool {
        !self.task.is_finished() && !self.handle.is_closed()
    }
}

/// Maps hub names to running hub actors.
///
/// Each name maps to at most one live actor at a time. Hubs never share
/// state. Dropping the directory stops every actor it spawned.
#[derive(Debug)]
pub struct HubDirectory {
    hubs: Mutex<HashMap<String, HubEntry>>,
    close_reason: String,
    mailbox_capacity: usize,
}

impl HubDirectory {
    /// Create an empty directory. Hubs it spawns use the given close reason
    /// and mailbox capacity.
    pub fn new(close_reason: impl Into<String>, mailbox_capacity: usize) -> Self {
        Self {
            hubs: Mutex::new(HashMap::new()),
            close_reason: close_reason.into(),
            mailbox_capacity,
        }
    }

    /// Handle for the hub called `name`, spawning it if needed.
    ///
    /// A hub whose actor has stopped is replaced by a fresh one with the
    /// counter back at 0. Must be called inside a Tokio runtime.
    pub fn get(&self, name: &str) -> HubHandle {
        let mut hubs = self.hubs.lock();
        if let Some(entry) = hubs.get(name) {
            if entry.is_running() {
                return entry.handle.clone();
            }
            warn!(hub = name, "hub actor stopped, respawning");
        }

        let coordinator = Coordinator::new(name, self.close_reason.clone());
        let (handle, task) = HubHandle::spawn(coordinator, self.mailbox_capacity);
        let entry = HubEntry {
            handle: handle.clone(),
            task: task.abort_handle(),
        };
        let _ = hubs.insert(name.to_owned(), entry);
        info!(hub = name, "hub created");
        handle
    }

    /// Sorted names of known hubs.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.hubs.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of known hubs.
    pub fn len(&self) -> usize {
        self.hubs.lock().len()
    }

    /// Whether no hub has been created yet.
    pub fn is_empty(&self) -> bool {
        self.hubs.lock().is_empty()
    }
}

impl Drop for HubDirectory {
    fn drop(&mut self) {
        for entry in self.hubs.get_mut().values() {
            entry.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use std::time::Duration;

    use super::*;
    use crate::websocket::connection::{ClientConnection, Outbound};
    use tokio::sync::mpsc;

    fn directory() -> HubDirectory {
        HubDirectory::new("hub is closing WebSocket", 16)
    }

    #[tokio::test]
    async fn hubs_are_created_lazily() {
        let dir = directory();
        assert!(dir.is_empty());
        let hub = dir.get("global");
        assert_eq!(hub.name(), "global");
        assert_eq!(dir.len(), 1);
    }

    #[tokio::test]
    async fn same_name_shares_one_hub() {
        let dir = directory();
        let first = dir.get("global");
        let (tx, _rx) = mpsc::unbounded_channel();
        first
            .open(Arc::new(ClientConnection::new(tx)))
            .await
            .unwrap();

        let second = dir.get("global");
        assert_eq!(second.stats().await.unwrap().connections, 1);
        assert_eq!(dir.len(), 1);
    }

    #[tokio::test]
    async fn distinct_names_are_isolated() {
        let dir = directory();
        let lobby = dir.get("lobby");
        let other = dir.get("other");

        let (tx_l, mut rx_l) = mpsc::unbounded_channel();
        let conn_l = Arc::new(ClientConnection::new(tx_l));
        lobby.open(conn_l.clone()).await.unwrap();
        let (tx_o, mut rx_o) = mpsc::unbounded_channel();
        other
            .open(Arc::new(ClientConnection::new(tx_o)))
            .await
            .unwrap();

        lobby.message(conn_l.id(), r#"["hi"]"#.into()).await.unwrap();

        assert_eq!(rx_l.recv().await.unwrap(), Outbound::Text("0,hi".into()));
        assert_eq!(other.stats().await.unwrap().connections, 1);
        assert!(rx_o.try_recv().is_err());
        assert_eq!(dir.names(), vec!["lobby".to_string(), "other".to_string()]);
    }

    async fn wait_until_stopped(dir: &HubDirectory, name: &str) {
        let stopped = tokio::time::timeout(Duration::from_secs(5), async {
            while dir.hubs.lock()[name].is_running() {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(stopped.is_ok(), "hub {name} never stopped");
    }

    #[tokio::test]
    async fn stopped_hub_is_replaced_with_fresh_state() {
        let dir = directory();
        let first = dir.get("global");
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Arc::new(ClientConnection::new(tx));
        first.open(conn.clone()).await.unwrap();
        first.message(conn.id(), r#"["x"]"#.into()).await.unwrap();
        assert_eq!(first.stats().await.unwrap().connections, 1);

        dir.hubs.lock()["global"].task.abort();
        wait_until_stopped(&dir, "global").await;
        assert!(first.stats().await.is_err());

        let second = dir.get("global");
        let stats = second.stats().await.unwrap();
        assert_eq!(stats.connections, 0);
        assert_eq!(stats.counter, 0);
        assert_eq!(dir.len(), 1);
        assert!(dir.hubs.lock()["global"].is_running());
    }

    #[tokio::test]
    async fn dropping_directory_stops_its_hubs() {
        let dir = directory();
        let hub = dir.get("global");
        drop(dir);

        let stopped = tokio::time::timeout(Duration::from_secs(5), async {
            while !hub.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(stopped.is_ok());
        assert!(hub.stats().await.is_err());
    }
}
