//! Client Registry
//!
//! Open client connections and the deployment version controlling each.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub id: String,
    /// Version controlling this client, `None` while uncontrolled
    pub controller: Option<String>,
    pub connected_at: DateTime<Utc>,
    /// Refreshed on every request carrying the client id
    pub last_seen: DateTime<Utc>,
}

/// Shared between successive lifecycle controllers so a new deployment can
/// see who the previous one still controls.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, ClientInfo>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client. A known id keeps its current controller and is
    /// only marked as seen.
    pub async fn register(&self, id: &str, controller: Option<String>) -> ClientInfo {
        let now = Utc::now();
        let mut clients = self.clients.write().await;
        let client = clients.entry(id.to_string()).or_insert_with(|| ClientInfo {
            id: id.to_string(),
            controller,
            connected_at: now,
            last_seen: now,
        });
        client.last_seen = now;
        client.clone()
    }

    pub async fn release(&self, id: &str) -> bool {
        self.clients.write().await.remove(id).is_some()
    }

    /// Releases clients not seen for longer than `max_idle`. Returns their ids.
    pub async fn release_idle(&self, max_idle: Duration) -> Vec<String> {
        let Some(cutoff) = chrono::Duration::from_std(max_idle)
            .ok()
            .and_then(|idle| Utc::now().checked_sub_signed(idle))
        else {
            return Vec::new();
        };

        let mut clients = self.clients.write().await;
        let idle: Vec<String> = clients
            .values()
            .filter(|c| c.last_seen <= cutoff)
            .map(|c| c.id.clone())
            .collect();
        for id in &idle {
            clients.remove(id);
        }
        idle
    }

    pub async fn get(&self, id: &str) -> Option<ClientInfo> {
        self.clients.read().await.get(id).cloned()
    }

    /// Clients controlled by a version other than `version`.
    pub async fn controlled_by_other(&self, version: &str) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|c| c.controller.as_deref().is_some_and(|v| v != version))
            .count()
    }

    /// Puts every open client under `version`. Returns how many changed.
    pub async fn claim_all(&self, version: &str) -> usize {
        let mut clients = self.clients.write().await;
        let mut claimed = 0;
        for client in clients.values_mut() {
            if client.controller.as_deref() != Some(version) {
                client.controller = Some(version.to_string());
                claimed += 1;
            }
        }
        claimed
    }

    pub async fn list(&self) -> Vec<ClientInfo> {
        let mut list: Vec<ClientInfo> = self.clients.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.connected_at.cmp(&b.connected_at).then(a.id.cmp(&b.id)));
        list
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }
}
