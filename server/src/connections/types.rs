//! Connection Types

use serde::Serialize;
use uuid::Uuid;

/// A registered WeCom application (one `(corp_id, agent_id)` pair).
#[derive(Clone, sqlx::FromRow)]
pub struct Connection {
    pub id: Uuid,
    pub name: String,
    pub corp_id: String,
    pub agent_id: String,
    /// Shared secret used for callback signatures.
    pub token: String,
    /// 43-character key from which the AES key and IV are derived.
    pub encoding_aes_key: String,
    /// Downstream endpoint receiving classified events.
    pub relay_url: Option<String>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("corp_id", &self.corp_id)
            .field("agent_id", &self.agent_id)
            .field("token", &"<redacted>")
            .field("encoding_aes_key", &"<redacted>")
            .field("relay_url", &self.relay_url)
            .finish()
    }
}

impl Connection {
    /// The relay-visible projection of this connection (no secrets).
    #[must_use]
    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            id: self.id,
            name: self.name.clone(),
            corp_id: self.corp_id.clone(),
            agent_id: self.agent_id.clone(),
        }
    }

    /// Relay URL, treating a blank value as unset.
    #[must_use]
    pub fn relay_url(&self) -> Option<&str> {
        self.relay_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Connection identity forwarded to the relay target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub id: Uuid,
    pub name: String,
    pub corp_id: String,
    pub agent_id: String,
}
