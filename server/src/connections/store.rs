//! Connection Store
//!
//! The store is owned by the configuration service; this crate only reads it.
//! Uses runtime queries (`sqlx::query_as`) to avoid requiring a live database
//! at compile time.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use thiserror::Error;

use super::types::Connection;

/// Connection lookup errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read-only lookup of tenant connections.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Find the connection registered for `(corp_id, agent_id)`.
    async fn find_by_corp_and_agent(
        &self,
        corp_id: &str,
        agent_id: &str,
    ) -> Result<Option<Connection>, StoreError>;
}

/// `PostgreSQL`-backed connection store.
#[derive(Clone)]
pub struct PgConnectionStore {
    pool: PgPool,
}

impl PgConnectionStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConnectionStore for PgConnectionStore {
    async fn find_by_corp_and_agent(
        &self,
        corp_id: &str,
        agent_id: &str,
    ) -> Result<Option<Connection>, StoreError> {
        let connection = sqlx::query_as::<_, Connection>(
            r"
            SELECT id, name, corp_id, agent_id, token, encoding_aes_key, relay_url
            FROM weixin_connections
            WHERE corp_id = $1 AND agent_id = $2
            ",
        )
        .bind(corp_id)
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(connection)
    }
}

/// In-memory connection store keyed by `(corp_id, agent_id)`.
#[derive(Default)]
pub struct InMemoryConnectionStore {
    connections: DashMap<(String, String), Connection>,
}

impl InMemoryConnectionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, replacing any previous one for the same pair.
    pub fn insert(&self, connection: Connection) {
        self.connections.insert(
            (connection.corp_id.clone(), connection.agent_id.clone()),
            connection,
        );
    }
}

#[async_trait]
impl ConnectionStore for InMemoryConnectionStore {
    async fn find_by_corp_and_agent(
        &self,
        corp_id: &str,
        agent_id: &str,
    ) -> Result<Option<Connection>, StoreError> {
        Ok(self
            .connections
            .get(&(corp_id.to_string(), agent_id.to_string()))
            .map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn connection(corp_id: &str, agent_id: &str) -> Connection {
        Connection {
            id: Uuid::now_v7(),
            name: format!("{corp_id}/{agent_id}"),
            corp_id: corp_id.into(),
            agent_id: agent_id.into(),
            token: "token".into(),
            encoding_aes_key: "k".repeat(43),
            relay_url: None,
        }
    }

    #[tokio::test]
    async fn lookup_requires_both_keys() {
        let store = InMemoryConnectionStore::new();
        store.insert(connection("ww1", "1000001"));
        store.insert(connection("ww1", "1000002"));

        let found = store.find_by_corp_and_agent("ww1", "1000002").await.unwrap();
        assert_eq!(found.unwrap().agent_id, "1000002");
        assert!(store
            .find_by_corp_and_agent("ww1", "1000003")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_corp_and_agent("ww2", "1000001")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn insert_replaces_existing_pair() {
        let store = InMemoryConnectionStore::new();
        store.insert(connection("ww1", "1"));
        let mut replacement = connection("ww1", "1");
        replacement.name = "renamed".into();
        store.insert(replacement);

        let found = store.find_by_corp_and_agent("ww1", "1").await.unwrap().unwrap();
        assert_eq!(found.name, "renamed");
    }
}
