//! Persistence for pending authorizations and issued tokens
//!
//! Every operation touches a single key and is atomic. Implementations are
//! shared across request tasks, so they must be `Send + Sync`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::Error;
use crate::Result;

use super::credentials::{OAuthState, OAuthToken};

/// Keyed store for OAuth state tokens and credential records
pub trait TokenStore: Send + Sync {
    fn put_state(&self, state: &OAuthState) -> Result<()>;

    /// Remove and return the state, whatever its age
    fn take_state(&self, state: &str) -> Result<Option<OAuthState>>;

    /// Drop states created before `cutoff`, returning how many were removed
    fn prune_states(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Insert or overwrite the record for `(token.user_id, token.provider)`
    fn put_token(&self, token: &OAuthToken) -> Result<()>;

    fn get_token(&self, user_id: &str, provider: &str) -> Result<Option<OAuthToken>>;

    /// Returns whether a record existed
    fn delete_token(&self, user_id: &str, provider: &str) -> Result<bool>;
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Other("token store lock poisoned".to_string()))
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

/// SQLite-backed store
pub struct SqliteTokenStore {
    conn: Mutex<Connection>,
}

impl SqliteTokenStore {
    /// Open (or create) the database at `path`, creating schema if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!("Opening auth store at {}", path.display());
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS oauth_state (
                state TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                code_verifier TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS oauth_tokens (
                user_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT NULL,
                token_type TEXT NOT NULL,
                expires_at INTEGER NULL,
                scope TEXT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, provider)
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn state_from_row(row: &Row<'_>) -> rusqlite::Result<OAuthState> {
    Ok(OAuthState {
        state: row.get(0)?,
        user_id: row.get(1)?,
        provider: row.get(2)?,
        code_verifier: row.get(3)?,
        created_at: from_unix(row.get(4)?),
    })
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<OAuthToken> {
    let expires_at: Option<i64> = row.get(5)?;
    Ok(OAuthToken {
        user_id: row.get(0)?,
        provider: row.get(1)?,
        access_token: row.get(2)?,
        refresh_token: row.get(3)?,
        token_type: row.get(4)?,
        expires_at: expires_at.map(from_unix),
        scope: row.get(6)?,
        updated_at: from_unix(row.get(7)?),
    })
}

impl TokenStore for SqliteTokenStore {
    fn put_state(&self, state: &OAuthState) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO oauth_state (state, user_id, provider, code_verifier, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                state.state,
                state.user_id,
                state.provider,
                state.code_verifier,
                state.created_at.timestamp()
            ],
        )?;
        Ok(())
    }

    fn take_state(&self, state: &str) -> Result<Option<OAuthState>> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        let found = tx
            .query_row(
                "SELECT state, user_id, provider, code_verifier, created_at
                 FROM oauth_state WHERE state = ?1",
                params![state],
                state_from_row,
            )
            .optional()?;
        if found.is_some() {
            tx.execute("DELETE FROM oauth_state WHERE state = ?1", params![state])?;
        }
        tx.commit()?;
        Ok(found)
    }

    fn prune_states(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = lock(&self.conn)?;
        let removed = conn.execute(
            "DELETE FROM oauth_state WHERE created_at < ?1",
            params![cutoff.timestamp()],
        )?;
        Ok(removed)
    }

    fn put_token(&self, token: &OAuthToken) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO oauth_tokens (
                user_id, provider, access_token, refresh_token, token_type, expires_at, scope, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(user_id, provider) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_type = excluded.token_type,
                expires_at = excluded.expires_at,
                scope = excluded.scope,
                updated_at = excluded.updated_at",
            params![
                token.user_id,
                token.provider,
                token.access_token,
                token.refresh_token,
                token.token_type,
                token.expires_at.map(|t| t.timestamp()),
                token.scope,
                token.updated_at.timestamp()
            ],
        )?;
        Ok(())
    }

    fn get_token(&self, user_id: &str, provider: &str) -> Result<Option<OAuthToken>> {
        let conn = lock(&self.conn)?;
        let token = conn
            .query_row(
                "SELECT user_id, provider, access_token, refresh_token, token_type, expires_at, scope, updated_at
                 FROM oauth_tokens WHERE user_id = ?1 AND provider = ?2",
                params![user_id, provider],
                token_from_row,
            )
            .optional()?;
        Ok(token)
    }

    fn delete_token(&self, user_id: &str, provider: &str) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let removed = conn.execute(
            "DELETE FROM oauth_tokens WHERE user_id = ?1 AND provider = ?2",
            params![user_id, provider],
        )?;
        Ok(removed > 0)
    }
}

/// Volatile store, mostly for tests and `courier chat`
#[derive(Default)]
pub struct InMemoryTokenStore {
    states: Mutex<HashMap<String, OAuthState>>,
    tokens: Mutex<HashMap<(String, String), OAuthToken>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for InMemoryTokenStore {
    fn put_state(&self, state: &OAuthState) -> Result<()> {
        lock(&self.states)?.insert(state.state.clone(), state.clone());
        Ok(())
    }

    fn take_state(&self, state: &str) -> Result<Option<OAuthState>> {
        Ok(lock(&self.states)?.remove(state))
    }

    fn prune_states(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut states = lock(&self.states)?;
        let before = states.len();
        states.retain(|_, s| s.created_at >= cutoff);
        Ok(before - states.len())
    }

    fn put_token(&self, token: &OAuthToken) -> Result<()> {
        lock(&self.tokens)?.insert((token.user_id.clone(), token.provider.clone()), token.clone());
        Ok(())
    }

    fn get_token(&self, user_id: &str, provider: &str) -> Result<Option<OAuthToken>> {
        Ok(lock(&self.tokens)?
            .get(&(user_id.to_string(), provider.to_string()))
            .cloned())
    }

    fn delete_token(&self, user_id: &str, provider: &str) -> Result<bool> {
        Ok(lock(&self.tokens)?
            .remove(&(user_id.to_string(), provider.to_string()))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn state(token: &str, age_secs: i64) -> OAuthState {
        OAuthState {
            state: token.to_string(),
            user_id: "u1".to_string(),
            provider: "google".to_string(),
            code_verifier: "verifier".to_string(),
            created_at: from_unix(Utc::now().timestamp() - age_secs),
        }
    }

    fn token(access: &str) -> OAuthToken {
        OAuthToken {
            user_id: "u1".to_string(),
            provider: "google".to_string(),
            access_token: access.to_string(),
            refresh_token: Some("refresh".to_string()),
            token_type: "Bearer".to_string(),
            expires_at: Some(from_unix(Utc::now().timestamp() + 3600)),
            scope: Some("https://mail.google.com/".to_string()),
            updated_at: from_unix(Utc::now().timestamp()),
        }
    }

    fn exercise_states(store: &dyn TokenStore) {
        store.put_state(&state("fresh", 0)).unwrap();
        store.put_state(&state("stale", 700)).unwrap();

        let removed = store.prune_states(Utc::now() - Duration::seconds(600)).unwrap();
        assert_eq!(removed, 1);
        assert!(store.take_state("stale").unwrap().is_none());

        let taken = store.take_state("fresh").unwrap().unwrap();
        assert_eq!(taken.code_verifier, "verifier");
        // single use
        assert!(store.take_state("fresh").unwrap().is_none());
    }

    fn exercise_tokens(store: &dyn TokenStore) {
        assert!(store.get_token("u1", "google").unwrap().is_none());

        store.put_token(&token("first")).unwrap();
        store.put_token(&token("second")).unwrap();
        let stored = store.get_token("u1", "google").unwrap().unwrap();
        assert_eq!(stored.access_token, "second");
        assert_eq!(stored.scope.as_deref(), Some("https://mail.google.com/"));
        assert!(!stored.is_expired());

        assert!(store.get_token("u2", "google").unwrap().is_none());
        assert!(store.delete_token("u1", "google").unwrap());
        assert!(!store.delete_token("u1", "google").unwrap());
    }

    #[test]
    fn test_sqlite_states() {
        exercise_states(&SqliteTokenStore::in_memory().unwrap());
    }

    #[test]
    fn test_sqlite_tokens() {
        exercise_tokens(&SqliteTokenStore::in_memory().unwrap());
    }

    #[test]
    fn test_memory_store() {
        let store = InMemoryTokenStore::new();
        exercise_states(&store);
        exercise_tokens(&store);
    }

    #[test]
    fn test_sqlite_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("auth.db");

        SqliteTokenStore::open(&path).unwrap().put_token(&token("kept")).unwrap();

        let reopened = SqliteTokenStore::open(&path).unwrap();
        let stored = reopened.get_token("u1", "google").unwrap().unwrap();
        assert_eq!(stored.access_token, "kept");
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh"));
    }
}
