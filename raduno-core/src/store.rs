// ABOUTME: Persistent event-to-group mapping using SQLite database.
// ABOUTME: Rows are scoped by the agent address that created the group.
use crate::traits::ConversationInfo;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A messaging group kept in sync with one event
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedGroup {
    pub group: ConversationInfo,
    /// Event address this group mirrors, lowercased
    pub primary_address: String,
    /// Updated only after a successful pass
    pub last_synced_at: DateTime<Utc>,
}

/// One persisted row of `group_mappings`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMapping {
    pub event_address: String,
    pub group_id: String,
    pub group_name: Option<String>,
    /// `None` for legacy rows written before ownership was recorded
    pub agent_address: Option<String>,
    pub last_synced_at: String,
    pub created_at: String,
}

impl GroupMapping {
    /// Legacy rows without an owner are adoptable by anyone
    pub fn is_owned_by(&self, agent_address: &str) -> bool {
        match self.agent_address.as_deref() {
            None | Some("") => true,
            Some(owner) => owner.eq_ignore_ascii_case(agent_address),
        }
    }
}

#[derive(Clone)]
pub struct GroupStore {
    db: Arc<Mutex<Connection>>,
}

impl GroupStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(db_path).context("Failed to open SQLite database")?;
        Self::init(conn, &db_path.display().to_string())
    }

    /// Store backed by a private in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn, ":memory:")
    }

    fn init(conn: Connection, location: &str) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS group_mappings (
                event_address TEXT PRIMARY KEY,
                group_id TEXT NOT NULL,
                group_name TEXT,
                agent_address TEXT,
                last_synced_at TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        // Migration: databases written before ownership scoping lack agent_address
        let _ = conn.execute("ALTER TABLE group_mappings ADD COLUMN agent_address TEXT", []);

        tracing::info!(db = %location, "Group mappings database initialized");

        Ok(GroupStore {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Upsert the mapping for `event_address`; last write wins.
    pub fn save(&self, event_address: &str, group: &ManagedGroup, agent_address: &str) -> Result<()> {
        let db = self
            .db
            .lock()
            .map_err(|e| anyhow::anyhow!("Database mutex poisoned: {}", e))?;
        db.execute(
            "INSERT OR REPLACE INTO group_mappings
                (event_address, group_id, group_name, agent_address, last_synced_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event_address.to_lowercase(),
                &group.group.id,
                &group.group.name,
                agent_address.to_lowercase(),
                group.last_synced_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;

        tracing::debug!(
            event = %event_address,
            group_id = %group.group.id,
            "Saved group mapping"
        );
        Ok(())
    }

    /// Group id for `event_address`, only if the row belongs to `agent_address`
    /// or predates ownership. A foreign row is reported as not found.
    pub fn find_group_id(&self, event_address: &str, agent_address: &str) -> Result<Option<String>> {
        let db = self
            .db
            .lock()
            .map_err(|e| anyhow::anyhow!("Database mutex poisoned: {}", e))?;
        let mut stmt =
            db.prepare("SELECT group_id, agent_address FROM group_mappings WHERE event_address = ?1")?;

        let row = stmt.query_row(params![event_address.to_lowercase()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        });

        match row {
            Ok((group_id, owner)) => match owner.as_deref() {
                Some(owner) if !owner.is_empty() && !owner.eq_ignore_ascii_case(agent_address) => {
                    tracing::info!(
                        event = %event_address,
                        owner = %owner,
                        "Group mapping belongs to a different agent, ignoring"
                    );
                    Ok(None)
                }
                _ => Ok(Some(group_id)),
            },
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Record a completed sync. Returns the number of rows touched (zero is fine).
    pub fn touch_last_synced(&self, event_address: &str, at: DateTime<Utc>) -> Result<usize> {
        let db = self
            .db
            .lock()
            .map_err(|e| anyhow::anyhow!("Database mutex poisoned: {}", e))?;
        let updated = db.execute(
            "UPDATE group_mappings SET last_synced_at = ?1 WHERE event_address = ?2",
            params![at.to_rfc3339(), event_address.to_lowercase()],
        )?;
        Ok(updated)
    }

    /// List all mappings, oldest first
    pub fn list_all(&self) -> Result<Vec<GroupMapping>> {
        let db = self
            .db
            .lock()
            .map_err(|e| anyhow::anyhow!("Database mutex poisoned: {}", e))?;
        let mut stmt = db.prepare(
            "SELECT event_address, group_id, group_name, agent_address, last_synced_at, created_at
             FROM group_mappings ORDER BY created_at ASC, event_address ASC",
        )?;

        let mappings = stmt
            .query_map([], |row| {
                Ok(GroupMapping {
                    event_address: row.get(0)?,
                    group_id: row.get(1)?,
                    group_name: row.get(2)?,
                    agent_address: row.get(3)?,
                    last_synced_at: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(mappings)
    }
}
