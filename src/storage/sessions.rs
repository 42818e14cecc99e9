use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::session::ledger::SessionRecord;
use crate::session::state::SessionState;
use redb::{Database, ReadableTable, TableDefinition};

/// Key: topic key, Value: JSON document
type JsonTable = TableDefinition<'static, &'static str, &'static str>;

/// Live sessions. Value: JSON serialized SessionState
const SESSIONS_TABLE: JsonTable = TableDefinition::new("sessions");

/// Finalized sessions. Value: JSON serialized SessionRecord
const RECORDS_TABLE: JsonTable = TableDefinition::new("records");

/// Persistent store for session working sets and finalized records
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    /// Open or create the session store
    pub fn open(config: &Config) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.sessions_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = if config.sessions_path.exists() {
            Database::open(&config.sessions_path).map_err(|e| {
                let msg = e.to_string();
                if msg.to_lowercase().contains("lock") {
                    Error::Database("Session database is locked. Another satscope process may be running. Close other instances and try again.".to_string())
                } else {
                    Error::Database(format!("Failed to open session database: {}", e))
                }
            })?
        } else {
            Database::create(&config.sessions_path)
                .map_err(|e| Error::Database(format!("Failed to create session database: {}", e)))?
        };

        // Initialize tables (safe even if they already exist)
        let write_txn = db.begin_write().map_err(|e| {
            Error::Database(format!("Failed to begin write transaction: {}", e))
        })?;
        {
            write_txn.open_table(SESSIONS_TABLE).map_err(|e| {
                Error::Database(format!("Failed to open table: {}", e))
            })?;
            write_txn.open_table(RECORDS_TABLE).map_err(|e| {
                Error::Database(format!("Failed to open table: {}", e))
            })?;
        }
        write_txn.commit().map_err(|e| {
            Error::Database(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(Self { db })
    }

    /// Create a live session. Fails if the topic key is already in use.
    pub fn start(&self, session: &SessionState) -> Result<()> {
        if self.get_session(&session.topic_key)?.is_some()
            || self.get_record(&session.topic_key)?.is_some()
        {
            return Err(Error::Validation(format!(
                "Topic key {} is already in use",
                session.topic_key
            )));
        }
        self.put(SESSIONS_TABLE, &session.topic_key, &session.to_json()?)?;
        tracing::info!(topic = %session.topic_key, "session started");
        Ok(())
    }

    /// Store the current working sets of a live session
    pub fn save(&self, session: &SessionState) -> Result<()> {
        if self.get_record(&session.topic_key)?.is_some() {
            return Err(Error::Database(format!(
                "Session {} is already finalized",
                session.topic_key
            )));
        }
        self.put(SESSIONS_TABLE, &session.topic_key, &session.to_json()?)
    }

    /// Get a live session
    pub fn get_session(&self, topic_key: &str) -> Result<Option<SessionState>> {
        self.get(SESSIONS_TABLE, topic_key)?
            .map(|json| SessionState::from_json(&json))
            .transpose()
    }

    /// Get a finalized session record
    pub fn get_record(&self, topic_key: &str) -> Result<Option<SessionRecord>> {
        self.get(RECORDS_TABLE, topic_key)?
            .map(|json| SessionRecord::from_json(&json))
            .transpose()
    }

    /// Store a finalized record and retire the live session.
    /// Records are immutable: finalizing the same topic twice fails.
    pub fn finalize(&self, record: &SessionRecord) -> Result<()> {
        let json_str = record.to_json()?;
        let write_txn = self.db.begin_write().map_err(|e| {
            Error::Database(format!("Failed to begin write transaction: {}", e))
        })?;

        {
            let mut records = write_txn.open_table(RECORDS_TABLE).map_err(|e| {
                Error::Database(format!("Failed to open table: {}", e))
            })?;
            let exists = records
                .get(record.topic_key.as_str())
                .map_err(|e| Error::Database(format!("Failed to get session record: {}", e)))?
                .is_some();
            if exists {
                return Err(Error::Database(format!(
                    "Session {} is already finalized",
                    record.topic_key
                )));
            }
            records
                .insert(record.topic_key.as_str(), json_str.as_str())
                .map_err(|e| Error::Database(format!("Failed to insert session record: {}", e)))?;

            let mut sessions = write_txn.open_table(SESSIONS_TABLE).map_err(|e| {
                Error::Database(format!("Failed to open table: {}", e))
            })?;
            sessions
                .remove(record.topic_key.as_str())
                .map_err(|e| Error::Database(format!("Failed to remove session: {}", e)))?;
        }

        write_txn.commit().map_err(|e| {
            Error::Database(format!("Failed to commit transaction: {}", e))
        })?;

        tracing::info!(topic = %record.topic_key, "session finalized");
        Ok(())
    }

    /// Topic keys of live sessions and of finalized records, each sorted
    pub fn list(&self) -> Result<(Vec<String>, Vec<String>)> {
        Ok((self.keys(SESSIONS_TABLE)?, self.keys(RECORDS_TABLE)?))
    }

    fn put(&self, table_def: JsonTable, key: &str, value: &str) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(|e| {
            Error::Database(format!("Failed to begin write transaction: {}", e))
        })?;

        {
            let mut table = write_txn.open_table(table_def).map_err(|e| {
                Error::Database(format!("Failed to open table: {}", e))
            })?;
            table.insert(key, value).map_err(|e| {
                Error::Database(format!("Failed to insert entry: {}", e))
            })?;
        }

        write_txn.commit().map_err(|e| {
            Error::Database(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(())
    }

    fn get(&self, table_def: JsonTable, key: &str) -> Result<Option<String>> {
        let read_txn = self.db.begin_read().map_err(|e| {
            Error::Database(format!("Failed to begin read transaction: {}", e))
        })?;

        let table = read_txn.open_table(table_def).map_err(|e| {
            Error::Database(format!("Failed to open table: {}", e))
        })?;

        let value = table
            .get(key)
            .map_err(|e| Error::Database(format!("Failed to get entry: {}", e)))?
            .map(|guard| guard.value().to_string());
        Ok(value)
    }

    fn keys(&self, table_def: JsonTable) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read().map_err(|e| {
            Error::Database(format!("Failed to begin read transaction: {}", e))
        })?;

        let table = read_txn.open_table(table_def).map_err(|e| {
            Error::Database(format!("Failed to open table: {}", e))
        })?;

        let mut keys = Vec::new();
        for item in table.iter().map_err(|e| {
            Error::Database(format!("Failed to iterate table: {}", e))
        })? {
            let (key, _value) = item.map_err(|e| {
                Error::Database(format!("Failed to read table item: {}", e))
            })?;
            keys.push(key.value().to_string());
        }

        Ok(keys)
    }
}
