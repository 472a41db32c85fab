//! Turso Embedded / libSQL storage layer for committed import targets.
//!
//! The [`Storage`] struct wraps a libSQL database holding the latest target of
//! every element, a revision history, and an audit row per pipeline run. It
//! implements [`Persister`], so the runner can commit straight into it.
//!
//! **Access rules:**
//! - import runs: read-write via [`Storage::open`]
//! - inspection tools: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use importkit_shared::{ElementId, ImportKitError, PersistError, Persister, Result, Target};
use libsql::{Connection, Database, params};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    /// Serializes multi-statement writes from concurrent runner tasks.
    write_lock: Mutex<()>,
}

/// The latest committed target of one element.
#[derive(Debug, Clone)]
pub struct StoredTarget {
    pub element_id: ElementId,
    pub target: Target,
    /// SHA-256 of the target's JSON form.
    pub target_hash: String,
    /// 1 for the first commit, incremented on every changed commit.
    pub revision: u32,
    pub updated_at: DateTime<Utc>,
}

/// One entry in an element's revision history.
#[derive(Debug, Clone)]
pub struct Revision {
    pub revision: u32,
    pub target_hash: String,
    pub saved_at: DateTime<Utc>,
}

/// Audit record of a pipeline run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: String,
    pub mapping_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Serialized run report, present once the run finished.
    pub report_json: Option<String>,
}

/// What a [`Storage::commit_target`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new revision was written.
    Written { revision: u32 },
    /// The target matched the stored one; nothing was written.
    Unchanged,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ImportKitError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ImportKitError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ImportKitError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            write_lock: Mutex::new(()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ImportKitError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ImportKitError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            write_lock: Mutex::new(()),
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ImportKitError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ImportKitError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Element targets
    // -----------------------------------------------------------------------

    /// Commit `target` as the element's new state and append it to the
    /// revision history. A target identical to the stored one is a no-op.
    pub async fn commit_target(
        &self,
        element_id: &ElementId,
        target: &Target,
    ) -> Result<CommitOutcome> {
        self.check_writable()?;
        let target_json =
            serde_json::to_string(target).map_err(|e| ImportKitError::Storage(e.to_string()))?;
        let target_hash = hash_json(&target_json);

        let _guard = self.write_lock.lock().await;

        if self.current_hash(element_id).await?.as_deref() == Some(target_hash.as_str()) {
            tracing::debug!(element = %element_id, "target unchanged, skipping commit");
            return Ok(CommitOutcome::Unchanged);
        }

        let now = Utc::now().to_rfc3339();
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| ImportKitError::Storage(e.to_string()))?;

        tx.execute(
            "INSERT INTO element_state (element_id, target_json, target_hash, revision, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(element_id) DO UPDATE SET
               target_json = excluded.target_json,
               target_hash = excluded.target_hash,
               revision = element_state.revision + 1,
               updated_at = excluded.updated_at",
            params![
                element_id.0.as_str(),
                target_json.as_str(),
                target_hash.as_str(),
                now.as_str()
            ],
        )
        .await
        .map_err(|e| ImportKitError::Storage(e.to_string()))?;

        tx.execute(
            "INSERT INTO element_revisions (element_id, revision, target_json, target_hash, saved_at)
             SELECT element_id, revision, target_json, target_hash, updated_at
             FROM element_state WHERE element_id = ?1",
            params![element_id.0.as_str()],
        )
        .await
        .map_err(|e| ImportKitError::Storage(e.to_string()))?;

        let mut rows = tx
            .query(
                "SELECT revision FROM element_state WHERE element_id = ?1",
                params![element_id.0.as_str()],
            )
            .await
            .map_err(|e| ImportKitError::Storage(e.to_string()))?;
        let revision = match rows.next().await {
            Ok(Some(row)) => row
                .get::<u32>(0)
                .map_err(|e| ImportKitError::Storage(e.to_string()))?,
            Ok(None) => {
                return Err(ImportKitError::Storage(format!(
                    "element {element_id} vanished during commit"
                )));
            }
            Err(e) => return Err(ImportKitError::Storage(e.to_string())),
        };
        drop(rows);

        tx.commit()
            .await
            .map_err(|e| ImportKitError::Storage(e.to_string()))?;

        Ok(CommitOutcome::Written { revision })
    }

    /// Hash of the element's stored target, if any.
    async fn current_hash(&self, element_id: &ElementId) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT target_hash FROM element_state WHERE element_id = ?1",
                params![element_id.0.as_str()],
            )
            .await
            .map_err(|e| ImportKitError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row.get::<String>(0)
                    .map_err(|e| ImportKitError::Storage(e.to_string()))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(ImportKitError::Storage(e.to_string())),
        }
    }

    /// The latest committed target of an element.
    pub async fn get_element_state(&self, element_id: &ElementId) -> Result<Option<StoredTarget>> {
        let mut rows = self
            .conn
            .query(
                "SELECT element_id, target_json, target_hash, revision, updated_at
                 FROM element_state WHERE element_id = ?1",
                params![element_id.0.as_str()],
            )
            .await
            .map_err(|e| ImportKitError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_stored_target(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(ImportKitError::Storage(e.to_string())),
        }
    }

    /// Revision history of an element, oldest first.
    pub async fn list_revisions(&self, element_id: &ElementId) -> Result<Vec<Revision>> {
        let rows = self
            .conn
            .query(
                "SELECT revision, target_hash, saved_at FROM element_revisions
                 WHERE element_id = ?1 ORDER BY revision",
                params![element_id.0.as_str()],
            )
            .await
            .map_err(|e| ImportKitError::Storage(e.to_string()))?;

        collect_rows(rows, row_to_revision).await
    }

    // -----------------------------------------------------------------------
    // Run audit
    // -----------------------------------------------------------------------

    /// Record the start of a run.
    pub async fn insert_run(&self, run_id: &str, mapping_name: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO import_runs (id, mapping_name, started_at) VALUES (?1, ?2, ?3)",
                params![run_id, mapping_name, now.as_str()],
            )
            .await
            .map_err(|e| ImportKitError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Mark a run finished and attach its serialized report.
    pub async fn finish_run(&self, run_id: &str, report_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE import_runs SET finished_at = ?1, report_json = ?2 WHERE id = ?3",
                params![now.as_str(), report_json, run_id],
            )
            .await
            .map_err(|e| ImportKitError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a run's audit record by ID.
    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, mapping_name, started_at, finished_at, report_json
                 FROM import_runs WHERE id = ?1",
                params![run_id],
            )
            .await
            .map_err(|e| ImportKitError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_run_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(ImportKitError::Storage(e.to_string())),
        }
    }

    /// All recorded runs, newest first.
    pub async fn list_runs(&self) -> Result<Vec<RunRecord>> {
        let rows = self
            .conn
            .query(
                "SELECT id, mapping_name, started_at, finished_at, report_json
                 FROM import_runs ORDER BY started_at DESC, id DESC",
                params![],
            )
            .await
            .map_err(|e| ImportKitError::Storage(e.to_string()))?;

        collect_rows(rows, row_to_run_record).await
    }
}

#[async_trait]
impl Persister for Storage {
    async fn save(
        &self,
        element: &ElementId,
        target: &Target,
    ) -> std::result::Result<(), PersistError> {
        self.commit_target(element, target)
            .await
            .map(|_| ())
            .map_err(|e| PersistError::new(element.clone(), e.to_string()))
    }
}

/// Hex SHA-256 of a serialized target.
fn hash_json(json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Drain a result set, failing on the first row that cannot be read.
async fn collect_rows<T>(
    mut rows: libsql::Rows,
    mut convert: impl FnMut(&libsql::Row) -> Result<T>,
) -> Result<Vec<T>> {
    let mut results = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| ImportKitError::Storage(e.to_string()))?
    {
        results.push(convert(&row)?);
    }
    Ok(results)
}

fn row_to_revision(row: &libsql::Row) -> Result<Revision> {
    Ok(Revision {
        revision: row
            .get::<u32>(0)
            .map_err(|e| ImportKitError::Storage(e.to_string()))?,
        target_hash: row
            .get::<String>(1)
            .map_err(|e| ImportKitError::Storage(e.to_string()))?,
        saved_at: parse_timestamp(
            &row.get::<String>(2)
                .map_err(|e| ImportKitError::Storage(e.to_string()))?,
        )?,
    })
}

fn row_to_run_record(row: &libsql::Row) -> Result<RunRecord> {
    let started_at: String = row
        .get(2)
        .map_err(|e| ImportKitError::Storage(e.to_string()))?;
    let finished_at = match row.get::<String>(3).ok() {
        Some(s) => Some(parse_timestamp(&s)?),
        None => None,
    };
    Ok(RunRecord {
        id: row
            .get::<String>(0)
            .map_err(|e| ImportKitError::Storage(e.to_string()))?,
        mapping_name: row
            .get::<String>(1)
            .map_err(|e| ImportKitError::Storage(e.to_string()))?,
        started_at: parse_timestamp(&started_at)?,
        finished_at,
        report_json: row.get::<String>(4).ok(),
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ImportKitError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row to a [`StoredTarget`].
fn row_to_stored_target(row: &libsql::Row) -> Result<StoredTarget> {
    let target_json: String = row
        .get(1)
        .map_err(|e| ImportKitError::Storage(e.to_string()))?;
    Ok(StoredTarget {
        element_id: ElementId(
            row.get::<String>(0)
                .map_err(|e| ImportKitError::Storage(e.to_string()))?,
        ),
        target: serde_json::from_str(&target_json)
            .map_err(|e| ImportKitError::Storage(format!("corrupt target json: {e}")))?,
        target_hash: row
            .get::<String>(2)
            .map_err(|e| ImportKitError::Storage(e.to_string()))?,
        revision: row
            .get::<u32>(3)
            .map_err(|e| ImportKitError::Storage(e.to_string()))?,
        updated_at: parse_timestamp(
            &row.get::<String>(4)
                .map_err(|e| ImportKitError::Storage(e.to_string()))?,
        )?,
    })
}
