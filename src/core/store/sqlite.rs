use async_trait::async_trait;
use chrono::SecondsFormat;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{FavoriteStore, JobMutator, JobStore, validate_successor};
use crate::core::error::JobError;
use crate::core::types::{Favorite, FavoritePage, Job, JobPage, JobQuery, NewJob};
use crate::platform::{NativePlatform, Platform};

const MAX_CAS_ATTEMPTS: usize = 8;

/// SQLite-backed store. Updates are compare-and-swap on a `version` column,
/// so several processes can share one database file.
pub struct SqliteJobStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    pub async fn open(path: &Path) -> Result<Self, JobError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
            NativePlatform::restrict_dir_permissions(parent);
        }
        let db = Connection::open(path)?;
        NativePlatform::restrict_file_permissions(path);
        Self::init(db)
    }

    pub fn open_in_memory() -> Result<Self, JobError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self, JobError> {
        db.busy_timeout(Duration::from_secs(5))?;
        db.execute(
            "CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                job_json TEXT NOT NULL
            )",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_jobs_user_created ON jobs (user_id, created_at DESC)",
            [],
        )?;
        db.execute(
            "CREATE TABLE IF NOT EXISTS favorites (
                user_id TEXT NOT NULL,
                job_id TEXT NOT NULL,
                image_index INTEGER NOT NULL,
                image_url TEXT NOT NULL,
                prompt TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (user_id, job_id, image_index)
            )",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_favorites_user ON favorites (user_id)",
            [],
        )?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn read_row(db: &Connection, id: &str) -> Result<Option<(i64, Job)>, JobError> {
        let row = db
            .query_row(
                "SELECT version, job_json FROM jobs WHERE id = ?1",
                params![id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        match row {
            Some((version, json)) => Ok(Some((version, serde_json::from_str(&json)?))),
            None => Ok(None),
        }
    }
}

fn timestamp_key(job: &Job) -> String {
    rfc3339(&job.created_at)
}

fn rfc3339(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn favorite_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Favorite> {
    let created_at: String = row.get(5)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);
    Ok(Favorite {
        user_id: row.get(0)?,
        job_id: row.get(1)?,
        image_index: row.get(2)?,
        image_url: row.get(3)?,
        prompt: row.get(4)?,
        created_at,
    })
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, new: NewJob) -> Result<Job, JobError> {
        let job = Job::queued(new);
        let json = serde_json::to_string(&job)?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO jobs (id, user_id, status, created_at, version, job_json) VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![job.id, job.user_id, job.status.as_str(), timestamp_key(&job), json],
        )?;
        Ok(job)
    }

    async fn get(&self, id: &str) -> Result<Job, JobError> {
        let db = self.db.lock().await;
        Self::read_row(&db, id)?
            .map(|(_, job)| job)
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    async fn update(&self, id: &str, mutator: JobMutator<'_>) -> Result<Job, JobError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let db = self.db.lock().await;
            let (version, current) =
                Self::read_row(&db, id)?.ok_or_else(|| JobError::NotFound(id.to_string()))?;
            let next = mutator(current.clone())?;
            validate_successor(&current, &next)?;
            if next == current {
                return Ok(next);
            }
            let changed = db.execute(
                "UPDATE jobs SET status = ?1, job_json = ?2, version = version + 1 WHERE id = ?3 AND version = ?4",
                params![next.status.as_str(), serde_json::to_string(&next)?, id, version],
            )?;
            if changed == 1 {
                return Ok(next);
            }
            drop(db);
            debug!("Job {} changed during update, retrying (attempt {})", id, attempt);
            tokio::task::yield_now().await;
        }
        warn!("Giving up on job {} after {} conflicting writes", id, MAX_CAS_ATTEMPTS);
        Err(JobError::Contended(id.to_string()))
    }

    async fn list(&self, query: &JobQuery) -> Result<JobPage, JobError> {
        let db = self.db.lock().await;
        let status = query.status.map(|s| s.as_str());
        let total: i64 = db.query_row(
            "SELECT COUNT(*) FROM jobs WHERE (?1 IS NULL OR user_id = ?1) AND (?2 IS NULL OR status = ?2)",
            params![query.user_id, status],
            |row| row.get(0),
        )?;
        let total = usize::try_from(total).unwrap_or(0);
        let (Ok(limit), Ok(offset)) = (i64::try_from(query.limit), i64::try_from(query.offset))
        else {
            return Ok(JobPage {
                jobs: Vec::new(),
                total,
            });
        };
        let mut stmt = db.prepare(
            "SELECT job_json FROM jobs
             WHERE (?1 IS NULL OR user_id = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3 OFFSET ?4",
        )?;
        let rows = stmt.query_map(
            params![query.user_id, status, limit, offset],
            |row| row.get::<_, String>(0),
        )?;
        let mut jobs = Vec::new();
        for json in rows {
            jobs.push(serde_json::from_str(&json?)?);
        }
        Ok(JobPage { jobs, total })
    }

    async fn delete(&self, id: &str) -> Result<(), JobError> {
        let db = self.db.lock().await;
        let removed = db.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(JobError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FavoriteStore for SqliteJobStore {
    async fn add_favorite(&self, favorite: Favorite) -> Result<Favorite, JobError> {
        let db = self.db.lock().await;
        let inserted = db.execute(
            "INSERT INTO favorites (user_id, job_id, image_index, image_url, prompt, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                favorite.user_id,
                favorite.job_id,
                favorite.image_index,
                favorite.image_url,
                favorite.prompt,
                rfc3339(&favorite.created_at)
            ],
        );
        match inserted {
            Ok(_) => Ok(favorite),
            Err(e) if is_unique_violation(&e) => Err(JobError::FavoriteExists {
                job_id: favorite.job_id,
                image_index: favorite.image_index,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_favorites(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<FavoritePage, JobError> {
        let db = self.db.lock().await;
        let total: i64 = db.query_row(
            "SELECT COUNT(*) FROM favorites WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        let total = usize::try_from(total).unwrap_or(0);
        let (Ok(limit), Ok(offset)) = (i64::try_from(limit), i64::try_from(offset)) else {
            return Ok(FavoritePage {
                favorites: Vec::new(),
                total,
            });
        };
        let mut stmt = db.prepare(
            "SELECT user_id, job_id, image_index, image_url, prompt, created_at FROM favorites
             WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![user_id, limit, offset], favorite_from_row)?;
        let mut favorites = Vec::new();
        for favorite in rows {
            favorites.push(favorite?);
        }
        Ok(FavoritePage { favorites, total })
    }

    async fn remove_favorite(
        &self,
        user_id: &str,
        job_id: &str,
        image_index: u32,
    ) -> Result<bool, JobError> {
        let db = self.db.lock().await;
        let removed = db.execute(
            "DELETE FROM favorites WHERE user_id = ?1 AND job_id = ?2 AND image_index = ?3",
            params![user_id, job_id, image_index],
        )?;
        Ok(removed > 0)
    }

    async fn remove_job_favorites(&self, job_id: &str) -> Result<usize, JobError> {
        let db = self.db.lock().await;
        Ok(db.execute("DELETE FROM favorites WHERE job_id = ?1", params![job_id])?)
    }
}
