use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::sync::{Mutex, MutexGuard};

use crate::domain::applicant::{Applicant, ApplicantId, NewApplicant};
use crate::store::repo::ApplicantRepository;

pub struct SqliteRepo {
    conn: Mutex<Connection>,
}

impl SqliteRepo {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.migrate()?;
        Ok(repo)
    }

    pub fn open_in_memory() -> Result<Self> {
        let repo = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        repo.migrate()?;
        Ok(repo)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("applicant database lock poisoned"))
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS applicants (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                name          TEXT NOT NULL,
                email         TEXT NOT NULL,
                cover_letter  TEXT NOT NULL,
                resume_path   TEXT NOT NULL,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

fn row_to_applicant(r: &Row<'_>) -> rusqlite::Result<Applicant> {
    Ok(Applicant {
        id: r.get(0)?,
        name: r.get(1)?,
        email: r.get(2)?,
        cover_letter: r.get(3)?,
        resume_path: r.get(4)?,
        created_at: r.get::<_, DateTime<Utc>>(5)?,
        updated_at: r.get::<_, DateTime<Utc>>(6)?,
    })
}

impl ApplicantRepository for SqliteRepo {
    fn create(&self, a: &NewApplicant) -> Result<Applicant> {
        let now = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO applicants (name, email, cover_letter, resume_path, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
            params![a.name, a.email, a.cover_letter, a.resume_path, now],
        )?;
        let id = conn.last_insert_rowid();

        Ok(Applicant {
            id,
            name: a.name.clone(),
            email: a.email.clone(),
            cover_letter: a.cover_letter.clone(),
            resume_path: a.resume_path.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    fn get(&self, id: ApplicantId) -> Result<Option<Applicant>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, name, email, cover_letter, resume_path, created_at, updated_at
            FROM applicants WHERE id=?1
            "#,
        )?;
        Ok(stmt.query_row(params![id], row_to_applicant).optional()?)
    }

    fn count(&self) -> Result<u64> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM applicants", [], |r| r.get(0))?;
        Ok(n as u64)
    }
}
