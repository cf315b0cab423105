use anyhow::{anyhow, bail, Context, Result};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection};
use std::path::PathBuf;

use crate::models::{
    Application, ApplicationEmail, ApplicationStatus, CloseReason, EmailType, FetchedEmail,
};

impl FromSql for ApplicationStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        ApplicationStatus::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

impl ToSql for ApplicationStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for CloseReason {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        CloseReason::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

impl ToSql for CloseReason {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for EmailType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        EmailType::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

impl ToSql for EmailType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open() -> Result<Self> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn, path })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn default_path() -> Result<PathBuf> {
        // XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "pursuit") {
            Ok(proj_dirs.data_dir().join("pursuit.db"))
        } else {
            Ok(PathBuf::from("pursuit.db"))
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company TEXT NOT NULL,
                role TEXT NOT NULL,
                location TEXT,
                status TEXT NOT NULL DEFAULT 'saved'
                    CHECK (status IN ('saved', 'applied', 'interviewing', 'offer', 'closed')),
                close_reason TEXT
                    CHECK (close_reason IN ('rejected', 'withdrawn', 'ghosted', 'accepted')),
                job_url TEXT,
                source_email_id TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                CHECK ((status = 'closed') = (close_reason IS NOT NULL))
            );

            CREATE TABLE IF NOT EXISTS application_emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id INTEGER NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
                gmail_message_id TEXT NOT NULL,
                sender TEXT,
                subject TEXT,
                date TEXT,
                snippet TEXT,
                email_type TEXT,
                UNIQUE (application_id, gmail_message_id)
            );

            CREATE TABLE IF NOT EXISTS sync_log (
                email_id TEXT PRIMARY KEY,
                processed_at TEXT NOT NULL DEFAULT (datetime('now')),
                result TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_applications_status ON applications(status);
            CREATE INDEX IF NOT EXISTS idx_applications_url ON applications(job_url);
            CREATE INDEX IF NOT EXISTS idx_emails_application ON application_emails(application_id);
            CREATE INDEX IF NOT EXISTS idx_emails_message ON application_emails(gmail_message_id);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='applications'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!(
                "Database not initialized. Run 'pursuit init' first."
            ));
        }
        Ok(())
    }

    // --- Application operations ---

    pub fn create_application(&self, new: &NewApplication) -> Result<i64> {
        if (new.status == ApplicationStatus::Closed) != new.close_reason.is_some() {
            bail!("close_reason must be set exactly when status is closed");
        }
        self.conn.execute(
            "INSERT INTO applications (company, role, location, status, close_reason, job_url, source_email_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.company,
                new.role,
                new.location,
                new.status,
                new.close_reason,
                new.job_url,
                new.source_email_id,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn find_by_url(&self, url: &str) -> Result<Option<Application>> {
        let result = self.conn.query_row(
            &format!("{} WHERE job_url = ?1 ORDER BY id LIMIT 1", SELECT_APPLICATION),
            [url],
            Self::row_to_application,
        );
        match result {
            Ok(app) => Ok(Some(app)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_by_company_role(&self, company: &str, role: &str) -> Result<Option<Application>> {
        let result = self.conn.query_row(
            &format!(
                "{} WHERE LOWER(company) = LOWER(?1) AND LOWER(role) = LOWER(?2)
                 ORDER BY id LIMIT 1",
                SELECT_APPLICATION
            ),
            [company, role],
            Self::row_to_application,
        );
        match result {
            Ok(app) => Ok(Some(app)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_application(&self, id: i64) -> Result<Option<Application>> {
        let result = self.conn.query_row(
            &format!("{} WHERE id = ?1", SELECT_APPLICATION),
            [id],
            Self::row_to_application,
        );
        match result {
            Ok(app) => Ok(Some(app)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_applications(
        &self,
        status: Option<ApplicationStatus>,
        company: Option<&str>,
    ) -> Result<Vec<Application>> {
        let mut sql = format!("{} WHERE 1=1", SELECT_APPLICATION);
        let mut params: Vec<String> = vec![];

        if let Some(s) = status {
            sql.push_str(&format!(" AND status = ?{}", params.len() + 1));
            params.push(s.as_str().to_string());
        }

        if let Some(c) = company {
            sql.push_str(&format!(
                " AND LOWER(company) LIKE '%' || LOWER(?{}) || '%'",
                params.len() + 1
            ));
            params.push(c.to_string());
        }

        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match params.len() {
            0 => stmt.query_map([], Self::row_to_application)?,
            1 => stmt.query_map([&params[0]], Self::row_to_application)?,
            2 => stmt.query_map([&params[0], &params[1]], Self::row_to_application)?,
            _ => return Err(anyhow!("Too many parameters")),
        };

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list applications")
    }

    /// Status write with the close-reason invariant enforced: a reason is
    /// required exactly when closing, and cleared on any other status.
    pub fn update_status(
        &self,
        id: i64,
        status: ApplicationStatus,
        close_reason: Option<CloseReason>,
    ) -> Result<()> {
        if status == ApplicationStatus::Closed && close_reason.is_none() {
            bail!("closing an application requires a close reason");
        }
        let close_reason = if status == ApplicationStatus::Closed {
            close_reason
        } else {
            None
        };
        let changed = self.conn.execute(
            "UPDATE applications SET status = ?1, close_reason = ?2, updated_at = datetime('now')
             WHERE id = ?3",
            params![status, close_reason, id],
        )?;
        if changed == 0 {
            bail!("no application with id {}", id);
        }
        Ok(())
    }

    pub fn delete_application(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM applications WHERE id = ?1", [id])?;
        Ok(())
    }

    fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<Application> {
        Ok(Application {
            id: row.get(0)?,
            company: row.get(1)?,
            role: row.get(2)?,
            location: row.get(3)?,
            status: row.get(4)?,
            close_reason: row.get(5)?,
            job_url: row.get(6)?,
            source_email_id: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    #[cfg(test)]
    pub fn set_created_at(&self, id: i64, created_at: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE applications SET created_at = ?1 WHERE id = ?2",
            params![created_at, id],
        )?;
        Ok(())
    }

    // --- Email link operations ---

    /// Upsert keyed by (application_id, gmail_message_id): linking the same
    /// message to the same application twice refreshes the metadata instead
    /// of inserting a second row.
    pub fn link_email(
        &self,
        application_id: i64,
        email: &FetchedEmail,
        email_type: EmailType,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO application_emails
                 (application_id, gmail_message_id, sender, subject, date, snippet, email_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (application_id, gmail_message_id) DO UPDATE SET
                 sender = excluded.sender,
                 subject = excluded.subject,
                 date = excluded.date,
                 snippet = excluded.snippet,
                 email_type = excluded.email_type",
            params![
                application_id,
                email.id,
                email.sender,
                email.subject,
                email.date.map(|d| d.to_rfc3339()),
                email.snippet,
                email_type,
            ],
        )?;
        Ok(())
    }

    /// Move one link row to another application. If the target already has
    /// this message linked, the source row is deleted instead of moved.
    pub fn relink_email(&self, link_id: i64, new_application_id: i64) -> Result<()> {
        let link = self
            .get_email_link(link_id)?
            .ok_or_else(|| anyhow!("no email link with id {}", link_id))?;

        let already_there: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM application_emails
             WHERE application_id = ?1 AND gmail_message_id = ?2",
            params![new_application_id, link.gmail_message_id],
            |row| row.get(0),
        )?;

        if already_there > 0 {
            self.conn
                .execute("DELETE FROM application_emails WHERE id = ?1", [link_id])?;
        } else {
            self.conn.execute(
                "UPDATE application_emails SET application_id = ?1 WHERE id = ?2",
                params![new_application_id, link_id],
            )?;
        }
        Ok(())
    }

    pub fn get_email_link(&self, link_id: i64) -> Result<Option<ApplicationEmail>> {
        let result = self.conn.query_row(
            &format!("{} WHERE id = ?1", SELECT_EMAIL_LINK),
            [link_id],
            Self::row_to_email_link,
        );
        match result {
            Ok(link) => Ok(Some(link)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn emails_for_application(&self, application_id: i64) -> Result<Vec<ApplicationEmail>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE application_id = ?1 ORDER BY date, id",
            SELECT_EMAIL_LINK
        ))?;
        let rows = stmt.query_map([application_id], Self::row_to_email_link)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list application emails")
    }

    pub fn links_for_message(&self, gmail_message_id: &str) -> Result<Vec<ApplicationEmail>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE gmail_message_id = ?1 ORDER BY id",
            SELECT_EMAIL_LINK
        ))?;
        let rows = stmt.query_map([gmail_message_id], Self::row_to_email_link)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list links for message")
    }

    /// Message IDs linked to more than one application. These are the
    /// mis-filings the repair tooling re-resolves.
    pub fn multi_linked_messages(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT gmail_message_id FROM application_emails
             GROUP BY gmail_message_id
             HAVING COUNT(DISTINCT application_id) > 1
             ORDER BY gmail_message_id",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to find multi-linked messages")
    }

    /// Merge all email links from one application into another, dropping
    /// links the target already has.
    pub fn move_links(&self, from_application: i64, to_application: i64) -> Result<usize> {
        self.conn.execute(
            "DELETE FROM application_emails
             WHERE application_id = ?1 AND gmail_message_id IN (
                 SELECT gmail_message_id FROM application_emails WHERE application_id = ?2
             )",
            params![from_application, to_application],
        )?;
        let moved = self.conn.execute(
            "UPDATE application_emails SET application_id = ?1 WHERE application_id = ?2",
            params![to_application, from_application],
        )?;
        Ok(moved)
    }

    fn row_to_email_link(row: &rusqlite::Row) -> rusqlite::Result<ApplicationEmail> {
        Ok(ApplicationEmail {
            id: row.get(0)?,
            application_id: row.get(1)?,
            gmail_message_id: row.get(2)?,
            sender: row.get(3)?,
            subject: row.get(4)?,
            date: row.get(5)?,
            snippet: row.get(6)?,
            email_type: row.get(7)?,
        })
    }

    // --- Sync ledger operations ---

    pub fn is_processed(&self, email_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_log WHERE email_id = ?1",
            [email_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn mark_processed(&self, email_id: &str, result: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_log (email_id, result) VALUES (?1, ?2)
             ON CONFLICT (email_id) DO UPDATE SET
                 result = excluded.result,
                 processed_at = datetime('now')",
            params![email_id, result],
        )?;
        Ok(())
    }

    /// Administrative reset: forget these messages so the next sync
    /// reprocesses them.
    pub fn reset_for(&self, email_ids: &[String]) -> Result<usize> {
        if email_ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; email_ids.len()].join(", ");
        let deleted = self.conn.execute(
            &format!("DELETE FROM sync_log WHERE email_id IN ({})", placeholders),
            params_from_iter(email_ids.iter()),
        )?;
        Ok(deleted)
    }

    /// Forget every processed message.
    pub fn reset_all_sync(&self) -> Result<usize> {
        let deleted = self.conn.execute("DELETE FROM sync_log", [])?;
        Ok(deleted)
    }
}

const SELECT_APPLICATION: &str = "SELECT id, company, role, location, status, close_reason,
        job_url, source_email_id, created_at, updated_at
 FROM applications";

const SELECT_EMAIL_LINK: &str = "SELECT id, application_id, gmail_message_id, sender, subject,
        date, snippet, email_type
 FROM application_emails";

/// Insert payload for a new tracked application.
#[derive(Debug, Default)]
pub struct NewApplication<'a> {
    pub company: &'a str,
    pub role: &'a str,
    pub location: Option<&'a str>,
    pub status: ApplicationStatus,
    pub close_reason: Option<CloseReason>,
    pub job_url: Option<&'a str>,
    pub source_email_id: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db
    }

    fn email(id: &str, subject: &str) -> FetchedEmail {
        FetchedEmail {
            id: id.to_string(),
            subject: subject.to_string(),
            sender: "jobs@acme.example".to_string(),
            date: Some(Utc.with_ymd_and_hms(2025, 1, 14, 8, 30, 0).unwrap()),
            snippet: "snippet".to_string(),
            body: "body".to_string(),
        }
    }

    #[test]
    fn test_create_and_find_by_url() {
        let db = test_db();
        let id = db
            .create_application(&NewApplication {
                company: "Acme",
                role: "Senior Engineer",
                job_url: Some("https://jobs.acme.example/123"),
                status: ApplicationStatus::Applied,
                ..Default::default()
            })
            .unwrap();

        let found = db.find_by_url("https://jobs.acme.example/123").unwrap();
        assert_eq!(found.unwrap().id, id);
        assert!(db.find_by_url("https://other.example").unwrap().is_none());
    }

    #[test]
    fn test_find_by_company_role_is_case_insensitive() {
        let db = test_db();
        let id = db
            .create_application(&NewApplication {
                company: "Acme",
                role: "Senior Engineer",
                status: ApplicationStatus::Applied,
                ..Default::default()
            })
            .unwrap();

        let found = db.find_by_company_role("ACME", "senior engineer").unwrap();
        assert_eq!(found.unwrap().id, id);
        assert!(db
            .find_by_company_role("Acme", "Staff Engineer")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_create_closed_requires_reason() {
        let db = test_db();
        let err = db.create_application(&NewApplication {
            company: "Acme",
            role: "Senior Engineer",
            status: ApplicationStatus::Closed,
            ..Default::default()
        });
        assert!(err.is_err());

        let ok = db.create_application(&NewApplication {
            company: "Acme",
            role: "Senior Engineer",
            status: ApplicationStatus::Closed,
            close_reason: Some(CloseReason::Rejected),
            ..Default::default()
        });
        assert!(ok.is_ok());
    }

    #[test]
    fn test_update_status_enforces_close_reason_invariant() {
        let db = test_db();
        let id = db
            .create_application(&NewApplication {
                company: "Acme",
                role: "Senior Engineer",
                status: ApplicationStatus::Applied,
                ..Default::default()
            })
            .unwrap();

        // Closing without a reason is rejected.
        assert!(db.update_status(id, ApplicationStatus::Closed, None).is_err());

        db.update_status(id, ApplicationStatus::Closed, Some(CloseReason::Rejected))
            .unwrap();
        let app = db.get_application(id).unwrap().unwrap();
        assert_eq!(app.status, ApplicationStatus::Closed);
        assert_eq!(app.close_reason, Some(CloseReason::Rejected));

        // Manual reopen clears the reason.
        db.update_status(id, ApplicationStatus::Applied, None).unwrap();
        let app = db.get_application(id).unwrap().unwrap();
        assert_eq!(app.status, ApplicationStatus::Applied);
        assert_eq!(app.close_reason, None);
    }

    #[test]
    fn test_update_status_unknown_id_errors() {
        let db = test_db();
        assert!(db
            .update_status(999, ApplicationStatus::Applied, None)
            .is_err());
    }

    #[test]
    fn test_link_email_upsert_does_not_duplicate() {
        let db = test_db();
        let id = db
            .create_application(&NewApplication {
                company: "Acme",
                role: "Senior Engineer",
                status: ApplicationStatus::Applied,
                ..Default::default()
            })
            .unwrap();

        db.link_email(id, &email("m1", "first"), EmailType::Application)
            .unwrap();
        db.link_email(id, &email("m1", "updated subject"), EmailType::Application)
            .unwrap();

        let links = db.emails_for_application(id).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].subject.as_deref(), Some("updated subject"));
    }

    #[test]
    fn test_relink_email_moves_and_deduplicates() {
        let db = test_db();
        let a = db
            .create_application(&NewApplication {
                company: "Acme",
                role: "Senior Engineer",
                status: ApplicationStatus::Applied,
                ..Default::default()
            })
            .unwrap();
        let b = db
            .create_application(&NewApplication {
                company: "Acme",
                role: "Staff Engineer",
                status: ApplicationStatus::Applied,
                ..Default::default()
            })
            .unwrap();

        db.link_email(a, &email("m1", "subject"), EmailType::Rejection)
            .unwrap();
        let link_id = db.links_for_message("m1").unwrap()[0].id;

        db.relink_email(link_id, b).unwrap();
        assert!(db.emails_for_application(a).unwrap().is_empty());
        assert_eq!(db.emails_for_application(b).unwrap().len(), 1);

        // Relinking onto an application that already holds the message
        // deletes the stray row instead of violating the unique key.
        db.link_email(a, &email("m1", "subject"), EmailType::Rejection)
            .unwrap();
        let stray = db
            .links_for_message("m1")
            .unwrap()
            .into_iter()
            .find(|l| l.application_id == a)
            .unwrap();
        db.relink_email(stray.id, b).unwrap();
        assert_eq!(db.links_for_message("m1").unwrap().len(), 1);
    }

    #[test]
    fn test_multi_linked_messages_detects_conflicts() {
        let db = test_db();
        let a = db
            .create_application(&NewApplication {
                company: "Acme",
                role: "Senior Engineer",
                status: ApplicationStatus::Applied,
                ..Default::default()
            })
            .unwrap();
        let b = db
            .create_application(&NewApplication {
                company: "Acme",
                role: "Staff Engineer",
                status: ApplicationStatus::Applied,
                ..Default::default()
            })
            .unwrap();

        db.link_email(a, &email("m1", "s"), EmailType::Rejection).unwrap();
        assert!(db.multi_linked_messages().unwrap().is_empty());

        db.link_email(b, &email("m1", "s"), EmailType::Rejection).unwrap();
        assert_eq!(db.multi_linked_messages().unwrap(), vec!["m1".to_string()]);
    }

    #[test]
    fn test_move_links_merges_without_conflict() {
        let db = test_db();
        let a = db
            .create_application(&NewApplication {
                company: "Acme",
                role: "Senior Engineer",
                status: ApplicationStatus::Applied,
                ..Default::default()
            })
            .unwrap();
        let b = db
            .create_application(&NewApplication {
                company: "Acme",
                role: "Senior Engineer",
                status: ApplicationStatus::Applied,
                ..Default::default()
            })
            .unwrap();

        db.link_email(a, &email("m1", "s"), EmailType::Application).unwrap();
        db.link_email(b, &email("m1", "s"), EmailType::Application).unwrap();
        db.link_email(b, &email("m2", "s"), EmailType::Interview).unwrap();

        db.move_links(b, a).unwrap();
        db.delete_application(b).unwrap();

        let links = db.emails_for_application(a).unwrap();
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn test_ledger_mark_and_reset() {
        let db = test_db();
        assert!(!db.is_processed("m1").unwrap());

        db.mark_processed("m1", "created").unwrap();
        assert!(db.is_processed("m1").unwrap());

        // Marking again is an update, not an error.
        db.mark_processed("m1", "linked").unwrap();

        let removed = db.reset_for(&["m1".to_string(), "m2".to_string()]).unwrap();
        assert_eq!(removed, 1);
        assert!(!db.is_processed("m1").unwrap());

        assert_eq!(db.reset_for(&[]).unwrap(), 0);

        db.mark_processed("m1", "created").unwrap();
        db.mark_processed("m2", "skipped:degenerate").unwrap();
        assert_eq!(db.reset_all_sync().unwrap(), 2);
        assert!(!db.is_processed("m2").unwrap());
    }

    #[test]
    fn test_list_applications_filters() {
        let db = test_db();
        db.create_application(&NewApplication {
            company: "Acme",
            role: "Senior Engineer",
            status: ApplicationStatus::Applied,
            ..Default::default()
        })
        .unwrap();
        db.create_application(&NewApplication {
            company: "Globex",
            role: "Backend Developer",
            status: ApplicationStatus::Interviewing,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(db.list_applications(None, None).unwrap().len(), 2);
        assert_eq!(
            db.list_applications(Some(ApplicationStatus::Applied), None)
                .unwrap()
                .len(),
            1
        );
        assert_eq!(db.list_applications(None, Some("glo")).unwrap().len(), 1);
        assert_eq!(
            db.list_applications(Some(ApplicationStatus::Offer), None)
                .unwrap()
                .len(),
            0
        );
    }

    #[test]
    fn test_delete_application_cascades_links() {
        let db = test_db();
        let id = db
            .create_application(&NewApplication {
                company: "Acme",
                role: "Senior Engineer",
                status: ApplicationStatus::Applied,
                ..Default::default()
            })
            .unwrap();
        db.link_email(id, &email("m1", "s"), EmailType::Application).unwrap();

        db.delete_application(id).unwrap();
        assert!(db.links_for_message("m1").unwrap().is_empty());
    }
}
