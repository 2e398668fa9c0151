use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

use crate::errors::{AppError, AppResult};
use crate::models::{User, Worksheet, WorksheetRequest, WorksheetStatus};

pub type SqlitePool = Pool<Sqlite>;

/// Schema for the two tables. Worksheets are removed with their owner.
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    full_name TEXT NULL,
    hashed_password TEXT NOT NULL,
    disabled INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS worksheets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    subject TEXT NOT NULL,
    difficulty TEXT NOT NULL,
    num_problems INTEGER NOT NULL,
    additional_info TEXT NULL,
    file_path TEXT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL, -- RFC3339
    completed_at TEXT NULL -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_worksheets_user_id ON worksheets(user_id);
"#;

const WORKSHEET_COLUMNS: &str = "id, user_id, subject, difficulty, num_problems, additional_info, \
     file_path, status, created_at, completed_at";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the SQLite database and applies the schema.
    pub async fn connect(url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> AppResult<()> {
        // sqlx::query runs one statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn create_user(
        &self,
        username: &str,
        full_name: Option<&str>,
        hashed_password: &str,
    ) -> AppResult<User> {
        let result = sqlx::query(
            "INSERT INTO users (username, full_name, hashed_password, disabled) VALUES (?, ?, ?, 0)",
        )
        .bind(username)
        .bind(full_name)
        .bind(hashed_password)
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(r) => r,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(AppError::UsernameTaken)
            }
            Err(e) => return Err(e.into()),
        };

        Ok(User {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            full_name: full_name.map(str::to_string),
            hashed_password: hashed_password.to_string(),
            disabled: false,
        })
    }

    pub async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, full_name, hashed_password, disabled FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Self::row_to_user).transpose()?)
    }

    pub async fn get_user_by_id(&self, id: i64) -> AppResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, full_name, hashed_password, disabled FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Self::row_to_user).transpose()?)
    }

    pub async fn set_user_disabled(&self, id: i64, disabled: bool) -> AppResult<()> {
        sqlx::query("UPDATE users SET disabled = ? WHERE id = ?")
            .bind(if disabled { 1 } else { 0 })
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes a user; its worksheets go with it through the foreign key.
    pub async fn delete_user(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn create_worksheet(
        &self,
        user_id: i64,
        request: &WorksheetRequest,
    ) -> AppResult<Worksheet> {
        let created_at = Utc::now();
        let additional_info =
            Some(request.additional_info.as_str()).filter(|info| !info.trim().is_empty());

        let result = sqlx::query(
            r#"
            INSERT INTO worksheets (
                user_id, subject, difficulty, num_problems, additional_info,
                file_path, status, created_at
            ) VALUES (?, ?, ?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&request.subject)
        .bind(&request.difficulty)
        .bind(request.num_problems as i64)
        .bind(additional_info)
        .bind(WorksheetStatus::Pending.as_str())
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Worksheet {
            id: result.last_insert_rowid(),
            user_id,
            subject: request.subject.clone(),
            difficulty: request.difficulty.clone(),
            num_problems: request.num_problems,
            additional_info: additional_info.map(str::to_string),
            file_path: None,
            status: WorksheetStatus::Pending,
            created_at,
            completed_at: None,
        })
    }

    pub async fn get_worksheet(&self, id: i64) -> AppResult<Option<Worksheet>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM worksheets WHERE id = ?",
            WORKSHEET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Self::row_to_worksheet).transpose()?)
    }

    /// Newest first.
    pub async fn list_worksheets_for_user(&self, user_id: i64) -> AppResult<Vec<Worksheet>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM worksheets WHERE user_id = ? ORDER BY created_at DESC, id DESC",
            WORKSHEET_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| Self::row_to_worksheet(row).map_err(AppError::from))
            .collect()
    }

    pub async fn set_worksheet_status(&self, id: i64, status: WorksheetStatus) -> AppResult<()> {
        sqlx::query("UPDATE worksheets SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records the generated file. Returns false if the row no longer exists.
    pub async fn complete_worksheet(&self, id: i64, file_path: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE worksheets SET file_path = ?, status = ?, completed_at = ? WHERE id = ?",
        )
        .bind(file_path)
        .bind(WorksheetStatus::Completed.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes one worksheet. `Some(file_path)` when a row was removed.
    pub async fn delete_worksheet(&self, id: i64) -> AppResult<Option<Option<String>>> {
        let mut tx = self.pool.begin().await?;
        let path: Option<(Option<String>,)> =
            sqlx::query_as("SELECT file_path FROM worksheets WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if path.is_some() {
            sqlx::query("DELETE FROM worksheets WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(path.map(|(p,)| p))
    }

    /// Deletes all of a user's worksheets and returns the files they referenced.
    pub async fn delete_worksheets_for_user(&self, user_id: i64) -> AppResult<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let paths: Vec<(Option<String>,)> =
            sqlx::query_as("SELECT file_path FROM worksheets WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(&mut *tx)
                .await?;
        sqlx::query("DELETE FROM worksheets WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(paths.into_iter().filter_map(|(p,)| p).collect())
    }

    fn row_to_user(row: SqliteRow) -> Result<User, sqlx::Error> {
        let disabled: i64 = row.try_get("disabled")?;
        Ok(User {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            full_name: row.try_get("full_name")?,
            hashed_password: row.try_get("hashed_password")?,
            disabled: disabled != 0,
        })
    }

    fn row_to_worksheet(row: SqliteRow) -> Result<Worksheet, sqlx::Error> {
        let num_problems: i64 = row.try_get("num_problems")?;
        let status_str: String = row.try_get("status")?;
        let created_str: String = row.try_get("created_at")?;
        let completed_str: Option<String> = row.try_get("completed_at")?;

        let status = status_str
            .parse::<WorksheetStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;
        let completed_at = completed_str.as_deref().map(parse_timestamp).transpose()?;

        Ok(Worksheet {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            subject: row.try_get("subject")?,
            difficulty: row.try_get("difficulty")?,
            num_problems: u32::try_from(num_problems)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            additional_info: row.try_get("additional_info")?,
            file_path: row.try_get("file_path")?,
            status,
            created_at: parse_timestamp(&created_str)?,
            completed_at,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn temp_db() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("test.sqlite").display());
        let db = Database::connect(&url).await.unwrap();
        (dir, db)
    }

    fn request(subject: &str) -> WorksheetRequest {
        WorksheetRequest {
            subject: subject.into(),
            difficulty: "easy".into(),
            num_problems: 3,
            additional_info: String::new(),
        }
    }

    #[tokio::test]
    async fn users_are_unique_by_username() {
        let (_dir, db) = temp_db().await;
        let user = db.create_user("ada", Some("Ada"), "hash").await.unwrap();
        assert!(user.id > 0);
        assert!(!user.disabled);

        let err = db.create_user("ada", None, "other").await.unwrap_err();
        assert!(matches!(err, AppError::UsernameTaken));

        let loaded = db.get_user_by_username("ada").await.unwrap().unwrap();
        assert_eq!(loaded, user);
        assert_eq!(db.get_user_by_id(user.id).await.unwrap(), Some(user));
        assert!(db.get_user_by_username("grace").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn disabled_flag_persists() {
        let (_dir, db) = temp_db().await;
        let user = db.create_user("ada", None, "hash").await.unwrap();
        db.set_user_disabled(user.id, true).await.unwrap();
        assert!(db.get_user_by_id(user.id).await.unwrap().unwrap().disabled);
    }

    #[tokio::test]
    async fn worksheet_starts_pending_and_completes_once() {
        let (_dir, db) = temp_db().await;
        let user = db.create_user("ada", None, "hash").await.unwrap();
        let sheet = db.create_worksheet(user.id, &request("Algebra")).await.unwrap();
        assert_eq!(sheet.status, WorksheetStatus::Pending);
        assert!(sheet.file_path.is_none());
        assert!(sheet.additional_info.is_none());

        db.set_worksheet_status(sheet.id, WorksheetStatus::Processing)
            .await
            .unwrap();
        assert!(db.complete_worksheet(sheet.id, "pdfs/worksheet_1.pdf").await.unwrap());

        let loaded = db.get_worksheet(sheet.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, WorksheetStatus::Completed);
        assert_eq!(loaded.file_path.as_deref(), Some("pdfs/worksheet_1.pdf"));
        assert!(loaded.completed_at.is_some());
        assert_eq!(loaded.created_at.timestamp(), sheet.created_at.timestamp());

        assert!(!db.complete_worksheet(9999, "nowhere.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn listing_is_scoped_to_owner_and_newest_first() {
        let (_dir, db) = temp_db().await;
        let ada = db.create_user("ada", None, "hash").await.unwrap();
        let grace = db.create_user("grace", None, "hash").await.unwrap();

        let first = db.create_worksheet(ada.id, &request("Algebra")).await.unwrap();
        let second = db.create_worksheet(ada.id, &request("Geometry")).await.unwrap();
        db.create_worksheet(grace.id, &request("Physics")).await.unwrap();

        let sheets = db.list_worksheets_for_user(ada.id).await.unwrap();
        let ids: Vec<i64> = sheets.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn bulk_delete_returns_file_paths() {
        let (_dir, db) = temp_db().await;
        let ada = db.create_user("ada", None, "hash").await.unwrap();
        let grace = db.create_user("grace", None, "hash").await.unwrap();

        let done = db.create_worksheet(ada.id, &request("Algebra")).await.unwrap();
        db.create_worksheet(ada.id, &request("Pending")).await.unwrap();
        db.complete_worksheet(done.id, "pdfs/a.pdf").await.unwrap();
        let other = db.create_worksheet(grace.id, &request("Physics")).await.unwrap();

        let paths = db.delete_worksheets_for_user(ada.id).await.unwrap();
        assert_eq!(paths, vec!["pdfs/a.pdf".to_string()]);
        assert!(db.list_worksheets_for_user(ada.id).await.unwrap().is_empty());
        assert!(db.get_worksheet(other.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn single_delete_reports_missing_rows() {
        let (_dir, db) = temp_db().await;
        let ada = db.create_user("ada", None, "hash").await.unwrap();
        let sheet = db.create_worksheet(ada.id, &request("Algebra")).await.unwrap();

        assert_eq!(db.delete_worksheet(sheet.id).await.unwrap(), Some(None));
        assert_eq!(db.delete_worksheet(sheet.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn deleting_user_cascades_to_worksheets() {
        let (_dir, db) = temp_db().await;
        let ada = db.create_user("ada", None, "hash").await.unwrap();
        let sheet = db.create_worksheet(ada.id, &request("Algebra")).await.unwrap();

        assert!(db.delete_user(ada.id).await.unwrap());
        assert!(db.get_worksheet(sheet.id).await.unwrap().is_none());
    }
}
