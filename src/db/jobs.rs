use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

/// Editable fields of a job application. Dates are kept as the client sends them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobFields {
    pub company: String,
    pub location: String,
    pub link: String,
    pub remote: bool,
    pub application: String,
    pub assessment: Vec<String>,
    pub interview: Vec<String>,
    pub rejection: String,
    pub notes: String,
}

/// A stored job application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    #[serde(flatten)]
    pub fields: JobFields,
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    company: String,
    location: String,
    link: String,
    remote: i32,
    application: String,
    assessment: String,
    interview: String,
    rejection: String,
    notes: String,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Self {
            id: row.id,
            fields: JobFields {
                company: row.company,
                location: row.location,
                link: row.link,
                remote: row.remote != 0,
                application: row.application,
                assessment: split_list(&row.assessment),
                interview: split_list(&row.interview),
                rejection: row.rejection,
                notes: row.notes,
            },
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn join_list(values: &[String]) -> String {
    values
        .iter()
        .filter(|s| !s.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

const JOB_COLUMNS: &str = "id, company, location, link, remote, application, assessment, interview, rejection, notes";

/// Job applications, always scoped to their owner.
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List a user's jobs, oldest first.
    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<Job>, sqlx::Error> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM jobs WHERE user_id = ? ORDER BY id",
            JOB_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Job::from).collect())
    }

    /// Get one of a user's jobs.
    pub async fn get(&self, user_id: i64, id: i64) -> Result<Option<Job>, sqlx::Error> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM jobs WHERE id = ? AND user_id = ?",
            JOB_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Job::from))
    }

    /// Create a job. Returns the stored record.
    pub async fn create(&self, user_id: i64, fields: &JobFields) -> Result<Job, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO jobs (user_id, company, location, link, remote, application, assessment, interview, rejection, notes)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&fields.company)
        .bind(&fields.location)
        .bind(&fields.link)
        .bind(fields.remote as i32)
        .bind(&fields.application)
        .bind(join_list(&fields.assessment))
        .bind(join_list(&fields.interview))
        .bind(&fields.rejection)
        .bind(&fields.notes)
        .execute(&self.pool)
        .await?;

        Ok(Job {
            id: result.last_insert_rowid(),
            fields: JobFields {
                assessment: split_list(&join_list(&fields.assessment)),
                interview: split_list(&join_list(&fields.interview)),
                ..fields.clone()
            },
        })
    }

    /// Replace a job's fields. Returns false if the user owns no such job.
    pub async fn update(
        &self,
        user_id: i64,
        id: i64,
        fields: &JobFields,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET company = ?, location = ?, link = ?, remote = ?, application = ?,
                assessment = ?, interview = ?, rejection = ?, notes = ?, updated_at = datetime('now')
             WHERE id = ? AND user_id = ?",
        )
        .bind(&fields.company)
        .bind(&fields.location)
        .bind(&fields.link)
        .bind(fields.remote as i32)
        .bind(&fields.application)
        .bind(join_list(&fields.assessment))
        .bind(join_list(&fields.interview))
        .bind(&fields.rejection)
        .bind(&fields.notes)
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a job. Returns false if the user owns no such job.
    pub async fn delete(&self, user_id: i64, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
