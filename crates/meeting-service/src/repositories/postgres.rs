//! PostgreSQL meeting store.
//!
//! # Security
//!
//! - All queries use parameterized statements (SQL injection safe)
//! - Meeting variables and titles are not logged

use super::{timed, MeetingStore};
use crate::errors::MeetingError;
use crate::models::{ChatCloseInfo, Meeting};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::instrument;

const BACKEND: &str = "postgres";

/// Durable meeting store over the `web_meetings` table.
#[derive(Clone)]
pub struct PgMeetingStore {
    pool: PgPool,
}

impl PgMeetingStore {
    /// Wrap an existing pool. Migrations must already be applied.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct MeetingRow {
    id: String,
    domain_id: i64,
    title: String,
    created_at: i64,
    expires_at: i64,
    variables: Json<HashMap<String, String>>,
    url: String,
    call_id: Option<String>,
    bridged: bool,
    satisfaction: Option<String>,
}

impl From<MeetingRow> for Meeting {
    fn from(row: MeetingRow) -> Self {
        Meeting {
            id: row.id,
            domain_id: row.domain_id,
            title: row.title,
            created_at: row.created_at,
            expires_at: row.expires_at,
            variables: row.variables.0,
            url: row.url,
            call_id: row.call_id,
            bridged: row.bridged,
            satisfaction: row.satisfaction,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ChatCloseRow {
    conversation_id: String,
    closer_id: String,
    auth_user_id: i64,
}

#[async_trait]
impl MeetingStore for PgMeetingStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip_all, name = "meeting.repo.postgres.create")]
    async fn create(&self, meeting: &Meeting) -> Result<(), MeetingError> {
        timed(BACKEND, "create", async {
            sqlx::query(
                r#"
                INSERT INTO web_meetings (
                    id, domain_id, title, created_at, expires_at,
                    variables, url, call_id, bridged, satisfaction
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(&meeting.id)
            .bind(meeting.domain_id)
            .bind(&meeting.title)
            .bind(meeting.created_at)
            .bind(meeting.expires_at)
            .bind(Json(&meeting.variables))
            .bind(&meeting.url)
            .bind(&meeting.call_id)
            .bind(meeting.bridged)
            .bind(&meeting.satisfaction)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
        .await
    }

    #[instrument(skip_all, name = "meeting.repo.postgres.get")]
    async fn get(&self, id: &str) -> Result<Meeting, MeetingError> {
        timed(BACKEND, "get", async {
            let row: Option<MeetingRow> = sqlx::query_as(
                r#"
                SELECT
                    id, domain_id, title, created_at, expires_at,
                    variables, url, call_id, bridged, satisfaction
                FROM web_meetings
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

            row.map(Meeting::from).ok_or(MeetingError::NotFound)
        })
        .await
    }

    #[instrument(skip_all, name = "meeting.repo.postgres.delete")]
    async fn delete(&self, id: &str) -> Result<(), MeetingError> {
        timed(BACKEND, "delete", async {
            let result = sqlx::query("DELETE FROM web_meetings WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(MeetingError::NotFound);
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip_all, name = "meeting.repo.postgres.set_call")]
    async fn set_call(&self, id: &str, call_id: &str, bridged: bool) -> Result<(), MeetingError> {
        timed(BACKEND, "set_call", async {
            let result = sqlx::query(
                r#"
                UPDATE web_meetings
                SET call_id = $2, bridged = $3
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(call_id)
            .bind(bridged)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MeetingError::NotFound);
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip_all, name = "meeting.repo.postgres.set_satisfaction")]
    async fn set_satisfaction(&self, id: &str, satisfaction: &str) -> Result<(), MeetingError> {
        timed(BACKEND, "set_satisfaction", async {
            let result = sqlx::query("UPDATE web_meetings SET satisfaction = $2 WHERE id = $1")
                .bind(id)
                .bind(satisfaction)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(MeetingError::NotFound);
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip_all, name = "meeting.repo.postgres.delete_expired")]
    async fn delete_expired(&self, now: i64) -> Result<u64, MeetingError> {
        timed(BACKEND, "delete_expired", async {
            let result = sqlx::query("DELETE FROM web_meetings WHERE expires_at <= $1")
                .bind(now)
                .execute(&self.pool)
                .await?;

            Ok(result.rows_affected())
        })
        .await
    }

    #[instrument(skip_all, name = "meeting.repo.postgres.get_chat_close_info")]
    async fn get_chat_close_info(&self, id: &str) -> Result<Option<ChatCloseInfo>, MeetingError> {
        timed(BACKEND, "get_chat_close_info", async {
            let row: Option<ChatCloseRow> = sqlx::query_as(
                r#"
                SELECT conversation_id, closer_id, auth_user_id
                FROM web_meeting_chats
                WHERE meeting_id = $1
                  AND closed_at IS NULL
                ORDER BY created_at DESC
                LIMIT 1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

            Ok(row.map(|r| ChatCloseInfo {
                conversation_id: r.conversation_id,
                closer_id: r.closer_id,
                auth_user_id: r.auth_user_id,
            }))
        })
        .await
    }

    async fn ping(&self) -> Result<(), MeetingError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
