//! In-company chat. Direct conversations are deduplicated per user pair;
//! deletion is two-tier (hide for me, or delete for all within 10 minutes).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, put},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiResult, AppError};
use crate::AppState;
use haulbase_shared::{Conversation, ConversationKind};

pub fn chat_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/conversations", get(list_conversations).post(create_conversation))
        .route("/conversations/:id/messages", get(list_messages).post(post_message))
        .route("/conversations/:id/read", put(mark_read))
        .route("/unread-count", get(unread_count))
        .route("/messages/:id/me", delete(delete_for_me))
        .route("/messages/:id/all", delete(delete_for_all))
}

/// The sender may retract a message for everyone within ten minutes.
pub fn delete_for_all_allowed(
    sender_id: Uuid,
    caller_id: Uuid,
    sent_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    sender_id == caller_id && now - sent_at <= Duration::minutes(10)
}

#[derive(Debug, Deserialize)]
pub struct ConversationCreate {
    pub kind: ConversationKind,
    pub title: Option<String>,
    pub participant_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct MessageCreate {
    pub body: String,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub title: Option<String>,
    pub last_message_body: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
    pub participant_names: Vec<String>,
}

/// Message as seen by one participant. A retracted message keeps its row
/// but loses its body.
#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub body: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    sender_name: String,
    body: String,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

async fn require_participant(
    state: &AppState,
    conversation_id: Uuid,
    user_id: Uuid,
) -> ApiResult<()> {
    let row: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM conversation_participants WHERE conversation_id = $1 AND user_id = $2",
    )
    .bind(conversation_id)
    .bind(user_id)
    .fetch_optional(&state.db_pool)
    .await?;

    if row.is_none() {
        return Err(AppError::Forbidden(
            "You are not part of this conversation".to_string(),
        ));
    }
    Ok(())
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    // Last visible message and unread tally, both respecting the caller's
    // hides and the senders' retractions.
    let rows = sqlx::query_as::<_, ConversationSummary>(
        r#"
        SELECT c.id, c.kind, c.title,
               lm.body AS last_message_body,
               lm.created_at AS last_message_at,
               (SELECT COUNT(*)
                FROM messages m
                WHERE m.conversation_id = c.id
                  AND m.sender_id <> $2
                  AND m.deleted_at IS NULL
                  AND (cp.last_read_at IS NULL OR m.created_at > cp.last_read_at)
                  AND NOT EXISTS (SELECT 1 FROM message_hides h
                                  WHERE h.message_id = m.id AND h.user_id = $2)
               ) AS unread_count,
               ARRAY(SELECT u.full_name
                     FROM conversation_participants p
                     JOIN users u ON u.id = p.user_id
                     WHERE p.conversation_id = c.id AND p.user_id <> $2
                     ORDER BY u.full_name) AS participant_names
        FROM conversations c
        JOIN conversation_participants cp
          ON cp.conversation_id = c.id AND cp.user_id = $2
        LEFT JOIN LATERAL (
            SELECT m.body, m.created_at
            FROM messages m
            WHERE m.conversation_id = c.id
              AND m.deleted_at IS NULL
              AND NOT EXISTS (SELECT 1 FROM message_hides h
                              WHERE h.message_id = m.id AND h.user_id = $2)
            ORDER BY m.created_at DESC
            LIMIT 1
        ) lm ON TRUE
        WHERE c.company_id = $1
        ORDER BY lm.created_at DESC NULLS LAST
        "#,
    )
    .bind(auth.user.company_id)
    .bind(auth.user.id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(rows))
}

async fn create_conversation(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<ConversationCreate>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let mut participants: Vec<Uuid> = payload
        .participant_ids
        .into_iter()
        .filter(|id| *id != auth.user.id)
        .collect();
    participants.sort();
    participants.dedup();

    // All participants must be users of the same company.
    let known: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE id = ANY($1) AND company_id = $2",
    )
    .bind(&participants)
    .bind(auth.user.company_id)
    .fetch_one(&state.db_pool)
    .await?;
    if known != participants.len() as i64 {
        return Err(AppError::BadRequest(
            "One or more participants are unknown".to_string(),
        ));
    }

    match payload.kind {
        ConversationKind::Direct => {
            if participants.len() != 1 {
                return Err(AppError::BadRequest(
                    "A direct conversation has exactly one other participant".to_string(),
                ));
            }
            let other = participants[0];

            // Reuse the existing pair conversation if there is one.
            let existing = sqlx::query_as::<_, Conversation>(
                r#"
                SELECT c.* FROM conversations c
                WHERE c.company_id = $1 AND c.kind = 'DIRECT'
                  AND EXISTS (SELECT 1 FROM conversation_participants p
                              WHERE p.conversation_id = c.id AND p.user_id = $2)
                  AND EXISTS (SELECT 1 FROM conversation_participants p
                              WHERE p.conversation_id = c.id AND p.user_id = $3)
                  AND (SELECT COUNT(*) FROM conversation_participants p
                       WHERE p.conversation_id = c.id) = 2
                "#,
            )
            .bind(auth.user.company_id)
            .bind(auth.user.id)
            .bind(other)
            .fetch_optional(&state.db_pool)
            .await?;

            if let Some(conversation) = existing {
                return Ok((StatusCode::OK, Json(conversation)));
            }
        }
        ConversationKind::Group => {
            if payload.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
                return Err(AppError::BadRequest(
                    "A group conversation requires a title".to_string(),
                ));
            }
            if participants.is_empty() {
                return Err(AppError::BadRequest(
                    "A group conversation needs at least one other participant".to_string(),
                ));
            }
        }
    }

    let mut tx = state.db_pool.begin().await?;

    let conversation = sqlx::query_as::<_, Conversation>(
        r#"
        INSERT INTO conversations (company_id, kind, title, created_by)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(auth.user.company_id)
    .bind(payload.kind)
    .bind(payload.title.as_deref().map(str::trim))
    .bind(auth.user.id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO conversation_participants (conversation_id, user_id) VALUES ($1, $2)",
    )
    .bind(conversation.id)
    .bind(auth.user.id)
    .execute(&mut *tx)
    .await?;

    for participant in &participants {
        sqlx::query(
            "INSERT INTO conversation_participants (conversation_id, user_id) VALUES ($1, $2)",
        )
        .bind(conversation.id)
        .bind(participant)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<MessageView>>> {
    require_participant(&state, id, auth.user.id).await?;

    let rows = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT m.id, m.conversation_id, m.sender_id, u.full_name AS sender_name,
               m.body, m.deleted_at, m.created_at
        FROM messages m
        JOIN users u ON u.id = m.sender_id
        WHERE m.conversation_id = $1
          AND NOT EXISTS (SELECT 1 FROM message_hides h
                          WHERE h.message_id = m.id AND h.user_id = $2)
        ORDER BY m.created_at ASC
        "#,
    )
    .bind(id)
    .bind(auth.user.id)
    .fetch_all(&state.db_pool)
    .await?;

    let messages = rows
        .into_iter()
        .map(|row| {
            let deleted = row.deleted_at.is_some();
            MessageView {
                id: row.id,
                conversation_id: row.conversation_id,
                sender_id: row.sender_id,
                sender_name: row.sender_name,
                body: if deleted { None } else { Some(row.body) },
                deleted,
                created_at: row.created_at,
            }
        })
        .collect();

    Ok(Json(messages))
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<MessageCreate>,
) -> ApiResult<(StatusCode, Json<MessageView>)> {
    require_participant(&state, id, auth.user.id).await?;

    let body = payload.body.trim();
    if body.is_empty() {
        return Err(AppError::BadRequest("Message body cannot be empty".to_string()));
    }

    let row = sqlx::query_as::<_, MessageRow>(
        r#"
        WITH inserted AS (
            INSERT INTO messages (conversation_id, sender_id, body)
            VALUES ($1, $2, $3)
            RETURNING *
        )
        SELECT i.id, i.conversation_id, i.sender_id, u.full_name AS sender_name,
               i.body, i.deleted_at, i.created_at
        FROM inserted i
        JOIN users u ON u.id = i.sender_id
        "#,
    )
    .bind(id)
    .bind(auth.user.id)
    .bind(body)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageView {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            sender_name: row.sender_name,
            body: Some(row.body),
            deleted: false,
            created_at: row.created_at,
        }),
    ))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let result = sqlx::query(
        "UPDATE conversation_participants SET last_read_at = NOW() \
         WHERE conversation_id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(auth.user.id)
    .execute(&state.db_pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Forbidden(
            "You are not part of this conversation".to_string(),
        ));
    }

    Ok(Json(json!({ "success": true })))
}

async fn unread_count(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM messages m
        JOIN conversation_participants cp
          ON cp.conversation_id = m.conversation_id AND cp.user_id = $1
        WHERE m.sender_id <> $1
          AND m.deleted_at IS NULL
          AND (cp.last_read_at IS NULL OR m.created_at > cp.last_read_at)
          AND NOT EXISTS (SELECT 1 FROM message_hides h
                          WHERE h.message_id = m.id AND h.user_id = $1)
        "#,
    )
    .bind(auth.user.id)
    .fetch_one(&state.db_pool)
    .await?;

    Ok(Json(json!({ "unread_count": count })))
}

async fn delete_for_me(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let conversation_id: Option<Uuid> =
        sqlx::query_scalar("SELECT conversation_id FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&state.db_pool)
            .await?;
    let Some(conversation_id) = conversation_id else {
        return Err(AppError::NotFound("Message".to_string()));
    };
    require_participant(&state, conversation_id, auth.user.id).await?;

    sqlx::query(
        "INSERT INTO message_hides (message_id, user_id) VALUES ($1, $2) \
         ON CONFLICT (message_id, user_id) DO NOTHING",
    )
    .bind(id)
    .bind(auth.user.id)
    .execute(&state.db_pool)
    .await?;

    Ok(Json(json!({ "success": true })))
}

async fn delete_for_all(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let message: Option<(Uuid, DateTime<Utc>)> =
        sqlx::query_as("SELECT sender_id, created_at FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&state.db_pool)
            .await?;
    let Some((sender_id, created_at)) = message else {
        return Err(AppError::NotFound("Message".to_string()));
    };

    if !delete_for_all_allowed(sender_id, auth.user.id, created_at, Utc::now()) {
        return Err(AppError::Forbidden(
            "A message can only be retracted by its sender within 10 minutes".to_string(),
        ));
    }

    sqlx::query("UPDATE messages SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL")
        .bind(id)
        .execute(&state.db_pool)
        .await?;

    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_delete_for_all_window() {
        let sender = Uuid::new_v4();
        let other = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        assert!(delete_for_all_allowed(sender, sender, now - Duration::minutes(5), now));
        assert!(delete_for_all_allowed(sender, sender, now - Duration::minutes(10), now));
        assert!(!delete_for_all_allowed(sender, sender, now - Duration::minutes(11), now));
        assert!(!delete_for_all_allowed(sender, other, now - Duration::minutes(1), now));
    }
}
