use chrono::{DateTime, Utc};
use rand::RngCore;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{customer_session, dining_table, notification},
    errors::ServiceError,
    events::{assistance_message, Event, EventSender},
    models::{NotificationKind, TableStatus},
};

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Deserialize, Validate)]
pub struct StartSessionRequest {
    #[validate(length(min = 1, max = 20, message = "Table number is required"))]
    pub table_number: String,
    #[validate(length(max = 100))]
    pub customer_name: Option<String>,
    #[validate(length(max = 20))]
    pub customer_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartedSession {
    pub session_id: Uuid,
    pub session_token: String,
    pub table_id: Uuid,
    pub table_number: String,
    pub started_at: DateTime<Utc>,
}

/// Answer to "who does this token belong to".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub table_id: Uuid,
    pub ended: bool,
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Dining sessions and the table occupancy they imply
#[derive(Clone)]
pub struct SessionService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    session_expiry: chrono::Duration,
}

impl SessionService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        session_expiry: chrono::Duration,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            session_expiry,
        }
    }

    /// Seats a customer at an available table.
    #[instrument(skip(self, request), fields(table_number = %request.table_number))]
    pub async fn start_session(&self, request: StartSessionRequest) -> Result<StartedSession, ServiceError> {
        request.validate()?;

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for session start");
            ServiceError::DatabaseError(e)
        })?;

        let table = dining_table::Entity::find()
            .filter(dining_table::Column::TableNumber.eq(request.table_number.as_str()))
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load table");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("table {}", request.table_number)))?;

        let active = customer_session::Entity::find()
            .filter(customer_session::Column::TableId.eq(table.id))
            .filter(customer_session::Column::EndedAt.is_null())
            .one(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, table_id = %table.id, "Failed to check active sessions");
                ServiceError::DatabaseError(e)
            })?;

        if active.is_some() || table.status != TableStatus::Available {
            warn!(table_id = %table.id, status = %table.status, "Table is not free");
            return Err(ServiceError::DuplicateActiveSession(table.table_number));
        }

        let now = Utc::now();
        let token = generate_token();
        let session = customer_session::ActiveModel {
            id: Set(Uuid::new_v4()),
            table_id: Set(table.id),
            session_token: Set(token.clone()),
            customer_name: Set(request.customer_name),
            customer_phone: Set(request.customer_phone),
            started_at: Set(now),
            ended_at: Set(None),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create session");
            ServiceError::DatabaseError(e)
        })?;

        let table_number = table.table_number.clone();
        let mut occupied: dining_table::ActiveModel = table.into();
        occupied.status = Set(TableStatus::Occupied);
        let table = occupied.update(&txn).await.map_err(|e| {
            error!(error = %e, "Failed to mark table occupied");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit session start");
            ServiceError::DatabaseError(e)
        })?;

        info!(session_id = %session.id, %table_number, "Session started");
        Ok(StartedSession {
            session_id: session.id,
            session_token: token,
            table_id: table.id,
            table_number,
            started_at: session.started_at,
        })
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<customer_session::Model>, ServiceError> {
        customer_session::Entity::find()
            .filter(customer_session::Column::SessionToken.eq(token))
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to look up session token");
                ServiceError::DatabaseError(e)
            })
    }

    pub async fn validate_session_token(&self, token: &str) -> Result<SessionInfo, ServiceError> {
        let session = self
            .find_by_token(token)
            .await?
            .ok_or_else(|| ServiceError::AuthError("unknown session token".to_string()))?;
        Ok(SessionInfo {
            session_id: session.id,
            table_id: session.table_id,
            ended: !session.is_active(),
        })
    }

    /// Request-facing lookup: the session must exist and still be open.
    pub async fn authenticate(&self, token: &str) -> Result<customer_session::Model, ServiceError> {
        match self.find_by_token(token).await? {
            Some(session) if session.is_active() => Ok(session),
            Some(_) => Err(ServiceError::AuthError("session has ended".to_string())),
            None => Err(ServiceError::AuthError("unknown session token".to_string())),
        }
    }

    /// Ends the session and frees its table. Ending twice is a no-op.
    #[instrument(skip(self, token))]
    pub async fn end_session(&self, token: &str) -> Result<(), ServiceError> {
        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for session end");
            ServiceError::DatabaseError(e)
        })?;

        let session = customer_session::Entity::find()
            .filter(customer_session::Column::SessionToken.eq(token))
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load session");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::AuthError("unknown session token".to_string()))?;

        if !session.is_active() {
            return Ok(());
        }

        let session_id = session.id;
        let table_id = session.table_id;
        let mut ended: customer_session::ActiveModel = session.into();
        ended.ended_at = Set(Some(Utc::now()));
        ended.update(&txn).await.map_err(|e| {
            error!(error = %e, %session_id, "Failed to end session");
            ServiceError::DatabaseError(e)
        })?;

        free_tables(&txn, vec![table_id]).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %session_id, "Failed to commit session end");
            ServiceError::DatabaseError(e)
        })?;

        info!(%session_id, %table_id, "Session ended");
        Ok(())
    }

    /// Ends every open session started before `now - session_expiry`.
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let cutoff = now - self.session_expiry;

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for session sweep");
            ServiceError::DatabaseError(e)
        })?;

        let expired = customer_session::Entity::find()
            .filter(customer_session::Column::EndedAt.is_null())
            .filter(customer_session::Column::StartedAt.lt(cutoff))
            .lock_exclusive()
            .all(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load expired sessions");
                ServiceError::DatabaseError(e)
            })?;

        if expired.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = expired.iter().map(|s| s.id).collect();
        let table_ids: Vec<Uuid> = expired.iter().map(|s| s.table_id).collect();

        let result = customer_session::Entity::update_many()
            .col_expr(customer_session::Column::EndedAt, Expr::value(Some(now)))
            .filter(customer_session::Column::Id.is_in(ids))
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to end expired sessions");
                ServiceError::DatabaseError(e)
            })?;

        free_tables(&txn, table_ids).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit session sweep");
            ServiceError::DatabaseError(e)
        })?;

        info!(ended = result.rows_affected, %cutoff, "Expired sessions swept");
        Ok(result.rows_affected)
    }

    /// Pages staff to the customer's table.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn request_assistance(
        &self,
        session: &customer_session::Model,
    ) -> Result<notification::Model, ServiceError> {
        let table = dining_table::Entity::find_by_id(session.table_id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load table");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("table {}", session.table_id)))?;

        let record = notification::ActiveModel::unread(
            NotificationKind::AssistanceRequest,
            assistance_message(&table.table_number),
            None,
            Some(table.id),
        )
        .insert(&*self.db_pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to record assistance request");
            ServiceError::DatabaseError(e)
        })?;

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::AssistanceRequested {
                session_id: session.id,
                table_id: table.id,
                table_number: table.table_number.clone(),
            }) {
                warn!(error = %e, "Failed to publish assistance request");
            }
        }

        info!(table_number = %table.table_number, "Assistance requested");
        Ok(record)
    }
}

async fn free_tables(txn: &sea_orm::DatabaseTransaction, table_ids: Vec<Uuid>) -> Result<(), ServiceError> {
    dining_table::Entity::update_many()
        .col_expr(dining_table::Column::Status, Expr::value(TableStatus::Available))
        .col_expr(dining_table::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(dining_table::Column::Id.is_in(table_ids))
        .exec(txn)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to free tables");
            ServiceError::DatabaseError(e)
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_64_hex_chars_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn start_request_requires_table_number() {
        let request = StartSessionRequest {
            table_number: String::new(),
            customer_name: None,
            customer_phone: None,
        };
        assert!(request.validate().is_err());
    }
}
