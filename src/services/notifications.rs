use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::notification;
use crate::errors::ServiceError;

const DEFAULT_LIMIT: u64 = 50;
const MAX_LIMIT: u64 = 200;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<u64>,
}

impl NotificationQuery {
    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UnreadCount {
    pub unread: u64,
}

/// Stored staff notifications
#[derive(Clone)]
pub struct NotificationService {
    db_pool: Arc<DbPool>,
}

impl NotificationService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Newest first.
    pub async fn list(&self, query: &NotificationQuery) -> Result<Vec<notification::Model>, ServiceError> {
        let mut select = notification::Entity::find();
        if query.unread_only {
            select = select.filter(notification::Column::IsRead.eq(false));
        }
        select
            .order_by_desc(notification::Column::CreatedAt)
            .limit(query.limit())
            .all(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list notifications");
                ServiceError::DatabaseError(e)
            })
    }

    #[instrument(skip(self))]
    pub async fn mark_as_read(&self, id: Uuid) -> Result<notification::Model, ServiceError> {
        let existing = notification::Entity::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load notification");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("notification {}", id)))?;

        if existing.is_read {
            return Ok(existing);
        }

        let mut active: notification::ActiveModel = existing.into();
        active.is_read = Set(true);
        active.read_at = Set(Some(Utc::now()));
        active.update(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, "Failed to mark notification read");
            ServiceError::DatabaseError(e)
        })
    }

    #[instrument(skip(self))]
    pub async fn mark_all_as_read(&self) -> Result<u64, ServiceError> {
        let result = notification::Entity::update_many()
            .col_expr(notification::Column::IsRead, Expr::value(true))
            .col_expr(notification::Column::ReadAt, Expr::value(Some(Utc::now())))
            .filter(notification::Column::IsRead.eq(false))
            .exec(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to mark notifications read");
                ServiceError::DatabaseError(e)
            })?;

        info!(updated = result.rows_affected, "Notifications marked read");
        Ok(result.rows_affected)
    }

    pub async fn unread_count(&self) -> Result<UnreadCount, ServiceError> {
        let unread = notification::Entity::find()
            .filter(notification::Column::IsRead.eq(false))
            .count(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to count unread notifications");
                ServiceError::DatabaseError(e)
            })?;
        Ok(UnreadCount { unread })
    }
}
