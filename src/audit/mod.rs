//! Audit Trail
//!
//! Append-only log of privileged mutations. Entries are built by the
//! services before the mutation runs and written by the store inside the
//! same transaction as the change they document: a row exists iff the
//! mutation committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::account::Role;
use crate::pagination::PageWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEntity {
    User,
    Resource,
    Request,
}

impl AuditEntity {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEntity::User => "User",
            AuditEntity::Resource => "Resource",
            AuditEntity::Request => "Request",
        }
    }
}

impl FromStr for AuditEntity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User" => Ok(AuditEntity::User),
            "Resource" => Ok(AuditEntity::Resource),
            "Request" => Ok(AuditEntity::Request),
            other => Err(format!("Unknown audit entity: {}", other)),
        }
    }
}

impl fmt::Display for AuditEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    UpdateRole,
    Delete,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::UpdateRole => "UPDATE_ROLE",
            AuditAction::Delete => "DELETE",
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(AuditAction::Create),
            "UPDATE" => Ok(AuditAction::Update),
            "UPDATE_ROLE" => Ok(AuditAction::UpdateRole),
            "DELETE" => Ok(AuditAction::Delete),
            other => Err(format!("Unknown audit action: {}", other)),
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry to be written alongside a mutation
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub entity: AuditEntity,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub performed_by_id: Uuid,
    pub meta: serde_json::Value,
}

impl AuditEntry {
    pub fn new(
        entity: AuditEntity,
        entity_id: Uuid,
        action: AuditAction,
        performed_by_id: Uuid,
        meta: serde_json::Value,
    ) -> Self {
        Self {
            entity,
            entity_id,
            action,
            performed_by_id,
            meta,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPerformer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Committed audit row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: Uuid,
    pub entity: AuditEntity,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub performed_by_id: Uuid,
    pub meta: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performed_by: Option<AuditPerformer>,
}

/// Admin listing filters
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub entity: Option<AuditEntity>,
    pub action: Option<AuditAction>,
    pub performed_by_id: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub window: PageWindow,
}

impl AuditQuery {
    pub fn matches(&self, log: &AuditLog) -> bool {
        self.entity.is_none_or(|e| e == log.entity)
            && self.action.is_none_or(|a| a == log.action)
            && self.performed_by_id.is_none_or(|p| p == log.performed_by_id)
            && self.start_date.is_none_or(|s| log.timestamp >= s)
            && self.end_date.is_none_or(|e| log.timestamp <= e)
    }
}

/// Write one audit row on an open transaction.
///
/// Callers pass `&mut *tx`; the row commits or rolls back with the mutation.
pub async fn record(conn: &mut PgConnection, entry: &AuditEntry) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO audit_logs_tb (id, entity, entity_id, action, performed_by_id, meta, timestamp)
        VALUES ($1, $2, $3, $4, $5, $6, NOW())
        "#,
    )
    .bind(id)
    .bind(entry.entity.as_str())
    .bind(entry.entity_id)
    .bind(entry.action.as_str())
    .bind(entry.performed_by_id)
    .bind(&entry.meta)
    .execute(conn)
    .await?;

    tracing::debug!(
        entity = %entry.entity,
        entity_id = %entry.entity_id,
        action = %entry.action,
        "Audit row written"
    );
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn log(entity: AuditEntity, action: AuditAction, by: Uuid) -> AuditLog {
        AuditLog {
            id: Uuid::new_v4(),
            entity,
            entity_id: Uuid::new_v4(),
            action,
            performed_by_id: by,
            meta: json!({}),
            timestamp: Utc::now(),
            performed_by: None,
        }
    }

    #[test]
    fn test_action_strings() {
        assert_eq!(AuditAction::UpdateRole.as_str(), "UPDATE_ROLE");
        assert_eq!("DELETE".parse::<AuditAction>().unwrap(), AuditAction::Delete);
        assert_eq!(
            serde_json::to_value(AuditAction::UpdateRole).unwrap(),
            json!("UPDATE_ROLE")
        );
        assert_eq!(serde_json::to_value(AuditEntity::Resource).unwrap(), json!("Resource"));
    }

    #[test]
    fn test_query_filters() {
        let admin = Uuid::new_v4();
        let row = log(AuditEntity::User, AuditAction::UpdateRole, admin);

        assert!(AuditQuery::default().matches(&row));

        let by_entity = AuditQuery {
            entity: Some(AuditEntity::Resource),
            ..Default::default()
        };
        assert!(!by_entity.matches(&row));

        let by_actor = AuditQuery {
            performed_by_id: Some(admin),
            action: Some(AuditAction::UpdateRole),
            ..Default::default()
        };
        assert!(by_actor.matches(&row));

        let future_only = AuditQuery {
            start_date: Some(Utc::now() + chrono::Duration::hours(1)),
            ..Default::default()
        };
        assert!(!future_only.matches(&row));
    }
}
