//! Resource request records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::account::UserRef;
use crate::catalog::ResourceCategory;
use crate::pagination::{PageWindow, SortOrder};

/// OPEN -> IN_PROGRESS -> RESOLVED | REJECTED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Open,
    InProgress,
    Resolved,
    Rejected,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 4] = [
        RequestStatus::Open,
        RequestStatus::InProgress,
        RequestStatus::Resolved,
        RequestStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Open => "OPEN",
            RequestStatus::InProgress => "IN_PROGRESS",
            RequestStatus::Resolved => "RESOLVED",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    /// RESOLVED and REJECTED carry a `resolvedAt`
    pub fn is_closed(self) -> bool {
        matches!(self, RequestStatus::Resolved | RequestStatus::Rejected)
    }

    /// Counted as pending in admin metrics
    pub fn is_pending(self) -> bool {
        !self.is_closed()
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(RequestStatus::Open),
            "IN_PROGRESS" => Ok(RequestStatus::InProgress),
            "RESOLVED" => Ok(RequestStatus::Resolved),
            "REJECTED" => Ok(RequestStatus::Rejected),
            other => Err(format!("Unknown request status: {}", other)),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequest {
    pub id: Uuid,
    pub title: String,
    pub authors: Option<String>,
    pub reason: String,
    pub category: Option<ResourceCategory>,
    pub status: RequestStatus,
    pub admin_reply: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user: UserRef,
}

/// Body of `POST /requests`
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestInput {
    #[validate(length(min = 3, max = 200, message = "Title must be between 3 and 200 characters"))]
    pub title: String,
    #[validate(length(max = 500, message = "Authors must be at most 500 characters"))]
    pub authors: Option<String>,
    #[validate(length(min = 10, max = 1000, message = "Reason must be between 10 and 1000 characters"))]
    pub reason: String,
    pub category: Option<ResourceCategory>,
}

/// Body of `PUT /requests/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequestInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RequestStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 2000, message = "Reply must be at most 2000 characters"))]
    pub admin_reply: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRequest {
    pub id: Uuid,
    pub title: String,
    pub authors: Option<String>,
    pub reason: String,
    pub category: Option<ResourceCategory>,
    pub user_id: Uuid,
}

/// Column changes computed by the service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestPatch {
    pub status: Option<RequestStatus>,
    pub admin_reply: Option<String>,
    /// `Some(None)` clears the column
    pub resolved_at: Option<Option<DateTime<Utc>>>,
}

impl RequestPatch {
    /// Derive the patch from caller input, keeping `resolvedAt` set iff closed
    pub fn from_input(input: &UpdateRequestInput, now: DateTime<Utc>) -> Self {
        let resolved_at = input
            .status
            .map(|status| if status.is_closed() { Some(now) } else { None });
        Self {
            status: input.status,
            admin_reply: input.admin_reply.clone(),
            resolved_at,
        }
    }

    pub fn apply_to(&self, request: &mut ResourceRequest) {
        if let Some(status) = self.status {
            request.status = status;
        }
        if let Some(reply) = &self.admin_reply {
            request.admin_reply = Some(reply.clone());
        }
        if let Some(resolved_at) = self.resolved_at {
            request.resolved_at = resolved_at;
        }
        request.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RequestSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Title,
    Status,
}

impl RequestSortField {
    pub fn column(self) -> &'static str {
        match self {
            RequestSortField::CreatedAt => "created_at",
            RequestSortField::UpdatedAt => "updated_at",
            RequestSortField::Title => "title",
            RequestSortField::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestQuery {
    pub status: Option<RequestStatus>,
    pub user_id: Option<Uuid>,
    pub window: PageWindow,
    pub sort_by: RequestSortField,
    pub sort_order: SortOrder,
}

/// `GET /requests` query string
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestListParams {
    pub status: Option<RequestStatus>,
    pub user_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub sort_by: RequestSortField,
    #[serde(default)]
    pub sort_order: SortOrder,
}

impl RequestListParams {
    pub fn into_query(self) -> RequestQuery {
        RequestQuery {
            status: self.status,
            user_id: self.user_id,
            window: PageWindow::new(self.page, self.limit),
            sort_by: self.sort_by,
            sort_order: self.sort_order,
        }
    }
}

impl RequestQuery {
    pub fn matches(&self, request: &ResourceRequest) -> bool {
        self.status.is_none_or(|s| s == request.status)
            && self.user_id.is_none_or(|u| u == request.user_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestStats {
    pub total: i64,
    /// Created in the last 7 days
    pub recent: i64,
    pub by_status: BTreeMap<String, i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_at_follows_status() {
        let now = Utc::now();
        for (status, closed) in [
            (RequestStatus::Open, false),
            (RequestStatus::InProgress, false),
            (RequestStatus::Resolved, true),
            (RequestStatus::Rejected, true),
        ] {
            let patch = RequestPatch::from_input(
                &UpdateRequestInput {
                    status: Some(status),
                    admin_reply: None,
                },
                now,
            );
            assert_eq!(patch.resolved_at, Some(closed.then_some(now)), "{}", status);
        }

        let reply_only = RequestPatch::from_input(
            &UpdateRequestInput {
                status: None,
                admin_reply: Some("Ordered".into()),
            },
            now,
        );
        assert_eq!(reply_only.resolved_at, None);
    }

    #[test]
    fn test_create_input_validation() {
        let input = CreateRequestInput {
            title: "SICP".into(),
            authors: None,
            reason: "too short".into(),
            category: None,
        };
        let errors = input.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("reason"));
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_value(RequestStatus::InProgress).unwrap(),
            serde_json::json!("IN_PROGRESS")
        );
        assert_eq!("REJECTED".parse::<RequestStatus>().unwrap(), RequestStatus::Rejected);
    }
}
