//! Admin views

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::account::{Role, UserQuery, UserSortField};
use crate::audit::{AuditAction, AuditEntity, AuditQuery};
use crate::pagination::{PageWindow, SortOrder};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateRoleInput {
    pub role: Role,
}

/// `GET /admin/users` query string
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListParams {
    pub role: Option<Role>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub sort_by: UserSortField,
    #[serde(default)]
    pub sort_order: SortOrder,
}

impl UserListParams {
    pub fn into_query(self) -> UserQuery {
        UserQuery {
            role: self.role,
            search: self.search.filter(|s| !s.trim().is_empty()),
            window: PageWindow::new(self.page, self.limit),
            sort_by: self.sort_by,
            sort_order: self.sort_order,
        }
    }
}

/// `GET /admin/audit-logs` query string
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditListParams {
    pub entity: Option<AuditEntity>,
    pub action: Option<AuditAction>,
    pub user_id: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl AuditListParams {
    pub fn into_query(self) -> AuditQuery {
        AuditQuery {
            entity: self.entity,
            action: self.action,
            performed_by_id: self.user_id,
            start_date: self.start_date,
            end_date: self.end_date,
            window: PageWindow::new(self.page, self.limit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopResource {
    pub id: Uuid,
    pub title: String,
    pub download_count: i64,
    pub view_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTerm {
    pub query: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMetrics {
    pub total: i64,
    pub by_role: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics {
    /// Active resources only
    pub total: i64,
    pub top_resources: Vec<TopResource>,
}

/// `recent` covers the last 30 days
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadMetrics {
    pub total: i64,
    pub recent: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetrics {
    pub total: i64,
    pub recent: i64,
    pub top_terms: Vec<SearchTerm>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetrics {
    /// OPEN + IN_PROGRESS
    pub pending: i64,
}

/// Dashboard snapshot served from `admin:metrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub users: UserMetrics,
    pub resources: ResourceMetrics,
    pub downloads: DownloadMetrics,
    pub searches: SearchMetrics,
    pub requests: RequestMetrics,
    pub generated_at: DateTime<Utc>,
}

/// How many rows the top-N sections keep
pub const METRICS_TOP_N: usize = 10;
/// Window for the `recent` counters
pub const METRICS_RECENT_DAYS: i64 = 30;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_wire_shape() {
        let mut by_role = BTreeMap::new();
        by_role.insert("ADMIN".to_string(), 1);
        let metrics = Metrics {
            users: UserMetrics { total: 1, by_role },
            resources: ResourceMetrics::default(),
            downloads: DownloadMetrics::default(),
            searches: SearchMetrics {
                total: 2,
                recent: 2,
                top_terms: vec![SearchTerm {
                    query: "rust".into(),
                    count: 2,
                }],
            },
            requests: RequestMetrics { pending: 0 },
            generated_at: Utc::now(),
        };
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["users"]["byRole"]["ADMIN"], 1);
        assert_eq!(json["searches"]["topTerms"][0]["query"], "rust");
        assert!(json["resources"]["topResources"].is_array());
        assert!(json.get("generatedAt").is_some());
    }

    #[test]
    fn test_blank_search_is_dropped() {
        let params: UserListParams =
            serde_json::from_value(serde_json::json!({ "search": "  ", "role": "STAFF" })).unwrap();
        let query = params.into_query();
        assert_eq!(query.search, None);
        assert_eq!(query.role, Some(Role::Staff));
        assert_eq!(query.window, PageWindow::default());
    }
}
