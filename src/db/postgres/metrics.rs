use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::collections::BTreeMap;

use super::PgStore;
use crate::admin::{
    DownloadMetrics, METRICS_TOP_N, Metrics, RequestMetrics, ResourceMetrics, SearchMetrics,
    SearchTerm, TopResource, UserMetrics,
};
use crate::db::store::MetricsStore;
use crate::error::LibraryResult;

impl PgStore {
    async fn count(&self, sql: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(sql).fetch_one(&self.pool).await
    }

    async fn count_since(&self, sql: &str, since: DateTime<Utc>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(sql).bind(since).fetch_one(&self.pool).await
    }

    async fn user_metrics(&self) -> Result<UserMetrics, sqlx::Error> {
        let rows = sqlx::query("SELECT role, COUNT(*) AS count FROM users_tb GROUP BY role")
            .fetch_all(&self.pool)
            .await?;
        let mut by_role = BTreeMap::new();
        let mut total = 0;
        for row in &rows {
            let count: i64 = row.try_get("count")?;
            total += count;
            by_role.insert(row.try_get::<String, _>("role")?, count);
        }
        Ok(UserMetrics { total, by_role })
    }

    async fn top_resources(&self) -> Result<Vec<TopResource>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, download_count, view_count
            FROM resources_tb
            WHERE is_active = TRUE
            ORDER BY download_count DESC, view_count DESC
            LIMIT $1
            "#,
        )
        .bind(METRICS_TOP_N as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut top = Vec::with_capacity(rows.len());
        for row in &rows {
            top.push(TopResource {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                download_count: row.try_get("download_count")?,
                view_count: row.try_get("view_count")?,
            });
        }
        Ok(top)
    }

    async fn top_search_terms(&self, since: DateTime<Utc>) -> Result<Vec<SearchTerm>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT query, COUNT(*) AS count
            FROM search_logs_tb
            WHERE timestamp >= $1
            GROUP BY query
            ORDER BY count DESC, query ASC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(METRICS_TOP_N as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut terms = Vec::with_capacity(rows.len());
        for row in &rows {
            terms.push(SearchTerm {
                query: row.try_get("query")?,
                count: row.try_get("count")?,
            });
        }
        Ok(terms)
    }
}

#[async_trait]
impl MetricsStore for PgStore {
    async fn collect_metrics(&self, recent_since: DateTime<Utc>) -> LibraryResult<Metrics> {
        let (users, active_resources, top_resources) = tokio::try_join!(
            self.user_metrics(),
            self.count("SELECT COUNT(*) FROM resources_tb WHERE is_active = TRUE"),
            self.top_resources(),
        )?;
        let (downloads, recent_downloads, searches, recent_searches, top_terms) = tokio::try_join!(
            self.count("SELECT COUNT(*) FROM download_logs_tb"),
            self.count_since(
                "SELECT COUNT(*) FROM download_logs_tb WHERE timestamp >= $1",
                recent_since
            ),
            self.count("SELECT COUNT(*) FROM search_logs_tb"),
            self.count_since(
                "SELECT COUNT(*) FROM search_logs_tb WHERE timestamp >= $1",
                recent_since
            ),
            self.top_search_terms(recent_since),
        )?;
        let pending = self
            .count("SELECT COUNT(*) FROM requests_tb WHERE status IN ('OPEN', 'IN_PROGRESS')")
            .await?;

        Ok(Metrics {
            users,
            resources: ResourceMetrics {
                total: active_resources,
                top_resources,
            },
            downloads: DownloadMetrics {
                total: downloads,
                recent: recent_downloads,
            },
            searches: SearchMetrics {
                total: searches,
                recent: recent_searches,
                top_terms,
            },
            requests: RequestMetrics { pending },
            generated_at: Utc::now(),
        })
    }
}
