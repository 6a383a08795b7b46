use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Postgres, QueryBuilder, Row};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{PgStore, optional_text_enum, text_enum, user_ref};
use crate::audit::{self, AuditEntry};
use crate::db::store::RequestStore;
use crate::error::{LibraryError, LibraryResult};
use crate::pagination::Page;
use crate::requests::{
    NewRequest, RequestPatch, RequestQuery, RequestStats, RequestStatus, ResourceRequest,
};

const REQUEST_SELECT: &str = r#"
SELECT q.*, u.name AS user_name, u.email AS user_email
FROM requests_tb q
JOIN users_tb u ON u.id = q.user_id
"#;

fn row_to_request(row: &PgRow) -> Result<ResourceRequest, sqlx::Error> {
    Ok(ResourceRequest {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        authors: row.try_get("authors")?,
        reason: row.try_get("reason")?,
        category: optional_text_enum(row, "category")?,
        status: text_enum(row, "status")?,
        admin_reply: row.try_get("admin_reply")?,
        resolved_at: row.try_get("resolved_at")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        user: user_ref(row, "user_id", "user_name", Some("user_email"))?,
    })
}

async fn load_request(conn: &mut PgConnection, id: Uuid) -> Result<Option<ResourceRequest>, sqlx::Error> {
    let sql = format!("{} WHERE q.id = $1", REQUEST_SELECT);
    let row = sqlx::query(&sql).bind(id).fetch_optional(conn).await?;
    row.as_ref().map(row_to_request).transpose()
}

fn push_request_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &RequestQuery) {
    qb.push(" WHERE TRUE");
    if let Some(status) = query.status {
        qb.push(" AND q.status = ").push_bind(status.as_str());
    }
    if let Some(user_id) = query.user_id {
        qb.push(" AND q.user_id = ").push_bind(user_id);
    }
}

#[async_trait]
impl RequestStore for PgStore {
    async fn insert_request(
        &self,
        request: &NewRequest,
        audit: &AuditEntry,
    ) -> LibraryResult<ResourceRequest> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO requests_tb (id, title, authors, reason, category, status, user_id)
            VALUES ($1, $2, $3, $4, $5, 'OPEN', $6)
            "#,
        )
        .bind(request.id)
        .bind(&request.title)
        .bind(&request.authors)
        .bind(&request.reason)
        .bind(request.category.map(|c| c.as_str()))
        .bind(request.user_id)
        .execute(&mut *tx)
        .await?;

        audit::record(&mut *tx, audit).await?;
        let created = load_request(&mut *tx, request.id)
            .await?
            .ok_or_else(|| LibraryError::Internal("Inserted request vanished".to_string()))?;
        tx.commit().await?;
        Ok(created)
    }

    async fn find_request(&self, id: Uuid) -> LibraryResult<Option<ResourceRequest>> {
        let mut conn = self.pool.acquire().await?;
        Ok(load_request(&mut *conn, id).await?)
    }

    async fn list_requests(&self, query: &RequestQuery) -> LibraryResult<Page<ResourceRequest>> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM requests_tb q");
        push_request_filters(&mut count_qb, query);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let column = query.sort_by.column();
        let dir = query.sort_order.as_sql();
        let mut qb = QueryBuilder::<Postgres>::new(REQUEST_SELECT);
        push_request_filters(&mut qb, query);
        qb.push(format!(" ORDER BY q.{column} {dir}, q.id {dir} LIMIT "))
            .push_bind(query.window.limit)
            .push(" OFFSET ")
            .push_bind(query.window.offset());

        let data = qb
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_request)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::offset(data, query.window, total))
    }

    async fn update_request(
        &self,
        id: Uuid,
        patch: &RequestPatch,
        audit: &AuditEntry,
    ) -> LibraryResult<ResourceRequest> {
        let mut tx = self.pool.begin().await?;

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE requests_tb SET updated_at = NOW()");
        if let Some(status) = patch.status {
            qb.push(", status = ").push_bind(status.as_str());
        }
        if let Some(reply) = &patch.admin_reply {
            qb.push(", admin_reply = ").push_bind(reply.clone());
        }
        if let Some(resolved_at) = patch.resolved_at {
            qb.push(", resolved_at = ").push_bind(resolved_at);
        }
        qb.push(" WHERE id = ").push_bind(id);

        let result = qb.build().execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("Request"));
        }

        audit::record(&mut *tx, audit).await?;
        let updated = load_request(&mut *tx, id)
            .await?
            .ok_or_else(|| LibraryError::not_found("Request"))?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_request(
        &self,
        id: Uuid,
        require_open: bool,
        audit: &AuditEntry,
    ) -> LibraryResult<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT status FROM requests_tb WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| LibraryError::not_found("Request"))?;
        let status: RequestStatus = text_enum(&row, "status")?;
        if require_open && status != RequestStatus::Open {
            return Err(LibraryError::Forbidden(
                "Cannot delete a request that is already being processed".to_string(),
            ));
        }

        sqlx::query("DELETE FROM requests_tb WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        audit::record(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn request_stats(&self, recent_since: DateTime<Utc>) -> LibraryResult<RequestStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM requests_tb GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut by_status = BTreeMap::new();
        let mut total = 0;
        for row in &rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            total += count;
            by_status.insert(status, count);
        }

        let recent: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM requests_tb WHERE created_at >= $1")
            .bind(recent_since)
            .fetch_one(&self.pool)
            .await?;

        Ok(RequestStats {
            total,
            recent,
            by_status,
        })
    }
}
