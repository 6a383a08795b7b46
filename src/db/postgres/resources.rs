use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::{PgStore, contains_pattern, text_enum, user_ref};
use crate::audit::{self, AuditEntry};
use crate::catalog::{
    CourseSummary, DownloadLog, LatestResource, NewCourse, NewResource, Resource, ResourceDetail,
    ResourceListItem, ResourcePatch, ResourceQuery, TrendingResource,
};
use crate::db::store::{CourseStore, ResourceStore};
use crate::error::{LibraryError, LibraryResult};
use crate::pagination::{CursorPagination, Page, Pagination, SortOrder};

const RESOURCE_SELECT: &str = r#"
SELECT r.*, u.name AS uploader_name, u.email AS uploader_email
FROM resources_tb r
JOIN users_tb u ON u.id = r.uploaded_by_id
"#;

fn row_to_resource(row: &PgRow) -> Result<Resource, sqlx::Error> {
    Ok(Resource {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        authors: row.try_get("authors")?,
        category: text_enum(row, "category")?,
        department: row.try_get("department")?,
        publication_year: row.try_get("publication_year")?,
        access_type: text_enum(row, "access_type")?,
        tags: row.try_get("tags")?,
        is_active: row.try_get("is_active")?,
        download_count: row.try_get("download_count")?,
        view_count: row.try_get("view_count")?,
        cloudinary_id: row.try_get("cloudinary_id")?,
        cloudinary_url: row.try_get("cloudinary_url")?,
        cover_image_id: row.try_get("cover_image_id")?,
        cover_image_url: row.try_get("cover_image_url")?,
        file_type: row.try_get("file_type")?,
        file_size: row.try_get("file_size")?,
        uploaded_by_id: row.try_get("uploaded_by_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_course(row: &PgRow) -> Result<CourseSummary, sqlx::Error> {
    Ok(CourseSummary {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        title: row.try_get("title")?,
    })
}

async fn load_detail(conn: &mut PgConnection, id: Uuid) -> Result<Option<ResourceDetail>, sqlx::Error> {
    let sql = format!("{} WHERE r.id = $1", RESOURCE_SELECT);
    let Some(row) = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await? else {
        return Ok(None);
    };
    let resource = row_to_resource(&row)?;
    let uploaded_by = user_ref(&row, "uploaded_by_id", "uploader_name", Some("uploader_email"))?;

    let courses = sqlx::query(
        r#"
        SELECT c.id, c.code, c.title
        FROM courses_tb c
        JOIN course_resources_tb cr ON cr.course_id = c.id
        WHERE cr.resource_id = $1
        ORDER BY c.code
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(row_to_course)
    .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(ResourceDetail {
        resource,
        uploaded_by,
        courses,
    }))
}

async fn link_courses(conn: &mut PgConnection, resource_id: Uuid, course_ids: &[Uuid]) -> Result<(), sqlx::Error> {
    if course_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        INSERT INTO course_resources_tb (course_id, resource_id)
        SELECT UNNEST($1::uuid[]), $2
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(course_ids)
    .bind(resource_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// `AND ...` clauses shared by the page query and the count query
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ResourceQuery) {
    qb.push(" WHERE r.is_active = TRUE");
    if let Some(term) = query.search_term() {
        let pattern = contains_pattern(term);
        qb.push(" AND (r.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR r.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(category) = query.category {
        qb.push(" AND r.category = ").push_bind(category.as_str());
    }
    if let Some(department) = &query.department {
        qb.push(" AND r.department ILIKE ")
            .push_bind(contains_pattern(department));
    }
    if let Some(year) = query.year {
        qb.push(" AND r.publication_year = ").push_bind(year);
    }
    if let Some(tag) = &query.tag {
        qb.push(" AND ").push_bind(tag.clone()).push(" = ANY(r.tags)");
    }
    if let Some(author) = &query.author {
        qb.push(" AND ")
            .push_bind(author.clone())
            .push(" = ANY(r.authors)");
    }
    if let Some(access_type) = query.access_type {
        qb.push(" AND r.access_type = ").push_bind(access_type.as_str());
    }
}

fn row_to_list_item(row: &PgRow) -> Result<ResourceListItem, sqlx::Error> {
    Ok(ResourceListItem {
        resource: row_to_resource(row)?,
        uploaded_by: user_ref(row, "uploaded_by_id", "uploader_name", None)?,
    })
}

impl PgStore {
    async fn list_by_cursor(&self, query: &ResourceQuery, cursor: Uuid) -> LibraryResult<Page<ResourceListItem>> {
        let anchor = sqlx::query("SELECT 1 FROM resources_tb WHERE id = $1")
            .bind(cursor)
            .fetch_optional(&self.pool)
            .await?;
        if anchor.is_none() {
            return Err(LibraryError::BadRequest("Invalid cursor".to_string()));
        }

        let limit = query.window().limit;
        let column = query.sort_by.column();
        let dir = query.sort_order.as_sql();
        let op = match query.sort_order {
            SortOrder::Asc => ">",
            SortOrder::Desc => "<",
        };

        let mut qb = QueryBuilder::<Postgres>::new(RESOURCE_SELECT);
        push_filters(&mut qb, query);
        qb.push(format!(
            " AND (r.{column}, r.id) {op} (SELECT c.{column}, c.id FROM resources_tb c WHERE c.id = "
        ))
        .push_bind(cursor)
        .push(")");
        qb.push(format!(" ORDER BY r.{column} {dir}, r.id {dir} LIMIT "))
            .push_bind(limit + 1);

        let mut data = qb
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_list_item)
            .collect::<Result<Vec<_>, _>>()?;
        let pagination = CursorPagination::from_overfetch(&mut data, limit, |item| item.resource.id);
        Ok(Page {
            data,
            pagination: Pagination::Cursor(pagination),
        })
    }

    async fn list_by_offset(&self, query: &ResourceQuery) -> LibraryResult<Page<ResourceListItem>> {
        let window = query.window();
        let column = query.sort_by.column();
        let dir = query.sort_order.as_sql();

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM resources_tb r");
        push_filters(&mut count_qb, query);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new(RESOURCE_SELECT);
        push_filters(&mut qb, query);
        qb.push(format!(" ORDER BY r.{column} {dir}, r.id {dir} LIMIT "))
            .push_bind(window.limit)
            .push(" OFFSET ")
            .push_bind(window.offset());

        let data = qb
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_list_item)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::offset(data, window, total))
    }
}

#[async_trait]
impl ResourceStore for PgStore {
    async fn insert_resource(
        &self,
        resource: &NewResource,
        course_ids: &[Uuid],
        audit: &AuditEntry,
    ) -> LibraryResult<ResourceDetail> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO resources_tb (
                id, title, description, authors, category, department, publication_year,
                access_type, tags, cloudinary_id, cloudinary_url, cover_image_id,
                cover_image_url, file_type, file_size, uploaded_by_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(resource.id)
        .bind(&resource.title)
        .bind(&resource.description)
        .bind(&resource.authors)
        .bind(resource.category.as_str())
        .bind(&resource.department)
        .bind(resource.publication_year)
        .bind(resource.access_type.as_str())
        .bind(&resource.tags)
        .bind(resource.file.as_ref().map(|b| b.public_id.as_str()))
        .bind(resource.file.as_ref().map(|b| b.secure_url.as_str()))
        .bind(resource.cover.as_ref().map(|b| b.public_id.as_str()))
        .bind(resource.cover.as_ref().map(|b| b.secure_url.as_str()))
        .bind(&resource.file_type)
        .bind(resource.file_size)
        .bind(resource.uploaded_by_id)
        .execute(&mut *tx)
        .await?;

        link_courses(&mut *tx, resource.id, course_ids).await?;
        audit::record(&mut *tx, audit).await?;

        let detail = load_detail(&mut *tx, resource.id)
            .await?
            .ok_or_else(|| LibraryError::Internal("Inserted resource vanished".to_string()))?;
        tx.commit().await?;

        tracing::info!(resource_id = %resource.id, "Resource created");
        Ok(detail)
    }

    async fn find_resource(&self, id: Uuid) -> LibraryResult<Option<ResourceDetail>> {
        let mut conn = self.pool.acquire().await?;
        Ok(load_detail(&mut *conn, id).await?)
    }

    async fn get_resource(&self, id: Uuid) -> LibraryResult<Option<Resource>> {
        let row = sqlx::query("SELECT * FROM resources_tb WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_resource).transpose()?)
    }

    async fn list_resources(&self, query: &ResourceQuery) -> LibraryResult<Page<ResourceListItem>> {
        match query.cursor {
            Some(cursor) => self.list_by_cursor(query, cursor).await,
            None => self.list_by_offset(query).await,
        }
    }

    async fn update_resource(
        &self,
        id: Uuid,
        patch: &ResourcePatch,
        audit: &AuditEntry,
    ) -> LibraryResult<ResourceDetail> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT id FROM resources_tb WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(LibraryError::not_found("Resource"));
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE resources_tb SET updated_at = NOW()");
        if let Some(title) = &patch.title {
            qb.push(", title = ").push_bind(title.clone());
        }
        if let Some(description) = &patch.description {
            qb.push(", description = ").push_bind(description.clone());
        }
        if let Some(authors) = &patch.authors {
            qb.push(", authors = ").push_bind(authors.clone());
        }
        if let Some(category) = patch.category {
            qb.push(", category = ").push_bind(category.as_str());
        }
        if let Some(department) = &patch.department {
            qb.push(", department = ").push_bind(department.clone());
        }
        if let Some(year) = patch.publication_year {
            qb.push(", publication_year = ").push_bind(year);
        }
        if let Some(access_type) = patch.access_type {
            qb.push(", access_type = ").push_bind(access_type.as_str());
        }
        if let Some(tags) = &patch.tags {
            qb.push(", tags = ").push_bind(tags.clone());
        }
        if let Some(is_active) = patch.is_active {
            qb.push(", is_active = ").push_bind(is_active);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(&mut *tx).await?;

        if let Some(course_ids) = &patch.course_ids {
            sqlx::query("DELETE FROM course_resources_tb WHERE resource_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            link_courses(&mut *tx, id, course_ids).await?;
        }

        audit::record(&mut *tx, audit).await?;
        let detail = load_detail(&mut *tx, id)
            .await?
            .ok_or_else(|| LibraryError::not_found("Resource"))?;
        tx.commit().await?;
        Ok(detail)
    }

    async fn delete_resource(&self, id: Uuid, audit: &AuditEntry) -> LibraryResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM resources_tb WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("Resource"));
        }
        audit::record(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn record_download(&self, log: &DownloadLog) -> LibraryResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE resources_tb SET download_count = download_count + 1 WHERE id = $1",
        )
        .bind(log.resource_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("Resource"));
        }

        sqlx::query(
            r#"
            INSERT INTO download_logs_tb (id, user_id, resource_id, ip_address, user_agent, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(log.id)
        .bind(log.user_id)
        .bind(log.resource_id)
        .bind(&log.ip_address)
        .bind(&log.user_agent)
        .bind(log.timestamp)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn increment_view_count(&self, id: Uuid) -> LibraryResult<()> {
        let result = sqlx::query("UPDATE resources_tb SET view_count = view_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("Resource"));
        }
        Ok(())
    }

    async fn trending(&self, limit: i64) -> LibraryResult<Vec<TrendingResource>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, authors, category, department, download_count, view_count, created_at
            FROM resources_tb
            WHERE is_active = TRUE
            ORDER BY download_count DESC, view_count DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut trending = Vec::with_capacity(rows.len());
        for row in &rows {
            trending.push(TrendingResource {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                authors: row.try_get("authors")?,
                category: text_enum(row, "category")?,
                department: row.try_get("department")?,
                download_count: row.try_get("download_count")?,
                view_count: row.try_get("view_count")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(trending)
    }

    async fn latest(&self, limit: i64) -> LibraryResult<Vec<LatestResource>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, authors, category, department, created_at
            FROM resources_tb
            WHERE is_active = TRUE
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut latest = Vec::with_capacity(rows.len());
        for row in &rows {
            latest.push(LatestResource {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                authors: row.try_get("authors")?,
                category: text_enum(row, "category")?,
                department: row.try_get("department")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(latest)
    }

    async fn record_search(
        &self,
        user_id: Option<Uuid>,
        query: &str,
        result_count: i64,
    ) -> LibraryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO search_logs_tb (id, user_id, query, result_count, timestamp)
            VALUES ($1, $2, $3, $4, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(query)
        .bind(result_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CourseStore for PgStore {
    async fn insert_course(&self, course: &NewCourse) -> LibraryResult<CourseSummary> {
        let row = sqlx::query(
            r#"
            INSERT INTO courses_tb (id, code, title)
            VALUES ($1, $2, $3)
            RETURNING id, code, title
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&course.code)
        .bind(&course.title)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_course(&row)?)
    }

    async fn list_courses(&self) -> LibraryResult<Vec<CourseSummary>> {
        let rows = sqlx::query("SELECT id, code, title FROM courses_tb ORDER BY code")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(row_to_course)
            .collect::<Result<Vec<_>, _>>()?)
    }
}
