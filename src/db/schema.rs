use sqlx::PgPool;

/// Create tables and indexes if missing
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Initializing PostgreSQL schema...");

    for (name, ddl) in STATEMENTS {
        sqlx::query(ddl).execute(pool).await.map_err(|e| {
            tracing::error!("Failed to apply {}: {}", name, e);
            e
        })?;
    }

    tracing::info!("PostgreSQL schema ready ({} statements)", STATEMENTS.len());
    Ok(())
}

const STATEMENTS: [(&str, &str); 14] = [
    ("users_tb", CREATE_USERS_TABLE),
    ("courses_tb", CREATE_COURSES_TABLE),
    ("resources_tb", CREATE_RESOURCES_TABLE),
    ("course_resources_tb", CREATE_COURSE_RESOURCES_TABLE),
    ("download_logs_tb", CREATE_DOWNLOAD_LOGS_TABLE),
    ("search_logs_tb", CREATE_SEARCH_LOGS_TABLE),
    ("requests_tb", CREATE_REQUESTS_TABLE),
    ("audit_logs_tb", CREATE_AUDIT_LOGS_TABLE),
    ("refresh_tokens_tb", CREATE_REFRESH_TOKENS_TABLE),
    ("idx_resources_listing", CREATE_RESOURCES_LISTING_INDEX),
    ("idx_resources_tags", CREATE_RESOURCES_TAGS_INDEX),
    ("idx_download_logs_resource", CREATE_DOWNLOAD_LOGS_INDEX),
    ("idx_audit_logs_timestamp", CREATE_AUDIT_LOGS_INDEX),
    ("idx_requests_user", CREATE_REQUESTS_USER_INDEX),
];

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users_tb (
    id UUID PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'STUDENT',
    email_verified BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_COURSES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS courses_tb (
    id UUID PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_RESOURCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS resources_tb (
    id UUID PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT,
    authors TEXT[] NOT NULL,
    category TEXT NOT NULL,
    department TEXT NOT NULL,
    publication_year INTEGER,
    access_type TEXT NOT NULL DEFAULT 'DOWNLOADABLE',
    tags TEXT[] NOT NULL DEFAULT '{}',
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    download_count BIGINT NOT NULL DEFAULT 0,
    view_count BIGINT NOT NULL DEFAULT 0,
    cloudinary_id TEXT,
    cloudinary_url TEXT,
    cover_image_id TEXT,
    cover_image_url TEXT,
    file_type TEXT,
    file_size BIGINT,
    uploaded_by_id UUID NOT NULL REFERENCES users_tb(id) ON DELETE RESTRICT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_COURSE_RESOURCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS course_resources_tb (
    course_id UUID NOT NULL REFERENCES courses_tb(id) ON DELETE CASCADE,
    resource_id UUID NOT NULL REFERENCES resources_tb(id) ON DELETE CASCADE,
    PRIMARY KEY (course_id, resource_id)
)
"#;

const CREATE_DOWNLOAD_LOGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS download_logs_tb (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL REFERENCES users_tb(id) ON DELETE CASCADE,
    resource_id UUID NOT NULL REFERENCES resources_tb(id) ON DELETE CASCADE,
    ip_address TEXT,
    user_agent TEXT,
    timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_SEARCH_LOGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS search_logs_tb (
    id UUID PRIMARY KEY,
    user_id UUID REFERENCES users_tb(id) ON DELETE SET NULL,
    query TEXT NOT NULL,
    result_count BIGINT NOT NULL DEFAULT 0,
    timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_REQUESTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS requests_tb (
    id UUID PRIMARY KEY,
    title TEXT NOT NULL,
    authors TEXT,
    reason TEXT NOT NULL,
    category TEXT,
    status TEXT NOT NULL DEFAULT 'OPEN',
    admin_reply TEXT,
    resolved_at TIMESTAMPTZ,
    user_id UUID NOT NULL REFERENCES users_tb(id) ON DELETE CASCADE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT requests_resolved_at_matches_status CHECK (
        (status IN ('RESOLVED', 'REJECTED')) = (resolved_at IS NOT NULL)
    )
)
"#;

// performed_by_id has no FK: audit rows outlive the users they mention
const CREATE_AUDIT_LOGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS audit_logs_tb (
    id UUID PRIMARY KEY,
    entity TEXT NOT NULL,
    entity_id UUID NOT NULL,
    action TEXT NOT NULL,
    performed_by_id UUID NOT NULL,
    meta JSONB NOT NULL DEFAULT '{}'::jsonb,
    timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_REFRESH_TOKENS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS refresh_tokens_tb (
    jti UUID PRIMARY KEY,
    user_id UUID NOT NULL REFERENCES users_tb(id) ON DELETE CASCADE,
    expires_at TIMESTAMPTZ NOT NULL,
    revoked_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_RESOURCES_LISTING_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_resources_listing
    ON resources_tb (is_active, created_at DESC, id DESC)
"#;

const CREATE_RESOURCES_TAGS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_resources_tags ON resources_tb USING GIN (tags)
"#;

const CREATE_DOWNLOAD_LOGS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_download_logs_resource ON download_logs_tb (resource_id)
"#;

const CREATE_AUDIT_LOGS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs_tb (timestamp DESC)
"#;

const CREATE_REQUESTS_USER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_requests_user ON requests_tb (user_id, created_at DESC)
"#;
