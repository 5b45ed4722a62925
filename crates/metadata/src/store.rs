//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult, classify_write_error};
use crate::repos::{
    AdminTokenRepo, CacheEntryRepo, StaticNodeRepo, TagRepo, TokenRepo, UpstreamRepo, UserRepo,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    UserRepo
    + TagRepo
    + UpstreamRepo
    + StaticNodeRepo
    + TokenRepo
    + CacheEntryRepo
    + AdminTokenRepo
    + Send
    + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// `query_timeout_secs` bounds how long a caller waits for the single
    /// pooled connection.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout_secs = query_timeout_secs.unwrap_or(30);

        let in_memory = path.as_os_str() == ":memory:";
        if !in_memory
            && let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path.display())
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // One connection: SQLite serializes writers anyway, and an
            // in-memory database only lives as long as its connection.
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .acquire_timeout(Duration::from_secs(query_timeout_secs.max(1)))
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "sqlite metadata store ready");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    /// Orders USER, then TAG, then GLOBAL; insertion order within a scope.
    const FOR_USER_ORDER: &str = "ORDER BY CASE scope WHEN 'USER' THEN 0 WHEN 'TAG' THEN 1 ELSE 2 END, rowid";

    fn filter_clause(filter: &SourceFilter) -> String {
        let mut clauses = Vec::new();
        if filter.scope.is_some() {
            clauses.push("scope = ?");
        }
        if filter.user_id.is_some() {
            clauses.push("user_id = ?");
        }
        if filter.tag_id.is_some() {
            clauses.push("tag_id = ?");
        }
        if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        }
    }

    #[async_trait]
    impl UserRepo for SqliteStore {
        async fn create_user(&self, user: &UserRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO users (user_id, label, email, description, is_active, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(user.user_id)
            .bind(&user.label)
            .bind(&user.email)
            .bind(&user.description)
            .bind(user.is_active)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| classify_write_error(e, format!("user label '{}'", user.label)))?;
            Ok(())
        }

        async fn get_user(&self, user_id: Uuid) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_user_by_label(&self, label: &str) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE label = ?")
                .bind(label)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_users(&self) -> MetadataResult<Vec<UserRow>> {
            let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY rowid DESC")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn update_user(&self, user: &UserRow) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE users SET label = ?, email = ?, description = ?, is_active = ?, updated_at = ? WHERE user_id = ?",
            )
            .bind(&user.label)
            .bind(&user.email)
            .bind(&user.description)
            .bind(user.is_active)
            .bind(user.updated_at)
            .bind(user.user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| classify_write_error(e, format!("user label '{}'", user.label)))?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("user {}", user.user_id)));
            }
            Ok(())
        }

        async fn delete_user(&self, user_id: Uuid) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM users WHERE user_id = ?")
                .bind(user_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn list_user_tag_ids(&self, user_id: Uuid) -> MetadataResult<Vec<Uuid>> {
            let ids: Vec<Uuid> = sqlx::query_scalar(
                "SELECT tag_id FROM user_tags WHERE user_id = ? ORDER BY rowid",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(ids)
        }

        async fn set_user_tags(&self, user_id: Uuid, tag_ids: &[Uuid]) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            sqlx::query("DELETE FROM user_tags WHERE user_id = ?")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

            for tag_id in tag_ids {
                sqlx::query("INSERT OR IGNORE INTO user_tags (user_id, tag_id) VALUES (?, ?)")
                    .bind(user_id)
                    .bind(tag_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| classify_write_error(e, format!("tag {tag_id}")))?;
            }

            tx.commit().await?;
            Ok(())
        }

        async fn add_tag_to_users(&self, tag_id: Uuid, user_ids: &[Uuid]) -> MetadataResult<u64> {
            let mut tx = self.pool.begin().await?;
            let mut added = 0;

            for user_id in user_ids {
                // Unknown users select nothing and are skipped.
                let result = sqlx::query(
                    "INSERT OR IGNORE INTO user_tags (user_id, tag_id) SELECT user_id, ? FROM users WHERE user_id = ?",
                )
                .bind(tag_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| classify_write_error(e, format!("tag {tag_id}")))?;
                added += result.rows_affected();
            }

            tx.commit().await?;
            Ok(added)
        }

        async fn list_user_ids_by_tag(&self, tag_id: Uuid) -> MetadataResult<Vec<Uuid>> {
            let ids: Vec<Uuid> = sqlx::query_scalar(
                "SELECT user_id FROM user_tags WHERE tag_id = ? ORDER BY rowid",
            )
            .bind(tag_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(ids)
        }
    }

    #[async_trait]
    impl TagRepo for SqliteStore {
        async fn create_tag(&self, tag: &TagRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO tags (tag_id, name, normalized_name, is_default, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(tag.tag_id)
            .bind(&tag.name)
            .bind(&tag.normalized_name)
            .bind(tag.is_default)
            .bind(tag.created_at)
            .bind(tag.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| classify_write_error(e, format!("tag name '{}'", tag.name)))?;
            Ok(())
        }

        async fn get_tag(&self, tag_id: Uuid) -> MetadataResult<Option<TagRow>> {
            let row = sqlx::query_as::<_, TagRow>("SELECT * FROM tags WHERE tag_id = ?")
                .bind(tag_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_tag_by_normalized_name(
            &self,
            normalized: &str,
        ) -> MetadataResult<Option<TagRow>> {
            let row =
                sqlx::query_as::<_, TagRow>("SELECT * FROM tags WHERE normalized_name = ?")
                    .bind(normalized)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn list_tags(&self) -> MetadataResult<Vec<TagRow>> {
            let rows = sqlx::query_as::<_, TagRow>("SELECT * FROM tags ORDER BY rowid DESC")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn update_tag(&self, tag: &TagRow) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE tags SET name = ?, normalized_name = ?, is_default = ?, updated_at = ? WHERE tag_id = ?",
            )
            .bind(&tag.name)
            .bind(&tag.normalized_name)
            .bind(tag.is_default)
            .bind(tag.updated_at)
            .bind(tag.tag_id)
            .execute(&self.pool)
            .await
            .map_err(|e| classify_write_error(e, format!("tag name '{}'", tag.name)))?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("tag {}", tag.tag_id)));
            }
            Ok(())
        }

        async fn delete_tag(&self, tag_id: Uuid) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM tags WHERE tag_id = ?")
                .bind(tag_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn list_default_tag_ids(&self) -> MetadataResult<Vec<Uuid>> {
            let ids: Vec<Uuid> =
                sqlx::query_scalar("SELECT tag_id FROM tags WHERE is_default = 1 ORDER BY rowid")
                    .fetch_all(&self.pool)
                    .await?;
            Ok(ids)
        }
    }

    #[async_trait]
    impl UpstreamRepo for SqliteStore {
        async fn create_upstream(&self, upstream: &UpstreamRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO upstreams (
                    upstream_id, name, url, scope, user_id, tag_id, enabled, kind,
                    last_fetch_status, last_fetch_at, last_error, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(upstream.upstream_id)
            .bind(&upstream.name)
            .bind(&upstream.url)
            .bind(&upstream.scope)
            .bind(upstream.user_id)
            .bind(upstream.tag_id)
            .bind(upstream.enabled)
            .bind(&upstream.kind)
            .bind(upstream.last_fetch_status)
            .bind(upstream.last_fetch_at)
            .bind(&upstream.last_error)
            .bind(upstream.created_at)
            .bind(upstream.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| classify_write_error(e, format!("upstream {}", upstream.upstream_id)))?;
            Ok(())
        }

        async fn get_upstream(&self, upstream_id: Uuid) -> MetadataResult<Option<UpstreamRow>> {
            let row =
                sqlx::query_as::<_, UpstreamRow>("SELECT * FROM upstreams WHERE upstream_id = ?")
                    .bind(upstream_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn list_upstreams(&self, filter: &SourceFilter) -> MetadataResult<Vec<UpstreamRow>> {
            let sql = format!(
                "SELECT * FROM upstreams {} ORDER BY rowid DESC",
                filter_clause(filter)
            );
            let mut query = sqlx::query_as::<_, UpstreamRow>(&sql);
            if let Some(scope) = filter.scope {
                query = query.bind(scope.as_str());
            }
            if let Some(user_id) = filter.user_id {
                query = query.bind(user_id);
            }
            if let Some(tag_id) = filter.tag_id {
                query = query.bind(tag_id);
            }
            Ok(query.fetch_all(&self.pool).await?)
        }

        async fn update_upstream(&self, upstream: &UpstreamRow) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE upstreams SET name = ?, url = ?, enabled = ?, kind = ?, updated_at = ? WHERE upstream_id = ?",
            )
            .bind(&upstream.name)
            .bind(&upstream.url)
            .bind(upstream.enabled)
            .bind(&upstream.kind)
            .bind(upstream.updated_at)
            .bind(upstream.upstream_id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "upstream {}",
                    upstream.upstream_id
                )));
            }
            Ok(())
        }

        async fn delete_upstream(&self, upstream_id: Uuid) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM upstreams WHERE upstream_id = ?")
                .bind(upstream_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn list_upstreams_for_user(
            &self,
            user_id: Uuid,
        ) -> MetadataResult<Vec<UpstreamRow>> {
            let sql = format!(
                r#"
                SELECT * FROM upstreams
                WHERE enabled = 1 AND (
                    (scope = 'USER' AND user_id = ?)
                    OR (scope = 'TAG' AND tag_id IN (SELECT tag_id FROM user_tags WHERE user_id = ?))
                    OR scope = 'GLOBAL'
                )
                {FOR_USER_ORDER}
                "#
            );
            let rows = sqlx::query_as::<_, UpstreamRow>(&sql)
                .bind(user_id)
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn update_upstream_fetch_status(
            &self,
            upstream_id: Uuid,
            status: &UpstreamFetchStatus,
        ) -> MetadataResult<()> {
            sqlx::query(
                "UPDATE upstreams SET last_fetch_status = ?, last_fetch_at = ?, last_error = ? WHERE upstream_id = ?",
            )
            .bind(status.status)
            .bind(status.fetched_at)
            .bind(&status.error)
            .bind(upstream_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl StaticNodeRepo for SqliteStore {
        async fn create_static_node(&self, node: &StaticNodeRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO static_nodes (
                    static_node_id, name, content, scope, user_id, tag_id, enabled, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(node.static_node_id)
            .bind(&node.name)
            .bind(&node.content)
            .bind(&node.scope)
            .bind(node.user_id)
            .bind(node.tag_id)
            .bind(node.enabled)
            .bind(node.created_at)
            .bind(node.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| classify_write_error(e, format!("static node {}", node.static_node_id)))?;
            Ok(())
        }

        async fn get_static_node(
            &self,
            static_node_id: Uuid,
        ) -> MetadataResult<Option<StaticNodeRow>> {
            let row = sqlx::query_as::<_, StaticNodeRow>(
                "SELECT * FROM static_nodes WHERE static_node_id = ?",
            )
            .bind(static_node_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_static_nodes(
            &self,
            filter: &SourceFilter,
        ) -> MetadataResult<Vec<StaticNodeRow>> {
            let sql = format!(
                "SELECT * FROM static_nodes {} ORDER BY rowid DESC",
                filter_clause(filter)
            );
            let mut query = sqlx::query_as::<_, StaticNodeRow>(&sql);
            if let Some(scope) = filter.scope {
                query = query.bind(scope.as_str());
            }
            if let Some(user_id) = filter.user_id {
                query = query.bind(user_id);
            }
            if let Some(tag_id) = filter.tag_id {
                query = query.bind(tag_id);
            }
            Ok(query.fetch_all(&self.pool).await?)
        }

        async fn update_static_node(&self, node: &StaticNodeRow) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE static_nodes SET name = ?, content = ?, enabled = ?, updated_at = ? WHERE static_node_id = ?",
            )
            .bind(&node.name)
            .bind(&node.content)
            .bind(node.enabled)
            .bind(node.updated_at)
            .bind(node.static_node_id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "static node {}",
                    node.static_node_id
                )));
            }
            Ok(())
        }

        async fn delete_static_node(&self, static_node_id: Uuid) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM static_nodes WHERE static_node_id = ?")
                .bind(static_node_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn list_static_nodes_for_user(
            &self,
            user_id: Uuid,
        ) -> MetadataResult<Vec<StaticNodeRow>> {
            let sql = format!(
                r#"
                SELECT * FROM static_nodes
                WHERE enabled = 1 AND (
                    (scope = 'USER' AND user_id = ?)
                    OR (scope = 'TAG' AND tag_id IN (SELECT tag_id FROM user_tags WHERE user_id = ?))
                    OR scope = 'GLOBAL'
                )
                {FOR_USER_ORDER}
                "#
            );
            let rows = sqlx::query_as::<_, StaticNodeRow>(&sql)
                .bind(user_id)
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }
    }

    async fn insert_token<'e, E>(executor: E, token: &TokenRow) -> MetadataResult<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO tokens (
                token_id, user_id, token_hash, scopes, expires_at,
                revoked_at, created_at, last_used_at, description
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(token.token_id)
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(&token.scopes)
        .bind(token.expires_at)
        .bind(token.revoked_at)
        .bind(token.created_at)
        .bind(token.last_used_at)
        .bind(&token.description)
        .execute(executor)
        .await
        .map_err(|e| classify_write_error(e, "token hash"))?;
        Ok(())
    }

    #[async_trait]
    impl TokenRepo for SqliteStore {
        async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
            insert_token(&self.pool, token).await
        }

        async fn get_token_by_hash(&self, token_hash: &str) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_id = ?")
                .bind(token_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
            sqlx::query("UPDATE tokens SET last_used_at = ? WHERE token_id = ?")
                .bind(used_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn revoke_token(
            &self,
            token_id: Uuid,
            revoked_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query("UPDATE tokens SET revoked_at = ? WHERE token_id = ?")
                .bind(revoked_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn revoke_user_tokens(
            &self,
            user_id: Uuid,
            revoked_at: OffsetDateTime,
        ) -> MetadataResult<u64> {
            let result = sqlx::query(
                "UPDATE tokens SET revoked_at = ? WHERE user_id = ? AND revoked_at IS NULL",
            )
            .bind(revoked_at)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        }

        async fn list_user_tokens(&self, user_id: Uuid) -> MetadataResult<Vec<TokenRow>> {
            let rows = sqlx::query_as::<_, TokenRow>(
                "SELECT * FROM tokens WHERE user_id = ? ORDER BY rowid DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl CacheEntryRepo for SqliteStore {
        async fn get_live_cache_entry(
            &self,
            user_id: Uuid,
            now: OffsetDateTime,
        ) -> MetadataResult<Option<CacheEntryRow>> {
            let row = sqlx::query_as::<_, CacheEntryRow>(
                "SELECT * FROM cache_entries WHERE user_id = ?",
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.filter(|entry| entry.is_live_at(now)))
        }

        async fn put_cache_entry(&self, entry: &CacheEntryRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO cache_entries (user_id, content_base64, etag, expires_at, created_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(user_id) DO UPDATE SET
                    content_base64 = excluded.content_base64,
                    etag = excluded.etag,
                    expires_at = excluded.expires_at,
                    created_at = excluded.created_at
                "#,
            )
            .bind(entry.user_id)
            .bind(&entry.content_base64)
            .bind(&entry.etag)
            .bind(entry.expires_at)
            .bind(entry.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| classify_write_error(e, format!("cache entry for user {}", entry.user_id)))?;
            Ok(())
        }

        async fn delete_cache_entries_for_users(&self, user_ids: &[Uuid]) -> MetadataResult<u64> {
            if user_ids.is_empty() {
                return Ok(0);
            }

            let mut tx = self.pool.begin().await?;
            let mut deleted = 0;
            for user_id in user_ids {
                let result = sqlx::query("DELETE FROM cache_entries WHERE user_id = ?")
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
                deleted += result.rows_affected();
            }
            tx.commit().await?;
            Ok(deleted)
        }

        async fn delete_all_cache_entries(&self) -> MetadataResult<u64> {
            let result = sqlx::query("DELETE FROM cache_entries")
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }

        async fn purge_expired_cache_entries(&self, now: OffsetDateTime) -> MetadataResult<u64> {
            let mut tx = self.pool.begin().await?;

            // Compared in Rust: stored timestamps are text and do not sort reliably.
            let entries: Vec<(Uuid, OffsetDateTime)> =
                sqlx::query_as("SELECT user_id, expires_at FROM cache_entries")
                    .fetch_all(&mut *tx)
                    .await?;

            let mut purged = 0;
            for (user_id, expires_at) in entries {
                if expires_at <= now {
                    let result = sqlx::query("DELETE FROM cache_entries WHERE user_id = ?")
                        .bind(user_id)
                        .execute(&mut *tx)
                        .await?;
                    purged += result.rows_affected();
                }
            }

            tx.commit().await?;
            Ok(purged)
        }
    }

    const UPSERT_ADMIN_MARKER: &str = r#"
        INSERT INTO admin_token_marker (id, token_id)
        VALUES (1, ?)
        ON CONFLICT(id) DO UPDATE SET token_id = excluded.token_id
    "#;

    #[async_trait]
    impl AdminTokenRepo for SqliteStore {
        async fn admin_token_id(&self) -> MetadataResult<Option<Uuid>> {
            let value: Option<Option<Uuid>> =
                sqlx::query_scalar("SELECT token_id FROM admin_token_marker WHERE id = 1")
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(value.flatten())
        }

        async fn mark_admin_token(&self, token_id: Uuid) -> MetadataResult<()> {
            sqlx::query(UPSERT_ADMIN_MARKER)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn rotate_admin_token(
            &self,
            token: &TokenRow,
            now: OffsetDateTime,
        ) -> MetadataResult<Option<Uuid>> {
            let mut tx = self.pool.begin().await?;

            let previous: Option<Option<Uuid>> =
                sqlx::query_scalar("SELECT token_id FROM admin_token_marker WHERE id = 1")
                    .fetch_optional(&mut *tx)
                    .await?;
            let previous = previous.flatten().filter(|id| *id != token.token_id);

            if let Some(prev_id) = previous {
                sqlx::query(
                    "UPDATE tokens SET revoked_at = ? WHERE token_id = ? AND revoked_at IS NULL",
                )
                .bind(now)
                .bind(prev_id)
                .execute(&mut *tx)
                .await?;
            }

            insert_token(&mut *tx, token).await?;
            sqlx::query(UPSERT_ADMIN_MARKER)
                .bind(token.token_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(previous)
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Subscribers
CREATE TABLE IF NOT EXISTS users (
    user_id BLOB PRIMARY KEY,
    label TEXT NOT NULL UNIQUE,
    email TEXT,
    description TEXT NOT NULL DEFAULT '',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    tag_id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    normalized_name TEXT NOT NULL UNIQUE,
    is_default INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tags_default ON tags(is_default);

CREATE TABLE IF NOT EXISTS user_tags (
    user_id BLOB NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    tag_id BLOB NOT NULL REFERENCES tags(tag_id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, tag_id)
);
CREATE INDEX IF NOT EXISTS idx_user_tags_tag ON user_tags(tag_id);

-- Sources. Scope and target must agree.
CREATE TABLE IF NOT EXISTS upstreams (
    upstream_id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    scope TEXT NOT NULL CHECK (scope IN ('GLOBAL', 'TAG', 'USER')),
    user_id BLOB REFERENCES users(user_id) ON DELETE CASCADE,
    tag_id BLOB REFERENCES tags(tag_id) ON DELETE CASCADE,
    enabled INTEGER NOT NULL DEFAULT 1,
    kind TEXT,
    last_fetch_status INTEGER,
    last_fetch_at TEXT,
    last_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (
        (scope = 'GLOBAL' AND user_id IS NULL AND tag_id IS NULL)
        OR (scope = 'USER' AND user_id IS NOT NULL AND tag_id IS NULL)
        OR (scope = 'TAG' AND tag_id IS NOT NULL AND user_id IS NULL)
    )
);
CREATE INDEX IF NOT EXISTS idx_upstreams_scope ON upstreams(scope, enabled);
CREATE INDEX IF NOT EXISTS idx_upstreams_user ON upstreams(user_id);
CREATE INDEX IF NOT EXISTS idx_upstreams_tag ON upstreams(tag_id);

CREATE TABLE IF NOT EXISTS static_nodes (
    static_node_id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    content TEXT NOT NULL,
    scope TEXT NOT NULL CHECK (scope IN ('GLOBAL', 'TAG', 'USER')),
    user_id BLOB REFERENCES users(user_id) ON DELETE CASCADE,
    tag_id BLOB REFERENCES tags(tag_id) ON DELETE CASCADE,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (
        (scope = 'GLOBAL' AND user_id IS NULL AND tag_id IS NULL)
        OR (scope = 'USER' AND user_id IS NOT NULL AND tag_id IS NULL)
        OR (scope = 'TAG' AND tag_id IS NOT NULL AND user_id IS NULL)
    )
);
CREATE INDEX IF NOT EXISTS idx_static_nodes_scope ON static_nodes(scope, enabled);
CREATE INDEX IF NOT EXISTS idx_static_nodes_user ON static_nodes(user_id);
CREATE INDEX IF NOT EXISTS idx_static_nodes_tag ON static_nodes(tag_id);

-- Admin tokens (user_id NULL) and subscription tokens
CREATE TABLE IF NOT EXISTS tokens (
    token_id BLOB PRIMARY KEY,
    user_id BLOB REFERENCES users(user_id) ON DELETE CASCADE,
    token_hash TEXT NOT NULL UNIQUE,
    scopes TEXT NOT NULL,
    expires_at TEXT,
    revoked_at TEXT,
    created_at TEXT NOT NULL,
    last_used_at TEXT,
    description TEXT
);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id);

-- One rendered subscription per user
CREATE TABLE IF NOT EXISTS cache_entries (
    user_id BLOB PRIMARY KEY REFERENCES users(user_id) ON DELETE CASCADE,
    content_base64 TEXT NOT NULL,
    etag TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Single row naming the token created from admin.token_hash
CREATE TABLE IF NOT EXISTS admin_token_marker (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    token_id BLOB
);
"#;
