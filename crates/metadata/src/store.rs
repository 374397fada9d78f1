//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{
    BootstrapRepo, ConflictRepo, DeviceRepo, OrphanRepo, PhotoRepo, SyncRepo, UserRepo,
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
    PhotoRepo
    + OrphanRepo
    + ConflictRepo
    + DeviceRepo
    + SyncRepo
    + UserRepo
    + BootstrapRepo
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
    /// Create a new SQLite store.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection avoids
            // persistent "database is locked" failures under axum concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        if let Some(secs) = query_timeout_secs {
            tracing::debug!(
                query_timeout_secs = secs,
                "SQLite query timeout is advisory only; statements cannot be cancelled"
            );
        }
        tracing::info!(path = %path.display(), "catalog database ready");

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

/// Turn a UNIQUE failure into `AlreadyExists`, leaving other errors as they are.
fn map_unique(err: sqlx::Error, what: impl FnOnce() -> String) -> MetadataError {
    let err = MetadataError::from(err);
    if err.is_unique_violation(None) {
        MetadataError::AlreadyExists(what())
    } else {
        err
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use crate::repos::{ConflictFilter, FeedPosition, OrphanAssignment, OrphanFilter};
    use photosync_core::{ConflictStatus, OrphanStatus};
    use sqlx::QueryBuilder;
    use time::OffsetDateTime;
    use uuid::Uuid;

    async fn insert_photo_on<'e, E>(executor: E, photo: &PhotoRow) -> MetadataResult<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO photos (
                id, owner_user_id, origin_device_id, original_filename, stored_path,
                content_hash, file_size, date_taken, uploaded_at, width, height,
                thumbnail_small, thumbnail_medium, thumbnail_large,
                camera_make, camera_model, latitude, longitude, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(photo.id)
        .bind(photo.owner_user_id)
        .bind(photo.origin_device_id)
        .bind(&photo.original_filename)
        .bind(&photo.stored_path)
        .bind(&photo.content_hash)
        .bind(photo.file_size)
        .bind(photo.date_taken)
        .bind(photo.uploaded_at)
        .bind(photo.width)
        .bind(photo.height)
        .bind(&photo.thumbnail_small)
        .bind(&photo.thumbnail_medium)
        .bind(&photo.thumbnail_large)
        .bind(&photo.camera_make)
        .bind(&photo.camera_model)
        .bind(photo.latitude)
        .bind(photo.longitude)
        .bind(photo.updated_at)
        .execute(executor)
        .await
        .map_err(|e| {
            map_unique(e, || {
                format!(
                    "photo with content hash {} or path {}",
                    photo.content_hash, photo.stored_path
                )
            })
        })?;
        Ok(())
    }

    #[async_trait]
    impl PhotoRepo for SqliteStore {
        async fn insert_photo(&self, photo: &PhotoRow) -> MetadataResult<()> {
            insert_photo_on(&self.pool, photo).await
        }

        async fn get_photo(&self, id: Uuid) -> MetadataResult<Option<PhotoRow>> {
            let row = sqlx::query_as::<_, PhotoRow>("SELECT * FROM photos WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_photo_by_hash(&self, content_hash: &str) -> MetadataResult<Option<PhotoRow>> {
            let row = sqlx::query_as::<_, PhotoRow>(
                r#"
                SELECT * FROM photos
                WHERE content_hash = ?
                ORDER BY owner_user_id IS NULL, uploaded_at, id
                LIMIT 1
                "#,
            )
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_photo_by_path(&self, stored_path: &str) -> MetadataResult<Option<PhotoRow>> {
            let row = sqlx::query_as::<_, PhotoRow>("SELECT * FROM photos WHERE stored_path = ?")
                .bind(stored_path)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn existing_hashes(&self, hashes: &[String]) -> MetadataResult<Vec<String>> {
            if hashes.is_empty() {
                return Ok(Vec::new());
            }
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT DISTINCT content_hash FROM photos WHERE content_hash IN (");
            let mut separated = qb.separated(", ");
            for hash in hashes {
                separated.push_bind(hash.clone());
            }
            separated.push_unseparated(")");
            let found = qb
                .build_query_scalar::<String>()
                .fetch_all(&self.pool)
                .await?;
            Ok(found)
        }

        async fn list_photos_for_user(
            &self,
            user_id: Uuid,
            skip: u32,
            take: u32,
        ) -> MetadataResult<Vec<PhotoRow>> {
            let rows = sqlx::query_as::<_, PhotoRow>(
                r#"
                SELECT * FROM photos
                WHERE owner_user_id = ?
                ORDER BY uploaded_at DESC, id DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(user_id)
            .bind(i64::from(take))
            .bind(i64::from(skip))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn count_photos_for_user(&self, user_id: Uuid) -> MetadataResult<i64> {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM photos WHERE owner_user_id = ?")
                    .bind(user_id)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count)
        }

        async fn update_photo_path(
            &self,
            id: Uuid,
            stored_path: &str,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result =
                sqlx::query("UPDATE photos SET stored_path = ?, updated_at = ? WHERE id = ?")
                    .bind(stored_path)
                    .bind(updated_at)
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| map_unique(e, || format!("stored path {stored_path}")))?;
            Ok(result.rows_affected() > 0)
        }

        async fn set_thumbnails(
            &self,
            id: Uuid,
            thumbnails: &ThumbnailUpdate,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                UPDATE photos SET
                    thumbnail_small = COALESCE(?, thumbnail_small),
                    thumbnail_medium = COALESCE(?, thumbnail_medium),
                    thumbnail_large = COALESCE(?, thumbnail_large),
                    width = COALESCE(?, width),
                    height = COALESCE(?, height),
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&thumbnails.small)
            .bind(&thumbnails.medium)
            .bind(&thumbnails.large)
            .bind(thumbnails.width)
            .bind(thumbnails.height)
            .bind(updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn list_photos_missing_thumbnails(
            &self,
            limit: u32,
        ) -> MetadataResult<Vec<PhotoRow>> {
            let rows = sqlx::query_as::<_, PhotoRow>(
                r#"
                SELECT * FROM photos
                WHERE thumbnail_small IS NULL
                   OR thumbnail_medium IS NULL
                   OR thumbnail_large IS NULL
                ORDER BY uploaded_at, id
                LIMIT ?
                "#,
            )
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_photo(&self, id: Uuid) -> MetadataResult<Option<PhotoRow>> {
            let row =
                sqlx::query_as::<_, PhotoRow>("DELETE FROM photos WHERE id = ? RETURNING *")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }
    }

    fn push_orphan_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: OrphanFilter) {
        qb.push(" WHERE 1 = 1");
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str().to_string());
        }
        if filter.unassigned_only {
            qb.push(" AND assigned_to_user IS NULL");
        }
        if let Some(user_id) = filter.visible_to {
            qb.push(" AND (assigned_to_user = ")
                .push_bind(user_id)
                .push(" OR (assigned_to_user IS NULL AND embedded_user_id = ")
                .push_bind(user_id)
                .push("))");
        }
    }

    #[async_trait]
    impl OrphanRepo for SqliteStore {
        async fn upsert_orphan(
            &self,
            orphan: &OrphanFileRow,
        ) -> MetadataResult<(OrphanFileRow, bool)> {
            // Only pending rows take fresh observations; claimed and ignored
            // rows are an audit record and just note that the file is still there.
            let row = sqlx::query_as::<_, OrphanFileRow>(
                r#"
                INSERT INTO orphan_files (
                    id, file_path, file_size, file_hash, discovered_at, last_seen_at,
                    embedded_photo_id, embedded_user_id, embedded_device_id,
                    embedded_file_hash, embedded_uploaded_at,
                    status, status_changed_at, status_changed_by,
                    assigned_to_user, assigned_to_device, claimed_photo_id, notes
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(file_path) DO UPDATE SET
                    last_seen_at = excluded.last_seen_at,
                    file_size = CASE WHEN orphan_files.status = 'pending'
                        THEN excluded.file_size ELSE orphan_files.file_size END,
                    file_hash = CASE
                        WHEN orphan_files.status <> 'pending' THEN orphan_files.file_hash
                        WHEN orphan_files.file_size <> excluded.file_size THEN excluded.file_hash
                        ELSE COALESCE(excluded.file_hash, orphan_files.file_hash) END,
                    embedded_photo_id = CASE WHEN orphan_files.status = 'pending'
                        THEN excluded.embedded_photo_id ELSE orphan_files.embedded_photo_id END,
                    embedded_user_id = CASE WHEN orphan_files.status = 'pending'
                        THEN excluded.embedded_user_id ELSE orphan_files.embedded_user_id END,
                    embedded_device_id = CASE WHEN orphan_files.status = 'pending'
                        THEN excluded.embedded_device_id ELSE orphan_files.embedded_device_id END,
                    embedded_file_hash = CASE WHEN orphan_files.status = 'pending'
                        THEN excluded.embedded_file_hash ELSE orphan_files.embedded_file_hash END,
                    embedded_uploaded_at = CASE WHEN orphan_files.status = 'pending'
                        THEN excluded.embedded_uploaded_at ELSE orphan_files.embedded_uploaded_at END
                RETURNING *
                "#,
            )
            .bind(orphan.id)
            .bind(&orphan.file_path)
            .bind(orphan.file_size)
            .bind(&orphan.file_hash)
            .bind(orphan.discovered_at)
            .bind(orphan.last_seen_at)
            .bind(orphan.embedded_photo_id)
            .bind(orphan.embedded_user_id)
            .bind(orphan.embedded_device_id)
            .bind(&orphan.embedded_file_hash)
            .bind(orphan.embedded_uploaded_at)
            .bind(&orphan.status)
            .bind(orphan.status_changed_at)
            .bind(orphan.status_changed_by)
            .bind(orphan.assigned_to_user)
            .bind(orphan.assigned_to_device)
            .bind(orphan.claimed_photo_id)
            .bind(&orphan.notes)
            .fetch_one(&self.pool)
            .await?;
            let inserted = row.id == orphan.id;
            Ok((row, inserted))
        }

        async fn get_orphan(&self, id: Uuid) -> MetadataResult<Option<OrphanFileRow>> {
            let row = sqlx::query_as::<_, OrphanFileRow>("SELECT * FROM orphan_files WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_orphan_by_path(
            &self,
            file_path: &str,
        ) -> MetadataResult<Option<OrphanFileRow>> {
            let row = sqlx::query_as::<_, OrphanFileRow>(
                "SELECT * FROM orphan_files WHERE file_path = ?",
            )
            .bind(file_path)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_orphans(
            &self,
            filter: OrphanFilter,
            skip: u32,
            take: u32,
        ) -> MetadataResult<Vec<OrphanFileRow>> {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM orphan_files");
            push_orphan_filter(&mut qb, filter);
            qb.push(" ORDER BY discovered_at DESC, id LIMIT ")
                .push_bind(i64::from(take))
                .push(" OFFSET ")
                .push_bind(i64::from(skip));
            let rows = qb
                .build_query_as::<OrphanFileRow>()
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn count_orphans(&self, filter: OrphanFilter) -> MetadataResult<i64> {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT COUNT(*) FROM orphan_files");
            push_orphan_filter(&mut qb, filter);
            let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
            Ok(count)
        }

        async fn assign_orphan(
            &self,
            id: Uuid,
            expected: OrphanAssignment,
            assignment: OrphanAssignment,
            changed_by: Option<Uuid>,
            changed_at: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                UPDATE orphan_files SET
                    assigned_to_user = ?,
                    assigned_to_device = ?,
                    status_changed_at = ?,
                    status_changed_by = ?
                WHERE id = ?
                  AND status = 'pending'
                  AND assigned_to_user IS ?
                  AND assigned_to_device IS ?
                "#,
            )
            .bind(assignment.user_id)
            .bind(assignment.device_id)
            .bind(changed_at)
            .bind(changed_by)
            .bind(id)
            .bind(expected.user_id)
            .bind(expected.device_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn transition_orphan(
            &self,
            id: Uuid,
            from: OrphanStatus,
            to: OrphanStatus,
            changed_by: Option<Uuid>,
            changed_at: OffsetDateTime,
            notes: Option<&str>,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                UPDATE orphan_files SET
                    status = ?,
                    status_changed_at = ?,
                    status_changed_by = ?,
                    notes = COALESCE(?, notes)
                WHERE id = ? AND status = ?
                "#,
            )
            .bind(to.as_str())
            .bind(changed_at)
            .bind(changed_by)
            .bind(notes)
            .bind(id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn claim_orphan(
            &self,
            id: Uuid,
            photo: &PhotoRow,
            claimed_by: Option<Uuid>,
            claimed_at: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let mut tx = self.pool.begin().await?;

            let result = sqlx::query(
                r#"
                UPDATE orphan_files SET
                    status = 'claimed',
                    status_changed_at = ?,
                    status_changed_by = ?,
                    claimed_photo_id = ?,
                    file_hash = ?
                WHERE id = ? AND status = 'pending'
                "#,
            )
            .bind(claimed_at)
            .bind(claimed_by)
            .bind(photo.id)
            .bind(&photo.content_hash)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(false);
            }

            // Dropping the transaction on error rolls the status change back.
            insert_photo_on(&mut *tx, photo).await?;
            tx.commit().await?;
            Ok(true)
        }

        async fn delete_orphan(&self, id: Uuid) -> MetadataResult<Option<OrphanFileRow>> {
            let row = sqlx::query_as::<_, OrphanFileRow>(
                "DELETE FROM orphan_files WHERE id = ? RETURNING *",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }
    }

    fn push_conflict_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: ConflictFilter) {
        qb.push(" WHERE 1 = 1");
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str().to_string());
        }
        if let Some(conflict_type) = filter.conflict_type {
            qb.push(" AND conflict_type = ")
                .push_bind(conflict_type.as_str().to_string());
        }
    }

    #[async_trait]
    impl ConflictRepo for SqliteStore {
        async fn upsert_conflict(
            &self,
            conflict: &FileConflictRow,
        ) -> MetadataResult<(FileConflictRow, bool)> {
            let row = sqlx::query_as::<_, FileConflictRow>(
                r#"
                INSERT INTO file_conflicts (
                    id, photo_id, file_path, discovered_at, last_seen_at, conflict_type,
                    db_photo_id, db_user_id, db_device_id,
                    file_photo_id, file_user_id, file_device_id,
                    status, resolved_at, resolved_by, resolution_notes
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(photo_id, file_path) DO UPDATE SET
                    last_seen_at = excluded.last_seen_at,
                    conflict_type = CASE WHEN file_conflicts.status = 'pending'
                        THEN excluded.conflict_type ELSE file_conflicts.conflict_type END,
                    db_photo_id = CASE WHEN file_conflicts.status = 'pending'
                        THEN excluded.db_photo_id ELSE file_conflicts.db_photo_id END,
                    db_user_id = CASE WHEN file_conflicts.status = 'pending'
                        THEN excluded.db_user_id ELSE file_conflicts.db_user_id END,
                    db_device_id = CASE WHEN file_conflicts.status = 'pending'
                        THEN excluded.db_device_id ELSE file_conflicts.db_device_id END,
                    file_photo_id = CASE WHEN file_conflicts.status = 'pending'
                        THEN excluded.file_photo_id ELSE file_conflicts.file_photo_id END,
                    file_user_id = CASE WHEN file_conflicts.status = 'pending'
                        THEN excluded.file_user_id ELSE file_conflicts.file_user_id END,
                    file_device_id = CASE WHEN file_conflicts.status = 'pending'
                        THEN excluded.file_device_id ELSE file_conflicts.file_device_id END
                RETURNING *
                "#,
            )
            .bind(conflict.id)
            .bind(conflict.photo_id)
            .bind(&conflict.file_path)
            .bind(conflict.discovered_at)
            .bind(conflict.last_seen_at)
            .bind(&conflict.conflict_type)
            .bind(conflict.db_photo_id)
            .bind(conflict.db_user_id)
            .bind(conflict.db_device_id)
            .bind(conflict.file_photo_id)
            .bind(conflict.file_user_id)
            .bind(conflict.file_device_id)
            .bind(&conflict.status)
            .bind(conflict.resolved_at)
            .bind(conflict.resolved_by)
            .bind(&conflict.resolution_notes)
            .fetch_one(&self.pool)
            .await?;
            let inserted = row.id == conflict.id;
            Ok((row, inserted))
        }

        async fn get_conflict(&self, id: Uuid) -> MetadataResult<Option<FileConflictRow>> {
            let row =
                sqlx::query_as::<_, FileConflictRow>("SELECT * FROM file_conflicts WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn get_conflict_for(
            &self,
            photo_id: Uuid,
            file_path: &str,
        ) -> MetadataResult<Option<FileConflictRow>> {
            let row = sqlx::query_as::<_, FileConflictRow>(
                "SELECT * FROM file_conflicts WHERE photo_id = ? AND file_path = ?",
            )
            .bind(photo_id)
            .bind(file_path)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_conflicts(
            &self,
            filter: ConflictFilter,
            skip: u32,
            take: u32,
        ) -> MetadataResult<Vec<FileConflictRow>> {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM file_conflicts");
            push_conflict_filter(&mut qb, filter);
            qb.push(" ORDER BY discovered_at DESC, id LIMIT ")
                .push_bind(i64::from(take))
                .push(" OFFSET ")
                .push_bind(i64::from(skip));
            let rows = qb
                .build_query_as::<FileConflictRow>()
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn count_conflicts(&self, filter: ConflictFilter) -> MetadataResult<i64> {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT COUNT(*) FROM file_conflicts");
            push_conflict_filter(&mut qb, filter);
            let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
            Ok(count)
        }

        async fn conflict_stats(&self) -> MetadataResult<ConflictStats> {
            let by_status: Vec<(String, i64)> = sqlx::query_as(
                "SELECT status, COUNT(*) FROM file_conflicts GROUP BY status ORDER BY status",
            )
            .fetch_all(&self.pool)
            .await?;
            let by_type: Vec<(String, i64)> = sqlx::query_as(
                r#"
                SELECT conflict_type, COUNT(*) FROM file_conflicts
                WHERE status = 'pending'
                GROUP BY conflict_type ORDER BY conflict_type
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(ConflictStats { by_status, by_type })
        }

        async fn close_conflict(
            &self,
            id: Uuid,
            to: ConflictStatus,
            resolved_by: Option<Uuid>,
            resolved_at: OffsetDateTime,
            notes: Option<&str>,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                UPDATE file_conflicts SET
                    status = ?,
                    resolved_at = ?,
                    resolved_by = ?,
                    resolution_notes = COALESCE(?, resolution_notes)
                WHERE id = ? AND status = 'pending'
                "#,
            )
            .bind(to.as_str())
            .bind(resolved_at)
            .bind(resolved_by)
            .bind(notes)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn resolve_conflict_with_file(
            &self,
            id: Uuid,
            photo_id: Uuid,
            owner_user_id: Option<Uuid>,
            origin_device_id: Option<Uuid>,
            resolved_by: Option<Uuid>,
            resolved_at: OffsetDateTime,
            notes: Option<&str>,
        ) -> MetadataResult<bool> {
            let mut tx = self.pool.begin().await?;

            let result = sqlx::query(
                r#"
                UPDATE file_conflicts SET
                    status = ?,
                    resolved_at = ?,
                    resolved_by = ?,
                    resolution_notes = COALESCE(?, resolution_notes)
                WHERE id = ? AND status = 'pending'
                "#,
            )
            .bind(ConflictStatus::ResolvedFile.as_str())
            .bind(resolved_at)
            .bind(resolved_by)
            .bind(notes)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(false);
            }

            let updated = sqlx::query(
                r#"
                UPDATE photos SET owner_user_id = ?, origin_device_id = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(owner_user_id)
            .bind(origin_device_id)
            .bind(resolved_at)
            .bind(photo_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_unique(e, || format!("owned photo with the content of {photo_id}")))?;

            if updated.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(MetadataError::NotFound(format!("photo {photo_id}")));
            }

            tx.commit().await?;
            Ok(true)
        }
    }

    #[async_trait]
    impl DeviceRepo for SqliteStore {
        async fn create_device(&self, device: &DeviceRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO devices (device_id, user_id, device_name, platform, created_at, last_seen_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(device.device_id)
            .bind(device.user_id)
            .bind(&device.device_name)
            .bind(&device.platform)
            .bind(device.created_at)
            .bind(device.last_seen_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique(e, || format!("device {}", device.device_id)))?;
            Ok(())
        }

        async fn get_device(&self, device_id: Uuid) -> MetadataResult<Option<DeviceRow>> {
            let row = sqlx::query_as::<_, DeviceRow>("SELECT * FROM devices WHERE device_id = ?")
                .bind(device_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_devices_for_user(&self, user_id: Uuid) -> MetadataResult<Vec<DeviceRow>> {
            let rows = sqlx::query_as::<_, DeviceRow>(
                "SELECT * FROM devices WHERE user_id = ? ORDER BY created_at, device_id",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn touch_device(
            &self,
            device_id: Uuid,
            seen_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query("UPDATE devices SET last_seen_at = ? WHERE device_id = ?")
                .bind(seen_at)
                .bind(device_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl SyncRepo for SqliteStore {
        async fn catalog_version(&self) -> MetadataResult<i64> {
            let version: i64 =
                sqlx::query_scalar("SELECT version FROM catalog_state WHERE id = 1")
                    .fetch_one(&self.pool)
                    .await?;
            Ok(version)
        }

        async fn sync_counts(&self, user_id: Uuid, device_id: Uuid) -> MetadataResult<SyncCounts> {
            let (total, this_device, other_devices, legacy): (i64, i64, i64, i64) =
                sqlx::query_as(
                    r#"
                    SELECT
                        COUNT(*),
                        COALESCE(SUM(CASE WHEN origin_device_id = ? THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN origin_device_id IS NOT NULL
                                           AND origin_device_id <> ? THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN origin_device_id IS NULL THEN 1 ELSE 0 END), 0)
                    FROM photos
                    WHERE owner_user_id = ?
                    "#,
                )
                .bind(device_id)
                .bind(device_id)
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
            Ok(SyncCounts {
                total,
                this_device,
                other_devices,
                legacy,
            })
        }

        async fn sync_page(
            &self,
            user_id: Uuid,
            after: Option<FeedPosition>,
            since: Option<OffsetDateTime>,
            limit: u32,
        ) -> MetadataResult<Vec<SyncPhotoRow>> {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                r#"
                SELECT p.*, d.device_name AS origin_device_name, d.platform AS origin_platform
                FROM photos p
                LEFT JOIN devices d ON d.device_id = p.origin_device_id
                WHERE p.owner_user_id = "#,
            );
            qb.push_bind(user_id);
            if let Some(since) = since {
                qb.push(" AND p.uploaded_at >= ").push_bind(since);
            }
            if let Some(after) = after {
                // Composite (uploaded_at, id) comparison; ids alone do not follow upload order.
                qb.push(" AND (p.uploaded_at > ")
                    .push_bind(after.uploaded_at)
                    .push(" OR (p.uploaded_at = ")
                    .push_bind(after.uploaded_at)
                    .push(" AND p.id > ")
                    .push_bind(after.id)
                    .push("))");
            }
            qb.push(" ORDER BY p.uploaded_at ASC, p.id ASC LIMIT ")
                .push_bind(i64::from(limit));

            let rows = qb
                .build_query_as::<SyncPhotoRow>()
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn get_sync_state(
            &self,
            device_id: Uuid,
        ) -> MetadataResult<Option<DeviceSyncStateRow>> {
            let row = sqlx::query_as::<_, DeviceSyncStateRow>(
                "SELECT * FROM device_sync_state WHERE device_id = ?",
            )
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn ensure_sync_state(
            &self,
            device_id: Uuid,
            user_id: Uuid,
            now: OffsetDateTime,
        ) -> MetadataResult<DeviceSyncStateRow> {
            sqlx::query(
                r#"
                INSERT INTO device_sync_state (device_id, user_id, sync_version, created_at, updated_at)
                VALUES (?, ?, 0, ?, ?)
                ON CONFLICT(device_id) DO NOTHING
                "#,
            )
            .bind(device_id)
            .bind(user_id)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            self.get_sync_state(device_id).await?.ok_or_else(|| {
                MetadataError::Internal(format!("sync state for device {device_id} vanished"))
            })
        }

        async fn record_sync(
            &self,
            device_id: Uuid,
            synced_at: OffsetDateTime,
            last: FeedPosition,
            sync_version: i64,
        ) -> MetadataResult<()> {
            sqlx::query(
                r#"
                UPDATE device_sync_state SET
                    last_sync_at = ?,
                    last_sync_photo_id = ?,
                    last_sync_uploaded_at = ?,
                    sync_version = MAX(sync_version, ?),
                    updated_at = ?
                WHERE device_id = ?
                "#,
            )
            .bind(synced_at)
            .bind(last.id)
            .bind(last.uploaded_at)
            .bind(sync_version)
            .bind(synced_at)
            .bind(device_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn legacy_photos(&self, user_id: Uuid, limit: u32) -> MetadataResult<Vec<PhotoRow>> {
            let rows = sqlx::query_as::<_, PhotoRow>(
                r#"
                SELECT * FROM photos
                WHERE owner_user_id = ? AND origin_device_id IS NULL
                ORDER BY uploaded_at, id
                LIMIT ?
                "#,
            )
            .bind(user_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn count_legacy_photos(&self, user_id: Uuid) -> MetadataResult<i64> {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM photos WHERE owner_user_id = ? AND origin_device_id IS NULL",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(count)
        }

        async fn claim_legacy(
            &self,
            user_id: Uuid,
            device_id: Uuid,
            photo_ids: Option<&[Uuid]>,
            claimed_at: OffsetDateTime,
        ) -> MetadataResult<Vec<Uuid>> {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("UPDATE photos SET origin_device_id = ");
            qb.push_bind(device_id)
                .push(", updated_at = ")
                .push_bind(claimed_at)
                .push(" WHERE owner_user_id = ")
                .push_bind(user_id)
                .push(" AND origin_device_id IS NULL");
            if let Some(ids) = photo_ids {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                qb.push(" AND id IN (");
                let mut separated = qb.separated(", ");
                for id in ids {
                    separated.push_bind(*id);
                }
                separated.push_unseparated(")");
            }
            qb.push(" RETURNING id");

            let claimed = qb
                .build_query_scalar::<Uuid>()
                .fetch_all(&self.pool)
                .await?;
            Ok(claimed)
        }
    }

    #[async_trait]
    impl UserRepo for SqliteStore {
        async fn create_user(&self, user: &UserRow) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO users (user_id, username, is_admin, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(user.user_id)
            .bind(&user.username)
            .bind(user.is_admin)
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique(e, || format!("username '{}'", user.username)))?;
            Ok(())
        }

        async fn get_user(&self, user_id: Uuid) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_user_by_username(&self, username: &str) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO api_tokens (
                    token_id, user_id, token_hash, created_at,
                    last_used_at, revoked_at, description
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(token.token_id)
            .bind(token.user_id)
            .bind(&token.token_hash)
            .bind(token.created_at)
            .bind(token.last_used_at)
            .bind(token.revoked_at)
            .bind(&token.description)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique(e, || "token hash".to_string()))?;
            Ok(())
        }

        async fn get_token_by_hash(&self, token_hash: &str) -> MetadataResult<Option<TokenRow>> {
            let row =
                sqlx::query_as::<_, TokenRow>("SELECT * FROM api_tokens WHERE token_hash = ?")
                    .bind(token_hash)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM api_tokens WHERE token_id = ?")
                .bind(token_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
            sqlx::query("UPDATE api_tokens SET last_used_at = ? WHERE token_id = ?")
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
            sqlx::query("UPDATE api_tokens SET revoked_at = ? WHERE token_id = ?")
                .bind(revoked_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn list_tokens_for_user(&self, user_id: Uuid) -> MetadataResult<Vec<TokenRow>> {
            let rows = sqlx::query_as::<_, TokenRow>(
                "SELECT * FROM api_tokens WHERE user_id = ? ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl BootstrapRepo for SqliteStore {
        async fn get_bootstrap_token_id(&self) -> MetadataResult<Option<Uuid>> {
            let value: Option<Option<String>> =
                sqlx::query_scalar("SELECT bootstrap_token_id FROM bootstrap_state WHERE id = 1")
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(value
                .flatten()
                .filter(|id| !id.is_empty())
                .map(|id| {
                    Uuid::parse_str(&id).map_err(|e| {
                        MetadataError::Internal(format!(
                            "invalid bootstrap_token_id uuid '{id}': {e}"
                        ))
                    })
                })
                .transpose()?)
        }

        async fn set_bootstrap_token_id(&self, token_id: Uuid) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO bootstrap_state (id, bootstrap_token_id)
                VALUES (1, ?)
                ON CONFLICT(id) DO UPDATE
                SET bootstrap_token_id = excluded.bootstrap_token_id
                "#,
            )
            .bind(token_id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }
}

impl std::convert::From<std::io::Error> for crate::MetadataError {
    fn from(e: std::io::Error) -> Self {
        crate::MetadataError::Config(e.to_string())
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Users and API tokens
CREATE TABLE IF NOT EXISTS users (
    user_id BLOB PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    is_admin INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS api_tokens (
    token_id BLOB PRIMARY KEY,
    user_id BLOB NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    token_hash TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    last_used_at TEXT,
    revoked_at TEXT,
    description TEXT
);
CREATE INDEX IF NOT EXISTS idx_api_tokens_user ON api_tokens(user_id);

CREATE TABLE IF NOT EXISTS bootstrap_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    bootstrap_token_id TEXT
);

-- Devices
CREATE TABLE IF NOT EXISTS devices (
    device_id BLOB PRIMARY KEY,
    user_id BLOB NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    device_name TEXT NOT NULL,
    platform TEXT,
    created_at TEXT NOT NULL,
    last_seen_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_devices_user ON devices(user_id);

-- Photo catalog
CREATE TABLE IF NOT EXISTS photos (
    id BLOB PRIMARY KEY,
    owner_user_id BLOB REFERENCES users(user_id),
    origin_device_id BLOB REFERENCES devices(device_id),
    original_filename TEXT NOT NULL,
    stored_path TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    date_taken TEXT NOT NULL,
    uploaded_at TEXT NOT NULL,
    width INTEGER,
    height INTEGER,
    thumbnail_small TEXT,
    thumbnail_medium TEXT,
    thumbnail_large TEXT,
    camera_make TEXT,
    camera_model TEXT,
    latitude REAL,
    longitude REAL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_photos_stored_path ON photos(stored_path);
-- Dedup key: one owned photo per content hash
CREATE UNIQUE INDEX IF NOT EXISTS idx_photos_owned_hash
ON photos(content_hash) WHERE owner_user_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_photos_hash ON photos(content_hash);
-- Sync feed order
CREATE INDEX IF NOT EXISTS idx_photos_feed ON photos(owner_user_id, uploaded_at, id);
CREATE INDEX IF NOT EXISTS idx_photos_origin ON photos(owner_user_id, origin_device_id);

-- Monotonic catalog version, bumped by every photo mutation
CREATE TABLE IF NOT EXISTS catalog_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL
);
INSERT OR IGNORE INTO catalog_state (id, version) VALUES (1, 0);

CREATE TRIGGER IF NOT EXISTS trg_photos_version_insert AFTER INSERT ON photos
BEGIN
    UPDATE catalog_state SET version = version + 1 WHERE id = 1;
END;
CREATE TRIGGER IF NOT EXISTS trg_photos_version_update AFTER UPDATE ON photos
BEGIN
    UPDATE catalog_state SET version = version + 1 WHERE id = 1;
END;
CREATE TRIGGER IF NOT EXISTS trg_photos_version_delete AFTER DELETE ON photos
BEGIN
    UPDATE catalog_state SET version = version + 1 WHERE id = 1;
END;

-- Files on disk without a catalog record
CREATE TABLE IF NOT EXISTS orphan_files (
    id BLOB PRIMARY KEY,
    file_path TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    file_hash TEXT,
    discovered_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    embedded_photo_id BLOB,
    embedded_user_id BLOB,
    embedded_device_id BLOB,
    embedded_file_hash TEXT,
    embedded_uploaded_at TEXT,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'ignored', 'claimed')),
    status_changed_at TEXT,
    status_changed_by BLOB,
    assigned_to_user BLOB,
    assigned_to_device BLOB,
    claimed_photo_id BLOB,
    notes TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_orphan_files_path ON orphan_files(file_path);
CREATE INDEX IF NOT EXISTS idx_orphan_files_status ON orphan_files(status, discovered_at);
CREATE INDEX IF NOT EXISTS idx_orphan_files_assigned ON orphan_files(assigned_to_user);

-- Catalog records whose embedded metadata disagrees with the database.
-- photo_id is a weak reference; the photo may be deleted later.
CREATE TABLE IF NOT EXISTS file_conflicts (
    id BLOB PRIMARY KEY,
    photo_id BLOB NOT NULL,
    file_path TEXT NOT NULL,
    discovered_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    conflict_type TEXT NOT NULL
        CHECK (conflict_type IN ('photoIdMismatch', 'userIdMismatch', 'deviceIdMismatch')),
    db_photo_id BLOB,
    db_user_id BLOB,
    db_device_id BLOB,
    file_photo_id BLOB,
    file_user_id BLOB,
    file_device_id BLOB,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'resolvedDB', 'resolvedFile', 'ignored')),
    resolved_at TEXT,
    resolved_by BLOB,
    resolution_notes TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_file_conflicts_photo_path ON file_conflicts(photo_id, file_path);
CREATE INDEX IF NOT EXISTS idx_file_conflicts_status ON file_conflicts(status, discovered_at);

-- Per-device sync bookkeeping
CREATE TABLE IF NOT EXISTS device_sync_state (
    device_id BLOB PRIMARY KEY REFERENCES devices(device_id) ON DELETE CASCADE,
    user_id BLOB NOT NULL,
    last_sync_at TEXT,
    last_sync_photo_id BLOB,
    last_sync_uploaded_at TEXT,
    sync_version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
