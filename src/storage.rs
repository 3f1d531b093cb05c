pub mod entities;

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use time::OffsetDateTime;
use tracing::{error, info, instrument};

use crate::content::{ContentItem, ContentKind, ContentStatus};

pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        let pool = SqlitePoolOptions::new()
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(db_path)
                    .foreign_keys(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .create_if_missing(true),
            )
            .await
            .with_context(|| anyhow!("could not open a SQLite database `{}`", db_path.display()))?;
        info!("Using an SQLite database `{}`", db_path.display());

        Self::migrate(pool).await
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let options: SqliteConnectOptions = "sqlite::memory:"
            .parse()
            .context("could not parse the in-memory database URL")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("could not open an in-memory SQLite database")?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!()
            .run(&pool)
            .await
            .with_context(|| anyhow!("could not prepare a database schema"))?;

        Ok(Self { pool })
    }

    pub async fn begin(&self) -> Result<Tx> {
        self.pool
            .begin()
            .await
            .context("could not begin a new DB transaction")
            .map(Tx)
    }
}

pub struct Tx(Transaction<'static, Sqlite>);

impl Tx {
    pub async fn commit(self) -> Result<()> {
        self.0
            .commit()
            .await
            .context("could not commit a DB transaction")
    }

    /// Lists published items of the given kinds whose publication date is strictly before `cutoff`,
    /// newest first.
    #[instrument(level = "TRACE", skip(self))]
    pub async fn get_published_before(
        &mut self,
        kinds: &[ContentKind],
        cutoff: OffsetDateTime,
    ) -> Result<Vec<ContentItem>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, kind, status, title, published_at, edit_url, permalink
            FROM content
            WHERE status = ",
        );
        query.push_bind(ContentStatus::Publish.as_str());
        query.push(" AND published_at < ");
        query.push_bind(cutoff.unix_timestamp());
        query.push(" AND kind IN (");

        let mut separated = query.separated(", ");

        for kind in kinds {
            separated.push_bind(kind.as_str());
        }

        separated.push_unseparated(") ORDER BY published_at DESC, id DESC");

        let rows: Vec<entities::Content> = query
            .build_query_as()
            .fetch_all(self.0.as_mut())
            .await
            .context("could not retrieve published content")?;

        let mut result = Vec::with_capacity(rows.len());

        for row in rows {
            let id = row.id;

            match Self::content_from_row(row) {
                Ok(item) => result.push(item),
                Err(e) => error!(content_id = id, "Skipping a malformed content row: {e:#}"),
            }
        }

        Ok(result)
    }

    fn content_from_row(row: entities::Content) -> Result<ContentItem> {
        let published_at = OffsetDateTime::from_unix_timestamp(row.published_at)
            .with_context(|| anyhow!("invalid publication date {}", row.published_at))?;

        Ok(ContentItem {
            id: row.id,
            kind: row.kind.parse()?,
            status: row.status.parse()?,
            title: row.title,
            published_at,
            edit_url: row.edit_url,
            permalink: row.permalink,
        })
    }

    #[cfg(test)]
    pub async fn store_content(&mut self, item: &ContentItem) -> Result<()> {
        sqlx::query(
            "INSERT
            INTO content (id, kind, status, title, published_at, edit_url, permalink)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (id) DO UPDATE SET
              kind = excluded.kind,
              status = excluded.status,
              title = excluded.title,
              published_at = excluded.published_at,
              edit_url = excluded.edit_url,
              permalink = excluded.permalink",
        )
        .bind(item.id)
        .bind(item.kind.as_str())
        .bind(item.status.as_str())
        .bind(&item.title)
        .bind(item.published_at.unix_timestamp())
        .bind(&item.edit_url)
        .bind(&item.permalink)
        .execute(self.0.as_mut())
        .await
        .context("could not store a content item")?;

        Ok(())
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn get_option(&mut self, name: &str) -> Result<Option<String>> {
        sqlx::query_scalar(
            "SELECT value
            FROM options
            WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(self.0.as_mut())
        .await
        .with_context(|| anyhow!("could not retrieve the option `{name}`"))
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT
            INTO options (name, value)
            VALUES (?1, ?2)
            ON CONFLICT (name) DO UPDATE SET value = excluded.value",
        )
        .bind(name)
        .bind(value)
        .execute(self.0.as_mut())
        .await
        .with_context(|| anyhow!("could not update the option `{name}`"))?;

        Ok(())
    }

    /// Stores `value` unless the option already exists. Returns whether it was stored.
    #[instrument(level = "TRACE", skip(self))]
    pub async fn add_option(&mut self, name: &str, value: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT
            INTO options (name, value)
            VALUES (?1, ?2)
            ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .bind(value)
        .execute(self.0.as_mut())
        .await
        .with_context(|| anyhow!("could not add the option `{name}`"))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use time::macros::datetime;

    use super::*;

    fn item(
        id: i64,
        kind: ContentKind,
        status: ContentStatus,
        published_at: OffsetDateTime,
    ) -> ContentItem {
        ContentItem {
            id,
            kind,
            status,
            title: format!("Item {id}"),
            published_at,
            edit_url: format!("https://example.com/admin/edit/{id}"),
            permalink: format!("https://example.com/?p={id}"),
        }
    }

    #[tokio::test]
    async fn test_options_round_trip() {
        let storage = Storage::in_memory().await.unwrap();
        let mut tx = storage.begin().await.unwrap();

        assert_eq!(tx.get_option("days_until_stale").await.unwrap(), None);

        tx.set_option("days_until_stale", "365").await.unwrap();
        assert_eq!(
            tx.get_option("days_until_stale").await.unwrap().as_deref(),
            Some("365")
        );

        tx.set_option("days_until_stale", "30").await.unwrap();
        assert_eq!(
            tx.get_option("days_until_stale").await.unwrap().as_deref(),
            Some("30")
        );
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_add_option_keeps_existing_value() {
        let storage = Storage::in_memory().await.unwrap();
        let mut tx = storage.begin().await.unwrap();

        assert!(tx.add_option("email_enabled", "0").await.unwrap());
        assert!(!tx.add_option("email_enabled", "1").await.unwrap());
        assert_eq!(
            tx.get_option("email_enabled").await.unwrap().as_deref(),
            Some("0")
        );
    }

    #[tokio::test]
    async fn test_published_before_filters_and_orders() {
        let storage = Storage::in_memory().await.unwrap();
        let mut tx = storage.begin().await.unwrap();

        let old = datetime!(2026-01-01 00:00 UTC);
        let older = datetime!(2025-06-01 00:00 UTC);
        let recent = datetime!(2026-10-01 00:00 UTC);

        for item in [
            item(1, ContentKind::Post, ContentStatus::Publish, older),
            item(2, ContentKind::Page, ContentStatus::Publish, old),
            item(3, ContentKind::Post, ContentStatus::Draft, older),
            item(4, ContentKind::Attachment, ContentStatus::Publish, older),
            item(5, ContentKind::Post, ContentStatus::Publish, recent),
            item(6, ContentKind::Post, ContentStatus::Publish, old),
        ] {
            tx.store_content(&item).await.unwrap();
        }

        let items = tx
            .get_published_before(
                &[ContentKind::Post, ContentKind::Page],
                datetime!(2026-09-01 00:00 UTC),
            )
            .await
            .unwrap();
        let ids = items.iter().map(|item| item.id).collect::<Vec<_>>();

        assert_eq!(ids, vec![6, 2, 1]);
    }

    #[tokio::test]
    async fn test_malformed_rows_are_skipped() {
        let storage = Storage::in_memory().await.unwrap();
        let mut tx = storage.begin().await.unwrap();

        tx.store_content(&item(
            1,
            ContentKind::Post,
            ContentStatus::Publish,
            datetime!(2020-01-01 00:00 UTC),
        ))
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO content (id, kind, status, title, published_at, edit_url, permalink)
            VALUES (2, 'post', 'publish', 'Bad date', -999999999999999, '', '')",
        )
        .execute(tx.0.as_mut())
        .await
        .unwrap();

        let items = tx
            .get_published_before(&[ContentKind::Post], OffsetDateTime::now_utc())
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 1);
    }
}
