//! Notification store
//!
//! Read side of the persisted registry: subscribers, items, connected realms
//! and the notifications that tie them together. The polling core only reads;
//! registration happens elsewhere.

use crate::models::{
    ConnectedRealm, ItemId, Notification, NotificationKind, RealmId, Subscriber, SubscriberId,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Persistent registry of notifications and the records they reference
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Every notification currently registered
    async fn list_active_notifications(&self) -> Result<Vec<Notification>>;

    /// Display names of the given items; unknown ids are absent
    async fn lookup_item_names(&self, item_ids: &[ItemId]) -> Result<HashMap<ItemId, String>>;

    async fn lookup_partition(&self, realm_id: RealmId) -> Result<Option<ConnectedRealm>>;

    async fn lookup_subscriber(&self, subscriber_id: SubscriberId) -> Result<Option<Subscriber>>;

    /// Every known connected realm
    async fn list_partitions(&self) -> Result<Vec<ConnectedRealm>>;

    async fn lookup_subscriber_by_telegram(&self, telegram_id: i64) -> Result<Option<Subscriber>>;
}

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: i64,
    user_id: i64,
    connected_realm_id: i64,
    item_id: i64,
    kind: i16,
    price: i64,
    value: i64,
}

impl NotificationRow {
    /// Rows with an unknown kind or negative amounts are not evaluable
    fn into_notification(self) -> Option<Notification> {
        let kind = NotificationKind::from_code(self.kind)?;
        Some(Notification {
            id: self.id,
            subscriber_id: self.user_id,
            realm_id: self.connected_realm_id,
            item_id: self.item_id,
            kind,
            price: u64::try_from(self.price).ok()?,
            value: u64::try_from(self.value).ok()?,
        })
    }
}

#[derive(Debug, FromRow)]
struct RealmRow {
    id: i64,
    region: String,
    slug: String,
    name: String,
}

impl From<RealmRow> for ConnectedRealm {
    fn from(row: RealmRow) -> Self {
        ConnectedRealm {
            id: row.id,
            region: row.region,
            slug: row.slug,
            name: row.name,
        }
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    telegram_id: i64,
    level: i32,
}

impl From<UserRow> for Subscriber {
    fn from(row: UserRow) -> Self {
        Subscriber {
            id: row.id,
            telegram_id: row.telegram_id,
            level: row.level,
        }
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        telegram_id BIGINT NOT NULL UNIQUE,
        level INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id BIGINT PRIMARY KEY,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS connected_realms (
        id BIGINT PRIMARY KEY,
        region TEXT NOT NULL,
        slug TEXT NOT NULL,
        name TEXT NOT NULL,
        UNIQUE (region, slug)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        connected_realm_id BIGINT NOT NULL,
        item_id BIGINT NOT NULL,
        kind SMALLINT NOT NULL DEFAULT 0,
        price BIGINT NOT NULL,
        value BIGINT NOT NULL DEFAULT 0
    )
    "#,
];

/// Postgres-backed store
#[derive(Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the registry tables if they are missing
    pub async fn create_tables(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to create registry tables")?;
        }
        info!("Registry tables ready");
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn list_active_notifications(&self) -> Result<Vec<Notification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, connected_realm_id, item_id, kind, price, value
            FROM notifications
            ORDER BY connected_realm_id, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load notifications")?;

        let total = rows.len();
        let notifications: Vec<Notification> = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                let parsed = row.into_notification();
                if parsed.is_none() {
                    warn!("Ignoring malformed notification row {}", id);
                }
                parsed
            })
            .collect();

        debug!("Loaded {} of {} notification rows", notifications.len(), total);
        Ok(notifications)
    }

    async fn lookup_item_names(&self, item_ids: &[ItemId]) -> Result<HashMap<ItemId, String>> {
        if item_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM items WHERE id = ANY($1)")
                .bind(item_ids)
                .fetch_all(&self.pool)
                .await
                .context("Failed to load item names")?;

        Ok(rows.into_iter().collect())
    }

    async fn lookup_partition(&self, realm_id: RealmId) -> Result<Option<ConnectedRealm>> {
        let row: Option<RealmRow> =
            sqlx::query_as("SELECT id, region, slug, name FROM connected_realms WHERE id = $1")
                .bind(realm_id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to load connected realm")?;

        Ok(row.map(ConnectedRealm::from))
    }

    async fn lookup_subscriber(&self, subscriber_id: SubscriberId) -> Result<Option<Subscriber>> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, telegram_id, level FROM users WHERE id = $1")
                .bind(subscriber_id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to load subscriber")?;

        Ok(row.map(Subscriber::from))
    }

    async fn list_partitions(&self) -> Result<Vec<ConnectedRealm>> {
        let rows: Vec<RealmRow> =
            sqlx::query_as("SELECT id, region, slug, name FROM connected_realms ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .context("Failed to list connected realms")?;

        Ok(rows.into_iter().map(ConnectedRealm::from).collect())
    }

    async fn lookup_subscriber_by_telegram(&self, telegram_id: i64) -> Result<Option<Subscriber>> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, telegram_id, level FROM users WHERE telegram_id = $1")
                .bind(telegram_id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to load subscriber by telegram id")?;

        Ok(row.map(Subscriber::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(kind: i16, price: i64, value: i64) -> NotificationRow {
        NotificationRow {
            id: 7,
            user_id: 3,
            connected_realm_id: 1305,
            item_id: 2589,
            kind,
            price,
            value,
        }
    }

    #[test]
    fn test_row_conversion() {
        let n = row(2, 150, 20).into_notification().unwrap();
        assert_eq!(n.subscriber_id, 3);
        assert_eq!(n.realm_id, 1305);
        assert_eq!(n.kind, NotificationKind::AveragePrice);
        assert_eq!(n.price, 150);
        assert_eq!(n.value, 20);
    }

    #[test]
    fn test_malformed_rows_are_rejected() {
        assert!(row(9, 150, 0).into_notification().is_none());
        assert!(row(0, -1, 0).into_notification().is_none());
        assert!(row(0, 100, -5).into_notification().is_none());
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL pointing at a disposable Postgres
    async fn test_create_tables_and_list() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = crate::db::create_pool(&url, &crate::db::DbPoolConfig::default())
            .await
            .unwrap();
        let store = PgNotificationStore::new(pool);
        store.create_tables().await.unwrap();
        store.create_tables().await.unwrap();

        let notifications = store.list_active_notifications().await.unwrap();
        println!("{} notifications registered", notifications.len());
        assert!(store.lookup_item_names(&[]).await.unwrap().is_empty());
    }
}
