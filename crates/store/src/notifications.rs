//! Notification cooldown state and the dispatch audit log.

use crate::db::{iso_timestamp, ServerStore, StoreError};
use fleet_core::truncate_chars;
use serde::Serialize;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

pub const MAX_LOG_MESSAGE_CHARS: usize = 2000;
pub const MAX_LOG_DETAILS_CHARS: usize = 4000;

const UPSERT_STATE_SQL: &str = r#"
    INSERT INTO notification_state (key, last_sent)
    VALUES (?, ?)
    ON CONFLICT(key) DO UPDATE SET last_sent = excluded.last_sent
"#;

const INSERT_LOG_SQL: &str = r#"
    INSERT INTO notifications_log (server_id, rule, title, channel, status, message, details, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

/// One row of the audit log: a single dispatch attempt on one channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotificationLogEntry {
    pub server_id: String,
    pub rule: String,
    pub title: Option<String>,
    pub channel: String,
    pub status: String,
    pub message: Option<String>,
    pub details: Option<String>,
    pub created_at: String,
}

impl ServerStore {
    /// Epoch millis of the last dispatch under `key`, if any.
    pub async fn notification_last_sent(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let last = sqlx::query_scalar::<_, i64>("SELECT last_sent FROM notification_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(last)
    }

    pub async fn record_notification_sent(&self, key: &str, at_millis: i64) -> Result<(), StoreError> {
        sqlx::query(UPSERT_STATE_SQL)
            .bind(key)
            .bind(at_millis)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Append an audit row. Message and details are cut to their size bounds;
    /// `created_at` is taken from `at_millis`.
    pub async fn append_notification_log(
        &self,
        entry: &NotificationLogEntry,
        at_millis: i64,
    ) -> Result<i64, StoreError> {
        let result = log_insert(entry, at_millis).execute(&self.pool).await?;
        Ok(result.last_insert_rowid())
    }

    /// Audit rows of one dispatch plus its cooldown state, in one
    /// transaction: either all of them land or none do.
    pub async fn record_dispatch(
        &self,
        entries: &[NotificationLogEntry],
        key: &str,
        at_millis: i64,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            log_insert(entry, at_millis).execute(&mut *tx).await?;
        }
        sqlx::query(UPSERT_STATE_SQL)
            .bind(key)
            .bind(at_millis)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Most recent audit rows first.
    pub async fn recent_notification_log(&self, limit: i64) -> Result<Vec<NotificationLogEntry>, StoreError> {
        let rows = sqlx::query_as::<
            _,
            (
                Option<String>,
                Option<String>,
                Option<String>,
                Option<String>,
                Option<String>,
                Option<String>,
                Option<String>,
                String,
            ),
        >(
            r#"
            SELECT server_id, rule, title, channel, status, message, details, created_at
            FROM notifications_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(server_id, rule, title, channel, status, message, details, created_at)| {
                    NotificationLogEntry {
                        server_id: server_id.unwrap_or_default(),
                        rule: rule.unwrap_or_default(),
                        title,
                        channel: channel.unwrap_or_default(),
                        status: status.unwrap_or_default(),
                        message,
                        details,
                        created_at,
                    }
                },
            )
            .collect())
    }
}

fn log_insert(entry: &NotificationLogEntry, at_millis: i64) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    let message = entry
        .message
        .as_deref()
        .map(|m| truncate_chars(m, MAX_LOG_MESSAGE_CHARS));
    let details = entry
        .details
        .as_deref()
        .map(|d| truncate_chars(d, MAX_LOG_DETAILS_CHARS));

    sqlx::query(INSERT_LOG_SQL)
        .bind(&entry.server_id)
        .bind(&entry.rule)
        .bind(&entry.title)
        .bind(&entry.channel)
        .bind(&entry.status)
        .bind(message)
        .bind(details)
        .bind(iso_timestamp(at_millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_state_upsert() {
        let store = ServerStore::in_memory().await.unwrap();
        assert_eq!(store.notification_last_sent("bnb:pollFailed:default").await.unwrap(), None);

        store.record_notification_sent("bnb:pollFailed:default", 1_000).await.unwrap();
        store.record_notification_sent("bnb:pollFailed:default", 5_000).await.unwrap();
        assert_eq!(
            store.notification_last_sent("bnb:pollFailed:default").await.unwrap(),
            Some(5_000)
        );
    }

    #[tokio::test]
    async fn test_log_bounds() {
        let store = ServerStore::in_memory().await.unwrap();
        let entry = NotificationLogEntry {
            server_id: "bnb".to_string(),
            rule: "lowGas".to_string(),
            title: Some("Low Gas".to_string()),
            channel: "slack".to_string(),
            status: "sent".to_string(),
            message: Some("m".repeat(2500)),
            details: Some("d".repeat(5000)),
            created_at: String::new(),
        };
        store.append_notification_log(&entry, 0).await.unwrap();

        let logged = store.recent_notification_log(10).await.unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].message.as_ref().map(|m| m.len()), Some(MAX_LOG_MESSAGE_CHARS));
        assert_eq!(logged[0].details.as_ref().map(|d| d.len()), Some(MAX_LOG_DETAILS_CHARS));
        assert_eq!(logged[0].created_at, "1970-01-01T00:00:00.000Z");
    }

    fn entry(channel: &str) -> NotificationLogEntry {
        NotificationLogEntry {
            server_id: "bnb".to_string(),
            rule: "pollFailed".to_string(),
            channel: channel.to_string(),
            status: "sent".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_record_dispatch_writes_log_and_state() {
        let store = ServerStore::in_memory().await.unwrap();
        store
            .record_dispatch(&[entry("slack"), entry("telegram")], "bnb:pollFailed:default", 7_000)
            .await
            .unwrap();

        assert_eq!(store.recent_notification_log(10).await.unwrap().len(), 2);
        assert_eq!(
            store.notification_last_sent("bnb:pollFailed:default").await.unwrap(),
            Some(7_000)
        );
    }

    #[tokio::test]
    async fn test_record_dispatch_is_all_or_nothing() {
        let store = ServerStore::in_memory().await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_email BEFORE INSERT ON notifications_log \
             WHEN NEW.channel = 'email' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let result = store
            .record_dispatch(
                &[entry("slack"), entry("email"), entry("telegram")],
                "bnb:pollFailed:default",
                7_000,
            )
            .await;
        assert!(result.is_err());
        assert!(store.recent_notification_log(10).await.unwrap().is_empty());
        assert_eq!(store.notification_last_sent("bnb:pollFailed:default").await.unwrap(), None);
    }
}
