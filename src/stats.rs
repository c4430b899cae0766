//! Durable per-user counters behind the leaderboard.
//!
//! The room engine only ever bumps counters fire-and-forget; nothing here is
//! consulted for live room state.

use std::{collections::HashMap, str::FromStr, sync::Arc};

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tokio::sync::Mutex;
use tracing::warn;

pub const LEADERBOARD_SIZE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    Messages,
    RoomJoins,
}

impl Counter {
    fn table(self) -> &'static str {
        match self {
            Counter::Messages => "message_counts",
            Counter::RoomJoins => "room_joins",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CounterEntry {
    pub username: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Leaderboard {
    pub messages: Vec<CounterEntry>,
    pub rooms: Vec<CounterEntry>,
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn increment(&self, counter: Counter, username: &str) -> anyhow::Result<()>;

    /// Highest counts first.
    async fn top(&self, counter: Counter, limit: u32) -> anyhow::Result<Vec<CounterEntry>>;
}

/// Bumps a counter in the background. Failures are logged and dropped.
pub fn record(gateway: &Arc<dyn PersistenceGateway>, counter: Counter, username: &str) {
    let gateway = Arc::clone(gateway);
    let username = username.to_owned();
    tokio::spawn(async move {
        if let Err(err) = gateway.increment(counter, &username).await {
            warn!(?counter, %username, "counter update failed: {err:#}");
        }
    });
}

pub async fn leaderboard(gateway: &dyn PersistenceGateway) -> Leaderboard {
    let messages = gateway.top(Counter::Messages, LEADERBOARD_SIZE).await;
    let rooms = gateway.top(Counter::RoomJoins, LEADERBOARD_SIZE).await;
    Leaderboard {
        messages: messages.unwrap_or_else(|err| {
            warn!("reading message leaderboard failed: {err:#}");
            Vec::new()
        }),
        rooms: rooms.unwrap_or_else(|err| {
            warn!("reading room leaderboard failed: {err:#}");
            Vec::new()
        }),
    }
}

pub struct SqliteStats {
    db_pool: SqlitePool,
}

impl SqliteStats {
    pub async fn connect(database_url: &str) -> anyhow::Result<SqliteStats> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let db_pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await?;
        let stats = SqliteStats { db_pool };
        stats.migrate().await?;
        Ok(stats)
    }

    pub fn from_pool(db_pool: SqlitePool) -> SqliteStats {
        SqliteStats { db_pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        for counter in [Counter::Messages, Counter::RoomJoins] {
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {} (username TEXT PRIMARY KEY, count INTEGER DEFAULT 0)",
                counter.table()
            ))
            .execute(&self.db_pool)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for SqliteStats {
    async fn increment(&self, counter: Counter, username: &str) -> anyhow::Result<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (username, count) VALUES (?, 1) \
             ON CONFLICT(username) DO UPDATE SET count = count + 1",
            counter.table()
        ))
        .bind(username)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    async fn top(&self, counter: Counter, limit: u32) -> anyhow::Result<Vec<CounterEntry>> {
        let rows = sqlx::query_as::<_, CounterEntry>(&format!(
            "SELECT username, count FROM {} ORDER BY count DESC LIMIT ?",
            counter.table()
        ))
        .bind(limit)
        .fetch_all(&self.db_pool)
        .await?;
        Ok(rows)
    }
}

/// Counters kept in process memory, for running without a database.
#[derive(Default)]
pub struct MemoryStats {
    counts: Mutex<HashMap<(Counter, String), i64>>,
}

impl MemoryStats {
    pub fn new() -> MemoryStats {
        MemoryStats::default()
    }

    pub async fn get(&self, counter: Counter, username: &str) -> i64 {
        self.counts
            .lock()
            .await
            .get(&(counter, username.to_owned()))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl PersistenceGateway for MemoryStats {
    async fn increment(&self, counter: Counter, username: &str) -> anyhow::Result<()> {
        *self.counts.lock().await.entry((counter, username.to_owned())).or_insert(0) += 1;
        Ok(())
    }

    async fn top(&self, counter: Counter, limit: u32) -> anyhow::Result<Vec<CounterEntry>> {
        let counts = self.counts.lock().await;
        let mut entries: Vec<CounterEntry> = counts
            .iter()
            .filter(|((c, _), _)| *c == counter)
            .map(|((_, username), count)| CounterEntry { username: username.clone(), count: *count })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.username.cmp(&b.username)));
        entries.truncate(limit as usize);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    #[async_trait]
    impl PersistenceGateway for Broken {
        async fn increment(&self, _: Counter, _: &str) -> anyhow::Result<()> {
            anyhow::bail!("disk on fire")
        }

        async fn top(&self, _: Counter, _: u32) -> anyhow::Result<Vec<CounterEntry>> {
            anyhow::bail!("disk on fire")
        }
    }

    #[tokio::test]
    async fn memory_top_orders_by_count() {
        let stats = MemoryStats::new();
        for _ in 0..3 {
            stats.increment(Counter::Messages, "bob").await.unwrap();
        }
        stats.increment(Counter::Messages, "alice").await.unwrap();
        stats.increment(Counter::RoomJoins, "alice").await.unwrap();

        let top = stats.top(Counter::Messages, 10).await.unwrap();
        assert_eq!(
            top,
            vec![
                CounterEntry { username: "bob".to_owned(), count: 3 },
                CounterEntry { username: "alice".to_owned(), count: 1 },
            ]
        );
        assert_eq!(stats.top(Counter::Messages, 1).await.unwrap().len(), 1);
        assert_eq!(stats.get(Counter::RoomJoins, "alice").await, 1);
    }

    #[tokio::test]
    async fn broken_gateway_yields_empty_leaderboard() {
        assert_eq!(leaderboard(&Broken).await, Leaderboard::default());
    }

    #[tokio::test]
    async fn sqlite_counts_upsert() {
        // one connection, or every pooled connection gets its own empty memory db
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let stats = SqliteStats::from_pool(db_pool);
        stats.migrate().await.unwrap();
        stats.increment(Counter::RoomJoins, "alice").await.unwrap();
        stats.increment(Counter::RoomJoins, "alice").await.unwrap();
        stats.increment(Counter::RoomJoins, "bob").await.unwrap();

        let board = leaderboard(&stats).await;
        assert!(board.messages.is_empty());
        assert_eq!(board.rooms[0], CounterEntry { username: "alice".to_owned(), count: 2 });
        assert_eq!(board.rooms.len(), 2);
    }
}
