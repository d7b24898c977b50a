use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const DB_FILE: &str = "reelpick.sqlite3";

pub struct Storage {
    conn: Connection,
}

/// One row of the watch history list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchEntry {
    /// `"{series}:{episode}"`
    pub id: String,
    pub series: String,
    pub episode: String,
    pub title: String,
    pub episode_number: Option<u32>,
    pub watched_at: i64,
}

impl WatchEntry {
    pub fn new(
        series: &str,
        episode: &str,
        title: &str,
        episode_number: Option<u32>,
        watched_at: i64,
    ) -> Self {
        Self {
            id: format!("{series}:{episode}"),
            series: series.to_string(),
            episode: episode.to_string(),
            title: title.to_string(),
            episode_number,
            watched_at,
        }
    }
}

impl Storage {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }

        let conn = Connection::open(path).with_context(|| format!("open {}", path.display()))?;
        let s = Self { conn };
        s.init_schema()?;
        Ok(s)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(
                r#"
CREATE TABLE IF NOT EXISTS response_cache (
  key TEXT PRIMARY KEY,
  url TEXT NOT NULL,
  body TEXT NOT NULL,
  expires_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS watch_history (
  id TEXT PRIMARY KEY,
  series TEXT NOT NULL,
  episode TEXT NOT NULL,
  title TEXT NOT NULL,
  episode_number INTEGER,
  watched_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_watch_history_watched_at ON watch_history(watched_at DESC);
"#,
            )
            .context("init schema")?;
        Ok(())
    }

    /// Stored body and its expiry (unix millis), fresh or not.
    pub fn get_response(&self, key: &str) -> anyhow::Result<Option<(String, i64)>> {
        self.conn
            .query_row(
                "SELECT body, expires_at FROM response_cache WHERE key=?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("query response cache")
    }

    pub fn put_response(
        &self,
        key: &str,
        url: &str,
        body: &str,
        expires_at: i64,
        now: i64,
    ) -> anyhow::Result<()> {
        self.conn
            .execute(
                r#"
INSERT INTO response_cache(key, url, body, expires_at, updated_at)
VALUES(?1, ?2, ?3, ?4, ?5)
ON CONFLICT(key) DO UPDATE SET
  url=excluded.url,
  body=excluded.body,
  expires_at=excluded.expires_at,
  updated_at=excluded.updated_at
"#,
                params![key, url, body, expires_at, now],
            )
            .context("cache response")?;
        Ok(())
    }

    pub fn clear_responses(&self) -> anyhow::Result<usize> {
        self.conn
            .execute("DELETE FROM response_cache", [])
            .context("clear response cache")
    }

    /// Insert or move `entry` to the front, then keep only the `limit` most
    /// recent rows.
    pub fn record_watch(&self, entry: &WatchEntry, limit: usize) -> anyhow::Result<()> {
        self.conn
            .execute(
                r#"
INSERT OR REPLACE INTO watch_history(id, series, episode, title, episode_number, watched_at)
VALUES(?1, ?2, ?3, ?4, ?5, ?6)
"#,
                params![
                    entry.id,
                    entry.series,
                    entry.episode,
                    entry.title,
                    entry.episode_number,
                    entry.watched_at
                ],
            )
            .context("record watch")?;

        self.conn
            .execute(
                r#"
DELETE FROM watch_history WHERE id NOT IN (
  SELECT id FROM watch_history ORDER BY watched_at DESC, rowid DESC LIMIT ?1
)
"#,
                params![limit as i64],
            )
            .context("trim watch history")?;
        Ok(())
    }

    /// Most recent first.
    pub fn watch_history(&self, limit: usize) -> anyhow::Result<Vec<WatchEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
SELECT id, series, episode, title, episode_number, watched_at
FROM watch_history
ORDER BY watched_at DESC, rowid DESC
LIMIT ?1
"#,
            )
            .context("prepare watch history")?;

        let entries = stmt
            .query_map(params![limit as i64], |row| {
                Ok(WatchEntry {
                    id: row.get(0)?,
                    series: row.get(1)?,
                    episode: row.get(2)?,
                    title: row.get(3)?,
                    episode_number: row.get(4)?,
                    watched_at: row.get(5)?,
                })
            })
            .context("query watch history")?
            .filter_map(|r| r.ok())
            .collect();

        Ok(entries)
    }
}

// rusqlite connections are not Send-friendly across awaits; async callers open
// one per operation inside spawn_blocking.
#[derive(Debug, Clone)]
pub struct StorageHandle {
    path: PathBuf,
}

impl StorageHandle {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(DB_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn open(&self) -> anyhow::Result<Storage> {
        Storage::open(&self.path)
    }

    pub fn get_response(&self, key: &str) -> anyhow::Result<Option<(String, i64)>> {
        self.open()?.get_response(key)
    }

    pub fn put_response(
        &self,
        key: &str,
        url: &str,
        body: &str,
        expires_at: i64,
        now: i64,
    ) -> anyhow::Result<()> {
        self.open()?.put_response(key, url, body, expires_at, now)
    }

    pub fn clear_responses(&self) -> anyhow::Result<usize> {
        self.open()?.clear_responses()
    }

    pub fn record_watch(&self, entry: &WatchEntry, limit: usize) -> anyhow::Result<()> {
        self.open()?.record_watch(entry, limit)
    }

    pub fn watch_history(&self, limit: usize) -> anyhow::Result<Vec<WatchEntry>> {
        self.open()?.watch_history(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Storage::open(&dir.path().join("nested").join(DB_FILE)).expect("open");
        (dir, storage)
    }

    #[test]
    fn response_rows_upsert_and_clear() {
        let (_dir, s) = temp_storage();
        assert_eq!(s.get_response("k").expect("get"), None);

        s.put_response("k", "https://api/x", "{\"a\":1}", 2_000, 1_000)
            .expect("put");
        s.put_response("k", "https://api/x", "{\"a\":2}", 3_000, 1_500)
            .expect("put again");
        assert_eq!(
            s.get_response("k").expect("get"),
            Some(("{\"a\":2}".to_string(), 3_000))
        );

        assert_eq!(s.clear_responses().expect("clear"), 1);
        assert_eq!(s.get_response("k").expect("get"), None);
    }

    #[test]
    fn rewatching_moves_entry_to_front_without_duplicates() {
        let (_dir, s) = temp_storage();
        s.record_watch(&WatchEntry::new("show", "show-episode-1", "Ep 1", Some(1), 10), 200)
            .expect("watch 1");
        s.record_watch(&WatchEntry::new("show", "show-episode-2", "Ep 2", Some(2), 20), 200)
            .expect("watch 2");
        s.record_watch(&WatchEntry::new("show", "show-episode-1", "Ep 1", Some(1), 30), 200)
            .expect("rewatch 1");

        let list = s.watch_history(10).expect("history");
        let ids: Vec<&str> = list.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["show:show-episode-1", "show:show-episode-2"]);
        assert_eq!(list[0].watched_at, 30);
    }

    #[test]
    fn history_is_capped_to_most_recent() {
        let (_dir, s) = temp_storage();
        for i in 0..5 {
            let ep = format!("ep-{i}");
            s.record_watch(&WatchEntry::new("show", &ep, &ep, Some(i), i as i64), 3)
                .expect("watch");
        }
        let list = s.watch_history(100).expect("history");
        let eps: Vec<&str> = list.iter().map(|e| e.episode.as_str()).collect();
        assert_eq!(eps, vec!["ep-4", "ep-3", "ep-2"]);
    }

    #[test]
    fn handle_opens_per_operation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handle = StorageHandle::in_dir(dir.path());
        handle
            .record_watch(&WatchEntry::new("a", "b", "t", None, 1), 200)
            .expect("record");
        assert_eq!(handle.watch_history(10).expect("history").len(), 1);
        assert!(handle.path().exists());
    }
}
