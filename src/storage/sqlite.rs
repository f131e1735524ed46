//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.

use crate::state::{ItemStatus, MediaKind};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CatalogQuery, CrawlStore, StorageError, StorageResult};
use crate::storage::{
    truncate_reason, CrawlStatistics, EpisodeRecord, RunRecord, RunStatus, SeasonRecord,
    SeedItem, ServerRecord, ShowSubtree, ShowSummary, StoredShow, WorkItem,
};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

const WORK_ITEM_COLUMNS: &str =
    "id, url, kind, status, attempt_count, last_error, claimed_run, updated_at";

/// How long a writer waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    ///
    /// Several `SqliteStorage` values may point at the same file; claims stay
    /// exclusive because each one is a single conditional UPDATE.
    pub fn new(path: &Path) -> crate::Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn item_status(&self, url: &str) -> StorageResult<Option<ItemStatus>> {
        let status = self
            .conn
            .query_row(
                "SELECT status FROM work_items WHERE url = ?1",
                params![url],
                |row| parse_column(row, 0, ItemStatus::from_db_string),
            )
            .optional()?;
        Ok(status)
    }

    /// Explains why a conditional status update touched no row
    fn transition_error(&self, url: &str, to: ItemStatus) -> StorageError {
        match self.item_status(url) {
            Ok(Some(from)) => StorageError::InvalidTransition {
                url: url.to_string(),
                from,
                to,
            },
            Ok(None) => StorageError::ItemNotFound(url.to_string()),
            Err(e) => e,
        }
    }

    fn query_items(&self, where_clause: &str, args: &[&str]) -> StorageResult<Vec<WorkItem>> {
        let sql = format!(
            "SELECT {} FROM work_items WHERE {} ORDER BY id",
            WORK_ITEM_COLUMNS, where_clause
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), row_to_work_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn load_show(&self, show_id: i64) -> StorageResult<Option<StoredShow>> {
        let header = self
            .conn
            .query_row(
                "SELECT id, source_url, title, kind, rating, poster_url, synopsis, trailer_url, scraped_at
                 FROM shows WHERE id = ?1",
                params![show_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(8)?,
                        ShowSubtree {
                            source_url: row.get(1)?,
                            title: row.get(2)?,
                            kind: parse_column(row, 3, MediaKind::from_db_string)?,
                            rating: row.get(4)?,
                            poster_url: row.get(5)?,
                            synopsis: row.get(6)?,
                            trailer_url: row.get(7)?,
                            metadata: BTreeMap::new(),
                            seasons: Vec::new(),
                        },
                    ))
                },
            )
            .optional()?;

        let Some((id, scraped_at, mut subtree)) = header else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT key, value FROM show_metadata WHERE show_id = ?1 ORDER BY key, position",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (key, value) = row?;
            subtree.metadata.entry(key).or_default().push(value);
        }

        let mut season_stmt = self.conn.prepare(
            "SELECT id, season_number, poster_url FROM seasons
             WHERE show_id = ?1 ORDER BY season_number",
        )?;
        let mut episode_stmt = self.conn.prepare(
            "SELECT id, episode_number FROM episodes
             WHERE season_id = ?1 ORDER BY episode_number",
        )?;
        let mut server_stmt = self.conn.prepare(
            "SELECT server_number, embed_url FROM servers
             WHERE episode_id = ?1 ORDER BY server_number",
        )?;

        let seasons = season_stmt
            .query_map(params![id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for (season_id, season_number, poster_url) in seasons {
            let episodes = episode_stmt
                .query_map(params![season_id], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut season = SeasonRecord {
                season_number,
                poster_url,
                episodes: Vec::with_capacity(episodes.len()),
            };

            for (episode_id, episode_number) in episodes {
                let servers = server_stmt
                    .query_map(params![episode_id], |row| {
                        Ok(ServerRecord {
                            server_number: row.get(0)?,
                            embed_url: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                season.episodes.push(EpisodeRecord {
                    episode_number,
                    servers,
                });
            }

            subtree.seasons.push(season);
        }

        Ok(Some(StoredShow {
            id,
            scraped_at,
            subtree,
        }))
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn parse_column<T>(row: &Row<'_>, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let value: String = row.get(idx)?;
    parse(&value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown value '{}'", value).into(),
        )
    })
}

fn row_to_work_item(row: &Row<'_>) -> rusqlite::Result<WorkItem> {
    Ok(WorkItem {
        id: row.get(0)?,
        url: row.get(1)?,
        kind: parse_column(row, 2, MediaKind::from_db_string)?,
        status: parse_column(row, 3, ItemStatus::from_db_string)?,
        attempt_count: row.get(4)?,
        last_error: row.get(5)?,
        claimed_run: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Writes metadata, seasons, episodes and servers under `show_id`
///
/// Rows that collide with a uniqueness constraint are skipped together with
/// their children.
fn insert_children(tx: &Transaction<'_>, show_id: i64, subtree: &ShowSubtree) -> rusqlite::Result<()> {
    let mut metadata_stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO show_metadata (show_id, key, position, value) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (key, values) in &subtree.metadata {
        for (position, value) in values.iter().enumerate() {
            metadata_stmt.execute(params![show_id, key, position as i64, value])?;
        }
    }

    let mut season_stmt = tx.prepare_cached(
        "INSERT INTO seasons (show_id, season_number, poster_url) VALUES (?1, ?2, ?3)
         ON CONFLICT(show_id, season_number) DO NOTHING",
    )?;
    let mut episode_stmt = tx.prepare_cached(
        "INSERT INTO episodes (season_id, episode_number) VALUES (?1, ?2)
         ON CONFLICT(season_id, episode_number) DO NOTHING",
    )?;
    let mut server_stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO servers (episode_id, server_number, embed_url) VALUES (?1, ?2, ?3)",
    )?;

    for season in &subtree.seasons {
        if season_stmt.execute(params![show_id, season.season_number, season.poster_url])? == 0 {
            continue;
        }
        let season_id = tx.last_insert_rowid();

        for episode in &season.episodes {
            if episode_stmt.execute(params![season_id, episode.episode_number])? == 0 {
                continue;
            }
            let episode_id = tx.last_insert_rowid();

            for server in &episode.servers {
                server_stmt.execute(params![episode_id, server.server_number, server.embed_url])?;
            }
        }
    }

    Ok(())
}

impl CrawlStore for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                |row| {
                    Ok(RunRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        config_hash: row.get(3)?,
                        status: parse_column(row, 4, RunStatus::from_db_string)?,
                    })
                },
            )
            .optional()?;

        run.ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(RunRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        config_hash: row.get(3)?,
                        status: parse_column(row, 4, RunStatus::from_db_string)?,
                    })
                },
            )
            .optional()?;

        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Work Items =====

    fn seed(&mut self, items: &[SeedItem]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO work_items (url, kind, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
            )?;
            for item in items {
                inserted += stmt.execute(params![
                    item.url,
                    item.kind.to_db_string(),
                    ItemStatus::Pending.to_db_string(),
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn load_pending(&self) -> StorageResult<Vec<WorkItem>> {
        self.query_items(
            "status IN (?1, ?2)",
            &[
                ItemStatus::Pending.to_db_string(),
                ItemStatus::InProgress.to_db_string(),
            ],
        )
    }

    fn claim(&mut self, url: &str, run_id: i64) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE work_items
             SET status = ?1, claimed_run = ?2, updated_at = ?3
             WHERE url = ?4
               AND (status = ?5
                    OR (status = ?1 AND (claimed_run IS NULL OR claimed_run <> ?2)))",
            params![
                ItemStatus::InProgress.to_db_string(),
                run_id,
                now,
                url,
                ItemStatus::Pending.to_db_string()
            ],
        )?;
        Ok(changed == 1)
    }

    fn commit(&mut self, url: &str, subtree: &ShowSubtree) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        let status = tx
            .query_row(
                "SELECT status FROM work_items WHERE url = ?1",
                params![url],
                |row| parse_column(row, 0, ItemStatus::from_db_string),
            )
            .optional()?
            .ok_or_else(|| StorageError::ItemNotFound(url.to_string()))?;
        if !status.can_transition_to(ItemStatus::Completed) {
            return Err(StorageError::InvalidTransition {
                url: url.to_string(),
                from: status,
                to: ItemStatus::Completed,
            });
        }

        // Full replace: the cascade removes every child of the old show
        tx.execute("DELETE FROM shows WHERE source_url = ?1", params![url])?;
        tx.execute(
            "INSERT INTO shows (source_url, title, kind, rating, poster_url, synopsis, trailer_url, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                url,
                subtree.title,
                subtree.kind.to_db_string(),
                subtree.rating,
                subtree.poster_url,
                subtree.synopsis,
                subtree.trailer_url,
                now
            ],
        )?;
        let show_id = tx.last_insert_rowid();
        insert_children(&tx, show_id, subtree)?;

        tx.execute(
            "UPDATE work_items SET status = ?1, last_error = NULL, updated_at = ?2 WHERE url = ?3",
            params![ItemStatus::Completed.to_db_string(), now, url],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn fail(&mut self, url: &str, reason: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE work_items
             SET status = ?1, attempt_count = attempt_count + 1, last_error = ?2, updated_at = ?3
             WHERE url = ?4 AND status = ?5",
            params![
                ItemStatus::Error.to_db_string(),
                truncate_reason(reason),
                now,
                url,
                ItemStatus::InProgress.to_db_string()
            ],
        )?;
        if changed == 0 {
            return Err(self.transition_error(url, ItemStatus::Error));
        }
        Ok(())
    }

    fn reset(&mut self, urls: &[String]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut count = 0;
        {
            let mut delete_stmt = tx.prepare_cached("DELETE FROM shows WHERE source_url = ?1")?;
            let mut update_stmt = tx.prepare_cached(
                "UPDATE work_items SET status = ?1, claimed_run = NULL, updated_at = ?2 WHERE url = ?3",
            )?;
            for url in urls {
                delete_stmt.execute(params![url])?;
                count += update_stmt.execute(params![
                    ItemStatus::Pending.to_db_string(),
                    now,
                    url
                ])?;
            }
        }
        tx.commit()?;
        Ok(count)
    }

    fn reset_errors(&mut self) -> StorageResult<usize> {
        let urls: Vec<String> = self
            .items_by_status(ItemStatus::Error)?
            .into_iter()
            .map(|item| item.url)
            .collect();
        self.reset(&urls)
    }

    fn get_item(&self, url: &str) -> StorageResult<Option<WorkItem>> {
        Ok(self.query_items("url = ?1", &[url])?.into_iter().next())
    }
}

impl CatalogQuery for SqliteStorage {
    fn statistics(&self) -> StorageResult<CrawlStatistics> {
        let mut stats = CrawlStatistics::default();

        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM work_items GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                parse_column(row, 0, ItemStatus::from_db_string)?,
                row.get::<_, i64>(1)?,
            ))
        })?;
        for row in rows {
            let (status, count) = row?;
            let count = count as u64;
            match status {
                ItemStatus::Pending => stats.pending = count,
                ItemStatus::InProgress => stats.in_progress = count,
                ItemStatus::Completed => stats.completed = count,
                ItemStatus::Error => stats.error = count,
            }
        }

        stats.shows = self.count("SELECT COUNT(*) FROM shows")?;
        stats.seasons = self.count("SELECT COUNT(*) FROM seasons")?;
        stats.episodes = self.count("SELECT COUNT(*) FROM episodes")?;
        stats.servers = self.count("SELECT COUNT(*) FROM servers")?;

        Ok(stats)
    }

    fn items_by_status(&self, status: ItemStatus) -> StorageResult<Vec<WorkItem>> {
        self.query_items("status = ?1", &[status.to_db_string()])
    }

    fn get_show(&self, show_id: i64) -> StorageResult<Option<StoredShow>> {
        self.load_show(show_id)
    }

    fn get_subtree(&self, source_url: &str) -> StorageResult<Option<StoredShow>> {
        let show_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM shows WHERE source_url = ?1",
                params![source_url],
                |row| row.get(0),
            )
            .optional()?;

        match show_id {
            Some(id) => self.load_show(id),
            None => Ok(None),
        }
    }

    fn search_shows(&self, term: &str, limit: usize) -> StorageResult<Vec<ShowSummary>> {
        let escaped = term
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{}%", escaped);

        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.source_url, s.title, s.kind, s.rating,
                    (SELECT COUNT(*) FROM seasons se WHERE se.show_id = s.id),
                    (SELECT COUNT(*) FROM episodes e
                       JOIN seasons se ON e.season_id = se.id
                      WHERE se.show_id = s.id)
             FROM shows s
             WHERE s.title LIKE ?1 ESCAPE '\\'
             ORDER BY s.title, s.id
             LIMIT ?2",
        )?;

        let shows = stmt
            .query_map(params![pattern, limit as i64], |row| {
                Ok(ShowSummary {
                    id: row.get(0)?,
                    source_url: row.get(1)?,
                    title: row.get(2)?,
                    kind: parse_column(row, 3, MediaKind::from_db_string)?,
                    rating: row.get(4)?,
                    season_count: row.get::<_, i64>(5)? as u64,
                    episode_count: row.get::<_, i64>(6)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(shows)
    }
}
