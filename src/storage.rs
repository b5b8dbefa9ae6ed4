//! `SQLite` storage for plurks, replies and users.
//!
//! Tables are created on first open and never migrated. Every upsert is an
//! `INSERT OR REPLACE` of the whole row inside its own transaction, so a
//! re-fetched row replaces the previous one entirely and an interrupted
//! run never leaves a half-written row behind. Foreign keys are declared
//! for documentation only; enforcement stays off because replies may point
//! at users or plurks that arrive later (or never).

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::activity::ActivityCount;
use crate::error::{PlurkError, Result};
use crate::model::{Author, Post, Reply, StoreStats};

/// `SQLite` storage manager
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| PlurkError::path_error("create directory", parent, e))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = OFF;
            ",
        )?;

        let storage = Self { conn };
        storage.create_schema()?;
        debug!(path = %path.display(), "Opened store");
        Ok(storage)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                display_name TEXT,
                nick_name TEXT,
                gender INTEGER,
                has_profile_image INTEGER,
                avatar TEXT
            );

            CREATE TABLE IF NOT EXISTS plurks (
                plurk_id INTEGER PRIMARY KEY,
                owner_id INTEGER NOT NULL,
                user_id INTEGER,
                posted REAL NOT NULL,
                lang TEXT,
                qualifier TEXT,
                content TEXT,
                is_unread INTEGER,
                no_comments INTEGER,
                plurk_type INTEGER,
                FOREIGN KEY (owner_id) REFERENCES users(id),
                FOREIGN KEY (user_id) REFERENCES users(id)
            );
            CREATE INDEX IF NOT EXISTS idx_plurks_posted ON plurks(posted);

            CREATE TABLE IF NOT EXISTS replies (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                plurk_id INTEGER NOT NULL,
                posted REAL NOT NULL,
                qualifier TEXT,
                lang TEXT,
                content TEXT,
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (plurk_id) REFERENCES plurks(plurk_id)
            );
            CREATE INDEX IF NOT EXISTS idx_replies_plurk ON replies(plurk_id);
            ",
        )?;
        Ok(())
    }

    /// Upsert users in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; nothing is committed then.
    pub fn upsert_authors<'a, I>(&mut self, authors: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a Author>,
    {
        let tx = self.conn.transaction()?;
        let mut count = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO users
                 (id, display_name, nick_name, gender, has_profile_image, avatar)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )?;

            for a in authors {
                stmt.execute(params![
                    a.id,
                    a.display_name,
                    a.nick_name,
                    a.gender,
                    a.has_profile_image,
                    a.avatar
                ])?;
                count += 1;
            }
        }

        tx.commit()?;
        debug!("Stored {} users", count);
        Ok(count)
    }

    /// Upsert plurks in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; nothing is committed then.
    pub fn upsert_posts(&mut self, posts: &[Post]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut count = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO plurks
                 (plurk_id, owner_id, user_id, posted, lang, qualifier, content,
                  is_unread, no_comments, plurk_type)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;

            for p in posts {
                stmt.execute(params![
                    p.plurk_id,
                    p.owner_id,
                    p.user_id,
                    p.posted,
                    p.lang,
                    p.qualifier,
                    p.content,
                    p.is_unread,
                    p.no_comments,
                    p.plurk_type
                ])?;
                count += 1;
            }
        }

        tx.commit()?;
        debug!("Stored {} plurks", count);
        Ok(count)
    }

    /// Upsert replies in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; nothing is committed then.
    pub fn upsert_replies(&mut self, replies: &[Reply]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut count = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO replies
                 (id, user_id, plurk_id, posted, qualifier, lang, content)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?;

            for r in replies {
                stmt.execute(params![
                    r.id,
                    r.user_id,
                    r.plurk_id,
                    r.posted,
                    r.qualifier,
                    r.lang,
                    r.content
                ])?;
                count += 1;
            }
        }

        tx.commit()?;
        debug!("Stored {} replies", count);
        Ok(count)
    }

    /// `MIN(posted)` over stored plurks: the sync cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn oldest_posted(&self) -> Result<Option<f64>> {
        Ok(self
            .conn
            .query_row("SELECT MIN(posted) FROM plurks", [], |row| row.get(0))?)
    }

    /// `MAX(posted)` over stored plurks.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn newest_posted(&self) -> Result<Option<f64>> {
        Ok(self
            .conn
            .query_row("SELECT MAX(posted) FROM plurks", [], |row| row.get(0))?)
    }

    /// Look up one user.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_author(&self, id: i64) -> Result<Option<Author>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, display_name, nick_name, gender, has_profile_image, avatar
                 FROM users WHERE id = ?",
                [id],
                |row| {
                    Ok(Author {
                        id: row.get(0)?,
                        display_name: row.get(1)?,
                        nick_name: row.get(2)?,
                        gender: row.get(3)?,
                        has_profile_image: row.get(4)?,
                        avatar: row.get(5)?,
                    })
                },
            )
            .optional()?)
    }

    /// Look up one plurk.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_post(&self, plurk_id: i64) -> Result<Option<Post>> {
        Ok(self
            .conn
            .query_row(
                "SELECT plurk_id, owner_id, user_id, posted, lang, qualifier, content,
                        is_unread, no_comments, plurk_type
                 FROM plurks WHERE plurk_id = ?",
                [plurk_id],
                row_to_post,
            )
            .optional()?)
    }

    /// Look up one reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_reply(&self, id: i64) -> Result<Option<Reply>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, user_id, plurk_id, posted, qualifier, lang, content
                 FROM replies WHERE id = ?",
                [id],
                |row| {
                    Ok(Reply {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        plurk_id: row.get(2)?,
                        posted: row.get(3)?,
                        qualifier: row.get(4)?,
                        lang: row.get(5)?,
                        content: row.get(6)?,
                    })
                },
            )
            .optional()?)
    }

    /// Posts and replies per (UTC month, user label).
    ///
    /// Posts count for their owner, replies for their writer. Rows whose
    /// user is not stored drop out of the join.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn activity_counts(&self) -> Result<Vec<ActivityCount>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT month, author, COUNT(*) FROM (
                SELECT strftime('%Y-%m', p.posted, 'unixepoch') AS month,
                       COALESCE(NULLIF(u.display_name, ''), NULLIF(u.nick_name, ''),
                                CAST(u.id AS TEXT)) AS author
                FROM plurks p JOIN users u ON u.id = p.owner_id
                UNION ALL
                SELECT strftime('%Y-%m', r.posted, 'unixepoch'),
                       COALESCE(NULLIF(u.display_name, ''), NULLIF(u.nick_name, ''),
                                CAST(u.id AS TEXT))
                FROM replies r JOIN users u ON u.id = r.user_id
            )
            GROUP BY month, author
            ORDER BY month, author
            ",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(ActivityCount {
                    month: row.get(0)?,
                    author: row.get(1)?,
                    count: row.get::<_, i64>(2)?.unsigned_abs(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Reply authors that have no `users` row, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn dangling_reply_authors(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT r.user_id FROM replies r
             LEFT JOIN users u ON u.id = r.user_id
             WHERE u.id IS NULL
             ORDER BY r.user_id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Counts, date bounds and dangling references in a single query.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_stats(&self) -> Result<StoreStats> {
        let query = r"
            SELECT
                (SELECT COUNT(*) FROM users) AS authors_count,
                (SELECT COUNT(*) FROM plurks) AS posts_count,
                (SELECT COUNT(*) FROM replies) AS replies_count,
                (SELECT MIN(posted) FROM plurks) AS oldest_post,
                (SELECT MAX(posted) FROM plurks) AS newest_post,
                (SELECT COUNT(DISTINCT r.user_id) FROM replies r
                    LEFT JOIN users u ON u.id = r.user_id
                    WHERE u.id IS NULL) AS dangling_reply_authors,
                (SELECT COUNT(*) FROM replies r
                    LEFT JOIN plurks p ON p.plurk_id = r.plurk_id
                    WHERE p.plurk_id IS NULL) AS orphan_replies
        ";

        Ok(self.conn.query_row(query, [], |row| {
            Ok(StoreStats {
                authors_count: row.get(0)?,
                posts_count: row.get(1)?,
                replies_count: row.get(2)?,
                oldest_post: row.get(3)?,
                newest_post: row.get(4)?,
                dangling_reply_authors: row.get(5)?,
                orphan_replies: row.get(6)?,
            })
        })?)
    }

    /// Log store totals at the end of a sync run.
    ///
    /// # Errors
    ///
    /// Returns an error if the stats query fails.
    pub fn log_summary(&self) -> Result<StoreStats> {
        let stats = self.get_stats()?;
        info!(
            plurks = stats.posts_count,
            users = stats.authors_count,
            replies = stats.replies_count,
            oldest = %stats.oldest_post.map_or_else(|| "-".to_string(), crate::date_parser::format_epoch),
            newest = %stats.newest_post.map_or_else(|| "-".to_string(), crate::date_parser::format_epoch),
            "Store totals"
        );
        Ok(stats)
    }
}

fn row_to_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        plurk_id: row.get(0)?,
        owner_id: row.get(1)?,
        user_id: row.get(2)?,
        posted: row.get(3)?,
        lang: row.get(4)?,
        qualifier: row.get(5)?,
        content: row.get(6)?,
        is_unread: row.get(7)?,
        no_comments: row.get(8)?,
        plurk_type: row.get(9)?,
    })
}
