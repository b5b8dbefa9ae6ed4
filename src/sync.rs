//! Backward pagination over the remote timeline.
//!
//! The only state is the store itself: the cursor is `MIN(posted)` over
//! stored plurks, so an interrupted run resumes from wherever the last
//! committed page left it. Each iteration fetches the page older than the
//! cursor, upserts its users and plurks, pulls every plurk's responses and
//! recomputes the cursor. An empty page ends the walk.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::date_parser::format_epoch;
use crate::error::Result;
use crate::model::{ReplyPage, TimelinePage};
use crate::storage::Storage;

/// The two reads the sync loop needs.
///
/// [`crate::client::Session`] is the real implementation; tests drive the
/// loop with finite in-memory timelines.
pub trait PlurkApi {
    /// Posts strictly older than `before`, newest first; the newest page
    /// when `before` is `None`.
    ///
    /// # Errors
    /// Any failure aborts the sync run.
    fn timeline_page(&self, before: Option<f64>) -> Result<TimelinePage>;

    /// All responses of one plurk.
    ///
    /// # Errors
    /// Any failure aborts the sync run.
    fn replies(&self, plurk_id: i64) -> Result<ReplyPage>;
}

impl<T: PlurkApi + ?Sized> PlurkApi for &T {
    fn timeline_page(&self, before: Option<f64>) -> Result<TimelinePage> {
        (**self).timeline_page(before)
    }

    fn replies(&self, plurk_id: i64) -> Result<ReplyPage> {
        (**self).replies(plurk_id)
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The API returned an empty page.
    EndOfHistory,
    /// A non-empty page did not move the cursor back.
    Stalled,
    /// `max_pages` pages were stored.
    PageLimit,
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::EndOfHistory => "end of history",
            Self::Stalled => "stalled",
            Self::PageLimit => "page limit reached",
        })
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub max_pages: Option<usize>,
    pub store_reply_authors: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_pages: None,
            store_reply_authors: true,
        }
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_pages: config.max_pages,
            store_reply_authors: config.store_reply_authors,
        }
    }
}

/// What one stored page contributed.
#[derive(Debug, Clone, Serialize)]
pub struct PageSummary {
    pub page: usize,
    /// Cursor the page was requested with.
    pub before: Option<f64>,
    pub posts: usize,
    pub replies: usize,
    pub authors: usize,
    /// Cursor after the page was stored.
    pub cursor: Option<f64>,
}

/// Totals for one sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub pages: usize,
    pub posts: usize,
    pub replies: usize,
    /// User rows written, timeline and response payloads together.
    pub authors: usize,
    pub requests: usize,
    pub outcome: SyncOutcome,
    pub oldest: Option<f64>,
    pub newest: Option<f64>,
    /// Reply authors still missing from the `users` table after the run.
    pub dangling_reply_authors: usize,
}

type PageCallback<'a> = Box<dyn FnMut(&PageSummary) + 'a>;

/// Drives one sync run against a store.
pub struct Syncer<'a, A: PlurkApi> {
    api: A,
    storage: &'a mut Storage,
    options: SyncOptions,
    on_page: Option<PageCallback<'a>>,
}

impl<'a, A: PlurkApi> Syncer<'a, A> {
    pub fn new(api: A, storage: &'a mut Storage, options: SyncOptions) -> Self {
        Self {
            api,
            storage,
            options,
            on_page: None,
        }
    }

    /// Call `callback` after every stored page.
    #[must_use]
    pub fn on_page(mut self, callback: impl FnMut(&PageSummary) + 'a) -> Self {
        self.on_page = Some(Box::new(callback));
        self
    }

    /// Walk the timeline backward until an empty page, a stall or the page
    /// limit.
    ///
    /// # Errors
    /// Returns the first API or store error. Pages committed before the
    /// failure stay in the store.
    pub fn run(mut self) -> Result<SyncReport> {
        let mut cursor = self.storage.oldest_posted()?;
        let mut pages = 0;
        let mut posts = 0;
        let mut replies = 0;
        let mut authors = 0;
        let mut requests = 0;

        info!(
            cursor = %cursor.map_or_else(|| "newest".to_string(), format_epoch),
            "Starting sync"
        );

        let outcome = loop {
            if self.options.max_pages.is_some_and(|max| pages >= max) {
                info!(pages, "Page limit reached");
                break SyncOutcome::PageLimit;
            }

            debug!(page = pages + 1, before = ?cursor, endpoint = "timeline", "Fetching timeline page");
            let page = self.api.timeline_page(cursor).inspect_err(|e| {
                error!(page = pages + 1, before = ?cursor, endpoint = "timeline", "Fetch failed: {e}");
            })?;
            requests += 1;

            if page.posts.is_empty() {
                info!("Empty timeline page, reached end of history");
                break SyncOutcome::EndOfHistory;
            }

            let summary = self.store_page(pages + 1, cursor, &page, &mut requests)?;
            pages += 1;
            posts += summary.posts;
            replies += summary.replies;
            authors += summary.authors;

            info!(
                page = summary.page,
                posts = summary.posts,
                replies = summary.replies,
                users = summary.authors,
                cursor = %summary.cursor.map_or_else(|| "-".to_string(), format_epoch),
                "Stored page"
            );
            if let Some(callback) = self.on_page.as_mut() {
                callback(&summary);
            }

            let moved = match (cursor, summary.cursor) {
                (None, Some(_)) => true,
                (Some(before), Some(after)) => after < before,
                _ => false,
            };
            if !moved {
                warn!(
                    before = ?cursor,
                    after = ?summary.cursor,
                    "Timeline page did not move the cursor back, stopping"
                );
                break SyncOutcome::Stalled;
            }
            cursor = summary.cursor;
        };

        let dangling = self.storage.dangling_reply_authors()?;
        if !dangling.is_empty() {
            warn!(
                count = dangling.len(),
                "Reply authors without a users row; they are left out of reports"
            );
        }

        let totals = self.storage.log_summary()?;

        Ok(SyncReport {
            pages,
            posts,
            replies,
            authors,
            requests,
            outcome,
            oldest: totals.oldest_post,
            newest: totals.newest_post,
            dangling_reply_authors: dangling.len(),
        })
    }

    /// Users commit, then plurks, then each plurk's responses on their own.
    fn store_page(
        &mut self,
        page_no: usize,
        before: Option<f64>,
        page: &TimelinePage,
        requests: &mut usize,
    ) -> Result<PageSummary> {
        let mut authors = self.storage.upsert_authors(page.authors.values())?;
        let posts = self.storage.upsert_posts(&page.posts)?;
        let mut replies = 0;

        for post in &page.posts {
            debug!(plurk_id = post.plurk_id, endpoint = "responses", "Fetching responses");
            let reply_page = self.api.replies(post.plurk_id).inspect_err(|e| {
                error!(
                    page = page_no,
                    plurk_id = post.plurk_id,
                    endpoint = "responses",
                    "Fetch failed: {e}"
                );
            })?;
            *requests += 1;

            if self.options.store_reply_authors && !reply_page.authors.is_empty() {
                authors += self.storage.upsert_authors(reply_page.authors.values())?;
            }
            replies += self.storage.upsert_replies(&reply_page.replies)?;
        }

        Ok(PageSummary {
            page: page_no,
            before,
            posts,
            replies,
            authors,
            cursor: self.storage.oldest_posted()?,
        })
    }
}
