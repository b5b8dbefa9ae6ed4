//! Integration tests for plurkdump.
//!
//! These tests verify end-to-end functionality including:
//! - Syncing a synthetic timeline into an on-disk store
//! - Resuming an interrupted sync
//! - Monthly aggregation, gap filling and chart rendering

use std::cell::Cell;
use std::collections::HashMap;

use chrono::NaiveDate;
use plurkdump::activity::ActivityTable;
use plurkdump::chart::{ChartOptions, Palette, render_activity_chart};
use plurkdump::model::{Author, Post, Reply, ReplyPage, TimelinePage};
use plurkdump::storage::Storage;
use plurkdump::sync::{PlurkApi, SyncOptions, SyncOutcome, Syncer};
use plurkdump::{PlurkError, Result};
use tempfile::TempDir;

// 2024-01-10, 2024-03-15 12:00, 2024-03-16 12:00, 2024-04-10 (UTC)
const JAN_10: f64 = 1_704_844_800.0;
const MAR_15: f64 = 1_710_504_000.0;
const MAR_16: f64 = 1_710_590_400.0;
const APR_10: f64 = 1_712_707_200.0;
const DAY: f64 = 86_400.0;

fn author(id: i64, name: &str) -> Author {
    Author {
        id,
        display_name: Some(name.to_string()),
        nick_name: Some(name.to_lowercase()),
        gender: Some(1),
        has_profile_image: Some(0),
        avatar: None,
    }
}

fn post(plurk_id: i64, owner_id: i64, posted: f64) -> Post {
    Post {
        plurk_id,
        owner_id,
        user_id: Some(owner_id),
        posted,
        lang: Some("nl".to_string()),
        qualifier: Some("says".to_string()),
        content: Some(format!("plurk {plurk_id}")),
        is_unread: Some(0),
        no_comments: Some(0),
        plurk_type: Some(0),
    }
}

fn reply(id: i64, user_id: i64, plurk_id: i64, posted: f64) -> Reply {
    Reply {
        id,
        user_id,
        plurk_id,
        posted,
        qualifier: Some(":".to_string()),
        lang: Some("nl".to_string()),
        content: Some(format!("reply {id}")),
    }
}

/// Two users, one post per day going back from `APR_10`, one reply per post
/// from the other user. User 2 only appears in response payloads.
struct SyntheticPlurk {
    posts: Vec<Post>,
    page_size: usize,
    fail_after_pages: Option<usize>,
    pages_served: Cell<usize>,
}

impl SyntheticPlurk {
    fn new(days: i64, page_size: usize) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let posts = (0..days)
            .map(|d| post(1000 + d, 1, APR_10 - d as f64 * DAY))
            .collect();
        Self {
            posts,
            page_size,
            fail_after_pages: None,
            pages_served: Cell::new(0),
        }
    }
}

impl PlurkApi for SyntheticPlurk {
    fn timeline_page(&self, before: Option<f64>) -> Result<TimelinePage> {
        if self
            .fail_after_pages
            .is_some_and(|limit| self.pages_served.get() >= limit)
        {
            return Err(PlurkError::Http {
                endpoint: "/APP/Timeline/getPlurks".to_string(),
                status: 500,
                body: "boom".to_string(),
            });
        }
        self.pages_served.set(self.pages_served.get() + 1);

        let posts: Vec<Post> = self
            .posts
            .iter()
            .filter(|p| before.is_none_or(|b| p.posted < b))
            .take(self.page_size)
            .cloned()
            .collect();
        let authors = if posts.is_empty() {
            HashMap::new()
        } else {
            HashMap::from([("1".to_string(), author(1, "Alice"))])
        };
        Ok(TimelinePage { posts, authors })
    }

    fn replies(&self, plurk_id: i64) -> Result<ReplyPage> {
        let Some(p) = self.posts.iter().find(|p| p.plurk_id == plurk_id) else {
            return Ok(ReplyPage::default());
        };
        Ok(ReplyPage {
            replies: vec![reply(plurk_id * 10, 2, plurk_id, p.posted + 60.0)],
            authors: HashMap::from([("2".to_string(), author(2, "Bob"))]),
        })
    }
}

fn open_store(dir: &TempDir) -> Storage {
    Storage::open(dir.path().join("plurks.db")).unwrap()
}

#[test]
fn test_sync_then_report() {
    let dir = TempDir::new().unwrap();
    let mut storage = open_store(&dir);
    let api = SyntheticPlurk::new(100, 30);

    let report = Syncer::new(&api, &mut storage, SyncOptions::default())
        .run()
        .unwrap();
    assert_eq!(report.outcome, SyncOutcome::EndOfHistory);
    assert_eq!(report.pages, 4);
    assert_eq!(report.posts, 100);
    assert_eq!(report.replies, 100);
    assert_eq!(report.dangling_reply_authors, 0);

    let stats = storage.get_stats().unwrap();
    assert_eq!(stats.authors_count, 2);
    assert_eq!(stats.posts_count, 100);
    assert_eq!(stats.replies_count, 100);
    assert_eq!(stats.orphan_replies, 0);

    let counts = storage.activity_counts().unwrap();
    let table = ActivityTable::pivot(&counts, NaiveDate::from_ymd_opt(2024, 4, 30).unwrap());
    assert_eq!(table.authors, vec!["Alice", "Bob"]);
    assert_eq!(table.months.first().map(String::as_str), Some("2024-01"));
    assert_eq!(table.months.last().map(String::as_str), Some("2024-04"));
    assert_eq!(table.month_totals().iter().sum::<u64>(), 200);

    let options = ChartOptions {
        palette: Palette::Tab20,
        scale: 1.0,
        ..ChartOptions::default()
    };
    let path = render_activity_chart(&table, &options, &dir.path().join("charts")).unwrap();
    assert!(path.ends_with("combined_activity_tab20.png"));
    assert!(std::fs::metadata(&path).unwrap().len() > 0);
}

#[test]
fn test_second_sync_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let api = SyntheticPlurk::new(20, 7);

    {
        let mut storage = open_store(&dir);
        Syncer::new(&api, &mut storage, SyncOptions::default())
            .run()
            .unwrap();
    }
    let before = open_store(&dir).activity_counts().unwrap();

    // Replay the newest page by hand; nothing may change.
    let mut storage = open_store(&dir);
    let page = api.timeline_page(None).unwrap();
    storage.upsert_authors(page.authors.values()).unwrap();
    storage.upsert_posts(&page.posts).unwrap();
    for p in &page.posts {
        storage
            .upsert_replies(&api.replies(p.plurk_id).unwrap().replies)
            .unwrap();
    }

    assert_eq!(storage.activity_counts().unwrap(), before);
    assert_eq!(storage.get_stats().unwrap().posts_count, 20);
}

#[test]
fn test_interrupted_sync_resumes_from_oldest_plurk() {
    let dir = TempDir::new().unwrap();
    let mut api = SyntheticPlurk::new(25, 10);
    api.fail_after_pages = Some(1);

    {
        let mut storage = open_store(&dir);
        let err = Syncer::new(&api, &mut storage, SyncOptions::default())
            .run()
            .unwrap_err();
        assert!(err.is_resumable());
    }

    let mut storage = open_store(&dir);
    assert_eq!(storage.get_stats().unwrap().posts_count, 10);
    let cursor = storage.oldest_posted().unwrap().unwrap();
    assert!((cursor - (APR_10 - 9.0 * DAY)).abs() < f64::EPSILON);

    api.fail_after_pages = None;
    let report = Syncer::new(&api, &mut storage, SyncOptions::default())
        .run()
        .unwrap();
    assert_eq!(report.outcome, SyncOutcome::EndOfHistory);
    assert_eq!(report.posts, 15);
    assert_eq!(storage.get_stats().unwrap().posts_count, 25);
}

#[test]
fn test_page_limit_stops_early() {
    let dir = TempDir::new().unwrap();
    let mut storage = open_store(&dir);
    let api = SyntheticPlurk::new(50, 10);

    let report = Syncer::new(
        &api,
        &mut storage,
        SyncOptions {
            max_pages: Some(2),
            store_reply_authors: true,
        },
    )
    .run()
    .unwrap();
    assert_eq!(report.outcome, SyncOutcome::PageLimit);
    assert_eq!(report.posts, 20);
}

#[test]
fn test_reply_authors_left_dangling_when_disabled() {
    let dir = TempDir::new().unwrap();
    let mut storage = open_store(&dir);
    let api = SyntheticPlurk::new(3, 10);

    let report = Syncer::new(
        &api,
        &mut storage,
        SyncOptions {
            max_pages: None,
            store_reply_authors: false,
        },
    )
    .run()
    .unwrap();
    assert_eq!(report.dangling_reply_authors, 1);
    assert_eq!(storage.dangling_reply_authors().unwrap(), vec![2]);

    // Replies by unknown users drop out of the report.
    let counts = storage.activity_counts().unwrap();
    assert!(counts.iter().all(|c| c.author == "Alice"));
    assert_eq!(counts.iter().map(|c| c.count).sum::<u64>(), 3);
}

#[test]
fn test_end_to_end_aggregation() {
    let dir = TempDir::new().unwrap();
    let mut storage = open_store(&dir);
    storage.upsert_authors(&[author(1, "A")]).unwrap();
    storage.upsert_posts(&[post(10, 1, MAR_15)]).unwrap();
    storage.upsert_replies(&[reply(100, 1, 10, MAR_16)]).unwrap();

    let counts = storage.activity_counts().unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].month, "2024-03");
    assert_eq!(counts[0].author, "A");
    assert_eq!(counts[0].count, 2);
}

#[test]
fn test_gap_filling_between_january_and_april() {
    let dir = TempDir::new().unwrap();
    let mut storage = open_store(&dir);
    storage.upsert_authors(&[author(1, "A")]).unwrap();
    storage
        .upsert_posts(&[post(1, 1, JAN_10), post(2, 1, APR_10)])
        .unwrap();

    let table = ActivityTable::pivot(
        &storage.activity_counts().unwrap(),
        NaiveDate::from_ymd_opt(2024, 4, 15).unwrap(),
    );
    assert_eq!(table.months, vec!["2024-01", "2024-02", "2024-03", "2024-04"]);
    assert_eq!(table.counts, vec![vec![1], vec![0], vec![0], vec![1]]);
}

#[test]
fn test_report_on_empty_store_writes_png() {
    let dir = TempDir::new().unwrap();
    let storage = open_store(&dir);

    let table = ActivityTable::from_storage(&storage).unwrap();
    assert!(table.is_empty());

    for palette in [Palette::Viridis, Palette::Paired] {
        let options = ChartOptions {
            palette,
            scale: 1.0,
            ..ChartOptions::default()
        };
        let path = render_activity_chart(&table, &options, dir.path()).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }
}
