//! Monthly activity per user.
//!
//! Posts and replies count the same: one unit of activity for the user who
//! wrote it, in the UTC calendar month it was posted. The store does the
//! bucketing (see [`Storage::activity_counts`]); this module turns those
//! sparse counts into a dense month-by-user table for charting.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::date_parser::{MONTH_KEY_FORMAT, months_between, parse_month_key};
use crate::error::Result;
use crate::storage::Storage;

/// Activity of one user in one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityCount {
    /// `"YYYY-MM"`, UTC.
    pub month: String,
    /// Display name, nick name or id, whichever is set first.
    pub author: String,
    pub count: u64,
}

/// A user's activity over the whole store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorTotal {
    pub author: String,
    pub count: u64,
}

/// Dense month-by-user table.
///
/// `months` runs without gaps from the earliest month with activity through
/// the current month (or the latest month with activity, if that is later).
/// `authors` is sorted. `counts[m][a]` is the activity of `authors[a]` in
/// `months[m]`, zero when there was none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityTable {
    pub months: Vec<String>,
    pub authors: Vec<String>,
    pub counts: Vec<Vec<u64>>,
}

impl ActivityTable {
    /// Read and pivot everything in the store, padding through today.
    ///
    /// # Errors
    /// Returns an error if the store query fails.
    pub fn from_storage(storage: &Storage) -> Result<Self> {
        let counts = storage.activity_counts()?;
        Ok(Self::pivot(&counts, Utc::now().date_naive()))
    }

    /// Pivot sparse counts into a dense table ending no earlier than
    /// `today`'s month.
    #[must_use]
    pub fn pivot(counts: &[ActivityCount], today: NaiveDate) -> Self {
        let mut cells: HashMap<(NaiveDate, &str), u64> = HashMap::new();
        let mut authors = BTreeSet::new();

        for row in counts {
            let Some(month) = parse_month_key(&row.month) else {
                warn!(month = %row.month, "Skipping activity with unparseable month");
                continue;
            };
            *cells.entry((month, row.author.as_str())).or_default() += row.count;
            authors.insert(row.author.as_str());
        }

        let Some(first) = cells.keys().map(|(m, _)| *m).min() else {
            return Self::default();
        };
        let last = cells
            .keys()
            .map(|(m, _)| *m)
            .max()
            .map_or(today, |latest| latest.max(today));

        let authors: Vec<&str> = authors.into_iter().collect();
        let months = months_between(first, last);
        let counts = months
            .iter()
            .map(|month| {
                authors
                    .iter()
                    .map(|author| cells.get(&(*month, *author)).copied().unwrap_or(0))
                    .collect()
            })
            .collect();

        debug!(months = months.len(), authors = authors.len(), "Pivoted activity");
        Self {
            months: months
                .iter()
                .map(|m| m.format(MONTH_KEY_FORMAT).to_string())
                .collect(),
            authors: authors.into_iter().map(str::to_string).collect(),
            counts,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.months.is_empty() || self.authors.is_empty()
    }

    /// Count for `month` / `author`, `None` if either is not in the table.
    #[must_use]
    pub fn get(&self, month: &str, author: &str) -> Option<u64> {
        let m = self.months.iter().position(|x| x == month)?;
        let a = self.authors.iter().position(|x| x == author)?;
        Some(self.counts[m][a])
    }

    /// Height of each stacked bar.
    #[must_use]
    pub fn month_totals(&self) -> Vec<u64> {
        self.counts.iter().map(|row| row.iter().sum()).collect()
    }

    /// Tallest bar, zero for an empty table.
    #[must_use]
    pub fn max_month_total(&self) -> u64 {
        self.month_totals().into_iter().max().unwrap_or(0)
    }

    /// Totals per user, most active first.
    #[must_use]
    pub fn author_totals(&self) -> Vec<AuthorTotal> {
        let mut totals: Vec<AuthorTotal> = self
            .authors
            .iter()
            .enumerate()
            .map(|(a, author)| AuthorTotal {
                author: author.clone(),
                count: self.counts.iter().map(|row| row[a]).sum(),
            })
            .collect();
        totals.sort_by(|x, y| y.count.cmp(&x.count).then_with(|| x.author.cmp(&y.author)));
        totals
    }
}

/// Sum counts across users, keyed by month.
#[must_use]
pub fn monthly_totals(counts: &[ActivityCount]) -> BTreeMap<String, u64> {
    let mut totals = BTreeMap::new();
    for row in counts {
        *totals.entry(row.month.clone()).or_insert(0) += row.count;
    }
    totals
}

/// Unicode block sparkline, bucketing down to `width` when needed.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn sparkline(values: &[u64], width: usize) -> String {
    const BLOCKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

    if values.is_empty() || width == 0 {
        return String::new();
    }

    let bucketed: Vec<u64> = if values.len() <= width {
        values.to_vec()
    } else {
        values
            .chunks(values.len().div_ceil(width))
            .map(|chunk| chunk.iter().sum::<u64>() / chunk.len() as u64)
            .collect()
    };

    let max = bucketed.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return BLOCKS[0].to_string().repeat(bucketed.len());
    }

    bucketed
        .iter()
        .map(|&v| BLOCKS[((v as f64 / max as f64) * 7.0).round() as usize])
        .collect()
}
