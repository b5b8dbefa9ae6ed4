//! Data models for Plurk timeline data.
//!
//! The same structs are used for API decoding and for store rows. `posted`
//! arrives from the API as an RFC-1123 string and is converted to epoch
//! seconds while deserializing, so a decoded [`Post`] or [`Reply`] is
//! already in its stored form.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::date_parser::deserialize_posted;

/// A Plurk user, as embedded in timeline and response payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub nick_name: Option<String>,
    #[serde(default)]
    pub gender: Option<i64>,
    #[serde(default)]
    pub has_profile_image: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_loose_string")]
    pub avatar: Option<String>,
}

impl Author {
    /// Name used in reports: display name, then nick name, then the id.
    #[must_use]
    pub fn label(&self) -> String {
        self.display_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.nick_name.as_deref().filter(|s| !s.is_empty()))
            .map_or_else(|| self.id.to_string(), str::to_string)
    }
}

/// A timeline post ("plurk").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub plurk_id: i64,
    pub owner_id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Unix epoch seconds, UTC.
    #[serde(deserialize_with = "deserialize_posted")]
    pub posted: f64,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub qualifier: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub is_unread: Option<i64>,
    #[serde(default)]
    pub no_comments: Option<i64>,
    #[serde(default)]
    pub plurk_type: Option<i64>,
}

/// A response to a plurk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub id: i64,
    pub user_id: i64,
    pub plurk_id: i64,
    /// Unix epoch seconds, UTC.
    #[serde(deserialize_with = "deserialize_posted")]
    pub posted: f64,
    #[serde(default)]
    pub qualifier: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// One page of `/APP/Timeline/getPlurks`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelinePage {
    #[serde(rename = "plurks")]
    pub posts: Vec<Post>,
    /// Users referenced by the page, keyed by stringified user id.
    #[serde(rename = "plurk_users", default, deserialize_with = "deserialize_null_map")]
    pub authors: HashMap<String, Author>,
}

/// All responses of one plurk, from `/APP/Responses/get`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplyPage {
    #[serde(rename = "responses")]
    pub replies: Vec<Reply>,
    /// Users who wrote the responses, when the API includes them.
    #[serde(rename = "friends", default, deserialize_with = "deserialize_null_map")]
    pub authors: HashMap<String, Author>,
}

/// The authenticated user's profile; only the fields we log are decoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnProfile {
    #[serde(default)]
    pub user_info: Option<Author>,
    #[serde(default)]
    pub fans_count: Option<i64>,
    #[serde(default)]
    pub friends_count: Option<i64>,
}

/// Row counts, date bounds and dangling references in the store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub authors_count: i64,
    pub posts_count: i64,
    pub replies_count: i64,
    /// Oldest stored post, epoch seconds. This is the sync cursor.
    pub oldest_post: Option<f64>,
    pub newest_post: Option<f64>,
    /// Distinct reply authors with no row in `users`.
    pub dangling_reply_authors: i64,
    /// Replies whose plurk is not stored.
    pub orphan_replies: i64,
}

/// `null` and a missing key both decode as an empty map.
fn deserialize_null_map<'de, D, V>(deserializer: D) -> Result<HashMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    Ok(Option::<HashMap<String, V>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept a string or a number and keep it as text.
fn deserialize_loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
