use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// How posts should be sorted when fetching a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostSort {
    Hot,
    #[default]
    Latest,
    Activity,
    Day,
    Week,
    Month,
    Year,
}

impl PostSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostSort::Hot => "hot",
            PostSort::Latest => "latest",
            PostSort::Activity => "activity",
            PostSort::Day => "day",
            PostSort::Week => "week",
            PostSort::Month => "month",
            PostSort::Year => "year",
        }
    }
}

/// The server occasionally sends `null` where an empty array is expected.
/// Normalize that to an empty collection instead of failing the decode.
fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// An external link attached to a link-type post.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    #[serde(rename = "type", default)]
    pub post_type: String,
    #[serde(default)]
    pub public_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_group: String,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub community_id: String,
    pub community_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub link: Option<Link>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub upvotes: i64,
    #[serde(default)]
    pub downvotes: i64,
    #[serde(default)]
    pub hotness: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub no_comments: i64,
    #[serde(default)]
    pub user_voted: bool,
    #[serde(default)]
    pub user_voted_up: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    #[serde(default)]
    pub post_id: String,
    #[serde(default)]
    pub post_public_id: String,
    #[serde(default)]
    pub community_id: String,
    #[serde(default)]
    pub community_name: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub depth: i32,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub upvotes: i64,
    #[serde(default)]
    pub downvotes: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub about_me: Option<String>,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub no_posts: i64,
    #[serde(default)]
    pub no_comments: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_ban: bool,
    #[serde(default)]
    pub notifications_new_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub no_members: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_joined: Option<bool>,
    #[serde(default)]
    pub user_mod: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityRule {
    pub id: i64,
    #[serde(default)]
    pub rule: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub community_id: String,
    #[serde(default)]
    pub z_index: i64,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub notif_type: String,
    #[serde(default)]
    pub notif: serde_json::Value,
    #[serde(default)]
    pub seen: bool,
    #[serde(default)]
    pub seen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// One page of the paginated posts feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostFeed {
    #[serde(default, deserialize_with = "nullable_vec")]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub next: Option<String>,
}

/// One page of a post's comment thread.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentFeed {
    #[serde(default, deserialize_with = "nullable_vec")]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub next: Option<String>,
}

/// One page of the notifications feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFeed {
    #[serde(default, deserialize_with = "nullable_vec")]
    pub items: Vec<Notification>,
    #[serde(default)]
    pub next: Option<String>,
}
