//! Typed client for the Discuit REST API.
//!
//! Beyond the one-shot CRUD surface, the client offers a polling watch
//! mechanism: register callbacks per community with
//! [`Discuit::watch_posts`] / [`Discuit::watch_comments`] and the client
//! periodically re-fetches the relevant feeds, dispatching each newly seen
//! post or comment exactly once per callback. Deduplication state lives in a
//! pluggable [`SeenChecker`]; HTTP transport sits behind the [`Fetch`] trait
//! so tests can run against [`testing::RecordedFetch`].

pub mod client;
pub mod fetch;
pub mod http;
pub mod seen;
pub mod testing;
pub mod watch;

#[cfg(test)]
mod tests;

pub use client::Discuit;
pub use fetch::{format_token, Fetch, FetchResponse};
pub use http::{HttpFetch, DEFAULT_BASE_URL};
pub use seen::{MemorySeenChecker, SeenChecker};
pub use watch::{
    comment_callback, comment_key, post_callback, post_key, CallbackResult, CommentCallback,
    PostCallback, Watcher, WatcherSet,
};

pub use discuit_core::{
    ApiError, AuthPolicy, ClientConfig, Comment, CommentFeed, Community, CommunityRule,
    DiscuitError, Link, Notification, NotificationFeed, Post, PostFeed, PostSort, User,
};
