use crate::fetch::{push_query, Fetch};
use crate::http::HttpFetch;
use crate::seen::{MemorySeenChecker, SeenChecker};
use crate::watch::{
    comment_key, post_key, spawn_watch_loop, CommentCallback, PostCallback, WatchHandle,
    WatchKind, WatcherSet, COMMENT_PAGE_CAP, WATCH_PAGE_LIMIT,
};
use discuit_core::{
    ApiError, AuthPolicy, ClientConfig, Comment, CommentFeed, Community, CommunityRule,
    DiscuitError, Notification, NotificationFeed, Post, PostFeed, PostSort, User,
};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;
use tracing::{debug, info, warn};

struct ClientInner {
    fetcher: Arc<dyn Fetch>,
    seen: Arc<dyn SeenChecker>,
    config: ClientConfig,
    user: RwLock<Option<User>>,
    post_watchers: Mutex<WatcherSet<PostCallback>>,
    comment_watchers: Mutex<WatcherSet<CommentCallback>>,
    post_loop: Mutex<Option<WatchHandle>>,
    comment_loop: Mutex<Option<WatchHandle>>,
    // Guards against a scheduled tick overlapping an out-of-schedule poll.
    post_tick_lock: Mutex<()>,
    comment_tick_lock: Mutex<()>,
    community_ids: Mutex<HashMap<String, String>>,
}

/// A Discuit client.
///
/// Composes a pluggable [`Fetch`] transport, a [`SeenChecker`] and the two
/// watch loops behind a cheap-to-clone handle. Read methods return empty
/// sentinels (`None`, empty collections) on transient failures after logging
/// them; mutating methods additionally fail with
/// [`ApiError::NotAuthenticated`] when no user is logged in.
#[derive(Clone)]
pub struct Discuit {
    inner: Arc<ClientInner>,
}

impl Default for Discuit {
    fn default() -> Self {
        Self::new(Arc::new(HttpFetch::new()))
    }
}

impl Discuit {
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        Self::assemble(
            fetcher,
            ClientConfig::default(),
            Arc::new(MemorySeenChecker::new()),
        )
    }

    /// Replaces the configuration, carrying over all other state. Call
    /// before registering any watchers; a running watch loop keeps the old
    /// handle and its state.
    pub fn with_config(self, config: ClientConfig) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => Self {
                inner: Arc::new(ClientInner { config, ..inner }),
            },
            Err(inner) => Self::assemble(inner.fetcher.clone(), config, inner.seen.clone()),
        }
    }

    /// Replaces the seen checker, e.g. with a bounded or persistent store,
    /// carrying over all other state. Call before registering any watchers.
    pub fn with_seen_checker(self, seen: Arc<dyn SeenChecker>) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => Self {
                inner: Arc::new(ClientInner { seen, ..inner }),
            },
            Err(inner) => Self::assemble(inner.fetcher.clone(), inner.config.clone(), seen),
        }
    }

    fn assemble(fetcher: Arc<dyn Fetch>, config: ClientConfig, seen: Arc<dyn SeenChecker>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                fetcher,
                seen,
                config,
                user: RwLock::new(None),
                post_watchers: Mutex::new(WatcherSet::new()),
                comment_watchers: Mutex::new(WatcherSet::new()),
                post_loop: Mutex::new(None),
                comment_loop: Mutex::new(None),
                post_tick_lock: Mutex::new(()),
                comment_tick_lock: Mutex::new(()),
                community_ids: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The currently logged-in user, if any.
    pub async fn user(&self) -> Option<User> {
        self.inner.user.read().await.clone()
    }

    // ---- authentication -------------------------------------------------

    /// Fetches a csrf token from the server. The fetcher stores it for
    /// future requests.
    pub async fn get_token(&self) -> Result<Option<String>, DiscuitError> {
        debug!("making GET request to /_initial");
        self.inner
            .fetcher
            .request(Method::GET, "/_initial", None)
            .await?;
        Ok(self.inner.fetcher.token())
    }

    /// Logs into the server. Obtains a csrf token first when none is held.
    /// Returns `Ok(None)` when the credentials are rejected; transport
    /// errors propagate.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, DiscuitError> {
        if !self.inner.fetcher.has_token() && self.get_token().await?.is_none() {
            warn!("failed to get csrf token");
            return Err(ApiError::CsrfTokenUnavailable.into());
        }

        let response = self
            .inner
            .fetcher
            .request(
                Method::POST,
                "/_login",
                Some(json!({ "username": username, "password": password })),
            )
            .await?;

        if !response.is_success() || response.data.get("id").and_then(Value::as_str).is_none() {
            info!(username, "login rejected");
            return Ok(None);
        }

        let user: User = serde_json::from_value(response.data)?;
        *self.inner.user.write().await = Some(user.clone());
        info!(username = %user.username, "logged in");
        Ok(Some(user))
    }

    /// Fetches the currently authenticated user.
    pub async fn get_me(&self) -> Option<User> {
        self.fetch_json(Method::GET, "/_user".to_string(), None).await
    }

    async fn auth_check(&self, operation: &str) -> Result<(), DiscuitError> {
        if self.inner.config.auth_policy == AuthPolicy::AmbientSession {
            return Ok(());
        }
        if self.inner.user.read().await.is_some() {
            return Ok(());
        }
        Err(ApiError::not_authenticated(operation).into())
    }

    // ---- request plumbing -----------------------------------------------

    /// Issues a request and decodes a successful JSON body. Failures are
    /// logged and collapse to `None`; they never propagate.
    async fn fetch_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: String,
        body: Option<Value>,
    ) -> Option<T> {
        match self.inner.fetcher.request(method, &path, body).await {
            Ok(response) if response.is_success() => match serde_json::from_value(response.data) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(%path, error = %err, "failed to decode response body");
                    None
                }
            },
            Ok(response) => {
                warn!(%path, status = response.status.as_u16(), "request failed");
                None
            }
            Err(err) => {
                warn!(%path, error = %err, "request error");
                None
            }
        }
    }

    /// Issues a request, reporting only whether it succeeded.
    async fn fetch_success(&self, method: Method, path: String, body: Option<Value>) -> bool {
        match self.inner.fetcher.request(method, &path, body).await {
            Ok(response) if response.is_success() => true,
            Ok(response) => {
                warn!(%path, status = response.status.as_u16(), "request failed");
                false
            }
            Err(err) => {
                warn!(%path, error = %err, "request error");
                false
            }
        }
    }

    // ---- posts ----------------------------------------------------------

    /// Fetches a page of the posts feed.
    pub async fn get_posts(
        &self,
        sort: PostSort,
        limit: u32,
        next: Option<&str>,
        community_id: Option<&str>,
    ) -> PostFeed {
        let mut path = format!("/posts?sort={}&limit={}", sort.as_str(), limit);
        if let Some(next) = next {
            push_query(&mut path, "next", next);
        }
        if let Some(community_id) = community_id {
            push_query(&mut path, "communityId", community_id);
        }
        self.fetch_json(Method::GET, path, None).await.unwrap_or_default()
    }

    pub async fn get_post(&self, public_id: &str) -> Option<Post> {
        self.fetch_json(Method::GET, format!("/posts/{public_id}"), None)
            .await
    }

    pub async fn vote_post(&self, post_id: &str, up: bool) -> Result<bool, DiscuitError> {
        self.auth_check("vote_post").await?;
        Ok(self
            .fetch_success(
                Method::POST,
                "/_postVote".to_string(),
                Some(json!({ "postId": post_id, "up": up })),
            )
            .await)
    }

    // ---- comments -------------------------------------------------------

    pub async fn get_comment(&self, id: &str) -> Option<Comment> {
        self.fetch_json(Method::GET, format!("/comments/{id}"), None)
            .await
    }

    /// Fetches one page of a post's comment thread.
    pub async fn get_post_comments(
        &self,
        public_id: &str,
        next: Option<&str>,
        parent_id: Option<&str>,
    ) -> CommentFeed {
        let mut path = format!("/posts/{public_id}/comments");
        if let Some(next) = next {
            push_query(&mut path, "next", next);
        }
        if let Some(parent_id) = parent_id {
            push_query(&mut path, "parentId", parent_id);
        }
        self.fetch_json(Method::GET, path, None).await.unwrap_or_default()
    }

    /// Submits a comment, optionally as a reply to `parent_comment_id`.
    pub async fn comment(
        &self,
        public_id: &str,
        body: &str,
        parent_comment_id: Option<&str>,
    ) -> Result<Option<Comment>, DiscuitError> {
        self.auth_check("comment").await?;
        let path = format!("/posts/{public_id}/comments?userGroup=normal");
        Ok(self
            .fetch_json(
                Method::POST,
                path,
                Some(json!({ "body": body, "parentCommentId": parent_comment_id })),
            )
            .await)
    }

    pub async fn update_comment(
        &self,
        public_id: &str,
        comment_id: &str,
        body: &str,
    ) -> Result<Option<Comment>, DiscuitError> {
        self.auth_check("update_comment").await?;
        let path = format!("/posts/{public_id}/comments/{comment_id}");
        Ok(self
            .fetch_json(Method::PUT, path, Some(json!({ "body": body })))
            .await)
    }

    pub async fn delete_comment(
        &self,
        post_id: &str,
        comment_id: &str,
        delete_as: Option<&str>,
    ) -> Result<bool, DiscuitError> {
        self.auth_check("delete_comment").await?;
        let mut path = format!("/posts/{post_id}/comments/{comment_id}");
        if let Some(delete_as) = delete_as {
            push_query(&mut path, "deleteAs", delete_as);
        }
        Ok(self.fetch_success(Method::DELETE, path, None).await)
    }

    pub async fn vote_comment(&self, comment_id: &str, up: bool) -> Result<bool, DiscuitError> {
        self.auth_check("vote_comment").await?;
        Ok(self
            .fetch_success(
                Method::POST,
                "/_commentVote".to_string(),
                Some(json!({ "commentId": comment_id, "up": up })),
            )
            .await)
    }

    // ---- notifications --------------------------------------------------

    /// Fetches one page of the notifications feed.
    pub async fn get_notifications(&self, next: Option<&str>) -> NotificationFeed {
        let mut path = "/notifications".to_string();
        if let Some(next) = next {
            push_query(&mut path, "next", next);
        }
        self.fetch_json(Method::GET, path, None).await.unwrap_or_default()
    }

    /// Fetches up to `max_notification_pages` pages of notifications.
    pub async fn get_all_notifications(&self) -> Vec<Notification> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..self.inner.config.max_notification_pages {
            let feed = self.get_notifications(cursor.as_deref()).await;
            all.extend(feed.items);
            match feed.next {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        all
    }

    pub async fn mark_notification_seen(&self, id: i64) -> Result<bool, DiscuitError> {
        self.auth_check("mark_notification_seen").await?;
        let path = format!("/notifications/{id}?action=markAsSeen&seen=true");
        Ok(self.fetch_success(Method::PUT, path, None).await)
    }

    pub async fn mark_all_notifications_seen(&self) -> Result<bool, DiscuitError> {
        self.auth_check("mark_all_notifications_seen").await?;
        // The empty type parameter is required for wire compatibility; its
        // meaning is undocumented upstream.
        let path = "/notifications?action=markAllAsSeen&type=".to_string();
        Ok(self.fetch_success(Method::POST, path, None).await)
    }

    pub async fn delete_notification(&self, id: i64) -> Result<bool, DiscuitError> {
        self.auth_check("delete_notification").await?;
        Ok(self
            .fetch_success(Method::DELETE, format!("/notifications/{id}"), None)
            .await)
    }

    pub async fn delete_all_notifications(&self) -> Result<bool, DiscuitError> {
        self.auth_check("delete_all_notifications").await?;
        let path = "/notifications?action=deleteAll".to_string();
        Ok(self.fetch_success(Method::POST, path, None).await)
    }

    // ---- communities ----------------------------------------------------

    pub async fn get_communities(&self) -> Vec<Community> {
        self.fetch_json(Method::GET, "/communities".to_string(), None)
            .await
            .unwrap_or_default()
    }

    pub async fn get_community(&self, id: &str) -> Option<Community> {
        self.fetch_json(Method::GET, format!("/communities/{id}"), None)
            .await
    }

    pub async fn update_community(
        &self,
        id: &str,
        values: Value,
    ) -> Result<Option<Community>, DiscuitError> {
        self.auth_check("update_community").await?;
        Ok(self
            .fetch_json(Method::PUT, format!("/communities/{id}"), Some(values))
            .await)
    }

    pub async fn join_community(
        &self,
        community_id: &str,
        leave: bool,
    ) -> Result<Option<Community>, DiscuitError> {
        self.auth_check("join_community").await?;
        Ok(self
            .fetch_json(
                Method::POST,
                "/_joinCommunity".to_string(),
                Some(json!({ "communityId": community_id, "leave": leave })),
            )
            .await)
    }

    pub async fn get_community_mods(&self, community_id: &str) -> Vec<User> {
        self.fetch_json(Method::GET, format!("/communities/{community_id}/mods"), None)
            .await
            .unwrap_or_default()
    }

    pub async fn add_community_mod(
        &self,
        community_id: &str,
        username: &str,
    ) -> Result<bool, DiscuitError> {
        self.auth_check("add_community_mod").await?;
        Ok(self
            .fetch_success(
                Method::POST,
                format!("/communities/{community_id}/mods"),
                Some(json!({ "username": username })),
            )
            .await)
    }

    pub async fn remove_community_mod(
        &self,
        community_id: &str,
        username: &str,
    ) -> Result<bool, DiscuitError> {
        self.auth_check("remove_community_mod").await?;
        Ok(self
            .fetch_success(
                Method::DELETE,
                format!("/communities/{community_id}/mods/{username}"),
                None,
            )
            .await)
    }

    pub async fn get_community_rules(&self, community_id: &str) -> Vec<CommunityRule> {
        self.fetch_json(
            Method::GET,
            format!("/communities/{community_id}/rules"),
            None,
        )
        .await
        .unwrap_or_default()
    }

    pub async fn create_community_rule(
        &self,
        community_id: &str,
        rule: &str,
        description: Option<&str>,
    ) -> Result<bool, DiscuitError> {
        self.auth_check("create_community_rule").await?;
        Ok(self
            .fetch_success(
                Method::POST,
                format!("/communities/{community_id}/rules"),
                Some(json!({ "rule": rule, "description": description })),
            )
            .await)
    }

    pub async fn update_community_rule(
        &self,
        community_id: &str,
        rule_id: i64,
        values: Value,
    ) -> Result<Option<CommunityRule>, DiscuitError> {
        self.auth_check("update_community_rule").await?;
        Ok(self
            .fetch_json(
                Method::PUT,
                format!("/communities/{community_id}/rules/{rule_id}"),
                Some(values),
            )
            .await)
    }

    pub async fn delete_community_rule(
        &self,
        community_id: &str,
        rule_id: i64,
    ) -> Result<bool, DiscuitError> {
        self.auth_check("delete_community_rule").await?;
        Ok(self
            .fetch_success(
                Method::DELETE,
                format!("/communities/{community_id}/rules/{rule_id}"),
                None,
            )
            .await)
    }

    // ---- watching -------------------------------------------------------

    /// Registers `callback` for new posts in `communities` and ensures the
    /// post watch loop is running. Registering the same community again
    /// appends to its callback list. Every call also triggers one immediate
    /// poll ahead of the schedule.
    pub async fn watch_posts<S: AsRef<str>>(&self, communities: &[S], callback: PostCallback) {
        self.inner
            .post_watchers
            .lock()
            .await
            .register(communities, callback);

        let mut slot = self.inner.post_loop.lock().await;
        if slot.is_none() {
            // The spawned loop's first tick fires immediately.
            *slot = Some(spawn_watch_loop(self.clone(), WatchKind::Posts));
        } else {
            let client = self.clone();
            tokio::spawn(async move { client.poll_posts_once().await });
        }
    }

    /// Clears all post watch registrations and stops the loop. An in-flight
    /// tick completes; the next one never fires.
    pub async fn unwatch_posts(&self) {
        self.inner.post_watchers.lock().await.clear();
        if let Some(handle) = self.inner.post_loop.lock().await.take() {
            handle.stop();
        }
        info!("post watchers cleared");
    }

    /// Registers `callback` for new or edited comments in `communities` and
    /// ensures the comment watch loop is running.
    pub async fn watch_comments<S: AsRef<str>>(
        &self,
        communities: &[S],
        callback: CommentCallback,
    ) {
        self.inner
            .comment_watchers
            .lock()
            .await
            .register(communities, callback);

        let mut slot = self.inner.comment_loop.lock().await;
        if slot.is_none() {
            *slot = Some(spawn_watch_loop(self.clone(), WatchKind::Comments));
        } else {
            let client = self.clone();
            tokio::spawn(async move { client.poll_comments_once().await });
        }
    }

    /// Clears all comment watch registrations and stops the loop.
    pub async fn unwatch_comments(&self) {
        self.inner.comment_watchers.lock().await.clear();
        if let Some(handle) = self.inner.comment_loop.lock().await.take() {
            handle.stop();
        }
        info!("comment watchers cleared");
    }

    /// One tick of the post watch loop: fetch the latest posts, dispatch the
    /// unseen ones to matching watchers.
    pub(crate) async fn poll_posts_once(&self) {
        let _tick = self.inner.post_tick_lock.lock().await;

        let feed = self
            .get_posts(PostSort::Latest, WATCH_PAGE_LIMIT, None, None)
            .await;
        if feed.posts.is_empty() {
            debug!("post watch tick returned no posts");
            return;
        }

        for post in feed.posts {
            let key = post_key(&post.id);
            if self.inner.seen.is_seen(&key).await {
                debug!(post = %post.id, "skipping post because it has already been seen");
                continue;
            }

            let callbacks = self
                .inner
                .post_watchers
                .lock()
                .await
                .callbacks_for(&post.community_name);

            for callback in callbacks {
                if let Err(err) = callback(post.community_name.clone(), post.clone()).await {
                    warn!(post = %post.id, error = %err, "post watch callback failed");
                }
                self.inner.seen.add(&key).await;
                sleep(self.inner.config.dispatch_delay).await;
            }
        }
    }

    /// One tick of the comment watch loop: for each watched community, walk
    /// the activity feed and each post's comment thread, dispatching unseen
    /// comments.
    pub(crate) async fn poll_comments_once(&self) {
        let _tick = self.inner.comment_tick_lock.lock().await;

        let communities = self.inner.comment_watchers.lock().await.communities();
        for community in communities {
            let Some(community_id) = self.resolve_community_id(&community).await else {
                warn!(%community, "could not resolve community id, skipping");
                continue;
            };

            let feed = self
                .get_posts(
                    PostSort::Activity,
                    WATCH_PAGE_LIMIT,
                    None,
                    Some(&community_id),
                )
                .await;
            if feed.posts.is_empty() {
                debug!(%community, "no recent activity");
                continue;
            }

            for post in feed.posts {
                let comments = self.collect_thread(&post.public_id).await;
                for comment in comments {
                    let key = comment_key(&comment);
                    if self.inner.seen.is_seen(&key).await {
                        continue;
                    }

                    let callbacks = self
                        .inner
                        .comment_watchers
                        .lock()
                        .await
                        .callbacks_for(&post.community_name);

                    for callback in callbacks {
                        if let Err(err) =
                            callback(post.community_name.clone(), comment.clone()).await
                        {
                            warn!(
                                comment = %comment.id,
                                error = %err,
                                "comment watch callback failed"
                            );
                        }
                        self.inner.seen.add(&key).await;
                        sleep(self.inner.config.dispatch_delay).await;
                    }
                }
            }
        }
    }

    /// Accumulates a post's full comment thread, following the pagination
    /// cursor for at most [`COMMENT_PAGE_CAP`] pages.
    async fn collect_thread(&self, public_id: &str) -> Vec<Comment> {
        let mut comments = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..COMMENT_PAGE_CAP {
            let page = self.get_post_comments(public_id, cursor.as_deref(), None).await;
            comments.extend(page.comments);
            match page.next {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        comments
    }

    /// Maps a lowercase community name to its id, caching the result.
    async fn resolve_community_id(&self, community: &str) -> Option<String> {
        let name = community.to_lowercase();
        if let Some(id) = self.inner.community_ids.lock().await.get(&name).cloned() {
            return Some(id);
        }

        let communities = self.get_communities().await;
        let mut cache = self.inner.community_ids.lock().await;
        for community in &communities {
            cache.insert(community.name.to_lowercase(), community.id.clone());
        }
        cache.get(&name).cloned()
    }
}
