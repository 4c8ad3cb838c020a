use crate::client::Discuit;
use discuit_core::{Comment, Post};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Page size requested from the feeds the watch loops poll. Large enough
/// that, at the default polling interval, nothing should slip between two
/// ticks under normal posting rates. Best effort, not a guarantee.
pub(crate) const WATCH_PAGE_LIMIT: u32 = 50;

/// Hard cap on pages fetched while walking one post's comment thread, to
/// guard against pathological pagination.
pub(crate) const COMMENT_PAGE_CAP: usize = 10;

pub type CallbackResult = anyhow::Result<()>;

/// Callback invoked with `(community_name, post)` for each newly seen post.
pub type PostCallback =
    Arc<dyn Fn(String, Post) -> BoxFuture<'static, CallbackResult> + Send + Sync>;

/// Callback invoked with `(community_name, comment)` for each newly seen or
/// edited comment.
pub type CommentCallback =
    Arc<dyn Fn(String, Comment) -> BoxFuture<'static, CallbackResult> + Send + Sync>;

/// Wraps an async closure into a [`PostCallback`].
pub fn post_callback<F, Fut>(f: F) -> PostCallback
where
    F: Fn(String, Post) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallbackResult> + Send + 'static,
{
    Arc::new(move |community, post| Box::pin(f(community, post)))
}

/// Wraps an async closure into a [`CommentCallback`].
pub fn comment_callback<F, Fut>(f: F) -> CommentCallback
where
    F: Fn(String, Comment) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallbackResult> + Send + 'static,
{
    Arc::new(move |community, comment| Box::pin(f(community, comment)))
}

/// Deduplication key for a post occurrence.
pub fn post_key(post_id: &str) -> String {
    format!("post-{post_id}")
}

/// Deduplication key for a comment occurrence. The edit timestamp is part of
/// the key, so an edited comment counts as a new occurrence.
pub fn comment_key(comment: &Comment) -> String {
    let edited = comment
        .edited_at
        .map(|t| t.timestamp().to_string())
        .unwrap_or_else(|| "0".to_string());
    format!("comment-{}-{}", comment.id, edited)
}

/// A (community, callback-list) registration.
pub struct Watcher<C> {
    pub community: String,
    pub callbacks: Vec<C>,
}

/// Watch registrations keyed by lowercase community name. Registering a
/// community that already has watchers appends to its callback list.
pub struct WatcherSet<C> {
    watchers: Vec<Watcher<C>>,
}

impl<C: Clone> WatcherSet<C> {
    pub fn new() -> Self {
        Self {
            watchers: Vec::new(),
        }
    }

    pub fn register<S: AsRef<str>>(&mut self, communities: &[S], callback: C) {
        for community in communities {
            let community = community.as_ref().to_lowercase();
            match self.watchers.iter_mut().find(|w| w.community == community) {
                Some(watcher) => watcher.callbacks.push(callback.clone()),
                None => self.watchers.push(Watcher {
                    community,
                    callbacks: vec![callback.clone()],
                }),
            }
        }
    }

    /// All callbacks registered for `community`, in registration order.
    /// Matching is case-insensitive.
    pub fn callbacks_for(&self, community: &str) -> Vec<C> {
        let community = community.to_lowercase();
        self.watchers
            .iter()
            .filter(|w| w.community == community)
            .flat_map(|w| w.callbacks.iter().cloned())
            .collect()
    }

    /// The watched community names (already lowercased), in registration order.
    pub fn communities(&self) -> Vec<String> {
        self.watchers.iter().map(|w| w.community.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.watchers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }
}

impl<C: Clone> Default for WatcherSet<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchKind {
    Posts,
    Comments,
}

/// Handle to a running watch loop task.
pub(crate) struct WatchHandle {
    task: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

impl WatchHandle {
    /// Signals the loop to stop. An in-flight tick is not interrupted; it
    /// completes and the loop exits before the next tick.
    pub(crate) fn stop(self) {
        self.shutdown.notify_one();
        drop(self.task);
    }
}

/// Spawns the recurring loop for one watch kind. The first tick fires
/// immediately, then on the configured period.
pub(crate) fn spawn_watch_loop(client: Discuit, kind: WatchKind) -> WatchHandle {
    let period = match kind {
        WatchKind::Posts => client.config().post_poll_interval,
        WatchKind::Comments => client.config().comment_poll_interval,
    };

    let shutdown = Arc::new(Notify::new());
    let stop = shutdown.clone();

    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.notified() => {
                    debug!(?kind, "watch loop stopped");
                    break;
                }
                _ = ticker.tick() => match kind {
                    WatchKind::Posts => client.poll_posts_once().await,
                    WatchKind::Comments => client.poll_comments_once().await,
                },
            }
        }
    });

    WatchHandle { task, shutdown }
}
