use std::time::Duration;

/// Whether mutating calls require an explicit login.
///
/// Inside a browser-hosted session the ambient cookies already carry
/// authentication, so the guard can be relaxed there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthPolicy {
    /// Mutating calls fail unless `login` has succeeded.
    #[default]
    RequireLogin,
    /// Trust ambient session cookies; skip the logged-in check.
    AmbientSession,
}

/// Tunable settings for the client and its watch loops.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How often the post watch loop polls the latest-posts feed.
    pub post_poll_interval: Duration,
    /// How often the comment watch loop polls watched communities.
    pub comment_poll_interval: Duration,
    /// Pause after each watch callback invocation, throttling callback-side
    /// effects such as outbound API calls.
    pub dispatch_delay: Duration,
    /// Maximum pages fetched by `get_all_notifications`.
    pub max_notification_pages: u32,
    pub auth_policy: AuthPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            post_poll_interval: Duration::from_secs(60 * 10),
            comment_poll_interval: Duration::from_secs(60 * 10),
            dispatch_delay: Duration::from_millis(5000),
            max_notification_pages: 3,
            auth_policy: AuthPolicy::default(),
        }
    }
}
