use crate::client::Discuit;
use crate::testing::{json_response, transport_error, RecordedFetch};
use crate::watch::{comment_callback, post_callback};
use discuit_core::{ApiError, AuthPolicy, ClientConfig, DiscuitError, PostSort};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("discuit_client=debug")
        .with_test_writer()
        .try_init();
}

/// Config with long intervals and no dispatch throttling, so tests drive the
/// ticks manually.
fn test_config() -> ClientConfig {
    ClientConfig {
        post_poll_interval: Duration::from_secs(3600),
        comment_poll_interval: Duration::from_secs(3600),
        dispatch_delay: Duration::ZERO,
        ..ClientConfig::default()
    }
}

fn test_client(fetch: Arc<RecordedFetch>) -> Discuit {
    Discuit::new(fetch).with_config(test_config())
}

fn ambient_client(fetch: Arc<RecordedFetch>) -> Discuit {
    let config = ClientConfig {
        auth_policy: AuthPolicy::AmbientSession,
        ..test_config()
    };
    Discuit::new(fetch).with_config(config)
}

/// Waits until `route` has received at least `count` requests. Used to let a
/// spawned watch loop finish its immediate first tick before a test proceeds.
async fn wait_for_requests(fetch: &RecordedFetch, route: &str, count: usize) {
    for _ in 0..400 {
        if fetch.requests_to(route) >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {count} requests to {route}");
}

/// A posts-feed route whose contents tests can swap mid-flight.
fn mutable_posts_route(fetch: RecordedFetch, posts: Arc<Mutex<Value>>) -> RecordedFetch {
    fetch.route(Method::GET, "/posts", move |_| {
        json_response(
            200,
            json!({ "posts": posts.lock().unwrap().clone(), "next": null }),
        )
    })
}

#[tokio::test]
async fn test_login_success_and_rejection() {
    let fetch = Arc::new(RecordedFetch::new().route(Method::POST, "/_login", |req| {
        let body = req.body.as_ref().expect("login sends a body");
        if body["username"] == "alice" && body["password"] == "hunter2" {
            json_response(200, json!({ "id": "u1", "username": "alice" }))
        } else {
            json_response(401, json!({}))
        }
    }));
    let client = test_client(fetch.clone());

    assert!(client.login("alice", "wrong").await.unwrap().is_none());
    assert!(client.user().await.is_none());

    let user = client.login("alice", "hunter2").await.unwrap().unwrap();
    assert_eq!(user.id, "u1");
    assert_eq!(client.user().await.unwrap().username, "alice");
    assert_eq!(fetch.requests_to("/_login"), 2);
}

#[tokio::test]
async fn test_with_config_preserves_session() {
    let fetch = Arc::new(RecordedFetch::new().json_route(
        Method::POST,
        "/_login",
        json!({ "id": "u1", "username": "alice" }),
    ));
    let client = Discuit::new(fetch);
    client.login("alice", "hunter2").await.unwrap().unwrap();

    // Reconfiguring keeps the logged-in user.
    let client = client.with_config(test_config());
    assert_eq!(client.user().await.unwrap().username, "alice");
}

#[tokio::test]
async fn test_mutating_call_requires_login() {
    let fetch = Arc::new(RecordedFetch::new());
    let client = test_client(fetch.clone());

    let err = client.comment("p1", "hello", None).await.unwrap_err();
    assert!(matches!(
        err,
        DiscuitError::Api(ApiError::NotAuthenticated { .. })
    ));
    // The guard rejects before anything goes on the wire.
    assert_eq!(fetch.request_count(), 0);
}

#[tokio::test]
async fn test_ambient_session_bypasses_auth_guard() {
    let fetch = Arc::new(RecordedFetch::new().json_route(
        Method::POST,
        "/posts/p1/comments",
        json!({ "id": "c1", "body": "hello" }),
    ));
    let client = ambient_client(fetch.clone());

    let comment = client.comment("p1", "hello", None).await.unwrap().unwrap();
    assert_eq!(comment.id, "c1");

    let request = &fetch.requests()[0];
    assert_eq!(request.path, "/posts/p1/comments?userGroup=normal");
    assert_eq!(request.body.as_ref().unwrap()["body"], "hello");
    assert_eq!(
        request.body.as_ref().unwrap()["parentCommentId"],
        Value::Null
    );
}

#[tokio::test]
async fn test_get_posts_query_shape() {
    let fetch = Arc::new(RecordedFetch::new().json_route(
        Method::GET,
        "/posts",
        json!({ "posts": [], "next": null }),
    ));
    let client = test_client(fetch.clone());

    client.get_posts(PostSort::Latest, 25, Some("abc"), None).await;
    client
        .get_posts(PostSort::Activity, 50, None, Some("c1"))
        .await;

    let requests = fetch.requests();
    assert_eq!(requests[0].path, "/posts?sort=latest&limit=25&next=abc");
    assert_eq!(requests[1].path, "/posts?sort=activity&limit=50&communityId=c1");
}

#[tokio::test]
async fn test_get_post_comments_query_shape() {
    let fetch = Arc::new(RecordedFetch::new().json_route(
        Method::GET,
        "/posts/1/comments",
        json!({ "comments": [], "next": null }),
    ));
    let client = test_client(fetch.clone());

    client.get_post_comments("1", Some("2"), Some("3")).await;
    client.get_post_comments("1", None, None).await;

    let requests = fetch.requests();
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(requests[0].path, "/posts/1/comments?next=2&parentId=3");
    assert_eq!(requests[1].path, "/posts/1/comments");
}

#[tokio::test]
async fn test_post_dispatch_is_idempotent() {
    init_tracing();

    let posts = Arc::new(Mutex::new(json!([])));
    let fetch = Arc::new(mutable_posts_route(RecordedFetch::new(), posts.clone()));
    let client = test_client(fetch.clone());

    let calls: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();
    client
        .watch_posts(
            &["test"],
            post_callback(move |community, post| {
                let recorded = recorded.clone();
                async move {
                    recorded.lock().unwrap().push((community, post.id));
                    Ok(())
                }
            }),
        )
        .await;
    wait_for_requests(&fetch, "/posts", 1).await;

    *posts.lock().unwrap() = json!([{ "id": "1", "communityName": "Test" }]);
    client.poll_posts_once().await;
    {
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ("Test".to_string(), "1".to_string()));
    }

    // The item is still in the feed, but it has been seen.
    client.poll_posts_once().await;
    assert_eq!(calls.lock().unwrap().len(), 1);

    client.unwatch_posts().await;
}

#[tokio::test]
async fn test_callback_failure_does_not_skip_other_posts() {
    let posts = Arc::new(Mutex::new(json!([
        { "id": "a", "communityName": "t" },
        { "id": "b", "communityName": "t" },
    ])));
    let fetch = Arc::new(mutable_posts_route(RecordedFetch::new(), posts));
    let client = test_client(fetch.clone());

    let delivered: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = delivered.clone();
    client
        .watch_posts(
            &["t"],
            post_callback(move |_, post| {
                let recorded = recorded.clone();
                async move {
                    recorded.lock().unwrap().push(post.id.clone());
                    if post.id == "a" {
                        anyhow::bail!("callback blew up on {}", post.id);
                    }
                    Ok(())
                }
            }),
        )
        .await;
    wait_for_requests(&fetch, "/posts", 1).await;
    client.poll_posts_once().await;

    // Both posts reached the callback even though the first one failed.
    assert_eq!(delivered.lock().unwrap().clone(), vec!["a", "b"]);

    client.unwatch_posts().await;
}

#[tokio::test]
async fn test_watch_registrations_merge_in_order() {
    let posts = Arc::new(Mutex::new(json!([])));
    let fetch = Arc::new(mutable_posts_route(RecordedFetch::new(), posts.clone()));
    let client = test_client(fetch.clone());

    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let first = order.clone();
    client
        .watch_posts(
            &["a"],
            post_callback(move |_, _| {
                let first = first.clone();
                async move {
                    first.lock().unwrap().push("cb1");
                    Ok(())
                }
            }),
        )
        .await;

    let second = order.clone();
    client
        .watch_posts(
            &["a"],
            post_callback(move |_, _| {
                let second = second.clone();
                async move {
                    second.lock().unwrap().push("cb2");
                    Ok(())
                }
            }),
        )
        .await;
    wait_for_requests(&fetch, "/posts", 2).await;

    *posts.lock().unwrap() = json!([{ "id": "1", "communityName": "A" }]);
    client.poll_posts_once().await;

    assert_eq!(order.lock().unwrap().clone(), vec!["cb1", "cb2"]);

    client.unwatch_posts().await;
}

#[tokio::test]
async fn test_unwatch_clears_registrations() {
    let posts = Arc::new(Mutex::new(json!([])));
    let fetch = Arc::new(mutable_posts_route(RecordedFetch::new(), posts.clone()));
    let client = test_client(fetch.clone());

    let calls: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();
    client
        .watch_posts(
            &["test"],
            post_callback(move |_, post| {
                let recorded = recorded.clone();
                async move {
                    recorded.lock().unwrap().push(post.id);
                    Ok(())
                }
            }),
        )
        .await;
    wait_for_requests(&fetch, "/posts", 1).await;

    client.unwatch_posts().await;

    // Even if a tick fires after unwatch, nothing is registered anymore.
    *posts.lock().unwrap() = json!([{ "id": "1", "communityName": "Test" }]);
    client.poll_posts_once().await;
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_watch_posts_polls_immediately() {
    let posts = Arc::new(Mutex::new(json!([{ "id": "9", "communityName": "news" }])));
    let fetch = Arc::new(mutable_posts_route(RecordedFetch::new(), posts));
    let client = test_client(fetch.clone());

    let calls: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();
    client
        .watch_posts(
            &["News"],
            post_callback(move |community, _| {
                let recorded = recorded.clone();
                async move {
                    recorded.lock().unwrap().push(community);
                    Ok(())
                }
            }),
        )
        .await;

    // No manual tick: the loop's first tick fires on its own.
    for _ in 0..400 {
        if !calls.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(calls.lock().unwrap().clone(), vec!["news"]);

    client.unwatch_posts().await;
}

fn page_from_cursor(path: &str, prefix: &str) -> usize {
    path.split(prefix)
        .nth(1)
        .and_then(|s| s.split('&').next())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

#[tokio::test]
async fn test_comment_thread_pagination_cap() {
    init_tracing();

    let activity = Arc::new(Mutex::new(json!([])));
    let activity_route = activity.clone();
    let fetch = Arc::new(
        RecordedFetch::new()
            .json_route(
                Method::GET,
                "/communities",
                json!([{ "id": "c1", "name": "test" }]),
            )
            .route(Method::GET, "/posts", move |_| {
                json_response(
                    200,
                    json!({ "posts": activity_route.lock().unwrap().clone(), "next": null }),
                )
            })
            // A synthetic 15-page comment thread: every page links to the
            // next one until page 14.
            .route(Method::GET, "/posts/p1/comments", |req| {
                let page = page_from_cursor(&req.path, "next=cursor");
                let next = if page < 14 {
                    Value::String(format!("cursor{}", page + 1))
                } else {
                    Value::Null
                };
                json_response(
                    200,
                    json!({ "comments": [{ "id": format!("pc{page}") }], "next": next }),
                )
            }),
    );
    let client = test_client(fetch.clone());

    let calls: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();
    client
        .watch_comments(
            &["test"],
            comment_callback(move |_, comment| {
                let recorded = recorded.clone();
                async move {
                    recorded.lock().unwrap().push(comment.id);
                    Ok(())
                }
            }),
        )
        .await;
    wait_for_requests(&fetch, "/posts", 1).await;

    *activity.lock().unwrap() =
        json!([{ "id": "1", "publicId": "p1", "communityName": "test" }]);
    client.poll_comments_once().await;

    // The pagination cap stops the walk at exactly 10 page fetches.
    assert_eq!(fetch.requests_to("/posts/p1/comments"), 10);
    assert_eq!(calls.lock().unwrap().len(), 10);

    client.unwatch_comments().await;
}

#[tokio::test]
async fn test_edited_comment_dispatches_again() {
    let activity = Arc::new(Mutex::new(json!([])));
    let activity_route = activity.clone();
    let thread = Arc::new(Mutex::new(json!([{ "id": "c1", "editedAt": null }])));
    let thread_route = thread.clone();

    let fetch = Arc::new(
        RecordedFetch::new()
            .json_route(
                Method::GET,
                "/communities",
                json!([{ "id": "c1", "name": "books" }]),
            )
            .route(Method::GET, "/posts", move |_| {
                json_response(
                    200,
                    json!({ "posts": activity_route.lock().unwrap().clone(), "next": null }),
                )
            })
            .route(Method::GET, "/posts/p1/comments", move |_| {
                json_response(
                    200,
                    json!({ "comments": thread_route.lock().unwrap().clone(), "next": null }),
                )
            }),
    );
    let client = test_client(fetch.clone());

    let calls: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();
    client
        .watch_comments(
            &["books"],
            comment_callback(move |community, comment| {
                let recorded = recorded.clone();
                async move {
                    recorded.lock().unwrap().push(format!("{community}:{}", comment.id));
                    Ok(())
                }
            }),
        )
        .await;
    wait_for_requests(&fetch, "/posts", 1).await;

    *activity.lock().unwrap() =
        json!([{ "id": "1", "publicId": "p1", "communityName": "books" }]);
    client.poll_comments_once().await;
    assert_eq!(calls.lock().unwrap().len(), 1);

    // Unchanged comment: same key, no new dispatch.
    client.poll_comments_once().await;
    assert_eq!(calls.lock().unwrap().len(), 1);

    // Edited comment: the edit timestamp changes the key.
    *thread.lock().unwrap() = json!([{ "id": "c1", "editedAt": "2023-07-22T10:30:00Z" }]);
    client.poll_comments_once().await;
    assert_eq!(
        calls.lock().unwrap().clone(),
        vec!["books:c1".to_string(), "books:c1".to_string()]
    );

    client.unwatch_comments().await;
}

#[tokio::test]
async fn test_get_all_notifications_respects_page_limit() {
    let fetch = Arc::new(RecordedFetch::new().route(Method::GET, "/notifications", |req| {
        // Endless feed: every page links to another one.
        let page = page_from_cursor(&req.path, "next=cursor");
        json_response(
            200,
            json!({
                "items": [{ "id": page as i64, "type": "new_comment" }],
                "next": format!("cursor{}", page + 1),
            }),
        )
    }));
    let client = test_client(fetch.clone());

    let notifications = client.get_all_notifications().await;
    assert_eq!(notifications.len(), 3);
    assert_eq!(fetch.requests_to("/notifications"), 3);
}

#[tokio::test]
async fn test_notification_mutation_paths() {
    let fetch = Arc::new(
        RecordedFetch::new()
            .json_route(Method::PUT, "/notifications/5", json!({}))
            .json_route(Method::POST, "/notifications", json!({})),
    );
    let client = ambient_client(fetch.clone());

    assert!(client.mark_notification_seen(5).await.unwrap());
    assert!(client.mark_all_notifications_seen().await.unwrap());

    let requests = fetch.requests();
    assert_eq!(requests[0].path, "/notifications/5?action=markAsSeen&seen=true");
    // The empty type parameter travels as-is.
    assert_eq!(requests[1].path, "/notifications?action=markAllAsSeen&type=");
}

#[tokio::test]
async fn test_vote_post_body() {
    let fetch =
        Arc::new(RecordedFetch::new().json_route(Method::POST, "/_postVote", json!({})));
    let client = ambient_client(fetch.clone());

    assert!(client.vote_post("p1", true).await.unwrap());

    let request = &fetch.requests()[0];
    assert_eq!(request.body.as_ref().unwrap()["postId"], "p1");
    assert_eq!(request.body.as_ref().unwrap()["up"], true);
}

#[tokio::test]
async fn test_failed_tick_skips_without_stopping_the_loop() {
    init_tracing();

    let healthy = Arc::new(AtomicBool::new(false));
    let toggle = healthy.clone();
    let fetch = Arc::new(RecordedFetch::new().try_route(Method::GET, "/posts", move |_| {
        if !toggle.load(Ordering::SeqCst) {
            return Err(transport_error());
        }
        Ok(json_response(
            200,
            json!({ "posts": [{ "id": "1", "communityName": "t" }], "next": null }),
        ))
    }));
    let client = test_client(fetch.clone());

    let calls: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();
    client
        .watch_posts(
            &["t"],
            post_callback(move |_, post| {
                let recorded = recorded.clone();
                async move {
                    recorded.lock().unwrap().push(post.id);
                    Ok(())
                }
            }),
        )
        .await;
    wait_for_requests(&fetch, "/posts", 1).await;

    // A one-off read collapses the same failure to a sentinel.
    assert!(client.get_posts(PostSort::Latest, 10, None, None).await.posts.is_empty());

    // The failing tick dispatches nothing.
    client.poll_posts_once().await;
    assert!(calls.lock().unwrap().is_empty());

    // Once the transport recovers, the next tick dispatches normally.
    healthy.store(true, Ordering::SeqCst);
    client.poll_posts_once().await;
    assert_eq!(calls.lock().unwrap().clone(), vec!["1"]);

    client.unwatch_posts().await;
}

#[tokio::test]
async fn test_failed_reads_return_sentinels() {
    // No routes registered: everything 404s.
    let fetch = Arc::new(RecordedFetch::new());
    let client = test_client(fetch.clone());

    assert!(client.get_post("nope").await.is_none());
    assert!(client.get_posts(PostSort::Latest, 10, None, None).await.posts.is_empty());
    assert!(client.get_communities().await.is_empty());
    assert!(client.get_all_notifications().await.is_empty());
}
