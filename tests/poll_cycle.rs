//! Integration tests for the poll loop: select, mark, fetch, ingest.
//!
//! Each test creates its own in-memory SQLite database and a wiremock
//! server standing in for the remote feeds.

use chrono::{DateTime, Utc};
use gator::feed::FeedFetcher;
use gator::scheduler::{CycleError, Scheduler};
use gator::storage::{Database, FeedStore};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rss(items: &[(&str, &str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(title, link, date)| {
            format!(
                "<item><title>{}</title><link>{}</link><pubDate>{}</pubDate><description>About {}</description></item>",
                title, link, date, title
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom"><channel>
<title>Mock</title><link>https://mock.example.com</link>
<atom:link href="https://mock.example.com/rss" rel="self"/>
{}
</channel></rss>"#,
        items
    )
}

async fn serve(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn setup() -> (Database, i64) {
    let db = Database::open(":memory:").await.unwrap();
    let user = db.create_user("kahya").await.unwrap();
    (db, user.id)
}

fn scheduler(db: &Database, owner: i64) -> Scheduler<Database> {
    let fetcher = FeedFetcher::new(Duration::from_secs(5)).unwrap();
    Scheduler::new(db.clone(), fetcher, owner, Duration::from_millis(10))
}

#[tokio::test]
async fn test_round_robin_across_feeds() {
    let server = MockServer::start().await;
    let mut ids = Vec::new();
    let (db, owner) = setup().await;
    for n in 0..3 {
        let route = format!("/feed{}", n);
        let link = format!("https://mock.example.com/{}/post", n);
        serve(&server, &route, rss(&[("post", &link, "Mon, 02 Jan 2006 15:04:05 GMT")])).await;
        let feed = db
            .create_feed(owner, &format!("Feed {}", n), &format!("{}{}", server.uri(), route))
            .await
            .unwrap();
        ids.push(feed.id);
    }

    let sched = scheduler(&db, owner);
    let mut visited = Vec::new();
    for _ in 0..6 {
        visited.push(sched.poll_once().await.unwrap().feed.id);
    }

    assert_eq!(visited[..3], ids[..]);
    assert_eq!(visited[3..], ids[..]);
    assert_eq!(db.count_posts().await.unwrap(), 3);
}

#[tokio::test]
async fn test_repeated_polls_store_each_link_once() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/rss",
        rss(&[
            ("one", "https://mock.example.com/1", "Mon, 02 Jan 2006 15:04:05 MST"),
            ("one again", "https://mock.example.com/1", "Mon, 02 Jan 2006 15:04:05 MST"),
            ("two", "https://mock.example.com/2", "02 Jan 06 15:04 -0700"),
            ("three", "https://mock.example.com/3", "not a date"),
        ]),
    )
    .await;

    let (db, owner) = setup().await;
    let feed = db
        .create_feed(owner, "Mock", &format!("{}/rss", server.uri()))
        .await
        .unwrap();

    let sched = scheduler(&db, owner);
    let first = sched.poll_once().await.unwrap();
    assert_eq!(first.ingest.created, 3);
    assert_eq!(first.ingest.duplicates, 1);

    let second = sched.poll_once().await.unwrap();
    assert_eq!(second.ingest.created, 0);
    assert_eq!(second.ingest.duplicates, 4);

    let posts = db.get_posts_for_feed(feed.id).await.unwrap();
    assert_eq!(posts.len(), 3);
    let one = posts.iter().find(|p| p.url.ends_with("/1")).unwrap();
    assert_eq!(one.title.as_deref(), Some("one"), "first occurrence wins");
    assert_eq!(one.published_at.to_rfc3339(), "2006-01-02T22:04:05+00:00");
    let two = posts.iter().find(|p| p.url.ends_with("/2")).unwrap();
    assert_eq!(two.published_at.to_rfc3339(), "2006-01-02T22:04:00+00:00");
    let three = posts.iter().find(|p| p.url.ends_with("/3")).unwrap();
    assert_eq!(three.published_at, DateTime::UNIX_EPOCH);
}

#[tokio::test]
async fn test_fetch_failure_marks_and_moves_on() {
    let server = MockServer::start().await;
    serve(&server, "/good", rss(&[("ok", "https://mock.example.com/ok", "")])).await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503).set_body_string("<html>down</html>"))
        .mount(&server)
        .await;

    let (db, owner) = setup().await;
    let broken = db
        .create_feed(owner, "Broken", &format!("{}/broken", server.uri()))
        .await
        .unwrap();
    let good = db
        .create_feed(owner, "Good", &format!("{}/good", server.uri()))
        .await
        .unwrap();

    let before = Utc::now();
    let sched = scheduler(&db, owner);
    let err = sched.poll_once().await.unwrap_err();
    assert!(matches!(err, CycleError::Fetch { .. }));

    let marked = db.get_feed(broken.id).await.unwrap().unwrap();
    assert!(marked.last_fetched_at.unwrap() >= before - chrono::Duration::seconds(1));

    let next = db.next_feed_to_fetch(owner).await.unwrap().unwrap();
    assert_eq!(next.id, good.id);
    assert_eq!(sched.poll_once().await.unwrap().ingest.created, 1);
}

#[tokio::test]
async fn test_run_survives_failing_cycles_until_stopped() {
    let (db, owner) = setup().await;
    db.create_feed(owner, "Down", "http://127.0.0.1:1/rss")
        .await
        .unwrap();

    let (tx, rx) = watch::channel(false);
    let sched = scheduler(&db, owner);
    let handle = tokio::spawn(async move {
        let mut out = Vec::new();
        let cycles = sched.run(rx, &mut out).await;
        (cycles, String::from_utf8(out).unwrap())
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(true).unwrap();
    let (cycles, output) = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(cycles >= 2, "every tick runs a cycle even after failures, got {}", cycles);
    assert_eq!(db.count_posts().await.unwrap(), 0);
    let failures = output
        .lines()
        .filter(|l| l.starts_with("Error: Fetching http://127.0.0.1:1/rss failed"))
        .count();
    assert_eq!(failures, cycles);
}
