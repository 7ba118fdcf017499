use crate::feed::dates::resolve_published;
use crate::feed::parser::{ParsedFeed, ParsedItem};
use crate::storage::{NewPost, PostStore};

/// Outcome of one ingested document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Items stored as new posts
    pub created: usize,
    /// Items whose link was already stored
    pub duplicates: usize,
    /// Items skipped because of a missing link or a store error
    pub failed: usize,
    /// One line per failed item, naming the item and the cause
    pub errors: Vec<String>,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.created + self.duplicates + self.failed
    }
}

/// Persist every item of `feed` as a post of `feed_id`.
///
/// Items are stored one at a time in document order. A failure on one item
/// is recorded in the report, and never undoes posts already stored or stops
/// the remaining items. A link seen before (in this document or any earlier
/// fetch) is a silent skip.
pub async fn ingest<S>(store: &S, feed_id: i64, feed: &ParsedFeed) -> IngestReport
where
    S: PostStore + ?Sized,
{
    let mut report = IngestReport::default();

    for item in &feed.items {
        let Some(post) = to_new_post(feed_id, item) else {
            tracing::warn!(feed_id, title = %item.title, "Skipping item without a link");
            report.failed += 1;
            report
                .errors
                .push(format!("item '{}' has no link", item.title.trim()));
            continue;
        };

        match store.insert_post_if_absent(&post).await {
            Ok((_, true)) => report.created += 1,
            Ok((_, false)) => report.duplicates += 1,
            Err(e) => {
                tracing::warn!(feed_id, url = %post.url, error = %e, "Failed to store post");
                report.failed += 1;
                report.errors.push(format!("{}: {}", post.url, e));
            }
        }
    }

    tracing::debug!(
        feed_id,
        created = report.created,
        duplicates = report.duplicates,
        failed = report.failed,
        "Ingested feed items"
    );
    report
}

fn to_new_post(feed_id: i64, item: &ParsedItem) -> Option<NewPost> {
    let url = item.link.trim();
    if url.is_empty() {
        return None;
    }

    Some(NewPost {
        feed_id,
        title: non_empty(&item.title),
        url: url.to_string(),
        description: non_empty(&item.description),
        published_at: resolve_published(&item.pub_date),
    })
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, DatabaseError, Post};
    use async_trait::async_trait;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;

    fn item(link: &str, pub_date: &str) -> ParsedItem {
        ParsedItem {
            title: format!("Title of {}", link),
            link: link.to_string(),
            description: String::new(),
            pub_date: pub_date.to_string(),
        }
    }

    fn document(items: Vec<ParsedItem>) -> ParsedFeed {
        ParsedFeed {
            title: "Feed".to_string(),
            items,
            ..Default::default()
        }
    }

    async fn setup() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        let feed = db
            .create_feed(user.id, "Blog", "https://blog.example.com/rss")
            .await
            .unwrap();
        (db, feed.id)
    }

    #[tokio::test]
    async fn test_duplicate_links_in_one_document_store_once() {
        let (db, feed_id) = setup().await;
        let doc = document(vec![
            item("https://blog.example.com/same", "Mon, 02 Jan 2006 15:04:05 GMT"),
            item("https://blog.example.com/same", "Tue, 03 Jan 2006 15:04:05 GMT"),
        ]);

        let report = ingest(&db, feed_id, &doc).await;

        assert_eq!(
            report,
            IngestReport {
                created: 1,
                duplicates: 1,
                failed: 0,
                errors: Vec::new(),
            }
        );
        assert_eq!(db.count_posts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reingest_creates_nothing() {
        let (db, feed_id) = setup().await;
        let doc = document(vec![
            item("https://blog.example.com/1", ""),
            item("https://blog.example.com/2", ""),
        ]);

        assert_eq!(ingest(&db, feed_id, &doc).await.created, 2);
        let again = ingest(&db, feed_id, &doc).await;

        assert_eq!(again.created, 0);
        assert_eq!(again.duplicates, 2);
        assert_eq!(db.count_posts().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dates_resolved_and_empty_fields_null() {
        let (db, feed_id) = setup().await;
        let doc = document(vec![
            item("https://blog.example.com/dated", "2006-01-02T15:04:05-07:00"),
            item("https://blog.example.com/undated", "sometime last week"),
        ]);

        ingest(&db, feed_id, &doc).await;
        let posts = db.get_posts_for_feed(feed_id).await.unwrap();

        assert_eq!(posts[0].url, "https://blog.example.com/dated");
        assert_eq!(posts[0].published_at.to_rfc3339(), "2006-01-02T22:04:05+00:00");
        assert_eq!(posts[0].description, None);
        assert_eq!(posts[1].published_at, DateTime::UNIX_EPOCH);
        assert_eq!(
            posts[1].title.as_deref(),
            Some("Title of https://blog.example.com/undated")
        );
    }

    #[tokio::test]
    async fn test_item_without_link_counted_as_failed() {
        let (db, feed_id) = setup().await;
        let doc = document(vec![item("   ", ""), item("https://blog.example.com/ok", "")]);

        let report = ingest(&db, feed_id, &doc).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.total(), 2);
        assert_eq!(report.errors, vec!["item 'Title of' has no link".to_string()]);
    }

    /// Fails inserts for one URL, delegates the rest.
    struct FlakyStore {
        inner: Database,
        poisoned: &'static str,
    }

    #[async_trait]
    impl PostStore for FlakyStore {
        async fn insert_post_if_absent(&self, post: &NewPost) -> Result<(Post, bool), DatabaseError> {
            if post.url == self.poisoned {
                return Err(DatabaseError::Migration("disk on fire".to_string()));
            }
            self.inner.insert_post_if_absent(post).await
        }
    }

    #[tokio::test]
    async fn test_item_failure_does_not_abort_batch() {
        let (db, feed_id) = setup().await;
        let store = FlakyStore {
            inner: db,
            poisoned: "https://blog.example.com/2",
        };
        let doc = document(vec![
            item("https://blog.example.com/1", ""),
            item("https://blog.example.com/2", ""),
            item("https://blog.example.com/3", ""),
        ]);

        let report = ingest(&store, feed_id, &doc).await;

        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("https://blog.example.com/2: "));
        assert!(report.errors[0].contains("disk on fire"));
        let urls: Vec<_> = store
            .inner
            .get_posts_for_feed(feed_id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.url)
            .collect();
        assert!(urls.contains(&"https://blog.example.com/1".to_string()));
        assert!(urls.contains(&"https://blog.example.com/3".to_string()));
    }
}
