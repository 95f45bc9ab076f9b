//! Outbound notifications about blog writes.
//!
//! Listeners (cache invalidation, search indexing, ...) subscribe to a
//! broadcast channel. Events are only published after the write committed.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::db::models::BlogPost;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "blog", rename_all = "camelCase")]
pub enum BlogEvent {
    Created(BlogPost),
    Updated(BlogPost),
    Deleted(BlogPost),
}

impl BlogEvent {
    pub fn blog(&self) -> &BlogPost {
        match self {
            BlogEvent::Created(blog) | BlogEvent::Updated(blog) | BlogEvent::Deleted(blog) => blog,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlogEvent::Created(_) => "BlogCreated",
            BlogEvent::Updated(_) => "BlogUpdated",
            BlogEvent::Deleted(_) => "BlogDeleted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlogEvents {
    sender: broadcast::Sender<BlogEvent>,
}

impl BlogEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BlogEvent> {
        self.sender.subscribe()
    }

    /// Fire-and-forget; an event nobody listens to is dropped.
    pub fn publish(&self, event: BlogEvent) {
        let name = event.name();
        let blog_id = event.blog().id;
        match self.sender.send(event) {
            Ok(listeners) => {
                tracing::debug!(event = name, blog_id, listeners, "event published")
            }
            Err(_) => tracing::debug!(event = name, blog_id, "event dropped, no listeners"),
        }
    }
}

impl Default for BlogEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::BlogStatus;
    use chrono::Utc;

    fn blog(id: i64) -> BlogPost {
        let now = Utc::now();
        BlogPost {
            id,
            name: "Post".to_string(),
            slug: "post".to_string(),
            content: String::new(),
            publish_datetime: now,
            featured_image: None,
            meta_title: None,
            meta_keywords: None,
            meta_description: None,
            canonical_link: None,
            status: BlogStatus::Published,
            created_by: 1,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let events = BlogEvents::default();
        let mut rx = events.subscribe();

        events.publish(BlogEvent::Created(blog(7)));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.name(), "BlogCreated");
        assert_eq!(received.blog().id, 7);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let events = BlogEvents::new(0);
        events.publish(BlogEvent::Deleted(blog(1)));
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(BlogEvent::Updated(blog(3))).unwrap();
        assert_eq!(json["event"], "updated");
        assert_eq!(json["blog"]["id"], 3);
    }
}
