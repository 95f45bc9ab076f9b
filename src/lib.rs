//! Blog Admin Backend - blog posts, tags, categories and featured images

pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod repository;
pub mod slug;
pub mod uploads;

use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

use db::{BlogStore, DbConfig, MemoryBlogStore, PgBlogStore};
use events::BlogEvents;
use logging::LogConfig;
use repository::BlogsRepository;
use uploads::{LocalFileUploads, UploadConfig};

pub use error::{BlogError, BlogResult};
pub use repository::{parse_status, ActingUser, BlogInput};

pub type Repository = BlogsRepository<Arc<dyn BlogStore>, LocalFileUploads>;

/// Everything the enclosing request layer needs, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db: DbConfig,
    pub uploads: UploadConfig,
    pub log: LogConfig,
    pub event_capacity: usize,
}

impl AppConfig {
    /// Load `.env` (if present) and build the configuration from env vars.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            uploads: UploadConfig::default(),
            log: LogConfig::default(),
            event_capacity: std::env::var("EVENT_CHANNEL_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(64),
        }
    }
}

/// A wired-up repository plus the log writer guards.
pub struct App {
    pub repository: Repository,
    // Dropping these shuts down the background log writers.
    _log_guards: Vec<WorkerGuard>,
}

/// Pick the PostgreSQL store when a database is reachable, otherwise fall
/// back to the in-memory store.
pub async fn build_store(config: &DbConfig) -> Arc<dyn BlogStore> {
    if config.url.is_none() {
        tracing::info!("DATABASE_URL not set. Using in-memory blog store.");
        return Arc::new(MemoryBlogStore::new());
    }

    match db::init_pool(config).await {
        Ok(pool) => Arc::new(PgBlogStore::new(pool)),
        Err(e) => {
            tracing::warn!(
                "Failed to initialize database pool: {}. Using in-memory blog store.",
                e
            );
            Arc::new(MemoryBlogStore::new())
        }
    }
}

/// Initialize logging and build the blog repository.
pub async fn bootstrap(config: AppConfig) -> App {
    let log_guards = logging::init(&config.log);

    let store = build_store(&config.db).await;
    let uploads = LocalFileUploads::new(config.uploads.clone());
    let events = BlogEvents::new(config.event_capacity);

    tracing::info!(
        upload_root = %config.uploads.root.display(),
        "blog repository ready"
    );

    App {
        repository: BlogsRepository::new(store, uploads, events),
        _log_guards: log_guards,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_store_without_url_uses_memory_store() {
        let config = DbConfig {
            url: None,
            ..DbConfig::default()
        };
        let store = build_store(&config).await;
        assert!(store.list_posts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repository_over_shared_store() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn BlogStore> = Arc::new(MemoryBlogStore::new());
        let repository: Repository = BlogsRepository::new(
            store,
            LocalFileUploads::new(UploadConfig {
                root: dir.path().to_path_buf(),
                max_file_size: 1024,
            }),
            BlogEvents::default(),
        );

        let input = BlogInput {
            name: "Shared Store".to_string(),
            tags: vec!["launch".to_string()],
            ..BlogInput::default()
        };
        let blog = repository.create(input, ActingUser::new(3)).await.unwrap();

        assert_eq!(blog.slug, "shared-store");
        assert_eq!(repository.tag_ids(blog.id).await.unwrap().len(), 1);
    }
}
