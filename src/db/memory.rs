//! In-process blog store.
//!
//! Used when no `DATABASE_URL` is configured and by the test suite. A
//! transaction holds the store lock for its whole lifetime and works on a
//! staged copy of the tables, so commit is a swap and rollback is a drop.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::models::{BlogListRow, BlogPost, NewBlogPost, NewTerm, Term};
use super::{Association, BlogStore, BlogTransaction, StoreError};

/// Store operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `insert_post` returns an error.
    InsertPost,
    /// `update_post` reports that no row was updated.
    UpdatePost,
    /// `delete_post` reports that no row was deleted.
    DeletePost,
    /// `sync` returns an error for this relation.
    Sync(Association),
}

#[derive(Debug, Clone, Default)]
struct Tables {
    next_post_id: i64,
    next_term_id: HashMap<Association, i64>,
    posts: BTreeMap<i64, BlogPost>,
    terms: HashMap<Association, BTreeMap<i64, Term>>,
    maps: HashMap<Association, BTreeSet<(i64, i64)>>,
    users: HashMap<i64, String>,
}

impl Tables {
    fn next_term_id(&mut self, kind: Association) -> i64 {
        let next = self.next_term_id.entry(kind).or_insert(0);
        *next += 1;
        *next
    }

    fn associated_ids(&self, kind: Association, blog_id: i64) -> Vec<i64> {
        self.maps
            .get(&kind)
            .map(|rows| {
                rows.iter()
                    .filter(|(b, _)| *b == blog_id)
                    .map(|(_, id)| *id)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBlogStore {
    tables: Arc<AsyncMutex<Tables>>,
    faults: Arc<Mutex<HashSet<FailPoint>>>,
}

impl MemoryBlogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user so listings can show the creator's first name.
    pub async fn add_user(&self, id: i64, first_name: impl Into<String>) {
        self.tables.lock().await.users.insert(id, first_name.into());
    }

    /// Make the given operation fail until `clear_faults` is called.
    pub fn fail_at(&self, point: FailPoint) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(point);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }

    /// All tag or category rows, ascending by id.
    pub async fn terms(&self, kind: Association) -> Vec<Term> {
        self.tables
            .lock()
            .await
            .terms
            .get(&kind)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn post_count(&self) -> usize {
        self.tables.lock().await.posts.len()
    }

    /// Number of association rows of `kind` for the post.
    pub async fn association_count(&self, kind: Association, blog_id: i64) -> usize {
        self.tables.lock().await.associated_ids(kind, blog_id).len()
    }

    /// Insert an association row directly, bypassing the repository.
    pub async fn attach(&self, kind: Association, blog_id: i64, id: i64) {
        self.tables
            .lock()
            .await
            .maps
            .entry(kind)
            .or_default()
            .insert((blog_id, id));
    }
}

fn is_failing(faults: &Mutex<HashSet<FailPoint>>, point: FailPoint) -> bool {
    faults
        .lock()
        .map(|faults| faults.contains(&point))
        .unwrap_or(false)
}

#[async_trait]
impl BlogStore for MemoryBlogStore {
    async fn begin(&self) -> Result<Box<dyn BlogTransaction>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            staged,
            faults: self.faults.clone(),
        }))
    }

    async fn create_term(&self, kind: Association, term: &NewTerm) -> Result<i64, StoreError> {
        let mut tables = self.tables.lock().await;
        let id = tables.next_term_id(kind);
        tables.terms.entry(kind).or_default().insert(
            id,
            Term {
                id,
                name: term.name.clone(),
                status: term.status,
                created_by: term.created_by,
            },
        );
        Ok(id)
    }

    async fn find_post(&self, id: i64) -> Result<Option<BlogPost>, StoreError> {
        Ok(self.tables.lock().await.posts.get(&id).cloned())
    }

    async fn associated_ids(
        &self,
        kind: Association,
        blog_id: i64,
    ) -> Result<Vec<i64>, StoreError> {
        Ok(self.tables.lock().await.associated_ids(kind, blog_id))
    }

    async fn list_posts(&self) -> Result<Vec<BlogListRow>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<BlogListRow> = tables
            .posts
            .values()
            .map(|post| BlogListRow {
                id: post.id,
                name: post.name.clone(),
                publish_datetime: post.publish_datetime,
                status: post.status,
                created_by: post.created_by,
                created_at: post.created_at,
                user_name: tables.users.get(&post.created_by).cloned(),
            })
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    faults: Arc<Mutex<HashSet<FailPoint>>>,
}

#[async_trait]
impl BlogTransaction for MemoryTransaction {
    async fn insert_post(&mut self, post: &NewBlogPost) -> Result<BlogPost, StoreError> {
        if is_failing(&self.faults, FailPoint::InsertPost) {
            return Err(StoreError::Rejected("insert into blogs failed".to_string()));
        }

        self.staged.next_post_id += 1;
        let now = Utc::now();
        let saved = BlogPost {
            id: self.staged.next_post_id,
            name: post.name.clone(),
            slug: post.slug.clone(),
            content: post.content.clone(),
            publish_datetime: post.publish_datetime,
            featured_image: post.featured_image.clone(),
            meta_title: post.meta_title.clone(),
            meta_keywords: post.meta_keywords.clone(),
            meta_description: post.meta_description.clone(),
            canonical_link: post.canonical_link.clone(),
            status: post.status,
            created_by: post.created_by,
            updated_by: None,
            created_at: now,
            updated_at: now,
        };
        self.staged.posts.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn update_post(&mut self, post: &BlogPost) -> Result<Option<BlogPost>, StoreError> {
        if is_failing(&self.faults, FailPoint::UpdatePost) {
            return Ok(None);
        }

        let Some(stored) = self.staged.posts.get_mut(&post.id) else {
            return Ok(None);
        };
        *stored = BlogPost {
            created_by: stored.created_by,
            created_at: stored.created_at,
            updated_at: Utc::now(),
            ..post.clone()
        };
        Ok(Some(stored.clone()))
    }

    async fn delete_post(&mut self, id: i64) -> Result<bool, StoreError> {
        if is_failing(&self.faults, FailPoint::DeletePost) {
            return Ok(false);
        }
        Ok(self.staged.posts.remove(&id).is_some())
    }

    async fn sync(
        &mut self,
        kind: Association,
        blog_id: i64,
        ids: &[i64],
    ) -> Result<(), StoreError> {
        if is_failing(&self.faults, FailPoint::Sync(kind)) {
            return Err(StoreError::Rejected(format!(
                "sync of {} failed",
                kind.map_table()
            )));
        }

        let rows = self.staged.maps.entry(kind).or_default();
        rows.retain(|(b, _)| *b != blog_id);
        rows.extend(ids.iter().map(|id| (blog_id, *id)));
        Ok(())
    }

    async fn delete_associations(
        &mut self,
        kind: Association,
        blog_id: i64,
    ) -> Result<u64, StoreError> {
        let rows = self.staged.maps.entry(kind).or_default();
        let before = rows.len();
        rows.retain(|(b, _)| *b != blog_id);
        Ok((before - rows.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{BlogStatus, STATUS_ACTIVE};

    fn new_post(name: &str) -> NewBlogPost {
        NewBlogPost {
            name: name.to_string(),
            slug: name.to_lowercase(),
            content: String::new(),
            publish_datetime: Utc::now(),
            featured_image: None,
            meta_title: None,
            meta_keywords: None,
            meta_description: None,
            canonical_link: None,
            status: BlogStatus::Draft,
            created_by: 1,
        }
    }

    #[tokio::test]
    async fn test_commit_makes_writes_visible() {
        let store = MemoryBlogStore::new();
        let mut tx = store.begin().await.unwrap();
        let post = tx.insert_post(&new_post("First")).await.unwrap();
        tx.sync(Association::Tag, post.id, &[3, 1]).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.find_post(post.id).await.unwrap().is_some());
        assert_eq!(
            store.associated_ids(Association::Tag, post.id).await.unwrap(),
            vec![1, 3]
        );
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryBlogStore::new();
        let mut tx = store.begin().await.unwrap();
        let post = tx.insert_post(&new_post("Draft")).await.unwrap();
        tx.sync(Association::Category, post.id, &[7]).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.post_count().await, 0);
        assert_eq!(store.association_count(Association::Category, post.id).await, 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let store = MemoryBlogStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_post(&new_post("Lost")).await.unwrap();
        }
        assert_eq!(store.post_count().await, 0);
    }

    #[tokio::test]
    async fn test_sync_replaces_full_set_and_collapses_duplicates() {
        let store = MemoryBlogStore::new();
        store.attach(Association::Tag, 1, 9).await;
        store.attach(Association::Tag, 2, 9).await;

        let mut tx = store.begin().await.unwrap();
        tx.sync(Association::Tag, 1, &[4, 4, 5]).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.associated_ids(Association::Tag, 1).await.unwrap(), vec![4, 5]);
        assert_eq!(store.associated_ids(Association::Tag, 2).await.unwrap(), vec![9]);
    }

    #[tokio::test]
    async fn test_term_ids_are_assigned_per_table() {
        let store = MemoryBlogStore::new();
        let term = NewTerm {
            name: "rust".to_string(),
            status: STATUS_ACTIVE,
            created_by: 4,
        };
        assert_eq!(store.create_term(Association::Tag, &term).await.unwrap(), 1);
        assert_eq!(store.create_term(Association::Tag, &term).await.unwrap(), 2);
        assert_eq!(store.create_term(Association::Category, &term).await.unwrap(), 1);
        assert_eq!(store.terms(Association::Tag).await.len(), 2);
    }

    #[tokio::test]
    async fn test_fail_points() {
        let store = MemoryBlogStore::new();
        store.fail_at(FailPoint::InsertPost);
        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.insert_post(&new_post("Nope")).await,
            Err(StoreError::Rejected(_))
        ));
        tx.rollback().await.unwrap();

        store.clear_faults();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_post(&new_post("Yes")).await.is_ok());
        tx.commit().await.unwrap();
    }
}
