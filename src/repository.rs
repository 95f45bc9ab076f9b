/**
 * Blogs Repository
 * Creates, updates, lists and deletes blog posts together with their
 * tags, categories and featured image.
 */
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::db::models::{BlogListRow, BlogPost, BlogStatus, NewBlogPost, NewTerm, STATUS_ACTIVE};
use crate::db::{Association, BlogStore, BlogTransaction};
use crate::error::{BlogError, BlogResult, CREATE_ERROR, DELETE_ERROR, UPDATE_ERROR};
use crate::events::{BlogEvent, BlogEvents};
use crate::slug::slugify;
use crate::uploads::{FileUploads, UploadedFile};

/// Logical directory featured images are stored under
pub const BLOG_IMAGE_PATH: &str = "backend/blog_images";

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

// ============================================================================
// Input Types
// ============================================================================

/// The authenticated user performing a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingUser {
    pub id: i64,
}

impl ActingUser {
    pub fn new(id: i64) -> Self {
        Self { id }
    }
}

/// Admin form submission for a blog post
#[derive(Debug, Clone, Default)]
pub struct BlogInput {
    pub name: String,
    pub content: String,
    /// Free-form date/time; blank means now
    pub publish_datetime: String,
    pub featured_image: Option<UploadedFile>,
    pub meta_title: Option<String>,
    pub meta_keywords: Option<String>,
    pub meta_description: Option<String>,
    pub canonical_link: Option<String>,
    pub status: BlogStatus,
    /// Existing tag ids or names of tags to create
    pub tags: Vec<String>,
    /// Existing category ids or names of categories to create
    pub categories: Vec<String>,
}

impl BlogInput {
    /// The uploaded image, unless the field was sent without content.
    fn image(&self) -> Option<&UploadedFile> {
        self.featured_image.as_ref().filter(|file| !file.is_empty())
    }
}

/// A tag or category value from the form, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Existing(i64),
    New(String),
}

/// Classify free-form values: integers refer to existing rows, anything
/// else names a row still to be created. Order and duplicates are kept.
pub fn resolve_associations<T: AsRef<str>>(values: &[T]) -> Vec<Resolved> {
    values
        .iter()
        .map(|value| {
            let value = value.as_ref();
            match value.trim().parse::<i64>() {
                Ok(id) => Resolved::Existing(id),
                Err(_) => Resolved::New(value.to_string()),
            }
        })
        .collect()
}

// ============================================================================
// Field Normalisation
// ============================================================================

fn parse_publish_datetime(value: &str) -> BlogResult<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Utc::now());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| BlogError::InvalidInput(format!("unrecognised publish date `{}`", value)))
}

/// Read the status field of the admin form. Blank means the default draft.
pub fn parse_status(value: &str) -> BlogResult<BlogStatus> {
    if value.trim().is_empty() {
        return Ok(BlogStatus::default());
    }
    value.parse().map_err(BlogError::InvalidInput)
}

fn validate_name(name: &str) -> BlogResult<()> {
    if name.trim().is_empty() {
        return Err(BlogError::InvalidInput("name is required".to_string()));
    }
    Ok(())
}

/// Sanitize HTML content using ammonia
fn sanitize_html(html: &str) -> String {
    ammonia::clean(html)
}

// ============================================================================
// Repository
// ============================================================================

pub struct BlogsRepository<S, U> {
    store: S,
    uploads: U,
    events: BlogEvents,
}

impl<S: BlogStore, U: FileUploads> BlogsRepository<S, U> {
    pub fn new(store: S, uploads: U, events: BlogEvents) -> Self {
        Self {
            store,
            uploads,
            events,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn uploads(&self) -> &U {
        &self.uploads
    }

    pub fn events(&self) -> &BlogEvents {
        &self.events
    }

    /// Rows for the admin blog table, newest first.
    pub async fn list_for_table(&self) -> BlogResult<Vec<BlogListRow>> {
        Ok(self.store.list_posts().await?)
    }

    pub async fn find(&self, id: i64) -> BlogResult<Option<BlogPost>> {
        Ok(self.store.find_post(id).await?)
    }

    pub async fn category_ids(&self, blog_id: i64) -> BlogResult<Vec<i64>> {
        Ok(self.store.associated_ids(Association::Category, blog_id).await?)
    }

    pub async fn tag_ids(&self, blog_id: i64) -> BlogResult<Vec<i64>> {
        Ok(self.store.associated_ids(Association::Tag, blog_id).await?)
    }

    /// Turn form values into ids, creating a tag/category for every name.
    pub async fn create_or_resolve_associations<T: AsRef<str>>(
        &self,
        values: &[T],
        kind: Association,
        user: ActingUser,
    ) -> BlogResult<Vec<i64>> {
        self.commit_resolved(resolve_associations(values), kind, user).await
    }

    async fn commit_resolved(
        &self,
        resolved: Vec<Resolved>,
        kind: Association,
        user: ActingUser,
    ) -> BlogResult<Vec<i64>> {
        let mut ids = Vec::with_capacity(resolved.len());
        for value in resolved {
            match value {
                Resolved::Existing(id) => ids.push(id),
                Resolved::New(name) => {
                    let term = NewTerm {
                        name,
                        status: STATUS_ACTIVE,
                        created_by: user.id,
                    };
                    let id = self.store.create_term(kind, &term).await?;
                    tracing::info!(
                        kind = %kind,
                        id,
                        name = %term.name,
                        user_id = user.id,
                        "created {}",
                        kind
                    );
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// Store a featured image. `None` when the input carries no content.
    pub async fn upload_image(&self, file: &UploadedFile) -> BlogResult<Option<String>> {
        if file.is_empty() {
            return Ok(None);
        }
        let stored = self.uploads.upload(file, BLOG_IMAGE_PATH).await?;
        Ok(Some(stored))
    }

    /// Remove the post's current featured image from storage.
    pub async fn delete_old_file(&self, blog: &BlogPost) -> BlogResult<bool> {
        let Some(file_name) = blog.featured_image.as_deref() else {
            return Ok(false);
        };
        let path = self.uploads.directory(BLOG_IMAGE_PATH).join(file_name);
        Ok(self.uploads.delete(&path).await?)
    }

    pub async fn create(&self, input: BlogInput, user: ActingUser) -> BlogResult<BlogPost> {
        validate_name(&input.name)?;
        let publish_datetime = parse_publish_datetime(&input.publish_datetime)?;

        let tag_ids = self
            .create_or_resolve_associations(input.tags.as_slice(), Association::Tag, user)
            .await?;
        let category_ids = self
            .create_or_resolve_associations(
                input.categories.as_slice(),
                Association::Category,
                user,
            )
            .await?;

        let mut tx = self.store.begin().await?;
        let result = self
            .insert_with_associations(
                tx.as_mut(),
                &input,
                publish_datetime,
                user,
                &category_ids,
                &tag_ids,
            )
            .await;

        let blog = match result {
            Ok(blog) => blog,
            Err(e) => {
                rollback(tx).await;
                return Err(e);
            }
        };
        tx.commit().await?;

        tracing::info!(
            blog_id = blog.id,
            slug = %blog.slug,
            user_id = user.id,
            tags = tag_ids.len(),
            categories = category_ids.len(),
            "blog created"
        );
        self.events.publish(BlogEvent::Created(blog.clone()));

        Ok(blog)
    }

    async fn insert_with_associations(
        &self,
        tx: &mut dyn BlogTransaction,
        input: &BlogInput,
        publish_datetime: DateTime<Utc>,
        user: ActingUser,
        category_ids: &[i64],
        tag_ids: &[i64],
    ) -> BlogResult<BlogPost> {
        let featured_image = match input.image() {
            Some(file) => self.upload_image(file).await?,
            None => None,
        };

        let new_blog = NewBlogPost {
            name: input.name.clone(),
            slug: slugify(&input.name),
            content: sanitize_html(&input.content),
            publish_datetime,
            featured_image,
            meta_title: input.meta_title.clone(),
            meta_keywords: input.meta_keywords.clone(),
            meta_description: input.meta_description.clone(),
            canonical_link: input.canonical_link.clone(),
            status: input.status,
            created_by: user.id,
        };

        let blog = tx.insert_post(&new_blog).await.map_err(|e| {
            tracing::error!(slug = %new_blog.slug, error = %e, "failed to insert blog");
            BlogError::CreationFailed(CREATE_ERROR.to_string())
        })?;

        sync_associations(tx, blog.id, category_ids, tag_ids).await?;

        Ok(blog)
    }

    pub async fn update(
        &self,
        mut blog: BlogPost,
        input: BlogInput,
        user: ActingUser,
    ) -> BlogResult<BlogPost> {
        validate_name(&input.name)?;
        let publish_datetime = parse_publish_datetime(&input.publish_datetime)?;

        let tag_ids = self
            .create_or_resolve_associations(input.tags.as_slice(), Association::Tag, user)
            .await?;
        let category_ids = self
            .create_or_resolve_associations(
                input.categories.as_slice(),
                Association::Category,
                user,
            )
            .await?;

        blog.name = input.name.clone();
        blog.slug = slugify(&input.name);
        blog.content = sanitize_html(&input.content);
        blog.publish_datetime = publish_datetime;
        blog.meta_title = input.meta_title.clone();
        blog.meta_keywords = input.meta_keywords.clone();
        blog.meta_description = input.meta_description.clone();
        blog.canonical_link = input.canonical_link.clone();
        blog.status = input.status;
        blog.updated_by = Some(user.id);

        if let Some(file) = input.image() {
            // A rejected image must not cost the post its current one.
            self.uploads.validate(file)?;
            self.delete_old_file(&blog).await?;
            blog.featured_image = self.upload_image(file).await?;
        }

        let mut tx = self.store.begin().await?;
        let result = async {
            let saved = tx.update_post(&blog).await?.ok_or_else(|| {
                tracing::error!(blog_id = blog.id, "blog update affected no rows");
                BlogError::UpdateFailed(UPDATE_ERROR.to_string())
            })?;
            sync_associations(tx.as_mut(), saved.id, &category_ids, &tag_ids).await?;
            Ok::<_, BlogError>(saved)
        }
        .await;

        let saved = match result {
            Ok(saved) => saved,
            Err(e) => {
                rollback(tx).await;
                return Err(e);
            }
        };
        tx.commit().await?;

        tracing::info!(blog_id = saved.id, slug = %saved.slug, user_id = user.id, "blog updated");
        self.events.publish(BlogEvent::Updated(saved.clone()));

        Ok(saved)
    }

    pub async fn delete(&self, blog: BlogPost) -> BlogResult<()> {
        let mut tx = self.store.begin().await?;
        let result = async {
            if !tx.delete_post(blog.id).await? {
                tracing::error!(blog_id = blog.id, "blog delete affected no rows");
                return Err(BlogError::DeletionFailed(DELETE_ERROR.to_string()));
            }
            let categories = tx
                .delete_associations(Association::Category, blog.id)
                .await?;
            let tags = tx.delete_associations(Association::Tag, blog.id).await?;
            Ok::<_, BlogError>((categories, tags))
        }
        .await;

        let (categories, tags) = match result {
            Ok(counts) => counts,
            Err(e) => {
                rollback(tx).await;
                return Err(e);
            }
        };
        tx.commit().await?;

        tracing::info!(blog_id = blog.id, categories, tags, "blog deleted");
        self.events.publish(BlogEvent::Deleted(blog));

        Ok(())
    }
}

/// Replace category and tag sets. An empty list leaves that relation as is.
async fn sync_associations(
    tx: &mut dyn BlogTransaction,
    blog_id: i64,
    category_ids: &[i64],
    tag_ids: &[i64],
) -> BlogResult<()> {
    if !category_ids.is_empty() {
        tx.sync(Association::Category, blog_id, category_ids).await?;
    }
    if !tag_ids.is_empty() {
        tx.sync(Association::Tag, blog_id, tag_ids).await?;
    }
    Ok(())
}

async fn rollback(tx: Box<dyn BlogTransaction>) {
    if let Err(e) = tx.rollback().await {
        tracing::error!(error = %e, "transaction rollback failed");
    }
}
