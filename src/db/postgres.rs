/**
 * PostgreSQL Blog Store
 * sqlx-backed implementation of the blog store traits.
 *
 * Expects the tables `blogs`, `blog_tags`, `blog_categories`,
 * `blog_map_tags (blog_id, tag_id)`, `blog_map_categories (blog_id, category_id)`
 * and `users (id, first_name)`.
 */
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::models::{BlogListRow, BlogPost, NewBlogPost, NewTerm};
use super::{Association, BlogStore, BlogTransaction, StoreError};

const POST_COLUMNS: &str = "id, name, slug, content, publish_datetime, featured_image, \
     meta_title, meta_keywords, meta_description, canonical_link, status, \
     created_by, updated_by, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgBlogStore {
    pool: PgPool,
}

impl PgBlogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BlogStore for PgBlogStore {
    async fn begin(&self) -> Result<Box<dyn BlogTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgBlogTransaction { tx }))
    }

    async fn create_term(&self, kind: Association, term: &NewTerm) -> Result<i64, StoreError> {
        let sql = format!(
            "INSERT INTO {} (name, status, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, now(), now()) RETURNING id",
            kind.term_table()
        );
        let (id,): (i64,) = sqlx::query_as(&sql)
            .bind(&term.name)
            .bind(term.status)
            .bind(term.created_by)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn find_post(&self, id: i64) -> Result<Option<BlogPost>, StoreError> {
        let sql = format!("SELECT {} FROM blogs WHERE id = $1", POST_COLUMNS);
        let post = sqlx::query_as::<_, BlogPost>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn associated_ids(
        &self,
        kind: Association,
        blog_id: i64,
    ) -> Result<Vec<i64>, StoreError> {
        let sql = format!(
            "SELECT {col} FROM {table} WHERE blog_id = $1 ORDER BY {col}",
            col = kind.map_column(),
            table = kind.map_table()
        );
        let rows: Vec<(i64,)> = sqlx::query_as(&sql)
            .bind(blog_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn list_posts(&self) -> Result<Vec<BlogListRow>, StoreError> {
        let rows = sqlx::query_as::<_, BlogListRow>(
            r#"
            SELECT blogs.id, blogs.name, blogs.publish_datetime, blogs.status,
                   blogs.created_by, blogs.created_at, users.first_name AS user_name
            FROM blogs
            LEFT JOIN users ON users.id = blogs.created_by
            ORDER BY blogs.created_at DESC, blogs.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

pub struct PgBlogTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BlogTransaction for PgBlogTransaction {
    async fn insert_post(&mut self, post: &NewBlogPost) -> Result<BlogPost, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO blogs (name, slug, content, publish_datetime, featured_image,
                               meta_title, meta_keywords, meta_description, canonical_link,
                               status, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now(), now())
            RETURNING {}
            "#,
            POST_COLUMNS
        );
        let saved = sqlx::query_as::<_, BlogPost>(&sql)
            .bind(&post.name)
            .bind(&post.slug)
            .bind(&post.content)
            .bind(post.publish_datetime)
            .bind(&post.featured_image)
            .bind(&post.meta_title)
            .bind(&post.meta_keywords)
            .bind(&post.meta_description)
            .bind(&post.canonical_link)
            .bind(post.status)
            .bind(post.created_by)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(saved)
    }

    async fn update_post(&mut self, post: &BlogPost) -> Result<Option<BlogPost>, StoreError> {
        let sql = format!(
            r#"
            UPDATE blogs
            SET name = $1, slug = $2, content = $3, publish_datetime = $4, featured_image = $5,
                meta_title = $6, meta_keywords = $7, meta_description = $8, canonical_link = $9,
                status = $10, updated_by = $11, updated_at = now()
            WHERE id = $12
            RETURNING {}
            "#,
            POST_COLUMNS
        );
        let saved = sqlx::query_as::<_, BlogPost>(&sql)
            .bind(&post.name)
            .bind(&post.slug)
            .bind(&post.content)
            .bind(post.publish_datetime)
            .bind(&post.featured_image)
            .bind(&post.meta_title)
            .bind(&post.meta_keywords)
            .bind(&post.meta_description)
            .bind(&post.canonical_link)
            .bind(post.status)
            .bind(post.updated_by)
            .bind(post.id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(saved)
    }

    async fn delete_post(&mut self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM blogs WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn sync(
        &mut self,
        kind: Association,
        blog_id: i64,
        ids: &[i64],
    ) -> Result<(), StoreError> {
        let detach = format!(
            "DELETE FROM {table} WHERE blog_id = $1 AND NOT ({col} = ANY($2))",
            table = kind.map_table(),
            col = kind.map_column()
        );
        sqlx::query(&detach)
            .bind(blog_id)
            .bind(ids)
            .execute(&mut *self.tx)
            .await?;

        let attach = format!(
            r#"
            INSERT INTO {table} (blog_id, {col})
            SELECT DISTINCT $1::BIGINT, wanted.id
            FROM unnest($2::BIGINT[]) AS wanted(id)
            WHERE NOT EXISTS (
                SELECT 1 FROM {table} existing
                WHERE existing.blog_id = $1 AND existing.{col} = wanted.id
            )
            "#,
            table = kind.map_table(),
            col = kind.map_column()
        );
        sqlx::query(&attach)
            .bind(blog_id)
            .bind(ids)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn delete_associations(
        &mut self,
        kind: Association,
        blog_id: i64,
    ) -> Result<u64, StoreError> {
        let sql = format!("DELETE FROM {} WHERE blog_id = $1", kind.map_table());
        let result = sqlx::query(&sql)
            .bind(blog_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
