//! Content store: posts, comments, categories and the notifications they
//! raise. Reaction counters on posts and comments belong to the reaction
//! ledger and are only ever read here.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Deserialize;

use crate::db::models::{from_millis, to_millis, Category, Comment, Notification, Post};
use crate::db::StorageError;
use crate::state::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("not found")]
    NotFound,

    #[error("not allowed to modify this item")]
    Forbidden,

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<rusqlite::Error> for ContentError {
    fn from(e: rusqlite::Error) -> Self {
        ContentError::Storage(e.into())
    }
}

impl From<r2d2::Error> for ContentError {
    fn from(e: r2d2::Error) -> Self {
        ContentError::Storage(e.into())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub image_path: Option<String>,
    pub categories: Vec<String>,
}

/// Narrow a post listing. Filters combine with AND.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostFilter {
    pub category: Option<String>,
    pub author: Option<String>,
    pub liked_by: Option<String>,
}

const POST_SELECT: &str = "SELECT p.id, p.user_id, u.username, u.profile_pic, p.title, p.content,
            p.image_path, p.created_at, p.likes, p.dislikes, p.comments
     FROM posts p
     JOIN users u ON u.id = p.user_id";

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        profile_pic: row.get(3)?,
        title: row.get(4)?,
        content: row.get(5)?,
        image_path: row.get(6)?,
        created_at: from_millis(row.get(7)?),
        likes: row.get(8)?,
        dislikes: row.get(9)?,
        comments: row.get(10)?,
        categories: Vec::new(),
    })
}

fn categories_of(conn: &Connection, post_id: i64) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT c.name FROM post_categories pc
         JOIN categories c ON c.id = pc.category_id
         WHERE pc.post_id = ?1
         ORDER BY c.name",
    )?;
    let names = stmt
        .query_map(params![post_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

fn non_blank(value: &str, what: &str) -> Result<String, ContentError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ContentError::Invalid(format!("{} cannot be empty", what)));
    }
    Ok(trimmed.to_string())
}

#[derive(Clone)]
pub struct ContentStore {
    pool: DbPool,
}

impl ContentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a post and link it to its categories. Every category must
    /// already exist; nothing is written if one doesn't.
    pub fn create_post(&self, author_id: &str, new_post: &NewPost) -> Result<i64, ContentError> {
        let title = non_blank(&new_post.title, "Title")?;
        let content = non_blank(&new_post.content, "Content")?;

        let mut categories: Vec<&str> = new_post
            .categories
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();
        categories.sort_unstable();
        categories.dedup();
        if categories.is_empty() {
            return Err(ContentError::Invalid(
                "Title, content, and at least one category are required".into(),
            ));
        }

        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO posts (user_id, title, content, image_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                author_id,
                title,
                content,
                new_post.image_path,
                to_millis(Utc::now())
            ],
        )?;
        let post_id = tx.last_insert_rowid();

        for name in categories {
            let category_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM categories WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(category_id) = category_id else {
                return Err(ContentError::Invalid(format!("Unknown category: {}", name)));
            };
            tx.execute(
                "INSERT INTO post_categories (post_id, category_id) VALUES (?1, ?2)",
                params![post_id, category_id],
            )?;
        }

        tx.commit()?;
        tracing::info!(post_id, author_id, "Created post");
        Ok(post_id)
    }

    pub fn get_post(&self, id: i64) -> Result<Post, ContentError> {
        let conn = self.pool.get()?;
        let post = conn
            .query_row(
                &format!("{} WHERE p.id = ?1", POST_SELECT),
                params![id],
                post_from_row,
            )
            .optional()?;
        let mut post = post.ok_or(ContentError::NotFound)?;
        post.categories = categories_of(&conn, post.id)?;
        Ok(post)
    }

    /// Posts matching the filter, newest first.
    pub fn list_posts(&self, filter: &PostFilter) -> Result<Vec<Post>, ContentError> {
        let mut clauses = Vec::new();
        let mut values: Vec<&str> = Vec::new();

        if let Some(category) = filter.category.as_deref() {
            values.push(category);
            clauses.push(format!(
                "p.id IN (SELECT pc.post_id FROM post_categories pc
                          JOIN categories c ON c.id = pc.category_id
                          WHERE c.name = ?{})",
                values.len()
            ));
        }
        if let Some(author) = filter.author.as_deref() {
            values.push(author);
            clauses.push(format!("p.user_id = ?{}", values.len()));
        }
        if let Some(liker) = filter.liked_by.as_deref() {
            values.push(liker);
            clauses.push(format!(
                "p.id IN (SELECT post_id FROM reaction WHERE user_id = ?{} AND \"like\" = 1)",
                values.len()
            ));
        }

        let mut sql = POST_SELECT.to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY p.created_at DESC, p.id DESC");

        let conn = self.pool.get()?;
        let mut posts = {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), post_from_row)?;
            rows.collect::<Result<Vec<Post>, _>>()?
        };
        for post in &mut posts {
            post.categories = categories_of(&conn, post.id)?;
        }
        Ok(posts)
    }

    /// Add a comment and bump the post's comment counter in one transaction.
    pub fn add_comment(
        &self,
        author_id: &str,
        post_id: i64,
        content: &str,
    ) -> Result<i64, ContentError> {
        let content = non_blank(content, "Comment")?;

        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let post_author: Option<String> = tx
            .query_row(
                "SELECT user_id FROM posts WHERE id = ?1",
                params![post_id],
                |row| row.get(0),
            )
            .optional()?;
        let post_author = post_author.ok_or(ContentError::NotFound)?;

        let now = to_millis(Utc::now());
        tx.execute(
            "INSERT INTO comments (post_id, user_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![post_id, author_id, content, now],
        )?;
        let comment_id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE posts SET comments = comments + 1 WHERE id = ?1",
            params![post_id],
        )?;

        if post_author != author_id {
            tx.execute(
                "INSERT INTO notifications (user_id, actor_id, post_id, kind, created_at)
                 VALUES (?1, ?2, ?3, 'comment', ?4)",
                params![post_author, author_id, post_id, now],
            )?;
        }

        tx.commit()?;
        Ok(comment_id)
    }

    pub fn edit_comment(
        &self,
        user_id: &str,
        comment_id: i64,
        content: &str,
    ) -> Result<(), ContentError> {
        let content = non_blank(content, "Comment")?;
        let conn = self.pool.get()?;
        ensure_comment_owner(&conn, user_id, comment_id)?;
        conn.execute(
            "UPDATE comments SET content = ?1 WHERE id = ?2",
            params![content, comment_id],
        )?;
        Ok(())
    }

    /// Delete a comment (its reactions cascade) and recount the post's
    /// comments. Returns the post the comment belonged to.
    pub fn delete_comment(&self, user_id: &str, comment_id: i64) -> Result<i64, ContentError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let post_id = ensure_comment_owner(&tx, user_id, comment_id)?;
        tx.execute("DELETE FROM comments WHERE id = ?1", params![comment_id])?;
        tx.execute(
            "UPDATE posts SET comments = (SELECT COUNT(*) FROM comments WHERE post_id = ?1)
             WHERE id = ?1",
            params![post_id],
        )?;

        tx.commit()?;
        Ok(post_id)
    }

    /// Comments on a post, newest first.
    pub fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>, ContentError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.post_id, c.user_id, u.username, u.profile_pic, c.content,
                    c.created_at, c.likes, c.dislikes
             FROM comments c
             JOIN users u ON u.id = c.user_id
             WHERE c.post_id = ?1
             ORDER BY c.created_at DESC, c.id DESC",
        )?;
        let comments = stmt
            .query_map(params![post_id], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    post_id: row.get(1)?,
                    user_id: row.get(2)?,
                    username: row.get(3)?,
                    profile_pic: row.get(4)?,
                    content: row.get(5)?,
                    created_at: from_millis(row.get(6)?),
                    likes: row.get(7)?,
                    dislikes: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    pub fn list_categories(&self) -> Result<Vec<Category>, ContentError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY name")?;
        let categories = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    pub fn create_category(&self, name: &str) -> Result<Category, ContentError> {
        let name = non_blank(name, "Category name")?;
        let conn = self.pool.get()?;
        match conn.execute("INSERT INTO categories (name) VALUES (?1)", params![name]) {
            Ok(_) => Ok(Category {
                id: conn.last_insert_rowid(),
                name,
            }),
            Err(e) => {
                let err = StorageError::from(e);
                if err.is_unique_violation() {
                    Err(ContentError::Invalid(format!(
                        "Category already exists: {}",
                        name
                    )))
                } else {
                    Err(err.into())
                }
            }
        }
    }

    /// Activity on the user's posts, newest first.
    pub fn notifications_for(&self, user_id: &str) -> Result<Vec<Notification>, ContentError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT n.id, n.kind, n.post_id, u.username, u.profile_pic, n.created_at
             FROM notifications n
             JOIN users u ON u.id = n.actor_id
             WHERE n.user_id = ?1
             ORDER BY n.created_at DESC, n.id DESC",
        )?;
        let notifications = stmt
            .query_map(params![user_id], |row| {
                Ok(Notification {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    post_id: row.get(2)?,
                    actor_name: row.get(3)?,
                    actor_profile_pic: row.get(4)?,
                    created_at: from_millis(row.get(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }
}

/// Returns the comment's post id if `user_id` wrote it.
fn ensure_comment_owner(
    conn: &Connection,
    user_id: &str,
    comment_id: i64,
) -> Result<i64, ContentError> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT user_id, post_id FROM comments WHERE id = ?1",
            params![comment_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        None => Err(ContentError::NotFound),
        Some((owner, _)) if owner != user_id => Err(ContentError::Forbidden),
        Some((_, post_id)) => Ok(post_id),
    }
}

/// Human-readable age of a timestamp relative to `now`.
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now - then;

    if diff < Duration::minutes(1) {
        "just now".to_string()
    } else if diff < Duration::hours(1) {
        plural(diff.num_minutes(), "minute")
    } else if diff < Duration::hours(24) {
        plural(diff.num_hours(), "hour")
    } else if diff < Duration::hours(48) {
        "yesterday".to_string()
    } else if diff < Duration::days(7) {
        plural(diff.num_days(), "day")
    } else if diff < Duration::days(30) {
        plural(diff.num_weeks(), "week")
    } else {
        then.format("%b %-d, %Y").to_string()
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}
