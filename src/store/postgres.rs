use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{
        category::Category,
        comment::{Comment, CommentRow, NewComment},
        image::Image,
        moderation::{ModerationLog, ModerationLogRow, NewModerationLog},
        post::{NewPost, Post, PostRow, PostStatus},
        user::{Role, User, UserRow},
        vote::{VoteTarget, VoteToggle, VoteType},
    },
    store::{ForumStore, PostFilter},
};

const POST_COLUMNS: &str = r#"
    p.id, p.title, p.content, p.category_id, p.user_id, u.username,
    p.status, p.is_solved, p.is_pinned, p.is_locked,
    p.views_count, p.likes_count, p.dislikes_count, p.created_at
"#;

const COMMENT_COLUMNS: &str = r#"
    c.id, c.post_id, c.parent_id, c.user_id, u.username,
    u.role AS user_role, u.is_banned AS user_banned, u.avatar_filename,
    c.content, c.is_solution, c.likes_count, c.dislikes_count, c.created_at
"#;

const IMAGE_COLUMNS: &str = r#"
    i.id, i.filename, i.original_name, i.content_type, i.size_bytes,
    i.width, i.height, i.post_id, i.comment_id, i.user_id, i.created_at
"#;

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Table names for the two kinds of vote target.
fn vote_tables(target: VoteTarget) -> (&'static str, &'static str, &'static str) {
    match target {
        VoteTarget::Post => ("post_votes", "post_id", "posts"),
        VoteTarget::Comment => ("comment_votes", "comment_id", "comments"),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

/// A foreign-key violation on the named constraint.
fn is_foreign_key_violation(err: &sqlx::Error, constraint: &str) -> bool {
    err.as_database_error().is_some_and(|db| {
        db.code().is_some_and(|code| code == "23503") && db.constraint() == Some(constraint)
    })
}

#[async_trait]
impl ForumStore for PgStore {
    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, role, is_banned, ban_reason, avatar_filename, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn set_user_ban(&self, id: i64, banned: bool, reason: Option<&str>) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_banned = $2,
                ban_reason = CASE WHEN $2 THEN $3 ELSE NULL END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(banned)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    async fn set_user_role(&self, id: i64, role: Role) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET role = $2 WHERE id = $1")
            .bind(id)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, AppError> {
        let categories = sqlx::query_as::<_, Category>(
            r#"
            SELECT c.id, c.name, c.description, c.created_at,
                   COUNT(p.id) AS post_count
            FROM categories c
            LEFT JOIN posts p ON p.category_id = c.id AND p.status <> 'archived'
            GROUP BY c.id
            ORDER BY c.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    async fn find_post(&self, id: i64) -> Result<Option<Post>, AppError> {
        let sql = format!(
            "SELECT {} FROM posts p JOIN users u ON p.user_id = u.id WHERE p.id = $1",
            POST_COLUMNS
        );
        sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Post::try_from)
            .transpose()
    }

    async fn list_posts(&self, filter: PostFilter) -> Result<Vec<Post>, AppError> {
        let viewer_id = filter.viewer.map(|v| v.id);
        let sees_archived = filter.viewer.is_some_and(|v| v.is_moderator());

        let sql = format!(
            r#"
            SELECT {}
            FROM posts p
            JOIN users u ON p.user_id = u.id
            WHERE ($1::BIGINT IS NULL OR p.category_id = $1)
              AND (p.status <> 'archived' OR $3 OR p.user_id = $2)
            ORDER BY p.is_pinned DESC, p.created_at DESC, p.id DESC
            LIMIT $4
            "#,
            POST_COLUMNS
        );

        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(filter.category_id)
            .bind(viewer_id)
            .bind(sees_archived)
            .bind(filter.limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list posts: {:?}", e);
                AppError::InternalServerError(e.to_string())
            })?;

        rows.into_iter().map(Post::try_from).collect()
    }

    async fn create_post(&self, post: NewPost) -> Result<i64, AppError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO posts (user_id, category_id, title, content)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(post.user_id)
        .bind(post.category_id)
        .bind(&post.title)
        .bind(&post.content)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e, "posts_category_id_fkey") {
                return AppError::BadRequest("Unknown category".to_string());
            }
            tracing::error!("Failed to create post: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(id)
    }

    async fn delete_post(&self, id: i64) -> Result<(), AppError> {
        // Comments, votes and images go with the post (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Post not found".to_string()));
        }
        Ok(())
    }

    async fn increment_post_views(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE posts SET views_count = views_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_post_status(&self, id: i64, status: PostStatus) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE posts SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Post not found".to_string()));
        }
        Ok(())
    }

    async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>, AppError> {
        let sql = format!(
            "SELECT {} FROM comments c JOIN users u ON c.user_id = u.id WHERE c.post_id = $1",
            COMMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Comment::try_from).collect()
    }

    async fn find_comment(&self, id: i64) -> Result<Option<Comment>, AppError> {
        let sql = format!(
            "SELECT {} FROM comments c JOIN users u ON c.user_id = u.id WHERE c.id = $1",
            COMMENT_COLUMNS
        );
        sqlx::query_as::<_, CommentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Comment::try_from)
            .transpose()
    }

    async fn create_comment(&self, comment: NewComment) -> Result<i64, AppError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO comments (post_id, user_id, parent_id, content)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(comment.post_id)
        .bind(comment.user_id)
        .bind(comment.parent_id)
        .bind(&comment.content)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create comment: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(id)
    }

    async fn delete_comment(&self, id: i64) -> Result<(), AppError> {
        // Replies cascade through comments.parent_id.
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Comment not found".to_string()));
        }
        Ok(())
    }

    async fn mark_solution(&self, post_id: i64, comment_id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the post serializes concurrent markings.
        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(AppError::NotFound("Post not found".to_string()));
        }

        let already_solved: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM comments WHERE post_id = $1 AND is_solution)",
        )
        .bind(post_id)
        .fetch_one(&mut *tx)
        .await?;
        if already_solved {
            return Err(AppError::Conflict("This post already has a solution".to_string()));
        }

        let flagged = sqlx::query(
            "UPDATE comments SET is_solution = TRUE WHERE id = $1 AND post_id = $2",
        )
        .bind(comment_id)
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            // one_solution_per_post caught a concurrent marking
            if is_unique_violation(&e) {
                return AppError::Conflict("This post already has a solution".to_string());
            }
            AppError::from(e)
        })?;
        if flagged.rows_affected() == 0 {
            return Err(AppError::NotFound("Comment not found".to_string()));
        }

        let solved = sqlx::query("UPDATE posts SET is_solved = TRUE WHERE id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await;

        match solved {
            Ok(result) if result.rows_affected() == 1 => {}
            outcome => {
                let cause = match outcome {
                    Ok(_) => "post row vanished".to_string(),
                    Err(e) => e.to_string(),
                };
                tracing::error!(
                    "Failed to flag post {} as solved after comment {}: {}",
                    post_id,
                    comment_id,
                    cause
                );
                return match tx.rollback().await {
                    Ok(()) => Err(AppError::InternalServerError(format!(
                        "Solution marking rolled back: {}",
                        cause
                    ))),
                    Err(rollback) => Err(AppError::InconsistentState(format!(
                        "comment {} flagged but post {} not solved: {}; rollback failed: {}",
                        comment_id, post_id, cause, rollback
                    ))),
                };
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn comment_images(&self, post_id: i64) -> Result<HashMap<i64, Vec<Image>>, AppError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM images i
            JOIN comments c ON i.comment_id = c.id
            WHERE c.post_id = $1
            ORDER BY i.created_at ASC, i.id ASC
            "#,
            IMAGE_COLUMNS
        );
        let images = sqlx::query_as::<_, Image>(&sql)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;

        let mut by_comment: HashMap<i64, Vec<Image>> = HashMap::new();
        for image in images {
            if let Some(comment_id) = image.comment_id {
                by_comment.entry(comment_id).or_default().push(image);
            }
        }
        Ok(by_comment)
    }

    async fn post_images(&self, post_id: i64) -> Result<Vec<Image>, AppError> {
        let sql = format!(
            "SELECT {} FROM images i WHERE i.post_id = $1 ORDER BY i.created_at ASC, i.id ASC",
            IMAGE_COLUMNS
        );
        Ok(sqlx::query_as::<_, Image>(&sql)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn viewer_comment_votes(
        &self,
        post_id: i64,
        viewer_id: i64,
    ) -> Result<HashMap<i64, VoteType>, AppError> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT v.comment_id, v.vote_type
            FROM comment_votes v
            JOIN comments c ON v.comment_id = c.id
            WHERE c.post_id = $1 AND v.user_id = $2
            "#,
        )
        .bind(post_id)
        .bind(viewer_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(comment_id, vote)| Ok::<_, AppError>((comment_id, vote.parse::<VoteType>()?)))
            .collect()
    }

    async fn viewer_post_vote(&self, post_id: i64, viewer_id: i64) -> Result<Option<VoteType>, AppError> {
        let vote: Option<String> =
            sqlx::query_scalar("SELECT vote_type FROM post_votes WHERE post_id = $1 AND user_id = $2")
                .bind(post_id)
                .bind(viewer_id)
                .fetch_optional(&self.pool)
                .await?;

        vote.map(|v| v.parse::<VoteType>()).transpose()
    }

    async fn toggle_vote(
        &self,
        target: VoteTarget,
        target_id: i64,
        user_id: i64,
        vote: VoteType,
    ) -> Result<VoteToggle, AppError> {
        let (votes, column, counted) = vote_tables(target);
        let mut tx = self.pool.begin().await?;

        // Lock the target so toggles by the same voter cannot interleave.
        let lock_sql = format!("SELECT id FROM {} WHERE id = $1 FOR UPDATE", counted);
        let exists: Option<i64> = sqlx::query_scalar(&lock_sql)
            .bind(target_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound("Vote target not found".to_string()));
        }

        let current_sql = format!(
            "SELECT vote_type FROM {} WHERE {} = $1 AND user_id = $2",
            votes, column
        );
        let current: Option<String> = sqlx::query_scalar(&current_sql)
            .bind(target_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        let current = current.map(|v| v.parse::<VoteType>()).transpose()?;

        let outcome = VoteToggle::resolve(current, vote);
        match outcome.resulting_vote(vote) {
            Some(v) => {
                let upsert = format!(
                    r#"
                    INSERT INTO {votes} ({column}, user_id, vote_type)
                    VALUES ($1, $2, $3)
                    ON CONFLICT ({column}, user_id) DO UPDATE SET vote_type = EXCLUDED.vote_type
                    "#
                );
                sqlx::query(&upsert)
                    .bind(target_id)
                    .bind(user_id)
                    .bind(v.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
            None => {
                let delete = format!("DELETE FROM {} WHERE {} = $1 AND user_id = $2", votes, column);
                sqlx::query(&delete)
                    .bind(target_id)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let recount = format!(
            r#"
            UPDATE {counted} SET
                likes_count = (SELECT COUNT(*) FROM {votes} WHERE {column} = $1 AND vote_type = 'like'),
                dislikes_count = (SELECT COUNT(*) FROM {votes} WHERE {column} = $1 AND vote_type = 'dislike')
            WHERE id = $1
            "#
        );
        sqlx::query(&recount)
            .bind(target_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(outcome)
    }

    async fn append_moderation_log(&self, entry: NewModerationLog) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO moderation_logs (moderator_id, action_type, target_type, target_id, reason)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.moderator_id)
        .bind(entry.action_type.as_str())
        .bind(entry.target_type.as_str())
        .bind(entry.target_id)
        .bind(&entry.reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_moderation_logs(&self, limit: i64) -> Result<Vec<ModerationLog>, AppError> {
        let rows = sqlx::query_as::<_, ModerationLogRow>(
            r#"
            SELECT id, moderator_id, action_type, target_type, target_id, reason, created_at
            FROM moderation_logs
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ModerationLog::try_from).collect()
    }
}
