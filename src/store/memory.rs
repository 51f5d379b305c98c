use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    error::AppError,
    models::{
        category::{Category, DEFAULT_CATEGORIES},
        comment::{Comment, NewComment},
        image::Image,
        moderation::{ModerationLog, NewModerationLog},
        post::{NewPost, Post, PostStatus},
        user::{Role, User, avatar_url},
        vote::{VoteTarget, VoteToggle, VoteType},
    },
    store::{ForumStore, PostFilter},
};

#[derive(Debug, Clone)]
struct PostRecord {
    id: i64,
    title: String,
    content: String,
    category_id: i64,
    user_id: i64,
    status: PostStatus,
    is_solved: bool,
    is_pinned: bool,
    is_locked: bool,
    views_count: i32,
    likes_count: i32,
    dislikes_count: i32,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CommentRecord {
    id: i64,
    post_id: i64,
    parent_id: Option<i64>,
    user_id: i64,
    content: String,
    is_solution: bool,
    likes_count: i32,
    dislikes_count: i32,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CategoryRecord {
    name: String,
    description: Option<String>,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    /// Own id sequence, matching the seeded Postgres ids.
    categories: BTreeMap<i64, CategoryRecord>,
    posts: BTreeMap<i64, PostRecord>,
    comments: BTreeMap<i64, CommentRecord>,
    images: Vec<Image>,
    /// (post_id, user_id)
    post_votes: HashMap<(i64, i64), VoteType>,
    /// (comment_id, user_id)
    comment_votes: HashMap<(i64, i64), VoteType>,
    logs: Vec<ModerationLog>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn post(&self, record: &PostRecord) -> Option<Post> {
        let author = self.users.get(&record.user_id)?;
        Some(Post {
            id: record.id,
            title: record.title.clone(),
            content: record.content.clone(),
            category_id: record.category_id,
            user_id: record.user_id,
            username: author.username.clone(),
            status: record.status,
            is_solved: record.is_solved,
            is_pinned: record.is_pinned,
            is_locked: record.is_locked,
            views_count: record.views_count,
            likes_count: record.likes_count,
            dislikes_count: record.dislikes_count,
            created_at: record.created_at,
        })
    }

    fn comment(&self, record: &CommentRecord) -> Option<Comment> {
        let author = self.users.get(&record.user_id)?;
        Some(Comment {
            id: record.id,
            post_id: record.post_id,
            parent_id: record.parent_id,
            user_id: record.user_id,
            username: author.username.clone(),
            user_role: author.role,
            user_banned: author.is_banned,
            user_avatar_url: avatar_url(author.avatar_filename.as_deref()),
            content: record.content.clone(),
            is_solution: record.is_solution,
            likes_count: record.likes_count,
            dislikes_count: record.dislikes_count,
            created_at: record.created_at,
            images: Vec::new(),
            user_vote: None,
        })
    }

    fn count_votes(votes: &HashMap<(i64, i64), VoteType>, target_id: i64) -> (i32, i32) {
        votes
            .iter()
            .filter(|((id, _), _)| *id == target_id)
            .fold((0, 0), |(likes, dislikes), (_, vote)| match vote {
                VoteType::Like => (likes + 1, dislikes),
                VoteType::Dislike => (likes, dislikes + 1),
            })
    }

    fn remove_comments(&mut self, ids: &HashSet<i64>) {
        self.comments.retain(|id, _| !ids.contains(id));
        self.comment_votes.retain(|(id, _), _| !ids.contains(id));
        self.images
            .retain(|img| img.comment_id.is_none_or(|cid| !ids.contains(&cid)));
    }
}

/// In-process store. Every operation runs under one write or read guard,
/// which makes the paired and read-modify-write operations atomic.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    reject_logs: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty store holding only the default categories.
    pub fn new() -> Self {
        let mut tables = Tables::default();
        for (id, (name, description)) in (1..).zip(DEFAULT_CATEGORIES) {
            tables.categories.insert(
                id,
                CategoryRecord {
                    name: name.to_string(),
                    description: Some(description.to_string()),
                    created_at: Utc::now(),
                },
            );
        }
        Self {
            tables: RwLock::new(tables),
            reject_logs: AtomicBool::new(false),
        }
    }

    pub async fn insert_category(&self, name: &str, description: Option<&str>) -> i64 {
        let mut tables = self.tables.write().await;
        let id = tables.categories.keys().next_back().map_or(1, |last| last + 1);
        tables.categories.insert(
            id,
            CategoryRecord {
                name: name.to_string(),
                description: description.map(str::to_string),
                created_at: Utc::now(),
            },
        );
        id
    }

    pub async fn insert_user(&self, username: &str, role: Role) -> i64 {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        tables.users.insert(
            id,
            User {
                id,
                username: username.to_string(),
                role,
                is_banned: false,
                ban_reason: None,
                avatar_filename: None,
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Stores an attachment; the given `id` is replaced.
    pub async fn insert_image(&self, mut image: Image) -> i64 {
        let mut tables = self.tables.write().await;
        image.id = tables.next_id();
        let id = image.id;
        tables.images.push(image);
        id
    }

    pub async fn set_post_flags(&self, id: i64, is_locked: bool, is_pinned: bool) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let post = tables
            .posts
            .get_mut(&id)
            .ok_or(AppError::NotFound("Post not found".to_string()))?;
        post.is_locked = is_locked;
        post.is_pinned = is_pinned;
        Ok(())
    }

    /// Makes every following log append fail.
    pub fn reject_moderation_logs(&self, reject: bool) {
        self.reject_logs.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl ForumStore for MemoryStore {
    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn set_user_ban(&self, id: i64, banned: bool, reason: Option<&str>) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or(AppError::NotFound("User not found".to_string()))?;
        user.is_banned = banned;
        user.ban_reason = if banned { reason.map(str::to_string) } else { None };
        Ok(())
    }

    async fn set_user_role(&self, id: i64, role: Role) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or(AppError::NotFound("User not found".to_string()))?;
        user.role = role;
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, AppError> {
        let tables = self.tables.read().await;
        let mut categories: Vec<Category> = tables
            .categories
            .iter()
            .map(|(id, record)| Category {
                id: *id,
                name: record.name.clone(),
                description: record.description.clone(),
                post_count: tables
                    .posts
                    .values()
                    .filter(|p| p.category_id == *id && p.status != PostStatus::Archived)
                    .count() as i64,
                created_at: record.created_at,
            })
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn find_post(&self, id: i64) -> Result<Option<Post>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.posts.get(&id).and_then(|record| tables.post(record)))
    }

    async fn list_posts(&self, filter: PostFilter) -> Result<Vec<Post>, AppError> {
        let tables = self.tables.read().await;
        let mut posts: Vec<Post> = tables
            .posts
            .values()
            .filter(|p| filter.category_id.is_none_or(|cid| p.category_id == cid))
            .filter_map(|record| tables.post(record))
            .filter(|p| crate::forum::permissions::can_view(p, filter.viewer.as_ref()))
            .collect();

        posts.sort_by(|a, b| {
            b.is_pinned
                .cmp(&a.is_pinned)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        });
        posts.truncate(filter.limit.max(0) as usize);
        Ok(posts)
    }

    async fn create_post(&self, post: NewPost) -> Result<i64, AppError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&post.user_id) {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        if !tables.categories.contains_key(&post.category_id) {
            return Err(AppError::BadRequest("Unknown category".to_string()));
        }
        let id = tables.next_id();
        tables.posts.insert(
            id,
            PostRecord {
                id,
                title: post.title,
                content: post.content,
                category_id: post.category_id,
                user_id: post.user_id,
                status: PostStatus::Open,
                is_solved: false,
                is_pinned: false,
                is_locked: false,
                views_count: 0,
                likes_count: 0,
                dislikes_count: 0,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn delete_post(&self, id: i64) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.posts.remove(&id).is_none() {
            return Err(AppError::NotFound("Post not found".to_string()));
        }
        let comment_ids: HashSet<i64> = tables
            .comments
            .values()
            .filter(|c| c.post_id == id)
            .map(|c| c.id)
            .collect();
        tables.remove_comments(&comment_ids);
        tables.post_votes.retain(|(pid, _), _| *pid != id);
        tables.images.retain(|img| img.post_id != Some(id));
        Ok(())
    }

    async fn increment_post_views(&self, id: i64) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if let Some(post) = tables.posts.get_mut(&id) {
            post.views_count += 1;
        }
        Ok(())
    }

    async fn update_post_status(&self, id: i64, status: PostStatus) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let post = tables
            .posts
            .get_mut(&id)
            .ok_or(AppError::NotFound("Post not found".to_string()))?;
        post.status = status;
        Ok(())
    }

    async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .filter_map(|record| tables.comment(record))
            .collect())
    }

    async fn find_comment(&self, id: i64) -> Result<Option<Comment>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.comments.get(&id).and_then(|record| tables.comment(record)))
    }

    async fn create_comment(&self, comment: NewComment) -> Result<i64, AppError> {
        let mut tables = self.tables.write().await;
        if !tables.posts.contains_key(&comment.post_id) {
            return Err(AppError::NotFound("Post not found".to_string()));
        }
        let id = tables.next_id();
        tables.comments.insert(
            id,
            CommentRecord {
                id,
                post_id: comment.post_id,
                parent_id: comment.parent_id,
                user_id: comment.user_id,
                content: comment.content,
                is_solution: false,
                likes_count: 0,
                dislikes_count: 0,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn delete_comment(&self, id: i64) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if !tables.comments.contains_key(&id) {
            return Err(AppError::NotFound("Comment not found".to_string()));
        }

        let mut doomed: HashSet<i64> = HashSet::from([id]);
        loop {
            let replies: Vec<i64> = tables
                .comments
                .values()
                .filter(|c| !doomed.contains(&c.id))
                .filter(|c| c.parent_id.is_some_and(|pid| doomed.contains(&pid)))
                .map(|c| c.id)
                .collect();
            if replies.is_empty() {
                break;
            }
            doomed.extend(replies);
        }

        tables.remove_comments(&doomed);
        Ok(())
    }

    async fn mark_solution(&self, post_id: i64, comment_id: i64) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if !tables.posts.contains_key(&post_id) {
            return Err(AppError::NotFound("Post not found".to_string()));
        }
        match tables.comments.get(&comment_id) {
            Some(c) if c.post_id == post_id => {}
            _ => return Err(AppError::NotFound("Comment not found".to_string())),
        }
        if tables
            .comments
            .values()
            .any(|c| c.post_id == post_id && c.is_solution)
        {
            return Err(AppError::Conflict("This post already has a solution".to_string()));
        }

        if let Some(comment) = tables.comments.get_mut(&comment_id) {
            comment.is_solution = true;
        }
        if let Some(post) = tables.posts.get_mut(&post_id) {
            post.is_solved = true;
        }
        Ok(())
    }

    async fn comment_images(&self, post_id: i64) -> Result<HashMap<i64, Vec<Image>>, AppError> {
        let tables = self.tables.read().await;
        let comment_ids: HashSet<i64> = tables
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .map(|c| c.id)
            .collect();

        let mut images: Vec<&Image> = tables
            .images
            .iter()
            .filter(|img| img.comment_id.is_some_and(|cid| comment_ids.contains(&cid)))
            .collect();
        images.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut by_comment: HashMap<i64, Vec<Image>> = HashMap::new();
        for img in images {
            if let Some(cid) = img.comment_id {
                by_comment.entry(cid).or_default().push(img.clone());
            }
        }
        Ok(by_comment)
    }

    async fn post_images(&self, post_id: i64) -> Result<Vec<Image>, AppError> {
        let tables = self.tables.read().await;
        let mut images: Vec<Image> = tables
            .images
            .iter()
            .filter(|img| img.post_id == Some(post_id))
            .cloned()
            .collect();
        images.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(images)
    }

    async fn viewer_comment_votes(
        &self,
        post_id: i64,
        viewer_id: i64,
    ) -> Result<HashMap<i64, VoteType>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .comment_votes
            .iter()
            .filter(|((cid, uid), _)| {
                *uid == viewer_id && tables.comments.get(cid).is_some_and(|c| c.post_id == post_id)
            })
            .map(|((cid, _), vote)| (*cid, *vote))
            .collect())
    }

    async fn viewer_post_vote(&self, post_id: i64, viewer_id: i64) -> Result<Option<VoteType>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.post_votes.get(&(post_id, viewer_id)).copied())
    }

    async fn toggle_vote(
        &self,
        target: VoteTarget,
        target_id: i64,
        user_id: i64,
        vote: VoteType,
    ) -> Result<VoteToggle, AppError> {
        let mut tables = self.tables.write().await;
        let tables = &mut *tables;

        let (votes, exists) = match target {
            VoteTarget::Post => (&mut tables.post_votes, tables.posts.contains_key(&target_id)),
            VoteTarget::Comment => (
                &mut tables.comment_votes,
                tables.comments.contains_key(&target_id),
            ),
        };
        if !exists {
            return Err(AppError::NotFound("Vote target not found".to_string()));
        }

        let key = (target_id, user_id);
        let outcome = VoteToggle::resolve(votes.get(&key).copied(), vote);
        match outcome.resulting_vote(vote) {
            Some(v) => {
                votes.insert(key, v);
            }
            None => {
                votes.remove(&key);
            }
        }
        let (likes, dislikes) = Tables::count_votes(votes, target_id);

        match target {
            VoteTarget::Post => {
                if let Some(post) = tables.posts.get_mut(&target_id) {
                    post.likes_count = likes;
                    post.dislikes_count = dislikes;
                }
            }
            VoteTarget::Comment => {
                if let Some(comment) = tables.comments.get_mut(&target_id) {
                    comment.likes_count = likes;
                    comment.dislikes_count = dislikes;
                }
            }
        }
        Ok(outcome)
    }

    async fn append_moderation_log(&self, entry: NewModerationLog) -> Result<(), AppError> {
        if self.reject_logs.load(Ordering::SeqCst) {
            return Err(AppError::InternalServerError(
                "moderation log is not writable".to_string(),
            ));
        }
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        tables.logs.push(ModerationLog {
            id,
            moderator_id: entry.moderator_id,
            action_type: entry.action_type,
            target_type: entry.target_type,
            target_id: entry.target_id,
            reason: entry.reason,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_moderation_logs(&self, limit: i64) -> Result<Vec<ModerationLog>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .logs
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
