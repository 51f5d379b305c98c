//! Reply-tree reconstruction for a post's comments.
//!
//! Comments come out of storage as one flat list where each row may point at
//! its parent. [`build_thread`] turns that list into a forest of
//! [`CommentNode`]s, orders every sibling group with the requested
//! [`CommentSort`], and attaches per-viewer votes and image attachments.
//!
//! Rows whose parent is not in the list are dropped together with their
//! replies. Rows that can never reach a root (self-parented rows, parent
//! cycles) are dropped as well.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::{
    error::AppError,
    models::{
        comment::{Comment, CommentNode},
        image::{Image, ImageResponse},
        post::SortOption,
        user::Viewer,
        vote::VoteType,
    },
    store::ForumStore,
};

/// Ordering applied to every sibling group of a thread.
///
/// Accepted solutions always come first, whatever the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentSort {
    #[default]
    Newest,
    Oldest,
    MostLiked,
    SolutionsFirst,
}

impl CommentSort {
    pub const ALL: [CommentSort; 4] = [
        CommentSort::Newest,
        CommentSort::Oldest,
        CommentSort::MostLiked,
        CommentSort::SolutionsFirst,
    ];

    /// Unknown or missing keys fall back to [`CommentSort::Newest`].
    pub fn parse(key: Option<&str>) -> Self {
        match key.map(str::trim) {
            Some("oldest") => CommentSort::Oldest,
            Some("most_liked") => CommentSort::MostLiked,
            Some("solutions_first") => CommentSort::SolutionsFirst,
            _ => CommentSort::Newest,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommentSort::Newest => "newest",
            CommentSort::Oldest => "oldest",
            CommentSort::MostLiked => "most_liked",
            CommentSort::SolutionsFirst => "solutions_first",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CommentSort::Newest => "Most recent",
            CommentSort::Oldest => "Oldest",
            CommentSort::MostLiked => "Most liked",
            CommentSort::SolutionsFirst => "Solutions first",
        }
    }

    pub fn options() -> Vec<SortOption> {
        Self::ALL
            .iter()
            .map(|sort| SortOption {
                value: sort.as_str(),
                label: sort.label(),
            })
            .collect()
    }

    /// Total order over comments. Equal timestamps and counts fall back to the
    /// id, in the same direction as the time ordering.
    pub fn compare(self, a: &Comment, b: &Comment) -> Ordering {
        let newer_first = || b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id));
        let older_first = || a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id));

        b.is_solution
            .cmp(&a.is_solution)
            .then_with(|| match self {
                CommentSort::Newest => newer_first(),
                CommentSort::Oldest => older_first(),
                CommentSort::MostLiked => b.likes_count.cmp(&a.likes_count).then_with(newer_first),
                CommentSort::SolutionsFirst => {
                    b.likes_count.cmp(&a.likes_count).then_with(older_first)
                }
            })
    }
}

/// Per-request data merged into each comment while building a thread.
#[derive(Debug, Default)]
pub struct ThreadAnnotations {
    /// The viewer's votes keyed by comment id; `None` for anonymous viewers.
    pub viewer_votes: Option<HashMap<i64, VoteType>>,
    /// Attachments keyed by comment id, already in creation order.
    pub images: HashMap<i64, Vec<Image>>,
}

impl ThreadAnnotations {
    fn apply(&self, comment: &mut Comment) {
        comment.user_vote = self
            .viewer_votes
            .as_ref()
            .and_then(|votes| votes.get(&comment.id).copied());
        comment.images = self
            .images
            .get(&comment.id)
            .map(|images| images.iter().cloned().map(ImageResponse::from).collect())
            .unwrap_or_default();
    }
}

/// Builds the ordered reply forest for one post.
///
/// The input order is irrelevant. If two rows share an id the first one wins.
pub fn build_thread(
    comments: Vec<Comment>,
    sort: CommentSort,
    annotations: &ThreadAnnotations,
) -> Vec<CommentNode> {
    // Pass 1: id -> comment.
    let mut index: HashMap<i64, Comment> = HashMap::with_capacity(comments.len());
    for mut comment in comments {
        if index.contains_key(&comment.id) {
            continue;
        }
        annotations.apply(&mut comment);
        index.insert(comment.id, comment);
    }

    // Pass 2: link every row to its parent, if the parent is present.
    let mut roots: Vec<i64> = Vec::new();
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    for comment in index.values() {
        match comment.parent_id {
            None => roots.push(comment.id),
            Some(parent) if parent != comment.id && index.contains_key(&parent) => {
                children.entry(parent).or_default().push(comment.id)
            }
            Some(_) => {}
        }
    }

    let by_sort = |a: &i64, b: &i64| match (index.get(a), index.get(b)) {
        (Some(a), Some(b)) => sort.compare(a, b),
        _ => a.cmp(b),
    };
    roots.sort_by(by_sort);
    for siblings in children.values_mut() {
        siblings.sort_by(by_sort);
    }

    // Post-order walk from the roots, so every reply list is complete before
    // its parent node is assembled. Iterative to survive very deep chains.
    let mut visited: HashSet<i64> = HashSet::with_capacity(index.len());
    let mut post_order: Vec<i64> = Vec::with_capacity(index.len());
    let mut stack: Vec<(i64, bool)> = roots.iter().rev().map(|id| (*id, false)).collect();
    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            post_order.push(id);
            continue;
        }
        if !visited.insert(id) {
            continue;
        }
        stack.push((id, true));
        if let Some(kids) = children.get(&id) {
            stack.extend(kids.iter().rev().map(|kid| (*kid, false)));
        }
    }

    let mut built: HashMap<i64, CommentNode> = HashMap::with_capacity(post_order.len());
    for id in post_order {
        let Some(comment) = index.remove(&id) else {
            continue;
        };
        let replies = children
            .remove(&id)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|kid| built.remove(&kid))
            .collect();
        built.insert(id, CommentNode { comment, replies });
    }

    roots
        .into_iter()
        .filter_map(|id| built.remove(&id))
        .collect()
}

/// Fetches everything a thread needs from the store and builds it.
///
/// Votes are only looked up when there is a viewer.
pub async fn load_thread(
    store: &dyn ForumStore,
    post_id: i64,
    viewer: Option<&Viewer>,
    sort: CommentSort,
) -> Result<Vec<CommentNode>, AppError> {
    let comments = store.list_comments(post_id).await?;
    let images = store.comment_images(post_id).await?;
    let viewer_votes = match viewer {
        Some(viewer) => Some(store.viewer_comment_votes(post_id, viewer.id).await?),
        None => None,
    };

    let annotations = ThreadAnnotations {
        viewer_votes,
        images,
    };

    Ok(build_thread(comments, sort, &annotations))
}
