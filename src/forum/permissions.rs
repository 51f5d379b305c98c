//! Visibility and authorization predicates for posts and comments.
//!
//! Every check here is a pure function returning `bool`; handlers decide
//! whether a refusal becomes a 403 or a 404.

use crate::models::{
    comment::Comment,
    post::{Post, PostStatus},
    user::{Role, User, Viewer},
};

/// Rules that differ between deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecyclePolicy {
    /// Moving into or out of `archived` needs a moderator, even for the author.
    pub archive_requires_moderator: bool,
}

/// Archived posts are only visible to their author and to moderators.
pub fn can_view(post: &Post, viewer: Option<&Viewer>) -> bool {
    if post.status != PostStatus::Archived {
        return true;
    }
    viewer.is_some_and(|v| v.id == post.user_id || v.is_moderator())
}

/// Applies to top-level comments and replies alike.
pub fn can_comment(post: &Post) -> bool {
    post.status == PostStatus::Open && !post.is_locked
}

pub fn can_change_status(post: &Post, actor: &Viewer) -> bool {
    actor.id == post.user_id || actor.is_moderator()
}

/// Status permission plus the archive policy for the specific move.
pub fn can_apply_transition(
    post: &Post,
    actor: &Viewer,
    next: PostStatus,
    policy: LifecyclePolicy,
) -> bool {
    if !can_change_status(post, actor) {
        return false;
    }
    let touches_archive = post.status == PostStatus::Archived || next == PostStatus::Archived;
    if policy.archive_requires_moderator && touches_archive {
        return actor.is_moderator();
    }
    true
}

/// Only the post author, and only once per comment.
pub fn can_mark_solution(comment: &Comment, actor_id: i64, post_author_id: i64) -> bool {
    actor_id == post_author_id && !comment.is_solution
}

/// The author, or a moderator who is not banned.
pub fn can_delete_post(post: &Post, actor: &User) -> bool {
    actor.id == post.user_id || can_moderate(actor)
}

/// The comment author, the post author, or a moderator who is not banned.
pub fn can_delete_comment(comment: &Comment, post: &Post, actor: &User) -> bool {
    actor.id == comment.user_id || actor.id == post.user_id || can_moderate(actor)
}

pub fn can_moderate(user: &User) -> bool {
    user.role.at_least(Role::Moderator) && !user.is_banned
}

pub fn can_promote(user: &User) -> bool {
    user.role.at_least(Role::Administrator) && !user.is_banned
}

/// Moderators may ban anyone except administrators; administrators may ban anyone.
pub fn can_ban(actor: &User, target: &User) -> bool {
    if !can_moderate(actor) {
        return false;
    }
    !target.role.at_least(Role::Administrator) || actor.role.at_least(Role::Administrator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;
    use chrono::Utc;

    const AUTHOR: i64 = 7;

    fn post(status: PostStatus, locked: bool) -> Post {
        Post {
            id: 1,
            title: "Integrals by parts".into(),
            content: "How do I pick u and dv for x e^x?".into(),
            category_id: 1,
            user_id: AUTHOR,
            username: "author".into(),
            status,
            is_solved: false,
            is_pinned: false,
            is_locked: locked,
            views_count: 0,
            likes_count: 0,
            dislikes_count: 0,
            created_at: Utc::now(),
        }
    }

    fn viewer(id: i64, role: Role) -> Viewer {
        Viewer { id, role }
    }

    fn user(id: i64, role: Role, banned: bool) -> User {
        User {
            id,
            username: format!("u{}", id),
            role,
            is_banned: banned,
            ban_reason: None,
            avatar_filename: None,
            created_at: Utc::now(),
        }
    }

    fn comment(user_id: i64, solution: bool) -> Comment {
        Comment {
            id: 3,
            post_id: 1,
            parent_id: None,
            user_id,
            username: "helper".into(),
            user_role: Role::Professor,
            user_banned: false,
            user_avatar_url: None,
            content: "Take u = x.".into(),
            is_solution: solution,
            likes_count: 0,
            dislikes_count: 0,
            created_at: Utc::now(),
            images: Vec::new(),
            user_vote: None,
        }
    }

    #[test]
    fn open_and_closed_posts_are_visible_to_everyone() {
        for status in [PostStatus::Open, PostStatus::Closed] {
            let p = post(status, false);
            assert!(can_view(&p, None));
            assert!(can_view(&p, Some(&viewer(99, Role::Student))));
            assert!(can_view(&p, Some(&viewer(99, Role::Administrator))));
        }
    }

    #[test]
    fn archived_posts_are_limited_to_author_and_moderators() {
        let p = post(PostStatus::Archived, false);

        assert!(can_view(&p, Some(&viewer(AUTHOR, Role::Student))));
        assert!(can_view(&p, Some(&viewer(99, Role::Moderator))));
        assert!(can_view(&p, Some(&viewer(99, Role::Administrator))));

        assert!(!can_view(&p, None));
        assert!(!can_view(&p, Some(&viewer(99, Role::Student))));
        assert!(!can_view(&p, Some(&viewer(99, Role::Professor))));
    }

    #[test]
    fn only_open_unlocked_posts_accept_comments() {
        assert!(can_comment(&post(PostStatus::Open, false)));
        assert!(!can_comment(&post(PostStatus::Open, true)));
        assert!(!can_comment(&post(PostStatus::Closed, false)));
        assert!(!can_comment(&post(PostStatus::Archived, false)));
    }

    #[test]
    fn status_changes_need_author_or_moderator() {
        let p = post(PostStatus::Open, false);

        assert!(can_change_status(&p, &viewer(AUTHOR, Role::Student)));
        assert!(can_change_status(&p, &viewer(99, Role::Moderator)));
        assert!(!can_change_status(&p, &viewer(99, Role::Professor)));
    }

    #[test]
    fn archive_policy_restricts_authors_only_when_enabled() {
        let p = post(PostStatus::Open, false);
        let author = viewer(AUTHOR, Role::Student);
        let strict = LifecyclePolicy {
            archive_requires_moderator: true,
        };

        assert!(can_apply_transition(&p, &author, PostStatus::Archived, LifecyclePolicy::default()));
        assert!(!can_apply_transition(&p, &author, PostStatus::Archived, strict));
        assert!(can_apply_transition(&p, &author, PostStatus::Closed, strict));
        assert!(can_apply_transition(&p, &viewer(99, Role::Moderator), PostStatus::Archived, strict));

        let archived = post(PostStatus::Archived, false);
        assert!(!can_apply_transition(&archived, &author, PostStatus::Open, strict));
    }

    #[test]
    fn solution_marking_is_author_only_and_once() {
        assert!(can_mark_solution(&comment(3, false), AUTHOR, AUTHOR));
        assert!(!can_mark_solution(&comment(3, true), AUTHOR, AUTHOR));
        assert!(!can_mark_solution(&comment(3, false), 99, AUTHOR));
    }

    #[test]
    fn comment_deletion_rights() {
        let p = post(PostStatus::Open, false);
        let c = comment(3, false);

        assert!(can_delete_comment(&c, &p, &user(3, Role::Student, false)));
        assert!(can_delete_comment(&c, &p, &user(AUTHOR, Role::Student, false)));
        assert!(can_delete_comment(&c, &p, &user(99, Role::Moderator, false)));
        assert!(!can_delete_comment(&c, &p, &user(99, Role::Professor, false)));
        assert!(!can_delete_post(&p, &user(3, Role::Student, false)));
    }

    #[test]
    fn banned_moderators_lose_delete_rights_over_others_content() {
        let p = post(PostStatus::Open, false);
        let c = comment(3, false);
        let banned_mod = user(99, Role::Moderator, true);

        assert!(!can_delete_post(&p, &banned_mod));
        assert!(!can_delete_comment(&c, &p, &banned_mod));
        // Own content stays deletable.
        assert!(can_delete_post(&p, &user(AUTHOR, Role::Student, true)));
    }

    #[test]
    fn banned_staff_lose_moderation_rights() {
        assert!(can_moderate(&user(1, Role::Moderator, false)));
        assert!(!can_moderate(&user(1, Role::Moderator, true)));
        assert!(!can_promote(&user(1, Role::Moderator, false)));
        assert!(can_promote(&user(1, Role::Administrator, false)));
        assert!(!can_promote(&user(1, Role::Administrator, true)));
    }

    #[test]
    fn moderators_cannot_ban_administrators() {
        let moderator = user(1, Role::Moderator, false);
        let admin = user(2, Role::Administrator, false);
        let student = user(3, Role::Student, false);

        assert!(can_ban(&moderator, &student));
        assert!(!can_ban(&moderator, &admin));
        assert!(can_ban(&admin, &admin));
        assert!(!can_ban(&student, &student));
    }
}
