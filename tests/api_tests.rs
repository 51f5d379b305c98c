// tests/api_tests.rs

use std::sync::Arc;

use homework_forum::{
    config::Config,
    models::{
        comment::NewComment,
        image::Image,
        post::{NewPost, PostStatus},
        user::Role,
    },
    routes,
    state::AppState,
    store::{ForumStore, memory::MemoryStore},
    utils::jwt::sign_jwt,
};
use serde_json::{Value, json};

const SECRET: &str = "test_secret_for_integration_tests";

struct TestApp {
    address: String,
    store: Arc<MemoryStore>,
    client: reqwest::Client,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Seeds a user and returns its id and a bearer token.
    async fn user(&self, name: &str, role: Role) -> (i64, String) {
        let id = self.store.insert_user(name, role).await;
        let token = sign_jwt(id, role, SECRET, 600).expect("Failed to sign token");
        (id, token)
    }

    async fn post(&self, author: i64) -> i64 {
        self.store
            .create_post(NewPost {
                user_id: author,
                category_id: 1,
                title: "Chain rule".into(),
                content: "How do I differentiate sin(x^2) step by step?".into(),
            })
            .await
            .expect("Failed to seed post")
    }

    async fn comment(&self, post: i64, author: i64, parent: Option<i64>) -> i64 {
        self.store
            .create_comment(NewComment {
                post_id: post,
                user_id: author,
                parent_id: parent,
                content: "Let u = x^2 first.".into(),
            })
            .await
            .expect("Failed to seed comment")
    }
}

/// Helper function to spawn the app on a random port for testing.
/// Runs on the in-memory store, so no database is needed.
async fn spawn_app() -> TestApp {
    spawn_app_with(false).await
}

async fn spawn_app_with(archive_requires_moderator: bool) -> TestApp {
    let store = Arc::new(MemoryStore::new());

    let config = Config {
        database_url: None,
        jwt_secret: SECRET.to_string(),
        rust_log: "error".to_string(),
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        log_dir: "logs".to_string(),
        uploads_dir: "uploads".to_string(),
        archive_requires_moderator,
    };

    let state = AppState {
        store: store.clone(),
        config,
    };
    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        store,
        client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn unknown_path_is_404() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app
        .client
        .get(app.url("/random_path_that_does_not_exist"))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn writes_need_a_token_and_bad_tokens_are_rejected() {
    let app = spawn_app().await;

    let anonymous = app
        .client
        .post(app.url("/api/posts"))
        .json(&json!({
            "title": "Anonymous question",
            "content": "This body is long enough to pass validation.",
            "category_id": 1
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status().as_u16(), 401);

    let forged = app
        .client
        .get(app.url("/api/posts"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status().as_u16(), 401);
}

#[tokio::test]
async fn create_post_validates_and_sanitizes() {
    // Arrange
    let app = spawn_app().await;
    let (_, token) = app.user("asker", Role::Student).await;

    // Act: title too short
    let invalid = app
        .client
        .post(app.url("/api/posts"))
        .bearer_auth(&token)
        .json(&json!({"title": "Hi", "content": "short", "category_id": 1}))
        .send()
        .await
        .unwrap();

    let created = app
        .client
        .post(app.url("/api/posts"))
        .bearer_auth(&token)
        .json(&json!({
            "title": "Series convergence",
            "content": "<p>Does sum 1/n^2 converge?</p><script>alert(1)</script>",
            "category_id": 2
        }))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(invalid.status().as_u16(), 400);
    assert_eq!(created.status().as_u16(), 201);

    let id = created.json::<Value>().await.unwrap()["id"].as_i64().unwrap();
    let post = app.store.find_post(id).await.unwrap().unwrap();
    assert_eq!(post.content, "<p>Does sum 1/n^2 converge?</p>");
    assert_eq!(post.status, PostStatus::Open);
}

#[tokio::test]
async fn archived_post_is_hidden_from_everyone_but_author_and_moderators() {
    // Arrange
    let app = spawn_app().await;
    let (author, author_token) = app.user("asker", Role::Student).await;
    let (_, other_token) = app.user("classmate", Role::Professor).await;
    let (_, mod_token) = app.user("mod", Role::Moderator).await;
    let archived = app.post(author).await;
    let open = app.post(author).await;
    app.store
        .update_post_status(archived, PostStatus::Archived)
        .await
        .unwrap();

    let path = app.url(&format!("/api/posts/{}", archived));

    // Act
    let anonymous = app.client.get(&path).send().await.unwrap();
    let other = app.client.get(&path).bearer_auth(&other_token).send().await.unwrap();
    let owner = app.client.get(&path).bearer_auth(&author_token).send().await.unwrap();
    let moderator = app.client.get(&path).bearer_auth(&mod_token).send().await.unwrap();

    // Assert: refusal hides existence
    assert_eq!(anonymous.status().as_u16(), 404);
    assert_eq!(other.status().as_u16(), 404);
    assert_eq!(owner.status().as_u16(), 200);
    assert_eq!(moderator.status().as_u16(), 200);

    let listed: Vec<i64> = app
        .client
        .get(app.url("/api/posts"))
        .send()
        .await
        .unwrap()
        .json::<Vec<Value>>()
        .await
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert_eq!(listed, vec![open]);

    let listed_for_author = app
        .client
        .get(app.url("/api/posts"))
        .bearer_auth(&author_token)
        .send()
        .await
        .unwrap()
        .json::<Vec<Value>>()
        .await
        .unwrap();
    assert_eq!(listed_for_author.len(), 2);
}

#[tokio::test]
async fn comments_are_refused_on_closed_or_locked_posts() {
    // Arrange
    let app = spawn_app().await;
    let (author, _) = app.user("asker", Role::Student).await;
    let (_, token) = app.user("helper", Role::Professor).await;
    let open = app.post(author).await;
    let closed = app.post(author).await;
    let locked = app.post(author).await;
    app.store.update_post_status(closed, PostStatus::Closed).await.unwrap();
    app.store.set_post_flags(locked, true, false).await.unwrap();

    let body = json!({"content": "Try integration by parts."});
    let comment_on = |post: i64| {
        app.client
            .post(app.url(&format!("/api/posts/{}/comments", post)))
            .bearer_auth(&token)
            .json(&body)
            .send()
    };

    // Act
    let on_open = comment_on(open).await.unwrap();
    let on_closed = comment_on(closed).await.unwrap();
    let on_locked = comment_on(locked).await.unwrap();

    // Assert
    assert_eq!(on_open.status().as_u16(), 201);
    assert_eq!(on_closed.status().as_u16(), 403);
    assert_eq!(on_locked.status().as_u16(), 403);
}

#[tokio::test]
async fn unknown_category_is_a_bad_request() {
    let app = spawn_app().await;
    let (_, token) = app.user("asker", Role::Student).await;

    let response = app
        .client
        .post(app.url("/api/posts"))
        .bearer_auth(&token)
        .json(&json!({
            "title": "Lost question",
            "content": "Which category does this belong to?",
            "category_id": 999
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    let categories = app.store.list_categories().await.unwrap();
    assert!(categories.iter().all(|c| c.post_count == 0));
}

#[tokio::test]
async fn categories_report_their_post_counts() {
    let app = spawn_app().await;
    let (author, _) = app.user("asker", Role::Student).await;
    app.post(author).await;

    let categories = app
        .client
        .get(app.url("/api/categories"))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();

    let maths = categories
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["id"] == 1)
        .unwrap();
    assert_eq!(maths["name"], "Mathematics");
    assert_eq!(maths["post_count"], 1);
}

#[tokio::test]
async fn parent_id_zero_creates_a_root_comment() {
    let app = spawn_app().await;
    let (author, token) = app.user("asker", Role::Student).await;
    let post = app.post(author).await;

    let response = app
        .client
        .post(app.url(&format!("/api/posts/{}/comments", post)))
        .bearer_auth(&token)
        .json(&json!({"content": "Top-level answer.", "parent_id": 0}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 201);
    let comments = app.store.list_comments(post).await.unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].parent_id, None);
}

#[tokio::test]
async fn reply_to_unknown_parent_is_404() {
    let app = spawn_app().await;
    let (author, token) = app.user("asker", Role::Student).await;
    let post = app.post(author).await;
    let elsewhere = app.post(author).await;
    let foreign_parent = app.comment(elsewhere, author, None).await;

    for parent in [9_999, foreign_parent] {
        let response = app
            .client
            .post(app.url(&format!("/api/posts/{}/comments", post)))
            .bearer_auth(&token)
            .json(&json!({"content": "Replying here.", "parent_id": parent}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 404);
    }
}

#[tokio::test]
async fn status_change_persists_when_the_moderation_log_fails() {
    // Arrange
    let app = spawn_app().await;
    let (author, token) = app.user("asker", Role::Student).await;
    let post = app.post(author).await;
    app.store.reject_moderation_logs(true);

    // Act
    let response = app
        .client
        .put(app.url(&format!("/api/posts/{}/status", post)))
        .bearer_auth(&token)
        .json(&json!({"status": "closed", "reason": "got my answer"}))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body = response.json::<Value>().await.unwrap();
    assert_eq!(body["new_status"], "closed");
    let stored = app.store.find_post(post).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Closed);
}

#[tokio::test]
async fn status_transitions_are_checked() {
    let app = spawn_app().await;
    let (author, token) = app.user("asker", Role::Student).await;
    let (_, stranger) = app.user("stranger", Role::Professor).await;
    let post = app.post(author).await;
    let path = app.url(&format!("/api/posts/{}/status", post));

    let same_state = app
        .client
        .put(&path)
        .bearer_auth(&token)
        .json(&json!({"status": "open"}))
        .send()
        .await
        .unwrap();
    assert_eq!(same_state.status().as_u16(), 400);

    let not_owner = app
        .client
        .put(&path)
        .bearer_auth(&stranger)
        .json(&json!({"status": "closed"}))
        .send()
        .await
        .unwrap();
    assert_eq!(not_owner.status().as_u16(), 403);

    let archive = app
        .client
        .put(&path)
        .bearer_auth(&token)
        .json(&json!({"status": "archived"}))
        .send()
        .await
        .unwrap();
    assert_eq!(archive.status().as_u16(), 200);

    let archived_to_closed = app
        .client
        .put(&path)
        .bearer_auth(&token)
        .json(&json!({"status": "closed"}))
        .send()
        .await
        .unwrap();
    assert_eq!(archived_to_closed.status().as_u16(), 400);
}

#[tokio::test]
async fn strict_archive_policy_requires_a_moderator() {
    let app = spawn_app_with(true).await;
    let (author, token) = app.user("asker", Role::Student).await;
    let (_, mod_token) = app.user("mod", Role::Moderator).await;
    let post = app.post(author).await;
    let path = app.url(&format!("/api/posts/{}/status", post));

    let by_author = app
        .client
        .put(&path)
        .bearer_auth(&token)
        .json(&json!({"status": "archived"}))
        .send()
        .await
        .unwrap();
    let by_moderator = app
        .client
        .put(&path)
        .bearer_auth(&mod_token)
        .json(&json!({"status": "archived", "reason": "stale"}))
        .send()
        .await
        .unwrap();

    assert_eq!(by_author.status().as_u16(), 403);
    assert_eq!(by_moderator.status().as_u16(), 200);
}

#[tokio::test]
async fn solution_flow() {
    // Arrange
    let app = spawn_app().await;
    let (author, author_token) = app.user("asker", Role::Student).await;
    let (helper, helper_token) = app.user("helper", Role::Professor).await;
    let post = app.post(author).await;
    let first = app.comment(post, helper, None).await;
    let second = app.comment(post, helper, None).await;
    let mark = |comment: i64, token: &str| {
        app.client
            .post(app.url(&format!("/api/comments/{}/solution", comment)))
            .bearer_auth(token)
            .send()
    };

    // Act & Assert
    assert_eq!(mark(first, &helper_token).await.unwrap().status().as_u16(), 403);
    assert_eq!(mark(first, &author_token).await.unwrap().status().as_u16(), 200);
    assert_eq!(mark(first, &author_token).await.unwrap().status().as_u16(), 409);
    assert_eq!(mark(second, &author_token).await.unwrap().status().as_u16(), 409);

    let stored = app.store.find_post(post).await.unwrap().unwrap();
    assert!(stored.is_solved);
}

#[tokio::test]
async fn post_page_returns_a_sorted_annotated_thread() {
    // Arrange
    let app = spawn_app().await;
    let (author, author_token) = app.user("asker", Role::Student).await;
    let (helper, helper_token) = app.user("helper", Role::Professor).await;
    let post = app.post(author).await;
    let a = app.comment(post, helper, None).await;
    let b = app.comment(post, author, Some(a)).await;
    let c = app.comment(post, helper, None).await;
    app.store.mark_solution(post, c).await.unwrap();
    app.store
        .insert_image(Image {
            id: 0,
            filename: "graph.png".into(),
            original_name: "graph.png".into(),
            content_type: "image/png".into(),
            size_bytes: 2048,
            width: 640,
            height: 480,
            post_id: None,
            comment_id: Some(b),
            user_id: author,
            created_at: chrono::Utc::now(),
        })
        .await;

    // Only the helper has voted on B.
    let like = app
        .client
        .post(app.url(&format!("/api/comments/{}/vote", b)))
        .bearer_auth(&helper_token)
        .json(&json!({"type": "like"}))
        .send()
        .await
        .unwrap();
    assert_eq!(like.status().as_u16(), 200);

    // Act
    let page = app
        .client
        .get(app.url(&format!("/api/posts/{}?sort=most_liked", post)))
        .bearer_auth(&helper_token)
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();

    // Assert
    assert_eq!(page["current_sort"], "most_liked");
    assert_eq!(page["available_sorts"].as_array().unwrap().len(), 4);
    assert_eq!(page["post"]["views_count"], 1);

    let roots = page["comments"].as_array().unwrap();
    assert_eq!(roots.len(), 2);
    assert_eq!(roots[0]["id"].as_i64().unwrap(), c);
    assert_eq!(roots[0]["is_solution"], true);
    assert_eq!(roots[1]["id"].as_i64().unwrap(), a);

    let reply = &roots[1]["replies"][0];
    assert_eq!(reply["id"].as_i64().unwrap(), b);
    assert_eq!(reply["likes_count"], 1);
    assert_eq!(reply["user_vote"], "like");
    assert_eq!(reply["images"][0]["url"], "/uploads/posts/graph.png");

    // Votes are per viewer.
    let for_author = app
        .client
        .get(app.url(&format!("/api/posts/{}?sort=bogus", post)))
        .bearer_auth(&author_token)
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(for_author["current_sort"], "newest");
    assert!(for_author["comments"][1]["replies"][0]["user_vote"].is_null());
}

#[tokio::test]
async fn voting_twice_with_the_same_type_removes_the_vote() {
    // Arrange
    let app = spawn_app().await;
    let (author, _) = app.user("asker", Role::Student).await;
    let (_, token) = app.user("voter", Role::Student).await;
    let post = app.post(author).await;
    let vote = |kind: &'static str| {
        app.client
            .post(app.url(&format!("/api/posts/{}/vote", post)))
            .bearer_auth(&token)
            .json(&json!({"type": kind}))
            .send()
    };

    // Act
    let first = vote("like").await.unwrap().json::<Value>().await.unwrap();
    let switched = vote("dislike").await.unwrap().json::<Value>().await.unwrap();
    let removed = vote("dislike").await.unwrap().json::<Value>().await.unwrap();

    // Assert
    assert_eq!(first["outcome"], "added");
    assert_eq!(switched["outcome"], "changed");
    assert_eq!(switched["vote"], "dislike");
    assert_eq!(removed["outcome"], "removed");
    assert!(removed["vote"].is_null());

    let stored = app.store.find_post(post).await.unwrap().unwrap();
    assert_eq!((stored.likes_count, stored.dislikes_count), (0, 0));
}

#[tokio::test]
async fn moderator_deletes_a_comment_and_the_action_is_logged() {
    let app = spawn_app().await;
    let (author, _) = app.user("asker", Role::Student).await;
    let (helper, helper_token) = app.user("helper", Role::Student).await;
    let (_, mod_token) = app.user("mod", Role::Moderator).await;
    let post = app.post(author).await;
    let root = app.comment(post, helper, None).await;
    let reply = app.comment(post, author, Some(root)).await;

    let forbidden = app
        .client
        .delete(app.url(&format!("/api/comments/{}", reply)))
        .bearer_auth(&helper_token)
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status().as_u16(), 403);

    let deleted = app
        .client
        .delete(app.url(&format!("/api/comments/{}?reason=off-topic", root)))
        .bearer_auth(&mod_token)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status().as_u16(), 204);
    assert!(app.store.find_comment(reply).await.unwrap().is_none());

    let logs = app
        .client
        .get(app.url("/api/admin/moderation-logs"))
        .bearer_auth(&mod_token)
        .send()
        .await
        .unwrap()
        .json::<Vec<Value>>()
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["action_type"], "delete");
    assert_eq!(logs[0]["target_type"], "comment");
    assert_eq!(logs[0]["reason"], "off-topic");
}

#[tokio::test]
async fn admin_routes_are_gated_and_bans_stop_writes() {
    // Arrange
    let app = spawn_app().await;
    let (student, student_token) = app.user("student", Role::Student).await;
    let (_, mod_token) = app.user("mod", Role::Moderator).await;
    let (admin, admin_token) = app.user("root", Role::Administrator).await;
    let logs = app.url("/api/admin/moderation-logs");

    // Act & Assert: role gate
    let anonymous = app.client.get(&logs).send().await.unwrap();
    assert_eq!(anonymous.status().as_u16(), 401);
    let as_student = app.client.get(&logs).bearer_auth(&student_token).send().await.unwrap();
    assert_eq!(as_student.status().as_u16(), 403);

    // Moderators cannot ban administrators or change roles
    let ban_admin = app
        .client
        .post(app.url(&format!("/api/admin/users/{}/ban", admin)))
        .bearer_auth(&mod_token)
        .json(&json!({"reason": "abuse"}))
        .send()
        .await
        .unwrap();
    assert_eq!(ban_admin.status().as_u16(), 403);

    let promote = app
        .client
        .put(app.url(&format!("/api/admin/users/{}/role", student)))
        .bearer_auth(&mod_token)
        .json(&json!({"role": "moderator"}))
        .send()
        .await
        .unwrap();
    assert_eq!(promote.status().as_u16(), 403);

    // Ban the student, then their writes are refused
    let ban = app
        .client
        .post(app.url(&format!("/api/admin/users/{}/ban", student)))
        .bearer_auth(&mod_token)
        .json(&json!({"reason": "posting answers to exams"}))
        .send()
        .await
        .unwrap();
    assert_eq!(ban.status().as_u16(), 204);

    let write = app
        .client
        .post(app.url("/api/posts"))
        .bearer_auth(&student_token)
        .json(&json!({
            "title": "Banned but trying",
            "content": "This should never be stored anywhere.",
            "category_id": 1
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(write.status().as_u16(), 403);

    let promote = app
        .client
        .put(app.url(&format!("/api/admin/users/{}/role", student)))
        .bearer_auth(&admin_token)
        .json(&json!({"role": "professor"}))
        .send()
        .await
        .unwrap();
    assert_eq!(promote.status().as_u16(), 200);

    let entries = app
        .client
        .get(&logs)
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap()
        .json::<Vec<Value>>()
        .await
        .unwrap();
    let actions: Vec<&str> = entries
        .iter()
        .map(|e| e["action_type"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["promote", "ban"]);
}
