// src/handlers/mod.rs

pub mod admin;
pub mod community;
pub mod interaction;

use crate::{
    error::AppError,
    models::user::{User, Viewer},
    store::ForumStore,
};

/// Loads the authenticated caller. Tokens for deleted accounts are rejected.
pub(crate) async fn current_user(store: &dyn ForumStore, viewer: Viewer) -> Result<User, AppError> {
    store
        .find_user(viewer.id)
        .await?
        .ok_or(AppError::AuthError("Unknown user".to_string()))
}

/// Refreshes an optional viewer against the store so its role is current.
///
/// A token for an account that no longer exists reads as anonymous.
pub(crate) async fn refresh_viewer(
    store: &dyn ForumStore,
    viewer: Option<Viewer>,
) -> Result<Option<Viewer>, AppError> {
    match viewer {
        Some(viewer) => Ok(store.find_user(viewer.id).await?.map(|u| u.viewer())),
        None => Ok(None),
    }
}
