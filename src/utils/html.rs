// src/utils/html.rs

use crate::error::AppError;

/// Clean HTML content using the ammonia whitelist.
///
/// Safe formatting tags (<b>, <p>, <code>) survive; <script>, <iframe> and
/// event-handler attributes are stripped along with their content.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Sanitizes a post or comment body.
///
/// A body with nothing left after cleaning (e.g. only a script tag) is rejected.
pub fn sanitize_body(input: &str) -> Result<String, AppError> {
    let cleaned = clean_html(input.trim());
    if cleaned.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Content is empty after sanitization".to_string(),
        ));
    }
    Ok(cleaned)
}
