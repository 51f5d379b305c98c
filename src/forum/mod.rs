//! Forum core: comment threading and the content lifecycle.

pub mod moderation;
pub mod permissions;
pub mod thread;
