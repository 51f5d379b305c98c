// src/models/mod.rs

pub mod category;
pub mod comment;
pub mod image;
pub mod moderation;
pub mod post;
pub mod user;
pub mod vote;
