//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `ItemStatus`: the lifecycle of a seeded work item (pending, in_progress, completed, error)
//! - `MediaKind`: whether a seed is a movie or a series

mod item_state;

// Re-export main types
pub use item_state::{ItemStatus, MediaKind};
