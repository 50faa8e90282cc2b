/// State management module
/// 
/// This module handles all curation state, including:
/// - Shared data structures (data.rs)
/// - Grading results carried by items and sidecars (evaluation.rs)
/// - The ordered, indexed backlog (backlog.rs)
/// - Opening a folder and user actions on its files (library.rs)

pub mod backlog;
pub mod data;
pub mod evaluation;
pub mod library;
