#![warn(clippy::all, missing_docs)]

//! Core logic for the postdesk posts administration tool.
//!
//! This crate hosts the post models, configuration handling, the REST
//! client for the posts resource and the local reconciliation state that
//! keeps a paginated list consistent over a backend that forgets writes.

pub mod api;
pub mod config;
pub mod form;
pub mod models;
pub mod overlay;
pub mod table;

pub use api::{ApiError, HttpPostApi, PostApi};
pub use config::AppConfig;
pub use form::{Field, FormError, FormMode, PostForm};
pub use models::{Post, PostDraft, PostPage, PostPatch};
pub use overlay::{reconcile, Overlay, Reconciled};
pub use table::{Completion, Notice, NoticeLevel, PendingCall, PostsTable, Step};
