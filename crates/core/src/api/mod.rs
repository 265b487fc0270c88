//! REST client for the posts resource.

/// reqwest-backed implementation of [`PostApi`].
pub mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Post, PostDraft, PostPage, PostPatch};

pub use http::HttpPostApi;

/// Errors raised by a [`PostApi`] call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("request to {url} failed: {source}")]
    Transport {
        /// Target URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        /// Target URL.
        url: String,
        /// Response status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        /// Target URL.
        url: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Four verbs against the posts endpoint, plus a single-item read.
///
/// Implementations hold no state between calls: no retry, no caching.
#[async_trait]
pub trait PostApi: Send + Sync {
    /// `GET /posts`. The total is the length of the returned collection.
    async fn fetch_posts(&self) -> Result<PostPage, ApiError>;

    /// `GET /posts/{id}`.
    async fn get_post(&self, id: u64) -> Result<Post, ApiError>;

    /// `POST /posts`. The returned id is server-controlled and not durable.
    async fn create_post(&self, draft: &PostDraft) -> Result<Post, ApiError>;

    /// `PUT /posts/{id}`. Returns the record as echoed by the server.
    async fn update_post(&self, id: u64, patch: &PostPatch) -> Result<Post, ApiError>;

    /// `DELETE /posts/{id}`.
    async fn delete_post(&self, id: u64) -> Result<(), ApiError>;
}
