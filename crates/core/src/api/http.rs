use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{ApiError, PostApi};
use crate::models::{Post, PostDraft, PostPage, PostPatch};

const MAX_ERROR_BODY: usize = 500;

/// HTTP client for `{base_url}/posts`.
#[derive(Debug, Clone)]
pub struct HttpPostApi {
    base_url: String,
    client: Client,
}

impl HttpPostApi {
    /// Create a client rooted at `base_url`. Trailing slashes are stripped.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a client reusing an existing `reqwest::Client`.
    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self) -> String {
        format!("{}/posts", self.base_url)
    }

    fn item_url(&self, id: u64) -> String {
        format!("{}/posts/{id}", self.base_url)
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<String, ApiError> {
        let response = request.send().await.map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;
        debug!(%url, status = status.as_u16(), bytes = text.len(), "posts API response");

        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate(text),
            });
        }
        Ok(text)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        url: &str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let text = self.send(url, request).await?;
        serde_json::from_str(&text).map_err(|source| ApiError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl PostApi for HttpPostApi {
    async fn fetch_posts(&self) -> Result<PostPage, ApiError> {
        let url = self.collection_url();
        let posts: Vec<Post> = self.send_json(&url, self.client.get(&url)).await?;
        Ok(PostPage::from_posts(posts))
    }

    async fn get_post(&self, id: u64) -> Result<Post, ApiError> {
        let url = self.item_url(id);
        self.send_json(&url, self.client.get(&url)).await
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<Post, ApiError> {
        let url = self.collection_url();
        self.send_json(&url, self.client.post(&url).json(draft)).await
    }

    async fn update_post(&self, id: u64, patch: &PostPatch) -> Result<Post, ApiError> {
        let url = self.item_url(id);
        self.send_json(&url, self.client.put(&url).json(patch)).await
    }

    async fn delete_post(&self, id: u64) -> Result<(), ApiError> {
        let url = self.item_url(id);
        self.send(&url, self.client.delete(&url)).await?;
        Ok(())
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("... (truncated)");
    }
    body
}
