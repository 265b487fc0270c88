//! Shared domain models.

use serde::{Deserialize, Serialize};

/// A post as served by the remote API or held in the local overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Server-assigned id, or a locally allocated id above the server range.
    pub id: u64,
    /// Post title. Partial update echoes may omit it.
    #[serde(default)]
    pub title: String,
    /// Post content.
    #[serde(default)]
    pub body: String,
    /// Author id, when the server supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    /// Set on overlay entries for posts deleted during this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    /// Set on records that only exist in the local overlay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_new: Option<bool>,
}

impl Post {
    /// Whether the record is marked deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted.unwrap_or(false)
    }

    /// Whether the record exists only locally.
    pub fn is_local(&self) -> bool {
        self.is_new.unwrap_or(false)
    }

    /// Copy of this post with the draft's fields applied.
    pub fn merged_with(&self, draft: &PostDraft) -> Self {
        Self {
            title: draft.title.clone(),
            body: draft.body.clone(),
            user_id: draft.user_id.or(self.user_id),
            ..self.clone()
        }
    }
}

/// Create payload: a post without an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDraft {
    /// Post title.
    pub title: String,
    /// Post content.
    pub body: String,
    /// Optional author id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
}

/// Update payload. Omitted fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPatch {
    /// Record id, echoed back by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// New author id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
}

impl From<&Post> for PostPatch {
    fn from(post: &Post) -> Self {
        Self {
            id: Some(post.id),
            title: Some(post.title.clone()),
            body: Some(post.body.clone()),
            user_id: post.user_id,
        }
    }
}

/// A fetched collection with its total count.
///
/// The upstream API has no real total, so `total` is always the length of
/// `posts` when produced by a fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostPage {
    /// Records in server order.
    pub posts: Vec<Post>,
    /// Number of records.
    pub total: usize,
}

impl PostPage {
    /// Wrap a full fetch result.
    pub fn from_posts(posts: Vec<Post>) -> Self {
        let total = posts.len();
        Self { posts, total }
    }
}
