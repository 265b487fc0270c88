//! Reconciliation state behind the posts table.
//!
//! Every transition is split in two. A `begin_*` call inspects the intent and
//! either applies it locally ([`Step::Done`]) or flags the table as loading
//! and hands back a [`PendingCall`]. The caller runs the call against a
//! [`PostApi`] wherever it likes and feeds the [`Completion`] to
//! [`PostsTable::resolve`]. State only moves once a call has succeeded.

use tracing::{error, info, warn};

use crate::{
    api::{ApiError, PostApi},
    models::{Post, PostDraft, PostPage, PostPatch},
    overlay::{reconcile, LocalIds, Overlay},
};

/// Rows per page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

const UPDATED: &str = "Post updated successfully";
const CREATED: &str = "Post created successfully";
const DELETED: &str = "Post deleted successfully";
const UPDATE_FAILED: &str = "Failed to update post";
const CREATE_FAILED: &str = "Failed to create post";
const DELETE_FAILED: &str = "Failed to delete post";
const FETCH_FAILED: &str = "Failed to fetch posts";

/// Severity of a [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// The operation went through.
    Success,
    /// The operation failed and state was left alone.
    Error,
}

/// User-facing outcome of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Message to display.
    pub message: String,
}

impl Notice {
    fn success(message: &str) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.to_string(),
        }
    }

    fn error(message: &str) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.to_string(),
        }
    }

    /// Whether this notice reports a failure.
    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

/// A server call the table is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingCall {
    /// `PUT` the merged record for a server-origin post.
    Update {
        /// Record as it was before the edit.
        original: Post,
        /// Record with the submitted values applied.
        merged: Post,
    },
    /// `POST` a new record.
    Create {
        /// Submitted values.
        draft: PostDraft,
    },
    /// `DELETE` a server-origin post.
    Delete {
        /// Record being deleted.
        post: Post,
    },
    /// `GET` the collection and show `page`.
    Fetch {
        /// Requested 1-based page.
        page: usize,
    },
}

impl PendingCall {
    /// Perform the call. Errors are captured in the completion.
    pub async fn run(self, api: &dyn PostApi) -> Completion {
        match self {
            PendingCall::Update { original, merged } => {
                let result = api.update_post(original.id, &PostPatch::from(&merged)).await;
                Completion::Updated {
                    original,
                    merged,
                    result,
                }
            }
            PendingCall::Create { draft } => Completion::Created {
                result: api.create_post(&draft).await,
            },
            PendingCall::Delete { post } => {
                let result = api.delete_post(post.id).await;
                Completion::Deleted { post, result }
            }
            PendingCall::Fetch { page } => Completion::Fetched {
                page,
                result: api.fetch_posts().await,
            },
        }
    }
}

/// A finished [`PendingCall`] together with its result.
#[derive(Debug)]
pub enum Completion {
    /// Result of [`PendingCall::Update`].
    Updated {
        /// Record as it was before the edit.
        original: Post,
        /// Record with the submitted values applied.
        merged: Post,
        /// Server echo.
        result: Result<Post, ApiError>,
    },
    /// Result of [`PendingCall::Create`].
    Created {
        /// Server-created record.
        result: Result<Post, ApiError>,
    },
    /// Result of [`PendingCall::Delete`].
    Deleted {
        /// Record targeted by the delete.
        post: Post,
        /// Empty on success.
        result: Result<(), ApiError>,
    },
    /// Result of [`PendingCall::Fetch`].
    Fetched {
        /// Requested 1-based page.
        page: usize,
        /// Fresh collection.
        result: Result<PostPage, ApiError>,
    },
}

/// What a `begin_*` call decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Handled without the server.
    Done(Notice),
    /// Needs a server round-trip.
    Call(PendingCall),
}

/// Visible list, pagination and overlay for one table instance.
#[derive(Debug, Clone)]
pub struct PostsTable {
    posts: Vec<Post>,
    total: usize,
    current_page: usize,
    loading: bool,
    overlay: Overlay,
    ids: LocalIds,
    page_size: usize,
}

impl PostsTable {
    /// Seed the table from the initial fetch.
    ///
    /// The largest id in `initial` bounds the server id range for the rest
    /// of the session.
    pub fn new(initial: PostPage, page_size: usize) -> Self {
        let max_server_id = initial.posts.iter().map(|post| post.id).max().unwrap_or(0);
        Self {
            posts: initial.posts,
            total: initial.total,
            current_page: 1,
            loading: false,
            overlay: Overlay::new(),
            ids: LocalIds::new(max_server_id),
            page_size: page_size.max(1),
        }
    }

    /// Every visible record, across all pages.
    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    /// Total record count driving the pager.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Current 1-based page.
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// Rows per page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages implied by the total, at least one.
    pub fn page_count(&self) -> usize {
        self.total.div_ceil(self.page_size).max(1)
    }

    /// Whether a request is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Local overlay.
    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// Largest id of the initial fetch.
    pub fn max_server_id(&self) -> u64 {
        self.ids.max_server_id()
    }

    /// Whether `id` belongs to a record created in this session.
    pub fn is_local_id(&self, id: u64) -> bool {
        self.ids.is_local(id)
    }

    /// Visible record with the given id.
    pub fn find(&self, id: u64) -> Option<&Post> {
        self.posts.iter().find(|post| post.id == id)
    }

    /// Rows on the current page.
    pub fn page_rows(&self) -> &[Post] {
        let start = (self.current_page - 1)
            .saturating_mul(self.page_size)
            .min(self.posts.len());
        let end = start.saturating_add(self.page_size).min(self.posts.len());
        &self.posts[start..end]
    }

    /// Submit edited values for record `id`.
    ///
    /// Local records are updated in the overlay right away; server records
    /// need an update call.
    pub fn begin_edit(&mut self, id: u64, values: PostDraft) -> Step {
        let Some(original) = self.find(id).cloned() else {
            warn!(id, "edit requested for unknown post");
            return Step::Done(Notice::error(UPDATE_FAILED));
        };
        let merged = original.merged_with(&values);

        if self.ids.is_local(id) {
            let entry = Post {
                is_new: Some(true),
                ..merged
            };
            self.overlay.insert(entry.clone());
            self.replace_visible(id, entry);
            info!(id, "local post updated");
            return Step::Done(Notice::success(UPDATED));
        }

        self.loading = true;
        Step::Call(PendingCall::Update { original, merged })
    }

    /// Submit a new record.
    pub fn begin_create(&mut self, draft: PostDraft) -> PendingCall {
        self.loading = true;
        PendingCall::Create { draft }
    }

    /// Delete record `id`.
    ///
    /// Local records are dropped right away; server records need a delete
    /// call and are only removed once it succeeds.
    pub fn begin_delete(&mut self, id: u64) -> Step {
        let Some(post) = self.find(id).cloned() else {
            warn!(id, "delete requested for unknown post");
            return Step::Done(Notice::error(DELETE_FAILED));
        };

        if self.ids.is_local(id) {
            self.overlay.remove(id);
            self.remove_visible(id);
            info!(id, total = self.total, "local post deleted");
            return Step::Done(Notice::success(DELETED));
        }

        self.loading = true;
        Step::Call(PendingCall::Delete { post })
    }

    /// Refetch and move to `page`, clamped to the pager's range.
    pub fn begin_page(&mut self, page: usize) -> PendingCall {
        self.loading = true;
        PendingCall::Fetch {
            page: page.clamp(1, self.page_count()),
        }
    }

    /// Apply a finished call and clear the loading flag.
    ///
    /// Returns the notice to show; a successful fetch has none.
    pub fn resolve(&mut self, completion: Completion) -> Option<Notice> {
        self.loading = false;
        let notice = match completion {
            Completion::Updated {
                original,
                merged,
                result,
            } => match result {
                Ok(echoed) => {
                    info!(id = original.id, echoed_id = echoed.id, "post updated");
                    self.overlay.insert(echoed);
                    self.replace_visible(original.id, merged);
                    Notice::success(UPDATED)
                }
                Err(err) => {
                    error!(id = original.id, error = %err, "{UPDATE_FAILED}");
                    Notice::error(UPDATE_FAILED)
                }
            },
            Completion::Created { result } => match result {
                Ok(created) => {
                    let server_id = created.id;
                    let id = self.ids.next_id();
                    let entry = Post {
                        id,
                        deleted: None,
                        is_new: Some(true),
                        ..created
                    };
                    self.overlay.insert(entry.clone());
                    self.posts.push(entry);
                    self.total += 1;
                    self.current_page = self.page_count();
                    info!(server_id, id, total = self.total, "post created");
                    Notice::success(CREATED)
                }
                Err(err) => {
                    error!(error = %err, "{CREATE_FAILED}");
                    Notice::error(CREATE_FAILED)
                }
            },
            Completion::Deleted { post, result } => match result {
                Ok(()) => {
                    self.overlay.mark_deleted(&post);
                    self.remove_visible(post.id);
                    info!(id = post.id, total = self.total, "post deleted");
                    Notice::success(DELETED)
                }
                Err(err) => {
                    error!(id = post.id, error = %err, "{DELETE_FAILED}");
                    Notice::error(DELETE_FAILED)
                }
            },
            Completion::Fetched { page, result } => match result {
                Ok(fetched) => {
                    let merged = reconcile(fetched.posts, &self.overlay);
                    if !merged.collisions.is_empty() {
                        warn!(
                            ids = ?merged.collisions,
                            "server returned ids inside the local range"
                        );
                    }
                    self.posts = merged.posts;
                    self.current_page = page;
                    info!(page, rows = self.posts.len(), "page loaded");
                    return None;
                }
                Err(err) => {
                    error!(page, error = %err, "{FETCH_FAILED}");
                    Notice::error(FETCH_FAILED)
                }
            },
        };
        Some(notice)
    }

    /// Run a [`Step`] to completion against `api`.
    pub async fn dispatch(&mut self, api: &dyn PostApi, step: Step) -> Option<Notice> {
        match step {
            Step::Done(notice) => Some(notice),
            Step::Call(call) => {
                let completion = call.run(api).await;
                self.resolve(completion)
            }
        }
    }

    /// Edit, awaiting any server call inline.
    pub async fn edit(
        &mut self,
        api: &dyn PostApi,
        id: u64,
        values: PostDraft,
    ) -> Option<Notice> {
        let step = self.begin_edit(id, values);
        self.dispatch(api, step).await
    }

    /// Create, awaiting the server call inline.
    pub async fn create(&mut self, api: &dyn PostApi, draft: PostDraft) -> Option<Notice> {
        let call = self.begin_create(draft);
        self.dispatch(api, Step::Call(call)).await
    }

    /// Delete, awaiting any server call inline.
    pub async fn delete(&mut self, api: &dyn PostApi, id: u64) -> Option<Notice> {
        let step = self.begin_delete(id);
        self.dispatch(api, step).await
    }

    /// Change page, awaiting the fetch inline.
    pub async fn change_page(&mut self, api: &dyn PostApi, page: usize) -> Option<Notice> {
        let call = self.begin_page(page);
        self.dispatch(api, Step::Call(call)).await
    }

    fn replace_visible(&mut self, id: u64, post: Post) {
        if let Some(slot) = self.posts.iter_mut().find(|row| row.id == id) {
            *slot = post;
        }
    }

    fn remove_visible(&mut self, id: u64) {
        self.posts.retain(|post| post.id != id);
        self.total = self.total.saturating_sub(1);
        self.current_page = self.current_page.min(self.page_count());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;

    /// Non-persistent backend: every fetch returns the same seed.
    struct ForgetfulApi {
        seed: Vec<Post>,
        failing: Mutex<HashSet<&'static str>>,
        calls: Mutex<Vec<String>>,
    }

    impl ForgetfulApi {
        fn with_ids(ids: impl IntoIterator<Item = u64>) -> Self {
            Self {
                seed: ids.into_iter().map(server_post).collect(),
                failing: Mutex::new(HashSet::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn fail(&self, op: &'static str) {
            self.failing.lock().insert(op);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn record(&self, op: &'static str, detail: String) -> Result<(), ApiError> {
            self.calls.lock().push(format!("{op} {detail}").trim().to_string());
            if self.failing.lock().contains(op) {
                return Err(ApiError::Status {
                    url: format!("memory://posts/{op}"),
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PostApi for ForgetfulApi {
        async fn fetch_posts(&self) -> Result<PostPage, ApiError> {
            self.record("fetch", String::new())?;
            Ok(PostPage::from_posts(self.seed.clone()))
        }

        async fn get_post(&self, id: u64) -> Result<Post, ApiError> {
            self.record("get", id.to_string())?;
            Ok(server_post(id))
        }

        async fn create_post(&self, draft: &PostDraft) -> Result<Post, ApiError> {
            self.record("create", draft.title.clone())?;
            Ok(Post {
                id: self.seed.len() as u64 + 1,
                title: draft.title.clone(),
                body: draft.body.clone(),
                user_id: draft.user_id,
                deleted: None,
                is_new: None,
            })
        }

        async fn update_post(&self, id: u64, patch: &PostPatch) -> Result<Post, ApiError> {
            self.record("update", id.to_string())?;
            Ok(Post {
                id,
                title: patch.title.clone().unwrap_or_default(),
                body: patch.body.clone().unwrap_or_default(),
                user_id: patch.user_id,
                deleted: None,
                is_new: None,
            })
        }

        async fn delete_post(&self, id: u64) -> Result<(), ApiError> {
            self.record("delete", id.to_string())
        }
    }

    fn server_post(id: u64) -> Post {
        Post {
            id,
            title: format!("post {id}"),
            body: format!("body {id}"),
            user_id: Some(1),
            deleted: None,
            is_new: None,
        }
    }

    fn draft(title: &str) -> PostDraft {
        PostDraft {
            title: title.to_string(),
            body: format!("{title} body"),
            user_id: None,
        }
    }

    fn ids(posts: &[Post]) -> Vec<u64> {
        posts.iter().map(|post| post.id).collect()
    }

    fn table_for(api: &ForgetfulApi) -> PostsTable {
        PostsTable::new(PostPage::from_posts(api.seed.clone()), DEFAULT_PAGE_SIZE)
    }

    #[tokio::test]
    async fn walkthrough_create_edit_delete_refetch() {
        let api = ForgetfulApi::with_ids(1..=3);
        let mut table = table_for(&api);
        assert_eq!(table.max_server_id(), 3);
        assert_eq!(table.total(), 3);

        let notice = table.create(&api, draft("fresh")).await.unwrap();
        assert_eq!(notice.message, "Post created successfully");
        assert_eq!(ids(table.posts()), vec![1, 2, 3, 4]);
        assert_eq!(table.total(), 4);
        assert_eq!(table.current_page(), 1);
        assert!(table.overlay().get(4).is_some_and(Post::is_local));

        let notice = table.edit(&api, 4, draft("renamed")).await.unwrap();
        assert!(!notice.is_error());
        let entry = table.overlay().get(4).unwrap();
        assert_eq!(entry.title, "renamed");
        assert!(entry.is_local());
        assert_eq!(table.find(4).unwrap().title, "renamed");

        let notice = table.delete(&api, 2).await.unwrap();
        assert_eq!(notice.message, "Post deleted successfully");
        assert!(table.overlay().get(2).is_some_and(Post::is_deleted));
        assert_eq!(ids(table.posts()), vec![1, 3, 4]);
        assert_eq!(table.total(), 3);

        assert!(table.change_page(&api, 1).await.is_none());
        assert_eq!(ids(table.posts()), vec![1, 3, 4]);
        assert_eq!(table.find(4).unwrap().title, "renamed");

        // The local edit never reached the server.
        assert_eq!(api.calls(), vec!["create fresh", "delete 2", "fetch"]);
    }

    #[tokio::test]
    async fn created_ids_strictly_increase() {
        let api = ForgetfulApi::with_ids(1..=5);
        let mut table = table_for(&api);
        let mut last = table.max_server_id();
        for round in 0..4 {
            table.create(&api, draft(&format!("new {round}"))).await;
            let id = table.posts().last().unwrap().id;
            assert!(id > last);
            last = id;
            if round == 1 {
                // Dropping a local record must not free its id for reuse.
                table.delete(&api, 6).await;
            }
        }
        assert_eq!(ids(&table.posts()[5..]), vec![7, 8, 9]);
    }

    #[tokio::test]
    async fn counts_track_creates_and_deletes() {
        let api = ForgetfulApi::with_ids(1..=12);
        let mut table = table_for(&api);
        for title in ["a", "b", "c"] {
            table.create(&api, draft(title)).await;
        }
        for id in [1, 13, 7] {
            assert!(!table.delete(&api, id).await.unwrap().is_error());
        }
        assert_eq!(table.total(), 12 + 3 - 3);
        assert_eq!(table.posts().len(), table.total());
    }

    #[tokio::test]
    async fn create_jumps_to_last_page() {
        let api = ForgetfulApi::with_ids(1..=10);
        let mut table = table_for(&api);
        assert_eq!(table.page_count(), 1);

        table.create(&api, draft("eleventh")).await;
        assert_eq!(table.total(), 11);
        assert_eq!(table.current_page(), 2);
        assert_eq!(ids(table.page_rows()), vec![11]);
    }

    #[tokio::test]
    async fn deleted_server_post_stays_hidden_after_refetch() {
        let api = ForgetfulApi::with_ids(1..=15);
        let mut table = table_for(&api);
        table.delete(&api, 12).await;

        table.change_page(&api, 2).await;
        assert_eq!(table.current_page(), 2);
        assert!(table.find(12).is_none());
        assert_eq!(ids(table.page_rows()), vec![11, 13, 14, 15]);
    }

    #[tokio::test]
    async fn deleted_local_post_leaves_no_trace() {
        let api = ForgetfulApi::with_ids(1..=3);
        let mut table = table_for(&api);
        table.create(&api, draft("temp")).await;

        let notice = table.delete(&api, 4).await.unwrap();
        assert!(!notice.is_error());
        assert!(!table.overlay().contains(4));
        assert!(table.find(4).is_none());

        table.change_page(&api, 1).await;
        assert_eq!(ids(table.posts()), vec![1, 2, 3]);
        assert!(!api.calls().iter().any(|call| call == "delete 4"));
    }

    #[tokio::test]
    async fn colliding_server_row_does_not_skew_total() {
        let api = ForgetfulApi::with_ids(1..=3);
        let mut table = table_for(&api);
        table.create(&api, draft("mine")).await;
        assert_eq!(table.total(), 4);

        // The server has since handed out id 4 to someone else.
        let call = table.begin_page(1);
        let PendingCall::Fetch { page } = call else {
            panic!("page change should fetch");
        };
        let grown = PostPage::from_posts((1..=4).map(server_post).collect());
        assert!(table
            .resolve(Completion::Fetched {
                page,
                result: Ok(grown),
            })
            .is_none());

        assert_eq!(ids(table.posts()), vec![1, 2, 3, 4]);
        assert_eq!(table.find(4).unwrap().title, "mine");
        assert_eq!(table.posts().len(), table.total());
    }

    #[tokio::test]
    async fn failed_delete_keeps_row_and_total() {
        let api = ForgetfulApi::with_ids(1..=3);
        api.fail("delete");
        let mut table = table_for(&api);

        let notice = table.delete(&api, 2).await.unwrap();
        assert_eq!(notice.message, "Failed to delete post");
        assert!(notice.is_error());
        assert_eq!(ids(table.posts()), vec![1, 2, 3]);
        assert_eq!(table.total(), 3);
        assert!(table.overlay().is_empty());
        assert!(!table.is_loading());
    }

    #[tokio::test]
    async fn failed_create_changes_nothing() {
        let api = ForgetfulApi::with_ids(1..=3);
        api.fail("create");
        let mut table = table_for(&api);

        let notice = table.create(&api, draft("nope")).await.unwrap();
        assert_eq!(notice.message, "Failed to create post");
        assert_eq!(table.total(), 3);
        assert!(table.overlay().is_empty());

        // A failed create does not consume a local id.
        let api = ForgetfulApi::with_ids(1..=3);
        table.create(&api, draft("yes")).await;
        assert_eq!(table.posts().last().unwrap().id, 4);
    }

    #[tokio::test]
    async fn server_edit_stores_echo_in_overlay() {
        let api = ForgetfulApi::with_ids(1..=3);
        let mut table = table_for(&api);

        let step = table.begin_edit(2, draft("changed"));
        assert!(table.is_loading());
        let Step::Call(call) = step else {
            panic!("server edit should need a call");
        };
        let notice = table.resolve(call.run(&api).await).unwrap();
        assert_eq!(notice.message, "Post updated successfully");
        assert!(!table.is_loading());
        assert_eq!(table.find(2).unwrap().title, "changed");
        assert_eq!(table.overlay().get(2).unwrap().title, "changed");

        table.change_page(&api, 1).await;
        assert_eq!(table.find(2).unwrap().title, "changed");
    }

    #[tokio::test]
    async fn failed_edit_and_fetch_leave_state() {
        let api = ForgetfulApi::with_ids(1..=3);
        api.fail("update");
        api.fail("fetch");
        let mut table = table_for(&api);

        let notice = table.edit(&api, 1, draft("lost")).await.unwrap();
        assert_eq!(notice.message, "Failed to update post");
        assert_eq!(table.find(1).unwrap().title, "post 1");

        let notice = table.change_page(&api, 1).await.unwrap();
        assert_eq!(notice.message, "Failed to fetch posts");
        assert_eq!(ids(table.posts()), vec![1, 2, 3]);
        assert!(!table.is_loading());
    }

    #[test]
    fn unknown_ids_are_rejected_locally() {
        let mut table = PostsTable::new(PostPage::from_posts(vec![server_post(1)]), 10);
        assert!(matches!(
            table.begin_delete(9),
            Step::Done(notice) if notice.is_error()
        ));
        assert!(matches!(
            table.begin_edit(9, draft("x")),
            Step::Done(notice) if notice.is_error()
        ));
        assert!(!table.is_loading());
    }

    #[test]
    fn page_requests_are_clamped() {
        let posts = (1..=25).map(server_post).collect();
        let mut table = PostsTable::new(PostPage::from_posts(posts), 10);
        assert_eq!(table.page_count(), 3);
        assert_eq!(table.begin_page(0), PendingCall::Fetch { page: 1 });
        assert_eq!(table.begin_page(7), PendingCall::Fetch { page: 3 });
    }

    #[test]
    fn empty_initial_fetch_starts_local_ids_at_one() {
        let table = PostsTable::new(PostPage::default(), 0);
        assert_eq!(table.max_server_id(), 0);
        assert_eq!(table.page_size(), 1);
        assert_eq!(table.page_count(), 1);
        assert!(table.page_rows().is_empty());
        assert!(table.is_local_id(1));
    }

    #[tokio::test]
    async fn deleting_last_row_of_last_page_moves_back() {
        let api = ForgetfulApi::with_ids(1..=11);
        let mut table = table_for(&api);
        table.change_page(&api, 2).await;
        assert_eq!(ids(table.page_rows()), vec![11]);

        table.delete(&api, 11).await;
        assert_eq!(table.current_page(), 1);
        assert_eq!(table.page_rows().len(), 10);
    }
}
