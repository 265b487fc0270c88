//! Local overlay of session writes and the merge onto fresh server pages.

use std::collections::BTreeMap;

use crate::models::Post;

/// Last known client-side version of every post created, updated or
/// deleted during this session, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overlay {
    entries: BTreeMap<u64, Post>,
}

impl Overlay {
    /// Empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `id`, if any.
    pub fn get(&self, id: u64) -> Option<&Post> {
        self.entries.get(&id)
    }

    /// Whether an entry exists for `id`.
    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    /// Store `post` under its own id, replacing any previous entry.
    pub fn insert(&mut self, post: Post) -> Option<Post> {
        self.entries.insert(post.id, post)
    }

    /// Drop the entry for `id`.
    pub fn remove(&mut self, id: u64) -> Option<Post> {
        self.entries.remove(&id)
    }

    /// Record a tombstone so later fetches hide the post.
    pub fn mark_deleted(&mut self, post: &Post) {
        self.insert(Post {
            deleted: Some(true),
            ..post.clone()
        });
    }

    /// Number of entries of any kind.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the overlay has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Local-only entries in ascending id order.
    pub fn local_posts(&self) -> impl Iterator<Item = &Post> {
        self.entries.values().filter(|post| post.is_local())
    }
}

/// Allocates ids for records created locally.
///
/// Ids start above the largest id of the initial fetch and only grow, so
/// every created record gets an id above all earlier ones. Counting overlay
/// entries instead (`max_server_id + overlay.len() + 1`) would hand a freed
/// id out again after a local delete, and would skip ids after server edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalIds {
    max_server_id: u64,
    last_assigned: u64,
}

impl LocalIds {
    /// Start allocating after `max_server_id`.
    pub fn new(max_server_id: u64) -> Self {
        Self {
            max_server_id,
            last_assigned: max_server_id,
        }
    }

    /// Largest id seen in the initial fetch.
    pub fn max_server_id(&self) -> u64 {
        self.max_server_id
    }

    /// Whether `id` was allocated locally rather than by the server.
    pub fn is_local(&self, id: u64) -> bool {
        id > self.max_server_id
    }

    /// Reserve the next id.
    pub fn next_id(&mut self) -> u64 {
        self.last_assigned += 1;
        self.last_assigned
    }
}

/// Output of [`reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    /// Visible records: surviving server records, then local records.
    pub posts: Vec<Post>,
    /// Server ids that clashed with a local record and were dropped.
    ///
    /// Such a row lies above the initial fetch, so the table's running total
    /// never counted it and dropping it keeps the row count and total equal.
    pub collisions: Vec<u64>,
}

/// Merge a fresh server fetch with the overlay.
///
/// Server records tombstoned in the overlay are dropped, records the overlay
/// knows are replaced by the overlay copy, and every local-only entry is
/// appended in id order. A server record sharing an id with a local entry
/// means the server id space has grown into the local range; the local entry
/// wins and the id is reported in `collisions`.
pub fn reconcile(server: Vec<Post>, overlay: &Overlay) -> Reconciled {
    let mut posts = Vec::with_capacity(server.len() + overlay.len());
    let mut collisions = Vec::new();

    for post in server {
        match overlay.get(post.id) {
            Some(entry) if entry.is_local() => collisions.push(post.id),
            Some(entry) if entry.is_deleted() => {}
            Some(entry) => posts.push(entry.clone()),
            None => posts.push(post),
        }
    }
    posts.extend(overlay.local_posts().cloned());

    Reconciled { posts, collisions }
}
