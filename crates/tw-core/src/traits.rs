//! # Store Ports
//!
//! The document-store primitives the service layer runs on, typed per
//! entity. Any backend must provide these; the shipped implementation
//! lives in `tw-store-sqlite`. All methods return `anyhow::Result`; the
//! service layer owns the mapping into typed `AppError`s.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Community, CommunityProfile, SortOrder, Thread, User, UserProfile};

/// Persistence contract for the thread graph itself.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn insert(&self, thread: &Thread) -> anyhow::Result<()>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Thread>>;

    /// Batched point lookup. Ids that do not resolve are simply absent
    /// from the result; order is unspecified.
    async fn find_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Thread>>;

    /// Every thread whose `parent_id` is in `parents`. The subtree walk
    /// issues one of these per tree level.
    async fn find_children_of(&self, parents: &[Uuid]) -> anyhow::Result<Vec<Thread>>;

    /// Root threads only, newest first.
    async fn find_roots(&self, skip: u64, limit: u64) -> anyhow::Result<Vec<Thread>>;

    async fn count_roots(&self) -> anyhow::Result<u64>;

    async fn find_by_author(&self, author_id: &str) -> anyhow::Result<Vec<Thread>>;

    /// Atomic append of `child_id` to the parent's `children` array.
    /// Concurrent appenders must not lose writes.
    async fn push_child(&self, parent_id: Uuid, child_id: Uuid) -> anyhow::Result<()>;

    /// Bulk delete by id set. Returns the number of records removed.
    async fn delete_many(&self, ids: &[Uuid]) -> anyhow::Result<u64>;
}

/// Persistence contract for user profiles and their denormalized sets.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, external_id: &str) -> anyhow::Result<Option<User>>;

    async fn find_by_ids(&self, external_ids: &[String]) -> anyhow::Result<Vec<User>>;

    /// Create-or-update keyed on `external_id`. Must not disturb the
    /// denormalized sets or `created_at` of an existing record.
    async fn upsert(&self, profile: &UserProfile) -> anyhow::Result<()>;

    /// Users other than `exclude_id`, optionally narrowed to a
    /// case-insensitive substring match on username or display name,
    /// sorted by creation time.
    async fn search(
        &self,
        exclude_id: &str,
        filter: Option<&str>,
        sort: SortOrder,
        skip: u64,
        limit: u64,
    ) -> anyhow::Result<Vec<User>>;

    async fn count_matching(&self, exclude_id: &str, filter: Option<&str>) -> anyhow::Result<u64>;

    /// Atomic add of a thread id to one user's `threads` set. A missing
    /// user is a silent no-op.
    async fn push_thread(&self, external_id: &str, thread_id: Uuid) -> anyhow::Result<()>;

    /// Atomic removal of every id in `thread_ids` from the `threads` set
    /// of every listed user.
    async fn pull_threads(&self, external_ids: &[String], thread_ids: &[Uuid]) -> anyhow::Result<()>;
}

/// Persistence contract for communities.
#[async_trait]
pub trait CommunityStore: Send + Sync {
    async fn find_by_id(&self, external_id: &str) -> anyhow::Result<Option<Community>>;

    async fn find_by_ids(&self, external_ids: &[String]) -> anyhow::Result<Vec<Community>>;

    async fn upsert(&self, profile: &CommunityProfile) -> anyhow::Result<()>;

    async fn push_thread(&self, external_id: &str, thread_id: Uuid) -> anyhow::Result<()>;

    async fn pull_threads(&self, external_ids: &[String], thread_ids: &[Uuid]) -> anyhow::Result<()>;
}

/// Downstream cache-invalidation collaborator.
///
/// The hint is opaque to this core: it is forwarded after a successful
/// mutation and never interpreted. The real implementation belongs to
/// the presentation layer.
#[async_trait]
pub trait Revalidator: Send + Sync {
    async fn revalidate(&self, hint: &str) -> anyhow::Result<()>;
}
