//! # tw-services
//!
//! Orchestration of the threaded content store over the `tw-core` ports:
//! thread tree operations, the cascade delete engine, the read assembly
//! layer, and identity record upkeep. Every public operation here is one
//! logical request; multi-step mutations abort on the first failing step
//! without rolling back what already committed.

pub mod assembly;
pub mod cascade;
pub mod identity;
pub mod threads;

use async_trait::async_trait;
use tw_core::traits::{CommunityStore, Revalidator, ThreadStore, UserStore};

/// All store ports behind one service handle.
///
/// The ports are boxed trait objects so backends can be swapped without
/// touching this crate (the shipped backend is `tw-store-sqlite`).
pub struct ThreadService {
    pub(crate) threads: Box<dyn ThreadStore>,
    pub(crate) users: Box<dyn UserStore>,
    pub(crate) communities: Box<dyn CommunityStore>,
    pub(crate) revalidator: Box<dyn Revalidator>,
}

impl ThreadService {
    pub fn new(
        threads: Box<dyn ThreadStore>,
        users: Box<dyn UserStore>,
        communities: Box<dyn CommunityStore>,
        revalidator: Box<dyn Revalidator>,
    ) -> Self {
        Self {
            threads,
            users,
            communities,
            revalidator,
        }
    }
}

/// Revalidator that only records the hint in the log. Stands in for the
/// presentation layer's cache invalidation in tests and the seed binary.
pub struct LogRevalidator;

#[async_trait]
impl Revalidator for LogRevalidator {
    async fn revalidate(&self, hint: &str) -> anyhow::Result<()> {
        tracing::debug!(hint, "revalidate");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use mockall::mock;
    use tw_core::models::{Community, CommunityProfile, SortOrder, Thread, User, UserProfile};
    use tw_core::traits::{CommunityStore, ThreadStore, UserStore};
    use uuid::Uuid;

    use crate::{LogRevalidator, ThreadService};

    mock! {
        pub Threads {}

        #[async_trait]
        impl ThreadStore for Threads {
            async fn insert(&self, thread: &Thread) -> anyhow::Result<()>;
            async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Thread>>;
            async fn find_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Thread>>;
            async fn find_children_of(&self, parents: &[Uuid]) -> anyhow::Result<Vec<Thread>>;
            async fn find_roots(&self, skip: u64, limit: u64) -> anyhow::Result<Vec<Thread>>;
            async fn count_roots(&self) -> anyhow::Result<u64>;
            async fn find_by_author(&self, author_id: &str) -> anyhow::Result<Vec<Thread>>;
            async fn push_child(&self, parent_id: Uuid, child_id: Uuid) -> anyhow::Result<()>;
            async fn delete_many(&self, ids: &[Uuid]) -> anyhow::Result<u64>;
        }
    }

    mock! {
        pub Users {}

        #[async_trait]
        impl UserStore for Users {
            async fn find_by_id(&self, external_id: &str) -> anyhow::Result<Option<User>>;
            async fn find_by_ids(&self, external_ids: &[String]) -> anyhow::Result<Vec<User>>;
            async fn upsert(&self, profile: &UserProfile) -> anyhow::Result<()>;
            async fn search<'a, 'b, 'c>(
                &'a self,
                exclude_id: &'b str,
                filter: Option<&'c str>,
                sort: SortOrder,
                skip: u64,
                limit: u64,
            ) -> anyhow::Result<Vec<User>>;
            async fn count_matching<'a, 'b, 'c>(&'a self, exclude_id: &'b str, filter: Option<&'c str>) -> anyhow::Result<u64>;
            async fn push_thread(&self, external_id: &str, thread_id: Uuid) -> anyhow::Result<()>;
            async fn pull_threads(&self, external_ids: &[String], thread_ids: &[Uuid]) -> anyhow::Result<()>;
        }
    }

    mock! {
        pub Communities {}

        #[async_trait]
        impl CommunityStore for Communities {
            async fn find_by_id(&self, external_id: &str) -> anyhow::Result<Option<Community>>;
            async fn find_by_ids(&self, external_ids: &[String]) -> anyhow::Result<Vec<Community>>;
            async fn upsert(&self, profile: &CommunityProfile) -> anyhow::Result<()>;
            async fn push_thread(&self, external_id: &str, thread_id: Uuid) -> anyhow::Result<()>;
            async fn pull_threads(&self, external_ids: &[String], thread_ids: &[Uuid]) -> anyhow::Result<()>;
        }
    }

    pub fn service(
        threads: MockThreads,
        users: MockUsers,
        communities: MockCommunities,
    ) -> ThreadService {
        ThreadService::new(
            Box::new(threads),
            Box::new(users),
            Box::new(communities),
            Box::new(LogRevalidator),
        )
    }

    pub fn sample_thread(parent_id: Option<Uuid>) -> Thread {
        Thread {
            id: Uuid::now_v7(),
            text: "sample".to_string(),
            author: "user-1".to_string(),
            community: None,
            parent_id,
            children: Vec::new(),
            created_at: chrono::Utc::now(),
        }
    }
}
