//! # Cascade Delete Engine
//!
//! Subtree discovery and the multi-step delete: bulk-remove every thread
//! in the subtree, then prune the deleted ids out of every user and
//! community `threads` set they appeared in. The bulk delete is the
//! durable commit point; pruning after it is best-effort and a failure
//! there leaves dangling ids that read paths skip.

use std::collections::BTreeSet;

use tw_core::error::{AppError, Result};
use tw_core::models::Thread;
use uuid::Uuid;

use crate::ThreadService;

impl ThreadService {
    /// Collects every descendant of `root_id`, excluding the root itself.
    ///
    /// The walk is a frontier of ids with one batched fetch per tree
    /// level, bounding round-trips to the store by tree depth rather than
    /// node count. Termination relies on the forest invariant; a violated
    /// invariant can produce duplicates, which callers must not rule out.
    pub async fn collect_subtree(&self, root_id: Uuid) -> Result<Vec<Thread>> {
        let mut collected = Vec::new();
        let mut frontier = vec![root_id];
        while !frontier.is_empty() {
            let level = self
                .threads
                .find_children_of(&frontier)
                .await
                .map_err(AppError::store)?;
            frontier = level.iter().map(|t| t.id).collect();
            collected.extend(level);
        }
        Ok(collected)
    }

    /// Deletes `root_id` and its whole subtree, then prunes the deleted
    /// ids from every back-reference set they occurred in.
    pub async fn delete_thread_subtree(&self, root_id: Uuid, hint: &str) -> Result<()> {
        self.delete_subtree_inner(root_id, hint)
            .await
            .map_err(|e| AppError::operation("delete thread", e))
    }

    async fn delete_subtree_inner(&self, root_id: Uuid, hint: &str) -> Result<()> {
        let root = self
            .threads
            .find_by_id(root_id)
            .await
            .map_err(AppError::store)?
            .ok_or_else(|| AppError::NotFound("thread", root_id.to_string()))?;

        let descendants = self.collect_subtree(root_id).await?;

        let mut all_ids = Vec::with_capacity(descendants.len() + 1);
        all_ids.push(root.id);
        all_ids.extend(descendants.iter().map(|t| t.id));

        let mut author_ids: BTreeSet<&str> = descendants.iter().map(|t| t.author.as_str()).collect();
        author_ids.insert(root.author.as_str());
        let mut community_ids: BTreeSet<&str> = descendants
            .iter()
            .filter_map(|t| t.community.as_deref())
            .collect();
        if let Some(cid) = root.community.as_deref() {
            community_ids.insert(cid);
        }

        let removed = self
            .threads
            .delete_many(&all_ids)
            .await
            .map_err(AppError::store)?;
        tracing::info!(root = %root_id, removed, "deleted thread subtree");

        let author_ids: Vec<String> = author_ids.into_iter().map(str::to_owned).collect();
        let community_ids: Vec<String> = community_ids.into_iter().map(str::to_owned).collect();

        // Users and communities are disjoint collections, so the two
        // prunes can run at the same time.
        tokio::try_join!(
            self.users.pull_threads(&author_ids, &all_ids),
            self.communities.pull_threads(&community_ids, &all_ids),
        )
        .map_err(AppError::store)?;

        self.revalidator
            .revalidate(hint)
            .await
            .map_err(AppError::store)?;
        Ok(())
    }
}
