//! # Read Assembly Layer
//!
//! Reconstructs bounded-depth nested trees and flat paginated listings
//! from the stored records. Joins are done with one batched lookup per
//! level and per entity kind, never per node. Stale denormalized ids
//! (a deleted thread still listed somewhere) drop out silently.

use std::collections::HashMap;

use tw_core::error::{AppError, Result};
use tw_core::models::{
    AuthorView, CommunityView, Page, SortOrder, Thread, ThreadNode, User, UserPosts,
};
use uuid::Uuid;

use crate::ThreadService;

impl ThreadService {
    /// The main feed: root threads only, newest first, each with author
    /// and community joined plus one level of replies with their authors.
    ///
    /// `has_next` comes from a separate count query over the same filter;
    /// it can drift from the page under concurrent mutation, which is
    /// accepted.
    pub async fn fetch_feed(&self, page_number: u64, page_size: u64) -> Result<Page<ThreadNode>> {
        validate_page(page_number, page_size)?;
        let skip = (page_number - 1) * page_size;

        let total = self.threads.count_roots().await.map_err(AppError::store)?;
        let roots = self
            .threads
            .find_roots(skip, page_size)
            .await
            .map_err(AppError::store)?;
        let returned = roots.len() as u64;

        let items = self.assemble(roots, 1, true).await?;
        Ok(Page {
            items,
            has_next: total > skip + returned,
        })
    }

    /// A user's profile posts: their `threads` set joined to full thread
    /// records, each with community and one level of replies joined.
    pub async fn fetch_user_posts(&self, user_id: &str) -> Result<UserPosts> {
        let user = self.fetch_user(user_id).await?;

        let found = self
            .threads
            .find_by_ids(&user.threads)
            .await
            .map_err(AppError::store)?;
        // Restore the set's order; ids that no longer resolve drop out.
        let mut by_id: HashMap<Uuid, Thread> = found.into_iter().map(|t| (t.id, t)).collect();
        let ordered: Vec<Thread> = user
            .threads
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();

        let threads = self.assemble(ordered, 1, true).await?;
        Ok(UserPosts { user, threads })
    }

    /// Paginated user directory: everyone but `exclude_user_id`, optionally
    /// narrowed by a case-insensitive substring match on username or name,
    /// ordered by creation time.
    pub async fn search_users(
        &self,
        exclude_user_id: &str,
        search_string: &str,
        page_number: u64,
        page_size: u64,
        sort: SortOrder,
    ) -> Result<Page<User>> {
        validate_page(page_number, page_size)?;
        let skip = (page_number - 1) * page_size;

        let needle = search_string.trim();
        let filter = (!needle.is_empty()).then_some(needle);

        let total = self
            .users
            .count_matching(exclude_user_id, filter)
            .await
            .map_err(AppError::store)?;
        let items = self
            .users
            .search(exclude_user_id, filter, sort, skip, page_size)
            .await
            .map_err(AppError::store)?;
        let returned = items.len() as u64;

        Ok(Page {
            items,
            has_next: total > skip + returned,
        })
    }

    /// Replies other people left on the user's threads: the union of all
    /// children of threads the user authored, minus the user's own
    /// replies, with authors joined. Unpaginated.
    pub async fn get_activity(&self, user_id: &str) -> Result<Vec<ThreadNode>> {
        let authored = self
            .threads
            .find_by_author(user_id)
            .await
            .map_err(AppError::store)?;

        let child_ids: Vec<Uuid> = authored
            .iter()
            .flat_map(|t| t.children.iter().copied())
            .collect();
        if child_ids.is_empty() {
            return Ok(Vec::new());
        }

        let replies: Vec<Thread> = self
            .threads
            .find_by_ids(&child_ids)
            .await
            .map_err(AppError::store)?
            .into_iter()
            .filter(|t| t.author != user_id)
            .collect();

        self.assemble(replies, 0, false).await
    }

    /// Materializes `threads` into [`ThreadNode`]s, descending `depth`
    /// levels of replies below each input thread.
    ///
    /// One children fetch per level, then one batched author lookup across
    /// all levels and (for the top level, when asked) one community
    /// lookup. Children are ordered by the owning thread's `children`
    /// array; a child the array lists but the fetch did not return is
    /// skipped.
    pub(crate) async fn assemble(
        &self,
        threads: Vec<Thread>,
        depth: usize,
        join_communities: bool,
    ) -> Result<Vec<ThreadNode>> {
        if threads.is_empty() {
            return Ok(Vec::new());
        }

        let top_order: Vec<Uuid> = threads.iter().map(|t| t.id).collect();

        let mut levels: Vec<Vec<Thread>> = vec![threads];
        let mut frontier = top_order.clone();
        for _ in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let level = self
                .threads
                .find_children_of(&frontier)
                .await
                .map_err(AppError::store)?;
            frontier = level.iter().map(|t| t.id).collect();
            levels.push(level);
        }

        let mut author_ids: Vec<String> = levels
            .iter()
            .flatten()
            .map(|t| t.author.clone())
            .collect();
        author_ids.sort();
        author_ids.dedup();
        let authors: HashMap<String, AuthorView> = self
            .users
            .find_by_ids(&author_ids)
            .await
            .map_err(AppError::store)?
            .iter()
            .map(|u| (u.external_id.clone(), AuthorView::from(u)))
            .collect();

        let mut communities: HashMap<String, CommunityView> = HashMap::new();
        if join_communities {
            let mut community_ids: Vec<String> = levels
                .first()
                .into_iter()
                .flatten()
                .filter_map(|t| t.community.clone())
                .collect();
            community_ids.sort();
            community_ids.dedup();
            if !community_ids.is_empty() {
                communities = self
                    .communities
                    .find_by_ids(&community_ids)
                    .await
                    .map_err(AppError::store)?
                    .iter()
                    .map(|c| (c.external_id.clone(), CommunityView::from(c)))
                    .collect();
            }
        }

        // Build bottom-up so every node's children already exist when the
        // node itself is assembled.
        let mut built: HashMap<Uuid, ThreadNode> = HashMap::new();
        while let Some(level) = levels.pop() {
            let is_top = levels.is_empty();
            for thread in level {
                let children = thread
                    .children
                    .iter()
                    .filter_map(|id| built.remove(id))
                    .collect();
                let community = if is_top {
                    thread
                        .community
                        .as_ref()
                        .and_then(|id| communities.get(id).cloned())
                } else {
                    None
                };
                let node = ThreadNode {
                    author: authors.get(&thread.author).cloned(),
                    community,
                    children,
                    thread,
                };
                built.insert(node.thread.id, node);
            }
        }

        Ok(top_order
            .into_iter()
            .filter_map(|id| built.remove(&id))
            .collect())
    }
}

fn validate_page(page_number: u64, page_size: u64) -> Result<()> {
    if page_number < 1 || page_size < 1 {
        return Err(AppError::Validation(
            "page number and page size must be at least 1".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tw_core::error::ErrorKind;
    use tw_core::models::SortOrder;

    use crate::test_support::{service, MockCommunities, MockThreads, MockUsers};

    #[tokio::test]
    async fn zero_page_size_is_rejected() {
        let svc = service(MockThreads::new(), MockUsers::new(), MockCommunities::new());
        let err = svc.fetch_feed(1, 0).await.expect_err("page size 0");
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = svc
            .search_users("user-1", "", 0, 20, SortOrder::Desc)
            .await
            .expect_err("page 0");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn activity_without_authored_threads_is_empty() {
        let mut threads = MockThreads::new();
        threads
            .expect_find_by_author()
            .times(1)
            .returning(|_| Ok(Vec::new()));

        let svc = service(threads, MockUsers::new(), MockCommunities::new());
        let activity = svc.get_activity("user-1").await.expect("activity");
        assert!(activity.is_empty());
    }
}
