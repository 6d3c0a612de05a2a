//! # Thread Tree Operations
//!
//! Creation and linking of nodes in the reply tree, plus the single-thread
//! read path. Replies are linked through the parent's `children` list only;
//! the author's denormalized `threads` set tracks root threads alone.

use chrono::Utc;
use tw_core::error::{AppError, Result};
use tw_core::models::{Thread, ThreadNode};
use uuid::Uuid;

use crate::ThreadService;

impl ThreadService {
    /// Creates a root thread, links it into the author's (and, when one
    /// resolves, the community's) denormalized set, then forwards the
    /// invalidation hint.
    pub async fn create_root_thread(
        &self,
        text: &str,
        author_id: &str,
        community_id: Option<&str>,
        hint: &str,
    ) -> Result<Thread> {
        self.create_root_inner(text, author_id, community_id, hint)
            .await
            .map_err(|e| AppError::operation("create thread", e))
    }

    async fn create_root_inner(
        &self,
        text: &str,
        author_id: &str,
        community_id: Option<&str>,
        hint: &str,
    ) -> Result<Thread> {
        validate_text(text)?;
        validate_author(author_id)?;

        // An unresolvable community id degrades to "no community" instead
        // of failing. Documented quirk; see DESIGN.md.
        let community = match community_id {
            Some(cid) => {
                let found = self
                    .communities
                    .find_by_id(cid)
                    .await
                    .map_err(AppError::store)?;
                if found.is_none() {
                    tracing::warn!(community = cid, "community id did not resolve, posting without one");
                }
                found
            }
            None => None,
        };

        let thread = Thread {
            id: Uuid::now_v7(),
            text: text.to_owned(),
            author: author_id.to_owned(),
            community: community.as_ref().map(|c| c.external_id.clone()),
            parent_id: None,
            children: Vec::new(),
            created_at: Utc::now(),
        };

        self.threads.insert(&thread).await.map_err(AppError::store)?;
        self.users
            .push_thread(author_id, thread.id)
            .await
            .map_err(AppError::store)?;
        if let Some(community) = &community {
            self.communities
                .push_thread(&community.external_id, thread.id)
                .await
                .map_err(AppError::store)?;
        }
        self.revalidator
            .revalidate(hint)
            .await
            .map_err(AppError::store)?;

        tracing::info!(thread = %thread.id, author = author_id, "created root thread");
        Ok(thread)
    }

    /// Adds a reply under an existing thread.
    ///
    /// The reply carries no community and is not added to the author's
    /// `threads` set; it is reachable only through the parent's `children`
    /// list. That asymmetry is intentional.
    pub async fn add_reply(
        &self,
        parent_id: Uuid,
        text: &str,
        author_id: &str,
        hint: &str,
    ) -> Result<Thread> {
        self.add_reply_inner(parent_id, text, author_id, hint)
            .await
            .map_err(|e| AppError::operation("add reply", e))
    }

    async fn add_reply_inner(
        &self,
        parent_id: Uuid,
        text: &str,
        author_id: &str,
        hint: &str,
    ) -> Result<Thread> {
        validate_text(text)?;
        validate_author(author_id)?;

        let parent = self
            .threads
            .find_by_id(parent_id)
            .await
            .map_err(AppError::store)?
            .ok_or_else(|| AppError::NotFound("thread", parent_id.to_string()))?;

        let reply = Thread {
            id: Uuid::now_v7(),
            text: text.to_owned(),
            author: author_id.to_owned(),
            community: None,
            parent_id: Some(parent.id),
            children: Vec::new(),
            created_at: Utc::now(),
        };

        self.threads.insert(&reply).await.map_err(AppError::store)?;
        self.threads
            .push_child(parent.id, reply.id)
            .await
            .map_err(AppError::store)?;
        self.revalidator
            .revalidate(hint)
            .await
            .map_err(AppError::store)?;

        tracing::info!(reply = %reply.id, parent = %parent.id, "added reply");
        Ok(reply)
    }

    /// Fetches a thread as a tree of fixed depth: the thread itself, its
    /// replies, and their replies, with authors joined at every level and
    /// the community joined on the root.
    pub async fn fetch_thread_by_id(&self, id: Uuid) -> Result<ThreadNode> {
        let root = self
            .threads
            .find_by_id(id)
            .await
            .map_err(AppError::store)?
            .ok_or_else(|| AppError::NotFound("thread", id.to_string()))?;

        let mut nodes = self.assemble(vec![root], 2, true).await?;
        nodes
            .pop()
            .ok_or_else(|| AppError::NotFound("thread", id.to_string()))
    }
}

fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(AppError::Validation("thread text must not be empty".into()));
    }
    Ok(())
}

fn validate_author(author_id: &str) -> Result<()> {
    if author_id.is_empty() {
        return Err(AppError::Validation("author id must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use tw_core::error::ErrorKind;
    use uuid::Uuid;

    use crate::test_support::{sample_thread, service, MockCommunities, MockThreads, MockUsers};

    #[tokio::test]
    async fn empty_text_is_rejected_before_any_store_call() {
        // Mocks without expectations panic when called, so this also
        // proves no store traffic happens.
        let svc = service(MockThreads::new(), MockUsers::new(), MockCommunities::new());

        let err = svc
            .create_root_thread("   ", "user-1", None, "/")
            .await
            .expect_err("blank text");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn unresolved_community_degrades_to_none() {
        let mut threads = MockThreads::new();
        threads.expect_insert().times(1).returning(|_| Ok(()));
        let mut users = MockUsers::new();
        users.expect_push_thread().times(1).returning(|_, _| Ok(()));
        let mut communities = MockCommunities::new();
        communities
            .expect_find_by_id()
            .with(eq("ghost-town"))
            .times(1)
            .returning(|_| Ok(None));
        // No push_thread expectation on communities: a call would panic.

        let svc = service(threads, users, communities);
        let thread = svc
            .create_root_thread("hello", "user-1", Some("ghost-town"), "/")
            .await
            .expect("create");
        assert!(thread.community.is_none());
        assert!(thread.is_root());
    }

    #[tokio::test]
    async fn reply_to_missing_parent_is_not_found() {
        let parent_id = Uuid::now_v7();
        let mut threads = MockThreads::new();
        threads
            .expect_find_by_id()
            .with(eq(parent_id))
            .times(1)
            .returning(|_| Ok(None));

        let svc = service(threads, MockUsers::new(), MockCommunities::new());
        let err = svc
            .add_reply(parent_id, "hi", "user-2", "/")
            .await
            .expect_err("missing parent");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        // The wrapper names the operation, the source carries the detail.
        assert_eq!(err.to_string(), "add reply failed");
    }

    #[tokio::test]
    async fn reply_is_linked_into_parent_children() {
        let parent = sample_thread(None);
        let parent_id = parent.id;

        let mut threads = MockThreads::new();
        threads
            .expect_find_by_id()
            .with(eq(parent_id))
            .times(1)
            .returning(move |_| Ok(Some(parent.clone())));
        threads.expect_insert().times(1).returning(|_| Ok(()));
        threads
            .expect_push_child()
            .withf(move |p, _| *p == parent_id)
            .times(1)
            .returning(|_, _| Ok(()));

        let svc = service(threads, MockUsers::new(), MockCommunities::new());
        let reply = svc
            .add_reply(parent_id, "hi", "user-2", "/")
            .await
            .expect("reply");
        assert_eq!(reply.parent_id, Some(parent_id));
        assert!(reply.community.is_none());
    }
}
