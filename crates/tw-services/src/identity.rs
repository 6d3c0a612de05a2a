//! # Identity Records
//!
//! User and community profile upkeep, plus the repair pass for the
//! denormalized `threads` sets. Profiles are upserted on save and never
//! deleted by this core.

use std::collections::HashSet;

use tw_core::error::{AppError, Result};
use tw_core::models::{Community, CommunityProfile, User, UserProfile};
use uuid::Uuid;

use crate::ThreadService;

impl ThreadService {
    /// Create-or-update a user profile. Usernames are stored lowercased;
    /// any save marks the user as onboarded. Existing `threads` and
    /// `communities` sets survive the upsert untouched.
    pub async fn update_user(&self, profile: UserProfile, hint: &str) -> Result<()> {
        self.update_user_inner(profile, hint)
            .await
            .map_err(|e| AppError::operation("update user", e))
    }

    async fn update_user_inner(&self, mut profile: UserProfile, hint: &str) -> Result<()> {
        if profile.external_id.is_empty() {
            return Err(AppError::Validation("user id must not be empty".into()));
        }
        if profile.username.trim().is_empty() {
            return Err(AppError::Validation("username must not be empty".into()));
        }
        profile.username = profile.username.to_lowercase();

        self.users.upsert(&profile).await.map_err(AppError::store)?;
        self.revalidator
            .revalidate(hint)
            .await
            .map_err(AppError::store)?;

        tracing::info!(user = %profile.external_id, "updated user profile");
        Ok(())
    }

    pub async fn fetch_user(&self, user_id: &str) -> Result<User> {
        self.users
            .find_by_id(user_id)
            .await
            .map_err(AppError::store)?
            .ok_or_else(|| AppError::NotFound("user", user_id.to_owned()))
    }

    /// Create-or-update a community profile.
    pub async fn update_community(&self, profile: CommunityProfile) -> Result<()> {
        self.update_community_inner(profile)
            .await
            .map_err(|e| AppError::operation("update community", e))
    }

    async fn update_community_inner(&self, profile: CommunityProfile) -> Result<()> {
        if profile.external_id.is_empty() {
            return Err(AppError::Validation("community id must not be empty".into()));
        }
        self.communities
            .upsert(&profile)
            .await
            .map_err(AppError::store)
    }

    pub async fn fetch_community(&self, community_id: &str) -> Result<Community> {
        self.communities
            .find_by_id(community_id)
            .await
            .map_err(AppError::store)?
            .ok_or_else(|| AppError::NotFound("community", community_id.to_owned()))
    }

    /// Drops every id from the user's `threads` set that no longer
    /// resolves to a stored thread. Returns how many were dropped.
    ///
    /// Maintenance path, safe to run repeatedly; the hot paths already
    /// tolerate the dangling ids this cleans up.
    pub async fn repair_user_refs(&self, user_id: &str) -> Result<usize> {
        let user = self.fetch_user(user_id).await?;
        let dangling = self.dangling_ids(&user.threads).await?;
        if !dangling.is_empty() {
            self.users
                .pull_threads(std::slice::from_ref(&user.external_id), &dangling)
                .await
                .map_err(AppError::store)?;
            tracing::info!(user = user_id, dropped = dangling.len(), "repaired user thread refs");
        }
        Ok(dangling.len())
    }

    /// Community counterpart of [`Self::repair_user_refs`].
    pub async fn repair_community_refs(&self, community_id: &str) -> Result<usize> {
        let community = self.fetch_community(community_id).await?;
        let dangling = self.dangling_ids(&community.threads).await?;
        if !dangling.is_empty() {
            self.communities
                .pull_threads(std::slice::from_ref(&community.external_id), &dangling)
                .await
                .map_err(AppError::store)?;
            tracing::info!(
                community = community_id,
                dropped = dangling.len(),
                "repaired community thread refs"
            );
        }
        Ok(dangling.len())
    }

    async fn dangling_ids(&self, referenced: &[Uuid]) -> Result<Vec<Uuid>> {
        if referenced.is_empty() {
            return Ok(Vec::new());
        }
        let live: HashSet<Uuid> = self
            .threads
            .find_by_ids(referenced)
            .await
            .map_err(AppError::store)?
            .iter()
            .map(|t| t.id)
            .collect();
        Ok(referenced
            .iter()
            .copied()
            .filter(|id| !live.contains(id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use tw_core::error::ErrorKind;
    use tw_core::models::UserProfile;

    use crate::test_support::{service, MockCommunities, MockThreads, MockUsers};

    fn profile(username: &str) -> UserProfile {
        UserProfile {
            external_id: "user-1".to_string(),
            username: username.to_string(),
            name: "Ada".to_string(),
            bio: String::new(),
            image: String::new(),
        }
    }

    #[tokio::test]
    async fn username_is_lowercased_on_save() {
        let mut users = MockUsers::new();
        users
            .expect_upsert()
            .withf(|p| p.username == "adalovelace")
            .times(1)
            .returning(|_| Ok(()));

        let svc = service(MockThreads::new(), users, MockCommunities::new());
        svc.update_user(profile("AdaLovelace"), "/profile/edit")
            .await
            .expect("upsert");
    }

    #[tokio::test]
    async fn blank_username_is_rejected() {
        let svc = service(MockThreads::new(), MockUsers::new(), MockCommunities::new());
        let err = svc
            .update_user(profile("  "), "/profile/edit")
            .await
            .expect_err("blank username");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let mut users = MockUsers::new();
        users
            .expect_find_by_id()
            .with(eq("nobody"))
            .times(1)
            .returning(|_| Ok(None));

        let svc = service(MockThreads::new(), users, MockCommunities::new());
        let err = svc.fetch_user("nobody").await.expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
