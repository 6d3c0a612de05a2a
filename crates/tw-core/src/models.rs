//! # Domain Models
//!
//! The entities of the threaded content store, plus the read-side view
//! structures assembled by the service layer. Thread ids are UUID v7 so
//! the primary key itself is time-ordered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single node in the discussion graph.
///
/// A thread with no `parent_id` is a root thread and shows up in the
/// feed; one with a `parent_id` is a reply and is reachable only through
/// its parent's `children` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: Uuid,
    pub text: String,
    /// External id of the authoring user. Immutable after creation.
    pub author: String,
    /// `None` means the thread belongs to no community.
    pub community: Option<String>,
    pub parent_id: Option<Uuid>,
    /// Ids of direct replies, append-only. Maintained eagerly by the
    /// reply path, not derived at read time.
    pub children: Vec<Uuid>,
    /// Sole sort key for the feed (descending).
    pub created_at: DateTime<Utc>,
}

impl Thread {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Profile record keyed by the identity provider's opaque id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub external_id: String,
    pub username: String,
    pub name: String,
    pub bio: String,
    pub image: String,
    /// Flips to true on the first profile save.
    pub onboarded: bool,
    /// Denormalized set of authored root-thread ids. Soft invariant:
    /// kept in sync by the create/cascade paths and may briefly hold ids
    /// that no longer resolve. Read paths skip those silently.
    pub threads: Vec<Uuid>,
    /// Ids of communities the user belongs to.
    pub communities: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A community a thread may be posted into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub external_id: String,
    pub name: String,
    pub image: String,
    /// Same soft invariant as [`User::threads`].
    pub threads: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Field subset of a joined author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorView {
    pub id: String,
    pub name: String,
    pub image: String,
}

impl From<&User> for AuthorView {
    fn from(user: &User) -> Self {
        Self {
            id: user.external_id.clone(),
            name: user.name.clone(),
            image: user.image.clone(),
        }
    }
}

/// Field subset of a joined community.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityView {
    pub id: String,
    pub name: String,
    pub image: String,
}

impl From<&Community> for CommunityView {
    fn from(community: &Community) -> Self {
        Self {
            id: community.external_id.clone(),
            name: community.name.clone(),
            image: community.image.clone(),
        }
    }
}

/// A thread with its joins materialized to a fixed depth.
///
/// `children` holds only the levels the read path actually fetched; an
/// empty list says nothing about whether replies exist below that depth.
/// A `None` author means the reference did not resolve (stale id), which
/// read paths tolerate rather than fail on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadNode {
    pub thread: Thread,
    pub author: Option<AuthorView>,
    pub community: Option<CommunityView>,
    pub children: Vec<ThreadNode>,
}

/// One window of a paginated query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// True when the total matching count exceeds what has been paged
    /// through so far. Computed from a separate count query.
    pub has_next: bool,
}

/// A user profile together with their authored threads, joined one
/// level deep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPosts {
    pub user: User,
    pub threads: Vec<ThreadNode>,
}

/// Payload for the user profile upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub external_id: String,
    pub username: String,
    pub name: String,
    pub bio: String,
    pub image: String,
}

/// Payload for the community profile upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityProfile {
    pub external_id: String,
    pub name: String,
    pub image: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
}
