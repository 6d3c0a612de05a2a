//! # tw-store-sqlite Implementation
//!
//! SQLite backing for the `tw-core` store ports. The array-valued fields
//! (`children`, `threads`, `communities`) live in JSON1 TEXT columns so
//! that array append and pull-by-set are each a single UPDATE statement,
//! which is what makes them atomic under concurrent writers.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tw_core::models::{Community, CommunityProfile, SortOrder, Thread, User, UserProfile};
use tw_core::traits::{CommunityStore, ThreadStore, UserStore};
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS threads (
    id          TEXT PRIMARY KEY,
    text        TEXT NOT NULL,
    author      TEXT NOT NULL,
    community   TEXT,
    parent_id   TEXT,
    children    TEXT NOT NULL DEFAULT '[]',
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_threads_parent ON threads (parent_id);
CREATE INDEX IF NOT EXISTS idx_threads_author ON threads (author);
CREATE TABLE IF NOT EXISTS users (
    external_id TEXT PRIMARY KEY,
    username    TEXT NOT NULL,
    name        TEXT NOT NULL,
    bio         TEXT NOT NULL DEFAULT '',
    image       TEXT NOT NULL DEFAULT '',
    onboarded   INTEGER NOT NULL DEFAULT 0,
    threads     TEXT NOT NULL DEFAULT '[]',
    communities TEXT NOT NULL DEFAULT '[]',
    created_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS communities (
    external_id TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    image       TEXT NOT NULL DEFAULT '',
    threads     TEXT NOT NULL DEFAULT '[]',
    created_at  TEXT NOT NULL
);
";

/// One pool shared by all three entity stores.
///
/// The pool is capped at a single connection: SQLite has one writer
/// anyway, and `sqlite::memory:` databases are per-connection.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if !statement.is_empty() {
                sqlx::query(statement).execute(&pool).await?;
            }
        }

        tracing::debug!(url, "sqlite store ready");
        Ok(Self { pool })
    }
}

// Helpers for id and JSON-array mapping

fn parse_id(raw: &str) -> Uuid {
    Uuid::parse_str(raw).unwrap_or_default()
}

fn ids_as_json(ids: &[Uuid]) -> String {
    serde_json::to_string(ids).unwrap_or_else(|_| "[]".to_string())
}

fn strings_as_json(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

fn thread_from_row(row: &SqliteRow) -> Thread {
    Thread {
        id: parse_id(&row.get::<String, _>("id")),
        text: row.get("text"),
        author: row.get("author"),
        community: row.get("community"),
        parent_id: row
            .get::<Option<String>, _>("parent_id")
            .as_deref()
            .map(parse_id),
        children: serde_json::from_str(&row.get::<String, _>("children")).unwrap_or_default(),
        created_at: row.get("created_at"),
    }
}

fn user_from_row(row: &SqliteRow) -> User {
    User {
        external_id: row.get("external_id"),
        username: row.get("username"),
        name: row.get("name"),
        bio: row.get("bio"),
        image: row.get("image"),
        onboarded: row.get("onboarded"),
        threads: serde_json::from_str(&row.get::<String, _>("threads")).unwrap_or_default(),
        communities: serde_json::from_str(&row.get::<String, _>("communities"))
            .unwrap_or_default(),
        created_at: row.get("created_at"),
    }
}

fn community_from_row(row: &SqliteRow) -> Community {
    Community {
        external_id: row.get("external_id"),
        name: row.get("name"),
        image: row.get("image"),
        threads: serde_json::from_str(&row.get::<String, _>("threads")).unwrap_or_default(),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl ThreadStore for SqliteStore {
    async fn insert(&self, thread: &Thread) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO threads (id, text, author, community, parent_id, children, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(thread.id.to_string())
        .bind(&thread.text)
        .bind(&thread.author)
        .bind(&thread.community)
        .bind(thread.parent_id.map(|id| id.to_string()))
        .bind(ids_as_json(&thread.children))
        .bind(thread.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Thread>> {
        let row = sqlx::query("SELECT * FROM threads WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(thread_from_row))
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Thread>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows =
            sqlx::query("SELECT * FROM threads WHERE id IN (SELECT value FROM json_each(?))")
                .bind(ids_as_json(ids))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.iter().map(thread_from_row).collect())
    }

    async fn find_children_of(&self, parents: &[Uuid]) -> anyhow::Result<Vec<Thread>> {
        if parents.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT * FROM threads WHERE parent_id IN (SELECT value FROM json_each(?))",
        )
        .bind(ids_as_json(parents))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(thread_from_row).collect())
    }

    async fn find_roots(&self, skip: u64, limit: u64) -> anyhow::Result<Vec<Thread>> {
        // Secondary key only disambiguates equal timestamps; ids are v7,
        // so it still follows creation order.
        let rows = sqlx::query(
            "SELECT * FROM threads WHERE parent_id IS NULL
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(limit as i64)
        .bind(skip as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(thread_from_row).collect())
    }

    async fn count_roots(&self) -> anyhow::Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM threads WHERE parent_id IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn find_by_author(&self, author_id: &str) -> anyhow::Result<Vec<Thread>> {
        let rows = sqlx::query("SELECT * FROM threads WHERE author = ?")
            .bind(author_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(thread_from_row).collect())
    }

    async fn push_child(&self, parent_id: Uuid, child_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE threads SET children = json_insert(children, '$[#]', ?) WHERE id = ?")
            .bind(child_id.to_string())
            .bind(parent_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_many(&self, ids: &[Uuid]) -> anyhow::Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result =
            sqlx::query("DELETE FROM threads WHERE id IN (SELECT value FROM json_each(?))")
                .bind(ids_as_json(ids))
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn find_by_id(&self, external_id: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_ids(&self, external_ids: &[String]) -> anyhow::Result<Vec<User>> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT * FROM users WHERE external_id IN (SELECT value FROM json_each(?))",
        )
        .bind(strings_as_json(external_ids))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    /// First save creates the record; later saves replace the profile
    /// fields but never the denormalized sets or `created_at`.
    async fn upsert(&self, profile: &UserProfile) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO users (external_id, username, name, bio, image, onboarded, created_at)
             VALUES (?, ?, ?, ?, ?, 1, ?)
             ON CONFLICT(external_id) DO UPDATE SET
                 username  = excluded.username,
                 name      = excluded.name,
                 bio       = excluded.bio,
                 image     = excluded.image,
                 onboarded = 1",
        )
        .bind(&profile.external_id)
        .bind(&profile.username)
        .bind(&profile.name)
        .bind(&profile.bio)
        .bind(&profile.image)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn search(
        &self,
        exclude_id: &str,
        filter: Option<&str>,
        sort: SortOrder,
        skip: u64,
        limit: u64,
    ) -> anyhow::Result<Vec<User>> {
        let direction = match sort {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let mut sql = String::from("SELECT * FROM users WHERE external_id <> ?");
        if filter.is_some() {
            sql.push_str(" AND (username LIKE '%' || ? || '%' OR name LIKE '%' || ? || '%')");
        }
        sql.push_str(&format!(
            " ORDER BY created_at {direction}, external_id {direction} LIMIT ? OFFSET ?"
        ));

        let mut query = sqlx::query(&sql).bind(exclude_id);
        if let Some(needle) = filter {
            query = query.bind(needle).bind(needle);
        }
        let rows = query
            .bind(limit as i64)
            .bind(skip as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    async fn count_matching(&self, exclude_id: &str, filter: Option<&str>) -> anyhow::Result<u64> {
        let mut sql = String::from("SELECT COUNT(*) FROM users WHERE external_id <> ?");
        if filter.is_some() {
            sql.push_str(" AND (username LIKE '%' || ? || '%' OR name LIKE '%' || ? || '%')");
        }
        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(exclude_id);
        if let Some(needle) = filter {
            query = query.bind(needle).bind(needle);
        }
        let count = query.fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    async fn push_thread(&self, external_id: &str, thread_id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET threads = json_insert(threads, '$[#]', ?) WHERE external_id = ?",
        )
        .bind(thread_id.to_string())
        .bind(external_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pull_threads(
        &self,
        external_ids: &[String],
        thread_ids: &[Uuid],
    ) -> anyhow::Result<()> {
        if external_ids.is_empty() || thread_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE users SET threads = (
                 SELECT coalesce(json_group_array(value), '[]')
                 FROM json_each(users.threads)
                 WHERE value NOT IN (SELECT value FROM json_each(?))
             )
             WHERE external_id IN (SELECT value FROM json_each(?))",
        )
        .bind(ids_as_json(thread_ids))
        .bind(strings_as_json(external_ids))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CommunityStore for SqliteStore {
    async fn find_by_id(&self, external_id: &str) -> anyhow::Result<Option<Community>> {
        let row = sqlx::query("SELECT * FROM communities WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(community_from_row))
    }

    async fn find_by_ids(&self, external_ids: &[String]) -> anyhow::Result<Vec<Community>> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT * FROM communities WHERE external_id IN (SELECT value FROM json_each(?))",
        )
        .bind(strings_as_json(external_ids))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(community_from_row).collect())
    }

    async fn upsert(&self, profile: &CommunityProfile) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO communities (external_id, name, image, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(external_id) DO UPDATE SET
                 name  = excluded.name,
                 image = excluded.image",
        )
        .bind(&profile.external_id)
        .bind(&profile.name)
        .bind(&profile.image)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn push_thread(&self, external_id: &str, thread_id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE communities SET threads = json_insert(threads, '$[#]', ?) WHERE external_id = ?",
        )
        .bind(thread_id.to_string())
        .bind(external_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pull_threads(
        &self,
        external_ids: &[String],
        thread_ids: &[Uuid],
    ) -> anyhow::Result<()> {
        if external_ids.is_empty() || thread_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE communities SET threads = (
                 SELECT coalesce(json_group_array(value), '[]')
                 FROM json_each(communities.threads)
                 WHERE value NOT IN (SELECT value FROM json_each(?))
             )
             WHERE external_id IN (SELECT value FROM json_each(?))",
        )
        .bind(ids_as_json(thread_ids))
        .bind(strings_as_json(external_ids))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.expect("in-memory store")
    }

    fn thread(parent_id: Option<Uuid>, author: &str) -> Thread {
        Thread {
            id: Uuid::now_v7(),
            text: "body".to_string(),
            author: author.to_string(),
            community: None,
            parent_id,
            children: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn profile(id: &str, username: &str) -> UserProfile {
        UserProfile {
            external_id: id.to_string(),
            username: username.to_string(),
            name: username.to_string(),
            bio: String::new(),
            image: String::new(),
        }
    }

    #[tokio::test]
    async fn push_child_appends_in_order() {
        let store = store().await;
        let parent = thread(None, "u1");
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();

        ThreadStore::insert(&store, &parent).await.unwrap();
        store.push_child(parent.id, a).await.unwrap();
        store.push_child(parent.id, b).await.unwrap();

        let loaded = ThreadStore::find_by_id(&store, parent.id)
            .await
            .unwrap()
            .expect("parent");
        assert_eq!(loaded.children, [a, b]);
    }

    #[tokio::test]
    async fn roots_are_newest_first_and_replies_excluded() {
        let store = store().await;
        let first = thread(None, "u1");
        let second = thread(None, "u1");
        let reply = thread(Some(first.id), "u2");
        ThreadStore::insert(&store, &first).await.unwrap();
        ThreadStore::insert(&store, &second).await.unwrap();
        ThreadStore::insert(&store, &reply).await.unwrap();

        let roots = store.find_roots(0, 10).await.unwrap();
        let ids: Vec<Uuid> = roots.iter().map(|t| t.id).collect();
        assert_eq!(ids, [second.id, first.id]);
        assert_eq!(store.count_roots().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn pull_threads_removes_only_listed_ids() {
        let store = store().await;
        UserStore::upsert(&store, &profile("u1", "ada")).await.unwrap();
        UserStore::upsert(&store, &profile("u2", "grace")).await.unwrap();

        let keep = Uuid::now_v7();
        let drop_a = Uuid::now_v7();
        let drop_b = Uuid::now_v7();
        UserStore::push_thread(&store, "u1", keep).await.unwrap();
        UserStore::push_thread(&store, "u1", drop_a).await.unwrap();
        UserStore::push_thread(&store, "u2", drop_b).await.unwrap();

        UserStore::pull_threads(
            &store,
            &["u1".to_string(), "u2".to_string()],
            &[drop_a, drop_b],
        )
        .await
        .unwrap();

        let u1 = UserStore::find_by_id(&store, "u1").await.unwrap().expect("u1");
        let u2 = UserStore::find_by_id(&store, "u2").await.unwrap().expect("u2");
        assert_eq!(u1.threads, [keep]);
        assert!(u2.threads.is_empty());
    }

    #[tokio::test]
    async fn upsert_preserves_sets_and_created_at() {
        let store = store().await;
        UserStore::upsert(&store, &profile("u1", "ada")).await.unwrap();
        let id = Uuid::now_v7();
        UserStore::push_thread(&store, "u1", id).await.unwrap();
        let before = UserStore::find_by_id(&store, "u1").await.unwrap().expect("u1");

        UserStore::upsert(&store, &profile("u1", "ada2")).await.unwrap();
        let after = UserStore::find_by_id(&store, "u1").await.unwrap().expect("u1");

        assert_eq!(after.username, "ada2");
        assert_eq!(after.threads, [id]);
        assert_eq!(after.created_at, before.created_at);
        assert!(after.onboarded);
    }

    #[tokio::test]
    async fn delete_many_reports_removed_count() {
        let store = store().await;
        let a = thread(None, "u1");
        let b = thread(None, "u1");
        ThreadStore::insert(&store, &a).await.unwrap();
        ThreadStore::insert(&store, &b).await.unwrap();

        let removed = store.delete_many(&[a.id, b.id, Uuid::now_v7()]).await.unwrap();
        assert_eq!(removed, 2);
        assert!(ThreadStore::find_by_id(&store, a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_excludes() {
        let store = store().await;
        UserStore::upsert(&store, &profile("u1", "ada")).await.unwrap();
        UserStore::upsert(&store, &profile("u2", "adamant")).await.unwrap();
        UserStore::upsert(&store, &profile("u3", "grace")).await.unwrap();

        let hits = store
            .search("u1", Some("ADA"), SortOrder::Desc, 0, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].external_id, "u2");

        assert_eq!(store.count_matching("u1", None).await.unwrap(), 2);
        assert_eq!(store.count_matching("u1", Some("ada")).await.unwrap(), 1);
    }
}
