//! # threadweave binary
//!
//! Wires the SQLite store plugin into the service layer and runs a small
//! seed/demo flow over the public surface: profile upserts, a community,
//! a root thread with nested replies, then the feed, activity, and a
//! cascade delete.

use tracing_subscriber::EnvFilter;
use tw_core::models::{CommunityProfile, SortOrder, UserProfile};
use tw_services::{LogRevalidator, ThreadService};
use tw_store_sqlite::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let db_url =
        std::env::var("THREADWEAVE_DB").unwrap_or_else(|_| "sqlite::memory:".to_string());
    let store = SqliteStore::new(&db_url).await?;
    let service = ThreadService::new(
        Box::new(store.clone()),
        Box::new(store.clone()),
        Box::new(store),
        Box::new(LogRevalidator),
    );

    tracing::info!(db = %db_url, "threadweave store up");

    service
        .update_user(
            UserProfile {
                external_id: "user-ada".to_string(),
                username: "Ada".to_string(),
                name: "Ada Lovelace".to_string(),
                bio: "first of the programmers".to_string(),
                image: "/avatars/ada.png".to_string(),
            },
            "/profile/edit",
        )
        .await?;
    service
        .update_user(
            UserProfile {
                external_id: "user-grace".to_string(),
                username: "Grace".to_string(),
                name: "Grace Hopper".to_string(),
                bio: "compiler person".to_string(),
                image: "/avatars/grace.png".to_string(),
            },
            "/profile/edit",
        )
        .await?;
    service
        .update_community(CommunityProfile {
            external_id: "comm-engines".to_string(),
            name: "Analytical Engines".to_string(),
            image: "/communities/engines.png".to_string(),
        })
        .await?;

    let root = service
        .create_root_thread(
            "Does anyone else dream in punch cards?",
            "user-ada",
            Some("comm-engines"),
            "/",
        )
        .await?;
    let reply = service
        .add_reply(root.id, "Every night.", "user-grace", "/")
        .await?;
    service
        .add_reply(reply.id, "Knew it!", "user-ada", "/")
        .await?;

    let feed = service.fetch_feed(1, 20).await?;
    for node in &feed.items {
        let author = node.author.as_ref().map(|a| a.name.as_str()).unwrap_or("?");
        tracing::info!(
            thread = %node.thread.id,
            author,
            replies = node.children.len(),
            "feed entry"
        );
    }

    let activity = service.get_activity("user-ada").await?;
    tracing::info!(replies = activity.len(), "activity for ada");

    let directory = service.search_users("user-ada", "", 1, 20, SortOrder::Desc).await?;
    tracing::info!(users = directory.items.len(), has_next = directory.has_next, "directory");

    service.delete_thread_subtree(root.id, "/").await?;
    let feed = service.fetch_feed(1, 20).await?;
    tracing::info!(remaining = feed.items.len(), "feed after cascade delete");

    Ok(())
}
