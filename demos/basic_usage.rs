//! Basic usage example of the cache sync engine.

use cache_sync::{
    error::Result, CacheKeyBuilder, CacheService, InMemoryRemote, PostDraft, RemoteCall,
    SyncConfig,
};
use std::time::Duration;

const POSTS: &str = r#"[
    {"id": 1, "userId": 1, "title": "sunt aut facere", "body": "quia et suscipit recusandae"},
    {"id": 2, "userId": 1, "title": "qui est esse", "body": "est rerum tempore vitae"},
    {"id": 3, "userId": 2, "title": "ea molestias quasi", "body": "et iusto sed quo iure"}
]"#;

const USERS: &str = r#"[
    {"id": 1, "name": "Leanne Graham", "email": "Sincere@april.biz"},
    {"id": 2, "name": "Ervin Howell", "email": "Shanna@melissa.tv"}
]"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== Cache Sync - Basic Example ===\n");

    // 1. Remote service with some latency
    println!("1. Starting in-memory remote service...");
    let remote = InMemoryRemote::from_json(POSTS, USERS)?.with_latency(Duration::from_millis(50));
    let service = CacheService::with_config(remote.clone(), SyncConfig::from_env());
    println!("   ✓ Service ready (strategy: {})\n", service.config().strategy);

    // 2. Concurrent reads share one fetch
    println!("2. Three concurrent reads of the collection:");
    let (a, b, c) = tokio::join!(service.posts(), service.posts(), service.posts());
    println!(
        "   ✓ {} posts each, {} remote fetch(es)\n",
        a?.len().min(b?.len()).min(c?.len()),
        remote.calls(RemoteCall::FetchCollection)
    );

    // 3. Owner view and users
    println!("3. Posts by owner 1 and the user list:");
    let mine = service.posts_by_owner(1).await?;
    let users = service.users().await?;
    println!("   ✓ {} posts by {}\n", mine.len(), users[0].name);

    // 4. Form validation happens before any remote call
    println!("4. Submitting an invalid draft:");
    match service.submit_post(PostDraft::new(1, "Hi", "short")).await {
        Err(e) => println!("   ✓ Rejected: {}\n", e.user_message()),
        Ok(post) => println!("   ✗ Unexpectedly created post {}\n", post.id),
    }

    // 5. Create: prepended to the collection, owner view invalidated
    println!("5. Creating a post:");
    let created = service
        .submit_post(PostDraft::new(1, "A fresh post", "Written through the cache"))
        .await?;
    let owner_entry = service.store().get(&CacheKeyBuilder::owner_collection(1)?);
    println!(
        "   ✓ Created post {}; collection head is {}; owner view stale: {}\n",
        created.id,
        service.posts().await?[0].id,
        owner_entry.map(|entry| entry.is_invalidated()).unwrap_or(false)
    );

    // 6. Update with owner change
    println!("6. Moving post 1 to owner 2:");
    let mut moved = service.post(1).await?;
    moved.owner_id = 2;
    service.update_post(moved).await?;
    let copies = service.store().entity_copies(1);
    println!("   ✓ {} cached copies, all owned by 2\n", copies.len());

    // 7. Failed mutation leaves the cache alone
    println!("7. Delete with a failing remote:");
    let before = service.store().snapshot()?;
    remote.fail_next(cache_sync::Error::http(503, "Service Unavailable"));
    if let Err(e) = service.delete_post(2, Some(1)).await {
        println!("   ✓ Delete failed: {}", e.user_message());
    }
    println!(
        "   ✓ Store unchanged: {}\n",
        service.store().snapshot()? == before
    );

    // 8. Delete for real
    println!("8. Deleting post 2:");
    service.delete_post(2, Some(1)).await?;
    println!(
        "   ✓ Remaining cached copies of post 2: {}\n",
        service.store().entity_copies(2).len()
    );

    println!("=== Example Complete ===\n");

    Ok(())
}
