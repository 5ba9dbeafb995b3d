/// Complete kvdex API Demo
///
/// Demonstrates the single-store operations:
/// - CRUD operations (set, get, delete)
/// - Secondary indexes
/// - Queries (filters, sort, pagination, cache, explain)
/// - Subscriptions
/// - Export / import and validation

use kvdex::core::subscription::SubscriptionOptions;
use kvdex::{DataStore, IndexOptions, Operator, Query, SortDirection, StoreConfig};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n╔═══════════════════════════════════════════════╗");
    println!("║      kvdex Data Store - Complete API Demo     ║");
    println!("╚═══════════════════════════════════════════════╝\n");

    // Step 1: Create store
    println!("Creating store...");
    let mut store = DataStore::new(StoreConfig::new("leaderboard"));
    store.create_index("by_rank", &["rank"], IndexOptions::default())?;
    println!("Done!\n");

    // Step 2: SUBSCRIBE - React to a single key
    println!("Step 2: SUBSCRIBE - Watching 'player:alice'...");
    store.subscribe("player:alice", |event| {
        println!("  -> {:?} player:alice = {:?}", event.event_type, event.value);
    });
    store.subscribe_with(
        "player:bob",
        |event| println!("  -> first change to player:bob: {:?}", event.value),
        SubscriptionOptions::once(),
    );
    println!();

    // Step 3: INSERT - Add records
    println!("Step 3: INSERT - Adding records...");
    store.set("player:alice", json!({"name": "alice", "rank": "gold", "score": 120}))?;
    store.set("player:bob", json!({"name": "bob", "rank": "silver", "score": 90}))?;
    store.set("player:cara", json!({"name": "cara", "rank": "gold", "score": 95}))?;
    println!("  Inserted {} records\n", store.len());

    // Step 4: QUERY - Different query types
    println!("Step 4: QUERY - Querying records...");
    let golds = store.query(&Query::new().filter("rank", Operator::Eq, json!("gold")));
    println!("  rank = gold: {:?}", golds.keys());

    let top = store.query(
        &Query::new()
            .sort_by("score", SortDirection::Desc)
            .limit(2)
            .select(["name", "score"]),
    );
    println!("  top 2 by score: {:?}", top.values());

    let either = store.query(
        &Query::new()
            .filter("score", Operator::Gt, json!(100))
            .or_filter("name", Operator::StartsWith, json!("b")),
    );
    println!("  score > 100 OR name starts with b: {:?}", either.keys());

    let plan = store.explain(&Query::new().filter("rank", Operator::Eq, json!("gold")));
    println!("  plan: {:?} via {:?} (~{} rows)", plan.strategy, plan.index, plan.estimated_rows);
    println!();

    // Step 5: UPDATE / DELETE
    println!("Step 5: UPDATE / DELETE...");
    store.set("player:alice", json!({"name": "alice", "rank": "platinum", "score": 150}))?;
    store.set("player:bob", json!({"name": "bob", "rank": "gold", "score": 99}))?;
    println!("  Deleted player:cara: {}", store.delete("player:cara"));
    println!("  Deleted missing key: {}", store.delete("player:zed"));
    println!();

    // Step 6: EXPORT / IMPORT
    println!("Step 6: EXPORT / IMPORT...");
    let json = store.export_json()?;
    let mut copy = DataStore::new(StoreConfig::new("copy"));
    copy.import_json(&json)?;
    println!("  Exported {} bytes, copy has keys {:?}", json.len(), copy.keys());
    println!();

    // Step 7: STATS - Detailed statistics
    println!("Step 7: STATISTICS - Store metrics:");
    println!("  ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    let stats = store.stats();
    println!("  Records:             {}", stats.records);
    println!("  Size (bytes):        {}", stats.size_bytes);
    println!("  Indexes:             {}", stats.index_count);
    println!("  Subscriptions:       {}", stats.subscription_count);
    println!("  Events:              {}", stats.event_count);
    println!("  Cache Hit Rate:      {:.2}", stats.cache_hit_rate());
    println!();

    // Step 8: VALIDATE
    println!("Step 8: VALIDATE - Store health:");
    let result = store.validate();
    println!("  Valid: {} ({} checked, {} warnings)", result.valid, result.checked, result.warning_count());

    println!("\n╔════════════════════════════════════════╗");
    println!("║    All API Operations Completed!      ║");
    println!("╚════════════════════════════════════════╝\n");

    Ok(())
}
