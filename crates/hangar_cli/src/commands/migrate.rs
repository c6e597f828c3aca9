//! Migration commands: seed, counts, migrate.

use super::Client;
use hangar_storage::WriteBatch;
use hangar_sync_protocol::{EntityType, MigrationStatus};
use serde_json::json;
use std::io::Write;
use tracing::info;

const SEEDED: [EntityType; 4] = [
    EntityType::Aircraft,
    EntityType::Employee,
    EntityType::Task,
    EntityType::FlightSheet,
];

/// Writes `counts[i]` records of each built-in entity type into its local
/// table, replacing records with the same IDs.
pub fn seed(client: &Client, counts: [usize; 4]) -> Result<(), Box<dyn std::error::Error>> {
    for (entity_type, count) in SEEDED.iter().zip(counts) {
        let mut batch = WriteBatch::new();
        for n in 1..=count {
            let id = format!("{}-{n}", entity_type.as_str());
            let record = json!({
                "id": id,
                "type": entity_type.as_str(),
                "revision": 1,
            });
            batch.put(id, serde_json::to_vec(&record)?);
        }
        client.store.write_batch(entity_type.table_name(), batch)?;
        info!(table = entity_type.table_name(), count, "seeded table");
    }
    println!("Seeded {} records", counts.iter().sum::<usize>());
    Ok(())
}

/// Prints local record counts per migrated table.
pub fn counts(client: &Client, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let counts = client.service.local_counts()?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&counts)?),
        _ => {
            println!("Local Records");
            println!("=============");
            for table in &counts.tables {
                println!("  {:<14} {}", table.table, table.count);
            }
            println!("  {:<14} {}", "total", counts.total);
        }
    }
    Ok(())
}

/// Runs the migration, printing progress per table.
pub async fn migrate(
    client: &Client,
    clear_queue: bool,
    mark_synced: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !client.service.is_remote_configured().await {
        return Err("remote store is not reachable".into());
    }

    let result = client
        .service
        .migrate_all(|progress| match progress.status {
            MigrationStatus::Migrating => {
                print!("\r  {:<14} {}/{}", progress.table, progress.current, progress.total);
                let _ = std::io::stdout().flush();
            }
            MigrationStatus::Completed => {
                println!("\r  {:<14} {}/{} done", progress.table, progress.current, progress.total);
            }
            MigrationStatus::Error => {
                println!(
                    "\r  {:<14} {}/{} with errors",
                    progress.table, progress.current, progress.total
                );
            }
        })
        .await;

    println!();
    println!("{}", result.message);
    for error in &result.details.errors {
        println!("  {error}");
    }
    if result.details.error_count > result.details.errors.len() {
        println!(
            "  ... and {} more",
            result.details.error_count - result.details.errors.len()
        );
    }

    if !result.success {
        return Err("migration finished with errors".into());
    }
    if clear_queue {
        let removed = client.service.clear_queue()?;
        println!("Cleared {removed} queue entries");
    }
    if mark_synced {
        let marked = client.service.mark_all_synced()?;
        println!("Marked {marked} records as synced");
    }
    Ok(())
}
