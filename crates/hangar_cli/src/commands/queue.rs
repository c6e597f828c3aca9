//! Queue commands: enqueue, status, purge.

use super::Client;
use hangar_sync_protocol::{
    ConnectionStatus, EntityType, Operation, SyncQueueEntry, SyncStats, SyncStatus,
};
use serde::Serialize;
use tracing::info;

/// Status report.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Compact status.
    pub status: SyncStatus,
    /// Queue statistics.
    pub stats: SyncStats,
    /// Connectivity.
    pub connection: ConnectionStatus,
    /// Queue entries (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<SyncQueueEntry>>,
}

/// Records a mutation.
pub fn enqueue(
    client: &Client,
    entity_type: &str,
    id: &str,
    operation: &str,
    payload: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let operation: Operation = operation.parse()?;
    let entity_type = EntityType::from(entity_type);

    let payload = match (operation.carries_payload(), payload) {
        (true, Some(text)) => {
            // Payloads are opaque to the queue; reject obvious typos early.
            serde_json::from_str::<serde_json::Value>(&text)?;
            Some(text.into_bytes())
        }
        (true, None) => return Err(format!("{operation} requires --payload").into()),
        (false, _) => None,
    };

    let entry_id = client.service.enqueue(entity_type.clone(), id, operation, payload)?;
    info!(%entry_id, entity = %format!("{entity_type}/{id}"), %operation, "mutation queued");
    println!("Queued {operation} of {entity_type}/{id} ({entry_id})");
    Ok(())
}

/// Prints statistics and connectivity.
pub fn status(
    client: &Client,
    show_entries: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = StatusReport {
        status: client.service.status(),
        stats: client.service.stats(),
        connection: client.service.connection_status(),
        entries: show_entries.then(|| client.service.queue_entries()),
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => print_text_output(&report),
    }
    Ok(())
}

/// Drops synced entries.
pub fn purge(client: &Client) -> Result<(), Box<dyn std::error::Error>> {
    let removed = client.service.queue().purge_synced()?;
    println!("Purged {removed} synced entries");
    Ok(())
}

fn print_text_output(report: &StatusReport) {
    let stats = &report.stats;
    println!("Hangar Sync Status");
    println!("==================");
    println!();
    println!("Status:      {}", report.status.as_str());
    println!(
        "Connection:  {}",
        if report.connection.is_online {
            "online"
        } else {
            "offline"
        }
    );
    println!();
    println!("Queue:");
    println!("  Total:     {}", stats.total_items);
    println!("  Synced:    {}", stats.synced_items);
    println!("  Pending:   {}", stats.pending_items);
    println!("  Errors:    {}", stats.error_items);

    if let Some(entries) = &report.entries {
        println!();
        println!("Entries:");
        for entry in entries {
            let error = entry
                .last_error
                .as_ref()
                .map(|e| format!(" [{}: {}]", e.kind, e.message))
                .unwrap_or_default();
            println!(
                "  #{:<4} {:<9} {:<7} {} (attempts {}){}",
                entry.seq,
                entry.state.as_str(),
                entry.operation,
                entry.entity_label(),
                entry.attempts,
                error
            );
        }
    }
}
