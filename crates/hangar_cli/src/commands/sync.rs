//! Sync commands: sync, retry, log.

use super::Client;
use hangar_sync_engine::RetryScope;
use hangar_sync_protocol::LogType;

/// Drains the queue once.
pub async fn sync(client: &Client) -> Result<(), Box<dyn std::error::Error>> {
    if !client.service.force_sync_now().await? {
        println!("Sync did not run (offline, or another pass holds the lock)");
    }
    print_summary(client);
    Ok(())
}

/// Requeues failed entries, then drains the queue.
pub async fn retry(client: &Client, all: bool) -> Result<(), Box<dyn std::error::Error>> {
    let ran = if all {
        let requeued = client.service.queue().retry_failed(RetryScope::All)?;
        println!("Requeued {requeued} failed entries");
        client.service.force_sync_now().await?
    } else {
        client.service.retry_failed_operations().await?
    };
    if !ran {
        println!("Sync did not run (offline, or another pass holds the lock)");
    }
    print_summary(client);
    Ok(())
}

/// Prints or clears the sync log.
///
/// The log lives in memory, so a fresh process only shows what the current
/// invocation appended.
pub fn log(client: &Client, limit: usize, clear: bool) {
    if clear {
        client.service.clear_sync_log();
        println!("Sync log cleared");
        return;
    }

    let entries = client.service.sync_log(limit);
    if entries.is_empty() {
        println!("Sync log is empty");
        return;
    }
    for entry in entries {
        let marker = match entry.kind {
            LogType::Success => "ok ",
            LogType::Error => "ERR",
            LogType::Info => "   ",
        };
        println!(
            "{} {} {:<7} {:<24} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            marker,
            entry.operation,
            entry.entity,
            entry.message
        );
    }
}

fn print_summary(client: &Client) {
    let stats = client.service.stats();
    println!(
        "{}: {} synced, {} pending, {} failed",
        client.service.status(),
        stats.synced_items,
        stats.pending_items,
        stats.error_items
    );
    for entry in client.service.sync_log(10).iter().rev() {
        if entry.kind == LogType::Error {
            println!("  {}: {}", entry.entity, entry.message);
        }
    }
}
