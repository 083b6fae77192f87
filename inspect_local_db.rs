//! formstash-inspect
//!
//! Look inside the local form store: counts, one owner's drafts, and an
//! optional purge of expired rows.
//!
//! ```text
//! formstash-inspect [OWNER_ID] [--purge]
//! ```
//!
//! The database path comes from `FORMSTASH_DB_PATH`, else the platform data
//! directory. Log level comes from `RUST_LOG`.

use formstash::local_db::{FormStore, LocalDatabase};
use formstash::shared::StoreConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&env_filter))
        .with_writer(std::io::stderr)
        .init();

    let mut owner_id = None;
    let mut purge = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--purge" => purge = true,
            "-h" | "--help" => {
                println!("usage: formstash-inspect [OWNER_ID] [--purge]");
                return Ok(());
            }
            _ => owner_id = Some(arg),
        }
    }

    let config = StoreConfig::default();
    println!("Local form store");
    println!("================");
    println!("path: {}", config.db_path.display());

    let db = LocalDatabase::open(&config).await?;
    println!("schema version: {}", db.schema_version().await?);

    if purge {
        let purged = db.purge_expired().await?;
        println!("purged {} expired record(s)", purged);
    }

    let stats = db.stats().await?;
    println!();
    println!("live records:    {}", stats.live_records);
    println!("pending sync:    {}", stats.pending_sync);
    println!("expired (stale): {}", stats.expired_records);

    if let Some(owner_id) = owner_id {
        let records = db.list_for_owner(&owner_id).await?;
        println!();
        println!("drafts for owner {}: {}", owner_id, records.len());
        for record in records {
            println!(
                "  {:<32} saved {}  expires {}  sync {:?}",
                record.key.form_id,
                record.saved_at.format("%Y-%m-%d %H:%M:%S"),
                record.expires_at.format("%Y-%m-%d %H:%M:%S"),
                record.sync_state(),
            );
            if let Some(error) = &record.last_sync_error {
                println!("  {:<32} last sync error: {}", "", error);
            }
        }
    }

    db.close().await;
    Ok(())
}
