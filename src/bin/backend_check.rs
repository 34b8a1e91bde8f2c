//! backend_check - verify Supabase credentials, table access, and the image bucket
//!
//! Steps:
//! 1. Build the client from SUPABASE_URL / SUPABASE_KEY
//! 2. Insert a TEST_CONNECTION row into the log table
//! 3. List storage buckets and look for the image bucket
//!
//! Exits non-zero on the first failure.

use anyhow::{anyhow, Result};
use chrono::Local;
use clap::Parser;

use laundry_sentry::{BackendSettings, SupabaseStore, UploadRecord};

const PROBE_ITEM_TYPE: &str = "TEST_CONNECTION";
const PROBE_IMAGE_URL: &str = "https://via.placeholder.com/150";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Check that the configured Supabase project accepts laundry uploads"
)]
struct Args {
    /// Storage bucket expected to hold uploaded images
    #[arg(long, env = "LAUNDRY_BUCKET")]
    bucket: Option<String>,

    /// Table receiving upload records
    #[arg(long, env = "LAUNDRY_TABLE")]
    table: Option<String>,

    /// Skip the test row insert (read-only check)
    #[arg(long)]
    no_insert: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    println!("--- 1. client ---");
    let mut settings = BackendSettings::from_env()?;
    if let Some(bucket) = args.bucket {
        settings.bucket = bucket;
    }
    if let Some(table) = args.table {
        settings.table = table;
    }
    let store = SupabaseStore::new(&settings)?;
    println!("OK: client for {}", settings.endpoint);

    if args.no_insert {
        println!("\n--- 2. table insert (skipped) ---");
    } else {
        println!("\n--- 2. table insert into '{}' ---", store.table());
        let test_row = UploadRecord {
            item_type: PROBE_ITEM_TYPE.to_string(),
            confidence: 0.99,
            image_url: PROBE_IMAGE_URL.to_string(),
            is_defect: false,
            created_at: Local::now().to_rfc3339(),
        };
        let rows = store.insert_row(&test_row)?;
        if rows.is_empty() {
            println!("WARN: insert returned no rows; check the table's row-level security policy");
        } else {
            println!("OK: inserted {}", serde_json::to_string(&rows)?);
        }
    }

    println!("\n--- 3. storage buckets ---");
    let buckets = store.list_buckets()?;
    for bucket in &buckets {
        println!(
            "   found bucket: {}{}",
            bucket.name,
            if bucket.public { " (public)" } else { "" }
        );
    }
    if !buckets.iter().any(|b| b.name == store.bucket() || b.id == store.bucket()) {
        return Err(anyhow!(
            "bucket '{}' not found; check the bucket name and the key's storage permissions",
            store.bucket()
        ));
    }
    println!("OK: bucket '{}' exists", store.bucket());

    println!("\nbackend check passed");
    Ok(())
}
