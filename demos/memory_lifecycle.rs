//! Walk a bucket through create, describe and delete using the in-memory provider
//!
//! Run with: cargo run --example memory_lifecycle

use s3_broker_client::{MemoryStorage, Operation};
use s3_broker_core::{BucketDetails, BucketLifecycle, BucketStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const POLICY: &str = r#"{
  "Version": "2012-10-17",
  "Statement": [{
    "Effect": "Allow",
    "Principal": "*",
    "Action": ["s3:GetObject"],
    "Resource": ["{{.ARN}}/*"]
  }]
}"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "s3_broker_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let storage = MemoryStorage::new().with_region("eu-west-1");
    let store = BucketStore::new(storage.clone());

    let details = BucketDetails::new("demo-bucket", "aws").with_policy(POLICY);
    let location = store.create("demo-bucket", details).await?;
    println!("Created bucket at {}", location);

    let described = store.describe("demo-bucket", "aws").await?;
    println!("{}", serde_json::to_string_pretty(&described)?);
    println!(
        "Applied policy:\n{}",
        storage.bucket_policy("demo-bucket").unwrap_or_default()
    );

    storage.enable_versioning("demo-bucket")?;
    for i in 0..2500 {
        storage.put_object("demo-bucket", &format!("logs/{:05}.json", i))?;
    }
    println!(
        "Wrote {} objects ({} versions)",
        storage.object_count("demo-bucket"),
        storage.version_count("demo-bucket")
    );

    store.delete("demo-bucket").await?;
    println!(
        "Deleted bucket using {} list calls and batches of {:?}",
        storage.request_count(Operation::ListObjects) + storage.request_count(Operation::ListObjectVersions),
        storage.delete_batch_sizes()
    );

    Ok(())
}
