//! Subcommand execution

use crate::{BrokerConfig, Command};
use anyhow::Context;
use s3_broker_core::{
    BucketDetails, BucketError, BucketLifecycle, BucketStore, DeletePhase, ObjectStorage,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run one command against `store`, returning the JSON to print
pub async fn execute<S: ObjectStorage>(
    store: &BucketStore<S>,
    command: Command,
    config: &BrokerConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<Value> {
    match command {
        Command::Describe { bucket, partition } => {
            let partition = partition.unwrap_or_else(|| config.s3.partition.clone());
            let details = store
                .describe(&bucket, &partition)
                .await
                .with_context(|| format!("failed to describe bucket {}", bucket))?;
            Ok(serde_json::to_value(&details)?)
        }

        Command::Create {
            bucket,
            policy_file,
            tags,
        } => {
            let policy = match policy_file {
                Some(path) => Some(
                    tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("failed to read policy file {}", path.display()))?,
                ),
                None => config.s3.policy.clone(),
            };

            let mut details = BucketDetails::new(&bucket, &config.s3.partition)
                .with_region(&config.s3.region);
            details.tags.extend(tags);
            details.policy = policy;

            let location = store
                .create(&bucket, details.clone())
                .await
                .with_context(|| format!("failed to create bucket {}", bucket))?;
            info!(%bucket, %location, "Created bucket");

            Ok(json!({ "bucket": bucket, "arn": details.arn(), "location": location }))
        }

        Command::Modify { bucket } => {
            let details = BucketDetails::new(&bucket, &config.s3.partition);
            store
                .modify(&bucket, details)
                .await
                .with_context(|| format!("failed to modify bucket {}", bucket))?;
            Ok(json!({ "bucket": bucket }))
        }

        Command::Delete {
            bucket,
            resume_from,
            missing_ok,
        } => {
            let start = resume_from
                .map(DeletePhase::from)
                .unwrap_or(DeletePhase::PurgingObjects);

            match store.delete_from(&bucket, start, cancel).await {
                Ok(()) => Ok(json!({ "bucket": bucket, "deleted": true })),
                Err(BucketError::NotFound { .. }) if missing_ok => {
                    warn!(%bucket, "Bucket does not exist, nothing to delete");
                    Ok(json!({ "bucket": bucket, "deleted": false }))
                }
                Err(err) => {
                    let hint = err.phase().map(|phase| match phase {
                        DeletePhase::PurgingObjects => "objects",
                        DeletePhase::PurgingVersions => "versions",
                        DeletePhase::DeletingBucket => "bucket",
                    });
                    let context = match hint {
                        Some(hint) => format!(
                            "failed to delete bucket {} (rerun with --resume-from {})",
                            bucket, hint
                        ),
                        None => format!("failed to delete bucket {}", bucket),
                    };
                    Err(anyhow::Error::new(err).context(context))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s3_broker_client::{MemoryStorage, Operation};
    use std::io::Write;

    fn store() -> (MemoryStorage, BucketStore<MemoryStorage>) {
        let storage = MemoryStorage::new();
        (storage.clone(), BucketStore::new(storage))
    }

    #[tokio::test]
    async fn test_create_with_policy_file_and_tags() {
        let (storage, store) = store();
        let mut policy = tempfile::NamedTempFile::new().unwrap();
        write!(policy, r#"{{"Resource":"{{{{.ARN}}}}","Owner":"{{{{.Tags.team}}}}"}}"#).unwrap();

        let out = execute(
            &store,
            Command::Create {
                bucket: "tagged".into(),
                policy_file: Some(policy.path().to_path_buf()),
                tags: vec![("team".into(), "storage".into())],
            },
            &BrokerConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(out["arn"], "arn:aws:s3:::tagged");
        assert_eq!(out["location"], "/tagged");
        assert_eq!(
            storage.bucket_policy("tagged").as_deref(),
            Some(r#"{"Resource":"arn:aws:s3:::tagged","Owner":"storage"}"#)
        );
    }

    #[tokio::test]
    async fn test_create_uses_configured_policy() {
        let (storage, store) = store();
        let mut config = BrokerConfig::default();
        config.s3.policy = Some(r#"{"Sid":"{{.BucketName}}"}"#.into());

        execute(
            &store,
            Command::Create {
                bucket: "configured".into(),
                policy_file: None,
                tags: vec![],
            },
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(
            storage.bucket_policy("configured").as_deref(),
            Some(r#"{"Sid":"configured"}"#)
        );
    }

    #[tokio::test]
    async fn test_describe_uses_partition_override() {
        let (_storage, store) = store();
        let config = BrokerConfig::default();
        let cancel = CancellationToken::new();
        execute(
            &store,
            Command::Create { bucket: "b".into(), policy_file: None, tags: vec![] },
            &config,
            &cancel,
        )
        .await
        .unwrap();

        let out = execute(
            &store,
            Command::Describe { bucket: "b".into(), partition: Some("aws-cn".into()) },
            &config,
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(out["arn"], "arn:aws-cn:s3:::b");
        assert_eq!(out["region"], "us-east-1");
    }

    #[tokio::test]
    async fn test_delete_missing_ok() {
        let (_storage, store) = store();
        let config = BrokerConfig::default();
        let cancel = CancellationToken::new();

        let delete = |missing_ok| Command::Delete {
            bucket: "ghost".into(),
            resume_from: None,
            missing_ok,
        };

        let out = execute(&store, delete(true), &config, &cancel).await.unwrap();
        assert_eq!(out["deleted"], false);

        let err = execute(&store, delete(false), &config, &cancel).await.unwrap_err();
        assert!(err.downcast_ref::<BucketError>().unwrap().is_not_found());
    }

    #[tokio::test]
    async fn test_failed_delete_suggests_resume() {
        let (storage, store) = store();
        storage.create_bucket("stuck").await.unwrap();
        storage.inject_failure(Operation::DeleteBucket, 503, "SlowDown");

        let err = execute(
            &store,
            Command::Delete { bucket: "stuck".into(), resume_from: None, missing_ok: false },
            &BrokerConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("--resume-from bucket"));
        assert!(storage.bucket_exists("stuck"));
    }

    #[tokio::test]
    async fn test_modify_fails() {
        let (_storage, store) = store();
        let err = execute(
            &store,
            Command::Modify { bucket: "b".into() },
            &BrokerConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BucketError>(),
            Some(BucketError::Unimplemented(_))
        ));
    }
}
