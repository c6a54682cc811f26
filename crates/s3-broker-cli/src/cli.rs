//! Command line arguments

use clap::{Parser, Subcommand, ValueEnum};
use s3_broker_core::DeletePhase;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "s3-broker")]
#[command(about = "Provision, inspect and tear down S3 buckets")]
#[command(version)]
pub struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, env = "S3_BROKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "S3_BROKER_DEBUG")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show a bucket's ARN and region
    Describe {
        bucket: String,
        /// ARN partition; defaults to the configured one
        #[arg(long)]
        partition: Option<String>,
    },

    /// Create a bucket and apply its policy
    Create {
        bucket: String,
        /// Policy template file; defaults to the configured policy
        #[arg(long)]
        policy_file: Option<PathBuf>,
        /// Tag available to the policy template as .Tags.<key> (repeatable)
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<(String, String)>,
    },

    /// Change a bucket (not supported)
    Modify { bucket: String },

    /// Empty a bucket and delete it
    Delete {
        bucket: String,
        /// Skip the phases a previous interrupted delete completed
        #[arg(long, value_enum)]
        resume_from: Option<ResumePhase>,
        /// Succeed when the bucket does not exist
        #[arg(long)]
        missing_ok: bool,
    },
}

/// Where to resume an interrupted delete
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePhase {
    Objects,
    Versions,
    Bucket,
}

impl From<ResumePhase> for DeletePhase {
    fn from(phase: ResumePhase) -> Self {
        match phase {
            ResumePhase::Objects => DeletePhase::PurgingObjects,
            ResumePhase::Versions => DeletePhase::PurgingVersions,
            ResumePhase::Bucket => DeletePhase::DeletingBucket,
        }
    }
}

fn parse_tag(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_with_tags() {
        let cli = Cli::try_parse_from([
            "s3-broker",
            "create",
            "my-bucket",
            "--tag",
            "team=storage",
            "--tag",
            "env=",
            "--policy-file",
            "policy.json",
        ])
        .unwrap();

        assert_eq!(
            cli.command,
            Command::Create {
                bucket: "my-bucket".into(),
                policy_file: Some(PathBuf::from("policy.json")),
                tags: vec![
                    ("team".into(), "storage".into()),
                    ("env".into(), String::new()),
                ],
            }
        );
    }

    #[test]
    fn test_rejects_malformed_tag() {
        assert!(Cli::try_parse_from(["s3-broker", "create", "b", "--tag", "=x"]).is_err());
        assert!(Cli::try_parse_from(["s3-broker", "create", "b", "--tag", "novalue"]).is_err());
    }

    #[test]
    fn test_parse_delete_resume() {
        let cli = Cli::try_parse_from([
            "s3-broker",
            "--debug",
            "delete",
            "old-bucket",
            "--resume-from",
            "versions",
            "--missing-ok",
        ])
        .unwrap();

        assert!(cli.debug);
        match cli.command {
            Command::Delete { bucket, resume_from, missing_ok } => {
                assert_eq!(bucket, "old-bucket");
                assert_eq!(resume_from.map(DeletePhase::from), Some(DeletePhase::PurgingVersions));
                assert!(missing_ok);
            }
            other => panic!("Expected delete, got {other:?}"),
        }
    }
}
