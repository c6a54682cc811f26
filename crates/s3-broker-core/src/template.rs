//! Bucket policy templates
//!
//! Policies are written with `{{.Field}}` actions that are replaced by the
//! bucket's own fields when the bucket is created:
//!
//! ```text
//! {"Statement":[{"Effect":"Allow","Resource":"{{.ARN}}/*"}]}
//! ```
//!
//! Supported fields are `.BucketName` (or `.Name`), `.ARN`, `.Region`,
//! `.Partition` and `.Tags.<key>`.

use crate::BucketDetails;
use std::str::FromStr;
use thiserror::Error;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Errors from parsing or rendering a policy template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// `{{` without a matching `}}`
    #[error("unterminated action starting at byte {0}")]
    Unterminated(usize),

    /// `{{ }}`
    #[error("empty action at byte {0}")]
    EmptyAction(usize),

    /// Action that is not a field reference
    #[error("unsupported action {0:?}: expected a field such as .BucketName")]
    InvalidAction(String),

    /// Field the bucket does not have
    #[error("unknown field {0}")]
    UnknownField(String),

    /// `.Tags.<key>` for a tag the bucket does not carry
    #[error("bucket has no tag {0:?}")]
    MissingTag(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Text(String),
    /// Field path without the leading dot
    Field(String),
}

/// A parsed policy template
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyTemplate {
    segments: Vec<Segment>,
}

impl PolicyTemplate {
    /// Parse a template
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut pos = 0;

        while let Some(found) = source[pos..].find(OPEN) {
            let start = pos + found;
            if start > pos {
                segments.push(Segment::Text(source[pos..start].to_string()));
            }

            let inner_start = start + OPEN.len();
            let end = source[inner_start..]
                .find(CLOSE)
                .map(|i| inner_start + i)
                .ok_or(TemplateError::Unterminated(start))?;

            let action = source[inner_start..end].trim();
            if action.is_empty() {
                return Err(TemplateError::EmptyAction(start));
            }
            let field = action
                .strip_prefix('.')
                .filter(|f| !f.is_empty() && !f.contains(char::is_whitespace))
                .ok_or_else(|| TemplateError::InvalidAction(action.to_string()))?;
            segments.push(Segment::Field(field.to_string()));

            pos = end + CLOSE.len();
        }

        if pos < source.len() {
            segments.push(Segment::Text(source[pos..].to_string()));
        }

        Ok(Self { segments })
    }

    /// Substitute the bucket's fields
    pub fn render(&self, details: &BucketDetails) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(field) => out.push_str(&lookup(field, details)?),
            }
        }
        Ok(out)
    }

    /// Whether the template contains any actions
    pub fn has_fields(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Field(_)))
    }
}

impl FromStr for PolicyTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse and render in one step
pub fn render(source: &str, details: &BucketDetails) -> Result<String, TemplateError> {
    PolicyTemplate::parse(source)?.render(details)
}

fn lookup(field: &str, details: &BucketDetails) -> Result<String, TemplateError> {
    match field {
        "BucketName" | "Name" => Ok(details.name.clone()),
        "ARN" => Ok(details.arn()),
        "Region" => Ok(details.region.clone()),
        "Partition" => Ok(details.partition.clone()),
        _ => match field.strip_prefix("Tags.") {
            Some(key) => details
                .tags
                .get(key)
                .cloned()
                .ok_or_else(|| TemplateError::MissingTag(key.to_string())),
            None => Err(TemplateError::UnknownField(format!(".{}", field))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn details() -> BucketDetails {
        BucketDetails::new("my-bucket", "aws")
            .with_region("eu-west-1")
            .with_tag("owner", "team-a")
    }

    #[rstest]
    #[case("{{.BucketName}}", "my-bucket")]
    #[case("{{ .Name }}", "my-bucket")]
    #[case("{{.ARN}}/*", "arn:aws:s3:::my-bucket/*")]
    #[case("{{.Region}}", "eu-west-1")]
    #[case("{{.Partition}}", "aws")]
    #[case("{{.Tags.owner}}", "team-a")]
    #[case("no actions", "no actions")]
    fn test_render_field(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(render(source, &details()).unwrap(), expected);
    }

    #[test]
    fn test_render_policy_document() {
        let source = r#"{
  "Version": "2012-10-17",
  "Statement": [{
    "Effect": "Allow",
    "Principal": "*",
    "Action": ["s3:GetObject"],
    "Resource": ["{{.ARN}}/*"]
  }]
}"#;
        let rendered = render(source, &details()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(json["Statement"][0]["Resource"][0], "arn:aws:s3:::my-bucket/*");
    }

    #[rstest]
    #[case("{{.BucketName", TemplateError::Unterminated(0))]
    #[case("ab{{   }}", TemplateError::EmptyAction(2))]
    #[case("{{BucketName}}", TemplateError::InvalidAction("BucketName".into()))]
    #[case("{{.}}", TemplateError::InvalidAction(".".into()))]
    #[case("{{.Name | upper}}", TemplateError::InvalidAction(".Name | upper".into()))]
    fn test_parse_errors(#[case] source: &str, #[case] expected: TemplateError) {
        assert_eq!(PolicyTemplate::parse(source).unwrap_err(), expected);
    }

    #[test]
    fn test_render_errors() {
        let unknown = render("{{.Owner}}", &details()).unwrap_err();
        assert_eq!(unknown, TemplateError::UnknownField(".Owner".into()));

        let missing = render("{{.Tags.cost-center}}", &details()).unwrap_err();
        assert_eq!(missing, TemplateError::MissingTag("cost-center".into()));
    }

    #[test]
    fn test_has_fields() {
        assert!("{{.ARN}}".parse::<PolicyTemplate>().unwrap().has_fields());
        assert!(!"{}".parse::<PolicyTemplate>().unwrap().has_fields());
    }
}
