//! Identity tags
//!
//! Every resource created by nestor carries four tags that tie it to one
//! application, one environment and one logical resource id. A resource that
//! already exists is only adopted when all four tags match.

use crate::resource::LogicalResourceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const TAG_APP_NAME: &str = "appName";
pub const TAG_ENVIRONMENT: &str = "environment";
pub const TAG_SCHEMA_VERSION: &str = "nv";
pub const TAG_CORRELATION_ID: &str = "nestorId";

/// Tag schema version written to the `nv` tag
pub const SCHEMA_VERSION: &str = "1";

pub type TagMap = BTreeMap<String, String>;

/// The (application, environment) pair a deployment acts on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentIdentity {
    pub app_name: String,
    pub environment: String,
    pub schema_version: String,
}

impl DeploymentIdentity {
    pub fn new(app_name: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            environment: environment.into(),
            schema_version: SCHEMA_VERSION.to_string(),
        }
    }
}

impl fmt::Display for DeploymentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_name, self.environment)
    }
}

/// First tag that failed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMismatch {
    pub key: String,
    pub expected: String,
    /// `None` when the tag is missing entirely
    pub actual: Option<String>,
}

impl fmt::Display for TagMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.actual {
            Some(actual) => write!(
                f,
                "tag {} expected '{}', found '{}'",
                self.key, self.expected, actual
            ),
            None => write!(f, "tag {} expected '{}', found <missing>", self.key, self.expected),
        }
    }
}

fn expected_tags<'a>(
    identity: &'a DeploymentIdentity,
    correlation_id: &'a LogicalResourceId,
) -> [(&'static str, &'a str); 4] {
    [
        (TAG_APP_NAME, identity.app_name.as_str()),
        (TAG_ENVIRONMENT, identity.environment.as_str()),
        (TAG_CORRELATION_ID, correlation_id.as_str()),
        (TAG_SCHEMA_VERSION, identity.schema_version.as_str()),
    ]
}

/// Builds the tag set for a resource about to be created
pub fn encode(identity: &DeploymentIdentity, correlation_id: &LogicalResourceId) -> TagMap {
    expected_tags(identity, correlation_id)
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Checks observed tags against the expected identity.
///
/// Keys are checked in a fixed order (appName, environment, nestorId, nv) and
/// the first failure is returned. Extra tags are ignored.
pub fn verify(
    observed: &TagMap,
    identity: &DeploymentIdentity,
    correlation_id: &LogicalResourceId,
) -> Result<(), TagMismatch> {
    for (key, expected) in expected_tags(identity, correlation_id) {
        match observed.get(key) {
            Some(actual) if actual == expected => {}
            actual => {
                return Err(TagMismatch {
                    key: key.to_string(),
                    expected: expected.to_string(),
                    actual: actual.cloned(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (DeploymentIdentity, LogicalResourceId) {
        (
            DeploymentIdentity::new("app", "dev"),
            LogicalResourceId::from("resources.s3_bucket.store"),
        )
    }

    #[test]
    fn test_encode_produces_four_tags() {
        let (identity, id) = fixture();
        let tags = encode(&identity, &id);

        assert_eq!(tags.len(), 4);
        assert_eq!(tags.get(TAG_APP_NAME).map(String::as_str), Some("app"));
        assert_eq!(tags.get(TAG_ENVIRONMENT).map(String::as_str), Some("dev"));
        assert_eq!(
            tags.get(TAG_CORRELATION_ID).map(String::as_str),
            Some("resources.s3_bucket.store")
        );
        assert_eq!(tags.get(TAG_SCHEMA_VERSION).map(String::as_str), Some("1"));
    }

    #[test]
    fn test_verify_accepts_own_tags_with_extras() {
        let (identity, id) = fixture();
        let mut tags = encode(&identity, &id);
        tags.insert("costCenter".to_string(), "42".to_string());

        assert!(verify(&tags, &identity, &id).is_ok());
    }

    #[test]
    fn test_verify_reports_first_mismatch_in_order() {
        let (identity, id) = fixture();
        let mut tags = encode(&identity, &id);
        tags.insert(TAG_ENVIRONMENT.to_string(), "prod".to_string());
        tags.remove(TAG_CORRELATION_ID);

        let mismatch = verify(&tags, &identity, &id).unwrap_err();
        assert_eq!(mismatch.key, TAG_ENVIRONMENT);
        assert_eq!(mismatch.expected, "dev");
        assert_eq!(mismatch.actual.as_deref(), Some("prod"));
    }

    #[test]
    fn test_verify_missing_tag() {
        let (identity, id) = fixture();
        let mismatch = verify(&TagMap::new(), &identity, &id).unwrap_err();

        assert_eq!(mismatch.key, TAG_APP_NAME);
        assert!(mismatch.actual.is_none());
        assert!(mismatch.to_string().contains("<missing>"));
    }

    #[test]
    fn test_verify_other_correlation_id() {
        let (identity, id) = fixture();
        let other = LogicalResourceId::from("resources.s3_bucket.archive");
        let tags = encode(&identity, &other);

        let mismatch = verify(&tags, &identity, &id).unwrap_err();
        assert_eq!(mismatch.key, TAG_CORRELATION_ID);
    }
}
