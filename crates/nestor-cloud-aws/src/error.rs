//! AWS error classification
//!
//! Maps SDK errors onto `ProviderError` using the error code from
//! `ProvideErrorMetadata` instead of matching on Debug output.

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use nestor_cloud::{ProviderError, RetryConfig, with_retry};
use std::future::Future;
use thiserror::Error;

/// Errors raised while setting up the AWS context
#[derive(Debug, Error)]
pub enum AwsError {
    #[error("could not resolve AWS account: {0}")]
    Account(String),

    #[error("failed to read lambda package {path}: {source}")]
    Package {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "NoSuchBucket",
    "NoSuchEntity",
    "NotFound",
    "NotFoundException",
    "ResourceNotFoundException",
];

/// Known AWS error codes for "already exists" conditions
const ALREADY_EXISTS_CODES: &[&str] = &[
    "BucketAlreadyOwnedByYou",
    "BucketAlreadyExists",
    "EntityAlreadyExists",
    "ResourceConflictException",
    "ResourceInUseException",
    "ResourceAlreadyExistsException",
    "ConflictException",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "SlowDown",
];

const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "NotAuthorizedException",
    "UnauthorizedOperation",
];

const INVALID_INPUT_CODES: &[&str] = &[
    "InvalidParameterValueException",
    "InvalidParameterException",
    "InvalidBucketName",
    "MalformedPolicyDocument",
    "ValidationException",
    "BadRequestException",
];

/// Lambda rejects a freshly created role until IAM has propagated it
const ROLE_PROPAGATION_HINTS: &[&str] = &["cannot be assumed", "role defined for the function"];

/// S3 cannot see a just-added invoke permission yet
const DESTINATION_PROPAGATION_HINT: &str = "Unable to validate the following destination configurations";

pub fn is_not_found_code(code: Option<&str>) -> bool {
    code.is_some_and(|c| NOT_FOUND_CODES.contains(&c))
}

/// Classify an AWS error by code and message
pub fn classify_code(code: Option<&str>, message: &str) -> ProviderError {
    let message = message.to_string();
    match code {
        Some("InvalidParameterValueException")
            if ROLE_PROPAGATION_HINTS.iter().any(|hint| message.contains(hint)) =>
        {
            ProviderError::Propagation(message)
        }
        Some("InvalidArgument") if message.contains(DESTINATION_PROPAGATION_HINT) => {
            ProviderError::Propagation(message)
        }
        Some(c) if ALREADY_EXISTS_CODES.contains(&c) => ProviderError::AlreadyExists(message),
        Some(c) if THROTTLING_CODES.contains(&c) => ProviderError::Throttled(message),
        Some(c) if ACCESS_DENIED_CODES.contains(&c) => ProviderError::AccessDenied(message),
        Some(c) if INVALID_INPUT_CODES.contains(&c) => ProviderError::InvalidInput(message),
        Some(c) => ProviderError::api(c, message),
        None => ProviderError::api("Unknown", message),
    }
}

/// Classify any SDK error
pub fn classify<E>(error: &E) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    let message = match error.message() {
        Some(message) => message.to_string(),
        None => DisplayErrorContext(error).to_string(),
    };
    classify_code(error.code(), &message)
}

/// Failure of a call made after the resource itself was created.
///
/// Only the creating call may report `AlreadyExists`; anything a later step
/// raises means the resource is incomplete, which is terminal.
pub fn incomplete_create(step: &str, error: ProviderError) -> ProviderError {
    let code = match &error {
        ProviderError::Api { code, .. } => code.clone(),
        _ => "IncompleteCreate".to_string(),
    };
    ProviderError::api(code, format!("{step} failed after create: {error}"))
}

/// Runs a follow-up call of `create` with its own retries
pub(crate) async fn follow_up<T, Op, Fut>(
    retry: &RetryConfig,
    step: &str,
    operation: Op,
) -> Result<T, ProviderError>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    with_retry(retry, ProviderError::retry_class, operation)
        .await
        .map_err(|e| incomplete_create(step, e.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestor_cloud::RetryClass;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn fast() -> RetryConfig {
        RetryConfig::new(3, Duration::from_millis(1))
    }

    #[test]
    fn test_already_exists_codes() {
        for code in ["BucketAlreadyOwnedByYou", "EntityAlreadyExists", "ResourceConflictException"] {
            assert!(classify_code(Some(code), "exists").is_already_exists(), "{code}");
        }
    }

    #[test]
    fn test_throttling_is_retryable() {
        let err = classify_code(Some("ThrottlingException"), "Rate exceeded");
        assert_eq!(err, ProviderError::Throttled("Rate exceeded".to_string()));
        assert_eq!(err.retry_class(), RetryClass::Retryable);
    }

    #[test]
    fn test_role_propagation_is_retryable() {
        let err = classify_code(
            Some("InvalidParameterValueException"),
            "The role defined for the function cannot be assumed by Lambda.",
        );
        assert!(matches!(err, ProviderError::Propagation(_)));
        assert_eq!(err.retry_class(), RetryClass::Retryable);
    }

    #[test]
    fn test_notification_destination_propagation_is_retryable() {
        let err = classify_code(
            Some("InvalidArgument"),
            "Unable to validate the following destination configurations",
        );
        assert!(matches!(err, ProviderError::Propagation(_)));
    }

    #[test]
    fn test_other_invalid_parameter_is_terminal() {
        let err = classify_code(Some("InvalidParameterValueException"), "Unsupported runtime");
        assert!(matches!(err, ProviderError::InvalidInput(_)));
        assert_eq!(err.retry_class(), RetryClass::Terminal);
    }

    #[test]
    fn test_unknown_code_keeps_code() {
        let err = classify_code(Some("KMSDisabledException"), "key disabled");
        assert_eq!(err, ProviderError::api("KMSDisabledException", "key disabled"));
        assert!(matches!(classify_code(None, "timeout"), ProviderError::Api { .. }));
    }

    #[test]
    fn test_not_found_codes() {
        assert!(is_not_found_code(Some("NoSuchEntity")));
        assert!(is_not_found_code(Some("ResourceNotFoundException")));
        assert!(!is_not_found_code(Some("AccessDenied")));
        assert!(!is_not_found_code(None));
    }

    #[test]
    fn test_follow_up_failure_is_never_already_exists() {
        for error in [
            classify_code(Some("EntityAlreadyExists"), "exists"),
            classify_code(Some("Throttling"), "slow down"),
            classify_code(Some("NoSuchEntity"), "policy missing"),
        ] {
            let wrapped = incomplete_create("AttachRolePolicy", error);
            assert!(!wrapped.is_already_exists(), "{wrapped}");
            assert_eq!(wrapped.retry_class(), RetryClass::Terminal);
        }

        let api = incomplete_create("PutBucketTagging", ProviderError::api("MalformedXML", "bad tags"));
        assert!(matches!(api, ProviderError::Api { ref code, .. } if code == "MalformedXML"));
    }

    #[tokio::test]
    async fn test_follow_up_retries_throttling() {
        let calls = AtomicU32::new(0);
        let result = follow_up(&fast(), "PutBucketTagging", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(ProviderError::Throttled("slow down".to_string()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(assert_ok!(result), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_follow_up_is_terminal() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = follow_up(&fast(), "AttachRolePolicy", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Throttled("rate exceeded".to_string())) }
        })
        .await;

        let err = assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!err.is_already_exists());
        assert_eq!(err.retry_class(), RetryClass::Terminal);
    }
}
