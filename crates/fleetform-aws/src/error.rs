// ── AWS error classification ──
//
// A thin semantic taxonomy over the AWS error envelope. Reconcilers never
// match raw code strings -- they dispatch on `ApiErrorKind` and the `is_*`
// helpers, which double as retry predicates.

use aws_sdk_appstream::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// Semantic classification of an AWS service error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// `ResourceNotFoundException` -- the object is gone (or not yet visible).
    NotFound,

    /// `EntitlementNotFoundException` -- the entitlement variant of NotFound.
    EntitlementNotFound,

    /// `ResourceAlreadyExistsException` / `EntitlementAlreadyExistsException`.
    AlreadyExists,

    /// `ConcurrentModificationException` -- safe to retry.
    ConcurrentModification,

    /// `OperationNotPermittedException` -- transient ordering condition
    /// during create/associate, safe to retry.
    OperationNotPermitted,

    /// `InvalidParameterCombinationException` / `InvalidRoleException`.
    InvalidParameter,

    /// `LimitExceededException` / `RequestLimitExceededException`.
    LimitExceeded,

    /// Anything else -- surfaced verbatim with its code.
    Other,
}

impl ApiErrorKind {
    /// Classify a raw AWS error code string.
    pub fn from_code(code: &str) -> Self {
        match code {
            "ResourceNotFoundException" => Self::NotFound,
            "EntitlementNotFoundException" => Self::EntitlementNotFound,
            "ResourceAlreadyExistsException" | "EntitlementAlreadyExistsException" => {
                Self::AlreadyExists
            }
            "ConcurrentModificationException" => Self::ConcurrentModification,
            "OperationNotPermittedException" => Self::OperationNotPermitted,
            "InvalidParameterCombinationException" | "InvalidRoleException" => {
                Self::InvalidParameter
            }
            "LimitExceededException" | "RequestLimitExceededException" => Self::LimitExceeded,
            _ => Self::Other,
        }
    }
}

/// Classified AWS API error.
///
/// Wraps the rendered message and original code so diagnostics can show the
/// user exactly what AWS said, while reconcilers branch on `kind`.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub code: Option<String>,
    pub message: String,
}

impl ApiError {
    /// Classify any `SdkError` whose service error carries AWS error metadata.
    pub fn from_sdk<E, R>(err: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
        R: std::fmt::Debug + Send + Sync + 'static,
    {
        let code = err.meta().code().map(str::to_owned);
        let kind = code
            .as_deref()
            .map_or(ApiErrorKind::Other, ApiErrorKind::from_code);
        let message = match err.meta().message() {
            Some(msg) => msg.to_owned(),
            None => DisplayErrorContext(&err).to_string(),
        };
        Self {
            kind,
            code,
            message,
        }
    }

    /// Build an error from a bare code/message pair (used by tests and by
    /// callers that synthesize terminal conditions).
    pub fn from_parts(code: &str, message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::from_code(code),
            code: Some(code.to_owned()),
            message: message.into(),
        }
    }

    /// True for both NotFound flavors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind,
            ApiErrorKind::NotFound | ApiErrorKind::EntitlementNotFound
        )
    }

    /// True for conflicts that carry import guidance.
    pub fn is_already_exists(&self) -> bool {
        self.kind == ApiErrorKind::AlreadyExists
    }

    /// Transient conditions retried on create/update paths.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            ApiErrorKind::OperationNotPermitted | ApiErrorKind::ConcurrentModification
        )
    }

    /// Retry predicate for create paths: transient conditions plus
    /// eventually-consistent missing dependencies.
    pub fn is_retryable_create(&self) -> bool {
        self.is_transient() || self.is_not_found()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_not_found_codes() {
        assert_eq!(
            ApiErrorKind::from_code("ResourceNotFoundException"),
            ApiErrorKind::NotFound
        );
        assert_eq!(
            ApiErrorKind::from_code("EntitlementNotFoundException"),
            ApiErrorKind::EntitlementNotFound
        );
    }

    #[test]
    fn classifies_conflicts() {
        assert!(ApiError::from_parts("ResourceAlreadyExistsException", "exists").is_already_exists());
        assert!(
            ApiError::from_parts("EntitlementAlreadyExistsException", "exists")
                .is_already_exists()
        );
    }

    #[test]
    fn transient_covers_both_retryable_codes() {
        assert!(ApiError::from_parts("OperationNotPermittedException", "wait").is_transient());
        assert!(ApiError::from_parts("ConcurrentModificationException", "busy").is_transient());
        assert!(!ApiError::from_parts("LimitExceededException", "cap").is_transient());
    }

    #[test]
    fn create_retry_includes_missing_dependency() {
        let err = ApiError::from_parts("ResourceNotFoundException", "stack not visible yet");
        assert!(err.is_retryable_create());
        assert!(!err.is_transient());
    }

    #[test]
    fn unknown_code_is_other() {
        let err = ApiError::from_parts("IncompatibleImageException", "bad image");
        assert_eq!(err.kind, ApiErrorKind::Other);
        assert!(!err.is_retryable_create());
    }
}
