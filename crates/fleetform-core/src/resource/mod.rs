// ── Per-kind reconcilers ──
//
// One module per resource kind, each implementing the Lifecycle capability
// set against the contracts shared by every kind: identity is required and
// stable, NotFound collapses to absence, AlreadyExists carries import
// guidance, and cancellation is a silent no-op.

pub mod application;
pub mod application_entitlement;
pub mod entitlement;
pub mod fleet;
pub mod fleet_stack;
pub mod shared;
pub mod stack;
pub mod user;

use async_trait::async_trait;
use fleetform_aws::{ApiError, RetryError, Session};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::diag::{Diagnostic, Diagnostics};
use crate::identity::IdentityError;
use crate::value::Value;

pub use application::ApplicationReconciler;
pub use application_entitlement::ApplicationEntitlementReconciler;
pub use entitlement::EntitlementReconciler;
pub use fleet::FleetReconciler;
pub use fleet_stack::FleetStackReconciler;
pub use stack::StackReconciler;
pub use user::UserReconciler;

/// Ambient context for one reconciler invocation: the shared session and
/// the host's cancellation token.
#[derive(Debug, Clone)]
pub struct OpContext {
    pub session: Session,
    pub cancel: CancellationToken,
}

impl OpContext {
    pub fn new(session: Session, cancel: CancellationToken) -> Self {
        Self { session, cancel }
    }

    pub fn appstream(&self) -> &aws_sdk_appstream::Client {
        self.session.appstream()
    }

    pub fn tags(&self) -> crate::tags::TagReconciler<'_> {
        crate::tags::TagReconciler::new(&self.session)
    }
}

/// Failure currency of every reconciler operation.
#[derive(Debug)]
pub enum OpError {
    /// The host cancelled the operation; suppressed as a no-op.
    Cancelled,
    /// One or more diagnostics for the host to render.
    Failed(Diagnostics),
}

pub type OpResult<T> = Result<T, OpError>;

impl From<Diagnostic> for OpError {
    fn from(diag: Diagnostic) -> Self {
        Self::Failed(diag.into())
    }
}

impl From<Diagnostics> for OpError {
    fn from(diags: Diagnostics) -> Self {
        Self::Failed(diags)
    }
}

impl From<IdentityError> for OpError {
    fn from(err: IdentityError) -> Self {
        Diagnostic::error("invalid import identifier")
            .with_detail(err.to_string())
            .into()
    }
}

/// Per-kind reconciler capability set.
///
/// `read` and `update` return `None` when the remote object has vanished;
/// the host clears its state and treats the operation as succeeded-but-gone.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    type State: Serialize + DeserializeOwned + Send + 'static;

    fn type_name(&self) -> &'static str;

    /// Cross-attribute rules the attribute-level schema cannot express.
    /// Unknown values skip each check (deferred until apply).
    fn validate(&self, _config: &Self::State) -> Diagnostics {
        Diagnostics::new()
    }

    async fn create(&self, ctx: &OpContext, plan: Self::State) -> OpResult<Self::State>;

    async fn read(&self, ctx: &OpContext, state: Self::State) -> OpResult<Option<Self::State>>;

    async fn update(
        &self,
        ctx: &OpContext,
        plan: Self::State,
        state: Self::State,
    ) -> OpResult<Option<Self::State>>;

    async fn delete(&self, ctx: &OpContext, state: Self::State) -> OpResult<()>;

    /// Parse the import identifier and stash its identity fields so the
    /// next read repopulates everything else.
    fn import_state(&self, id: &str) -> OpResult<Self::State>;
}

// ── Shared helpers ──────────────────────────────────────────────────

/// Require an attribute to be Known; identity-forming and
/// mandatory-on-create fields may not be Unknown or Null.
pub(crate) fn require_known<'a, T>(value: &'a Value<T>, attribute: &str) -> Result<&'a T, OpError> {
    value.as_known().ok_or_else(|| {
        Diagnostic::error("missing required attribute")
            .with_attribute(attribute)
            .with_detail("the attribute must be known at apply time")
            .into()
    })
}

/// Diagnostic for an unclassified AWS failure, preserving the error code.
pub(crate) fn api_diag(context: &str, err: &ApiError) -> Diagnostic {
    let mut diag = Diagnostic::error(context.to_owned()).with_detail(err.message.clone());
    if let Some(ref code) = err.code {
        diag.detail = format!("{code}: {}", err.message);
    }
    diag
}

/// Collapse a retry outcome into the operation error space.
pub(crate) fn from_retry(context: &str, err: RetryError<ApiError>) -> OpError {
    match err {
        RetryError::Cancelled => OpError::Cancelled,
        RetryError::TimedOut { source, .. } | RetryError::Terminal(source) => {
            api_diag(context, &source).into()
        }
    }
}

/// Conflict on Create: always print the literal import command with the
/// exact identifier so the practitioner can adopt the existing object.
pub(crate) fn already_exists(type_name: &str, id: &str) -> OpError {
    Diagnostic::error("resource already exists")
        .with_detail(format!(
            "a matching object already exists in AWS; import it with: terraform import {type_name}.example \"{id}\""
        ))
        .into()
}

/// Identity drift between plan and state is a programming error, not a
/// user mistake.
pub(crate) fn identity_drift(type_name: &str, planned: &str, actual: &str) -> OpError {
    Diagnostic::error("identity changed during update")
        .with_detail(format!(
            "{type_name} state id {actual:?} does not match planned id {planned:?}; this is a bug in the provider, please report it"
        ))
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_known_rejects_null_and_unknown() {
        assert!(require_known(&Value::<String>::Null, "name").is_err());
        assert!(require_known(&Value::<String>::Unknown, "name").is_err());
        let v = Value::Known("fleet-a".to_owned());
        assert_eq!(require_known(&v, "name").ok(), Some(&"fleet-a".to_owned()));
    }

    #[test]
    fn already_exists_carries_import_command() {
        let OpError::Failed(diags) = already_exists("fleetform_fleet", "my-fleet") else {
            panic!("expected Failed");
        };
        let text = diags.to_string();
        assert!(text.contains("terraform import fleetform_fleet.example \"my-fleet\""));
    }

    #[test]
    fn cancellation_is_not_a_diagnostic() {
        let err = from_retry("creating fleet", RetryError::<ApiError>::Cancelled);
        assert!(matches!(err, OpError::Cancelled));
    }
}
