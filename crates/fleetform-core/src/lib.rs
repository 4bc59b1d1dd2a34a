// fleetform-core: desired-state reconciliation for AppStream 2.0 resources.

pub mod diag;
pub mod identity;
pub mod provider;
pub mod resource;
pub mod tags;
pub mod value;

// ── Primary re-exports ──────────────────────────────────────────────
pub use diag::{Diagnostic, Diagnostics, Severity};
pub use provider::{DynLifecycle, Provider};
pub use resource::{Lifecycle, OpContext, OpError, OpResult};
pub use tags::{TagPatch, TagReconciler, diff_tags, merge_tags};
pub use value::{FieldAction, Value};

// Re-export the AWS boundary for consumers that wire the provider up.
pub use fleetform_aws::{ApiError, ApiErrorKind, Session, SessionSettings};
