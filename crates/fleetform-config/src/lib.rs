//! Provider configuration for fleetform.
//!
//! The host hands the provider a tri-state configuration record at the
//! configure boundary. Region must be known at plan time; the remaining
//! attributes must be either null or known -- an unknown value anywhere in
//! the configuration is a fatal configuration-time diagnostic, because the
//! session is built exactly once and cannot be deferred.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use fleetform_aws::SessionSettings;
use fleetform_core::{Diagnostic, Diagnostics, Value};

/// Tri-state provider configuration, as decoded from the host.
///
/// Attributes the host omits entirely read as Null (explicitly absent);
/// only an explicit unknown marker on the wire produces Unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Named profile from the shared AWS config files.
    #[serde(default = "null")]
    pub profile: Value<String>,

    /// AWS region; mandatory and must be known at plan time.
    #[serde(default = "null")]
    pub region: Value<String>,

    /// Cap on SDK-level attempts per API call.
    #[serde(default = "null")]
    pub retry_max_attempts: Value<u32>,

    /// Cap on SDK-level backoff per API call, in seconds.
    #[serde(default = "null")]
    pub retry_max_backoff_seconds: Value<u64>,

    /// Default tags merged under every resource's declared tags.
    #[serde(default = "null")]
    pub default_tags: Value<BTreeMap<String, String>>,
}

fn null<T>() -> Value<T> {
    Value::Null
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            profile: Value::Null,
            region: Value::Null,
            retry_max_attempts: Value::Null,
            retry_max_backoff_seconds: Value::Null,
            default_tags: Value::Null,
        }
    }
}

impl ProviderConfig {
    /// Validate the configuration contract and produce session settings.
    ///
    /// Returns diagnostics instead of settings when any attribute violates
    /// the unknown/null rules.
    pub fn into_session_settings(self) -> Result<SessionSettings, Diagnostics> {
        let mut diags = Diagnostics::new();

        if !self.region.is_known() {
            let mut diag = Diagnostic::error("missing provider region").with_attribute("region");
            diag = if self.region.is_unknown() {
                diag.with_detail("region cannot be derived from another resource; set it to a literal value")
            } else {
                diag.with_detail("the provider cannot construct AWS clients without a region")
            };
            diags.push(diag);
        }

        for (attribute, unknown) in [
            ("profile", self.profile.is_unknown()),
            ("retry_max_attempts", self.retry_max_attempts.is_unknown()),
            (
                "retry_max_backoff_seconds",
                self.retry_max_backoff_seconds.is_unknown(),
            ),
            ("default_tags", self.default_tags.is_unknown()),
        ] {
            if unknown {
                diags.push(
                    Diagnostic::error("unknown provider configuration value")
                        .with_attribute(attribute)
                        .with_detail(
                            "provider configuration is resolved before any resource exists, so this value must be known or null",
                        ),
                );
            }
        }

        if diags.has_errors() {
            return Err(diags);
        }

        Ok(SessionSettings {
            profile: self.profile.into_known(),
            region: self.region.into_known().unwrap_or_default(),
            retry_max_attempts: self.retry_max_attempts.into_known(),
            retry_max_backoff: self
                .retry_max_backoff_seconds
                .into_known()
                .map(Duration::from_secs),
            default_tags: self.default_tags.into_known().unwrap_or_default(),
        })
    }
}
