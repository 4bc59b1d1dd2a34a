// ── Session bootstrap ──
//
// Builds the process-scoped Session after configuration validation:
// one shared `aws-config` resolution feeding both service clients.
// Immutable after construction; safe to share across reconcilers.

use std::collections::BTreeMap;
use std::time::Duration;

use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use tracing::info;

/// Validated connection settings for [`Session::connect`].
///
/// `region` is mandatory; the rest fall back to the AWS default chain.
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    /// Named profile from the shared AWS config files.
    pub profile: Option<String>,

    /// Region every API call is issued against.
    pub region: String,

    /// Cap on SDK-level attempts per call (the reconcilers' own retry
    /// engine sits above this).
    pub retry_max_attempts: Option<u32>,

    /// Cap on SDK-level backoff per call.
    pub retry_max_backoff: Option<Duration>,

    /// Provider-level default tags merged under every resource's declared
    /// tags.
    pub default_tags: BTreeMap<String, String>,
}

/// Shared, read-only handle to the AWS service clients and default tags.
#[derive(Clone)]
pub struct Session {
    appstream: aws_sdk_appstream::Client,
    tagging: aws_sdk_resourcegroupstagging::Client,
    default_tags: BTreeMap<String, String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("default_tags", &self.default_tags)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Resolve the AWS configuration chain and construct both clients.
    ///
    /// Constructed exactly once, at the provider's configure boundary.
    pub async fn connect(settings: SessionSettings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));

        if let Some(ref profile) = settings.profile {
            loader = loader.profile_name(profile);
        }

        let mut retry = RetryConfig::standard();
        if let Some(max_attempts) = settings.retry_max_attempts {
            retry = retry.with_max_attempts(max_attempts);
        }
        if let Some(max_backoff) = settings.retry_max_backoff {
            retry = retry.with_max_backoff(max_backoff);
        }

        let shared = loader.retry_config(retry).load().await;

        info!(
            region = %settings.region,
            profile = settings.profile.as_deref().unwrap_or("<default>"),
            "AWS session established"
        );

        Self {
            appstream: aws_sdk_appstream::Client::new(&shared),
            tagging: aws_sdk_resourcegroupstagging::Client::new(&shared),
            default_tags: settings.default_tags,
        }
    }

    /// Wrap pre-built clients (used by tests).
    pub fn from_clients(
        appstream: aws_sdk_appstream::Client,
        tagging: aws_sdk_resourcegroupstagging::Client,
        default_tags: BTreeMap<String, String>,
    ) -> Self {
        Self {
            appstream,
            tagging,
            default_tags,
        }
    }

    pub fn appstream(&self) -> &aws_sdk_appstream::Client {
        &self.appstream
    }

    pub fn tagging(&self) -> &aws_sdk_resourcegroupstagging::Client {
        &self.tagging
    }

    pub fn default_tags(&self) -> &BTreeMap<String, String> {
        &self.default_tags
    }
}
