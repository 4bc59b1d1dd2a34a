// ── Provider registry ──
//
// Object-safe adapter over the typed reconcilers. The host edge speaks
// serde_json payloads; decoding failures surface as diagnostics, and the
// registry maps resource type names onto boxed lifecycles. The Session is
// the single configure-time boundary: the registry is read-only afterwards.

use std::collections::BTreeMap;

use async_trait::async_trait;
use fleetform_aws::Session;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;

use crate::diag::{Diagnostic, Diagnostics};
use crate::resource::{
    ApplicationEntitlementReconciler, ApplicationReconciler, EntitlementReconciler,
    FleetReconciler, FleetStackReconciler, Lifecycle, OpContext, OpError, OpResult,
    StackReconciler, UserReconciler,
};

/// Object-safe view of a [`Lifecycle`], with JSON payloads at the boundary.
#[async_trait]
pub trait DynLifecycle: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn validate(&self, config: &JsonValue) -> Diagnostics;

    async fn create(&self, ctx: &OpContext, plan: JsonValue) -> OpResult<JsonValue>;

    async fn read(&self, ctx: &OpContext, state: JsonValue) -> OpResult<Option<JsonValue>>;

    async fn update(
        &self,
        ctx: &OpContext,
        plan: JsonValue,
        state: JsonValue,
    ) -> OpResult<Option<JsonValue>>;

    async fn delete(&self, ctx: &OpContext, state: JsonValue) -> OpResult<()>;

    fn import_state(&self, id: &str) -> OpResult<JsonValue>;
}

fn decode<T: serde::de::DeserializeOwned>(kind: &str, payload: JsonValue) -> Result<T, OpError> {
    serde_json::from_value(payload).map_err(|e| {
        Diagnostic::error(format!("malformed {kind} payload"))
            .with_detail(e.to_string())
            .into()
    })
}

fn encode<T: serde::Serialize>(state: &T) -> Result<JsonValue, OpError> {
    serde_json::to_value(state).map_err(|e| {
        Diagnostic::error("failed to encode state payload")
            .with_detail(e.to_string())
            .into()
    })
}

#[async_trait]
impl<L> DynLifecycle for L
where
    L: Lifecycle,
{
    fn type_name(&self) -> &'static str {
        Lifecycle::type_name(self)
    }

    fn validate(&self, config: &JsonValue) -> Diagnostics {
        match serde_json::from_value::<L::State>(config.clone()) {
            Ok(state) => Lifecycle::validate(self, &state),
            Err(e) => Diagnostic::error("malformed config payload")
                .with_detail(e.to_string())
                .into(),
        }
    }

    async fn create(&self, ctx: &OpContext, plan: JsonValue) -> OpResult<JsonValue> {
        let plan = decode("plan", plan)?;
        let state = Lifecycle::create(self, ctx, plan).await?;
        encode(&state)
    }

    async fn read(&self, ctx: &OpContext, state: JsonValue) -> OpResult<Option<JsonValue>> {
        let state = decode("state", state)?;
        match Lifecycle::read(self, ctx, state).await? {
            Some(next) => Ok(Some(encode(&next)?)),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        ctx: &OpContext,
        plan: JsonValue,
        state: JsonValue,
    ) -> OpResult<Option<JsonValue>> {
        let plan = decode("plan", plan)?;
        let state = decode("state", state)?;
        match Lifecycle::update(self, ctx, plan, state).await? {
            Some(next) => Ok(Some(encode(&next)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, ctx: &OpContext, state: JsonValue) -> OpResult<()> {
        let state = decode("state", state)?;
        Lifecycle::delete(self, ctx, state).await
    }

    fn import_state(&self, id: &str) -> OpResult<JsonValue> {
        let state = Lifecycle::import_state(self, id)?;
        encode(&state)
    }
}

/// The configured provider: a shared session plus one reconciler per
/// resource kind.
pub struct Provider {
    session: Session,
    resources: BTreeMap<&'static str, Box<dyn DynLifecycle>>,
}

impl Provider {
    /// Arm the registry with every supported resource kind.
    pub fn new(session: Session) -> Self {
        let mut provider = Self {
            session,
            resources: BTreeMap::new(),
        };
        provider.register(Box::new(ApplicationReconciler));
        provider.register(Box::new(FleetReconciler));
        provider.register(Box::new(StackReconciler));
        provider.register(Box::new(EntitlementReconciler));
        provider.register(Box::new(UserReconciler));
        provider.register(Box::new(FleetStackReconciler));
        provider.register(Box::new(ApplicationEntitlementReconciler));
        provider
    }

    fn register(&mut self, lifecycle: Box<dyn DynLifecycle>) {
        self.resources.insert(lifecycle.type_name(), lifecycle);
    }

    pub fn resource(&self, type_name: &str) -> Option<&dyn DynLifecycle> {
        self.resources.get(type_name).map(|r| r.as_ref())
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resources.keys().copied()
    }

    /// Context for one reconciler invocation under the given token.
    pub fn context(&self, cancel: CancellationToken) -> OpContext {
        OpContext::new(self.session.clone(), cancel)
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_session() -> Session {
        let conf = aws_sdk_appstream::Config::builder()
            .behavior_version(aws_sdk_appstream::config::BehaviorVersion::latest())
            .build();
        let tag_conf = aws_sdk_resourcegroupstagging::Config::builder()
            .behavior_version(aws_sdk_resourcegroupstagging::config::BehaviorVersion::latest())
            .build();
        Session::from_clients(
            aws_sdk_appstream::Client::from_conf(conf),
            aws_sdk_resourcegroupstagging::Client::from_conf(tag_conf),
            BTreeMap::new(),
        )
    }

    #[test]
    fn registry_knows_all_seven_kinds() {
        let provider = Provider::new(offline_session());
        let kinds: Vec<_> = provider.resource_types().collect();
        assert_eq!(kinds.len(), 7);
        for kind in [
            "fleetform_application",
            "fleetform_fleet",
            "fleetform_stack",
            "fleetform_entitlement",
            "fleetform_user",
            "fleetform_fleet_stack_association",
            "fleetform_application_entitlement_association",
        ] {
            assert!(provider.resource(kind).is_some(), "missing {kind}");
        }
        assert!(provider.resource("fleetform_image").is_none());
    }

    #[test]
    fn import_dispatches_through_the_dyn_adapter() {
        let provider = Provider::new(offline_session());
        let user = provider.resource("fleetform_user").expect("registered");

        let state = user.import_state("USERPOOL|user@example.com").expect("import");
        assert_eq!(state["user_name"], "user@example.com");
        assert_eq!(state["authentication_type"], "USERPOOL");

        assert!(user.import_state("missing-separator").is_err());
    }
}
