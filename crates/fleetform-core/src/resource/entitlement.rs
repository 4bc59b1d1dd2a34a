// ── Entitlement reconciler ──
//
// Identity is `stackName|name`. Entitlements carry no tags; description
// clears through the empty-string channel. Create retries while the
// owning stack is not yet visible.

use async_trait::async_trait;
use aws_sdk_appstream::types::{AppVisibility, Entitlement, EntitlementAttribute};
use fleetform_aws::{ApiError, RetryPolicy, retry};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diag::Diagnostic;
use crate::identity::{join_id, split_id};
use crate::resource::{
    Lifecycle, OpContext, OpError, OpResult, already_exists, api_diag, from_retry, identity_drift,
    require_known,
};
use crate::value::{FieldAction, Value, plan_field};

const TYPE_NAME: &str = "fleetform_entitlement";
const ID_FORMAT: &str = "stack_name|name";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementAttributeState {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitlementState {
    pub id: Value<String>,
    pub name: Value<String>,
    pub stack_name: Value<String>,
    pub description: Value<String>,
    pub app_visibility: Value<String>,
    pub attributes: Value<Vec<EntitlementAttributeState>>,
    pub created_time: Value<String>,
    pub last_modified_time: Value<String>,
}

impl EntitlementState {
    /// Resolve `(stack_name, name)` from the synthetic id, falling back to
    /// the natural-key attributes (the import path stashes only the id).
    fn identity(&self) -> Result<(String, String), OpError> {
        if let Some(id) = self.id.as_known() {
            let parts = split_id(id, 2, ID_FORMAT)?;
            return Ok((parts[0].clone(), parts[1].clone()));
        }
        let stack = require_known(&self.stack_name, "stack_name")?.clone();
        let name = require_known(&self.name, "name")?.clone();
        Ok((stack, name))
    }
}

fn expand_attributes(
    attrs: &[EntitlementAttributeState],
) -> Result<Vec<EntitlementAttribute>, OpError> {
    attrs
        .iter()
        .map(|a| {
            EntitlementAttribute::builder()
                .name(&a.name)
                .value(&a.value)
                .build()
                .map_err(|e| {
                    Diagnostic::error("invalid entitlement attribute")
                        .with_attribute("attributes")
                        .with_detail(e.to_string())
                        .into()
                })
        })
        .collect()
}

fn flatten(ent: &Entitlement) -> EntitlementState {
    EntitlementState {
        id: Value::Known(join_id([ent.stack_name(), ent.name()])),
        name: Value::Known(ent.name().to_owned()),
        stack_name: Value::Known(ent.stack_name().to_owned()),
        description: Value::from_option(ent.description().map(str::to_owned)),
        app_visibility: Value::Known(ent.app_visibility().as_str().to_owned()),
        attributes: Value::from_list(
            ent.attributes()
                .iter()
                .map(|a| EntitlementAttributeState {
                    name: a.name().to_owned(),
                    value: a.value().to_owned(),
                })
                .collect(),
        ),
        created_time: Value::from_timestamp(ent.created_time()),
        last_modified_time: Value::from_timestamp(ent.last_modified_time()),
    }
}

#[derive(Debug, Default)]
pub struct EntitlementReconciler;

impl EntitlementReconciler {
    async fn describe(
        &self,
        ctx: &OpContext,
        stack_name: &str,
        name: &str,
    ) -> Result<Option<EntitlementState>, ApiError> {
        let result = ctx
            .appstream()
            .describe_entitlements()
            .stack_name(stack_name)
            .name(name)
            .send()
            .await;

        match result {
            Ok(output) => Ok(output.entitlements().first().map(flatten)),
            Err(err) => {
                let err = ApiError::from_sdk(err);
                if err.is_not_found() {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }
}

#[async_trait]
impl Lifecycle for EntitlementReconciler {
    type State = EntitlementState;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn create(&self, ctx: &OpContext, plan: Self::State) -> OpResult<Self::State> {
        let stack_name = require_known(&plan.stack_name, "stack_name")?.clone();
        let name = require_known(&plan.name, "name")?.clone();
        let app_visibility = require_known(&plan.app_visibility, "app_visibility")?.clone();
        let attributes = expand_attributes(require_known(&plan.attributes, "attributes")?)?;
        let id = join_id([stack_name.as_str(), name.as_str()]);

        let policy = RetryPolicy::create_default().retry_if(ApiError::is_retryable_create);
        let result = retry(&ctx.cancel, &policy, || async {
            ctx.appstream()
                .create_entitlement()
                .stack_name(&stack_name)
                .name(&name)
                .app_visibility(AppVisibility::from(app_visibility.as_str()))
                .set_description(plan.description.to_option())
                .set_attributes(Some(attributes.clone()))
                .send()
                .await
                .map_err(ApiError::from_sdk)
        })
        .await;

        if let Err(err) = result {
            if let fleetform_aws::RetryError::Terminal(ref api) = err {
                if api.is_already_exists() {
                    return Err(already_exists(TYPE_NAME, &id));
                }
            }
            return Err(from_retry("creating entitlement", err));
        }

        debug!(%id, "entitlement created");
        match self.describe(ctx, &stack_name, &name).await {
            Ok(Some(state)) => Ok(state),
            // Created but not yet readable; keep the identity so the next
            // read reconciles.
            Ok(None) => {
                let mut state = plan;
                state.id = Value::Known(id);
                Ok(state)
            }
            Err(err) => Err(api_diag("reading entitlement after create", &err).into()),
        }
    }

    async fn read(&self, ctx: &OpContext, state: Self::State) -> OpResult<Option<Self::State>> {
        let (stack_name, name) = state.identity()?;
        self.describe(ctx, &stack_name, &name)
            .await
            .map_err(|err| api_diag("reading entitlement", &err).into())
    }

    async fn update(
        &self,
        ctx: &OpContext,
        plan: Self::State,
        state: Self::State,
    ) -> OpResult<Option<Self::State>> {
        if let (Some(planned), Some(actual)) = (plan.id.as_known(), state.id.as_known()) {
            if planned != actual {
                return Err(identity_drift(TYPE_NAME, planned, actual));
            }
        }
        let (stack_name, name) = state.identity()?;

        let mut req = ctx
            .appstream()
            .update_entitlement()
            .stack_name(&stack_name)
            .name(&name);
        let mut dirty = false;

        match plan_field(&plan.description, &state.description) {
            FieldAction::Set(v) => {
                req = req.description(v);
                dirty = true;
            }
            FieldAction::Clear => {
                req = req.description("");
                dirty = true;
            }
            FieldAction::Skip => {}
        }

        if let Some(visibility) = plan.app_visibility.as_known() {
            req = req.app_visibility(AppVisibility::from(visibility.as_str()));
            dirty = true;
        }

        if let Some(attrs) = plan.attributes.as_known() {
            req = req.set_attributes(Some(expand_attributes(attrs)?));
            dirty = true;
        }

        if dirty {
            if let Err(err) = req.send().await {
                let err = ApiError::from_sdk(err);
                if err.is_not_found() {
                    return Ok(None);
                }
                return Err(api_diag("updating entitlement", &err).into());
            }
        }

        self.describe(ctx, &stack_name, &name)
            .await
            .map_err(|err| api_diag("reading entitlement after update", &err).into())
    }

    async fn delete(&self, ctx: &OpContext, state: Self::State) -> OpResult<()> {
        let (stack_name, name) = state.identity()?;

        if let Err(err) = ctx
            .appstream()
            .delete_entitlement()
            .stack_name(&stack_name)
            .name(&name)
            .send()
            .await
        {
            let err = ApiError::from_sdk(err);
            if err.is_not_found() {
                return Ok(());
            }
            return Err(api_diag("deleting entitlement", &err).into());
        }
        Ok(())
    }

    fn import_state(&self, id: &str) -> OpResult<Self::State> {
        let parts = split_id(id, 2, ID_FORMAT)?;
        Ok(EntitlementState {
            id: Value::Known(id.to_owned()),
            stack_name: Value::Known(parts[0].clone()),
            name: Value::Known(parts[1].clone()),
            ..EntitlementState::default()
        })
    }
}
