// ── Application-to-entitlement association ──
//
// Pure relational entity: no Describe API exists, so reads scan the
// paginated entitled-application list for the natural key. Create
// pre-lists to stay idempotent (AssociateApplicationToEntitlement is not),
// and every attribute forces replacement, so update is a no-op.

use async_trait::async_trait;
use fleetform_aws::{ApiError, RetryPolicy, retry};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::identity::{join_id, split_id};
use crate::resource::{
    Lifecycle, OpContext, OpError, OpResult, api_diag, from_retry, require_known,
};
use crate::value::Value;

const TYPE_NAME: &str = "fleetform_application_entitlement_association";
const ID_FORMAT: &str = "stack_name|entitlement_name|application_identifier";

/// Page size for the entitled-application scan; the API caps at 50.
const PAGE_SIZE: i32 = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationEntitlementState {
    pub id: Value<String>,
    pub stack_name: Value<String>,
    pub entitlement_name: Value<String>,
    pub application_identifier: Value<String>,
}

impl ApplicationEntitlementState {
    fn identity(&self) -> Result<(String, String, String), OpError> {
        if let Some(id) = self.id.as_known() {
            let parts = split_id(id, 3, ID_FORMAT)?;
            return Ok((parts[0].clone(), parts[1].clone(), parts[2].clone()));
        }
        Ok((
            require_known(&self.stack_name, "stack_name")?.clone(),
            require_known(&self.entitlement_name, "entitlement_name")?.clone(),
            require_known(&self.application_identifier, "application_identifier")?.clone(),
        ))
    }
}

fn state_for(stack: &str, entitlement: &str, application: &str) -> ApplicationEntitlementState {
    ApplicationEntitlementState {
        id: Value::Known(join_id([stack, entitlement, application])),
        stack_name: Value::Known(stack.to_owned()),
        entitlement_name: Value::Known(entitlement.to_owned()),
        application_identifier: Value::Known(application.to_owned()),
    }
}

#[derive(Debug, Default)]
pub struct ApplicationEntitlementReconciler;

impl ApplicationEntitlementReconciler {
    /// Fold the paginated entitled-application list until the target
    /// identifier appears or the token runs dry.
    async fn is_associated(
        &self,
        ctx: &OpContext,
        stack: &str,
        entitlement: &str,
        application: &str,
    ) -> Result<bool, ApiError> {
        let mut next_token: Option<String> = None;

        loop {
            let output = ctx
                .appstream()
                .list_entitled_applications()
                .stack_name(stack)
                .entitlement_name(entitlement)
                .max_results(PAGE_SIZE)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(ApiError::from_sdk)?;

            if output
                .entitled_applications()
                .iter()
                .any(|app| app.application_identifier() == Some(application))
            {
                return Ok(true);
            }

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_owned()),
                _ => return Ok(false),
            }
        }
    }
}

#[async_trait]
impl Lifecycle for ApplicationEntitlementReconciler {
    type State = ApplicationEntitlementState;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn create(&self, ctx: &OpContext, plan: Self::State) -> OpResult<Self::State> {
        let stack = require_known(&plan.stack_name, "stack_name")?.clone();
        let entitlement = require_known(&plan.entitlement_name, "entitlement_name")?.clone();
        let application =
            require_known(&plan.application_identifier, "application_identifier")?.clone();

        // Associate is not idempotent; detect a surviving association from
        // an earlier partial apply before issuing the call.
        let policy = RetryPolicy::create_default().retry_if(ApiError::is_retryable_create);
        let existing = retry(&ctx.cancel, &policy, || {
            self.is_associated(ctx, &stack, &entitlement, &application)
        })
        .await
        .map_err(|err| from_retry("listing entitled applications", err))?;

        if existing {
            debug!(stack, entitlement, application, "association already present");
            return Ok(state_for(&stack, &entitlement, &application));
        }

        retry(&ctx.cancel, &policy, || async {
            ctx.appstream()
                .associate_application_to_entitlement()
                .stack_name(&stack)
                .entitlement_name(&entitlement)
                .application_identifier(&application)
                .send()
                .await
                .map_err(ApiError::from_sdk)
        })
        .await
        .map_err(|err| from_retry("associating application to entitlement", err))?;

        Ok(state_for(&stack, &entitlement, &application))
    }

    async fn read(&self, ctx: &OpContext, state: Self::State) -> OpResult<Option<Self::State>> {
        let (stack, entitlement, application) = state.identity()?;

        match self
            .is_associated(ctx, &stack, &entitlement, &application)
            .await
        {
            Ok(true) => Ok(Some(state_for(&stack, &entitlement, &application))),
            Ok(false) => Ok(None),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(api_diag("listing entitled applications", &err).into()),
        }
    }

    async fn update(
        &self,
        _ctx: &OpContext,
        plan: Self::State,
        _state: Self::State,
    ) -> OpResult<Option<Self::State>> {
        // Every attribute forces replacement; nothing is updatable in place.
        Ok(Some(plan))
    }

    async fn delete(&self, ctx: &OpContext, state: Self::State) -> OpResult<()> {
        let (stack, entitlement, application) = state.identity()?;

        if let Err(err) = ctx
            .appstream()
            .disassociate_application_from_entitlement()
            .stack_name(&stack)
            .entitlement_name(&entitlement)
            .application_identifier(&application)
            .send()
            .await
        {
            let err = ApiError::from_sdk(err);
            if err.is_not_found() {
                return Ok(());
            }
            return Err(api_diag("disassociating application from entitlement", &err).into());
        }
        Ok(())
    }

    fn import_state(&self, id: &str) -> OpResult<Self::State> {
        let parts = split_id(id, 3, ID_FORMAT)?;
        Ok(state_for(&parts[0], &parts[1], &parts[2]))
    }
}
