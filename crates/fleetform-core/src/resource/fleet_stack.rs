// ── Fleet-to-stack association ──
//
// Identity is `fleetName|stackName`. No Describe API: reads page through
// ListAssociatedStacks for the fleet and match the stack name. All
// attributes force replacement.

use async_trait::async_trait;
use fleetform_aws::{ApiError, RetryPolicy, retry};
use serde::{Deserialize, Serialize};

use crate::identity::{join_id, split_id};
use crate::resource::{
    Lifecycle, OpContext, OpError, OpResult, api_diag, from_retry, require_known,
};
use crate::value::Value;

const TYPE_NAME: &str = "fleetform_fleet_stack_association";
const ID_FORMAT: &str = "fleet_name|stack_name";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetStackState {
    pub id: Value<String>,
    pub fleet_name: Value<String>,
    pub stack_name: Value<String>,
}

impl FleetStackState {
    fn identity(&self) -> Result<(String, String), OpError> {
        if let Some(id) = self.id.as_known() {
            let parts = split_id(id, 2, ID_FORMAT)?;
            return Ok((parts[0].clone(), parts[1].clone()));
        }
        Ok((
            require_known(&self.fleet_name, "fleet_name")?.clone(),
            require_known(&self.stack_name, "stack_name")?.clone(),
        ))
    }
}

fn state_for(fleet: &str, stack: &str) -> FleetStackState {
    FleetStackState {
        id: Value::Known(join_id([fleet, stack])),
        fleet_name: Value::Known(fleet.to_owned()),
        stack_name: Value::Known(stack.to_owned()),
    }
}

#[derive(Debug, Default)]
pub struct FleetStackReconciler;

impl FleetStackReconciler {
    async fn is_associated(
        &self,
        ctx: &OpContext,
        fleet: &str,
        stack: &str,
    ) -> Result<bool, ApiError> {
        let mut next_token: Option<String> = None;

        loop {
            let output = ctx
                .appstream()
                .list_associated_stacks()
                .fleet_name(fleet)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(ApiError::from_sdk)?;

            if output.names().iter().any(|name| name == stack) {
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
impl Lifecycle for FleetStackReconciler {
    type State = FleetStackState;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn create(&self, ctx: &OpContext, plan: Self::State) -> OpResult<Self::State> {
        let fleet = require_known(&plan.fleet_name, "fleet_name")?.clone();
        let stack = require_known(&plan.stack_name, "stack_name")?.clone();

        // Either side of the association may not be visible yet.
        let policy = RetryPolicy::create_default().retry_if(ApiError::is_retryable_create);
        retry(&ctx.cancel, &policy, || async {
            ctx.appstream()
                .associate_fleet()
                .fleet_name(&fleet)
                .stack_name(&stack)
                .send()
                .await
                .map_err(ApiError::from_sdk)
        })
        .await
        .map_err(|err| from_retry("associating fleet with stack", err))?;

        Ok(state_for(&fleet, &stack))
    }

    async fn read(&self, ctx: &OpContext, state: Self::State) -> OpResult<Option<Self::State>> {
        let (fleet, stack) = state.identity()?;

        match self.is_associated(ctx, &fleet, &stack).await {
            Ok(true) => Ok(Some(state_for(&fleet, &stack))),
            Ok(false) => Ok(None),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(api_diag("listing associated stacks", &err).into()),
        }
    }

    async fn update(
        &self,
        _ctx: &OpContext,
        plan: Self::State,
        _state: Self::State,
    ) -> OpResult<Option<Self::State>> {
        // Both attributes force replacement.
        Ok(Some(plan))
    }

    async fn delete(&self, ctx: &OpContext, state: Self::State) -> OpResult<()> {
        let (fleet, stack) = state.identity()?;

        if let Err(err) = ctx
            .appstream()
            .disassociate_fleet()
            .fleet_name(&fleet)
            .stack_name(&stack)
            .send()
            .await
        {
            let err = ApiError::from_sdk(err);
            if err.is_not_found() {
                return Ok(());
            }
            return Err(api_diag("disassociating fleet from stack", &err).into());
        }
        Ok(())
    }

    fn import_state(&self, id: &str) -> OpResult<Self::State> {
        let parts = split_id(id, 2, ID_FORMAT)?;
        Ok(state_for(&parts[0], &parts[1]))
    }
}
