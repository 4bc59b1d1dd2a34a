// ── User reconciler ──
//
// Identity is `authenticationType|userName`. AppStream has no GetUser, so
// reads page through DescribeUsers filtered by authentication type and
// scan for the name. A freshly created user may not be visible yet; the
// create path retries the scan on a short budget. `message_action` is
// write-only and `enabled` toggles through EnableUser / DisableUser.

use async_trait::async_trait;
use aws_sdk_appstream::types::{AuthenticationType, MessageAction, User};
use fleetform_aws::{ApiError, RetryPolicy, retry};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::identity::{join_id, split_id};
use crate::resource::{
    Lifecycle, OpContext, OpError, OpResult, already_exists, api_diag, from_retry, identity_drift,
    require_known,
};
use crate::value::Value;

const TYPE_NAME: &str = "fleetform_user";
const ID_FORMAT: &str = "authentication_type|user_name";

const PAGE_SIZE: i32 = 25;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserState {
    pub id: Value<String>,
    pub arn: Value<String>,
    pub user_name: Value<String>,
    pub authentication_type: Value<String>,
    pub first_name: Value<String>,
    pub last_name: Value<String>,
    pub enabled: Value<bool>,
    pub status: Value<String>,
    pub created_time: Value<String>,
    /// Only meaningful during creation; forces replacement on change.
    pub message_action: Value<String>,
}

impl UserState {
    fn identity(&self) -> Result<(String, String), OpError> {
        if let Some(id) = self.id.as_known() {
            let parts = split_id(id, 2, ID_FORMAT)?;
            return Ok((parts[0].clone(), parts[1].clone()));
        }
        Ok((
            require_known(&self.authentication_type, "authentication_type")?.clone(),
            require_known(&self.user_name, "user_name")?.clone(),
        ))
    }
}

fn flatten(user: &User, prior: &UserState) -> UserState {
    let auth = user.authentication_type().as_str().to_owned();
    let user_name = user.user_name().unwrap_or_default().to_owned();
    UserState {
        id: Value::Known(join_id([auth.as_str(), user_name.as_str()])),
        arn: Value::from_option(user.arn().map(str::to_owned)),
        user_name: Value::Known(user_name),
        authentication_type: Value::Known(auth),
        // AWS imputes names from the identity source; only surface them
        // when the practitioner owns the attribute.
        first_name: Value::owned_string(&prior.first_name, user.first_name()),
        last_name: Value::owned_string(&prior.last_name, user.last_name()),
        enabled: Value::from_option(user.enabled()),
        status: Value::from_option(user.status().map(str::to_owned)),
        created_time: Value::from_timestamp(user.created_time()),
        message_action: prior.message_action.clone(),
    }
}

#[derive(Debug, Default)]
pub struct UserReconciler;

impl UserReconciler {
    /// Scan the paginated user list for the name. `Ok(None)` means the
    /// user is not (or not yet) visible.
    async fn scan(
        &self,
        ctx: &OpContext,
        auth: &str,
        user_name: &str,
        prior: &UserState,
    ) -> Result<Option<UserState>, ApiError> {
        let mut next_token: Option<String> = None;

        loop {
            let output = ctx
                .appstream()
                .describe_users()
                .authentication_type(AuthenticationType::from(auth))
                .max_results(PAGE_SIZE)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(ApiError::from_sdk)?;

            if let Some(user) = output
                .users()
                .iter()
                .find(|u| u.user_name() == Some(user_name))
            {
                return Ok(Some(flatten(user, prior)));
            }

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_owned()),
                _ => return Ok(None),
            }
        }
    }

    /// Create-path read: the user may lag behind the successful create, so
    /// absence is retried as a synthetic NotFound on a short budget.
    async fn scan_until_visible(
        &self,
        ctx: &OpContext,
        auth: &str,
        user_name: &str,
        prior: &UserState,
    ) -> OpResult<UserState> {
        let policy = RetryPolicy::visibility_default().retry_if(ApiError::is_not_found);
        retry(&ctx.cancel, &policy, || async {
            self.scan(ctx, auth, user_name, prior).await?.ok_or_else(|| {
                ApiError::from_parts(
                    "ResourceNotFoundException",
                    format!("user {user_name} is not visible yet"),
                )
            })
        })
        .await
        .map_err(|err| from_retry("reading user after create", err))
    }
}

#[async_trait]
impl Lifecycle for UserReconciler {
    type State = UserState;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn create(&self, ctx: &OpContext, plan: Self::State) -> OpResult<Self::State> {
        let auth = require_known(&plan.authentication_type, "authentication_type")?.clone();
        let user_name = require_known(&plan.user_name, "user_name")?.clone();
        let id = join_id([auth.as_str(), user_name.as_str()]);

        let result = ctx
            .appstream()
            .create_user()
            .user_name(&user_name)
            .authentication_type(AuthenticationType::from(auth.as_str()))
            .set_message_action(
                plan.message_action
                    .as_known()
                    .map(|m| MessageAction::from(m.as_str())),
            )
            .set_first_name(plan.first_name.to_option())
            .set_last_name(plan.last_name.to_option())
            .send()
            .await;

        if let Err(err) = result {
            let err = ApiError::from_sdk(err);
            if err.is_already_exists() {
                return Err(already_exists(TYPE_NAME, &id));
            }
            return Err(api_diag("creating user", &err).into());
        }
        debug!(%id, "user created");

        // Users are born enabled; honor an explicit enabled=false plan.
        if plan.enabled.as_known() == Some(&false) {
            ctx.appstream()
                .disable_user()
                .user_name(&user_name)
                .authentication_type(AuthenticationType::from(auth.as_str()))
                .send()
                .await
                .map_err(|err| api_diag("disabling user", &ApiError::from_sdk(err)))?;
        }

        self.scan_until_visible(ctx, &auth, &user_name, &plan).await
    }

    async fn read(&self, ctx: &OpContext, state: Self::State) -> OpResult<Option<Self::State>> {
        let (auth, user_name) = state.identity()?;
        self.scan(ctx, &auth, &user_name, &state)
            .await
            .map_err(|err| api_diag("reading user", &err).into())
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
        let (auth, user_name) = state.identity()?;

        // The only in-place mutation is the enabled toggle; everything else
        // forces replacement at the schema layer.
        if let Some(&enabled) = plan.enabled.as_known() {
            if state.enabled.as_known() != Some(&enabled) {
                let result = if enabled {
                    ctx.appstream()
                        .enable_user()
                        .user_name(&user_name)
                        .authentication_type(AuthenticationType::from(auth.as_str()))
                        .send()
                        .await
                        .map_err(ApiError::from_sdk)
                        .map(|_| ())
                } else {
                    ctx.appstream()
                        .disable_user()
                        .user_name(&user_name)
                        .authentication_type(AuthenticationType::from(auth.as_str()))
                        .send()
                        .await
                        .map_err(ApiError::from_sdk)
                        .map(|_| ())
                };

                if let Err(err) = result {
                    if err.is_not_found() {
                        return Ok(None);
                    }
                    return Err(api_diag("toggling user enabled state", &err).into());
                }
            }
        }

        self.scan(ctx, &auth, &user_name, &state)
            .await
            .map_err(|err| api_diag("reading user after update", &err).into())
    }

    async fn delete(&self, ctx: &OpContext, state: Self::State) -> OpResult<()> {
        let (auth, user_name) = state.identity()?;

        if let Err(err) = ctx
            .appstream()
            .delete_user()
            .user_name(&user_name)
            .authentication_type(AuthenticationType::from(auth.as_str()))
            .send()
            .await
        {
            let err = ApiError::from_sdk(err);
            if err.is_not_found() {
                return Ok(());
            }
            return Err(api_diag("deleting user", &err).into());
        }
        Ok(())
    }

    fn import_state(&self, id: &str) -> OpResult<Self::State> {
        let parts = split_id(id, 2, ID_FORMAT)?;
        Ok(UserState {
            id: Value::Known(id.to_owned()),
            authentication_type: Value::Known(parts[0].clone()),
            user_name: Value::Known(parts[1].clone()),
            ..UserState::default()
        })
    }
}
