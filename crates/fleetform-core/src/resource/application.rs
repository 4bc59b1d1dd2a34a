// ── Application reconciler ──
//
// Identity is the application ARN. Delete needs the name, which is parsed
// back out of the ARN (`...:application/<name>`). Working directory and
// launch parameters clear through AttributesToDelete; the icon location
// has no deletion channel and is left untouched on null.

use async_trait::async_trait;
use aws_sdk_appstream::operation::update_application::builders::UpdateApplicationFluentBuilder;
use aws_sdk_appstream::types::{Application, ApplicationAttribute, PlatformType};
use fleetform_aws::{ApiError, RetryPolicy, retry};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diag::Diagnostic;
use crate::resource::shared::{S3LocationState, expand_s3_location, flatten_s3_location};
use crate::resource::{
    Lifecycle, OpContext, OpError, OpResult, already_exists, api_diag, from_retry, identity_drift,
    require_known,
};
use crate::tags::TagMap;
use crate::value::{FieldAction, Value, plan_field};

const TYPE_NAME: &str = "fleetform_application";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationState {
    pub id: Value<String>,
    pub arn: Value<String>,
    pub name: Value<String>,
    pub display_name: Value<String>,
    pub description: Value<String>,
    pub icon_s3_location: Value<S3LocationState>,
    pub launch_path: Value<String>,
    pub launch_parameters: Value<String>,
    pub working_directory: Value<String>,
    pub platforms: Value<Vec<String>>,
    pub instance_families: Value<Vec<String>>,
    pub app_block_arn: Value<String>,
    pub created_time: Value<String>,
    pub tags: Value<TagMap>,
}

impl ApplicationState {
    fn arn(&self) -> Result<&String, OpError> {
        if let Some(arn) = self.id.as_known() {
            return Ok(arn);
        }
        require_known(&self.arn, "arn")
    }
}

/// DeleteApplication is keyed by name; recover it from the ARN suffix.
fn name_from_arn(arn: &str) -> Result<&str, OpError> {
    match arn.split_once(":application/") {
        Some((_, name)) if !name.is_empty() => Ok(name),
        _ => Err(Diagnostic::error("invalid application ARN")
            .with_detail(format!("no application name found in {arn:?}"))
            .into()),
    }
}

fn flatten(app: &Application, prior: &ApplicationState) -> ApplicationState {
    let arn = Value::from_option(app.arn().map(str::to_owned));
    ApplicationState {
        id: arn.clone(),
        arn,
        name: Value::from_option(app.name().map(str::to_owned)),
        display_name: Value::from_option(app.display_name().map(str::to_owned)),
        description: Value::from_option(app.description().map(str::to_owned)),
        icon_s3_location: flatten_s3_location(app.icon_s3_location()),
        launch_path: Value::from_option(app.launch_path().map(str::to_owned)),
        launch_parameters: Value::from_option(app.launch_parameters().map(str::to_owned)),
        working_directory: Value::from_option(app.working_directory().map(str::to_owned)),
        platforms: Value::from_list(
            app.platforms()
                .iter()
                .map(|p| p.as_str().to_owned())
                .collect(),
        ),
        instance_families: Value::from_list(app.instance_families().to_vec()),
        app_block_arn: Value::from_option(app.app_block_arn().map(str::to_owned)),
        created_time: Value::from_timestamp(app.created_time()),
        tags: prior.tags.clone(),
    }
}

/// Apply the per-field update policy to the UpdateApplication call.
/// Returns the builder plus whether any field actually changed.
fn apply_update(
    mut req: UpdateApplicationFluentBuilder,
    plan: &ApplicationState,
    state: &ApplicationState,
) -> Result<(UpdateApplicationFluentBuilder, bool), OpError> {
    let mut dirty = false;
    let mut to_delete: Vec<ApplicationAttribute> = Vec::new();

    // Empty-string clearing channel.
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
    match plan_field(&plan.display_name, &state.display_name) {
        FieldAction::Set(v) => {
            req = req.display_name(v);
            dirty = true;
        }
        FieldAction::Clear => {
            req = req.display_name("");
            dirty = true;
        }
        FieldAction::Skip => {}
    }

    // AttributesToDelete channel.
    match plan_field(&plan.working_directory, &state.working_directory) {
        FieldAction::Set(v) => {
            req = req.working_directory(v);
            dirty = true;
        }
        FieldAction::Clear => to_delete.push(ApplicationAttribute::WorkingDirectory),
        FieldAction::Skip => {}
    }
    match plan_field(&plan.launch_parameters, &state.launch_parameters) {
        FieldAction::Set(v) => {
            req = req.launch_parameters(v);
            dirty = true;
        }
        FieldAction::Clear => to_delete.push(ApplicationAttribute::LaunchParameters),
        FieldAction::Skip => {}
    }

    // Set-only fields; no deletion channel.
    if let Some(v) = plan.launch_path.as_known() {
        req = req.launch_path(v);
        dirty = true;
    }
    if let Some(v) = plan.app_block_arn.as_known() {
        req = req.app_block_arn(v);
        dirty = true;
    }
    if let Some(loc) = expand_s3_location(&plan.icon_s3_location, "icon_s3_location")? {
        req = req.icon_s3_location(loc);
        dirty = true;
    }

    if !to_delete.is_empty() {
        req = req.set_attributes_to_delete(Some(to_delete));
        dirty = true;
    }

    Ok((req, dirty))
}

#[derive(Debug, Default)]
pub struct ApplicationReconciler;

impl ApplicationReconciler {
    async fn describe(
        &self,
        ctx: &OpContext,
        arn: &str,
        prior: &ApplicationState,
    ) -> Result<Option<ApplicationState>, ApiError> {
        let result = ctx
            .appstream()
            .describe_applications()
            .arns(arn)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                let err = ApiError::from_sdk(err);
                if err.is_not_found() {
                    return Ok(None);
                }
                return Err(err);
            }
        };

        let Some(app) = output.applications().first() else {
            return Ok(None);
        };

        let mut state = flatten(app, prior);
        state.tags = ctx.tags().read(arn).await?;
        Ok(Some(state))
    }
}

#[async_trait]
impl Lifecycle for ApplicationReconciler {
    type State = ApplicationState;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn create(&self, ctx: &OpContext, plan: Self::State) -> OpResult<Self::State> {
        let name = require_known(&plan.name, "name")?.clone();
        let app_block_arn = require_known(&plan.app_block_arn, "app_block_arn")?.clone();
        let launch_path = require_known(&plan.launch_path, "launch_path")?.clone();
        let platforms: Vec<PlatformType> = require_known(&plan.platforms, "platforms")?
            .iter()
            .map(|p| PlatformType::from(p.as_str()))
            .collect();
        let instance_families =
            require_known(&plan.instance_families, "instance_families")?.clone();
        let icon = expand_s3_location(&plan.icon_s3_location, "icon_s3_location")?
            .ok_or_else(|| -> OpError {
                Diagnostic::error("missing required attribute")
                    .with_attribute("icon_s3_location")
                    .into()
            })?;

        let policy = RetryPolicy::create_default().retry_if(ApiError::is_retryable_create);
        let result = retry(&ctx.cancel, &policy, || async {
            ctx.appstream()
                .create_application()
                .name(&name)
                .app_block_arn(&app_block_arn)
                .launch_path(&launch_path)
                .icon_s3_location(icon.clone())
                .set_platforms(Some(platforms.clone()))
                .set_instance_families(Some(instance_families.clone()))
                .set_display_name(plan.display_name.to_option())
                .set_description(plan.description.to_option())
                .set_launch_parameters(plan.launch_parameters.to_option())
                .set_working_directory(plan.working_directory.to_option())
                .send()
                .await
                .map_err(ApiError::from_sdk)
        })
        .await;

        let output = match result {
            Ok(output) => output,
            Err(fleetform_aws::RetryError::Terminal(api)) if api.is_already_exists() => {
                return Err(already_exists(TYPE_NAME, &name));
            }
            Err(err) => return Err(from_retry("creating application", err)),
        };

        let arn = output
            .application()
            .and_then(Application::arn)
            .map(str::to_owned)
            .ok_or_else(|| -> OpError {
                Diagnostic::error("creating application")
                    .with_detail("AWS returned no application ARN")
                    .into()
            })?;
        debug!(%arn, "application created");

        let mut created = plan.clone();
        created.id = Value::Known(arn.clone());
        created.arn = Value::Known(arn.clone());
        created.tags = ctx
            .tags()
            .apply(&arn, &plan.tags)
            .await
            .map_err(|err| api_diag("tagging application", &err))?;

        match self.describe(ctx, &arn, &created).await {
            Ok(Some(state)) => Ok(state),
            Ok(None) => Ok(created),
            Err(err) => Err(api_diag("reading application after create", &err).into()),
        }
    }

    async fn read(&self, ctx: &OpContext, state: Self::State) -> OpResult<Option<Self::State>> {
        let arn = state.arn()?.clone();
        self.describe(ctx, &arn, &state)
            .await
            .map_err(|err| api_diag("reading application", &err).into())
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
        let arn = state.arn()?.clone();
        let name = require_known(&state.name, "name")?.clone();

        let req = ctx.appstream().update_application().name(&name);
        let (req, dirty) = apply_update(req, &plan, &state)?;

        if dirty {
            if let Err(err) = req.send().await {
                let err = ApiError::from_sdk(err);
                if err.is_not_found() {
                    return Ok(None);
                }
                return Err(api_diag("updating application", &err).into());
            }
        }

        let mut updated = state.clone();
        updated.tags = ctx
            .tags()
            .apply(&arn, &plan.tags)
            .await
            .map_err(|err| api_diag("tagging application", &err))?;

        self.describe(ctx, &arn, &updated)
            .await
            .map_err(|err| api_diag("reading application after update", &err).into())
    }

    async fn delete(&self, ctx: &OpContext, state: Self::State) -> OpResult<()> {
        let arn = state.arn()?;
        let name = name_from_arn(arn)?;

        if let Err(err) = ctx
            .appstream()
            .delete_application()
            .name(name)
            .send()
            .await
        {
            let err = ApiError::from_sdk(err);
            if err.is_not_found() {
                return Ok(());
            }
            return Err(api_diag("deleting application", &err).into());
        }
        Ok(())
    }

    fn import_state(&self, id: &str) -> OpResult<Self::State> {
        // Applications import by ARN; validate it parses back to a name.
        name_from_arn(id)?;
        Ok(ApplicationState {
            id: Value::Known(id.to_owned()),
            arn: Value::Known(id.to_owned()),
            ..ApplicationState::default()
        })
    }
}
