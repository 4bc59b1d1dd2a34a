// ── Stack reconciler ──
//
// Identity is the stack name. Most structured attributes clear through
// the fixed AttributesToDelete enum; application settings have no
// deletion entry and are instead disabled in place. The settings bucket
// name inside application settings is server-computed and never expanded.

use async_trait::async_trait;
use aws_sdk_appstream::operation::update_stack::builders::UpdateStackFluentBuilder;
use aws_sdk_appstream::types::{
    AccessEndpoint, AccessEndpointType, Action, ApplicationSettings, Permission, PreferredProtocol,
    Stack, StackAttribute, StorageConnector, StorageConnectorType, StreamingExperienceSettings,
    UserSetting,
};
use fleetform_aws::{ApiError, RetryPolicy, retry};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diag::{Diagnostic, Diagnostics};
use crate::resource::{
    Lifecycle, OpContext, OpError, OpResult, already_exists, api_diag, from_retry, identity_drift,
    require_known,
};
use crate::tags::TagMap;
use crate::value::{FieldAction, Value, plan_field};

const TYPE_NAME: &str = "fleetform_stack";

const CLIPBOARD_COPY_ACTIONS: [&str; 2] = [
    "CLIPBOARD_COPY_FROM_LOCAL_DEVICE",
    "CLIPBOARD_COPY_TO_LOCAL_DEVICE",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConnectorState {
    pub connector_type: Value<String>,
    pub resource_identifier: Value<String>,
    pub domains: Value<Vec<String>>,
    pub domains_require_admin_consent: Value<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettingState {
    pub action: Value<String>,
    pub permission: Value<String>,
    pub maximum_length: Value<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessEndpointState {
    pub endpoint_type: Value<String>,
    pub vpce_id: Value<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettingsState {
    pub enabled: Value<bool>,
    pub settings_group: Value<String>,
    /// Server-computed; never expanded back into an update payload.
    pub s3_bucket_name: Value<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingExperienceSettingsState {
    pub preferred_protocol: Value<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackState {
    pub id: Value<String>,
    pub arn: Value<String>,
    pub name: Value<String>,
    pub display_name: Value<String>,
    pub description: Value<String>,
    pub redirect_url: Value<String>,
    pub feedback_url: Value<String>,
    pub storage_connectors: Value<Vec<StorageConnectorState>>,
    pub user_settings: Value<Vec<UserSettingState>>,
    pub access_endpoints: Value<Vec<AccessEndpointState>>,
    pub embed_host_domains: Value<Vec<String>>,
    pub application_settings: Value<ApplicationSettingsState>,
    pub streaming_experience_settings: Value<StreamingExperienceSettingsState>,
    pub created_time: Value<String>,
    pub tags: Value<TagMap>,
}

impl StackState {
    fn stack_name(&self) -> Result<&String, OpError> {
        if let Some(name) = self.id.as_known() {
            return Ok(name);
        }
        require_known(&self.name, "name")
    }
}

// ── Expand ──────────────────────────────────────────────────────────

fn invalid_block(attribute: &str, err: impl std::fmt::Display) -> OpError {
    Diagnostic::error("invalid configuration block")
        .with_attribute(attribute.to_owned())
        .with_detail(err.to_string())
        .into()
}

fn expand_storage_connectors(
    connectors: &[StorageConnectorState],
) -> Result<Vec<StorageConnector>, OpError> {
    connectors
        .iter()
        .map(|c| {
            StorageConnector::builder()
                .set_connector_type(
                    c.connector_type
                        .as_known()
                        .map(|t| StorageConnectorType::from(t.as_str())),
                )
                .set_resource_identifier(c.resource_identifier.to_option())
                .set_domains(c.domains.to_list_option())
                .set_domains_require_admin_consent(
                    c.domains_require_admin_consent.to_list_option(),
                )
                .build()
                .map_err(|e| invalid_block("storage_connectors", e))
        })
        .collect()
}

fn expand_user_settings(settings: &[UserSettingState]) -> Result<Vec<UserSetting>, OpError> {
    settings
        .iter()
        .map(|s| {
            UserSetting::builder()
                .set_action(s.action.as_known().map(|a| Action::from(a.as_str())))
                .set_permission(
                    s.permission
                        .as_known()
                        .map(|p| Permission::from(p.as_str())),
                )
                .set_maximum_length(s.maximum_length.to_option())
                .build()
                .map_err(|e| invalid_block("user_settings", e))
        })
        .collect()
}

fn expand_access_endpoints(
    endpoints: &[AccessEndpointState],
) -> Result<Vec<AccessEndpoint>, OpError> {
    endpoints
        .iter()
        .map(|e| {
            AccessEndpoint::builder()
                .set_endpoint_type(
                    e.endpoint_type
                        .as_known()
                        .map(|t| AccessEndpointType::from(t.as_str())),
                )
                .set_vpce_id(e.vpce_id.to_option())
                .build()
                .map_err(|err| invalid_block("access_endpoints", err))
        })
        .collect()
}

fn expand_application_settings(
    settings: &ApplicationSettingsState,
) -> Result<ApplicationSettings, OpError> {
    let enabled = *require_known(&settings.enabled, "application_settings.enabled")?;
    ApplicationSettings::builder()
        .enabled(enabled)
        .set_settings_group(settings.settings_group.to_option())
        .build()
        .map_err(|e| invalid_block("application_settings", e))
}

fn disabled_application_settings() -> Result<ApplicationSettings, OpError> {
    ApplicationSettings::builder()
        .enabled(false)
        .build()
        .map_err(|e| invalid_block("application_settings", e))
}

fn expand_streaming_experience(
    settings: &StreamingExperienceSettingsState,
) -> StreamingExperienceSettings {
    StreamingExperienceSettings::builder()
        .set_preferred_protocol(
            settings
                .preferred_protocol
                .as_known()
                .map(|p| PreferredProtocol::from(p.as_str())),
        )
        .build()
}

// ── Flatten ─────────────────────────────────────────────────────────

fn flatten(stack: &Stack, prior: &StackState) -> StackState {
    let name = stack.name().to_owned();
    StackState {
        id: Value::Known(name.clone()),
        arn: Value::from_option(stack.arn().map(str::to_owned)),
        name: Value::Known(name),
        display_name: Value::from_option(stack.display_name().map(str::to_owned)),
        description: Value::from_option(stack.description().map(str::to_owned)),
        redirect_url: Value::from_option(stack.redirect_url().map(str::to_owned)),
        feedback_url: Value::from_option(stack.feedback_url().map(str::to_owned)),
        storage_connectors: Value::from_list(
            stack
                .storage_connectors()
                .iter()
                .map(|c| StorageConnectorState {
                    connector_type: Value::Known(c.connector_type().as_str().to_owned()),
                    resource_identifier: Value::from_option(
                        c.resource_identifier().map(str::to_owned),
                    ),
                    domains: Value::from_list(c.domains().to_vec()),
                    domains_require_admin_consent: Value::from_list(
                        c.domains_require_admin_consent().to_vec(),
                    ),
                })
                .collect(),
        ),
        user_settings: Value::from_list(
            stack
                .user_settings()
                .iter()
                .map(|s| UserSettingState {
                    action: Value::Known(s.action().as_str().to_owned()),
                    permission: Value::Known(s.permission().as_str().to_owned()),
                    maximum_length: Value::from_option(s.maximum_length()),
                })
                .collect(),
        ),
        access_endpoints: Value::from_list(
            stack
                .access_endpoints()
                .iter()
                .map(|e| AccessEndpointState {
                    endpoint_type: Value::Known(e.endpoint_type().as_str().to_owned()),
                    vpce_id: Value::from_option(e.vpce_id().map(str::to_owned)),
                })
                .collect(),
        ),
        embed_host_domains: Value::from_list(stack.embed_host_domains().to_vec()),
        application_settings: Value::from_option(stack.application_settings().map(|s| {
            ApplicationSettingsState {
                enabled: Value::from_option(s.enabled()),
                settings_group: Value::from_option(s.settings_group().map(str::to_owned)),
                s3_bucket_name: Value::from_option(s.s3_bucket_name().map(str::to_owned)),
            }
        })),
        streaming_experience_settings: Value::from_option(
            stack
                .streaming_experience_settings()
                .map(|s| StreamingExperienceSettingsState {
                    preferred_protocol: Value::from_option(
                        s.preferred_protocol().map(|p| p.as_str().to_owned()),
                    ),
                }),
        ),
        created_time: Value::from_timestamp(stack.created_time()),
        tags: prior.tags.clone(),
    }
}

// ── Update payload ──────────────────────────────────────────────────

/// Apply the per-field update policy to the UpdateStack call.
#[allow(clippy::too_many_lines)]
fn apply_update(
    mut req: UpdateStackFluentBuilder,
    plan: &StackState,
    state: &StackState,
) -> Result<(UpdateStackFluentBuilder, bool), OpError> {
    let mut dirty = false;
    let mut to_delete: Vec<StackAttribute> = Vec::new();

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

    match plan_field(&plan.redirect_url, &state.redirect_url) {
        FieldAction::Set(v) => {
            req = req.redirect_url(v);
            dirty = true;
        }
        FieldAction::Clear => to_delete.push(StackAttribute::RedirectUrl),
        FieldAction::Skip => {}
    }
    match plan_field(&plan.feedback_url, &state.feedback_url) {
        FieldAction::Set(v) => {
            req = req.feedback_url(v);
            dirty = true;
        }
        FieldAction::Clear => to_delete.push(StackAttribute::FeedbackUrl),
        FieldAction::Skip => {}
    }
    match plan_field(&plan.storage_connectors, &state.storage_connectors) {
        FieldAction::Set(connectors) => {
            req = req.set_storage_connectors(Some(expand_storage_connectors(&connectors)?));
            dirty = true;
        }
        FieldAction::Clear => to_delete.push(StackAttribute::StorageConnectors),
        FieldAction::Skip => {}
    }
    match plan_field(&plan.user_settings, &state.user_settings) {
        FieldAction::Set(settings) => {
            req = req.set_user_settings(Some(expand_user_settings(&settings)?));
            dirty = true;
        }
        FieldAction::Clear => to_delete.push(StackAttribute::UserSettings),
        FieldAction::Skip => {}
    }
    match plan_field(&plan.access_endpoints, &state.access_endpoints) {
        FieldAction::Set(endpoints) => {
            req = req.set_access_endpoints(Some(expand_access_endpoints(&endpoints)?));
            dirty = true;
        }
        FieldAction::Clear => to_delete.push(StackAttribute::AccessEndpoints),
        FieldAction::Skip => {}
    }
    match plan_field(&plan.embed_host_domains, &state.embed_host_domains) {
        FieldAction::Set(domains) => {
            req = req.set_embed_host_domains(Some(domains));
            dirty = true;
        }
        FieldAction::Clear => to_delete.push(StackAttribute::EmbedHostDomains),
        FieldAction::Skip => {}
    }
    match plan_field(
        &plan.streaming_experience_settings,
        &state.streaming_experience_settings,
    ) {
        FieldAction::Set(settings) => {
            req = req.streaming_experience_settings(expand_streaming_experience(&settings));
            dirty = true;
        }
        FieldAction::Clear => to_delete.push(StackAttribute::StreamingExperienceSettings),
        FieldAction::Skip => {}
    }

    // No deletion enum entry exists for application settings; removing the
    // block disables persistence in place instead.
    match plan_field(&plan.application_settings, &state.application_settings) {
        FieldAction::Set(settings) => {
            req = req.application_settings(expand_application_settings(&settings)?);
            dirty = true;
        }
        FieldAction::Clear => {
            req = req.application_settings(disabled_application_settings()?);
            dirty = true;
        }
        FieldAction::Skip => {}
    }

    if !to_delete.is_empty() {
        req = req.set_attributes_to_delete(Some(to_delete));
        dirty = true;
    }

    Ok((req, dirty))
}

#[derive(Debug, Default)]
pub struct StackReconciler;

impl StackReconciler {
    async fn describe(
        &self,
        ctx: &OpContext,
        name: &str,
        prior: &StackState,
    ) -> Result<Option<StackState>, ApiError> {
        let result = ctx.appstream().describe_stacks().names(name).send().await;

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

        let Some(stack) = output.stacks().first() else {
            return Ok(None);
        };

        let mut state = flatten(stack, prior);
        if let Some(arn) = stack.arn() {
            state.tags = ctx.tags().read(arn).await?;
        }
        Ok(Some(state))
    }
}

#[async_trait]
impl Lifecycle for StackReconciler {
    type State = StackState;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn validate(&self, config: &Self::State) -> Diagnostics {
        let mut diags = Diagnostics::new();

        if let Some(connectors) = config.storage_connectors.as_known() {
            for connector in connectors {
                let has_consent_domains = connector
                    .domains_require_admin_consent
                    .as_known()
                    .is_some_and(|d| !d.is_empty());
                let wrong_type = connector
                    .connector_type
                    .as_known()
                    .is_some_and(|t| t != "ONE_DRIVE");
                if has_consent_domains && wrong_type {
                    diags.push(
                        Diagnostic::error("invalid storage connector")
                            .with_attribute("storage_connectors.domains_require_admin_consent")
                            .with_detail(
                                "admin-consent domains require connector_type \"ONE_DRIVE\"",
                            ),
                    );
                }
            }
        }

        if let Some(settings) = config.user_settings.as_known() {
            for setting in settings {
                if setting.maximum_length.is_known() {
                    let clipboard_action = setting
                        .action
                        .as_known()
                        .is_some_and(|a| CLIPBOARD_COPY_ACTIONS.contains(&a.as_str()));
                    let disabled = setting
                        .permission
                        .as_known()
                        .is_some_and(|p| p == "DISABLED");
                    if setting.action.is_known() && !clipboard_action {
                        diags.push(
                            Diagnostic::error("invalid user setting")
                                .with_attribute("user_settings.maximum_length")
                                .with_detail(
                                    "maximum_length only applies to clipboard copy actions",
                                ),
                        );
                    }
                    if disabled {
                        diags.push(
                            Diagnostic::error("invalid user setting")
                                .with_attribute("user_settings.maximum_length")
                                .with_detail(
                                    "maximum_length cannot be set when the action is disabled",
                                ),
                        );
                    }
                }
            }
        }

        diags
    }

    async fn create(&self, ctx: &OpContext, plan: Self::State) -> OpResult<Self::State> {
        let name = require_known(&plan.name, "name")?.clone();

        let storage_connectors = plan
            .storage_connectors
            .as_known()
            .map(|c| expand_storage_connectors(c))
            .transpose()?;
        let user_settings = plan
            .user_settings
            .as_known()
            .map(|s| expand_user_settings(s))
            .transpose()?;
        let access_endpoints = plan
            .access_endpoints
            .as_known()
            .map(|e| expand_access_endpoints(e))
            .transpose()?;
        let application_settings = plan
            .application_settings
            .as_known()
            .map(expand_application_settings)
            .transpose()?;

        let policy = RetryPolicy::create_default().retry_if(ApiError::is_retryable_create);
        let result = retry(&ctx.cancel, &policy, || async {
            ctx.appstream()
                .create_stack()
                .name(&name)
                .set_description(plan.description.to_option())
                .set_display_name(plan.display_name.to_option())
                .set_redirect_url(plan.redirect_url.to_option())
                .set_feedback_url(plan.feedback_url.to_option())
                .set_storage_connectors(storage_connectors.clone())
                .set_user_settings(user_settings.clone())
                .set_access_endpoints(access_endpoints.clone())
                .set_embed_host_domains(plan.embed_host_domains.to_list_option())
                .set_application_settings(application_settings.clone())
                .set_streaming_experience_settings(
                    plan.streaming_experience_settings
                        .as_known()
                        .map(expand_streaming_experience),
                )
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
            Err(err) => return Err(from_retry("creating stack", err)),
        };
        debug!(stack = %name, "stack created");

        let mut created = plan.clone();
        created.id = Value::Known(name.clone());
        if let Some(arn) = output.stack().and_then(Stack::arn) {
            created.tags = ctx
                .tags()
                .apply(arn, &plan.tags)
                .await
                .map_err(|err| api_diag("tagging stack", &err))?;
        }

        match self.describe(ctx, &name, &created).await {
            Ok(Some(state)) => Ok(state),
            Ok(None) => Ok(created),
            Err(err) => Err(api_diag("reading stack after create", &err).into()),
        }
    }

    async fn read(&self, ctx: &OpContext, state: Self::State) -> OpResult<Option<Self::State>> {
        let name = state.stack_name()?.clone();
        self.describe(ctx, &name, &state)
            .await
            .map_err(|err| api_diag("reading stack", &err).into())
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
        let name = state.stack_name()?.clone();

        let req = ctx.appstream().update_stack().name(&name);
        let (req, dirty) = apply_update(req, &plan, &state)?;

        if dirty {
            if let Err(err) = req.send().await {
                let err = ApiError::from_sdk(err);
                if err.is_not_found() {
                    return Ok(None);
                }
                return Err(api_diag("updating stack", &err).into());
            }
        }

        let mut updated = state.clone();
        if let Some(arn) = state.arn.as_known() {
            updated.tags = ctx
                .tags()
                .apply(arn, &plan.tags)
                .await
                .map_err(|err| api_diag("tagging stack", &err))?;
        }

        self.describe(ctx, &name, &updated)
            .await
            .map_err(|err| api_diag("reading stack after update", &err).into())
    }

    async fn delete(&self, ctx: &OpContext, state: Self::State) -> OpResult<()> {
        let name = state.stack_name()?.clone();

        if let Err(err) = ctx.appstream().delete_stack().name(&name).send().await {
            let err = ApiError::from_sdk(err);
            if err.is_not_found() {
                return Ok(());
            }
            return Err(api_diag("deleting stack", &err).into());
        }
        Ok(())
    }

    fn import_state(&self, id: &str) -> OpResult<Self::State> {
        if id.is_empty() || id.contains('|') {
            return Err(Diagnostic::error("invalid import identifier")
                .with_detail(format!("expected a bare stack name, got {id:?}"))
                .into());
        }
        Ok(StackState {
            id: Value::Known(id.to_owned()),
            name: Value::Known(id.to_owned()),
            ..StackState::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_appstream::Client;
    use aws_sdk_appstream::config::BehaviorVersion;

    use super::*;

    fn offline_client() -> Client {
        Client::from_conf(
            aws_sdk_appstream::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .build(),
        )
    }

    #[test]
    fn null_structured_attributes_collect_into_the_deletion_enum() {
        let client = offline_client();
        let plan = StackState {
            redirect_url: Value::Null,
            storage_connectors: Value::Null,
            embed_host_domains: Value::Null,
            ..StackState::default()
        };
        let state = StackState {
            redirect_url: Value::Known("https://example.com".to_owned()),
            storage_connectors: Value::from_list(vec![StorageConnectorState {
                connector_type: Value::Known("HOMEFOLDERS".to_owned()),
                ..StorageConnectorState::default()
            }]),
            embed_host_domains: Value::from_list(vec!["example.com".to_owned()]),
            ..StackState::default()
        };

        let req = client.update_stack().name("stack-a");
        let (req, dirty) = apply_update(req, &plan, &state).expect("apply");

        assert!(dirty);
        let deleted = req
            .get_attributes_to_delete()
            .clone()
            .expect("attributes to delete");
        assert!(deleted.contains(&StackAttribute::RedirectUrl));
        assert!(deleted.contains(&StackAttribute::StorageConnectors));
        assert!(deleted.contains(&StackAttribute::EmbedHostDomains));
        assert_eq!(req.get_redirect_url(), &None);
    }

    #[test]
    fn removing_application_settings_disables_them_in_place() {
        let client = offline_client();
        let plan = StackState {
            application_settings: Value::Null,
            ..StackState::default()
        };
        let state = StackState {
            application_settings: Value::Known(ApplicationSettingsState {
                enabled: Value::Known(true),
                settings_group: Value::Known("grp".to_owned()),
                s3_bucket_name: Value::Known("bucket".to_owned()),
            }),
            ..StackState::default()
        };

        let req = client.update_stack().name("stack-a");
        let (req, dirty) = apply_update(req, &plan, &state).expect("apply");

        assert!(dirty);
        let settings = req.get_application_settings().clone().expect("settings");
        assert!(!settings.enabled());
        // The deletion enum has no entry for application settings.
        assert_eq!(req.get_attributes_to_delete(), &None);
    }

    #[test]
    fn validate_rejects_consent_domains_on_non_onedrive_connectors() {
        let rec = StackReconciler;
        let config = StackState {
            storage_connectors: Value::from_list(vec![StorageConnectorState {
                connector_type: Value::Known("HOMEFOLDERS".to_owned()),
                domains_require_admin_consent: Value::from_list(vec!["corp.example".to_owned()]),
                ..StorageConnectorState::default()
            }]),
            ..StackState::default()
        };
        assert!(rec.validate(&config).has_errors());
    }

    #[test]
    fn validate_maximum_length_requires_clipboard_copy() {
        let rec = StackReconciler;

        let wrong_action = StackState {
            user_settings: Value::from_list(vec![UserSettingState {
                action: Value::Known("FILE_UPLOAD".to_owned()),
                permission: Value::Known("ENABLED".to_owned()),
                maximum_length: Value::Known(128),
            }]),
            ..StackState::default()
        };
        assert!(rec.validate(&wrong_action).has_errors());

        let disabled = StackState {
            user_settings: Value::from_list(vec![UserSettingState {
                action: Value::Known("CLIPBOARD_COPY_TO_LOCAL_DEVICE".to_owned()),
                permission: Value::Known("DISABLED".to_owned()),
                maximum_length: Value::Known(128),
            }]),
            ..StackState::default()
        };
        assert!(rec.validate(&disabled).has_errors());

        let valid = StackState {
            user_settings: Value::from_list(vec![UserSettingState {
                action: Value::Known("CLIPBOARD_COPY_TO_LOCAL_DEVICE".to_owned()),
                permission: Value::Known("ENABLED".to_owned()),
                maximum_length: Value::Known(128),
            }]),
            ..StackState::default()
        };
        assert!(!rec.validate(&valid).has_errors());

        // Unknown action defers the check until apply.
        let deferred = StackState {
            user_settings: Value::from_list(vec![UserSettingState {
                action: Value::Unknown,
                permission: Value::Known("ENABLED".to_owned()),
                maximum_length: Value::Known(128),
            }]),
            ..StackState::default()
        };
        assert!(!rec.validate(&deferred).has_errors());
    }
}
