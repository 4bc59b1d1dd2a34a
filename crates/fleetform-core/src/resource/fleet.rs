// ── Fleet reconciler ──
//
// Identity is the fleet name (name == id). Update exposes both clearing
// channels: description and display name clear through empty strings,
// while the structured attributes (VPC config, domain join info, IAM role,
// USB filters, session script, max sessions per instance) clear through
// the fixed AttributesToDelete enum below.

use async_trait::async_trait;
use aws_sdk_appstream::operation::update_fleet::builders::UpdateFleetFluentBuilder;
use aws_sdk_appstream::types::{
    ComputeCapacity, DomainJoinInfo, Fleet, FleetAttribute, FleetType, PlatformType, StreamView,
    VpcConfig,
};
use fleetform_aws::{ApiError, RetryPolicy, retry};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diag::{Diagnostic, Diagnostics};
use crate::resource::shared::{S3LocationState, expand_s3_location, flatten_s3_location};
use crate::resource::{
    Lifecycle, OpContext, OpError, OpResult, already_exists, api_diag, from_retry, identity_drift,
    require_known,
};
use crate::tags::TagMap;
use crate::value::{FieldAction, Value, plan_field};

const TYPE_NAME: &str = "fleetform_fleet";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeCapacityState {
    pub desired_instances: Value<i32>,
    pub desired_sessions: Value<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VpcConfigState {
    pub subnet_ids: Value<Vec<String>>,
    pub security_group_ids: Value<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainJoinInfoState {
    pub directory_name: Value<String>,
    pub organizational_unit_distinguished_name: Value<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetState {
    pub id: Value<String>,
    pub arn: Value<String>,
    pub name: Value<String>,
    pub display_name: Value<String>,
    pub description: Value<String>,
    pub image_name: Value<String>,
    pub image_arn: Value<String>,
    pub instance_type: Value<String>,
    pub fleet_type: Value<String>,
    pub platform: Value<String>,
    pub stream_view: Value<String>,
    pub compute_capacity: Value<ComputeCapacityState>,
    pub vpc_config: Value<VpcConfigState>,
    pub max_user_duration_in_seconds: Value<i32>,
    pub disconnect_timeout_in_seconds: Value<i32>,
    pub idle_disconnect_timeout_in_seconds: Value<i32>,
    pub enable_default_internet_access: Value<bool>,
    pub domain_join_info: Value<DomainJoinInfoState>,
    pub iam_role_arn: Value<String>,
    pub max_concurrent_sessions: Value<i32>,
    pub max_sessions_per_instance: Value<i32>,
    pub usb_device_filter_strings: Value<Vec<String>>,
    pub session_script_s3_location: Value<S3LocationState>,
    pub state: Value<String>,
    pub created_time: Value<String>,
    pub tags: Value<TagMap>,
}

impl FleetState {
    fn fleet_name(&self) -> Result<&String, OpError> {
        if let Some(name) = self.id.as_known() {
            return Ok(name);
        }
        require_known(&self.name, "name")
    }
}

fn expand_compute_capacity(value: &ComputeCapacityState) -> ComputeCapacity {
    ComputeCapacity::builder()
        .set_desired_instances(value.desired_instances.to_option())
        .set_desired_sessions(value.desired_sessions.to_option())
        .build()
}

fn expand_vpc_config(value: &VpcConfigState) -> VpcConfig {
    VpcConfig::builder()
        .set_subnet_ids(value.subnet_ids.to_list_option())
        .set_security_group_ids(value.security_group_ids.to_list_option())
        .build()
}

fn expand_domain_join_info(value: &DomainJoinInfoState) -> DomainJoinInfo {
    DomainJoinInfo::builder()
        .set_directory_name(value.directory_name.to_option())
        .set_organizational_unit_distinguished_name(
            value
                .organizational_unit_distinguished_name
                .to_option(),
        )
        .build()
}

fn flatten(fleet: &Fleet, prior: &FleetState) -> FleetState {
    let name = fleet.name().to_owned();
    FleetState {
        id: Value::Known(name.clone()),
        arn: Value::Known(fleet.arn().to_owned()),
        name: Value::Known(name),
        display_name: Value::from_option(fleet.display_name().map(str::to_owned)),
        description: Value::from_option(fleet.description().map(str::to_owned)),
        image_name: Value::from_option(fleet.image_name().map(str::to_owned)),
        image_arn: Value::from_option(fleet.image_arn().map(str::to_owned)),
        instance_type: Value::Known(fleet.instance_type().to_owned()),
        fleet_type: Value::from_option(fleet.fleet_type().map(|t| t.as_str().to_owned())),
        platform: Value::from_option(fleet.platform().map(|p| p.as_str().to_owned())),
        stream_view: Value::from_option(fleet.stream_view().map(|v| v.as_str().to_owned())),
        compute_capacity: {
            let status = fleet.compute_capacity_status();
            Value::Known(ComputeCapacityState {
                desired_instances: Value::Known(status.desired()),
                desired_sessions: Value::from_option(status.desired_user_sessions()),
            })
        },
        vpc_config: Value::from_option(fleet.vpc_config().map(|vpc| VpcConfigState {
            subnet_ids: Value::from_list(vpc.subnet_ids().to_vec()),
            security_group_ids: Value::from_list(vpc.security_group_ids().to_vec()),
        })),
        max_user_duration_in_seconds: Value::from_option(fleet.max_user_duration_in_seconds()),
        disconnect_timeout_in_seconds: Value::from_option(fleet.disconnect_timeout_in_seconds()),
        idle_disconnect_timeout_in_seconds: Value::from_option(
            fleet.idle_disconnect_timeout_in_seconds(),
        ),
        enable_default_internet_access: Value::from_option(fleet.enable_default_internet_access()),
        domain_join_info: Value::from_option(fleet.domain_join_info().map(|info| {
            DomainJoinInfoState {
                directory_name: Value::from_option(info.directory_name().map(str::to_owned)),
                organizational_unit_distinguished_name: Value::from_option(
                    info.organizational_unit_distinguished_name()
                        .map(str::to_owned),
                ),
            }
        })),
        iam_role_arn: Value::from_option(fleet.iam_role_arn().map(str::to_owned)),
        max_concurrent_sessions: Value::from_option(fleet.max_concurrent_sessions()),
        max_sessions_per_instance: Value::from_option(fleet.max_sessions_per_instance()),
        usb_device_filter_strings: Value::from_list(fleet.usb_device_filter_strings().to_vec()),
        session_script_s3_location: flatten_s3_location(fleet.session_script_s3_location()),
        state: Value::Known(fleet.state().as_str().to_owned()),
        created_time: Value::from_timestamp(fleet.created_time()),
        tags: prior.tags.clone(),
    }
}

/// Apply the per-field update policy to the UpdateFleet call.
#[allow(clippy::too_many_lines)]
fn apply_update(
    mut req: UpdateFleetFluentBuilder,
    plan: &FleetState,
    state: &FleetState,
) -> Result<(UpdateFleetFluentBuilder, bool), OpError> {
    let mut dirty = false;
    let mut to_delete: Vec<FleetAttribute> = Vec::new();

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

    // Set-only scalar fields.
    if let Some(v) = plan.image_name.as_known() {
        req = req.image_name(v);
        dirty = true;
    }
    if let Some(v) = plan.image_arn.as_known() {
        req = req.image_arn(v);
        dirty = true;
    }
    if let Some(v) = plan.instance_type.as_known() {
        req = req.instance_type(v);
        dirty = true;
    }
    if let Some(v) = plan.stream_view.as_known() {
        req = req.stream_view(StreamView::from(v.as_str()));
        dirty = true;
    }
    if let Some(v) = plan.platform.as_known() {
        req = req.platform(PlatformType::from(v.as_str()));
        dirty = true;
    }
    if let Some(v) = plan.compute_capacity.as_known() {
        req = req.compute_capacity(expand_compute_capacity(v));
        dirty = true;
    }
    if let Some(&v) = plan.max_user_duration_in_seconds.as_known() {
        req = req.max_user_duration_in_seconds(v);
        dirty = true;
    }
    if let Some(&v) = plan.disconnect_timeout_in_seconds.as_known() {
        req = req.disconnect_timeout_in_seconds(v);
        dirty = true;
    }
    if let Some(&v) = plan.idle_disconnect_timeout_in_seconds.as_known() {
        req = req.idle_disconnect_timeout_in_seconds(v);
        dirty = true;
    }
    if let Some(&v) = plan.enable_default_internet_access.as_known() {
        req = req.enable_default_internet_access(v);
        dirty = true;
    }
    if let Some(&v) = plan.max_concurrent_sessions.as_known() {
        req = req.max_concurrent_sessions(v);
        dirty = true;
    }

    // AttributesToDelete channel.
    match plan_field(&plan.vpc_config, &state.vpc_config) {
        FieldAction::Set(v) => {
            // A VPC config that keeps its subnets but drops its security
            // groups clears only the group list.
            let unknown = Value::Unknown;
            let state_groups = state
                .vpc_config
                .as_known()
                .map_or(&unknown, |s| &s.security_group_ids);
            if plan_field(&v.security_group_ids, state_groups) == FieldAction::Clear {
                to_delete.push(FleetAttribute::VpcConfigurationSecurityGroupIds);
            }
            req = req.vpc_config(expand_vpc_config(&v));
            dirty = true;
        }
        FieldAction::Clear => to_delete.push(FleetAttribute::VpcConfiguration),
        FieldAction::Skip => {}
    }
    match plan_field(&plan.domain_join_info, &state.domain_join_info) {
        FieldAction::Set(v) => {
            req = req.domain_join_info(expand_domain_join_info(&v));
            dirty = true;
        }
        FieldAction::Clear => to_delete.push(FleetAttribute::DomainJoinInfo),
        FieldAction::Skip => {}
    }
    match plan_field(&plan.iam_role_arn, &state.iam_role_arn) {
        FieldAction::Set(v) => {
            req = req.iam_role_arn(v);
            dirty = true;
        }
        FieldAction::Clear => to_delete.push(FleetAttribute::IamRoleArn),
        FieldAction::Skip => {}
    }
    match plan_field(&plan.usb_device_filter_strings, &state.usb_device_filter_strings) {
        FieldAction::Set(v) => {
            req = req.set_usb_device_filter_strings(Some(v));
            dirty = true;
        }
        FieldAction::Clear => to_delete.push(FleetAttribute::UsbDeviceFilterStrings),
        FieldAction::Skip => {}
    }
    match plan_field(&plan.session_script_s3_location, &state.session_script_s3_location) {
        FieldAction::Set(_) => {
            if let Some(loc) =
                expand_s3_location(&plan.session_script_s3_location, "session_script_s3_location")?
            {
                req = req.session_script_s3_location(loc);
                dirty = true;
            }
        }
        FieldAction::Clear => to_delete.push(FleetAttribute::SessionScriptS3Location),
        FieldAction::Skip => {}
    }
    match plan_field(&plan.max_sessions_per_instance, &state.max_sessions_per_instance) {
        FieldAction::Set(v) => {
            req = req.max_sessions_per_instance(v);
            dirty = true;
        }
        FieldAction::Clear => to_delete.push(FleetAttribute::MaxSessionsPerInstance),
        FieldAction::Skip => {}
    }

    if !to_delete.is_empty() {
        req = req.set_attributes_to_delete(Some(to_delete));
        dirty = true;
    }

    Ok((req, dirty))
}

#[derive(Debug, Default)]
pub struct FleetReconciler;

impl FleetReconciler {
    async fn describe(
        &self,
        ctx: &OpContext,
        name: &str,
        prior: &FleetState,
    ) -> Result<Option<FleetState>, ApiError> {
        let result = ctx.appstream().describe_fleets().names(name).send().await;

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

        let Some(fleet) = output.fleets().first() else {
            return Ok(None);
        };

        let mut state = flatten(fleet, prior);
        state.tags = ctx.tags().read(fleet.arn()).await?;
        Ok(Some(state))
    }
}

#[async_trait]
impl Lifecycle for FleetReconciler {
    type State = FleetState;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn validate(&self, config: &Self::State) -> Diagnostics {
        let mut diags = Diagnostics::new();

        // Exactly one image reference; unknown values defer until apply.
        if config.image_name.is_null() && config.image_arn.is_null() {
            diags.push(
                Diagnostic::error("missing image reference")
                    .with_attribute("image_name")
                    .with_detail("one of image_name or image_arn must be set"),
            );
        }
        if config.image_name.is_known() && config.image_arn.is_known() {
            diags.push(
                Diagnostic::error("conflicting image references")
                    .with_attribute("image_arn")
                    .with_detail("image_name and image_arn are mutually exclusive"),
            );
        }

        diags
    }

    async fn create(&self, ctx: &OpContext, plan: Self::State) -> OpResult<Self::State> {
        let name = require_known(&plan.name, "name")?.clone();
        let instance_type = require_known(&plan.instance_type, "instance_type")?.clone();

        let session_script =
            expand_s3_location(&plan.session_script_s3_location, "session_script_s3_location")?;

        let policy = RetryPolicy::create_default().retry_if(ApiError::is_retryable_create);
        let result = retry(&ctx.cancel, &policy, || async {
            ctx.appstream()
                .create_fleet()
                .name(&name)
                .instance_type(&instance_type)
                .set_image_name(plan.image_name.to_option())
                .set_image_arn(plan.image_arn.to_option())
                .set_fleet_type(
                    plan.fleet_type
                        .as_known()
                        .map(|t| FleetType::from(t.as_str())),
                )
                .set_platform(
                    plan.platform
                        .as_known()
                        .map(|p| PlatformType::from(p.as_str())),
                )
                .set_stream_view(
                    plan.stream_view
                        .as_known()
                        .map(|v| StreamView::from(v.as_str())),
                )
                .set_compute_capacity(
                    plan.compute_capacity.as_known().map(expand_compute_capacity),
                )
                .set_vpc_config(plan.vpc_config.as_known().map(expand_vpc_config))
                .set_domain_join_info(
                    plan.domain_join_info.as_known().map(expand_domain_join_info),
                )
                .set_description(plan.description.to_option())
                .set_display_name(plan.display_name.to_option())
                .set_max_user_duration_in_seconds(plan.max_user_duration_in_seconds.to_option())
                .set_disconnect_timeout_in_seconds(plan.disconnect_timeout_in_seconds.to_option())
                .set_idle_disconnect_timeout_in_seconds(
                    plan.idle_disconnect_timeout_in_seconds.to_option(),
                )
                .set_enable_default_internet_access(
                    plan.enable_default_internet_access.to_option(),
                )
                .set_iam_role_arn(plan.iam_role_arn.to_option())
                .set_max_concurrent_sessions(plan.max_concurrent_sessions.to_option())
                .set_max_sessions_per_instance(plan.max_sessions_per_instance.to_option())
                .set_usb_device_filter_strings(plan.usb_device_filter_strings.to_list_option())
                .set_session_script_s3_location(session_script.clone())
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
            Err(err) => return Err(from_retry("creating fleet", err)),
        };
        debug!(fleet = %name, "fleet created");

        let mut created = plan.clone();
        created.id = Value::Known(name.clone());
        if let Some(fleet) = output.fleet() {
            created.tags = ctx
                .tags()
                .apply(fleet.arn(), &plan.tags)
                .await
                .map_err(|err| api_diag("tagging fleet", &err))?;
        }

        match self.describe(ctx, &name, &created).await {
            Ok(Some(state)) => Ok(state),
            Ok(None) => Ok(created),
            Err(err) => Err(api_diag("reading fleet after create", &err).into()),
        }
    }

    async fn read(&self, ctx: &OpContext, state: Self::State) -> OpResult<Option<Self::State>> {
        let name = state.fleet_name()?.clone();
        self.describe(ctx, &name, &state)
            .await
            .map_err(|err| api_diag("reading fleet", &err).into())
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
        let name = state.fleet_name()?.clone();

        let req = ctx.appstream().update_fleet().name(&name);
        let (req, dirty) = apply_update(req, &plan, &state)?;

        if dirty {
            let policy = RetryPolicy::create_default().retry_if(ApiError::is_transient);
            let result = retry(&ctx.cancel, &policy, {
                let req = req.clone();
                move || {
                    let req = req.clone();
                    async move { req.send().await.map_err(ApiError::from_sdk) }
                }
            })
            .await;

            if let Err(err) = result {
                if let fleetform_aws::RetryError::Terminal(ref api) = err {
                    if api.is_not_found() {
                        return Ok(None);
                    }
                }
                return Err(from_retry("updating fleet", err));
            }
        }

        let mut updated = state.clone();
        if let Some(arn) = state.arn.as_known() {
            updated.tags = ctx
                .tags()
                .apply(arn, &plan.tags)
                .await
                .map_err(|err| api_diag("tagging fleet", &err))?;
        }

        self.describe(ctx, &name, &updated)
            .await
            .map_err(|err| api_diag("reading fleet after update", &err).into())
    }

    async fn delete(&self, ctx: &OpContext, state: Self::State) -> OpResult<()> {
        let name = state.fleet_name()?.clone();

        if let Err(err) = ctx.appstream().delete_fleet().name(&name).send().await {
            let err = ApiError::from_sdk(err);
            if err.is_not_found() {
                return Ok(());
            }
            return Err(api_diag("deleting fleet", &err).into());
        }
        Ok(())
    }

    fn import_state(&self, id: &str) -> OpResult<Self::State> {
        if id.is_empty() || id.contains('|') {
            return Err(Diagnostic::error("invalid import identifier")
                .with_detail(format!("expected a bare fleet name, got {id:?}"))
                .into());
        }
        Ok(FleetState {
            id: Value::Known(id.to_owned()),
            name: Value::Known(id.to_owned()),
            ..FleetState::default()
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

    fn known_vpc(subnets: &[&str], groups: &[&str]) -> Value<VpcConfigState> {
        Value::Known(VpcConfigState {
            subnet_ids: Value::from_list(subnets.iter().map(|s| (*s).to_owned()).collect()),
            security_group_ids: Value::from_list(groups.iter().map(|s| (*s).to_owned()).collect()),
        })
    }

    #[test]
    fn null_vpc_config_deletes_the_attribute() {
        let client = offline_client();
        let plan = FleetState {
            vpc_config: Value::Null,
            ..FleetState::default()
        };
        let state = FleetState {
            vpc_config: known_vpc(&["subnet-1"], &["sg-1"]),
            ..FleetState::default()
        };

        let req = client.update_fleet().name("fleet-a");
        let (req, dirty) = apply_update(req, &plan, &state).expect("apply");

        assert!(dirty);
        assert_eq!(req.get_vpc_config(), &None);
        assert_eq!(
            req.get_attributes_to_delete(),
            &Some(vec![FleetAttribute::VpcConfiguration])
        );
    }

    #[test]
    fn dropping_security_groups_clears_only_the_group_list() {
        let client = offline_client();
        let plan = FleetState {
            vpc_config: Value::Known(VpcConfigState {
                subnet_ids: Value::from_list(vec!["subnet-1".to_owned()]),
                security_group_ids: Value::Null,
            }),
            ..FleetState::default()
        };
        let state = FleetState {
            vpc_config: known_vpc(&["subnet-1"], &["sg-1"]),
            ..FleetState::default()
        };

        let req = client.update_fleet().name("fleet-a");
        let (req, dirty) = apply_update(req, &plan, &state).expect("apply");

        assert!(dirty);
        assert!(req.get_vpc_config().is_some());
        assert_eq!(
            req.get_attributes_to_delete(),
            &Some(vec![FleetAttribute::VpcConfigurationSecurityGroupIds])
        );
    }

    #[test]
    fn null_structured_fields_use_the_deletion_enum() {
        let client = offline_client();
        let plan = FleetState {
            iam_role_arn: Value::Null,
            usb_device_filter_strings: Value::Null,
            max_sessions_per_instance: Value::Null,
            ..FleetState::default()
        };
        let state = FleetState {
            iam_role_arn: Value::Known("arn:aws:iam::123:role/fleet".to_owned()),
            usb_device_filter_strings: Value::from_list(vec!["*".to_owned()]),
            max_sessions_per_instance: Value::Known(4),
            ..FleetState::default()
        };

        let req = client.update_fleet().name("fleet-a");
        let (req, dirty) = apply_update(req, &plan, &state).expect("apply");

        assert!(dirty);
        let deleted = req
            .get_attributes_to_delete()
            .clone()
            .expect("attributes to delete");
        assert!(deleted.contains(&FleetAttribute::IamRoleArn));
        assert!(deleted.contains(&FleetAttribute::UsbDeviceFilterStrings));
        assert!(deleted.contains(&FleetAttribute::MaxSessionsPerInstance));
    }

    #[test]
    fn unknown_plan_is_a_clean_no_op() {
        let client = offline_client();
        let plan = FleetState::default();
        let state = FleetState {
            description: Value::Known("d".to_owned()),
            iam_role_arn: Value::Known("arn".to_owned()),
            ..FleetState::default()
        };

        let req = client.update_fleet().name("fleet-a");
        let (req, dirty) = apply_update(req, &plan, &state).expect("apply");

        assert!(!dirty);
        assert_eq!(req.get_attributes_to_delete(), &None);
    }

    #[test]
    fn validate_requires_exactly_one_image_reference() {
        let rec = FleetReconciler;

        let both_null = FleetState {
            image_name: Value::Null,
            image_arn: Value::Null,
            ..FleetState::default()
        };
        assert!(rec.validate(&both_null).has_errors());

        let both_set = FleetState {
            image_name: Value::Known("img".to_owned()),
            image_arn: Value::Known("arn".to_owned()),
            ..FleetState::default()
        };
        assert!(rec.validate(&both_set).has_errors());

        // Unknown defers the check until apply.
        let deferred = FleetState {
            image_name: Value::Unknown,
            image_arn: Value::Null,
            ..FleetState::default()
        };
        assert!(!rec.validate(&deferred).has_errors());

        let valid = FleetState {
            image_name: Value::Known("img".to_owned()),
            image_arn: Value::Null,
            ..FleetState::default()
        };
        assert!(!rec.validate(&valid).has_errors());
    }

    #[test]
    fn bare_name_imports_reject_composites() {
        let rec = FleetReconciler;
        assert!(rec.import_state("fleet-a").is_ok());
        assert!(rec.import_state("fleet|stack").is_err());
        assert!(rec.import_state("").is_err());
    }

    #[test]
    fn flatten_uses_the_name_as_identity() {
        let fleet = Fleet::builder()
            .arn("arn:aws:appstream:us-east-1:123456789012:fleet/fleet-a")
            .name("fleet-a")
            .instance_type("stream.standard.medium")
            .compute_capacity_status(
                aws_sdk_appstream::types::ComputeCapacityStatus::builder()
                    .desired(2)
                    .build()
                    .expect("capacity status"),
            )
            .state(aws_sdk_appstream::types::FleetState::Running)
            .build()
            .expect("fleet");

        let state = flatten(&fleet, &FleetState::default());

        assert_eq!(state.id, Value::Known("fleet-a".to_owned()));
        assert_eq!(state.name, state.id);
        assert_eq!(
            state.arn,
            Value::Known("arn:aws:appstream:us-east-1:123456789012:fleet/fleet-a".to_owned())
        );
        assert_eq!(
            state.compute_capacity,
            Value::Known(ComputeCapacityState {
                desired_instances: Value::Known(2),
                desired_sessions: Value::Null,
            })
        );
        assert_eq!(state.state, Value::Known("RUNNING".to_owned()));
        // Absent optionals and empty lists flatten to Null, never Unknown.
        assert_eq!(state.display_name, Value::Null);
        assert_eq!(state.usb_device_filter_strings, Value::Null);
        assert_eq!(state.vpc_config, Value::Null);
        assert_eq!(state.created_time, Value::Null);
    }
}
