// Operation-level reconciler tests against mocked AWS clients.

use std::collections::BTreeMap;

use aws_sdk_appstream::config::BehaviorVersion;
use aws_sdk_appstream::error::ErrorMetadata;
use aws_sdk_appstream::operation::create_entitlement::{
    CreateEntitlementError, CreateEntitlementOutput,
};
use aws_sdk_appstream::operation::delete_fleet::DeleteFleetError;
use aws_sdk_appstream::operation::describe_entitlements::DescribeEntitlementsOutput;
use aws_sdk_appstream::operation::describe_fleets::{DescribeFleetsError, DescribeFleetsOutput};
use aws_sdk_appstream::operation::describe_users::DescribeUsersOutput;
use aws_sdk_appstream::operation::disable_user::DisableUserOutput;
use aws_sdk_appstream::operation::list_entitled_applications::ListEntitledApplicationsOutput;
use aws_sdk_appstream::types::error::ResourceNotFoundException;
use aws_sdk_appstream::types::{
    AppVisibility, AuthenticationType, Entitlement, EntitledApplication, User,
};
use aws_smithy_mocks::{RuleMode, mock, mock_client};
use tokio_util::sync::CancellationToken;

use fleetform_core::resource::application_entitlement::ApplicationEntitlementState;
use fleetform_core::resource::entitlement::EntitlementState;
use fleetform_core::resource::user::UserState;
use fleetform_core::resource::{
    ApplicationEntitlementReconciler, EntitlementReconciler, FleetReconciler, UserReconciler,
};
use fleetform_core::{Lifecycle, OpContext, Session, Value};

// ── Helpers ─────────────────────────────────────────────────────────

fn offline_tagging() -> aws_sdk_resourcegroupstagging::Client {
    aws_sdk_resourcegroupstagging::Client::from_conf(
        aws_sdk_resourcegroupstagging::Config::builder()
            .behavior_version(
                aws_sdk_resourcegroupstagging::config::BehaviorVersion::latest(),
            )
            .build(),
    )
}

fn offline_appstream() -> aws_sdk_appstream::Client {
    aws_sdk_appstream::Client::from_conf(
        aws_sdk_appstream::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .build(),
    )
}

fn context_with_appstream(appstream: aws_sdk_appstream::Client) -> OpContext {
    let session = Session::from_clients(appstream, offline_tagging(), BTreeMap::new());
    OpContext::new(session, CancellationToken::new())
}

fn not_found() -> ResourceNotFoundException {
    ResourceNotFoundException::builder()
        .message("resource is not visible yet")
        .meta(
            ErrorMetadata::builder()
                .code("ResourceNotFoundException")
                .build(),
        )
        .build()
}

// ── Entitlement create race ─────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn entitlement_create_retries_until_the_stack_is_visible() {
    let first_attempt = mock!(aws_sdk_appstream::Client::create_entitlement)
        .then_error(|| CreateEntitlementError::ResourceNotFoundException(not_found()));
    let second_attempt = mock!(aws_sdk_appstream::Client::create_entitlement)
        .then_output(|| CreateEntitlementOutput::builder().build());
    let describe = mock!(aws_sdk_appstream::Client::describe_entitlements).then_output(|| {
        DescribeEntitlementsOutput::builder()
            .entitlements(
                Entitlement::builder()
                    .name("ent1")
                    .stack_name("stack1")
                    .app_visibility(AppVisibility::All)
                    .build()
                    .expect("entitlement"),
            )
            .build()
    });

    let client = mock_client!(
        aws_sdk_appstream,
        RuleMode::Sequential,
        [&first_attempt, &second_attempt, &describe]
    );
    let ctx = context_with_appstream(client);

    let plan = EntitlementState {
        name: Value::Known("ent1".to_owned()),
        stack_name: Value::Known("stack1".to_owned()),
        app_visibility: Value::Known("ALL".to_owned()),
        attributes: Value::Known(Vec::new()),
        ..EntitlementState::default()
    };

    let state = EntitlementReconciler
        .create(&ctx, plan)
        .await
        .expect("create succeeds after the transient NotFound");

    assert_eq!(state.id, Value::Known("stack1|ent1".to_owned()));
}

// ── Idempotent association create ───────────────────────────────────

#[tokio::test]
async fn association_create_skips_associate_when_already_present() {
    // Only the list call is mocked: reaching Associate would fail the test.
    let list = mock!(aws_sdk_appstream::Client::list_entitled_applications).then_output(|| {
        ListEntitledApplicationsOutput::builder()
            .entitled_applications(
                EntitledApplication::builder()
                    .application_identifier("app")
                    .build()
                    .expect("entitled application"),
            )
            .build()
    });

    let client = mock_client!(aws_sdk_appstream, RuleMode::Sequential, [&list]);
    let ctx = context_with_appstream(client);

    let plan = ApplicationEntitlementState {
        stack_name: Value::Known("stack".to_owned()),
        entitlement_name: Value::Known("ent".to_owned()),
        application_identifier: Value::Known("app".to_owned()),
        ..ApplicationEntitlementState::default()
    };

    let state = ApplicationEntitlementReconciler
        .create(&ctx, plan)
        .await
        .expect("create is idempotent");

    assert_eq!(state.id, Value::Known("stack|ent|app".to_owned()));
}

// ── User create with suppress + disable + visibility retry ──────────

#[tokio::test(start_paused = true)]
async fn user_create_disables_and_waits_for_visibility() {
    let create = mock!(aws_sdk_appstream::Client::create_user)
        .match_requests(|req| {
            req.message_action()
                .is_some_and(|m| m.as_str() == "SUPPRESS")
        })
        .then_output(|| {
            aws_sdk_appstream::operation::create_user::CreateUserOutput::builder().build()
        });
    let disable = mock!(aws_sdk_appstream::Client::disable_user)
        .then_output(|| DisableUserOutput::builder().build());
    // The user lags the successful create by one describe page.
    let first_scan = mock!(aws_sdk_appstream::Client::describe_users)
        .then_output(|| DescribeUsersOutput::builder().build());
    let second_scan = mock!(aws_sdk_appstream::Client::describe_users).then_output(|| {
        DescribeUsersOutput::builder()
            .users(
                User::builder()
                    .user_name("user@example.com")
                    .authentication_type(AuthenticationType::Userpool)
                    .enabled(false)
                    .build()
                    .expect("user"),
            )
            .build()
    });

    let client = mock_client!(
        aws_sdk_appstream,
        RuleMode::Sequential,
        [&create, &disable, &first_scan, &second_scan]
    );
    let ctx = context_with_appstream(client);

    let plan = UserState {
        user_name: Value::Known("user@example.com".to_owned()),
        authentication_type: Value::Known("USERPOOL".to_owned()),
        message_action: Value::Known("SUPPRESS".to_owned()),
        enabled: Value::Known(false),
        ..UserState::default()
    };

    let state = UserReconciler
        .create(&ctx, plan)
        .await
        .expect("create succeeds once the user is visible");

    assert_eq!(state.id, Value::Known("USERPOOL|user@example.com".to_owned()));
    assert_eq!(state.enabled, Value::Known(false));
    // Write-only attribute survives the read untouched.
    assert_eq!(state.message_action, Value::Known("SUPPRESS".to_owned()));
}

// ── NotFound absorption ─────────────────────────────────────────────

#[tokio::test]
async fn fleet_delete_succeeds_when_already_gone() {
    let delete = mock!(aws_sdk_appstream::Client::delete_fleet)
        .then_error(|| DeleteFleetError::ResourceNotFoundException(not_found()));

    let client = mock_client!(aws_sdk_appstream, RuleMode::Sequential, [&delete]);
    let ctx = context_with_appstream(client);

    let state = fleetform_core::resource::fleet::FleetState {
        id: Value::Known("fleet-a".to_owned()),
        ..fleetform_core::resource::fleet::FleetState::default()
    };

    FleetReconciler
        .delete(&ctx, state)
        .await
        .expect("delete absorbs NotFound");
}

#[tokio::test]
async fn fleet_read_returns_gone_on_not_found() {
    let describe = mock!(aws_sdk_appstream::Client::describe_fleets)
        .then_error(|| DescribeFleetsError::ResourceNotFoundException(not_found()));

    let client = mock_client!(aws_sdk_appstream, RuleMode::Sequential, [&describe]);
    let ctx = context_with_appstream(client);

    let state = fleetform_core::resource::fleet::FleetState {
        id: Value::Known("fleet-a".to_owned()),
        ..fleetform_core::resource::fleet::FleetState::default()
    };

    let result = FleetReconciler
        .read(&ctx, state)
        .await
        .expect("read never errors on NotFound");
    assert!(result.is_none());
}

// ── Empty-output reads are gone, not errors ─────────────────────────

#[tokio::test]
async fn fleet_read_with_empty_page_is_gone() {
    let describe = mock!(aws_sdk_appstream::Client::describe_fleets)
        .then_output(|| DescribeFleetsOutput::builder().build());

    let client = mock_client!(aws_sdk_appstream, RuleMode::Sequential, [&describe]);
    let ctx = context_with_appstream(client);

    let state = fleetform_core::resource::fleet::FleetState {
        id: Value::Known("fleet-a".to_owned()),
        ..fleetform_core::resource::fleet::FleetState::default()
    };

    let result = FleetReconciler.read(&ctx, state).await.expect("read");
    assert!(result.is_none());
}

// ── Cancellation makes no calls ─────────────────────────────────────

#[tokio::test]
async fn cancelled_create_makes_no_aws_calls() {
    // No rules mounted: any AWS call would fail the test.
    let ctx = {
        let session =
            Session::from_clients(offline_appstream(), offline_tagging(), BTreeMap::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        OpContext::new(session, cancel)
    };

    let plan = EntitlementState {
        name: Value::Known("ent1".to_owned()),
        stack_name: Value::Known("stack1".to_owned()),
        app_visibility: Value::Known("ALL".to_owned()),
        attributes: Value::Known(Vec::new()),
        ..EntitlementState::default()
    };

    let result = EntitlementReconciler.create(&ctx, plan).await;
    assert!(matches!(result, Err(fleetform_core::OpError::Cancelled)));
}
