// Tag reconciler tests against a mocked Resource Groups Tagging client.

use std::collections::BTreeMap;

use aws_sdk_resourcegroupstagging::operation::get_resources::GetResourcesOutput;
use aws_sdk_resourcegroupstagging::operation::tag_resources::TagResourcesOutput;
use aws_sdk_resourcegroupstagging::operation::untag_resources::UntagResourcesOutput;
use aws_sdk_resourcegroupstagging::types::{ResourceTagMapping, Tag};
use aws_smithy_mocks::{RuleMode, mock, mock_client};

use fleetform_core::tags::TagReconciler;
use fleetform_core::{Session, Value};

const ARN: &str = "arn:aws:appstream:us-east-1:123456789012:fleet/fleet-a";

fn offline_appstream() -> aws_sdk_appstream::Client {
    aws_sdk_appstream::Client::from_conf(
        aws_sdk_appstream::Config::builder()
            .behavior_version(aws_sdk_appstream::config::BehaviorVersion::latest())
            .build(),
    )
}

fn session_with_tagging(
    tagging: aws_sdk_resourcegroupstagging::Client,
    default_tags: &[(&str, &str)],
) -> Session {
    Session::from_clients(
        offline_appstream(),
        tagging,
        default_tags
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect(),
    )
}

fn live_tags(pairs: &[(&str, &str)]) -> GetResourcesOutput {
    let mut mapping = ResourceTagMapping::builder().resource_arn(ARN);
    for (k, v) in pairs {
        mapping = mapping.tags(
            Tag::builder()
                .key((*k).to_owned())
                .value((*v).to_owned())
                .build()
                .expect("tag"),
        );
    }
    GetResourcesOutput::builder()
        .resource_tag_mapping_list(mapping.build())
        .build()
}

#[tokio::test]
async fn apply_removes_stale_keys_and_sets_the_merged_set() {
    // defaults={env:prod}, declared={app:api}, current={old:v}
    let read = mock!(aws_sdk_resourcegroupstagging::Client::get_resources)
        .then_output(|| live_tags(&[("old", "v")]));
    let untag = mock!(aws_sdk_resourcegroupstagging::Client::untag_resources)
        .match_requests(|req| req.tag_keys() == ["old"])
        .then_output(|| UntagResourcesOutput::builder().build());
    let tag = mock!(aws_sdk_resourcegroupstagging::Client::tag_resources)
        .match_requests(|req| {
            req.tags().is_some_and(|tags| {
                tags.len() == 2
                    && tags.get("env").map(String::as_str) == Some("prod")
                    && tags.get("app").map(String::as_str) == Some("api")
            })
        })
        .then_output(|| TagResourcesOutput::builder().build());

    let client = mock_client!(
        aws_sdk_resourcegroupstagging,
        RuleMode::Sequential,
        [&read, &untag, &tag]
    );
    let session = session_with_tagging(client, &[("env", "prod")]);

    let declared: BTreeMap<String, String> =
        [("app".to_owned(), "api".to_owned())].into_iter().collect();
    let result = TagReconciler::new(&session)
        .apply(ARN, &Value::Known(declared))
        .await
        .expect("apply");

    let expected: BTreeMap<String, String> = [
        ("env".to_owned(), "prod".to_owned()),
        ("app".to_owned(), "api".to_owned()),
    ]
    .into_iter()
    .collect();
    assert_eq!(result, Value::Known(expected));
}

#[tokio::test]
async fn unknown_declared_tags_preserve_the_remote_state() {
    // Only the read is mocked: a Tag or Untag call would fail the test.
    let read = mock!(aws_sdk_resourcegroupstagging::Client::get_resources)
        .then_output(|| live_tags(&[("keep", "me")]));

    let client = mock_client!(aws_sdk_resourcegroupstagging, RuleMode::Sequential, [&read]);
    let session = session_with_tagging(client, &[("env", "prod")]);

    let result = TagReconciler::new(&session)
        .apply(ARN, &Value::Unknown)
        .await
        .expect("apply");

    let expected: BTreeMap<String, String> =
        [("keep".to_owned(), "me".to_owned())].into_iter().collect();
    assert_eq!(result, Value::Known(expected));
}

#[tokio::test]
async fn empty_arn_is_a_no_op() {
    // An offline client: any call at all would fail the test.
    let client = aws_sdk_resourcegroupstagging::Client::from_conf(
        aws_sdk_resourcegroupstagging::Config::builder()
            .behavior_version(aws_sdk_resourcegroupstagging::config::BehaviorVersion::latest())
            .build(),
    );
    let session = session_with_tagging(client, &[]);

    let result = TagReconciler::new(&session)
        .apply("", &Value::Known(BTreeMap::new()))
        .await
        .expect("apply");
    assert_eq!(result, Value::Null);
}

#[tokio::test]
async fn matching_tags_issue_no_write_calls() {
    let read = mock!(aws_sdk_resourcegroupstagging::Client::get_resources)
        .then_output(|| live_tags(&[("env", "prod")]));

    let client = mock_client!(aws_sdk_resourcegroupstagging, RuleMode::Sequential, [&read]);
    let session = session_with_tagging(client, &[("env", "prod")]);

    let result = TagReconciler::new(&session)
        .apply(ARN, &Value::Known(BTreeMap::new()))
        .await
        .expect("apply");

    let expected: BTreeMap<String, String> =
        [("env".to_owned(), "prod".to_owned())].into_iter().collect();
    assert_eq!(result, Value::Known(expected));
}
