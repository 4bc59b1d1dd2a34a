// ── Tag reconciliation ──
//
// Three-way diff between live cloud tags, provider default tags, and the
// resource's declared tags. The reconciler issues at most one Untag and
// one Tag call per apply; keys dropped from the declared set but still
// present as defaults stay pinned at the default value.

use std::collections::{BTreeMap, HashMap};

use fleetform_aws::{ApiError, Session};
use tracing::debug;

use crate::value::Value;

pub type TagMap = BTreeMap<String, String>;

/// Merge declared tags over provider defaults; declared wins per key.
pub fn merge_tags(defaults: &TagMap, declared: &TagMap) -> TagMap {
    let mut merged = defaults.clone();
    for (k, v) in declared {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// The minimal patch turning `current` into `desired`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagPatch {
    /// Keys present remotely but absent from the desired set.
    pub remove_keys: Vec<String>,
    /// Pairs whose remote value is missing or different.
    pub upsert: TagMap,
}

impl TagPatch {
    pub fn is_empty(&self) -> bool {
        self.remove_keys.is_empty() && self.upsert.is_empty()
    }
}

/// Diff current against desired. The outputs never overlap: a key is
/// either removed or upserted, not both.
pub fn diff_tags(current: &TagMap, desired: &TagMap) -> TagPatch {
    let remove_keys = current
        .keys()
        .filter(|k| !desired.contains_key(*k))
        .cloned()
        .collect();
    let upsert = desired
        .iter()
        .filter(|(k, v)| current.get(*k) != Some(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    TagPatch {
        remove_keys,
        upsert,
    }
}

/// Applies tag state for a single ARN through the Resource Groups Tagging
/// API. The only component that mutates tags; callers never race it on
/// the same ARN.
pub struct TagReconciler<'a> {
    session: &'a Session,
}

impl<'a> TagReconciler<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Read live tags for an ARN. An empty ARN or an empty tag list reads
    /// as Null.
    pub async fn read(&self, arn: &str) -> Result<Value<TagMap>, ApiError> {
        if arn.is_empty() {
            return Ok(Value::Null);
        }

        let output = self
            .session
            .tagging()
            .get_resources()
            .resource_arn_list(arn)
            .send()
            .await
            .map_err(ApiError::from_sdk)?;

        let mut tags = TagMap::new();
        for mapping in output.resource_tag_mapping_list() {
            for tag in mapping.tags() {
                tags.insert(tag.key().to_owned(), tag.value().to_owned());
            }
        }

        if tags.is_empty() {
            Ok(Value::Null)
        } else {
            Ok(Value::Known(tags))
        }
    }

    /// Reconcile the ARN's live tags toward `merge(defaults, declared)`.
    ///
    /// Unknown declared tags preserve the remote state untouched. Returns
    /// the flattened effective tag set.
    pub async fn apply(
        &self,
        arn: &str,
        desired: &Value<TagMap>,
    ) -> Result<Value<TagMap>, ApiError> {
        if arn.is_empty() {
            return Ok(Value::Null);
        }
        if desired.is_unknown() {
            return self.read(arn).await;
        }

        let current = match self.read(arn).await? {
            Value::Known(tags) => tags,
            _ => TagMap::new(),
        };

        let empty = TagMap::new();
        let declared = desired.as_known().unwrap_or(&empty);
        let effective = merge_tags(self.session.default_tags(), declared);

        let patch = diff_tags(&current, &effective);
        debug!(
            arn,
            remove = patch.remove_keys.len(),
            upsert = patch.upsert.len(),
            "reconciling tags"
        );

        if !patch.remove_keys.is_empty() {
            let output = self
                .session
                .tagging()
                .untag_resources()
                .resource_arn_list(arn)
                .set_tag_keys(Some(patch.remove_keys))
                .send()
                .await
                .map_err(ApiError::from_sdk)?;
            check_failures(output.failed_resources_map())?;
        }

        if !patch.upsert.is_empty() {
            let output = self
                .session
                .tagging()
                .tag_resources()
                .resource_arn_list(arn)
                .set_tags(Some(patch.upsert.into_iter().collect()))
                .send()
                .await
                .map_err(ApiError::from_sdk)?;
            check_failures(output.failed_resources_map())?;
        }

        if effective.is_empty() {
            Ok(Value::Null)
        } else {
            Ok(Value::Known(effective))
        }
    }
}

/// Tag and Untag report per-ARN failures in the response body rather than
/// as service errors; surface the first one.
fn check_failures(
    failed: Option<&HashMap<String, aws_sdk_resourcegroupstagging::types::FailureInfo>>,
) -> Result<(), ApiError> {
    let Some(failed) = failed else {
        return Ok(());
    };
    if let Some((arn, info)) = failed.iter().next() {
        let code = info
            .error_code()
            .map_or("TaggingFailure", aws_sdk_resourcegroupstagging::types::ErrorCode::as_str);
        let message = info
            .error_message()
            .map_or_else(|| format!("tagging failed for {arn}"), str::to_owned);
        return Err(ApiError::from_parts(code, message));
    }
    Ok(())
}
