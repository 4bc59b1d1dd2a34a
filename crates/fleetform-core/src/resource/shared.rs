// ── Nested shapes shared by several resource kinds ──

use aws_sdk_appstream::types::S3Location;
use serde::{Deserialize, Serialize};

use crate::diag::Diagnostic;
use crate::resource::OpError;
use crate::value::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3LocationState {
    pub s3_bucket: Value<String>,
    pub s3_key: Value<String>,
}

/// Expand an S3 location; the bucket is mandatory whenever the block is
/// present at all.
pub fn expand_s3_location(
    value: &Value<S3LocationState>,
    attribute: &str,
) -> Result<Option<S3Location>, OpError> {
    let Some(loc) = value.as_known() else {
        return Ok(None);
    };
    S3Location::builder()
        .set_s3_bucket(loc.s3_bucket.to_option())
        .set_s3_key(loc.s3_key.to_option())
        .build()
        .map(Some)
        .map_err(|e| {
            Diagnostic::error("invalid S3 location")
                .with_attribute(attribute.to_owned())
                .with_detail(e.to_string())
                .into()
        })
}

pub fn flatten_s3_location(remote: Option<&S3Location>) -> Value<S3LocationState> {
    Value::from_option(remote.map(|loc| S3LocationState {
        s3_bucket: Value::Known(loc.s3_bucket().to_owned()),
        s3_key: Value::from_option(loc.s3_key().map(str::to_owned)),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_location_expands_to_none() {
        assert!(
            expand_s3_location(&Value::Null, "icon_s3_location")
                .expect("expand")
                .is_none()
        );
        assert!(
            expand_s3_location(&Value::Unknown, "icon_s3_location")
                .expect("expand")
                .is_none()
        );
    }

    #[test]
    fn missing_bucket_is_a_diagnostic_not_a_panic() {
        let loc = Value::Known(S3LocationState {
            s3_bucket: Value::Null,
            s3_key: Value::Known("icons/app.png".to_owned()),
        });
        assert!(expand_s3_location(&loc, "icon_s3_location").is_err());
    }

    #[test]
    fn round_trips_bucket_and_key() {
        let loc = Value::Known(S3LocationState {
            s3_bucket: Value::Known("bucket".to_owned()),
            s3_key: Value::Known("key".to_owned()),
        });
        let expanded = expand_s3_location(&loc, "icon_s3_location")
            .expect("expand")
            .expect("present");
        let flat = flatten_s3_location(Some(&expanded));
        assert_eq!(flat, loc);
    }
}
