// ── Tri-state attribute values ──
//
// Every user-facing attribute is Unknown (not yet computed at plan time),
// Null (explicitly absent), or Known. The distinction is load-bearing for
// update semantics: Unknown defers, Null clears, Known sets. Never widen
// to a plain Option.

use aws_sdk_appstream::primitives::{DateTime, DateTimeFormat};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A tri-state attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value<T> {
    /// Not yet computed at plan time.
    #[default]
    Unknown,
    /// Explicitly absent.
    Null,
    /// This exact value.
    Known(T),
}

impl<T> Value<T> {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    pub fn as_known(&self) -> Option<&T> {
        match self {
            Self::Known(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_known(self) -> Option<T> {
        match self {
            Self::Known(v) => Some(v),
            _ => None,
        }
    }

    /// Expand a scalar for an AWS `set_*` builder: Known becomes an owned
    /// `Some`, Null and Unknown are omitted.
    pub fn to_option(&self) -> Option<T>
    where
        T: Clone,
    {
        self.as_known().cloned()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Value<U> {
        match self {
            Self::Known(v) => Value::Known(f(v)),
            Self::Null => Value::Null,
            Self::Unknown => Value::Unknown,
        }
    }

    /// Flatten an AWS response scalar: `None` is Null, never Unknown.
    pub fn from_option(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Self::Known)
    }
}

impl<T> Value<Vec<T>> {
    /// Expand a set for an AWS `set_*` builder. An empty Known set expands
    /// to no slice at all, which AWS treats the same as absent.
    pub fn to_list_option(&self) -> Option<Vec<T>>
    where
        T: Clone,
    {
        match self.as_known() {
            Some(items) if !items.is_empty() => Some(items.clone()),
            _ => None,
        }
    }

    /// Flatten an AWS response list; empty and absent both read as Null.
    pub fn from_list(items: Vec<T>) -> Self {
        if items.is_empty() {
            Self::Null
        } else {
            Self::Known(items)
        }
    }
}

impl Value<String> {
    /// Flatten a string the user declared (or didn't): when the prior state
    /// is Null the user never set the attribute, so an AWS-imputed value
    /// must not be attributed to them -- it flattens to Null anyway.
    pub fn owned_string(prior: &Self, remote: Option<&str>) -> Self {
        if prior.is_null() {
            return Self::Null;
        }
        Self::from_option(remote.map(str::to_owned))
    }

    /// Flatten a server timestamp as an RFC 3339 string.
    pub fn from_timestamp(remote: Option<&DateTime>) -> Self {
        Self::from_option(remote.and_then(|dt| dt.fmt(DateTimeFormat::DateTime).ok()))
    }
}

impl<T> From<T> for Value<T> {
    fn from(v: T) -> Self {
        Self::Known(v)
    }
}

// ── Serde ───────────────────────────────────────────────────────────
//
// Known ⇄ the value, Null ⇄ null, Unknown ⇄ {"$unknown": true}. The
// sentinel object keeps plan-time uncertainty distinct from explicit
// absence on the host wire.

const UNKNOWN_KEY: &str = "$unknown";

impl<T: Serialize> Serialize for Value<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        match self {
            Self::Known(v) => v.serialize(serializer),
            Self::Null => serializer.serialize_none(),
            Self::Unknown => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(UNKNOWN_KEY, &true)?;
                map.end()
            }
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Value<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        if raw.is_null() {
            return Ok(Self::Null);
        }
        if let Some(map) = raw.as_object() {
            if map.get(UNKNOWN_KEY).and_then(serde_json::Value::as_bool) == Some(true) {
                return Ok(Self::Unknown);
            }
        }
        T::deserialize(raw)
            .map(Self::Known)
            .map_err(serde::de::Error::custom)
    }
}

// ── Optional-attribute update policy ────────────────────────────────

/// Per-attribute decision on an update path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldAction<T> {
    /// Defer to a later apply (plan is Unknown) or nothing to do.
    Skip,
    /// Set the field to this exact value.
    Set(T),
    /// Clear the field through whichever deletion channel the operation
    /// supports for it.
    Clear,
}

/// Dispatch the (plan, state) pair onto the update-policy table:
/// Unknown plans defer, Known plans set, and a Null plan clears only when
/// the state still holds a value.
pub fn plan_field<T: Clone>(plan: &Value<T>, state: &Value<T>) -> FieldAction<T> {
    match plan {
        Value::Unknown => FieldAction::Skip,
        Value::Known(v) => FieldAction::Set(v.clone()),
        Value::Null => match state {
            Value::Known(_) => FieldAction::Clear,
            _ => FieldAction::Skip,
        },
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn expand_scalar_omits_null_and_unknown() {
        assert_eq!(Value::<String>::Unknown.to_option(), None);
        assert_eq!(Value::<String>::Null.to_option(), None);
        assert_eq!(
            Value::Known("v".to_owned()).to_option(),
            Some("v".to_owned())
        );
    }

    #[test]
    fn expand_empty_set_omits_slice() {
        let empty: Value<Vec<String>> = Value::Known(Vec::new());
        assert_eq!(empty.to_list_option(), None);

        let set = Value::Known(vec!["a".to_owned()]);
        assert_eq!(set.to_list_option(), Some(vec!["a".to_owned()]));
    }

    #[test]
    fn flatten_empty_list_is_null() {
        assert_eq!(Value::<Vec<String>>::from_list(Vec::new()), Value::Null);
    }

    #[test]
    fn owned_string_suppresses_imputed_values() {
        // User never set the attribute; the AWS-side default must not leak.
        assert_eq!(
            Value::owned_string(&Value::Null, Some("imputed")),
            Value::Null
        );
        // User owns the attribute; the AWS value wins.
        assert_eq!(
            Value::owned_string(&Value::Known("old".to_owned()), Some("new")),
            Value::Known("new".to_owned())
        );
        // Import path: prior Unknown adopts the remote value.
        assert_eq!(
            Value::owned_string(&Value::Unknown, Some("adopted")),
            Value::Known("adopted".to_owned())
        );
    }

    #[test]
    fn timestamp_flattens_to_rfc3339() {
        let dt = DateTime::from_secs(1_700_000_000);
        let flat = Value::from_timestamp(Some(&dt));
        match flat {
            Value::Known(s) => assert!(s.starts_with("2023-11-14T"), "got {s}"),
            other => panic!("expected Known timestamp, got {other:?}"),
        }
        assert_eq!(Value::from_timestamp(None), Value::Null);
    }

    #[test]
    fn update_policy_matrix() {
        let known = Value::Known("v".to_owned());
        let null = Value::<String>::Null;
        let unknown = Value::<String>::Unknown;

        // Unknown plan always defers.
        assert_eq!(plan_field(&unknown, &known), FieldAction::Skip);
        assert_eq!(plan_field(&unknown, &null), FieldAction::Skip);

        // Known plan always sets.
        assert_eq!(
            plan_field(&known, &null),
            FieldAction::Set("v".to_owned())
        );
        assert_eq!(
            plan_field(&known, &known),
            FieldAction::Set("v".to_owned())
        );

        // Null plan clears only a known state.
        assert_eq!(plan_field(&null, &known), FieldAction::Clear);
        assert_eq!(plan_field(&null, &null), FieldAction::Skip);
        assert_eq!(plan_field(&null, &unknown), FieldAction::Skip);
    }

    #[test]
    fn serde_round_trip_keeps_all_three_states() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Probe {
            a: Value<String>,
            b: Value<String>,
            c: Value<i32>,
        }

        let probe = Probe {
            a: Value::Known("x".to_owned()),
            b: Value::Null,
            c: Value::Unknown,
        };
        let json = serde_json::to_value(&probe).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"a": "x", "b": null, "c": {"$unknown": true}})
        );

        let back: Probe = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, probe);
    }
}
