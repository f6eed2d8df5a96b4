//! Upgrade of legacy persisted rule documents.
//!
//! Older documents address properties and things by `href`, store time
//! triggers in UTC and use a few trigger tags that no longer exist. [`migrate`]
//! rewrites one document into the current shape. It is a pure function of the
//! document and the UTC offset, and it is idempotent: a migrated document
//! migrates to [`Migration::Unchanged`].

use chrono::FixedOffset;
use serde_json::{Map, Value};

use crate::error::MigrationError;
use crate::time::{format_hh_mm, parse_hh_mm};

/// Result of migrating one document.
#[derive(Debug, Clone, PartialEq)]
pub enum Migration {
    /// The document is already in the current format.
    Unchanged,
    /// The upgraded document.
    Migrated(Value),
}

impl Migration {
    /// The current-format document, falling back to `original`.
    #[must_use]
    pub fn into_document(self, original: Value) -> Value {
        match self {
            Self::Unchanged => original,
            Self::Migrated(document) => document,
        }
    }

    #[must_use]
    pub fn is_migrated(&self) -> bool {
        matches!(self, Self::Migrated(_))
    }
}

/// Migrate a rule document `{id, name, enabled, trigger, effect}`.
///
/// Legacy `TimeTrigger` times are read as UTC and shifted by `offset`.
///
/// # Errors
///
/// Returns a [`MigrationError`] if the document is not an object or if any
/// node holds a malformed `href`, a malformed time, or an unknown legacy
/// operator. No partial result is returned.
pub fn migrate(document: &Value, offset: FixedOffset) -> Result<Migration, MigrationError> {
    if !document.is_object() {
        return Err(MigrationError::NotAnObject("rule document"));
    }
    let mut migrated = document.clone();
    let mut changed = false;
    for part in ["trigger", "effect"] {
        if let Some(node) = migrated.get_mut(part) {
            changed |= migrate_node(node, offset)?;
        }
    }
    Ok(if changed {
        Migration::Migrated(migrated)
    } else {
        Migration::Unchanged
    })
}

fn migrate_node(node: &mut Value, offset: FixedOffset) -> Result<bool, MigrationError> {
    // Non-object nodes are left for rule validation to reject.
    let Value::Object(map) = node else {
        return Ok(false);
    };
    let mut changed = false;
    for key in ["triggers", "effects"] {
        if let Some(Value::Array(children)) = map.get_mut(key) {
            for child in children {
                changed |= migrate_node(child, offset)?;
            }
        }
    }
    changed |= rename_legacy_type(map)?;
    changed |= localize_time(map, offset)?;
    changed |= migrate_property_href(map)?;
    changed |= migrate_thing_href(map)?;
    Ok(changed)
}

fn node_type(map: &Map<String, Value>) -> Option<&str> {
    map.get("type").and_then(Value::as_str)
}

fn legacy_operator(map: &Map<String, Value>, field: &'static str) -> String {
    match map.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "null".to_string(),
    }
}

fn rename_legacy_type(map: &mut Map<String, Value>) -> Result<bool, MigrationError> {
    match node_type(map) {
        Some("MultiTrigger") => {
            let tag = match legacy_operator(map, "op").as_str() {
                "AND" => "AndTrigger",
                "OR" => "OrTrigger",
                other => {
                    return Err(MigrationError::UnknownLegacyOperator {
                        field: "op",
                        value: other.to_string(),
                    });
                }
            };
            map.remove("op");
            map.insert("type".into(), tag.into());
            Ok(true)
        }
        Some("BooleanTrigger") => {
            let value = map.remove("onValue").unwrap_or(Value::Bool(true));
            map.insert("type".into(), "PropertyTrigger".into());
            map.insert("op".into(), "eq".into());
            map.insert("value".into(), value);
            Ok(true)
        }
        Some("LevelTrigger") => {
            let op = match legacy_operator(map, "levelType").as_str() {
                "LESS" => "lt",
                "EQUAL" => "eq",
                "GREATER" => "gt",
                other => {
                    return Err(MigrationError::UnknownLegacyOperator {
                        field: "levelType",
                        value: other.to_string(),
                    });
                }
            };
            map.remove("levelType");
            map.insert("type".into(), "PropertyTrigger".into());
            map.insert("op".into(), op.into());
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn localize_time(map: &mut Map<String, Value>, offset: FixedOffset) -> Result<bool, MigrationError> {
    if node_type(map) != Some("TimeTrigger") {
        return Ok(false);
    }
    if map.get("localized").and_then(Value::as_bool) == Some(true) {
        return Ok(false);
    }
    let raw = map.get("time").and_then(Value::as_str).unwrap_or_default();
    let utc = parse_hh_mm(raw).ok_or_else(|| MigrationError::MalformedTime {
        time: raw.to_string(),
    })?;
    // Wraps around midnight.
    let local = utc + offset;
    map.insert("time".into(), format_hh_mm(local).into());
    map.insert("localized".into(), Value::Bool(true));
    Ok(true)
}

fn migrate_property_href(map: &mut Map<String, Value>) -> Result<bool, MigrationError> {
    let Some(Value::Object(property)) = map.get_mut("property") else {
        return Ok(false);
    };
    let Some(href) = property.get("href") else {
        return Ok(false);
    };
    let href = href_text(href);
    let id = segment_after(&href, "properties").ok_or_else(|| MigrationError::MalformedHref {
        href: href.clone(),
        expected: "properties/<id>",
    })?;
    let thing = segment_after(&href, "things").ok_or_else(|| MigrationError::MalformedHref {
        href: href.clone(),
        expected: "things/<id>",
    })?;
    let (id, thing) = (id.to_string(), thing.to_string());
    property.remove("href");
    property.insert("id".into(), id.into());
    property.insert("thing".into(), thing.into());
    Ok(true)
}

fn migrate_thing_href(map: &mut Map<String, Value>) -> Result<bool, MigrationError> {
    let Some(Value::Object(thing)) = map.get("thing") else {
        return Ok(false);
    };
    let Some(href) = thing.get("href") else {
        return Ok(false);
    };
    let href = href_text(href);
    let id = segment_after(&href, "things").ok_or_else(|| MigrationError::MalformedHref {
        href: href.clone(),
        expected: "things/<id>",
    })?;
    let id = id.to_string();
    map.insert("thing".into(), id.into());
    Ok(true)
}

fn href_text(href: &Value) -> String {
    match href {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The non-empty path segment following the last `marker` segment.
fn segment_after<'a>(href: &'a str, marker: &str) -> Option<&'a str> {
    let segments: Vec<&str> = href.split('/').collect();
    segments
        .windows(2)
        .rev()
        .find(|pair| pair[0] == marker)
        .map(|pair| pair[1])
        .filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn minus_five() -> FixedOffset {
        FixedOffset::west_opt(5 * 3600).unwrap()
    }

    fn webhook_effect() -> Value {
        json!({"type": "IfThisThenThatEffect", "event": "gateway"})
    }

    fn migrated(result: Result<Migration, MigrationError>) -> Value {
        match result.unwrap() {
            Migration::Migrated(doc) => doc,
            Migration::Unchanged => panic!("expected a migrated document"),
        }
    }

    #[test]
    fn should_localize_utc_time_trigger() {
        let doc = json!({
            "trigger": {"type": "TimeTrigger", "time": "14:30"},
            "effect": webhook_effect()
        });
        let out = migrated(migrate(&doc, minus_five()));
        assert_eq!(out["trigger"], json!({"type": "TimeTrigger", "time": "09:30", "localized": true}));
        assert_eq!(migrate(&out, minus_five()).unwrap(), Migration::Unchanged);
    }

    #[test]
    fn should_wrap_localized_time_around_midnight() {
        let doc = json!({
            "trigger": {"type": "TimeTrigger", "time": "02:15"},
            "effect": webhook_effect()
        });
        let out = migrated(migrate(&doc, minus_five()));
        assert_eq!(out["trigger"]["time"], "21:15");
    }

    #[test]
    fn should_leave_localized_time_alone() {
        let doc = json!({
            "trigger": {"type": "TimeTrigger", "time": "14:30", "localized": true},
            "effect": webhook_effect()
        });
        assert_eq!(migrate(&doc, minus_five()).unwrap(), Migration::Unchanged);
    }

    #[test]
    fn should_extract_property_href() {
        let doc = json!({
            "trigger": {
                "type": "PropertyTrigger",
                "property": {"type": "boolean", "href": "/things/lamp1/properties/on"},
                "op": "eq",
                "value": true
            },
            "effect": webhook_effect()
        });
        let out = migrated(migrate(&doc, utc()));
        assert_eq!(
            out["trigger"]["property"],
            json!({"type": "boolean", "id": "on", "thing": "lamp1"})
        );
    }

    #[test]
    fn should_replace_thing_href_object_with_id() {
        let doc = json!({
            "trigger": {
                "type": "EventTrigger",
                "thing": {"href": "/things/door"},
                "event": "knocked"
            },
            "effect": webhook_effect()
        });
        let out = migrated(migrate(&doc, utc()));
        assert_eq!(out["trigger"]["thing"], "door");
    }

    #[test]
    fn should_fail_on_malformed_property_href() {
        let doc = json!({
            "trigger": {
                "type": "PropertyTrigger",
                "property": {"href": "/devices/lamp1/on"},
                "op": "eq",
                "value": true
            },
            "effect": webhook_effect()
        });
        let err = migrate(&doc, utc()).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::MalformedHref { ref href, expected: "properties/<id>" } if href == "/devices/lamp1/on"
        ));
    }

    #[test]
    fn should_fail_on_href_with_empty_thing_segment() {
        let doc = json!({
            "trigger": {"type": "EventTrigger", "thing": {"href": "/things/"}, "event": "knocked"},
            "effect": webhook_effect()
        });
        assert!(matches!(
            migrate(&doc, utc()),
            Err(MigrationError::MalformedHref { .. })
        ));
    }

    #[test]
    fn should_fail_on_malformed_legacy_time() {
        let doc = json!({
            "trigger": {"type": "TimeTrigger", "time": "7:30pm"},
            "effect": webhook_effect()
        });
        assert!(matches!(
            migrate(&doc, utc()),
            Err(MigrationError::MalformedTime { time }) if time == "7:30pm"
        ));
    }

    #[test]
    fn should_migrate_nested_children_and_legacy_tags() {
        let doc = json!({
            "name": "legacy",
            "trigger": {
                "type": "MultiTrigger",
                "op": "AND",
                "triggers": [
                    {
                        "type": "BooleanTrigger",
                        "property": {"href": "/things/door/properties/open"},
                        "onValue": true
                    },
                    {
                        "type": "LevelTrigger",
                        "property": {"href": "/things/sensor/properties/temp"},
                        "levelType": "GREATER",
                        "value": 25
                    },
                    {"type": "TimeTrigger", "time": "14:30"}
                ]
            },
            "effect": {
                "type": "MultiEffect",
                "effects": [{
                    "type": "SetEffect",
                    "property": {"href": "/things/light/properties/on"},
                    "value": true
                }]
            }
        });
        let out = migrated(migrate(&doc, minus_five()));

        assert_eq!(out["name"], "legacy");
        let trigger = &out["trigger"];
        assert_eq!(trigger["type"], "AndTrigger");
        assert!(trigger.get("op").is_none());
        assert_eq!(
            trigger["triggers"][0],
            json!({
                "type": "PropertyTrigger",
                "property": {"id": "open", "thing": "door"},
                "op": "eq",
                "value": true
            })
        );
        assert_eq!(trigger["triggers"][1]["op"], "gt");
        assert_eq!(trigger["triggers"][1]["value"], 25);
        assert_eq!(trigger["triggers"][2]["time"], "09:30");
        assert_eq!(out["effect"]["effects"][0]["property"]["thing"], "light");

        assert_eq!(migrate(&out, minus_five()).unwrap(), Migration::Unchanged);
    }

    #[test]
    fn should_fail_on_unknown_legacy_operator() {
        let doc = json!({
            "trigger": {"type": "MultiTrigger", "op": "XOR", "triggers": []},
            "effect": webhook_effect()
        });
        assert!(matches!(
            migrate(&doc, utc()),
            Err(MigrationError::UnknownLegacyOperator { field: "op", value }) if value == "XOR"
        ));
    }

    #[test]
    fn should_return_unchanged_for_current_document() {
        let doc = json!({
            "id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "name": "door light",
            "enabled": true,
            "trigger": {
                "type": "PropertyTrigger",
                "property": {"thing": "door", "id": "open"},
                "op": "eq",
                "value": true
            },
            "effect": {
                "type": "SetEffect",
                "property": {"thing": "light", "id": "on"},
                "value": true
            }
        });
        assert_eq!(migrate(&doc, minus_five()).unwrap(), Migration::Unchanged);
    }

    #[test]
    fn should_reject_non_object_document() {
        assert!(matches!(
            migrate(&json!([1, 2]), utc()),
            Err(MigrationError::NotAnObject(_))
        ));
    }
}
