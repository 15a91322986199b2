//! Assessment input parsing.
//!
//! Accepts two JSON shapes: a bare array of object records, or a document
//! with an `objects` array plus an optional `dependency_analysis` section
//! carrying precomputed impact scores. Parsing is forgiving: malformed
//! records are skipped with a warning, unknown enum values degrade rather
//! than fail, and duplicates are resolved last-occurrence-wins. Only
//! undecodable JSON is fatal.

use serde_json::Value;
use tracing::{info, warn};

use crate::error::PlanError;
use crate::model::{dedupe_objects, DatabaseObject, ObjectStatus, ObjectType};

/// Parsed inventory plus everything worth telling the operator about.
#[derive(Debug, Clone, Default)]
pub struct ParsedAssessment {
    pub objects: Vec<DatabaseObject>,
    pub warnings: Vec<String>,
}

/// Parse assessment JSON text into an object inventory.
pub fn parse_assessment_json(text: &str) -> Result<ParsedAssessment, PlanError> {
    let root: Value =
        serde_json::from_str(text).map_err(|e| PlanError::Parse(e.to_string()))?;

    let items = match &root {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("objects") {
            Some(Value::Array(items)) => items.as_slice(),
            Some(_) => {
                return Err(PlanError::Parse(
                    "'objects' must be an array".to_string(),
                ))
            }
            None => {
                return Err(PlanError::Parse(
                    "expected an array of objects or a document with an 'objects' array"
                        .to_string(),
                ))
            }
        },
        _ => {
            return Err(PlanError::Parse(
                "expected an array of objects or a document with an 'objects' array".to_string(),
            ))
        }
    };

    let mut parsed = ParsedAssessment::default();
    for (idx, item) in items.iter().enumerate() {
        let Some(record) = item.as_object() else {
            parsed
                .warnings
                .push(format!("Skipping non-object entry at index {idx}."));
            continue;
        };

        let name = string_field(record, "name");
        if name.trim().is_empty() {
            let msg = format!("Skipping object without a name at index {idx}.");
            warn!("{msg}");
            parsed.warnings.push(msg);
            continue;
        }

        let raw_type = string_field(record, "object_type");
        let object_type = if raw_type.trim().is_empty() {
            parsed.warnings.push(format!(
                "Object '{name}' has no object_type; treated as UNKNOWN."
            ));
            ObjectType::Other("UNKNOWN".to_string())
        } else {
            let t = ObjectType::parse(&raw_type);
            if !t.is_known() {
                parsed.warnings.push(format!(
                    "Object '{name}' has unrecognized type '{}'; keeping as-is.",
                    raw_type.trim()
                ));
            }
            t
        };

        let raw_status = string_field(record, "status");
        let status = match ObjectStatus::parse(&raw_status) {
            Some(s) => s,
            None => {
                parsed.warnings.push(format!(
                    "Object '{name}' has unrecognized status '{}'; treated as WARNING.",
                    raw_status.trim()
                ));
                ObjectStatus::Warning
            }
        };

        let schema = string_field(record, "schema_name");
        let mut obj = DatabaseObject::new(&name, object_type, &schema, status);
        obj.failure_reason = string_field(record, "failure_reason");
        obj.dependencies = dependency_list(record.get("dependencies"));
        obj.impact_score = record
            .get("impact_score")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        parsed.objects.push(obj);
    }

    let before = parsed.objects.len();
    parsed.objects = dedupe_objects(parsed.objects);
    if parsed.objects.len() < before {
        parsed.warnings.push(format!(
            "Removed {} duplicate object(s); latest occurrence kept.",
            before - parsed.objects.len()
        ));
    }

    if let Some(scores) = root
        .get("dependency_analysis")
        .and_then(|d| d.get("impact_scores"))
        .and_then(Value::as_object)
    {
        for obj in &mut parsed.objects {
            let key = obj.lookup_key();
            let found = scores
                .iter()
                .find(|(k, _)| k.to_lowercase() == key)
                .and_then(|(_, v)| v.as_u64());
            if let Some(score) = found {
                obj.impact_score = score as usize;
            }
        }
    }

    info!(
        objects = parsed.objects.len(),
        warnings = parsed.warnings.len(),
        "assessment parsed"
    );
    Ok(parsed)
}

fn string_field(record: &serde_json::Map<String, Value>, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

/// Dependencies arrive either as an array of strings or as one delimited
/// string; both `;` and `,` separate entries.
fn dependency_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split([';', ','])
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_array() {
        let parsed = parse_assessment_json(
            r#"[
                {"name": "t1", "object_type": "TABLE", "schema_name": "dbo", "status": "PASSED"},
                {"name": "v1", "object_type": "VIEW", "schema_name": "dbo", "status": "FAILED",
                 "failure_reason": "MATERIALIZED VIEW", "dependencies": ["dbo.t1"]}
            ]"#,
        )
        .unwrap();
        assert_eq!(parsed.objects.len(), 2);
        assert_eq!(parsed.objects[1].dependencies, vec!["dbo.t1"]);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_document_with_impact_scores() {
        let parsed = parse_assessment_json(
            r#"{
                "objects": [
                    {"name": "T1", "object_type": "TABLE", "schema_name": "Sales", "status": "FAILED"}
                ],
                "dependency_analysis": {"impact_scores": {"Sales.T1": 12}}
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.objects[0].impact_score, 12);
    }

    #[test]
    fn test_dependency_string_splitting() {
        let parsed = parse_assessment_json(
            r#"[{"name": "t1", "object_type": "TABLE", "schema_name": "dbo",
                 "status": "PASSED", "dependencies": "dbo.a; dbo.b,dbo.c"}]"#,
        )
        .unwrap();
        assert_eq!(
            parsed.objects[0].dependencies,
            vec!["dbo.a", "dbo.b", "dbo.c"]
        );
    }

    #[test]
    fn test_missing_name_skipped_with_warning() {
        let parsed = parse_assessment_json(
            r#"[
                {"object_type": "TABLE", "schema_name": "dbo", "status": "PASSED"},
                {"name": "t1", "object_type": "TABLE", "schema_name": "dbo", "status": "PASSED"}
            ]"#,
        )
        .unwrap();
        assert_eq!(parsed.objects.len(), 1);
        assert!(parsed.warnings[0].contains("without a name"));
    }

    #[test]
    fn test_unknown_status_degrades_to_warning() {
        let parsed = parse_assessment_json(
            r#"[{"name": "t1", "object_type": "TABLE", "schema_name": "dbo", "status": "MYSTERY"}]"#,
        )
        .unwrap();
        assert_eq!(parsed.objects[0].status, ObjectStatus::Warning);
        assert!(parsed.warnings[0].contains("unrecognized status"));
    }

    #[test]
    fn test_unknown_type_warned_but_kept() {
        let parsed = parse_assessment_json(
            r#"[{"name": "s1", "object_type": "SYNONYM", "schema_name": "dbo", "status": "PASSED"}]"#,
        )
        .unwrap();
        assert_eq!(
            parsed.objects[0].object_type,
            ObjectType::Other("SYNONYM".to_string())
        );
        assert!(parsed.warnings[0].contains("unrecognized type"));
    }

    #[test]
    fn test_blank_schema_defaults() {
        let parsed = parse_assessment_json(
            r#"[{"name": "t1", "object_type": "TABLE", "schema_name": "", "status": "PASSED"}]"#,
        )
        .unwrap();
        assert_eq!(parsed.objects[0].schema_name, "dbo");
    }

    #[test]
    fn test_duplicates_resolved_last_wins() {
        let parsed = parse_assessment_json(
            r#"[
                {"name": "t1", "object_type": "TABLE", "schema_name": "dbo", "status": "PASSED"},
                {"name": "T1", "object_type": "TABLE", "schema_name": "DBO", "status": "FAILED"}
            ]"#,
        )
        .unwrap();
        assert_eq!(parsed.objects.len(), 1);
        assert!(parsed.objects[0].is_failed());
        assert!(parsed.warnings.iter().any(|w| w.contains("duplicate")));
    }

    #[test]
    fn test_invalid_json_is_fatal() {
        assert!(matches!(
            parse_assessment_json("not json"),
            Err(PlanError::Parse(_))
        ));
        assert!(matches!(
            parse_assessment_json(r#"{"metadata": {}}"#),
            Err(PlanError::Parse(_))
        ));
    }
}
