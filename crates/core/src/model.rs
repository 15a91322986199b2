//! Canonical representation of migratable database objects.
//!
//! Identity is `schema.name`: case-insensitive for lookup, case-preserving
//! for display. Raw type and status strings from assessment tooling are
//! normalized through fixed alias tables; unrecognized types are preserved
//! verbatim rather than rejected, and unrecognized statuses fall back to
//! [`ObjectStatus::Warning`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

/// Database object types, in rough migration priority order.
///
/// `Other` carries the original string for types outside the canonical set
/// so nothing is silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Schema,
    Table,
    View,
    StoredProcedure,
    Function,
    Statistics,
    ExternalTable,
    ExternalDataSource,
    ExternalFileFormat,
    Security,
    Index,
    Constraint,
    Trigger,
    Sequence,
    User,
    Role,
    Other(String),
}

impl ObjectType {
    /// Parse a raw type string, applying the alias table.
    ///
    /// Input is uppercased with spaces and hyphens folded to underscores
    /// before matching. Unknown values come back as `Other` with the
    /// trimmed original preserved.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_uppercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "SCHEMA" => Self::Schema,
            "TABLE" => Self::Table,
            "VIEW" => Self::View,
            "STORED_PROCEDURE" | "PROC" | "PROCEDURE" | "SP" | "SPROC" | "STORED_PROC" => {
                Self::StoredProcedure
            }
            "FUNCTION" | "UDF" | "USER_DEFINED_FUNCTION" | "SCALAR_FUNCTION"
            | "TABLE_VALUED_FUNCTION" | "INLINE_TABLE_FUNCTION" => Self::Function,
            "STATISTICS" | "STAT" | "STATS" => Self::Statistics,
            "EXTERNAL_TABLE" | "EXT_TABLE" => Self::ExternalTable,
            "EXTERNAL_DATA_SOURCE" | "EXT_DATA_SOURCE" => Self::ExternalDataSource,
            "EXTERNAL_FILE_FORMAT" | "EXT_FILE_FORMAT" => Self::ExternalFileFormat,
            "SECURITY" | "SEC" | "PERMISSION" | "DATABASE_ROLE" => Self::Security,
            "INDEX" | "IDX" => Self::Index,
            "CONSTRAINT" => Self::Constraint,
            "TRIGGER" => Self::Trigger,
            "SEQUENCE" => Self::Sequence,
            "USER" => Self::User,
            "ROLE" => Self::Role,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    /// Canonical display string for this type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Schema => "SCHEMA",
            Self::Table => "TABLE",
            Self::View => "VIEW",
            Self::StoredProcedure => "STORED_PROCEDURE",
            Self::Function => "FUNCTION",
            Self::Statistics => "STATISTICS",
            Self::ExternalTable => "EXTERNAL_TABLE",
            Self::ExternalDataSource => "EXTERNAL_DATA_SOURCE",
            Self::ExternalFileFormat => "EXTERNAL_FILE_FORMAT",
            Self::Security => "SECURITY",
            Self::Index => "INDEX",
            Self::Constraint => "CONSTRAINT",
            Self::Trigger => "TRIGGER",
            Self::Sequence => "SEQUENCE",
            Self::User => "USER",
            Self::Role => "ROLE",
            Self::Other(raw) => raw,
        }
    }

    /// Whether this type belongs to the canonical closed set.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ObjectType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ObjectType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Assessment status of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectStatus {
    Passed,
    Failed,
    Warning,
}

impl ObjectStatus {
    /// Parse a raw status string through the alias table.
    ///
    /// Returns `None` for unrecognized values so the caller can warn before
    /// applying the `Warning` fallback.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "PASSED" | "PASS" | "SUCCESS" | "SUCCEEDED" | "OK" => Some(Self::Passed),
            "FAILED" | "FAIL" | "ERROR" | "ERRORED" => Some(Self::Failed),
            "WARNING" | "WARN" | "CAUTION" => Some(Self::Warning),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ObjectStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ObjectStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        // Unknown statuses are never dropped; they degrade to Warning.
        Ok(Self::parse(&raw).unwrap_or(Self::Warning))
    }
}

/// A single database object from the migration assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseObject {
    /// Unqualified object name, original case preserved.
    pub name: String,
    pub object_type: ObjectType,
    /// Owning schema; defaults to `dbo` when the input leaves it blank.
    pub schema_name: String,
    pub status: ObjectStatus,
    #[serde(default)]
    pub failure_reason: String,
    /// Declared dependency references, possibly unqualified.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Count of transitive dependents; computed, zero for non-failed objects.
    #[serde(default)]
    pub impact_score: usize,
    /// Triage category; opaque to the graph and partitioning engine.
    #[serde(default)]
    pub failure_category: String,
}

impl DatabaseObject {
    pub fn new(name: &str, object_type: ObjectType, schema_name: &str, status: ObjectStatus) -> Self {
        Self {
            name: name.to_string(),
            object_type,
            schema_name: if schema_name.trim().is_empty() {
                "dbo".to_string()
            } else {
                schema_name.trim().to_string()
            },
            status,
            failure_reason: String::new(),
            dependencies: Vec::new(),
            impact_score: 0,
            failure_category: String::new(),
        }
    }

    /// Fully qualified display name: `schema.name`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.name)
    }

    /// Case-insensitive identity key used for graph lookups.
    pub fn lookup_key(&self) -> String {
        self.qualified_name().to_lowercase()
    }

    pub fn is_failed(&self) -> bool {
        self.status == ObjectStatus::Failed
    }

    pub fn is_passed(&self) -> bool {
        self.status == ObjectStatus::Passed
    }
}

/// Resolve a raw dependency reference against the owning object's schema.
///
/// References are trimmed and lowercased; a reference without a schema
/// separator is qualified with the owner's schema.
pub fn resolve_dependency(raw: &str, owner_schema: &str) -> String {
    let cleaned = raw.trim().to_lowercase();
    if cleaned.contains('.') {
        cleaned
    } else {
        format!("{}.{}", owner_schema.trim().to_lowercase(), cleaned)
    }
}

/// Deduplicate objects by qualified name, keeping the last occurrence.
///
/// Output order follows the position of each retained occurrence. Both the
/// earlier and later positions of a duplicate are logged.
pub fn dedupe_objects(objects: Vec<DatabaseObject>) -> Vec<DatabaseObject> {
    use std::collections::HashMap;

    let mut last_index: HashMap<String, usize> = HashMap::new();
    for (idx, obj) in objects.iter().enumerate() {
        let key = obj.lookup_key();
        if let Some(prev) = last_index.insert(key, idx) {
            debug!(
                object = %obj.qualified_name(),
                first_index = prev,
                last_index = idx,
                "duplicate object, keeping latest occurrence"
            );
        }
    }

    let mut keep: Vec<usize> = last_index.into_values().collect();
    keep.sort_unstable();

    let removed = objects.len() - keep.len();
    if removed > 0 {
        debug!(removed, "deduplication removed duplicate object(s)");
    }

    let mut retained: Vec<Option<DatabaseObject>> = objects.into_iter().map(Some).collect();
    keep.into_iter()
        .filter_map(|i| retained[i].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_type_aliases() {
        assert_eq!(ObjectType::parse("PROC"), ObjectType::StoredProcedure);
        assert_eq!(ObjectType::parse("sproc"), ObjectType::StoredProcedure);
        assert_eq!(ObjectType::parse("stats"), ObjectType::Statistics);
        assert_eq!(ObjectType::parse("udf"), ObjectType::Function);
        assert_eq!(ObjectType::parse("ext_table"), ObjectType::ExternalTable);
        assert_eq!(ObjectType::parse("external table"), ObjectType::ExternalTable);
        assert_eq!(ObjectType::parse("external-data-source"), ObjectType::ExternalDataSource);
        assert_eq!(ObjectType::parse("idx"), ObjectType::Index);
    }

    #[test]
    fn test_object_type_unknown_preserved_verbatim() {
        let t = ObjectType::parse("SYNONYM");
        assert_eq!(t, ObjectType::Other("SYNONYM".to_string()));
        assert!(!t.is_known());
        assert_eq!(t.as_str(), "SYNONYM");
    }

    #[test]
    fn test_status_aliases_and_fallback() {
        assert_eq!(ObjectStatus::parse("SUCCESS"), Some(ObjectStatus::Passed));
        assert_eq!(ObjectStatus::parse("error"), Some(ObjectStatus::Failed));
        assert_eq!(ObjectStatus::parse("Caution"), Some(ObjectStatus::Warning));
        assert_eq!(ObjectStatus::parse("banana"), None);
    }

    #[test]
    fn test_qualified_name_preserves_case_key_does_not() {
        let obj = DatabaseObject::new("Customers", ObjectType::Table, "Sales", ObjectStatus::Passed);
        assert_eq!(obj.qualified_name(), "Sales.Customers");
        assert_eq!(obj.lookup_key(), "sales.customers");
    }

    #[test]
    fn test_empty_schema_defaults_to_dbo() {
        let obj = DatabaseObject::new("t1", ObjectType::Table, "  ", ObjectStatus::Passed);
        assert_eq!(obj.schema_name, "dbo");
    }

    #[test]
    fn test_resolve_dependency_qualification() {
        assert_eq!(resolve_dependency("Orders", "Sales"), "sales.orders");
        assert_eq!(resolve_dependency(" dbo.Orders ", "Sales"), "dbo.orders");
    }

    #[test]
    fn test_dedupe_last_occurrence_wins() {
        let mut a = DatabaseObject::new("t1", ObjectType::Table, "dbo", ObjectStatus::Passed);
        a.failure_reason = "first".to_string();
        let mut b = DatabaseObject::new("T1", ObjectType::Table, "DBO", ObjectStatus::Failed);
        b.failure_reason = "second".to_string();
        let c = DatabaseObject::new("t2", ObjectType::Table, "dbo", ObjectStatus::Passed);

        let out = dedupe_objects(vec![a, c, b]);
        assert_eq!(out.len(), 2);
        // t2 was seen before the surviving t1 occurrence
        assert_eq!(out[0].name, "t2");
        assert_eq!(out[1].failure_reason, "second");
        assert!(out[1].is_failed());
    }

    #[test]
    fn test_serde_round_trip() {
        let mut obj = DatabaseObject::new("v1", ObjectType::View, "dbo", ObjectStatus::Failed);
        obj.dependencies = vec!["dbo.t1".to_string()];
        obj.failure_reason = "MATERIALIZED VIEW not supported".to_string();

        let json = serde_json::to_string(&obj).unwrap();
        let back: DatabaseObject = serde_json::from_str(&json).unwrap();
        assert_eq!(obj, back);
    }

    #[test]
    fn test_unknown_status_deserializes_to_warning() {
        let json = r#"{"name":"t1","object_type":"TABLE","schema_name":"dbo","status":"MYSTERY"}"#;
        let obj: DatabaseObject = serde_json::from_str(json).unwrap();
        assert_eq!(obj.status, ObjectStatus::Warning);
    }
}
