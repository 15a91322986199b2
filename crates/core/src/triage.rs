//! Failure categorization by regex pattern matching.
//!
//! Categories are tried in configuration order; the first pattern match
//! wins. Failures that match nothing land in `uncategorized`. The engine
//! only reads `failure_reason` and only touches objects with a failed
//! status; the rest of the core treats the resulting category as opaque.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::model::DatabaseObject;

pub const UNCATEGORIZED: &str = "uncategorized";

/// One triage category: a name, a description for reports, and the regex
/// patterns that route failures into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageCategory {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub patterns: Vec<String>,
}

/// Built-in categories ordered by fix effort.
pub fn default_categories() -> Vec<TriageCategory> {
    vec![
        TriageCategory {
            name: "auto_fixable".to_string(),
            description: "Can be automatically fixed by prompts or scripts".to_string(),
            patterns: vec![
                "DISTRIBUTION.*not supported".to_string(),
                "CLUSTERED COLUMNSTORE.*default".to_string(),
                "IDENTITY.*not supported".to_string(),
                "STATISTICS.*syntax".to_string(),
                "CTAS.*distribution".to_string(),
            ],
        },
        TriageCategory {
            name: "minor_manual".to_string(),
            description: "Requires minor manual intervention (< 1 hour per object)".to_string(),
            patterns: vec![
                "MATERIALIZED VIEW".to_string(),
                "WORKLOAD.*CLASSIFIER".to_string(),
                "deprecated.*data type".to_string(),
                "UNICODE.*collation".to_string(),
                "PARTITION.*scheme".to_string(),
            ],
        },
        TriageCategory {
            name: "significant_refactor".to_string(),
            description: "Requires significant refactoring (> 1 hour per object)".to_string(),
            patterns: vec![
                "EXTERNAL TABLE.*DATA_SOURCE".to_string(),
                "cross.database.*reference".to_string(),
                "stored procedure.*incompatible".to_string(),
                "complex.*dependency".to_string(),
            ],
        },
    ]
}

struct CompiledCategory {
    name: String,
    description: String,
    patterns: Vec<Regex>,
}

/// Categorizes failed objects by matching failure reasons against
/// configured patterns.
pub struct FailureTriage {
    categories: Vec<CompiledCategory>,
}

impl FailureTriage {
    /// Compile category patterns. Invalid regexes are logged and skipped,
    /// never fatal.
    pub fn new(categories: &[TriageCategory]) -> Self {
        let compiled = categories
            .iter()
            .map(|cat| {
                let patterns = cat
                    .patterns
                    .iter()
                    .filter_map(|p| {
                        match RegexBuilder::new(p).case_insensitive(true).build() {
                            Ok(re) => Some(re),
                            Err(e) => {
                                error!(pattern = %p, category = %cat.name, error = %e,
                                    "invalid triage regex, skipping");
                                None
                            }
                        }
                    })
                    .collect();
                CompiledCategory {
                    name: cat.name.clone(),
                    description: cat.description.clone(),
                    patterns,
                }
            })
            .collect();
        Self { categories: compiled }
    }

    /// Assign a `failure_category` to every failed object. Non-failed
    /// objects are left untouched.
    pub fn categorize(&self, objects: &mut [DatabaseObject]) {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for obj in objects.iter_mut() {
            if !obj.is_failed() {
                continue;
            }
            let category = self.match_category(&obj.failure_reason);
            obj.failure_category = category.to_string();
            *counts.entry(category).or_insert(0) += 1;
        }
        info!(?counts, "triage complete");
    }

    fn match_category(&self, failure_reason: &str) -> &str {
        if failure_reason.is_empty() {
            return UNCATEGORIZED;
        }
        for cat in &self.categories {
            for pattern in &cat.patterns {
                if pattern.is_match(failure_reason) {
                    debug!(category = %cat.name, "failure reason matched");
                    return &cat.name;
                }
            }
        }
        UNCATEGORIZED
    }

    /// Summarize triage results over an already-categorized object list.
    pub fn summary(&self, objects: &[DatabaseObject]) -> TriageSummary {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for cat in &self.categories {
            counts.insert(cat.name.clone(), 0);
        }
        counts.insert(UNCATEGORIZED.to_string(), 0);

        let mut uncategorized_reasons: Vec<String> = Vec::new();
        for obj in objects {
            if !obj.is_failed() || obj.failure_category.is_empty() {
                continue;
            }
            *counts.entry(obj.failure_category.clone()).or_insert(0) += 1;
            if obj.failure_category == UNCATEGORIZED && !obj.failure_reason.is_empty() {
                uncategorized_reasons.push(obj.failure_reason.clone());
            }
        }
        uncategorized_reasons.sort();
        uncategorized_reasons.dedup();

        let total_failures: usize = counts.values().sum();
        let percentages = counts
            .iter()
            .map(|(name, count)| {
                let pct = if total_failures > 0 {
                    (*count as f64 / total_failures as f64 * 1000.0).round() / 10.0
                } else {
                    0.0
                };
                (name.clone(), pct)
            })
            .collect();

        let mut descriptions: BTreeMap<String, String> = self
            .categories
            .iter()
            .map(|c| (c.name.clone(), c.description.clone()))
            .collect();
        descriptions.insert(
            UNCATEGORIZED.to_string(),
            "Does not match any known failure pattern".to_string(),
        );

        TriageSummary {
            counts,
            percentages,
            descriptions,
            uncategorized_reasons,
            total_failures,
        }
    }
}

/// Aggregate view of triage results.
#[derive(Debug, Clone, Serialize)]
pub struct TriageSummary {
    pub counts: BTreeMap<String, usize>,
    pub percentages: BTreeMap<String, f64>,
    pub descriptions: BTreeMap<String, String>,
    pub uncategorized_reasons: Vec<String>,
    pub total_failures: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObjectStatus, ObjectType};

    fn failed(name: &str, reason: &str) -> DatabaseObject {
        let mut obj = DatabaseObject::new(name, ObjectType::Table, "dbo", ObjectStatus::Failed);
        obj.failure_reason = reason.to_string();
        obj
    }

    #[test]
    fn test_first_matching_category_wins() {
        let triage = FailureTriage::new(&default_categories());
        let mut objects = vec![
            failed("t1", "DISTRIBUTION = REPLICATE not supported"),
            failed("t2", "MATERIALIZED VIEW must be rewritten"),
            failed("t3", "cross-database reference to OtherDb"),
            failed("t4", "something nobody has seen before"),
        ];
        triage.categorize(&mut objects);

        assert_eq!(objects[0].failure_category, "auto_fixable");
        assert_eq!(objects[1].failure_category, "minor_manual");
        assert_eq!(objects[2].failure_category, "significant_refactor");
        assert_eq!(objects[3].failure_category, UNCATEGORIZED);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let triage = FailureTriage::new(&default_categories());
        let mut objects = vec![failed("t1", "identity column not supported here")];
        triage.categorize(&mut objects);
        assert_eq!(objects[0].failure_category, "auto_fixable");
    }

    #[test]
    fn test_passed_objects_untouched() {
        let triage = FailureTriage::new(&default_categories());
        let mut objects =
            vec![DatabaseObject::new("t1", ObjectType::Table, "dbo", ObjectStatus::Passed)];
        triage.categorize(&mut objects);
        assert!(objects[0].failure_category.is_empty());
    }

    #[test]
    fn test_empty_reason_is_uncategorized() {
        let triage = FailureTriage::new(&default_categories());
        let mut objects = vec![failed("t1", "")];
        triage.categorize(&mut objects);
        assert_eq!(objects[0].failure_category, UNCATEGORIZED);
    }

    #[test]
    fn test_invalid_pattern_skipped() {
        let categories = vec![TriageCategory {
            name: "broken".to_string(),
            description: String::new(),
            patterns: vec!["[unclosed".to_string(), "IDENTITY".to_string()],
        }];
        let triage = FailureTriage::new(&categories);
        let mut objects = vec![failed("t1", "IDENTITY not supported")];
        triage.categorize(&mut objects);
        assert_eq!(objects[0].failure_category, "broken");
    }

    #[test]
    fn test_summary_counts_and_percentages() {
        let triage = FailureTriage::new(&default_categories());
        let mut objects = vec![
            failed("t1", "IDENTITY not supported"),
            failed("t2", "IDENTITY not supported"),
            failed("t3", "unheard of"),
            DatabaseObject::new("t4", ObjectType::Table, "dbo", ObjectStatus::Passed),
        ];
        triage.categorize(&mut objects);
        let summary = triage.summary(&objects);

        assert_eq!(summary.total_failures, 3);
        assert_eq!(summary.counts["auto_fixable"], 2);
        assert_eq!(summary.counts[UNCATEGORIZED], 1);
        assert!((summary.percentages["auto_fixable"] - 66.7).abs() < 0.01);
        assert_eq!(summary.uncategorized_reasons, vec!["unheard of".to_string()]);
    }
}
