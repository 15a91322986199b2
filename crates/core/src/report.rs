//! Plan rendering: machine-readable JSON and human-readable Markdown.
//!
//! Both renderers are pure functions of the plan, so rendering the same
//! plan twice yields byte-identical output. Nothing here mutates the plan
//! or consults the clock.

use serde_json::{json, Value};

use crate::plan::{Batch, BatchPlan};

/// Renders a [`BatchPlan`] for delivery.
pub struct PlanReporter;

impl PlanReporter {
    /// Full plan as a JSON value.
    pub fn to_value(plan: &BatchPlan) -> Value {
        let passed: usize = plan.batches.iter().map(Batch::passed_count).sum();
        let failed: usize = plan.batches.iter().map(Batch::failed_count).sum();
        let pass_rate = if plan.total_objects > 0 {
            (passed as f64 / plan.total_objects as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        json!({
            "metadata": {
                "engagement_name": plan.engagement_name,
                "total_objects": plan.total_objects,
                "total_batches": plan.total_batches,
                "total_sprints": plan.total_sprints,
                "passed_objects": passed,
                "failed_objects": failed,
                "pass_rate_percent": pass_rate,
            },
            "batches": plan.batches.iter().map(batch_value).collect::<Vec<_>>(),
            "dependency_summary": plan.dependency_summary,
            "warnings": plan.warnings,
        })
    }

    /// Pretty-printed JSON report.
    pub fn to_json(plan: &BatchPlan) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&Self::to_value(plan))
    }

    /// Markdown migration plan for engagement delivery.
    pub fn to_markdown(plan: &BatchPlan) -> String {
        let mut out = String::new();
        let passed: usize = plan.batches.iter().map(Batch::passed_count).sum();
        let failed: usize = plan.batches.iter().map(Batch::failed_count).sum();

        out.push_str(&format!(
            "# Migration Batch Plan: {}\n\n",
            plan.engagement_name
        ));

        out.push_str("## Executive Summary\n\n");
        out.push_str("| Metric | Value |\n|--------|-------|\n");
        out.push_str(&format!("| Total Objects | {} |\n", plan.total_objects));
        out.push_str(&format!("| Passed Objects | {passed} |\n"));
        out.push_str(&format!("| Failed Objects | {failed} |\n"));
        out.push_str(&format!("| Total Batches | {} |\n", plan.total_batches));
        out.push_str(&format!("| Total Sprints | {} |\n\n", plan.total_sprints));

        out.push_str("## Sprint Timeline\n\n");
        out.push_str("| Sprint | Batch | Objects | Status |\n");
        out.push_str("|--------|-------|---------|--------|\n");
        for batch in &plan.batches {
            let status = if batch.failed_count() > 0 {
                format!("{} failed", batch.failed_count())
            } else {
                "ready".to_string()
            };
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                batch.sprint_number,
                batch.batch_name,
                batch.total_objects(),
                status
            ));
        }
        out.push('\n');

        out.push_str("## Batch Details\n\n");
        for batch in &plan.batches {
            out.push_str(&format!(
                "### Batch {}: {}\n\n",
                batch.batch_id, batch.batch_name
            ));
            out.push_str(&format!("- **Sprint:** {}\n", batch.sprint_number));
            out.push_str(&format!("- **Stage:** {}\n", batch.object_type_group.as_str()));
            if batch.dependencies.is_empty() {
                out.push_str("- **Depends on batches:** none\n\n");
            } else {
                let ids: Vec<String> =
                    batch.dependencies.iter().map(|id| id.to_string()).collect();
                out.push_str(&format!(
                    "- **Depends on batches:** {}\n\n",
                    ids.join(", ")
                ));
            }

            out.push_str("| Object | Type | Status | Impact |\n");
            out.push_str("|--------|------|--------|--------|\n");
            for obj in &batch.objects {
                out.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    obj.qualified_name(),
                    obj.object_type,
                    obj.status,
                    obj.impact_score
                ));
            }
            out.push('\n');

            let failed: Vec<_> = batch.objects.iter().filter(|o| o.is_failed()).collect();
            if !failed.is_empty() {
                out.push_str("**Failed objects requiring attention:**\n\n");
                for obj in failed {
                    let category = if obj.failure_category.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", obj.failure_category)
                    };
                    out.push_str(&format!(
                        "- `{}`{}: {}\n",
                        obj.qualified_name(),
                        category,
                        obj.failure_reason
                    ));
                }
                out.push('\n');
            }
        }

        out.push_str("## Dependency Analysis\n\n");
        let summary = &plan.dependency_summary;
        out.push_str("| Metric | Value |\n|--------|-------|\n");
        out.push_str(&format!("| Objects in graph | {} |\n", summary.total_nodes));
        out.push_str(&format!("| Dependency edges | {} |\n", summary.total_edges));
        out.push_str(&format!("| Dependency layers | {} |\n", summary.num_layers));
        out.push_str(&format!(
            "| Longest dependency chain | {} |\n",
            summary.max_chain_depth
        ));
        out.push_str(&format!("| Root objects | {} |\n", summary.root_nodes));
        out.push_str(&format!("| Leaf objects | {} |\n", summary.leaf_nodes));
        out.push_str(&format!(
            "| Circular dependency groups | {} |\n\n",
            summary.cycle_count
        ));
        if !summary.cycles.is_empty() {
            out.push_str("**Circular dependencies:**\n\n");
            for cycle in &summary.cycles {
                out.push_str(&format!("- {}\n", cycle.join(" -> ")));
            }
            out.push('\n');
        }

        if !plan.warnings.is_empty() {
            out.push_str("## Warnings\n\n");
            for warning in &plan.warnings {
                out.push_str(&format!("- {warning}\n"));
            }
            out.push('\n');
        }

        out.push_str("## Migration Order Checklist\n\n");
        for batch in &plan.batches {
            out.push_str(&format!(
                "- [ ] Sprint {}: {} ({} objects)\n",
                batch.sprint_number,
                batch.batch_name,
                batch.total_objects()
            ));
        }
        out.push('\n');

        out.push_str("---\n*Generated by batch-planner*\n");
        out
    }
}

fn batch_value(batch: &Batch) -> Value {
    json!({
        "batch_id": batch.batch_id,
        "batch_name": batch.batch_name,
        "sprint_number": batch.sprint_number,
        "object_type_group": batch.object_type_group,
        "total_objects": batch.total_objects(),
        "passed_count": batch.passed_count(),
        "failed_count": batch.failed_count(),
        "dependencies": batch.dependencies,
        "objects": batch.objects.iter().map(|obj| json!({
            "name": obj.name,
            "qualified_name": obj.qualified_name(),
            "object_type": obj.object_type,
            "schema_name": obj.schema_name,
            "status": obj.status,
            "failure_reason": obj.failure_reason,
            "failure_category": obj.failure_category,
            "impact_score": obj.impact_score,
            "dependencies": obj.dependencies,
        })).collect::<Vec<_>>(),
    })
}
