//! Dashboard figures derived from the aggregated report.

use super::aggregate::AggregatedRow;
use super::registry::OperatorRegistry;
use crate::constants::{NO_REGISTRY_ID, SUMMARY_TOP_N};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopOperator {
    pub registry_id: String,
    pub legal_name: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopState {
    pub jurisdiction: String,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub generated_at: DateTime<Utc>,
    pub total_expenses: f64,
    /// Total divided by the number of aggregated groups
    pub mean_per_operator: f64,
    pub top_operators: Vec<TopOperator>,
    pub top_states: Vec<TopState>,
}

pub fn summarize(rows: &[AggregatedRow], registry: &OperatorRegistry) -> DashboardStats {
    let total_expenses: f64 = rows.iter().map(|r| r.total).sum();
    let mean_per_operator = if rows.is_empty() {
        0.0
    } else {
        total_expenses / rows.len() as f64
    };

    let mut by_total: Vec<&AggregatedRow> = rows.iter().collect();
    by_total.sort_by(|a, b| b.total.total_cmp(&a.total));
    let top_operators = by_total
        .into_iter()
        .take(SUMMARY_TOP_N)
        .map(|row| TopOperator {
            registry_id: registry
                .find_by_legal_name(&row.legal_name)
                .map(|op| op.registry_id.clone())
                .unwrap_or_else(|| NO_REGISTRY_ID.to_string()),
            legal_name: row.legal_name.clone(),
            total: row.total,
        })
        .collect();

    // Keep first-seen order so equal state totals sort stably
    let mut states: Vec<TopState> = Vec::new();
    for row in rows {
        match states.iter_mut().find(|s| s.jurisdiction == row.jurisdiction) {
            Some(state) => state.total += row.total,
            None => states.push(TopState {
                jurisdiction: row.jurisdiction.clone(),
                total: row.total,
            }),
        }
    }
    states.sort_by(|a, b| b.total.total_cmp(&a.total));
    states.truncate(SUMMARY_TOP_N);

    DashboardStats {
        generated_at: Utc::now(),
        total_expenses,
        mean_per_operator,
        top_operators,
        top_states: states,
    }
}

pub fn write_summary(stats: &DashboardStats, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(stats)?)?;
    info!(
        "Dashboard summary written to {} (total {:.2})",
        path.display(),
        stats.total_expenses
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperatorRecord;

    fn row(name: &str, uf: &str, total: f64) -> AggregatedRow {
        AggregatedRow {
            legal_name: name.into(),
            jurisdiction: uf.into(),
            total,
            mean: total,
            std_dev: 0.0,
            count: 1,
        }
    }

    #[test]
    fn totals_top_operators_and_states() {
        let registry = OperatorRegistry::from_records([OperatorRecord {
            registry_id: "123456".into(),
            tax_id: "11222333000181".into(),
            legal_name: "ACME SAUDE".into(),
            jurisdiction: "SP".into(),
            modality: String::new(),
        }]);
        let rows = vec![
            row("ACME SAUDE", "SP", 600.0),
            row("BETA", "RJ", 300.0),
            row("GAMA", "SP", 50.0),
            row("D", "MG", 20.0),
            row("E", "BA", 15.0),
            row("F", "PR", 10.0),
            row("G", "RS", 5.0),
        ];

        let stats = summarize(&rows, &registry);
        assert_eq!(stats.total_expenses, 1000.0);
        assert!((stats.mean_per_operator - 1000.0 / 7.0).abs() < 1e-9);

        assert_eq!(stats.top_operators.len(), 5);
        assert_eq!(stats.top_operators[0].registry_id, "123456");
        assert_eq!(stats.top_operators[1].registry_id, NO_REGISTRY_ID);

        let states: Vec<_> = stats.top_states.iter().map(|s| s.jurisdiction.as_str()).collect();
        assert_eq!(states, ["SP", "RJ", "MG", "BA", "PR"]);
        assert_eq!(stats.top_states[0].total, 650.0);
    }

    #[test]
    fn empty_report_has_zero_mean() {
        let stats = summarize(&[], &OperatorRegistry::default());
        assert_eq!(stats.total_expenses, 0.0);
        assert_eq!(stats.mean_per_operator, 0.0);
        assert!(stats.top_operators.is_empty());
    }
}
