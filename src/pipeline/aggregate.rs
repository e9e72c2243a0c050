//! Per-operator expense statistics over the enriched file.

use super::{delimited_reader, delimited_writer};
use crate::constants::AGGREGATED_HEADER;
use crate::error::Result;
use crate::metrics::PipelineMetrics;
use crate::types::{AggregationKey, EnrichedRecord};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, instrument, warn};

const LEGAL_NAME_FIELD: usize = 2;
const JURISDICTION_FIELD: usize = 4;
const VALUE_FIELD: usize = 7;
const MIN_ENRICHED_FIELDS: usize = 8;

/// Running total plus every value seen, so the deviation is computed in a
/// second pass over the values once the mean is known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationStats {
    total: f64,
    values: Vec<f64>,
}

impl AggregationStats {
    pub fn add(&mut self, value: f64) {
        self.total += value;
        self.values.push(value);
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn count(&self) -> usize {
        self.values.len()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.total / self.values.len() as f64
        }
    }

    /// Sample standard deviation (n - 1 divisor); zero for one value or none.
    pub fn std_dev(&self) -> f64 {
        if self.values.len() <= 1 {
            return 0.0;
        }
        let mean = self.mean();
        let squares: f64 = self.values.iter().map(|v| (v - mean).powi(2)).sum();
        (squares / (self.values.len() - 1) as f64).sqrt()
    }
}

/// One line of the aggregated report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedRow {
    pub legal_name: String,
    pub jurisdiction: String,
    pub total: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl AggregatedRow {
    fn from_stats(key: AggregationKey, stats: &AggregationStats) -> Self {
        Self {
            legal_name: key.legal_name,
            jurisdiction: key.jurisdiction,
            total: stats.total(),
            mean: stats.mean(),
            std_dev: stats.std_dev(),
            count: stats.count(),
        }
    }

    pub fn to_row(&self) -> [String; 6] {
        [
            self.legal_name.clone(),
            self.jurisdiction.clone(),
            format_fixed2(self.total),
            format_fixed2(self.mean),
            format_fixed2(self.std_dev),
            self.count.to_string(),
        ]
    }
}

/// Groups values by (legal name, jurisdiction), remembering first-seen order.
#[derive(Debug, Default)]
pub struct Aggregator {
    groups: Vec<(AggregationKey, AggregationStats)>,
    index: HashMap<AggregationKey, usize>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: AggregationKey, value: f64) {
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                self.groups.push((key.clone(), AggregationStats::default()));
                self.index.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[slot].1.add(value);
    }

    /// Rows sorted by total, largest first; equal totals keep first-seen order.
    pub fn finish(self) -> Vec<AggregatedRow> {
        let mut rows: Vec<AggregatedRow> = self
            .groups
            .into_iter()
            .map(|(key, stats)| AggregatedRow::from_stats(key, &stats))
            .collect();
        rows.sort_by(|a, b| b.total.total_cmp(&a.total));
        rows
    }
}

pub fn aggregate(records: &[EnrichedRecord]) -> Vec<AggregatedRow> {
    let mut aggregator = Aggregator::new();
    for record in records {
        if let Some(value) = parse_value(&record.expense.value) {
            aggregator.add(
                AggregationKey {
                    legal_name: record.legal_name.clone(),
                    jurisdiction: record.jurisdiction.clone(),
                },
                value,
            );
        }
    }
    aggregator.finish()
}

#[derive(Debug, Default)]
pub struct AggregateReport {
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub groups: Vec<AggregatedRow>,
}

/// Streams the enriched file into per-operator statistics and writes the
/// aggregated report. Rows whose value is not a number are skipped silently.
#[instrument]
pub fn aggregate_file(enriched_path: &Path, output_path: &Path) -> Result<AggregateReport> {
    let mut reader = delimited_reader(enriched_path)?;
    let mut aggregator = Aggregator::new();
    let mut report = AggregateReport::default();

    for row in reader.records() {
        let row = row?;
        report.rows_read += 1;
        if row.len() < MIN_ENRICHED_FIELDS {
            report.rows_skipped += 1;
            continue;
        }
        let Some(value) = parse_value(&row[VALUE_FIELD]) else {
            report.rows_skipped += 1;
            continue;
        };
        aggregator.add(
            AggregationKey {
                legal_name: row[LEGAL_NAME_FIELD].to_string(),
                jurisdiction: row[JURISDICTION_FIELD].to_string(),
            },
            value,
        );
    }

    report.groups = aggregator.finish();
    write_aggregated(&report.groups, output_path)?;

    PipelineMetrics::record_groups_aggregated(report.groups.len());
    info!(
        "Aggregation finished: {} groups from {} rows -> {}",
        report.groups.len(),
        report.rows_read - report.rows_skipped,
        output_path.display()
    );
    Ok(report)
}

pub fn write_aggregated(rows: &[AggregatedRow], output_path: &Path) -> Result<()> {
    let mut writer = delimited_writer(output_path)?;
    writer.write_record(AGGREGATED_HEADER)?;
    for row in rows {
        writer.write_record(row.to_row())?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads an aggregated report back. Malformed lines are logged and skipped.
pub fn read_aggregated(path: &Path) -> Result<Vec<AggregatedRow>> {
    let mut reader = delimited_reader(path)?;
    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let parsed = parse_aggregated(&record);
        match parsed {
            Some(row) => rows.push(row),
            None => warn!("Malformed aggregated row at line {}, skipping", line + 2),
        }
    }
    Ok(rows)
}

fn parse_aggregated(record: &csv::StringRecord) -> Option<AggregatedRow> {
    if record.len() < AGGREGATED_HEADER.len() {
        return None;
    }
    Some(AggregatedRow {
        legal_name: record[0].to_string(),
        jurisdiction: record[1].to_string(),
        total: parse_value(&record[2])?,
        mean: parse_value(&record[3])?,
        std_dev: parse_value(&record[4])?,
        count: record[5].trim().parse().ok()?,
    })
}

/// Parses a decimal the way the JVM's `Double.parseDouble` accepts it:
/// surrounding whitespace and a trailing `d`/`f` type suffix are allowed,
/// special values only as `NaN` and `Infinity`.
pub fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim_matches(|c: char| c <= ' ');
    let unsigned = trimmed.trim_start_matches(['+', '-']);
    if unsigned.len() + 1 < trimmed.len() {
        return None;
    }
    if unsigned == "NaN" || unsigned == "Infinity" {
        return trimmed.parse().ok();
    }
    let numeric = trimmed
        .strip_suffix(['d', 'D', 'f', 'F'])
        .unwrap_or(trimmed);
    if numeric.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    numeric.parse().ok()
}

/// Two-decimal rendering with half-up rounding applied to the shortest
/// decimal form of `value`, so `1.005` becomes `1.01`.
pub fn format_fixed2(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let repr = value.abs().to_string();
    let (int_part, frac_part) = repr.split_once('.').unwrap_or((repr.as_str(), ""));
    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().chain(std::iter::repeat(b'0')).take(2))
        .map(|b| b - b'0')
        .collect();

    if frac_part.as_bytes().get(2).is_some_and(|&b| b >= b'5') {
        let mut carry = true;
        for digit in digits.iter_mut().rev() {
            if *digit == 9 {
                *digit = 0;
            } else {
                *digit += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, 1);
        }
    }

    let split = digits.len() - 2;
    let render = |ds: &[u8]| ds.iter().map(|d| char::from(b'0' + d)).collect::<String>();
    let sign = if value.is_sign_negative() { "-" } else { "" };
    format!("{}{}.{}", sign, render(&digits[..split]), render(&digits[split..]))
}
