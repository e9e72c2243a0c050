//! Turns extracted statement files into canonical expense records and writes
//! the consolidated expense file.

use super::columns::{map_columns, ColumnRole};
use super::{delimited_reader, delimited_writer};
use crate::constants::{CONSOLIDATED_HEADER, EXPENSE_ACCOUNT_PREFIX, FIELD_DELIMITER, TABULAR_SUFFIX};
use crate::error::Result;
use crate::metrics::PipelineMetrics;
use crate::pipeline::extract::ExtractionManifest;
use crate::types::{ExpenseRecord, ExtractedFile};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Default)]
pub struct ConsolidateReport {
    pub files_processed: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
    pub records_written: usize,
}

/// Rewrites a `1.234,56` style amount as `1234.56`: every `.` is dropped and
/// every `,` becomes `.`. The result is not checked to be a number.
pub fn to_standard_decimal(raw: &str) -> String {
    raw.replace('.', "").replace(',', ".")
}

/// Reads one extracted statement file.
pub fn normalize(file: &ExtractedFile) -> Result<Vec<ExpenseRecord>> {
    let reader = File::open(&file.path)?;
    normalize_reader(reader, &file.relative_path, &file.period, &file.year)
}

/// Reads semicolon-separated statement rows and keeps expense-class lines.
///
/// A file without account-code or value columns yields no records.
pub fn normalize_reader<R: Read>(
    reader: R,
    source_name: &str,
    period: &str,
    year: &str,
) -> Result<Vec<ExpenseRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(FIELD_DELIMITER)
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut rows = csv_reader.byte_records();

    let header: Vec<String> = match rows.next() {
        Some(record) => lossy_fields(&record?),
        None => return Ok(Vec::new()),
    };

    let columns = map_columns(&header);
    let (Some(account_idx), Some(value_idx)) = (
        columns.get(ColumnRole::AccountCode),
        columns.get(ColumnRole::Value),
    ) else {
        warn!(
            "Skipping {}: mandatory columns not found. Header: {:?}",
            source_name, header
        );
        return Ok(Vec::new());
    };
    let registry_idx = columns.get(ColumnRole::RegistryId);
    let description_idx = columns.get(ColumnRole::Description);

    let mut records = Vec::new();
    for row in rows {
        let row = lossy_fields(&row?);
        if row.len() <= value_idx {
            continue;
        }
        let Some(account) = row.get(account_idx) else {
            continue;
        };
        if !account.starts_with(EXPENSE_ACCOUNT_PREFIX) {
            continue;
        }

        let optional = |idx: Option<usize>| {
            idx.and_then(|i| row.get(i))
                .cloned()
                .unwrap_or_default()
        };
        records.push(ExpenseRecord {
            registry_id: optional(registry_idx),
            period: period.to_string(),
            year: year.to_string(),
            value: to_standard_decimal(&row[value_idx]),
            description: optional(description_idx),
        });
    }
    Ok(records)
}

fn lossy_fields(record: &csv::ByteRecord) -> Vec<String> {
    record
        .iter()
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect()
}

/// Normalizes every extracted `.csv` file in the manifest into one
/// consolidated file. A file that cannot be read is logged and skipped.
#[instrument(skip(manifest), fields(files = manifest.len()))]
pub fn consolidate(manifest: &ExtractionManifest, output_path: &Path) -> Result<ConsolidateReport> {
    let mut report = ConsolidateReport::default();
    let mut writer = delimited_writer(output_path)?;
    writer.write_record(CONSOLIDATED_HEADER)?;

    if manifest.is_empty() {
        warn!("No extracted files to consolidate");
    }

    for file in manifest.files() {
        if !file.relative_path.to_lowercase().ends_with(TABULAR_SUFFIX) {
            debug!("Not a tabular file, skipping: {}", file.relative_path);
            report.files_skipped += 1;
            continue;
        }
        info!("Processing: {}", file.relative_path);
        match normalize(file) {
            Ok(records) => {
                for record in &records {
                    writer.write_record(record.to_row())?;
                }
                info!("{} expense records found", records.len());
                report.files_processed += 1;
                report.records_written += records.len();
            }
            Err(e) => {
                error!("Failed to read {}: {}", file.relative_path, e);
                report.files_failed += 1;
            }
        }
    }
    writer.flush()?;

    PipelineMetrics::record_expenses_consolidated(report.records_written);
    info!(
        "Consolidation finished: {} records from {} files -> {}",
        report.records_written,
        report.files_processed,
        output_path.display()
    );
    Ok(report)
}

/// Reads the consolidated file back. Rows with fewer than six fields are skipped.
pub fn read_consolidated(path: &Path) -> Result<Vec<ExpenseRecord>> {
    let mut reader = delimited_reader(path)?;
    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row?;
        if row.len() < CONSOLIDATED_HEADER.len() {
            warn!("Consolidated row {} has {} fields, skipping", line + 2, row.len());
            continue;
        }
        records.push(ExpenseRecord {
            registry_id: row[0].to_string(),
            period: row[2].to_string(),
            year: row[3].to_string(),
            value: row[4].to_string(),
            description: row[5].to_string(),
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn run(content: &str) -> Vec<ExpenseRecord> {
        normalize_reader(content.as_bytes(), "test.csv", "1T", "2024").unwrap()
    }

    #[test]
    fn locale_amounts_become_standard_decimals() {
        assert_eq!(to_standard_decimal("1.234,56"), "1234.56");
        assert_eq!(to_standard_decimal("1.234.567"), "1234567");
        assert_eq!(to_standard_decimal("-0,5"), "-0.5");
        // Textual only: malformed input passes through
        assert_eq!(to_standard_decimal("1,2,3"), "1.2.3");
        assert_eq!(to_standard_decimal("n/a"), "n/a");
    }

    #[test]
    fn keeps_only_expense_accounts() {
        let records = run(
            "DATA;REG_ANS;CD_CONTA_CONTABIL;DESCRICAO;VL_SALDO_FINAL\n\
             2024-01-01;123456;411111;EVENTOS;1.234,56\n\
             2024-01-01;123456;311111;RECEITAS;99,00\n",
        );
        assert_eq!(
            records,
            vec![ExpenseRecord {
                registry_id: "123456".into(),
                period: "1T".into(),
                year: "2024".into(),
                value: "1234.56".into(),
                description: "EVENTOS".into(),
            }]
        );
    }

    #[test]
    fn short_and_empty_account_rows_are_skipped() {
        let records = run(
            "CD_CONTA;VALOR;REG_ANS\n\
             41\n\
             ;10,00;1\n\
             4;5,00\n",
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, "5.00");
        // REG_ANS column exists but this row is too short to reach it
        assert_eq!(records[0].registry_id, "");
    }

    #[test]
    fn optional_roles_default_to_empty() {
        let records = run("cd_conta;valor\n41;1,00\n");
        assert_eq!(records[0].registry_id, "");
        assert_eq!(records[0].description, "");
    }

    #[test]
    fn missing_mandatory_columns_yield_no_records() {
        assert!(run("REG_ANS;DESCRICAO;VALOR\n1;X;10,00\n").is_empty());
        assert!(run("").is_empty());
    }

    #[test]
    fn quoted_fields_may_contain_semicolons() {
        let records = run("CD_CONTA;DESCRICAO;VALOR\n41;\"A; B\";2,50\n");
        assert_eq!(records[0].description, "A; B");
        assert_eq!(records[0].value, "2.50");
    }

    #[test]
    fn consolidated_file_round_trips_rows() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("1T2024.csv");
        fs::write(&csv_path, "REG_ANS;CD_CONTA_CONTABIL;VL_SALDO_FINAL\n555;4111;10,00\n").unwrap();
        let txt_path: PathBuf = dir.path().join("leiame.txt");
        fs::write(&txt_path, "texto").unwrap();

        let mut manifest = ExtractionManifest::default();
        manifest.insert(ExtractedFile::new(csv_path, "1T2024.csv".into(), "1T2024.zip").unwrap());
        manifest.insert(ExtractedFile::new(txt_path, "leiame.txt".into(), "1T2024.zip").unwrap());

        let output = dir.path().join("consolidado.csv");
        let report = consolidate(&manifest, &output).unwrap();
        assert_eq!(report.files_processed, 1);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.records_written, 1);

        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "REG_ANS;RazaoSocial;Trimestre;Ano;Valor;Descricao\n555;;1T;2024;10.00;\n"
        );
        let records = read_consolidated(&output).unwrap();
        assert_eq!(records[0].registry_id, "555");
        assert_eq!(records[0].value, "10.00");
    }
}
