use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A quarterly statement archive present in the raw directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceArchive {
    pub file_name: String,
    pub url: String,
    pub local_path: PathBuf,
    /// False when the file was already on disk and the download was skipped
    pub downloaded: bool,
}

/// A file extracted from an archive, tagged with the period and year taken
/// from the archive's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub archive: String,
    pub period: String,
    pub year: String,
}

impl ExtractedFile {
    pub fn new(path: PathBuf, relative_path: String, archive: &str) -> Result<Self> {
        let (period, year) = period_and_year(archive)?;
        Ok(Self {
            path,
            relative_path,
            archive: archive.to_string(),
            period,
            year,
        })
    }
}

/// Splits an archive name such as `1T2024.zip` into its period (`1T`) and
/// year (`2024`) prefix. Names shorter than six characters are rejected.
pub fn period_and_year(archive_name: &str) -> Result<(String, String)> {
    let chars: Vec<char> = archive_name.chars().take(6).collect();
    if chars.len() < 6 {
        return Err(EtlError::InvalidArchiveName(archive_name.to_string()));
    }
    let period: String = chars[..2].iter().collect();
    let year: String = chars[2..6].iter().collect();
    Ok((period, year))
}

/// One expense-class line item in canonical form.
///
/// `value` holds the decimal text after the locale transform; it is parsed
/// as a number only during aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub registry_id: String,
    pub period: String,
    pub year: String,
    pub value: String,
    pub description: String,
}

impl ExpenseRecord {
    /// Row for the consolidated file; the legal-name column is always empty.
    pub fn to_row(&self) -> [&str; 6] {
        [
            self.registry_id.as_str(),
            "",
            self.period.as_str(),
            self.year.as_str(),
            self.value.as_str(),
            self.description.as_str(),
        ]
    }
}

/// A regulated health-plan operator from the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorRecord {
    pub registry_id: String,
    /// Digits only
    pub tax_id: String,
    pub legal_name: String,
    pub jurisdiction: String,
    pub modality: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub expense: ExpenseRecord,
    pub tax_id: String,
    pub legal_name: String,
    pub modality: String,
    pub jurisdiction: String,
    pub tax_id_valid: bool,
}

impl EnrichedRecord {
    pub fn to_row(&self) -> [&str; 10] {
        [
            self.expense.registry_id.as_str(),
            self.tax_id.as_str(),
            self.legal_name.as_str(),
            self.modality.as_str(),
            self.jurisdiction.as_str(),
            self.expense.period.as_str(),
            self.expense.year.as_str(),
            self.expense.value.as_str(),
            self.expense.description.as_str(),
            if self.tax_id_valid { "true" } else { "false" },
        ]
    }
}

/// Groups enriched records; distinct registry ids sharing a legal name and
/// jurisdiction fall into the same group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregationKey {
    pub legal_name: String,
    pub jurisdiction: String,
}
