//! Operator registry: cached download and in-memory lookup by registry id.

use super::checksum::digits_only;
use super::fetch::{download_to, get_page, links_with_suffix};
use crate::app::ports::HttpClientPort;
use crate::constants::{FIELD_DELIMITER, TABULAR_SUFFIX};
use crate::error::{EtlError, Result};
use crate::types::OperatorRecord;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

const REGISTRY_ID_COLUMN: usize = 0;
const TAX_ID_COLUMN: usize = 1;
const LEGAL_NAME_COLUMN: usize = 2;
const MODALITY_COLUMN: usize = 4;
const JURISDICTION_COLUMN: usize = 10;
const MIN_COLUMNS: usize = 3;

/// Operators keyed by registry id. Built once per run and read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct OperatorRegistry {
    operators: HashMap<String, OperatorRecord>,
}

impl OperatorRegistry {
    pub fn from_records(records: impl IntoIterator<Item = OperatorRecord>) -> Self {
        let operators = records
            .into_iter()
            .map(|op| (op.registry_id.clone(), op))
            .collect();
        Self { operators }
    }

    pub fn from_path(path: &Path, reject_duplicates: bool) -> Result<Self> {
        let file = File::open(path)?;
        Self::parse_reader(file, reject_duplicates)
    }

    /// Parses the registry export: semicolon separated, one header row,
    /// columns addressed by position. Rows with fewer than three fields are
    /// skipped; a repeated registry id replaces the earlier row unless
    /// `reject_duplicates` is set.
    pub fn parse_reader<R: Read>(reader: R, reject_duplicates: bool) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(FIELD_DELIMITER)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut operators = HashMap::new();
        for record in csv_reader.byte_records() {
            let record = record?;
            if record.len() < MIN_COLUMNS {
                continue;
            }
            let field = |idx: usize| {
                record
                    .get(idx)
                    .map(|f| String::from_utf8_lossy(f).into_owned())
                    .unwrap_or_default()
            };

            let operator = OperatorRecord {
                registry_id: field(REGISTRY_ID_COLUMN),
                tax_id: digits_only(&field(TAX_ID_COLUMN)),
                legal_name: field(LEGAL_NAME_COLUMN),
                modality: field(MODALITY_COLUMN),
                jurisdiction: field(JURISDICTION_COLUMN),
            };
            if reject_duplicates && operators.contains_key(&operator.registry_id) {
                return Err(EtlError::DuplicateRegistryId(operator.registry_id));
            }
            operators.insert(operator.registry_id.clone(), operator);
        }
        Ok(Self { operators })
    }

    pub fn get(&self, registry_id: &str) -> Option<&OperatorRecord> {
        self.operators.get(registry_id)
    }

    /// Looks an operator up by tax id written with or without `.`, `/`, `-`.
    /// Tax ids are not unique; the lowest registry id wins.
    pub fn find_by_tax_id(&self, tax_id: &str) -> Option<&OperatorRecord> {
        let clean: String = tax_id
            .chars()
            .filter(|c| !matches!(c, '.' | '/' | '-'))
            .collect();
        self.lowest_id_where(|op| op.tax_id == clean)
    }

    pub fn find_by_legal_name(&self, legal_name: &str) -> Option<&OperatorRecord> {
        self.lowest_id_where(|op| op.legal_name == legal_name)
    }

    fn lowest_id_where(&self, predicate: impl Fn(&OperatorRecord) -> bool) -> Option<&OperatorRecord> {
        self.operators
            .values()
            .filter(|op| predicate(op))
            .min_by(|a, b| a.registry_id.cmp(&b.registry_id))
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

/// Loads the registry from its on-disk cache, downloading it first when the
/// cache file is absent.
pub struct RegistryLoader<'a> {
    http: &'a dyn HttpClientPort,
    registry_url: String,
    cache_path: PathBuf,
    reject_duplicates: bool,
}

impl<'a> RegistryLoader<'a> {
    pub fn new(
        http: &'a dyn HttpClientPort,
        registry_url: &str,
        cache_path: &Path,
        reject_duplicates: bool,
    ) -> Self {
        Self {
            http,
            registry_url: registry_url.to_string(),
            cache_path: cache_path.to_path_buf(),
            reject_duplicates,
        }
    }

    #[instrument(skip(self), fields(cache = %self.cache_path.display()))]
    pub async fn load(&self) -> Result<OperatorRegistry> {
        if !self.cache_path.exists() {
            self.download().await?;
        }
        let registry = OperatorRegistry::from_path(&self.cache_path, self.reject_duplicates)?;
        if registry.is_empty() {
            warn!("Operator registry at {} is empty", self.cache_path.display());
        }
        info!("{} operators loaded into memory", registry.len());
        Ok(registry)
    }

    /// Downloads the first CSV linked from the registry listing page.
    async fn download(&self) -> Result<()> {
        info!("Looking up active operator registry CSV");
        let page = get_page(self.http, &self.registry_url).await?;
        let csv_url = links_with_suffix(&page, &self.registry_url, TABULAR_SUFFIX)
            .into_iter()
            .next()
            .ok_or_else(|| EtlError::RegistryUnavailable(self.registry_url.clone()))?;

        info!("Downloading: {}", csv_url);
        download_to(self.http, &csv_url, &self.cache_path).await?;
        Ok(())
    }
}
