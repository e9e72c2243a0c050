//! The batch pipeline: each stage reads the materialized output of the
//! previous one and writes its own before the next starts.

pub mod aggregate;
pub mod checksum;
pub mod columns;
pub mod enrich;
pub mod extract;
pub mod fetch;
pub mod normalize;
pub mod registry;
pub mod summary;

use crate::app::ports::HttpClientPort;
use crate::config::PipelineConfig;
use crate::constants::FIELD_DELIMITER;
use crate::error::{EtlError, Result};
use crate::metrics::PipelineMetrics;
use crate::types::OperatorRecord;
use aggregate::AggregateReport;
use enrich::EnrichReport;
use extract::{ArchiveExtractor, ExtractReport, ExtractionManifest};
use fetch::{ArchiveFetcher, FetchReport};
use normalize::ConsolidateReport;
use registry::{OperatorRegistry, RegistryLoader};
use serde::Serialize;
use std::fs::{self, File};
use std::path::Path;
use std::time::Instant;
use summary::DashboardStats;
use tracing::{error, info, instrument};

/// Writer for the intermediate and output files: `;` separated, `\n`
/// terminated, fields written verbatim.
pub(crate) fn delimited_writer(path: &Path) -> Result<csv::Writer<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let writer = csv::WriterBuilder::new()
        .delimiter(FIELD_DELIMITER)
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'))
        .flexible(true)
        .from_path(path)?;
    Ok(writer)
}

/// Reader matching `delimited_writer`: header row skipped, no quote handling.
pub(crate) fn delimited_reader(path: &Path) -> Result<csv::Reader<File>> {
    let reader = csv::ReaderBuilder::new()
        .delimiter(FIELD_DELIMITER)
        .has_headers(true)
        .quoting(false)
        .flexible(true)
        .from_path(path)?;
    Ok(reader)
}

/// Counts reported at the end of a full run
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub periods_available: usize,
    pub periods_downloaded: usize,
    pub fetch_error: Option<String>,
    pub archives_processed: usize,
    pub archives_failed: usize,
    pub files_extracted: usize,
    pub files_processed: usize,
    pub expense_records: usize,
    pub operators_loaded: usize,
    pub enriched_records: usize,
    pub valid_tax_ids: usize,
    pub groups: usize,
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    http: &'a dyn HttpClientPort,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a PipelineConfig, http: &'a dyn HttpClientPort) -> Self {
        Self { config, http }
    }

    pub async fn fetch(&self) -> Result<FetchReport> {
        let started = Instant::now();
        let fetcher = ArchiveFetcher::new(self.http, &self.config.statements_url, &self.config.raw_dir());
        let report = fetcher.fetch(self.config.max_periods).await;
        PipelineMetrics::record_stage_duration("fetch", started.elapsed().as_secs_f64());
        report
    }

    /// Extracts all raw archives and persists the manifest next to the files.
    pub fn extract(&self) -> Result<(ExtractionManifest, ExtractReport)> {
        let started = Instant::now();
        let extractor = ArchiveExtractor::new(
            &self.config.extracted_dir(),
            self.config.reject_duplicate_entries,
        );
        let (manifest, report) = extractor.extract_all(&self.config.raw_dir())?;
        manifest.save(&self.config.manifest_path())?;
        PipelineMetrics::record_stage_duration("extract", started.elapsed().as_secs_f64());
        Ok((manifest, report))
    }

    /// Consolidates the files listed in the persisted manifest.
    pub fn consolidate(&self) -> Result<ConsolidateReport> {
        let manifest_path = self.config.manifest_path();
        let manifest = ExtractionManifest::load(&manifest_path).map_err(|e| {
            EtlError::Config(format!(
                "Cannot read extraction manifest {} (run the extract stage first): {}",
                manifest_path.display(),
                e
            ))
        })?;
        self.consolidate_manifest(&manifest)
    }

    pub fn consolidate_manifest(&self, manifest: &ExtractionManifest) -> Result<ConsolidateReport> {
        let started = Instant::now();
        let report = normalize::consolidate(manifest, &self.config.consolidated_path());
        PipelineMetrics::record_stage_duration("consolidate", started.elapsed().as_secs_f64());
        report
    }

    pub async fn load_registry(&self) -> Result<OperatorRegistry> {
        RegistryLoader::new(
            self.http,
            &self.config.registry_url,
            &self.config.registry_cache_path(),
            self.config.reject_duplicate_registry_ids,
        )
        .load()
        .await
    }

    /// Finds the registered operator for a tax id, loading the registry
    /// (from cache when present) first.
    pub async fn lookup(&self, tax_id: &str) -> Result<Option<OperatorRecord>> {
        let registry = self.load_registry().await?;
        Ok(registry.find_by_tax_id(tax_id).cloned())
    }

    pub fn enrich(&self, registry: &OperatorRegistry) -> Result<EnrichReport> {
        let started = Instant::now();
        let report = enrich::enrich_file(
            &self.config.consolidated_path(),
            &self.config.enriched_path(),
            registry,
        );
        PipelineMetrics::record_stage_duration("enrich", started.elapsed().as_secs_f64());
        report
    }

    pub fn aggregate(&self) -> Result<AggregateReport> {
        let started = Instant::now();
        let report = aggregate::aggregate_file(
            &self.config.enriched_path(),
            &self.config.aggregated_path(),
        );
        PipelineMetrics::record_stage_duration("aggregate", started.elapsed().as_secs_f64());
        report
    }

    /// Builds the dashboard summary from the aggregated report on disk.
    pub fn summarize(&self, registry: &OperatorRegistry) -> Result<DashboardStats> {
        let rows = aggregate::read_aggregated(&self.config.aggregated_path())?;
        let stats = summary::summarize(&rows, registry);
        summary::write_summary(&stats, &self.config.summary_path())?;
        Ok(stats)
    }

    /// Runs every stage in order. A failed listing of the remote archive
    /// tree is logged and the run continues with whatever archives are
    /// already on disk; registry and enrichment failures end the run.
    #[instrument(skip(self), fields(data_dir = %self.config.data_dir.display()))]
    pub async fn run(&self) -> Result<RunSummary> {
        let mut totals = RunSummary::default();

        info!("=== 1. Downloading quarterly archives ===");
        match self.fetch().await {
            Ok(report) => {
                totals.periods_available = report.periods();
                totals.periods_downloaded = report.downloaded;
            }
            Err(e) => {
                error!("Archive discovery failed: {}", e);
                totals.fetch_error = Some(e.to_string());
            }
        }

        info!("=== 2. Extracting archives ===");
        let (manifest, extract_report) = self.extract()?;
        totals.archives_processed = extract_report.archives_processed;
        totals.archives_failed = extract_report.archives_failed;
        totals.files_extracted = manifest.len();

        info!("=== 3. Consolidating expense records ===");
        let consolidate_report = self.consolidate_manifest(&manifest)?;
        totals.files_processed = consolidate_report.files_processed;
        totals.expense_records = consolidate_report.records_written;

        info!("=== 4. Enriching and validating records ===");
        let registry = self.load_registry().await?;
        totals.operators_loaded = registry.len();
        let enrich_report = self.enrich(&registry)?;
        totals.enriched_records = enrich_report.records;
        totals.valid_tax_ids = enrich_report.valid_tax_ids;

        info!("=== 5. Aggregating statistics ===");
        let aggregate_report = self.aggregate()?;
        totals.groups = aggregate_report.groups.len();
        let stats = summary::summarize(&aggregate_report.groups, &registry);
        summary::write_summary(&stats, &self.config.summary_path())?;

        info!(
            periods = totals.periods_available,
            downloaded = totals.periods_downloaded,
            files = totals.files_processed,
            records = totals.expense_records,
            groups = totals.groups,
            "Pipeline finished"
        );
        Ok(totals)
    }
}
