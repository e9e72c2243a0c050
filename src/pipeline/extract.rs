//! Extraction of relevant entries from downloaded archives.

use crate::constants::{ARCHIVE_SUFFIX, RELEVANT_ENTRY_SUFFIXES};
use crate::error::{EtlError, Result};
use crate::metrics::PipelineMetrics;
use crate::types::{period_and_year, ExtractedFile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};
use zip::ZipArchive;

/// Every file currently extracted, keyed by its path relative to the
/// working directory. A later archive replaces the entry of an earlier one.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionManifest {
    files: BTreeMap<String, ExtractedFile>,
}

impl ExtractionManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Records `file`, returning the entry it replaced, if any.
    pub fn insert(&mut self, file: ExtractedFile) -> Option<ExtractedFile> {
        self.files.insert(file.relative_path.clone(), file)
    }

    pub fn get(&self, relative_path: &str) -> Option<&ExtractedFile> {
        self.files.get(relative_path)
    }

    /// Files in relative-path order
    pub fn files(&self) -> impl Iterator<Item = &ExtractedFile> {
        self.files.values()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub extracted: usize,
    pub ignored: usize,
    pub overwritten: usize,
    pub rejected: usize,
}

#[derive(Debug, Default)]
pub struct ExtractReport {
    pub archives_processed: usize,
    pub archives_failed: usize,
    pub entries_extracted: usize,
    pub entries_ignored: usize,
    pub entries_overwritten: usize,
    pub entries_rejected: usize,
}

pub struct ArchiveExtractor {
    work_dir: PathBuf,
    reject_duplicates: bool,
}

impl ArchiveExtractor {
    pub fn new(work_dir: &Path, reject_duplicates: bool) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            reject_duplicates,
        }
    }

    /// Extracts every archive in `raw_dir` (name order) and returns the
    /// resulting manifest. An unreadable archive is logged and skipped.
    #[instrument(skip(self), fields(work_dir = %self.work_dir.display()))]
    pub fn extract_all(&self, raw_dir: &Path) -> Result<(ExtractionManifest, ExtractReport)> {
        fs::create_dir_all(&self.work_dir)?;
        let mut manifest = ExtractionManifest::default();
        let mut report = ExtractReport::default();

        let archives = list_archives(raw_dir)?;
        if archives.is_empty() {
            warn!("No archives found in {}", raw_dir.display());
            return Ok((manifest, report));
        }

        for archive in &archives {
            info!("Processing archive: {}", archive.display());
            match self.extract(archive, &mut manifest) {
                Ok(outcome) => {
                    report.archives_processed += 1;
                    report.entries_extracted += outcome.extracted;
                    report.entries_ignored += outcome.ignored;
                    report.entries_overwritten += outcome.overwritten;
                    report.entries_rejected += outcome.rejected;
                }
                Err(e) => {
                    error!("Failed to read archive {}: {}", archive.display(), e);
                    PipelineMetrics::record_archive_error();
                    report.archives_failed += 1;
                }
            }
        }

        PipelineMetrics::record_entries_extracted(report.entries_extracted);
        info!(
            "Extracted {} files from {} archives ({} failed)",
            report.entries_extracted, report.archives_processed, report.archives_failed
        );
        Ok((manifest, report))
    }

    /// Copies the relevant entries of one archive into the working directory,
    /// keeping their relative directory structure.
    pub fn extract(&self, archive_path: &Path, manifest: &mut ExtractionManifest) -> Result<ArchiveOutcome> {
        let archive_name = archive_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        // Fail before touching the working directory if the name has no period prefix
        period_and_year(&archive_name)?;

        let file = File::open(archive_path)?;
        let mut archive = ZipArchive::new(file)?;
        let mut outcome = ArchiveOutcome::default();

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            if !is_relevant_entry(entry.name()) {
                debug!("Ignoring entry: {}", entry.name());
                outcome.ignored += 1;
                continue;
            }
            let Some(relative) = entry.enclosed_name() else {
                warn!("Skipping entry with unsafe path: {}", entry.name());
                outcome.ignored += 1;
                continue;
            };
            let relative_path = relative.to_string_lossy().replace('\\', "/");

            if let Some(previous) = manifest.get(&relative_path) {
                if self.reject_duplicates {
                    let err = EtlError::DuplicateEntry {
                        archive: archive_name.clone(),
                        entry: relative_path.clone(),
                    };
                    error!("{} (first seen in {})", err, previous.archive);
                    outcome.rejected += 1;
                    continue;
                }
                debug!(
                    "{} from {} overwrites the copy from {}",
                    relative_path, archive_name, previous.archive
                );
                outcome.overwritten += 1;
            }

            info!(" -> Extracting relevant entry: {}", relative_path);
            let output_path = self.work_dir.join(&relative);
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut output = File::create(&output_path)?;
            io::copy(&mut entry, &mut output)?;

            manifest.insert(ExtractedFile::new(output_path, relative_path, &archive_name)?);
            outcome.extracted += 1;
        }

        Ok(outcome)
    }
}

pub fn is_relevant_entry(name: &str) -> bool {
    let lower = name.to_lowercase();
    RELEVANT_ENTRY_SUFFIXES
        .iter()
        .any(|suffix| lower.ends_with(suffix))
}

fn list_archives(raw_dir: &Path) -> Result<Vec<PathBuf>> {
    if !raw_dir.exists() {
        return Ok(Vec::new());
    }
    let mut archives: Vec<PathBuf> = fs::read_dir(raw_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().ends_with(ARCHIVE_SUFFIX))
                .unwrap_or(false)
        })
        .collect();
    archives.sort();
    Ok(archives)
}
