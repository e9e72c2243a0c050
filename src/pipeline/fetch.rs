//! Discovery and download of quarterly statement archives.
//!
//! The remote side is a plain HTML directory index: one subdirectory per year,
//! each holding `<period><year>.zip` archives. Years and archives are visited
//! newest first (reverse lexical order) until the period quota is met.

use crate::app::ports::HttpClientPort;
use crate::constants::{ARCHIVE_SUFFIX, DIRECTORY_SUFFIX, PERIOD_MARKER};
use crate::error::{EtlError, Result};
use crate::metrics::PipelineMetrics;
use crate::types::SourceArchive;
use reqwest::Url;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Default)]
pub struct FetchReport {
    pub archives: Vec<SourceArchive>,
    pub downloaded: usize,
    pub already_present: usize,
    pub failed: usize,
    pub max_periods: usize,
}

impl FetchReport {
    pub fn periods(&self) -> usize {
        self.archives.len()
    }

    pub fn quota_met(&self) -> bool {
        self.archives.len() >= self.max_periods
    }
}

pub struct ArchiveFetcher<'a> {
    http: &'a dyn HttpClientPort,
    base_url: String,
    raw_dir: PathBuf,
}

impl<'a> ArchiveFetcher<'a> {
    pub fn new(http: &'a dyn HttpClientPort, base_url: &str, raw_dir: &Path) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
            raw_dir: raw_dir.to_path_buf(),
        }
    }

    /// Downloads up to `max_periods` quarterly archives into the raw directory.
    ///
    /// Archives already on disk are not downloaded again but still count
    /// toward the quota. A failed download is logged and the next candidate
    /// is tried. Only a failure to list the base directory is an error.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn fetch(&self, max_periods: usize) -> Result<FetchReport> {
        fs::create_dir_all(&self.raw_dir).await?;
        let mut report = FetchReport {
            max_periods,
            ..FetchReport::default()
        };

        let page = get_page(self.http, &self.base_url).await?;
        let mut year_links = directory_links(&page, &self.base_url);
        year_links.sort_by(|a, b| b.cmp(a));

        for year_url in &year_links {
            if report.periods() >= max_periods {
                break;
            }
            info!("Checking year directory: {}", year_url);

            let mut archive_links = match get_page(self.http, year_url).await {
                Ok(page) => links_with_suffix(&page, year_url, ARCHIVE_SUFFIX),
                Err(e) => {
                    warn!("Could not list {}: {}", year_url, e);
                    continue;
                }
            };
            archive_links.sort_by(|a, b| b.cmp(a));

            for archive_url in &archive_links {
                if report.periods() >= max_periods {
                    break;
                }
                let file_name = file_name_of(archive_url);
                if !file_name.to_uppercase().contains(PERIOD_MARKER) {
                    debug!("Skipping non-quarterly archive: {}", file_name);
                    continue;
                }

                let destination = self.raw_dir.join(file_name);
                if destination.exists() {
                    info!("Archive already present, skipping download: {}", file_name);
                    PipelineMetrics::record_archive_already_present();
                    report.already_present += 1;
                    report.archives.push(SourceArchive {
                        file_name: file_name.to_string(),
                        url: archive_url.clone(),
                        local_path: destination,
                        downloaded: false,
                    });
                    continue;
                }

                info!("Downloading: {}", file_name);
                match download_to(self.http, archive_url, &destination).await {
                    Ok(bytes) => {
                        info!("Download finished: {} ({} bytes)", destination.display(), bytes);
                        PipelineMetrics::record_archive_downloaded(bytes);
                        report.downloaded += 1;
                        report.archives.push(SourceArchive {
                            file_name: file_name.to_string(),
                            url: archive_url.clone(),
                            local_path: destination,
                            downloaded: true,
                        });
                    }
                    Err(e) => {
                        error!("Failed to download {}: {}", file_name, e);
                        PipelineMetrics::record_download_error();
                        report.failed += 1;
                    }
                }
            }
        }

        if report.quota_met() {
            info!("{} quarterly archives available", report.periods());
        } else {
            warn!(
                "Only {} of {} requested quarterly archives were found",
                report.periods(),
                max_periods
            );
        }
        Ok(report)
    }
}

/// Fetches a listing page as text. Non-2xx responses are errors.
pub async fn get_page(http: &dyn HttpClientPort, url: &str) -> Result<String> {
    let response = http
        .get(url)
        .await
        .map_err(|e| EtlError::download(url, e))?;
    if !response.is_success() {
        return Err(EtlError::download(
            url,
            format!("HTTP status {}", response.status),
        ));
    }
    Ok(String::from_utf8_lossy(&response.bytes).into_owned())
}

/// Downloads `url` to `destination`, writing through a `.part` sibling so a
/// partial file never sits at the final path. Returns the byte count.
pub async fn download_to(http: &dyn HttpClientPort, url: &str, destination: &Path) -> Result<usize> {
    let response = http
        .get(url)
        .await
        .map_err(|e| EtlError::download(url, e))?;
    if !response.is_success() {
        return Err(EtlError::download(
            url,
            format!("HTTP status {}", response.status),
        ));
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut partial = destination.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    fs::write(&partial, &response.bytes).await?;
    fs::rename(&partial, destination).await?;
    Ok(response.bytes.len())
}

/// Absolute hrefs of every anchor on the page, resolved against `page_url`.
fn absolute_links(html: &str, page_url: &str) -> Vec<(String, String)> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    document
        .select(&selector)
        .filter_map(|anchor| {
            let raw = anchor.value().attr("href")?;
            let resolved = base.join(raw).ok()?;
            Some((raw.to_string(), resolved.to_string()))
        })
        .collect()
}

/// Subdirectory links below `base_url`: absolute hrefs that start with the
/// base, end with `/`, and are not the base itself.
pub fn directory_links(html: &str, base_url: &str) -> Vec<String> {
    absolute_links(html, base_url)
        .into_iter()
        .map(|(_, href)| href)
        .filter(|href| {
            href.starts_with(base_url)
                && href.len() > base_url.len()
                && href.ends_with(DIRECTORY_SUFFIX)
        })
        .collect()
}

/// Absolute links whose raw href ends with `suffix`, ignoring ASCII case,
/// in document order.
pub fn links_with_suffix(html: &str, page_url: &str, suffix: &str) -> Vec<String> {
    let suffix = suffix.to_lowercase();
    absolute_links(html, page_url)
        .into_iter()
        .filter(|(raw, _)| raw.to_lowercase().ends_with(&suffix))
        .map(|(_, href)| href)
        .collect()
}

pub fn file_name_of(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}
