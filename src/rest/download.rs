use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use anyhow::Context;
use indicatif::ProgressBar;
use serde::Deserialize;

use crate::geofile::geojson::write_records_to_geojson;

use super::{
    fetcher::{PaginatedFetcher, Termination, DEFAULT_MAX_PAGES},
    query::{LayerId, Query, ALL_FIELDS, DEFAULT_PAGE_SIZE, MATCH_ALL},
    transport::{PageTransport, DEFAULT_USER_AGENT},
};

fn default_file_prefix() -> String {
    "layer".to_owned()
}

fn default_where() -> String {
    MATCH_ALL.to_owned()
}

fn default_out_fields() -> String {
    ALL_FIELDS.to_owned()
}

fn default_page_size() -> NonZeroUsize {
    DEFAULT_PAGE_SIZE
}

fn default_max_pages() -> Option<usize> {
    Some(DEFAULT_MAX_PAGES)
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_owned()
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Deserialize, Debug)]
pub struct DownloadConfig {
    pub service_url: String,
    pub layers: Vec<LayerId>,
    pub output_dir: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(rename = "where", default = "default_where")]
    pub where_clause: String,
    #[serde(default = "default_out_fields")]
    pub out_fields: String,
    #[serde(default = "default_page_size")]
    pub page_size: NonZeroUsize,
    #[serde(default)]
    pub termination: Termination,
    #[serde(default = "default_max_pages")]
    pub max_pages: Option<usize>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl DownloadConfig {
    pub fn query(&self, layer: LayerId) -> Query {
        Query::new(layer)
            .with_where(&self.where_clause)
            .with_out_fields(&self.out_fields)
            .with_page_size(self.page_size)
    }

    pub fn output_filepath(&self, layer: LayerId) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.geojson", self.file_prefix, layer))
    }
}

#[derive(Debug)]
pub enum LayerOutcome {
    Saved { path: PathBuf, records: usize },
    Empty,
    Failed(anyhow::Error),
}

#[derive(Debug)]
pub struct LayerReport {
    pub layer: LayerId,
    pub outcome: LayerOutcome,
}

impl LayerReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, LayerOutcome::Failed(_))
    }
}

fn download_layer<T: PageTransport>(
    fetcher: &PaginatedFetcher<T>,
    config: &DownloadConfig,
    layer: LayerId,
) -> anyhow::Result<LayerOutcome> {
    let records = fetcher.fetch(&config.query(layer))?;
    if records.is_empty() {
        return Ok(LayerOutcome::Empty);
    }
    let path = config.output_filepath(layer);
    write_records_to_geojson(&records, &path)?;
    Ok(LayerOutcome::Saved {
        path,
        records: records.len(),
    })
}

/// Download every configured layer into its own GeoJSON file.
///
/// Layers are independent: a failing layer is reported and the remaining ones are still attempted.
pub fn download_layers<T: PageTransport>(
    fetcher: &PaginatedFetcher<T>,
    config: &DownloadConfig,
) -> anyhow::Result<Vec<LayerReport>> {
    ensure_dir(&config.output_dir)?;
    let bar = ProgressBar::new(config.layers.len() as u64);
    let mut reports = Vec::with_capacity(config.layers.len());
    for &layer in &config.layers {
        let outcome = download_layer(fetcher, config, layer).unwrap_or_else(LayerOutcome::Failed);
        match &outcome {
            LayerOutcome::Saved { path, records } => {
                log::info!("Layer {}: saved {} records to {:?}", layer, records, path)
            }
            LayerOutcome::Empty => log::warn!("Layer {}: no data retrieved", layer),
            LayerOutcome::Failed(err) => log::error!("Layer {}: {:#}", layer, err),
        }
        reports.push(LayerReport { layer, outcome });
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(reports)
}

fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Creating output directory {:?}", dir))
}
