extern crate log;
pub mod crs;
pub mod geofile;
pub mod rest;
pub mod stats;
use crate::crs::area::{compute_areas, AreaParams, DEFAULT_AREA_EPSG, DEFAULT_AREA_FIELD};
use crate::crs::crs_utils::{spatial_ref_definition, EpsgCode};
use crate::geofile::gdal_geofile::{
    read_records_from_geofile, write_records_to_geofile, GdalDriverType,
};
use crate::rest::download::{download_layers, DownloadConfig, LayerOutcome};
use crate::rest::fetcher::{FetchOptions, PaginatedFetcher};
use crate::rest::transport::ArcGisTransport;
use crate::stats::class_stats::{average_by_class, ranges_by_class};
use crate::stats::counts::{count_field_values, write_counts_to_csv};
use anyhow::anyhow;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use std::{fs::read_to_string, path::Path};

/// Housekeeping tools for vector GIS data: REST layer downloads and attribute statistics.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download ArcGIS REST layers page by page into GeoJSON files.
    Download {
        /// Path to the input config file.
        #[arg(short, long)]
        config_filepath: String,
    },
    /// Count the values of an attribute field and save the counts as CSV.
    Count {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        field: String,
        #[arg(short, long)]
        output: PathBuf,
        /// Header of the value column, defaults to the field name.
        #[arg(long)]
        header: Option<String>,
    },
    /// Average a numeric field per class.
    Average {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long, default_value = "Building_Class")]
        class_field: String,
        #[arg(long)]
        value_field: String,
    },
    /// Min and max of numeric fields per class.
    Range {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long, default_value = "Building_Class")]
        class_field: String,
        #[arg(long, value_delimiter = ',', required = true)]
        fields: Vec<String>,
    },
    /// Compute polygon areas in a projected CRS and store them in a field.
    Area {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value = DEFAULT_AREA_FIELD)]
        field: String,
        #[arg(long, default_value_t = DEFAULT_AREA_EPSG)]
        target_epsg: EpsgCode,
        #[arg(long, default_value_t = 1)]
        precision: u32,
    },
}

fn read_download_config(config_filepath: &str) -> anyhow::Result<DownloadConfig> {
    if !Path::new(config_filepath).exists() {
        return Err(anyhow!("Config file {} not found", config_filepath));
    }
    let config_contents = read_to_string(config_filepath)?;
    Ok(serde_yaml::from_str(&config_contents)?)
}

fn run_download(config_filepath: &str) -> anyhow::Result<()> {
    let config = read_download_config(config_filepath)?;
    log::info!(
        "Downloading {} layers from {}",
        config.layers.len(),
        config.service_url
    );
    let transport = ArcGisTransport::new(
        &config.service_url,
        &config.user_agent,
        Duration::from_secs(config.timeout_secs),
    )?;
    let fetcher = PaginatedFetcher::new(
        transport,
        FetchOptions {
            termination: config.termination,
            max_pages: config.max_pages,
            cancel: None,
        },
    );
    let reports = download_layers(&fetcher, &config)?;

    let saved = reports
        .iter()
        .filter(|report| matches!(report.outcome, LayerOutcome::Saved { .. }))
        .count();
    let failed: Vec<String> = reports
        .iter()
        .filter(|report| report.is_failed())
        .map(|report| report.layer.to_string())
        .collect();
    log::info!(
        "Done: {} saved, {} empty, {} failed",
        saved,
        reports.len() - saved - failed.len(),
        failed.len()
    );
    if !failed.is_empty() {
        return Err(anyhow!("Layers {} failed", failed.join(", ")));
    }
    Ok(())
}

fn try_main() -> anyhow::Result<()> {
    let args = Args::try_parse()?;
    match args.command {
        Command::Download { config_filepath } => run_download(&config_filepath)?,
        Command::Count {
            input,
            field,
            output,
            header,
        } => {
            let (records, _) = read_records_from_geofile(&input)?;
            let counts = count_field_values(&records, &field);
            for value_count in &counts {
                log::info!("{}: {}", value_count.value, value_count.count);
            }
            write_counts_to_csv(&counts, header.as_deref().unwrap_or(&field), &output)?;
            log::info!("Results saved to {:?}", output);
        }
        Command::Average {
            input,
            class_field,
            value_field,
        } => {
            let (records, _) = read_records_from_geofile(&input)?;
            for average in average_by_class(&records, &class_field, &value_field) {
                log::info!(
                    "Average {} for {}: {} ({} features)",
                    value_field,
                    average.class,
                    average.mean,
                    average.count
                );
            }
        }
        Command::Range {
            input,
            class_field,
            fields,
        } => {
            let (records, _) = read_records_from_geofile(&input)?;
            for class_ranges in ranges_by_class(&records, &class_field, &fields) {
                let ranges: Vec<String> = class_ranges
                    .ranges
                    .iter()
                    .map(|(field, range)| {
                        format!(
                            "{} Min = {}, {} Max = {}",
                            field, range.min, field, range.max
                        )
                    })
                    .collect();
                log::info!("{}: {}", class_ranges.class, ranges.join(", "));
            }
        }
        Command::Area {
            input,
            output,
            field,
            target_epsg,
            precision,
        } => {
            let driver = GdalDriverType::from_path(&output)?;
            let (mut records, spatial_ref) = read_records_from_geofile(&input)?;
            let spatial_ref = spatial_ref.ok_or_else(|| {
                anyhow!("{:?} has no CRS, polygon areas need a georeferenced layer", input)
            })?;
            let params = AreaParams {
                field,
                target_epsg,
                precision,
            };
            let source_crs = spatial_ref_definition(&spatial_ref)?;
            let summary = compute_areas(&mut records, &source_crs, &params)?;
            log::info!(
                "Measured {} polygon areas into '{}'",
                summary.measured,
                params.field
            );
            write_records_to_geofile(&records, &output, Some(&spatial_ref), driver)?;
        }
    }
    Ok(())
}

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    env_logger::init();
    if let Err(e) = try_main() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Args, Command};

    #[test]
    fn test_parse_range_fields() {
        let args = Args::try_parse_from([
            "featfetch",
            "range",
            "--input",
            "buildings.gpkg",
            "--fields",
            "Building_Area,Compactness_Index",
        ])
        .unwrap();
        match args.command {
            Command::Range {
                class_field,
                fields,
                ..
            } => {
                assert_eq!(class_field, "Building_Class");
                assert_eq!(fields, vec!["Building_Area", "Compactness_Index"]);
            }
            other => panic!("Unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_area_defaults() {
        let args = Args::try_parse_from([
            "featfetch",
            "area",
            "-i",
            "buildings.shp",
            "-o",
            "buildings_with_areas.gpkg",
        ])
        .unwrap();
        match args.command {
            Command::Area {
                field,
                target_epsg,
                precision,
                ..
            } => {
                assert_eq!(field, "building_area");
                assert_eq!(target_epsg, 3857);
                assert_eq!(precision, 1);
            }
            other => panic!("Unexpected command {:?}", other),
        }
    }
}
