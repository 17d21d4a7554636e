use std::{fs, path::Path};

use anyhow::Context;

use super::feature::Record;

pub fn records_to_geojson(records: &[Record]) -> geojson::GeoJson {
    let feature_collection: geojson::FeatureCollection =
        records.iter().map(geojson::Feature::from).collect();
    geojson::GeoJson::from(feature_collection)
}

/// Write the records as a pretty-printed GeoJSON FeatureCollection, keeping their order.
pub fn write_records_to_geojson(records: &[Record], output_filepath: &Path) -> anyhow::Result<()> {
    let geojson_contents = serde_json::to_string_pretty(&records_to_geojson(records))?;
    fs::write(output_filepath, geojson_contents)
        .with_context(|| format!("Writing GeoJSON to {:?}", output_filepath))
}
