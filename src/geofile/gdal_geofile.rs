use anyhow::{anyhow, Context};
use gdal::vector::{FieldValue as GdalFieldValue, LayerAccess, OGRFieldType};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::{collections::BTreeMap, path::Path};

use super::feature::{FieldMap, FieldValue, Record};

pub enum GdalDriverType {
    GeoPackage,
    GeoJson,
    Shapefile,
}

impl GdalDriverType {
    pub fn name(&self) -> &'static str {
        match self {
            GdalDriverType::GeoPackage => "GPKG",
            GdalDriverType::GeoJson => "GeoJSON",
            GdalDriverType::Shapefile => "ESRI Shapefile",
        }
    }

    pub fn from_path(filepath: &Path) -> anyhow::Result<Self> {
        let extension = filepath
            .extension()
            .and_then(|extension| extension.to_str())
            .map(|extension| extension.to_ascii_lowercase());
        match extension.as_deref() {
            Some("gpkg") => Ok(GdalDriverType::GeoPackage),
            Some("geojson") | Some("json") => Ok(GdalDriverType::GeoJson),
            Some("shp") => Ok(GdalDriverType::Shapefile),
            _ => Err(anyhow!(
                "Cannot infer a vector driver from the extension of {:?}",
                filepath
            )),
        }
    }

    /// Longest field name the driver stores without truncating it.
    pub fn max_field_name_len(&self) -> Option<usize> {
        match self {
            GdalDriverType::Shapefile => Some(10),
            _ => None,
        }
    }

    /// Field names the driver will truncate.
    pub fn truncated_field_names<'a>(&self, field_names: &[&'a str]) -> Vec<&'a str> {
        match self.max_field_name_len() {
            Some(max_len) => field_names
                .iter()
                .copied()
                .filter(|name| name.chars().count() > max_len)
                .collect(),
            None => Vec::new(),
        }
    }
}

fn geometry_type(
    geometry: &geo::Geometry,
) -> anyhow::Result<gdal::vector::OGRwkbGeometryType::Type> {
    use gdal::vector::OGRwkbGeometryType::*;
    match geometry {
        geo::Geometry::Point(_) => Ok(wkbPoint),
        geo::Geometry::LineString(_) => Ok(wkbLineString),
        geo::Geometry::Polygon(_) => Ok(wkbPolygon),
        geo::Geometry::MultiPoint(_) => Ok(wkbMultiPoint),
        geo::Geometry::MultiLineString(_) => Ok(wkbMultiLineString),
        geo::Geometry::MultiPolygon(_) => Ok(wkbMultiPolygon),
        _ => Err(anyhow!("Cannot write geometry type {:?} to file.", geometry)),
    }
}

/// Layer geometry type shared by all geometries, `wkbUnknown` when they differ.
fn layer_geometry_type(
    geometries: &[Option<geo::Geometry>],
) -> anyhow::Result<gdal::vector::OGRwkbGeometryType::Type> {
    let mut layer_type = None;
    for geometry in geometries.iter().flatten() {
        let current = geometry_type(geometry)?;
        match layer_type {
            None => layer_type = Some(current),
            Some(previous) if previous != current => {
                return Ok(gdal::vector::OGRwkbGeometryType::wkbUnknown)
            }
            Some(_) => {}
        }
    }
    Ok(layer_type.unwrap_or(gdal::vector::OGRwkbGeometryType::wkbNone))
}

pub fn write_records_to_geofile(
    records: &[Record],
    output_filepath: &Path,
    crs: Option<&gdal::spatial_ref::SpatialRef>,
    driver: GdalDriverType,
) -> anyhow::Result<()> {
    let gdal_driver = gdal::DriverManager::get_driver_by_name(driver.name())
        .context("Getting GDAL driver")?;

    if records.is_empty() {
        log::warn!("No features to write, creating an empty layer in {:?}", output_filepath);
    }
    let geometries = records
        .iter()
        .map(|record| record.geo_geometry())
        .collect::<anyhow::Result<Vec<_>>>()?;
    let layer_type = layer_geometry_type(&geometries)?;

    let crs = match crs {
        Some(crs) => crs.clone(),
        None => gdal::spatial_ref::SpatialRef::from_epsg(4326)?,
    };
    let crs_name = crs.name()?;
    log::debug!("Using spatial ref {} for writing geofile", crs_name);

    let layer_name = output_filepath
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("");
    let mut dataset = gdal_driver.create_vector_only(output_filepath)?;
    let layer_options = gdal::LayerOptions {
        name: layer_name,
        srs: Some(&crs),
        ty: layer_type,
        options: None,
    };

    let mut layer = dataset.create_layer(layer_options)?;

    log::info!("Setting up fields");
    let field_types = get_field_types(records);
    let field_definitions: Vec<(&str, OGRFieldType::Type)> = field_types
        .iter()
        .map(|(field_name, field_type)| (field_name as &str, *field_type))
        .collect();
    let field_names: Vec<&str> = field_definitions.iter().map(|(name, _)| *name).collect();
    for name in driver.truncated_field_names(&field_names) {
        log::warn!(
            "Field name '{}' is longer than {} driver allows and will be truncated",
            name,
            driver.name()
        );
    }
    layer.create_defn_fields(&field_definitions)?;

    log::info!(
        "Writing {} features to {:?}",
        records.len(),
        output_filepath
    );
    unsafe {
        // Drivers with transactions (GeoPackage) are much faster committing once for all features.
        gdal_sys::OGR_L_StartTransaction(layer.c_layer());
    };
    let bar = ProgressBar::new(records.len() as u64);
    for (record, geometry) in records.iter().zip(geometries) {
        let mut feature = gdal::vector::Feature::new(layer.defn())?;
        if let Some(geometry) = geometry {
            let wkb = wkb::geom_to_wkb(&geometry)
                .map_err(|err| anyhow!("Could not write geometry to WKB, {:?}", err))?;
            feature.set_geometry(gdal::vector::Geometry::from_wkb(&wkb)?)?;
        }
        for (key, value) in &record.fields {
            if let Some(field_type) = field_types.get(key) {
                if let Some(value) = to_gdal_field_value(value, *field_type) {
                    feature.set_field(key, &value)?;
                }
            }
        }
        feature.create(&layer)?;

        bar.inc(1);
    }
    unsafe {
        gdal_sys::OGR_L_CommitTransaction(layer.c_layer());
    };
    bar.finish_and_clear();
    Ok(())
}

fn field_type_for_value(value: &FieldValue) -> Option<OGRFieldType::Type> {
    match value {
        FieldValue::Null => None,
        FieldValue::Bool(_) => Some(OGRFieldType::OFTInteger64),
        FieldValue::Integer(_) => Some(OGRFieldType::OFTInteger64),
        FieldValue::Real(_) => Some(OGRFieldType::OFTReal),
        FieldValue::String(_) => Some(OGRFieldType::OFTString),
    }
}

fn merge_field_types(left: OGRFieldType::Type, right: OGRFieldType::Type) -> OGRFieldType::Type {
    use OGRFieldType::*;
    match (left, right) {
        (left, right) if left == right => left,
        (OFTInteger64, OFTReal) | (OFTReal, OFTInteger64) => OFTReal,
        _ => OFTString,
    }
}

/// Field types for every attribute over all records.
/// Fields that are null everywhere become strings.
fn get_field_types(records: &[Record]) -> BTreeMap<String, OGRFieldType::Type> {
    records
        .par_iter()
        .map(|record| {
            record
                .fields
                .iter()
                .map(|(key, value)| (key.clone(), field_type_for_value(value)))
                .collect::<BTreeMap<String, Option<OGRFieldType::Type>>>()
        })
        .reduce(BTreeMap::new, |mut merged, types| {
            for (key, field_type) in types {
                let entry = merged.entry(key).or_insert(None);
                *entry = match (*entry, field_type) {
                    (Some(left), Some(right)) => Some(merge_field_types(left, right)),
                    (left, right) => left.or(right),
                };
            }
            merged
        })
        .into_iter()
        .map(|(key, field_type)| (key, field_type.unwrap_or(OGRFieldType::OFTString)))
        .collect()
}

fn to_gdal_field_value(
    value: &FieldValue,
    field_type: OGRFieldType::Type,
) -> Option<GdalFieldValue> {
    match (value, field_type) {
        (FieldValue::Null, _) => None,
        (FieldValue::Bool(value), OGRFieldType::OFTInteger64) => {
            Some(GdalFieldValue::Integer64Value(*value as i64))
        }
        (FieldValue::Integer(value), OGRFieldType::OFTInteger64) => {
            Some(GdalFieldValue::Integer64Value(*value))
        }
        (value, OGRFieldType::OFTReal) => value.as_f64().map(GdalFieldValue::RealValue),
        (value, _) => Some(GdalFieldValue::StringValue(value.to_string())),
    }
}

fn from_gdal_field_value(value: Option<GdalFieldValue>) -> anyhow::Result<FieldValue> {
    match value {
        None => Ok(FieldValue::Null),
        Some(GdalFieldValue::IntegerValue(value)) => Ok(FieldValue::Integer(value as i64)),
        Some(GdalFieldValue::Integer64Value(value)) => Ok(FieldValue::Integer(value)),
        Some(GdalFieldValue::RealValue(value)) => Ok(FieldValue::Real(value)),
        Some(GdalFieldValue::StringValue(value)) => Ok(FieldValue::String(value)),
        Some(GdalFieldValue::DateValue(value)) => Ok(FieldValue::String(value.to_string())),
        Some(GdalFieldValue::DateTimeValue(value)) => Ok(FieldValue::String(value.to_rfc3339())),
        Some(other) => Err(anyhow!("Unsupported list field value {:?}", other)),
    }
}

fn gdal_geometry_to_geojson(
    geometry: &gdal::vector::Geometry,
) -> anyhow::Result<Option<geojson::Geometry>> {
    if geometry.is_empty() {
        return Ok(None);
    }
    let wkb = geometry.wkb()?;
    let geometry = wkb::wkb_to_geom(&mut wkb.as_slice())
        .map_err(|err| anyhow!("Could not read geometry from WKB, {:?}", err))?;
    Ok(Some(geojson::Geometry::new(geojson::Value::from(&geometry))))
}

/// Read all features of a single-layer vector file along with the layer CRS, if it has one.
pub fn read_records_from_geofile(
    filepath: &Path,
) -> anyhow::Result<(Vec<Record>, Option<gdal::spatial_ref::SpatialRef>)> {
    gdal::DriverManager::register_all();
    let mut open_options = gdal::DatasetOptions::default();
    open_options.open_flags = gdal::GdalOpenFlags::GDAL_OF_VECTOR;
    let dataset = gdal::Dataset::open_ex(filepath, open_options)
        .with_context(|| format!("Opening {:?}", filepath))?;

    let layer_count = dataset.layer_count();
    if 0 == layer_count || 1 < layer_count {
        return Err(anyhow!(
            "Found {} layers, only one layer is supported.",
            layer_count
        ));
    }
    let mut layer = dataset.layer(0)?;
    let spatial_ref = layer.spatial_ref().ok();
    let mut records = Vec::new();
    for gdal_feature in layer.features() {
        let geometry = match gdal_feature.geometry_by_index(0) {
            Ok(geometry) => gdal_geometry_to_geojson(geometry)?,
            Err(_) => None,
        };
        let mut fields = FieldMap::new();
        for (name, value) in gdal_feature.fields() {
            let value = from_gdal_field_value(value)
                .with_context(|| format!("Reading field '{}'", name))?;
            fields.insert(name, value);
        }
        records.push(Record {
            id: gdal_feature
                .fid()
                .map(|fid| geojson::feature::Id::Number(fid.into())),
            geometry,
            fields,
        });
    }
    log::info!("Read {} features from {:?}", records.len(), filepath);
    Ok((records, spatial_ref))
}
