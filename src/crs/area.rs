use anyhow::anyhow;
use geo::Area;
use proj::Transform;

use crate::geofile::feature::{FieldValue, Record};

use super::crs_utils::{epsg_code_to_authority_string, EpsgCode};

pub const DEFAULT_AREA_FIELD: &str = "building_area";
pub const DEFAULT_AREA_EPSG: EpsgCode = 3857;

#[derive(Debug, Clone)]
pub struct AreaParams {
    pub field: String,
    pub target_epsg: EpsgCode,
    /// Number of decimals kept.
    pub precision: u32,
}

impl Default for AreaParams {
    fn default() -> Self {
        Self {
            field: DEFAULT_AREA_FIELD.to_owned(),
            target_epsg: DEFAULT_AREA_EPSG,
            precision: 1,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct AreaSummary {
    pub measured: usize,
    pub skipped: usize,
}

pub fn round_to_precision(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

fn polygonal_area(geometry: geo::Geometry) -> Option<geo::Geometry> {
    match geometry {
        geo::Geometry::Polygon(_) | geo::Geometry::MultiPolygon(_) => Some(geometry),
        _ => None,
    }
}

/// Store the planar area of every polygonal geometry, measured in `params.target_epsg`, in
/// `params.field`. Other records get a null area.
///
/// `source_crs` is any definition PROJ understands (`EPSG:n`, WKT, PROJ string).
pub fn compute_areas(
    records: &mut [Record],
    source_crs: &str,
    params: &AreaParams,
) -> anyhow::Result<AreaSummary> {
    let projection = proj::Proj::new_known_crs(
        source_crs,
        &epsg_code_to_authority_string(params.target_epsg),
        None,
    )?;
    let mut summary = AreaSummary::default();
    for record in records.iter_mut() {
        let area = match record.geo_geometry()?.and_then(polygonal_area) {
            Some(geometry) => {
                let projected = geometry
                    .transformed(&projection)
                    .map_err(|err| anyhow!("Could not project geometry, {}", err))?;
                summary.measured += 1;
                FieldValue::Real(round_to_precision(
                    projected.unsigned_area(),
                    params.precision,
                ))
            }
            None => {
                summary.skipped += 1;
                FieldValue::Null
            }
        };
        record.set_field(&params.field, area);
    }
    if summary.skipped > 0 {
        log::warn!(
            "{} features without a polygon geometry got a null '{}'",
            summary.skipped,
            params.field
        );
    }
    Ok(summary)
}
