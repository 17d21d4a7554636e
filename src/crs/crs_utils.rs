pub type EpsgCode = u32;

pub fn epsg_code_to_authority_string(code: EpsgCode) -> String {
    format!("EPSG:{}", code)
}

/// CRS definition PROJ accepts: `EPSG:n` for EPSG-registered CRSs, WKT for anything else
/// (ESRI `.prj` definitions, custom projections).
pub fn spatial_ref_definition(
    spatial_ref: &gdal::spatial_ref::SpatialRef,
) -> anyhow::Result<String> {
    match (spatial_ref.auth_name(), spatial_ref.auth_code()) {
        (Ok(authority), Ok(code)) if authority == "EPSG" => {
            Ok(epsg_code_to_authority_string(code as EpsgCode))
        }
        _ => Ok(spatial_ref.to_wkt()?),
    }
}
