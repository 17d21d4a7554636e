use std::num::NonZeroUsize;

/// Layer identifiers of an ArcGIS MapServer/FeatureServer.
pub type LayerId = u32;

/// ArcGIS services commonly cap `maxRecordCount` at 1000.
pub const DEFAULT_PAGE_SIZE: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(page_size) => page_size,
    None => unreachable!(),
};
pub const MATCH_ALL: &str = "1=1";
pub const ALL_FIELDS: &str = "*";
const OUTPUT_FORMAT: &str = "geojson";

/// What to fetch from one layer. Fixed for the duration of a fetch run.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub layer: LayerId,
    pub where_clause: String,
    pub out_fields: String,
    pub page_size: NonZeroUsize,
}

impl Query {
    pub fn new(layer: LayerId) -> Self {
        Self {
            layer,
            where_clause: MATCH_ALL.to_owned(),
            out_fields: ALL_FIELDS.to_owned(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_where(mut self, where_clause: &str) -> Self {
        self.where_clause = where_clause.to_owned();
        self
    }

    pub fn with_out_fields(mut self, out_fields: &str) -> Self {
        self.out_fields = out_fields.to_owned();
        self
    }

    pub fn with_page_size(mut self, page_size: NonZeroUsize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn page_request(&self, offset: usize) -> PageRequest {
        PageRequest {
            layer: self.layer,
            where_clause: self.where_clause.clone(),
            out_fields: self.out_fields.clone(),
            offset,
            limit: self.page_size.get(),
        }
    }
}

/// A single request for the records in `[offset, offset + limit)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub layer: LayerId,
    pub where_clause: String,
    pub out_fields: String,
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("where", self.where_clause.clone()),
            ("outFields", self.out_fields.clone()),
            ("f", OUTPUT_FORMAT.to_owned()),
            ("resultOffset", self.offset.to_string()),
            ("resultRecordCount", self.limit.to_string()),
        ]
    }
}

pub fn layer_query_url(service_url: &str, layer: LayerId) -> String {
    format!("{}/{}/query", service_url.trim_end_matches('/'), layer)
}
