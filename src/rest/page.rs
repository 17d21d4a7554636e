use crate::geofile::feature::Record;

use super::fetcher::FetchError;

/// One batch of records returned by a single request.
#[derive(Debug, Default)]
pub struct Page {
    records: Vec<Record>,
}

impl Page {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Decode a successful response body.
    ///
    /// The records live under `features`; a missing or null collection is an empty page.
    /// ArcGIS reports some failures with a 2xx status and an `error` object, those become
    /// `FetchError::Service` using the code from the body when there is one.
    pub fn decode(body: &str, status: u16) -> Result<Self, FetchError> {
        let document: serde_json::Value =
            serde_json::from_str(body).map_err(|err| FetchError::Decode {
                cause: format!("Response is not JSON, {}", err),
            })?;
        let document = document.as_object().ok_or_else(|| FetchError::Decode {
            cause: "Response is not a JSON object".to_owned(),
        })?;

        if let Some(error) = document.get("error") {
            let status = error
                .get("code")
                .and_then(|code| code.as_u64())
                .and_then(|code| u16::try_from(code).ok())
                .unwrap_or(status);
            let body = error
                .get("message")
                .and_then(|message| message.as_str())
                .map(str::to_owned)
                .unwrap_or_else(|| error.to_string());
            return Err(FetchError::Service { status, body });
        }

        let features = match document.get("features") {
            None | Some(serde_json::Value::Null) => return Ok(Self::default()),
            Some(serde_json::Value::Array(features)) => features,
            Some(other) => {
                return Err(FetchError::Decode {
                    cause: format!("Expected 'features' to be an array, got {}", other),
                })
            }
        };

        let records = features
            .iter()
            .enumerate()
            .map(|(index, feature)| {
                let feature = serde_json::from_value::<geojson::Feature>(feature.clone())
                    .map_err(|err| FetchError::Decode {
                        cause: format!("Feature {}: {}", index, err),
                    })?;
                Record::try_from(feature).map_err(|err| FetchError::Decode {
                    cause: format!("Feature {}: {}", index, err),
                })
            })
            .collect::<Result<Vec<Record>, FetchError>>()?;
        Ok(Self::new(records))
    }
}
