use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::Deserialize;

use crate::geofile::feature::Record;

use super::{page::Page, query::Query, transport::PageTransport};

/// Upper bound on requests per fetch when the caller does not pick one.
pub const DEFAULT_MAX_PAGES: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {cause}")]
    Transport { cause: String },

    #[error("service error {status}: {body}")]
    Service { status: u16, body: String },

    #[error("decode error: {cause}")]
    Decode { cause: String },

    #[error("gave up after {max_pages} pages without reaching the end of the layer")]
    PageLimitExceeded { max_pages: usize },

    #[error("cancelled after {fetched} records")]
    Cancelled { fetched: usize },
}

/// When a fetch run stops successfully.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Stop on the first page without records. Safe for any service.
    #[default]
    EmptyPage,
    /// Also stop on a page shorter than the page size. Only valid for services that always fill
    /// pages up to the requested size while records remain, saves the final empty request.
    ShortPage,
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub termination: Termination,
    pub max_pages: Option<usize>,
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Sequentially pages through a layer and accumulates every record in order.
pub struct PaginatedFetcher<T: PageTransport> {
    transport: T,
    options: FetchOptions,
}

impl<T: PageTransport> PaginatedFetcher<T> {
    pub fn new(transport: T, options: FetchOptions) -> Self {
        Self { transport, options }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn is_cancelled(&self) -> bool {
        self.options
            .cancel
            .as_ref()
            .map_or(false, |cancel| cancel.load(Ordering::Relaxed))
    }

    /// Fetch all records matching `query`.
    ///
    /// Offsets requested are 0, page size, 2 * page size, ... Any error ends the run and the
    /// records gathered so far are dropped.
    pub fn fetch(&self, query: &Query) -> Result<Vec<Record>, FetchError> {
        let page_size = query.page_size.get();
        let mut records = Vec::new();
        let mut offset: usize = 0;
        let mut pages = 0;
        loop {
            if self.is_cancelled() {
                return Err(FetchError::Cancelled {
                    fetched: records.len(),
                });
            }
            if let Some(max_pages) = self.options.max_pages {
                if pages >= max_pages {
                    return Err(FetchError::PageLimitExceeded { max_pages });
                }
            }

            log::debug!(
                "Requesting layer {} records {}..{}",
                query.layer,
                offset,
                offset.saturating_add(page_size)
            );
            let response = self.transport.get_page(&query.page_request(offset))?;
            pages += 1;
            if !response.is_success() {
                return Err(FetchError::Service {
                    status: response.status,
                    body: response.body,
                });
            }
            let page = Page::decode(&response.body, response.status)?;
            if page.is_empty() {
                break;
            }

            let page_len = page.len();
            records.extend(page.into_records());
            if self.options.termination == Termination::ShortPage && page_len < page_size {
                break;
            }
            // The next offset does not fit, no later page can be addressed.
            offset = offset
                .checked_add(page_size)
                .ok_or(FetchError::PageLimitExceeded { max_pages: pages })?;
        }
        log::debug!(
            "Fetched {} records from layer {} in {} requests",
            records.len(),
            query.layer,
            pages
        );
        Ok(records)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        cell::RefCell,
        num::NonZeroUsize,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    };

    use rstest::rstest;
    use serde_json::json;

    use crate::{
        geofile::feature::FieldValue,
        rest::{
            query::{LayerId, PageRequest, Query},
            transport::{PageResponse, PageTransport},
        },
    };

    use super::{FetchError, FetchOptions, PaginatedFetcher, Termination};

    /// In-memory layer serving `size` records per layer, with optional scripted responses.
    pub(crate) struct ScriptedTransport {
        pub sizes: Vec<(LayerId, usize)>,
        pub scripted: Vec<(LayerId, usize, PageResponse)>,
        pub always_full: bool,
        pub cancel_after: Option<(usize, Arc<AtomicBool>)>,
        pub requests: RefCell<Vec<PageRequest>>,
    }

    impl ScriptedTransport {
        pub fn new(sizes: Vec<(LayerId, usize)>) -> Self {
            Self {
                sizes,
                scripted: Vec::new(),
                always_full: false,
                cancel_after: None,
                requests: RefCell::new(Vec::new()),
            }
        }

        /// Answer the request for `layer` at `offset` with `response` instead of generated records.
        pub fn responding_at(
            mut self,
            layer: LayerId,
            offset: usize,
            response: PageResponse,
        ) -> Self {
            self.scripted.push((layer, offset, response));
            self
        }

        pub fn offsets(&self) -> Vec<usize> {
            self.requests
                .borrow()
                .iter()
                .map(|request| request.offset)
                .collect()
        }
    }

    impl PageTransport for ScriptedTransport {
        fn get_page(&self, request: &PageRequest) -> Result<PageResponse, FetchError> {
            self.requests.borrow_mut().push(request.clone());
            if let Some((requests, cancel)) = &self.cancel_after {
                if self.requests.borrow().len() >= *requests {
                    cancel.store(true, Ordering::Relaxed);
                }
            }
            if let Some((_, _, response)) = self
                .scripted
                .iter()
                .find(|(layer, offset, _)| *layer == request.layer && *offset == request.offset)
            {
                return Ok(response.clone());
            }
            let size = self
                .sizes
                .iter()
                .find(|(layer, _)| *layer == request.layer)
                .map(|(_, size)| *size)
                .ok_or_else(|| FetchError::Transport {
                    cause: format!("unknown layer {}", request.layer),
                })?;
            let end = if self.always_full {
                request.offset + request.limit
            } else {
                size.min(request.offset.saturating_add(request.limit))
            };
            let features: Vec<serde_json::Value> = (request.offset.min(end)..end)
                .map(|index| {
                    json!({
                        "type": "Feature",
                        "id": index,
                        "geometry": {"type": "Point", "coordinates": [index as f64, 47.5]},
                        "properties": {"OBJECTID": index, "LAYER": request.layer}
                    })
                })
                .collect();
            Ok(PageResponse {
                status: 200,
                body: json!({"type": "FeatureCollection", "features": features}).to_string(),
            })
        }
    }

    fn query(page_size: usize) -> Query {
        Query::new(1).with_page_size(NonZeroUsize::new(page_size).unwrap())
    }

    fn object_ids(records: &[crate::geofile::feature::Record]) -> Vec<i64> {
        records
            .iter()
            .map(|record| match record.field("OBJECTID") {
                FieldValue::Integer(id) => *id,
                other => panic!("Unexpected OBJECTID {:?}", other),
            })
            .collect()
    }

    #[rstest]
    #[case(0, 1, 1)]
    #[case(1, 1, 2)]
    #[case(5, 1, 6)]
    #[case(5, 2, 4)]
    #[case(999, 1000, 2)]
    #[case(2000, 1000, 3)]
    #[case(2500, 1000, 4)]
    fn test_empty_page_termination(
        #[case] num_records: usize,
        #[case] page_size: usize,
        #[case] expected_requests: usize,
    ) {
        let fetcher = PaginatedFetcher::new(
            ScriptedTransport::new(vec![(1, num_records)]),
            FetchOptions::default(),
        );
        let records = fetcher.fetch(&query(page_size)).unwrap();

        assert_eq!(object_ids(&records), (0..num_records as i64).collect::<Vec<_>>());
        let expected_offsets: Vec<usize> =
            (0..expected_requests).map(|page| page * page_size).collect();
        assert_eq!(fetcher.transport().offsets(), expected_offsets);
    }

    #[rstest]
    #[case(0, 1, 1)]
    #[case(5, 1, 6)]
    #[case(5, 2, 3)]
    #[case(999, 1000, 1)]
    #[case(2000, 1000, 3)]
    #[case(2500, 1000, 3)]
    fn test_short_page_termination(
        #[case] num_records: usize,
        #[case] page_size: usize,
        #[case] expected_requests: usize,
    ) {
        let options = FetchOptions {
            termination: Termination::ShortPage,
            ..FetchOptions::default()
        };
        let transport = ScriptedTransport::new(vec![(1, num_records)]);
        let fetcher = PaginatedFetcher::new(transport, options);
        let records = fetcher.fetch(&query(page_size)).unwrap();

        assert_eq!(records.len(), num_records);
        assert_eq!(fetcher.transport().offsets().len(), expected_requests);
    }

    #[test]
    fn test_fetch_is_repeatable() {
        let fetcher = PaginatedFetcher::new(
            ScriptedTransport::new(vec![(1, 25)]),
            FetchOptions::default(),
        );
        let first = fetcher.fetch(&query(10)).unwrap();
        let second = fetcher.fetch(&query(10)).unwrap();
        assert_eq!(first, second);
        assert_eq!(fetcher.transport().offsets(), vec![0, 10, 20, 30, 0, 10, 20, 30]);
    }

    #[test]
    fn test_service_error_aborts_fetch() {
        let transport = ScriptedTransport::new(vec![(1, 2500)]).responding_at(
            1,
            1000,
            PageResponse {
                status: 500,
                body: "Internal Server Error".to_string(),
            },
        );
        let fetcher = PaginatedFetcher::new(transport, FetchOptions::default());
        match fetcher.fetch(&query(1000)) {
            Err(FetchError::Service { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "Internal Server Error");
            }
            other => panic!("Expected a service error, got {:?}", other.map(|r| r.len())),
        }
        assert_eq!(fetcher.transport().offsets(), vec![0, 1000]);
    }

    #[test]
    fn test_decode_error_aborts_fetch() {
        let transport = ScriptedTransport::new(vec![(1, 30)]).responding_at(
            1,
            10,
            PageResponse {
                status: 200,
                body: "<html>maintenance</html>".to_string(),
            },
        );
        let fetcher = PaginatedFetcher::new(transport, FetchOptions::default());
        assert!(matches!(
            fetcher.fetch(&query(10)),
            Err(FetchError::Decode { .. })
        ));
        assert_eq!(fetcher.transport().offsets(), vec![0, 10]);
    }

    #[test]
    fn test_transport_error_is_surfaced() {
        let fetcher =
            PaginatedFetcher::new(ScriptedTransport::new(vec![]), FetchOptions::default());
        assert!(matches!(
            fetcher.fetch(&query(10)),
            Err(FetchError::Transport { .. })
        ));
    }

    #[test]
    fn test_page_limit_stops_runaway_source() {
        let mut transport = ScriptedTransport::new(vec![(1, 0)]);
        transport.always_full = true;
        let options = FetchOptions {
            max_pages: Some(5),
            ..FetchOptions::default()
        };
        let fetcher = PaginatedFetcher::new(transport, options);
        assert!(matches!(
            fetcher.fetch(&query(10)),
            Err(FetchError::PageLimitExceeded { max_pages: 5 })
        ));
        assert_eq!(fetcher.transport().offsets(), vec![0, 10, 20, 30, 40]);
    }

    #[test]
    fn test_cancelled_before_first_request() {
        let cancel = Arc::new(AtomicBool::new(true));
        let options = FetchOptions {
            cancel: Some(cancel),
            ..FetchOptions::default()
        };
        let fetcher = PaginatedFetcher::new(ScriptedTransport::new(vec![(1, 10)]), options);
        assert!(matches!(
            fetcher.fetch(&query(5)),
            Err(FetchError::Cancelled { fetched: 0 })
        ));
        assert!(fetcher.transport().offsets().is_empty());
    }

    #[test]
    fn test_cancelled_between_pages() {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut transport = ScriptedTransport::new(vec![(1, 25)]);
        transport.cancel_after = Some((1, cancel.clone()));
        let options = FetchOptions {
            cancel: Some(cancel),
            ..FetchOptions::default()
        };
        let fetcher = PaginatedFetcher::new(transport, options);
        assert!(matches!(
            fetcher.fetch(&query(10)),
            Err(FetchError::Cancelled { fetched: 10 })
        ));
        assert_eq!(fetcher.transport().offsets(), vec![0]);
    }

    #[test]
    fn test_offset_overflow_stops_fetch() {
        let page_size = usize::MAX / 2 + 1;
        let second_page = json!({
            "type": "FeatureCollection",
            "features": [{"type": "Feature", "geometry": null, "properties": {"OBJECTID": 1}}]
        });
        let transport = ScriptedTransport::new(vec![(1, 1)]).responding_at(
            1,
            page_size,
            PageResponse {
                status: 200,
                body: second_page.to_string(),
            },
        );
        let fetcher = PaginatedFetcher::new(transport, FetchOptions::default());
        assert!(matches!(
            fetcher.fetch(&query(page_size)),
            Err(FetchError::PageLimitExceeded { max_pages: 2 })
        ));
        assert_eq!(fetcher.transport().offsets(), vec![0, page_size]);
    }

    #[test]
    fn test_termination_from_yaml() {
        let termination: Termination = serde_yaml::from_str("short_page").unwrap();
        assert_eq!(termination, Termination::ShortPage);
    }
}
