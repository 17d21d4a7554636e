pub mod download;
pub mod fetcher;
pub mod page;
pub mod query;
pub mod transport;
