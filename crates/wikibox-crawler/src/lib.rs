mod config;
mod extractor;
mod fetcher;
mod frontier;
mod inspect;
mod record;
mod runner;
mod scheduler;
mod shutdown;
mod store;

pub use config::{CrawlerConfig, Markers, OnError};
pub use extractor::{Extract, InfoboxExtractor, MISSING_CELL};
pub use fetcher::{fetch_with_retry, load_proxies, Fetch, HttpFetcher, RetryPolicy};
pub use frontier::{Disposition, Frontier, FrontierPolicy, RequeueDraw, Update};
pub use inspect::{scan_results, ScanSummary};
pub use record::{Extraction, InfoboxRecord, NAME_FIELD};
pub use runner::{BatchReport, BatchRunner, CrawlContext, Step};
pub use scheduler::{
    crawl_seeds, dispatch, list_seed_files, partition, Batch, BatchOutcome, DispatchReport,
};
pub use shutdown::Shutdown;
pub use store::{file_name, load_record, FsStore, Persisted};

pub use anyhow;
