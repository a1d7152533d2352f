use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;

use crate::config::CrawlerConfig;
use crate::extractor::Extract;
use crate::fetcher::{fetch_with_retry, Fetch};
use crate::frontier::{Disposition, Frontier, FrontierPolicy, RequeueDraw};
use crate::record::NAME_FIELD;
use crate::shutdown::Shutdown;
use crate::store::{FsStore, Persisted};

/// Everything batch workers share during a crawl.
pub struct CrawlContext<F, E> {
    pub config: CrawlerConfig,
    pub fetcher: F,
    pub extractor: E,
    pub store: FsStore,
    pub shutdown: Shutdown,
    policy: FrontierPolicy,
}

impl<F, E> CrawlContext<F, E> {
    pub fn new(config: CrawlerConfig, fetcher: F, extractor: E, store: FsStore) -> Self {
        let policy = FrontierPolicy::from_config(&config);
        Self {
            config,
            fetcher,
            extractor,
            store,
            shutdown: Shutdown::new(),
            policy,
        }
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub batch: usize,
    pub processed: usize,
    pub persisted: usize,
    pub already_stored: usize,
    pub failed: usize,
    pub requeued: usize,
    pub collisions: usize,
    pub discovered: usize,
    pub interrupted: bool,
}

/// What happened to the keyword handled by one [`BatchRunner::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A result already existed, nothing was fetched.
    AlreadyStored(String),
    Persisted(String, PathBuf),
    /// Another batch stored the same keyword in the meantime.
    Collision(String),
    Requeued(String),
    Dropped(String),
}

/// Drives the frontier of one batch until it is exhausted.
pub struct BatchRunner<'c, F, E, D> {
    ctx: &'c CrawlContext<F, E>,
    frontier: Frontier,
    draw: D,
    report: BatchReport,
}

impl<'c, F, E, D> BatchRunner<'c, F, E, D>
where
    F: Fetch,
    E: Extract,
    D: RequeueDraw,
{
    pub fn new<I, S>(ctx: &'c CrawlContext<F, E>, batch: usize, seeds: I, draw: D) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ctx,
            frontier: Frontier::new(seeds),
            draw,
            report: BatchReport {
                batch,
                ..Default::default()
            },
        }
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn report(&self) -> &BatchReport {
        &self.report
    }

    /// Handles the next pending keyword, `None` once the frontier is empty or
    /// the crawl is shutting down.
    pub fn step(&mut self) -> Result<Option<Step>> {
        let ctx = self.ctx;
        if ctx.shutdown.is_triggered() {
            self.report.interrupted = true;
            return Ok(None);
        }

        let keyword = match self.frontier.pop() {
            Some(keyword) => keyword,
            None => return Ok(None),
        };
        self.report.processed += 1;
        log::info!(
            "[batch {}] {}/{} {keyword}",
            self.report.batch,
            self.report.processed,
            self.report.processed + self.frontier.len()
        );

        if ctx.store.contains(&keyword) {
            self.report.already_stored += 1;
            return Ok(Some(Step::AlreadyStored(keyword)));
        }

        let url = ctx.config.page_url(&keyword);
        let content = fetch_with_retry(
            &ctx.fetcher,
            &url,
            ctx.config.retry_policy(),
            &ctx.shutdown,
        );
        if content.is_none() && ctx.shutdown.is_triggered() {
            self.frontier.requeue(&keyword);
            self.report.interrupted = true;
            return Ok(None);
        }

        let extraction = ctx.extractor.extract(&keyword, content.as_deref());
        let update = ctx
            .policy
            .update(&mut self.frontier, &keyword, &extraction, &mut self.draw);
        self.report.discovered += update.discovered;

        let step = match update.disposition {
            Disposition::Persist => {
                let mut record = extraction.record;
                if record.name() != Some(keyword.as_str()) {
                    record.insert(NAME_FIELD, keyword.as_str());
                }
                match ctx.store.persist(&record)? {
                    Persisted::Written(path) => {
                        self.report.persisted += 1;
                        Step::Persisted(keyword, path)
                    }
                    Persisted::AlreadyExists(path) => {
                        log::info!("Keyword = '{keyword}' already written to {}", path.display());
                        self.report.collisions += 1;
                        Step::Collision(keyword)
                    }
                }
            }
            Disposition::Requeued => {
                self.report.requeued += 1;
                Step::Requeued(keyword)
            }
            Disposition::Dropped => {
                self.report.failed += 1;
                Step::Dropped(keyword)
            }
        };

        ctx.shutdown.sleep(ctx.config.pacing_delay());
        Ok(Some(step))
    }

    pub fn run(mut self) -> Result<BatchReport> {
        let start = Instant::now();
        while self.step()?.is_some() {}
        log::info!(
            "[batch {}] finished in {:.1}s: {} persisted, {} already stored, {} failed",
            self.report.batch,
            start.elapsed().as_secs_f32(),
            self.report.persisted,
            self.report.already_stored,
            self.report.failed,
        );
        Ok(self.report)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use anyhow::anyhow;

    use super::*;
    use crate::record::{Extraction, InfoboxRecord};

    struct Fixed(u8);

    impl RequeueDraw for Fixed {
        fn draw(&mut self) -> u8 {
            self.0
        }
    }

    fn quick_config() -> CrawlerConfig {
        CrawlerConfig {
            base_url: "http://wiki.test/".into(),
            retry_delay: 0.0,
            pacing_delay: 0.0,
            stagger_delay: 0.0,
            ..Default::default()
        }
    }

    fn infobox(keyword: &str, content: Option<&str>) -> Extraction {
        match content {
            Some(_) => Extraction {
                record: InfoboxRecord::named(keyword),
                related: Vec::new(),
            },
            None => Extraction::default(),
        }
    }

    #[test]
    fn failed_fetch_is_dropped_or_requeued() {
        let dir = tempfile::tempdir().unwrap();
        let attempts = Cell::new(0);
        let down = |_: &str| {
            attempts.set(attempts.get() + 1);
            Err::<String, _>(anyhow!("timed out"))
        };
        let ctx = CrawlContext::new(quick_config(), down, infobox, FsStore::open(dir.path()).unwrap());

        let mut runner = BatchRunner::new(&ctx, 0, ["A"], Fixed(0));
        assert_eq!(runner.step().unwrap(), Some(Step::Dropped("A".into())));
        assert_eq!(runner.step().unwrap(), None);
        assert_eq!(attempts.get(), 4);

        let mut runner = BatchRunner::new(&ctx, 0, ["A"], Fixed(9));
        assert_eq!(runner.step().unwrap(), Some(Step::Requeued("A".into())));
        assert!(runner.frontier().contains("A"));
        assert!(!ctx.store.contains("A"));
    }

    #[test]
    fn record_gets_named_after_keyword() {
        let dir = tempfile::tempdir().unwrap();
        let page = |_: &str| Ok::<_, anyhow::Error>(String::from("<html></html>"));
        let unnamed = |_: &str, _: Option<&str>| {
            let mut record = InfoboxRecord::default();
            record.insert("Formed", "1947");
            Extraction {
                record,
                related: Vec::new(),
            }
        };
        let ctx = CrawlContext::new(quick_config(), page, unnamed, FsStore::open(dir.path()).unwrap());

        let report = BatchRunner::new(&ctx, 3, ["DoD"], Fixed(0)).run().unwrap();
        assert_eq!(report.batch, 3);
        assert_eq!(report.persisted, 1);
        assert_eq!(ctx.store.load("DoD").unwrap().name(), Some("DoD"));
    }

    #[test]
    fn shutdown_stops_before_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let attempts = Cell::new(0);
        let page = |_: &str| {
            attempts.set(attempts.get() + 1);
            Ok::<_, anyhow::Error>(String::new())
        };
        let ctx = CrawlContext::new(quick_config(), page, infobox, FsStore::open(dir.path()).unwrap());
        ctx.shutdown.trigger();

        let report = BatchRunner::new(&ctx, 0, ["A", "B"], Fixed(0)).run().unwrap();
        assert!(report.interrupted);
        assert_eq!(report.processed, 0);
        assert_eq!(attempts.get(), 0);
    }
}
