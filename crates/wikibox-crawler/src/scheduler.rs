use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Error, Result};

use crate::config::OnError;
use crate::extractor::Extract;
use crate::fetcher::Fetch;
use crate::runner::{BatchReport, BatchRunner, CrawlContext};

/// A group of seed keyword files handled by one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub id: usize,
    pub files: Vec<PathBuf>,
}

impl Batch {
    /// Keywords of all the batch files, one per line, blank lines ignored.
    pub fn load_keywords(&self) -> Result<Vec<String>> {
        let mut keywords = vec![];
        for path in &self.files {
            let content = fs_err::read_to_string(path)?;
            keywords.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(String::from),
            );
        }
        Ok(keywords)
    }
}

/// Files of the seed directory and of its direct subdirectories, sorted.
pub fn list_seed_files<P: AsRef<Path>>(seed_dir: P) -> Result<Vec<PathBuf>> {
    let mut files = vec![];
    for entry in fs_err::read_dir(seed_dir.as_ref())? {
        let path = entry?.path();
        if path.is_dir() {
            for sub_entry in fs_err::read_dir(&path)? {
                let sub_path = sub_entry?.path();
                if sub_path.is_file() {
                    files.push(sub_path);
                }
            }
        } else if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Splits files into consecutive batches, the last one possibly shorter.
pub fn partition(files: &[PathBuf], batch_size: NonZeroUsize) -> Vec<Batch> {
    files
        .chunks(batch_size.get())
        .enumerate()
        .map(|(id, files)| Batch {
            id,
            files: files.to_vec(),
        })
        .collect()
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub batch: usize,
    pub result: Result<BatchReport>,
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<BatchOutcome>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.batch, e)))
    }

    pub fn reports(&self) -> impl Iterator<Item = &BatchReport> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn persisted(&self) -> usize {
        self.reports().map(|r| r.persisted).sum()
    }
}

/// Crawls every keyword of the seed directory.
pub fn crawl_seeds<F, E, P>(ctx: Arc<CrawlContext<F, E>>, seed_dir: P) -> Result<DispatchReport>
where
    F: Fetch + Send + Sync + 'static,
    E: Extract + Send + Sync + 'static,
    P: AsRef<Path>,
{
    let files = list_seed_files(seed_dir)?;
    log::info!("Found {} keyword files", files.len());
    let batches = partition(&files, ctx.config.batch_size);
    Ok(dispatch(ctx, batches))
}

/// Runs one worker thread per batch and waits for all of them.
///
/// Worker starts are staggered. A failing batch never stops the others unless
/// `on_batch_error` is [`OnError::Fail`], in which case the shutdown is triggered.
pub fn dispatch<F, E>(ctx: Arc<CrawlContext<F, E>>, batches: Vec<Batch>) -> DispatchReport
where
    F: Fetch + Send + Sync + 'static,
    E: Extract + Send + Sync + 'static,
{
    let mut report = DispatchReport::default();
    let mut workers = vec![];

    for (i, batch) in batches.into_iter().enumerate() {
        let id = batch.id;
        if i > 0 && !ctx.shutdown.sleep(ctx.config.stagger_delay()) {
            log::warn!("Shutting down, batch {id} not started");
            report.outcomes.push(BatchOutcome {
                batch: id,
                result: Err(anyhow!("Batch {id} not started")),
            });
            continue;
        }

        let ctx = Arc::clone(&ctx);
        let worker = thread::Builder::new()
            .name(format!("batch-{id}"))
            .spawn(move || {
                log::info!("Create thread for batch {id}");
                let res = panic::catch_unwind(AssertUnwindSafe(|| run_batch(&ctx, &batch)))
                    .unwrap_or_else(|payload| {
                        Err(anyhow!("Batch {id} panicked: {}", panic_message(&*payload)))
                    });
                if let Err(e) = &res {
                    log::error!("Exception in batch {id} {:?} got: {e:#}", batch.files);
                    if let OnError::Fail = ctx.config.on_batch_error {
                        ctx.shutdown.trigger();
                    }
                }
                res
            });

        match worker {
            Ok(worker) => workers.push((id, worker)),
            Err(e) => report.outcomes.push(BatchOutcome {
                batch: id,
                result: Err(Error::new(e).context(format!("Couldn't start batch {id}"))),
            }),
        }
    }

    for (id, worker) in workers {
        let result = worker
            .join()
            .unwrap_or_else(|_| Err(anyhow!("Batch {id} worker panicked")));
        report.outcomes.push(BatchOutcome { batch: id, result });
    }
    report.outcomes.sort_by_key(|o| o.batch);

    report
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown cause"
    }
}

fn run_batch<F, E>(ctx: &CrawlContext<F, E>, batch: &Batch) -> Result<BatchReport>
where
    F: Fetch,
    E: Extract,
{
    let keywords = batch.load_keywords()?;
    BatchRunner::new(ctx, batch.id, keywords, rand::rng()).run()
}
