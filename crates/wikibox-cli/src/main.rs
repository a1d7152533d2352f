use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::{env, io, thread};

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use serde_json::json;
use tokio::runtime;
use wikibox_crawler::{
    crawl_seeds, fetch_with_retry, load_proxies, scan_results, CrawlContext, CrawlerConfig,
    Extract, FsStore, HttpFetcher, InfoboxExtractor, OnError, Shutdown,
};

/// Encyclopedia infobox crawler
#[derive(Debug, Parser)]
#[clap(version)]
pub struct Args {
    #[clap(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[clap(name = "crawl")]
    Crawl(CrawlArgs),
    #[clap(name = "scrap")]
    Scrap(ScrapArgs),
    #[clap(name = "inspect")]
    Inspect(InspectArgs),
    #[clap(hide = true)]
    Completion,
}

/// Crawl infoboxes starting from seed keyword files
#[derive(Debug, clap::Args)]
pub struct CrawlArgs {
    /// Directory of keyword files, one keyword per line
    #[clap(parse(from_os_str), long, default_value = "keyword")]
    pub seed_dir: PathBuf,
    /// Directory where one json result per keyword is written
    #[clap(parse(from_os_str), long, default_value = "data")]
    pub data_dir: PathBuf,
    /// Optional proxy list file, one proxy per line
    #[clap(parse(from_os_str), long)]
    pub proxies: Option<PathBuf>,
    /// Optional default crawler yaml configuration file
    #[clap(env = "WIKIBOX_CRAWLER_CONFIG", parse(from_os_str), long)]
    pub crawler_config: Option<PathBuf>,
    /// Override crawler's page base url
    #[clap(long)]
    pub base_url: Option<String>,
    /// Override crawler's user agent
    #[clap(long)]
    pub user_agent: Option<String>,
    /// Override crawler's number of keyword files per batch
    #[clap(long)]
    pub batch_size: Option<NonZeroUsize>,
    /// Override crawler's number of retries per download
    #[clap(long)]
    pub max_retries: Option<usize>,
    /// Override crawler's delay in seconds after each keyword
    #[clap(long)]
    pub pacing_delay: Option<f32>,
    /// Override crawler's batch error handling strategy
    #[clap(arg_enum, long)]
    pub on_batch_error: Option<OnError>,
    /// No SIGINT handling, batches run until their frontier is empty
    #[clap(long)]
    pub no_sigint: bool,
    /// When quiet no logs are outputted
    #[clap(long, short)]
    pub quiet: bool,
}

impl TryFrom<&CrawlArgs> for CrawlerConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CrawlArgs) -> Result<Self, Self::Error> {
        let mut conf = if let Some(file) = args.crawler_config.as_ref().map(fs_err::File::open) {
            serde_yaml::from_reader(file?)?
        } else {
            CrawlerConfig::default()
        };
        if let Some(path) = &args.proxies {
            conf.proxies = load_proxies(path)?;
        }
        if let Some(base_url) = &args.base_url {
            conf.base_url = base_url.to_string();
        }
        if let Some(user_agent) = &args.user_agent {
            conf.user_agent = user_agent.to_string();
        }
        if let Some(batch_size) = args.batch_size {
            conf.batch_size = batch_size;
        }
        if let Some(max_retries) = args.max_retries {
            conf.max_retries = max_retries;
        }
        if let Some(pacing_delay) = args.pacing_delay {
            conf.pacing_delay = pacing_delay;
        }
        if let Some(on_batch_error) = args.on_batch_error {
            conf.on_batch_error = on_batch_error;
        }
        Ok(conf)
    }
}

pub fn crawl(args: CrawlArgs) -> anyhow::Result<()> {
    let crawler_conf: CrawlerConfig = (&args).try_into()?;
    let fetcher = HttpFetcher::new(&crawler_conf)?;
    let extractor = InfoboxExtractor::new(&crawler_conf.markers)?;
    let store = FsStore::open(&args.data_dir)?;

    let shutdown = Shutdown::new();
    if !args.no_sigint {
        watch_sigint(shutdown.clone())?;
    }

    let ctx = CrawlContext::new(crawler_conf, fetcher, extractor, store).with_shutdown(shutdown);
    let report = crawl_seeds(Arc::new(ctx), &args.seed_dir)?;

    let failures = report.failures().count();
    log::info!(
        "Crawl done: {} batches, {} records persisted, {failures} batches failed",
        report.outcomes.len(),
        report.persisted(),
    );
    if failures > 0 {
        anyhow::bail!("{failures} of {} batches failed", report.outcomes.len());
    }
    Ok(())
}

/// Triggers `shutdown` on the first Ctrl-C.
fn watch_sigint(shutdown: Shutdown) -> anyhow::Result<()> {
    let rt = runtime::Builder::new_current_thread().enable_all().build()?;
    thread::Builder::new()
        .name("sigint".into())
        .spawn(move || {
            rt.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupted, stopping batches after their current keyword");
                    shutdown.trigger();
                }
            })
        })?;
    Ok(())
}

/// Extract a single page and print the result to stdout
#[derive(Debug, clap::Args)]
#[clap(group = clap::ArgGroup::new("page").required(true))]
pub struct ScrapArgs {
    /// Keyword whose page is downloaded
    #[clap(group = "page", long)]
    pub keyword: Option<String>,
    /// A local html page to extract
    #[clap(group = "page", parse(from_os_str), long)]
    pub file: Option<PathBuf>,
    /// Keyword recorded as `Name` when extracting a local file
    #[clap(long, requires = "file")]
    pub name: Option<String>,
    /// Optional default crawler yaml configuration file
    #[clap(env = "WIKIBOX_CRAWLER_CONFIG", parse(from_os_str), long)]
    pub crawler_config: Option<PathBuf>,
}

pub fn scrap(args: ScrapArgs) -> anyhow::Result<()> {
    let conf = match &args.crawler_config {
        Some(path) => serde_yaml::from_reader(fs_err::File::open(path)?)?,
        None => CrawlerConfig::default(),
    };
    let extractor = InfoboxExtractor::new(&conf.markers)?;

    let (keyword, page) = if let Some(keyword) = args.keyword {
        let fetcher = HttpFetcher::new(&conf)?;
        let url = conf.page_url(&keyword);
        let page = fetch_with_retry(&fetcher, &url, conf.retry_policy(), &Shutdown::new());
        (keyword, page)
    } else if let Some(path) = args.file {
        let page = fs_err::read_to_string(&path)?;
        let keyword = args.name.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().replace('_', " "))
                .unwrap_or_default()
        });
        (keyword, Some(page))
    } else {
        anyhow::bail!("Missing `keyword` or `file`");
    };

    let extraction = extractor.extract(&keyword, page.as_deref());
    println!("{}", serde_json::to_string_pretty(&extraction)?);
    Ok(())
}

/// Load every stored result and print it
#[derive(Debug, clap::Args)]
pub struct InspectArgs {
    /// Directory containing the json results
    #[clap(parse(from_os_str), long, default_value = "data")]
    pub data_dir: PathBuf,
}

pub fn inspect(args: InspectArgs) -> anyhow::Result<()> {
    let summary = scan_results(&args.data_dir, |count, _, record| {
        println!("{count}: {}", json!(record));
    })?;
    for path in &summary.malformed {
        println!("Error in load file = {}", path.display());
    }
    eprintln!(
        "{} records loaded, {} empty files, {} malformed files",
        summary.loaded,
        summary.empty,
        summary.malformed.len()
    );
    Ok(())
}

fn init_logs(default_filter: &str) {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", default_filter);
    }
    env_logger::init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Crawl(args) => {
            if !args.quiet {
                init_logs("wikibox_crawler=info");
            }
            crawl(args)
        }
        SubCommand::Scrap(args) => {
            init_logs("wikibox_crawler=warn");
            scrap(args)
        }
        SubCommand::Inspect(args) => {
            init_logs("wikibox_crawler=warn");
            inspect(args)
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "wikibox", &mut io::stdout());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_path(name: &str) -> PathBuf {
        env::temp_dir().join(format!("wikibox-missing-{}", std::process::id())).join(name)
    }

    #[test]
    fn missing_page_error_names_the_file() {
        let path = missing_path("page.html");
        let err = scrap(ScrapArgs {
            keyword: None,
            file: Some(path.clone()),
            name: None,
            crawler_config: None,
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains(&path.display().to_string()), "{err:#}");
    }

    #[test]
    fn missing_config_error_names_the_file() {
        let path = missing_path("crawler.yaml");
        let args = Args::parse_from([
            "wikibox",
            "crawl",
            "--crawler-config",
            path.to_str().unwrap(),
        ]);
        let err = match args.cmd {
            SubCommand::Crawl(args) => CrawlerConfig::try_from(&args).unwrap_err(),
            other => panic!("Unexpected command {other:?}"),
        };
        assert!(format!("{err:#}").contains(&path.display().to_string()), "{err:#}");
    }
}
