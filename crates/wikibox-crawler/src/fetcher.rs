use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;

use crate::config::CrawlerConfig;
use crate::shutdown::Shutdown;

/// A single attempt at downloading a page.
pub trait Fetch {
    fn fetch(&self, url: &str) -> Result<String>;
}

impl<T> Fetch for T
where
    T: Fn(&str) -> Result<String>,
{
    fn fetch(&self, url: &str) -> Result<String> {
        self(url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub delay: Duration,
}

/// Downloads `url` with at most `1 + max_retries` attempts.
///
/// Exhausted retries and shutdown both yield `None`, which callers treat as
/// an unparseable page.
pub fn fetch_with_retry<F>(
    fetcher: &F,
    url: &str,
    policy: RetryPolicy,
    shutdown: &Shutdown,
) -> Option<String>
where
    F: Fetch + ?Sized,
{
    let mut retries_left = policy.max_retries;
    loop {
        if shutdown.is_triggered() {
            return None;
        }
        match fetcher.fetch(url) {
            Ok(page) => return Some(page),
            Err(e) => {
                log::warn!("Failed and retry = {retries_left} to download url {url} got: {e}");
                if retries_left == 0 {
                    log::error!("Giving up on url {url}");
                    return None;
                }
                retries_left -= 1;
                if !shutdown.sleep(policy.delay) {
                    return None;
                }
            }
        }
    }
}

/// HTTP fetcher going through a randomly picked proxy for each attempt.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    clients: Vec<Client>,
    retry_on_server_error: bool,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let builder = || {
            Client::builder()
                .user_agent(config.user_agent.as_str())
                .timeout(config.fetch_timeout())
                .gzip(true)
                .deflate(true)
        };

        let clients = if config.proxies.is_empty() {
            vec![builder().no_proxy().build()?]
        } else {
            config
                .proxies
                .iter()
                .map(|proxy| -> Result<Client> {
                    Ok(builder().proxy(reqwest::Proxy::all(proxy)?).build()?)
                })
                .collect::<Result<Vec<_>>>()?
        };

        Ok(Self {
            clients,
            retry_on_server_error: config.retry_on_server_error,
        })
    }

    fn pick_client(&self) -> &Client {
        &self.clients[rand::random_range(0..self.clients.len())]
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        let resp = self.pick_client().get(url).send()?;
        let status = resp.status();
        if self.retry_on_server_error
            && (status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS)
        {
            bail!("Got status {status} for {url}");
        }
        Ok(resp.text()?)
    }
}

/// Reads a proxy list, one address per line.
pub fn load_proxies<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let proxies = fs_err::read_to_string(path.as_ref())?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect();
    Ok(proxies)
}
