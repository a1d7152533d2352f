use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fetcher::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub proxies: Vec<String>,

    /// Request timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: f32,

    /// Number of attempts made after the first failed one
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Delay in seconds between two attempts
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f32,

    /// Whether 5xx and 429 responses are retried like transport failures
    #[serde(default = "default_retry_on_server_error")]
    pub retry_on_server_error: bool,

    /// Delay in seconds after each fetched keyword
    #[serde(default = "default_pacing_delay")]
    pub pacing_delay: f32,

    /// Delay in seconds between two batch worker starts
    #[serde(default = "default_stagger_delay")]
    pub stagger_delay: f32,

    #[serde(default = "default_batch_size")]
    pub batch_size: NonZeroUsize,

    /// A failed keyword is re-enqueued when a 0..=9 draw is above this value
    #[serde(default = "default_requeue_threshold")]
    pub requeue_threshold: u8,

    #[serde(default = "default_relationship_properties")]
    pub relationship_properties: Vec<String>,

    #[serde(default)]
    pub markers: Markers,

    #[serde(default = "default_on_batch_error")]
    pub on_batch_error: OnError,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            proxies: Vec::new(),
            fetch_timeout: default_fetch_timeout(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            retry_on_server_error: default_retry_on_server_error(),
            pacing_delay: default_pacing_delay(),
            stagger_delay: default_stagger_delay(),
            batch_size: default_batch_size(),
            requeue_threshold: default_requeue_threshold(),
            relationship_properties: default_relationship_properties(),
            markers: Markers::default(),
            on_batch_error: default_on_batch_error(),
        }
    }
}

impl CrawlerConfig {
    /// Page URL of a keyword: spaces become underscores, the rest is percent-encoded.
    pub fn page_url(&self, keyword: &str) -> String {
        let title = keyword.trim().replace(' ', "_");
        format!("{}{}", self.base_url, urlencoding::encode(&title))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: seconds(self.retry_delay),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        seconds(self.fetch_timeout)
    }

    pub fn pacing_delay(&self) -> Duration {
        seconds(self.pacing_delay)
    }

    pub fn stagger_delay(&self) -> Duration {
        seconds(self.stagger_delay)
    }
}

fn seconds(secs: f32) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f32(secs)
    } else {
        Duration::ZERO
    }
}

fn default_base_url() -> String {
    String::from("https://en.wikipedia.org/wiki/")
}

fn default_user_agent() -> String {
    String::from("WikiboxBot")
}

fn default_fetch_timeout() -> f32 {
    15.0
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_delay() -> f32 {
    1.0
}

fn default_retry_on_server_error() -> bool {
    true
}

fn default_pacing_delay() -> f32 {
    2.0
}

fn default_stagger_delay() -> f32 {
    1.0
}

fn default_batch_size() -> NonZeroUsize {
    NonZeroUsize::new(4).unwrap()
}

fn default_requeue_threshold() -> u8 {
    6
}

fn default_relationship_properties() -> Vec<String> {
    ["Preceding", "Parent ", "Child "]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_on_batch_error() -> OnError {
    OnError::SkipAndLog
}

/// CSS selectors locating the structured blocks of a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Markers {
    #[serde(default = "default_infobox")]
    pub infobox: String,

    #[serde(default = "default_related_links")]
    pub related_links: String,

    #[serde(default = "default_item_list")]
    pub item_list: String,

    /// Related link titles starting with this prefix are index pages
    #[serde(default = "default_excluded_title_prefix")]
    pub excluded_title_prefix: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            infobox: default_infobox(),
            related_links: default_related_links(),
            item_list: default_item_list(),
            excluded_title_prefix: default_excluded_title_prefix(),
        }
    }
}

fn default_infobox() -> String {
    String::from("table.infobox")
}

fn default_related_links() -> String {
    String::from("table.nowraplinks.navbox-subgroup")
}

fn default_item_list() -> String {
    String::from("div.plainlist")
}

fn default_excluded_title_prefix() -> String {
    String::from("List")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ArgEnum))]
pub enum OnError {
    Fail,
    SkipAndLog,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_url_escapes_keyword() {
        let conf = CrawlerConfig::default();
        assert_eq!(
            conf.page_url(" United States Department of Defense "),
            "https://en.wikipedia.org/wiki/United_States_Department_of_Defense"
        );
        assert_eq!(
            conf.page_url("AT&T"),
            "https://en.wikipedia.org/wiki/AT%26T"
        );
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let conf: CrawlerConfig = serde_json::from_str(r#"{"batchSize": 2, "pacingDelay": 0}"#)
            .expect("valid config");
        assert_eq!(conf.batch_size.get(), 2);
        assert_eq!(conf.pacing_delay(), Duration::ZERO);
        assert_eq!(conf.max_retries, 3);
        assert_eq!(conf.markers.infobox, "table.infobox");
        assert_eq!(conf.on_batch_error, OnError::SkipAndLog);
    }

    #[test]
    fn defaults_match_documented_values() {
        let conf = CrawlerConfig::default();
        assert_eq!(conf.batch_size.get(), 4);
        assert_eq!(conf.requeue_threshold, 6);
        assert_eq!(conf.pacing_delay(), Duration::from_secs(2));
        assert_eq!(conf.stagger_delay(), Duration::from_secs(1));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(serde_json::from_str::<CrawlerConfig>(r#"{"batchSize": 0}"#).is_err());
    }
}
