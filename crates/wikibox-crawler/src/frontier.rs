use std::collections::{BTreeSet, HashSet};

use rand::Rng;

use crate::config::CrawlerConfig;
use crate::record::{Extraction, InfoboxRecord};

/// Keywords left to crawl in one batch.
///
/// A keyword taken out with [`Frontier::pop`] is never inserted again, except
/// through [`Frontier::requeue`].
#[derive(Debug, Clone, Default)]
pub struct Frontier {
    pending: BTreeSet<String>,
    visited: HashSet<String>,
}

impl Frontier {
    pub fn new<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut frontier = Self::default();
        frontier.extend(seeds);
        frontier
    }

    pub fn pop(&mut self) -> Option<String> {
        let keyword = self.pending.pop_first()?;
        self.visited.insert(keyword.clone());
        Some(keyword)
    }

    /// Adds an unseen keyword, returns whether it was added.
    pub fn insert(&mut self, keyword: impl Into<String>) -> bool {
        let keyword = keyword.into();
        let keyword = keyword.trim();
        if keyword.is_empty() || self.visited.contains(keyword) {
            return false;
        }
        self.pending.insert(keyword.to_string())
    }

    pub fn extend<I, S>(&mut self, keywords: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        keywords
            .into_iter()
            .map(|k| self.insert(k))
            .filter(|added| *added)
            .count()
    }

    /// Puts back an already visited keyword for another attempt.
    pub fn requeue(&mut self, keyword: &str) -> bool {
        self.visited.remove(keyword);
        self.insert(keyword)
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.pending.contains(keyword)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }
}

/// Source of the 0..=9 draw deciding whether a failed keyword gets another chance.
pub trait RequeueDraw {
    fn draw(&mut self) -> u8;
}

impl<R: Rng> RequeueDraw for R {
    fn draw(&mut self) -> u8 {
        self.random_range(0..10)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The record is complete and must be stored.
    Persist,
    /// The extraction failed and the keyword is pending again.
    Requeued,
    /// The extraction failed and the keyword is abandoned.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Update {
    pub disposition: Disposition,
    /// Number of keywords newly added to the frontier.
    pub discovered: usize,
}

/// Decides how the outcome of one keyword grows the frontier.
#[derive(Debug, Clone)]
pub struct FrontierPolicy {
    relationship_properties: Vec<String>,
    requeue_threshold: u8,
}

impl FrontierPolicy {
    pub fn new(relationship_properties: Vec<String>, requeue_threshold: u8) -> Self {
        Self {
            relationship_properties,
            requeue_threshold,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.relationship_properties.clone(),
            config.requeue_threshold,
        )
    }

    pub fn update<D>(
        &self,
        frontier: &mut Frontier,
        keyword: &str,
        extraction: &Extraction,
        draw: &mut D,
    ) -> Update
    where
        D: RequeueDraw + ?Sized,
    {
        let mut discovered = frontier.extend(extraction.related.iter().map(String::as_str));

        if extraction.record.is_empty() {
            let disposition = if draw.draw() > self.requeue_threshold {
                frontier.requeue(keyword);
                Disposition::Requeued
            } else {
                Disposition::Dropped
            };
            return Update {
                disposition,
                discovered,
            };
        }

        discovered += frontier.extend(self.relationship_keywords(&extraction.record));
        Update {
            disposition: Disposition::Persist,
            discovered,
        }
    }

    /// Keywords listed in the fields whose name contains a relationship property.
    pub fn relationship_keywords<'r>(
        &'r self,
        record: &'r InfoboxRecord,
    ) -> impl Iterator<Item = &'r str> + 'r {
        record
            .fields()
            .filter(move |(field, _)| {
                self.relationship_properties
                    .iter()
                    .any(|prop| field.contains(prop.as_str()))
            })
            .flat_map(|(_, value)| value.split('\t'))
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}
