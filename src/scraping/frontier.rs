//! Crawl frontier
//!
//! A single priority heap of pending URLs plus the seen-URL filter. Seeds
//! come first, then pagination links, then ordinary links; within a
//! priority class URLs leave in discovery order. The page cap is charged at
//! enqueue time, so the frontier never admits more URLs than the crawl may
//! process.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use super::urlnorm::{self, NormalizedUrl};

/// Dequeue priority class
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    Pagination,
    Seed,
}

/// A URL waiting in the frontier
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: NormalizedUrl,
    pub depth: u32,
    pub priority: Priority,
    seq: u64,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for FrontierEntry {}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier discovery
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Crawl bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontierConfig {
    /// Maximum link depth from the seed; sitemap URLs are exempt
    pub max_depth: u32,
    /// Maximum URLs admitted over the session
    pub max_pages: usize,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 100,
        }
    }
}

/// Pending queue plus seen-URL filter
pub struct Frontier {
    config: FrontierConfig,
    queue: BinaryHeap<FrontierEntry>,
    /// Every normalized URL seen this session
    seen: HashSet<String>,
    admitted: usize,
    next_seq: u64,
}

impl Frontier {
    pub fn new(config: FrontierConfig) -> Self {
        Self {
            config,
            queue: BinaryHeap::new(),
            seen: HashSet::new(),
            admitted: 0,
            next_seq: 0,
        }
    }

    pub fn config(&self) -> &FrontierConfig {
        &self.config
    }

    /// Queue a discovered URL. Returns false when it was already seen, is
    /// deeper than `max_depth` (seeds are exempt) or the page cap is spent.
    pub fn enqueue(&mut self, url: NormalizedUrl, depth: u32, priority: Priority) -> bool {
        if priority != Priority::Seed && depth > self.config.max_depth {
            return false;
        }
        self.admit(url, depth, priority)
    }

    /// Queue a sitemap URL, bypassing the depth limit
    pub fn enqueue_sitemap(&mut self, url: NormalizedUrl) -> bool {
        self.admit(url, 0, Priority::Normal)
    }

    fn admit(&mut self, url: NormalizedUrl, depth: u32, priority: Priority) -> bool {
        if self.admitted >= self.config.max_pages || self.seen(&url) {
            return false;
        }
        self.mark_seen(&url);
        self.admitted += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(FrontierEntry {
            url,
            depth,
            priority,
            seq,
        });
        true
    }

    pub fn dequeue(&mut self) -> Option<FrontierEntry> {
        self.queue.pop()
    }

    /// Record a URL as seen. Returns true if it was new.
    pub fn mark_seen(&mut self, url: &NormalizedUrl) -> bool {
        if self.seen.contains(url.as_str()) {
            return false;
        }
        self.seen.insert(url.as_str().to_string())
    }

    pub fn seen(&self, url: &NormalizedUrl) -> bool {
        self.seen.contains(url.as_str())
    }

    /// Pre-seed the seen set from a resume file, one URL per line.
    /// Lines that fail to normalize are skipped.
    pub fn load_seen(&mut self, path: &Path) -> std::io::Result<usize> {
        let reader = BufReader::new(std::fs::File::open(path)?);
        let mut loaded = 0;
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match urlnorm::normalize(line) {
                Ok(url) => {
                    if self.mark_seen(&url) {
                        loaded += 1;
                    }
                }
                Err(e) => tracing::debug!("Skipping resume entry '{}': {}", line, e),
            }
        }
        Ok(loaded)
    }

    /// Persist the seen set, one normalized URL per line, sorted
    pub fn save_seen(&self, path: &Path) -> std::io::Result<()> {
        let mut urls: Vec<&String> = self.seen.iter().collect();
        urls.sort();
        let mut writer = BufWriter::new(std::fs::File::create(path)?);
        for url in urls {
            writeln!(writer, "{}", url)?;
        }
        writer.flush()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn admitted(&self) -> usize {
        self.admitted
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new(FrontierConfig::default())
    }
}
