//! Content deduplication
//!
//! A page's fingerprint is a truncated SHA-256 over the first characters of
//! its extracted text. The set of seen fingerprints lives for one crawl
//! session; the first URL to present a fingerprint keeps it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// Fixed-length content digest (first 8 bytes of SHA-256)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 8]);

impl Fingerprint {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Deduplication thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Characters of text that feed the digest
    pub prefix_chars: usize,
    /// Texts shorter than this are never fingerprinted
    pub min_chars: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            prefix_chars: 5000,
            min_chars: 100,
        }
    }
}

/// Digest the first `prefix_chars` characters of `text`
pub fn fingerprint(text: &str, prefix_chars: usize) -> Fingerprint {
    let end = text
        .char_indices()
        .nth(prefix_chars)
        .map_or(text.len(), |(i, _)| i);
    let digest = Sha256::digest(text[..end].as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    Fingerprint(bytes)
}

/// Result of checking one text against the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupOutcome {
    /// First sighting, now recorded
    Unique(Fingerprint),
    /// Seen before; `first_url` keeps it
    Duplicate {
        fingerprint: Fingerprint,
        first_url: String,
    },
    /// Too short to fingerprint
    Skipped,
}

/// Session-scoped content deduplicator, safe to share across workers
pub struct ContentDeduplicator {
    config: DedupConfig,
    seen: Mutex<HashMap<Fingerprint, String>>,
}

impl ContentDeduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            config,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Fingerprint `text`, or `None` when it is below the minimum length
    pub fn fingerprint(&self, text: &str) -> Option<Fingerprint> {
        let trimmed = text.trim();
        if trimmed.chars().count() < self.config.min_chars {
            return None;
        }
        Some(fingerprint(trimmed, self.config.prefix_chars))
    }

    pub fn is_duplicate(&self, fp: &Fingerprint) -> bool {
        self.seen.lock().contains_key(fp)
    }

    /// Record `fp` for `url`. Returns false if it was already present.
    pub fn record(&self, fp: Fingerprint, url: &str) -> bool {
        let mut seen = self.seen.lock();
        if seen.contains_key(&fp) {
            return false;
        }
        seen.insert(fp, url.to_string());
        true
    }

    /// Check and record under one lock, so two workers can never both win
    pub fn check_and_record(&self, text: &str, url: &str) -> DedupOutcome {
        let Some(fp) = self.fingerprint(text) else {
            return DedupOutcome::Skipped;
        };

        let mut seen = self.seen.lock();
        match seen.get(&fp) {
            Some(first) => DedupOutcome::Duplicate {
                fingerprint: fp,
                first_url: first.clone(),
            },
            None => {
                seen.insert(fp, url.to_string());
                DedupOutcome::Unique(fp)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    pub fn clear(&self) {
        self.seen.lock().clear();
    }
}

impl Default for ContentDeduplicator {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}
