//! Extractor A: readability article extraction

use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};
use url::Url;

use super::Candidate;
use crate::scraping::dom;

/// Run readability over `html`. Errors and panics yield `None`, which the
/// cascade treats as a zero-word candidate.
pub(super) fn extract(html: &str, url: &Url) -> Option<Candidate> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut cursor = Cursor::new(html.as_bytes());
        readability::extractor::extract(&mut cursor, url)
    }));

    match outcome {
        Ok(Ok(product)) => {
            let word_count = dom::html_word_count(&product.content);
            Some(Candidate {
                html: product.content,
                word_count,
            })
        }
        Ok(Err(e)) => {
            debug!("readability found nothing on {}: {:?}", url, e);
            None
        }
        Err(_) => {
            warn!("readability panicked on {}", url);
            None
        }
    }
}
