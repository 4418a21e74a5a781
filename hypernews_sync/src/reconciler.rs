//! Extraction of structured article results embedded in agent replies.

use std::sync::{Mutex, PoisonError};

use hypernews_core::ArticleResult;
use serde_json::Value;
use tracing::debug;

/// Decodes the opaque `items` payload of an agent reply into article
/// references and republishes the latest decode as display state.
///
/// Never errors out of [`reconcile`](Self::reconcile): a payload that
/// is not a result list is "no results" (`None`), which the surface
/// renders as the default feed. An empty list is distinct: it renders
/// as "no matches".
#[derive(Debug, Default)]
pub struct SearchResultReconciler {
    latest: Mutex<Option<Vec<ArticleResult>>>,
}

impl SearchResultReconciler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts a structured decode of `raw` and records the outcome.
    pub fn reconcile(&self, raw: &str) -> Option<Vec<ArticleResult>> {
        let decoded = decode(raw);
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = decoded.clone();
        decoded
    }

    /// The most recent decode, independent of conversation persistence.
    #[must_use]
    pub fn latest(&self) -> Option<Vec<ArticleResult>> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn decode(raw: &str) -> Option<Vec<ArticleResult>> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            debug!("result payload is not valid json: {e}");
            return None;
        }
    };

    // A non-sequence payload means the reply carried plain text, not
    // results.
    let entries = value.as_array()?;

    let mut results = Vec::new();
    for entry in entries {
        if let Some(article) = article_from(entry) {
            results.push(article);
        } else if let Some(embedded) = card_articles(entry) {
            results.extend(embedded);
        }
    }
    Some(results)
}

/// `uid` is the display key; an entry without one is dropped rather
/// than displayed. Other fields default to empty. Both plain and
/// `Article.`-prefixed field names appear on the wire.
fn article_from(value: &Value) -> Option<ArticleResult> {
    let uid = value.get("uid")?.as_str()?.to_string();
    let text = |plain: &str, prefixed: &str| {
        value
            .get(plain)
            .or_else(|| value.get(prefixed))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Some(ArticleResult {
        uid,
        title: text("title", "Article.title"),
        abstract_: text("abstract", "Article.abstract"),
        url: text("url", "Article.url"),
    })
}

/// Agent replies may carry article lists inside card items:
/// `{"type":"card","card":{"content":{"articles":[...]}}}`.
fn card_articles(value: &Value) -> Option<Vec<ArticleResult>> {
    if value.get("type").and_then(Value::as_str) != Some("card") {
        return None;
    }
    let articles = value
        .get("card")?
        .get("content")?
        .get("articles")?
        .as_array()?;
    Some(articles.iter().filter_map(article_from).collect())
}
