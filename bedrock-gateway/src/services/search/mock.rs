//! Mock search client for testing.

use super::{SearchClient, SearchError};
use crate::services::providers::mock::CallLog;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Mock search client answering every query with a canned `_search` body.
pub struct MockSearchClient {
    response: Value,
    failure: Option<fn() -> SearchError>,
    delay: Duration,
    calls: AtomicUsize,
    last_query: Mutex<Option<(String, Value)>>,
    log: CallLog,
}

impl MockSearchClient {
    pub fn new(response: Value) -> Self {
        Self {
            response,
            failure: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_query: Mutex::new(None),
            log: CallLog::default(),
        }
    }

    /// Answer with hits whose text field holds `passages`, in order.
    pub fn with_passages(text_field: &str, passages: &[&str]) -> Self {
        let hits: Vec<Value> = passages
            .iter()
            .enumerate()
            .map(|(i, text)| {
                json!({
                    "_id": i.to_string(),
                    "_score": 1.0 / (i as f64 + 1.0),
                    "_source": { text_field: text }
                })
            })
            .collect();

        Self::new(json!({
            "took": 1,
            "hits": { "total": { "value": hits.len() }, "hits": hits }
        }))
    }

    pub fn failing(failure: fn() -> SearchError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::new(Value::Null)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Index and body of the most recent query.
    pub fn last_query(&self) -> Option<(String, Value)> {
        self.last_query.lock().ok().and_then(|q| q.clone())
    }
}

#[async_trait]
impl SearchClient for MockSearchClient {
    async fn search(&self, index: &str, body: &Value) -> Result<Value, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_query.lock() {
            *last = Some((index.to_string(), body.clone()));
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.failure {
            Some(failure) => {
                self.log.record("search:failed");
                Err(failure())
            }
            None => {
                self.log.record(format!("search:{}", index));
                Ok(self.response.clone())
            }
        }
    }
}
