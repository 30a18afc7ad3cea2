//! Search index abstraction (OpenSearch Serverless).

pub mod aoss;
pub mod mock;
pub mod signer;

use async_trait::async_trait;
use serde_json::{json, Value};
use service_core::error::AppError;
use thiserror::Error;

/// Error type for search operations.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Credentials unavailable: {0}")]
    Credentials(String),

    #[error("Request signing failed: {0}")]
    Signing(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::RateLimited => {
                AppError::TooManyRequests("Search request throttled".to_string(), None)
            }
            SearchError::IndexNotFound(index) => {
                AppError::NotFound(anyhow::anyhow!("Index not found: {}", index))
            }
            SearchError::InvalidQuery(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            SearchError::Credentials(msg) | SearchError::AccessDenied(msg) => {
                AppError::ServiceUnavailable(msg)
            }
            SearchError::Signing(msg) => {
                AppError::InternalError(anyhow::anyhow!("Request signing failed: {}", msg))
            }
            SearchError::ApiError(msg) | SearchError::NetworkError(msg) => {
                AppError::BadGateway(msg)
            }
        }
    }
}

/// Trait for document/vector index backends.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Run an OpenSearch `_search` request and return the raw response body.
    async fn search(&self, index: &str, body: &Value) -> Result<Value, SearchError>;
}

/// What the caller is searching with.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchQuery {
    Text(String),
    Vector(Vec<f32>),
}

/// Document fields the queries target.
#[derive(Debug, Clone)]
pub struct QueryFields<'a> {
    pub text_field: &'a str,
    pub vector_field: &'a str,
}

/// Build the `_search` body for `query`, returning at most `k` hits.
///
/// The embedding field is excluded from `_source` so relayed hits stay small.
pub fn build_query(query: &SearchQuery, fields: &QueryFields<'_>, k: usize) -> Value {
    let clause = match query {
        SearchQuery::Text(text) => json!({
            "match": { fields.text_field: { "query": text } }
        }),
        SearchQuery::Vector(vector) => json!({
            "knn": { fields.vector_field: { "vector": vector, "k": k } }
        }),
    };

    json!({
        "size": k,
        "query": clause,
        "_source": { "excludes": [fields.vector_field] }
    })
}

/// Pull `_source.<text_field>` out of every hit, in rank order.
pub fn extract_passages(response: &Value, text_field: &str) -> Vec<String> {
    response["hits"]["hits"]
        .as_array()
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit["_source"][text_field].as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Number of hits in a `_search` response.
pub fn hit_count(response: &Value) -> usize {
    response["hits"]["hits"]
        .as_array()
        .map(Vec::len)
        .unwrap_or(0)
}

/// Reject index names that OpenSearch would refuse or that would escape the
/// `/<index>/_search` path.
pub fn validate_index_name(index: &str) -> Result<(), SearchError> {
    const FORBIDDEN: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ' ', ',', '#', ':'];

    let invalid = index.is_empty()
        || index == "."
        || index == ".."
        || index.starts_with(&['_', '-', '+'][..])
        || index.chars().any(|c| FORBIDDEN.contains(&c) || c.is_uppercase());

    if invalid {
        return Err(SearchError::InvalidQuery(format!(
            "Invalid index name: {}",
            index
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: QueryFields<'static> = QueryFields {
        text_field: "text",
        vector_field: "vector_field",
    };

    #[test]
    fn test_text_query_uses_match() {
        let body = build_query(&SearchQuery::Text("bedrock pricing".into()), &FIELDS, 3);

        assert_eq!(body["size"], 3);
        assert_eq!(body["query"]["match"]["text"]["query"], "bedrock pricing");
        assert_eq!(body["_source"]["excludes"][0], "vector_field");
    }

    #[test]
    fn test_vector_query_uses_knn() {
        let body = build_query(&SearchQuery::Vector(vec![0.5, -1.0]), &FIELDS, 2);

        assert_eq!(body["query"]["knn"]["vector_field"]["k"], 2);
        assert_eq!(
            body["query"]["knn"]["vector_field"]["vector"],
            json!([0.5, -1.0])
        );
    }

    #[test]
    fn test_extract_passages_keeps_rank_order() {
        let response = json!({
            "hits": {
                "total": {"value": 3},
                "hits": [
                    {"_id": "a", "_score": 2.0, "_source": {"text": "first"}},
                    {"_id": "b", "_score": 1.5, "_source": {"title": "no text"}},
                    {"_id": "c", "_score": 1.0, "_source": {"text": "third"}}
                ]
            }
        });

        assert_eq!(extract_passages(&response, "text"), vec!["first", "third"]);
        assert_eq!(hit_count(&response), 3);
    }

    #[test]
    fn test_extract_passages_without_hits() {
        assert!(extract_passages(&json!({}), "text").is_empty());
        assert_eq!(hit_count(&json!({"hits": {}})), 0);
    }

    #[test]
    fn test_index_name_validation() {
        assert!(validate_index_name("demo").is_ok());
        assert!(validate_index_name("movies-2024").is_ok());
        assert!(validate_index_name("").is_err());
        assert!(validate_index_name("..").is_err());
        assert!(validate_index_name("_cat").is_err());
        assert!(validate_index_name("demo/_doc").is_err());
        assert!(validate_index_name("Demo").is_err());
    }
}
