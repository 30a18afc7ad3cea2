use crate::services::search::SearchQuery;
use serde::Deserialize;
use service_core::error::AppError;

/// Upper bound on hits per query.
pub const MAX_K: usize = 100;

/// Query posted to `/query` and `/rag-query`.
#[derive(Debug, Default, Deserialize)]
pub struct SearchInput {
    #[serde(default, alias = "query", alias = "question")]
    pub q: Option<String>,
    pub vector: Option<VectorInput>,
    pub index: Option<String>,
    pub k: Option<usize>,
}

/// A query vector, either a JSON array or comma-separated floats from a form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum VectorInput {
    List(Vec<f32>),
    Csv(String),
}

impl VectorInput {
    pub fn into_vec(self) -> Result<Vec<f32>, AppError> {
        let vector = match self {
            VectorInput::List(values) => values,
            VectorInput::Csv(text) => text
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| {
                    part.parse::<f32>().map_err(|_| {
                        AppError::BadRequest(anyhow::anyhow!("Invalid vector component: {}", part))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        if vector.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!("Vector is empty")));
        }
        Ok(vector)
    }
}

impl SearchInput {
    /// Non-empty question text.
    pub fn question(&self) -> Result<&str, AppError> {
        self.q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Query text `q` is required")))
    }

    /// The query to run; a vector takes precedence over text.
    pub fn to_query(&self) -> Result<SearchQuery, AppError> {
        match &self.vector {
            Some(vector) => Ok(SearchQuery::Vector(vector.clone().into_vec()?)),
            None => Ok(SearchQuery::Text(self.question()?.to_string())),
        }
    }

    pub fn index_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.index
            .as_deref()
            .map(str::trim)
            .filter(|index| !index.is_empty())
            .unwrap_or(default)
    }

    pub fn k_or(&self, default: usize) -> usize {
        self.k.filter(|k| *k > 0).unwrap_or(default).min(MAX_K)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_query() {
        let input = SearchInput {
            q: Some("  what is bedrock ".into()),
            ..Default::default()
        };
        assert_eq!(
            input.to_query().unwrap(),
            SearchQuery::Text("what is bedrock".into())
        );
    }

    #[test]
    fn test_vector_from_json_array_wins_over_text() {
        let input: SearchInput = serde_json::from_value(json!({
            "q": "ignored",
            "vector": [0.25, 0.5]
        }))
        .unwrap();
        assert_eq!(
            input.to_query().unwrap(),
            SearchQuery::Vector(vec![0.25, 0.5])
        );
    }

    #[test]
    fn test_vector_from_csv() {
        let input: SearchInput = serde_json::from_value(json!({"vector": "1, 2.5,-3"})).unwrap();
        assert_eq!(
            input.to_query().unwrap(),
            SearchQuery::Vector(vec![1.0, 2.5, -3.0])
        );
    }

    #[test]
    fn test_bad_vector_and_missing_text_are_rejected() {
        let bad: SearchInput = serde_json::from_value(json!({"vector": "1,abc"})).unwrap();
        assert!(bad.to_query().is_err());

        let empty: SearchInput = serde_json::from_value(json!({"vector": []})).unwrap();
        assert!(empty.to_query().is_err());

        assert!(SearchInput::default().to_query().is_err());
    }

    #[test]
    fn test_index_and_k_defaults() {
        let input = SearchInput::default();
        assert_eq!(input.index_or("demo"), "demo");
        assert_eq!(input.k_or(5), 5);

        let input = SearchInput {
            index: Some("movies".into()),
            k: Some(1000),
            ..Default::default()
        };
        assert_eq!(input.index_or("demo"), "movies");
        assert_eq!(input.k_or(5), MAX_K);
    }
}
