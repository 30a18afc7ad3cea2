use super::TEXT_PLAIN_UTF8;
use crate::dtos::{JsonOrForm, SearchInput};
use crate::models::build_rag_request;
use crate::services::search::{
    build_query, extract_passages, hit_count, QueryFields, SearchQuery,
};
use crate::startup::AppState;
use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde_json::Value;
use service_core::error::AppError;

fn query_fields(state: &AppState) -> QueryFields<'_> {
    QueryFields {
        text_field: &state.config.aoss.text_field,
        vector_field: &state.config.aoss.vector_field,
    }
}

/// `GET|POST /query`: run a text or vector search and relay the raw hits.
pub async fn query(
    State(state): State<AppState>,
    JsonOrForm(input): JsonOrForm<SearchInput>,
) -> Result<Json<Value>, AppError> {
    let search = input.to_query()?;
    let index = input.index_or(&state.config.aoss.index);
    let k = input.k_or(state.config.aoss.k);
    let body = build_query(&search, &query_fields(&state), k);

    tracing::info!(
        index = %index,
        k = k,
        vector = matches!(search, SearchQuery::Vector(_)),
        "Running search"
    );

    let response = state.search_client.search(index, &body).await.map_err(|e| {
        tracing::error!(index = %index, error = %e, "Search failed");
        AppError::from(e)
    })?;

    tracing::info!(index = %index, hits = hit_count(&response), "Search completed");

    Ok(Json(response))
}

/// `GET|POST /rag-query`: retrieve passages, then answer with them as context.
///
/// The model is only invoked after the search has returned successfully.
pub async fn rag_query(
    State(state): State<AppState>,
    JsonOrForm(input): JsonOrForm<SearchInput>,
) -> Result<impl IntoResponse, AppError> {
    let question = input.question()?.to_string();
    let index = input.index_or(&state.config.aoss.index);
    let k = input.k_or(state.config.aoss.k);
    let body = build_query(
        &SearchQuery::Text(question.clone()),
        &query_fields(&state),
        k,
    );

    let response = state.search_client.search(index, &body).await.map_err(|e| {
        tracing::error!(index = %index, error = %e, "Retrieval failed");
        AppError::from(e)
    })?;

    let passages = extract_passages(&response, &state.config.aoss.text_field);
    tracing::info!(index = %index, passages = passages.len(), "Retrieved context");

    let model_id = &state.config.bedrock.haiku_model_id;
    let request = build_rag_request(&question, &passages);
    let answer = state
        .text_provider
        .generate(model_id, &request)
        .await
        .map_err(|e| {
            tracing::error!(model = %model_id, error = %e, "RAG answer failed");
            AppError::from(e)
        })?;

    tracing::info!(
        model = %model_id,
        input_tokens = ?answer.input_tokens,
        output_tokens = ?answer.output_tokens,
        "RAG answer completed"
    );

    Ok(([(header::CONTENT_TYPE, TEXT_PLAIN_UTF8)], answer.text))
}
