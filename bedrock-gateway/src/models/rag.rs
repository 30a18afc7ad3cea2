use crate::services::providers::ChatRequest;

const RAG_SYSTEM_PROMPT: &str = "Answer the question using only the provided context documents. \
If the context does not contain the answer, say that you don't know.";

/// Wrap retrieved passages as numbered context ahead of the question.
pub fn build_rag_request(question: &str, passages: &[String]) -> ChatRequest {
    let context = if passages.is_empty() {
        "No documents matched.".to_string()
    } else {
        passages
            .iter()
            .enumerate()
            .map(|(i, passage)| format!("<document index=\"{}\">\n{}\n</document>", i + 1, passage))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let prompt = format!(
        "<context>\n{}\n</context>\n\nQuestion: {}",
        context, question
    );

    ChatRequest {
        system: Some(RAG_SYSTEM_PROMPT.to_string()),
        ..ChatRequest::single_turn(prompt)
    }
}
