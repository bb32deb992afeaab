//! Query endpoint: retrieval-only search or grounded question answering

use axum::extract::State;
use axum::Json;
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::generation::{extract_and_link_citations, PromptBuilder};
use crate::server::state::AppState;
use crate::storage::StoredChunk;
use crate::types::query::{QueryMode, QueryRequest};
use crate::types::response::{Citation, QueryResponse, SearchHit};

pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(Error::Config("Question must not be empty".to_string()));
    }

    let started = Instant::now();
    let base = state.bases().get(&request.base)?;

    let query_vector = state.embedder().embed(question).await?;

    // Over-fetch so a document filter still leaves enough hits. The first
    // search over a large base builds the HNSW graph, so keep it off the
    // async runtime.
    let fetch_k = request.top_k.saturating_mul(2).max(request.top_k);
    let threshold = request.similarity_threshold;
    let search_base = base.clone();
    let matches = tokio::task::spawn_blocking(move || {
        search_base
            .index
            .lock()
            .search(&query_vector, fetch_k, threshold)
    })
    .await
    .map_err(|e| Error::internal(format!("Search task failed: {}", e)))??;

    let matches: Vec<_> = match &request.document_filter {
        Some(allowed) => matches
            .into_iter()
            .filter(|m| allowed.contains(&m.document_id))
            .collect(),
        None => matches,
    };

    if matches.is_empty() {
        let elapsed = started.elapsed().as_millis() as u64;
        tracing::info!(base = %request.base, mode = ?request.mode, "Query matched nothing");
        return Ok(Json(QueryResponse::not_found(elapsed)));
    }

    let scores: HashMap<Uuid, f32> = matches.iter().map(|m| (m.chunk_id, m.score)).collect();
    let chunk_ids: Vec<Uuid> = matches.iter().map(|m| m.chunk_id).collect();

    let mut scored: Vec<(StoredChunk, f32)> = base
        .db
        .get_chunks_by_ids(&chunk_ids)?
        .into_iter()
        .map(|stored| {
            let score = scores.get(&stored.chunk.id).copied().unwrap_or(0.0);
            (stored, score)
        })
        .collect();
    scored.truncate(request.top_k);

    let response = match request.mode {
        QueryMode::Search => search_response(&request, &scored, started),
        QueryMode::Qa => qa_response(&state, &base.db, question, &request, &scored, started).await?,
    };

    tracing::info!(
        base = %request.base,
        mode = ?request.mode,
        chunks = response.chunks_retrieved,
        elapsed_ms = response.processing_time_ms,
        "Query answered"
    );
    Ok(Json(response))
}

fn search_response(
    request: &QueryRequest,
    scored: &[(StoredChunk, f32)],
    started: Instant,
) -> QueryResponse {
    let hits: Vec<SearchHit> = scored
        .iter()
        .map(|(stored, score)| SearchHit {
            chunk_id: stored.chunk.id,
            document_id: stored.chunk.document_id,
            filename: stored.filename.clone(),
            page_number: stored.chunk.source.page_number,
            content: stored.chunk.content.clone(),
            similarity: *score,
        })
        .collect();

    let confidence = if hits.is_empty() {
        0.0
    } else {
        hits.iter().map(|h| h.similarity).sum::<f32>() / hits.len() as f32
    };

    QueryResponse {
        answer: String::new(),
        citations: Vec::new(),
        chunks_retrieved: hits.len(),
        hits,
        confidence,
        processing_time_ms: started.elapsed().as_millis() as u64,
        raw_chunks: raw_chunks(request, scored),
    }
}

async fn qa_response(
    state: &AppState,
    db: &crate::storage::BaseDb,
    question: &str,
    request: &QueryRequest,
    scored: &[(StoredChunk, f32)],
    started: Instant,
) -> Result<QueryResponse> {
    let terms: Vec<&str> = question.split_whitespace().collect();
    let mut citations: Vec<Citation> = scored
        .iter()
        .map(|(stored, score)| {
            let mut citation = Citation::from_chunk(&stored.chunk, *score);
            citation.highlight_terms(&terms);
            citation
        })
        .collect();

    let context = PromptBuilder::build_context(scored);

    // Oldest turn first for the prompt
    let mut history: Vec<(String, String)> = db
        .recent_history(3)?
        .into_iter()
        .map(|entry| (entry.question, entry.answer))
        .collect();
    history.reverse();

    let raw_answer = state
        .llm()
        .generate_with_history(question, &context, &citations, &history)
        .await?;

    let (answer, used_citations) = extract_and_link_citations(&raw_answer, &mut citations);
    db.add_chat_entry(question, &answer, request.mode)?;

    let mut response = QueryResponse::new(
        answer,
        used_citations,
        started.elapsed().as_millis() as u64,
    );
    response.chunks_retrieved = scored.len();
    response.raw_chunks = raw_chunks(request, scored);
    Ok(response)
}

fn raw_chunks(
    request: &QueryRequest,
    scored: &[(StoredChunk, f32)],
) -> Option<Vec<crate::types::document::Chunk>> {
    if request.include_chunks {
        Some(scored.iter().map(|(s, _)| s.chunk.clone()).collect())
    } else {
        None
    }
}
