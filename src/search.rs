use tracing::{error, info};

use crate::model::{EnrichedResult, SearchChunksRequest, SearchFilter, SearchResponse, SearchSettings};
use crate::session::SessionGuard;

/// Search pipeline: session check, hybrid search, then per-hit chunk retrieval.
pub struct SearchPipeline {
    session: SessionGuard,
}

impl SearchPipeline {
    pub fn new(session: SessionGuard) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionGuard {
        &self.session
    }

    /// Never fails: a failed search call becomes the `error` field of the response,
    /// and hits whose retrieval fails are dropped.
    pub async fn search(&self, request: SearchChunksRequest) -> SearchResponse {
        let session = self.session.ensure_valid_session().await;
        let bearer = session.bearer.as_deref();
        let client = self.session.client();

        let filter = SearchFilter::from_file_ids(request.file_ids.as_deref());
        let settings = SearchSettings::hybrid(filter, request.limit);

        let hits = match client.search_chunks(bearer, &request.query, &settings).await {
            Ok(hits) => hits,
            Err(e) => {
                error!("R2R search error: {e}");
                return SearchResponse::failed(request.query, e.to_string());
            }
        };

        let mut results = Vec::with_capacity(hits.len());
        for hit in &hits {
            match client.retrieve_chunk(bearer, &hit.id).await {
                Ok(chunk) => {
                    info!(
                        "retrieved chunk {} from document {} ({} chars)",
                        hit.id,
                        hit.document_id,
                        chunk.text.len()
                    );
                    results.push(EnrichedResult::from_hit(hit, chunk));
                }
                Err(e) => {
                    error!("error retrieving chunk {}: {e}", hit.id);
                }
            }
        }

        SearchResponse::ok(request.query, results)
    }
}
