use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// search_chunks 工具的入参。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchChunksRequest {
    pub query: String,
    #[serde(default)]
    pub file_ids: Option<Vec<String>>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    5
}

impl SearchChunksRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            file_ids: None,
            limit: default_limit(),
        }
    }
}

/// 检索范围过滤。空集合等价于不过滤。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub document_ids: Vec<String>,
}

impl SearchFilter {
    pub fn from_file_ids(file_ids: Option<&[String]>) -> Self {
        Self {
            document_ids: file_ids.map(<[String]>::to_vec).unwrap_or_default(),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.document_ids.is_empty()
    }

    pub fn to_value(&self) -> Value {
        if self.is_unrestricted() {
            Value::Object(Map::new())
        } else {
            json!({ "document_id": { "$in": self.document_ids } })
        }
    }
}

impl Serialize for SearchFilter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchSettings {
    pub use_hybrid_search: bool,
    pub filters: SearchFilter,
    pub search_limit: u32,
}

impl SearchSettings {
    pub fn hybrid(filters: SearchFilter, search_limit: u32) -> Self {
        Self {
            use_hybrid_search: true,
            filters,
            search_limit,
        }
    }
}

/// 搜索命中：只关心 id、所属文档和 metadata 中的分数。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchHit {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "id_string")]
    pub document_id: String,
    #[serde(default)]
    pub metadata: Value,
}

impl SearchHit {
    pub fn relevance(&self) -> f64 {
        self.metadata
            .get("search_score")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkRecord {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "id_string")]
    pub document_id: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub text: String,
}

fn text_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts string or numeric identifiers and treats null as empty.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedResult {
    pub document_id: String,
    pub chunk_id: String,
    pub text: String,
    pub score: f64,
}

impl EnrichedResult {
    pub fn from_hit(hit: &SearchHit, chunk: ChunkRecord) -> Self {
        Self {
            document_id: hit.document_id.clone(),
            chunk_id: hit.id.clone(),
            text: chunk.text,
            score: hit.relevance(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<EnrichedResult>,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResponse {
    pub fn ok(query: impl Into<String>, results: Vec<EnrichedResult>) -> Self {
        Self {
            query: query.into(),
            total: results.len(),
            results,
            error: None,
        }
    }

    pub fn failed(query: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            results: Vec::new(),
            total: 0,
            error: Some(error.into()),
        }
    }
}
