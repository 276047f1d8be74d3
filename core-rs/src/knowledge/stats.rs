// knowledge/stats.rs - Knowledge-graph counters read from LightRAG storage files

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::drivers::read_json;
use crate::library::BucketStats;

pub const VDB_ENTITIES_FILE: &str = "vdb_entities.json";
pub const VDB_RELATIONSHIPS_FILE: &str = "vdb_relationships.json";
pub const VDB_CHUNKS_FILE: &str = "vdb_chunks.json";
/// Older LightRAG releases kept the whole graph in one file
pub const LEGACY_GRAPH_FILE: &str = "graph_chunk_entity_relation.json";

/// Entity, relationship and document counts of one bucket
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphStats {
    pub entities: u64,
    pub relationships: u64,
    pub documents: u64,
}

impl From<GraphStats> for BucketStats {
    fn from(stats: GraphStats) -> Self {
        BucketStats {
            document_count: stats.documents,
            entity_count: stats.entities,
            relationship_count: stats.relationships,
        }
    }
}

fn collection_len(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Array(items)) => items.len() as u64,
        Some(Value::Object(map)) => map.len() as u64,
        _ => 0,
    }
}

/// Length of the `data` collection in a vector-db file; 0 when absent or unreadable
fn count_vdb_rows(path: &Path) -> u64 {
    if !path.exists() {
        return 0;
    }
    match read_json::<Value>(path) {
        Ok(json) => collection_len(json.get("data")),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "ignoring unreadable vector store");
            0
        }
    }
}

/// Count entities, relationships and document chunks in `bucket_dir`
///
/// Falls back to the legacy graph file when the vector stores report
/// neither entities nor relationships.
pub fn graph_stats(bucket_dir: &Path) -> GraphStats {
    let mut stats = GraphStats {
        entities: count_vdb_rows(&bucket_dir.join(VDB_ENTITIES_FILE)),
        relationships: count_vdb_rows(&bucket_dir.join(VDB_RELATIONSHIPS_FILE)),
        documents: count_vdb_rows(&bucket_dir.join(VDB_CHUNKS_FILE)),
    };

    if stats.entities == 0 && stats.relationships == 0 {
        let legacy = bucket_dir.join(LEGACY_GRAPH_FILE);
        if legacy.exists() {
            if let Ok(graph) = read_json::<Value>(&legacy) {
                stats.entities = collection_len(graph.get("entities"));
                stats.relationships = collection_len(graph.get("relationships"));
            }
        }
    }

    stats
}
