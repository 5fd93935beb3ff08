pub mod elasticsearch;
pub mod error;
pub mod memory_bm25;
pub mod memory_vector;
pub mod milvus;
pub mod traits;

pub use elasticsearch::ElasticsearchTextIndex;
pub use error::IndexError;
pub use memory_bm25::InMemoryBm25Index;
pub use memory_vector::InMemoryVectorIndex;
pub use milvus::MilvusVectorIndex;
pub use traits::{ScoredHit, TextDoc, TextIndex, VectorDoc, VectorIndex};
