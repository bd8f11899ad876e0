//! Term-document indexing and bag-of-concepts ranking.

pub mod config;
pub mod error;
pub mod features;
pub mod persist;
pub mod ranker;
pub mod store;
pub mod term_index;
pub mod tokenizer;

pub use config::{CorpusConfig, FeatureConfig, LinkWeighting, PruneConfig, RankerConfig};
pub use error::{Error, Result};
pub use features::FeatureSet;
pub use ranker::{ConceptMatch, ConceptRanker, SearchResult};
pub use store::{ConceptStore, MemoryConceptStore, PageId, SledConceptStore, TermId};
pub use term_index::{LookupPolicy, TermIndex, TermIndexOptions, WeightMode};
pub use tokenizer::Tokenizer;
