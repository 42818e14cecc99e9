// Core functionality
pub mod core {
    pub mod config;
    pub mod error;
}

// Corpus loading and indexing
pub mod indexing {
    pub mod corpus;
    pub mod loader;
}

// Similarity, search, expansion & clustering
pub mod search {
    pub mod cluster;
    pub mod encoder;
    pub mod engine;
    pub mod expansion;
    pub mod metric;
}

// Topic-discovery sessions
pub mod session {
    pub mod ledger;
    pub mod state;
}

// Data storage
pub mod storage {
    pub mod export;
    pub mod sessions;
}

// User interfaces
pub mod ui {
    pub mod cli;
}

// Re-export commonly used types
pub use core::config::{Config, ThresholdKind, Thresholds};
pub use core::error::{Error, Result};
pub use indexing::corpus::{CorpusIndex, Document, Segment};
pub use indexing::loader::{load_corpus, IngestError, LoadedCorpus};
pub use search::cluster::{cluster, ClusterAssignment, ClusterLabel, ClusterMember};
pub use search::encoder::{Encoder, PrecomputedEncoder};
pub use search::engine::{ranked_search, search, search_formulation, FormulationSearch, SearchHit};
pub use search::expansion::expand;
pub use search::metric::{angular_distance, angular_similarity};
pub use session::ledger::{accept, sanitize, sanitize_formulation, Acceptance, SessionRecord};
pub use session::state::SessionState;
pub use storage::export::{export_session, ExportPaths};
pub use storage::sessions::SessionStore;
pub use ui::cli::Cli;
