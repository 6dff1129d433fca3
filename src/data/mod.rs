//! Session ingestion, corpus persistence and feature preparation

pub mod circuit;
pub mod corpus;
pub mod csv_loader;
pub mod features;
pub mod normalize;
pub mod session;

// Re-export commonly used types
pub use circuit::{enhance_with_circuit_features, CircuitCatalog, CircuitFlags};
pub use corpus::{circuit_specific, current_qualifying, Corpus, CorpusBuilder, SweepProgress};
pub use features::{default_feature_columns, prepare_features};
pub use normalize::SessionNormalizer;
pub use session::{JsonSessionSource, MemorySessionSource, SessionSource};
