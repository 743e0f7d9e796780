//! Resolvers — turn a query embedding into the passages handed to generation.
//!
//! Retrieval is a maximal-marginal-relevance pass over the store's vector
//! candidates, with relevance boosted by document priority.

pub mod mmr;
pub mod types;

pub use mmr::MmrRetriever;
pub use types::*;
