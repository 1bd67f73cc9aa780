//! LogCurl matching engine.
//!
//! Turns a [`CallIntent`](lc_protocol::CallIntent) into a validated curl
//! command: candidate retrieval over a spec catalog, confidence scoring,
//! selection, schema validation, rendering, and a bounded feedback loop,
//! all behind the [`Pipeline`] facade.

pub mod cache;
pub mod capability;
pub mod catalog;
pub mod config;
pub mod curl;
pub mod error;
pub mod feedback;
pub mod judge;
pub mod lexical;
pub mod matcher;
pub mod mock;
pub mod pipeline;
pub mod retriever;
pub mod scorer;
pub mod validator;

pub use cache::{CacheLookup, CacheStats, FlightGuard, ResultCache};
pub use capability::{CapabilityError, Judgment, JudgmentEngine, VectorSearch};
pub use catalog::{InMemoryCatalog, SpecCatalog};
pub use config::EngineConfig;
pub use curl::{CurlGenerator, RenderOptions, RenderedCurl};
pub use error::{CatalogError, ConfigError, EngineError, EngineResult, SessionError};
pub use feedback::{ExhaustionHistory, Session, SessionManager, SessionPhase};
pub use matcher::{MatchState, RunOptions, StateTrace};
pub use pipeline::{BatchItem, Pipeline, RunOutcome};
