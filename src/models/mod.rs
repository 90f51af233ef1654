//! Domain model and wire types for the oracle routing core
//!
//! Everything in this module is either a value type owned by the caller
//! (questions, routing requests) or a wire record with a stable JSON shape
//! (routing responses, the canonical oracle request/response contract, the
//! contract-compatible structs consumed by on-chain encoders).

pub mod aggregation;
pub mod canonical;
pub mod capabilities;
pub mod contracts;
pub mod question;
pub mod routing;

pub use aggregation::{AggregatedOracleData, AggregationMethod, OracleDataPoint};
pub use canonical::{OracleRequest, OracleResponse, ResponseFormat};
pub use capabilities::{
    default_capabilities, OracleProvider, ProviderCapabilities, ResolutionMethod, UpdateFrequency,
};
pub use question::{Classification, ComparisonOp, DataCategory, MarketType, QuestionRequirements};
pub use routing::{RoutingRequest, RoutingResponse};
