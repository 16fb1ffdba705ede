//! Operator for the OpenAirInterface 5G DU, together with the `fiveg_f1`
//! relation library it shares with the CU operator.

pub mod config;
pub mod error;
pub mod host;
pub mod operator;
pub mod relation;
pub mod render;
pub mod types;
pub mod workload;

pub use relation::{F1Provides, F1Requires};
