//! `portcall-recon`: Port-call record linkage engine.
//!
//! Pure engine crate: receives pre-loaded movement records, returns tagged output records,
//! the match ledger and a summary. No CLI or IO dependencies.
//!
//! Three matchers share one claim ledger: sequential genesis pairing of openings with
//! closings, tolerance-window linkage across two datasets, and co-occurrence
//! disambiguation of tower / towed legs.

pub mod assemble;
pub mod config;
pub mod cooccur;
pub mod derived;
pub mod engine;
pub mod error;
pub mod genesis;
pub mod group;
pub mod ledger;
pub mod model;
pub mod normalize;
pub mod store;
pub mod summary;
pub mod tolerance;

pub use config::{GroupingConfig, Mode, ReconConfig};
pub use engine::run;
pub use error::ReconError;
pub use model::{MovementRecord, OutputRecord, ReconInput, ReconResult, Role};
pub use normalize::{normalize, KeyKind};
