//! Greek COVID-19 open data: CSV sources into a relational store.
//!
//! The pipeline is parse → decode → normalize → upsert. [`service::Ingestor`]
//! drives it; [`scheduler::PeriodicIngest`] repeats it on a timer.

pub mod cancel;
pub mod config;
pub mod error;
pub mod header_date;
pub mod iso_week;
pub mod model;
pub mod normalize;
pub mod reference;
pub mod scheduler;
pub mod service;
pub mod slug;
pub mod source;
pub mod store;
pub mod tabular;
pub mod telemetry;
pub mod values;

pub use cancel::{CancelHandle, Cancellation};
pub use config::IngestConfig;
pub use error::{IngestError, JobFailure, Result};
pub use service::{Dataset, Ingestor, RunSummary};
pub use store::{MemoryStore, PgStore, Store, StoreError};
