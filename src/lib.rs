//! Spectra-Engine: a speculative-decoding accelerator with live
//! generation telemetry.
//!
//! A small local draft model proposes several continuation tokens per
//! round; a larger remote target model verifies them in a single batch
//! call; a modified rejection sampler decides what survives. Every
//! draft proposal, verification outcome, and rolling-window metric is
//! streamed to the client over a WebSocket as it happens, so a UI can
//! visualise the accept/reject pattern live rather than just the final
//! text.
//!
//! ## Example
//!
//! ```no_run
//! use spectra_engine::config::SpectraConfig;
//!
//! let config = SpectraConfig::load();
//! println!("draft model: {}", config.speculation.draft_model);
//! ```

pub mod api;
pub mod config;
pub mod draft;
pub mod events;
pub mod metrics;
pub mod sampler;
pub mod speculator;
pub mod target;
pub mod utils;

pub use api::{build_router, AppState};
pub use config::SpectraConfig;
pub use events::Event;
pub use metrics::{create_metrics, MetricsSnapshot, MetricsTracker, SharedMetrics};
pub use speculator::{SpeculationParams, Speculator};
pub use utils::error::{Result, SpecError};
