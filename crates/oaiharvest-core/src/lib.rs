//! oaiharvest core - Common infrastructure for metadata harvesting
//!
//! This crate provides the source-agnostic pieces: the fault taxonomy, a
//! blocking HTTP layer over a shared async client, cooperative cancellation,
//! the worklist, staged (atomic) output files, logging and progress bars.

pub mod error;
pub mod http;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod sink;
pub mod work_queue;

// Re-exports for convenience
pub use error::Fault;
pub use http::{
    HttpConfig, HttpResponse, SHARED_RUNTIME, get_text, http_client, http_config, set_http_config,
};
pub use logging::{IndicatifLogger, LogOptions, init_logging};
pub use progress::{ProgressContext, fmt_num, upgrade_to_bar};
pub use retry::{backoff_duration, pause};
pub use shutdown::CancelToken;
pub use sink::{StagedFile, cleanup_tmp_files, write_atomic};
pub use work_queue::WorkQueue;
