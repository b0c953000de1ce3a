//! Indexing: pipeline, attempt driver, watchdog.

mod callback;
mod chunker;
mod classify;
mod contextual;
mod embedder;
mod pipeline;
mod run;
mod watchdog;

pub use callback::{CallbackState, SignalWatcher};
pub use chunker::{Chunker, count_tokens};
pub use classify::aggregated_chunk_boost_factors;
pub use contextual::add_contextual_summaries;
pub use embedder::{build_embed_text, embed_chunks_with_failure_handling};
pub use pipeline::{IndexAttemptMetadata, IndexingPipeline, IndexingPipelineResult, IndexingServices};
pub use run::{RunIndexingOptions, run_indexing};
pub use watchdog::{ExitCodePolicy, IndexingWatchdog, WatchdogOutcome, WatchdogTerminalStatus};
