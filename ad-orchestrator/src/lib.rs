pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod fetcher;
pub mod filter;
pub mod json_repair;
pub mod llm_adapter;
pub mod pipeline;
pub mod prompts;
pub mod rate_limit;
pub mod reclaimer;
pub mod sequencer;
pub mod sources;
pub mod store;
pub mod story;
pub mod trace;
pub mod traits;
pub mod types;
pub mod utils;

pub use types::*;
pub use api::{routes, AppState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Cli, ServiceConfig};
pub use fetcher::Fetcher;
pub use filter::{ContentFilter, FilterConfig, Verdict};
pub use pipeline::{PipelineConfig, TrendPipeline};
pub use reclaimer::Reclaimer;
pub use sequencer::{GenerationOutcome, GenerationRequest, PublishStatus, Sequencer, SequencerConfig};
pub use store::{ArtifactId, ArtifactStatus, ArtifactStore, StoreConfig};
pub use traits::TrendSource;
