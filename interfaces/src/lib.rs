//! Contracts between the ad orchestrator and the generation services it drives.

pub mod defs;

pub use defs::{
    AdBrief, AdContent, CollaboratorError, ImageGenerator, ImageParams, ImagePayload, PublishReceipt,
    Publisher, TextGenerator, TraceId,
};
