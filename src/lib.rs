#![forbid(unsafe_code)]

//! # feedback360
//!
//! Scoring and report synthesis for 360-degree peer feedback.
//!
//! Participants rate themselves on a template of Likert-scale competencies and
//! invited evaluators rate them on the same items. This crate orders the forms
//! deterministically per participant, aggregates the answers into a scorecard
//! with self/peer gaps and maintain/develop recommendations, asks an LLM for a
//! marker-delimited narrative, and assembles everything into a report.
//!
//! Persistence sits behind [`store::SurveyStore`]; the LLM sits behind
//! [`generator::NarrativeGenerator`]. Both have retrying decorators.

pub mod generator;
pub mod invitations;
pub mod model;
pub mod narrative;
pub mod ordering;
pub mod render;
pub mod report;
pub mod scoring;
pub mod service;
pub mod store;
pub mod submission;
pub mod tracking;

pub use generator::{NarrativeGenerator, OpenRouterGenerator, RetryingGenerator};
pub use narrative::{NarrativeBundle, NarrativeConfig, NarrativeSynthesizer};
pub use ordering::presentation_order;
pub use report::{assemble, Report};
pub use scoring::{compute, DataIntegrityError, Scorecard};
pub use service::{FeedbackService, ReportDraft, ServiceError};
pub use store::{RetryingStore, SqliteStore, StoreError, SurveyStore};
