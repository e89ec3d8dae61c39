//! Feature extraction and rule-based security scoring.
//!
//! [`attack_surface::extract`] turns one response into an [`types::AttackSurface`];
//! [`features::extract`] turns that into a numeric feature map; [`rules::score`]
//! turns the feature map into a [`types::ScoreResult`]. [`engine::Assessor`] is the
//! entry point the tracker calls during `score_and_attribute`.

pub mod attack_surface;
pub mod engine;
pub mod error;
pub mod features;
pub mod rule;
pub mod rules;
pub mod types;

pub use engine::Assessor;
pub use error::{AssessorError, Result};
pub use rule::{Matcher, Rule, RuleBounds};
pub use rules::ScoringOptions;
pub use types::{
    AttackSurface, Cookie, EvidenceItem, EvidenceLocation, Form, FormField, ScoreResult,
    ScriptRef, Severity,
};
