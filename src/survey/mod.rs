//! Survey core — form traversal and turn coordination.
//!
//! A [`FormSchema`] describes the questionnaire. Each conversation thread owns
//! a [`SurveySession`] (answers, cursor, phase) held by the
//! [`SessionRegistry`]. The [`SurveyController`] runs turns against the
//! collaborator, which reads and writes answers through the field-state tools.

pub mod controller;
pub mod extract;
pub mod prompts;
pub mod registry;
pub mod responses;
pub mod routes;
pub mod schema;
pub mod session;
pub mod state;
pub mod traversal;
pub mod value;

pub use controller::{
    ControllerConfig, DEFAULT_START_MESSAGE, InboundMessage, SurveyController, TurnOutcome,
    TurnRequest,
};
pub use extract::{Extraction, ExtractionSource, extract_question};
pub use prompts::DirectiveMode;
pub use registry::{SessionRegistry, spawn_prune_task};
pub use responses::ResponseStore;
pub use routes::{SurveyRouteState, survey_routes};
pub use schema::{Field, FieldKind, FormSchema};
pub use session::{SessionSnapshot, SurveySession};
pub use state::SurveyPhase;
pub use traversal::{SetOutcome, TraversalEngine};
pub use value::FieldValue;
