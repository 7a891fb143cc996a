//! One survey session: traversal state plus phase, scoped to a thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::responses::ResponseStore;
use super::schema::{Field, FormSchema};
use super::state::SurveyPhase;
use super::traversal::{SetOutcome, TraversalEngine};
use crate::error::SurveyError;

/// Persisted form of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub thread_id: String,
    pub phase: SurveyPhase,
    pub cursor: usize,
    pub responses: ResponseStore,
    /// Set after the user rejected the summary, until a correction lands.
    #[serde(default)]
    pub awaiting_correction: bool,
    pub turn_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What `readFieldState` reports about a key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldState {
    pub key: String,
    pub exists: bool,
    pub answered: bool,
    pub value: serde_json::Value,
}

/// Mutable state of one survey conversation.
#[derive(Debug)]
pub struct SurveySession {
    thread_id: String,
    engine: TraversalEngine,
    phase: SurveyPhase,
    awaiting_correction: bool,
    turn_count: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Set once the session is dropped from the registry.
    retired: Arc<AtomicBool>,
}

impl SurveySession {
    pub fn new(thread_id: impl Into<String>, schema: Arc<FormSchema>) -> Self {
        let now = Utc::now();
        let mut session = Self {
            thread_id: thread_id.into(),
            engine: TraversalEngine::new(schema),
            phase: SurveyPhase::default(),
            awaiting_correction: false,
            turn_count: 0,
            created_at: now,
            updated_at: now,
            retired: Arc::new(AtomicBool::new(false)),
        };
        session.sync_phase();
        session
    }

    pub fn from_snapshot(schema: Arc<FormSchema>, snapshot: SessionSnapshot) -> Self {
        Self {
            engine: TraversalEngine::restore(schema, snapshot.responses, snapshot.cursor),
            thread_id: snapshot.thread_id,
            phase: snapshot.phase,
            awaiting_correction: snapshot.awaiting_correction,
            turn_count: snapshot.turn_count,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
            retired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            thread_id: self.thread_id.clone(),
            phase: self.phase,
            cursor: self.engine.cursor(),
            responses: self.engine.responses().clone(),
            awaiting_correction: self.awaiting_correction,
            turn_count: self.turn_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn phase(&self) -> SurveyPhase {
        self.phase
    }

    pub fn schema(&self) -> &Arc<FormSchema> {
        self.engine.schema()
    }

    pub fn responses(&self) -> &ResponseStore {
        self.engine.responses()
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_complete(&self) -> bool {
        self.engine.is_complete()
    }

    pub fn is_done(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Whether the registry has let go of this session. A retired session
    /// is never checkpointed again.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub(crate) fn retired_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.retired)
    }

    /// Record the start of a turn.
    pub fn begin_turn(&mut self) {
        self.turn_count += 1;
        self.updated_at = Utc::now();
    }

    /// The field the user should be asked next.
    pub fn next_field(&mut self) -> Option<Field> {
        self.engine.next_field().cloned()
    }

    /// Report a key's stored value, or an error for keys outside the form.
    pub fn read_field(&self, key: &str) -> Result<FieldState, SurveyError> {
        if self.engine.schema().field(key).is_none() {
            return Err(SurveyError::UnknownFieldKey {
                key: key.to_string(),
            });
        }

        let stored = self.engine.responses().get(key);
        Ok(FieldState {
            key: key.to_string(),
            exists: stored.is_some(),
            answered: self.engine.is_answered(key),
            value: stored
                .map(|v| v.to_json())
                .unwrap_or(serde_json::Value::Null),
        })
    }

    /// Validate and store an answer, then bring the phase up to date.
    pub fn write_field(
        &mut self,
        key: &str,
        raw: &serde_json::Value,
    ) -> Result<SetOutcome, SurveyError> {
        let outcome = self.engine.set_json(key, raw)?;

        match outcome {
            SetOutcome::ConfirmationDeclined => {
                info!(thread_id = %self.thread_id, "Summary rejected, waiting for a correction");
                self.awaiting_correction = true;
            }
            SetOutcome::Stored | SetOutcome::Corrected => self.awaiting_correction = false,
            SetOutcome::Unchanged => {}
        }

        self.updated_at = Utc::now();
        self.sync_phase();
        Ok(outcome)
    }

    /// Derive the phase from traversal state.
    pub fn sync_phase(&mut self) {
        let target = if self.engine.is_complete() {
            SurveyPhase::Done
        } else if self.awaiting_correction {
            SurveyPhase::Asking
        } else if self
            .engine
            .next_field()
            .is_some_and(|field| field.is_confirmation())
        {
            SurveyPhase::AwaitingConfirmation
        } else {
            SurveyPhase::Asking
        };
        self.transition_to(target);
    }

    fn transition_to(&mut self, target: SurveyPhase) {
        if self.phase == target {
            return;
        }
        if !self.phase.can_transition_to(target) {
            warn!(
                thread_id = %self.thread_id,
                from = %self.phase,
                to = %target,
                "Ignoring invalid survey phase transition"
            );
            return;
        }
        info!(thread_id = %self.thread_id, from = %self.phase, to = %target, "Survey phase changed");
        self.phase = target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> SurveySession {
        SurveySession::new("thread-1", Arc::new(FormSchema::business_survey().unwrap()))
    }

    fn answer_until_confirmation(session: &mut SurveySession) {
        session.write_field("business_name", &json!("Acme")).unwrap();
        session.write_field("business_type", &json!("Corporation")).unwrap();
        session.write_field("pays_sales_tax", &json!(false)).unwrap();
        session.write_field("has_employees", &json!(false)).unwrap();
    }

    #[test]
    fn starts_asking() {
        let mut session = session();
        assert_eq!(session.phase(), SurveyPhase::Asking);
        assert_eq!(session.next_field().unwrap().key, "business_name");
    }

    #[test]
    fn reaching_confirmation_awaits_it() {
        let mut session = session();
        answer_until_confirmation(&mut session);
        assert_eq!(session.phase(), SurveyPhase::AwaitingConfirmation);
    }

    #[test]
    fn affirmative_confirmation_finishes() {
        let mut session = session();
        answer_until_confirmation(&mut session);
        session.write_field("confirm_information", &json!("yes")).unwrap();
        assert_eq!(session.phase(), SurveyPhase::Done);
        assert!(session.is_done());
        assert!(session.is_complete());
    }

    #[test]
    fn negative_confirmation_returns_to_asking_until_corrected() {
        let mut session = session();
        answer_until_confirmation(&mut session);

        let outcome = session.write_field("confirm_information", &json!(false)).unwrap();
        assert_eq!(outcome, SetOutcome::ConfirmationDeclined);
        assert_eq!(session.phase(), SurveyPhase::Asking);

        session.write_field("business_name", &json!("Acme Corp")).unwrap();
        assert_eq!(session.phase(), SurveyPhase::AwaitingConfirmation);

        session.write_field("confirm_information", &json!(true)).unwrap();
        assert_eq!(session.phase(), SurveyPhase::Done);
    }

    #[test]
    fn confirming_an_empty_form_does_not_finish() {
        let mut session = session();
        assert!(session.write_field("confirm_information", &json!(true)).is_err());
        assert_eq!(session.phase(), SurveyPhase::Asking);
        assert!(!session.is_done());
        assert!(!session.is_complete());
    }

    #[test]
    fn read_field_reports_state() {
        let mut session = session();
        let state = session.read_field("business_name").unwrap();
        assert!(!state.exists);
        assert!(!state.answered);
        assert_eq!(state.value, serde_json::Value::Null);

        session.write_field("business_name", &json!("Acme")).unwrap();
        let state = session.read_field("business_name").unwrap();
        assert!(state.exists);
        assert!(state.answered);
        assert_eq!(state.value, json!("Acme"));

        assert!(matches!(
            session.read_field("nope"),
            Err(SurveyError::UnknownFieldKey { .. })
        ));
    }

    #[test]
    fn snapshot_restores_equivalent_session() {
        let mut session = session();
        session.begin_turn();
        answer_until_confirmation(&mut session);

        let snapshot = session.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);

        let mut restored =
            SurveySession::from_snapshot(Arc::clone(session.schema()), parsed);
        assert_eq!(restored.phase(), SurveyPhase::AwaitingConfirmation);
        assert_eq!(restored.turn_count(), 1);
        assert_eq!(restored.next_field().unwrap().key, "confirm_information");
    }

    #[test]
    fn begin_turn_counts_turns() {
        let mut session = session();
        session.begin_turn();
        session.begin_turn();
        assert_eq!(session.turn_count(), 2);
    }
}
