//! Onboarding turn orchestration.
//!
//! [`OnboardingEngine`] is a pure-ish function from `(prior state, user text)`
//! to the next state: it holds no per-user data and can be shared across all
//! conversations. [`OnboardingManager`] wraps it with the request shape the
//! UI sends and hands completed profiles to the store.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, LlmError, OnboardingError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::store::Database;

use super::model::{FitnessProfile, StoredProfile, Turn, UserProfile};
use super::prompts::{
    COMPLETION_MESSAGE, extraction_prompt, fallback_question, parse_extraction,
    question_system_prompt, retry_message, review_message,
};
use super::state::{OnboardingState, OnboardingStep, Transition};

/// Max tokens for a field extraction reply.
const EXTRACTION_MAX_TOKENS: u32 = 64;
/// Max tokens for a generated question.
const QUESTION_MAX_TOKENS: u32 = 256;

/// Drives one onboarding turn at a time.
pub struct OnboardingEngine {
    llm: Arc<dyn LlmProvider>,
}

impl OnboardingEngine {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Run a single turn.
    ///
    /// Appends the user's text (if any) and exactly one assistant message.
    /// At most one field is written and the step advances at most once.
    /// LLM failures propagate; the caller's prior state is untouched then.
    pub async fn run_turn(
        &self,
        prior: OnboardingState,
        new_user_text: &str,
    ) -> Result<OnboardingState, LlmError> {
        let mut state = prior;
        let transition = state.plan(new_user_text);
        state.push_user(new_user_text);

        let reply = match transition {
            Transition::Bootstrap => {
                state.bootstrap();
                self.ask(&state).await?
            }
            Transition::Resume => self.ask(&state).await?,
            Transition::ConfirmReview => {
                state.advance();
                COMPLETION_MESSAGE.to_string()
            }
            Transition::Terminal => COMPLETION_MESSAGE.to_string(),
            Transition::Extract(step) => match self.extract(step, new_user_text).await? {
                Some(value) => {
                    let next = state.advance_with(value);
                    info!(from = %step, to = %next, "Onboarding step advanced");
                    self.ask(&state).await?
                }
                None => {
                    warn!(step = %step, "Could not extract onboarding field; re-asking");
                    retry_message(step)
                }
            },
        };

        state.push_assistant(reply);
        Ok(state)
    }

    /// Ask the extractor for one field. `None` means the answer was unusable.
    async fn extract(
        &self,
        step: OnboardingStep,
        user_text: &str,
    ) -> Result<Option<String>, LlmError> {
        let prompt = extraction_prompt(step, user_text);
        let request = CompletionRequest::new(vec![
            ChatMessage::system(prompt),
            ChatMessage::user(user_text),
        ])
        .with_max_tokens(EXTRACTION_MAX_TOKENS)
        .with_temperature(0.0);

        let response = self.llm.complete(request).await?;
        debug!(step = %step, raw = %response.content, "Extraction response");
        Ok(parse_extraction(&response.content))
    }

    /// Produce the assistant message for the state's current step.
    async fn ask(&self, state: &OnboardingState) -> Result<String, LlmError> {
        let step = state.current_step;
        match step {
            OnboardingStep::Review => Ok(review_message(&state.user_profile)),
            OnboardingStep::Complete => Ok(COMPLETION_MESSAGE.to_string()),
            _ => {
                let mut messages = vec![ChatMessage::system(question_system_prompt(step))];
                messages.extend(state.messages.iter().map(ChatMessage::from));
                let request = CompletionRequest::new(messages)
                    .with_max_tokens(QUESTION_MAX_TOKENS)
                    .with_temperature(0.0);

                let response = self.llm.complete(request).await?;
                let question = response.content.trim();
                if question.is_empty() {
                    warn!(step = %step, "Question generation returned empty text; using fallback");
                    Ok(fallback_question(step))
                } else {
                    Ok(question.to_string())
                }
            }
        }
    }
}

/// One onboarding turn as submitted by the UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub history: Vec<Turn>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_profile: UserProfile,
    /// Opaque identity from the session provider; only used for persistence.
    #[serde(default)]
    pub email: Option<String>,
}

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The updated conversation returned to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub messages: Vec<Turn>,
    pub current_step: String,
    pub user_profile: UserProfile,
}

impl From<OnboardingState> for TurnResponse {
    fn from(state: OnboardingState) -> Self {
        Self {
            messages: state.messages,
            current_step: state.current_step.to_string(),
            user_profile: state.user_profile,
        }
    }
}

/// Coordinates turns with persistence of the completed profile.
pub struct OnboardingManager {
    engine: OnboardingEngine,
    db: Arc<dyn Database>,
}

impl OnboardingManager {
    pub fn new(db: Arc<dyn Database>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            engine: OnboardingEngine::new(llm),
            db,
        }
    }

    /// Handle one turn: run the engine and, when the result is `complete`,
    /// upsert the profile under the request's identity.
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnResponse, Error> {
        let identity = request
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .ok_or(OnboardingError::MissingIdentity)?
            .to_string();

        let raw_step = request
            .current_step
            .filter(|step| !step.trim().is_empty())
            .unwrap_or_else(|| "start".to_string());
        let step = match raw_step.parse::<OnboardingStep>() {
            Ok(step) => step,
            Err(e) => {
                warn!(identity = %identity, "{e}; returning state unchanged");
                return Ok(TurnResponse {
                    messages: request.history,
                    current_step: raw_step,
                    user_profile: request.user_profile,
                });
            }
        };

        let prior = OnboardingState::new(request.history, request.user_profile, step);
        let state = self.engine.run_turn(prior, &request.message).await?;

        if state.current_step.is_terminal() {
            let profile = FitnessProfile::from_user_profile(&state.user_profile);
            self.db.upsert_profile(&identity, &profile).await?;
            info!(identity = %identity, fields = state.user_profile.len(), "Onboarding complete; profile saved");
        }

        Ok(state.into())
    }

    /// The stored profile for an identity, if onboarding has completed.
    pub async fn get_profile(&self, identity: &str) -> Result<Option<StoredProfile>, Error> {
        Ok(self.db.get_profile(identity).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::DatabaseError;
    use crate::llm::{CompletionResponse, FinishReason, Role};
    use crate::onboarding::model::Speaker;
    use crate::onboarding::prompts::INVALID_SENTINEL;
    use crate::onboarding::state::STEPS;
    use crate::plans::model::{DietPlan, StoredPlan, WorkoutPlan};
    use crate::store::LibSqlBackend;

    /// Stub LLM: answers extraction prompts from a script, echoes the
    /// target field for question prompts, and records every request.
    #[derive(Default)]
    struct ScriptedLlm {
        extractions: Mutex<VecDeque<String>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedLlm {
        fn with_extractions(values: &[&str]) -> Self {
            Self {
                extractions: Mutex::new(values.iter().map(|v| v.to_string()).collect()),
                ..Default::default()
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let system = request
                .messages
                .iter()
                .find(|m| m.role == Role::System)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            self.requests.lock().unwrap().push(request);

            let content = if system.starts_with("You are extracting") {
                self.extractions
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| INVALID_SENTINEL.to_string())
            } else {
                // "…Ask the user for their <field>. Keep it…"
                let field = system
                    .split("their ")
                    .nth(1)
                    .and_then(|rest| rest.split('.').next())
                    .unwrap_or("?");
                format!("What is your {field}?")
            };

            Ok(CompletionResponse {
                content,
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    /// Provider whose every call fails.
    struct FailingLlm;

    #[async_trait]
    impl LlmProvider for FailingLlm {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Err(LlmError::RequestFailed {
                provider: "failing".to_string(),
                reason: "connection reset".to_string(),
            })
        }
    }

    /// Store whose writes always fail.
    struct BrokenStore;

    fn broken(op: &str) -> DatabaseError {
        DatabaseError::Query(format!("{op}: disk I/O error"))
    }

    #[async_trait]
    impl Database for BrokenStore {
        async fn run_migrations(&self) -> Result<(), DatabaseError> {
            Ok(())
        }

        async fn get_profile(&self, _identity: &str) -> Result<Option<StoredProfile>, DatabaseError> {
            Ok(None)
        }

        async fn upsert_profile(
            &self,
            _identity: &str,
            _profile: &FitnessProfile,
        ) -> Result<StoredProfile, DatabaseError> {
            Err(broken("upsert_profile"))
        }

        async fn save_workout_plan(
            &self,
            _identity: &str,
            _plan: &WorkoutPlan,
        ) -> Result<StoredPlan<WorkoutPlan>, DatabaseError> {
            Err(broken("save_workout_plan"))
        }

        async fn latest_workout_plan(
            &self,
            _identity: &str,
        ) -> Result<Option<StoredPlan<WorkoutPlan>>, DatabaseError> {
            Ok(None)
        }

        async fn save_diet_plan(
            &self,
            _identity: &str,
            _plan: &DietPlan,
        ) -> Result<StoredPlan<DietPlan>, DatabaseError> {
            Err(broken("save_diet_plan"))
        }

        async fn latest_diet_plan(
            &self,
            _identity: &str,
        ) -> Result<Option<StoredPlan<DietPlan>>, DatabaseError> {
            Ok(None)
        }
    }

    const ANSWERS: [&str; 10] = [
        "25",
        "80kg",
        "180cm",
        "male",
        "build muscle",
        "moderate",
        "beginner",
        "none",
        "4",
        "dumbbells",
    ];

    fn assistant_count(messages: &[Turn]) -> usize {
        messages.iter().filter(|t| t.role == Speaker::Assistant).count()
    }

    async fn test_manager(llm: Arc<dyn LlmProvider>) -> (OnboardingManager, Arc<LibSqlBackend>) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let manager = OnboardingManager::new(Arc::clone(&db) as Arc<dyn Database>, llm);
        (manager, db)
    }

    fn request(state: &TurnResponse, message: &str) -> TurnRequest {
        TurnRequest {
            message: message.to_string(),
            history: state.messages.clone(),
            current_step: Some(state.current_step.clone()),
            user_profile: state.user_profile.clone(),
            email: Some("sam@example.com".to_string()),
        }
    }

    #[tokio::test]
    async fn bootstrap_asks_for_age() {
        let engine = OnboardingEngine::new(Arc::new(ScriptedLlm::default()));
        let state = engine.run_turn(OnboardingState::default(), "").await.unwrap();

        assert_eq!(state.current_step, OnboardingStep::Age);
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].role, Speaker::Assistant);
        assert_eq!(state.messages[0].content, "What is your age?");
        assert!(state.user_profile.is_empty());
    }

    #[tokio::test]
    async fn valid_answer_advances_one_step() {
        let llm = Arc::new(ScriptedLlm::with_extractions(&["80 kg"]));
        let engine = OnboardingEngine::new(llm.clone());
        let prior = OnboardingState::new(
            vec![Turn::assistant("What is your weight?")],
            [("age", "25")].into_iter().collect(),
            OnboardingStep::Weight,
        );

        let state = engine.run_turn(prior, "about 80 kilos").await.unwrap();

        assert_eq!(state.current_step, OnboardingStep::Height);
        assert_eq!(state.user_profile.get_str("weight").as_deref(), Some("80 kg"));
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.messages[1], Turn::user("about 80 kilos"));
        assert_eq!(state.messages[2].content, "What is your height?");
        // One extraction call, one question call
        assert_eq!(llm.request_count(), 2);
    }

    #[tokio::test]
    async fn invalid_answer_retries_without_advancing() {
        let llm = Arc::new(ScriptedLlm::with_extractions(&["INVALID"]));
        let engine = OnboardingEngine::new(llm.clone());
        let prior = OnboardingState::new(
            vec![Turn::assistant("How tall are you?")],
            UserProfile::default(),
            OnboardingStep::Height,
        );

        let state = engine.run_turn(prior, "banana").await.unwrap();

        assert_eq!(state.current_step, OnboardingStep::Height);
        assert!(!state.user_profile.contains("height"));
        assert_eq!(assistant_count(&state.messages), 2);
        assert_eq!(
            state.messages.last().unwrap().content,
            "I couldn't understand that height. Please try again."
        );
        // No question generation after a failed extraction
        assert_eq!(llm.request_count(), 1);
    }

    #[tokio::test]
    async fn resume_reasks_current_step_without_extraction() {
        let llm = Arc::new(ScriptedLlm::default());
        let engine = OnboardingEngine::new(llm.clone());
        let prior = OnboardingState::new(
            vec![Turn::assistant("What is your gender?")],
            UserProfile::default(),
            OnboardingStep::Gender,
        );

        let state = engine.run_turn(prior, "").await.unwrap();

        assert_eq!(state.current_step, OnboardingStep::Gender);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].content, "What is your gender?");
        assert_eq!(llm.request_count(), 1);
    }

    #[tokio::test]
    async fn review_auto_confirms_even_on_no() {
        let llm = Arc::new(ScriptedLlm::default());
        let engine = OnboardingEngine::new(llm.clone());
        let profile: UserProfile = [("age", "25")].into_iter().collect();
        let prior = OnboardingState::new(
            vec![Turn::assistant("Does this look correct? (Yes/No)")],
            profile.clone(),
            OnboardingStep::Review,
        );

        let state = engine.run_turn(prior, "no").await.unwrap();

        assert_eq!(state.current_step, OnboardingStep::Complete);
        assert_eq!(state.user_profile, profile);
        assert_eq!(state.messages.last().unwrap().content, COMPLETION_MESSAGE);
        assert_eq!(llm.request_count(), 0);
    }

    #[tokio::test]
    async fn complete_is_idempotent() {
        let llm = Arc::new(ScriptedLlm::default());
        let engine = OnboardingEngine::new(llm.clone());
        let profile: UserProfile = [("age", "25"), ("weight", "80kg")].into_iter().collect();
        let mut state = OnboardingState::new(Vec::new(), profile.clone(), OnboardingStep::Complete);

        for text in ["hello?", "", "change my age to 30"] {
            let before = state.messages.len();
            state = engine.run_turn(state, text).await.unwrap();
            assert_eq!(state.current_step, OnboardingStep::Complete);
            assert_eq!(state.user_profile, profile);
            assert_eq!(assistant_count(&state.messages[before..]), 1);
        }
        assert_eq!(llm.request_count(), 0);
    }

    #[tokio::test]
    async fn empty_question_falls_back() {
        struct BlankLlm;

        #[async_trait]
        impl LlmProvider for BlankLlm {
            fn model_name(&self) -> &str {
                "blank"
            }
            async fn complete(&self, _r: CompletionRequest) -> Result<CompletionResponse, LlmError> {
                Ok(CompletionResponse {
                    content: "  \n".to_string(),
                    input_tokens: 0,
                    output_tokens: 0,
                    finish_reason: FinishReason::Stop,
                })
            }
        }

        let engine = OnboardingEngine::new(Arc::new(BlankLlm));
        let state = engine.run_turn(OnboardingState::default(), "").await.unwrap();
        assert_eq!(state.messages[0].content, fallback_question(OnboardingStep::Age));
    }

    #[tokio::test]
    async fn llm_failure_propagates() {
        let engine = OnboardingEngine::new(Arc::new(FailingLlm));
        let prior = OnboardingState::new(
            vec![Turn::assistant("How old are you?")],
            UserProfile::default(),
            OnboardingStep::Age,
        );
        let err = engine.run_turn(prior, "25").await.unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed { .. }));
    }

    #[tokio::test]
    async fn extraction_request_is_single_turn() {
        let llm = Arc::new(ScriptedLlm::with_extractions(&["25"]));
        let engine = OnboardingEngine::new(llm.clone());
        let prior = OnboardingState::new(
            vec![Turn::assistant("How old are you?")],
            UserProfile::default(),
            OnboardingStep::Age,
        );
        engine.run_turn(prior, "I'm 25").await.unwrap();

        let requests = llm.requests.lock().unwrap();
        let extraction = &requests[0];
        assert_eq!(extraction.messages.len(), 2);
        assert!(extraction.messages[0].content.contains("Field to extract: \"age\""));
        assert_eq!(extraction.messages[1], ChatMessage::user("I'm 25"));
        assert_eq!(extraction.temperature, Some(0.0));
        // The question prompt sees the whole transcript
        let question = &requests[1];
        assert_eq!(question.messages.len(), 3);
    }

    #[tokio::test]
    async fn full_onboarding_reaches_complete_in_twelve_turns() {
        let llm = Arc::new(ScriptedLlm::with_extractions(&ANSWERS));
        let (manager, db) = test_manager(llm).await;

        let mut state = manager
            .handle_turn(TurnRequest {
                email: Some("sam@example.com".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let mut calls = 1;
        assert_eq!(state.current_step, "age");

        for (i, answer) in ANSWERS.iter().enumerate() {
            let before = state.messages.len();
            state = manager.handle_turn(request(&state, answer)).await.unwrap();
            calls += 1;
            assert_eq!(state.current_step, STEPS[i + 2].as_str());
            assert_eq!(state.messages.len(), before + 2);
            assert!(db.get_profile("sam@example.com").await.unwrap().is_none());
        }

        assert_eq!(state.current_step, "review");
        assert_eq!(state.user_profile.len(), 10);
        let review = &state.messages.last().unwrap().content;
        for (field, value) in state.user_profile.entries() {
            assert!(review.contains(&format!("{field}: {value}")), "review missing {field}");
        }

        state = manager.handle_turn(request(&state, "yes")).await.unwrap();
        calls += 1;
        assert_eq!(state.current_step, "complete");
        assert_eq!(calls, 12);

        let stored = db.get_profile("sam@example.com").await.unwrap().unwrap();
        assert_eq!(stored.profile.age, Some(25));
        assert_eq!(stored.profile.fitness_goal.as_deref(), Some("build muscle"));
        assert_eq!(stored.profile.equipment.as_deref(), Some("dumbbells"));
    }

    #[tokio::test]
    async fn unknown_step_returns_state_unchanged() {
        let llm = Arc::new(ScriptedLlm::default());
        let (manager, db) = test_manager(llm.clone()).await;
        let history = vec![Turn::assistant("hi"), Turn::user("hello")];
        let profile: UserProfile = [("age", "25")].into_iter().collect();

        let response = manager
            .handle_turn(TurnRequest {
                message: "what now".to_string(),
                history: history.clone(),
                current_step: Some("favoriteColor".to_string()),
                user_profile: profile.clone(),
                email: Some("sam@example.com".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(response.current_step, "favoriteColor");
        assert_eq!(response.messages, history);
        assert_eq!(response.user_profile, profile);
        assert_eq!(llm.request_count(), 0);
        assert!(db.get_profile("sam@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_identity_is_rejected() {
        let (manager, _db) = test_manager(Arc::new(ScriptedLlm::default())).await;
        for email in [None, Some("   ".to_string())] {
            let err = manager
                .handle_turn(TurnRequest {
                    email,
                    ..Default::default()
                })
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Onboarding(OnboardingError::MissingIdentity)));
        }
    }

    #[tokio::test]
    async fn llm_failure_is_hard_error_for_manager() {
        let (manager, _db) = test_manager(Arc::new(FailingLlm)).await;
        let err = manager
            .handle_turn(TurnRequest {
                email: Some("sam@example.com".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
    }

    #[tokio::test]
    async fn store_failure_on_completion_is_hard_error() {
        let manager = OnboardingManager::new(
            Arc::new(BrokenStore),
            Arc::new(ScriptedLlm::default()),
        );
        let profile: UserProfile = STEPS
            .iter()
            .filter(|step| step.is_field())
            .map(|step| (step.as_str(), "x"))
            .collect();

        let err = manager
            .handle_turn(TurnRequest {
                message: "yes".to_string(),
                history: vec![Turn::assistant("Does this look correct? (Yes/No)")],
                current_step: Some("review".to_string()),
                user_profile: profile,
                email: Some("sam@example.com".to_string()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Database(DatabaseError::Query(_))));
    }

    #[tokio::test]
    async fn blank_step_bootstraps() {
        let (manager, _db) = test_manager(Arc::new(ScriptedLlm::default())).await;
        for step in ["", "  "] {
            let response = manager
                .handle_turn(TurnRequest {
                    current_step: Some(step.to_string()),
                    email: Some("sam@example.com".to_string()),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(response.current_step, "age");
            assert_eq!(response.messages.len(), 1);
        }
    }

    #[test]
    fn turn_request_accepts_nulls() {
        let request: TurnRequest = serde_json::from_str(
            r#"{"message":null,"history":null,"currentStep":null,"userProfile":null,"email":"a@b.c"}"#,
        )
        .unwrap();
        assert!(request.message.is_empty());
        assert!(request.history.is_empty());
        assert!(request.current_step.is_none());
        assert!(request.user_profile.is_empty());
    }

    #[test]
    fn turn_request_defaults() {
        let request: TurnRequest = serde_json::from_str(r#"{"email": "a@b.c"}"#).unwrap();
        assert!(request.message.is_empty());
        assert!(request.history.is_empty());
        assert!(request.current_step.is_none());
        assert!(request.user_profile.is_empty());

        let request: TurnRequest = serde_json::from_str(
            r#"{"message":"25","history":[{"role":"assistant","content":"Age?"}],"currentStep":"age","userProfile":{},"email":"a@b.c"}"#,
        )
        .unwrap();
        assert_eq!(request.current_step.as_deref(), Some("age"));
        assert_eq!(request.history.len(), 1);
    }
}
