//! Plan generation from a completed fitness profile.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Error, LlmError, PlanError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::onboarding::FitnessProfile;
use crate::store::Database;

use super::model::{DietPlan, StoredPlan, WorkoutPlan};
use super::prompts::{
    DIET_SYSTEM_PROMPT, WORKOUT_SYSTEM_PROMPT, diet_request, parse_plan, workout_request,
};

const PLAN_TEMPERATURE: f32 = 0.2;
const PLAN_MAX_TOKENS: u32 = 4096;

/// Turns a profile into plans with one LLM call each.
pub struct PlanGenerator {
    llm: Arc<dyn LlmProvider>,
}

impl PlanGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub async fn workout(&self, profile: &FitnessProfile) -> Result<WorkoutPlan, LlmError> {
        let raw = self
            .generate(WORKOUT_SYSTEM_PROMPT, workout_request(profile))
            .await?;
        parse_plan(&raw).inspect_err(|e| warn!("Workout plan reply did not parse: {e}"))
    }

    pub async fn diet(&self, profile: &FitnessProfile) -> Result<DietPlan, LlmError> {
        let raw = self.generate(DIET_SYSTEM_PROMPT, diet_request(profile)).await?;
        parse_plan(&raw).inspect_err(|e| warn!("Diet plan reply did not parse: {e}"))
    }

    async fn generate(&self, system: &str, user: String) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(user),
        ])
        .with_max_tokens(PLAN_MAX_TOKENS)
        .with_temperature(PLAN_TEMPERATURE);

        let response = self.llm.complete(request).await?;
        Ok(response.content)
    }
}

/// Generates and stores plans for users who finished onboarding.
pub struct PlanManager {
    generator: PlanGenerator,
    db: Arc<dyn Database>,
}

impl PlanManager {
    pub fn new(db: Arc<dyn Database>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            generator: PlanGenerator::new(llm),
            db,
        }
    }

    async fn profile(&self, identity: &str) -> Result<FitnessProfile, Error> {
        let stored = self
            .db
            .get_profile(identity)
            .await?
            .ok_or(PlanError::ProfileNotFound)?;
        Ok(stored.profile)
    }

    /// Generate a new workout plan and store it as the latest.
    pub async fn generate_workout(&self, identity: &str) -> Result<StoredPlan<WorkoutPlan>, Error> {
        let profile = self.profile(identity).await?;
        let plan = self.generator.workout(&profile).await?;
        let stored = self.db.save_workout_plan(identity, &plan).await?;
        info!(identity, id = stored.id, plan = %stored.plan.plan_name, "Workout plan generated");
        Ok(stored)
    }

    /// Generate a new diet plan and store it as the latest.
    pub async fn generate_diet(&self, identity: &str) -> Result<StoredPlan<DietPlan>, Error> {
        let profile = self.profile(identity).await?;
        let plan = self.generator.diet(&profile).await?;
        let stored = self.db.save_diet_plan(identity, &plan).await?;
        info!(identity, id = stored.id, calories = stored.plan.daily_calories, "Diet plan generated");
        Ok(stored)
    }

    pub async fn latest_workout(
        &self,
        identity: &str,
    ) -> Result<Option<StoredPlan<WorkoutPlan>>, Error> {
        Ok(self.db.latest_workout_plan(identity).await?)
    }

    pub async fn latest_diet(&self, identity: &str) -> Result<Option<StoredPlan<DietPlan>>, Error> {
        Ok(self.db.latest_diet_plan(identity).await?)
    }
}
