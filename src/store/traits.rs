//! `Database` trait — the async persistence interface for completed profiles.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::onboarding::model::{FitnessProfile, StoredProfile};
use crate::plans::model::{DietPlan, StoredPlan, WorkoutPlan};

/// Backend-agnostic database trait.
///
/// Profiles are written only when onboarding completes, keyed by the
/// caller-supplied identity (e.g. email). Plans are append-only; the newest
/// one per identity is the current plan.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Fetch the stored profile for an identity.
    async fn get_profile(&self, identity: &str) -> Result<Option<StoredProfile>, DatabaseError>;

    /// Insert or replace the profile for an identity in one statement.
    ///
    /// Concurrent completions for the same identity converge on one row.
    async fn upsert_profile(
        &self,
        identity: &str,
        profile: &FitnessProfile,
    ) -> Result<StoredProfile, DatabaseError>;

    // ── Plans ───────────────────────────────────────────────────────

    async fn save_workout_plan(
        &self,
        identity: &str,
        plan: &WorkoutPlan,
    ) -> Result<StoredPlan<WorkoutPlan>, DatabaseError>;

    /// Most recently generated workout plan for an identity.
    async fn latest_workout_plan(
        &self,
        identity: &str,
    ) -> Result<Option<StoredPlan<WorkoutPlan>>, DatabaseError>;

    async fn save_diet_plan(
        &self,
        identity: &str,
        plan: &DietPlan,
    ) -> Result<StoredPlan<DietPlan>, DatabaseError>;

    /// Most recently generated diet plan for an identity.
    async fn latest_diet_plan(
        &self,
        identity: &str,
    ) -> Result<Option<StoredPlan<DietPlan>>, DatabaseError>;
}
