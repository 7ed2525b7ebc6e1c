//! Onboarding system — the conversational flow that builds a fitness profile.
//!
//! The assistant walks the user through a fixed sequence of questions (age,
//! weight, … equipment), extracts one normalized value per answer with an LLM
//! call, shows a review summary and finally hands the completed profile to the
//! store. Each turn is stateless: the caller sends the transcript, step and
//! profile so far and gets the updated triple back.

pub mod manager;
pub mod model;
pub mod prompts;
pub mod routes;
pub mod state;

pub use manager::{OnboardingEngine, OnboardingManager, TurnRequest, TurnResponse};
pub use model::{FitnessProfile, Speaker, StoredProfile, Turn, UserProfile};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use state::{OnboardingState, OnboardingStep, STEPS, Transition};
