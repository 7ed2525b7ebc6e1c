//! Workout and diet plans generated from a completed onboarding profile.
//!
//! Each generation is one LLM call that returns JSON in a fixed shape. Plans
//! are stored append-only and the newest one per identity is served back.

pub mod model;
pub mod planner;
pub mod prompts;
pub mod routes;

pub use model::{DietPlan, Exercise, Meal, MealItem, StoredPlan, WorkoutDay, WorkoutPlan};
pub use planner::{PlanGenerator, PlanManager};
pub use routes::{PlanRouteState, plan_routes};
