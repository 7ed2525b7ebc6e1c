//! Workout and diet plan types.
//!
//! These mirror the JSON the planner asks the LLM to return, so they are
//! deserialized straight from the model's reply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One exercise inside a workout day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub name: String,
    /// Working sets.
    pub sets: u32,
    /// Rep range, e.g. "6-10" or "To Failure".
    pub reps: String,
    /// Rest between sets, in seconds.
    pub rest: f64,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub muscle_group: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutDay {
    pub day_name: String,
    #[serde(default)]
    pub focus: String,
    pub exercises: Vec<Exercise>,
}

/// A generated training program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutPlan {
    pub plan_name: String,
    pub duration_weeks: u32,
    /// e.g. "3 days/week".
    pub frequency: String,
    /// e.g. "Upper/Lower", "Full Body".
    pub split: String,
    #[serde(default)]
    pub description: String,
    pub schedule: Vec<WorkoutDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealItem {
    pub name: String,
    /// Quantity, e.g. "200g" or "1 cup".
    pub amount: String,
    pub protein: f64,
    pub carbs: f64,
    pub fats: f64,
    pub calories: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub name: String,
    /// Suggested time, e.g. "8:00 AM".
    #[serde(default)]
    pub time: String,
    pub items: Vec<MealItem>,
    pub total_calories: f64,
}

/// A generated daily nutrition plan. Daily targets are in kcal and grams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DietPlan {
    pub daily_calories: f64,
    pub daily_protein: f64,
    pub daily_carbs: f64,
    pub daily_fats: f64,
    pub meals: Vec<Meal>,
    #[serde(default)]
    pub notes: String,
}

impl DietPlan {
    /// Round the daily targets to whole numbers, as they are stored.
    pub fn rounded(mut self) -> Self {
        self.daily_calories = self.daily_calories.round();
        self.daily_protein = self.daily_protein.round();
        self.daily_carbs = self.daily_carbs.round();
        self.daily_fats = self.daily_fats.round();
        self
    }
}

/// A persisted plan of either kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPlan<P> {
    pub id: i64,
    pub identity: String,
    #[serde(flatten)]
    pub plan: P,
    pub created_at: DateTime<Utc>,
}
