//! Planner prompts and reply parsing.

use serde::de::DeserializeOwned;

use crate::error::LlmError;
use crate::onboarding::FitnessProfile;

pub const WORKOUT_SYSTEM_PROMPT: &str = "\
You are Mike Mentzer, the creator of Heavy Duty training.
Your philosophy:
1. High Intensity: Training to failure is essential.
2. Low Volume: 1-2 working sets per exercise max. Less is more.
3. Infrequent Training: Recovery is when growth happens. Train 3-4 days max, maybe less for advanced.
4. Progressive Overload: You must get stronger every session.
5. Strict Form: 4-second negatives, controlled positives.

Create a \"Heavy Duty\" workout plan tailored to the user's profile.
Do not suggest high volume \"bro-splits\". Stick to the science of high intensity.";

pub const DIET_SYSTEM_PROMPT: &str = "\
You are an expert nutritionist following Mike Mentzer's High Intensity principles.
Dietary Philosophy:
- High Carbohydrate (60%): Fuel for intense workouts.
- Moderate Protein (25%): Sufficient for repair.
- Low Fat (15%): Keep it minimal.
- Surplus for Muscle: +300-500 kcal above maintenance.
- Deficit for Fat Loss: -300-500 kcal below maintenance.

Calculate the user's needs based on their stats and goal, then generate a full daily meal plan.";

const WORKOUT_SHAPE: &str = r#"{
  "planName": string,
  "durationWeeks": integer,
  "frequency": string (e.g. "3 days/week"),
  "split": string (e.g. "Full Body"),
  "description": string,
  "schedule": [{
    "dayName": string,
    "focus": string,
    "exercises": [{
      "name": string,
      "sets": integer,
      "reps": string (e.g. "6-10" or "To Failure"),
      "rest": number (seconds),
      "notes": string,
      "muscleGroup": string
    }]
  }]
}"#;

const DIET_SHAPE: &str = r#"{
  "dailyCalories": number,
  "dailyProtein": number (grams),
  "dailyCarbs": number (grams),
  "dailyFats": number (grams),
  "meals": [{
    "name": string,
    "time": string (e.g. "8:00 AM"),
    "items": [{
      "name": string,
      "amount": string (e.g. "200g"),
      "protein": number,
      "carbs": number,
      "fats": number,
      "calories": number
    }],
    "totalCalories": number
  }],
  "notes": string
}"#;

fn field(value: Option<&str>) -> &str {
    value.filter(|v| !v.trim().is_empty()).unwrap_or("unknown")
}

fn age(profile: &FitnessProfile) -> String {
    profile
        .age
        .map(|a| a.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn injuries(profile: &FitnessProfile) -> &str {
    profile
        .injuries
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("None")
}

fn json_instruction(shape: &str) -> String {
    format!("Respond with ONLY a JSON object of this shape, no prose and no code fences:\n{shape}")
}

/// User message for workout generation.
pub fn workout_request(profile: &FitnessProfile) -> String {
    format!(
        "Generate a complete Heavy Duty workout plan for this user based on their profile \
         and available equipment.\n\n\
         User Profile:\n\
         - Age: {}\n\
         - Gender: {}\n\
         - Weight: {}\n\
         - Height: {}\n\
         - Goal: {}\n\
         - Experience: {}\n\
         - Injuries: {}\n\
         - Available Days: {}\n\
         - Equipment: {}\n\n\
         {}",
        age(profile),
        field(profile.gender.as_deref()),
        field(profile.weight.as_deref()),
        field(profile.height.as_deref()),
        field(profile.fitness_goal.as_deref()),
        field(profile.experience_level.as_deref()),
        injuries(profile),
        field(profile.available_days.as_deref()),
        field(profile.equipment.as_deref()),
        json_instruction(WORKOUT_SHAPE),
    )
}

/// User message for diet generation.
pub fn diet_request(profile: &FitnessProfile) -> String {
    format!(
        "Create a daily nutrition plan for this user. First calculate their maintenance \
         calories (TDEE) and then adjust for their goal.\n\n\
         User Profile:\n\
         - Age: {}\n\
         - Gender: {}\n\
         - Weight: {}\n\
         - Height: {}\n\
         - Goal: {} (e.g. \"Build Muscle\" implies surplus, \"Lose Fat\" implies deficit)\n\
         - Activity Level: {}\n\
         - Dietary Restrictions: None (unless specified in injuries/notes: {})\n\n\
         {}",
        age(profile),
        field(profile.gender.as_deref()),
        field(profile.weight.as_deref()),
        field(profile.height.as_deref()),
        field(profile.fitness_goal.as_deref()),
        field(profile.activity_level.as_deref()),
        injuries(profile),
        json_instruction(DIET_SHAPE),
    )
}

/// Parse a plan from the model's reply.
///
/// Tolerates surrounding prose and markdown fences by reading from the first
/// `{` to the last `}`.
pub fn parse_plan<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    let body = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => raw.trim(),
    };
    Ok(serde_json::from_str(body)?)
}
