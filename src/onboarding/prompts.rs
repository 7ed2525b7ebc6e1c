//! Extraction prompts, question prompts and the fixed onboarding messages.

use super::model::UserProfile;
use super::state::OnboardingStep;

/// Token the extractor returns when the answer can't be used.
pub const INVALID_SENTINEL: &str = "INVALID";

/// Closing message once the profile is complete.
pub const COMPLETION_MESSAGE: &str =
    "Thanks! Your profile is set up. You can now generate your workout plan.";

/// What the question generator should ask for at each field step.
pub fn step_instruction(step: OnboardingStep) -> &'static str {
    match step {
        OnboardingStep::Age => "Ask the user for their age.",
        OnboardingStep::Weight => "Ask the user for their current weight (in kg or lbs).",
        OnboardingStep::Height => "Ask the user for their height.",
        OnboardingStep::Gender => "Ask the user for their biological sex.",
        OnboardingStep::FitnessGoal => "Ask the user for their main fitness goal.",
        OnboardingStep::ActivityLevel => "Ask the user about their daily activity level.",
        OnboardingStep::ExperienceLevel => "Ask the user about their training experience.",
        OnboardingStep::Injuries => "Ask if the user has any injuries. If none, say 'none'.",
        OnboardingStep::AvailableDays => "Ask how many days per week they can train.",
        OnboardingStep::Equipment => "Ask what equipment they have access to.",
        OnboardingStep::Review => "Show summary and ask to confirm.",
        OnboardingStep::Complete => "Done.",
        OnboardingStep::Start => "",
    }
}

/// Deterministic question used when generation comes back empty.
pub fn fallback_question(step: OnboardingStep) -> String {
    match step {
        OnboardingStep::Age => "How old are you?".to_string(),
        OnboardingStep::Weight => "What is your current weight (in kg or lbs)?".to_string(),
        OnboardingStep::Height => "How tall are you?".to_string(),
        OnboardingStep::Gender => "What is your biological sex?".to_string(),
        OnboardingStep::FitnessGoal => "What is your main fitness goal?".to_string(),
        OnboardingStep::ActivityLevel => "How active are you during a typical day?".to_string(),
        OnboardingStep::ExperienceLevel => "How much training experience do you have?".to_string(),
        OnboardingStep::Injuries => "Do you have any injuries? (Say 'none' if not.)".to_string(),
        OnboardingStep::AvailableDays => "How many days per week can you train?".to_string(),
        OnboardingStep::Equipment => "What equipment do you have access to?".to_string(),
        other => format!("Could you tell me your {other}?"),
    }
}

/// System prompt for generating the next question.
///
/// Generation only affects wording; the target field is fixed by `step`.
pub fn question_system_prompt(step: OnboardingStep) -> String {
    format!(
        "You are a friendly fitness coach. Ask the user for their {step}. \
         Keep it short and specific.\n{}",
        step_instruction(step)
    )
}

/// Build the single-turn extraction prompt for one field.
pub fn extraction_prompt(step: OnboardingStep, user_input: &str) -> String {
    format!(
        "You are extracting a fitness profile field.\n\
         Field to extract: \"{step}\"\n\
         Field description: {}\n\
         User Input: \"{user_input}\"\n\n\
         Return ONLY the extracted value. Normalize it.\n\
         If invalid/unclear, return \"{INVALID_SENTINEL}\".",
        step_instruction(step)
    )
}

/// Interpret the extractor's raw reply.
///
/// Returns `None` for the invalid sentinel (quotes, a trailing period and
/// case are ignored) and for blank replies.
pub fn parse_extraction(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let value = unquote(raw, '"').or_else(|| unquote(raw, '\'')).unwrap_or(raw).trim();
    let bare = value.trim_end_matches('.');
    if bare.is_empty() || bare.eq_ignore_ascii_case(INVALID_SENTINEL) {
        None
    } else {
        Some(value.to_string())
    }
}

/// Strip one matching pair of surrounding quotes.
fn unquote(s: &str, quote: char) -> Option<&str> {
    s.strip_prefix(quote)?.strip_suffix(quote)
}

/// Re-ask message after an extraction failure.
pub fn retry_message(step: OnboardingStep) -> String {
    format!("I couldn't understand that {step}. Please try again.")
}

/// Summary of every captured field plus the confirmation question.
pub fn review_message(profile: &UserProfile) -> String {
    let summary = profile
        .entries()
        .into_iter()
        .map(|(field, value)| format!("- {field}: {value}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Here is what I have:\n{summary}\n\nDoes this look correct? (Yes/No)")
}
