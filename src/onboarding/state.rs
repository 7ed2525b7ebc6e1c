//! Onboarding state machine — the fixed step table and per-turn transitions.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::model::{Speaker, Turn, UserProfile};

/// One position in the onboarding conversation.
///
/// Progresses linearly through [`STEPS`]: Start → Age → … → Equipment →
/// Review → Complete. Wire names are camelCase (`fitnessGoal`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnboardingStep {
    Start,
    Age,
    Weight,
    Height,
    Gender,
    FitnessGoal,
    ActivityLevel,
    ExperienceLevel,
    Injuries,
    AvailableDays,
    Equipment,
    Review,
    Complete,
}

/// The step sequence, identical for every user.
pub const STEPS: [OnboardingStep; 13] = [
    OnboardingStep::Start,
    OnboardingStep::Age,
    OnboardingStep::Weight,
    OnboardingStep::Height,
    OnboardingStep::Gender,
    OnboardingStep::FitnessGoal,
    OnboardingStep::ActivityLevel,
    OnboardingStep::ExperienceLevel,
    OnboardingStep::Injuries,
    OnboardingStep::AvailableDays,
    OnboardingStep::Equipment,
    OnboardingStep::Review,
    OnboardingStep::Complete,
];

impl OnboardingStep {
    /// Position of this step in [`STEPS`].
    pub fn index(&self) -> usize {
        STEPS
            .iter()
            .position(|s| s == self)
            .unwrap_or(STEPS.len() - 1)
    }

    /// The next step in the sequence. Anything past the end is `Complete`.
    pub fn successor(&self) -> OnboardingStep {
        STEPS
            .get(self.index() + 1)
            .copied()
            .unwrap_or(OnboardingStep::Complete)
    }

    /// Whether this step collects a profile field (i.e. is not a sentinel).
    pub fn is_field(&self) -> bool {
        !matches!(self, Self::Start | Self::Review | Self::Complete)
    }

    /// Whether this step is terminal (onboarding is done).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// The field steps, in order.
    pub fn fields() -> impl Iterator<Item = OnboardingStep> {
        STEPS.into_iter().filter(OnboardingStep::is_field)
    }

    /// Wire name, also used as the profile key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Age => "age",
            Self::Weight => "weight",
            Self::Height => "height",
            Self::Gender => "gender",
            Self::FitnessGoal => "fitnessGoal",
            Self::ActivityLevel => "activityLevel",
            Self::ExperienceLevel => "experienceLevel",
            Self::Injuries => "injuries",
            Self::AvailableDays => "availableDays",
            Self::Equipment => "equipment",
            Self::Review => "review",
            Self::Complete => "complete",
        }
    }
}

impl Default for OnboardingStep {
    fn default() -> Self {
        Self::Start
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a step name is not part of [`STEPS`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown onboarding step: {0}")]
pub struct UnknownStep(pub String);

impl FromStr for OnboardingStep {
    type Err = UnknownStep;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        STEPS
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| UnknownStep(s.to_string()))
    }
}

/// What a turn has to do before the reply is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Conversation has not started: jump to the first field, no extraction.
    Bootstrap,
    /// Extract the current field from the user's text.
    Extract(OnboardingStep),
    /// No new user text mid-conversation: ask the current question again.
    Resume,
    /// The review question is rhetorical; any reply completes onboarding.
    ConfirmReview,
    /// Already complete: nothing changes.
    Terminal,
}

/// The unit of work for one turn, rebuilt from caller-supplied data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingState {
    pub messages: Vec<Turn>,
    pub user_profile: UserProfile,
    pub current_step: OnboardingStep,
}

impl OnboardingState {
    pub fn new(messages: Vec<Turn>, user_profile: UserProfile, current_step: OnboardingStep) -> Self {
        Self {
            messages,
            user_profile,
            current_step,
        }
    }

    /// Decide what this turn does, given the user's new text.
    pub fn plan(&self, new_user_text: &str) -> Transition {
        let has_text = !new_user_text.trim().is_empty();

        if self.current_step.is_terminal() {
            return Transition::Terminal;
        }
        if self.current_step == OnboardingStep::Start || (self.messages.is_empty() && !has_text) {
            return Transition::Bootstrap;
        }
        if !has_text {
            return Transition::Resume;
        }
        if self.current_step == OnboardingStep::Review {
            return Transition::ConfirmReview;
        }
        Transition::Extract(self.current_step)
    }

    /// Record an extracted value for the current step and move to its successor.
    pub fn advance_with(&mut self, value: String) -> OnboardingStep {
        self.user_profile.set(self.current_step, value);
        self.advance()
    }

    /// Move to the successor step without writing a field.
    pub fn advance(&mut self) -> OnboardingStep {
        self.current_step = self.current_step.successor();
        self.current_step
    }

    /// Jump straight to the first field step.
    pub fn bootstrap(&mut self) {
        self.current_step = OnboardingStep::Age;
    }

    pub fn push_user(&mut self, content: &str) {
        if !content.trim().is_empty() {
            self.messages.push(Turn::new(Speaker::User, content));
        }
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Turn::new(Speaker::Assistant, content));
    }
}
