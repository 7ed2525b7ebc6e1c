//! Transcript and profile data models.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::OnboardingStep;
use crate::llm::ChatMessage;

/// Who said a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// One transcript turn, in the `{role, content}` shape the UI sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Speaker,
    pub content: String,
}

impl Turn {
    pub fn new(role: Speaker, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Speaker::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Speaker::Assistant, content)
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        match turn.role {
            Speaker::User => ChatMessage::user(turn.content.clone()),
            Speaker::Assistant => ChatMessage::assistant(turn.content.clone()),
        }
    }
}

/// Profile built up during onboarding: field name → extracted value.
///
/// Values are kept as opaque JSON scalars. Extraction always produces strings,
/// but callers may echo numbers back, so both are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(BTreeMap<String, serde_json::Value>);

impl UserProfile {
    pub fn set(&mut self, step: OnboardingStep, value: impl Into<String>) {
        self.0
            .insert(step.as_str().to_string(), serde_json::Value::String(value.into()));
    }

    /// A field's value rendered as text. Null is treated as absent.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every `(field, value)` pair present: known fields in step order,
    /// then any other keys in key order. Null renders as an empty value.
    pub fn entries(&self) -> Vec<(String, String)> {
        let render = |key: &str| self.get_str(key).unwrap_or_default();
        let known = OnboardingStep::fields()
            .map(|step| step.as_str())
            .filter(|key| self.contains(key))
            .map(|key| (key.to_string(), render(key)));
        let extra = self
            .0
            .keys()
            .filter(|key| !OnboardingStep::fields().any(|step| step.as_str() == key.as_str()))
            .map(|key| (key.clone(), render(key)));
        known.chain(extra).collect()
    }
}

impl<K: Into<String>, V: Into<serde_json::Value>> FromIterator<(K, V)> for UserProfile {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// The persisted fitness profile: one column per onboarding field.
///
/// `age` is coerced to a number when the extracted text is numeric and
/// stored as `None` otherwise; everything else is kept as extracted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitnessProfile {
    pub age: Option<i64>,
    pub weight: Option<String>,
    pub height: Option<String>,
    pub gender: Option<String>,
    pub fitness_goal: Option<String>,
    pub activity_level: Option<String>,
    pub experience_level: Option<String>,
    pub injuries: Option<String>,
    pub available_days: Option<String>,
    pub equipment: Option<String>,
}

impl FitnessProfile {
    pub fn from_user_profile(profile: &UserProfile) -> Self {
        let text = |step: OnboardingStep| profile.get_str(step.as_str());
        Self {
            age: text(OnboardingStep::Age).as_deref().and_then(parse_age),
            weight: text(OnboardingStep::Weight),
            height: text(OnboardingStep::Height),
            gender: text(OnboardingStep::Gender),
            fitness_goal: text(OnboardingStep::FitnessGoal),
            activity_level: text(OnboardingStep::ActivityLevel),
            experience_level: text(OnboardingStep::ExperienceLevel),
            injuries: text(OnboardingStep::Injuries),
            available_days: text(OnboardingStep::AvailableDays),
            equipment: text(OnboardingStep::Equipment),
        }
    }
}

/// Parse an extracted age. Non-numeric text yields `None`.
fn parse_age(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(age) = raw.parse::<i64>() {
        return Some(age);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|age| age.is_finite())
        .map(|age| age.round() as i64)
}

/// A profile row as stored, keyed by the caller's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProfile {
    pub identity: String,
    #[serde(flatten)]
    pub profile: FitnessProfile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
