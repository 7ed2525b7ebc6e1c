//! Fit Coach — conversational onboarding for an AI fitness coach.

pub mod config;
pub mod error;
pub mod llm;
pub mod onboarding;
pub mod plans;
pub mod store;
