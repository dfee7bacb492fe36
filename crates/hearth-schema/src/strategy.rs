use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

/// Therapeutic technique a span of a reply is annotated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ActiveListening,
    Validation,
    CognitiveReframing,
    Empathy,
    OpenEndedQuestions,
    Reflection,
    Normalization,
    Psychoeducation,
    Grounding,
    Summarization,
}

impl Strategy {
    pub const ALL: [Strategy; 10] = [
        Strategy::ActiveListening,
        Strategy::Validation,
        Strategy::CognitiveReframing,
        Strategy::Empathy,
        Strategy::OpenEndedQuestions,
        Strategy::Reflection,
        Strategy::Normalization,
        Strategy::Psychoeducation,
        Strategy::Grounding,
        Strategy::Summarization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::ActiveListening => "active_listening",
            Strategy::Validation => "validation",
            Strategy::CognitiveReframing => "cognitive_reframing",
            Strategy::Empathy => "empathy",
            Strategy::OpenEndedQuestions => "open_ended_questions",
            Strategy::Reflection => "reflection",
            Strategy::Normalization => "normalization",
            Strategy::Psychoeducation => "psychoeducation",
            Strategy::Grounding => "grounding",
            Strategy::Summarization => "summarization",
        }
    }

    /// Human-readable label, e.g. `open ended questions`.
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| anyhow!("unknown strategy: {s}"))
    }
}
