use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const BASE_PROMPT: &str = "You are a Strategic Business Intelligence Analyst.";

/// Marker placed between the system prompt and any retrieved or searched context.
pub const CONTEXT_DELIMITER: &str = "\n\nCONTEXT FROM DOCUMENTS/SEARCH:\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    #[default]
    Concise,
    Detailed,
}

impl ResponseMode {
    pub fn system_prompt(&self) -> String {
        let style = match self {
            ResponseMode::Concise => {
                "Provide short, executive summaries. Focus on key metrics and high-level insights. Be brief and to the point."
            }
            ResponseMode::Detailed => {
                "Provide detailed, in-depth analysis. Explain the 'why' and 'how'. Include context, nuance, and comprehensive explanations."
            }
        };
        format!("{} {}", BASE_PROMPT, style)
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseMode::Concise => f.write_str("concise"),
            ResponseMode::Detailed => f.write_str("detailed"),
        }
    }
}

impl FromStr for ResponseMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "concise" => Ok(ResponseMode::Concise),
            "detailed" => Ok(ResponseMode::Detailed),
            _ => Err(AppError::Config(crate::config::ConfigError::InvalidValue {
                key: "response mode",
                value: s.to_string(),
            })),
        }
    }
}

/// Append `context` under [`CONTEXT_DELIMITER`] when it is non-empty.
pub fn with_context(template: &str, context: &str) -> String {
    if context.is_empty() {
        template.to_string()
    } else {
        format!("{}{}{}", template, CONTEXT_DELIMITER, context)
    }
}
