use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::ErrorCode;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub details: Option<Value>,
}

impl CommandError {
    /// Error built from the code's own message and suggestion.
    pub fn from_code(code: ErrorCode) -> Self {
        let template = code.template();
        Self {
            code,
            message: template.message.to_string(),
            suggestion: Some(template.suggestion.to_string()),
            details: None,
        }
    }

    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::from_code(code)
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// A `VALIDATION_ERROR` whose message comes from a finer-grained reason.
    pub fn invalid(field: &str, reason: ErrorCode) -> Self {
        let template = reason.template();
        Self {
            code: ErrorCode::ValidationError,
            message: template.message.to_string(),
            suggestion: Some(template.suggestion.to_string()),
            details: Some(serde_json::json!({ "field": field, "reason": reason })),
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Warning {
    pub code: String,
    pub message: String,
}

/// Uniform envelope returned by every command on every surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<CommandError>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub suggestions: Vec<String>,
}

impl<T> CommandResult<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            reasoning: None,
            confidence: None,
            warnings: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn failure(error: CommandError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            reasoning: None,
            confidence: None,
            warnings: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_warning(mut self, code: &str, message: impl Into<String>) -> Self {
        self.warnings.push(Warning {
            code: code.to_string(),
            message: message.into(),
        });
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

impl<T: Serialize> CommandResult<T> {
    /// Erases the payload type so results can cross a transport boundary.
    pub fn into_json(self) -> CommandResult<Value> {
        let CommandResult {
            success,
            data,
            error,
            reasoning,
            confidence,
            warnings,
            suggestions,
        } = self;
        let data = match data.map(serde_json::to_value).transpose() {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("Failed to serialize command output: {}", e);
                return CommandResult::failure(CommandError::from_code(ErrorCode::InternalError));
            }
        };
        CommandResult {
            success,
            data,
            error,
            reasoning,
            confidence,
            warnings,
            suggestions,
        }
    }
}

impl<T> From<CommandError> for CommandResult<T> {
    fn from(error: CommandError) -> Self {
        CommandResult::failure(error)
    }
}
