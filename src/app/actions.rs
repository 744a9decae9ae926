use std::fmt;

use strum::Display;

use crate::error::CommandError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutcomeLevel {
    Success,
    Info,
    Failure,
}

/// User-facing result of a board command: a short heading plus one line of
/// detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub level: OutcomeLevel,
    pub title: String,
    pub description: String,
}

impl Outcome {
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(OutcomeLevel::Success, title, description)
    }

    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(OutcomeLevel::Info, title, description)
    }

    pub fn failure(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(OutcomeLevel::Failure, title, description)
    }

    pub fn is_failure(&self) -> bool {
        self.level == OutcomeLevel::Failure
    }

    fn new(level: OutcomeLevel, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            description: description.into(),
        }
    }
}

impl From<CommandError> for Outcome {
    fn from(err: CommandError) -> Self {
        Outcome::failure(err.title(), err.to_string())
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            write!(f, "{}", self.title)
        } else {
            write!(f, "{}: {}", self.title, self.description)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_errors_become_failures() {
        let outcome = Outcome::from(CommandError::FutureDate("2099-01-01".into()));
        assert!(outcome.is_failure());
        assert_eq!(outcome.title, "Future Date Tab Not Allowed");
        assert_eq!(
            outcome.to_string(),
            "Future Date Tab Not Allowed: cannot create tabs for future dates (2099-01-01)"
        );
    }

    #[test]
    fn display_skips_empty_description() {
        assert_eq!(Outcome::info("Deletion Cancelled", "").to_string(), "Deletion Cancelled");
        assert_eq!(OutcomeLevel::Success.to_string(), "success");
    }
}
