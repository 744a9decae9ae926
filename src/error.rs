use thiserror::Error;

/// Rejections raised before any board mutation happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("URL cannot be empty")]
    EmptyUrl,
    #[error("invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("no tabs exist yet; create a tab first")]
    NoTabs,
    #[error("no tab is active; select a tab first")]
    NoActiveTab,
    #[error("no tab for {0}")]
    TabNotFound(String),
    #[error("cannot create tabs for future dates ({0})")]
    FutureDate(String),
    #[error("group name cannot be empty")]
    EmptyGroupName,
    #[error("no tab deletion is awaiting confirmation")]
    NoPendingDeletion,
}

impl CommandError {
    /// Short notification heading for the failure.
    pub fn title(&self) -> &'static str {
        match self {
            CommandError::EmptyUrl | CommandError::InvalidUrl(_) => "Invalid Link",
            CommandError::NoTabs => "No Tab Selected",
            CommandError::NoActiveTab => "No Tab Active",
            CommandError::TabNotFound(_) => "Tab Not Found",
            CommandError::FutureDate(_) => "Future Date Tab Not Allowed",
            CommandError::EmptyGroupName => "Group Name Required",
            CommandError::NoPendingDeletion => "Nothing To Confirm",
        }
    }
}
