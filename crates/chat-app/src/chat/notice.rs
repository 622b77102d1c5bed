use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Transient user-facing message; drained by whoever renders the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

impl From<&ChatError> for Notice {
    fn from(error: &ChatError) -> Self {
        let level = match error {
            ChatError::GroupNameMissing { .. }
            | ChatError::GroupTooSmall { .. }
            | ChatError::NoActiveConversation { .. }
            | ChatError::UnknownConversation { .. } => NoticeLevel::Warning,
            _ => NoticeLevel::Error,
        };
        Self::new(level, error.to_string())
    }
}
