use std::path::PathBuf;

use courier_protocol::{ConversationId, ProtocolError};
use snafu::Snafu;

use crate::api::ApiError;
use crate::persist::PersistError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display("no signed-in user at {path:?}; log in first"))]
    AuthRequired { stage: &'static str, path: PathBuf },
    #[snafu(display("failed to load {resource}: {source}"))]
    Fetch {
        stage: &'static str,
        resource: &'static str,
        source: ApiError,
    },
    #[snafu(display("failed to send message to {conversation_id}: {source}"))]
    Send {
        stage: &'static str,
        conversation_id: ConversationId,
        source: ApiError,
    },
    #[snafu(display("failed to open realtime connection to {url}: {source}"))]
    Connection {
        stage: &'static str,
        url: String,
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[snafu(display("group name must not be empty"))]
    GroupNameMissing { stage: &'static str },
    #[snafu(display("group '{name}' needs at least {required} members, got {actual}"))]
    GroupTooSmall {
        stage: &'static str,
        name: String,
        required: usize,
        actual: usize,
    },
    #[snafu(display("no conversation is open"))]
    NoActiveConversation { stage: &'static str },
    #[snafu(display("conversation {target} is not in the chat list"))]
    UnknownConversation {
        stage: &'static str,
        target: String,
    },
    #[snafu(display("failed to read identity file at {path:?}: {source}"))]
    ReadIdentity {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("identity file at {path:?} is malformed: {source}"))]
    ParseIdentity {
        stage: &'static str,
        path: PathBuf,
        source: serde_json::Error,
    },
    #[snafu(display("identity file at {path:?} is invalid: {source}"))]
    InvalidIdentity {
        stage: &'static str,
        path: PathBuf,
        source: ProtocolError,
    },
    #[snafu(display("failed to encode identity for {user_id}: {source}"))]
    SerializeIdentity {
        stage: &'static str,
        user_id: String,
        source: serde_json::Error,
    },
    #[snafu(display("failed to store identity: {source}"))]
    StoreIdentity {
        stage: &'static str,
        source: PersistError,
    },
    #[snafu(display("failed to remove identity file at {path:?}: {source}"))]
    RemoveIdentity {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ChatError {
    /// Whether the failure means the user has to sign in again.
    pub fn requires_login(&self) -> bool {
        match self {
            Self::AuthRequired { .. } => true,
            Self::Fetch { source, .. } | Self::Send { source, .. } => source.is_unauthorized(),
            _ => false,
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
