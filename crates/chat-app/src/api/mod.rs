use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use courier_protocol::{Conversation, ConversationId, Message, ProtocolError, User, UserId};
use snafu::Snafu;

mod http;

pub use http::HttpChatApi;

use crate::settings::ClientSettings;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ApiError {
    #[snafu(display("failed to build HTTP client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request to {url} failed on `{stage}`: {source}"))]
    Request {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("{url} returned status {status}: {body}"))]
    Status {
        stage: &'static str,
        url: String,
        status: u16,
        body: String,
    },
    #[snafu(display("{url} returned malformed JSON on `{stage}`: {source}"))]
    Decode {
        stage: &'static str,
        url: String,
        source: serde_json::Error,
    },
    #[snafu(display("{url} returned an invalid record on `{stage}`: {source}"))]
    Payload {
        stage: &'static str,
        url: String,
        source: ProtocolError,
    },
}

impl ApiError {
    /// True when the server rejected the session rather than the request.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroup {
    pub name: String,
    pub members: Vec<UserId>,
}

/// The request/response half of the chat backend.
pub trait ChatApi: Send + Sync {
    fn list_conversations<'a>(&'a self) -> BoxFuture<'a, ApiResult<Vec<Conversation>>>;
    fn search_users<'a>(&'a self, search: Option<&'a str>) -> BoxFuture<'a, ApiResult<Vec<User>>>;
    fn list_messages<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, ApiResult<Vec<Message>>>;
    fn send_message<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        content: &'a str,
    ) -> BoxFuture<'a, ApiResult<Message>>;
    fn access_conversation<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> BoxFuture<'a, ApiResult<Conversation>>;
    fn create_group<'a>(&'a self, group: &'a NewGroup) -> BoxFuture<'a, ApiResult<Conversation>>;
}

pub fn create_api(settings: &ClientSettings) -> ApiResult<Arc<dyn ChatApi>> {
    Ok(Arc::new(HttpChatApi::new(settings)?))
}
