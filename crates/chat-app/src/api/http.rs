use std::time::Duration;

use courier_protocol::{
    AccessChatBody, Conversation, ConversationId, CreateGroupBody, Message, ProtocolError,
    SendMessageBody, User, UserId, WireConversation, WireMessage, WireUser,
};
use reqwest::{Client, RequestBuilder, header};
use serde::de::DeserializeOwned;
use snafu::ResultExt;

use super::{
    ApiResult, BoxFuture, BuildClientSnafu, ChatApi, DecodeSnafu, NewGroup, PayloadSnafu,
    RequestSnafu, StatusSnafu,
};
use crate::settings::ClientSettings;

/// `ChatApi` over the server's JSON REST endpoints.
///
/// Credentials ride on the client's cookie jar; no explicit auth header is sent.
pub struct HttpChatApi {
    client: Client,
    base_url: String,
}

impl HttpChatApi {
    pub fn new(settings: &ClientSettings) -> ApiResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .cookie_store(true)
            .default_headers(headers)
            .build()
            .context(BuildClientSnafu {
                stage: "http-api-new",
            })?;

        Ok(Self {
            client,
            base_url: settings.api_base_url.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let suffix = path.trim_start_matches('/');
        format!("{base}/{suffix}")
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        stage: &'static str,
        url: &str,
        request: RequestBuilder,
    ) -> ApiResult<T> {
        let response = request.send().await.context(RequestSnafu {
            stage,
            url: url.to_string(),
        })?;

        let status = response.status();
        let body = response.text().await.context(RequestSnafu {
            stage,
            url: url.to_string(),
        })?;

        if !status.is_success() {
            tracing::warn!(%url, status = status.as_u16(), "chat api request rejected");
            return StatusSnafu {
                stage,
                url: url.to_string(),
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        serde_json::from_str(&body).context(DecodeSnafu {
            stage,
            url: url.to_string(),
        })
    }
}

fn validate_one<W, T>(stage: &'static str, url: &str, record: W) -> ApiResult<T>
where
    T: TryFrom<W, Error = ProtocolError>,
{
    T::try_from(record).context(PayloadSnafu {
        stage,
        url: url.to_string(),
    })
}

// One invalid record fails the whole response so callers never apply a partial list.
fn validate_all<W, T>(stage: &'static str, url: &str, records: Vec<W>) -> ApiResult<Vec<T>>
where
    T: TryFrom<W, Error = ProtocolError>,
{
    records
        .into_iter()
        .map(|record| validate_one(stage, url, record))
        .collect()
}

impl ChatApi for HttpChatApi {
    fn list_conversations<'a>(&'a self) -> BoxFuture<'a, ApiResult<Vec<Conversation>>> {
        Box::pin(async move {
            let url = self.endpoint("/api/chat");
            let records: Vec<WireConversation> = self
                .request_json("list-conversations", &url, self.client.get(&url))
                .await?;
            validate_all("validate-conversations", &url, records)
        })
    }

    fn search_users<'a>(&'a self, search: Option<&'a str>) -> BoxFuture<'a, ApiResult<Vec<User>>> {
        Box::pin(async move {
            let url = self.endpoint("/api/user");
            let mut request = self.client.get(&url);
            if let Some(search) = search.map(str::trim).filter(|search| !search.is_empty()) {
                request = request.query(&[("search", search)]);
            }
            let records: Vec<WireUser> = self.request_json("search-users", &url, request).await?;
            validate_all("validate-users", &url, records)
        })
    }

    fn list_messages<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, ApiResult<Vec<Message>>> {
        Box::pin(async move {
            let url = self.endpoint(&format!("/api/message/{conversation_id}"));
            let records: Vec<WireMessage> = self
                .request_json("list-messages", &url, self.client.get(&url))
                .await?;
            validate_all("validate-messages", &url, records)
        })
    }

    fn send_message<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        content: &'a str,
    ) -> BoxFuture<'a, ApiResult<Message>> {
        Box::pin(async move {
            let url = self.endpoint("/api/message");
            let body = SendMessageBody {
                content: content.to_string(),
                chat_id: conversation_id.clone(),
            };
            let record: WireMessage = self
                .request_json("send-message", &url, self.client.post(&url).json(&body))
                .await?;
            validate_one("validate-sent-message", &url, record)
        })
    }

    fn access_conversation<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> BoxFuture<'a, ApiResult<Conversation>> {
        Box::pin(async move {
            let url = self.endpoint("/api/chat");
            let body = AccessChatBody {
                user_id: user_id.clone(),
            };
            let record: WireConversation = self
                .request_json(
                    "access-conversation",
                    &url,
                    self.client.post(&url).json(&body),
                )
                .await?;
            validate_one("validate-accessed-conversation", &url, record)
        })
    }

    fn create_group<'a>(&'a self, group: &'a NewGroup) -> BoxFuture<'a, ApiResult<Conversation>> {
        Box::pin(async move {
            let url = self.endpoint("/api/chat/group");
            let body = CreateGroupBody {
                name: group.name.clone(),
                users: group.members.clone(),
            };
            let record: WireConversation = self
                .request_json("create-group", &url, self.client.post(&url).json(&body))
                .await?;
            validate_one("validate-created-group", &url, record)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_doubled_slashes() {
        let settings = ClientSettings {
            api_base_url: "http://dispatch.local:5000/".to_string(),
            ..ClientSettings::default()
        };
        let api = HttpChatApi::new(&settings).expect("client builds");

        assert_eq!(
            api.endpoint("/api/message/c-1"),
            "http://dispatch.local:5000/api/message/c-1"
        );
        assert_eq!(api.endpoint("api/chat"), "http://dispatch.local:5000/api/chat");
    }
}
