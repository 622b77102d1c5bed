//! JSON records exactly as the chat server produces them.
//!
//! Every field is optional here; required-ness is enforced when a record is
//! converted into its domain type, so malformed payloads surface as
//! [`ProtocolError`] instead of leaking half-filled values into client state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::OptionExt;

use super::error::{InvalidPayloadSnafu, MissingFieldSnafu, ProtocolError, ProtocolResult};
use super::ids::{ConversationId, MessageId, UserId};
use super::types::{
    Conversation, ConversationKind, Message, MessagePreview, TypingSignal, User,
};

/// A reference the server may send either as a bare id or as the populated record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireRef<T> {
    Id(String),
    Record(T),
}

pub trait WireRecord {
    fn record_id(&self) -> Option<&str>;
}

impl<T: WireRecord> WireRef<T> {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Id(raw) => Some(raw.as_str()),
            Self::Record(record) => record.record_id(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUser {
    #[serde(rename = "_id", alias = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(alias = "avatar", default, skip_serializing_if = "Option::is_none")]
    pub pic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl WireRecord for WireUser {
    fn record_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireConversation {
    #[serde(rename = "_id", alias = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_name: Option<String>,
    #[serde(default)]
    pub is_group_chat: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<WireUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_message: Option<Box<WireMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_admin: Option<WireRef<WireUser>>,
}

impl WireRecord for WireConversation {
    fn record_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// The conversation a message points at. Only `_id` is read back; the
/// participants go out populated so the server can fan the message out, but
/// may come back as bare ids and any other field is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireChatRef {
    #[serde(rename = "_id", alias = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_name: Option<String>,
    #[serde(default)]
    pub is_group_chat: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<WireRef<WireUser>>,
}

impl WireRecord for WireChatRef {
    fn record_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(rename = "_id", alias = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<WireRef<WireUser>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<WireRef<WireChatRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl WireMessage {
    /// Payload for the `new message` event. The server fans the message out to
    /// `chat.users`, so the conversation travels populated.
    pub fn outbound(message: &Message, conversation: &Conversation) -> Self {
        Self {
            id: Some(message.id.to_string()),
            sender: Some(WireRef::Record(WireUser::from(&message.sender))),
            content: Some(message.content.clone()),
            chat: Some(WireRef::Record(WireChatRef::from(conversation))),
            created_at: Some(message.created_at),
        }
    }

    fn preview(&self) -> Option<MessagePreview> {
        let content = self.content.clone()?;
        let sender_name = match &self.sender {
            Some(WireRef::Record(user)) => user.name.clone(),
            Some(WireRef::Id(_)) | None => None,
        };

        Some(MessagePreview {
            sender_name,
            content,
            created_at: self.created_at,
        })
    }
}

/// Typing payloads arrive either as a bare room id or as a signal object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTyping {
    Room(String),
    Signal(WireTypingSignal),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTypingSignal {
    #[serde(alias = "room", default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    pub content: String,
    pub chat_id: ConversationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessChatBody {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateGroupBody {
    pub name: String,
    pub users: Vec<UserId>,
}

fn required<T>(value: Option<T>, entity: &'static str, field: &'static str) -> ProtocolResult<T> {
    value.context(MissingFieldSnafu {
        stage: "validate-wire-record",
        entity,
        field,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

impl TryFrom<WireUser> for User {
    type Error = ProtocolError;

    fn try_from(wire: WireUser) -> ProtocolResult<Self> {
        let id = UserId::parse(&required(wire.id, "user", "_id")?)?;
        let name = required(wire.name, "user", "name")?;

        Ok(Self {
            id,
            name: name.trim().to_string(),
            avatar: non_blank(wire.pic),
            role: non_blank(wire.role),
        })
    }
}

impl TryFrom<WireConversation> for Conversation {
    type Error = ProtocolError;

    fn try_from(wire: WireConversation) -> ProtocolResult<Self> {
        let id = ConversationId::parse(&required(wire.id, "conversation", "_id")?)?;
        let kind = if wire.is_group_chat {
            ConversationKind::Group
        } else {
            ConversationKind::Direct
        };
        let name = wire
            .chat_name
            .map(|raw| raw.trim().to_string())
            .unwrap_or_default();
        if kind == ConversationKind::Group && name.is_empty() {
            return MissingFieldSnafu {
                stage: "validate-group-name",
                entity: "conversation",
                field: "chatName",
            }
            .fail();
        }

        let participants = wire
            .users
            .into_iter()
            .map(User::try_from)
            .collect::<ProtocolResult<Vec<_>>>()?;

        let group_admin = match wire.group_admin {
            Some(admin) => {
                let raw = admin.id().context(MissingFieldSnafu {
                    stage: "validate-group-admin",
                    entity: "conversation",
                    field: "groupAdmin._id",
                })?;
                Some(UserId::parse(raw)?)
            }
            None => None,
        };

        Ok(Self {
            id,
            kind,
            participants,
            name,
            preview: wire.latest_message.as_deref().and_then(WireMessage::preview),
            group_admin,
        })
    }
}

impl TryFrom<WireMessage> for Message {
    type Error = ProtocolError;

    fn try_from(wire: WireMessage) -> ProtocolResult<Self> {
        let id = MessageId::parse(&required(wire.id, "message", "_id")?)?;
        let sender = match required(wire.sender, "message", "sender")? {
            WireRef::Record(user) => User::try_from(user)?,
            WireRef::Id(raw) => {
                return InvalidPayloadSnafu {
                    stage: "validate-message-sender",
                    entity: "message",
                    details: format!("sender '{raw}' is not populated"),
                }
                .fail();
            }
        };
        let chat = required(wire.chat, "message", "chat")?;
        let conversation_id = ConversationId::parse(chat.id().context(MissingFieldSnafu {
            stage: "validate-message-chat",
            entity: "message",
            field: "chat._id",
        })?)?;

        Ok(Self {
            id,
            conversation_id,
            sender,
            content: required(wire.content, "message", "content")?,
            created_at: required(wire.created_at, "message", "createdAt")?,
        })
    }
}

impl TryFrom<WireTyping> for TypingSignal {
    type Error = ProtocolError;

    fn try_from(wire: WireTyping) -> ProtocolResult<Self> {
        match wire {
            WireTyping::Room(raw) => Ok(Self::new(ConversationId::parse(&raw)?, None)),
            WireTyping::Signal(signal) => {
                let conversation_id =
                    ConversationId::parse(&required(signal.chat_id, "typing", "chatId")?)?;
                let user_id = match non_blank(signal.user_id) {
                    Some(raw) => Some(UserId::parse(&raw)?),
                    None => None,
                };
                Ok(Self::new(conversation_id, user_id))
            }
        }
    }
}

impl From<&User> for WireUser {
    fn from(user: &User) -> Self {
        Self {
            id: Some(user.id.to_string()),
            name: Some(user.name.clone()),
            pic: user.avatar.clone(),
            role: user.role.clone(),
        }
    }
}

impl From<&Conversation> for WireChatRef {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: Some(conversation.id.to_string()),
            chat_name: Some(conversation.name.clone()).filter(|name| !name.is_empty()),
            is_group_chat: conversation.is_group(),
            users: conversation
                .participants
                .iter()
                .map(|user| WireRef::Record(WireUser::from(user)))
                .collect(),
        }
    }
}

impl From<&TypingSignal> for WireTyping {
    fn from(signal: &TypingSignal) -> Self {
        Self::Signal(WireTypingSignal {
            chat_id: Some(signal.conversation_id.to_string()),
            user_id: signal.user_id.as_ref().map(ToString::to_string),
        })
    }
}
