//! Realtime event contracts shared by the sending and receiving side.
//!
//! Frames are JSON text envelopes `{"event": <wire name>, "data": <payload>}`.
//! [`EventKind`] is the only place wire names are spelled out.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::{OptionExt, ResultExt};

use super::error::{DecodeFrameSnafu, EncodeFrameSnafu, InvalidPayloadSnafu, ProtocolResult};
use super::ids::ConversationId;
use super::types::{Conversation, Message, TypingSignal, User};
use super::wire::{WireMessage, WireTyping, WireUser};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Setup,
    JoinChat,
    TypingStart,
    TypingStop,
    MessageSent,
    MessageReceived,
    Connected,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Setup,
        EventKind::JoinChat,
        EventKind::TypingStart,
        EventKind::TypingStop,
        EventKind::MessageSent,
        EventKind::MessageReceived,
        EventKind::Connected,
    ];

    /// Events the server pushes to clients.
    pub const INBOUND: [EventKind; 4] = [
        EventKind::Connected,
        EventKind::TypingStart,
        EventKind::TypingStop,
        EventKind::MessageReceived,
    ];

    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::JoinChat => "join chat",
            Self::TypingStart => "typing",
            Self::TypingStop => "stop typing",
            Self::MessageSent => "new message",
            Self::MessageReceived => "message received",
            Self::Connected => "connected",
        }
    }

    pub fn from_wire_name(raw: &str) -> Option<Self> {
        match raw {
            "setup" => Some(Self::Setup),
            "join chat" => Some(Self::JoinChat),
            "typing" => Some(Self::TypingStart),
            "stop typing" => Some(Self::TypingStop),
            "new message" => Some(Self::MessageSent),
            // Older servers emit the misspelled name.
            "message received" | "message recieved" => Some(Self::MessageReceived),
            "connected" => Some(Self::Connected),
            _ => None,
        }
    }

    pub const fn is_inbound(self) -> bool {
        matches!(
            self,
            Self::Connected | Self::TypingStart | Self::TypingStop | Self::MessageReceived
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    data: Value,
}

/// A message this client authored, echoed so other participants update live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message: Message,
    pub conversation: Conversation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Setup(User),
    JoinChat(ConversationId),
    TypingStart(TypingSignal),
    TypingStop(TypingSignal),
    MessageSent(Box<SentMessage>),
}

impl ClientEvent {
    pub fn message_sent(message: Message, conversation: Conversation) -> Self {
        Self::MessageSent(Box::new(SentMessage {
            message,
            conversation,
        }))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Setup(_) => EventKind::Setup,
            Self::JoinChat(_) => EventKind::JoinChat,
            Self::TypingStart(_) => EventKind::TypingStart,
            Self::TypingStop(_) => EventKind::TypingStop,
            Self::MessageSent(_) => EventKind::MessageSent,
        }
    }

    pub fn encode(&self) -> ProtocolResult<String> {
        let data = match self {
            Self::Setup(user) => serde_json::to_value(WireUser::from(user)),
            Self::JoinChat(conversation_id) => serde_json::to_value(conversation_id),
            Self::TypingStart(signal) | Self::TypingStop(signal) => {
                serde_json::to_value(WireTyping::from(signal))
            }
            Self::MessageSent(sent) => {
                serde_json::to_value(WireMessage::outbound(&sent.message, &sent.conversation))
            }
        }
        .context(EncodeFrameSnafu {
            stage: "encode-frame-payload",
        })?;

        serde_json::to_string(&Frame {
            event: self.kind().wire_name().to_string(),
            data,
        })
        .context(EncodeFrameSnafu {
            stage: "encode-frame-envelope",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Handshake acknowledgement for `setup`.
    Connected,
    TypingStarted(TypingSignal),
    TypingStopped(TypingSignal),
    MessageReceived(Message),
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected => EventKind::Connected,
            Self::TypingStarted(_) => EventKind::TypingStart,
            Self::TypingStopped(_) => EventKind::TypingStop,
            Self::MessageReceived(_) => EventKind::MessageReceived,
        }
    }

    pub fn decode(text: &str) -> ProtocolResult<Self> {
        let frame: Frame = serde_json::from_str(text).context(DecodeFrameSnafu {
            stage: "decode-frame-envelope",
        })?;
        let kind = EventKind::from_wire_name(&frame.event).context(InvalidPayloadSnafu {
            stage: "decode-frame-kind",
            entity: "realtime frame",
            details: format!("unknown event '{}'", frame.event),
        })?;

        match kind {
            EventKind::Connected => Ok(Self::Connected),
            EventKind::TypingStart => Ok(Self::TypingStarted(decode_typing(frame.data)?)),
            EventKind::TypingStop => Ok(Self::TypingStopped(decode_typing(frame.data)?)),
            EventKind::MessageReceived => {
                let wire: WireMessage =
                    serde_json::from_value(frame.data).context(DecodeFrameSnafu {
                        stage: "decode-message-received",
                    })?;
                Ok(Self::MessageReceived(Message::try_from(wire)?))
            }
            EventKind::Setup | EventKind::JoinChat | EventKind::MessageSent => {
                InvalidPayloadSnafu {
                    stage: "decode-frame-direction",
                    entity: "realtime frame",
                    details: format!("'{}' is not a server event", kind.wire_name()),
                }
                .fail()
            }
        }
    }
}

fn decode_typing(data: Value) -> ProtocolResult<TypingSignal> {
    let wire: WireTyping = serde_json::from_value(data).context(DecodeFrameSnafu {
        stage: "decode-typing-signal",
    })?;
    TypingSignal::try_from(wire)
}
