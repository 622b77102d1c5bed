pub mod error;
pub mod events;
pub mod ids;
pub mod types;
pub mod wire;

pub use error::{ProtocolError, ProtocolResult};
pub use events::{ClientEvent, EventKind, SentMessage, ServerEvent};
pub use ids::{ConversationId, MessageId, UserId};
pub use types::{
    Conversation, ConversationKind, MIN_GROUP_MEMBERS, Message, MessagePreview, TypingSignal, User,
};
pub use wire::{
    AccessChatBody, CreateGroupBody, SendMessageBody, WireChatRef, WireConversation, WireMessage,
    WireRef, WireTyping, WireTypingSignal, WireUser,
};
