use chrono::{DateTime, Utc};

use super::ids::{ConversationId, MessageId, UserId};

/// A group needs at least this many members besides its creator.
pub const MIN_GROUP_MEMBERS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub avatar: Option<String>,
    pub role: Option<String>,
}

impl User {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            avatar: None,
            role: None,
        }
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationKind {
    Direct,
    Group,
}

/// Last-message summary rendered in the chat list. Composed server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePreview {
    pub sender_name: Option<String>,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ConversationKind,
    pub participants: Vec<User>,
    /// Group name. Direct conversations carry whatever the server stored here.
    pub name: String,
    pub preview: Option<MessagePreview>,
    pub group_admin: Option<UserId>,
}

impl Conversation {
    pub fn direct(id: ConversationId, participants: Vec<User>) -> Self {
        Self {
            id,
            kind: ConversationKind::Direct,
            participants,
            name: String::new(),
            preview: None,
            group_admin: None,
        }
    }

    pub fn group(
        id: ConversationId,
        name: impl Into<String>,
        participants: Vec<User>,
        admin: UserId,
    ) -> Self {
        Self {
            id,
            kind: ConversationKind::Group,
            participants,
            name: name.into(),
            preview: None,
            group_admin: Some(admin),
        }
    }

    pub fn with_preview(mut self, preview: MessagePreview) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, ConversationKind::Group)
    }

    pub fn includes(&self, user_id: &UserId) -> bool {
        self.participants.iter().any(|user| &user.id == user_id)
    }

    pub fn other_participants<'a>(&'a self, me: &'a UserId) -> impl Iterator<Item = &'a User> {
        self.participants.iter().filter(move |user| &user.id != me)
    }

    /// Direct chats are titled after the other participant, groups after the group name.
    pub fn display_name(&self, me: &UserId) -> String {
        match self.kind {
            ConversationKind::Group => self.name.clone(),
            ConversationKind::Direct => self
                .other_participants(me)
                .next()
                .map(|user| user.name.clone())
                .unwrap_or_else(|| self.name.clone()),
        }
    }
}

/// Immutable once created; ordered by creation within its conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: User,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_from(&self, user_id: &UserId) -> bool {
        &self.sender.id == user_id
    }

    pub fn preview(&self) -> MessagePreview {
        MessagePreview {
            sender_name: Some(self.sender.name.clone()),
            content: self.content.clone(),
            created_at: Some(self.created_at),
        }
    }
}

/// Ephemeral "someone is composing" marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypingSignal {
    pub conversation_id: ConversationId,
    pub user_id: Option<UserId>,
}

impl TypingSignal {
    pub fn new(conversation_id: ConversationId, user_id: Option<UserId>) -> Self {
        Self {
            conversation_id,
            user_id,
        }
    }
}
