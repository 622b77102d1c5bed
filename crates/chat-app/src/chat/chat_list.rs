use courier_protocol::{Conversation, ConversationId, UserId};

use super::notifications::NotificationAccumulator;

/// One rendered row of the chat list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatListEntry<'a> {
    pub conversation: &'a Conversation,
    pub display_name: String,
    pub unread: bool,
}

/// The user's conversations, most recent first.
#[derive(Debug, Clone, Default)]
pub struct ChatListStore {
    conversations: Vec<Conversation>,
    loaded: bool,
}

impl ChatListStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the list wholesale with a freshly fetched one.
    pub fn replace(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
        self.loaded = true;
    }

    /// Inserts at the front when absent; otherwise refreshes the record in place.
    pub fn upsert(&mut self, conversation: Conversation) -> bool {
        match self
            .conversations
            .iter_mut()
            .find(|existing| existing.id == conversation.id)
        {
            Some(existing) => {
                *existing = conversation;
                false
            }
            None => {
                self.conversations.insert(0, conversation);
                true
            }
        }
    }

    pub fn find(&self, conversation_id: &ConversationId) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| &conversation.id == conversation_id)
    }

    pub fn get(&self, index: usize) -> Option<&Conversation> {
        self.conversations.get(index)
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn entries<'a>(
        &'a self,
        me: &UserId,
        notifications: &NotificationAccumulator,
    ) -> Vec<ChatListEntry<'a>> {
        self.conversations
            .iter()
            .map(|conversation| ChatListEntry {
                conversation,
                display_name: conversation.display_name(me),
                unread: notifications.has_unread(&conversation.id),
            })
            .collect()
    }
}
