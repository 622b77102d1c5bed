use courier_protocol::{ConversationId, Message};

/// Messages that arrived for conversations other than the open one.
#[derive(Debug, Clone, Default)]
pub struct NotificationAccumulator {
    pending: Vec<Message>,
}

impl NotificationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps `message` unless it belongs to the active conversation.
    pub fn record(&mut self, message: Message, active: Option<&ConversationId>) -> bool {
        if active == Some(&message.conversation_id) {
            return false;
        }

        self.pending.push(message);
        true
    }

    /// Drops every entry for `conversation_id`, returning how many were removed.
    pub fn clear(&mut self, conversation_id: &ConversationId) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|message| &message.conversation_id != conversation_id);
        before - self.pending.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn count_for(&self, conversation_id: &ConversationId) -> usize {
        self.pending
            .iter()
            .filter(|message| &message.conversation_id == conversation_id)
            .count()
    }

    pub fn has_unread(&self, conversation_id: &ConversationId) -> bool {
        self.pending
            .iter()
            .any(|message| &message.conversation_id == conversation_id)
    }
}
