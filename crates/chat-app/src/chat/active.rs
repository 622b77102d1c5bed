use courier_protocol::{Conversation, ConversationId, Message};

/// Identifies one `open` so that a late history response can be told apart
/// from the one the user is currently waiting on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadTicket {
    pub conversation_id: ConversationId,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Ready,
    Error(String),
}

/// Message log of the one open conversation.
#[derive(Debug, Clone, Default)]
pub struct ActiveConversation {
    conversation: Option<Conversation>,
    messages: Vec<Message>,
    state: LoadState,
    generation: u64,
}

impl ActiveConversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches to `conversation`, discarding the previous log.
    pub fn open(&mut self, conversation: Conversation) -> LoadTicket {
        self.generation = self.generation.wrapping_add(1);
        let ticket = LoadTicket {
            conversation_id: conversation.id.clone(),
            generation: self.generation,
        };

        self.conversation = Some(conversation);
        self.messages.clear();
        self.state = LoadState::Loading;
        ticket
    }

    pub fn close(&mut self) -> Option<Conversation> {
        self.generation = self.generation.wrapping_add(1);
        self.messages.clear();
        self.state = LoadState::Idle;
        self.conversation.take()
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.generation == self.generation && self.id() == Some(&ticket.conversation_id)
    }

    /// Replaces the log with server history (oldest first) if `ticket` is still current.
    /// Messages that arrived while loading and are missing from the snapshot stay on the tail.
    pub fn load_messages(&mut self, ticket: &LoadTicket, mut messages: Vec<Message>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }

        let arrived = std::mem::take(&mut self.messages);
        for message in arrived {
            if !messages.iter().any(|known| known.id == message.id) {
                messages.push(message);
            }
        }
        self.messages = messages;
        self.state = LoadState::Ready;
        true
    }

    pub fn fail_load(&mut self, ticket: &LoadTicket, reason: impl Into<String>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }

        self.state = LoadState::Error(reason.into());
        true
    }

    /// Appends the server's response to our own send.
    pub fn append_local(&mut self, message: Message) -> bool {
        self.append(message)
    }

    /// Appends a pushed message addressed to the open conversation.
    pub fn append_remote(&mut self, message: Message) -> bool {
        self.append(message)
    }

    fn append(&mut self, message: Message) -> bool {
        if self.id() != Some(&message.conversation_id) {
            return false;
        }

        // The same message can come back through both the HTTP response and the push channel.
        if self.messages.iter().any(|existing| existing.id == message.id) {
            tracing::debug!(message_id = %message.id, "skipping duplicate message");
            return false;
        }

        self.messages.push(message);
        true
    }

    /// Swaps in a fresher copy of the open conversation's record.
    pub fn refresh_conversation(&mut self, conversation: &Conversation) {
        if let Some(current) = self.conversation.as_mut()
            && current.id == conversation.id
        {
            *current = conversation.clone();
        }
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn id(&self) -> Option<&ConversationId> {
        self.conversation.as_ref().map(|conversation| &conversation.id)
    }

    pub fn is_active(&self, conversation_id: &ConversationId) -> bool {
        self.id() == Some(conversation_id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{direct_with, message_in};

    #[test]
    fn late_history_for_a_previous_conversation_is_discarded() {
        let mut active = ActiveConversation::new();
        let ticket_a = active.open(direct_with("c-a", "u-2", "A"));
        let ticket_b = active.open(direct_with("c-b", "u-3", "B"));

        assert!(active.load_messages(&ticket_b, vec![message_in("c-b", "m-b1", "for b")]));
        assert!(!active.load_messages(&ticket_a, vec![message_in("c-a", "m-a1", "for a")]));

        assert_eq!(active.messages().len(), 1);
        assert_eq!(active.messages()[0].content, "for b");
        assert_eq!(active.state(), &LoadState::Ready);
    }

    #[test]
    fn reopening_the_same_conversation_invalidates_the_older_ticket() {
        let mut active = ActiveConversation::new();
        let first = active.open(direct_with("c-a", "u-2", "A"));
        let second = active.open(direct_with("c-a", "u-2", "A"));

        assert!(!active.is_current(&first));
        assert!(active.is_current(&second));
    }

    #[test]
    fn appends_land_on_the_tail_of_the_open_conversation_only() {
        let mut active = ActiveConversation::new();
        let ticket = active.open(direct_with("c-a", "u-2", "A"));
        active.load_messages(&ticket, vec![message_in("c-a", "m-1", "one")]);

        let local = message_in("c-a", "m-2", "two");
        assert!(active.append_local(local.clone()));
        assert_eq!(active.messages().last(), Some(&local));

        let remote = message_in("c-a", "m-3", "three");
        assert!(active.append_remote(remote.clone()));
        assert_eq!(active.messages().last(), Some(&remote));

        assert!(!active.append_remote(message_in("c-other", "m-4", "elsewhere")));
        assert!(!active.append_remote(local));
        assert_eq!(active.messages().len(), 3);
    }

    #[test]
    fn messages_pushed_while_loading_survive_the_history_snapshot() {
        let mut active = ActiveConversation::new();
        let ticket = active.open(direct_with("c-a", "u-2", "A"));

        assert!(active.append_remote(message_in("c-a", "m-2", "already in history")));
        assert!(active.append_remote(message_in("c-a", "m-3", "after the snapshot")));
        assert!(active.load_messages(
            &ticket,
            vec![
                message_in("c-a", "m-1", "one"),
                message_in("c-a", "m-2", "already in history"),
            ],
        ));

        let ids: Vec<_> = active.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m-1", "m-2", "m-3"]);
    }

    #[test]
    fn failed_load_moves_to_error_without_touching_the_log() {
        let mut active = ActiveConversation::new();
        let ticket = active.open(direct_with("c-a", "u-2", "A"));

        assert!(active.fail_load(&ticket, "status 500"));
        assert_eq!(active.state(), &LoadState::Error("status 500".to_string()));
        assert!(active.messages().is_empty());

        assert_eq!(active.close().map(|conversation| conversation.id), Some(ticket.conversation_id.clone()));
        assert!(!active.is_current(&ticket));
        assert_eq!(active.state(), &LoadState::Idle);
    }
}
