use std::time::{Duration, Instant};

use courier_protocol::{ConversationId, TypingSignal};

/// Transition the caller has to announce over the realtime link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypingChange {
    Started(ConversationId),
    Stopped(ConversationId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LocalTyping {
    NotTyping,
    Typing {
        conversation_id: ConversationId,
        deadline: Instant,
    },
}

/// Local typing state: `NotTyping -> Typing` on the first keystroke, back to
/// `NotTyping` after a quiet period, a send, or a conversation switch.
#[derive(Debug, Clone)]
pub struct TypingTracker {
    quiet: Duration,
    state: LocalTyping,
}

impl TypingTracker {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            state: LocalTyping::NotTyping,
        }
    }

    pub fn keystroke(&mut self, conversation_id: &ConversationId, now: Instant) -> Option<TypingChange> {
        let deadline = now + self.quiet;
        match &mut self.state {
            LocalTyping::Typing {
                conversation_id: typing_in,
                deadline: current,
            } if *typing_in == *conversation_id => {
                *current = deadline;
                None
            }
            LocalTyping::Typing { conversation_id: typing_in, .. } => {
                // Callers stop typing before switching; seeing this means a missed `stop`.
                tracing::warn!(
                    previous = %typing_in,
                    next = %conversation_id,
                    "keystroke for a new conversation while still typing in another"
                );
                self.start(conversation_id, deadline)
            }
            LocalTyping::NotTyping => self.start(conversation_id, deadline),
        }
    }

    fn start(&mut self, conversation_id: &ConversationId, deadline: Instant) -> Option<TypingChange> {
        self.state = LocalTyping::Typing {
            conversation_id: conversation_id.clone(),
            deadline,
        };
        Some(TypingChange::Started(conversation_id.clone()))
    }

    /// Ends the session once the quiet period has passed.
    pub fn expire(&mut self, now: Instant) -> Option<TypingChange> {
        match &self.state {
            LocalTyping::Typing { deadline, .. } if *deadline <= now => self.stop(),
            LocalTyping::Typing { .. } | LocalTyping::NotTyping => None,
        }
    }

    /// Ends the session unconditionally.
    pub fn stop(&mut self) -> Option<TypingChange> {
        match std::mem::replace(&mut self.state, LocalTyping::NotTyping) {
            LocalTyping::Typing { conversation_id, .. } => {
                Some(TypingChange::Stopped(conversation_id))
            }
            LocalTyping::NotTyping => None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            LocalTyping::Typing { deadline, .. } => Some(*deadline),
            LocalTyping::NotTyping => None,
        }
    }

    pub fn is_typing(&self) -> bool {
        matches!(self.state, LocalTyping::Typing { .. })
    }
}

/// "X is typing" indicator for the open conversation.
#[derive(Debug, Clone)]
pub struct RemoteTyping {
    ttl: Duration,
    current: Option<(TypingSignal, Instant)>,
}

impl RemoteTyping {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, current: None }
    }

    pub fn started(
        &mut self,
        signal: TypingSignal,
        active: Option<&ConversationId>,
        now: Instant,
    ) -> bool {
        if active != Some(&signal.conversation_id) {
            return false;
        }

        self.current = Some((signal, now + self.ttl));
        true
    }

    pub fn stopped(&mut self, conversation_id: &ConversationId) -> bool {
        match &self.current {
            Some((signal, _)) if &signal.conversation_id == conversation_id => {
                self.current = None;
                true
            }
            Some(_) | None => false,
        }
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Drops an indicator that was never followed by a stop.
    pub fn expire(&mut self, now: Instant) -> bool {
        match &self.current {
            Some((_, expires_at)) if *expires_at <= now => {
                self.current = None;
                true
            }
            Some(_) | None => false,
        }
    }

    pub fn indicator(&self, now: Instant) -> Option<&TypingSignal> {
        self.current
            .as_ref()
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(signal, _)| signal)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.current.as_ref().map(|(_, expires_at)| *expires_at)
    }
}
