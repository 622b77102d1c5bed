use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use courier_protocol::{
    ClientEvent, Conversation, ConversationId, EventKind, Message, MessageId, User, UserId,
};

use crate::api::{ApiError, ApiResult, BoxFuture, ChatApi, NewGroup};
use crate::realtime::RealtimeLink;

pub(crate) fn user(id: &str, name: &str) -> User {
    User::new(UserId::parse(id).expect("user id"), name)
}

pub(crate) fn me() -> User {
    user("u-me", "Dispatch Desk")
}

pub(crate) fn peer() -> User {
    user("u-peer", "Yard Crew")
}

pub(crate) fn conversation_id(raw: &str) -> ConversationId {
    ConversationId::parse(raw).expect("conversation id")
}

pub(crate) fn direct_with(id: &str, other_id: &str, other_name: &str) -> Conversation {
    Conversation::direct(conversation_id(id), vec![me(), user(other_id, other_name)])
}

fn timestamp(offset_seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_772_438_400 + offset_seconds, 0)
        .single()
        .expect("valid timestamp")
}

pub(crate) fn message_from(
    sender: &User,
    conversation: &str,
    id: &str,
    content: &str,
) -> Message {
    Message {
        id: MessageId::parse(id).expect("message id"),
        conversation_id: conversation_id(conversation),
        sender: sender.clone(),
        content: content.to_string(),
        created_at: timestamp(0),
    }
}

pub(crate) fn message_in(conversation: &str, id: &str, content: &str) -> Message {
    message_from(&peer(), conversation, id, content)
}

/// Link that records every emitted event in order.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingLink {
    events: Arc<Mutex<Vec<ClientEvent>>>,
    offline: Arc<AtomicBool>,
}

impl RecordingLink {
    pub(crate) fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().expect("events lock").clone()
    }

    pub(crate) fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(ClientEvent::kind).collect()
    }

    pub(crate) fn clear(&self) {
        self.events.lock().expect("events lock").clear();
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl RealtimeLink for RecordingLink {
    fn emit(&self, event: ClientEvent) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.events.lock().expect("events lock").push(event);
        true
    }

    fn is_connected(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }
}

/// In-memory backend with switchable failures and call counters.
#[derive(Debug, Default)]
pub(crate) struct FakeApi {
    pub(crate) conversations: Mutex<Vec<Conversation>>,
    pub(crate) users: Vec<User>,
    pub(crate) histories: Mutex<HashMap<ConversationId, Vec<Message>>>,
    pub(crate) fail_list: AtomicBool,
    pub(crate) fail_messages: AtomicBool,
    pub(crate) fail_send: AtomicBool,
    pub(crate) list_calls: AtomicUsize,
    pub(crate) send_calls: AtomicUsize,
    pub(crate) group_calls: AtomicUsize,
}

impl FakeApi {
    pub(crate) fn with_conversations(conversations: Vec<Conversation>) -> Self {
        Self {
            conversations: Mutex::new(conversations),
            ..Self::default()
        }
    }

    pub(crate) fn with_history(self, conversation: &str, messages: Vec<Message>) -> Self {
        self.histories
            .lock()
            .expect("histories lock")
            .insert(conversation_id(conversation), messages);
        self
    }

    fn unavailable(stage: &'static str) -> ApiError {
        ApiError::Status {
            stage,
            url: "fake://courier".to_string(),
            status: 503,
            body: "unavailable".to_string(),
        }
    }
}

impl ChatApi for FakeApi {
    fn list_conversations<'a>(&'a self) -> BoxFuture<'a, ApiResult<Vec<Conversation>>> {
        Box::pin(async move {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(Self::unavailable("fake-list-conversations"));
            }
            Ok(self.conversations.lock().expect("conversations lock").clone())
        })
    }

    fn search_users<'a>(&'a self, search: Option<&'a str>) -> BoxFuture<'a, ApiResult<Vec<User>>> {
        Box::pin(async move {
            Ok(self
                .users
                .iter()
                .filter(|user| search.is_none_or(|needle| user.name.contains(needle)))
                .cloned()
                .collect())
        })
    }

    fn list_messages<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, ApiResult<Vec<Message>>> {
        Box::pin(async move {
            if self.fail_messages.load(Ordering::SeqCst) {
                return Err(Self::unavailable("fake-list-messages"));
            }
            Ok(self
                .histories
                .lock()
                .expect("histories lock")
                .get(conversation_id)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn send_message<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        content: &'a str,
    ) -> BoxFuture<'a, ApiResult<Message>> {
        Box::pin(async move {
            let call = self.send_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_send.load(Ordering::SeqCst) {
                return Err(Self::unavailable("fake-send-message"));
            }

            let message = message_from(
                &me(),
                conversation_id.as_str(),
                &format!("m-sent-{call}"),
                content,
            );
            self.histories
                .lock()
                .expect("histories lock")
                .entry(conversation_id.clone())
                .or_default()
                .push(message.clone());
            Ok(message)
        })
    }

    fn access_conversation<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> BoxFuture<'a, ApiResult<Conversation>> {
        Box::pin(async move {
            let mut conversations = self.conversations.lock().expect("conversations lock");
            if let Some(existing) = conversations
                .iter()
                .find(|conversation| !conversation.is_group() && conversation.includes(user_id))
            {
                return Ok(existing.clone());
            }

            let created = Conversation::direct(
                conversation_id(&format!("c-direct-{user_id}")),
                vec![me(), User::new(user_id.clone(), user_id.to_string())],
            );
            conversations.insert(0, created.clone());
            Ok(created)
        })
    }

    fn create_group<'a>(&'a self, group: &'a NewGroup) -> BoxFuture<'a, ApiResult<Conversation>> {
        Box::pin(async move {
            let call = self.group_calls.fetch_add(1, Ordering::SeqCst) + 1;
            let mut participants = vec![me()];
            participants.extend(
                group
                    .members
                    .iter()
                    .map(|member| User::new(member.clone(), member.to_string())),
            );
            Ok(Conversation::group(
                conversation_id(&format!("c-group-{call}")),
                group.name.clone(),
                participants,
                me().id,
            ))
        })
    }
}
