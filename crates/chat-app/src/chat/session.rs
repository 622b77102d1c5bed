use std::time::Instant;

use courier_protocol::{
    ClientEvent, Conversation, ConversationId, MIN_GROUP_MEMBERS, Message, ServerEvent,
    TypingSignal, User, UserId,
};
use snafu::ensure;

use super::active::{ActiveConversation, LoadTicket};
use super::chat_list::{ChatListEntry, ChatListStore};
use super::notice::{Notice, NoticeLevel};
use super::notifications::NotificationAccumulator;
use super::typing::{RemoteTyping, TypingChange, TypingTracker};
use crate::api::{ApiResult, ChatApi, NewGroup};
use crate::error::{
    ChatError, ChatResult, GroupNameMissingSnafu, GroupTooSmallSnafu, NoActiveConversationSnafu,
    UnknownConversationSnafu,
};
use crate::realtime::RealtimeLink;
use crate::settings::ClientSettings;

/// Which requests are currently in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusyState {
    pub chats: bool,
    pub messages: bool,
    pub sending: bool,
    pub directory: bool,
}

/// A validated send waiting for the server's response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub conversation: Conversation,
    pub content: String,
}

/// Work the caller should schedule after a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Followup {
    /// Re-fetch the chat list so previews catch up with new messages.
    RefreshChatList,
}

/// Client-side chat state for one signed-in user.
///
/// Every method is synchronous and takes the current time explicitly; the
/// network half lives behind [`ChatApi`] and the `begin_*`/`finish_*` pairs so
/// a driver can run requests concurrently and feed completions back in any
/// order.
pub struct ChatSession<L> {
    me: User,
    link: L,
    chats: ChatListStore,
    active: ActiveConversation,
    typing: TypingTracker,
    remote_typing: RemoteTyping,
    notifications: NotificationAccumulator,
    directory: Vec<User>,
    busy: BusyState,
    sends_in_flight: usize,
    draft: String,
    notices: Vec<Notice>,
}

impl<L: RealtimeLink> ChatSession<L> {
    pub fn new(me: User, link: L, settings: &ClientSettings) -> Self {
        Self {
            me,
            link,
            chats: ChatListStore::new(),
            active: ActiveConversation::new(),
            typing: TypingTracker::new(settings.typing_quiet()),
            remote_typing: RemoteTyping::new(settings.remote_typing_ttl()),
            notifications: NotificationAccumulator::new(),
            directory: Vec::new(),
            busy: BusyState::default(),
            sends_in_flight: 0,
            draft: String::new(),
            notices: Vec::new(),
        }
    }

    pub fn me(&self) -> &User {
        &self.me
    }

    pub fn chats(&self) -> &ChatListStore {
        &self.chats
    }

    pub fn chat_entries(&self) -> Vec<ChatListEntry<'_>> {
        self.chats.entries(&self.me.id, &self.notifications)
    }

    pub fn active(&self) -> &ActiveConversation {
        &self.active
    }

    pub fn notifications(&self) -> &NotificationAccumulator {
        &self.notifications
    }

    pub fn directory(&self) -> &[User] {
        &self.directory
    }

    pub fn busy(&self) -> BusyState {
        self.busy
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn is_typing(&self) -> bool {
        self.typing.is_typing()
    }

    /// Name of whoever is typing in the open conversation, if anyone.
    pub fn typing_indicator(&self, now: Instant) -> Option<String> {
        let signal = self.remote_typing.indicator(now)?;
        let conversation = self.active.conversation()?;
        let name = signal
            .user_id
            .as_ref()
            .and_then(|user_id| {
                conversation
                    .participants
                    .iter()
                    .find(|user| &user.id == user_id)
            })
            .map(|user| user.name.clone())
            .unwrap_or_else(|| "someone".to_string());
        Some(name)
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn report(&mut self, error: ChatError) {
        let notice = Notice::from(&error);
        match notice.level {
            NoticeLevel::Error => tracing::error!("{error}"),
            NoticeLevel::Warning | NoticeLevel::Info => tracing::warn!("{error}"),
        }
        self.notices.push(notice);
    }

    pub fn begin_load_chats(&mut self) {
        self.busy.chats = true;
    }

    /// Applies a chat list fetch. A failure keeps whatever was shown before.
    pub fn finish_load_chats(&mut self, result: ApiResult<Vec<Conversation>>) -> bool {
        self.busy.chats = false;
        match result {
            Ok(conversations) => {
                if let Some(fresh) = self
                    .active
                    .id()
                    .and_then(|id| conversations.iter().find(|conversation| &conversation.id == id))
                    .cloned()
                {
                    self.active.refresh_conversation(&fresh);
                }
                tracing::debug!(count = conversations.len(), "chat list loaded");
                self.chats.replace(conversations);
                true
            }
            Err(source) => {
                self.report(ChatError::Fetch {
                    stage: "load-chat-list",
                    resource: "conversations",
                    source,
                });
                false
            }
        }
    }

    pub fn begin_search_users(&mut self) {
        self.busy.directory = true;
    }

    pub fn finish_search_users(&mut self, result: ApiResult<Vec<User>>) -> bool {
        self.busy.directory = false;
        match result {
            Ok(users) => {
                self.directory = users
                    .into_iter()
                    .filter(|user| user.id != self.me.id)
                    .collect();
                true
            }
            Err(source) => {
                self.report(ChatError::Fetch {
                    stage: "search-users",
                    resource: "users",
                    source,
                });
                false
            }
        }
    }

    /// Makes `conversation` the active one and returns the ticket its history
    /// load has to present.
    pub fn open(&mut self, conversation: Conversation) -> LoadTicket {
        self.stop_typing();
        self.remote_typing.clear();

        let cleared = self.notifications.clear(&conversation.id);
        let ticket = self.active.open(conversation);
        self.busy.messages = true;

        self.link
            .emit(ClientEvent::JoinChat(ticket.conversation_id.clone()));
        tracing::info!(
            conversation_id = %ticket.conversation_id,
            cleared_notifications = cleared,
            "opened conversation"
        );
        ticket
    }

    pub fn open_by_id(&mut self, conversation_id: &ConversationId) -> ChatResult<LoadTicket> {
        let conversation = self.chats.find(conversation_id).cloned();
        match conversation {
            Some(conversation) => Ok(self.open(conversation)),
            None => UnknownConversationSnafu {
                stage: "open-conversation-by-id",
                target: conversation_id.to_string(),
            }
            .fail(),
        }
    }

    /// Opens the conversation at `index` in the chat list (zero-based).
    pub fn open_at(&mut self, index: usize) -> ChatResult<LoadTicket> {
        let conversation = self.chats.get(index).cloned();
        match conversation {
            Some(conversation) => Ok(self.open(conversation)),
            None => UnknownConversationSnafu {
                stage: "open-conversation-by-index",
                target: format!("#{}", index + 1),
            }
            .fail(),
        }
    }

    /// Like [`Self::open_by_id`] but surfaces a lookup failure as a notice.
    pub fn try_open(&mut self, result: ChatResult<LoadTicket>) -> Option<LoadTicket> {
        match result {
            Ok(ticket) => Some(ticket),
            Err(error) => {
                self.report(error);
                None
            }
        }
    }

    /// Applies a history fetch. Completions for a conversation that is no
    /// longer the current `open` are dropped.
    pub fn finish_load_messages(
        &mut self,
        ticket: &LoadTicket,
        result: ApiResult<Vec<Message>>,
    ) -> bool {
        if !self.active.is_current(ticket) {
            tracing::debug!(
                conversation_id = %ticket.conversation_id,
                "discarding stale message history"
            );
            return false;
        }

        self.busy.messages = false;
        match result {
            Ok(messages) => {
                tracing::debug!(
                    conversation_id = %ticket.conversation_id,
                    count = messages.len(),
                    "message history loaded"
                );
                self.active.load_messages(ticket, messages)
            }
            Err(source) => {
                self.active.fail_load(ticket, source.to_string());
                self.report(ChatError::Fetch {
                    stage: "load-message-history",
                    resource: "messages",
                    source,
                });
                false
            }
        }
    }

    pub fn close_active(&mut self) -> Option<Conversation> {
        self.stop_typing();
        self.remote_typing.clear();
        self.busy.messages = false;
        self.active.close()
    }

    /// Records the composer contents after a keystroke.
    pub fn keystroke(&mut self, draft: impl Into<String>, now: Instant) {
        self.draft = draft.into();
        let Some(conversation_id) = self.active.id().cloned() else {
            return;
        };
        if let Some(change) = self.typing.keystroke(&conversation_id, now) {
            self.announce(change);
        }
    }

    /// Fires whichever typing timers have elapsed by `now`.
    pub fn poll_timers(&mut self, now: Instant) {
        if let Some(change) = self.typing.expire(now) {
            self.announce(change);
        }
        if self.remote_typing.expire(now) {
            tracing::debug!("remote typing indicator expired without a stop");
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        [self.typing.deadline(), self.remote_typing.deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    fn stop_typing(&mut self) {
        if let Some(change) = self.typing.stop() {
            self.announce(change);
        }
    }

    fn announce(&mut self, change: TypingChange) {
        let me = Some(self.me.id.clone());
        let event = match change {
            TypingChange::Started(conversation_id) => {
                ClientEvent::TypingStart(TypingSignal::new(conversation_id, me))
            }
            TypingChange::Stopped(conversation_id) => {
                ClientEvent::TypingStop(TypingSignal::new(conversation_id, me))
            }
        };
        self.link.emit(event);
    }

    /// Validates `text` for the open conversation. Blank text is a no-op:
    /// nothing is emitted and no request should be issued.
    pub fn prepare_send(&mut self, text: &str) -> Option<PendingSend> {
        if text.trim().is_empty() {
            return None;
        }

        let Some(conversation) = self.active.conversation().cloned() else {
            self.report(
                NoActiveConversationSnafu {
                    stage: "prepare-send",
                }
                .build(),
            );
            return None;
        };

        self.draft = text.to_string();
        self.stop_typing();
        self.sends_in_flight += 1;
        self.busy.sending = true;
        Some(PendingSend {
            conversation,
            content: text.to_string(),
        })
    }

    /// Applies the server's answer to a send. On failure the draft is kept
    /// so the user can retry.
    pub fn finish_send(&mut self, pending: PendingSend, result: ApiResult<Message>) -> Option<Followup> {
        self.sends_in_flight = self.sends_in_flight.saturating_sub(1);
        self.busy.sending = self.sends_in_flight > 0;

        match result {
            Ok(message) => {
                if self.draft == pending.content {
                    self.draft.clear();
                }
                if !self.active.append_local(message.clone()) {
                    tracing::debug!(
                        conversation_id = %pending.conversation.id,
                        "sent message not appended, conversation no longer open"
                    );
                }
                self.link
                    .emit(ClientEvent::message_sent(message, pending.conversation));
                Some(Followup::RefreshChatList)
            }
            Err(source) => {
                self.report(ChatError::Send {
                    stage: "send-message",
                    conversation_id: pending.conversation.id,
                    source,
                });
                None
            }
        }
    }

    /// Routes one pushed event. Messages for the open conversation join its
    /// log; anything else becomes a notification and asks for a list refresh.
    pub fn handle_server_event(&mut self, event: ServerEvent, now: Instant) -> Option<Followup> {
        match event {
            ServerEvent::Connected => None,
            ServerEvent::TypingStarted(signal) => {
                if signal.user_id.as_ref() == Some(&self.me.id) {
                    return None;
                }
                self.remote_typing.started(signal, self.active.id(), now);
                None
            }
            ServerEvent::TypingStopped(signal) => {
                self.remote_typing.stopped(&signal.conversation_id);
                None
            }
            ServerEvent::MessageReceived(message) => self.receive_message(message),
        }
    }

    fn receive_message(&mut self, message: Message) -> Option<Followup> {
        if self.active.is_active(&message.conversation_id) {
            self.active.append_remote(message);
            return None;
        }

        tracing::info!(
            conversation_id = %message.conversation_id,
            message_id = %message.id,
            "message for a background conversation"
        );
        self.notifications.record(message, self.active.id());
        Some(Followup::RefreshChatList)
    }

    /// Checks a group request before anything goes over the network.
    /// The creator is implied and does not count towards the minimum.
    pub fn validate_group(&self, name: &str, members: &[UserId]) -> ChatResult<NewGroup> {
        let name = name.trim();
        ensure!(
            !name.is_empty(),
            GroupNameMissingSnafu {
                stage: "validate-group",
            }
        );

        let mut unique: Vec<UserId> = Vec::with_capacity(members.len());
        for member in members {
            if *member != self.me.id && !unique.contains(member) {
                unique.push(member.clone());
            }
        }

        ensure!(
            unique.len() >= MIN_GROUP_MEMBERS,
            GroupTooSmallSnafu {
                stage: "validate-group",
                name,
                required: MIN_GROUP_MEMBERS,
                actual: unique.len(),
            }
        );

        Ok(NewGroup {
            name: name.to_string(),
            members: unique,
        })
    }

    /// [`Self::validate_group`], reporting a rejection as a notice.
    pub fn prepare_group(&mut self, name: &str, members: &[UserId]) -> Option<NewGroup> {
        match self.validate_group(name, members) {
            Ok(group) => Some(group),
            Err(error) => {
                self.report(error);
                None
            }
        }
    }

    /// Applies the result of starting a direct chat or creating a group. The
    /// conversation is placed in the chat list; the caller opens it.
    pub fn finish_conversation_request(
        &mut self,
        result: ApiResult<Conversation>,
    ) -> Option<Conversation> {
        match result {
            Ok(conversation) => {
                let inserted = self.chats.upsert(conversation.clone());
                tracing::info!(
                    conversation_id = %conversation.id,
                    inserted,
                    "conversation ready"
                );
                if inserted {
                    self.notices.push(Notice::new(
                        NoticeLevel::Info,
                        format!("{} added to your chats", conversation.display_name(&self.me.id)),
                    ));
                }
                Some(conversation)
            }
            Err(source) => {
                self.report(ChatError::Fetch {
                    stage: "access-conversation",
                    resource: "conversation",
                    source,
                });
                None
            }
        }
    }

    /// Ends any local typing session and leaves the open conversation.
    pub fn shutdown(&mut self) {
        self.close_active();
    }
}

impl<L: RealtimeLink> ChatSession<L> {
    pub async fn load_chats(&mut self, api: &dyn ChatApi) -> bool {
        self.begin_load_chats();
        let result = api.list_conversations().await;
        self.finish_load_chats(result)
    }

    pub async fn search_users(&mut self, api: &dyn ChatApi, search: Option<&str>) -> bool {
        self.begin_search_users();
        let result = api.search_users(search).await;
        self.finish_search_users(result)
    }

    pub async fn open_conversation(&mut self, api: &dyn ChatApi, conversation: Conversation) -> bool {
        let ticket = self.open(conversation);
        let result = api.list_messages(&ticket.conversation_id).await;
        self.finish_load_messages(&ticket, result)
    }

    /// Sends `text` to the open conversation. Returns whether a message was
    /// appended; blank text never reaches `api`.
    pub async fn send(&mut self, api: &dyn ChatApi, text: &str) -> bool {
        let Some(pending) = self.prepare_send(text) else {
            return false;
        };
        let result = api
            .send_message(&pending.conversation.id, &pending.content)
            .await;
        self.finish_send(pending, result).is_some()
    }

    pub async fn start_direct(&mut self, api: &dyn ChatApi, user_id: &UserId) -> bool {
        let result = api.access_conversation(user_id).await;
        match self.finish_conversation_request(result) {
            Some(conversation) => self.open_conversation(api, conversation).await,
            None => false,
        }
    }

    pub async fn create_group(&mut self, api: &dyn ChatApi, name: &str, members: &[UserId]) -> bool {
        let Some(group) = self.prepare_group(name, members) else {
            return false;
        };
        let result = api.create_group(&group).await;
        match self.finish_conversation_request(result) {
            Some(conversation) => self.open_conversation(api, conversation).await,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use courier_protocol::EventKind;

    use super::*;
    use crate::chat::LoadState;
    use crate::test_support::{
        FakeApi, RecordingLink, conversation_id, direct_with, me, message_from, message_in, peer,
        user,
    };

    fn session() -> (ChatSession<RecordingLink>, RecordingLink) {
        let link = RecordingLink::default();
        let session = ChatSession::new(me(), link.clone(), &ClientSettings::default());
        (session, link)
    }

    fn user_id(raw: &str) -> UserId {
        UserId::parse(raw).expect("user id")
    }

    fn ids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|message| message.id.as_str()).collect()
    }

    #[test]
    fn late_history_for_previous_conversation_is_discarded() {
        let (mut session, _link) = session();
        let ticket_a = session.open(direct_with("c-a", "u-2", "Ana"));
        let ticket_b = session.open(direct_with("c-b", "u-3", "Ben"));

        assert!(session.finish_load_messages(&ticket_b, Ok(vec![message_in("c-b", "m-b1", "hi b")])));
        assert!(!session.finish_load_messages(&ticket_a, Ok(vec![message_in("c-a", "m-a1", "hi a")])));

        assert_eq!(session.active().id(), Some(&conversation_id("c-b")));
        assert_eq!(ids(session.active().messages()), vec!["m-b1"]);
        assert!(!session.busy().messages);
    }

    #[test]
    fn stale_history_arriving_first_leaves_loading_untouched() {
        let (mut session, _link) = session();
        let ticket_a = session.open(direct_with("c-a", "u-2", "Ana"));
        let ticket_b = session.open(direct_with("c-b", "u-3", "Ben"));

        assert!(!session.finish_load_messages(&ticket_a, Ok(vec![message_in("c-a", "m-a1", "hi")])));
        assert!(session.busy().messages);
        assert!(session.active().messages().is_empty());

        session.finish_load_messages(&ticket_b, Ok(Vec::new()));
        assert!(!session.busy().messages);
    }

    #[test]
    fn reopening_the_same_conversation_ignores_the_first_load() {
        let (mut session, _link) = session();
        let first = session.open(direct_with("c-a", "u-2", "Ana"));
        let second = session.open(direct_with("c-a", "u-2", "Ana"));

        assert!(!session.finish_load_messages(&first, Ok(vec![message_in("c-a", "m-old", "old")])));
        assert!(session.finish_load_messages(&second, Ok(vec![message_in("c-a", "m-new", "new")])));
        assert_eq!(ids(session.active().messages()), vec!["m-new"]);
    }

    #[test]
    fn open_clears_notifications_and_joins_the_room() {
        let (mut session, link) = session();
        session.handle_server_event(
            ServerEvent::MessageReceived(message_in("c-2", "m-1", "ping")),
            Instant::now(),
        );
        assert!(session.notifications().has_unread(&conversation_id("c-2")));

        session.open(direct_with("c-2", "u-2", "Ana"));

        assert!(!session.notifications().has_unread(&conversation_id("c-2")));
        assert_eq!(
            link.events(),
            vec![ClientEvent::JoinChat(conversation_id("c-2"))]
        );
    }

    #[tokio::test]
    async fn failed_history_load_reports_and_marks_error() {
        let api = FakeApi::default();
        api.fail_messages.store(true, Ordering::SeqCst);
        let (mut session, _link) = session();

        assert!(
            !session
                .open_conversation(&api, direct_with("c-1", "u-2", "Ana"))
                .await
        );

        assert!(matches!(session.active().state(), LoadState::Error(_)));
        assert!(!session.busy().messages);
        let notices = session.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert!(session.notices().is_empty());
    }

    #[tokio::test]
    async fn blank_text_issues_no_request() {
        let api = FakeApi::with_conversations(vec![direct_with("c-1", "u-2", "Ana")])
            .with_history("c-1", vec![message_in("c-1", "m-1", "hi")]);
        let (mut session, link) = session();
        session.open_conversation(&api, direct_with("c-1", "u-2", "Ana")).await;
        link.clear();

        assert!(!session.send(&api, "").await);
        assert!(!session.send(&api, "   ").await);

        assert_eq!(api.send_calls.load(Ordering::SeqCst), 0);
        assert!(link.events().is_empty());
        assert_eq!(ids(session.active().messages()), vec!["m-1"]);
    }

    #[tokio::test]
    async fn sending_hello_appends_the_server_copy_last() {
        let history = vec![
            message_in("c-1", "m-1", "morning"),
            message_in("c-1", "m-2", "truck 4 is late"),
        ];
        let api = FakeApi::with_conversations(vec![direct_with("c-1", "u-2", "Ana")])
            .with_history("c-1", history);
        let (mut session, link) = session();
        assert!(session.load_chats(&api).await);
        let c1 = session.chats().get(0).cloned().expect("c-1 listed");
        assert!(session.open_conversation(&api, c1).await);

        let now = Instant::now();
        session.keystroke("hel", now);
        session.keystroke("hello", now + Duration::from_millis(200));
        assert!(session.send(&api, "hello").await);

        let messages = session.active().messages();
        assert_eq!(messages.len(), 3);
        let last = messages.last().expect("appended");
        assert_eq!(last.content, "hello");
        assert!(last.is_from(&me().id));
        assert_eq!(session.draft(), "");
        assert_eq!(
            link.kinds(),
            vec![
                EventKind::JoinChat,
                EventKind::TypingStart,
                EventKind::TypingStop,
                EventKind::MessageSent,
            ]
        );
        assert!(!session.is_typing());
        assert!(!session.busy().sending);
    }

    #[tokio::test]
    async fn failed_send_keeps_the_draft() {
        let api = FakeApi::default();
        api.fail_send.store(true, Ordering::SeqCst);
        let (mut session, link) = session();
        session.open(direct_with("c-1", "u-2", "Ana"));
        link.clear();

        assert!(!session.send(&api, "are you there?").await);

        assert_eq!(session.draft(), "are you there?");
        assert!(session.active().messages().is_empty());
        assert!(!link.kinds().contains(&EventKind::MessageSent));
        assert_eq!(session.take_notices().len(), 1);
    }

    #[test]
    fn send_without_open_conversation_warns() {
        let (mut session, _link) = session();
        assert_eq!(session.prepare_send("hello"), None);
        let notices = session.take_notices();
        assert_eq!(notices[0].level, NoticeLevel::Warning);
    }

    #[test]
    fn sent_message_for_a_closed_conversation_still_announces() {
        let (mut session, link) = session();
        session.open(direct_with("c-1", "u-2", "Ana"));
        let pending = session.prepare_send("bye").expect("pending");
        session.open(direct_with("c-2", "u-3", "Ben"));
        link.clear();

        let followup = session.finish_send(pending, Ok(message_from(&me(), "c-1", "m-9", "bye")));

        assert_eq!(followup, Some(Followup::RefreshChatList));
        assert!(session.active().messages().is_empty());
        assert_eq!(link.kinds(), vec![EventKind::MessageSent]);
    }

    #[test]
    fn typing_session_emits_one_start_and_one_stop() {
        let (mut session, link) = session();
        session.open(direct_with("c-1", "u-2", "Ana"));
        link.clear();

        let start = Instant::now();
        session.keystroke("h", start);
        session.poll_timers(start + Duration::from_millis(1_000));
        session.poll_timers(start + Duration::from_millis(2_999));
        assert_eq!(session.next_deadline(), Some(start + Duration::from_millis(3_000)));
        session.poll_timers(start + Duration::from_millis(3_000));
        session.poll_timers(start + Duration::from_millis(9_000));

        assert_eq!(link.kinds(), vec![EventKind::TypingStart, EventKind::TypingStop]);
        assert_eq!(session.next_deadline(), None);
    }

    #[test]
    fn switching_conversation_stops_typing_first() {
        let (mut session, link) = session();
        session.open(direct_with("c-1", "u-2", "Ana"));
        session.keystroke("h", Instant::now());
        link.clear();

        session.open(direct_with("c-2", "u-3", "Ben"));

        let events = link.events();
        assert_eq!(
            events[0],
            ClientEvent::TypingStop(TypingSignal::new(conversation_id("c-1"), Some(me().id)))
        );
        assert_eq!(events[1], ClientEvent::JoinChat(conversation_id("c-2")));
    }

    #[test]
    fn keystroke_without_open_conversation_only_updates_draft() {
        let (mut session, link) = session();
        session.keystroke("draft", Instant::now());
        assert_eq!(session.draft(), "draft");
        assert!(link.events().is_empty());
    }

    #[test]
    fn group_of_one_is_rejected_before_any_request() {
        let (mut session, _link) = session();
        let error = session
            .validate_group("Team", &[user_id("u1")])
            .expect_err("too small");
        assert!(matches!(
            error,
            ChatError::GroupTooSmall {
                required: 2,
                actual: 1,
                ..
            }
        ));

        // The creator and duplicates do not count.
        assert!(
            session
                .validate_group("Team", &[user_id("u1"), me().id, user_id("u1")])
                .is_err()
        );
        assert!(session.validate_group("   ", &[user_id("u1"), user_id("u2")]).is_err());

        let group = session
            .validate_group(" Team ", &[user_id("u1"), user_id("u2")])
            .expect("valid group");
        assert_eq!(group.name, "Team");
        assert_eq!(group.members, vec![user_id("u1"), user_id("u2")]);
        assert!(session.prepare_group("Team", &[user_id("u1")]).is_none());
        assert_eq!(session.take_notices()[0].level, NoticeLevel::Warning);
    }

    #[tokio::test]
    async fn rejected_group_never_reaches_the_api() {
        let api = FakeApi::default();
        let (mut session, _link) = session();

        assert!(!session.create_group(&api, "Team", &[user_id("u1")]).await);
        assert_eq!(api.group_calls.load(Ordering::SeqCst), 0);
        assert!(session.chats().is_empty());
    }

    #[tokio::test]
    async fn created_group_is_listed_first_and_opened() {
        let api = FakeApi::with_conversations(vec![direct_with("c-1", "u-2", "Ana")]);
        let (mut session, _link) = session();
        session.load_chats(&api).await;

        assert!(
            session
                .create_group(&api, "Night shift", &[user_id("u-2"), user_id("u-3")])
                .await
        );

        assert_eq!(api.group_calls.load(Ordering::SeqCst), 1);
        let notices = session.take_notices();
        assert_eq!(notices[0].level, NoticeLevel::Info);
        assert_eq!(notices[0].message, "Night shift added to your chats");
        let first = session.chats().get(0).expect("group listed");
        assert!(first.is_group());
        assert_eq!(session.active().id(), Some(&first.id));
        assert_eq!(session.chats().len(), 2);
    }

    #[tokio::test]
    async fn starting_an_existing_direct_chat_keeps_list_order() {
        let api = FakeApi::with_conversations(vec![
            direct_with("c-1", "u-2", "Ana"),
            direct_with("c-2", "u-3", "Ben"),
        ]);
        let (mut session, _link) = session();
        session.load_chats(&api).await;

        assert!(session.start_direct(&api, &user_id("u-3")).await);

        assert_eq!(session.chats().len(), 2);
        assert_eq!(session.chats().get(1).map(|c| c.id.as_str()), Some("c-2"));
        assert!(session.take_notices().is_empty());
        assert_eq!(session.active().id(), Some(&conversation_id("c-2")));
    }

    #[test]
    fn background_push_becomes_a_notification() {
        let (mut session, _link) = session();
        let ticket = session.open(direct_with("c-1", "u-2", "Ana"));
        session.finish_load_messages(&ticket, Ok(vec![message_in("c-1", "m-1", "hi")]));

        let followup = session.handle_server_event(
            ServerEvent::MessageReceived(message_in("c-2", "m-7", "dock 3 is free")),
            Instant::now(),
        );

        assert_eq!(followup, Some(Followup::RefreshChatList));
        assert_eq!(ids(session.active().messages()), vec!["m-1"]);
        assert_eq!(session.notifications().count_for(&conversation_id("c-2")), 1);
        assert!(!session.notifications().has_unread(&conversation_id("c-1")));
    }

    #[test]
    fn push_for_active_conversation_appends_once() {
        let (mut session, _link) = session();
        let ticket = session.open(direct_with("c-1", "u-2", "Ana"));
        session.finish_load_messages(&ticket, Ok(Vec::new()));

        let pushed = message_in("c-1", "m-1", "on my way");
        assert_eq!(
            session.handle_server_event(ServerEvent::MessageReceived(pushed.clone()), Instant::now()),
            None
        );
        session.handle_server_event(ServerEvent::MessageReceived(pushed), Instant::now());

        assert_eq!(ids(session.active().messages()), vec!["m-1"]);
        assert_eq!(session.notifications().pending_count(), 0);
    }

    #[test]
    fn remote_typing_shows_for_active_conversation_only() {
        let (mut session, _link) = session();
        session.open(direct_with("c-1", "u-peer", "Yard Crew"));
        let now = Instant::now();

        session.handle_server_event(
            ServerEvent::TypingStarted(TypingSignal::new(conversation_id("c-2"), Some(peer().id))),
            now,
        );
        assert_eq!(session.typing_indicator(now), None);

        session.handle_server_event(
            ServerEvent::TypingStarted(TypingSignal::new(conversation_id("c-1"), Some(peer().id))),
            now,
        );
        assert_eq!(session.typing_indicator(now).as_deref(), Some("Yard Crew"));

        session.handle_server_event(
            ServerEvent::TypingStopped(TypingSignal::new(conversation_id("c-1"), None)),
            now,
        );
        assert_eq!(session.typing_indicator(now), None);
    }

    #[test]
    fn own_typing_echo_and_stale_indicator_are_ignored() {
        let (mut session, _link) = session();
        session.open(direct_with("c-1", "u-2", "Ana"));
        let now = Instant::now();

        session.handle_server_event(
            ServerEvent::TypingStarted(TypingSignal::new(conversation_id("c-1"), Some(me().id))),
            now,
        );
        assert_eq!(session.typing_indicator(now), None);

        session.handle_server_event(
            ServerEvent::TypingStarted(TypingSignal::new(conversation_id("c-1"), Some(user_id("u-2")))),
            now,
        );
        let later = now + Duration::from_millis(5_000);
        session.poll_timers(later);
        assert_eq!(session.typing_indicator(later), None);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_list() {
        let api = FakeApi::with_conversations(vec![direct_with("c-1", "u-2", "Ana")]);
        let (mut session, _link) = session();
        assert!(session.load_chats(&api).await);

        api.fail_list.store(true, Ordering::SeqCst);
        assert!(!session.load_chats(&api).await);

        assert_eq!(session.chats().len(), 1);
        assert!(!session.busy().chats);
        assert_eq!(session.take_notices().len(), 1);
    }

    #[test]
    fn unknown_conversation_lookup_fails() {
        let (mut session, _link) = session();
        let result = session.open_by_id(&conversation_id("c-missing"));
        assert!(matches!(result, Err(ChatError::UnknownConversation { .. })));
        assert!(session.take_notices().is_empty());

        let result = session.open_at(4);
        assert!(session.try_open(result).is_none());
        assert_eq!(session.take_notices().len(), 1);
    }

    #[tokio::test]
    async fn directory_excludes_the_current_user() {
        let api = FakeApi {
            users: vec![me(), user("u-2", "Ana"), user("u-3", "Ben")],
            ..FakeApi::default()
        };
        let (mut session, _link) = session();

        assert!(session.search_users(&api, None).await);
        assert_eq!(session.directory().len(), 2);

        assert!(session.search_users(&api, Some("Be")).await);
        assert_eq!(session.directory(), &[user("u-3", "Ben")]);
    }

    #[tokio::test]
    async fn offline_link_keeps_history_and_sending_working() {
        let api = FakeApi::default().with_history("c-1", vec![message_in("c-1", "m-1", "hi")]);
        let (mut session, link) = session();
        link.set_offline(true);

        assert!(session.open_conversation(&api, direct_with("c-1", "u-2", "Ana")).await);
        session.keystroke("ok", Instant::now());
        assert!(session.send(&api, "ok").await);

        assert_eq!(session.active().messages().len(), 2);
        assert!(link.events().is_empty());
    }
}
