use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use courier_protocol::{Conversation, ConversationId, Message, ServerEvent, User, UserId};
use tokio::sync::mpsc;

use crate::api::{ApiResult, ChatApi};
use crate::chat::{ChatSession, Followup, LoadTicket, Notice, PendingSend};
use crate::realtime::RealtimeLink;

/// Something the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    LoadChats,
    SearchUsers(Option<String>),
    Open(OpenTarget),
    StartDirect(UserId),
    CreateGroup { name: String, members: Vec<UserId> },
    Keystroke(String),
    Send(String),
    /// Sends whatever is in the draft, e.g. the text of a send that failed.
    SendDraft,
    Close,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenTarget {
    /// Zero-based position in the chat list.
    Index(usize),
    Id(ConversationId),
}

/// A finished request, posted back to the loop by the task that ran it.
enum Completion {
    Chats(ApiResult<Vec<Conversation>>),
    Users(ApiResult<Vec<User>>),
    Messages(LoadTicket, ApiResult<Vec<Message>>),
    Sent(PendingSend, ApiResult<Message>),
    Conversation(ApiResult<Conversation>),
}

/// Drives a [`ChatSession`] from user commands, request completions, pushed
/// events and the typing timers, one input at a time.
pub struct ChatRuntime<L> {
    session: ChatSession<L>,
    api: Arc<dyn ChatApi>,
    events: Option<mpsc::UnboundedReceiver<ServerEvent>>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl<L: RealtimeLink> ChatRuntime<L> {
    pub fn new(
        session: ChatSession<L>,
        api: Arc<dyn ChatApi>,
        events: Option<mpsc::UnboundedReceiver<ServerEvent>>,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            session,
            api,
            events,
            completions_tx,
            completions_rx,
        }
    }

    pub fn session(&self) -> &ChatSession<L> {
        &self.session
    }

    /// Runs until [`Command::Quit`] or until the command channel closes, then
    /// hands the session back. `on_update` sees the session after every input
    /// together with the notices that input produced.
    pub async fn run<F>(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut on_update: F,
    ) -> ChatSession<L>
    where
        F: FnMut(&ChatSession<L>, &[Notice]),
    {
        tracing::info!(user_id = %self.session.me().id, "chat runtime started");
        on_update(&self.session, &[]);

        loop {
            let deadline = self.session.next_deadline();
            let timer = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        tracing::info!("command channel closed");
                        break;
                    };
                    if self.dispatch(command).is_break() {
                        break;
                    }
                }
                Some(completion) = self.completions_rx.recv() => self.complete(completion),
                event = recv_event(&mut self.events) => match event {
                    Some(event) => {
                        if let Some(followup) = self.session.handle_server_event(event, Instant::now()) {
                            self.follow_up(followup);
                        }
                    }
                    None => {
                        tracing::warn!("realtime event stream ended, continuing without push updates");
                        self.events = None;
                    }
                },
                () = timer => self.session.poll_timers(Instant::now()),
            }

            let notices = self.session.take_notices();
            on_update(&self.session, &notices);
        }

        self.session.shutdown();
        tracing::info!("chat runtime stopped");
        self.session
    }

    fn dispatch(&mut self, command: Command) -> ControlFlow<()> {
        tracing::debug!(?command, "dispatching command");
        match command {
            Command::LoadChats => self.spawn_load_chats(),
            Command::SearchUsers(search) => {
                self.session.begin_search_users();
                let api = Arc::clone(&self.api);
                self.spawn(async move { Completion::Users(api.search_users(search.as_deref()).await) });
            }
            Command::Open(target) => {
                let result = match &target {
                    OpenTarget::Index(index) => self.session.open_at(*index),
                    OpenTarget::Id(conversation_id) => self.session.open_by_id(conversation_id),
                };
                if let Some(ticket) = self.session.try_open(result) {
                    self.spawn_load_messages(ticket);
                }
            }
            Command::StartDirect(user_id) => {
                let api = Arc::clone(&self.api);
                self.spawn(async move {
                    Completion::Conversation(api.access_conversation(&user_id).await)
                });
            }
            Command::CreateGroup { name, members } => {
                if let Some(group) = self.session.prepare_group(&name, &members) {
                    let api = Arc::clone(&self.api);
                    self.spawn(async move { Completion::Conversation(api.create_group(&group).await) });
                }
            }
            Command::Keystroke(draft) => self.session.keystroke(draft, Instant::now()),
            Command::Send(text) => self.send(&text),
            Command::SendDraft => {
                let draft = self.session.draft().to_string();
                self.send(&draft);
            }
            Command::Close => {
                self.session.close_active();
            }
            Command::Quit => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Chats(result) => {
                self.session.finish_load_chats(result);
            }
            Completion::Users(result) => {
                self.session.finish_search_users(result);
            }
            Completion::Messages(ticket, result) => {
                self.session.finish_load_messages(&ticket, result);
            }
            Completion::Sent(pending, result) => {
                if let Some(followup) = self.session.finish_send(pending, result) {
                    self.follow_up(followup);
                }
            }
            Completion::Conversation(result) => {
                if let Some(conversation) = self.session.finish_conversation_request(result) {
                    let ticket = self.session.open(conversation);
                    self.spawn_load_messages(ticket);
                }
            }
        }
    }

    fn send(&mut self, text: &str) {
        let Some(pending) = self.session.prepare_send(text) else {
            return;
        };
        let api = Arc::clone(&self.api);
        self.spawn(async move {
            let result = api
                .send_message(&pending.conversation.id, &pending.content)
                .await;
            Completion::Sent(pending, result)
        });
    }

    fn follow_up(&mut self, followup: Followup) {
        match followup {
            Followup::RefreshChatList => self.spawn_load_chats(),
        }
    }

    fn spawn_load_chats(&mut self) {
        self.session.begin_load_chats();
        let api = Arc::clone(&self.api);
        self.spawn(async move { Completion::Chats(api.list_conversations().await) });
    }

    fn spawn_load_messages(&self, ticket: LoadTicket) {
        let api = Arc::clone(&self.api);
        self.spawn(async move {
            let result = api.list_messages(&ticket.conversation_id).await;
            Completion::Messages(ticket, result)
        });
    }

    fn spawn<Fut>(&self, task: Fut)
    where
        Fut: Future<Output = Completion> + Send + 'static,
    {
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            // The loop is gone once the runtime has stopped; nothing to deliver to.
            let _ = completions.send(task.await);
        });
    }
}

async fn recv_event(events: &mut Option<mpsc::UnboundedReceiver<ServerEvent>>) -> Option<ServerEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
