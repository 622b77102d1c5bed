pub mod active;
pub mod chat_list;
pub mod notice;
pub mod notifications;
pub mod session;
pub mod typing;

pub use active::{ActiveConversation, LoadState, LoadTicket};
pub use chat_list::{ChatListEntry, ChatListStore};
pub use notice::{Notice, NoticeLevel};
pub use notifications::NotificationAccumulator;
pub use session::{BusyState, ChatSession, Followup, PendingSend};
pub use typing::{RemoteTyping, TypingChange, TypingTracker};
