use courier_protocol::ClientEvent;

mod connection;

pub use connection::ConnectionManager;

/// Outbound half of the realtime channel as seen by the chat session.
pub trait RealtimeLink: Send {
    /// Hands `event` to the transport. Returns `false` when it was dropped.
    fn emit(&self, event: ClientEvent) -> bool;
    fn is_connected(&self) -> bool;
}

impl<L: RealtimeLink + ?Sized> RealtimeLink for Box<L> {
    fn emit(&self, event: ClientEvent) -> bool {
        self.as_ref().emit(event)
    }

    fn is_connected(&self) -> bool {
        self.as_ref().is_connected()
    }
}

/// Link used when no realtime connection could be established.
/// History and sending keep working; push and typing silently degrade.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disconnected;

impl RealtimeLink for Disconnected {
    fn emit(&self, event: ClientEvent) -> bool {
        tracing::debug!(kind = ?event.kind(), "dropping realtime event, no connection");
        false
    }

    fn is_connected(&self) -> bool {
        false
    }
}
