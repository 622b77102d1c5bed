//! Client core of the courier chat: stores, session, REST and realtime
//! plumbing, and the runtime that drives them.

pub mod api;
pub mod chat;
pub mod error;
pub mod identity;
pub mod persist;
pub mod realtime;
pub mod runtime;
pub mod settings;

#[cfg(test)]
pub(crate) mod test_support;
