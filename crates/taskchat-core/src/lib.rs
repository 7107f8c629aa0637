//! Core of taskchat: utterance classification, the task store and the task
//! operations behind the chat commands.

pub mod completion;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod extract;
pub mod intent;
pub mod mirror;
pub mod ops;
pub mod priority;
pub mod reply;
pub mod session;
pub mod store;
pub mod task;

pub use dispatch::Dispatcher;
pub use session::Session;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::version;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
