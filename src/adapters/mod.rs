pub mod grid_backend;
pub mod key_provider;
pub mod notifier;

pub use grid_backend::{GridBackend, HttpGridBackend};
pub use key_provider::KeyProvider;
pub use notifier::{LogNotifier, Notice, NoticeLevel, Notifier};

#[cfg(test)]
pub use grid_backend::MockGridBackend;
#[cfg(test)]
pub use key_provider::MockKeyProvider;
