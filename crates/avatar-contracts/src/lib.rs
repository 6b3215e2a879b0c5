pub mod console;
pub mod events;
pub mod notifications;
pub mod summary;
