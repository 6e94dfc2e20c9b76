pub mod activity_logs;
pub mod events;
pub mod notifications;
pub mod settings;
pub mod users;
