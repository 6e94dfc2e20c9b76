pub mod activity_log;
pub mod ai_client;
pub mod analytics;
pub mod audio;
pub mod events;
pub mod notifications;
pub mod settings;
pub mod storage;
pub mod users;

pub use activity_log::ActivityLogService;
pub use ai_client::AiClient;
pub use audio::AudioAnalysisGateway;
pub use events::EventService;
pub use notifications::NotificationService;
pub use settings::SettingsService;
pub use storage::AudioStorage;
pub use users::UserService;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Resolve optional paging parameters. Size defaults to 20 and is clamped
/// to 1..=100.
pub fn page_params(page: Option<u32>, size: Option<u32>) -> (u32, u32) {
    let size = size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page.unwrap_or(0), size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(page_params(None, None), (0, 20));
        assert_eq!(page_params(Some(3), Some(500)), (3, 100));
        assert_eq!(page_params(None, Some(0)), (0, 1));
    }
}
