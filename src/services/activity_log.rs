use crate::db::models::activity_log_models::UserActivityLog;
use crate::db::models::event_models::Page;
use crate::db::repositories::activity_logs::ActivityLogsRepository;
use crate::services::page_params;
use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Read side of the audit trail
#[derive(Clone)]
pub struct ActivityLogService {
    repo: ActivityLogsRepository,
}

impl ActivityLogService {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self {
            repo: ActivityLogsRepository::new(pool),
        }
    }

    /// All entries, newest first
    pub async fn list(&self, page: Option<u32>, size: Option<u32>) -> Result<Page<UserActivityLog>> {
        self.list_for(None, page, size).await
    }

    /// Entries performed by one user, newest first
    pub async fn list_for_user(
        &self,
        user_id: i64,
        page: Option<u32>,
        size: Option<u32>,
    ) -> Result<Page<UserActivityLog>> {
        self.list_for(Some(user_id), page, size).await
    }

    async fn list_for(
        &self,
        user_id: Option<i64>,
        page: Option<u32>,
        size: Option<u32>,
    ) -> Result<Page<UserActivityLog>> {
        let (page, size) = page_params(page, size);
        let (logs, total) = self.repo.get_page(user_id, page, size).await?;
        Ok(Page::new(logs, page, size, total))
    }
}
