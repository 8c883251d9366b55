use fleet_alerts::NotifierError;
use fleet_feeds::FeedError;
use fleet_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Notifier error: {0}")]
    Notifier(#[from] NotifierError),
}

impl SyncError {
    /// Label used in `pollFailed` dedup keys.
    pub fn failure_class(&self) -> String {
        match self {
            SyncError::Feed(e) => e.failure_class(),
            SyncError::Store(_) => "store".to_string(),
            SyncError::Notifier(_) => "notifier".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_class() {
        let timeout = SyncError::from(FeedError::Timeout("GET /balance".to_string()));
        assert_eq!(timeout.failure_class(), "timeout");

        let missing = SyncError::from(FeedError::HttpStatus {
            status: 404,
            url: "http://bot/diffdata".to_string(),
        });
        assert_eq!(missing.failure_class(), "http-404");
    }

    #[test]
    fn test_notifier_failure_class() {
        let bad = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error = SyncError::from(NotifierError::from(bad));
        assert_eq!(error.failure_class(), "notifier");
        assert!(error.to_string().starts_with("Notifier error: Serialization error"));
    }
}
