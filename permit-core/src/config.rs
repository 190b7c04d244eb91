//! Platform configuration.
//!
//! A single immutable value constructed at startup and injected into every
//! service and background loop. All timers and thresholds come from here;
//! nothing reads configuration ambiently.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Capability flags of the external access-control provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessProviderCaps {
    /// Provider accepts per-grant validity windows
    pub supports_time_window: bool,
    /// Provider can list its current grant set for reconciliation
    pub supports_query: bool,
}

impl Default for AccessProviderCaps {
    fn default() -> Self {
        Self {
            supports_time_window: true,
            supports_query: false,
        }
    }
}

/// Immutable platform configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Relational store URL
    pub db_url: String,
    /// Sorted-set / TTL store URL
    pub queue_url: String,

    /// Bearer-token signing secret
    pub jwt_secret: String,
    /// Token signing algorithm
    pub jwt_algo: String,
    /// Token lifetime in minutes
    pub access_token_ttl_min: i64,

    /// Access-control provider endpoint
    pub access_provider_url: String,
    /// Access-control provider API key
    pub access_provider_key: String,
    /// Access-control provider capabilities
    pub access_provider_caps: AccessProviderCaps,
    /// Retry backoff schedule in seconds
    pub access_sync_retry_intervals: Vec<i64>,
    /// Seconds before a pre-active grant counts as stuck
    pub sync_stuck_threshold_secs: i64,

    /// Face-verification provider endpoint
    pub face_provider_url: String,
    /// Face-verification provider API key
    pub face_provider_key: String,
    /// Pass probability when the face provider runs in mock mode
    pub face_mock_pass_rate: f64,

    /// Real-name registry endpoint
    pub realname_provider_url: String,
    /// Real-name registry API key
    pub realname_provider_key: String,

    /// First hour (inclusive) of the daily delivery window
    pub notif_allowed_hours_start: u32,
    /// Last hour (inclusive) of the daily delivery window
    pub notif_allowed_hours_end: u32,
    /// Maximum delivery retries per notification
    pub notif_max_retries: u32,
    /// Dedup reservation lifetime in seconds
    pub notif_dedup_ttl_secs: i64,
    /// Internal notification type → provider template id
    pub notification_templates: HashMap<String, String>,

    /// Player jump threshold as a fraction of media length
    pub training_max_skip_percent: f64,
    /// Heartbeat gap beyond which watch time stops accruing, seconds
    pub training_heartbeat_timeout_secs: i64,
    /// Heartbeat gap beyond which the session expires, seconds
    pub training_heartbeat_expire_secs: i64,
    /// Suspicious events tolerated before the session fails
    pub training_max_suspicious: u32,
    /// Lower bound of the random-check interval, seconds
    pub training_random_check_min_secs: i64,
    /// Upper bound of the random-check interval, seconds
    pub training_random_check_max_secs: i64,
    /// Seconds a worker has to answer a random check
    pub training_check_answer_timeout_secs: i64,
    /// Consecutive failed checks tolerated before the session fails
    pub training_max_consecutive_check_failures: u32,
    /// Required watched coverage of media length
    pub training_required_watch_percent: f64,
    /// Playback speed tolerance over wall-clock time
    pub training_speed_tolerance: f64,
    /// Allowed position slack when judging completion, seconds
    pub training_position_error_margin: i64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            db_url: "postgres://localhost/permits".to_string(),
            queue_url: "redis://localhost:6379/0".to_string(),
            jwt_secret: String::new(),
            jwt_algo: "HS256".to_string(),
            access_token_ttl_min: 1440,
            access_provider_url: String::new(),
            access_provider_key: String::new(),
            access_provider_caps: AccessProviderCaps::default(),
            access_sync_retry_intervals: vec![60, 300, 1800, 7200],
            sync_stuck_threshold_secs: 600,
            face_provider_url: String::new(),
            face_provider_key: String::new(),
            face_mock_pass_rate: 0.95,
            realname_provider_url: String::new(),
            realname_provider_key: String::new(),
            notif_allowed_hours_start: 7,
            notif_allowed_hours_end: 21,
            notif_max_retries: 5,
            notif_dedup_ttl_secs: 3600,
            notification_templates: HashMap::new(),
            training_max_skip_percent: 0.05,
            training_heartbeat_timeout_secs: 60,
            training_heartbeat_expire_secs: 300,
            training_max_suspicious: 3,
            training_random_check_min_secs: 180,
            training_random_check_max_secs: 420,
            training_check_answer_timeout_secs: 60,
            training_max_consecutive_check_failures: 2,
            training_required_watch_percent: 0.95,
            training_speed_tolerance: 1.2,
            training_position_error_margin: 2,
        }
    }
}

impl PlatformConfig {
    /// Set the retry backoff schedule
    pub fn with_retry_intervals(mut self, intervals: Vec<i64>) -> Self {
        self.access_sync_retry_intervals = intervals;
        self
    }

    /// Set the daily delivery window
    pub fn with_allowed_hours(mut self, start: u32, end: u32) -> Self {
        self.notif_allowed_hours_start = start;
        self.notif_allowed_hours_end = end;
        self
    }

    /// Set the dedup reservation lifetime
    pub fn with_dedup_ttl(mut self, secs: i64) -> Self {
        self.notif_dedup_ttl_secs = secs;
        self
    }

    /// Register a notification template mapping
    pub fn with_template(
        mut self,
        notification_type: impl Into<String>,
        template_id: impl Into<String>,
    ) -> Self {
        self.notification_templates
            .insert(notification_type.into(), template_id.into());
        self
    }

    /// Look up the provider template for an internal notification type
    pub fn template_for(&self, notification_type: &str) -> Option<&str> {
        self.notification_templates
            .get(notification_type)
            .map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = PlatformConfig::default();
        assert_eq!(cfg.access_sync_retry_intervals, vec![60, 300, 1800, 7200]);
        assert_eq!(cfg.notif_allowed_hours_start, 7);
        assert_eq!(cfg.notif_allowed_hours_end, 21);
        assert_eq!(cfg.notif_dedup_ttl_secs, 3600);
        assert!((cfg.training_required_watch_percent - 0.95).abs() < f64::EPSILON);
        assert!(!cfg.access_provider_caps.supports_query);
    }

    #[test]
    fn test_template_lookup() {
        let cfg = PlatformConfig::default().with_template("TRAINING_REQUIRED", "tmpl_001");
        assert_eq!(cfg.template_for("TRAINING_REQUIRED"), Some("tmpl_001"));
        assert_eq!(cfg.template_for("UNKNOWN"), None);
    }
}
