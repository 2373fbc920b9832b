//! Mobile push notifications via Firebase Cloud Messaging
//!
//! Push is best-effort: when FCM is not configured, or a send fails, the
//! in-app notification row is still the source of truth and the failure is
//! only logged.

use crate::config::FcmConfig;
use serde_json::json;
use tracing::{debug, error};

#[derive(Clone)]
pub struct PushService {
    client: reqwest::Client,
    config: Option<FcmConfig>,
}

impl PushService {
    pub fn new(config: Option<FcmConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    /// Send a push message to a single device token. `job_id` and `screen`
    /// ride in the data payload so the mobile app can deep-link.
    pub async fn send(
        &self,
        device_token: &str,
        title: &str,
        body: &str,
        job_id: Option<&str>,
        screen: Option<&str>,
    ) {
        let Some(config) = &self.config else {
            debug!("FCM not configured, skipping push notification");
            return;
        };

        let payload = json!({
            "to": device_token,
            "notification": {
                "title": title,
                "body": body,
            },
            "data": {
                "jobId": job_id.unwrap_or(""),
                "screen": screen.unwrap_or(""),
            },
        });

        let result = self
            .client
            .post(&config.endpoint)
            .header("Authorization", format!("key={}", config.server_key))
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("Push notification delivered");
            }
            Ok(response) => {
                error!("FCM returned status {}", response.status());
            }
            Err(e) => {
                error!("Failed to send push notification: {}", e);
            }
        }
    }
}
