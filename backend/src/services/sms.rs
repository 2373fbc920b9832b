//! SMS delivery via the Twilio Messages API
//!
//! Used for quotation reminders alongside email. Best-effort: failures are
//! logged and never bubble up to the request that triggered them.

use crate::config::TwilioConfig;
use tracing::{debug, error};

#[derive(Clone)]
pub struct SmsService {
    client: reqwest::Client,
    config: Option<TwilioConfig>,
}

impl SmsService {
    pub fn new(config: Option<TwilioConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    pub async fn send(&self, to_number: &str, body: &str) {
        let Some(config) = &self.config else {
            debug!("Twilio not configured, skipping SMS");
            return;
        };

        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            config.account_sid
        );

        let params = [
            ("To", to_number),
            ("From", config.from_number.as_str()),
            ("Body", body),
        ];

        let result = self
            .client
            .post(&url)
            .basic_auth(&config.account_sid, Some(&config.auth_token))
            .form(&params)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("SMS delivered to {}", to_number);
            }
            Ok(response) => {
                error!("Twilio returned status {}", response.status());
            }
            Err(e) => {
                error!("Failed to send SMS to {}: {}", to_number, e);
            }
        }
    }
}
