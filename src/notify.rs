use std::{error::Error, time::Duration};

use async_trait::async_trait;
use tracing::{debug, info};

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Send a text message to a phone number.
    async fn send(&self, to: &str, body: &str) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Stand-in used when no SMS gateway is configured: the message only goes to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, body: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        info!(%to, %body, "SMS gateway not configured, logging message instead");
        Ok(())
    }
}

/// Sends messages through the Twilio Messages API.
pub struct TwilioNotifier {
    account_sid: String,
    auth_token: String,
    from_number: String,
    endpoint: String,
    client: reqwest::Client,
}

impl TwilioNotifier {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            endpoint: format!(
                "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
                account_sid
            ),
            account_sid,
            auth_token,
            from_number,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn send(&self, to: &str, body: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        let form = [("To", to), ("From", self.from_number.as_str()), ("Body", body)];

        self.client
            .post(&self.endpoint)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?;

        debug!(%to, "SMS sent");
        Ok(())
    }
}
