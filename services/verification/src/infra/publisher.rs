use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::domain::repository::VerificationPublisher;
use crate::domain::types::{VerificationMessage, truncate_error};
use crate::error::PublishError;

/// Delivers verification messages by POSTing them as JSON to a mailer endpoint.
///
/// Any 2xx response counts as accepted. Anything else is a rejection the outbox
/// will retry.
#[derive(Clone)]
pub struct HttpPublisher {
    client: Client,
    url: String,
    auth_token: Option<String>,
}

impl HttpPublisher {
    pub fn new(
        url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PublishError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            auth_token,
        })
    }
}

impl VerificationPublisher for HttpPublisher {
    async fn send(&self, message: &VerificationMessage) -> Result<(), PublishError> {
        let mut request = self.client.post(&self.url).json(message);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body: truncate_error(&body),
            });
        }

        debug!(recipient = %message.email, %status, "publisher accepted message");
        Ok(())
    }
}
