use crate::{AppError, AppResult};

/// Best-effort forwarder to an external messaging webhook.
///
/// Ingestion spawns `notify` and logs the outcome; a relay failure is never
/// surfaced to the sender and never retried.
#[derive(Clone)]
pub struct Relay {
    http: reqwest::Client,
    webhook_url: Option<String>,
}

impl Relay {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_url,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub async fn notify(
        &self,
        content: &str,
        attachment: Option<(String, Vec<u8>)>,
    ) -> AppResult<()> {
        let Some(url) = &self.webhook_url else {
            tracing::debug!("webhook relay not configured, dropping notification");
            return Ok(());
        };

        let response = match attachment {
            Some((file_name, data)) => {
                let part = reqwest::multipart::Part::bytes(data).file_name(file_name);
                let mut form = reqwest::multipart::Form::new().part("file", part);
                if !content.trim().is_empty() {
                    form = form.text("content", content.to_owned());
                }
                self.http.post(url).multipart(form).send().await?
            }
            None => {
                self.http
                    .post(url)
                    .json(&serde_json::json!({ "content": content }))
                    .send()
                    .await?
            }
        };

        if !response.status().is_success() {
            return Err(AppError::Relay(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
