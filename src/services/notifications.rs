use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Outbound delivery channel for tenant notices.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> &'static str;

    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), String>;
}

/// E-mail delivery through the Resend API.
pub struct ResendNotifier {
    http_client: Client,
    api_key: String,
    from_address: String,
}

impl ResendNotifier {
    pub fn new(http_client: Client, api_key: String, from_address: String) -> Self {
        Self {
            http_client,
            api_key,
            from_address,
        }
    }
}

fn html_body(body: &str) -> String {
    let escaped = body
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\n', "<br>");
    format!("<div style=\"font-family: sans-serif; max-width: 600px; margin: 0 auto;\">{escaped}</div>")
}

#[async_trait]
impl Notifier for ResendNotifier {
    fn channel(&self) -> &'static str {
        "email"
    }

    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), String> {
        if recipient.trim().is_empty() {
            return Err("Recipient has no e-mail address.".to_string());
        }

        let payload = json!({
            "from": self.from_address,
            "to": [recipient],
            "subject": subject,
            "text": body,
            "html": html_body(body),
        });

        let response = self
            .http_client
            .post("https://api.resend.com/emails")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                tracing::error!(error = %error, "Resend API request failed");
                "Resend API request failed.".to_string()
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let resp_body: Value = response
            .json()
            .await
            .unwrap_or(json!({"error": "failed to parse response"}));
        let error_msg = resp_body
            .as_object()
            .and_then(|o| o.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown Resend API error");
        Err(format!("Resend API error ({status}): {error_msg}"))
    }
}

/// Used when no e-mail provider is configured: the notice is logged and
/// counted as delivered.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> &'static str {
        "log"
    }

    async fn send(&self, recipient: &str, subject: &str, _body: &str) -> Result<(), String> {
        if recipient.trim().is_empty() {
            return Err("Recipient has no e-mail address.".to_string());
        }
        tracing::info!(recipient, subject, "Notification delivered to log channel");
        Ok(())
    }
}
