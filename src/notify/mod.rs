// Notification delivery (best-effort)
pub mod telegram;

pub use telegram::TelegramNotifier;

use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Upper bound on one delivery attempt, whatever the notifier does
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(15);

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message; fails with `NotifierFailure`
    async fn notify(&self, text: &str) -> Result<()>;
}

/// Notifier that only writes to the log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        tracing::info!("📣 {}", text);
        Ok(())
    }
}

/// Send `text` and swallow any failure or timeout after logging it
pub async fn notify_best_effort(notifier: &dyn Notifier, text: &str) {
    match tokio::time::timeout(NOTIFY_TIMEOUT, notifier.notify(text)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Notification dropped: {}", e),
        Err(_) => tracing::warn!(
            "Notification dropped: no answer after {}s",
            NOTIFY_TIMEOUT.as_secs()
        ),
    }
}

/// Escape the characters Telegram's legacy Markdown reads as entity markers
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
