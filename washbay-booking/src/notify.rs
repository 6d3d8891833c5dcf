use async_trait::async_trait;

use washbay_core::repository::NotificationDispatcher;
use washbay_core::BookingError;

/// Dispatcher that only logs. Stands in wherever a real delivery channel
/// (WhatsApp gateway, webhook) is not wired up; the coordinator treats every
/// dispatcher as best-effort either way.
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn send(&self, phone: &str, message: &str) -> Result<(), BookingError> {
        tracing::info!(
            phone = %washbay_shared::pii::mask_phone(phone),
            len = message.len(),
            "notification dispatched (log only)"
        );
        Ok(())
    }
}
