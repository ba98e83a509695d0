use chrono::{DateTime, Utc};

/// A domain-agnostic event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - addressed to a **recipient** when a person should be notified
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "delivery.confirmed").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Notification routing key (e.g. the staff member a delivery was made to).
    ///
    /// Consumers batch notifications per recipient; `None` means broadcast.
    fn recipient(&self) -> Option<String> {
        None
    }
}
