pub mod alert;
pub mod credential;
pub mod dead_letter;
pub mod event;
pub mod subscription;

pub use alert::{Alert, AlertRule, ConditionKind, Severity};
pub use credential::Credential;
pub use dead_letter::{DeadLetterRecord, DeadLetterSource, DeadLetterStatus};
pub use event::{EventEnvelope, EventType, RawEnvelope};
pub use subscription::{Subscription, SubscriptionStatus, Tier, TierLimits};
