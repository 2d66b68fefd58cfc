//! Subscription orchestration: checkout, creation and lifecycle changes
//! initiated by the user.

mod billing_details;
mod checkout;
mod create_subscription;
mod manage_subscription;
mod orchestrator;

pub use billing_details::UpdateBillingDetailsCommand;
pub use checkout::{CompleteCheckoutCommand, StartCheckoutCommand, StartCheckoutResult};
pub use create_subscription::{CreateSubscriptionCommand, CreateSubscriptionResult};
pub use manage_subscription::{CancelSubscriptionCommand, UpdateSubscriptionCommand};
pub use orchestrator::SubscriptionOrchestrator;
