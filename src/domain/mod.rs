mod new_subscription;
mod subscriber_email;
// allow external `use` statements to skip `new_subscription` etc
pub use new_subscription::NewSubscription;
pub use new_subscription::ValidationIssue;
pub use new_subscription::DEFAULT_SOURCE;
pub use subscriber_email::SubscriberEmail;
