mod debug;
mod health_check;
mod subscriptions;
mod subscriptions_preflight;

pub use debug::*;
pub use health_check::*;
pub use subscriptions::*;
pub use subscriptions_preflight::*;
