//! Dispatch Layer
//!
//! Pattern registry, handler contracts and the tiered dispatcher.

pub mod dispatcher;
pub mod handler;
pub mod inflight;
pub mod registry;
pub mod subscription;

pub use dispatcher::{DispatchReport, Dispatcher, HandlerFailure};
pub use handler::{EventHandler, HandlerFn, HandlerRef, HandlerTable};
pub use inflight::{InFlightGuard, InFlightTracker};
pub use registry::PatternRegistry;
pub use subscription::{EventFilter, SubscribeOptions, Subscription, SubscriptionHandle, SubscriptionId};

pub(crate) use dispatcher::guarded;
