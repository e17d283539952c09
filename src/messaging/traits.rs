//! Messaging trait and dynamic dispatch companion.

use crate::error::{DeliveryError, Result};
use std::pin::Pin;

/// Static trait for destination adapters.
/// Use this for type-safe implementations.
pub trait Messaging: Send + Sync + 'static {
    /// Unique name for this adapter.
    fn name(&self) -> &str;

    /// Deliver one formatted message to a destination chat.
    fn send_message(
        &self,
        target: &str,
        text: &str,
    ) -> impl std::future::Future<Output = std::result::Result<(), DeliveryError>> + Send;

    /// Health check.
    fn health_check(&self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Graceful shutdown.
    fn shutdown(&self) -> impl std::future::Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

/// Dynamic trait for runtime polymorphism.
/// Use this when you need `Arc<dyn MessagingDyn>` for storing different adapters.
pub trait MessagingDyn: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn send_message<'a>(
        &'a self,
        target: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = std::result::Result<(), DeliveryError>> + Send + 'a>>;

    fn health_check<'a>(&'a self) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

    fn shutdown<'a>(&'a self) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;
}

/// Blanket implementation: any type implementing Messaging automatically implements MessagingDyn.
impl<T: Messaging> MessagingDyn for T {
    fn name(&self) -> &str {
        Messaging::name(self)
    }

    fn send_message<'a>(
        &'a self,
        target: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = std::result::Result<(), DeliveryError>> + Send + 'a>>
    {
        Box::pin(Messaging::send_message(self, target, text))
    }

    fn health_check<'a>(&'a self) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(Messaging::health_check(self))
    }

    fn shutdown<'a>(&'a self) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(Messaging::shutdown(self))
    }
}
