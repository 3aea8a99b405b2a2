//! Robokassa gateway adapter: the shared-secret signature codec and the
//! payment client that builds outbound requests and authenticates webhooks.

pub mod gateway;
pub mod signature;
