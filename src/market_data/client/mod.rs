pub mod pacer;
pub mod rate_limited_client;
pub mod transport;

pub use pacer::ProviderPacer;
pub use rate_limited_client::{RateLimitedClient, RetryPolicy};
pub use transport::{ProviderEndpoint, ProviderRequest, ReqwestTransport};
