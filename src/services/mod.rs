pub mod health;
pub mod proxy;

pub use health::{HealthResponse, HealthState, HealthStatus, UpstreamInfo};
pub use proxy::{create_router, start_proxy_server, ProxyState, Upstream};
