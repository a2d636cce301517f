//! Node service: lifecycle, heartbeat, dispatch and construction.

mod builder;
mod dispatch;
mod heartbeat;
mod node;
mod state;

pub use builder::ServiceBuilder;
pub use dispatch::{ServiceInfo, OWN_METHODS};
pub use node::NodeService;
pub use state::{Connectivity, ServiceState};
