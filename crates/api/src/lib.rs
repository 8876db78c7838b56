mod handlers;
mod routes;

pub use handlers::{resolve_module, resolve_network, ApiState, SnapshotQuery};
pub use routes::create_router;
