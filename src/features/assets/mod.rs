pub mod handler;
mod orchestrator;
mod store;

pub use handler::create_asset_router;
pub use orchestrator::{ensure_generated, generate_assets};
pub use store::{AssetKind, AssetStore};
