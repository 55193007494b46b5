//! hizcull bridge: implements cull_api::CullBackend using hizcull-renderer.

mod headless;
mod plugin;

pub use headless::{create_headless, request_device};
pub use plugin::HizCullPlugin;
