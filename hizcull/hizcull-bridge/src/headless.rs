//! Headless backend creation: no window or surface, culling results stay on the GPU.

use cull_api::{BackendError, CullBackend};
use hizcull_renderer::CullConfig;

use crate::plugin::HizCullPlugin;

/// Downlevel adapters (GL, WebGL) do not produce a usable pyramid from the compute passes.
fn require_webgpu_compliant(caps: &wgpu::DownlevelCapabilities, adapter_name: &str) -> Result<(), BackendError> {
    if caps.is_webgpu_compliant() {
        return Ok(());
    }
    Err(BackendError::Device(format!(
        "adapter {adapter_name} is not WebGPU compliant (missing {:?})",
        wgpu::DownlevelFlags::compliant() - caps.flags
    )))
}

/// Request the default adapter and a device with the adapter's full limits.
pub async fn request_device() -> Result<(wgpu::Device, wgpu::Queue), BackendError> {
    let instance = wgpu::Instance::default();
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions::default())
        .await
        .ok_or(BackendError::NoAdapter)?;
    let info = adapter.get_info();
    log::info!("hizcull adapter: {} ({:?})", info.name, info.backend);
    require_webgpu_compliant(&adapter.get_downlevel_capabilities(), &info.name)?;
    adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("hizcull_device"),
                required_limits: adapter.limits(),
                ..Default::default()
            },
            None,
        )
        .await
        .map_err(|e| BackendError::Device(e.to_string()))
}

/// Create a plugin on a fresh headless device. Blocks on device creation.
pub fn create_headless(config: CullConfig) -> Result<Box<dyn CullBackend>, BackendError> {
    let (device, queue) = pollster::block_on(request_device())?;
    let plugin = HizCullPlugin::new_with_config(device, queue, config)?;
    Ok(Box::new(plugin))
}
