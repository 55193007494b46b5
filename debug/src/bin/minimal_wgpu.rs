//! Minimal wgpu init (no window). Verifies hizcull-renderer compiles its kernels on this device.

fn main() {
    env_logger::init();
    pollster::block_on(async {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .expect("No adapter");
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .expect("No device");
        let engine = hizcull_renderer::CullEngine::new(device, queue).expect("CullEngine::new");
        let hiz = engine.hiz_resources().expect("hi-z targets");
        println!(
            "hizcull minimal_wgpu: OK ({}x{}, {} levels)",
            hiz.width(),
            hiz.height(),
            hiz.levels()
        );
    });
}
