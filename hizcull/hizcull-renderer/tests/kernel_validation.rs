//! Front-end validation of every assembled kernel with naga. Needs no device.

use hizcull_renderer::{compact, hiz, tuning, visibility};

const OCCLUDER_WGSL: &str = include_str!("../shaders/occluder.wgsl");

fn validate(name: &str, source: &str) {
    let module = match naga::front::wgsl::parse_str(source) {
        Ok(module) => module,
        Err(e) => panic!("{name} failed to parse:\n{}", e.emit_to_string(source)),
    };
    let mut validator =
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::default());
    if let Err(e) = validator.validate(&module) {
        panic!("{name} failed validation:\n{}", e.emit_to_string(source));
    }
}

#[test]
fn occlusion_cull_kernel_validates() {
    for counter in [true, false] {
        let descriptor = visibility::kernel_descriptor(counter);
        validate(descriptor.name, &descriptor.assemble(64));
    }
}

#[test]
fn hiz_kernels_validate() {
    for descriptor in [hiz::copy_kernel_descriptor(), hiz::downsample_kernel_descriptor()] {
        validate(descriptor.name, &descriptor.assemble(64));
    }
}

#[test]
fn stream_compact_kernel_validates() {
    let descriptor = compact::kernel_descriptor();
    validate(descriptor.name, &descriptor.assemble(64));
}

#[test]
fn kernels_validate_at_every_candidate_size() {
    for size in tuning::SWEEP_SIZES {
        let descriptor = visibility::kernel_descriptor(true);
        validate(descriptor.name, &descriptor.assemble(size));
    }
}

#[test]
fn occluder_shader_validates() {
    validate("occluder", OCCLUDER_WGSL);
}
