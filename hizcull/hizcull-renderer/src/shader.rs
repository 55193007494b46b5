//! Compute kernel compilation: WGSL body + generated constants and named bindings.
//!
//! Kernels declare their resources by name; the service assigns `@binding` indices
//! in declaration order and generates the `@group(0)` declarations, so stage code binds
//! by name and never hardcodes slots.

use std::fmt::Write as _;

use crate::error::CullError;

/// Compile-time constant injected ahead of the kernel body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShaderConstant {
    U32(u32),
    Bool(bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    Uniform,
    StorageRead,
    StorageReadWrite,
    /// `texture_2d<f32>`, unfilterable float (R32Float, or Depth32Float read through `.r`).
    Texture2dUnfilterable,
    /// `texture_storage_2d<r32float, write>`.
    StorageTextureR32FloatWrite,
}

#[derive(Clone, Copy, Debug)]
pub struct BindingDecl {
    pub name: &'static str,
    pub kind: BindingKind,
    /// WGSL type for buffer bindings. Ignored for textures.
    pub wgsl_type: &'static str,
}

impl BindingDecl {
    pub const fn buffer(name: &'static str, kind: BindingKind, wgsl_type: &'static str) -> Self {
        Self { name, kind, wgsl_type }
    }

    pub const fn texture(name: &'static str, kind: BindingKind) -> Self {
        Self { name, kind, wgsl_type: "" }
    }

    fn wgsl_declaration(&self, index: u32) -> String {
        let decl = match self.kind {
            BindingKind::Uniform => format!("var<uniform> {}: {};", self.name, self.wgsl_type),
            BindingKind::StorageRead => format!("var<storage, read> {}: {};", self.name, self.wgsl_type),
            BindingKind::StorageReadWrite => {
                format!("var<storage, read_write> {}: {};", self.name, self.wgsl_type)
            }
            BindingKind::Texture2dUnfilterable => format!("var {}: texture_2d<f32>;", self.name),
            BindingKind::StorageTextureR32FloatWrite => {
                format!("var {}: texture_storage_2d<r32float, write>;", self.name)
            }
        };
        format!("@group(0) @binding({index}) {decl}")
    }

    fn layout_entry(&self, index: u32) -> wgpu::BindGroupLayoutEntry {
        let ty = match self.kind {
            BindingKind::Uniform => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            BindingKind::StorageRead => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            BindingKind::StorageReadWrite => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            BindingKind::Texture2dUnfilterable => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            BindingKind::StorageTextureR32FloatWrite => wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: wgpu::TextureFormat::R32Float,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
        };
        wgpu::BindGroupLayoutEntry {
            binding: index,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty,
            count: None,
        }
    }
}

/// Everything needed to build one compute kernel.
#[derive(Clone, Debug)]
pub struct KernelDescriptor {
    pub name: &'static str,
    pub source: &'static str,
    pub entry_point: &'static str,
    pub defines: Vec<(&'static str, ShaderConstant)>,
    pub bindings: &'static [BindingDecl],
}

impl KernelDescriptor {
    /// Full WGSL module text: generated header followed by the kernel body.
    /// `WORKGROUP_SIZE` and `linear_index` are always defined.
    pub fn assemble(&self, workgroup_size: u32) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "// {}", self.name);
        let _ = writeln!(out, "const WORKGROUP_SIZE: u32 = {workgroup_size}u;");
        for (name, value) in &self.defines {
            match value {
                ShaderConstant::U32(v) => {
                    let _ = writeln!(out, "const {name}: u32 = {v}u;");
                }
                ShaderConstant::Bool(v) => {
                    let _ = writeln!(out, "const {name}: bool = {v};");
                }
            }
        }
        for (i, binding) in self.bindings.iter().enumerate() {
            let _ = writeln!(out, "{}", binding.wgsl_declaration(i as u32));
        }
        out.push_str(LINEAR_INDEX_WGSL);
        out.push_str(self.source);
        out
    }
}

/// A compiled compute kernel plus its binding table.
#[derive(Debug)]
pub struct Kernel {
    name: &'static str,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    bindings: &'static [BindingDecl],
    workgroup_size: u32,
}

impl Kernel {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    pub fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }

    /// Build a bind group from named resources. Every declared binding must be supplied
    /// exactly once and no undeclared name may appear.
    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        resources: &[(&str, wgpu::BindingResource<'_>)],
    ) -> Result<wgpu::BindGroup, CullError> {
        if let Some((unknown, _)) =
            resources.iter().find(|(name, _)| !self.bindings.iter().any(|b| b.name == *name))
        {
            return Err(CullError::UnboundResource {
                kernel: self.name.to_string(),
                binding: unknown.to_string(),
            });
        }
        let mut entries = Vec::with_capacity(self.bindings.len());
        for (i, decl) in self.bindings.iter().enumerate() {
            let resource = resources
                .iter()
                .find(|(name, _)| *name == decl.name)
                .map(|(_, r)| r.clone())
                .ok_or_else(|| CullError::UnboundResource {
                    kernel: self.name.to_string(),
                    binding: decl.name.to_string(),
                })?;
            entries.push(wgpu::BindGroupEntry { binding: i as u32, resource });
        }
        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.name),
            layout: &self.layout,
            entries: &entries,
        }))
    }

    /// Dispatch `invocations` threads as a 1D grid, folding into y when x would exceed the device limit.
    /// Kernels rebuild the linear index from `num_workgroups`.
    pub fn dispatch_linear(&self, pass: &mut wgpu::ComputePass<'_>, invocations: u32, max_per_dim: u32) {
        let groups = invocations.div_ceil(self.workgroup_size);
        let (x, y) = split_groups(groups, max_per_dim);
        if x > 0 {
            pass.dispatch_workgroups(x, y, 1);
        }
    }
}

/// Split a workgroup count into an (x, y) grid with x <= max_per_dim.
pub fn split_groups(groups: u32, max_per_dim: u32) -> (u32, u32) {
    if groups == 0 {
        return (0, 0);
    }
    let max_per_dim = max_per_dim.max(1);
    if groups <= max_per_dim {
        (groups, 1)
    } else {
        (max_per_dim, groups.div_ceil(max_per_dim))
    }
}

/// Compiles compute kernels for the engine.
pub trait ShaderService: Send + Sync {
    fn compile_kernel(
        &self,
        device: &wgpu::Device,
        descriptor: &KernelDescriptor,
        workgroup_size: u32,
    ) -> Result<Kernel, CullError>;
}

/// Builds kernels from in-crate WGSL sources. Validation errors are captured with an error scope.
#[derive(Debug, Default)]
pub struct WgslShaderService;

impl ShaderService for WgslShaderService {
    fn compile_kernel(
        &self,
        device: &wgpu::Device,
        descriptor: &KernelDescriptor,
        workgroup_size: u32,
    ) -> Result<Kernel, CullError> {
        let source = descriptor.assemble(workgroup_size);
        let entries: Vec<_> = descriptor
            .bindings
            .iter()
            .enumerate()
            .map(|(i, b)| b.layout_entry(i as u32))
            .collect();

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(descriptor.name),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(descriptor.name),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(descriptor.name),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(descriptor.name),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(descriptor.entry_point),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(CullError::ShaderCompile {
                descriptor: descriptor.name.to_string(),
                message: err.to_string(),
            });
        }
        log::debug!("compiled kernel {} (workgroup size {})", descriptor.name, workgroup_size);
        Ok(Kernel {
            name: descriptor.name,
            pipeline,
            layout,
            bindings: descriptor.bindings,
            workgroup_size,
        })
    }
}

/// Linear invocation index of a possibly folded 2D dispatch (see `Kernel::dispatch_linear`).
const LINEAR_INDEX_WGSL: &str = "
fn linear_index(gid: vec3<u32>, groups: vec3<u32>) -> u32 {
    return gid.x + gid.y * groups.x * WORKGROUP_SIZE;
}
";

#[cfg(test)]
mod tests {
    use super::*;

    const BINDINGS: &[BindingDecl] = &[
        BindingDecl::buffer("params", BindingKind::Uniform, "Params"),
        BindingDecl::buffer("ids", BindingKind::StorageRead, "array<u32>"),
        BindingDecl::texture("hiz", BindingKind::Texture2dUnfilterable),
    ];

    fn descriptor() -> KernelDescriptor {
        KernelDescriptor {
            name: "test_kernel",
            source: "struct Params { n: u32 }\n",
            entry_point: "main",
            defines: vec![("DRAW_COUNTER_ENABLED", ShaderConstant::Bool(true)), ("MAX_INSTANCES", ShaderConstant::U32(128))],
            bindings: BINDINGS,
        }
    }

    #[test]
    fn header_declares_constants_and_bindings_in_order() {
        let src = descriptor().assemble(32);
        assert!(src.contains("const WORKGROUP_SIZE: u32 = 32u;"));
        assert!(src.contains("const DRAW_COUNTER_ENABLED: bool = true;"));
        assert!(src.contains("const MAX_INSTANCES: u32 = 128u;"));
        assert!(src.contains("@group(0) @binding(0) var<uniform> params: Params;"));
        assert!(src.contains("@group(0) @binding(1) var<storage, read> ids: array<u32>;"));
        assert!(src.contains("@group(0) @binding(2) var hiz: texture_2d<f32>;"));
        assert!(src.contains("fn linear_index("));
        assert!(src.ends_with("struct Params { n: u32 }\n"));
    }

    #[test]
    fn split_groups_folds_into_y() {
        assert_eq!(split_groups(0, 65535), (0, 0));
        assert_eq!(split_groups(10, 65535), (10, 1));
        assert_eq!(split_groups(65536, 65535), (65535, 2));
    }
}
