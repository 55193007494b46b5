//! Typed sub-ranges of GPU buffers.

use std::num::NonZeroU64;
use std::sync::Arc;

/// A byte range of a buffer. Every buffer slice passed between stages is one of these.
#[derive(Clone, Debug)]
pub struct BufferRegion {
    pub buffer: Arc<wgpu::Buffer>,
    pub offset: u64,
    pub size: u64,
}

impl BufferRegion {
    pub fn new(buffer: Arc<wgpu::Buffer>, offset: u64, size: u64) -> Self {
        Self { buffer, offset, size }
    }

    pub fn whole(buffer: Arc<wgpu::Buffer>) -> Self {
        let size = buffer.size();
        Self { buffer, offset: 0, size }
    }

    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: self.offset,
            size: NonZeroU64::new(self.size),
        })
    }

    pub fn slice(&self) -> wgpu::BufferSlice<'_> {
        self.buffer.slice(self.offset..self.offset + self.size)
    }

    /// Sub-region relative to this one; clamped to its end.
    pub fn sub(&self, offset: u64, size: u64) -> Self {
        let offset = offset.min(self.size);
        let size = size.min(self.size - offset);
        Self { buffer: self.buffer.clone(), offset: self.offset + offset, size }
    }

    pub fn write(&self, queue: &wgpu::Queue, offset: u64, data: &[u8]) {
        debug_assert!(offset + data.len() as u64 <= self.size);
        queue.write_buffer(&self.buffer, self.offset + offset, data);
    }
}

pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

pub fn create_buffer(device: &wgpu::Device, label: &str, size: u64, usage: wgpu::BufferUsages) -> Arc<wgpu::Buffer> {
    Arc::new(device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        // Bound regions need a non-zero size even when empty.
        size: align_up(size.max(16), wgpu::COPY_BUFFER_ALIGNMENT),
        usage,
        mapped_at_creation: false,
    }))
}
