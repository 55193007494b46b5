//! Optional visible-draw counter and its blocking readback.

use std::sync::Arc;

use wgpu::CommandEncoder;

use crate::buffer::{create_buffer, BufferRegion};
use crate::error::CullError;

const COUNTER_SIZE: u64 = 4;

pub struct DrawStatistics {
    counter: BufferRegion,
    staging: Arc<wgpu::Buffer>,
    enabled: bool,
    interval: u32,
    sampled: bool,
}

impl DrawStatistics {
    /// The counter buffer always exists so the cull kernel has something bound; only
    /// clears and copies are skipped when statistics are off.
    pub fn new(device: &wgpu::Device, enabled: bool, interval: u32) -> Self {
        let counter = BufferRegion::new(
            create_buffer(
                device,
                "hizcull_draw_counter",
                COUNTER_SIZE,
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            ),
            0,
            COUNTER_SIZE,
        );
        let staging = create_buffer(
            device,
            "hizcull_draw_counter_staging",
            COUNTER_SIZE,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );
        Self { counter, staging, enabled, interval: interval.max(1), sampled: false }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn counter(&self) -> &BufferRegion {
        &self.counter
    }

    pub fn is_sample_frame(&self, frame: u32) -> bool {
        self.enabled && frame % self.interval == 0
    }

    pub fn encode_reset(&self, encoder: &mut CommandEncoder) {
        if self.enabled {
            encoder.clear_buffer(&self.counter.buffer, 0, None);
        }
    }

    /// Copy the counter to staging on sampled frames. Returns whether a copy was encoded.
    pub fn encode_copy(&mut self, encoder: &mut CommandEncoder, frame: u32) -> bool {
        if !self.is_sample_frame(frame) {
            return false;
        }
        encoder.copy_buffer_to_buffer(&self.counter.buffer, self.counter.offset, &self.staging, 0, COUNTER_SIZE);
        self.sampled = true;
        true
    }

    /// Map the staging buffer and read the last sampled count. Blocks until the GPU is idle.
    pub fn read_visible_count(&self, device: &wgpu::Device) -> Result<u32, CullError> {
        if !self.enabled {
            return Err(CullError::Readback("draw statistics are disabled".to_string()));
        }
        if !self.sampled {
            return Err(CullError::Readback("no frame has sampled the draw counter yet".to_string()));
        }
        let slice = self.staging.slice(0..COUNTER_SIZE);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            if tx.send(result).is_err() {
                log::warn!("draw statistics: map result arrived after the reader gave up");
            }
        });
        if !device.poll(wgpu::Maintain::Wait).is_queue_empty() {
            log::warn!("draw statistics: device still has queued work after a blocking poll");
        }
        rx.recv()
            .map_err(|e| CullError::Readback(e.to_string()))?
            .map_err(|e| CullError::Readback(e.to_string()))?;
        let count = {
            let data = slice.get_mapped_range();
            bytemuck::pod_read_unaligned::<u32>(&data[..4])
        };
        self.staging.unmap();
        Ok(count)
    }
}
