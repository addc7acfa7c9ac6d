// gpu/transfer.rs -- host <-> device buffer traffic.

use wgpu::util::DeviceExt;

use super::{GpuDevice, TransferError};

/// A storage buffer resident on the device, tracked alongside the host
/// copy it mirrors.
pub struct DeviceBuffer {
    buffer: wgpu::Buffer,
    /// Logical payload size; the wgpu allocation may be padded to a
    /// 4-byte multiple.
    len_bytes: usize,
}

impl DeviceBuffer {
    /// Allocates a storage buffer and uploads `bytes` into it.
    pub fn upload(dev: &GpuDevice, label: &str, bytes: &[u8]) -> Result<Self, TransferError> {
        let padded = pad4(bytes.len());
        check_allocation(dev, padded as u64)?;
        let buffer = if padded == bytes.len() {
            dev.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytes,
                    usage: wgpu::BufferUsages::STORAGE
                        | wgpu::BufferUsages::COPY_SRC
                        | wgpu::BufferUsages::COPY_DST,
                })
        } else {
            let mut padded_bytes = bytes.to_vec();
            padded_bytes.resize(padded, 0);
            dev.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: &padded_bytes,
                    usage: wgpu::BufferUsages::STORAGE
                        | wgpu::BufferUsages::COPY_SRC
                        | wgpu::BufferUsages::COPY_DST,
                })
        };
        Ok(Self {
            buffer,
            len_bytes: bytes.len(),
        })
    }

    /// Overwrites the device copy in place. `bytes` must match the
    /// length this buffer was created with.
    pub fn write(&self, dev: &GpuDevice, bytes: &[u8]) {
        debug_assert_eq!(bytes.len(), self.len_bytes);
        if pad4(bytes.len()) == bytes.len() {
            dev.queue.write_buffer(&self.buffer, 0, bytes);
        } else {
            let mut padded_bytes = bytes.to_vec();
            padded_bytes.resize(pad4(bytes.len()), 0);
            dev.queue.write_buffer(&self.buffer, 0, &padded_bytes);
        }
        dev.queue.submit(std::iter::empty());
    }

    /// Copies the device contents back to the host through a staging
    /// buffer and a blocking map.
    pub fn download(&self, dev: &GpuDevice) -> Result<Vec<u8>, TransferError> {
        let padded = pad4(self.len_bytes) as u64;
        let staging = dev.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pyrite readback staging"),
            size: padded,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = dev
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("pyrite readback"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging, 0, padded);
        dev.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        dev.device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(TransferError::Readback(e)),
            Err(_) => return Err(TransferError::NoAccelerator),
        }

        let mut out = slice.get_mapped_range().to_vec();
        staging.unmap();
        out.truncate(self.len_bytes);
        Ok(out)
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn len_bytes(&self) -> usize {
        self.len_bytes
    }
}

fn pad4(n: usize) -> usize {
    (n + 3) & !3
}

fn check_allocation(dev: &GpuDevice, requested: u64) -> Result<(), TransferError> {
    let limit = dev.max_buffer_size();
    if requested > limit {
        return Err(TransferError::Allocation { requested, limit });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_to_word() {
        assert_eq!(pad4(0), 0);
        assert_eq!(pad4(1), 4);
        assert_eq!(pad4(4), 4);
        assert_eq!(pad4(13), 16);
    }

    #[test]
    #[ignore = "requires a Vulkan adapter"]
    fn upload_download_round_trip() {
        let dev = GpuDevice::new().unwrap();
        let payload: Vec<u8> = (0u8..=255).collect();
        let buf = DeviceBuffer::upload(&dev, "test", &payload).unwrap();
        assert_eq!(buf.download(&dev).unwrap(), payload);
    }

    #[test]
    #[ignore = "requires a Vulkan adapter"]
    fn unaligned_payload_round_trips() {
        let dev = GpuDevice::new().unwrap();
        let payload = vec![7u8, 8, 9];
        let buf = DeviceBuffer::upload(&dev, "test", &payload).unwrap();
        assert_eq!(buf.download(&dev).unwrap(), payload);
    }
}
