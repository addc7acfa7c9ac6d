// gpu/mod.rs: wgpu device context and host<->device buffer transfer.
//
// The execution backends in this crate run on the host; the GPU layer
// gives buffers real device residency so the benchmark harness can
// time the transfer legs (upload inputs, realize, read back, sync).

pub mod device;
pub mod transfer;

pub use device::GpuDevice;
pub use transfer::DeviceBuffer;

use std::fmt;

/// Device transfer failure. Callers either fall back to host-only
/// execution or abort.
#[derive(Debug)]
pub enum TransferError {
    /// No usable accelerator: adapter enumeration came up empty.
    NoAccelerator,
    /// wgpu device request failed (driver issue, unsupported limits).
    DeviceRequest(wgpu::RequestDeviceError),
    /// Buffer exceeds what the device will allocate.
    Allocation { requested: u64, limit: u64 },
    /// Readback mapping failed.
    Readback(wgpu::BufferAsyncError),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::NoAccelerator => {
                write!(f, "no accelerator available (no Vulkan adapter found)")
            }
            TransferError::DeviceRequest(e) => write!(f, "device request failed: {e}"),
            TransferError::Allocation { requested, limit } => write!(
                f,
                "device allocation of {requested} bytes exceeds limit of {limit} bytes"
            ),
            TransferError::Readback(e) => write!(f, "readback map failed: {e}"),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::DeviceRequest(e) => Some(e),
            TransferError::Readback(e) => Some(e),
            _ => None,
        }
    }
}
