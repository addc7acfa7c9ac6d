// benchmark.rs -- execution harness shared by the bench driver.
//
// Bundles the host backend with an optional accelerator so callers can
// stage buffer traffic around a realization the same way whether or
// not a device is present.

use std::time::Instant;

use crate::buffer::{Buffer, Elem};
use crate::gpu::{GpuDevice, TransferError};
use crate::interp::HostBackend;

pub struct Executor {
    backend: HostBackend,
    gpu: Option<GpuDevice>,
}

impl Executor {
    /// Probes for an accelerator once; a missing device is reported
    /// and the executor degrades to host-only.
    pub fn new() -> Self {
        let gpu = match GpuDevice::new() {
            Ok(dev) => {
                eprintln!("[pyrite] accelerator: {dev}");
                Some(dev)
            }
            Err(e) => {
                eprintln!("[pyrite] no accelerator: {e}");
                None
            }
        };
        Self {
            backend: HostBackend::new(),
            gpu,
        }
    }

    pub fn backend(&self) -> &HostBackend {
        &self.backend
    }

    pub fn has_accelerator(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn device(&self) -> Option<&GpuDevice> {
        self.gpu.as_ref()
    }

    /// Pushes a buffer to the device, if one is present.
    pub fn upload<T: Elem>(&self, buf: &mut Buffer<T>) -> Result<(), TransferError> {
        match &self.gpu {
            Some(dev) => buf.to_device(dev),
            None => Err(TransferError::NoAccelerator),
        }
    }

    /// Pulls a buffer back from the device, if one is present.
    pub fn download<T: Elem>(&self, buf: &mut Buffer<T>) -> Result<(), TransferError> {
        match &self.gpu {
            Some(dev) => buf.to_host(dev),
            None => Err(TransferError::NoAccelerator),
        }
    }

    /// Blocks until outstanding device work finishes. A no-op without
    /// an accelerator.
    pub fn sync(&self) {
        if let Some(dev) = &self.gpu {
            dev.sync();
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `f` once to warm up, then `samples` timed iterations, and
/// returns the best wall-clock time in milliseconds.
pub fn best_of_ms(samples: usize, mut f: impl FnMut()) -> f64 {
    f();
    let mut best = f64::INFINITY;
    for _ in 0..samples {
        let start = Instant::now();
        f();
        let ms = start.elapsed().as_secs_f64() * 1e3;
        if ms < best {
            best = ms;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_of_runs_the_closure() {
        let mut calls = 0usize;
        let best = best_of_ms(3, || calls += 1);
        // Warmup plus three samples.
        assert_eq!(calls, 4);
        assert!(best >= 0.0);
        assert!(best.is_finite());
    }
}
