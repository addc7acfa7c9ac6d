// gpu/device.rs -- wgpu device abstraction.
//
// Vulkan-only: the execution backends that hand work to this device
// compile against Vulkan semantics, so other wgpu backends are not
// enumerated.

use super::TransferError;

/// Handle to a GPU adapter plus the queue used for buffer traffic.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
    // Dropped last; the device borrows from the instance internally.
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Picks the best available Vulkan adapter and requests a device.
    ///
    /// Fails with [`TransferError::NoAccelerator`] when no non-CPU
    /// Vulkan adapter is present, so callers can fall back to the host
    /// interpreter.
    pub fn new() -> Result<Self, TransferError> {
        pollster::block_on(Self::init_async())
    }

    async fn init_async() -> Result<Self, TransferError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            flags: wgpu::InstanceFlags::default(),
            ..Default::default()
        });

        let mut best: Option<(u32, wgpu::Adapter)> = None;
        for adapter in instance.enumerate_adapters(wgpu::Backends::VULKAN) {
            let info = adapter.get_info();
            eprintln!(
                "[pyrite] Vulkan adapter: {} ({:?})",
                info.name, info.device_type
            );
            let rank = adapter_rank(info.device_type);
            if rank == 0 {
                continue;
            }
            match best {
                Some((r, _)) if r >= rank => {}
                _ => best = Some((rank, adapter)),
            }
        }
        let adapter = best.map(|(_, a)| a).ok_or(TransferError::NoAccelerator)?;
        let adapter_info = adapter.get_info();
        eprintln!("[pyrite] using adapter: {}", adapter_info.name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("pyrite"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(TransferError::DeviceRequest)?;

        Ok(Self {
            device,
            queue,
            adapter_info,
            _instance: instance,
        })
    }

    /// Blocks until all submitted work on this device has completed.
    pub fn sync(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }

    /// Largest single buffer this adapter will allocate, in bytes.
    pub fn max_buffer_size(&self) -> u64 {
        self.device.limits().max_buffer_size
    }
}

impl std::fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:?})",
            self.adapter_info.name, self.adapter_info.device_type
        )
    }
}

fn adapter_rank(ty: wgpu::DeviceType) -> u32 {
    match ty {
        wgpu::DeviceType::DiscreteGpu => 4,
        wgpu::DeviceType::IntegratedGpu => 3,
        wgpu::DeviceType::VirtualGpu => 2,
        wgpu::DeviceType::Other => 1,
        wgpu::DeviceType::Cpu => 0,
    }
}
