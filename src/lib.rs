// Pyrite: lazy image-processing graphs on the CPU
//
// Kernels are built as graphs of coordinate-indexed functions and
// realized on demand by a host interpreter. A Vulkan device, when one
// is available, carries buffer residency and transfer traffic.

pub mod value;
pub mod expr;
pub mod graph;
pub mod boundary;
pub mod buffer;
pub mod gpu;
pub mod pipeline;
pub mod interp;
pub mod masks;
pub mod stencil;
pub mod pyramid;
pub mod mosaic;
pub mod bilateral;
pub mod nightfilter;
pub mod corner;
pub mod reduce;
pub mod enhance;
pub mod benchmark;
