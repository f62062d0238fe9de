//! Physical frames and per-environment page tables.

pub mod address_space;
pub mod frame_allocator;
pub mod frame_metadata;

pub use address_space::AddressSpace;
pub use frame_allocator::FrameAllocator;
