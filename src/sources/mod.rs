//! Byte source implementations

pub mod memory;
pub mod replay;
pub mod udp;

pub use memory::MemorySource;
pub use replay::ReplaySource;
pub use udp::UdpSource;
