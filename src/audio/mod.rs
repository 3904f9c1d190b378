//! Audio decoding and local monitoring output.

pub mod decode;
pub mod monitor;

pub use decode::{MediaType, PcmBuffer, decode};
#[cfg(feature = "cpal-audio")]
pub use monitor::CpalMonitor;
pub use monitor::{BufferMonitor, MonitorOutput, NullMonitor};
