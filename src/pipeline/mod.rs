//! Live relay pipeline.
//!
//! Wires the session's transcript stream through the processor, the
//! translation orchestrator and the audio bridge, and publishes progress as
//! [`RelayEvent`]s.

pub mod error;
pub mod events;
pub mod relay;

pub use error::{CollectingReporter, ErrorReporter, StageError, TracingReporter};
pub use events::RelayEvent;
pub use relay::{RelayHandle, RelayPipeline};
