// Application layer modules
pub mod queue_relay;

// Re-exports
pub use queue_relay::{CycleOutcome, DrainReport, QueueRelay, RelayConfig, Sleeper, TokioSleeper};
