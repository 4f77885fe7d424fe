pub mod orchestrator;

pub use orchestrator::{AlarmConfig, AlarmOrchestrator, AlarmState, Effects};
