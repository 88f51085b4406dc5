mod core;
mod decision;
#[cfg(test)]
mod tests;

pub use self::core::{CameraOutcome, CameraReport, CaptureLoop, LoopSettings, TickReport};
pub use decision::{decide, SaveInputs};
