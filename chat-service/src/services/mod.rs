pub mod generator;
pub mod metrics;
pub mod providers;

pub use generator::{GenerationOutcome, TextGenerator};
pub use metrics::{get_metrics, init_metrics};
