mod config;
mod constants;
mod pipeline;
mod publishing;
mod test_output;

pub use config::{Config, ConfigError};
pub use constants::*;
pub use pipeline::{PipelineError, TranslationPipeline};
pub use publishing::{PublishHandle, PublishingQueue};
pub use test_output::{run_test_output, TEST_OUTPUT_TEXT};
