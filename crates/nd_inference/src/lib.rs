pub mod budget;
pub mod classify;
pub mod models;
pub mod summarizer;

pub use budget::UsageBudget;
pub use classify::{classify_error, ErrorClass, ProviderFailure};
pub use models::{create_generator, GenerationOutcome, TextGenerator};
pub use summarizer::{fallback_summary, Summarizer, SummarizerConfig, SummaryOutcome};

pub mod prelude {
    pub use crate::budget::UsageBudget;
    pub use crate::models::{GenerationOutcome, TextGenerator};
    pub use crate::summarizer::{Summarizer, SummaryOutcome};
}
