pub mod classification;
pub mod generation;
pub mod task;
pub mod text;

pub use classification::*;
pub use generation::*;
pub use task::{basic_custom_metrics, category_pass_rate, task_specific_metrics, weighted_score};
