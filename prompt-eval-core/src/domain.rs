pub mod ids;
pub mod analysis;
pub mod test_case;
pub mod metrics;
pub mod error_analysis;
pub mod suggestion;
pub mod custom_metric;
pub mod options;
pub mod evaluation;

pub use ids::*;
pub use analysis::*;
pub use test_case::*;
pub use metrics::*;
pub use error_analysis::*;
pub use suggestion::*;
pub use custom_metric::*;
pub use options::*;
pub use evaluation::*;
