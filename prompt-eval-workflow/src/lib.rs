pub mod error_analysis;
pub mod executor;
pub mod optimizer;
pub mod orchestrator;
pub mod simulation;

pub use error_analysis::*;
pub use executor::*;
pub use optimizer::*;
pub use orchestrator::*;
pub use simulation::*;
