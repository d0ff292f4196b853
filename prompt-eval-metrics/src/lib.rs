pub mod aggregators;
pub mod calculators;
pub mod custom;
pub mod evaluation;
pub mod formula;

pub use aggregators::*;
pub use calculators::*;
pub use custom::*;
pub use evaluation::*;
pub use formula::{Formula, FormulaError};
