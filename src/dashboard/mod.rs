pub mod aggregator;
pub mod views;

pub use aggregator::*;
pub use views::*;
