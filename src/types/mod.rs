pub mod account;
pub mod order;
pub mod strategy;

pub use account::*;
pub use order::*;
pub use strategy::*;
