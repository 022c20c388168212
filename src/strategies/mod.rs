pub mod editor;
pub mod store;

pub use editor::*;
pub use store::*;
