pub mod sections;
pub mod settings;
pub mod synchronizer;

pub use sections::*;
pub use settings::*;
pub use synchronizer::*;
