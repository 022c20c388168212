pub mod refresher;
pub mod session;
pub mod trading;

pub use refresher::*;
pub use session::*;
pub use trading::*;
