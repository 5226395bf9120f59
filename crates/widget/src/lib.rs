pub mod error;
pub mod map;
pub mod producers;

pub use error::*;
pub use map::*;
pub use producers::*;
