pub mod bridge;
pub mod config;
pub mod method;
pub mod protocol;

pub use bridge::*;
pub use config::*;
pub use method::*;
pub use protocol::*;
