pub mod backend;
pub mod dispatcher;
pub mod error;
pub mod local;
pub mod recording;

pub use backend::*;
pub use dispatcher::*;
pub use error::*;
pub use local::*;
pub use recording::*;
