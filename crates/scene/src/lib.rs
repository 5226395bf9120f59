pub mod backend_kind;
pub mod control;
pub mod error;
pub mod layer;
pub mod layer_control;
pub mod snapshot;
pub mod source;
pub mod store;

pub use backend_kind::*;
pub use control::*;
pub use error::*;
pub use layer::*;
pub use layer_control::*;
pub use snapshot::*;
pub use source::*;
pub use store::*;
