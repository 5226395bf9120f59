pub mod export;
pub mod snapshot_file;
pub mod templates;

pub use export::*;
pub use snapshot_file::*;
