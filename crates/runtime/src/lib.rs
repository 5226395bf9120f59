pub mod call_queue;
pub mod inbox;
pub mod metrics;
pub mod pull;
pub mod synced;

pub use call_queue::*;
pub use inbox::*;
pub use metrics::*;
pub use pull::*;
pub use synced::*;

/// Free-form JSON key/value map used for kwargs, payloads and open-ended
/// definition properties.
pub type Props = serde_json::Map<String, serde_json::Value>;
