pub use self::core::*;

mod core;

/// Prefix of every metric name.
pub const NAMESPACE: &str = "hyperion";
