//! Connection orchestration layer.

pub mod aggregate;
pub mod registry;
pub mod sub;

pub use aggregate::Connection;
pub use registry::{ConnectionRegistry, RegistryStats};
pub use sub::{Binding, SubConnection};
