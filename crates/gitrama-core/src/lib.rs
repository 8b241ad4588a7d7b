pub mod error;
pub mod params;
pub mod provider;
pub mod stream;

pub use error::{ErrorKind, ToolError};
pub use provider::{ProviderConfig, ProviderName};
pub use stream::{StreamDef, StreamListing, StreamState};
