pub mod error;
pub mod types;
pub mod source;
pub mod poller;
pub mod registry;
pub mod service;

pub use error::{FetchError, PollError};
pub use types::*;
pub use source::*;
pub use poller::*;
pub use registry::*;
pub use service::*;
