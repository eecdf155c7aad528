mod halt;
mod types;

pub use halt::Halt;
pub use types::{NavError, Result};
