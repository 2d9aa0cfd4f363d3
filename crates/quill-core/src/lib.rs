pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{QuillError, Result};
pub use traits::{ChatModel, SearchProvider};
pub use types::*;
