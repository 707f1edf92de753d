pub mod config;
pub mod credentials;
pub mod error;
pub mod history;
pub mod presets;
pub mod providers;
pub mod request;

pub use error::{EaselError, Result};
