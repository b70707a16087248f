pub mod config;
pub mod config_source;
pub mod logging;
pub mod signals;

pub use config::*;
pub use config_source::*;
pub use logging::*;
pub use signals::*;
