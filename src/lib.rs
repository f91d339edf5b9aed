pub mod commands;
pub mod constants;
pub mod error;
pub mod jpeg;
pub mod lumix;
pub mod protocol;

pub use commands::*;
pub use error::{LumixError, Result};
pub use lumix::LumixCam;
pub use protocol::{CommandResult, MediaItem};
