pub mod access;
pub mod control;
pub mod media;
pub mod preview;
pub mod settings;

pub use access::*;
pub use control::*;
pub use media::*;
pub use preview::*;
pub use settings::*;
