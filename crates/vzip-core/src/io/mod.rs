pub mod scanner;

pub use scanner::{DEFAULT_FRAME_SUFFIX, FrameScanner};
