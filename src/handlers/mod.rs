pub mod pages;
pub mod transcribe;

pub use pages::{landing_page, privacy_policy};
pub use transcribe::transcribe_translate;
