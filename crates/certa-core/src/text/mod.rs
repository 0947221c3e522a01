//! Text utilities shared by quote verification.

mod normalize;
mod transcript;

pub use normalize::normalize;
pub use transcript::{ExtractionError, Role, RoleExtractor, Turn};
