//! Input screening that runs ahead of classification.

pub mod screen;

pub use screen::{ScreenCheck, SecurityGate};
