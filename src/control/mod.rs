//! Input controller: maps user gestures onto a session.

mod controller;

pub use controller::{InputController, DEFAULT_RELEASE_DELAY};
