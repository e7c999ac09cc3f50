//! Custom resources shared between operators.
pub mod authentication;
