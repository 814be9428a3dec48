//! # Leadflow Common Library
//!
//! Shared code for the leadflow intake services including:
//! - Error type shared by every crate
//! - Bootstrap configuration loading and validation
//! - Phone number normalization and display formatting

pub mod config;
pub mod error;
pub mod phone;

pub use error::{Error, Result};
pub use phone::{format_phone_display, normalize_phone, PhoneError};
