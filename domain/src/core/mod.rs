//! Core domain concepts shared by every other module.

pub mod error;
pub mod model;
