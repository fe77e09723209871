//! HTTP Routes

pub mod measurements;
