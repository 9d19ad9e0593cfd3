//! Loader and data model for Spine 2.1 binary (`.skel`) skeleton exports.
//!
//! The crate is renderer-agnostic and IO-free apart from
//! [`SkeletonData::from_skel_file`]: decoding operates on an in-memory byte
//! slice and produces an immutable [`SkeletonData`] template that a posing or
//! rendering runtime consumes.

#![forbid(unsafe_code)]

mod animation;
mod error;
mod model;
mod version;

pub mod binary;

pub use animation::*;
pub use error::*;
pub use model::*;
pub use version::*;
