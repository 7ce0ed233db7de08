//! Watchforge-Common: shared identifiers and path conventions.
//!
//! - **Typed IDs**: [`JobId`], a UUID wrapper that cannot be confused with
//!   other identifiers.
//! - **Path conventions**: which files the pipeline accepts and where their
//!   converted output lands.
//!
//! # Examples
//!
//! ```
//! use std::path::Path;
//! use watchforge_common::paths::{converted_output_path, is_video_file};
//! use watchforge_common::JobId;
//!
//! let id = JobId::new();
//! assert_ne!(id, JobId::new());
//!
//! assert!(is_video_file(Path::new("clip.MP4")));
//! assert_eq!(
//!     converted_output_path(Path::new("/in/clip.mp4"), Path::new("/out")),
//!     Path::new("/out/clip_dnxhr.mov"),
//! );
//! ```

pub mod ids;
pub mod paths;

pub use ids::JobId;
