//! # sandbox-changeset
//!
//! Change detection for the deployed application tree.
//!
//! A [`Tracker`] keeps a git baseline of the tree; [`Tracker::diff`] reports
//! every file added, modified or deleted since the last [`Tracker::commit`],
//! and [`as_tree`] folds that flat list into a compressed [`DirTree`] report.
//!
//! [`DirTree`]: sandbox_core::DirTree

pub mod error;
pub mod parse;
pub mod tracker;
pub mod tree;

pub use error::ChangeSetError;
pub use parse::{parse_line, parse_name_status, MalformedLine, ParsedLine};
pub use tracker::Tracker;
pub use tree::as_tree;
