#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

pub mod battery;
pub mod clock;
pub mod directory;
pub mod error;
pub mod interval;
pub mod policy;
pub mod prelude;
pub mod quantity;
pub mod topology;

pub use self::error::{Error, Result};
