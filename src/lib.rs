//! SizeMarks: dimension marks for rectangular selections.
//!
//! The [`ops::size_mark`] operation talks to a document host through the
//! [`host::HostDriver`] trait. [`app::SizeMarksApp`] is the in-memory host
//! used by the command line tool, the scripting engine and the tests.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

pub mod app;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod config;
pub mod error;
pub mod host;
pub mod io;
pub mod logger;
pub mod ops;
pub mod preferences;
pub mod project;
pub mod units;

pub use app::SizeMarksApp;
pub use config::SizeMarkSettings;
pub use error::{HostError, HostResult, SizeMarkError};
pub use host::HostDriver;
pub use ops::size_mark::{SizeMarkOutcome, make_size_mark};
pub use units::{RulerUnit, TypeUnit};
