//! Parsing and unification of object detection datasets.
//!
//! Parsers of different dataset formats produce [`Record`]s of the same
//! shape. The images are identified by dense ids allocated by an [`IdMap`],
//! split by a [`DataSplitter`] and repaired by [`Autofix`].

mod common;

pub mod autofix;
pub mod config;
pub mod dataset;
pub mod id_map;
pub mod parser;
pub mod record;
pub mod splitter;
pub mod utils;

pub use autofix::*;
pub use config::Config;
pub use dataset::*;
pub use id_map::*;
pub use parser::*;
pub use record::*;
pub use splitter::*;
pub use utils::ClassMap;
