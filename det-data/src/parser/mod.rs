//! Record parsers and the dataset formats they understand.

mod coco_;
mod csv;
#[allow(clippy::module_inception)]
mod parser;
mod voc;

pub use self::csv::*;
pub use coco_::*;
pub use parser::*;
pub use voc::*;
