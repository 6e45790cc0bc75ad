//! Safe bounding box types and functions.

mod common;

pub use rect::*;
pub mod rect;

pub use xyxy::*;
pub mod xyxy;

pub use size::*;
pub mod size;

pub use bbox::*;
pub mod bbox;

pub mod prelude {
    pub use crate::rect::{Rect, RectFloat, RectNum};
}
