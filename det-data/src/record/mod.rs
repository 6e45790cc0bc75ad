//! Records and the field mixins that populate them.

mod extract;
mod field;
mod mask;
pub mod mixin;
#[allow(clippy::module_inception)]
mod record;

pub use extract::*;
pub use field::*;
pub use mask::*;
pub use mixin::Mixin;
pub use record::*;
