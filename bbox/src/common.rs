pub use anyhow::{ensure, Error, Result};
pub use noisy_float::prelude::{r64, R64};
pub use num_traits::{Float, Num, NumCast, ToPrimitive, Zero};
pub use serde::{Deserialize, Serialize};
pub use std::{
    convert::{TryFrom, TryInto},
    ops::Mul,
};
