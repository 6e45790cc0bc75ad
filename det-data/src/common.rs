pub use anyhow::{ensure, format_err, Context as _, Error, Result};
pub use bbox::{prelude::*, BBox, Size, XYXY};
pub use indexmap::{IndexMap, IndexSet};
pub use itertools::Itertools as _;
pub use log::{info, warn};
pub use noisy_float::prelude::*;
pub use rand::{prelude::*, rngs::StdRng};
pub use serde::{de::DeserializeOwned, Deserialize, Serialize};
pub use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    fmt,
    fmt::{Debug, Display},
    fs,
    hash::Hash,
    ops::Range,
    path::{Path, PathBuf},
};
