pub use anyhow::{ensure, Context as _, Error, Result};
pub use log::{info, warn};
pub use serde::{de::DeserializeOwned, Deserialize, Serialize};
pub use std::{
    fmt,
    fs::{self, File},
    io::{BufReader, BufWriter, Write as _},
    path::{Path, PathBuf},
};
