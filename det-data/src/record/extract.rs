use crate::common::*;

/// The result of preparing a sample or extracting one of its fields.
///
/// An [`Abort`] skips the sample only. Everything else keeps parsing.
pub type Extract<T> = std::result::Result<T, Abort>;

/// The signal to skip the current sample, with the reason why.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Abort {
    reason: String,
}

impl Abort {
    pub fn new(reason: impl Display) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl std::error::Error for Abort {}

impl From<Error> for Abort {
    fn from(err: Error) -> Self {
        Self::new(format!("{:#}", err))
    }
}

/// Return early with an [`Abort`] built from a format string.
#[macro_export]
macro_rules! abort {
    ($($arg:tt)*) => {
        return Err($crate::Abort::new(format!($($arg)*)))
    };
}
