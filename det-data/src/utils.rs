use crate::{abort, common::*, Extract};

/// The label id reserved for the background.
pub const BACKGROUND_LABEL: usize = 0;

/// Load a class list with one class name per line.
pub fn load_classes_file(path: impl AsRef<Path>) -> Result<IndexSet<String>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read classes file '{}'", path.display()))?;
    let lines: Vec<_> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let classes: IndexSet<_> = lines.iter().map(|&line| line.to_owned()).collect();
    ensure!(
        lines.len() == classes.len(),
        "duplicated class names found in '{}'",
        path.display()
    );
    ensure!(
        !classes.is_empty(),
        "no classes found in '{}'",
        path.display()
    );
    Ok(classes)
}

/// List the files directly under a directory with one of the extensions,
/// sorted by path.
pub fn list_files(dir: impl AsRef<Path>, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    ensure!(
        dir.is_dir(),
        "the directory '{}' does not exist",
        dir.display()
    );

    let prefix = glob::Pattern::escape(&dir.display().to_string());
    let mut files = vec![];

    for ext in extensions {
        let pattern = format!("{}/*.{}", prefix, ext);
        for path in glob::glob(&pattern)? {
            let path = path?;
            if path.is_file() {
                files.push(path);
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// The file name stem as a string.
pub(crate) fn file_stem(path: &Path) -> Extract<String> {
    match path.file_stem().and_then(|stem| stem.to_str()) {
        Some(stem) => Ok(stem.to_owned()),
        None => abort!("the file name of '{}' is not valid UTF-8", path.display()),
    }
}

/// Maps class names to label ids.
///
/// Label ids count from 1 in the order of the class list, leaving
/// [`BACKGROUND_LABEL`] for the background.
#[derive(Debug, Clone)]
pub struct ClassMap {
    classes: IndexSet<String>,
    whitelist: Option<HashSet<String>>,
}

impl ClassMap {
    pub fn new(classes: IndexSet<String>, whitelist: Option<HashSet<String>>) -> Result<Self> {
        ensure!(!classes.is_empty(), "the class list is empty");

        if let Some(whitelist) = &whitelist {
            let unknown: Vec<_> = whitelist
                .iter()
                .filter(|name| !classes.contains(*name))
                .sorted()
                .collect();
            if !unknown.is_empty() {
                warn!(
                    "these whitelisted classes are not in the class list: {:?}",
                    unknown
                );
            }
        }

        Ok(Self { classes, whitelist })
    }

    pub fn classes(&self) -> &IndexSet<String> {
        &self.classes
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn label_id(&self, name: &str) -> Option<usize> {
        self.classes.get_index_of(name).map(|index| index + 1)
    }

    pub fn class_name(&self, label_id: usize) -> Option<&str> {
        let index = label_id.checked_sub(1)?;
        self.classes.get_index(index).map(String::as_str)
    }

    pub fn is_whitelisted(&self, name: &str) -> bool {
        self.whitelist
            .as_ref()
            .map(|whitelist| whitelist.contains(name))
            .unwrap_or(true)
    }

    /// The label id of an object class.
    ///
    /// Returns `None` for classes outside the whitelist, which are ignored.
    /// An unknown class aborts the record.
    pub fn resolve(&self, name: &str) -> Extract<Option<usize>> {
        if !self.is_whitelisted(name) {
            return Ok(None);
        }
        match self.label_id(name) {
            Some(label_id) => Ok(Some(label_id)),
            None => abort!("unknown class '{}'", name),
        }
    }
}
