use crate::common::*;

/// A field a record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    ImageId,
    Filepath,
    Size,
    BBoxes,
    Labels,
    Masks,
}

impl Field {
    /// Whether the field holds one entry per object in the image.
    pub fn is_object_level(self) -> bool {
        matches!(self, Self::BBoxes | Self::Labels | Self::Masks)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ImageId => "image_id",
            Self::Filepath => "filepath",
            Self::Size => "size",
            Self::BBoxes => "bboxes",
            Self::Labels => "labels",
            Self::Masks => "masks",
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The set of fields of a record, always including [`Field::ImageId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSet {
    fields: BTreeSet<Field>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self {
            fields: [Field::ImageId].into_iter().collect(),
        }
    }

    /// Build the set from the fields declared by a list of mixins.
    ///
    /// A field declared twice has no single owner and is rejected, and so is
    /// an explicit declaration of the always present image id.
    pub fn from_declared<I>(declared: I) -> Result<Self>
    where
        I: IntoIterator<Item = Field>,
    {
        let mut set = Self::new();
        for field in declared {
            ensure!(
                field != Field::ImageId,
                "the '{}' field is always present and cannot be declared by a mixin",
                field
            );
            ensure!(
                set.fields.insert(field),
                "the '{}' field is declared by more than one mixin",
                field
            );
        }
        Ok(set)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.fields.contains(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = Field> + '_ {
        self.fields.iter().copied()
    }

    pub fn union(&self, other: &FieldSet) -> FieldSet {
        Self {
            fields: self.fields.union(&other.fields).copied().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Default for FieldSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.iter().map(Field::name).join(", "))
    }
}
