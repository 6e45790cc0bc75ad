//! Field-extraction capabilities composed into parsers.
//!
//! A parser lists its mixins in [`Parser::mixins`](crate::Parser::mixins).
//! Each mixin owns exactly one [`Field`] and writes it into the record for
//! every prepared sample.

use super::{Extract, Field, ImageSize, Mask, Record};
use crate::common::*;

/// A field-extraction capability.
pub trait Mixin<S> {
    /// The field this mixin populates.
    fn field(&self) -> Field;

    /// Extract the field from a prepared sample and write it into the record.
    fn parse_field(&self, sample: &S, record: &mut Record) -> Extract<()>;
}

macro_rules! declare_mixin {
    ($(#[$attr:meta])* $name:ident, $ctor:ident, $field:expr, $ty:ty, $setter:ident) => {
        $(#[$attr])*
        pub struct $name<F>(F);

        impl<S, F> Mixin<S> for $name<F>
        where
            F: Fn(&S) -> Extract<$ty>,
        {
            fn field(&self) -> Field {
                $field
            }

            fn parse_field(&self, sample: &S, record: &mut Record) -> Extract<()> {
                let value = (self.0)(sample)?;
                record.$setter(value)
            }
        }

        $(#[$attr])*
        pub fn $ctor<'a, S, F>(extract: F) -> Box<dyn Mixin<S> + 'a>
        where
            F: 'a + Fn(&S) -> Extract<$ty>,
        {
            Box::new($name(extract))
        }
    };
}

declare_mixin!(
    /// Extracts the image file path.
    FilepathMixin,
    filepath,
    Field::Filepath,
    PathBuf,
    set_filepath
);
declare_mixin!(
    /// Extracts the image size in pixels.
    SizeMixin,
    size,
    Field::Size,
    ImageSize,
    set_size
);
declare_mixin!(
    /// Extracts the bounding boxes of the objects.
    BBoxesMixin,
    bboxes,
    Field::BBoxes,
    Vec<BBox>,
    add_bboxes
);
declare_mixin!(
    /// Extracts the label ids of the objects.
    LabelsMixin,
    labels,
    Field::Labels,
    Vec<usize>,
    add_labels
);
declare_mixin!(
    /// Extracts the masks of the objects.
    MasksMixin,
    masks,
    Field::Masks,
    Vec<Mask>,
    add_masks
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{abort, FieldSet};

    struct Sample {
        label: Option<usize>,
    }

    #[test]
    fn mixin_writes_declared_field() {
        let mixin = labels(|sample: &Sample| match sample.label {
            Some(label) => Ok(vec![label]),
            None => abort!("missing label"),
        });
        assert_eq!(mixin.field(), Field::Labels);

        let fields = FieldSet::from_declared([mixin.field()]).unwrap();
        let mut record = Record::new(0, fields);
        mixin
            .parse_field(&Sample { label: Some(3) }, &mut record)
            .unwrap();
        mixin
            .parse_field(&Sample { label: Some(1) }, &mut record)
            .unwrap();
        assert_eq!(record.labels(), Some(&[3, 1][..]));

        let err = mixin
            .parse_field(&Sample { label: None }, &mut record)
            .unwrap_err();
        assert_eq!(err.reason(), "missing label");
    }
}
