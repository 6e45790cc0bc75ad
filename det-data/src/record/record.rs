use super::{mask::num_mask_objects, Abort, Extract, Field, FieldSet, Mask};
use crate::{abort, common::*};

/// Image size in pixels.
pub type ImageSize = Size<usize>;

/// The unified annotation container of one image.
///
/// A record carries the fields of its [`FieldSet`] only. List fields that
/// describe objects (boxes, labels and per-object masks) stay index aligned:
/// the i-th label belongs to the i-th box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    image_id: usize,
    fields: FieldSet,
    filepath: Option<PathBuf>,
    size: Option<ImageSize>,
    bboxes: Option<Vec<BBox>>,
    labels: Option<Vec<usize>>,
    masks: Option<Vec<Mask>>,
}

impl Record {
    pub fn new(image_id: usize, fields: FieldSet) -> Self {
        let has = |field| fields.contains(field);
        Self {
            image_id,
            filepath: None,
            size: None,
            bboxes: has(Field::BBoxes).then(Vec::new),
            labels: has(Field::Labels).then(Vec::new),
            masks: has(Field::Masks).then(Vec::new),
            fields,
        }
    }

    pub fn image_id(&self) -> usize {
        self.image_id
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    pub fn has(&self, field: Field) -> bool {
        self.fields.contains(field)
    }

    pub fn filepath(&self) -> Option<&Path> {
        self.filepath.as_deref()
    }

    pub fn size(&self) -> Option<ImageSize> {
        self.size
    }

    pub fn bboxes(&self) -> Option<&[BBox]> {
        self.bboxes.as_deref()
    }

    pub fn labels(&self) -> Option<&[usize]> {
        self.labels.as_deref()
    }

    pub fn masks(&self) -> Option<&[Mask]> {
        self.masks.as_deref()
    }

    /// The number of objects in the image.
    pub fn num_objects(&self) -> usize {
        self.bboxes
            .as_ref()
            .map(Vec::len)
            .or_else(|| self.labels.as_ref().map(Vec::len))
            .or_else(|| self.masks.as_ref().map(Vec::len))
            .unwrap_or(0)
    }

    pub fn set_filepath(&mut self, filepath: PathBuf) -> Extract<()> {
        self.ensure_declared(Field::Filepath)?;
        set_scalar(&mut self.filepath, filepath, Field::Filepath)
    }

    pub fn set_size(&mut self, size: ImageSize) -> Extract<()> {
        self.ensure_declared(Field::Size)?;
        set_scalar(&mut self.size, size, Field::Size)
    }

    pub fn add_bboxes(&mut self, bboxes: Vec<BBox>) -> Extract<()> {
        self.ensure_declared(Field::BBoxes)?;
        self.bboxes.get_or_insert_with(Vec::new).extend(bboxes);
        Ok(())
    }

    pub fn add_labels(&mut self, labels: Vec<usize>) -> Extract<()> {
        self.ensure_declared(Field::Labels)?;
        self.labels.get_or_insert_with(Vec::new).extend(labels);
        Ok(())
    }

    pub fn add_masks(&mut self, masks: Vec<Mask>) -> Extract<()> {
        self.ensure_declared(Field::Masks)?;
        self.masks.get_or_insert_with(Vec::new).extend(masks);
        Ok(())
    }

    /// Check that the object-level fields have the same length.
    pub fn check_alignment(&self) -> Extract<()> {
        let lengths: Vec<_> = [
            (Field::BBoxes, self.bboxes.as_ref().map(Vec::len)),
            (Field::Labels, self.labels.as_ref().map(Vec::len)),
            (
                Field::Masks,
                self.masks.as_deref().and_then(num_mask_objects),
            ),
        ]
        .into_iter()
        .filter_map(|(field, len)| Some((field, len?)))
        .collect();

        if !lengths.iter().map(|(_, len)| len).all_equal() {
            abort!(
                "object fields are not aligned: {}",
                lengths
                    .iter()
                    .map(|(field, len)| format!("{} has {}", field, len))
                    .join(", ")
            );
        }
        Ok(())
    }

    /// Merge the fields of another record of the same image into this one.
    ///
    /// List fields are appended and scalar fields must agree. The merged
    /// record must stay aligned. On failure this record is left untouched.
    pub fn merge(&mut self, other: Record) -> Extract<()> {
        if other.image_id != self.image_id {
            abort!(
                "cannot merge record {} into record {}",
                other.image_id,
                self.image_id
            );
        }

        let mut merged = self.clone();
        merged.merge_fields(other)?;
        merged.check_alignment()?;
        *self = merged;
        Ok(())
    }

    fn merge_fields(&mut self, other: Record) -> Extract<()> {
        let Record {
            fields,
            filepath,
            size,
            bboxes,
            labels,
            masks,
            ..
        } = other;
        self.fields = self.fields.union(&fields);

        if let Some(filepath) = filepath {
            self.set_filepath(filepath)?;
        }
        if let Some(size) = size {
            self.set_size(size)?;
        }
        if let Some(bboxes) = bboxes {
            self.add_bboxes(bboxes)?;
        }
        if let Some(labels) = labels {
            self.add_labels(labels)?;
        }
        if let Some(masks) = masks {
            self.add_masks(masks)?;
        }
        Ok(())
    }

    /// Keep the objects whose flag is set, dropping their boxes, labels and
    /// per-object masks together.
    pub(crate) fn retain_objects(&mut self, keep: &[bool]) {
        fn retain<T>(items: &mut Vec<T>, keep: &[bool]) {
            let mut flags = keep.iter();
            items.retain(|_| flags.next().copied().unwrap_or(false));
        }

        if let Some(bboxes) = &mut self.bboxes {
            retain(bboxes, keep);
        }
        if let Some(labels) = &mut self.labels {
            retain(labels, keep);
        }
        if let Some(masks) = &mut self.masks {
            if num_mask_objects(masks).is_some() {
                retain(masks, keep);
            }
        }
    }

    pub(crate) fn bboxes_mut(&mut self) -> Option<&mut Vec<BBox>> {
        self.bboxes.as_mut()
    }

    fn ensure_declared(&self, field: Field) -> Extract<()> {
        if !self.fields.contains(field) {
            abort!(
                "field '{}' is not declared by record {} with fields {}",
                field,
                self.image_id,
                self.fields
            );
        }
        Ok(())
    }
}

fn set_scalar<T>(slot: &mut Option<T>, value: T, field: Field) -> Extract<()>
where
    T: PartialEq + Debug,
{
    match slot {
        Some(prev) if *prev != value => Err(Abort::new(format!(
            "conflicting values for field '{}': {:?} and {:?}",
            field, prev, value
        ))),
        _ => {
            *slot = Some(value);
            Ok(())
        }
    }
}

/// Combine two record lists of the same images by image id.
///
/// This is how the outputs of parsers sharing one
/// [`IdMap`](crate::IdMap) are put together, e.g. a box parser and a mask
/// parser. Records found on one side only are kept as they are. The result is
/// ordered by image id.
pub fn merge_by_id<L, R>(lhs: L, rhs: R) -> Result<Vec<Record>>
where
    L: IntoIterator<Item = Record>,
    R: IntoIterator<Item = Record>,
{
    let mut merged: BTreeMap<usize, Record> = BTreeMap::new();

    for record in lhs.into_iter().chain(rhs) {
        let image_id = record.image_id();
        match merged.get_mut(&image_id) {
            Some(prev) => prev
                .merge(record)
                .with_context(|| format!("failed to merge records of image {}", image_id))?,
            None => {
                merged.insert(image_id, record);
            }
        }
    }

    Ok(merged.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn box_fields() -> FieldSet {
        FieldSet::from_declared([Field::Size, Field::BBoxes, Field::Labels]).unwrap()
    }

    fn size(w: usize, h: usize) -> ImageSize {
        Size::try_from_wh([w, h]).unwrap()
    }

    #[test]
    fn record_has_declared_fields_only() {
        let mut record = Record::new(7, box_fields());
        assert_eq!(record.image_id(), 7);
        assert_eq!(record.bboxes(), Some(&[][..]));
        assert_eq!(record.masks(), None);
        assert_eq!(record.size(), None);

        assert!(record.add_masks(vec![Mask::File("a.png".into())]).is_err());
        assert!(record.set_filepath("a.jpg".into()).is_err());
        assert_eq!(record.masks(), None);
    }

    #[test]
    fn record_scalar_fields_must_agree() {
        let mut record = Record::new(0, box_fields());
        record.set_size(size(640, 480)).unwrap();
        record.set_size(size(640, 480)).unwrap();
        assert!(record.set_size(size(320, 240)).is_err());
        assert_eq!(record.size(), Some(size(640, 480)));
    }

    #[test]
    fn record_merge_appends_objects() {
        let mut record = Record::new(1, box_fields());
        record.set_size(size(100, 100)).unwrap();
        record
            .add_bboxes(vec![BBox::from_xyxy(0.0, 0.0, 10.0, 10.0)])
            .unwrap();
        record.add_labels(vec![1]).unwrap();

        let mut other = Record::new(1, box_fields());
        other.set_size(size(100, 100)).unwrap();
        other
            .add_bboxes(vec![BBox::from_xyxy(5.0, 5.0, 20.0, 20.0)])
            .unwrap();
        other.add_labels(vec![2]).unwrap();

        record.merge(other).unwrap();
        assert_eq!(record.num_objects(), 2);
        assert_eq!(record.labels(), Some(&[1, 2][..]));
    }

    #[test]
    fn record_failed_merge_leaves_record_untouched() {
        let mut record = Record::new(1, box_fields());
        record.add_labels(vec![1]).unwrap();
        record
            .add_bboxes(vec![BBox::from_xyxy(0.0, 0.0, 1.0, 1.0)])
            .unwrap();
        let before = record.clone();

        // a box without its label breaks the alignment
        let mut unaligned = Record::new(1, box_fields());
        unaligned
            .add_bboxes(vec![BBox::from_xyxy(0.0, 0.0, 2.0, 2.0)])
            .unwrap();
        assert!(record.merge(unaligned).is_err());
        assert_eq!(record, before);

        let other_image = Record::new(2, box_fields());
        assert!(record.merge(other_image).is_err());
        assert_eq!(record, before);
    }

    #[test]
    fn record_combined_mask_file_covers_all_objects() {
        let mut boxes = Record::new(3, box_fields());
        boxes
            .add_bboxes(vec![
                BBox::from_xyxy(0.0, 0.0, 1.0, 1.0),
                BBox::from_xyxy(1.0, 1.0, 2.0, 2.0),
            ])
            .unwrap();
        boxes.add_labels(vec![1, 2]).unwrap();

        let mut masks = Record::new(3, FieldSet::from_declared([Field::Masks]).unwrap());
        masks.add_masks(vec![Mask::File("3.png".into())]).unwrap();

        let merged = merge_by_id(vec![boxes], vec![masks]).unwrap();
        assert_eq!(merged.len(), 1);
        assert!(merged[0].has(Field::Masks));
        assert_eq!(merged[0].num_objects(), 2);
        assert!(merged[0].check_alignment().is_ok());
    }

    #[test]
    fn record_retain_objects() {
        let fields =
            FieldSet::from_declared([Field::BBoxes, Field::Labels, Field::Masks]).unwrap();
        let mut record = Record::new(0, fields);
        record
            .add_bboxes(vec![
                BBox::from_xyxy(0.0, 0.0, 1.0, 1.0),
                BBox::from_xyxy(1.0, 1.0, 2.0, 2.0),
                BBox::from_xyxy(2.0, 2.0, 3.0, 3.0),
            ])
            .unwrap();
        record.add_labels(vec![1, 2, 3]).unwrap();
        record
            .add_masks(vec![
                Mask::Polygons(vec![]),
                Mask::Polygons(vec![vec![r64(1.0), r64(1.0)]]),
                Mask::Polygons(vec![]),
            ])
            .unwrap();

        record.retain_objects(&[true, false, true]);
        assert_eq!(record.labels(), Some(&[1, 3][..]));
        assert_eq!(record.masks().map(<[_]>::len), Some(2));
        assert!(record.check_alignment().is_ok());
    }
}
