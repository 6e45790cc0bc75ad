//! Validation and repair of parsed records.

use crate::{common::*, Field, ImageSize, Record};

/// Options of the record autofixer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Autofix {
    /// Boxes whose width or height after clipping is not larger than this
    /// value, in pixels, are dropped.
    #[serde(default = "default_min_bbox_size")]
    pub min_bbox_size: R64,
    /// If set, boxes exceeding the image boundary by more than this many
    /// pixels are dropped instead of clipped.
    #[serde(default)]
    pub out_of_bound_tolerance: Option<R64>,
}

impl Default for Autofix {
    fn default() -> Self {
        Self {
            min_bbox_size: default_min_bbox_size(),
            out_of_bound_tolerance: None,
        }
    }
}

/// A record that cannot be repaired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub image_id: usize,
    pub reason: String,
}

impl Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {} is invalid: {}", self.image_id, self.reason)
    }
}

impl std::error::Error for ValidationFailure {}

impl Autofix {
    pub fn new(min_bbox_size: f64, out_of_bound_tolerance: Option<f64>) -> Result<Self> {
        ensure!(
            min_bbox_size.is_finite() && min_bbox_size >= 0.0,
            "min_bbox_size must be non-negative"
        );
        let out_of_bound_tolerance = out_of_bound_tolerance
            .map(|tolerance| {
                ensure!(
                    tolerance.is_finite() && tolerance >= 0.0,
                    "out_of_bound_tolerance must be non-negative"
                );
                Ok(r64(tolerance))
            })
            .transpose()?;

        Ok(Self {
            min_bbox_size: r64(min_bbox_size),
            out_of_bound_tolerance,
        })
    }

    /// Fix a list of records, dropping the ones that cannot be repaired.
    ///
    /// The order of the surviving records is preserved.
    pub fn fix_records<I>(&self, records: I) -> Vec<Record>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut num_dropped_records = 0;
        let mut num_dropped_objects = 0;

        let records: Vec<_> = records
            .into_iter()
            .filter_map(|record| {
                let num_objects = record.num_objects();

                match self.fix_record(record) {
                    Ok(record) => {
                        num_dropped_objects += num_objects.saturating_sub(record.num_objects());
                        Some(record)
                    }
                    Err(failure) => {
                        warn!("drop {}", failure);
                        num_dropped_records += 1;
                        None
                    }
                }
            })
            .collect();

        if num_dropped_records > 0 || num_dropped_objects > 0 {
            info!(
                "autofix dropped {} records and {} objects, {} records remain",
                num_dropped_records,
                num_dropped_objects,
                records.len()
            );
        }

        records
    }

    /// Clip the boxes of a record into the image and drop degenerate objects.
    pub fn fix_record(&self, mut record: Record) -> Result<Record, ValidationFailure> {
        let image_id = record.image_id();
        let fail = |reason: String| ValidationFailure { image_id, reason };

        record
            .check_alignment()
            .map_err(|abort| fail(abort.reason().to_owned()))?;

        let fixed: Option<Vec<_>> = match record.bboxes() {
            Some(bboxes) if !bboxes.is_empty() => {
                let size = record
                    .size()
                    .ok_or_else(|| fail("the image size is required to check the boxes".into()))?;
                Some(bboxes.iter().map(|bbox| self.fix_bbox(bbox, size)).collect())
            }
            _ => None,
        };

        if let Some(fixed) = fixed {
            let keep: Vec<bool> = fixed.iter().map(|bbox| bbox.is_ok()).collect();
            let bboxes: Vec<_> = fixed
                .into_iter()
                .enumerate()
                .filter_map(|(index, bbox)| match bbox {
                    Ok(bbox) => Some(bbox),
                    Err(reason) => {
                        warn!("drop object {} of record {}: {}", index, image_id, reason);
                        None
                    }
                })
                .collect();

            record.retain_objects(&keep);
            if let Some(slot) = record.bboxes_mut() {
                *slot = bboxes;
            }
        }

        let has_objects = record.fields().iter().any(Field::is_object_level);
        if has_objects && record.num_objects() == 0 {
            return Err(fail("no valid objects remain".into()));
        }

        Ok(record)
    }

    fn fix_bbox(&self, bbox: &BBox, size: ImageSize) -> Result<BBox, String> {
        let width = r64(size.w() as f64);
        let height = r64(size.h() as f64);

        if let Some(tolerance) = self.out_of_bound_tolerance {
            let inside = bbox.xmin() >= -tolerance
                && bbox.ymin() >= -tolerance
                && bbox.xmax() <= width + tolerance
                && bbox.ymax() <= height + tolerance;
            if !inside {
                return Err(format!(
                    "box {:?} exceeds the image of size {}x{} by more than {} pixels",
                    bbox.xyxy(),
                    width,
                    height,
                    tolerance
                ));
            }
        }

        let clipped = XYXY::<R64>::try_from_xyxy(bbox.clamp_within(width, height))
            .map_err(|err| format!("box {:?} is invalid: {}", bbox.xyxy(), err))?;

        if clipped.w() <= self.min_bbox_size || clipped.h() <= self.min_bbox_size {
            return Err(format!(
                "box {:?} is smaller than {} pixels after clipping",
                bbox.xyxy(),
                self.min_bbox_size
            ));
        }

        Ok(clipped.into())
    }
}

fn default_min_bbox_size() -> R64 {
    r64(0.0)
}
