use crate::common::*;

/// A segmentation mask attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mask {
    /// Polygons of one object in pixel units, each a flat list of x, y pairs.
    Polygons(Vec<Vec<R64>>),
    /// Uncompressed run-length encoding of one object in column-major order.
    Rle {
        counts: Vec<u64>,
        height: usize,
        width: usize,
    },
    /// Compressed run-length encoding of one object.
    CompressedRle {
        counts: String,
        height: usize,
        width: usize,
    },
    /// An instance mask image covering every object of the image.
    File(PathBuf),
}

impl Mask {
    /// Whether the mask describes exactly one object.
    pub fn is_per_object(&self) -> bool {
        !matches!(self, Self::File(_))
    }
}

/// Number of object slots taken by a mask list.
///
/// A list that consists of a single mask file stands for all objects and
/// returns `None`.
pub(crate) fn num_mask_objects(masks: &[Mask]) -> Option<usize> {
    match masks {
        [Mask::File(_)] => None,
        masks => Some(masks.len()),
    }
}
