use super::{Rect, XYXY};
use crate::common::*;

/// Unchecked bounding box in pixel units, stored as (xmin, ymin, xmax, ymax).
///
/// Parsers produce boxes of this type as they appear in the annotation files,
/// so the corners may be inverted or lie outside the image. Use
/// [`XYXY::try_from`] to obtain a checked box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BBox {
    xmin: R64,
    ymin: R64,
    xmax: R64,
    ymax: R64,
}

impl BBox {
    /// Build a box from corner coordinates.
    ///
    /// Non-finite values are rejected by `r64` in debug builds only. Use
    /// [`BBox::try_new`] for coordinates read from annotation files.
    pub fn from_xyxy(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin: r64(xmin),
            ymin: r64(ymin),
            xmax: r64(xmax),
            ymax: r64(ymax),
        }
    }

    pub fn from_xywh(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self::from_xyxy(x, y, x + w, y + h)
    }

    /// Build a box from corner coordinates, failing on NaN or infinity.
    pub fn try_new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Result<Self> {
        let xyxy = [xmin, ymin, xmax, ymax];
        ensure!(
            xyxy.iter().all(|value| value.is_finite()),
            "box coordinates {:?} are not finite",
            xyxy
        );
        Ok(Self::from_xyxy(xmin, ymin, xmax, ymax))
    }

    /// The checked form of [`BBox::from_xywh`].
    pub fn try_new_xywh(x: f64, y: f64, w: f64, h: f64) -> Result<Self> {
        ensure!(
            w.is_finite() && h.is_finite(),
            "box size {:?} is not finite",
            [w, h]
        );
        Self::try_new(x, y, x + w, y + h)
    }

    /// Build a box from center-based coordinates given as fractions of the
    /// image size. Coordinates are rounded to the nearest pixel.
    pub fn from_relative_xcycwh(
        cx: f64,
        cy: f64,
        w: f64,
        h: f64,
        img_width: usize,
        img_height: usize,
    ) -> Self {
        let [xmin, ymin, xmax, ymax] = relative_to_xyxy([cx, cy, w, h], img_width, img_height);
        Self::from_xyxy(xmin, ymin, xmax, ymax)
    }

    /// The checked form of [`BBox::from_relative_xcycwh`].
    pub fn try_from_relative_xcycwh(
        cx: f64,
        cy: f64,
        w: f64,
        h: f64,
        img_width: usize,
        img_height: usize,
    ) -> Result<Self> {
        let [xmin, ymin, xmax, ymax] = relative_to_xyxy([cx, cy, w, h], img_width, img_height);
        Self::try_new(xmin, ymin, xmax, ymax)
    }

    /// The inverse of [`BBox::from_relative_xcycwh`], up to pixel rounding.
    pub fn relative_xcycwh(&self, img_width: usize, img_height: usize) -> [f64; 4] {
        let img_w = img_width as f64;
        let img_h = img_height as f64;
        [
            self.cx().raw() / img_w,
            self.cy().raw() / img_h,
            self.w().raw() / img_w,
            self.h().raw() / img_h,
        ]
    }
}

fn relative_to_xyxy(xcycwh: [f64; 4], img_width: usize, img_height: usize) -> [f64; 4] {
    let [cx, cy, w, h] = xcycwh;
    let img_w = img_width as f64;
    let img_h = img_height as f64;
    [
        ((cx - w / 2.0) * img_w).round(),
        ((cy - h / 2.0) * img_h).round(),
        ((cx + w / 2.0) * img_w).round(),
        ((cy + h / 2.0) * img_h).round(),
    ]
}

impl Rect for BBox {
    type Type = R64;

    fn xmin(&self) -> Self::Type {
        self.xmin
    }

    fn ymin(&self) -> Self::Type {
        self.ymin
    }

    fn xmax(&self) -> Self::Type {
        self.xmax
    }

    fn ymax(&self) -> Self::Type {
        self.ymax
    }

    fn cx(&self) -> Self::Type {
        (self.xmin + self.xmax) / 2.0
    }

    fn cy(&self) -> Self::Type {
        (self.ymin + self.ymax) / 2.0
    }

    fn w(&self) -> Self::Type {
        self.xmax - self.xmin
    }

    fn h(&self) -> Self::Type {
        self.ymax - self.ymin
    }

    fn try_from_xyxy(xyxy: [Self::Type; 4]) -> Result<Self> {
        let [xmin, ymin, xmax, ymax] = xyxy;
        Ok(Self {
            xmin,
            ymin,
            xmax,
            ymax,
        })
    }

    fn try_from_xywh(xywh: [Self::Type; 4]) -> Result<Self> {
        let [x, y, w, h] = xywh;
        Self::try_from_xyxy([x, y, x + w, y + h])
    }

    fn try_from_cxcywh(cxcywh: [Self::Type; 4]) -> Result<Self> {
        let [cx, cy, w, h] = cxcywh;
        Self::try_from_xyxy([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0])
    }
}

impl TryFrom<&BBox> for XYXY<R64> {
    type Error = Error;

    fn try_from(from: &BBox) -> Result<Self, Self::Error> {
        let BBox {
            xmin,
            ymin,
            xmax,
            ymax,
        } = *from;
        Self::try_from_xyxy([xmin, ymin, xmax, ymax])
    }
}

impl TryFrom<BBox> for XYXY<R64> {
    type Error = Error;

    fn try_from(from: BBox) -> Result<Self, Self::Error> {
        (&from).try_into()
    }
}

impl From<&XYXY<R64>> for BBox {
    fn from(from: &XYXY<R64>) -> Self {
        let XYXY {
            xmin,
            ymin,
            xmax,
            ymax,
        } = *from;
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }
}

impl From<XYXY<R64>> for BBox {
    fn from(from: XYXY<R64>) -> Self {
        Self::from(&from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rect::{RectFloat, RectNum};
    use approx::assert_abs_diff_eq;

    #[test]
    fn bbox_relative_xcycwh() {
        let (w, h) = (640, 480);
        let xcycwh = [0.7, 0.2, 0.1, 0.2];
        let bbox = BBox::from_relative_xcycwh(0.7, 0.2, 0.1, 0.2, w, h);
        assert_eq!(
            bbox.xyxy(),
            [r64(416.0), r64(48.0), r64(480.0), r64(144.0)]
        );

        let relative = bbox.relative_xcycwh(w, h);
        relative
            .iter()
            .zip(xcycwh.iter())
            .for_each(|(&lhs, &rhs)| assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-9));
    }

    #[test]
    fn bbox_relative_round_trip_within_one_pixel() {
        let (img_w, img_h) = (333, 517);
        let boxes = [
            BBox::from_xyxy(0.0, 0.0, 333.0, 517.0),
            BBox::from_xyxy(13.0, 27.0, 101.0, 64.0),
            BBox::from_xyxy(200.0, 400.0, 201.0, 402.0),
        ];

        for bbox in boxes {
            let [cx, cy, w, h] = bbox.relative_xcycwh(img_w, img_h);
            let restored = BBox::from_relative_xcycwh(cx, cy, w, h, img_w, img_h);
            bbox.xyxy()
                .iter()
                .zip(restored.xyxy().iter())
                .for_each(|(lhs, rhs)| assert!((*lhs - *rhs).abs() <= 1.0));
        }
    }

    #[test]
    fn bbox_xyxy_round_trip() {
        let bbox = BBox::from_xyxy(3.0, 5.0, 30.0, 50.0);
        let [xmin, ymin, xmax, ymax] = bbox.xyxy();
        let restored = BBox::from_xyxy(xmin.raw(), ymin.raw(), xmax.raw(), ymax.raw());
        assert_eq!(restored.xyxy(), bbox.xyxy());
    }

    #[test]
    fn bbox_from_xywh() {
        let bbox = BBox::from_xywh(3.0, 5.0, 27.0, 45.0);
        assert_eq!(bbox, BBox::from_xyxy(3.0, 5.0, 30.0, 50.0));
        assert_eq!(bbox.xywh(), [r64(3.0), r64(5.0), r64(27.0), r64(45.0)]);
    }

    #[test]
    fn bbox_checked_conversion() {
        let valid = BBox::from_xyxy(1.0, 2.0, 3.0, 4.0);
        let inverted = BBox::from_xyxy(10.0, 2.0, 3.0, 4.0);
        let checked = XYXY::try_from(&valid).unwrap();
        assert_eq!(BBox::from(checked), valid);
        assert!(XYXY::try_from(&inverted).is_err());
    }

    #[test]
    fn bbox_checked_constructors_reject_non_finite_values() {
        assert_eq!(
            BBox::try_new(1.0, 2.0, 3.0, 4.0).unwrap(),
            BBox::from_xyxy(1.0, 2.0, 3.0, 4.0)
        );
        assert!(BBox::try_new(f64::NAN, 2.0, 3.0, 4.0).is_err());
        assert!(BBox::try_new(1.0, 2.0, f64::INFINITY, 4.0).is_err());

        assert_eq!(
            BBox::try_new_xywh(3.0, 5.0, 27.0, 45.0).unwrap(),
            BBox::from_xyxy(3.0, 5.0, 30.0, 50.0)
        );
        assert!(BBox::try_new_xywh(f64::MAX, 0.0, f64::MAX, 1.0).is_err());
        assert!(BBox::try_new_xywh(0.0, 0.0, f64::NAN, 1.0).is_err());

        assert_eq!(
            BBox::try_from_relative_xcycwh(0.7, 0.2, 0.1, 0.2, 640, 480).unwrap(),
            BBox::from_xyxy(416.0, 48.0, 480.0, 144.0)
        );
        assert!(BBox::try_from_relative_xcycwh(0.5, 0.5, f64::NAN, 0.1, 640, 480).is_err());
        assert!(BBox::try_from_relative_xcycwh(1e308, 0.5, 0.1, 0.1, 640, 480).is_err());
    }

    #[test]
    fn bbox_clamp_within_image() {
        let bbox = BBox::from_xyxy(-5.0, 10.0, 700.0, 20.0);
        assert_eq!(
            bbox.clamp_within(r64(640.0), r64(480.0)),
            [r64(0.0), r64(10.0), r64(640.0), r64(20.0)]
        );
    }
}
