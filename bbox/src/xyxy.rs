use super::Rect;
use crate::common::*;

/// Bounding box in XYXY format with `xmin <= xmax` and `ymin <= ymax`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XYXY<T> {
    pub(crate) xmin: T,
    pub(crate) ymin: T,
    pub(crate) xmax: T,
    pub(crate) ymax: T,
}

impl<T> XYXY<T> {
    pub fn try_cast<V>(self) -> Option<XYXY<V>>
    where
        T: ToPrimitive,
        V: NumCast,
    {
        Some(XYXY {
            xmin: V::from(self.xmin)?,
            ymin: V::from(self.ymin)?,
            xmax: V::from(self.xmax)?,
            ymax: V::from(self.ymax)?,
        })
    }
}

impl<T> Rect for XYXY<T>
where
    T: Copy + Num + PartialOrd,
{
    type Type = T;

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
        let two = T::one() + T::one();
        self.xmin + self.w() / two
    }

    fn cy(&self) -> Self::Type {
        let two = T::one() + T::one();
        self.ymin + self.h() / two
    }

    fn w(&self) -> Self::Type {
        self.xmax - self.xmin
    }

    fn h(&self) -> Self::Type {
        self.ymax - self.ymin
    }

    fn try_from_xyxy(xyxy: [Self::Type; 4]) -> Result<Self> {
        let [xmin, ymin, xmax, ymax] = xyxy;
        ensure!(
            xmax >= xmin && ymax >= ymin,
            "xmax >= xmin and ymax >= ymin must hold"
        );

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
        let zero = T::zero();
        ensure!(w >= zero && h >= zero, "w and h must be non-negative");

        let two = T::one() + T::one();
        Self::try_from_xyxy([cx - w / two, cy - h / two, cx + w / two, cy + h / two])
    }
}
