use super::XYXY;
use crate::common::*;

/// The generic rectangle in image coordinates.
///
/// The x axis points rightwards and the y axis points downwards, so that
/// `xmin <= xmax` and `ymin <= ymax` hold for a well-formed rectangle.
pub trait Rect {
    type Type;

    fn xmin(&self) -> Self::Type;
    fn ymin(&self) -> Self::Type;
    fn xmax(&self) -> Self::Type;
    fn ymax(&self) -> Self::Type;
    fn cx(&self) -> Self::Type;
    fn cy(&self) -> Self::Type;
    fn w(&self) -> Self::Type;
    fn h(&self) -> Self::Type;

    fn try_from_xyxy(xyxy: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized;

    fn try_from_xywh(xywh: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized;

    fn try_from_cxcywh(cxcywh: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized;
}

pub trait RectNum: Rect
where
    Self::Type: Num + PartialOrd,
{
    fn xyxy(&self) -> [Self::Type; 4] {
        [self.xmin(), self.ymin(), self.xmax(), self.ymax()]
    }

    fn xywh(&self) -> [Self::Type; 4] {
        [self.xmin(), self.ymin(), self.w(), self.h()]
    }

    fn cxcywh(&self) -> [Self::Type; 4] {
        [self.cx(), self.cy(), self.w(), self.h()]
    }

    fn wh(&self) -> [Self::Type; 2] {
        [self.w(), self.h()]
    }

    fn area(&self) -> <Self::Type as Mul<Self::Type>>::Output
    where
        Self::Type: Mul<Self::Type>,
    {
        self.w() * self.h()
    }
}

pub trait RectFloat: RectNum
where
    Self::Type: Float,
{
    fn intersect_with<R>(&self, other: &R) -> Option<XYXY<Self::Type>>
    where
        R: Rect<Type = Self::Type>,
    {
        let xmin = self.xmin().max(other.xmin());
        let ymin = self.ymin().max(other.ymin());
        let xmax = self.xmax().min(other.xmax());
        let ymax = self.ymax().min(other.ymax());
        (xmax > xmin && ymax > ymin).then(|| XYXY {
            xmin,
            ymin,
            xmax,
            ymax,
        })
    }

    fn intersection_area_with<R>(&self, other: &R) -> Self::Type
    where
        R: Rect<Type = Self::Type>,
    {
        self.intersect_with(other)
            .map(|rect| rect.area())
            .unwrap_or_else(Self::Type::zero)
    }

    fn iou_with<R>(&self, other: &R, epsilon: Self::Type) -> Self::Type
    where
        R: Rect<Type = Self::Type>,
    {
        let inter_area = self.intersection_area_with(other);
        let union_area = self.area() + other.area() - inter_area + epsilon;
        inter_area / union_area
    }

    /// Clamp every coordinate into `[0, width] x [0, height]`.
    ///
    /// The result may be degenerate if the rectangle lies outside the range.
    fn clamp_within(&self, width: Self::Type, height: Self::Type) -> [Self::Type; 4] {
        let zero = Self::Type::zero();
        let clamp = |value: Self::Type, max: Self::Type| value.max(zero).min(max);
        [
            clamp(self.xmin(), width),
            clamp(self.ymin(), height),
            clamp(self.xmax(), width),
            clamp(self.ymax(), height),
        ]
    }
}

impl<T> RectNum for T
where
    T: Rect,
    T::Type: Num + PartialOrd,
{
}

impl<T> RectFloat for T
where
    T: Rect,
    T::Type: Float,
{
}
