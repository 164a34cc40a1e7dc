use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Type-level marker for the logical (compositor global) coordinate space
#[derive(Debug)]
pub struct Logical;

/// Type-level marker for the physical coordinate space of an output
#[derive(Debug)]
pub struct Physical;

/// Type-level marker for the buffer coordinate space
#[derive(Debug)]
pub struct Buffer;

/// Trait for types serving as a coordinate for other geometry utils
pub trait Coordinate:
    Sized + Add<Self, Output = Self> + Sub<Self, Output = Self> + PartialOrd + Default + Copy + fmt::Debug
{
    /// A Coordinate that is 0
    const ZERO: Self;
    /// Convert the coordinate to a f64
    fn to_f64(self) -> f64;
    /// Convert to this coordinate from a f64
    fn from_f64(v: f64) -> Self;
    /// Multiply by an integer factor, saturating where applicable
    fn upscale(self, scale: Self) -> Self;
    /// Divide by an integer factor
    fn downscale(self, scale: Self) -> Self;
    /// Compare and return the smaller one
    fn min(self, other: Self) -> Self {
        if self < other {
            self
        } else {
            other
        }
    }
    /// Compare and return the larger one
    fn max(self, other: Self) -> Self {
        if self > other {
            self
        } else {
            other
        }
    }
    /// Saturating addition
    fn saturating_add(self, other: Self) -> Self;
    /// Saturating subtraction
    fn saturating_sub(self, other: Self) -> Self;
}

macro_rules! integer_coordinate_impl {
    ($($ty:ty),*) => {$(
        impl Coordinate for $ty {
            const ZERO: $ty = 0;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as Self
            }

            #[inline]
            fn upscale(self, scale: Self) -> Self {
                self.saturating_mul(scale)
            }

            #[inline]
            fn downscale(self, scale: Self) -> Self {
                self / scale
            }

            #[inline]
            fn saturating_add(self, other: Self) -> Self {
                <$ty>::saturating_add(self, other)
            }

            #[inline]
            fn saturating_sub(self, other: Self) -> Self {
                <$ty>::saturating_sub(self, other)
            }
        }
    )*};
}

integer_coordinate_impl!(i32, i64, u32);

impl Coordinate for f64 {
    const ZERO: f64 = 0.0;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn upscale(self, scale: Self) -> Self {
        self * scale
    }

    #[inline]
    fn downscale(self, scale: Self) -> Self {
        self / scale
    }

    #[inline]
    fn saturating_add(self, other: Self) -> Self {
        self + other
    }

    #[inline]
    fn saturating_sub(self, other: Self) -> Self {
        self - other
    }
}

// The coordinate space markers carry no data, so these impls must not require
// `Kind: Clone` and friends the way `#[derive]` would.
macro_rules! marker_independent_impls {
    ($name:ident { $($field:ident),* }) => {
        impl<N: Clone, Kind> Clone for $name<N, Kind> {
            #[inline]
            fn clone(&self) -> Self {
                $name {
                    $($field: self.$field.clone(),)*
                    _kind: std::marker::PhantomData,
                }
            }
        }

        impl<N: Copy, Kind> Copy for $name<N, Kind> {}

        impl<N: PartialEq, Kind> PartialEq for $name<N, Kind> {
            #[inline]
            fn eq(&self, other: &Self) -> bool {
                true $(&& self.$field == other.$field)*
            }
        }

        impl<N: Eq, Kind> Eq for $name<N, Kind> {}

        impl<N: std::hash::Hash, Kind> std::hash::Hash for $name<N, Kind> {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                $(self.$field.hash(state);)*
            }
        }

        impl<N: Default, Kind> Default for $name<N, Kind> {
            #[inline]
            fn default() -> Self {
                $name {
                    $($field: N::default(),)*
                    _kind: std::marker::PhantomData,
                }
            }
        }

        impl<N: fmt::Debug, Kind> fmt::Debug for $name<N, Kind> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    $(.field(stringify!($field), &self.$field))*
                    .finish()
            }
        }

        impl<N, Kind> From<(N, N)> for $name<N, Kind> {
            #[inline]
            fn from(($($field),*): (N, N)) -> Self {
                $name {
                    $($field,)*
                    _kind: std::marker::PhantomData,
                }
            }
        }

        impl<N, Kind> From<$name<N, Kind>> for (N, N) {
            #[inline]
            fn from(value: $name<N, Kind>) -> (N, N) {
                ($(value.$field),*)
            }
        }
    };
}

/// A point as defined by its x and y coordinates
pub struct Point<N, Kind> {
    /// horizontal coordinate
    pub x: N,
    /// vertical coordinate
    pub y: N,
    _kind: std::marker::PhantomData<Kind>,
}

marker_independent_impls!(Point { x, y });

impl<N: Coordinate, Kind> Point<N, Kind> {
    /// Convert this [`Point`] to a [`Size`] with the same coordinates
    #[inline]
    pub fn to_size(self) -> Size<N, Kind> {
        (self.x, self.y).into()
    }

    /// Convert the underlying numerical type to f64 for floating point manipulations
    #[inline]
    pub fn to_f64(self) -> Point<f64, Kind> {
        (self.x.to_f64(), self.y.to_f64()).into()
    }

    /// Upscale this [`Point`] by an integer factor
    #[inline]
    pub fn upscale(self, scale: N) -> Point<N, Kind> {
        (self.x.upscale(scale), self.y.upscale(scale)).into()
    }
}

impl<Kind> Point<f64, Kind> {
    /// Convert to i32 by rounding each coordinate to the nearest integer
    #[inline]
    pub fn to_i32_round<N: Coordinate>(self) -> Point<N, Kind> {
        (N::from_f64(self.x.round()), N::from_f64(self.y.round())).into()
    }
}

impl<N: Coordinate> Point<N, Logical> {
    /// Convert this logical point to physical coordinate space given an integer scale factor
    #[inline]
    pub fn to_physical(self, scale: N) -> Point<N, Physical> {
        (self.x.upscale(scale), self.y.upscale(scale)).into()
    }
}

impl<N: Coordinate, Kind> Add for Point<N, Kind> {
    type Output = Point<N, Kind>;
    #[inline]
    fn add(self, other: Point<N, Kind>) -> Point<N, Kind> {
        (self.x + other.x, self.y + other.y).into()
    }
}

impl<N: Coordinate, Kind> AddAssign for Point<N, Kind> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.x = self.x + rhs.x;
        self.y = self.y + rhs.y;
    }
}

impl<N: Coordinate, Kind> Sub for Point<N, Kind> {
    type Output = Point<N, Kind>;
    #[inline]
    fn sub(self, other: Point<N, Kind>) -> Point<N, Kind> {
        (self.x - other.x, self.y - other.y).into()
    }
}

impl<N: Coordinate, Kind> SubAssign for Point<N, Kind> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        self.x = self.x - rhs.x;
        self.y = self.y - rhs.y;
    }
}

/// A size as defined by its width and height
pub struct Size<N, Kind> {
    /// horizontal coordinate
    pub w: N,
    /// vertical coordinate
    pub h: N,
    _kind: std::marker::PhantomData<Kind>,
}

marker_independent_impls!(Size { w, h });

impl<N: Coordinate, Kind> Size<N, Kind> {
    /// Convert this [`Size`] to a [`Point`] with the same coordinates
    #[inline]
    pub fn to_point(self) -> Point<N, Kind> {
        (self.w, self.h).into()
    }

    /// Convert the underlying numerical type to f64 for floating point manipulations
    #[inline]
    pub fn to_f64(self) -> Size<f64, Kind> {
        (self.w.to_f64(), self.h.to_f64()).into()
    }

    /// Upscale this [`Size`] by an integer factor
    #[inline]
    pub fn upscale(self, scale: N) -> Size<N, Kind> {
        (self.w.upscale(scale), self.h.upscale(scale)).into()
    }

    /// Downscale this [`Size`] by an integer factor
    #[inline]
    pub fn downscale(self, scale: N) -> Size<N, Kind> {
        (self.w.downscale(scale), self.h.downscale(scale)).into()
    }

    /// Check if this [`Size`] is empty
    ///
    /// Returns true if either the width or the height is zero (or negative)
    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.w > N::ZERO && self.h > N::ZERO)
    }
}

impl<Kind> Size<f64, Kind> {
    /// Convert to an integer size by rounding each dimension
    #[inline]
    pub fn to_i32_round<N: Coordinate>(self) -> Size<N, Kind> {
        (N::from_f64(self.w.round()), N::from_f64(self.h.round())).into()
    }
}

impl<N: Coordinate> Size<N, Logical> {
    /// Convert this logical size to physical coordinate space given an integer scale factor
    #[inline]
    pub fn to_physical(self, scale: N) -> Size<N, Physical> {
        self.upscale(scale).into_kind()
    }
}

impl<N: Coordinate> Size<N, Physical> {
    /// Convert this physical size to logical coordinate space given an integer scale factor
    #[inline]
    pub fn to_logical(self, scale: N) -> Size<N, Logical> {
        self.downscale(scale).into_kind()
    }
}

impl<N: Coordinate, Kind> Size<N, Kind> {
    #[inline]
    fn into_kind<Other>(self) -> Size<N, Other> {
        (self.w, self.h).into()
    }
}

impl<N: Coordinate, Kind> Add<Size<N, Kind>> for Point<N, Kind> {
    type Output = Point<N, Kind>;
    #[inline]
    fn add(self, other: Size<N, Kind>) -> Point<N, Kind> {
        (self.x + other.w, self.y + other.h).into()
    }
}

/// A rectangle defined by its top-left corner and dimensions
pub struct Rectangle<N, Kind> {
    /// Location of the top-left corner of the rectangle
    pub loc: Point<N, Kind>,
    /// Size of the rectangle, as (width, height)
    pub size: Size<N, Kind>,
}

impl<N: Clone, Kind> Clone for Rectangle<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        Rectangle {
            loc: self.loc.clone(),
            size: self.size.clone(),
        }
    }
}

impl<N: Copy, Kind> Copy for Rectangle<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Rectangle<N, Kind> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.loc == other.loc && self.size == other.size
    }
}

impl<N: Eq, Kind> Eq for Rectangle<N, Kind> {}

impl<N: Default, Kind> Default for Rectangle<N, Kind> {
    fn default() -> Self {
        Rectangle {
            loc: Default::default(),
            size: Default::default(),
        }
    }
}

impl<N: fmt::Debug, Kind> fmt::Debug for Rectangle<N, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rectangle")
            .field("x", &self.loc.x)
            .field("y", &self.loc.y)
            .field("width", &self.size.w)
            .field("height", &self.size.h)
            .finish()
    }
}

impl<N: Coordinate, Kind> Rectangle<N, Kind> {
    /// Create a new [`Rectangle`] from the coordinates of its top-left corner and its dimensions
    #[inline]
    pub fn new(loc: Point<N, Kind>, size: Size<N, Kind>) -> Self {
        Rectangle { loc, size }
    }

    /// Create a new [`Rectangle`] from its dimensions, with location zero
    #[inline]
    pub fn from_size(size: Size<N, Kind>) -> Self {
        Rectangle {
            loc: (N::ZERO, N::ZERO).into(),
            size,
        }
    }

    /// Create a new [`Rectangle`] from the coordinates of its top-left corner and its bottom-right corner
    #[inline]
    pub fn from_extremities(
        topleft: impl Into<Point<N, Kind>>,
        bottomright: impl Into<Point<N, Kind>>,
    ) -> Self {
        let topleft = topleft.into();
        let bottomright = bottomright.into();
        Rectangle {
            loc: topleft,
            size: (bottomright - topleft).to_size(),
        }
    }

    /// Location of the bottom-right corner, exclusive
    #[inline]
    pub fn bottom_right(&self) -> Point<N, Kind> {
        (
            self.loc.x.saturating_add(self.size.w),
            self.loc.y.saturating_add(self.size.h),
        )
            .into()
    }

    /// Convert the underlying numerical type to f64 for floating point manipulations
    #[inline]
    pub fn to_f64(self) -> Rectangle<f64, Kind> {
        Rectangle {
            loc: self.loc.to_f64(),
            size: self.size.to_f64(),
        }
    }

    /// Check if this [`Rectangle`] is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    /// Checks whether given [`Rectangle`] is inside the rectangle
    ///
    /// This includes rectangles with the same location and size
    #[inline]
    pub fn contains_rect<R: Into<Rectangle<N, Kind>>>(self, rect: R) -> bool {
        let r: Rectangle<N, Kind> = rect.into();
        let br = r.bottom_right();
        let self_br = self.bottom_right();
        r.loc.x >= self.loc.x && r.loc.y >= self.loc.y && br.x <= self_br.x && br.y <= self_br.y
    }

    /// Checks whether a given [`Rectangle`] overlaps with this one
    ///
    /// Note: This operation is exclusive, touching only rectangles will return `false`.
    #[inline]
    pub fn overlaps(self, other: impl Into<Rectangle<N, Kind>>) -> bool {
        let other = other.into();
        let br = self.bottom_right();
        let other_br = other.bottom_right();
        self.loc.x < other_br.x && other.loc.x < br.x && self.loc.y < other_br.y && other.loc.y < br.y
    }

    /// Clamp rectangle to min and max corners resulting in the overlapping area of two rectangles
    ///
    /// Returns `None` if the two rectangles don't overlap
    #[inline]
    pub fn intersection(self, other: impl Into<Rectangle<N, Kind>>) -> Option<Self> {
        let other = other.into();
        if !self.overlaps(other) {
            return None;
        }
        let br = self.bottom_right();
        let other_br = other.bottom_right();
        Some(Rectangle::from_extremities(
            (self.loc.x.max(other.loc.x), self.loc.y.max(other.loc.y)),
            (br.x.min(other_br.x), br.y.min(other_br.y)),
        ))
    }

    /// Smallest rectangle containing both rectangles
    #[inline]
    pub fn merge(self, other: Self) -> Self {
        let br = self.bottom_right();
        let other_br = other.bottom_right();
        Rectangle::from_extremities(
            (self.loc.x.min(other.loc.x), self.loc.y.min(other.loc.y)),
            (br.x.max(other_br.x), br.y.max(other_br.y)),
        )
    }

    /// Subtract a set of [`Rectangle`]s from a set [`Rectangle`]s in-place
    ///
    /// The remaining rectangles never overlap each other if the input did not.
    pub fn subtract_rects_many_in_place(
        mut rects: Vec<Self>,
        others: impl IntoIterator<Item = Self>,
    ) -> Vec<Self> {
        for other in others {
            if rects.is_empty() {
                return rects;
            }

            let items = rects.len();
            let mut index = 0usize;
            for _ in 0..items {
                let Some(intersection) = rects[index].intersection(other) else {
                    index += 1;
                    continue;
                };

                let item = rects.remove(index);
                if other.contains_rect(item) {
                    continue;
                }

                let item_br = item.bottom_right();
                let cut_br = intersection.bottom_right();
                let pieces: [Rectangle<N, Kind>; 4] = [
                    // above the cut, full width
                    Rectangle::from_extremities(item.loc, (item_br.x, intersection.loc.y)),
                    // left of the cut
                    Rectangle::from_extremities(
                        (item.loc.x, intersection.loc.y),
                        (intersection.loc.x, cut_br.y),
                    ),
                    // right of the cut
                    Rectangle::from_extremities((cut_br.x, intersection.loc.y), (item_br.x, cut_br.y)),
                    // below the cut, full width
                    Rectangle::from_extremities((item.loc.x, cut_br.y), item_br),
                ];
                rects.extend(pieces.into_iter().filter(|r| !r.is_empty()));
            }
        }

        rects
    }
}

impl<Kind> Rectangle<f64, Kind> {
    /// Convert to an integer rectangle, rounding location and size
    #[inline]
    pub fn to_i32_round<N: Coordinate>(self) -> Rectangle<N, Kind> {
        Rectangle {
            loc: self.loc.to_i32_round(),
            size: self.size.to_i32_round(),
        }
    }
}

impl<N: Coordinate> Rectangle<N, Logical> {
    /// Convert this logical rectangle to physical coordinate space given an integer scale factor
    #[inline]
    pub fn to_physical(self, scale: N) -> Rectangle<N, Physical> {
        Rectangle {
            loc: self.loc.to_physical(scale),
            size: self.size.to_physical(scale),
        }
    }
}

/// Possible transformations to two-dimensional planes
#[derive(Debug, Default, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Transform {
    /// Identity transformation (plane is unaltered when applied)
    #[default]
    Normal,
    /// Plane is rotated by 90 degrees
    _90,
    /// Plane is rotated by 180 degrees
    _180,
    /// Plane is rotated by 270 degrees
    _270,
    /// Plane is flipped vertically
    Flipped,
    /// Plane is flipped vertically and rotated by 90 degrees
    Flipped90,
    /// Plane is flipped vertically and rotated by 180 degrees
    Flipped180,
    /// Plane is flipped vertically and rotated by 270 degrees
    Flipped270,
}

impl Transform {
    /// Inverts any 90-degree transformation into 270-degree transformations and vise versa.
    ///
    /// Flipping is preserved and 180/Normal transformation are uneffected.
    #[inline]
    pub fn invert(&self) -> Transform {
        match self {
            Transform::_90 => Transform::_270,
            Transform::_270 => Transform::_90,
            Transform::Flipped90 => Transform::Flipped270,
            Transform::Flipped270 => Transform::Flipped90,
            other => *other,
        }
    }

    /// Whether width and height trade places under this transformation
    #[inline]
    pub fn swaps_axes(&self) -> bool {
        matches!(
            self,
            Transform::_90 | Transform::_270 | Transform::Flipped90 | Transform::Flipped270
        )
    }

    /// Transformed size after applying this transformation.
    pub fn transform_size<N: Coordinate, Kind>(&self, size: Size<N, Kind>) -> Size<N, Kind> {
        if self.swaps_axes() {
            (size.h, size.w).into()
        } else {
            size
        }
    }

    /// Transforms a rectangle inside an area of a given size by applying this transformation.
    pub fn transform_rect_in<N: Coordinate, Kind>(
        &self,
        rect: Rectangle<N, Kind>,
        area: &Size<N, Kind>,
    ) -> Rectangle<N, Kind> {
        let size = self.transform_size(rect.size);
        let right = area.w - rect.loc.x - rect.size.w;
        let bottom = area.h - rect.loc.y - rect.size.h;

        let loc = match *self {
            Transform::Normal => rect.loc,
            Transform::_90 => (bottom, rect.loc.x).into(),
            Transform::_180 => (right, bottom).into(),
            Transform::_270 => (rect.loc.y, right).into(),
            Transform::Flipped => (right, rect.loc.y).into(),
            Transform::Flipped90 => (bottom, right).into(),
            Transform::Flipped180 => (rect.loc.x, bottom).into(),
            Transform::Flipped270 => (rect.loc.y, rect.loc.x).into(),
        };

        Rectangle::new(loc, size)
    }

    /// Returns true if the transformation would flip contents
    pub fn flipped(&self) -> bool {
        !matches!(
            self,
            Transform::Normal | Transform::_90 | Transform::_180 | Transform::_270
        )
    }

    /// Returns the angle (in degrees) of the transformation
    #[inline]
    pub fn degrees(&self) -> u32 {
        match self {
            Transform::Normal | Transform::Flipped => 0,
            Transform::_90 | Transform::Flipped90 => 90,
            Transform::_180 | Transform::Flipped180 => 180,
            Transform::_270 | Transform::Flipped270 => 270,
        }
    }
}

impl Add for Transform {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        let flipped = self.flipped() != other.flipped();
        match (flipped, (self.degrees() + other.degrees()) % 360) {
            (false, 90) => Transform::_90,
            (false, 180) => Transform::_180,
            (false, 270) => Transform::_270,
            (false, _) => Transform::Normal,
            (true, 90) => Transform::Flipped90,
            (true, 180) => Transform::Flipped180,
            (true, 270) => Transform::Flipped270,
            (true, _) => Transform::Flipped,
        }
    }
}
