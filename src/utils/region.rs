//! Integer regions as sets of non-overlapping rectangles
//!
//! A [`Region`] is what the plane allocator uses for occlusion tracking: the area
//! already claimed by the renderer, the area already covered by opaque content and
//! the damage of a view. All operations are pure and return a new region whose
//! rectangles are non-empty and pairwise disjoint.

use std::fmt;

use super::geometry::{Point, Rectangle};

/// A set of pixels, stored as disjoint rectangles
pub struct Region<Kind> {
    rects: Vec<Rectangle<i32, Kind>>,
}

impl<Kind> Clone for Region<Kind> {
    fn clone(&self) -> Self {
        Region {
            rects: self.rects.clone(),
        }
    }
}

impl<Kind> Default for Region<Kind> {
    fn default() -> Self {
        Region { rects: Vec::new() }
    }
}

impl<Kind> fmt::Debug for Region<Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rects.iter()).finish()
    }
}

impl<Kind> From<Rectangle<i32, Kind>> for Region<Kind> {
    #[inline]
    fn from(rect: Rectangle<i32, Kind>) -> Self {
        Region::from_rect(rect)
    }
}

impl<Kind> FromIterator<Rectangle<i32, Kind>> for Region<Kind> {
    fn from_iter<T: IntoIterator<Item = Rectangle<i32, Kind>>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Region::new(), |region, rect| region.union(&Region::from_rect(rect)))
    }
}

impl<Kind> Region<Kind> {
    /// An empty region
    #[inline]
    pub fn new() -> Self {
        Region::default()
    }

    /// A region covering exactly `rect`
    pub fn from_rect(rect: Rectangle<i32, Kind>) -> Self {
        let rects = if rect.is_empty() { Vec::new() } else { vec![rect] };
        Region { rects }
    }

    /// The disjoint rectangles making up this region, in no particular order
    #[inline]
    pub fn rects(&self) -> &[Rectangle<i32, Kind>] {
        &self.rects
    }

    /// Whether this region covers no pixel at all
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Whether this region covers at least one pixel
    #[inline]
    pub fn not_empty(&self) -> bool {
        !self.is_empty()
    }

    /// Number of pixels covered
    pub fn area(&self) -> i64 {
        self.rects
            .iter()
            .map(|r| r.size.w as i64 * r.size.h as i64)
            .sum()
    }

    /// Bounding box of the region, `None` if empty
    pub fn extents(&self) -> Option<Rectangle<i32, Kind>> {
        self.rects.iter().copied().reduce(Rectangle::merge)
    }

    /// Set union
    pub fn union(&self, other: &Region<Kind>) -> Region<Kind> {
        let mut rects = self.rects.clone();
        let missing =
            Rectangle::subtract_rects_many_in_place(other.rects.clone(), self.rects.iter().copied());
        rects.extend(missing);
        Region { rects }
    }

    /// Set intersection
    pub fn intersect(&self, other: &Region<Kind>) -> Region<Kind> {
        // both inputs are disjoint, so the pairwise intersections are disjoint as well
        let rects = self
            .rects
            .iter()
            .flat_map(|a| other.rects.iter().filter_map(move |b| a.intersection(*b)))
            .collect();
        Region { rects }
    }

    /// Intersection with a single rectangle
    pub fn intersect_rect(&self, rect: Rectangle<i32, Kind>) -> Region<Kind> {
        self.intersect(&Region::from_rect(rect))
    }

    /// Set difference, the pixels of `self` not covered by `other`
    pub fn subtract(&self, other: &Region<Kind>) -> Region<Kind> {
        Region {
            rects: Rectangle::subtract_rects_many_in_place(self.rects.clone(), other.rects.iter().copied()),
        }
    }

    /// Whether every pixel of `rect` is part of this region
    pub fn contains_rect(&self, rect: Rectangle<i32, Kind>) -> bool {
        Region::from_rect(rect).subtract(self).is_empty()
    }

    /// Whether any pixel of `rect` is part of this region
    pub fn intersects_rect(&self, rect: Rectangle<i32, Kind>) -> bool {
        self.rects.iter().any(|r| r.overlaps(rect))
    }

    /// The same region moved by `offset`
    pub fn translate(&self, offset: Point<i32, Kind>) -> Region<Kind> {
        Region {
            rects: self
                .rects
                .iter()
                .map(|r| Rectangle::new(r.loc + offset, r.size))
                .collect(),
        }
    }
}

impl<Kind> PartialEq for Region<Kind> {
    /// Regions are equal if they cover the same pixels, regardless of how they are split
    fn eq(&self, other: &Self) -> bool {
        self.area() == other.area() && self.subtract(other).is_empty()
    }
}

impl<Kind> Eq for Region<Kind> {}

#[cfg(test)]
mod tests {
    use super::Region;
    use crate::utils::{Logical, Rectangle};

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32, Logical> {
        Rectangle::new((x, y).into(), (w, h).into())
    }

    fn assert_disjoint(region: &Region<Logical>) {
        let rects = region.rects();
        for (i, a) in rects.iter().enumerate() {
            assert!(!a.is_empty());
            for b in &rects[i + 1..] {
                assert!(!a.overlaps(*b), "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn union_of_overlapping_counts_shared_area_once() {
        let a = Region::from_rect(rect(0, 0, 20, 20));
        let b = Region::from_rect(rect(10, 10, 20, 20));
        let u = a.union(&b);
        assert_disjoint(&u);
        assert_eq!(u.area(), 400 + 400 - 100);
        assert_eq!(u, b.union(&a));
    }

    #[test]
    fn intersect_and_subtract_partition() {
        let a = Region::from_rect(rect(0, 0, 20, 20));
        let b = Region::from_rect(rect(10, 10, 20, 20));
        let inter = a.intersect(&b);
        let diff = a.subtract(&b);
        assert_eq!(inter, Region::from_rect(rect(10, 10, 10, 10)));
        assert_disjoint(&diff);
        assert_eq!(inter.area() + diff.area(), a.area());
        assert_eq!(inter.union(&diff), a);
    }

    #[test]
    fn union_is_associative() {
        let a = Region::from_rect(rect(0, 0, 10, 10));
        let b = Region::from_rect(rect(5, 5, 10, 10));
        let c = Region::from_rect(rect(-3, 8, 6, 30));
        let left = a.union(&b).union(&c);
        let right = a.union(&b.union(&c));
        assert_disjoint(&left);
        assert_disjoint(&right);
        assert_eq!(left, right);
    }

    #[test]
    fn empty_rect_gives_empty_region() {
        let r = Region::from_rect(rect(5, 5, 0, 10));
        assert!(r.is_empty());
        assert!(!r.not_empty());
        assert_eq!(r.extents(), None);
    }

    #[test]
    fn containment_and_translation() {
        let region: Region<Logical> = [rect(0, 0, 10, 10), rect(10, 0, 10, 10)].into_iter().collect();
        assert!(region.contains_rect(rect(5, 2, 10, 5)));
        assert!(!region.contains_rect(rect(5, 2, 20, 5)));
        assert!(region.intersects_rect(rect(19, 9, 5, 5)));
        let moved = region.translate((100, 50).into());
        assert_eq!(moved.extents(), Some(rect(100, 50, 20, 10)));
    }

    #[test]
    fn full_cover_subtracts_to_nothing() {
        let hole = Region::from_rect(rect(10, 10, 10, 10));
        let cover = Region::from_rect(rect(0, 0, 100, 100));
        assert!(hole.subtract(&cover).is_empty());
        assert_eq!(cover.subtract(&hole).area(), 100 * 100 - 100);
    }
}
