// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Texel coordinate system.

```text
           x
      0 ────────▶
      │ ┌───────┐
    y │ │       │
      │ │       │
      │ │       │
      ▼ └───────┘
 ```

Right, bottom and back edges are exclusive.
*/

/// A 2D texel rectangle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Rect {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Rect {
            left,
            top,
            right,
            bottom,
        }
    }

    /// The rectangle covering a whole `width` × `height` image.
    pub const fn whole(width: u32, height: u32) -> Self {
        Rect::new(0, 0, width, height)
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// True when the rectangle is non-empty and lies inside a `width` × `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        !self.is_empty() && self.right <= width && self.bottom <= height
    }

    pub fn to_box(self) -> TexelBox {
        TexelBox::new(self.left, self.top, 0, self.right, self.bottom, 1)
    }
}

/// A 3D texel box.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct TexelBox {
    pub left: u32,
    pub top: u32,
    pub front: u32,
    pub right: u32,
    pub bottom: u32,
    pub back: u32,
}

impl TexelBox {
    pub const fn new(left: u32, top: u32, front: u32, right: u32, bottom: u32, back: u32) -> Self {
        TexelBox {
            left,
            top,
            front,
            right,
            bottom,
            back,
        }
    }

    pub const fn whole(width: u32, height: u32, depth: u32) -> Self {
        TexelBox::new(0, 0, 0, width, height, depth)
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn depth(&self) -> u32 {
        self.back.saturating_sub(self.front)
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top || self.back <= self.front
    }

    /// True when the box is non-empty and lies inside a `width` × `height` × `depth` image.
    pub fn fits_within(&self, width: u32, height: u32, depth: u32) -> bool {
        !self.is_empty() && self.right <= width && self.bottom <= height && self.back <= depth
    }

    /// The smallest box containing both.
    pub fn union(&self, other: &TexelBox) -> TexelBox {
        TexelBox {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            front: self.front.min(other.front),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
            back: self.back.max(other.back),
        }
    }

    pub fn contains(&self, other: &TexelBox) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.front <= other.front
            && self.right >= other.right
            && self.bottom >= other.bottom
            && self.back >= other.back
    }

    /// True when every edge is a multiple of the block size, or touches the image edge.
    pub(crate) fn is_block_aligned(&self, block_width: u32, block_height: u32, width: u32, height: u32) -> bool {
        self.left % block_width == 0
            && self.top % block_height == 0
            && (self.right % block_width == 0 || self.right == width)
            && (self.bottom % block_height == 0 || self.bottom == height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union() {
        let a = TexelBox::new(0, 0, 0, 2, 2, 1);
        let b = TexelBox::new(4, 1, 0, 6, 3, 1);
        assert_eq!(a.union(&b), TexelBox::new(0, 0, 0, 6, 3, 1));
        assert!(a.union(&b).contains(&a));
    }

    #[test]
    fn test_fits_within() {
        assert!(Rect::new(0, 0, 4, 4).fits_within(4, 4));
        assert!(!Rect::new(0, 0, 5, 4).fits_within(4, 4));
        assert!(!Rect::new(2, 2, 2, 4).fits_within(4, 4));
        assert!(TexelBox::whole(2, 2, 2).fits_within(2, 2, 2));
    }
}
