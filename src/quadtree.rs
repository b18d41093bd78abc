//! A region quadtree used for proximity queries between simulated entities.

use crate::math::{Point2d, Rect};
use smallvec::SmallVec;

/// The number of items a node holds before it subdivides.
pub const NODE_CAPACITY: usize = 5;

/// Nodes at this depth never subdivide, which bounds the tree's height
/// when many items share the same tiny bounding box.
const MAX_DEPTH: usize = 24;

/// Anything with an axis-aligned bounding box.
pub trait Bounded {
    /// The bounding box of the object.
    fn bounds(&self) -> Rect;
}

/// A spatial index over bounded items.
///
/// Every item is stored exactly once, at the deepest node whose region
/// fully contains the item's bounding box. The index is meant to be rebuilt
/// wholesale with [`SpatialIndex::refill`] rather than edited in place.
#[derive(Clone, Debug)]
pub struct SpatialIndex<T> {
    root: Node<T>,
    len: usize,
}

#[derive(Clone, Debug)]
struct Node<T> {
    /// The region covered by this node.
    region: Rect,
    /// The depth of this node, the root being at zero.
    depth: usize,
    /// The items which do not fit entirely within a single child.
    items: SmallVec<[T; NODE_CAPACITY + 1]>,
    /// The four quadrants, once the node has subdivided.
    children: Option<Box<[Node<T>; 4]>>,
}

impl<T: Bounded> SpatialIndex<T> {
    /// Creates an empty index covering the given region.
    pub fn new(region: Rect) -> Self {
        Self {
            root: Node::new(region, 0),
            len: 0,
        }
    }

    /// Creates an index holding the given items, its region fitted to their union.
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        let mut index = Self::default();
        index.refill(items);
        index
    }

    /// The number of items in the index.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The region covered by the root of the index.
    pub fn region(&self) -> Rect {
        self.root.region
    }

    /// Removes every item, keeping the current region.
    pub fn clear(&mut self) {
        self.root = Node::new(self.root.region, 0);
        self.len = 0;
    }

    /// Clears the index and inserts all of the given items.
    /// The root region becomes the union of the items' bounding boxes,
    /// or the unit square if there are no items.
    pub fn refill(&mut self, items: impl IntoIterator<Item = T>) {
        let items = items.into_iter().collect::<Vec<_>>();
        let region = items
            .iter()
            .map(|item| item.bounds())
            .reduce(|a, b| a.union(&b))
            .unwrap_or_else(Rect::unit);
        self.root = Node::new(region, 0);
        self.len = 0;
        for item in items {
            self.insert(item);
        }
    }

    /// Inserts an item. Items outside the root region are kept at the root.
    pub fn insert(&mut self, item: T) {
        self.root.insert(item);
        self.len += 1;
    }

    /// The broad phase of a rectangle query: every item in a node whose
    /// region intersects `rect`. A superset of [`SpatialIndex::query_rect`].
    pub fn possible_hits(&self, rect: &Rect) -> Vec<&T> {
        let mut out = vec![];
        self.root.collect_rect(rect, &mut out);
        out
    }

    /// The items whose bounding box intersects `rect`.
    pub fn query_rect(&self, rect: &Rect) -> Vec<&T> {
        let mut hits = self.possible_hits(rect);
        hits.retain(|item| item.bounds().intersects(rect));
        hits
    }

    /// The items whose bounding box contains the point `p`.
    pub fn query_point(&self, p: Point2d) -> Vec<&T> {
        let mut hits = vec![];
        self.root.collect_point(p, &mut hits);
        hits.retain(|item| item.bounds().contains_point(p));
        hits
    }

    /// Iterates over every item in the index, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let mut stack = vec![&self.root];
        let mut items = vec![];
        while let Some(node) = stack.pop() {
            items.extend(node.items.iter());
            if let Some(children) = &node.children {
                stack.extend(children.iter());
            }
        }
        items.into_iter()
    }

    /// The depth of the deepest node.
    pub fn depth(&self) -> usize {
        self.root.max_depth()
    }
}

impl<T: Bounded> Default for SpatialIndex<T> {
    fn default() -> Self {
        Self::new(Rect::unit())
    }
}

impl<T: Bounded> Node<T> {
    fn new(region: Rect, depth: usize) -> Self {
        Self {
            region,
            depth,
            items: SmallVec::new(),
            children: None,
        }
    }

    fn insert(&mut self, item: T) {
        if let Some(children) = self.children.as_mut() {
            let bounds = item.bounds();
            match children.iter_mut().find(|c| c.region.contains_rect(&bounds)) {
                Some(child) => child.insert(item),
                None => self.items.push(item),
            }
            return;
        }

        self.items.push(item);
        if self.items.len() > NODE_CAPACITY && self.depth < MAX_DEPTH {
            self.split();
        }
    }

    /// Subdivides into four quadrants and pushes down every item that fits in one.
    fn split(&mut self) {
        let depth = self.depth + 1;
        let children = self.region.quadrants().map(|region| Node::new(region, depth));
        self.children = Some(Box::new(children));
        for item in std::mem::take(&mut self.items) {
            self.insert(item);
        }
    }

    fn collect_rect<'a>(&'a self, rect: &Rect, out: &mut Vec<&'a T>) {
        if let Some(children) = &self.children {
            for child in children.iter() {
                if child.region.intersects(rect) {
                    child.collect_rect(rect, out);
                }
            }
        }
        out.extend(self.items.iter());
    }

    fn collect_point<'a>(&'a self, p: Point2d, out: &mut Vec<&'a T>) {
        if let Some(children) = &self.children {
            for child in children.iter() {
                if child.region.contains_point(p) {
                    child.collect_point(p, out);
                }
            }
        }
        out.extend(self.items.iter());
    }

    fn max_depth(&self) -> usize {
        self.children
            .iter()
            .flat_map(|c| c.iter())
            .map(|c| c.max_depth())
            .max()
            .unwrap_or(self.depth)
    }
}
