//! Rectangle-packing primitives used by [`crate::batching::packer`]:
//! a `Block` is a job's footprint (width = parallelism extent, height =
//! estimated runtime), and `Packer` places blocks into a growing 2D bin.

/// A job's footprint for bin-packing purposes.
#[derive(Debug, Clone)]
pub struct Block {
    /// The job id this block represents.
    pub id: String,
    /// Parallelism width (e.g. cpu slots).
    pub width: u32,
    /// Estimated-runtime height.
    pub height: u32,
    /// Grouping key; defaults to `width` when not overridden.
    pub extent: u32,
    /// Indices, into the same slice this block came from, of its
    /// dependencies.
    pub dependencies: Vec<usize>,
}

impl Block {
    /// Build a block whose `extent` defaults to `width`.
    pub fn new(id: impl Into<String>, width: u32, height: u32, dependencies: Vec<usize>) -> Self {
        Self { id: id.into(), width, height, extent: width, dependencies }
    }

    /// Euclidean norm of `(width, height)`, used to rank blocks by size.
    pub fn norm(&self) -> f64 {
        f64::from(self.width).hypot(f64::from(self.height))
    }
}

/// An unordered collection of blocks sharing no intra-bucket dependencies.
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    /// Indices into the originating block slice.
    pub members: Vec<usize>,
}

impl Bucket {
    /// An empty bucket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing member list.
    pub fn from_members(members: Vec<usize>) -> Self {
        Self { members }
    }

    /// Number of blocks in this bucket.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether this bucket holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Append one block index.
    pub fn add(&mut self, index: usize) {
        self.members.push(index);
    }

    /// Append several block indices.
    pub fn extend(&mut self, indices: impl IntoIterator<Item = usize>) {
        self.members.extend(indices);
    }

    /// Euclidean norm of the summed width/height of every member block —
    /// the same size metric `pack_by_count_atomic` balances buckets by.
    pub fn size(&self, blocks: &[Block]) -> f64 {
        let (mut w, mut h) = (0.0_f64, 0.0_f64);
        for &i in &self.members {
            w += f64::from(blocks[i].width);
            h += f64::from(blocks[i].height);
        }
        w.hypot(h)
    }
}

/// One node in the packer's binary space-partition tree.
#[derive(Debug, Clone)]
pub struct Node {
    /// Top-left corner.
    pub origin: (u32, u32),
    /// `(width, height)`.
    pub size: (u32, u32),
    used: bool,
    down: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

impl Node {
    fn new(origin: (u32, u32), size: (u32, u32)) -> Self {
        Self { origin, size, used: false, down: None, right: None }
    }
}

/// Grows a binary space-partition tree to place a sequence of rectangles,
/// starting from an empty root and expanding right or down as needed.
///
/// Adapted from the classic grid-growing bin packer (originally described
/// at <https://gist.github.com/shihrer/aa90d023ae0f7662919f>).
#[derive(Debug, Default)]
pub struct Packer {
    root: Option<Node>,
    auto_width: bool,
    auto_height: bool,
}

impl Packer {
    /// A fresh packer with no placed rectangles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place every block in `blocks`, returning the node each was fit into
    /// (`None` if no fit could be grown for it), in the same order as
    /// `blocks`. `width`/`height` bound the first guess at the root size;
    /// `None` auto-sizes from the largest block.
    pub fn pack(&mut self, blocks: &[&Block], width: Option<u32>, height: Option<u32>) -> Vec<Option<Node>> {
        self.auto_width = width.is_none();
        self.auto_height = height.is_none();
        let width = width.unwrap_or_else(|| {
            (1.5 * f64::from(blocks.iter().map(|b| b.width).max().unwrap_or(1))).ceil() as u32
        });
        let height = height.unwrap_or_else(|| {
            (1.5 * f64::from(blocks.iter().map(|b| b.height).max().unwrap_or(1))).ceil() as u32
        });
        self.root = Some(Node::new((0, 0), (width, height)));

        let mut fits = Vec::with_capacity(blocks.len());
        for block in blocks {
            let size = (block.width, block.height);
            let placed = if let Some(root) = self.root.take() {
                let (found, root) = Self::find_node(root, size);
                self.root = Some(root);
                if let Some(path) = found {
                    Some(self.split_at(path, size))
                } else {
                    self.grow(size)
                }
            } else {
                None
            };
            fits.push(placed);
        }
        fits
    }

    fn find_node(node: Node, size: (u32, u32)) -> (Option<Vec<Side>>, Node) {
        fn search(node: &Node, size: (u32, u32), path: &mut Vec<Side>) -> bool {
            if node.used {
                path.push(Side::Right);
                if search(node.right.as_ref().expect("used node has a right child"), size, path) {
                    return true;
                }
                path.pop();
                path.push(Side::Down);
                if search(node.down.as_ref().expect("used node has a down child"), size, path) {
                    return true;
                }
                path.pop();
                false
            } else {
                size.0 <= node.size.0 && size.1 <= node.size.1
            }
        }
        let mut path = Vec::new();
        let found = search(&node, size, &mut path);
        (found.then_some(path), node)
    }

    fn split_at(&mut self, path: Vec<Side>, size: (u32, u32)) -> Node {
        let root = self.root.as_mut().expect("root set before splitting");
        let mut current = root;
        for side in &path {
            current = match side {
                Side::Right => current.right.as_mut().expect("path follows existing nodes"),
                Side::Down => current.down.as_mut().expect("path follows existing nodes"),
            };
        }
        Self::split_node(current, size)
    }

    fn split_node(node: &mut Node, size: (u32, u32)) -> Node {
        node.used = true;
        node.down = Some(Box::new(Node::new((node.origin.0, node.origin.1 + size.1), (node.size.0, node.size.1 - size.1))));
        node.right = Some(Box::new(Node::new((node.origin.0 + size.0, node.origin.1), (node.size.0 - size.0, size.1))));
        Node { origin: node.origin, size, used: true, down: None, right: None }
    }

    fn grow(&mut self, size: (u32, u32)) -> Option<Node> {
        let root = self.root.as_ref().expect("root set before growing");
        let can_go_right = self.auto_width && size.1 <= root.size.1;
        let can_go_down = self.auto_height && size.0 <= root.size.0;
        let should_go_right = can_go_right && root.size.1 >= root.size.0 + size.0;
        let should_go_down = can_go_down && root.size.0 >= root.size.1 + size.1;

        if should_go_right || (can_go_right && !should_go_down) {
            self.grow_right(size)
        } else if can_go_down {
            self.grow_down(size)
        } else {
            None
        }
    }

    fn grow_right(&mut self, size: (u32, u32)) -> Option<Node> {
        let old_root = self.root.take().expect("root set before growing");
        let mut new_root = Node::new((0, 0), (old_root.size.0 + size.0, old_root.size.1));
        new_root.used = true;
        let right_size = (size.0, old_root.size.1);
        new_root.right = Some(Box::new(Node::new((old_root.size.0, 0), right_size)));
        new_root.down = Some(Box::new(old_root));
        self.root = Some(new_root);
        let root = self.root.take().expect("just set");
        let (found, root) = Self::find_node(root, size);
        self.root = Some(root);
        found.map(|path| self.split_at(path, size))
    }

    fn grow_down(&mut self, size: (u32, u32)) -> Option<Node> {
        let old_root = self.root.take().expect("root set before growing");
        let mut new_root = Node::new((0, 0), (old_root.size.0, old_root.size.1 + size.1));
        new_root.used = true;
        let down_size = (old_root.size.0, size.1);
        new_root.down = Some(Box::new(Node::new((0, old_root.size.1), down_size)));
        new_root.right = Some(Box::new(old_root));
        self.root = Some(new_root);
        let root = self.root.take().expect("just set");
        let (found, root) = Self::find_node(root, size);
        self.root = Some(root);
        found.map(|path| self.split_at(path, size))
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Right,
    Down,
}

/// Bounding box `(width, height)` covering every placed node's far corner.
pub fn perimeter(fits: &[Option<Node>]) -> (u32, u32) {
    let (mut max_x, mut max_y) = (0, 0);
    for node in fits.iter().flatten() {
        max_x = max_x.max(node.origin.0 + node.size.0);
        max_y = max_y.max(node.origin.1 + node.size.1);
    }
    (max_x, max_y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_blocks_without_overlap() {
        let blocks = vec![
            Block::new("a", 10, 20, vec![]),
            Block::new("b", 10, 10, vec![]),
            Block::new("c", 20, 5, vec![]),
        ];
        let refs: Vec<&Block> = blocks.iter().collect();
        let mut packer = Packer::new();
        let fits = packer.pack(&refs, None, None);
        assert_eq!(fits.len(), 3);
        assert!(fits.iter().all(Option::is_some));
    }

    #[test]
    fn perimeter_covers_all_placed_nodes() {
        let blocks = vec![Block::new("a", 10, 10, vec![]), Block::new("b", 5, 5, vec![])];
        let refs: Vec<&Block> = blocks.iter().collect();
        let mut packer = Packer::new();
        let fits = packer.pack(&refs, None, None);
        let (w, h) = perimeter(&fits);
        assert!(w > 0 && h > 0);
    }
}
