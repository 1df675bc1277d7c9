//! Depth- and width-bounded traversal of comment trees.
//!
//! Platforms hand back comments as nested reply trees. The walk here uses an
//! explicit stack so the limits hold no matter how deep the input is: at most
//! `max_siblings` nodes are taken from any one reply list (the roots
//! included), and nothing below `max_depth` levels is visited.

/// A node with an ordered list of replies.
pub trait CommentNode: Sized {
    fn replies(&self) -> &[Self];
}

/// Limits for [`collect_bounded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalLimits {
    /// Levels to visit; roots are level 1. Zero visits nothing.
    pub max_depth: usize,
    /// Nodes taken from each reply list, in order.
    pub max_siblings: usize,
}

/// A node reached by the traversal.
#[derive(Debug)]
pub struct Visited<'a, T> {
    /// 1 for roots.
    pub depth: usize,
    pub node: &'a T,
}

/// Pre-order walk of `roots` within `limits`.
///
/// A node is always emitted before its replies, and replies keep the order
/// the platform gave them.
pub fn collect_bounded<T: CommentNode>(roots: &[T], limits: TraversalLimits) -> Vec<Visited<'_, T>> {
    let mut visited = Vec::new();
    if limits.max_depth == 0 {
        return visited;
    }

    let mut stack: Vec<(usize, &T)> = roots
        .iter()
        .take(limits.max_siblings)
        .rev()
        .map(|node| (1, node))
        .collect();

    while let Some((depth, node)) = stack.pop() {
        visited.push(Visited { depth, node });
        if depth < limits.max_depth {
            stack.extend(
                node.replies()
                    .iter()
                    .take(limits.max_siblings)
                    .rev()
                    .map(|reply| (depth + 1, reply)),
            );
        }
    }
    visited
}
