use std::collections::{hash_map, HashMap, VecDeque};

use crate::api::{Comment, CommentId};

/// Sibling order within a thread, roots included
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadOrder {
    /// Ascending creation time, ties broken by ascending id
    #[default]
    Oldest,

    /// Descending creation time, ties broken by descending id
    Newest,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommentNode {
    pub comment: Comment,
    pub children: Vec<CommentNode>,
}

impl CommentNode {
    /// Number of comments in this subtree, this one included
    pub fn len(&self) -> usize {
        self.depth_iter().count()
    }

    /// Pre-order walk of this subtree, with depths relative to this node
    pub fn depth_iter(&self) -> DepthIter<'_> {
        DepthIter::new(std::slice::from_ref(self), None)
    }

    pub fn find(&self, id: CommentId) -> Option<&CommentNode> {
        find(std::slice::from_ref(self), id)
    }
}

/// Pre-order walk over a forest, yielding each node along with its depth (roots are at 0)
pub struct DepthIter<'a> {
    stack: Vec<(usize, &'a CommentNode)>,
    max_depth: Option<usize>,
}

impl<'a> DepthIter<'a> {
    fn new(forest: &'a [CommentNode], max_depth: Option<usize>) -> DepthIter<'a> {
        DepthIter {
            stack: forest.iter().rev().map(|n| (0, n)).collect(),
            max_depth,
        }
    }
}

impl<'a> Iterator for DepthIter<'a> {
    type Item = (usize, &'a CommentNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        if self.max_depth.map_or(true, |max| depth < max) {
            self.stack
                .extend(node.children.iter().rev().map(|c| (depth + 1, c)));
        }
        Some((depth, node))
    }
}

pub fn walk(forest: &[CommentNode]) -> DepthIter<'_> {
    DepthIter::new(forest, None)
}

/// Like `walk`, but does not descend below `max_depth`
pub fn walk_visible(forest: &[CommentNode], max_depth: usize) -> DepthIter<'_> {
    DepthIter::new(forest, Some(max_depth))
}

pub fn count(forest: &[CommentNode]) -> usize {
    walk(forest).count()
}

pub fn find(forest: &[CommentNode], id: CommentId) -> Option<&CommentNode> {
    walk(forest).map(|(_, n)| n).find(|n| n.comment.id == id)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Visit {
    New,
    OnPath,
    Done,
}

/// Assembles flat comments into a forest.
///
/// Every input comment ends up exactly once in the output, and the output does
/// not depend on the order of the input. Comments whose parent is unknown become
/// roots. On duplicate ids, the oldest copy is the one replies get attached to.
/// If parent links form a cycle, its oldest comment is made a root.
pub fn build(comments: impl IntoIterator<Item = Comment>, order: ThreadOrder) -> Vec<CommentNode> {
    let mut comments = comments.into_iter().collect::<Vec<_>>();
    comments.sort_by(|a, b| {
        let key = |c: &Comment| {
            (
                c.created_at,
                c.id,
                c.parent_id,
                c.post_id,
                c.author_id,
                c.vote_score,
            )
        };
        key(a)
            .cmp(&key(b))
            .then_with(|| a.author_name.cmp(&b.author_name))
            .then_with(|| a.content.cmp(&b.content))
    });
    let n = comments.len();

    let mut index = HashMap::with_capacity(n);
    for (i, c) in comments.iter().enumerate() {
        match index.entry(c.id) {
            hash_map::Entry::Vacant(e) => {
                e.insert(i);
            }
            hash_map::Entry::Occupied(_) => {
                tracing::warn!(comment = ?c.id, "duplicate comment id");
            }
        }
    }

    let mut parents = comments
        .iter()
        .map(|c| {
            let p = c.parent_id?;
            let res = index.get(&p).copied();
            if res.is_none() {
                tracing::debug!(comment = ?c.id, parent = ?p, "orphan comment, placing it at the root");
            }
            res
        })
        .collect::<Vec<Option<usize>>>();

    let mut visits = vec![Visit::New; n];
    for start in 0..n {
        let mut path = Vec::new();
        let mut cur = Some(start);
        while let Some(i) = cur {
            match visits[i] {
                Visit::Done => break,
                Visit::New => {
                    visits[i] = Visit::OnPath;
                    path.push(i);
                    cur = parents[i];
                }
                Visit::OnPath => {
                    if let Some(cycle_start) = path.iter().position(|&j| j == i) {
                        if let Some(&oldest) = path[cycle_start..].iter().min() {
                            tracing::warn!(
                                comment = ?comments[oldest].id,
                                "comment parents form a cycle, placing it at the root"
                            );
                            parents[oldest] = None;
                        }
                    }
                    break;
                }
            }
        }
        for i in path {
            visits[i] = Visit::Done;
        }
    }

    // indices are in ascending (created_at, id) order, so pushing keeps siblings sorted
    let mut roots = Vec::new();
    let mut children = vec![Vec::new(); n];
    for (i, p) in parents.iter().enumerate() {
        match p {
            Some(p) => children[*p].push(i),
            None => roots.push(i),
        }
    }
    if order == ThreadOrder::Newest {
        roots.reverse();
        for c in children.iter_mut() {
            c.reverse();
        }
    }

    // parents come before their children in breadth-first order, so building in
    // reverse guarantees children are ready when their parent gets built
    let mut bfs = Vec::with_capacity(n);
    let mut queue = roots.iter().copied().collect::<VecDeque<_>>();
    while let Some(i) = queue.pop_front() {
        bfs.push(i);
        queue.extend(children[i].iter().copied());
    }
    let mut comments = comments.into_iter().map(Some).collect::<Vec<_>>();
    let mut built: Vec<Option<CommentNode>> = vec![None; n];
    for &i in bfs.iter().rev() {
        let kids = children[i]
            .iter()
            .filter_map(|&c| built[c].take())
            .collect();
        if let Some(comment) = comments[i].take() {
            built[i] = Some(CommentNode {
                comment,
                children: kids,
            });
        }
    }
    roots.into_iter().filter_map(|r| built[r].take()).collect()
}
