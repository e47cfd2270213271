//! The recycling-context tree.
//!
//! Every run gets its own [`RecyclingContext`]. Contexts own their children
//! by handle and name their parent by handle only, so the tree has no
//! ownership cycles. The master context is the root and is never removed.
//! Removal is strictly children first.

use crate::error::TopologyError;
use crate::ids::{ContextId, RecallIdKey, RecyclingId};

use super::AudioGraph;

/// One voice or nested sub-processing context.
#[derive(Debug)]
pub struct RecyclingContext {
    pub(crate) parent: Option<ContextId>,
    pub(crate) children: Vec<ContextId>,
    pub(crate) recyclings: Vec<RecyclingId>,
    pub(crate) recall_id: Option<RecallIdKey>,
}

impl RecyclingContext {
    pub(crate) fn new(parent: Option<ContextId>, recyclings: Vec<RecyclingId>) -> Self {
        Self {
            parent,
            children: Vec::new(),
            recyclings,
            recall_id: None,
        }
    }

    /// Parent context. `None` only for the master context.
    pub fn parent(&self) -> Option<ContextId> {
        self.parent
    }

    /// Child contexts in creation order.
    pub fn children(&self) -> &[ContextId] {
        &self.children
    }

    /// Recyclings processed by this context.
    pub fn recyclings(&self) -> &[RecyclingId] {
        &self.recyclings
    }

    /// The run using this context.
    pub fn recall_id(&self) -> Option<RecallIdKey> {
        self.recall_id
    }

    /// Position of `recycling` in this context.
    pub fn find(&self, recycling: RecyclingId) -> Option<usize> {
        self.recyclings.iter().position(|&r| r == recycling)
    }

    /// Number of recyclings.
    pub fn len(&self) -> usize {
        self.recyclings.len()
    }

    /// Returns `true` if the context holds no recycling.
    pub fn is_empty(&self) -> bool {
        self.recyclings.is_empty()
    }
}

impl AudioGraph {
    /// Creates a context below `parent`.
    pub fn add_context(
        &mut self,
        parent: ContextId,
        recyclings: Vec<RecyclingId>,
    ) -> Result<ContextId, TopologyError> {
        if !self.contexts.contains(parent) {
            return Err(TopologyError::UnknownContext(parent));
        }
        let id = self.contexts.insert(RecyclingContext::new(Some(parent), recyclings));
        if let Some(p) = self.contexts.get_mut(parent) {
            p.children.push(id);
        }
        tracing::trace!("graph: add {id} below {parent}");
        Ok(id)
    }

    /// Removes a childless context.
    pub fn remove_context(&mut self, id: ContextId) -> Result<(), TopologyError> {
        if id == self.master {
            return Err(TopologyError::MasterContext);
        }
        let context = self.contexts.get(id).ok_or(TopologyError::UnknownContext(id))?;
        if !context.children.is_empty() {
            return Err(TopologyError::ContextInUse {
                context: id,
                live: self.live_recall_ids_below(id),
            });
        }
        let parent = context.parent;
        if let Some(p) = parent.and_then(|p| self.contexts.get_mut(p)) {
            p.children.retain(|&c| c != id);
        }
        self.contexts.remove(id);
        Ok(())
    }

    /// Distance from the master context (master is 0).
    pub fn context_depth(&self, id: ContextId) -> usize {
        let mut depth = 0;
        let mut current = self.contexts.get(id).and_then(|c| c.parent);
        while let Some(parent) = current {
            depth += 1;
            current = self.contexts.get(parent).and_then(|c| c.parent);
        }
        depth
    }

    /// Highest ancestor below the master context, or `id` itself if it is
    /// a direct child of the master.
    pub fn context_toplevel(&self, id: ContextId) -> Option<ContextId> {
        if id == self.master {
            return None;
        }
        let mut current = id;
        loop {
            let parent = self.contexts.get(current)?.parent?;
            if parent == self.master {
                return Some(current);
            }
            current = parent;
        }
    }

    /// Returns `true` if `id` is `ancestor` or lies below it.
    pub fn context_is_within(&self, id: ContextId, ancestor: ContextId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.contexts.get(c).and_then(|ctx| ctx.parent);
        }
        false
    }

    /// Child of `id` that processes `recycling`.
    pub fn find_child_context(&self, id: ContextId, recycling: RecyclingId) -> Option<ContextId> {
        self.contexts
            .get(id)?
            .children
            .iter()
            .copied()
            .find(|&child| self.contexts.get(child).is_some_and(|c| c.find(recycling).is_some()))
    }

    /// Nearest ancestor of `id` that processes `recycling`.
    pub fn find_parent_context(&self, id: ContextId, recycling: RecyclingId) -> Option<ContextId> {
        let mut current = self.contexts.get(id)?.parent;
        while let Some(ancestor) = current {
            let context = self.contexts.get(ancestor)?;
            if context.find(recycling).is_some() {
                return Some(ancestor);
            }
            current = context.parent;
        }
        None
    }

    /// Recall ids of the direct children of `id`.
    pub fn child_recall_ids(&self, id: ContextId) -> Vec<RecallIdKey> {
        self.contexts.get(id).map_or_else(Vec::new, |c| {
            c.children
                .iter()
                .filter_map(|&child| self.contexts.get(child).and_then(|cc| cc.recall_id))
                .collect()
        })
    }

    /// Number of recall ids anywhere below `id`.
    pub fn live_recall_ids_below(&self, id: ContextId) -> usize {
        let mut stack = vec![id];
        let mut live = 0;
        while let Some(current) = stack.pop() {
            let Some(context) = self.contexts.get(current) else {
                continue;
            };
            for &child in &context.children {
                if self
                    .contexts
                    .get(child)
                    .and_then(|c| c.recall_id)
                    .is_some_and(|rid| self.recall_ids.contains(rid))
                {
                    live += 1;
                }
                stack.push(child);
            }
        }
        live
    }

    /// Inserts `recycling` at `position` (clamped to the end).
    pub fn context_insert_recycling(
        &mut self,
        id: ContextId,
        position: usize,
        recycling: RecyclingId,
    ) -> Result<(), TopologyError> {
        let context = self.contexts.get_mut(id).ok_or(TopologyError::UnknownContext(id))?;
        let position = position.min(context.recyclings.len());
        context.recyclings.insert(position, recycling);
        Ok(())
    }

    /// Replaces the recycling at `position` and returns the old one.
    pub fn context_replace_recycling(
        &mut self,
        id: ContextId,
        position: usize,
        recycling: RecyclingId,
    ) -> Result<Option<RecyclingId>, TopologyError> {
        let context = self.contexts.get_mut(id).ok_or(TopologyError::UnknownContext(id))?;
        Ok(context
            .recyclings
            .get_mut(position)
            .map(|slot| core::mem::replace(slot, recycling)))
    }

    /// Removes `recycling` from the context. Returns `false` if absent.
    pub fn context_remove_recycling(
        &mut self,
        id: ContextId,
        recycling: RecyclingId,
    ) -> Result<bool, TopologyError> {
        let context = self.contexts.get_mut(id).ok_or(TopologyError::UnknownContext(id))?;
        let before = context.recyclings.len();
        context.recyclings.retain(|&r| r != recycling);
        Ok(context.recyclings.len() != before)
    }

    /// Replaces every occurrence of `old[i]` with `new[i]` in `id` and all
    /// of its descendants. Extra entries in the longer slice are ignored.
    pub fn reset_recyclings(
        &mut self,
        id: ContextId,
        old: &[RecyclingId],
        new: &[RecyclingId],
    ) -> Result<(), TopologyError> {
        if !self.contexts.contains(id) {
            return Err(TopologyError::UnknownContext(id));
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(context) = self.contexts.get_mut(current) else {
                continue;
            };
            for slot in &mut context.recyclings {
                if let Some(i) = old.iter().position(|r| r == slot) {
                    if let Some(&replacement) = new.get(i) {
                        *slot = replacement;
                    }
                }
            }
            stack.extend(context.children.iter().copied());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AudioSpec;

    fn recyclings(graph: &mut AudioGraph, n: usize) -> Vec<RecyclingId> {
        let audio = graph.add_audio(AudioSpec::new("a").with_output_pads(n));
        graph
            .audio(audio)
            .unwrap()
            .outputs()
            .to_vec()
            .into_iter()
            .map(|c| graph.channel(c).unwrap().recycling())
            .collect()
    }

    #[test]
    fn child_is_registered_with_parent() {
        let mut graph = AudioGraph::default();
        let master = graph.master_context();
        let child = graph.add_context(master, Vec::new()).unwrap();
        assert_eq!(graph.context(master).unwrap().children(), &[child]);
        assert_eq!(graph.context(child).unwrap().parent(), Some(master));
        assert_eq!(graph.context_depth(child), 1);
    }

    #[test]
    fn parent_with_children_cannot_be_removed() {
        let mut graph = AudioGraph::default();
        let master = graph.master_context();
        let parent = graph.add_context(master, Vec::new()).unwrap();
        let child = graph.add_context(parent, Vec::new()).unwrap();
        assert!(matches!(
            graph.remove_context(parent),
            Err(TopologyError::ContextInUse { .. })
        ));
        graph.remove_context(child).unwrap();
        graph.remove_context(parent).unwrap();
        assert!(graph.context(master).unwrap().children().is_empty());
    }

    #[test]
    fn master_is_permanent() {
        let mut graph = AudioGraph::default();
        let master = graph.master_context();
        assert_eq!(graph.remove_context(master), Err(TopologyError::MasterContext));
    }

    #[test]
    fn toplevel_stops_below_master() {
        let mut graph = AudioGraph::default();
        let master = graph.master_context();
        let a = graph.add_context(master, Vec::new()).unwrap();
        let b = graph.add_context(a, Vec::new()).unwrap();
        let c = graph.add_context(b, Vec::new()).unwrap();
        assert_eq!(graph.context_toplevel(c), Some(a));
        assert_eq!(graph.context_toplevel(a), Some(a));
        assert_eq!(graph.context_toplevel(master), None);
        assert!(graph.context_is_within(c, a));
        assert!(!graph.context_is_within(a, c));
    }

    #[test]
    fn find_child_and_parent_by_recycling() {
        let mut graph = AudioGraph::default();
        let r = recyclings(&mut graph, 2);
        let master = graph.master_context();
        let outer = graph.add_context(master, vec![r[0], r[1]]).unwrap();
        let inner = graph.add_context(outer, vec![r[1]]).unwrap();
        assert_eq!(graph.find_child_context(outer, r[1]), Some(inner));
        assert_eq!(graph.find_child_context(outer, r[0]), None);
        assert_eq!(graph.find_parent_context(inner, r[0]), Some(outer));
    }

    #[test]
    fn insert_replace_remove_recycling() {
        let mut graph = AudioGraph::default();
        let r = recyclings(&mut graph, 3);
        let master = graph.master_context();
        let ctx = graph.add_context(master, vec![r[0]]).unwrap();
        graph.context_insert_recycling(ctx, 9, r[1]).unwrap();
        assert_eq!(graph.context(ctx).unwrap().recyclings(), &[r[0], r[1]]);
        assert_eq!(graph.context_replace_recycling(ctx, 0, r[2]).unwrap(), Some(r[0]));
        assert_eq!(graph.context(ctx).unwrap().find(r[2]), Some(0));
        assert!(graph.context_remove_recycling(ctx, r[1]).unwrap());
        assert!(!graph.context_remove_recycling(ctx, r[1]).unwrap());
    }

    #[test]
    fn reset_recyclings_reaches_descendants() {
        let mut graph = AudioGraph::default();
        let r = recyclings(&mut graph, 3);
        let master = graph.master_context();
        let outer = graph.add_context(master, vec![r[0]]).unwrap();
        let inner = graph.add_context(outer, vec![r[0], r[1]]).unwrap();
        graph.reset_recyclings(outer, &[r[0]], &[r[2]]).unwrap();
        assert_eq!(graph.context(outer).unwrap().recyclings(), &[r[2]]);
        assert_eq!(graph.context(inner).unwrap().recyclings(), &[r[2], r[1]]);
    }
}
