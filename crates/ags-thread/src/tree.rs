//! Tree of named engine threads.
//!
//! Every engine thread is a node of one [`ThreadTree`]: the audio loop, the
//! task launcher, the worker and any super-threaded channels. A node runs at
//! a frequency, its own or inherited from its parent, which for the audio
//! loop is `samplerate / buffer_size`.
//!
//! Starting the tree spawns parents before children. Stopping raises every
//! node's [`StopToken`] first and then joins children before parents, so a
//! parent waiting on a child never waits on a thread that is already gone.

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crate::error::{Result, ThreadError};

/// Cooperative stop flag handed to a thread body.
#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    /// A token that has not been stopped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once the owner asked the thread to stop.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Asks the thread to stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// What a thread node runs.
pub type ThreadBody = Box<dyn FnOnce(StopToken) + Send + 'static>;

/// Handle to a node of a [`ThreadTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Slot index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

/// Description of a node to add.
pub struct ThreadSpec {
    name: String,
    frequency: Option<f64>,
    body: Option<ThreadBody>,
}

impl ThreadSpec {
    /// A node running `body` on its own thread.
    pub fn new(name: impl Into<String>, body: impl FnOnce(StopToken) + Send + 'static) -> Self {
        Self {
            name: name.into(),
            frequency: None,
            body: Some(Box::new(body)),
        }
    }

    /// A node without a thread, used to group children.
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frequency: None,
            body: None,
        }
    }

    /// Runs the node at `frequency` Hz instead of the parent's.
    pub fn with_frequency(mut self, frequency: f64) -> Self {
        self.frequency = Some(frequency);
        self
    }
}

struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    frequency: Option<f64>,
    body: Option<ThreadBody>,
    stop: StopToken,
    handle: Option<JoinHandle<()>>,
}

/// Owner of the engine threads.
pub struct ThreadTree {
    nodes: Vec<Option<Node>>,
    root: NodeId,
    running: bool,
}

impl ThreadTree {
    /// Creates a tree whose root group runs at `frequency` Hz.
    pub fn new(name: impl Into<String>, frequency: f64) -> Self {
        let root = Node {
            name: name.into(),
            parent: None,
            children: Vec::new(),
            frequency: Some(frequency),
            body: None,
            stop: StopToken::new(),
            handle: None,
        };
        Self {
            nodes: vec![Some(root)],
            root: NodeId(0),
            running: false,
        }
    }

    /// Root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns `true` between [`start`](Self::start) and [`stop`](Self::stop).
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Live nodes, the root included.
    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    /// Returns `true` if only the root is left.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(ThreadError::UnknownNode(id.0))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(ThreadError::UnknownNode(id.0))
    }

    /// Adds a node under `parent`. If the tree is running the node's thread
    /// starts right away.
    pub fn add_child(&mut self, parent: NodeId, spec: ThreadSpec) -> Result<NodeId> {
        self.node(parent)?;
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node {
            name: spec.name,
            parent: Some(parent),
            children: Vec::new(),
            frequency: spec.frequency,
            body: spec.body,
            stop: StopToken::new(),
            handle: None,
        }));
        self.node_mut(parent)?.children.push(id);
        tracing::debug!("threads: add {id} '{}' under {parent}", self.node(id)?.name);
        if self.running {
            self.spawn(id)?;
        }
        Ok(id)
    }

    /// Stops, joins and removes `id` and its subtree. The root cannot be
    /// removed.
    pub fn remove_child(&mut self, id: NodeId) -> Result<()> {
        if id == self.root {
            return Err(ThreadError::UnknownNode(id.0));
        }
        let subtree = self.subtree(id)?;
        for &node in &subtree {
            self.node(node)?.stop.stop();
        }
        let mut joined = Ok(());
        for &node in subtree.iter().rev() {
            let result = self.join(node);
            if joined.is_ok() {
                joined = result;
            }
        }
        let parent = self.node(id)?.parent;
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|&c| c != id);
        }
        for node in subtree {
            self.nodes[node.0] = None;
        }
        tracing::debug!("threads: removed {id}");
        joined
    }

    /// First node called `name`.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .find(|(_, n)| n.as_ref().is_some_and(|n| n.name == name))
            .map(|(i, _)| NodeId(i))
    }

    /// Node name.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).ok().map(|n| n.name.as_str())
    }

    /// Parent of `id`.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|n| n.parent)
    }

    /// Children of `id` in insertion order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |n| n.children.as_slice())
    }

    /// Frequency of `id`, inherited from the nearest ancestor that sets one.
    pub fn frequency(&self, id: NodeId) -> Option<f64> {
        let mut current = Some(id);
        while let Some(node) = current.and_then(|c| self.node(c).ok()) {
            if node.frequency.is_some() {
                return node.frequency;
            }
            current = node.parent;
        }
        None
    }

    /// Returns `true` while the thread of `id` has not returned.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.node(id)
            .ok()
            .and_then(|n| n.handle.as_ref())
            .is_some_and(|h| !h.is_finished())
    }

    /// `id` and everything below it, parents first.
    fn subtree(&self, id: NodeId) -> Result<Vec<NodeId>> {
        self.node(id)?;
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            out.push(node);
            let children = &self.node(node)?.children;
            stack.extend(children.iter().rev().copied());
        }
        Ok(out)
    }

    fn spawn(&mut self, id: NodeId) -> Result<()> {
        let node = self.node_mut(id)?;
        let Some(body) = node.body.take() else {
            return Ok(());
        };
        let stop = node.stop.clone();
        let name = node.name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(stop))
            .map_err(|e| ThreadError::spawn(name, e))?;
        self.node_mut(id)?.handle = Some(handle);
        Ok(())
    }

    fn join(&mut self, id: NodeId) -> Result<()> {
        let node = self.node_mut(id)?;
        let Some(handle) = node.handle.take() else {
            return Ok(());
        };
        let name = node.name.clone();
        handle.join().map_err(|_| ThreadError::Panicked(name))
    }

    /// Spawns every node that has not run yet, parents before children.
    ///
    /// A body runs at most once; after [`stop`](Self::stop) only nodes added
    /// since get a thread. On a spawn failure the nodes already started are
    /// stopped again.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Err(ThreadError::AlreadyRunning);
        }
        for id in self.subtree(self.root)? {
            if let Err(e) = self.spawn(id) {
                // Nodes spawned so far are joined; their error is secondary.
                let _ = self.stop_all();
                return Err(e);
            }
        }
        self.running = true;
        tracing::debug!("threads: started {} node(s)", self.len());
        Ok(())
    }

    /// Raises every stop token, then joins children before parents.
    ///
    /// Returns the first panic observed; every thread is joined regardless.
    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Err(ThreadError::NotRunning);
        }
        self.running = false;
        let result = self.stop_all();
        tracing::debug!("threads: stopped");
        result
    }

    fn stop_all(&mut self) -> Result<()> {
        let order = self.subtree(self.root)?;
        for &id in &order {
            self.node(id)?.stop.stop();
        }
        let mut joined = Ok(());
        for &id in order.iter().rev() {
            let result = self.join(id);
            if joined.is_ok() {
                joined = result;
            }
        }
        for &id in &order {
            self.node_mut(id)?.stop = StopToken::new();
        }
        joined
    }
}

impl Drop for ThreadTree {
    fn drop(&mut self) {
        if self.running
            && let Err(e) = self.stop()
        {
            tracing::warn!("threads: {e}");
        }
    }
}

impl fmt::Debug for ThreadTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadTree")
            .field("nodes", &self.len())
            .field("running", &self.running)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn spin(counter: Arc<AtomicUsize>) -> impl FnOnce(StopToken) + Send + 'static {
        move |stop| {
            counter.fetch_add(1, Ordering::SeqCst);
            while !stop.is_stopped() {
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    #[test]
    fn frequency_is_inherited() {
        let mut tree = ThreadTree::new("main", 100.0);
        let group = tree.add_child(tree.root(), ThreadSpec::group("audio")).unwrap();
        let fast = tree
            .add_child(group, ThreadSpec::group("fast").with_frequency(1000.0))
            .unwrap();
        assert_eq!(tree.frequency(group), Some(100.0));
        assert_eq!(tree.frequency(fast), Some(1000.0));
        assert_eq!(tree.find("fast"), Some(fast));
        assert_eq!(tree.parent(fast), Some(group));
    }

    #[test]
    fn start_and_stop_run_every_body_once() {
        let started = Arc::new(AtomicUsize::new(0));
        let mut tree = ThreadTree::new("main", 100.0);
        let a = tree
            .add_child(tree.root(), ThreadSpec::new("a", spin(Arc::clone(&started))))
            .unwrap();
        tree.add_child(a, ThreadSpec::new("b", spin(Arc::clone(&started))))
            .unwrap();
        tree.start().unwrap();
        assert!(matches!(tree.start(), Err(ThreadError::AlreadyRunning)));
        tree.stop().unwrap();
        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert!(!tree.is_alive(a));
    }

    #[test]
    fn child_added_while_running_starts_at_once() {
        let started = Arc::new(AtomicUsize::new(0));
        let mut tree = ThreadTree::new("main", 100.0);
        tree.start().unwrap();
        let late = tree
            .add_child(tree.root(), ThreadSpec::new("late", spin(Arc::clone(&started))))
            .unwrap();
        tree.remove_child(late).unwrap();
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(tree.find("late").is_none());
        assert!(tree.is_empty());
        tree.stop().unwrap();
    }

    #[test]
    fn removing_a_node_removes_its_subtree() {
        let mut tree = ThreadTree::new("main", 100.0);
        let a = tree.add_child(tree.root(), ThreadSpec::group("a")).unwrap();
        let b = tree.add_child(a, ThreadSpec::group("b")).unwrap();
        tree.remove_child(a).unwrap();
        assert!(tree.name(b).is_none());
        assert!(tree.children(tree.root()).is_empty());
        assert!(tree.remove_child(tree.root()).is_err());
    }
}
