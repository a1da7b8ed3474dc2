//! Filepath: src/lookup.rs
//!
//! Read path: replay a chain for a single key.
//!
//! Readers never consolidate; they walk from the head and stop at the first
//! delta that decides the key:
//!
//! | Delta        | Leaf ([`PointLookup`])           | Inner ([`ChildLookup`])             |
//! |--------------|----------------------------------|-------------------------------------|
//! | insert       | same key: found                  | `[key, next_key)` covers: child     |
//! | delete       | same key: not found              | `[prev_key, next_key)` covers: prev |
//! | split        | key >= split key: redirect       | same                                |
//! | remove       | node removed                     | same                                |
//! | merge        | walk the one branch holding key  | same                                |
//! | base         | `point_search`                   | `search`                            |
//!
//! A remove delta reached through the sibling branch of a merge belongs to
//! the absorbed node and is skipped: its content now lives in this chain.

use crate::error::{NodeError, TraverseError};
use crate::node::{
    BaseNode, InnerDeleteDelta, InnerInsertDelta, LeafEntryDelta, MergeDelta, NodeRef, RemoveDelta,
    SplitDelta,
};
use crate::table::NodeId;
use crate::traverse::{ChainHandler, MergeStep, Step, traverse};

/// Outcome of a leaf point lookup.
#[derive(Debug, PartialEq, Eq)]
pub enum LookupResult<'a, V> {
    /// The key maps to this value.
    Found(&'a V),
    /// The key is absent.
    NotFound,
    /// The key moved to this sibling in a split; retry there.
    Redirect(NodeId),
    /// The node was logically removed; retry from the parent.
    Removed,
}

impl<V> Clone for LookupResult<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for LookupResult<'_, V> {}

/// Outcome of routing a key through an inner chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Descend into this child.
    Child(NodeId),
    /// The key moved to this sibling in a split; retry there.
    Redirect(NodeId),
    /// The node was logically removed; retry from the parent.
    Removed,
}

/// Choose the merge branch that holds `key`.
fn merge_branch<K: Ord, V>(key: &K, merge: &MergeDelta<K, V>) -> MergeStep {
    if key < merge.merge_key() {
        MergeStep::Local
    } else {
        MergeStep::Sibling
    }
}

// ============================================================================
//  PointLookup
// ============================================================================

/// Leaf chain handler that resolves one key.
#[derive(Debug)]
pub struct PointLookup<'a, 'k, K, V> {
    key: &'k K,
    result: Option<LookupResult<'a, V>>,
    absorbed: bool,
}

impl<'a, 'k, K: Ord, V> PointLookup<'a, 'k, K, V> {
    /// Prepare a lookup of `key`.
    #[must_use]
    pub const fn new(key: &'k K) -> Self {
        Self {
            key,
            result: None,
            absorbed: false,
        }
    }

    /// The decision, once [`traverse`] has returned.
    #[must_use]
    pub fn result(&self) -> LookupResult<'a, V> {
        self.result.unwrap_or(LookupResult::NotFound)
    }

    fn decide(&mut self, result: LookupResult<'a, V>) -> Step {
        self.result = Some(result);
        Step::Finished
    }
}

impl<'a, K: Ord, V> ChainHandler<'a, K, V> for PointLookup<'a, '_, K, V> {
    fn leaf_base(
        &mut self,
        _node: NodeRef<'a, K, V>,
        base: &'a BaseNode<K, V>,
    ) -> Result<(), TraverseError> {
        let result = match base.point_search(self.key)? {
            Some(index) => LookupResult::Found(base.value_at(index)?),
            None => LookupResult::NotFound,
        };
        self.decide(result);
        Ok(())
    }

    fn leaf_insert(
        &mut self,
        _node: NodeRef<'a, K, V>,
        delta: &'a LeafEntryDelta<K, V>,
    ) -> Result<Step, TraverseError> {
        Ok(if delta.key() == self.key {
            self.decide(LookupResult::Found(delta.value()))
        } else {
            Step::Continue
        })
    }

    fn leaf_delete(
        &mut self,
        _node: NodeRef<'a, K, V>,
        delta: &'a LeafEntryDelta<K, V>,
    ) -> Result<Step, TraverseError> {
        Ok(if delta.key() == self.key {
            self.decide(LookupResult::NotFound)
        } else {
            Step::Continue
        })
    }

    fn split(
        &mut self,
        _node: NodeRef<'a, K, V>,
        delta: &'a SplitDelta<K>,
    ) -> Result<Step, TraverseError> {
        Ok(if self.key >= delta.split_key() {
            self.decide(LookupResult::Redirect(delta.sibling_id()))
        } else {
            Step::Continue
        })
    }

    fn remove(
        &mut self,
        _node: NodeRef<'a, K, V>,
        _delta: &'a RemoveDelta,
    ) -> Result<Step, TraverseError> {
        Ok(if self.absorbed {
            Step::Continue
        } else {
            self.decide(LookupResult::Removed)
        })
    }

    fn merge_enter(
        &mut self,
        _node: NodeRef<'a, K, V>,
        delta: &'a MergeDelta<K, V>,
    ) -> Result<MergeStep, TraverseError> {
        let branch = merge_branch(self.key, delta);
        self.absorbed |= branch == MergeStep::Sibling;
        Ok(branch)
    }
}

/// Look `key` up in the leaf chain at `head`.
///
/// # Errors
/// - [`TraverseError::Unhandled`] if `head` is an inner chain
/// - [`TraverseError::Node`] if `key` lies outside the base node's range
pub fn lookup<'a, K: Ord, V>(
    head: NodeRef<'a, K, V>,
    key: &K,
) -> Result<LookupResult<'a, V>, TraverseError> {
    let mut handler = PointLookup::new(key);
    traverse(head, &mut handler)?;
    Ok(handler.result())
}

// ============================================================================
//  ChildLookup
// ============================================================================

/// Inner chain handler that routes one key to a child.
#[derive(Debug)]
pub struct ChildLookup<'k, K> {
    key: &'k K,
    route: Option<Route>,
    absorbed: bool,
}

impl<'k, K: Ord> ChildLookup<'k, K> {
    /// Prepare to route `key`.
    #[must_use]
    pub const fn new(key: &'k K) -> Self {
        Self {
            key,
            route: None,
            absorbed: false,
        }
    }

    /// The decision, once [`traverse`] has returned; `None` before that.
    #[must_use]
    pub const fn route(&self) -> Option<Route> {
        self.route
    }

    fn decide(&mut self, route: Route) -> Step {
        self.route = Some(route);
        Step::Finished
    }
}

impl<'a, K: Ord, V> ChainHandler<'a, K, V> for ChildLookup<'_, K> {
    fn inner_base(
        &mut self,
        _node: NodeRef<'a, K, V>,
        base: &'a BaseNode<K, NodeId>,
    ) -> Result<(), TraverseError> {
        let index: usize = base.search(self.key)?;
        self.decide(Route::Child(*base.value_at(index)?));
        Ok(())
    }

    fn inner_insert(
        &mut self,
        _node: NodeRef<'a, K, V>,
        delta: &'a InnerInsertDelta<K>,
    ) -> Result<Step, TraverseError> {
        let covers = delta.key() <= self.key && delta.next_key().admits_from_above(self.key);
        Ok(if covers {
            self.decide(Route::Child(delta.child()))
        } else {
            Step::Continue
        })
    }

    fn inner_delete(
        &mut self,
        _node: NodeRef<'a, K, V>,
        delta: &'a InnerDeleteDelta<K>,
    ) -> Result<Step, TraverseError> {
        let covers = delta.prev_key().admits_from_below(self.key)
            && delta.next_key().admits_from_above(self.key);
        Ok(if covers {
            self.decide(Route::Child(delta.prev_id()))
        } else {
            Step::Continue
        })
    }

    fn split(
        &mut self,
        _node: NodeRef<'a, K, V>,
        delta: &'a SplitDelta<K>,
    ) -> Result<Step, TraverseError> {
        Ok(if self.key >= delta.split_key() {
            self.decide(Route::Redirect(delta.sibling_id()))
        } else {
            Step::Continue
        })
    }

    fn remove(
        &mut self,
        _node: NodeRef<'a, K, V>,
        _delta: &'a RemoveDelta,
    ) -> Result<Step, TraverseError> {
        Ok(if self.absorbed {
            Step::Continue
        } else {
            self.decide(Route::Removed)
        })
    }

    fn merge_enter(
        &mut self,
        _node: NodeRef<'a, K, V>,
        delta: &'a MergeDelta<K, V>,
    ) -> Result<MergeStep, TraverseError> {
        let branch = merge_branch(self.key, delta);
        self.absorbed |= branch == MergeStep::Sibling;
        Ok(branch)
    }
}

/// Route `key` through the inner chain at `head`.
///
/// # Errors
/// - [`TraverseError::Unhandled`] if `head` is a leaf chain
/// - [`TraverseError::Node`] if `key` lies outside the base node's range or
///   the base node is empty
pub fn route<K: Ord, V>(head: NodeRef<'_, K, V>, key: &K) -> Result<Route, TraverseError> {
    let mut handler = ChildLookup::new(key);
    traverse(head, &mut handler)?;
    handler
        .route()
        .ok_or(TraverseError::Node(NodeError::EmptyNode))
}

// ============================================================================
//  Tests
// ============================================================================
