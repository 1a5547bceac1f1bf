//! Deferred discrete actions.
//!
//! Input is sampled at frame rate while the controller runs at a fixed rate.
//! Requests made between two ticks are collected in an [`ActionQueue`] and
//! executed once by the next tick, however many frames (and requests) came
//! in between.

use bevy::prelude::*;

/// The discrete actions a character can request.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Ground, air or wall jump depending on contact state.
    Jump,
    /// Start a ground slam.
    Slam,
    /// Slide for at least the next tick.
    SlideStart,
}

impl ActionKind {
    /// Number of distinct action kinds.
    pub const COUNT: usize = 3;

    /// All kinds, in declaration order.
    pub const ALL: [ActionKind; Self::COUNT] =
        [ActionKind::Jump, ActionKind::Slam, ActionKind::SlideStart];
}

/// Pending actions for the next fixed tick.
///
/// Holds at most one request per [`ActionKind`]. Requests are executed in
/// the order they were first made.
///
/// # Example
///
/// ```rust
/// use msg_locomotion::prelude::*;
///
/// let mut queue = ActionQueue::default();
/// assert!(queue.request(ActionKind::Slam));
/// assert!(queue.request(ActionKind::Jump));
/// assert!(!queue.request(ActionKind::Slam));
///
/// assert_eq!(queue.drain(), vec![ActionKind::Slam, ActionKind::Jump]);
/// assert!(queue.is_empty());
/// ```
#[derive(Component, Reflect, Debug, Clone, Default, PartialEq)]
#[reflect(Component)]
pub struct ActionQueue {
    slots: [Option<ActionKind>; ActionKind::COUNT],
    len: usize,
}

impl ActionQueue {
    /// Queue `kind` for the next tick.
    ///
    /// Returns `false` if `kind` was already pending; the queue is unchanged.
    pub fn request(&mut self, kind: ActionKind) -> bool {
        if self.contains(kind) {
            return false;
        }
        // Every kind fits: a kind occupies at most one slot.
        self.slots[self.len] = Some(kind);
        self.len += 1;
        true
    }

    /// Whether `kind` is pending.
    pub fn contains(&self, kind: ActionKind) -> bool {
        self.slots[..self.len].contains(&Some(kind))
    }

    /// Number of pending actions.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pending actions in request order, without removing them.
    pub fn pending(&self) -> impl Iterator<Item = ActionKind> + '_ {
        self.slots[..self.len].iter().flatten().copied()
    }

    /// Remove and return all pending actions in request order.
    pub fn drain(&mut self) -> Vec<ActionKind> {
        let drained = self.pending().collect();
        self.clear();
        drained
    }

    /// Drop all pending actions.
    pub fn clear(&mut self) {
        self.slots = [None; ActionKind::COUNT];
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_requests_collapse() {
        let mut queue = ActionQueue::default();

        assert!(queue.request(ActionKind::Jump));
        assert!(!queue.request(ActionKind::Jump));
        assert!(!queue.request(ActionKind::Jump));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain(), vec![ActionKind::Jump]);
    }

    #[test]
    fn drain_preserves_request_order() {
        let mut queue = ActionQueue::default();
        queue.request(ActionKind::SlideStart);
        queue.request(ActionKind::Jump);
        queue.request(ActionKind::Slam);
        queue.request(ActionKind::SlideStart);

        assert_eq!(
            queue.drain(),
            vec![ActionKind::SlideStart, ActionKind::Jump, ActionKind::Slam]
        );
    }

    #[test]
    fn drain_empties_queue() {
        let mut queue = ActionQueue::default();
        for kind in ActionKind::ALL {
            queue.request(kind);
        }
        assert_eq!(queue.len(), ActionKind::COUNT);

        let _ = queue.drain();
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());

        // Requests are accepted again after draining.
        assert!(queue.request(ActionKind::Jump));
    }

    #[test]
    fn contains_reports_pending_only() {
        let mut queue = ActionQueue::default();
        queue.request(ActionKind::Slam);

        assert!(queue.contains(ActionKind::Slam));
        assert!(!queue.contains(ActionKind::Jump));

        queue.clear();
        assert!(!queue.contains(ActionKind::Slam));
    }
}
