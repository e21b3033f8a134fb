use log::debug;

use crate::layer::Layer;
use crate::stack::LayerStack;

/// Default number of snapshots kept when no cap is supplied by the settings
/// collaborator.
pub const DEFAULT_HISTORY_CAP: usize = 20;

/// Fully independent copy of the layer stack at capture time. No buffer is
/// shared with the live stack in either direction.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    layers: Vec<Layer>,
    active: Option<usize>,
}

impl HistoryEntry {
    fn capture(stack: &LayerStack) -> Self {
        Self {
            layers: stack.snapshot_layers(),
            active: stack.active_index(),
        }
    }

    /// Hand out a fresh deep copy for installation into the live stack, so
    /// later edits cannot reach back into the stored entry.
    fn restore(&self) -> (Vec<Layer>, Option<usize>) {
        (self.layers.clone(), self.active)
    }
}

/// Bounded linear undo/redo history of layer-stack snapshots.
///
/// The cursor points at the entry describing the state most recently pushed
/// or restored. Pushing after an undo discards everything past the cursor;
/// exceeding the cap evicts the oldest entries.
#[derive(Debug)]
pub struct HistoryManager {
    entries: Vec<HistoryEntry>,
    cursor: Option<usize>,
    cap: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

impl HistoryManager {
    /// `cap` is runtime-configurable (supplied by the application settings);
    /// values below 1 are raised to 1.
    pub fn new(cap: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: None,
            cap: cap.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.cursor, Some(c) if c > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.cursor, Some(c) if c + 1 < self.entries.len())
    }

    /// Snapshot the stack and append it at the cursor, discarding any undone
    /// future first and evicting from the oldest end past the cap.
    pub fn push(&mut self, stack: &LayerStack) {
        if let Some(cursor) = self.cursor {
            if cursor + 1 < self.entries.len() {
                debug!("discarding {} undone entries", self.entries.len() - cursor - 1);
                self.entries.truncate(cursor + 1);
            }
        } else {
            self.entries.clear();
        }

        self.entries.push(HistoryEntry::capture(stack));

        if self.entries.len() > self.cap {
            let excess = self.entries.len() - self.cap;
            self.entries.drain(..excess);
            debug!("evicted {excess} oldest history entries");
        }
        self.cursor = Some(self.entries.len() - 1);
    }

    /// Drop the entry most recently pushed. Used to roll back a snapshot
    /// taken for an operation that then failed its preconditions.
    pub(crate) fn forget_latest(&mut self) {
        if let Some(cursor) = self.cursor {
            if cursor + 1 == self.entries.len() {
                self.entries.pop();
                self.cursor = cursor.checked_sub(1);
            }
        }
    }

    /// Step back one entry and return a deep copy of it for installation;
    /// `None` at the first entry or with an empty history.
    pub fn undo(&mut self) -> Option<(Vec<Layer>, Option<usize>)> {
        let cursor = self.cursor?;
        if cursor == 0 {
            return None;
        }
        self.cursor = Some(cursor - 1);
        Some(self.entries[cursor - 1].restore())
    }

    /// Step forward one entry; `None` at the last entry.
    pub fn redo(&mut self) -> Option<(Vec<Layer>, Option<usize>)> {
        let cursor = self.cursor?;
        if cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor = Some(cursor + 1);
        Some(self.entries[cursor + 1].restore())
    }

    /// Forget everything. Used when a document is closed or replaced.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_stack(fill: [u8; 4]) -> LayerStack {
        let mut stack = LayerStack::new();
        stack.create_new_document(4, 4, fill).unwrap();
        stack
    }

    fn top_left(stack: &LayerStack) -> [u8; 4] {
        stack.layers()[0].image.as_ref().unwrap().pixel(0, 0).unwrap()
    }

    #[test]
    fn undo_redo_empty_history() {
        let mut history = HistoryManager::default();
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn undo_walks_back_through_states() {
        let mut history = HistoryManager::default();
        let mut stack = doc_stack([1, 1, 1, 255]);
        history.push(&stack);

        stack.create_new_document(4, 4, [2, 2, 2, 255]).unwrap();
        history.push(&stack);
        assert!(history.can_undo());

        let (layers, active) = history.undo().unwrap();
        stack.install(layers, active);
        assert_eq!(top_left(&stack), [1, 1, 1, 255]);
        assert!(history.can_redo());

        let (layers, active) = history.redo().unwrap();
        stack.install(layers, active);
        assert_eq!(top_left(&stack), [2, 2, 2, 255]);
        assert!(!history.can_redo());
    }

    #[test]
    fn snapshots_do_not_alias_live_stack() {
        let mut history = HistoryManager::default();
        let mut stack = doc_stack([9, 9, 9, 255]);
        history.push(&stack);

        // Mutate the live buffer after the snapshot.
        let mut layers = stack.snapshot_layers();
        layers[0]
            .image
            .as_mut()
            .unwrap()
            .set_pixel(0, 0, [0, 0, 0, 255])
            .unwrap();
        let active = stack.active_index();
        stack.install(layers, active);

        history.push(&stack);
        let (layers, active) = history.undo().unwrap();
        stack.install(layers, active);
        assert_eq!(top_left(&stack), [9, 9, 9, 255]);
    }

    #[test]
    fn restore_hands_out_fresh_copies() {
        let mut history = HistoryManager::default();
        let stack = doc_stack([5, 5, 5, 255]);
        history.push(&stack);
        let later = doc_stack([6, 6, 6, 255]);
        history.push(&later);

        // Mutate the copy handed back by undo, then fetch it again.
        let (mut layers, _) = history.undo().unwrap();
        layers[0]
            .image
            .as_mut()
            .unwrap()
            .set_pixel(0, 0, [0, 0, 0, 0])
            .unwrap();

        history.redo().unwrap();
        let (layers, _) = history.undo().unwrap();
        assert_eq!(
            layers[0].image.as_ref().unwrap().pixel(0, 0).unwrap(),
            [5, 5, 5, 255]
        );
    }

    #[test]
    fn push_after_undo_truncates_redo_future() {
        let mut history = HistoryManager::default();
        let a = doc_stack([1, 0, 0, 255]);
        let b = doc_stack([2, 0, 0, 255]);
        let c = doc_stack([3, 0, 0, 255]);
        let d = doc_stack([4, 0, 0, 255]);

        history.push(&a);
        history.push(&b);
        history.push(&c);

        history.undo().unwrap();
        history.undo().unwrap();
        assert!(!history.can_undo());

        history.push(&d);
        assert!(history.redo().is_none());
        assert!(!history.can_redo());
        assert_eq!(history.len(), 2);

        // Only A remains reachable behind D.
        let (layers, _) = history.undo().unwrap();
        assert_eq!(
            layers[0].image.as_ref().unwrap().pixel(0, 0).unwrap(),
            [1, 0, 0, 255]
        );
        assert!(history.undo().is_none());
    }

    #[test]
    fn cap_evicts_oldest_entries() {
        let cap = 5;
        let mut history = HistoryManager::new(cap);
        for i in 0..(cap + 5) {
            let stack = doc_stack([i as u8, 0, 0, 255]);
            history.push(&stack);
        }
        assert_eq!(history.len(), cap);

        let mut undos = 0;
        let mut oldest = None;
        while let Some((layers, _)) = history.undo() {
            undos += 1;
            oldest = Some(layers[0].image.as_ref().unwrap().pixel(0, 0).unwrap());
        }
        assert_eq!(undos, cap - 1);
        // The first five pushed states are unrecoverable.
        assert_eq!(oldest.unwrap(), [5, 0, 0, 255]);
    }

    #[test]
    fn cap_below_one_is_raised() {
        let mut history = HistoryManager::new(0);
        let stack = doc_stack([1, 1, 1, 255]);
        history.push(&stack);
        history.push(&stack);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn forget_latest_rolls_back_one_push() {
        let mut history = HistoryManager::default();
        let stack = doc_stack([1, 1, 1, 255]);
        history.push(&stack);
        history.push(&stack);
        history.forget_latest();
        assert_eq!(history.len(), 1);
        assert!(!history.can_undo());
        history.forget_latest();
        assert!(history.is_empty());
        assert!(history.undo().is_none());
    }

    #[test]
    fn history_symmetry() {
        let mut history = HistoryManager::default();
        let mut stack = doc_stack([7, 7, 7, 255]);
        let initial = stack.snapshot_layers();

        for i in 0..4u8 {
            history.push(&stack);
            stack.create_new_document(4, 4, [i, i, i, 255]).unwrap();
        }
        for _ in 0..4 {
            if let Some((layers, active)) = history.undo() {
                stack.install(layers, active);
            }
        }
        assert_eq!(stack.snapshot_layers(), initial);
    }

    #[test]
    fn restored_buffers_have_distinct_storage() {
        let stack = doc_stack([8, 8, 8, 255]);
        let mut history = HistoryManager::default();
        history.push(&stack);
        let later = doc_stack([0, 0, 0, 255]);
        history.push(&later);

        let live = stack.layers()[0].image.as_ref().unwrap().data().as_ptr();
        let (layers, _) = history.undo().unwrap();
        let restored = layers[0].image.as_ref().unwrap().data().as_ptr();
        assert_ne!(live, restored);
    }
}
