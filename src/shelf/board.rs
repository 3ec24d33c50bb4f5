use crate::domain::{ShelfEntry, ShelfStatus};
use crate::error::{BarnError, BarnResult};

pub(crate) fn not_shelved(entry_id: &str) -> BarnError {
    BarnError::Validation(format!("entry {entry_id} is not on any shelf"))
}

/// The three ordered shelves for one user.
///
/// Order within a shelf is presentation-only and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShelfBoard {
    shelves: [Vec<ShelfEntry>; 3],
}

impl ShelfBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups entries by status, keeping their relative order.
    pub fn from_entries(entries: impl IntoIterator<Item = ShelfEntry>) -> Self {
        let mut board = Self::new();
        for entry in entries {
            board.push(entry);
        }
        board
    }

    pub fn shelf(&self, status: ShelfStatus) -> &[ShelfEntry] {
        &self.shelves[status.index()]
    }

    /// Entry ids on `status`, in display order.
    pub fn ids(&self, status: ShelfStatus) -> Vec<&str> {
        self.shelf(status).iter().map(|e| e.id.as_str()).collect()
    }

    pub fn count(&self, status: ShelfStatus) -> usize {
        self.shelf(status).len()
    }

    pub fn len(&self) -> usize {
        self.shelves.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shelf and index of the entry with `entry_id`.
    pub fn locate(&self, entry_id: &str) -> Option<(ShelfStatus, usize)> {
        ShelfStatus::ALL.into_iter().find_map(|status| {
            self.shelf(status)
                .iter()
                .position(|e| e.id == entry_id)
                .map(|idx| (status, idx))
        })
    }

    pub fn get(&self, entry_id: &str) -> Option<&ShelfEntry> {
        let (status, idx) = self.locate(entry_id)?;
        self.shelf(status).get(idx)
    }

    pub fn find_book(&self, book_id: &str) -> Option<&ShelfEntry> {
        self.shelves.iter().flatten().find(|e| e.book_id == book_id)
    }

    /// Appends `entry` to the shelf named by its status.
    pub fn push(&mut self, entry: ShelfEntry) {
        self.shelves[entry.status.index()].push(entry);
    }

    /// Inserts `entry` at `index` on its status shelf, clamped to the shelf length.
    pub fn insert_at(&mut self, entry: ShelfEntry, index: usize) {
        let shelf = &mut self.shelves[entry.status.index()];
        let index = index.min(shelf.len());
        shelf.insert(index, entry);
    }

    /// Removes the entry with `entry_id`, returning it with its former index.
    pub fn take(&mut self, entry_id: &str) -> Option<(ShelfEntry, usize)> {
        let (status, idx) = self.locate(entry_id)?;
        Some((self.shelves[status.index()].remove(idx), idx))
    }

    /// Removes whatever entry holds `book_id`.
    pub fn take_book(&mut self, book_id: &str) -> Option<ShelfEntry> {
        let id = self.find_book(book_id)?.id.clone();
        self.take(&id).map(|(entry, _)| entry)
    }

    /// Swaps a provisional id for the one the store assigned.
    pub fn rename(&mut self, old_id: &str, new_id: &str) -> bool {
        match self.shelves.iter_mut().flatten().find(|e| e.id == old_id) {
            Some(entry) => {
                entry.id = new_id.to_owned();
                true
            }
            None => false,
        }
    }

    /// Moves the entry at `from` to `to` within one shelf.
    ///
    /// # Errors
    /// [`BarnError::Validation`] if either index is out of range.
    pub fn reorder(&mut self, status: ShelfStatus, from: usize, to: usize) -> BarnResult<()> {
        let shelf = &mut self.shelves[status.index()];
        if from >= shelf.len() || to >= shelf.len() {
            return Err(BarnError::Validation(format!(
                "reorder {from} -> {to} out of range for {status} ({} entries)",
                shelf.len()
            )));
        }
        if from != to {
            let entry = shelf.remove(from);
            shelf.insert(to, entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(id: &str, status: ShelfStatus) -> ShelfEntry {
        let mut entry = ShelfEntry::provisional("u1", &format!("book-{id}"), status, Utc::now());
        entry.id = id.to_owned();
        entry
    }

    fn board() -> ShelfBoard {
        ShelfBoard::from_entries([
            entry("a", ShelfStatus::WantToRead),
            entry("b", ShelfStatus::WantToRead),
            entry("c", ShelfStatus::WantToRead),
            entry("d", ShelfStatus::Read),
        ])
    }

    #[test]
    fn reorder_moves_within_one_shelf() {
        let mut board = board();
        board.reorder(ShelfStatus::WantToRead, 0, 2).unwrap();
        assert_eq!(board.ids(ShelfStatus::WantToRead), vec!["b", "c", "a"]);
        assert_eq!(board.count(ShelfStatus::Read), 1);
    }

    #[test]
    fn reorder_rejects_out_of_range() {
        let mut board = board();
        let before = board.clone();
        let err = board.reorder(ShelfStatus::Read, 0, 1).unwrap_err();
        assert!(matches!(err, BarnError::Validation(_)));
        assert_eq!(board, before);
    }

    #[test]
    fn take_reports_former_position() {
        let mut board = board();
        let (taken, idx) = board.take("b").unwrap();
        assert_eq!(taken.id, "b");
        assert_eq!(idx, 1);
        assert_eq!(board.locate("c"), Some((ShelfStatus::WantToRead, 1)));
        assert!(board.take("b").is_none());
    }

    #[test]
    fn insert_at_clamps() {
        let mut board = board();
        board.insert_at(entry("z", ShelfStatus::Read), 10);
        assert_eq!(board.ids(ShelfStatus::Read), vec!["d", "z"]);
    }
}
