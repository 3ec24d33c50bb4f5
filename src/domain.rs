use crate::error::BarnError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix of entry ids minted locally before the remote store assigns one.
pub const PROVISIONAL_PREFIX: &str = "local-";

/// One of the three status shelves, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShelfStatus {
    WantToRead,
    CurrentlyReading,
    Read,
}

/// Direction of a button-driven move between neighbouring shelves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Towards `want-to-read`.
    Up,
    /// Towards `read`.
    Down,
}

/// The shelves directly above and below a given shelf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjacent {
    pub up: Option<ShelfStatus>,
    pub down: Option<ShelfStatus>,
}

impl ShelfStatus {
    pub const ALL: [ShelfStatus; 3] = [
        ShelfStatus::WantToRead,
        ShelfStatus::CurrentlyReading,
        ShelfStatus::Read,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ShelfStatus::WantToRead => "want-to-read",
            ShelfStatus::CurrentlyReading => "currently-reading",
            ShelfStatus::Read => "read",
        }
    }

    /// Position of this shelf in the fixed ordering.
    pub fn index(self) -> usize {
        match self {
            ShelfStatus::WantToRead => 0,
            ShelfStatus::CurrentlyReading => 1,
            ShelfStatus::Read => 2,
        }
    }

    /// Returns the neighbouring shelf in `direction`, or `None` at either end.
    ///
    /// There is no wraparound: `read` has nothing below it and `want-to-read`
    /// has nothing above it.
    pub fn adjacent(self, direction: Direction) -> Option<ShelfStatus> {
        let idx = self.index();
        match direction {
            Direction::Up => idx.checked_sub(1).map(|i| Self::ALL[i]),
            Direction::Down => Self::ALL.get(idx + 1).copied(),
        }
    }
}

/// Both neighbours of `status`; drives which directional buttons are offered.
pub fn adjacent_of(status: ShelfStatus) -> Adjacent {
    Adjacent {
        up: status.adjacent(Direction::Up),
        down: status.adjacent(Direction::Down),
    }
}

impl fmt::Display for ShelfStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShelfStatus {
    type Err = BarnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "want-to-read" => Ok(ShelfStatus::WantToRead),
            "currently-reading" => Ok(ShelfStatus::CurrentlyReading),
            "read" => Ok(ShelfStatus::Read),
            other => Err(BarnError::Validation(format!("unknown shelf status '{other}'"))),
        }
    }
}

/// A user's membership record for one book.
///
/// At most one entry exists per (user, book) pair; moving a book between
/// shelves changes `status` instead of creating a new entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfEntry {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    pub status: ShelfStatus,
    pub date_added: DateTime<Utc>,
    pub date_started: Option<DateTime<Utc>>,
    pub date_finished: Option<DateTime<Utc>>,
}

impl ShelfEntry {
    /// Builds a brand-new entry carrying a provisional local id.
    ///
    /// The id is replaced once the remote store confirms the insert.
    pub fn provisional(
        user_id: &str,
        book_id: &str,
        status: ShelfStatus,
        now: DateTime<Utc>,
    ) -> Self {
        let entry = ShelfEntry {
            id: format!("{PROVISIONAL_PREFIX}{}", Uuid::new_v4()),
            user_id: user_id.to_owned(),
            book_id: book_id.to_owned(),
            status: ShelfStatus::WantToRead,
            date_added: now,
            date_started: None,
            date_finished: None,
        };
        entry.with_status(status, now)
    }

    /// Returns a copy moved to `status`.
    ///
    /// `date_started` and `date_finished` are stamped only on the first
    /// transition into `currently-reading` and `read` respectively.
    pub fn with_status(&self, status: ShelfStatus, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.status = status;
        if status == ShelfStatus::CurrentlyReading && next.date_started.is_none() {
            next.date_started = Some(now);
        }
        if status == ShelfStatus::Read && next.date_finished.is_none() {
            next.date_finished = Some(now);
        }
        next
    }

    pub fn is_provisional(&self) -> bool {
        self.id.starts_with(PROVISIONAL_PREFIX)
    }
}

/// Full book details, immutable once fetched for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub book_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub thumbnail: String,
    pub page_count: u32,
    pub published_date: String,
    pub categories: Vec<String>,
    pub description: String,
}

/// A search hit, enough to render a result card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSummary {
    pub book_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub thumbnail: String,
    pub page_count: u32,
    pub published_date: String,
}

impl From<&BookMetadata> for BookSummary {
    fn from(meta: &BookMetadata) -> Self {
        BookSummary {
            book_id: meta.book_id.clone(),
            title: meta.title.clone(),
            authors: meta.authors.clone(),
            thumbnail: meta.thumbnail.clone(),
            page_count: meta.page_count,
            published_date: meta.published_date.clone(),
        }
    }
}
