//! CAR archives and their block indexes.
//!
//! [`IndexSource`] is the entry point: it opens an archive and yields the
//! hash of every block it holds, in index order and without duplicates,
//! regenerating the index when the archive does not carry a usable one.

pub mod car;
pub mod cid;
pub mod error;
pub mod index;
pub mod source;

pub use car::{CarFormat, CarReader, CarVersion, CarWriter};
pub use crate::cid::Cid;
pub use error::{ArchiveError, Result};
pub use index::{IndexCodec, IndexEntry, SortedIndex};
pub use source::{IndexOrigin, IndexSource};
