//! Cursor pagination over the repository's offset/limit `list`.
//!
//! A cursor is the decimal offset of the first item on the page. Each page
//! fetches one extra row to learn whether another page exists, so callers
//! never need a second round-trip.

use crate::error::{RepositoryError, RepositoryResult};
use crate::lamp::LampEntity;
use crate::repository::LampRepository;


pub const DEFAULT_PAGE_SIZE: i64 = 25;
pub const MIN_PAGE_SIZE: i64 = 1;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Validated pagination input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: i64,
    pub limit: i64,
}

/// One page of lamps in listing order
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<LampEntity>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

impl PageRequest {
    /// Validate a raw cursor and page size.
    ///
    /// Rejects malformed cursors and page sizes outside `[1, 100]` with
    /// `InvalidArgument`; a missing page size means 25.
    pub fn parse(cursor: Option<&str>, page_size: Option<i64>) -> RepositoryResult<Self> {
        let offset = decode_cursor(cursor)?;
        let limit = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(RepositoryError::InvalidArgument(format!(
                "pageSize must be between {} and {}, got {}",
                MIN_PAGE_SIZE, MAX_PAGE_SIZE, limit
            )));
        }
        Ok(Self { offset, limit })
    }
}

/// Decode a cursor into an offset. Absent or empty means the first page.
pub fn decode_cursor(cursor: Option<&str>) -> RepositoryResult<i64> {
    let Some(cursor) = cursor.filter(|c| !c.is_empty()) else {
        return Ok(0);
    };

    if !cursor.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid_cursor(cursor));
    }
    cursor.parse::<i64>().map_err(|_| invalid_cursor(cursor))
}

pub fn encode_cursor(offset: i64) -> String {
    offset.to_string()
}

fn invalid_cursor(cursor: &str) -> RepositoryError {
    RepositoryError::InvalidArgument(format!(
        "cursor must be a non-negative integer offset, got {:?}",
        cursor
    ))
}

/// Fetch one page, looking one row ahead to decide `has_more`.
pub async fn fetch_page(
    repo: &dyn LampRepository,
    request: PageRequest,
) -> RepositoryResult<Page> {
    let mut items = repo
        .list(request.offset, request.limit.saturating_add(1))
        .await?;

    let limit = usize::try_from(request.limit).unwrap_or(usize::MAX);
    let has_more = items.len() > limit;
    if has_more {
        items.truncate(limit);
    }

    let next_cursor =
        has_more.then(|| encode_cursor(request.offset.saturating_add(request.limit)));

    Ok(Page {
        items,
        next_cursor,
        has_more,
    })
}
