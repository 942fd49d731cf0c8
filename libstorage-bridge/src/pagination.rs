//! List pagination.
//!
//! Page tokens are opaque random strings that map to an offset into the
//! name-sorted candidate set of a List call.  The token store is bounded:
//! once full, minting a token evicts the oldest one, and a caller presenting
//! an evicted token gets `NotFound` and has to restart its listing.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use rand::{Rng, distr::Alphanumeric};
use tracing::debug;

use crate::error::BridgeError;

const TOKEN_LEN: usize = 32;

#[derive(Debug, Default)]
struct TokenTable {
    offsets: HashMap<String, usize>,
    order: VecDeque<String>,
}

/// Shared store of live pagination tokens.
#[derive(Debug)]
pub struct PageTokenStore {
    capacity: usize,
    inner: Mutex<TokenTable>,
}

impl PageTokenStore {
    /// Create a store holding at most `capacity` tokens (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(TokenTable::default()),
        }
    }

    /// Offset recorded for `token`.
    pub fn offset(&self, token: &str) -> Option<usize> {
        self.table().offsets.get(token).copied()
    }

    /// Mint a new token resuming at `offset`.
    pub fn mint(&self, offset: usize) -> String {
        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();

        let mut table = self.table();
        while table.order.len() >= self.capacity {
            if let Some(evicted) = table.order.pop_front() {
                table.offsets.remove(&evicted);
                debug!(token = %evicted, "evicted pagination token");
            }
        }
        table.offsets.insert(token.clone(), offset);
        table.order.push_back(token.clone());
        token
    }

    /// Number of live tokens.
    pub fn len(&self) -> usize {
        self.table().offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn table(&self) -> std::sync::MutexGuard<'_, TokenTable> {
        // The table stays consistent even if a holder panicked mid-call.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Turn `(page_size, page_token)` into `(size, offset)`.
pub fn extract_pagination(
    page_size: i32,
    page_token: &str,
    store: &PageTokenStore,
) -> Result<(usize, usize), BridgeError> {
    if page_size < 0 {
        return Err(BridgeError::validation("negative page size not allowed"));
    }
    let size = page_size as usize;
    if page_token.is_empty() {
        return Ok((size, 0));
    }
    let offset = store.offset(page_token).ok_or_else(|| {
        BridgeError::not_found(format!("unable to find pagination token {page_token}"))
    })?;
    Ok((size, offset))
}

/// Clip `items` to the page `[offset, offset + size)`.
///
/// `size == 0` returns everything from `offset` and never reports more.
pub fn limit_pagination<T>(mut items: Vec<T>, offset: usize, size: usize) -> (Vec<T>, bool) {
    let start = offset.min(items.len());
    let mut page = items.split_off(start);
    if size == 0 {
        return (page, false);
    }
    let has_more = offset.saturating_add(size) < start + page.len();
    page.truncate(size);
    (page, has_more)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_size_is_invalid() {
        let store = PageTokenStore::new(8);
        assert_eq!(
            extract_pagination(-1, "", &store).unwrap_err(),
            BridgeError::Validation("negative page size not allowed".into())
        );
    }

    #[test]
    fn unknown_token_is_not_found() {
        let store = PageTokenStore::new(8);
        assert_eq!(
            extract_pagination(1, "nope", &store).unwrap_err(),
            BridgeError::NotFound("unable to find pagination token nope".into())
        );
    }

    #[test]
    fn minted_token_resolves() {
        let store = PageTokenStore::new(8);
        let token = store.mint(5);
        assert_eq!(token.len(), TOKEN_LEN);
        assert_eq!(extract_pagination(2, &token, &store).unwrap(), (2, 5));
        assert_eq!(extract_pagination(0, "", &store).unwrap(), (0, 0));
    }

    #[test]
    fn limit_slices() {
        let items: Vec<u32> = (0..5).collect();
        assert_eq!(limit_pagination(items.clone(), 0, 2), (vec![0, 1], true));
        assert_eq!(limit_pagination(items.clone(), 2, 3), (vec![2, 3, 4], false));
        assert_eq!(limit_pagination(items.clone(), 4, 3), (vec![4], false));
        assert_eq!(limit_pagination(items.clone(), 9, 3), (vec![], false));
        assert_eq!(limit_pagination(items, 1, 0), (vec![1, 2, 3, 4], false));
    }

    #[test]
    fn store_evicts_oldest() {
        let store = PageTokenStore::new(2);
        let first = store.mint(1);
        let second = store.mint(2);
        let third = store.mint(3);
        assert_eq!(store.len(), 2);
        assert!(extract_pagination(1, &first, &store).is_err());
        assert_eq!(store.offset(&second), Some(2));
        assert_eq!(store.offset(&third), Some(3));
    }
}
