//! crates/chain/src/iter.rs
//!
//! Traversal from a chain head (spec §4.B: "Traversal from a chain head
//! yields a logically concatenated byte stream").

use std::sync::Arc;

use crate::contract::Chainable;

/// Walks a chain from `head` to its last installed link, inclusive.
pub struct ChainIter<B: Chainable> {
    next: Option<Arc<B>>,
}

impl<B: Chainable> Iterator for ChainIter<B> {
    type Item = Arc<B>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.next_link().get().cloned();
        Some(current)
    }
}

/// Builds an iterator over every link of the chain starting at `head`.
#[must_use]
pub fn chain_links<B: Chainable>(head: Arc<B>) -> ChainIter<B> {
    ChainIter { next: Some(head) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::test_support::LinkBuffer;
    use crate::reserve::reserve_with_chain;

    #[test]
    fn single_buffer_chain_has_one_link() {
        let head = LinkBuffer::new(1, 8);
        let links: Vec<_> = chain_links(head).collect();
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn chained_buffers_traverse_in_link_order() {
        let head = LinkBuffer::new(1, 8);
        head.reserve(8);
        let reservation =
            reserve_with_chain(&head, 4, |cap| Ok(LinkBuffer::new(2, cap)), |_| {}).unwrap();

        let links: Vec<_> = chain_links(head).collect();
        assert_eq!(links.len(), 2);
        assert_eq!(links[1].id().into_raw(), reservation.buffer.id().into_raw());
    }
}
