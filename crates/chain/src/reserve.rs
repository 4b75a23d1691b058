//! crates/chain/src/reserve.rs
//!
//! Overflow-triggered chain growth (spec §4.B steps 1–3).

use std::sync::Arc;

use buffer::contract::Reservation;
use buffer::error::BufferError;

use crate::contract::Chainable;

/// The outcome of a successful chained reservation: which link the
/// caller's bytes landed in, and at what offset within that link.
#[derive(Debug)]
pub struct ChainReservation<B: Chainable> {
    /// The link the reservation was ultimately satisfied against.
    pub buffer: Arc<B>,
    /// Start offset within `buffer`.
    pub offset: usize,
}

/// Reserves `n` bytes starting from `head`, installing successor links
/// as needed (spec §4.B).
///
/// `make_successor(capacity)` constructs a fresh buffer of the same
/// backend kind and at least `capacity` bytes; `retire_loser(candidate)`
/// is invoked on any candidate built by a thread that lost the race to
/// install the next link, so the caller can route it through the normal
/// retire-then-reclaim path instead of leaking a registry slot.
///
/// # Errors
///
/// Propagates whatever [`BufferError`] `make_successor` returns.
pub fn reserve_with_chain<B, F, R>(
    head: &Arc<B>,
    n: usize,
    make_successor: F,
    retire_loser: R,
) -> Result<ChainReservation<B>, BufferError>
where
    B: Chainable,
    F: Fn(usize) -> Result<Arc<B>, BufferError>,
    R: Fn(&Arc<B>),
{
    let mut current = Arc::clone(head);
    loop {
        match current.reserve(n) {
            Reservation::Reserved { offset } => {
                return Ok(ChainReservation {
                    buffer: current,
                    offset,
                });
            }
            Reservation::WouldOverflow => {
                if let Some(successor) = current.next_link().get() {
                    current = Arc::clone(successor);
                    continue;
                }
                let successor_capacity = current.capacity().max(n);
                let candidate = make_successor(successor_capacity)?;
                match current.next_link().set(Arc::clone(&candidate)) {
                    Ok(()) => current = candidate,
                    Err(_) => {
                        retire_loser(&candidate);
                        let winner = current
                            .next_link()
                            .get()
                            .expect("a successor was just installed by the winning thread");
                        current = Arc::clone(winner);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::test_support::LinkBuffer;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[test]
    fn reservation_within_capacity_does_not_chain() {
        let head = LinkBuffer::new(1, 16);
        let reservation =
            reserve_with_chain(&head, 10, |cap| Ok(LinkBuffer::new(2, cap)), |_| {}).unwrap();
        assert_eq!(reservation.offset, 0);
        assert!(Arc::ptr_eq(&reservation.buffer, &head));
        assert!(head.next_link().get().is_none());
    }

    #[test]
    fn overflow_installs_one_successor() {
        let head = LinkBuffer::new(1, 8);
        let next_id = AtomicU32::new(2);
        let make_successor = |cap: usize| {
            let id = next_id.fetch_add(1, Ordering::SeqCst);
            Ok(LinkBuffer::new(id, cap))
        };

        head.reserve(8);
        let reservation = reserve_with_chain(&head, 4, make_successor, |_| {}).unwrap();
        assert_eq!(reservation.offset, 0);
        assert!(!Arc::ptr_eq(&reservation.buffer, &head));
        assert!(head.next_link().get().is_some());
        assert_eq!(reservation.buffer.capacity(), 8);
    }

    #[test]
    fn traversal_reaches_second_link_once_chained() {
        let head = LinkBuffer::new(1, 4);
        head.reserve(4);
        let reservation =
            reserve_with_chain(&head, 4, |cap| Ok(LinkBuffer::new(2, cap)), |_| {}).unwrap();
        let via_head = head.next_link().get().unwrap();
        assert!(Arc::ptr_eq(via_head, &reservation.buffer));
    }

    #[test]
    fn concurrent_overflow_installs_exactly_one_successor_and_retires_losers() {
        use std::thread;

        let head = LinkBuffer::new(1, 8);
        head.reserve(8);

        let next_id = Arc::new(AtomicU32::new(2));
        let retired: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let head = Arc::clone(&head);
            let next_id = Arc::clone(&next_id);
            let retired = Arc::clone(&retired);
            handles.push(thread::spawn(move || {
                reserve_with_chain(
                    &head,
                    2,
                    |cap| {
                        let id = next_id.fetch_add(1, Ordering::SeqCst);
                        Ok(LinkBuffer::new(id, cap))
                    },
                    |candidate| {
                        retired.lock().unwrap().push(candidate.id().into_raw());
                    },
                )
                .unwrap()
            }));
        }

        let results: Vec<ChainReservation<LinkBuffer>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let successor = head.next_link().get().unwrap();
        assert!(results
            .iter()
            .all(|r| Arc::ptr_eq(&r.buffer, successor)));

        let mut offsets: Vec<usize> = results.iter().map(|r| r.offset).collect();
        offsets.sort_unstable();
        assert_eq!(offsets, vec![0, 2, 4, 6]);

        // Exactly one candidate won; every other candidate built along
        // the way was retired, and no slot was leaked.
        assert_eq!(retired.lock().unwrap().len(), 3);
    }
}
