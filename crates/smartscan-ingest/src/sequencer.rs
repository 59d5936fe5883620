// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch sequencer — the state machine that groups consecutive pages into
// documents.
//
// Pages arrive one at a time with a single-digit position.  A page whose
// position directly follows the previous one continues the open document;
// any other position closes it and starts a new one.  Documents are also
// closed when the scanner goes quiet (idle timeout) or the service stops.
//
// The state is plain data owned by the worker.  No filesystem or transport
// is involved, so every transition is unit-testable.

use std::path::PathBuf;

/// Coarse sequencer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No open document.
    Idle,
    /// A document is open and holds at least one page.
    Accumulating,
}

/// A page accepted into a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub index: u8,
    pub path: PathBuf,
}

/// The open, append-only document.
#[derive(Debug, Default)]
struct Batch {
    pages: Vec<Page>,
}

/// A closed document.  Pages are fixed at flush time and cannot be changed
/// through this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedBatch {
    /// Position of this batch among all batches flushed by this sequencer.
    number: u64,
    pages: Vec<Page>,
}

impl FlushedBatch {
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_paths(&self) -> Vec<PathBuf> {
        self.pages.iter().map(|p| p.path.clone()).collect()
    }

    pub fn indices(&self) -> Vec<u8> {
        self.pages.iter().map(|p| p.index).collect()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// What happened to a page handed to [`SequencerState::accept_page`].
#[derive(Debug, PartialEq, Eq)]
pub enum PageOutcome {
    /// No document was open; the page started one.
    Started,
    /// The page continued the open document.
    Appended,
    /// The page broke the sequence: the previous document was closed and
    /// the page started a new one.
    Split(FlushedBatch),
}

/// Sequencing state owned by the ingestion worker.
#[derive(Debug, Default)]
pub struct SequencerState {
    last_accepted_index: Option<u8>,
    batch: Option<Batch>,
    flushed: u64,
}

impl SequencerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        if self.awaiting_continuation() {
            Phase::Accumulating
        } else {
            Phase::Idle
        }
    }

    /// True iff a batch is open and non-empty.
    pub fn awaiting_continuation(&self) -> bool {
        self.batch.as_ref().is_some_and(|b| !b.pages.is_empty())
    }

    pub fn last_accepted_index(&self) -> Option<u8> {
        self.last_accepted_index
    }

    /// Pages in the open batch, oldest first.
    pub fn open_pages(&self) -> &[Page] {
        self.batch
            .as_ref()
            .map(|b| b.pages.as_slice())
            .unwrap_or_default()
    }

    /// Number of batches flushed so far.
    pub fn flushed_count(&self) -> u64 {
        self.flushed
    }

    /// Feed one readiness-confirmed page, in scan order.
    ///
    /// 9 followed by 0 is not a continuation; it starts a new document.
    pub fn accept_page(&mut self, index: u8, path: PathBuf) -> PageOutcome {
        let page = Page { index, path };

        if !self.awaiting_continuation() {
            self.batch = Some(Batch { pages: vec![page] });
            self.last_accepted_index = Some(index);
            return PageOutcome::Started;
        }

        let continues = self
            .last_accepted_index
            .and_then(|last| last.checked_add(1))
            .is_some_and(|next| next == index);

        if continues {
            if let Some(batch) = self.batch.as_mut() {
                batch.pages.push(page);
            }
            self.last_accepted_index = Some(index);
            return PageOutcome::Appended;
        }

        let closed = self.close_batch();
        self.batch = Some(Batch { pages: vec![page] });
        self.last_accepted_index = Some(index);
        match closed {
            Some(flushed) => PageOutcome::Split(flushed),
            None => PageOutcome::Started,
        }
    }

    /// The wait for the next page expired.  Closes the open document, if
    /// any; a no-op when idle.
    pub fn on_idle_timeout(&mut self) -> Option<FlushedBatch> {
        self.flush()
    }

    /// Close the open document, if any, and return to [`Phase::Idle`].
    pub fn flush(&mut self) -> Option<FlushedBatch> {
        self.close_batch()
    }

    fn close_batch(&mut self) -> Option<FlushedBatch> {
        let batch = self.batch.take()?;
        if batch.pages.is_empty() {
            return None;
        }
        self.flushed += 1;
        Some(FlushedBatch {
            number: self.flushed,
            pages: batch.pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(state: &mut SequencerState, indices: &[u8]) -> Vec<FlushedBatch> {
        let mut flushed = Vec::new();
        for &i in indices {
            if let PageOutcome::Split(b) = state.accept_page(i, PathBuf::from(format!("image_{i}.jpg"))) {
                flushed.push(b);
            }
        }
        flushed
    }

    #[test]
    fn first_page_always_starts_a_batch() {
        let mut s = SequencerState::new();
        assert_eq!(s.phase(), Phase::Idle);
        assert_eq!(s.accept_page(5, "image_5.jpg".into()), PageOutcome::Started);
        assert_eq!(s.phase(), Phase::Accumulating);
        assert_eq!(s.last_accepted_index(), Some(5));
    }

    #[test]
    fn consecutive_pages_append() {
        let mut s = SequencerState::new();
        assert!(feed(&mut s, &[0, 1, 2]).is_empty());
        let indices: Vec<u8> = s.open_pages().iter().map(|p| p.index).collect();
        assert_eq!(indices, [0, 1, 2]);
    }

    #[test]
    fn gap_closes_batch_and_opens_one_with_only_the_trigger() {
        let mut s = SequencerState::new();
        let flushed = feed(&mut s, &[0, 1, 3]);

        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].indices(), [0, 1]);
        assert_eq!(s.open_pages().len(), 1);
        assert_eq!(s.open_pages()[0].index, 3);
        assert_eq!(s.last_accepted_index(), Some(3));
    }

    #[test]
    fn repeated_or_backward_index_is_a_new_document() {
        let mut s = SequencerState::new();
        let flushed = feed(&mut s, &[2, 2, 1]);
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].indices(), [2]);
        assert_eq!(flushed[1].indices(), [2]);
        assert_eq!(s.open_pages()[0].index, 1);
    }

    #[test]
    fn nine_to_zero_is_a_new_document() {
        let mut s = SequencerState::new();
        let flushed = feed(&mut s, &[8, 9, 0]);
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].indices(), [8, 9]);
        assert_eq!(s.open_pages()[0].index, 0);
    }

    #[test]
    fn out_of_order_pass_fragments_the_document() {
        let mut s = SequencerState::new();
        let mut flushed = feed(&mut s, &[1, 0, 2]);
        flushed.extend(s.on_idle_timeout());
        let groups: Vec<Vec<u8>> = flushed.iter().map(FlushedBatch::indices).collect();
        assert_eq!(groups, [vec![1], vec![0], vec![2]]);
    }

    #[test]
    fn idle_timeout_flushes_exactly_once() {
        let mut s = SequencerState::new();
        feed(&mut s, &[0, 1, 2]);

        let batch = s.on_idle_timeout().expect("open batch is flushed");
        assert_eq!(batch.indices(), [0, 1, 2]);
        assert_eq!(batch.len(), 3);
        assert!(!batch.is_empty());
        assert_eq!(s.phase(), Phase::Idle);
        assert!(!s.awaiting_continuation());
        assert!(s.on_idle_timeout().is_none());
        assert_eq!(s.flushed_count(), 1);
    }

    #[test]
    fn idle_timeout_while_idle_is_a_noop() {
        let mut s = SequencerState::new();
        assert!(s.on_idle_timeout().is_none());
        assert_eq!(s.flushed_count(), 0);
    }

    #[test]
    fn page_after_idle_flush_starts_fresh_even_if_consecutive() {
        let mut s = SequencerState::new();
        feed(&mut s, &[0, 1]);
        s.on_idle_timeout();
        assert_eq!(s.accept_page(2, "image_2.jpg".into()), PageOutcome::Started);
        assert_eq!(s.open_pages().len(), 1);
    }

    #[test]
    fn flushed_batches_are_numbered_in_order() {
        let mut s = SequencerState::new();
        let mut flushed = feed(&mut s, &[0, 5]);
        flushed.extend(s.flush());
        let numbers: Vec<u64> = flushed.iter().map(FlushedBatch::number).collect();
        assert_eq!(numbers, [1, 2]);
    }
}
