//! Bounded queue of in-flight batches.
//!
//! Each request remembers the ring slot whose registrar describes its
//! point layout. The slot is released exactly once, when the request
//! completes, fails or is evicted.

use std::collections::VecDeque;

use glam::Vec3;
use swell_foundation::{SamplePoint, Tick, Time};
use tracing::debug;

use crate::error::ExecutorError;
use crate::executor::{BatchExecutor, BatchPoll};
use crate::results::ResultSnapshot;
use crate::ring::SegmentRegistrarRingBuffer;

#[derive(Debug)]
enum RequestState {
    InFlight,
    Completed(Vec<Vec3>),
    Failed(String),
}

/// One submitted batch awaiting its result.
#[derive(Debug)]
pub struct PendingRequest<P> {
    pending: P,
    slot: usize,
    submitted_at: Time,
    submitted_tick: Tick,
    point_count: usize,
    state: RequestState,
}

impl<P> PendingRequest<P> {
    /// Ring slot holding this batch's registrar.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Field time the batch sampled.
    pub fn submitted_at(&self) -> Time {
        self.submitted_at
    }

    /// Tick the batch was submitted on.
    pub fn submitted_tick(&self) -> Tick {
        self.submitted_tick
    }

    /// Points uploaded in the batch.
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// True once the executor has returned a valid result.
    pub fn is_completed(&self) -> bool {
        matches!(self.state, RequestState::Completed(_))
    }
}

/// What a [`RequestQueue::poll`] pass did.
#[derive(Debug, Default)]
pub struct PollOutcome {
    /// The freshest completed batch, if any.
    pub accepted: Option<ResultSnapshot>,
    /// Requests dropped because the executor reported an error.
    pub failed: usize,
    /// Completed requests dropped because a fresher one was accepted.
    pub discarded: usize,
}

/// FIFO of in-flight batches bounded by `max_in_flight`.
#[derive(Debug)]
pub struct RequestQueue<P> {
    requests: VecDeque<PendingRequest<P>>,
    max_in_flight: usize,
}

impl<P> RequestQueue<P> {
    /// Create a queue holding at most `max_in_flight` requests.
    pub fn new(max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            requests: VecDeque::with_capacity(max_in_flight),
            max_in_flight,
        }
    }

    /// Outstanding requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// True if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Queue bound.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Outstanding requests, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &PendingRequest<P>> {
        self.requests.iter()
    }

    /// Upload `points` as a batch answering the registrar in `slot`.
    ///
    /// When the queue is full the oldest request is evicted and its slot
    /// released before the new one is appended. Returns whether an
    /// eviction happened. Nothing is queued or evicted if the upload fails.
    pub fn submit<E>(
        &mut self,
        executor: &mut E,
        points: &[SamplePoint],
        slot: usize,
        timestamp: Time,
        tick: Tick,
        ring: &mut SegmentRegistrarRingBuffer,
    ) -> Result<bool, ExecutorError>
    where
        E: BatchExecutor<Pending = P>,
    {
        let pending = executor.submit_batch(points)?;

        let mut evicted = false;
        while self.requests.len() >= self.max_in_flight {
            evicted |= self.evict_oldest(ring);
        }

        self.requests.push_back(PendingRequest {
            pending,
            slot,
            submitted_at: timestamp,
            submitted_tick: tick,
            point_count: points.len(),
            state: RequestState::InFlight,
        });
        Ok(evicted)
    }

    /// Drop the oldest request and release its slot.
    pub fn evict_oldest(&mut self, ring: &mut SegmentRegistrarRingBuffer) -> bool {
        let Some(request) = self.requests.pop_front() else {
            return false;
        };
        debug!(
            slot = request.slot,
            submitted_tick = request.submitted_tick,
            "evicting oldest in-flight request"
        );
        ring.release(request.slot);
        true
    }

    /// Poll every in-flight request, drop failures, and accept the most
    /// recently submitted completed batch.
    ///
    /// Every request up to and including the accepted one leaves the queue
    /// and releases its slot. Older completed results are discarded.
    pub fn poll<E>(&mut self, executor: &mut E, ring: &mut SegmentRegistrarRingBuffer) -> PollOutcome
    where
        E: BatchExecutor<Pending = P>,
    {
        let mut outcome = PollOutcome::default();

        for request in self.requests.iter_mut() {
            if !matches!(request.state, RequestState::InFlight) {
                continue;
            }
            request.state = match executor.poll(&mut request.pending) {
                BatchPoll::NotDone => RequestState::InFlight,
                BatchPoll::Done(values) if values.len() < request.point_count => {
                    RequestState::Failed(
                        ExecutorError::ResultLength {
                            expected: request.point_count,
                            got: values.len(),
                        }
                        .to_string(),
                    )
                }
                BatchPoll::Done(values) => RequestState::Completed(values),
                BatchPoll::Error(message) => RequestState::Failed(message),
            };
        }

        self.requests.retain(|request| {
            if let RequestState::Failed(message) = &request.state {
                debug!(slot = request.slot, error = %message, "dropping failed request");
                ring.release(request.slot);
                outcome.failed += 1;
                return false;
            }
            true
        });

        let Some(newest) = self.requests.iter().rposition(PendingRequest::is_completed) else {
            return outcome;
        };

        for (index, request) in self.requests.drain(..=newest).enumerate() {
            if index == newest {
                if let (RequestState::Completed(values), Some(registrar)) =
                    (request.state, ring.take(request.slot))
                {
                    outcome.accepted = Some(ResultSnapshot::new(
                        values,
                        registrar,
                        request.submitted_at,
                    ));
                }
            } else if request.is_completed() {
                outcome.discarded += 1;
            }
            ring.release(request.slot);
        }
        outcome
    }

    /// Drop every request without releasing slots.
    ///
    /// Only for teardown, together with
    /// [`SegmentRegistrarRingBuffer::clear_all`].
    pub fn clear(&mut self) {
        self.requests.clear();
    }
}
