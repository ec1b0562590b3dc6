//! Bounded pool of renderer leases.
//!
//! The pool owns a fixed-capacity arena of lease slots addressed by small
//! integer handles. A slot is either vacant (no live session), idle (session
//! parked and ready), or leased (its session has been moved out into a
//! [`Lease`]). Moving the boxed session in and out of the arena makes the
//! one-borrower-per-lease rule a property of ownership, not of discipline.
//!
//! ## Waiting
//!
//! When every slot is leased, `acquire` suspends on a [`Notify`] wait queue
//! and is woken exactly when a release, close, or vacated slot frees
//! capacity — no sampling interval, no wasted wake-ups. `Notify` stores a
//! permit when nobody is waiting yet, so a release that lands between the
//! arena check and the `notified().await` is not lost. There is no fairness
//! guarantee among waiters beyond "whoever observes availability first".
//!
//! ## Self-healing
//!
//! Releasing a lease first resets its session to a blank page. A session
//! that fails the reset — or one surrendered through [`RendererPool::close`]
//! after a render failure — is destroyed and replaced under the same slot,
//! keeping pool size constant. None of this surfaces to callers; if even the
//! replacement spawn fails, the slot returns to the vacant stack and the
//! next acquire re-creates it lazily.

use crate::config::ConverterConfig;
use crate::error::PlatenError;
use crate::pipeline::render::{RenderBackend, RenderSession};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// An exclusively-held handle to one pooled renderer session.
pub struct Lease {
    slot: usize,
    session: Box<dyn RenderSession>,
}

impl Lease {
    /// The slot identifier, stable across session replacement.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// The renderer session borrowed for this conversion.
    pub fn session(&self) -> &dyn RenderSession {
        self.session.as_ref()
    }
}

/// Point-in-time pool counters, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    /// Sessions currently existing: idle plus leased out.
    pub live: usize,
    pub idle: usize,
}

enum Slot {
    Vacant,
    Idle(Box<dyn RenderSession>),
    Leased,
}

struct SlotArena {
    slots: Vec<Slot>,
    /// LIFO stack of idle slot indices — reusing the most recently released
    /// session keeps a small hot set warm.
    idle: Vec<usize>,
    /// Indices with no live session; popped for lazy creation.
    vacant: Vec<usize>,
    draining: bool,
}

impl SlotArena {
    fn pop_idle(&mut self) -> Option<(usize, Box<dyn RenderSession>)> {
        let slot = self.idle.pop()?;
        match std::mem::replace(&mut self.slots[slot], Slot::Leased) {
            Slot::Idle(session) => Some((slot, session)),
            // The idle stack only ever references Idle slots.
            _ => None,
        }
    }
}

enum Claim {
    Ready(usize, Box<dyn RenderSession>),
    Spawn(usize),
    Wait,
}

/// Bounded collection of renderer leases.
pub struct RendererPool {
    backend: Arc<dyn RenderBackend>,
    capacity: usize,
    warm_start: usize,
    acquire_timeout: Duration,
    arena: Mutex<SlotArena>,
    lease_freed: Notify,
}

impl RendererPool {
    pub fn new(backend: Arc<dyn RenderBackend>, config: &ConverterConfig) -> Self {
        let capacity = config.pool_capacity;
        Self {
            backend,
            capacity,
            warm_start: config.warm_start.min(capacity),
            acquire_timeout: Duration::from_secs(config.acquire_timeout_secs),
            arena: Mutex::new(SlotArena {
                slots: (0..capacity).map(|_| Slot::Vacant).collect(),
                idle: Vec::with_capacity(capacity),
                vacant: (0..capacity).rev().collect(),
                draining: false,
            }),
            lease_freed: Notify::new(),
        }
    }

    /// Pre-create the warm-start sessions.
    ///
    /// Non-fatal: a spawn failure is logged and warming stops, leaving the
    /// pool to create sessions lazily on demand.
    pub async fn init(&self) {
        let mut spawned = 0;
        for _ in 0..self.warm_start {
            let slot = {
                let mut arena = self.arena();
                match arena.vacant.pop() {
                    Some(slot) => {
                        arena.slots[slot] = Slot::Leased;
                        slot
                    }
                    None => break,
                }
            };
            match self.backend.spawn_session().await {
                Ok(session) => {
                    self.park(slot, session);
                    spawned += 1;
                }
                Err(err) => {
                    warn!("warm-start session failed: {err}; continuing with a colder pool");
                    self.vacate(slot);
                    break;
                }
            }
        }
        info!(
            "renderer pool ready: {spawned}/{} warm sessions, capacity {}",
            self.warm_start, self.capacity
        );
    }

    /// Borrow a lease, waiting up to the acquire timeout for capacity.
    ///
    /// Prefers the most recently released idle session; otherwise creates
    /// one lazily while capacity remains; otherwise suspends until a lease
    /// frees. The timeout bounds only the waiting — once a slot is claimed,
    /// the spawn runs to completion so the claim can be returned or vacated,
    /// never abandoned mid-flight.
    pub async fn acquire(&self) -> Result<Lease, PlatenError> {
        let deadline = Instant::now() + self.acquire_timeout;
        loop {
            let (claim, cascade) = {
                let mut arena = self.arena();
                if arena.draining {
                    return Err(PlatenError::PoolClosed);
                }
                let claim = if let Some((slot, session)) = arena.pop_idle() {
                    Claim::Ready(slot, session)
                } else if let Some(slot) = arena.vacant.pop() {
                    // Reserve the slot before the await so concurrent
                    // acquires can never overshoot capacity.
                    arena.slots[slot] = Slot::Leased;
                    Claim::Spawn(slot)
                } else {
                    Claim::Wait
                };
                let cascade = !matches!(claim, Claim::Wait)
                    && (!arena.idle.is_empty() || !arena.vacant.is_empty());
                (claim, cascade)
            };

            // A Notify holds at most one stored permit. A claimant that
            // leaves capacity behind passes the wake-up on, so a second
            // waiter is never stranded behind the permit just consumed.
            if cascade {
                self.lease_freed.notify_one();
            }

            match claim {
                Claim::Ready(slot, session) => {
                    debug!("lease {slot} acquired from idle stack");
                    return Ok(Lease { slot, session });
                }
                Claim::Spawn(slot) => match self.backend.spawn_session().await {
                    Ok(session) => {
                        debug!("lease {slot} acquired with a fresh session");
                        return Ok(Lease { slot, session });
                    }
                    Err(err) => {
                        self.vacate(slot);
                        return Err(err);
                    }
                },
                Claim::Wait => {
                    let woken =
                        tokio::time::timeout_at(deadline, self.lease_freed.notified()).await;
                    if woken.is_err() {
                        return Err(PlatenError::PoolStalled {
                            waited_secs: self.acquire_timeout.as_secs(),
                        });
                    }
                }
            }
        }
    }

    /// Return a lease after a successful conversion.
    ///
    /// The session is reset to a blank page to erase state between uses. A
    /// failed reset destroys and replaces the session under the same slot;
    /// the failure is never surfaced.
    pub async fn release(&self, lease: Lease) {
        let Lease { slot, session } = lease;
        match session.reset().await {
            Ok(()) => self.park(slot, session),
            Err(err) => {
                debug!("reset failed on lease {slot}: {err}; replacing session");
                session.close().await;
                self.replace(slot).await;
            }
        }
    }

    /// Surrender a lease after an unrecoverable render failure.
    ///
    /// The session is unconditionally destroyed and replaced — a renderer
    /// that failed mid-render is never returned for reuse.
    pub async fn close(&self, lease: Lease) {
        let Lease { slot, session } = lease;
        session.close().await;
        self.replace(slot).await;
    }

    /// Terminate every session and the backend. Invoked once at process
    /// termination; blocked acquires fail with [`PlatenError::PoolClosed`].
    pub async fn shutdown(&self) {
        let sessions = {
            let mut arena = self.arena();
            arena.draining = true;
            let mut drained = Vec::new();
            while let Some((slot, session)) = arena.pop_idle() {
                arena.slots[slot] = Slot::Vacant;
                arena.vacant.push(slot);
                drained.push(session);
            }
            drained
        };
        info!("shutting down renderer pool ({} idle sessions)", sessions.len());
        for session in sessions {
            session.close().await;
        }
        self.backend.shutdown().await;
        self.lease_freed.notify_waiters();
    }

    pub fn stats(&self) -> PoolStats {
        let arena = self.arena();
        PoolStats {
            capacity: self.capacity,
            live: self.capacity - arena.vacant.len(),
            idle: arena.idle.len(),
        }
    }

    fn arena(&self) -> MutexGuard<'_, SlotArena> {
        self.arena.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Park a session as idle and wake one waiter.
    fn park(&self, slot: usize, session: Box<dyn RenderSession>) {
        {
            let mut arena = self.arena();
            if arena.draining {
                // Shutdown already drained the arena; browser teardown reaps
                // this session.
                arena.slots[slot] = Slot::Vacant;
                arena.vacant.push(slot);
                return;
            }
            arena.slots[slot] = Slot::Idle(session);
            arena.idle.push(slot);
        }
        self.lease_freed.notify_one();
    }

    /// Return a slot to the vacant stack and wake one waiter, which may now
    /// spawn into the freed capacity.
    fn vacate(&self, slot: usize) {
        {
            let mut arena = self.arena();
            arena.slots[slot] = Slot::Vacant;
            arena.vacant.push(slot);
        }
        self.lease_freed.notify_one();
    }

    /// Spawn a replacement session into `slot`, or vacate it for lazy
    /// re-creation if the spawn fails.
    async fn replace(&self, slot: usize) {
        if self.arena().draining {
            self.vacate(slot);
            return;
        }
        match self.backend.spawn_session().await {
            Ok(fresh) => self.park(slot, fresh),
            Err(err) => {
                warn!("could not replace session for lease {slot}: {err}; slot queued for lazy re-creation");
                self.vacate(slot);
            }
        }
    }
}
