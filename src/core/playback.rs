/// Playback — timed printing of rendered tokens with skip and interrupt.
///
/// Printing suspends only at a [`Waiter`], between one token and the next.
/// A waiter races the token's post-delay against an update signal, so a skip
/// or an interrupt takes effect within one scheduler tick.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::Notify;

use crate::core::macros::MacroScope;
use crate::schema::cell::ScreenCell;
use crate::schema::geometry::Vector2D;
use crate::schema::token::{Token, TokenKind};
use crate::schema::value::StyleMap;

/// The display playback paints into. Playback never reads it back.
pub trait GridDisplay: Send + Sync {
    /// Put a cell, or blank it with `None`.
    fn print_cell(&self, pos: Vector2D, cell: Option<ScreenCell>);
    fn paint_cell(&self, pos: Vector2D, style: &StyleMap);
    /// Blank the inclusive rectangle spanned by two corners.
    fn clear_rectangle(&self, from: Vector2D, to: Vector2D);
}

/// Runs the sentence an inter-sentence call token points at.
///
/// `macros` is the macro snapshot taken where the call appeared, and
/// `instant` tells whether the calling flow is being skipped. The returned
/// future completes when the sub-flow is done.
pub trait IntercallHandler: Send + Sync {
    fn call(&self, target: String, macros: Option<MacroScope>, instant: bool) -> BoxFuture<'static, ()>;
}

/// The suspension point of one playback flow.
pub struct Waiter {
    interrupted: AtomicBool,
    instant: AtomicBool,
    uninterruptable: bool,
    update: Notify,
    intercall: Option<Arc<dyn IntercallHandler>>,
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("interrupted", &self.is_interrupted())
            .field("instant", &self.is_instant())
            .field("uninterruptable", &self.uninterruptable)
            .field("intercall", &self.intercall.is_some())
            .finish()
    }
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Waiter {
    pub fn new(uninterruptable: bool) -> Self {
        Self {
            interrupted: AtomicBool::new(false),
            instant: AtomicBool::new(false),
            uninterruptable,
            update: Notify::new(),
            intercall: None,
        }
    }

    #[must_use]
    pub fn with_intercall(mut self, handler: Arc<dyn IntercallHandler>) -> Self {
        self.intercall = Some(handler);
        self
    }

    pub fn is_uninterruptable(&self) -> bool {
        self.uninterruptable
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    pub fn is_instant(&self) -> bool {
        self.instant.load(Ordering::Acquire)
    }

    /// Finish the rest of the flow with no delays. Side effects still run.
    pub fn skip(&self) {
        self.instant.store(true, Ordering::Release);
        self.update.notify_waiters();
    }

    /// Stop the flow at its next suspension point.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.update.notify_waiters();
    }

    /// Wake a pending wait without changing any flag.
    pub fn notify(&self) {
        self.update.notify_waiters();
    }

    /// Wait out `delay` seconds after `token` was printed. Returns whether the
    /// flow should continue.
    ///
    /// An inter-sentence call token starts its sub-flow here, awaited when
    /// the call is synchronous and spawned otherwise.
    pub async fn wait(&self, delay: f64, token: Option<&Token>) -> bool {
        if self.is_interrupted() {
            return false;
        }
        if let (Some(handler), Some(token)) = (&self.intercall, token) {
            if let TokenKind::InterSentenceCall { is_sync, target } = &token.kind {
                let flow = handler.call(target.clone(), token.meta.macros.clone(), self.is_instant());
                if *is_sync {
                    flow.await;
                } else {
                    tokio::spawn(flow);
                }
            }
        }
        if self.is_instant() {
            return true;
        }
        if delay > 0.0 {
            // registered before the flags are read again, so no signal is lost
            let updated = self.update.notified();
            if self.is_interrupted() || self.is_instant() {
                return !self.is_interrupted();
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs_f64(delay)) => {}
                _ = updated => {}
            }
        }
        !self.is_interrupted()
    }
}

/// How a call to [`print_tokens`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    Completed,
    /// Stopped by an interrupt after printing the tokens before `at`.
    Interrupted { at: usize },
}

/// Print tokens in order, each immediately, then wait out its post-delay.
pub async fn print_tokens(tokens: &[Token], display: &dyn GridDisplay, waiter: &Waiter) -> Playback {
    for (i, token) in tokens.iter().enumerate() {
        if let (Some(pos), Some(cell)) = (token.pos(), ScreenCell::from_token(token)) {
            display.print_cell(pos, Some(cell));
        }
        if !waiter.wait(token.post_delay(), Some(token)).await {
            return Playback::Interrupted { at: i + 1 };
        }
    }
    Playback::Completed
}

/// Waiters of the flows currently playing, keyed by an increasing id.
#[derive(Debug, Default)]
pub struct AnimationPool {
    active: Mutex<FxHashMap<u64, Arc<Waiter>>>,
    next_id: AtomicU64,
}

/// Keeps a waiter registered in its pool until dropped.
#[derive(Debug)]
pub struct AnimationGuard {
    pool: Arc<AnimationPool>,
    id: u64,
}

impl Drop for AnimationGuard {
    fn drop(&mut self) {
        self.pool.active.lock().remove(&self.id);
    }
}

impl AnimationPool {
    pub fn register(self: &Arc<Self>, waiter: Arc<Waiter>) -> AnimationGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.active.lock().insert(id, waiter);
        AnimationGuard {
            pool: Arc::clone(self),
            id,
        }
    }

    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }

    fn waiters(&self) -> Vec<Arc<Waiter>> {
        self.active.lock().values().cloned().collect()
    }

    /// Skip every interruptible flow. Returns how many were skipped.
    pub fn skip_all(&self) -> usize {
        let mut skipped = 0;
        for waiter in self.waiters().iter().filter(|w| !w.is_uninterruptable()) {
            waiter.skip();
            skipped += 1;
        }
        skipped
    }

    /// Interrupt every flow, uninterruptable ones included.
    pub fn interrupt_all(&self) {
        for waiter in self.waiters() {
            waiter.interrupt();
        }
    }
}
