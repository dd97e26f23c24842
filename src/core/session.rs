/// Dialogue session — drives a dialogue manager against a display, turning
/// key presses into choices, skips and sentence advances.

use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::core::dialogue::{DialogueError, RegionalDialogueManager};
use crate::core::macros::MacroScope;
use crate::core::modules::resolve;
use crate::core::playback::{print_tokens, AnimationPool, GridDisplay, IntercallHandler, Playback, Waiter};
use crate::schema::region::ScreenRegion;
use crate::schema::sentence::ConvField;

/// Input the session reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameKey {
    Up,
    Down,
    Confirm,
}

/// One running dialogue: the main manager, the screen it draws on, and the
/// pool of flows currently printing.
pub struct DialogueSession {
    main: Mutex<RegionalDialogueManager>,
    display: Arc<dyn GridDisplay>,
    pool: Arc<AnimationPool>,
    choice: Mutex<Option<i64>>,
    this: Weak<DialogueSession>,
}

impl std::fmt::Debug for DialogueSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogueSession")
            .field("main", &self.main)
            .field("pool", &self.pool)
            .field("choice", &self.choice)
            .finish_non_exhaustive()
    }
}

/// Starts forked flows for the inter-sentence calls of one sentence.
struct SessionIntercall {
    session: Weak<DialogueSession>,
    base: String,
}

impl IntercallHandler for SessionIntercall {
    fn call(&self, target: String, macros: Option<MacroScope>, instant: bool) -> BoxFuture<'static, ()> {
        let session = self.session.clone();
        let base = self.base.clone();
        Box::pin(async move {
            let Some(session) = session.upgrade() else {
                return;
            };
            match resolve(&base, &target) {
                Ok(target) => session.run_intercall(target, macros, instant).await,
                Err(e) => tracing::error!(sentence = %base, target = %target, error = %e, "bad inter-sentence call target"),
            }
        })
    }
}

impl DialogueSession {
    pub fn new(manager: RegionalDialogueManager, display: Arc<dyn GridDisplay>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            main: Mutex::new(manager),
            display,
            pool: Arc::new(AnimationPool::default()),
            choice: Mutex::new(None),
            this: this.clone(),
        })
    }

    pub fn current_name(&self) -> Option<String> {
        self.main.lock().current_name().map(str::to_string)
    }

    pub fn current_choice(&self) -> Option<i64> {
        *self.choice.lock()
    }

    /// Run `f` against the main manager.
    pub fn with_manager<R>(&self, f: impl FnOnce(&mut RegionalDialogueManager) -> R) -> R {
        f(&mut self.main.lock())
    }

    pub fn is_animating(&self) -> bool {
        !self.pool.is_empty()
    }

    /// Finish every interruptible animation instantly.
    pub fn skip(&self) -> usize {
        self.pool.skip_all()
    }

    pub fn interrupt_all(&self) {
        self.pool.interrupt_all();
    }

    /// Play from the current sentence until one pauses.
    pub async fn start(&self) {
        self.run_flow(&self.main, true, false, false).await;
    }

    /// Move past the current sentence and play until one pauses.
    pub async fn advance(&self) {
        *self.choice.lock() = None;
        self.run_flow(&self.main, false, false, false).await;
    }

    /// Re-render the current sentence with `choice` selected.
    pub async fn choose(&self, choice: Option<i64>) {
        *self.choice.lock() = choice;
        if let Err(e) = self.render_current(&self.main, false, choice).await {
            tracing::error!(error = %e, "failed to render choice");
        }
    }

    /// React to a key. While anything is animating, every key is a skip.
    /// Otherwise Up and Down cycle the choice and Confirm advances; the
    /// resulting playback runs as a spawned task.
    pub fn handle_key(self: &Arc<Self>, key: GameKey) -> Option<JoinHandle<()>> {
        if self.is_animating() {
            let skipped = self.skip();
            tracing::debug!(skipped, "skipping animations");
            return None;
        }
        let session = Arc::clone(self);
        match key {
            GameKey::Up | GameKey::Down => {
                let amount = self.main.lock().choice_amount();
                let choice = {
                    let mut choice = self.choice.lock();
                    let stepped = match (*choice, key) {
                        (None, _) => 0,
                        (Some(c), GameKey::Down) => c + 1,
                        (Some(c), _) => c - 1,
                    };
                    *choice = match amount {
                        Ok(Some(n)) if n > 0 => Some(stepped.rem_euclid(n)),
                        _ => None,
                    };
                    *choice
                };
                tracing::debug!(?choice, "choice changed");
                Some(tokio::spawn(async move { session.choose(choice).await }))
            }
            GameKey::Confirm => Some(tokio::spawn(async move { session.advance().await })),
        }
    }

    /// Play `target` as an independent flow forked from the main manager.
    pub async fn run_intercall(&self, target: String, macros: Option<MacroScope>, instant: bool) {
        tracing::debug!(target = %target, instant, "inter-sentence call");
        let fork = Mutex::new(self.main.lock().fork(target, macros));
        self.run_flow(&fork, true, true, instant).await;
    }

    fn clear_region(&self, region: &ScreenRegion) {
        for pos in region.cells() {
            self.display.print_cell(pos, None);
        }
    }

    /// Evaluate and print the current sentence of `manager`.
    async fn render_current(
        &self,
        manager: &Mutex<RegionalDialogueManager>,
        instant: bool,
        choice: Option<i64>,
    ) -> Result<Playback, DialogueError> {
        let (tokens, name, uninterruptable) = {
            let mut manager = manager.lock();
            if manager.current_flag(ConvField::ClearRegion)? {
                if let Some(region) = manager.current_region()? {
                    self.clear_region(&region);
                }
            }
            let uninterruptable = manager.current_flag(ConvField::Uninterruptable)?;
            let name = manager.current_name().unwrap_or_default().to_string();
            (manager.eval_sentence(choice)?, name, uninterruptable)
        };

        let waiter = Waiter::new(uninterruptable).with_intercall(Arc::new(SessionIntercall {
            session: self.this.clone(),
            base: name,
        }));
        if instant {
            waiter.skip();
        }
        let waiter = Arc::new(waiter);
        let _registered = self.pool.register(Arc::clone(&waiter));
        Ok(print_tokens(&tokens, self.display.as_ref(), &waiter).await)
    }

    /// Render sentences one after another until one pauses (unless
    /// `skip_pause`) or the graph runs out.
    async fn run_flow(&self, manager: &Mutex<RegionalDialogueManager>, first: bool, skip_pause: bool, instant: bool) {
        if !first && !step(manager) {
            return;
        }
        loop {
            if let Err(e) = self.render_current(manager, instant, None).await {
                tracing::error!(error = %e, "failed to render sentence");
            }
            let pause = manager.lock().current_flag(ConvField::PauseAfter);
            let pause = pause.unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to evaluate pause");
                true
            });
            if pause && !skip_pause {
                break;
            }
            if !step(manager) {
                return;
            }
            tokio::task::yield_now().await;
        }
    }
}

/// Advance `manager`, reporting whether there is a sentence to play.
fn step(manager: &Mutex<RegionalDialogueManager>) -> bool {
    match manager.lock().next_sentence() {
        Ok(()) => true,
        Err(DialogueError::Exhausted) => {
            tracing::debug!("dialogue flow finished");
            false
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to advance dialogue");
            false
        }
    }
}
