use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use empload_core::{Error as CoreError, SessionOption, SessionSetting};

use crate::error::{LoadError, StoreError};
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::store::{Connector, Session};

/// A tuned session. Hand it back through [`ConnectionManager::release`] so
/// the options it changed are restored.
pub struct SessionHandle<S> {
    session: Option<S>,
    engine: &'static str,
    /// Prior raw values, in the order the changes were applied.
    applied: Vec<(SessionOption, String)>,
    released: bool,
}

impl<S> SessionHandle<S> {
    fn new(session: S, engine: &'static str) -> Self {
        Self {
            session: Some(session),
            engine,
            applied: Vec::new(),
            released: false,
        }
    }

    /// The live session. `None` only after release.
    pub fn session(&mut self) -> Option<&mut S> {
        self.session.as_mut()
    }

    /// Options currently changed on this session.
    pub fn applied_options(&self) -> impl Iterator<Item = SessionOption> + '_ {
        self.applied.iter().map(|(option, _)| *option)
    }
}

impl<S> Drop for SessionHandle<S> {
    fn drop(&mut self) {
        if !self.released && !self.applied.is_empty() {
            warn!(
                engine = self.engine,
                options = self.applied.len(),
                "session handle dropped without release; tuning was not restored"
            );
        }
    }
}

/// Option values as first seen by this manager, and the options changed
/// since without a confirmed restore.
#[derive(Debug, Default)]
struct Baseline {
    values: Vec<(SessionOption, String)>,
    pending: Vec<SessionOption>,
}

impl Baseline {
    /// The value to restore `option` to. The first reading wins, so a
    /// session opened after a failed restore cannot adopt the tuned value.
    fn prior(&mut self, option: SessionOption, observed: String) -> String {
        if let Some((_, value)) = self.values.iter().find(|(known, _)| *known == option) {
            return value.clone();
        }
        self.values.push((option, observed.clone()));
        observed
    }

    fn mark_applied(&mut self, option: SessionOption) {
        if !self.pending.contains(&option) {
            self.pending.push(option);
        }
    }

    fn mark_restored(&mut self, option: SessionOption) {
        self.pending.retain(|pending| *pending != option);
    }
}

/// Opens tuned sessions with bounded retries and puts the tuning back on
/// release.
pub struct ConnectionManager<C> {
    connector: C,
    retry: RetryPolicy,
    tuning: Vec<SessionSetting>,
    sleeper: Arc<dyn Sleeper>,
    baseline: Mutex<Baseline>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, retry: RetryPolicy, tuning: Vec<SessionSetting>) -> Self {
        Self {
            connector,
            retry,
            tuning,
            sleeper: Arc::new(TokioSleeper),
            baseline: Mutex::new(Baseline::default()),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn engine(&self) -> &'static str {
        self.connector.engine()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// True when every option this manager changed has been put back to
    /// the value it had before the first session was tuned.
    pub fn tuning_restored(&self) -> bool {
        self.baseline().pending.is_empty()
    }

    fn baseline(&self) -> MutexGuard<'_, Baseline> {
        self.baseline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a session and apply the tuning. A failure in either step counts
    /// as one failed attempt; after the last one the error is fatal.
    pub async fn acquire(&self) -> Result<SessionHandle<C::Session>, LoadError> {
        let engine = self.connector.engine();
        let max_attempts = self.retry.attempts();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.try_acquire().await {
                Ok(handle) => {
                    if attempt > 1 {
                        info!(engine, attempt, "connected after retry");
                    } else {
                        debug!(engine, "connected");
                    }
                    return Ok(handle);
                }
                Err(err) => {
                    warn!(
                        engine,
                        attempt,
                        max_attempts,
                        error = %err,
                        "connection attempt failed"
                    );
                    last_error = err.to_string();
                    if attempt < max_attempts {
                        self.sleeper.sleep(self.retry.delay_after(attempt)).await;
                    }
                }
            }
        }

        Err(CoreError::Connection {
            attempts: max_attempts,
            message: last_error,
        }
        .into())
    }

    async fn try_acquire(&self) -> Result<SessionHandle<C::Session>, StoreError> {
        let session = self.connector.connect().await?;
        let mut handle = SessionHandle::new(session, self.connector.engine());

        if let Err(err) = self.apply_tuning(&mut handle).await {
            if let Err(revert) = self.restore(&mut handle).await {
                warn!(error = %revert, "could not revert partial tuning");
            }
            return Err(err);
        }
        Ok(handle)
    }

    async fn apply_tuning(&self, handle: &mut SessionHandle<C::Session>) -> Result<(), StoreError> {
        let engine = handle.engine;
        let Some(session) = handle.session.as_mut() else {
            return Ok(());
        };

        for setting in &self.tuning {
            let option = setting.option();
            let observed = match session.read_option(option).await {
                Ok(observed) => observed,
                Err(StoreError::Unsupported { what, .. }) => {
                    warn!(engine, setting = %setting, reason = %what, "session option skipped");
                    continue;
                }
                Err(err) => return Err(err),
            };
            let prior = self.baseline().prior(option, observed);
            match session.apply_setting(*setting).await {
                Ok(()) => {
                    debug!(engine, setting = %setting, prior = %prior, "session option applied");
                    self.baseline().mark_applied(option);
                    handle.applied.push((option, prior));
                }
                Err(StoreError::Unsupported { what, .. }) => {
                    warn!(engine, setting = %setting, reason = %what, "session option skipped");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Restore in reverse order. Every option is attempted; the first
    /// failure is reported.
    async fn restore(&self, handle: &mut SessionHandle<C::Session>) -> Result<(), StoreError> {
        let Some(session) = handle.session.as_mut() else {
            return Ok(());
        };
        let mut first_error = None;
        while let Some((option, prior)) = handle.applied.pop() {
            match session.restore_option(option, &prior).await {
                Ok(()) => {
                    debug!(option = %option, value = %prior, "session option restored");
                    self.baseline().mark_restored(option);
                }
                Err(err) => {
                    warn!(option = %option, error = %err, "session option restore failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Restore the tuning and close the session.
    pub async fn release(&self, mut handle: SessionHandle<C::Session>) -> Result<(), LoadError> {
        let restored = self.restore(&mut handle).await;
        handle.released = true;
        if let Some(session) = handle.session.take() {
            if let Err(err) = session.close().await {
                debug!(error = %err, "session close failed");
            }
        }
        restored.map_err(LoadError::Store)
    }

    /// Drop a session that is known to be broken. Restoring is still
    /// attempted, but failures are only logged. Returns whether the restore
    /// went through; options left behind stay pending until a later handle
    /// restores them.
    pub async fn discard(&self, handle: SessionHandle<C::Session>) -> bool {
        match self.release(handle).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "discarded session could not be restored");
                false
            }
        }
    }
}
