//! Role-generic swap core.
//!
//! All transitions, whether driven by a peer message, a chain log or a
//! deadline, go through [`Swap::dispatch`], which takes the session mutex,
//! drops anything that arrives after a terminal stage and checks the role's
//! transition table before running the handler.
//!
//! Nothing waits on the chain or the wallet while holding the session mutex.
//! Long waits run as jobs that report back through `dispatch`, and an exit
//! that cannot finish at once is driven by a settler task that re-dispatches
//! [`Event::Exit`] every poll interval.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_primitives::B256;
use swap_dleq::KeyProver;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SwapConfig;
use crate::db::{RecoveryRecord, RecoveryStore};
use crate::error::{Result, SwapError};
use crate::event::{Event, EventKind};
use crate::message::Message;
use crate::metrics::SwapMetrics;
use crate::ports::{ContractClient, SwapId, Transport, WalletClient};
use crate::role::{awaits_peer, ContractCall, Role};
use crate::session::{Job, SwapSession};
use crate::state::Stage;

/// Collaborators a session runs against.
#[derive(Clone)]
pub struct SwapContext {
    pub contract: Arc<dyn ContractClient>,
    pub wallet: Arc<dyn WalletClient>,
    pub transport: Arc<dyn Transport>,
    pub store: Arc<dyn RecoveryStore>,
    pub prover: Arc<dyn KeyProver>,
    pub metrics: Arc<dyn SwapMetrics>,
}

struct Shared {
    offer_id: B256,
    session: Mutex<SwapSession>,
    ctx: SwapContext,
    config: SwapConfig,
    cancel: CancellationToken,
    stage: watch::Sender<Stage>,
}

/// Handle to one running swap. Cloning shares the session.
pub struct Swap<R: Role> {
    shared: Arc<Shared>,
    _role: PhantomData<fn() -> R>,
}

impl<R: Role> Clone for Swap<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            _role: PhantomData,
        }
    }
}

impl<R: Role> Swap<R> {
    pub(crate) fn new(ctx: SwapContext, config: SwapConfig, session: SwapSession) -> Self {
        let (stage, _) = watch::channel(session.stage);
        Self {
            shared: Arc::new(Shared {
                offer_id: session.offer_id(),
                session: Mutex::new(session),
                ctx,
                config,
                cancel: CancellationToken::new(),
                stage,
            }),
            _role: PhantomData,
        }
    }

    pub fn offer_id(&self) -> B256 {
        self.shared.offer_id
    }

    pub fn stage(&self) -> Stage {
        *self.shared.stage.borrow()
    }

    pub async fn swap_id(&self) -> Option<SwapId> {
        self.shared.session.lock().await.swap_id()
    }

    /// Snapshot of what the recovery store holds for this swap.
    pub async fn record(&self) -> RecoveryRecord {
        self.shared.session.lock().await.record()
    }

    /// Stops timers, watchers and blocking waits. The session keeps its
    /// stage; a cancelled swap is finished through recovery.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Resolves once the session reaches a terminal stage.
    pub async fn wait_terminal(&self) -> Stage {
        let mut receiver = self.shared.stage.subscribe();
        loop {
            let stage = *receiver.borrow_and_update();
            if stage.is_terminal() {
                return stage;
            }
            if receiver.changed().await.is_err() {
                return *receiver.borrow();
            }
        }
    }

    /// Inbound protocol message from the peer.
    pub async fn handle_message(&self, message: Message) -> Result<()> {
        debug!(offer_id = %self.offer_id(), message = message.name(), "Received message");
        self.dispatch(message.into()).await
    }

    /// The peer went away. Exits if the session was still waiting on it;
    /// otherwise the chain watchers carry the swap to its end.
    pub async fn on_disconnect(&self) -> Result<()> {
        let mut session = self.lock().await;
        if !awaits_peer(R::KIND, session.stage) {
            debug!(offer_id = %self.offer_id(), stage = %session.stage, "Peer disconnected; continuing on chain events");
            return Ok(());
        }
        info!(offer_id = %self.offer_id(), stage = %session.stage, "Peer disconnected; exiting");
        self.exit_locked(&mut session).await
    }

    pub async fn exit(&self) -> Result<()> {
        self.dispatch(Event::Exit).await
    }

    pub(crate) async fn dispatch(&self, event: Event) -> Result<()> {
        let mut session = self.lock().await;
        self.dispatch_locked(&mut session, event).await
    }

    pub(crate) async fn dispatch_locked(
        &self,
        session: &mut SwapSession,
        event: Event,
    ) -> Result<()> {
        let stage = session.stage;
        let kind = event.kind();
        if stage.is_terminal() {
            debug!(offer_id = %self.offer_id(), %stage, event = ?kind, "Session finished; dropping event");
            return Ok(());
        }
        if kind == EventKind::Exit {
            return self.exit_locked(session).await;
        }
        if session.exiting && (kind.is_message() || kind == EventKind::XmrLockConfirmed) {
            debug!(offer_id = %self.offer_id(), %stage, event = ?kind, "Exiting; dropping event");
            return Ok(());
        }
        if !R::expects(stage, kind) {
            if !kind.is_message() {
                debug!(offer_id = %self.offer_id(), %stage, event = ?kind, "Ignoring stale event");
                return Ok(());
            }
            return self.fail(session, SwapError::Sequence { stage, event: kind }).await;
        }

        match R::handle(self, session, event.clone()).await {
            Ok(()) => {
                session.transient_failures = 0;
                Ok(())
            }
            Err(err) if err.is_transient() && !kind.is_message() => {
                self.defer(session, event, err).await
            }
            Err(err) if err.is_fatal() => self.fail(session, err).await,
            Err(err) => Err(err),
        }
    }

    /// Re-dispatches `event` after a backoff instead of failing the session,
    /// until the chain clock is past the role's safety deadline.
    async fn defer(&self, session: &mut SwapSession, event: Event, err: SwapError) -> Result<()> {
        let Ok((_, record)) = session.contract() else {
            return self.fail(session, err).await;
        };
        let deadline = R::safety_deadline(self.config(), &record);
        if let Ok(now) = self.ctx().contract.block_timestamp().await {
            if now >= deadline {
                return self.fail(session, err).await;
            }
        }

        session.transient_failures = session.transient_failures.saturating_add(1);
        let delay = backoff(self.config().poll_interval, session.transient_failures);
        warn!(
            offer_id = %self.offer_id(),
            event = ?event.kind(),
            failures = session.transient_failures,
            retry_in_ms = delay.as_millis() as u64,
            error = %err,
            "Transient failure; retrying"
        );
        self.retry_later(event, delay);
        Ok(())
    }

    fn retry_later(&self, event: Event, delay: Duration) {
        let swap = self.clone();
        tokio::spawn(async move {
            if pause_for(swap.cancel_token(), delay).await.is_err() {
                return;
            }
            if let Err(err) = swap.dispatch(event).await {
                error!(offer_id = %swap.offer_id(), error = %err, "Retried handler failed");
            }
        });
    }

    /// Resolves the session through exit, then reports `err`. If exit itself
    /// fails for good, reports that instead.
    pub(crate) async fn fail(&self, session: &mut SwapSession, err: SwapError) -> Result<()> {
        warn!(offer_id = %self.offer_id(), stage = %session.stage, error = %err, "Swap failed; exiting");
        self.exit_locked(session).await?;
        Err(err)
    }

    /// One attempt at driving the session to a terminal stage. The first
    /// call leaves a settler behind if the attempt did not get there.
    async fn exit_locked(&self, session: &mut SwapSession) -> Result<()> {
        if session.stage.is_terminal() {
            return Ok(());
        }
        let first = !session.exiting;
        if first {
            info!(offer_id = %self.offer_id(), stage = %session.stage, "Exiting swap");
            session.exiting = true;
        }

        match R::exit(self, session).await {
            Ok(()) => {}
            Err(err) if err.is_transient() => {
                warn!(offer_id = %self.offer_id(), stage = %session.stage, error = %err, "Exit attempt failed; retrying");
            }
            Err(err) if session.stage.is_terminal() => return Err(err),
            Err(err) => {
                error!(offer_id = %self.offer_id(), stage = %session.stage, error = %err, "Exit failed; swap needs recovery");
                self.shared.cancel.cancel();
                return Err(SwapError::NeedsRecovery(Box::new(err)));
            }
        }

        if first && !session.stage.is_terminal() {
            self.spawn_settler();
        }
        Ok(())
    }

    fn spawn_settler(&self) {
        let swap = self.clone();
        tokio::spawn(async move {
            while swap.pause().await.is_ok() {
                if let Err(err) = swap.dispatch(Event::Exit).await {
                    error!(offer_id = %swap.offer_id(), error = %err, "Settling stopped");
                    return;
                }
            }
        });
    }

    /// Runs `work` without the session lock and dispatches the event it
    /// produces. The caller marks `session.job` before spawning.
    pub(crate) fn spawn_job<F>(&self, job: Job, work: F)
    where
        F: Future<Output = Result<Event>> + Send + 'static,
    {
        let swap = self.clone();
        tokio::spawn(async move {
            let outcome = work.await;
            let mut session = swap.lock().await;
            if session.job == Some(job) {
                session.job = None;
            }
            let result = match outcome {
                Ok(event) => swap.dispatch_locked(&mut session, event).await,
                Err(SwapError::Cancelled) => Ok(()),
                Err(_) if session.stage.is_terminal() => Ok(()),
                // the contract side is settled; only recovery can retry a sweep
                Err(err) if job == Job::Sweep => {
                    swap.shared.cancel.cancel();
                    Err(SwapError::NeedsRecovery(Box::new(err)))
                }
                Err(err) => swap.fail(&mut session, err).await,
            };
            if let Err(err) = result {
                error!(offer_id = %swap.offer_id(), ?job, error = %err, "Background job failed");
            }
        });
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, SwapSession> {
        self.shared.session.lock().await
    }

    pub(crate) async fn transition(&self, session: &mut SwapSession, to: Stage) -> Result<()> {
        let from = session.stage;
        session.stage = to;
        info!(offer_id = %self.offer_id(), %from, %to, "Swap stage changed");
        self.shared.ctx.metrics.record_transition(from, to);
        self.shared.stage.send_replace(to);
        if to.is_terminal() {
            self.shared.cancel.cancel();
        }
        self.persist(session)
    }

    pub(crate) fn persist(&self, session: &SwapSession) -> Result<()> {
        self.shared
            .ctx
            .store
            .save(&session.record())
            .map_err(SwapError::Store)
    }

    pub(crate) async fn send(&self, message: Message) -> Result<()> {
        debug!(offer_id = %self.offer_id(), message = message.name(), "Sending message");
        self.shared
            .ctx
            .transport
            .send(self.offer_id(), message)
            .await?;
        Ok(())
    }

    pub(crate) fn ensure_permitted(&self, call: ContractCall) -> Result<()> {
        if R::permits(call) {
            Ok(())
        } else {
            Err(SwapError::NotPermitted(call.as_str()))
        }
    }

    pub(crate) async fn timed<T>(&self, label: &'static str, future: impl Future<Output = T>) -> T {
        let started = Instant::now();
        let output = future.await;
        self.shared.ctx.metrics.record_latency(label, started.elapsed());
        output
    }

    /// Sleeps one poll interval unless the swap is cancelled first.
    pub(crate) async fn pause(&self) -> Result<()> {
        pause_for(&self.shared.cancel, self.shared.config.poll_interval).await
    }

    pub(crate) fn ctx(&self) -> &SwapContext {
        &self.shared.ctx
    }

    pub(crate) fn config(&self) -> &SwapConfig {
        &self.shared.config
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.shared.cancel
    }
}

const MAX_BACKOFF_SHIFT: u32 = 3;

/// Poll interval doubled per consecutive failure, capped at eight times.
pub(crate) fn backoff(poll_interval: Duration, failures: u32) -> Duration {
    poll_interval * 2u32.pow(failures.min(MAX_BACKOFF_SHIFT))
}

pub(crate) async fn pause_for(cancel: &CancellationToken, delay: Duration) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(SwapError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Wallet file name for a swap-scoped wallet.
pub(crate) fn wallet_name(offer_id: &B256, purpose: &str) -> String {
    format!("swap-{}-{purpose}", hex::encode(&offer_id[..8]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_capped() {
        let poll = Duration::from_millis(100);
        assert_eq!(backoff(poll, 0), poll);
        assert_eq!(backoff(poll, 2), poll * 4);
        assert_eq!(backoff(poll, 10), poll * 8);
    }

    #[test]
    fn wallet_names_are_scoped_to_the_offer() {
        let offer = B256::repeat_byte(0xab);
        assert_eq!(wallet_name(&offer, "view"), "swap-abababababababab-view");
    }
}
