use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{bail, Result};
use futures_util::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use hyperion_core::ChainResult;

use super::{HyperionInstance, LoopKind};
use crate::loops::{
    BatchCreator, EndpointUpdater, ExternalDataRelayer, Oracle, Relayer, Signer, SkippedRecovery,
    ValsetManager,
};

/// A periodic task of an instance.
#[async_trait]
pub trait OrchestratorLoop: Send {
    fn kind(&self) -> LoopKind;

    /// Sleep between two iterations.
    fn interval(&self) -> Duration;

    /// One iteration. Errors are logged by the caller and the loop carries on
    /// at the next tick.
    async fn tick(&mut self) -> ChainResult<()>;
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Drive `task` until `cancel` fires. A panicking iteration is turned into an
/// error and the loop resumes at the next tick.
pub async fn run_loop(
    instance: Arc<HyperionInstance>,
    mut task: Box<dyn OrchestratorLoop>,
    cancel: CancellationToken,
) {
    let kind = task.kind();
    let chain = instance.chain_label();
    let state = instance.state().clone();
    info!(loop_name = kind.as_str(), "Starting loop");
    loop {
        if cancel.is_cancelled() {
            break;
        }
        state.loop_started(kind);
        instance
            .metrics()
            .loop_iterations()
            .with_label_values(&[&chain, kind.as_str()])
            .inc();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = AssertUnwindSafe(task.tick()).catch_unwind() => outcome,
        };
        let status = match outcome {
            Ok(Ok(())) => "ok".to_owned(),
            Ok(Err(err)) => {
                warn!(loop_name = kind.as_str(), ?err, "Loop iteration failed");
                err.to_string()
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref()).to_owned();
                error!(loop_name = kind.as_str(), panic = %message, "Loop iteration panicked");
                format!("panicked: {message}")
            }
        };
        if status != "ok" {
            instance
                .metrics()
                .loop_errors()
                .with_label_values(&[&chain, kind.as_str()])
                .inc();
        }
        let interval = task.interval();
        state.loop_finished(kind, status, interval);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!(loop_name = kind.as_str(), "Loop stopped");
}

/// The loops of an instance. The endpoint updater is only present when the
/// instance talks to real endpoints.
pub fn instance_loops(
    instance: &Arc<HyperionInstance>,
    updater: Option<EndpointUpdater>,
) -> Vec<Box<dyn OrchestratorLoop>> {
    let mut loops: Vec<Box<dyn OrchestratorLoop>> = vec![
        Box::new(Oracle::new(instance.clone())),
        Box::new(Signer::new(instance.clone())),
        Box::new(BatchCreator::new(instance.clone())),
        Box::new(ValsetManager::new(instance.clone())),
        Box::new(Relayer::new(instance.clone())),
        Box::new(ExternalDataRelayer::new(instance.clone())),
        Box::new(SkippedRecovery::new(instance.clone())),
    ];
    if let Some(updater) = updater {
        loops.push(Box::new(updater));
    }
    loops
}

/// Run every loop of `instance` in one group. External cancellation stops
/// all of them; a loop task that dies on its own cancels its siblings and
/// fails the group.
pub async fn run_instance(
    instance: Arc<HyperionInstance>,
    loops: Vec<Box<dyn OrchestratorLoop>>,
    cancel: CancellationToken,
) -> Result<()> {
    let group = cancel.child_token();
    let locator = instance.locator();
    let mut tasks = JoinSet::new();
    for task in loops {
        let span = info_span!("loop", name = task.kind().as_str(), chain_id = locator.chain_id);
        tasks.spawn(run_loop(instance.clone(), task, group.clone()).instrument(span));
    }
    info!(%locator, loops = tasks.len(), "Orchestrator instance started");

    let mut failure = None;
    while let Some(joined) = tasks.join_next().await {
        if group.is_cancelled() {
            continue;
        }
        let reason = match joined {
            Ok(()) => "a loop exited".to_owned(),
            Err(err) => err.to_string(),
        };
        error!(%locator, %reason, "Loop task ended unexpectedly, stopping instance");
        failure.get_or_insert(reason);
        group.cancel();
    }
    info!(%locator, "Orchestrator instance stopped");
    match failure {
        Some(reason) if !cancel.is_cancelled() => bail!("instance {locator} failed: {reason}"),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use hyperion_core::ChainCommunicationError;

    use super::*;
    use crate::test_utils::TestInstance;

    struct Flaky {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OrchestratorLoop for Flaky {
        fn kind(&self) -> LoopKind {
            LoopKind::Signer
        }

        fn interval(&self) -> Duration {
            Duration::from_secs(1)
        }

        async fn tick(&mut self) -> ChainResult<()> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => panic!("boom"),
                1 => Err(ChainCommunicationError::NoClients),
                _ => Ok(()),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panics_and_errors_do_not_stop_the_loop() {
        let instance = TestInstance::default().build();
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_instance(
            instance.clone(),
            vec![Box::new(Flaky {
                calls: calls.clone(),
            })],
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(calls.load(Ordering::SeqCst) >= 3);
        let status = instance.state().loop_status(LoopKind::Signer).unwrap();
        assert_eq!(status.status, "ok");

        cancel.cancel();
        handle.await.unwrap().unwrap();
        let errors = instance
            .metrics()
            .loop_errors()
            .with_label_values(&["97", "signer"])
            .get();
        assert_eq!(errors, 2);
    }

    #[test]
    fn extracts_panic_messages() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(1u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
