// tests/supervisor_runtime.rs

mod common;
use crate::common::{TestResult, init_tracing, unused_local_addr, with_timeout};

use std::time::Duration;

use devloop::broadcast::{Broadcaster, Listener};
use devloop::connect::RetryPolicy;
use devloop::errors::{DevloopError, Result};
use devloop::supervisor::{BuildOutcome, CommandTemplate, Supervisor, SupervisorOptions};
use devloop::types::UpstreamAddr;
use devloop::watch::FsEventBatch;
use devloop_test_utils::{BackendCall, CallLog, FakeBackend};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

struct Harness {
    upstream: UpstreamAddr,
    calls: CallLog,
    reload: Broadcaster<FsEventBatch>,
    triggers: Option<mpsc::Sender<()>>,
    shutdown: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl Harness {
    fn start(configure: impl FnOnce(FakeBackend) -> FakeBackend, stop_grace: Duration) -> Self {
        let addr = unused_local_addr();
        let upstream = UpstreamAddr::new(addr.ip().to_string(), addr.port());

        let calls = CallLog::new();
        let backend = configure(FakeBackend::new(calls.clone()));
        let reload = Broadcaster::new();
        let (tx, rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        let options = SupervisorOptions {
            stop_grace,
            retry: RetryPolicy {
                attempts: 30,
                initial_delay: Duration::from_millis(10),
            },
        };

        let supervisor = Supervisor::new(
            backend,
            CommandTemplate::parse("fake-server {}").expect("valid template"),
            upstream.clone(),
            options,
            reload.clone(),
            rx,
            shutdown.clone(),
        );

        Self {
            upstream,
            calls,
            reload,
            triggers: Some(tx),
            shutdown,
            task: tokio::spawn(supervisor.run()),
        }
    }

    fn listen(&self) -> Listener<FsEventBatch> {
        let (listener, handle) = self.reload.register();
        // Keep the registration for the lifetime of the test.
        std::mem::forget(handle);
        listener
    }

    async fn trigger(&self) {
        self.triggers
            .as_ref()
            .expect("triggers still open")
            .send(())
            .await
            .expect("supervisor receives triggers");
    }

    async fn wait_for(&self, what: &str, cond: impl Fn(&CallLog) -> bool) {
        let calls = &self.calls;
        timeout(Duration::from_secs(5), async {
            while !cond(calls) {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}; calls: {:?}", calls.snapshot()));
    }

    async fn shutdown(self) -> Result<()> {
        self.shutdown.cancel();
        with_timeout(self.task)
            .await
            .expect("supervisor task does not panic")
    }
}

fn launch_of(upstream: &UpstreamAddr) -> BackendCall {
    BackendCall::Launch(vec!["fake-server".to_string(), upstream.to_string()])
}

#[tokio::test]
async fn restart_cycle_notifies_after_new_server_is_up() -> TestResult {
    init_tracing();

    let h = Harness::start(|b| b, Duration::from_secs(1));
    let mut browser = h.listen();

    h.wait_for("first launch", |c| c.launches() == 1).await;

    // The first start is not announced.
    assert!(timeout(Duration::from_millis(100), browser.recv()).await.is_err());

    h.trigger().await;
    let batch = with_timeout(browser.recv()).await.ok_or("reload stream ended")?;
    assert!(batch.is_empty());

    let launch = launch_of(&h.upstream);
    assert_eq!(
        h.calls.snapshot(),
        vec![
            BackendCall::Build,
            launch.clone(),
            BackendCall::Build,
            BackendCall::Stop(1001),
            launch,
        ]
    );

    h.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn shutdown_stops_the_running_server() -> TestResult {
    init_tracing();

    let h = Harness::start(|b| b, Duration::from_secs(1));
    h.wait_for("first launch", |c| c.launches() == 1).await;

    let calls = h.calls.clone();
    h.shutdown().await?;

    assert_eq!(calls.snapshot().last(), Some(&BackendCall::Stop(1001)));
    Ok(())
}

#[tokio::test]
async fn failed_first_build_is_fatal() -> TestResult {
    init_tracing();

    let h = Harness::start(
        |b| b.with_builds([BuildOutcome::Failed(Some(2))]),
        Duration::from_secs(1),
    );

    let res = with_timeout(h.task).await?;
    assert!(matches!(res, Err(DevloopError::InitialBuildFailed)));
    assert_eq!(h.calls.launches(), 0);
    Ok(())
}

#[tokio::test]
async fn failed_rebuild_keeps_old_server_and_stays_quiet() -> TestResult {
    init_tracing();

    let h = Harness::start(
        |b| b.with_builds([BuildOutcome::Success, BuildOutcome::Failed(Some(1))]),
        Duration::from_secs(1),
    );
    let mut browser = h.listen();
    h.wait_for("first launch", |c| c.launches() == 1).await;

    h.trigger().await;
    h.wait_for("failed rebuild", |c| c.builds() == 2).await;

    // The old server keeps answering.
    with_timeout(TcpStream::connect(h.upstream.to_string())).await?;

    // A later, successful rebuild goes through the whole cycle.
    h.trigger().await;
    with_timeout(browser.recv()).await.ok_or("reload stream ended")?;

    let launch = launch_of(&h.upstream);
    assert_eq!(
        h.calls.snapshot(),
        vec![
            BackendCall::Build,
            launch.clone(),
            BackendCall::Build,
            BackendCall::Build,
            BackendCall::Stop(1001),
            launch,
        ]
    );

    // Exactly one notification: the failed build produced none.
    assert!(timeout(Duration::from_millis(100), browser.recv()).await.is_err());

    h.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn notification_waits_for_a_slow_server() -> TestResult {
    init_tracing();

    let h = Harness::start(
        |b| b.with_bind_delay(Duration::from_millis(150)),
        Duration::from_secs(1),
    );
    let mut browser = h.listen();
    h.wait_for("first launch", |c| c.launches() == 1).await;

    h.trigger().await;
    with_timeout(browser.recv()).await.ok_or("reload stream ended")?;

    // By the time browsers hear about it, the new server accepts connections.
    with_timeout(TcpStream::connect(h.upstream.to_string())).await?;

    h.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn stop_timeout_abandons_the_old_server() -> TestResult {
    init_tracing();

    let h = Harness::start(
        |b| {
            b.ignoring_stop()
                .with_bind_delay(Duration::from_millis(50))
        },
        Duration::from_millis(100),
    );
    let mut browser = h.listen();
    h.wait_for("first launch", |c| c.launches() == 1).await;

    h.trigger().await;
    with_timeout(browser.recv()).await.ok_or("reload stream ended")?;

    assert_eq!(h.calls.stops(), 1);
    assert_eq!(h.calls.launches(), 2);

    h.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn closed_trigger_channel_keeps_server_running() -> TestResult {
    init_tracing();

    let mut h = Harness::start(|b| b, Duration::from_secs(1));
    h.wait_for("first launch", |c| c.launches() == 1).await;

    drop(h.triggers.take());
    sleep(Duration::from_millis(100)).await;

    assert!(!h.task.is_finished());
    assert_eq!(h.calls.stops(), 0);

    h.shutdown().await?;
    Ok(())
}
