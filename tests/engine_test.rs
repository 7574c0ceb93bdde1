//! Integration tests for the concurrent execution engine.
//!
//! These run on the default current-thread test runtime, so spawned tasks
//! only make progress at await points. Tests lean on that to arrange
//! deterministic queue-full and in-flight conditions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use agentflow::engine::{Engine, EngineConfig};
use agentflow::error::{Error, Result};
use agentflow::llm::Invoker;
use agentflow::llm::passthrough::Passthrough;
use agentflow::model::{Lifecycle, Message, Role};
use async_trait::async_trait;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_millis(50);
const WAIT: Duration = Duration::from_secs(1);

fn echo_engine(config: EngineConfig) -> (Engine, CancellationToken) {
    let cancel = CancellationToken::new();
    let engine = Engine::start(Arc::new(Passthrough::new("echo")), config, cancel.clone());
    (engine, cancel)
}

/// Always fails with the same cause text.
struct Failing;

#[async_trait]
impl Invoker for Failing {
    async fn invoke(&self, _cancel: &CancellationToken, _request: Message) -> Result<Message> {
        Err(Error::Invocation("deterministic failure".to_string()))
    }
}

/// Echoes after a delay, counting how many times it was invoked.
struct Counting {
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

#[async_trait]
impl Invoker for Counting {
    async fn invoke(&self, _cancel: &CancellationToken, request: Message) -> Result<Message> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Message::assistant(request.content))
    }
}

/// Never answers; returns an abandonment error once cancelled.
struct Hanging;

#[async_trait]
impl Invoker for Hanging {
    async fn invoke(&self, cancel: &CancellationToken, _request: Message) -> Result<Message> {
        cancel.cancelled().await;
        Err(Error::Abandoned)
    }
}

// ---------------------------------------------------------------------------
// Basic round trips
// ---------------------------------------------------------------------------

#[tokio::test]
async fn echo_round_trip() {
    let (mut engine, _cancel) = echo_engine(EngineConfig::default());
    let mut responses = engine.responses().expect("fresh engine");

    engine.submit("hello").unwrap();

    let reply = timeout(WAIT, responses.recv())
        .await
        .expect("timed out waiting for response")
        .expect("stream ended early");
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.content, "hello");
}

#[tokio::test]
async fn invocation_error_surfaces_on_error_stream() {
    let cancel = CancellationToken::new();
    let mut engine = Engine::start(Arc::new(Failing), EngineConfig::default(), cancel);
    let mut errors = engine.errors().expect("fresh engine");

    engine.submit("doomed").unwrap();

    let err = timeout(WAIT, errors.recv())
        .await
        .expect("timed out waiting for error")
        .expect("stream ended early");
    match err {
        Error::Invocation(cause) => assert!(cause.contains("deterministic failure")),
        other => panic!("expected Invocation, got {other:?}"),
    }
}

#[tokio::test]
async fn each_admitted_item_is_invoked_exactly_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let invoker = Counting {
        calls: Arc::clone(&calls),
        delay: Duration::ZERO,
    };
    let cancel = CancellationToken::new();
    let mut engine = Engine::start(Arc::new(invoker), EngineConfig::default(), cancel);
    let mut responses = engine.responses().expect("fresh engine");

    const COUNT: usize = 20;
    for i in 0..COUNT {
        engine.submit(format!("item {i}")).unwrap();
    }

    for _ in 0..COUNT {
        timeout(WAIT, responses.recv())
            .await
            .expect("timed out")
            .expect("stream ended early");
    }

    assert_eq!(calls.load(Ordering::SeqCst), COUNT);
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_queue_rejects_immediately() {
    // No await between submits, so the dispatch loop never runs and the
    // two-slot queue stays full.
    let (engine, _cancel) = echo_engine(EngineConfig {
        request_capacity: 2,
        ..EngineConfig::default()
    });

    engine.submit("one").unwrap();
    engine.submit("two").unwrap();
    assert!(matches!(engine.submit("three"), Err(Error::QueueFull)));
}

#[tokio::test]
async fn admission_never_blocks_under_churn() {
    let (engine, _cancel) = echo_engine(EngineConfig {
        request_capacity: 10,
        ..EngineConfig::default()
    });

    // Every submit resolves to Ok or QueueFull; none may hang.
    let flood = async {
        for i in 0..1000 {
            match engine.submit(format!("msg {i}")) {
                Ok(()) | Err(Error::QueueFull) => {}
                Err(other) => panic!("unexpected rejection: {other:?}"),
            }
            if i % 100 == 0 {
                tokio::task::yield_now().await;
            }
        }
    };
    timeout(WAIT, flood).await.expect("submit blocked");
}

#[tokio::test]
async fn no_admission_after_close() {
    let calls = Arc::new(AtomicUsize::new(0));
    let invoker = Counting {
        calls: Arc::clone(&calls),
        delay: Duration::ZERO,
    };
    let cancel = CancellationToken::new();
    let engine = Engine::start(Arc::new(invoker), EngineConfig::default(), cancel);

    engine.shutdown().await;

    assert!(matches!(engine.submit("too late"), Err(Error::Closed)));
    tokio::time::sleep(TICK).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0, "item invoked after close");
}

// ---------------------------------------------------------------------------
// Overload: best-effort delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overload_diverts_excess_to_error_stream() {
    let cancel = CancellationToken::new();
    let invoker = Passthrough::new("echo").with_delay(TICK);
    let mut engine = Engine::start(
        Arc::new(invoker),
        EngineConfig {
            response_capacity: 10,
            ..EngineConfig::default()
        },
        cancel,
    );
    let mut responses = engine.responses().expect("fresh engine");
    let mut errors = engine.errors().expect("fresh engine");

    const SUBMITTED: usize = 15;
    for i in 0..SUBMITTED {
        engine.submit(format!("burst {i}")).unwrap();
    }

    // Let every in-flight execution finish its delivery attempt while
    // nothing drains the streams, then close.
    tokio::time::sleep(TICK * 4).await;
    engine.shutdown().await;

    let mut delivered = 0;
    while timeout(WAIT, responses.recv()).await.expect("hung").is_some() {
        delivered += 1;
    }
    let mut contended = 0;
    while let Some(err) = timeout(WAIT, errors.recv()).await.expect("hung") {
        assert!(matches!(err, Error::DeliveryContended));
        contended += 1;
    }

    assert_eq!(delivered, 10, "response stream holds its capacity");
    assert_eq!(contended, SUBMITTED - 10);
}

#[tokio::test]
async fn both_sinks_full_drops_excess_silently() {
    let cancel = CancellationToken::new();
    let invoker = Passthrough::new("echo").with_delay(TICK);
    let mut engine = Engine::start(
        Arc::new(invoker),
        EngineConfig {
            response_capacity: 2,
            error_capacity: 2,
            ..EngineConfig::default()
        },
        cancel,
    );
    let mut responses = engine.responses().expect("fresh engine");
    let mut errors = engine.errors().expect("fresh engine");

    const SUBMITTED: usize = 10;
    for i in 0..SUBMITTED {
        engine.submit(format!("flood {i}")).unwrap();
    }

    // All executions attempt delivery with nothing draining: 2 land on the
    // response stream, 2 contention notices land on the error stream, and
    // the remaining 6 vanish — silence, never a fault.
    tokio::time::sleep(TICK * 4).await;
    engine.shutdown().await;

    let mut delivered = 0;
    while timeout(WAIT, responses.recv()).await.expect("hung").is_some() {
        delivered += 1;
    }
    let mut contended = 0;
    while let Some(err) = timeout(WAIT, errors.recv()).await.expect("hung") {
        assert!(matches!(err, Error::DeliveryContended));
        contended += 1;
    }

    assert_eq!(delivered, 2);
    assert_eq!(contended, 2);
    assert!(delivered + contended < SUBMITTED, "excess must be dropped");
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn close_is_idempotent_under_concurrency() {
    let (mut engine, _cancel) = echo_engine(EngineConfig::default());
    let mut responses = engine.responses().expect("fresh engine");
    let mut errors = engine.errors().expect("fresh engine");
    let engine = Arc::new(engine);

    let mut closers = Vec::new();
    for _ in 0..3 {
        let engine = Arc::clone(&engine);
        closers.push(tokio::spawn(async move {
            engine.close();
            engine.done().await;
        }));
    }
    for closer in closers {
        timeout(WAIT, closer).await.expect("close hung").unwrap();
    }

    // Streams end exactly once, with no fault.
    assert!(timeout(WAIT, responses.recv()).await.expect("hung").is_none());
    assert!(timeout(WAIT, errors.recv()).await.expect("hung").is_none());
    assert_eq!(engine.lifecycle(), Lifecycle::Closed);
}

#[tokio::test]
async fn external_cancellation_closes_engine_with_slow_invocation_in_flight() {
    let cancel = CancellationToken::new();
    let invoker = Passthrough::new("slow").with_delay(Duration::from_secs(30));
    let mut engine = Engine::start(
        Arc::new(invoker),
        EngineConfig {
            drain_grace: Duration::from_millis(100),
            ..EngineConfig::default()
        },
        cancel.clone(),
    );
    let mut responses = engine.responses().expect("fresh engine");

    engine.submit("stuck").unwrap();
    tokio::time::sleep(TICK).await; // let the execution start

    cancel.cancel();
    timeout(WAIT, engine.done()).await.expect("done never fired");

    assert!(matches!(engine.submit("after cancel"), Err(Error::Closed)));

    // The stuck execution is aborted after the drain grace; streams end.
    assert!(
        timeout(WAIT, async {
            while responses.recv().await.is_some() {}
        })
        .await
        .is_ok(),
        "response stream never closed"
    );
    assert_eq!(engine.lifecycle(), Lifecycle::Closed);
}

#[tokio::test]
async fn cancellation_surfaces_abandonment_notice() {
    let cancel = CancellationToken::new();
    let mut engine = Engine::start(
        Arc::new(Hanging),
        EngineConfig {
            drain_grace: Duration::from_secs(1),
            ..EngineConfig::default()
        },
        cancel.clone(),
    );
    let mut errors = engine.errors().expect("fresh engine");

    engine.submit("never answered").unwrap();
    tokio::time::sleep(TICK).await;
    cancel.cancel();

    let err = timeout(WAIT, errors.recv())
        .await
        .expect("timed out")
        .expect("stream ended without notice");
    assert!(matches!(err, Error::Abandoned));
}

#[tokio::test]
async fn consumer_drains_all_buffered_results_after_shutdown() {
    let (mut engine, _cancel) = echo_engine(EngineConfig::default());
    let mut responses = engine.responses().expect("fresh engine");
    let mut errors = engine.errors().expect("fresh engine");

    const SUBMITTED: usize = 5;
    for i in 0..SUBMITTED {
        engine.submit(format!("buffered {i}")).unwrap();
    }
    tokio::time::sleep(TICK).await; // let all deliveries land
    engine.shutdown().await;

    // The error stream is empty and closes immediately; the response
    // stream still holds every result. A consumer selecting over both
    // must keep draining until each stream closes on its own.
    let drained = timeout(WAIT, async {
        let mut got = 0usize;
        let mut responses_open = true;
        let mut errors_open = true;
        while responses_open || errors_open {
            tokio::select! {
                resp = responses.recv(), if responses_open => match resp {
                    Some(_) => got += 1,
                    None => responses_open = false,
                },
                err = errors.recv(), if errors_open => match err {
                    Some(e) => panic!("unexpected error: {e}"),
                    None => errors_open = false,
                },
            }
        }
        got
    })
    .await
    .expect("drain hung");

    assert_eq!(drained, SUBMITTED, "buffered responses were lost");
}

#[tokio::test]
async fn dropping_the_handle_closes_the_streams() {
    let (mut engine, _cancel) = echo_engine(EngineConfig::default());
    let mut responses = engine.responses().expect("fresh engine");

    drop(engine);

    assert!(timeout(WAIT, responses.recv()).await.expect("hung").is_none());
}

#[tokio::test]
async fn streams_are_yielded_once() {
    let (mut engine, _cancel) = echo_engine(EngineConfig::default());

    assert!(engine.responses().is_some());
    assert!(engine.responses().is_none());
    assert!(engine.errors().is_some());
    assert!(engine.errors().is_none());
}
