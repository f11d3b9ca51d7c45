//! Ready-made work items for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dagrun::dag::WorkFuture;
use tokio_util::sync::CancellationToken;

/// Counts how many times a work item was invoked.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Succeeds with `value` after sleeping for `delay`.
pub fn succeed_after<T>(
    delay: Duration,
    value: T,
) -> impl Fn(CancellationToken) -> WorkFuture<T> + Send + Sync + 'static
where
    T: Clone + Send + Sync + 'static,
{
    move |_: CancellationToken| -> WorkFuture<T> {
        let value = value.clone();
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(value)
        })
    }
}

/// Succeeds immediately with `value`, counting invocations.
pub fn counted<T>(
    calls: &CallCounter,
    value: T,
) -> impl Fn(CancellationToken) -> WorkFuture<T> + Send + Sync + 'static
where
    T: Clone + Send + Sync + 'static,
{
    let calls = calls.clone();
    move |_: CancellationToken| -> WorkFuture<T> {
        calls.bump();
        let value = value.clone();
        Box::pin(async move { Ok(value) })
    }
}

/// Fails the first `failures` invocations, then succeeds with `value`.
pub fn fail_times<T>(
    failures: usize,
    calls: &CallCounter,
    value: T,
) -> impl Fn(CancellationToken) -> WorkFuture<T> + Send + Sync + 'static
where
    T: Clone + Send + Sync + 'static,
{
    let calls = calls.clone();
    move |_: CancellationToken| -> WorkFuture<T> {
        let call = calls.bump();
        let value = value.clone();
        Box::pin(async move {
            if call <= failures {
                anyhow::bail!("planned failure {call} of {failures}");
            }
            Ok(value)
        })
    }
}

/// Never completes; ignores its cancellation token.
pub fn never_resolves<T>(
    calls: &CallCounter,
) -> impl Fn(CancellationToken) -> WorkFuture<T> + Send + Sync + 'static
where
    T: Send + 'static,
{
    let calls = calls.clone();
    move |_: CancellationToken| -> WorkFuture<T> {
        calls.bump();
        Box::pin(std::future::pending())
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    current: AtomicUsize,
    peak: AtomicUsize,
    order: Mutex<Vec<String>>,
}

/// Records how many probe work items overlap and the order they started in.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyProbe {
    state: Arc<ProbeState>,
}

/// Decrements the running counter even if the work is dropped mid-flight.
struct Running(Arc<ProbeState>);

impl Drop for Running {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Work item that registers as `name`, holds a slot for `hold` and then
    /// succeeds with `value`.
    pub fn work<T>(
        &self,
        name: &str,
        hold: Duration,
        value: T,
    ) -> impl Fn(CancellationToken) -> WorkFuture<T> + Send + Sync + 'static
    where
        T: Clone + Send + Sync + 'static,
    {
        let state = self.state.clone();
        let name = name.to_string();
        move |_: CancellationToken| -> WorkFuture<T> {
            let state = state.clone();
            let name = name.clone();
            let value = value.clone();
            Box::pin(async move {
                state.order.lock().expect("probe order poisoned").push(name);
                let now = state.current.fetch_add(1, Ordering::SeqCst) + 1;
                state.peak.fetch_max(now, Ordering::SeqCst);
                let _running = Running(state.clone());

                tokio::time::sleep(hold).await;
                Ok(value)
            })
        }
    }

    /// Highest number of probe items observed running at once.
    pub fn peak(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> usize {
        self.state.current.load(Ordering::SeqCst)
    }

    /// Names in the order their work started.
    pub fn order(&self) -> Vec<String> {
        self.state.order.lock().expect("probe order poisoned").clone()
    }
}
