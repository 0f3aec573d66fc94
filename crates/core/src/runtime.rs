// Copyright 2026 RingKV Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::future::Future;
use std::panic::resume_unwind;
use std::sync::Arc;
use std::task::ready;
use std::time::Duration;
use std::time::Instant;

pub fn make_runtime(runtime_name: &str, thread_name: &str, worker_threads: usize) -> Runtime {
    log::info!(
        "creating runtime with runtime_name: {runtime_name}, thread_name: {thread_name}, work_threads: {worker_threads}"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .thread_name(thread_name)
        .enable_all()
        .build()
        .map(Arc::new)
        .expect("failed to create runtime");
    Runtime {
        name: runtime_name.to_string(),
        runtime,
    }
}

/// A runtime to run future tasks.
#[derive(Debug, Clone)]
pub struct Runtime {
    name: String,
    runtime: Arc<tokio::runtime::Runtime>,
}

impl Runtime {
    /// Get the name of the runtime.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn a future and execute it in this thread pool.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        JoinHandle::new(self.runtime.spawn(future))
    }

    /// Run a future to complete, this is the runtime entry point.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

impl fastimer::Spawn for Runtime {
    fn spawn<F: Future<Output = ()> + Send + 'static>(&self, future: F) {
        Runtime::spawn(self, future);
    }
}

#[derive(Debug)]
struct Timer;

pub fn timer() -> impl fastimer::MakeDelay {
    Timer
}

impl fastimer::MakeDelay for Timer {
    type Delay = tokio::time::Sleep;

    fn delay_util(&self, at: Instant) -> Self::Delay {
        tokio::time::sleep_until(tokio::time::Instant::from_std(at))
    }

    fn delay(&self, duration: Duration) -> Self::Delay {
        tokio::time::sleep(duration)
    }
}

#[pin_project::pin_project]
#[derive(Debug)]
pub struct JoinHandle<R> {
    #[pin]
    inner: tokio::task::JoinHandle<R>,
}

impl<R> JoinHandle<R> {
    fn new(inner: tokio::task::JoinHandle<R>) -> Self {
        Self { inner }
    }
}

impl<R> Future for JoinHandle<R> {
    type Output = R;

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        let this = self.project();
        let val = ready!(this.inner.poll(cx));
        match val {
            Ok(val) => std::task::Poll::Ready(val),
            Err(err) => {
                if err.is_panic() {
                    resume_unwind(err.into_panic())
                } else {
                    unreachable!()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_join() {
        let runtime = make_runtime("test_runtime", "test_thread", 2);
        let handle = runtime.spawn(async { 1 + 1 });
        assert_eq!(2, runtime.block_on(handle));
    }

    #[test]
    fn test_block_on() {
        let runtime = make_runtime("test_runtime", "test_thread", 2);
        let out = runtime.block_on(async {
            let (tx, rx) = tokio::sync::oneshot::channel();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                tx.send("ring").unwrap();
            });
            rx.await.unwrap()
        });
        assert_eq!(out, "ring");
    }
}
