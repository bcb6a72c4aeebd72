//! Dependency-injection namespace
//!
//! ## Design
//!
//! A namespace is a table of named nodes. Each node is one of:
//!
//! | Kind       | Declared with        | Value                                    |
//! |------------|----------------------|------------------------------------------|
//! | defined    | `define`             | produced by an async build function      |
//! | literal    | `set`                | supplied at construction                 |
//! | required   | `required`           | flag or env var; missing fails `build`   |
//! | optional   | `optional`           | flag or env var; missing is `NotFound`   |
//!
//! Nodes are built lazily, at most once: the first `get` runs the build
//! function and memoizes the outcome, including a failure, in a
//! `tokio::sync::OnceCell`. Concurrent first `get`s wait on the same build.
//!
//! A child namespace (`build_with_parent`) falls through to its parent for
//! names it does not define itself.
//!
//! ## Runnables
//!
//! If a built value is [`Runnable`], its `run` is spawned on first resolution
//! and tracked by the namespace and every ancestor. Each namespace owns a
//! `CancellationToken` that is a child of its parent's; `shutdown` cancels
//! it and `await_tasks` waits for every tracked task. A Runnable returning
//! an error cancels its namespace.

mod args;
mod builder;

pub use args::env_var_name;
pub use builder::NamespaceBuilder;

use futures::future::BoxFuture;
use futures::FutureExt;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use trellis_core::{Error, Result};

use crate::runnable::Runnable;

/// A node's build function
pub type BuildFn = Arc<dyn Fn(Namespace) -> BoxFuture<'static, Result<Built>> + Send + Sync>;

/// A built node value
#[derive(Clone)]
pub struct Built {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    runnable: Option<Arc<dyn Runnable>>,
}

impl Built {
    /// Wrap a plain value
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        Built {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
            runnable: None,
        }
    }

    /// Wrap a value whose background task starts on first resolution
    pub fn runnable<T: Runnable + Any>(value: T) -> Self {
        let value = Arc::new(value);
        Built {
            value: value.clone(),
            type_name: std::any::type_name::<T>(),
            runnable: Some(value as Arc<dyn Runnable>),
        }
    }

    /// Name of the wrapped type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn downcast<T: Any + Send + Sync>(&self, node: &str) -> Result<Arc<T>> {
        self.value.clone().downcast::<T>().map_err(|_| {
            Error::type_mismatch(
                std::any::type_name::<T>(),
                format!("{} (node {})", self.type_name, node),
            )
        })
    }
}

impl fmt::Debug for Built {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Built")
            .field("type_name", &self.type_name)
            .field("runnable", &self.runnable.is_some())
            .finish()
    }
}

struct Node {
    build: Option<BuildFn>,
    cell: OnceCell<Result<Built>>,
}

impl Node {
    fn defined(build: BuildFn) -> Self {
        Node {
            build: Some(build),
            cell: OnceCell::new(),
        }
    }

    fn resolved(result: Result<Built>) -> Self {
        Node {
            build: None,
            cell: OnceCell::new_with(Some(result)),
        }
    }
}

struct Inner {
    name: String,
    nodes: FxHashMap<String, Node>,
    parent: Option<Namespace>,
    token: CancellationToken,
    tracker: TaskTracker,
    // Held across close/wait/reopen so concurrent waiters see a closed tracker
    draining: Mutex<()>,
}

/// A built namespace. Cheap to clone.
#[derive(Clone)]
pub struct Namespace {
    inner: Arc<Inner>,
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.inner.name)
            .field("nodes", &self.inner.nodes.len())
            .finish()
    }
}

impl Namespace {
    fn new(
        name: String,
        nodes: FxHashMap<String, Node>,
        parent: Option<Namespace>,
        token: CancellationToken,
    ) -> Self {
        Namespace {
            inner: Arc::new(Inner {
                name,
                nodes,
                parent,
                token,
                tracker: TaskTracker::new(),
                draining: Mutex::new(()),
            }),
        }
    }

    /// Namespace name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The parent namespace, if this is a child
    pub fn parent(&self) -> Option<&Namespace> {
        self.inner.parent.as_ref()
    }

    /// This namespace's cancellation scope
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// True if `name` resolves here or in an ancestor
    pub fn contains(&self, name: &str) -> bool {
        self.owner(name).is_some()
    }

    /// Resolve a node and downcast it
    pub async fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        self.resolve(name).await?.downcast::<T>(name)
    }

    /// Resolve a node and clone the value out (handy for `Arc<dyn Trait>`)
    pub async fn get_cloned<T: Any + Send + Sync + Clone>(&self, name: &str) -> Result<T> {
        Ok(self.get::<T>(name).await?.as_ref().clone())
    }

    /// Resolve an argument-like node as `T`.
    ///
    /// Accepts a node holding a `T` or a `String` that parses as `T`, so
    /// the same call works whether the value came from `set` or from a
    /// flag or environment variable.
    pub async fn get_parsed<T>(&self, name: &str) -> Result<T>
    where
        T: Any + Send + Sync + Clone + FromStr,
        T::Err: fmt::Display,
    {
        let built = self.resolve(name).await?;
        if let Ok(value) = built.value.clone().downcast::<T>() {
            return Ok(value.as_ref().clone());
        }
        let text = built.downcast::<String>(name)?;
        text.parse::<T>().map_err(|e| {
            Error::invalid_argument(format!("{}: cannot parse {:?}: {}", name, text, e))
        })
    }

    /// Find the namespace that declares `name`, walking up the parents
    fn owner(&self, name: &str) -> Option<Namespace> {
        let mut current = Some(self.clone());
        while let Some(ns) = current {
            if ns.inner.nodes.contains_key(name) {
                return Some(ns);
            }
            current = ns.inner.parent.clone();
        }
        None
    }

    async fn resolve(&self, name: &str) -> Result<Built> {
        match self.owner(name) {
            Some(owner) => owner.resolve_local(name).await,
            None => Err(Error::not_found(format!(
                "{} unknown {}",
                self.inner.name, name
            ))),
        }
    }

    async fn resolve_local(&self, name: &str) -> Result<Built> {
        let node = self.inner.nodes.get(name).ok_or_else(|| {
            Error::not_found(format!("{} unknown {}", self.inner.name, name))
        })?;

        let result = node
            .cell
            .get_or_init(|| async {
                let build = match &node.build {
                    Some(build) => build.clone(),
                    None => {
                        return Err(Error::build(name, "node has no build function"));
                    }
                };
                debug!(target: "trellis::namespace", namespace = %self.inner.name, node = name, "Building node");
                match build(self.clone()).await {
                    Ok(built) => {
                        if let Some(runnable) = &built.runnable {
                            self.start(name, runnable.clone());
                        }
                        Ok(built)
                    }
                    Err(e) => {
                        warn!(target: "trellis::namespace", namespace = %self.inner.name, node = name, error = %e, "Node build failed");
                        Err(match e {
                            Error::Build { .. } | Error::Cancelled(_) => e,
                            other => Error::build(name, other.to_string()),
                        })
                    }
                }
            })
            .await;
        result.clone()
    }

    fn start(&self, name: &str, runnable: Arc<dyn Runnable>) {
        let token = self.inner.token.clone();
        let node = name.to_string();
        let namespace = self.inner.name.clone();
        info!(target: "trellis::namespace", namespace = %namespace, node = %node, "Starting runnable");

        let task = async move {
            match runnable.run(token.clone()).await {
                Ok(()) => {
                    debug!(target: "trellis::namespace", namespace = %namespace, node = %node, "Runnable finished");
                }
                Err(e) => {
                    error!(target: "trellis::namespace", namespace = %namespace, node = %node, error = %e, "Runnable failed; cancelling namespace");
                    token.cancel();
                }
            }
        };

        // Ancestors track the task too, so awaiting a parent covers children
        let mut task: BoxFuture<'static, ()> = task.boxed();
        let mut ancestor = self.inner.parent.clone();
        while let Some(ns) = ancestor {
            task = ns.inner.tracker.track_future(task).boxed();
            ancestor = ns.inner.parent.clone();
        }
        self.inner.tracker.spawn(task);
    }

    /// Cancel this namespace (and its children), optionally waiting for
    /// every Runnable to return
    pub async fn shutdown(&self, await_completion: bool) {
        info!(target: "trellis::namespace", namespace = %self.inner.name, "Shutting down");
        self.inner.token.cancel();
        if await_completion {
            self.await_tasks().await;
        }
    }

    /// Wait until every Runnable started in this namespace or its children
    /// has returned
    pub async fn await_tasks(&self) {
        let _draining = self.inner.draining.lock().await;
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
    }

    /// Number of Runnables still running
    pub fn running_tasks(&self) -> usize {
        self.inner.tracker.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Ticker {
        ticks: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Runnable for Ticker {
        async fn run(&self, cancel: CancellationToken) -> Result<()> {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(Duration::from_millis(5)) => {
                        self.ticks.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        }
    }

    struct Failing;

    #[async_trait]
    impl Runnable for Failing {
        async fn run(&self, _cancel: CancellationToken) -> Result<()> {
            Err(Error::backend("worker lost its backend"))
        }
    }

    fn no_args() -> Vec<String> {
        vec!["test".to_string()]
    }

    #[tokio::test]
    async fn test_get_builds_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let ns = NamespaceBuilder::new("app")
            .args(no_args())
            .define("answer", move |_ns| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Built::value(42u32))
                }
            })
            .build(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*ns.get::<u32>("answer").await.unwrap(), 42);
        assert_eq!(*ns.get::<u32>("answer").await.unwrap(), 42);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_build_errors_are_memoized() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let ns = NamespaceBuilder::new("app")
            .args(no_args())
            .define("broken", move |_ns| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<Built, _>(Error::backend("no store"))
                }
            })
            .build(&CancellationToken::new())
            .await
            .unwrap();

        let first = ns.get::<u32>("broken").await.unwrap_err();
        let second = ns.get::<u32>("broken").await.unwrap_err();
        assert_eq!(first, second);
        assert!(matches!(first, Error::Build { .. }));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dependencies_resolve_through_namespace() {
        let ns = NamespaceBuilder::new("app")
            .args(no_args())
            .set("base", 10i64)
            .define("double", |ns: Namespace| async move {
                let base = ns.get::<i64>("base").await?;
                Ok(Built::value(*base * 2))
            })
            .build(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(*ns.get::<i64>("double").await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_unknown_and_type_mismatch() {
        let ns = NamespaceBuilder::new("app")
            .args(no_args())
            .set("n", 1u8)
            .build(&CancellationToken::new())
            .await
            .unwrap();

        let err = ns.get::<u8>("missing").await.unwrap_err();
        assert_eq!(err, Error::NotFound("app unknown missing".into()));

        let err = ns.get::<String>("n").await.unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_get_parsed_accepts_strings_and_values() {
        let ns = NamespaceBuilder::new("app")
            .args(vec!["test".into(), "--capacity=16".into()])
            .optional("capacity", "queue capacity")
            .set("machine", 3usize)
            .set("bad", "x".to_string())
            .build(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ns.get_parsed::<usize>("capacity").await.unwrap(), 16);
        assert_eq!(ns.get_parsed::<usize>("machine").await.unwrap(), 3);
        assert!(matches!(
            ns.get_parsed::<usize>("bad").await.unwrap_err(),
            Error::InvalidArgument(_)
        ));
    }

    #[tokio::test]
    async fn test_child_falls_through_to_parent() {
        let token = CancellationToken::new();
        let parent = NamespaceBuilder::new("parent")
            .args(no_args())
            .set("shared", "from-parent".to_string())
            .build(&token)
            .await
            .unwrap();
        let child = NamespaceBuilder::new("child")
            .set("own", 1u8)
            .build_with_parent(&parent)
            .await
            .unwrap();

        assert_eq!(
            child.get::<String>("shared").await.unwrap().as_str(),
            "from-parent"
        );
        assert!(child.contains("own"));
        assert!(!parent.contains("own"));
        assert_eq!(child.parent().map(|p| p.name()), Some("parent"));
    }

    #[tokio::test]
    async fn test_runnable_starts_and_stops() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let shared = ticks.clone();
        let ns = NamespaceBuilder::new("app")
            .args(no_args())
            .define("ticker", move |_ns| {
                let ticks = shared.clone();
                async move { Ok(Built::runnable(Ticker { ticks })) }
            })
            .instantiate("ticker")
            .build(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ns.running_tasks(), 1);
        tokio::time::sleep(Duration::from_millis(30)).await;
        ns.shutdown(true).await;
        assert_eq!(ns.running_tasks(), 0);
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen > 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_parent_shutdown_stops_child_runnables() {
        let token = CancellationToken::new();
        let parent = NamespaceBuilder::new("parent")
            .args(no_args())
            .build(&token)
            .await
            .unwrap();
        let ticks = Arc::new(AtomicUsize::new(0));
        let shared = ticks.clone();
        let child = NamespaceBuilder::new("child")
            .define("ticker", move |_ns| {
                let ticks = shared.clone();
                async move { Ok(Built::runnable(Ticker { ticks })) }
            })
            .build_with_parent(&parent)
            .await
            .unwrap();
        child.get::<Ticker>("ticker").await.unwrap();
        assert_eq!(parent.running_tasks(), 1);

        parent.shutdown(true).await;
        assert!(child.token().is_cancelled());
        child.await_tasks().await;
        let seen = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_failing_runnable_cancels_namespace() {
        let ns = NamespaceBuilder::new("app")
            .args(no_args())
            .define("failing", |_ns| async { Ok(Built::runnable(Failing)) })
            .instantiate("failing")
            .build(&CancellationToken::new())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), ns.token().cancelled())
            .await
            .unwrap();
        ns.await_tasks().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_shutdowns_both_return() {
        for _ in 0..50 {
            let ticks = Arc::new(AtomicUsize::new(0));
            let shared = ticks.clone();
            let ns = NamespaceBuilder::new("app")
                .args(no_args())
                .define("ticker", move |_ns| {
                    let ticks = shared.clone();
                    async move { Ok(Built::runnable(Ticker { ticks })) }
                })
                .define("late", |_ns| async {
                    Ok(Built::runnable(Ticker {
                        ticks: Arc::new(AtomicUsize::new(0)),
                    }))
                })
                .instantiate("ticker")
                .build(&CancellationToken::new())
                .await
                .unwrap();

            let (a, b) = (ns.clone(), ns.clone());
            tokio::time::timeout(Duration::from_secs(2), async move {
                tokio::join!(a.shutdown(true), b.shutdown(true));
            })
            .await
            .unwrap();
            assert_eq!(ns.running_tasks(), 0);

            // The tracker is open again for Runnables resolved afterwards
            ns.get::<Ticker>("late").await.unwrap();
            tokio::time::timeout(Duration::from_secs(2), ns.await_tasks())
                .await
                .unwrap();
            assert_eq!(ns.running_tasks(), 0);
        }
    }
}
