//! Namespace construction

use futures::FutureExt;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trellis_core::{Error, Result};

use super::args::{parse_flags, resolve_arg};
use super::{BuildFn, Built, Namespace, Node};
use crate::config::TrellisConfig;

enum NodeDef {
    Build(BuildFn),
    Literal(Built),
}

#[derive(Debug, Clone)]
struct ArgSpec {
    required: bool,
    doc: String,
    default: Option<String>,
}

/// Declares the nodes of a namespace, then builds it.
///
/// # Example
///
/// ```no_run
/// use tokio_util::sync::CancellationToken;
/// use trellis_engine::namespace::{Built, Namespace, NamespaceBuilder};
///
/// # async fn run() -> trellis_core::Result<()> {
/// let ns = NamespaceBuilder::new("frontend")
///     .required("addr", "address to listen on")
///     .define("greeting", |ns: Namespace| async move {
///         let addr = ns.get_parsed::<String>("addr").await?;
///         Ok(Built::value(format!("listening on {}", addr)))
///     })
///     .build(&CancellationToken::new())
///     .await?;
/// let greeting = ns.get::<String>("greeting").await?;
/// # Ok(())
/// # }
/// ```
pub struct NamespaceBuilder {
    name: String,
    nodes: BTreeMap<String, NodeDef>,
    args: BTreeMap<String, ArgSpec>,
    instantiate: Vec<String>,
    argv: Option<Vec<String>>,
    handle_signals: bool,
}

impl NamespaceBuilder {
    /// Start an empty namespace
    pub fn new(name: impl Into<String>) -> Self {
        NamespaceBuilder {
            name: name.into(),
            nodes: BTreeMap::new(),
            args: BTreeMap::new(),
            instantiate: Vec::new(),
            argv: None,
            handle_signals: true,
        }
    }

    /// Namespace name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Define a node built lazily by `build`.
    ///
    /// Redefining a name replaces the earlier definition.
    pub fn define<F, Fut>(mut self, name: impl Into<String>, build: F) -> Self
    where
        F: Fn(Namespace) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Built>> + Send + 'static,
    {
        let name = name.into();
        let build: BuildFn = Arc::new(move |ns| build(ns).boxed());
        self.insert(name, NodeDef::Build(build));
        self
    }

    /// Bind a node to a concrete value
    pub fn set<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        let name = name.into();
        info!(target: "trellis::namespace", namespace = %self.name, node = %name, "Set node");
        self.insert(name, NodeDef::Literal(Built::value(value)));
        self
    }

    /// Bind a node to an already built value
    pub fn set_built(mut self, name: impl Into<String>, built: Built) -> Self {
        self.insert(name.into(), NodeDef::Literal(built));
        self
    }

    fn insert(&mut self, name: String, def: NodeDef) {
        if self.nodes.contains_key(&name) || self.args.contains_key(&name) {
            warn!(target: "trellis::namespace", namespace = %self.name, node = %name, "Redefining node");
        } else {
            debug!(target: "trellis::namespace", namespace = %self.name, node = %name, "Defining node");
        }
        self.nodes.insert(name, def);
    }

    /// Declare an argument node that must be supplied by `set`, a
    /// `--name=value` flag or the `NAME` environment variable
    pub fn required(mut self, name: impl Into<String>, doc: impl Into<String>) -> Self {
        self.args.insert(
            name.into(),
            ArgSpec {
                required: true,
                doc: doc.into(),
                default: None,
            },
        );
        self
    }

    /// Declare an argument node that may be left unset
    pub fn optional(mut self, name: impl Into<String>, doc: impl Into<String>) -> Self {
        self.args.insert(
            name.into(),
            ArgSpec {
                required: false,
                doc: doc.into(),
                default: None,
            },
        );
        self
    }

    /// Declare an argument node with a fallback used when neither a flag
    /// nor an environment variable supplies it
    pub fn default_value(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        doc: impl Into<String>,
    ) -> Self {
        self.args.insert(
            name.into(),
            ArgSpec {
                required: false,
                doc: doc.into(),
                default: Some(value.into()),
            },
        );
        self
    }

    /// Load every config value as a defaulted argument node.
    ///
    /// Flags and environment variables still take precedence.
    pub fn set_config(self, config: &TrellisConfig) -> Self {
        config
            .node_values()
            .into_iter()
            .fold(self, |builder, (name, value, doc)| {
                builder.default_value(name, value, doc)
            })
    }

    /// Resolve `name` during `build` so its Runnable starts immediately
    pub fn instantiate(mut self, name: impl Into<String>) -> Self {
        self.instantiate.push(name.into());
        self
    }

    /// Use these arguments instead of the process command line
    pub fn args(mut self, argv: Vec<String>) -> Self {
        self.argv = Some(argv);
        self
    }

    /// Whether `build` installs a ctrl-c handler that shuts the namespace down
    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Usage text listing every argument node
    pub fn usage(&self) -> String {
        let mut out = format!("{} arguments:\n", self.name);
        for (name, spec) in &self.args {
            let tag = if spec.required { "required" } else { "optional" };
            out.push_str(&format!(
                "  --{} (env {}) [{}] {}\n",
                name,
                super::env_var_name(name),
                tag,
                spec.doc
            ));
        }
        out
    }

    /// Build a root namespace.
    ///
    /// Argument nodes are resolved from `set`, then flags, then the
    /// environment. The namespace's token is a child of `token`.
    pub async fn build(mut self, token: &CancellationToken) -> Result<Namespace> {
        let eager = std::mem::take(&mut self.instantiate);
        let argv = self
            .argv
            .clone()
            .unwrap_or_else(|| std::env::args().collect());
        let declared: Vec<String> = self
            .args
            .keys()
            .filter(|name| !self.nodes.contains_key(*name))
            .cloned()
            .collect();
        let flags = parse_flags(&declared, &argv);

        let handle_signals = self.handle_signals;
        let ns = self.assemble(token.child_token(), None, |name| resolve_arg(name, &flags))?;

        if handle_signals {
            let token = ns.token().clone();
            let name = ns.name().to_string();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    signal = tokio::signal::ctrl_c() => {
                        if signal.is_ok() {
                            info!(target: "trellis::namespace", namespace = %name, "Interrupted; shutting down");
                            token.cancel();
                        }
                    }
                }
            });
        }

        instantiate_all(&ns, &eager).await?;
        Ok(ns)
    }

    /// Build a child namespace. Names it does not declare resolve in
    /// `parent`; argument nodes are satisfied by `set` or by the parent.
    pub async fn build_with_parent(mut self, parent: &Namespace) -> Result<Namespace> {
        let eager = std::mem::take(&mut self.instantiate);
        let token = parent.token().child_token();
        let ns = self.assemble(token, Some(parent.clone()), |_| None)?;
        instantiate_all(&ns, &eager).await?;
        Ok(ns)
    }

    fn assemble(
        self,
        token: CancellationToken,
        parent: Option<Namespace>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Namespace> {
        let mut nodes: FxHashMap<String, Node> = FxHashMap::default();
        let mut missing = Vec::new();

        for (name, spec) in &self.args {
            if self.nodes.contains_key(name) {
                continue;
            }
            if let Some(value) = lookup(name).or_else(|| spec.default.clone()) {
                nodes.insert(name.clone(), Node::resolved(Ok(Built::value(value))));
                continue;
            }
            if parent.as_ref().is_some_and(|p| p.contains(name)) {
                continue;
            }
            if spec.required {
                missing.push(name.clone());
            } else {
                nodes.insert(
                    name.clone(),
                    Node::resolved(Err(Error::not_found(format!(
                        "{} argnode {} not set",
                        self.name, name
                    )))),
                );
            }
        }

        if !missing.is_empty() {
            return Err(Error::build(
                &self.name,
                format!("missing required argnodes [{}]", missing.join(", ")),
            ));
        }

        for (name, def) in self.nodes {
            let node = match def {
                NodeDef::Build(build) => Node::defined(build),
                NodeDef::Literal(built) => Node::resolved(Ok(built)),
            };
            nodes.insert(name, node);
        }

        info!(target: "trellis::namespace", namespace = %self.name, nodes = nodes.len(), "Built namespace");
        let ns = Namespace::new(self.name, nodes, parent, token);
        Ok(ns)
    }
}

/// Resolve the eagerly instantiated nodes of a freshly built namespace
async fn instantiate_all(ns: &Namespace, names: &[String]) -> Result<()> {
    for name in names {
        if let Err(e) = ns.resolve(name).await {
            ns.token().cancel();
            return Err(e);
        }
    }
    Ok(())
}
