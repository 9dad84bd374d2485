mod class_bound;
mod compiled;
mod interpreted;

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;

use crate::engine::{
    config::ToolchainConfig,
    models::{CompileResult, ExecutionLimits, ExecutionResult},
    sandbox::{self, CommandSpec},
    workspace::Workspace,
};

pub use class_bound::{ClassBoundRunner, rewrite_public_class};
pub use compiled::CompiledRunner;
pub use interpreted::InterpretedRunner;

/// Compile/execute capability for one language.
///
/// `compile` returns `Err` only for infrastructure faults (e.g. the source
/// cannot be written); toolchain rejections are a failed `CompileResult`.
#[async_trait]
pub trait LanguageRunner: Send + Sync {
    fn language(&self) -> &str;

    async fn compile(
        &self,
        workspace: &Workspace,
        source: &str,
        limits: &ExecutionLimits,
    ) -> anyhow::Result<CompileResult>;

    async fn execute(
        &self,
        workspace: &Workspace,
        input: &str,
        limits: &ExecutionLimits,
    ) -> ExecutionResult;
}

/// Runs a toolchain command and folds its outcome into a `CompileResult`.
pub(crate) async fn run_toolchain(
    workspace: &Workspace,
    command: &CommandSpec,
    limits: &ExecutionLimits,
) -> CompileResult {
    tracing::debug!(command = %command, "invoking toolchain");
    let result = sandbox::supervise(
        command,
        workspace.path(),
        None,
        limits.compile_timeout(),
        limits.max_output_chars,
    )
    .await;

    if result.success {
        return CompileResult::ok();
    }
    if result.timed_out {
        return CompileResult::failed("Compilation timed out");
    }

    let diagnostic = [result.stderr.trim(), result.stdout.trim()]
        .into_iter()
        .find(|text| !text.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("compiler {}", result.describe_exit()));
    CompileResult::failed(sandbox::truncate_chars(
        &diagnostic,
        limits.max_diagnostic_chars,
    ))
}

/// Language identifier -> runner lookup, with aliases.
#[derive(Default, Clone)]
pub struct RunnerRegistry {
    runners: BTreeMap<String, Arc<dyn LanguageRunner>>,
    aliases: HashMap<String, String>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard(toolchains: &ToolchainConfig) -> Self {
        let mut registry = Self::new();
        registry.register(
            Arc::new(InterpretedRunner::new("python", &toolchains.python, "main.py")),
            &["py", "python3"],
        );
        registry.register(
            Arc::new(InterpretedRunner::new("javascript", &toolchains.node, "solution.js")),
            &["js", "node"],
        );
        registry.register(
            Arc::new(CompiledRunner::new(
                "c",
                &toolchains.gcc,
                &["-O2", "-std=c11"],
                "main.c",
            )),
            &[],
        );
        registry.register(
            Arc::new(CompiledRunner::new(
                "cpp",
                &toolchains.gxx,
                &["-O2", "-std=c++17"],
                "main.cpp",
            )),
            &["c++", "cxx", "cc"],
        );
        registry.register(
            Arc::new(CompiledRunner::new("rust", &toolchains.rustc, &["-O"], "main.rs")),
            &["rs"],
        );
        registry.register(
            Arc::new(ClassBoundRunner::new(
                "java",
                &toolchains.javac,
                &toolchains.java,
                toolchains.java_heap_mb,
            )),
            &[],
        );
        registry
    }

    pub fn register(&mut self, runner: Arc<dyn LanguageRunner>, aliases: &[&str]) {
        let id = runner.language().to_ascii_lowercase();
        for alias in aliases {
            self.aliases.insert(alias.to_ascii_lowercase(), id.clone());
        }
        self.runners.insert(id, runner);
    }

    pub fn resolve(&self, language: &str) -> Option<Arc<dyn LanguageRunner>> {
        let key = language.trim().to_ascii_lowercase();
        let id = self.aliases.get(&key).unwrap_or(&key);
        self.runners.get(id).cloned()
    }

    /// Canonical identifiers, sorted.
    pub fn languages(&self) -> Vec<String> {
        self.runners.keys().cloned().collect()
    }
}
