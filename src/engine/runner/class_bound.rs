use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::engine::{
    models::{CompileResult, ExecutionLimits, ExecutionResult},
    runner::{LanguageRunner, run_toolchain},
    sandbox::{self, CommandSpec},
    workspace::Workspace,
};

const CLASS_NAME: &str = "Main";

static PUBLIC_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(public\s+(?:(?:final|abstract|strictfp)\s+)*class\s+)([A-Za-z_$][A-Za-z0-9_$]*)")
        .expect("public class pattern is valid")
});

/// Renames the first `public class` declaration to `class_name`.
///
/// Only the first match is touched. Sources with several public classes, or
/// none, are otherwise left alone and fail in the compiler like any other
/// mistake.
pub fn rewrite_public_class(source: &str, class_name: &str) -> String {
    PUBLIC_CLASS
        .replacen(source, 1, |caps: &regex::Captures<'_>| {
            format!("{}{}", &caps[1], class_name)
        })
        .into_owned()
}

/// Languages whose public type name must match the file name (Java).
#[derive(Debug, Clone)]
pub struct ClassBoundRunner {
    language: String,
    compiler: String,
    launcher: String,
    heap_mb: u64,
}

impl ClassBoundRunner {
    pub fn new(language: &str, compiler: &str, launcher: &str, heap_mb: u64) -> Self {
        Self {
            language: language.to_string(),
            compiler: compiler.to_string(),
            launcher: launcher.to_string(),
            heap_mb,
        }
    }

    fn source_name() -> String {
        format!("{CLASS_NAME}.java")
    }

    fn compile_command(&self, workspace: &Workspace) -> CommandSpec {
        CommandSpec::new(&self.compiler)
            .args(["-encoding", "UTF-8", "-d"])
            .arg(workspace.path())
            .arg(workspace.file(&Self::source_name()))
    }

    fn run_command(&self, workspace: &Workspace) -> CommandSpec {
        // Heap cap is handed to the runtime; the external sandbox enforces memory.
        CommandSpec::new(&self.launcher)
            .arg(format!("-Xmx{}m", self.heap_mb))
            .arg("-cp")
            .arg(workspace.path())
            .arg(CLASS_NAME)
    }
}

#[async_trait]
impl LanguageRunner for ClassBoundRunner {
    fn language(&self) -> &str {
        &self.language
    }

    async fn compile(
        &self,
        workspace: &Workspace,
        source: &str,
        limits: &ExecutionLimits,
    ) -> anyhow::Result<CompileResult> {
        let rewritten = rewrite_public_class(source, CLASS_NAME);
        workspace.write_file(&Self::source_name(), &rewritten).await?;
        Ok(run_toolchain(workspace, &self.compile_command(workspace), limits).await)
    }

    async fn execute(
        &self,
        workspace: &Workspace,
        input: &str,
        limits: &ExecutionLimits,
    ) -> ExecutionResult {
        sandbox::supervise(
            &self.run_command(workspace),
            workspace.path(),
            Some(input),
            limits.run_timeout(),
            limits.max_output_chars,
        )
        .await
    }
}
