use async_trait::async_trait;

use crate::engine::{
    models::{CompileResult, ExecutionLimits, ExecutionResult},
    runner::{LanguageRunner, run_toolchain},
    sandbox::{self, CommandSpec},
    workspace::Workspace,
};

const BINARY_NAME: &str = "main";

/// Native toolchains that turn one source file into one executable.
#[derive(Debug, Clone)]
pub struct CompiledRunner {
    language: String,
    compiler: String,
    flags: Vec<String>,
    source_name: String,
}

impl CompiledRunner {
    pub fn new(language: &str, compiler: &str, flags: &[&str], source_name: &str) -> Self {
        Self {
            language: language.to_string(),
            compiler: compiler.to_string(),
            flags: flags.iter().map(|flag| flag.to_string()).collect(),
            source_name: source_name.to_string(),
        }
    }

    fn compile_command(&self, workspace: &Workspace) -> CommandSpec {
        CommandSpec::new(&self.compiler)
            .args(&self.flags)
            .arg(workspace.file(&self.source_name))
            .arg("-o")
            .arg(workspace.file(BINARY_NAME))
    }
}

#[async_trait]
impl LanguageRunner for CompiledRunner {
    fn language(&self) -> &str {
        &self.language
    }

    async fn compile(
        &self,
        workspace: &Workspace,
        source: &str,
        limits: &ExecutionLimits,
    ) -> anyhow::Result<CompileResult> {
        workspace.write_file(&self.source_name, source).await?;
        Ok(run_toolchain(workspace, &self.compile_command(workspace), limits).await)
    }

    async fn execute(
        &self,
        workspace: &Workspace,
        input: &str,
        limits: &ExecutionLimits,
    ) -> ExecutionResult {
        sandbox::supervise(
            &CommandSpec::new(workspace.file(BINARY_NAME)),
            workspace.path(),
            Some(input),
            limits.run_timeout(),
            limits.max_output_chars,
        )
        .await
    }
}
