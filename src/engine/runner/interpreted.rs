use async_trait::async_trait;

use crate::engine::{
    models::{CompileResult, ExecutionLimits, ExecutionResult},
    runner::LanguageRunner,
    sandbox::{self, CommandSpec},
    workspace::Workspace,
};

/// Script languages: "compiling" only persists the source.
#[derive(Debug, Clone)]
pub struct InterpretedRunner {
    language: String,
    interpreter: String,
    source_name: String,
}

impl InterpretedRunner {
    pub fn new(language: &str, interpreter: &str, source_name: &str) -> Self {
        Self {
            language: language.to_string(),
            interpreter: interpreter.to_string(),
            source_name: source_name.to_string(),
        }
    }

    fn run_command(&self, workspace: &Workspace) -> CommandSpec {
        CommandSpec::new(&self.interpreter).arg(workspace.file(&self.source_name))
    }
}

#[async_trait]
impl LanguageRunner for InterpretedRunner {
    fn language(&self) -> &str {
        &self.language
    }

    async fn compile(
        &self,
        workspace: &Workspace,
        source: &str,
        _limits: &ExecutionLimits,
    ) -> anyhow::Result<CompileResult> {
        workspace.write_file(&self.source_name, source).await?;
        Ok(CompileResult::ok())
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
