//! Executor that runs the generation pipeline as an external program.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::traits::{ExecutionOutcome, JobContext, PipelineExecutor};
use crate::{Error, Result};

/// Configuration for [`CommandExecutor`].
///
/// `args` and `output_template` may contain the placeholders `{job_id}`,
/// `{speaker}`, `{music}` and `{subtitles}`; `args` may also reference
/// `{output}`, the rendered output path. The letter itself is written to the
/// program's stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandExecutorConfig {
    pub program: String,
    pub args: Vec<String>,
    pub output_template: String,
    /// Kill the program after this many seconds. `None` waits indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for CommandExecutorConfig {
    fn default() -> Self {
        Self {
            program: "genqueue-pipeline".to_string(),
            args: [
                "--job-id",
                "{job_id}",
                "--speaker",
                "{speaker}",
                "--music",
                "{music}",
                "--subtitles",
                "{subtitles}",
                "--output",
                "{output}",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            output_template: "videos/final_video_{job_id}.mp4".to_string(),
            timeout_secs: None,
        }
    }
}

/// Runs one child process per job and maps its exit to an [`ExecutionOutcome`].
///
/// A zero exit status with the expected output file present is a success. A
/// non-zero exit is a failure whose reason is the last non-empty stderr line.
pub struct CommandExecutor {
    config: CommandExecutorConfig,
}

impl CommandExecutor {
    pub fn new(config: CommandExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CommandExecutorConfig {
        &self.config
    }

    fn substitute_variables(template: &str, ctx: &JobContext, output: Option<&str>) -> String {
        let rendered = template
            .replace("{job_id}", ctx.job_id.as_str())
            .replace("{speaker}", ctx.request.speaker.as_str())
            .replace("{music}", if ctx.request.music { "true" } else { "false" })
            .replace(
                "{subtitles}",
                if ctx.request.subtitles { "true" } else { "false" },
            );
        match output {
            Some(output) => rendered.replace("{output}", output),
            None => rendered,
        }
    }

    fn output_path(&self, ctx: &JobContext) -> String {
        Self::substitute_variables(&self.config.output_template, ctx, None)
    }

    fn timed_out(&self, ctx: &JobContext) -> ExecutionOutcome {
        let secs = self.config.timeout_secs.unwrap_or_default();
        error!(job_id = %ctx.job_id, "Pipeline timed out after {}s", secs);
        ExecutionOutcome::failure(format!("pipeline timed out after {}s", secs))
    }
}

fn abort_reader<T>(reader: &Option<JoinHandle<T>>) {
    if let Some(handle) = reader {
        handle.abort();
    }
}

/// Await `fut`, giving up at `deadline` when one is set.
async fn within<F: Future>(deadline: Option<tokio::time::Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

#[async_trait]
impl PipelineExecutor for CommandExecutor {
    fn name(&self) -> &'static str {
        "CommandExecutor"
    }

    async fn run(&self, ctx: &JobContext) -> Result<ExecutionOutcome> {
        let start = Instant::now();
        let deadline = self
            .config
            .timeout_secs
            .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
        let output = self.output_path(ctx);

        if let Some(parent) = Path::new(&output).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|arg| Self::substitute_variables(arg, ctx, Some(&output)))
            .collect();

        info!(
            job_id = %ctx.job_id,
            program = %self.config.program,
            "Starting pipeline: {} {}",
            self.config.program,
            args.join(" ")
        );

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::executor(format!(
                "Failed to spawn {}: {}",
                self.config.program, e
            ))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let letter = ctx.request.letter.clone().into_bytes();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&letter).await {
                    debug!("Pipeline closed stdin early: {}", e);
                }
                let _ = stdin.shutdown().await;
            });
        }

        let mut stdout_handle = child.stdout.take().map(|stdout| {
            let job_id = ctx.job_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(job_id = %job_id, "stdout: {}", line);
                }
            })
        });

        let mut stderr_handle = child.stderr.take().map(|stderr| {
            let job_id = ctx.job_id.clone();
            tokio::spawn(async move {
                let mut last_line: Option<String> = None;
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.contains("error") || line.contains("Error") {
                        warn!(job_id = %job_id, "stderr: {}", line);
                    } else {
                        debug!(job_id = %job_id, "stderr: {}", line);
                    }
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        last_line = Some(trimmed.to_string());
                    }
                }
                last_line
            })
        });

        let waited = within(deadline, child.wait()).await;

        let status = match waited {
            Some(Ok(status)) => status,
            Some(Err(e)) => {
                return Err(Error::executor(format!(
                    "Failed to wait for pipeline: {}",
                    e
                )));
            }
            None => {
                let _ = child.kill().await;
                abort_reader(&stdout_handle);
                abort_reader(&stderr_handle);
                return Ok(self.timed_out(ctx));
            }
        };

        // Descendants of the pipeline may still hold its pipes open after it exits.
        let drained = within(deadline, async {
            if let Some(h) = stdout_handle.as_mut() {
                let _ = h.await;
            }
            match stderr_handle.as_mut() {
                Some(h) => h.await.ok().flatten(),
                None => None,
            }
        })
        .await;

        let Some(last_stderr) = drained else {
            abort_reader(&stdout_handle);
            abort_reader(&stderr_handle);
            return Ok(self.timed_out(ctx));
        };

        let duration = start.elapsed().as_secs_f64();

        if !status.success() {
            warn!(job_id = %ctx.job_id, "Pipeline exited with status: {}", status);
            let reason = last_stderr.unwrap_or_else(|| match status.code() {
                Some(code) => format!("pipeline exited with code {}", code),
                None => "pipeline terminated by signal".to_string(),
            });
            return Ok(ExecutionOutcome::failure(reason));
        }

        if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
            warn!(job_id = %ctx.job_id, "Pipeline did not produce {}", output);
            return Ok(ExecutionOutcome::failure(format!(
                "pipeline finished without producing {}",
                output
            )));
        }

        info!(job_id = %ctx.job_id, "Pipeline completed in {:.2}s", duration);
        Ok(ExecutionOutcome::success(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::job::{GenerationRequest, JobId, Speaker};

    fn context(letter: &str) -> JobContext {
        JobContext {
            job_id: JobId::new(),
            request: GenerationRequest::new(letter, Speaker::Bergholz).with_music(false),
        }
    }

    #[test]
    fn test_variable_substitution() {
        let ctx = context("letter");
        let rendered = CommandExecutor::substitute_variables(
            "--id {job_id} --voice {speaker} --music {music} --subs {subtitles} -o {output}",
            &ctx,
            Some("/out.mp4"),
        );
        assert_eq!(
            rendered,
            format!(
                "--id {} --voice bergholz --music false --subs true -o /out.mp4",
                ctx.job_id
            )
        );
    }

    #[test]
    fn test_default_output_template() {
        let executor = CommandExecutor::new(CommandExecutorConfig::default());
        let ctx = context("letter");
        assert_eq!(
            executor.output_path(&ctx),
            format!("videos/final_video_{}.mp4", ctx.job_id)
        );
        assert_eq!(executor.name(), "CommandExecutor");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_fault() {
        let dir = tempfile::tempdir().unwrap();
        let executor = CommandExecutor::new(CommandExecutorConfig {
            program: "/definitely/not/a/pipeline".to_string(),
            args: vec![],
            output_template: dir.path().join("{job_id}.mp4").display().to_string(),
            timeout_secs: None,
        });

        let result = executor.run(&context("letter")).await;
        assert!(matches!(result, Err(Error::Executor(_))));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        fn sh_executor(dir: &Path, script: &str, timeout_secs: Option<u64>) -> CommandExecutor {
            CommandExecutor::new(CommandExecutorConfig {
                program: "sh".to_string(),
                args: vec![
                    "-c".to_string(),
                    script.to_string(),
                    "sh".to_string(),
                    "{output}".to_string(),
                ],
                output_template: dir.join("out/{job_id}.mp4").display().to_string(),
                timeout_secs,
            })
        }

        #[tokio::test]
        async fn test_success_reads_letter_from_stdin() {
            let dir = tempfile::tempdir().unwrap();
            let executor = sh_executor(dir.path(), "cat > \"$1\"", None);
            let ctx = context("Dear mother, we are well.");

            let outcome = executor.run(&ctx).await.unwrap();
            let expected = dir
                .path()
                .join(format!("out/{}.mp4", ctx.job_id))
                .display()
                .to_string();
            assert_eq!(outcome, ExecutionOutcome::success(expected.clone()));
            assert_eq!(
                std::fs::read_to_string(expected).unwrap(),
                "Dear mother, we are well."
            );
        }

        #[tokio::test]
        async fn test_failure_uses_last_stderr_line() {
            let dir = tempfile::tempdir().unwrap();
            let executor = sh_executor(
                dir.path(),
                "echo 'loading models' >&2; echo 'bad input' >&2; exit 3",
                None,
            );

            let outcome = executor.run(&context("letter")).await.unwrap();
            assert_eq!(outcome, ExecutionOutcome::failure("bad input"));
        }

        #[tokio::test]
        async fn test_failure_without_stderr_reports_exit_code() {
            let dir = tempfile::tempdir().unwrap();
            let executor = sh_executor(dir.path(), "exit 4", None);

            let outcome = executor.run(&context("letter")).await.unwrap();
            assert_eq!(
                outcome,
                ExecutionOutcome::failure("pipeline exited with code 4")
            );
        }

        #[tokio::test]
        async fn test_missing_output_is_failure() {
            let dir = tempfile::tempdir().unwrap();
            let executor = sh_executor(dir.path(), "true", None);

            match executor.run(&context("letter")).await.unwrap() {
                ExecutionOutcome::Failure { reason } => {
                    assert!(reason.contains("without producing"), "{reason}")
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_timeout_kills_pipeline() {
            let dir = tempfile::tempdir().unwrap();
            let executor = sh_executor(dir.path(), "sleep 30", Some(1));

            let started = Instant::now();
            let outcome = executor.run(&context("letter")).await.unwrap();
            assert_eq!(
                outcome,
                ExecutionOutcome::failure("pipeline timed out after 1s")
            );
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test]
        async fn test_timeout_covers_pipes_held_by_descendants() {
            let dir = tempfile::tempdir().unwrap();
            // The backgrounded sleep inherits stdout/stderr and outlives the shell.
            let executor = sh_executor(dir.path(), "sleep 6 & exit 1", Some(1));

            let started = Instant::now();
            let outcome = executor.run(&context("letter")).await.unwrap();
            assert_eq!(
                outcome,
                ExecutionOutcome::failure("pipeline timed out after 1s")
            );
            assert!(started.elapsed() < Duration::from_secs(3));
        }
    }
}
