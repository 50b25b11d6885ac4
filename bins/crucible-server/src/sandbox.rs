/// Sandboxed Execution Runner
///
/// **Core Responsibility:**
/// Run one synthesized harness program inside an ephemeral, resource-bounded
/// container and return the raw outcome.
///
/// **Docker Execution Rules:**
/// 1. Stage the harness into a fresh temp directory, bind-mounted into the
///    container workdir (compiled languages write build artifacts there).
/// 2. Create the container with network disabled, a memory ceiling with no
///    swap headroom, a CPU quota, a pids ceiling and no-new-privileges.
/// 3. Wait under a hard wall-clock deadline; kill the container when the
///    deadline elapses. A timeout is terminal and never retried.
/// 4. Drain stdout/stderr independently, each capped with an explicit
///    truncation marker, under a short grace budget of its own.
/// 5. Cleanup runs on every exit path: the container through a Drop guard,
///    the staging directory through the TempDir it lives in.
///
/// The runner knows nothing about test cases or scoring; it takes source
/// text and produces a `RawExecutionResult`.
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use crucible_common::types::{ExecStatus, Language, RawExecutionResult};

use crate::config::{LanguageSettings, SandboxSettings, Settings};

pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

const WORKDIR: &str = "/workspace";
const CPU_PERIOD_US: i64 = 100_000;

/// Seam between orchestration and execution, so the pipeline is testable
/// with scripted results.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn supports(&self, language: Language) -> bool;
    async fn execute(&self, language: Language, source: &str) -> RawExecutionResult;
}

pub struct SandboxRunner {
    docker: Docker,
    settings: Settings,
}

impl SandboxRunner {
    pub fn new(settings: Settings) -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().context("Failed to connect to Docker daemon")?;
        Ok(SandboxRunner { docker, settings })
    }
}

#[async_trait]
impl ExecutionBackend for SandboxRunner {
    fn supports(&self, language: Language) -> bool {
        self.settings.supports(language)
    }

    #[tracing::instrument(skip(self, source), fields(language = %language))]
    async fn execute(&self, language: Language, source: &str) -> RawExecutionResult {
        let Some(lang) = self.settings.language(language) else {
            return RawExecutionResult::infra_error(format!("unsupported language: {}", language));
        };

        match self.run_container(lang, source).await {
            Ok(result) => result,
            Err(err) => {
                warn!(language = %language, error = %err, "sandbox execution failed");
                RawExecutionResult::infra_error(format!("{:#}", err))
            }
        }
    }
}

impl SandboxRunner {
    async fn run_container(
        &self,
        lang: &LanguageSettings,
        source: &str,
    ) -> Result<RawExecutionResult> {
        let staging = stage_source(lang, source)?;
        let sandbox = &self.settings.sandbox;

        self.ensure_image(&lang.image)
            .await
            .with_context(|| format!("Execution image '{}' is unavailable", lang.image))?;

        let memory_bytes = i64::from(lang.memory_limit_mb) * 1024 * 1024;
        let host_config = bollard::models::HostConfig {
            binds: Some(vec![format!("{}:{}", staging.path().display(), WORKDIR)]),
            memory: Some(memory_bytes),
            // same ceiling for swap: no headroom beyond the memory limit
            memory_swap: Some(memory_bytes),
            cpu_period: Some(CPU_PERIOD_US),
            cpu_quota: Some((lang.cpu_limit * CPU_PERIOD_US as f64) as i64),
            pids_limit: Some(lang.pids_limit),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            ..Default::default()
        };

        let config = Config {
            image: Some(lang.image.clone()),
            cmd: Some(lang.run_command.clone()),
            working_dir: Some(WORKDIR.to_string()),
            network_disabled: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };

        let container_name = format!("crucible-{}", uuid::Uuid::new_v4());
        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .context("Failed to create container")?;
        let container_id = container.id.clone();

        // Guard set up immediately after creation so the container is
        // removed even if this future panics or is cancelled.
        let _guard = ContainerGuard {
            docker: self.docker.clone(),
            container_id: container_id.clone(),
        };

        let started = Instant::now();
        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .context("Failed to start container")?;

        let deadline = Duration::from_millis(sandbox.timeout_ms);
        let mut timed_out = false;

        let exit_code = match tokio::time::timeout(deadline, self.wait_for_exit(&container_id)).await
        {
            Ok(code) => code,
            Err(_) => {
                timed_out = true;
                debug!(
                    container_id = %container_id,
                    timeout_ms = sandbox.timeout_ms,
                    "deadline elapsed, killing container"
                );
                if let Err(err) = self
                    .docker
                    .kill_container(&container_id, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(container_id = %container_id, error = %err, "failed to kill timed-out container");
                }
                None
            }
        };

        let (stdout, mut stderr) = self.collect_logs(&container_id, sandbox).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        if exit_code == Some(137) && !timed_out {
            stderr.push_str("\n[killed: memory limit exceeded]");
        } else if exit_code == Some(139) {
            stderr.push_str("\n[killed: segmentation fault]");
        }

        let status = if timed_out {
            ExecStatus::Timeout
        } else {
            classify_exit(exit_code, &stderr, &lang.compile_error_markers)
        };

        let error = match status {
            ExecStatus::Success => None,
            ExecStatus::Timeout => Some(format!("execution exceeded {}ms", sandbox.timeout_ms)),
            ExecStatus::CompilationError => Some("candidate source failed to compile".to_string()),
            ExecStatus::Error => Some(
                stderr
                    .lines()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or("execution failed")
                    .to_string(),
            ),
        };

        debug!(
            container_id = %container_id,
            status = %status,
            exit_code = ?exit_code,
            duration_ms = duration_ms,
            "container finished"
        );

        Ok(RawExecutionResult {
            success: status == ExecStatus::Success,
            status,
            exit_code,
            duration_ms,
            stdout,
            stderr,
            error,
        })
        // container removed by the guard, staging dir deleted by TempDir
    }

    async fn wait_for_exit(&self, container_id: &str) -> Option<i64> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut stream = self.docker.wait_container(container_id, Some(options));
        match stream.next().await {
            Some(Ok(response)) => Some(response.status_code),
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Some(code),
            Some(Err(err)) => {
                warn!(container_id = %container_id, error = %err, "error waiting for container");
                None
            }
            None => None,
        }
    }

    /// Drain both streams after the container has stopped. Bounded twice:
    /// per-stream byte ceilings and an overall grace budget, so a log
    /// flood cannot stall the pipeline.
    async fn collect_logs(&self, container_id: &str, sandbox: &SandboxSettings) -> (String, String) {
        let mut stdout = CappedBuffer::new(sandbox.max_output_bytes);
        let mut stderr = CappedBuffer::new(sandbox.max_output_bytes);

        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        };
        let mut stream = self.docker.logs(container_id, Some(options));

        let drain = async {
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => stdout.push(&message),
                    Ok(LogOutput::StdErr { message }) => stderr.push(&message),
                    Ok(_) => {}
                    Err(err) => {
                        warn!(container_id = %container_id, error = %err, "error reading container logs");
                        break;
                    }
                }
            }
        };

        let grace = Duration::from_millis(sandbox.capture_grace_ms);
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!(container_id = %container_id, "log capture exceeded grace budget");
        }

        (stdout.into_string(), stderr.into_string())
    }

    /// Verify the execution image is present, pulling it on a cache miss.
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!("image cache hit: {}", image);
            return Ok(());
        }

        warn!("image cache miss: {} (pulling now)", image);
        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });
        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.context("Failed to pull execution image")?;
        }

        info!("image pulled: {}", image);
        Ok(())
    }
}

/// Removes the container on drop, even if execution panics or is
/// cancelled. Removal is best-effort; failures are logged, never raised.
struct ContainerGuard {
    docker: Docker,
    container_id: String,
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let docker = self.docker.clone();
        let container_id = self.container_id.clone();
        tokio::spawn(async move {
            let options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            if let Err(err) = docker.remove_container(&container_id, Some(options)).await {
                warn!(container_id = %container_id, error = %err, "failed to remove container");
            }
        });
    }
}

/// Write the harness into a fresh staging directory under the language's
/// canonical entry filename. The directory is opened up because the
/// container user does not share our UID and compiled languages write
/// build artifacts next to the source.
fn stage_source(lang: &LanguageSettings, source: &str) -> Result<tempfile::TempDir> {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::Builder::new()
        .prefix("crucible-")
        .tempdir()
        .context("Failed to create staging directory")?;

    let entry_path = dir.path().join(&lang.entry_file);
    std::fs::write(&entry_path, source).context("Failed to write harness source")?;
    std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o777))
        .context("Failed to open staging directory permissions")?;
    std::fs::set_permissions(&entry_path, std::fs::Permissions::from_mode(0o644))
        .context("Failed to set harness permissions")?;

    Ok(dir)
}

/// Exit classification. The marker match is a heuristic, nothing more;
/// the substrings live in configuration because they track interpreter
/// versions, not this code.
fn classify_exit(exit_code: Option<i64>, stderr: &str, markers: &[String]) -> ExecStatus {
    match exit_code {
        Some(0) => ExecStatus::Success,
        _ if markers.iter().any(|m| stderr.contains(m.as_str())) => ExecStatus::CompilationError,
        _ => ExecStatus::Error,
    }
}

/// String accumulator with a byte ceiling; excess is dropped and flagged
/// with a trailing marker instead of silently vanishing.
struct CappedBuffer {
    buf: String,
    cap: usize,
    truncated: bool,
}

impl CappedBuffer {
    fn new(cap: usize) -> Self {
        CappedBuffer {
            buf: String::new(),
            cap,
            truncated: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        if self.truncated {
            return;
        }
        let text = String::from_utf8_lossy(chunk);
        let remaining = self.cap.saturating_sub(self.buf.len());
        if text.len() <= remaining {
            self.buf.push_str(&text);
            return;
        }
        let mut end = remaining;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        self.buf.push_str(&text[..end]);
        self.truncated = true;
    }

    fn into_string(self) -> String {
        if self.truncated {
            self.buf + TRUNCATION_MARKER
        } else {
            self.buf
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn test_classify_exit_success() {
        assert_eq!(classify_exit(Some(0), "", &[]), ExecStatus::Success);
        // exit 0 wins even if stderr is noisy
        assert_eq!(
            classify_exit(Some(0), "SyntaxError mentioned in a warning", &["SyntaxError".into()]),
            ExecStatus::Success
        );
    }

    #[test]
    fn test_classify_exit_compilation_error() {
        let markers = vec!["SyntaxError".to_string()];
        assert_eq!(
            classify_exit(Some(1), "  File \"harness.py\", line 3\nSyntaxError: invalid syntax", &markers),
            ExecStatus::CompilationError
        );
    }

    #[test]
    fn test_classify_exit_generic_error() {
        let markers = vec!["SyntaxError".to_string()];
        assert_eq!(
            classify_exit(Some(1), "ZeroDivisionError: division by zero", &markers),
            ExecStatus::Error
        );
        assert_eq!(classify_exit(None, "", &markers), ExecStatus::Error);
    }

    #[test]
    fn test_capped_buffer_passthrough() {
        let mut buf = CappedBuffer::new(64);
        buf.push(b"hello ");
        buf.push(b"world");
        assert_eq!(buf.into_string(), "hello world");
    }

    #[test]
    fn test_capped_buffer_truncates_with_marker() {
        let mut buf = CappedBuffer::new(8);
        buf.push(b"0123456789abcdef");
        buf.push(b"more");
        let out = buf.into_string();
        assert_eq!(out, format!("01234567{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_capped_buffer_respects_char_boundaries() {
        let mut buf = CappedBuffer::new(5);
        buf.push("ééé".as_bytes()); // 2 bytes per char
        let out = buf.into_string();
        assert!(out.starts_with("éé"));
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_stage_source_writes_entry_file() {
        let settings = Settings::builtin();
        let lang = settings
            .language(Language::Python)
            .expect("python configured");
        let staging = stage_source(lang, "print('hi')").unwrap();
        let entry = staging.path().join("harness.py");
        assert_eq!(std::fs::read_to_string(&entry).unwrap(), "print('hi')");
        let path = staging.path().to_path_buf();
        drop(staging);
        assert!(!path.exists(), "staging directory must be removed on drop");
    }
}
