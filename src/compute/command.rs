//! # Generador por Proceso Externo
//! src/compute/command.rs
//!
//! Ejecuta el programa configurado (`--generator-cmd`) por cada job:
//!
//! - stdin: bytes de la imagen de entrada
//! - `IMAGE_QUEUE_JOB_ID`: ID del job
//! - `IMAGE_QUEUE_PARAMS`: parámetros en JSON (sin la imagen)
//! - stdout: PNG generado
//!
//! Un exit code distinto de cero es una falla; si stderr menciona falta de
//! memoria se clasifica como `ResourceExhausted`.

use super::{Artifact, Generator};
use crate::error::ComputeError;
use crate::jobs::params::GenerationParams;
use crate::jobs::types::JobId;
use regex::{Regex, RegexBuilder};
use std::io::Write;
use std::process::{Command, Output, Stdio};
use std::sync::LazyLock;
use std::thread;

/// Patrones de stderr que indican falta de memoria
const OUT_OF_MEMORY_PATTERN: &str = r"out of memory|outofmemory|insufficient .*memory|cannot allocate memory";

static OUT_OF_MEMORY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(OUT_OF_MEMORY_PATTERN)
        .case_insensitive(true)
        .build()
        .expect("out of memory regex is valid")
});

/// Generador que delega en un proceso externo
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    /// Crea el generador a partir de una línea de comando
    /// (programa seguido de argumentos separados por espacios)
    pub fn new(command_line: &str) -> Self {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            args: parts.collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, job_id: &JobId, params: &GenerationParams) -> std::io::Result<Output> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("IMAGE_QUEUE_JOB_ID", job_id.to_string())
            .env("IMAGE_QUEUE_PARAMS", params.summary().to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // stdin se escribe en paralelo para no bloquearse con un stdout lleno
        let stdin = child.stdin.take();
        thread::scope(|scope| {
            if let Some(mut stdin) = stdin {
                scope.spawn(move || {
                    if let Err(e) = stdin.write_all(&params.image.bytes) {
                        tracing::debug!(job_id = %job_id, error = %e, "Generator closed stdin early");
                    }
                });
            }
            child.wait_with_output()
        })
    }
}

impl Generator for CommandGenerator {
    fn generate(&self, job_id: &JobId, params: &GenerationParams) -> Result<Artifact, ComputeError> {
        let output = self.run(job_id, params).map_err(ComputeError::Spawn)?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let detail = format!("{} ({})", stderr.trim(), output.status);
            return Err(if is_resource_exhaustion(&stderr) {
                ComputeError::ResourceExhausted(detail)
            } else {
                ComputeError::Runtime(detail)
            });
        }

        if output.stdout.is_empty() {
            return Err(ComputeError::Runtime(
                "generator exited successfully but produced no output".to_string(),
            ));
        }

        Ok(Artifact::png(output.stdout))
    }
}

/// Indica si el mensaje de error describe falta de memoria
pub fn is_resource_exhaustion(stderr: &str) -> bool {
    OUT_OF_MEMORY_REGEX.is_match(stderr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::params::tests::sample_params;

    #[test]
    fn test_parse_command_line() {
        let generator = CommandGenerator::new("python3 generate.py --fast");
        assert_eq!(generator.program(), "python3");
        assert_eq!(generator.args, vec!["generate.py", "--fast"]);
    }

    #[test]
    fn test_out_of_memory_pattern_compiles() {
        assert!(RegexBuilder::new(OUT_OF_MEMORY_PATTERN).build().is_ok());
        assert!(OUT_OF_MEMORY_REGEX.is_match("CUDA OUT OF MEMORY"));
    }

    #[test]
    fn test_resource_exhaustion_classification() {
        assert!(is_resource_exhaustion("torch.cuda.OutOfMemoryError: CUDA out of memory."));
        assert!(is_resource_exhaustion("RuntimeError: Insufficient GPU memory"));
        assert!(is_resource_exhaustion("fork: Cannot allocate memory"));
        assert!(!is_resource_exhaustion("ValueError: invalid prompt"));
        assert!(!is_resource_exhaustion(""));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let generator = CommandGenerator::new("/definitely/not/a/real/generator-binary");
        let result = generator.generate(&JobId::new(), &sample_params());
        assert!(matches!(result, Err(ComputeError::Spawn(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_stdout_becomes_artifact() {
        // `cat` devuelve la imagen de entrada tal cual
        let generator = CommandGenerator::new("cat");
        let params = sample_params();
        let artifact = generator.generate(&JobId::new(), &params).unwrap();
        assert_eq!(artifact.bytes, params.image.bytes);
        assert_eq!(artifact.extension, "png");
    }

    #[cfg(unix)]
    #[test]
    fn test_out_of_memory_exit() {
        let generator = CommandGenerator {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "cat > /dev/null; echo 'CUDA out of memory' >&2; exit 1".to_string(),
            ],
        };
        let result = generator.generate(&JobId::new(), &sample_params());
        assert!(matches!(result, Err(ComputeError::ResourceExhausted(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_generic_failure_exit() {
        let generator = CommandGenerator {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "cat > /dev/null; echo 'bad tensor shape' >&2; exit 3".to_string(),
            ],
        };
        let result = generator.generate(&JobId::new(), &sample_params());
        match result {
            Err(ComputeError::Runtime(detail)) => assert!(detail.contains("bad tensor shape")),
            other => panic!("expected runtime error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_empty_output_is_failure() {
        let generator = CommandGenerator {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "cat > /dev/null".to_string()],
        };
        let result = generator.generate(&JobId::new(), &sample_params());
        assert!(matches!(result, Err(ComputeError::Runtime(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_params_passed_in_environment() {
        let generator = CommandGenerator {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "cat > /dev/null; printf '%s' \"$IMAGE_QUEUE_PARAMS\"".to_string(),
            ],
        };
        let artifact = generator.generate(&JobId::new(), &sample_params()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&artifact.bytes).unwrap();
        assert_eq!(json["width"], 1024);
        assert_eq!(json["num_inference_steps"], 28);
    }
}
