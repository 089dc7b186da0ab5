//! External MSA tool integration.
//!
//! The consensus step and the insertion-pool step both shell out to an MSA
//! aligner. The contract is narrow: given an input FASTA path and an output
//! FASTA path, the tool must leave an aligned FASTA with equal row lengths
//! at the output on success. The trait keeps the subprocess plumbing out of
//! the core so tests can substitute an in-process implementation.

use std::path::Path;
use std::process::Command;

use crate::error::{MsaError, Result};

/// Injectable multiple-sequence-alignment collaborator.
pub trait MsaTool: Send + Sync {
    /// Align `input` into `output`. `threads` is advisory.
    fn align(&self, input: &Path, output: &Path, threads: usize) -> Result<()>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Built-in package keywords and their command templates.
const PACKAGES: &[(&str, &str)] = &[
    ("minipoa", "minipoa -t {thread} {input} > {output}"),
    ("mafft", "mafft --auto --thread {thread} {input} > {output}"),
    (
        "clustalo",
        "clustalo --force --threads {thread} -i {input} -o {output}",
    ),
];

/// Subprocess-backed [`MsaTool`] driven by a command template.
///
/// The template must contain `{input}` and `{output}`; `{thread}` is
/// optional. Built-in keywords (`minipoa`, `mafft`, `clustalo`) expand to
/// their templates.
pub struct CommandMsaTool {
    template: String,
}

impl CommandMsaTool {
    /// Resolve a `-p` specification: a known keyword or a raw template.
    pub fn from_spec(spec: &str) -> Result<Self> {
        if let Some((_, template)) = PACKAGES.iter().find(|(name, _)| *name == spec) {
            return Ok(CommandMsaTool {
                template: template.to_string(),
            });
        }

        if !spec.contains("{input}") || !spec.contains("{output}") {
            return Err(MsaError::invalid(format!(
                "alignment package '{}' is not a known keyword and does not \
                 contain both {{input}} and {{output}}",
                spec
            )));
        }
        Ok(CommandMsaTool {
            template: spec.to_string(),
        })
    }

    fn render(&self, input: &Path, output: &Path, threads: usize) -> String {
        self.template
            .replace("{input}", &input.display().to_string())
            .replace("{output}", &output.display().to_string())
            .replace("{thread}", &threads.max(1).to_string())
    }
}

impl MsaTool for CommandMsaTool {
    fn align(&self, input: &Path, output: &Path, threads: usize) -> Result<()> {
        let command = self.render(input, output, threads);
        log::info!("running external aligner: {}", command);

        let result = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .output()
            .map_err(|e| MsaError::io("sh", e))?;

        if !result.status.success() {
            return Err(MsaError::ExternalTool {
                command,
                status: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
            });
        }

        log::debug!("external aligner finished: {}", output.display());
        Ok(())
    }

    fn describe(&self) -> String {
        self.template.clone()
    }
}
