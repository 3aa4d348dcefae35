use std::path::Path;
use std::time::Duration;

use arxref_core::collab::{CollabError, PdfRefBackend};
use arxref_tex::process;

const EXTRACTOR_TIMEOUT: Duration = Duration::from_secs(120);

/// PDF fallback backend that shells out to an external extractor command.
///
/// The command is given the PDF path as its final argument and is expected
/// to print one reference string per stdout line. Output is captured
/// through a temporary file so the extractor's stdout never mixes with the
/// driver's own.
#[derive(Debug)]
pub struct CommandPdfBackend {
    program: String,
    args: Vec<String>,
}

impl CommandPdfBackend {
    /// Split a command string like `"pdfrefs --plain"` into program and
    /// fixed arguments. Returns `None` for an empty command.
    pub fn new(command: &str) -> Option<CommandPdfBackend> {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts.next()?;
        Some(CommandPdfBackend {
            program,
            args: parts.collect(),
        })
    }
}

impl PdfRefBackend for CommandPdfBackend {
    fn extract_references(&self, pdf: &Path) -> Result<Vec<String>, CollabError> {
        let out = tempfile::NamedTempFile::new()?;
        let cwd = std::env::temp_dir();

        let pdf_str = pdf.to_string_lossy();
        let mut args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        args.push(&pdf_str);

        let status =
            process::run_stdout_to(EXTRACTOR_TIMEOUT, &cwd, &self.program, &args, out.path())
                .map_err(|err| CollabError::PdfBackend(err.to_string()))?;

        if !status.success() {
            return Err(CollabError::PdfBackend(format!(
                "`{}` exited with code {}",
                self.program,
                status.code()
            )));
        }

        let content = std::fs::read_to_string(out.path())?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }
}
