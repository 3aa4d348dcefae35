use std::io;
use std::path::PathBuf;

use clap::Parser;

use arxref_core::collab::{default_arxiv_categories, BibcodeResolver, PdfRefBackend};
use arxref_core::{run_batch, Config, ExtractionContext, RunFlags, StandardPathParser};

mod backend;
mod resolver;

use backend::CommandPdfBackend;
use resolver::{EmptyResolver, ListResolver};

/// Extract bibliographic references from ArXiv preprint sources.
///
/// Jobs are read from stdin, one per line: the fulltext path and
/// optionally its bibcode, accno number, and submission date. For each
/// item whose references were extracted, a `path<TAB>target` line is
/// written to stdout. Diagnostics go to stderr; the exit code is 0
/// regardless of per-item failures.
#[derive(Parser, Debug)]
#[command(name = "arxref", version, about)]
struct Cli {
    /// Alternative base directory for fulltext sources
    #[arg(long, value_name = "DIR", env = "ARXREF_PBASE")]
    pbase: Option<PathBuf>,

    /// Alternative base directory for target reference files
    #[arg(long, value_name = "DIR", env = "ARXREF_TBASE")]
    tbase: Option<PathBuf>,

    /// Root directory of the historical TeX installations
    #[arg(long, value_name = "DIR", env = "ARXREF_TEXBASE")]
    texbase: Option<PathBuf>,

    /// Directory for per-item scratch workspaces
    #[arg(long, value_name = "DIR", env = "ARXREF_SCRATCH")]
    scratch: Option<PathBuf>,

    /// Bibcode lookup table for jobs that omit the bibcode
    #[arg(long, value_name = "FILE", env = "ARXREF_BIB2ACCNO")]
    bib2accno: Option<PathBuf>,

    /// External command for the PDF fallback (one reference per line)
    #[arg(long, value_name = "CMD", env = "ARXREF_PDF_EXTRACTOR")]
    pdf_extractor: Option<String>,

    /// Force recreation of references even if the target file exists and
    /// is more recent than the source
    #[arg(long)]
    force: bool,

    /// Do not attempt to process PDF files if the original source was
    /// LaTeX (implies --no-harvest)
    #[arg(long)]
    no_pdf: bool,

    /// Do not attempt to harvest or refresh PDF files
    #[arg(long)]
    no_harvest: bool,

    /// Perform processing but skip writing the references
    #[arg(long)]
    skip_refs: bool,

    /// Print debugging information (repeat for more detail; above one
    /// level, scratch directories are retained)
    #[arg(long, short = 'd', action = clap::ArgAction::Count)]
    debug: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let mut config = Config::new_defaults();
    if let Some(pbase) = cli.pbase {
        config.fulltext_base = pbase;
    }
    if let Some(tbase) = cli.tbase {
        config.target_refs_base = tbase;
    }
    if let Some(texbase) = cli.texbase {
        config.tex_root = texbase;
    }
    if let Some(scratch) = cli.scratch {
        config.scratch_root = scratch;
    }

    let flags = RunFlags {
        force: cli.force,
        try_pdf: !cli.no_pdf,
        harvest: !(cli.no_harvest || cli.no_pdf),
        skip_refs: cli.skip_refs,
        debug: cli.debug,
        ..Default::default()
    };

    let resolver: Box<dyn BibcodeResolver> = match &cli.bib2accno {
        Some(path) => Box::new(ListResolver::load(path)?),
        None => Box::new(EmptyResolver),
    };

    let pdf_backend = cli
        .pdf_extractor
        .as_deref()
        .and_then(CommandPdfBackend::new);

    let parser = StandardPathParser;
    let ctx = ExtractionContext {
        config: &config,
        flags,
        path_parser: &parser,
        resolver: resolver.as_ref(),
        harvester: None,
        pdf_backend: pdf_backend.as_ref().map(|b| b as &dyn PdfRefBackend),
        categories: default_arxiv_categories(),
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    run_batch(&ctx, stdin.lock(), &mut stdout)?;

    // Per-item failures are reported in the summary, not the exit code.
    Ok(())
}

/// Logging always goes to stderr; stdout is a parsed data stream.
fn init_logging(debug: u8) {
    use tracing_subscriber::EnvFilter;

    let default_level = match debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
