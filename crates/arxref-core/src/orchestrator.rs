use std::collections::HashSet;
use std::path::{Path, PathBuf};

use arxref_ingest::Workspace;
use arxref_tex::{DviJoinPolicy, ExtractOptions, Toolchain};

use crate::batch::JobSpec;
use crate::collab::{ArxivPathParser, BibcodeResolver, PdfHarvester, PdfRefBackend};
use crate::config::Config;
use crate::error::ExtractError;
use crate::item::{partial_bibcode, ArxivItem};
use crate::outfile;
use crate::{ExtractionOutcome, SourceFormat};

/// A fully resolved batch row. Anything that reaches the compile step has
/// a non-empty bibcode and a valid submission date.
#[derive(Debug, Clone)]
pub struct Job {
    pub item: ArxivItem,
    pub bibcode: String,
    pub accno: String,
    /// YYYYMMDD.
    pub subdate: u32,
}

/// Behavior switches for one driver run.
#[derive(Debug, Clone, Copy)]
pub struct RunFlags {
    /// Recreate outputs even when they are newer than the source.
    pub force: bool,
    /// Fall back to PDF extraction when the TeX path fails.
    pub try_pdf: bool,
    /// Invoke the harvester before the PDF fallback.
    pub harvest: bool,
    /// Run everything but do not write output files.
    pub skip_refs: bool,
    /// Debug verbosity; above 1 scratch directories are retained.
    pub debug: u8,
    pub join_policy: DviJoinPolicy,
}

impl Default for RunFlags {
    fn default() -> RunFlags {
        RunFlags {
            force: false,
            try_pdf: true,
            harvest: true,
            skip_refs: false,
            debug: 0,
            join_policy: DviJoinPolicy::default(),
        }
    }
}

/// Everything one item needs, passed explicitly instead of living in
/// process-global state.
pub struct ExtractionContext<'a> {
    pub config: &'a Config,
    pub flags: RunFlags,
    pub path_parser: &'a dyn ArxivPathParser,
    pub resolver: &'a dyn BibcodeResolver,
    pub harvester: Option<&'a dyn PdfHarvester>,
    pub pdf_backend: Option<&'a dyn PdfRefBackend>,
    /// Category names for the split-eprint repair.
    pub categories: HashSet<String>,
}

/// Process a single batch row.
///
/// Returns the path of the written references file, `None` when processing
/// ran but no file was written (`skip_refs`), or the per-item error.
pub fn process_item(
    ctx: &ExtractionContext,
    spec: &JobSpec,
) -> Result<Option<PathBuf>, ExtractError> {
    let item = ctx
        .path_parser
        .parse(&spec.path)
        .ok_or_else(|| ExtractError::InputMalformed(spec.path.clone()))?;

    let format = SourceFormat::from_suffix(&item.suffix)
        .ok_or_else(|| ExtractError::UnknownFormat(item.suffix.clone()))?;

    let ft_path = locate_source(ctx.config, &item)?;
    let tr_path = ctx
        .config
        .target_refs_base
        .join(format!("{}.raw", item.canonical_relpath));

    if !ctx.flags.force && outfile::is_fresh(&tr_path, &ft_path) {
        tracing::debug!(item = %item.eprint_id, "output is up-to-date");
        return Ok(Some(tr_path));
    }

    let job = resolve_job(ctx, item.clone(), spec)?;
    let min_refs = ctx.config.min_refs;

    let refs = match format {
        SourceFormat::Tex => {
            let outcome = ExtractionOutcome::classify(tex_attempt(ctx, &job, &ft_path), min_refs);
            match outcome {
                ExtractionOutcome::Ok(refs) => refs,
                outcome if ctx.flags.try_pdf => {
                    tracing::warn!(
                        item = %job.item.eprint_id,
                        reason = %outcome.describe(),
                        "TeX extraction did not succeed; trying PDF fallback"
                    );
                    let pdf = harvest_and_locate_pdf(ctx, &job)?;
                    let backend = ctx.pdf_backend.ok_or(ExtractError::NoPdfBackend)?;
                    let refs = backend.extract_references(&pdf)?;
                    ExtractionOutcome::classify(Ok(refs), min_refs).into_result()?
                }
                outcome => outcome.into_result()?,
            }
        }
        SourceFormat::Pdf => {
            let backend = ctx.pdf_backend.ok_or(ExtractError::NoPdfBackend)?;
            let (pdf, _guard) = plain_pdf_path(ctx, &item, &ft_path)?;
            let refs = backend.extract_references(&pdf)?;
            ExtractionOutcome::classify(Ok(refs), min_refs).into_result()?
        }
    };

    if ctx.flags.skip_refs {
        tracing::debug!(item = %job.item.eprint_id, "skipping writing references");
        return Ok(None);
    }

    outfile::write_refs_file(&tr_path, &job.bibcode, &refs)?;
    tracing::info!(
        item = %job.item.eprint_id,
        n = refs.len(),
        target = %tr_path.display(),
        "wrote references"
    );
    Ok(Some(tr_path))
}

/// Find the fulltext on disk: the raw input path first, then the canonical
/// location under the fulltext base.
fn locate_source(config: &Config, item: &ArxivItem) -> Result<PathBuf, ExtractError> {
    let raw = Path::new(&item.raw_path);
    if raw.is_file() {
        return Ok(raw.to_path_buf());
    }

    let name = if item.suffix.is_empty() {
        item.canonical_relpath.clone()
    } else {
        format!("{}.{}", item.canonical_relpath, item.suffix)
    };
    let canonical = config.fulltext_base.join(name);
    if canonical.is_file() {
        Ok(canonical)
    } else {
        Err(ExtractError::SourceMissing(canonical))
    }
}

/// Fill in bibcode, accno, and subdate, consulting the resolver for
/// whatever the input row did not carry.
fn resolve_job(
    ctx: &ExtractionContext,
    item: ArxivItem,
    spec: &JobSpec,
) -> Result<Job, ExtractError> {
    if let (Some(bibcode), Some(subdate)) = (&spec.bibcode, spec.subdate) {
        return Ok(Job {
            item,
            bibcode: bibcode.clone(),
            accno: spec.accno.clone().unwrap_or_default(),
            subdate,
        });
    }

    let partial = partial_bibcode(&item.eprint_id);
    let matches = ctx.resolver.lookup(&partial)?;
    let best = matches
        .first()
        .ok_or_else(|| ExtractError::BibcodeUnresolved(partial.clone()))?;

    tracing::debug!(
        item = %item.eprint_id,
        bibcode = %best.bibcode,
        subdate = best.subdate,
        "resolved bibcode"
    );

    Ok(Job {
        item,
        bibcode: spec.bibcode.clone().unwrap_or_else(|| best.bibcode.clone()),
        accno: spec
            .accno
            .clone()
            .unwrap_or_else(|| best.accno.clone()),
        subdate: spec.subdate.unwrap_or(best.subdate),
    })
}

/// The TeX path: scratch workspace, unpack, and the full engine run. The
/// workspace is destroyed when this returns, success or failure.
fn tex_attempt(
    ctx: &ExtractionContext,
    job: &Job,
    ft_path: &Path,
) -> Result<Vec<String>, ExtractError> {
    let workspace = Workspace::create(&ctx.config.scratch_root, ctx.flags.debug > 1)?;
    arxref_ingest::unpack(workspace.root(), ft_path)?;

    let toolchain = Toolchain::select(job.subdate);
    let options = ExtractOptions {
        convert_ps_retry: true,
        join_policy: ctx.flags.join_policy,
    };

    let refs = arxref_tex::extract_references(
        workspace.root(),
        &toolchain,
        &ctx.config.tex_root,
        &ctx.categories,
        &options,
    )?;
    Ok(refs)
}

/// Ask the harvester for a fresh PDF, then locate it under the fulltext
/// base. The harvester runs unconditionally (before any existence probe);
/// its failure is not fatal since the PDF may already be on disk.
fn harvest_and_locate_pdf(ctx: &ExtractionContext, job: &Job) -> Result<PathBuf, ExtractError> {
    let relpath = format!("{}.pdf", job.item.canonical_relpath);

    if ctx.flags.harvest {
        match ctx.harvester {
            Some(harvester) => {
                if let Err(err) = harvester.harvest(&relpath) {
                    tracing::warn!(item = %job.item.eprint_id, error = %err, "harvest failed");
                }
            }
            None => tracing::debug!("no harvester configured"),
        }
    }

    let pdf = ctx.config.fulltext_base.join(&relpath);
    if pdf.is_file() {
        Ok(pdf)
    } else {
        Err(ExtractError::SourceMissing(pdf))
    }
}

/// For PDF-format items, hand the backend an uncompressed file. A
/// `.pdf.gz` is decompressed into a temporary that lives for the duration
/// of the call.
fn plain_pdf_path(
    ctx: &ExtractionContext,
    item: &ArxivItem,
    ft_path: &Path,
) -> Result<(PathBuf, Option<tempfile::TempPath>), ExtractError> {
    if !item.suffix.ends_with(".gz") {
        return Ok((ft_path.to_path_buf(), None));
    }

    let scratch_err = |source: std::io::Error| {
        ExtractError::Workspace(arxref_ingest::WorkspaceError::Root {
            root: ctx.config.scratch_root.clone(),
            source,
        })
    };

    std::fs::create_dir_all(&ctx.config.scratch_root).map_err(scratch_err)?;
    let tmp = tempfile::Builder::new()
        .prefix(&format!("arxref-{}-", std::process::id()))
        .suffix(".pdf")
        .tempfile_in(&ctx.config.scratch_root)
        .map_err(scratch_err)?;
    let tmp_path = tmp.into_temp_path();

    arxref_ingest::archive::gunzip(ft_path, &tmp_path)?;
    Ok((tmp_path.to_path_buf(), Some(tmp_path)))
}
