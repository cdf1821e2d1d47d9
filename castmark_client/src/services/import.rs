use castmark::import::Importer;
use castmark::lookup::CastLookup;
use castmark::store::BookmarkStore;
use castmark::ResolutionError;
use futures::StreamExt;
use serde::Serialize;
use tracing::{info, instrument, warn};

/// A line of a batch that produced a bookmark
#[derive(Debug, Clone, Serialize)]
pub struct ImportedLine {
    pub line: usize,
    pub input: String,
    pub id: String,
    pub cast_hash: String,
}

/// A line of a batch that could not be imported
#[derive(Debug, Clone, Serialize)]
pub struct FailedLine {
    pub line: usize,
    pub input: String,
    pub message: String,
}

/// Outcome of importing a list of references
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub imported: Vec<ImportedLine>,
    pub already_saved: Vec<ImportedLine>,
    pub failed: Vec<FailedLine>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.imported.len() + self.already_saved.len() + self.failed.len()
    }
}

/// Lines worth importing, numbered from 1
///
/// Blank lines and `#` comments are skipped.
pub fn batch_lines(contents: &str) -> Vec<(usize, &str)> {
    contents
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// Imports every reference in `contents` for one user
///
/// Up to `concurrency` imports run at once. Lines that can't be a cast
/// reference fail without a lookup.
#[instrument(skip(importer, contents))]
pub async fn import_all<L, S>(
    importer: &Importer<L, S>,
    user_id: &str,
    contents: &str,
    concurrency: usize,
) -> BatchReport
where
    L: CastLookup + Sync,
    S: BookmarkStore + Sync,
{
    let lines = batch_lines(contents);
    info!(lines = lines.len(), "Importing batch");

    let mut results = futures::stream::iter(lines)
        .map(|(line, input)| async move {
            let result = if importer.resolver().is_plausible_reference(input) {
                importer.import(user_id, input).await
            } else {
                let err = importer
                    .resolver()
                    .resolve_reference(input)
                    .err()
                    .unwrap_or(ResolutionError::UnsupportedFormat);
                Err(castmark::Error::from(err))
            };
            (line, input, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    results.sort_by_key(|(line, _, _)| *line);

    let mut report = BatchReport::default();
    for (line, input, result) in results {
        match result {
            Ok(outcome) => {
                let entry = ImportedLine {
                    line,
                    input: input.to_string(),
                    id: outcome.saved.bookmark().id.clone(),
                    cast_hash: outcome.saved.bookmark().cast_hash.clone(),
                };
                if outcome.saved.is_new() {
                    report.imported.push(entry);
                } else {
                    report.already_saved.push(entry);
                }
            }
            Err(err) => {
                warn!(line, input, error = %err, "Line failed to import");
                report.failed.push(FailedLine {
                    line,
                    input: input.to_string(),
                    message: err.user_message(),
                });
            }
        }
    }

    info!(
        imported = report.imported.len(),
        already_saved = report.already_saved.len(),
        failed = report.failed.len(),
        "Batch finished"
    );

    report
}
