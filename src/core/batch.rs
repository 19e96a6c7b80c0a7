use crate::core::writer::write_record;
use crate::domain::ports::{ContainerWriter, Decoder};
use crate::utils::error::{error_chain, ConvertError, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// A matched input file and where its container goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub file_name: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Whether the output existed when the plan was made.
    pub output_exists: bool,
}

/// Counters for one batch run.
///
/// `total` is every matched file, skipped ones included, so
/// `succeeded + failed + skipped == total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct BatchConverter<D: Decoder, W: ContainerWriter> {
    decoder: D,
    writer: W,
    source_extension: String,
}

impl<D: Decoder, W: ContainerWriter> BatchConverter<D, W> {
    pub fn new(decoder: D, writer: W) -> Self {
        let source_extension = decoder.extension().to_string();
        Self {
            decoder,
            writer,
            source_extension,
        }
    }

    /// Matches input files by `extension` instead of the decoder's default.
    pub fn with_source_extension(mut self, extension: impl Into<String>) -> Self {
        self.source_extension = extension.into();
        self
    }

    /// Lists the matched files of `input_dir` in directory order, with their
    /// output paths. Nothing is created or written.
    pub fn plan(&self, input_dir: &Path, output_dir: &Path) -> Result<Vec<PlannedFile>> {
        let suffix = format!(".{}", self.source_extension);
        let mut planned = Vec::new();

        for entry in fs::read_dir(input_dir)? {
            let entry = entry?;
            let input_path = entry.path();
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.ends_with(&suffix) || !input_path.is_file() {
                continue;
            }

            let output_path = output_dir.join(self.output_name(&input_path));
            let output_exists = output_path.exists();
            planned.push(PlannedFile {
                file_name,
                input_path,
                output_path,
                output_exists,
            });
        }

        Ok(planned)
    }

    // Same base name with the container extension.
    fn output_name(&self, input_path: &Path) -> OsString {
        let mut name = input_path
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_default();
        name.push(".");
        name.push(self.writer.extension());
        name
    }

    /// Converts every matched file of `input_dir` into `output_dir`.
    ///
    /// Files whose output already exists are skipped. A file that fails to
    /// load or write is reported and counted, and the batch moves on; only
    /// an unusable input or output directory aborts the run.
    pub fn convert_all(&self, input_dir: &Path, output_dir: &Path) -> Result<BatchSummary> {
        fs::create_dir_all(output_dir)?;

        println!("Input directory: {}", absolute(input_dir).display());
        println!("Output directory: {}", absolute(output_dir).display());

        let files = self.plan(input_dir, output_dir)?;
        println!(
            "Found {} .{} files in the input directory",
            files.len(),
            self.source_extension
        );

        let mut summary = BatchSummary {
            total: files.len(),
            ..Default::default()
        };

        if files.is_empty() {
            println!(
                "No .{} files found in the input directory.",
                self.source_extension
            );
            return Ok(summary);
        }

        println!("List of .{} files found:", self.source_extension);
        for file in &files {
            println!("  - {}", file.file_name);
        }

        for file in &files {
            println!("\nProcessing file: {}", file.file_name);

            // Re-checked per file; `output_exists` is only a dry-run snapshot.
            if file.output_path.exists() {
                println!(
                    "Container file already exists for {}, skipping",
                    file.file_name
                );
                summary.skipped += 1;
                continue;
            }

            if self.convert_file(file) {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
        }

        tracing::debug!(?summary, "batch finished");
        println!(
            "\nConversion process completed. Successfully converted {} out of {} files.",
            summary.succeeded, summary.total
        );
        if summary.skipped > 0 {
            println!("{} files skipped because their output already exists.", summary.skipped);
        }

        Ok(summary)
    }

    fn convert_file(&self, file: &PlannedFile) -> bool {
        let loaded = fs::read(&file.input_path)
            .map_err(ConvertError::from)
            .and_then(|bytes| {
                tracing::debug!(bytes = bytes.len(), file = %file.file_name, "read input");
                self.decoder.decode(&bytes)
            });
        let record = match loaded {
            Ok(record) => record,
            Err(e) => {
                println!("Error processing {}: {}", file.file_name, error_chain(&e));
                tracing::debug!(suggestion = e.recovery_suggestion(), "decode failed");
                return false;
            }
        };

        println!("Successfully loaded file: {}", file.input_path.display());
        write_record(&self.writer, &record, &file.output_path)
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
