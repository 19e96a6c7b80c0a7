use crate::adapters::{NpzWriter, PickleDecoder};
use crate::core::batch::{BatchConverter, BatchSummary, PlannedFile};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::Result;
use std::path::Path;

/// Runs the pickle to `.npz` conversion described by a config.
pub struct ConversionEngine<C: ConfigProvider> {
    config: C,
}

impl<C: ConfigProvider> ConversionEngine<C> {
    pub fn new(config: C) -> Self {
        Self { config }
    }

    pub fn converter(&self) -> BatchConverter<PickleDecoder, NpzWriter> {
        BatchConverter::new(PickleDecoder::new(), NpzWriter::new())
            .with_source_extension(self.config.source_extension())
    }

    pub fn run(&self) -> Result<BatchSummary> {
        tracing::info!(
            input = self.config.input_dir(),
            output = self.config.output_dir(),
            "starting conversion"
        );
        let summary = self.converter().convert_all(
            Path::new(self.config.input_dir()),
            Path::new(self.config.output_dir()),
        )?;
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            total = summary.total,
            "conversion finished"
        );
        Ok(summary)
    }

    /// Prints the plan without creating or writing anything.
    pub fn dry_run(&self) -> Result<Vec<PlannedFile>> {
        let planned = self.converter().plan(
            Path::new(self.config.input_dir()),
            Path::new(self.config.output_dir()),
        )?;

        println!(
            "Found {} .{} files in {}",
            planned.len(),
            self.config.source_extension(),
            self.config.input_dir()
        );
        for file in &planned {
            let action = if file.output_exists { "skip" } else { "convert" };
            println!(
                "  [{}] {} -> {}",
                action,
                file.file_name,
                file.output_path.display()
            );
        }
        Ok(planned)
    }
}
