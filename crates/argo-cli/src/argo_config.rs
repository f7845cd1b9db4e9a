//! Configuration of the partitioning pipeline
//!
//! This module ties together all options that can be given in a
//! configuration file or through environment variables prefixed with `ARGO_`.
//! Options given on the command line take precedence.

use std::num::NonZeroUsize;

use argo_algorithm::{
    condition::{ExportError, OutputPathTemplate},
    partitioning::{PartitionerOptions, WaitlistPolicy},
};
use serde::Deserialize;

/// Output path template used if none is configured
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "output/ResidualCondition.%d.spc";

/// Type representing configuration options of the `argo` pipeline
///
/// This type implements `serde::Deserialize` to parse the configuration out of
/// structured configuration, such as a `config` source.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ArgoConfig {
    /// Number of partitions
    splits: Option<NonZeroUsize>,
    /// Behaviour if exploration did not terminate
    waitlist_policy: Option<WaitlistPolicy>,
    /// Attach witnesses to target nodes before splitting
    consolidate_counterexamples: Option<bool>,
    /// Where and how to write residual conditions
    output: Option<OutputConfig>,
}

/// Output options for residual conditions
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Path template containing `%d`
    template: Option<String>,
    /// Compress the written conditions with gzip
    compress: Option<bool>,
}

impl ArgoConfig {
    /// Set the number of partitions
    pub fn set_splits(&mut self, splits: NonZeroUsize) {
        self.splits = Some(splits);
    }

    /// Set the behaviour for incomplete exploration
    pub fn set_waitlist_policy(&mut self, policy: WaitlistPolicy) {
        self.waitlist_policy = Some(policy);
    }

    /// Enable or disable counterexample consolidation
    pub fn set_consolidate_counterexamples(&mut self, consolidate: bool) {
        self.consolidate_counterexamples = Some(consolidate);
    }

    /// Set the output path template
    pub fn set_output_template(&mut self, template: String) {
        self.output_mut().template = Some(template);
    }

    /// Enable or disable compression of the output
    pub fn set_compress(&mut self, compress: bool) {
        self.output_mut().compress = Some(compress);
    }

    fn output_mut(&mut self) -> &mut OutputConfig {
        self.output.get_or_insert(OutputConfig {
            template: None,
            compress: None,
        })
    }

    /// Whether counterexamples are consolidated, enabled by default
    pub fn consolidate_counterexamples(&self) -> bool {
        self.consolidate_counterexamples.unwrap_or(true)
    }

    /// Options for the partitioner, `None` if the number of splits is not
    /// configured
    pub fn get_partitioner_options(&self) -> Option<PartitionerOptions> {
        let splits = self.splits?;
        Some(
            PartitionerOptions::new(splits)
                .with_waitlist_policy(self.waitlist_policy.unwrap_or_default()),
        )
    }

    /// Output path template, compressed unless disabled
    pub fn get_output_template(&self) -> Result<OutputPathTemplate, ExportError> {
        let template = self
            .output
            .as_ref()
            .and_then(|o| o.template.clone())
            .unwrap_or_else(|| DEFAULT_OUTPUT_TEMPLATE.to_string());
        let compress = self
            .output
            .as_ref()
            .and_then(|o| o.compress)
            .unwrap_or(true);

        Ok(OutputPathTemplate::new(template)?.with_compression(compress))
    }
}
