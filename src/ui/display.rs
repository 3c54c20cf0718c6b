//! Terminal output for reports and listings.

use bytesize::ByteSize;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::store::{Bucket, FileInfo};
use crate::types::UploadReport;

/// Formats bytes into a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    ByteSize::b(bytes).to_string()
}

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED).set_content_arrangement(ContentArrangement::Dynamic).set_header(header.to_vec());
    table
}

pub fn report_table(report: &UploadReport) -> Option<Table> {
    if report.failed.is_empty() {
        return None;
    }

    let mut failures = table(&["Path", "Error"]);
    for failed in &report.failed {
        failures.add_row(vec![failed.path.display().to_string(), failed.error.to_string()]);
    }

    Some(failures)
}

/// Prints the outcome of a pipeline run. Failures are listed one per row.
pub fn show_report(report: &UploadReport) {
    println!();
    println!(
        "{} {}",
        style("✓").green(),
        style(format!("Uploaded {} of {} file(s), {}", report.uploaded.len(), report.submitted, format_bytes(report.uploaded_bytes()))).bold()
    );

    if let Some(failures) = report_table(report) {
        println!("{} {}", style("✗").red(), style(format!("{} file(s) failed:", report.failed.len())).bold());
        println!("{failures}");
    }
}

pub fn buckets_table(buckets: &[Bucket]) -> Table {
    let mut listing = table(&["Name", "Id", "Type"]);
    for bucket in buckets {
        listing.add_row(vec![bucket.bucket_name.as_str(), bucket.bucket_id.as_str(), bucket.bucket_type.as_str()]);
    }
    listing
}

pub fn show_buckets(buckets: &[Bucket]) {
    if buckets.is_empty() {
        println!("{}", style("No buckets found").yellow());
        return;
    }

    println!("{}", buckets_table(buckets));
}

pub fn files_table(files: &[FileInfo]) -> Table {
    let mut listing = table(&["Name", "Size", "Type", "Id"]);
    for file in files {
        listing.add_row(vec![file.file_name.clone(), format_bytes(file.content_length), file.content_type.clone(), file.file_id.clone()]);
    }
    listing
}

pub fn show_files(files: &[FileInfo]) {
    if files.is_empty() {
        println!("{}", style("No files found").yellow());
        return;
    }

    println!("{}", files_table(files));
}

/// Prints a one-line confirmation for a finished command.
pub fn show_success(message: &str) {
    println!("{} {}", style("✓").green(), style(message).bold());
}
