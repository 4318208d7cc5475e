//! End-of-batch summary.

use crate::batch::BatchResult;
use crate::progress::{format_bytes, format_duration};
use console::style;

const RULE: &str = "══════════════════════════════════════════════════════════════";

/// Boxed summary of a finished batch, followed by the failed files.
pub fn print_summary_report(result: &BatchResult, format_name: &str) {
    println!();
    println!("╔{}╗", RULE);
    println!("  📊 Conversion to {} - Summary", format_name.to_uppercase());
    println!("╠{}╣", RULE);
    println!("  📁 Files Processed:  {:>10}", result.total);
    println!(
        "  ✅ Succeeded:        {:>10}",
        style(result.succeeded).green()
    );
    if result.failed > 0 {
        println!("  ❌ Failed:           {:>10}", style(result.failed).red().bold());
    } else {
        println!("  ❌ Failed:           {:>10}", result.failed);
    }
    println!("  ⏭️  Skipped:          {:>10}", result.skipped);
    println!("  📦 Archived:         {:>10}", result.archived);
    println!("  📈 Success Rate:     {:>9.1}%", result.success_rate());
    println!("╠{}╣", RULE);
    println!("  💾 Input Size:       {:>10}", format_bytes(result.input_bytes));
    println!("  💾 Output Size:      {:>10}", format_bytes(result.output_bytes));
    println!("  ⏱️  Total Time:       {:>10}", format_duration(result.elapsed));
    let converted = result.succeeded + result.failed;
    if converted > 0 {
        println!(
            "  ⏱️  Avg Time/File:    {:>9.2}s",
            result.elapsed.as_secs_f64() / converted as f64
        );
    }
    println!("╚{}╝", RULE);

    if !result.errors.is_empty() {
        println!();
        println!("{}", style("❌ Errors encountered:").red().bold());
        for (path, error) in &result.errors {
            // Only the headline; the full diagnostic went to stderr and the log.
            let headline = error.lines().next().unwrap_or_default();
            println!("   {} → {}", path.display(), headline);
        }
    }
}
