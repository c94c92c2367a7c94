//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use sitecheck_common::{ComponentVerdict, LinkVerdict, PageResult, RunResult, Verdict};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn print_serialized<T: Serialize + ?Sized>(value: &T, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => print_error(&format!("cannot render JSON: {}", e)),
        },
        OutputFormat::Yaml => match serde_yaml::to_string(value) {
            Ok(yaml) => print!("{}", yaml),
            Err(e) => print_error(&format!("cannot render YAML: {}", e)),
        },
        _ => {}
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        println!("No items found.");
        return;
    }

    match format {
        OutputFormat::Table => {
            let mut table = table();
            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }
            println!("{table}");
        }
        OutputFormat::Json | OutputFormat::Yaml => print_serialized(items, format),
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                let row = item.row();
                for (header, value) in T::headers().iter().zip(row.iter()) {
                    println!("{}: {}", header, value);
                }
            }
        }
    }
}

/// One row per checked link
#[derive(Serialize)]
pub struct LinkRow {
    pub url: String,
    pub result: String,
    pub status: String,
    pub attempts: u32,
    pub occurrences: usize,
    pub source: String,
}

impl From<&LinkVerdict> for LinkRow {
    fn from(verdict: &LinkVerdict) -> Self {
        Self {
            url: verdict.url.clone(),
            result: verdict.classification.to_string(),
            status: verdict
                .http_status
                .map(|s| s.to_string())
                .or_else(|| verdict.error_kind.as_ref().map(|e| e.to_string()))
                .unwrap_or_else(|| "-".to_string()),
            attempts: verdict.attempts,
            occurrences: verdict.occurrences,
            source: verdict.source_label.clone(),
        }
    }
}

impl TableDisplay for LinkRow {
    fn headers() -> Vec<&'static str> {
        vec!["URL", "Result", "Status", "Attempts", "Seen", "First seen at"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.url.clone(),
            self.result.clone(),
            self.status.clone(),
            self.attempts.to_string(),
            self.occurrences.to_string(),
            self.source.clone(),
        ]
    }
}

fn verdict_cell(pass: bool) -> Cell {
    if pass {
        Cell::new("PASS").fg(Color::Green)
    } else {
        Cell::new("FAIL").fg(Color::Red)
    }
}

/// Failures of one verdict and, recursively, of its failed children
fn component_problems(path: &str, verdict: &ComponentVerdict, problems: &mut Vec<String>) {
    if !verdict.found {
        problems.push(format!(
            "{}: not found{}",
            path,
            verdict.note.as_ref().map(|n| format!(" ({})", n)).unwrap_or_default()
        ));
    }
    for field in verdict.failing_fields() {
        problems.push(format!(
            "{}.{}: {} (expected {}, got {})",
            path,
            field.name,
            field.status,
            field.expected.as_deref().unwrap_or("-"),
            field.actual
        ));
    }
    for child in verdict.child_verdicts.iter().filter(|c| c.status == Verdict::Fail) {
        let child_path = format!("{}[{}]", path, child.key.as_deref().unwrap_or("?"));
        component_problems(&child_path, child, problems);
    }
    for key in &verdict.missing_children {
        problems.push(format!("{}: missing {}", path, key));
    }
    for key in &verdict.extra_children {
        problems.push(format!("{}: unexpected {}", path, key));
    }
}

fn page_problems(page: &PageResult) -> Vec<String> {
    let mut problems = Vec::new();
    if let Some(error) = &page.error {
        problems.push(format!("page error: {}", error));
    }
    for (name, verdict) in page.component_verdicts.iter().filter(|(_, v)| v.status == Verdict::Fail) {
        component_problems(name, verdict, &mut problems);
    }
    for link in page.link_verdicts.iter().filter(|l| !l.classification.is_ok()) {
        let row = LinkRow::from(link);
        problems.push(format!("{} link {} ({})", row.result, row.url, row.status));
    }
    problems
}

/// Print a full run
pub fn print_run(run: &RunResult, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Yaml => print_serialized(run, format),
        OutputFormat::Table => {
            let mut table = table();
            table.set_header(vec![
                "URL", "Locale", "Components", "Failed", "N/A", "Links", "Broken", "Result",
            ]);
            for page in &run.pages {
                let counts = &page.counts;
                table.add_row(vec![
                    Cell::new(&page.url),
                    Cell::new(page.locale.as_deref().unwrap_or("-")),
                    Cell::new(counts.components_passed + counts.components_failed + counts.components_not_applicable),
                    Cell::new(counts.components_failed),
                    Cell::new(counts.components_not_applicable),
                    Cell::new(counts.links_checked()),
                    Cell::new(counts.links_invalid + counts.links_unreachable),
                    verdict_cell(page.all_pass),
                ]);
            }
            println!("{table}");

            for page in run.pages.iter().filter(|p| !p.all_pass) {
                println!();
                println!("{} {}", "✗".red(), page.url.bold());
                for problem in page_problems(page) {
                    println!("  {} {}", "-".dimmed(), problem);
                }
            }

            print_summary(run);
        }
        OutputFormat::Plain => {
            for page in &run.pages {
                println!(
                    "{} {} {}",
                    if page.all_pass { "PASS" } else { "FAIL" },
                    page.url,
                    page.locale.as_deref().unwrap_or("")
                );
                for problem in page_problems(page) {
                    println!("  {}", problem);
                }
            }
            print_summary(run);
        }
    }
}

fn print_summary(run: &RunResult) {
    let summary = &run.summary;
    println!();
    println!(
        "{} page(s): {} passed, {} failed ({:.1}%)",
        summary.pages_total,
        summary.pages_passed.to_string().green(),
        summary.pages_failed.to_string().red(),
        summary.pass_ratio * 100.0
    );
    println!(
        "components: {} passed, {} failed, {} not applicable",
        summary.components_passed, summary.components_failed, summary.components_not_applicable
    );
    println!(
        "links: {} checked, {} valid, {} invalid, {} unreachable, {} skipped",
        summary.links_checked, summary.links_valid, summary.links_invalid, summary.links_unreachable, summary.links_skipped
    );
    println!(
        "{}",
        format!("Checked at {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")).dimmed()
    );
}

/// Print success message; stderr, so stdout stays machine-readable
pub fn print_success(message: &str) {
    eprintln!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("⚠️  {}", message);
}
