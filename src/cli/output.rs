//! Output formatters for the yasai-gate CLI
//!
//! - **Human**: Colored, readable output for terminal use
//! - **JSON**: One JSON document per command for scripting and jq
//!
//! ## Example
//!
//! ```rust,no_run
//! use yasai_gate::cli::output::{create_formatter, OutputFormat};
//!
//! let formatter = create_formatter(OutputFormat::Json, false);
//! let mut stdout = std::io::stdout();
//! formatter.format_message("done", &mut stdout).unwrap();
//! ```

use serde::Serialize;
use std::io::{self, Write};

use crate::catalog::{CatalogRow, SortSpec};
use crate::entitlement::EntitlementOrigin;
use crate::gate::UnlockOutcome;
use crate::unlock::{RemainingStyle, SweepReport, UnlockRecord};

// =============================================================================
// Output Format Enum
// =============================================================================

/// Available output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable output with optional colors
    #[default]
    Human,
    /// JSON output for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Human => write!(f, "human"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

// =============================================================================
// Serializable Output Types
// =============================================================================

/// Lock state of a single item
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutput {
    pub item_id: String,
    pub lockable: bool,
    pub locked: bool,
    pub entitled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlocked_until: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<String>,
}

/// Result of an unlock attempt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockOutput {
    pub item_id: String,
    pub granted: bool,
    #[serde(flatten)]
    pub outcome: UnlockOutcome,
}

impl UnlockOutput {
    pub fn new(item_id: &str, outcome: UnlockOutcome) -> Self {
        Self {
            item_id: item_id.to_string(),
            granted: outcome.is_granted(),
            outcome,
        }
    }
}

/// One catalog row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRowOutput {
    pub item_id: String,
    pub display_name: String,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<String>,
    pub last_month_rate: Option<f64>,
    pub last_year_rate: Option<f64>,
}

impl CatalogRowOutput {
    pub fn from_row(row: &CatalogRow, style: RemainingStyle) -> Self {
        Self {
            item_id: row.item.item_id.clone(),
            display_name: row.item.display_name.clone(),
            locked: row.locked,
            remaining: row.remaining.map(|r| r.label(style)),
            last_month_rate: row.item.last_month_rate,
            last_year_rate: row.item.last_year_rate,
        }
    }
}

/// The projected catalog
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogOutput {
    pub sort: SortSpec,
    pub sort_label: String,
    pub entitled: bool,
    pub rows: Vec<CatalogRowOutput>,
}

/// Cached subscription state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementOutput {
    pub active: bool,
    pub origin: EntitlementOrigin,
}

/// Epoch milliseconds as local wall-clock time
fn format_instant(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| ms.to_string())
}

/// Rate as shown in the app: one decimal percent, `N/A` when missing
fn format_rate(rate: Option<f64>) -> String {
    match rate {
        Some(rate) => format!("{:.1}%", rate * 100.0),
        None => "N/A".to_string(),
    }
}

// =============================================================================
// Output Formatter Trait
// =============================================================================

/// Trait for output formatters
pub trait OutputFormatter: Send + Sync {
    fn format_status(&self, status: &StatusOutput, writer: &mut dyn Write) -> io::Result<()>;

    fn format_unlock(&self, unlock: &UnlockOutput, writer: &mut dyn Write) -> io::Result<()>;

    fn format_grant(&self, record: &UnlockRecord, writer: &mut dyn Write) -> io::Result<()>;

    fn format_sweep(&self, report: &SweepReport, writer: &mut dyn Write) -> io::Result<()>;

    fn format_catalog(&self, catalog: &CatalogOutput, writer: &mut dyn Write) -> io::Result<()>;

    fn format_entitlement(
        &self,
        entitlement: &EntitlementOutput,
        writer: &mut dyn Write,
    ) -> io::Result<()>;

    /// Format `key = value` configuration entries
    fn format_config(&self, entries: &[(String, String)], writer: &mut dyn Write)
        -> io::Result<()>;

    /// Format an informational message
    fn format_message(&self, message: &str, writer: &mut dyn Write) -> io::Result<()>;

    /// Format an error message
    fn format_error(&self, error: &str, writer: &mut dyn Write) -> io::Result<()>;
}

// =============================================================================
// Human Formatter
// =============================================================================

/// Human-readable output formatter
pub struct HumanFormatter {
    use_color: bool,
}

impl HumanFormatter {
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    /// Apply color to text if colors are enabled
    fn colorize(&self, text: &str, color_code: &str) -> String {
        if self.use_color {
            format!("\x1b[{}m{}\x1b[0m", color_code, text)
        } else {
            text.to_string()
        }
    }

    fn lock_badge(&self, locked: bool) -> String {
        if locked {
            self.colorize("🔒 locked", "31") // Red
        } else {
            self.colorize("unlocked", "32") // Green
        }
    }
}

impl OutputFormatter for HumanFormatter {
    fn format_status(&self, status: &StatusOutput, writer: &mut dyn Write) -> io::Result<()> {
        let name = self.colorize(&status.item_id, "1");
        if status.entitled {
            return writeln!(writer, "{}: unlocked (subscription active)", name);
        }
        if !status.lockable {
            return writeln!(writer, "{}: not lockable", name);
        }

        write!(writer, "{}: {}", name, self.lock_badge(status.locked))?;
        if let (Some(remaining), Some(until)) = (&status.remaining, status.unlocked_until) {
            write!(
                writer,
                " (残り {}, until {})",
                self.colorize(remaining, "33"),
                format_instant(until)
            )?;
        }
        writeln!(writer)
    }

    fn format_unlock(&self, unlock: &UnlockOutput, writer: &mut dyn Write) -> io::Result<()> {
        let name = self.colorize(&unlock.item_id, "1");
        match &unlock.outcome {
            UnlockOutcome::Granted { record } => writeln!(
                writer,
                "{} {} until {}",
                self.colorize("✓", "32"),
                name,
                format_instant(record.unlocked_until)
            ),
            UnlockOutcome::AlreadyEntitled => {
                writeln!(writer, "{} {} (subscription active)", self.colorize("✓", "32"), name)
            }
            UnlockOutcome::Dismissed => writeln!(
                writer,
                "{} Ad closed before the reward; {} stays locked",
                self.colorize("✗", "31"),
                name
            ),
            UnlockOutcome::AdUnavailable { reason } => writeln!(
                writer,
                "{} No ad available ({}); try again later",
                self.colorize("✗", "31"),
                reason
            ),
            UnlockOutcome::InFlight => writeln!(
                writer,
                "{} Another unlock is already in progress",
                self.colorize("…", "33")
            ),
            UnlockOutcome::PersistFailed { reason } => writeln!(
                writer,
                "{} Reward earned but the unlock could not be saved: {}",
                self.colorize("!", "1;31"),
                reason
            ),
            UnlockOutcome::Disposed => writeln!(
                writer,
                "{} Unlock cancelled",
                self.colorize("✗", "31")
            ),
        }
    }

    fn format_grant(&self, record: &UnlockRecord, writer: &mut dyn Write) -> io::Result<()> {
        writeln!(
            writer,
            "{} {} until {}",
            self.colorize("Granted", "32"),
            self.colorize(&record.item_id, "1"),
            format_instant(record.unlocked_until)
        )
    }

    fn format_sweep(&self, report: &SweepReport, writer: &mut dyn Write) -> io::Result<()> {
        if report.removed.is_empty() {
            return writeln!(
                writer,
                "No expired unlocks ({} active)",
                report.remaining
            );
        }

        let header = self.colorize(
            &format!("Removed {} expired unlock(s):", report.removed.len()),
            "1;36", // Bold cyan
        );
        writeln!(writer, "{}", header)?;
        for id in &report.removed {
            writeln!(writer, "  {}", id)?;
        }
        writeln!(writer, "{} still active", report.remaining)
    }

    fn format_catalog(&self, catalog: &CatalogOutput, writer: &mut dyn Write) -> io::Result<()> {
        let header = self.colorize(
            &format!("並び替え: {} ({} items)", catalog.sort_label, catalog.rows.len()),
            "1;36",
        );
        writeln!(writer, "{}", header)?;

        for (i, row) in catalog.rows.iter().enumerate() {
            if row.locked {
                writeln!(
                    writer,
                    "  {:>3}. {}  {}",
                    i + 1,
                    row.display_name,
                    self.lock_badge(true)
                )?;
                continue;
            }

            write!(
                writer,
                "  {:>3}. {}  先月比 {}  昨年比 {}",
                i + 1,
                self.colorize(&row.display_name, "1"),
                format_rate(row.last_month_rate),
                format_rate(row.last_year_rate)
            )?;
            if let Some(remaining) = &row.remaining {
                write!(writer, "  {}", self.colorize(&format!("残り {}", remaining), "33"))?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    fn format_entitlement(
        &self,
        entitlement: &EntitlementOutput,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        if entitlement.active {
            writeln!(writer, "Subscription: {}", self.colorize("active", "32"))
        } else {
            writeln!(writer, "Subscription: {}", self.colorize("inactive", "90"))
        }
    }

    fn format_config(
        &self,
        entries: &[(String, String)],
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        for (key, value) in entries {
            writeln!(writer, "{} = {}", self.colorize(key, "36"), value)?;
        }
        Ok(())
    }

    fn format_message(&self, message: &str, writer: &mut dyn Write) -> io::Result<()> {
        writeln!(writer, "{}", message)
    }

    fn format_error(&self, error: &str, writer: &mut dyn Write) -> io::Result<()> {
        writeln!(writer, "{} {}", self.colorize("Error:", "1;31"), error)
    }
}

// =============================================================================
// JSON Formatter
// =============================================================================

/// JSON output formatter
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new() -> Self {
        Self
    }

    fn write_json(&self, value: &serde_json::Value, writer: &mut dyn Write) -> io::Result<()> {
        writeln!(writer, "{}", serde_json::to_string(value).unwrap_or_default())
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_status(&self, status: &StatusOutput, writer: &mut dyn Write) -> io::Result<()> {
        self.write_json(&serde_json::json!({ "type": "status", "status": status }), writer)
    }

    fn format_unlock(&self, unlock: &UnlockOutput, writer: &mut dyn Write) -> io::Result<()> {
        self.write_json(&serde_json::json!({ "type": "unlock", "result": unlock }), writer)
    }

    fn format_grant(&self, record: &UnlockRecord, writer: &mut dyn Write) -> io::Result<()> {
        self.write_json(&serde_json::json!({ "type": "grant", "record": record }), writer)
    }

    fn format_sweep(&self, report: &SweepReport, writer: &mut dyn Write) -> io::Result<()> {
        self.write_json(&serde_json::json!({ "type": "sweep", "report": report }), writer)
    }

    fn format_catalog(&self, catalog: &CatalogOutput, writer: &mut dyn Write) -> io::Result<()> {
        self.write_json(
            &serde_json::json!({
                "type": "catalog",
                "count": catalog.rows.len(),
                "catalog": catalog
            }),
            writer,
        )
    }

    fn format_entitlement(
        &self,
        entitlement: &EntitlementOutput,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        self.write_json(
            &serde_json::json!({ "type": "entitlement", "entitlement": entitlement }),
            writer,
        )
    }

    fn format_config(
        &self,
        entries: &[(String, String)],
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        let map: serde_json::Map<String, serde_json::Value> = entries
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        self.write_json(&serde_json::json!({ "type": "config", "values": map }), writer)
    }

    fn format_message(&self, message: &str, writer: &mut dyn Write) -> io::Result<()> {
        self.write_json(&serde_json::json!({ "type": "message", "message": message }), writer)
    }

    fn format_error(&self, error: &str, writer: &mut dyn Write) -> io::Result<()> {
        self.write_json(&serde_json::json!({ "type": "error", "message": error }), writer)
    }
}

// =============================================================================
// Factory Function
// =============================================================================

/// Create a formatter for the given output format
pub fn create_formatter(format: OutputFormat, use_color: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Human => Box::new(HumanFormatter::new(use_color)),
        OutputFormat::Json => Box::new(JsonFormatter::new()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogItem, SortKey, SortOrder};
    use crate::unlock::RemainingTime;

    fn render(
        formatter: &dyn OutputFormatter,
        f: impl Fn(&dyn OutputFormatter, &mut Vec<u8>),
    ) -> String {
        let mut buffer = Vec::new();
        f(formatter, &mut buffer);
        String::from_utf8(buffer).unwrap()
    }

    fn sample_catalog() -> CatalogOutput {
        let unlocked = CatalogRow {
            item: CatalogItem::new("tomato", "トマト").with_rates(Some(0.123), None),
            locked: false,
            remaining: RemainingTime::for_record(&UnlockRecord::new("tomato", 90 * 60 * 1000), 0),
        };
        let locked = CatalogRow {
            item: CatalogItem::new("daikon", "だいこん").lockable(),
            locked: true,
            remaining: None,
        };
        let sort = SortSpec::new(SortKey::LastMonthRate, SortOrder::Descending);
        CatalogOutput {
            sort,
            sort_label: sort.label(),
            entitled: false,
            rows: vec![
                CatalogRowOutput::from_row(&unlocked, RemainingStyle::Japanese),
                CatalogRowOutput::from_row(&locked, RemainingStyle::Japanese),
            ],
        }
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("human".parse::<OutputFormat>().unwrap(), OutputFormat::Human);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("csv".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Human.to_string(), "human");
        assert_eq!(OutputFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(Some(0.123)), "12.3%");
        assert_eq!(format_rate(Some(-0.05)), "-5.0%");
        assert_eq!(format_rate(None), "N/A");
    }

    #[test]
    fn test_human_catalog() {
        let formatter = HumanFormatter::new(false);
        let output = render(&formatter, |f, w| {
            f.format_catalog(&sample_catalog(), w).unwrap()
        });

        assert!(output.contains("先月比（高い順）"));
        assert!(output.contains("トマト  先月比 12.3%  昨年比 N/A  残り 1時間30分"));
        assert!(output.contains("だいこん  🔒 locked"));
    }

    #[test]
    fn test_human_unlock_outcomes() {
        let formatter = HumanFormatter::new(false);
        let dismissed = render(&formatter, |f, w| {
            f.format_unlock(&UnlockOutput::new("だいこん", UnlockOutcome::Dismissed), w)
                .unwrap()
        });
        assert!(dismissed.contains("だいこん stays locked"));

        let failed = render(&formatter, |f, w| {
            f.format_unlock(
                &UnlockOutput::new(
                    "だいこん",
                    UnlockOutcome::PersistFailed {
                        reason: "disk full".into(),
                    },
                ),
                w,
            )
            .unwrap()
        });
        assert!(failed.contains("could not be saved: disk full"));
    }

    #[test]
    fn test_human_no_color() {
        let formatter = HumanFormatter::new(false);
        let output = render(&formatter, |f, w| f.format_error("boom", w).unwrap());
        assert!(!output.contains("\x1b["));
        assert_eq!(output, "Error: boom\n");
    }

    #[test]
    fn test_json_unlock() {
        let formatter = JsonFormatter::new();
        let record = UnlockRecord::new("だいこん", 43_200_000);
        let output = render(&formatter, |f, w| {
            f.format_unlock(
                &UnlockOutput::new("だいこん", UnlockOutcome::Granted { record: record.clone() }),
                w,
            )
            .unwrap()
        });

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["type"], "unlock");
        assert_eq!(parsed["result"]["granted"], true);
        assert_eq!(parsed["result"]["outcome"], "granted");
        assert_eq!(parsed["result"]["record"]["unlockedUntil"], 43_200_000);
    }

    #[test]
    fn test_json_catalog() {
        let formatter = JsonFormatter::new();
        let output = render(&formatter, |f, w| {
            f.format_catalog(&sample_catalog(), w).unwrap()
        });

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["count"], 2);
        assert_eq!(parsed["catalog"]["sort"]["key"], "lastMonthRate");
        assert_eq!(parsed["catalog"]["rows"][0]["remaining"], "1時間30分");
        assert_eq!(parsed["catalog"]["rows"][1]["locked"], true);
        assert!(parsed["catalog"]["rows"][1].get("remaining").is_none());
    }

    #[test]
    fn test_json_config() {
        let formatter = JsonFormatter::new();
        let entries = vec![("unlock.duration_secs".to_string(), "43200".to_string())];
        let output = render(&formatter, |f, w| f.format_config(&entries, w).unwrap());

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["values"]["unlock.duration_secs"], "43200");
    }
}
