//! Parser for the free-text operational status page of a bot server.
//!
//! Two lines are recognized. The status line starts with
//! [`STATUS_LINE_MARKER`] and carries whitespace-separated fields followed by
//! a `Mindiff:` tail with `name(buy,sell)` tuples. The blacklist line starts
//! with [`BLACKLIST_MARKER`] and carries `contract:gas` pairs.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

pub const STATUS_LINE_MARKER: &str = "SDIFF_Uniswap_ckhvar2";
pub const BLACKLIST_MARKER: &str = "SDIFF Uniswap BlackList:";

/// Gas below this is flagged when stored.
pub const LOW_GAS_LEVEL: f64 = 2.0;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\(([\d.]+),([\d.]+)\)").expect("Invalid token regex"));
static MINDIFF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Mindiff:\s*([\d.]+)").expect("Invalid mindiff regex"));
static MAX_ORDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"MaxOrderSize: (\d+)").expect("Invalid order size regex"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenQuote {
    pub name: String,
    pub buy: Option<f64>,
    pub sell: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GasReading {
    pub contract: String,
    pub gas: f64,
    pub is_low: bool,
}

/// Parsed status line fields used by digests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSummary {
    pub uptime: Option<String>,
    pub mindiff: Option<String>,
    pub max_order_size: Option<String>,
    /// Raw `name(buy,sell)` tuples as they appear on the page.
    pub tokens: Vec<String>,
}

/// Entry of the blacklist line, kept even when the gas value is unreadable.
#[derive(Debug, Clone, PartialEq)]
pub enum GasEntry {
    Reading(GasReading),
    Unparsed(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReport {
    pub summary: Option<StatusSummary>,
    pub quotes: Vec<TokenQuote>,
    pub gas_entries: Vec<GasEntry>,
}

impl StatusReport {
    pub fn gas_readings(&self) -> impl Iterator<Item = &GasReading> {
        self.gas_entries.iter().filter_map(|entry| match entry {
            GasEntry::Reading(reading) => Some(reading),
            GasEntry::Unparsed(_) => None,
        })
    }
}

pub fn parse_status(text: &str) -> StatusReport {
    let mut report = StatusReport::default();

    if let Some(line) = text.lines().find(|l| l.starts_with(STATUS_LINE_MARKER)) {
        let tail = line.find("Mindiff:").map(|idx| &line[idx..]).unwrap_or("");

        report.quotes = TOKEN_RE
            .captures_iter(tail)
            .map(|caps| TokenQuote {
                name: caps[1].to_string(),
                buy: caps[2].parse().ok(),
                sell: caps[3].parse().ok(),
            })
            .collect();

        report.summary = Some(StatusSummary {
            uptime: line.split_whitespace().nth(4).map(str::to_string),
            mindiff: MINDIFF_RE.captures(tail).map(|c| c[1].to_string()),
            max_order_size: MAX_ORDER_RE.captures(tail).map(|c| c[1].to_string()),
            tokens: TOKEN_RE.find_iter(tail).map(|m| m.as_str().to_string()).collect(),
        });
    }

    if let Some(line) = text.lines().find(|l| l.starts_with(BLACKLIST_MARKER)) {
        report.gas_entries = line[BLACKLIST_MARKER.len()..]
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(parse_gas_entry)
            .collect();
    }

    report
}

fn parse_gas_entry(item: &str) -> GasEntry {
    let mut parts = item.splitn(2, ':');
    let contract = parts.next().unwrap_or("").trim();
    let gas = parts.next().and_then(|v| v.trim().parse::<f64>().ok());
    match gas {
        Some(gas) if !contract.is_empty() && gas.is_finite() => GasEntry::Reading(GasReading {
            contract: contract.to_string(),
            gas,
            is_low: gas < LOW_GAS_LEVEL,
        }),
        _ => GasEntry::Unparsed(item.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PAGE: &str = "header\r\n\
SDIFF_Uniswap_ckhvar2 v3 running pid 12h31m Mindiff:0.35 MaxOrderSize: 500 LINK(14.2,14.5) pepe(0.0001,0.00011)\r\n\
SDIFF Uniswap BlackList: 0xabc:1.5, 0xdef:7 , broken, 0x99:x\n";

    #[test]
    fn test_parse_status_line() {
        let report = parse_status(PAGE);
        let summary = report.summary.clone().unwrap();
        assert_eq!(summary.uptime.as_deref(), Some("12h31m"));
        assert_eq!(summary.mindiff.as_deref(), Some("0.35"));
        assert_eq!(summary.max_order_size.as_deref(), Some("500"));
        assert_eq!(summary.tokens, vec!["LINK(14.2,14.5)", "pepe(0.0001,0.00011)"]);
        assert_eq!(
            report.quotes[0],
            TokenQuote {
                name: "LINK".to_string(),
                buy: Some(14.2),
                sell: Some(14.5),
            }
        );
    }

    #[test]
    fn test_parse_blacklist_line() {
        let report = parse_status(PAGE);
        let readings: Vec<_> = report.gas_readings().cloned().collect();
        assert_eq!(
            readings,
            vec![
                GasReading {
                    contract: "0xabc".to_string(),
                    gas: 1.5,
                    is_low: true,
                },
                GasReading {
                    contract: "0xdef".to_string(),
                    gas: 7.0,
                    is_low: false,
                },
            ]
        );
        assert_eq!(report.gas_entries.len(), 4);
    }

    #[test]
    fn test_page_without_markers() {
        assert_eq!(parse_status("nothing here"), StatusReport::default());
    }
}
