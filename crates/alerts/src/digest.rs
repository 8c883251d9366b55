//! Digest message builders. The engine gathers the numbers; this module only
//! renders them.

use fleet_core::{DexCexSplit, GasEntry, StatusReport, LOW_GAS_LEVEL};
use fleet_store::{ContractTxStats, PairProfit, TradeRow};
use std::fmt::Write;

/// Lookback windows of the balance update, in hours.
pub const BALANCE_UPDATE_PERIODS: [i64; 5] = [1, 4, 8, 12, 24];

pub const TOP_PAIRS_LIMIT: i64 = 5;

/// Net profit summed over trades whose legs are complete.
pub fn sum_net_profit(trades: &[TradeRow]) -> f64 {
    trades.iter().filter_map(TradeRow::net_profit).sum()
}

pub fn sum_fees(trades: &[TradeRow]) -> f64 {
    trades.iter().filter_map(|t| t.executed_fee_total).sum()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HourlyDigest {
    pub server_label: String,
    /// `None` when the status page could not be fetched.
    pub status: Option<StatusReport>,
    pub trades_last_hour: usize,
    pub profit_last_hour: f64,
    pub balance: Option<DexCexSplit>,
}

pub fn hourly_digest_message(digest: &HourlyDigest) -> String {
    let mut message = format!("📊 *Hourly Digest for {}*\n\n", digest.server_label);

    if let Some(status) = &digest.status {
        if let Some(summary) = &status.summary {
            let _ = writeln!(message, "🔄 *Server Status*");
            let _ = writeln!(
                message,
                "⏱️ Uptime: {} | 🎯 Mindiff: {} | 📦 MaxOrderSize: {}",
                summary.uptime.as_deref().unwrap_or("N/A"),
                summary.mindiff.as_deref().unwrap_or("N/A"),
                summary.max_order_size.as_deref().unwrap_or("N/A"),
            );
            let _ = writeln!(message, "🪙 Tokens: {}\n", summary.tokens.join(", "));
        }

        if !status.gas_entries.is_empty() {
            let _ = writeln!(message, "⛽ *Gas Status*");
            for entry in &status.gas_entries {
                match entry {
                    GasEntry::Reading(r) if r.gas < LOW_GAS_LEVEL => {
                        let _ = writeln!(message, "🔴 {}:{}", r.contract, r.gas);
                    }
                    GasEntry::Reading(r) => {
                        let _ = writeln!(message, "🟢 {}:{}", r.contract, r.gas);
                    }
                    GasEntry::Unparsed(raw) => {
                        let _ = writeln!(message, "🟡 {raw}");
                    }
                }
            }
            message.push('\n');
        }
    }

    let _ = writeln!(message, "📈 *Last Hour Performance*");
    let _ = writeln!(
        message,
        "💼 Trades: {} | 💰 Profit: {:.2}\n",
        digest.trades_last_hour,
        finite_or_zero(digest.profit_last_hour)
    );

    if let Some(balance) = &digest.balance {
        let _ = writeln!(message, "💰 *Balance*");
        let _ = writeln!(message, "🪙 Total USDT (DEX + BinanceF): {:.2}", balance.combined());
        let _ = writeln!(message, "🏦 BinanceF Total USDT: {:.2}", balance.cex_total);
        let _ = write!(message, "🔗 DEX Total USDT: {:.2}", balance.dex_total);
    }

    message
}

/// One server's section of the daily digest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyServerDigest {
    pub server_label: String,
    pub profit_24h: f64,
    pub tx_stats: ContractTxStats,
    pub top_pairs: Vec<PairProfit>,
    pub fee_spend: f64,
    pub low_gas_occurrences: i64,
}

pub fn daily_digest_message(server: &DailyServerDigest) -> String {
    let mut message = format!("Daily digest for {}:\n", server.server_label);
    let _ = writeln!(message, "24h P&L: {:.2}", finite_or_zero(server.profit_24h));
    let _ = writeln!(message, "Success Rate: {:.2}%", server.tx_stats.success_rate());
    let _ = writeln!(message, "Error Count: {}", server.tx_stats.failed);
    let _ = writeln!(message, "Top Pairs (by profit):");
    for pair in &server.top_pairs {
        let _ = writeln!(
            message,
            "  - {}: {:.2}",
            pair.pair.as_deref().unwrap_or("unknown"),
            pair.gross_profit.unwrap_or(0.0)
        );
    }
    let _ = writeln!(message, "Total Fee Spend: {:.2}", finite_or_zero(server.fee_spend));
    let _ = writeln!(message, "Low Gas Occurrences: {}", server.low_gas_occurrences);
    message
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodStats {
    pub hours: i64,
    pub profit: f64,
    pub trades: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceUpdate {
    pub server_label: String,
    pub balance: Option<DexCexSplit>,
    pub periods: Vec<PeriodStats>,
}

pub fn balance_update_message(servers: &[BalanceUpdate]) -> String {
    let mut message = String::new();
    for server in servers {
        let amount = |value: Option<f64>| {
            value
                .map(|v| format!("{v:.2}"))
                .unwrap_or_else(|| "N/A".to_string())
        };
        let _ = writeln!(message, "📊 *SERVER: {}*", server.server_label);
        let _ = writeln!(message, "Total (USDT)    : {}", amount(server.balance.map(|b| b.combined())));
        let _ = writeln!(message, "BinanceF (USDT) : {}", amount(server.balance.map(|b| b.cex_total)));
        let _ = writeln!(message, "DEX (USDT)      : {}\n", amount(server.balance.map(|b| b.dex_total)));

        let _ = writeln!(message, "Period       Profit (USD)   Number of Trades");
        for period in &server.periods {
            let label = format!("{}h", period.hours);
            let _ = writeln!(
                message,
                "Last {label:<3}    {:>7.2}      {:>3}",
                finite_or_zero(period.profit),
                period.trades
            );
        }
        message.push('\n');
    }
    message
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::parse_status;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hourly_digest_sections() {
        let status = parse_status(
            "SDIFF_Uniswap_ckhvar2 a b c 3d4h Mindiff:0.3 MaxOrderSize: 500 CAKE(1.5,1.6)\n\
             SDIFF Uniswap BlackList: 0xaaa:1.2, 0xbbb:5, broken",
        );
        let digest = HourlyDigest {
            server_label: "BNB".to_string(),
            status: Some(status),
            trades_last_hour: 3,
            profit_last_hour: 12.345,
            balance: Some(DexCexSplit {
                dex_total: 100.0,
                cex_total: 50.0,
            }),
        };
        let message = hourly_digest_message(&digest);

        assert!(message.starts_with("📊 *Hourly Digest for BNB*\n\n🔄 *Server Status*\n"));
        assert!(message.contains("⏱️ Uptime: 3d4h | 🎯 Mindiff: 0.3 | 📦 MaxOrderSize: 500\n"));
        assert!(message.contains("🪙 Tokens: CAKE(1.5,1.6)\n"));
        assert!(message.contains("🔴 0xaaa:1.2\n🟢 0xbbb:5\n🟡 broken\n"));
        assert!(message.contains("💼 Trades: 3 | 💰 Profit: 12.35\n"));
        assert!(message.ends_with("🔗 DEX Total USDT: 100.00"));
    }

    #[test]
    fn test_daily_digest_server_section() {
        let message = daily_digest_message(&DailyServerDigest {
            server_label: "BASE".to_string(),
            profit_24h: -3.5,
            tx_stats: ContractTxStats { total: 4, failed: 1 },
            top_pairs: vec![PairProfit {
                pair: Some("WETH/USDT".to_string()),
                trades: 2,
                gross_profit: Some(7.25),
            }],
            fee_spend: 1.0,
            low_gas_occurrences: 2,
        });
        assert_eq!(
            message,
            "Daily digest for BASE:\n\
             24h P&L: -3.50\n\
             Success Rate: 75.00%\n\
             Error Count: 1\n\
             Top Pairs (by profit):\n\
             \x20 - WETH/USDT: 7.25\n\
             Total Fee Spend: 1.00\n\
             Low Gas Occurrences: 2\n"
        );
    }

    #[test]
    fn test_balance_update_without_snapshot() {
        let message = balance_update_message(&[BalanceUpdate {
            server_label: "ARBITRUM".to_string(),
            balance: None,
            periods: vec![PeriodStats {
                hours: 1,
                profit: 2.5,
                trades: 4,
            }],
        }]);
        assert!(message.contains("Total (USDT)    : N/A\n"));
        assert!(message.contains("Last 1h        2.50        4\n"));
    }

    #[test]
    fn test_sum_net_profit_skips_incomplete_trades() {
        let complete = TradeRow {
            id: 1,
            executed_src_price: Some(100.0),
            executed_dst_price: Some(110.0),
            executed_qty_src: Some(1.0),
            executed_qty_dst: Some(1.0),
            ..Default::default()
        };
        let incomplete = TradeRow {
            id: 2,
            ..Default::default()
        };
        let total = sum_net_profit(&[complete, incomplete]);
        assert!((total - 9.978).abs() < 1e-9);
    }
}
