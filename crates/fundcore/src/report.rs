//! Ranking, alert selection and message rendering.
//!
//! Every message is Telegram HTML; coin names are escaped.

use crate::core::config::defaults;
use crate::core::utils::{escape_html, format_with_commas};
use crate::market::{base_of, Exchange, FundingSnapshot, FundingTable, MarketView};
use crate::storage::UserSettings;
use itertools::Itertools;
use std::cmp::Ordering;

/// Maximum message length for Telegram (with margin)
pub const MAX_MESSAGE_LENGTH: usize = 4000;

const NO_DATA: &str = "⚠️ 데이터를 가져올 수 없습니다.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Positive,
    Negative,
}

/// Top five snapshots on one side, largest |rate| first.
///
/// Zero rates belong to neither side. Ties are broken by symbol.
pub fn top_funding_rates(table: &FundingTable, side: Side) -> Vec<&FundingSnapshot> {
    table
        .values()
        .filter(|s| match side {
            Side::Positive => s.rate > 0.0,
            Side::Negative => s.rate < 0.0,
        })
        .sorted_by(|a, b| {
            b.rate
                .abs()
                .partial_cmp(&a.rate.abs())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.symbol.cmp(&b.symbol))
        })
        .take(defaults::TOP_N)
        .collect()
}

/// Trading page of a perpetual on its exchange.
pub fn exchange_url(exchange: Exchange, symbol: &str) -> String {
    let base = base_of(symbol);
    match exchange {
        Exchange::Bybit => format!("https://www.bybit.com/trade/usdt/{}USDT", base),
        Exchange::Binance => format!("https://www.binance.com/futures/trade/{}USDT", base),
        Exchange::Bitget => format!("https://www.bitget.com/futures/{}USDT", base),
        Exchange::Okx => format!("https://www.okx.com/trade-swap/{}-usdt-swap", base.to_lowercase()),
    }
}

/// Time left until `next_funding_ms` as "{h}시간 {m}분"; "정보 없음" when unknown.
pub fn countdown(next_funding_ms: i64, now_ms: i64) -> String {
    if next_funding_ms == 0 {
        return "정보 없음".to_string();
    }
    let remaining_secs = next_funding_ms.saturating_sub(now_ms).max(0) / 1000;
    format!("{}시간 {}분", remaining_secs / 3600, (remaining_secs % 3600) / 60)
}

/// One snapshot that crossed a user's threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub exchange: Exchange,
    pub snapshot: FundingSnapshot,
}

/// Snapshots with `|rate| >= threshold` and `volume >= volume_filter`,
/// in view order and then by symbol.
pub fn threshold_alerts(view: &MarketView, settings: &UserSettings) -> Vec<Alert> {
    view.iter()
        .flat_map(|(exchange, table)| {
            table
                .values()
                .filter(|s| s.rate.abs() >= settings.threshold && s.volume >= settings.volume_filter)
                .sorted_by(|a, b| a.symbol.cmp(&b.symbol))
                .map(move |s| Alert {
                    exchange: *exchange,
                    snapshot: s.clone(),
                })
        })
        .collect()
}

fn coin(snapshot: &FundingSnapshot) -> String {
    escape_html(base_of(&snapshot.symbol))
}

/// Periodic TOP 5 report. Exchanges without data are skipped.
pub fn periodic_report(view: &MarketView) -> String {
    let mut message = String::from("📊 <b>펀딩비 TOP 5 리포트</b>\n\n");

    for (exchange, table) in view.iter().filter(|(_, table)| !table.is_empty()) {
        let label = exchange.label();

        message.push_str(&format!("<b>{} 양수 펀비 TOP5</b>\n", label));
        for s in top_funding_rates(table, Side::Positive) {
            message.push_str(&format!("• {}: +{:.3}%\n", coin(s), s.rate));
        }

        message.push_str(&format!("\n<b>{} 음수 펀비 TOP5</b>\n", label));
        for s in top_funding_rates(table, Side::Negative) {
            message.push_str(&format!("• {}: {:.3}%\n", coin(s), s.rate));
        }
        message.push('\n');
    }

    if view.iter().all(|(_, table)| table.is_empty()) {
        message.push_str(NO_DATA);
    }
    message
}

fn alert_block(alert: &Alert, now_ms: i64) -> String {
    let s = &alert.snapshot;
    format!(
        "<b>[{}] {}</b>\n\
         • 펀딩비: {:+.3}%\n\
         • 현재가: ${}\n\
         • 거래량: ${}\n\
         • 다음 펀딩: {}\n\
         • <a href=\"{}\">차트 보기</a>\n\n",
        alert.exchange.label(),
        coin(s),
        s.rate,
        format_with_commas(s.price, 2),
        format_with_commas(s.volume, 0),
        countdown(s.next_funding, now_ms),
        exchange_url(alert.exchange, &s.symbol),
    )
}

/// Threshold alert messages, split so each stays under the Telegram limit.
/// Empty when there are no alerts.
pub fn alert_messages(alerts: &[Alert], now_ms: i64) -> Vec<String> {
    const HEADER: &str = "🚨 <b>펀딩비 알림</b>\n\n";

    let mut messages = Vec::new();
    let mut current = String::new();

    for alert in alerts {
        let block = alert_block(alert, now_ms);
        if !current.is_empty() && current.chars().count() + block.chars().count() > MAX_MESSAGE_LENGTH {
            messages.push(std::mem::take(&mut current));
        }
        if current.is_empty() {
            current.push_str(HEADER);
        }
        current.push_str(&block);
    }

    if !current.is_empty() {
        messages.push(current);
    }
    messages
}

/// On-demand report for `/now`.
pub fn now_report(view: &MarketView, spot_filter: bool) -> String {
    let mut message = format!(
        "📊 <b>현재 펀딩비 TOP 5</b>\n(현물+선물 필터: {})\n\n",
        on_off(spot_filter)
    );
    let mut total = 0;

    for (exchange, table) in view {
        let label = exchange.label();
        total += table.len();

        if table.is_empty() {
            message.push_str(&format!("<b>{}</b>\n{}\n\n", label, NO_DATA));
            continue;
        }

        message.push_str(&format!("━━━ <b>{}</b> ({}개 코인) ━━━\n\n", label, table.len()));

        let positive = top_funding_rates(table, Side::Positive);
        if !positive.is_empty() {
            message.push_str("📈 <b>양수 펀딩비 TOP 5</b>\n");
            for s in &positive {
                message.push_str(&format!("• {}: +{:.4}%\n", coin(s), s.rate));
            }
            message.push('\n');
        }

        let negative = top_funding_rates(table, Side::Negative);
        if !negative.is_empty() {
            message.push_str("📉 <b>음수 펀딩비 TOP 5</b>\n");
            for s in &negative {
                message.push_str(&format!("• {}: {:.4}%\n", coin(s), s.rate));
            }
            message.push('\n');
        }

        if positive.is_empty() && negative.is_empty() {
            message.push_str("• 데이터가 없습니다.\n\n");
        }
    }

    message.push_str(&format!("\n💡 총 {}개 코인 발견", total));
    message
}

/// Settings summary for `/status`.
pub fn status_text(settings: &UserSettings) -> String {
    let exchanges = settings.exchanges.iter().map(|e| e.as_ref()).join(", ");
    format!(
        "<b>현재 설정 상태</b>\n\n\
         • 펀딩비 임계값: {}%\n\
         • 거래량 필터: ${}\n\
         • 활성 거래소: {}\n\
         • 현물+선물 필터: {}\n\
         • 알림 상태: {}",
        format_threshold(settings.threshold),
        format_with_commas(settings.volume_filter, 0),
        exchanges,
        on_off(settings.spot_filter),
        on_off(settings.active),
    )
}

/// Threshold as typed by users: `0.1`, `1.0`, `0.05`.
pub fn format_threshold(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "활성"
    } else {
        "비활성"
    }
}

/// Drops tags and decodes the escapes produced by [`escape_html`].
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snap(symbol: &str, rate: f64, volume: f64) -> FundingSnapshot {
        FundingSnapshot {
            symbol: symbol.to_string(),
            rate,
            volume,
            price: 1234.5,
            next_funding: 0,
        }
    }

    fn table(rows: &[(&str, f64)]) -> FundingTable {
        rows.iter()
            .map(|(symbol, rate)| (symbol.to_string(), snap(symbol, *rate, 1_000_000.0)))
            .collect()
    }

    fn settings(threshold: f64, volume_filter: f64) -> UserSettings {
        UserSettings {
            threshold,
            volume_filter,
            ..UserSettings::new(1)
        }
    }

    #[test]
    fn test_top_rates_by_magnitude_with_zero_excluded() {
        let t = table(&[
            ("A/USDT:USDT", 0.01),
            ("B/USDT:USDT", 0.5),
            ("C/USDT:USDT", 0.0),
            ("D/USDT:USDT", -0.3),
            ("E/USDT:USDT", -0.02),
            ("F/USDT:USDT", 0.2),
            ("G/USDT:USDT", 0.2),
            ("H/USDT:USDT", 0.05),
            ("I/USDT:USDT", 0.04),
            ("J/USDT:USDT", 0.03),
        ]);

        let positive: Vec<&str> = top_funding_rates(&t, Side::Positive)
            .iter()
            .map(|s| base_of(&s.symbol))
            .collect();
        assert_eq!(positive, vec!["B", "F", "G", "H", "I"]);

        let negative: Vec<&str> = top_funding_rates(&t, Side::Negative)
            .iter()
            .map(|s| base_of(&s.symbol))
            .collect();
        assert_eq!(negative, vec!["D", "E"]);
    }

    #[test]
    fn test_exchange_urls() {
        assert_eq!(exchange_url(Exchange::Bybit, "BTC/USDT:USDT"), "https://www.bybit.com/trade/usdt/BTCUSDT");
        assert_eq!(
            exchange_url(Exchange::Binance, "ETH/USDT:USDT"),
            "https://www.binance.com/futures/trade/ETHUSDT"
        );
        assert_eq!(exchange_url(Exchange::Bitget, "SOL/USDT:USDT"), "https://www.bitget.com/futures/SOLUSDT");
        assert_eq!(
            exchange_url(Exchange::Okx, "IOST/USDT:USDT"),
            "https://www.okx.com/trade-swap/iost-usdt-swap"
        );
    }

    #[test]
    fn test_countdown() {
        let now = 1_700_000_000_000;
        assert_eq!(countdown(0, now), "정보 없음");
        assert_eq!(countdown(now + (2 * 3600 + 15 * 60 + 59) * 1000, now), "2시간 15분");
        assert_eq!(countdown(now - 60_000, now), "0시간 0분");
    }

    #[test]
    fn test_countdown_saturates_on_garbage_timestamps() {
        assert_eq!(countdown(i64::MIN, i64::MAX), "0시간 0분");

        let secs = i64::MAX / 1000;
        assert_eq!(
            countdown(i64::MAX, i64::MIN),
            format!("{}시간 {}분", secs / 3600, (secs % 3600) / 60)
        );
    }

    #[test]
    fn test_threshold_alerts_respect_rate_and_volume() {
        let mut t = table(&[("A/USDT:USDT", 0.1), ("B/USDT:USDT", -0.2), ("C/USDT:USDT", 0.05)]);
        t.insert("D/USDT:USDT".into(), snap("D/USDT:USDT", 0.9, 10.0));
        let view: MarketView = vec![(Exchange::Okx, t)];

        let alerts = threshold_alerts(&view, &settings(0.1, 1000.0));

        let symbols: Vec<&str> = alerts.iter().map(|a| a.snapshot.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["A/USDT:USDT", "B/USDT:USDT"]);
        assert!(alerts.iter().all(|a| a.exchange == Exchange::Okx));
    }

    #[test]
    fn test_alert_message_format() {
        let alert = Alert {
            exchange: Exchange::Binance,
            snapshot: FundingSnapshot {
                symbol: "BTC/USDT:USDT".into(),
                rate: 0.1234,
                volume: 123456789.4,
                price: 65432.1,
                next_funding: 0,
            },
        };

        let messages = alert_messages(&[alert], 0);

        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0],
            "🚨 <b>펀딩비 알림</b>\n\n\
             <b>[BINANCE] BTC</b>\n\
             • 펀딩비: +0.123%\n\
             • 현재가: $65,432.10\n\
             • 거래량: $123,456,789\n\
             • 다음 펀딩: 정보 없음\n\
             • <a href=\"https://www.binance.com/futures/trade/BTCUSDT\">차트 보기</a>\n\n"
        );
        assert!(alert_messages(&[], 0).is_empty());
    }

    #[test]
    fn test_alert_messages_are_split() {
        let alerts: Vec<Alert> = (0..100)
            .map(|i| Alert {
                exchange: Exchange::Bybit,
                snapshot: snap(&format!("COIN{}/USDT:USDT", i), 1.0, 1.0),
            })
            .collect();

        let messages = alert_messages(&alerts, 0);

        assert!(messages.len() > 1);
        assert!(messages.iter().all(|m| m.chars().count() <= MAX_MESSAGE_LENGTH));
        assert!(messages.iter().all(|m| m.starts_with("🚨")));
        let blocks: usize = messages.iter().map(|m| m.matches("[BYBIT]").count()).sum();
        assert_eq!(blocks, 100);
    }

    #[test]
    fn test_periodic_report_skips_empty_exchanges() {
        let view: MarketView = vec![
            (Exchange::Bybit, table(&[("A/USDT:USDT", 0.0123), ("B/USDT:USDT", -0.5)])),
            (Exchange::Okx, FundingTable::new()),
        ];

        let report = periodic_report(&view);

        assert!(report.starts_with("📊 <b>펀딩비 TOP 5 리포트</b>"));
        assert!(report.contains("<b>BYBIT 양수 펀비 TOP5</b>\n• A: +0.012%\n"));
        assert!(report.contains("<b>BYBIT 음수 펀비 TOP5</b>\n• B: -0.500%\n"));
        assert!(!report.contains("OKX"));
    }

    #[test]
    fn test_now_report() {
        let view: MarketView = vec![
            (Exchange::Binance, table(&[("X/USDT:USDT", 0.01)])),
            (Exchange::Bitget, FundingTable::new()),
            (Exchange::Okx, table(&[("Z/USDT:USDT", 0.0)])),
        ];

        let report = now_report(&view, true);

        assert!(report.contains("(현물+선물 필터: 활성)"));
        assert!(report.contains("━━━ <b>BINANCE</b> (1개 코인) ━━━"));
        assert!(report.contains("• X: +0.0100%"));
        assert!(report.contains("<b>BITGET</b>\n⚠️ 데이터를 가져올 수 없습니다."));
        assert!(report.contains("• 데이터가 없습니다."));
        assert!(report.ends_with("💡 총 2개 코인 발견"));
    }

    #[test]
    fn test_status_text() {
        let mut s = settings(0.5, 1_000_000.0);
        s.exchanges = vec![Exchange::Bybit, Exchange::Okx];
        s.spot_filter = false;

        let text = status_text(&s);

        assert!(text.contains("• 펀딩비 임계값: 0.5%"));
        assert!(text.contains("• 거래량 필터: $1,000,000"));
        assert!(text.contains("• 활성 거래소: bybit, okx"));
        assert!(text.contains("• 현물+선물 필터: 비활성"));
        assert!(text.contains("• 알림 상태: 활성"));
    }

    #[test]
    fn test_format_threshold() {
        assert_eq!(format_threshold(0.1), "0.1");
        assert_eq!(format_threshold(1.0), "1.0");
        assert_eq!(format_threshold(0.05), "0.05");
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<b>A &amp; B</b> &lt;3"), "A & B <3");
    }

    #[test]
    fn test_coin_names_are_escaped() {
        let view: MarketView = vec![(Exchange::Bybit, table(&[("<X>/USDT:USDT", 0.2)]))];
        assert!(periodic_report(&view).contains("• &lt;X&gt;: +0.200%"));
    }
}
