//! Message templates for Telegram broadcasts. All output is Markdown.

use crate::db::SignalStats;
use crate::models::{Side, TradeIdea};
use crate::quality::QualityRating;
use crate::tracker::ClosedIdea;

/// Units to buy or sell so that a stop-out loses exactly the configured
/// fraction of the deposit. None when the inputs make no sense.
pub fn position_size(deposit: f64, risk_pct: f64, entry: f64, stop: f64) -> Option<f64> {
    if deposit <= 0.0 || risk_pct <= 0.0 || entry <= 0.0 {
        return None;
    }
    let stop_distance = (entry - stop).abs();
    if stop_distance <= 0.0 {
        return None;
    }
    let risk_amount = deposit * risk_pct / 100.0;
    Some(round2(risk_amount / stop_distance))
}

/// Signed distance from entry to a level, percent of entry
pub fn pct_between(entry: f64, level: f64) -> f64 {
    (level - entry) / entry * 100.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn format_signal(idea: &TradeIdea, rating: &QualityRating, size: Option<f64>) -> String {
    let direction = match idea.side {
        Side::Long => "📈 LONG",
        Side::Short => "📉 SHORT",
    };

    let mut lines = vec![
        format!("{} *{}* {}", rating.level.emoji(), idea.symbol, direction),
        String::new(),
        format!("Entry: `{}`", fmt_price(idea.entry)),
        format!(
            "Stop: `{}` ({:+.2}%)",
            fmt_price(idea.stop),
            pct_between(idea.entry, idea.stop)
        ),
    ];

    for (i, target) in idea.targets.iter().enumerate() {
        lines.push(format!(
            "TP{}: `{}` ({:+.2}%)",
            i + 1,
            fmt_price(*target),
            pct_between(idea.entry, *target)
        ));
    }

    if let Some(size) = size {
        lines.push(format!("Position: `{size}` units"));
    }

    lines.push(String::new());
    lines.push(format!(
        "Quality: {} ({:.0}%)",
        rating.level.label(),
        rating.score * 100.0
    ));
    lines.push(format!("_{}_", idea.rationale));

    lines.join("\n")
}

pub fn format_close(closed: &ClosedIdea) -> String {
    let (headline, emoji) = if closed.realized_pct >= 0.0 {
        ("Target hit", "✅")
    } else {
        ("Stopped out", "🛑")
    };

    format!(
        "{} *{}* {} at `{}` ({:+.2}%)",
        emoji,
        closed.idea.symbol,
        headline,
        fmt_price(closed.exit_price),
        closed.realized_pct
    )
}

pub fn format_stats(stats: &SignalStats) -> String {
    let mut lines = vec![
        "📊 *Signal performance*".to_string(),
        format!("Closed: {}", stats.total_closed),
        format!(
            "Wins: {} / Losses: {} ({:.1}% win rate)",
            stats.wins, stats.losses, stats.win_rate_pct
        ),
    ];
    if let Some(avg) = stats.avg_win_pct {
        lines.push(format!("Avg win: {avg:+.2}%"));
    }
    if let Some(avg) = stats.avg_loss_pct {
        lines.push(format!("Avg loss: {avg:+.2}%"));
    }
    lines.join("\n")
}

/// Crypto prices span many magnitudes; keep small prices readable
fn fmt_price(price: f64) -> String {
    if price >= 1.0 {
        format!("{price:.2}")
    } else {
        format!("{price:.6}")
    }
}
