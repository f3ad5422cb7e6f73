use crate::models::{IdeaStatus, Side, Subscriber, TradeIdea};
use crate::Result;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

/// Postgres persistence for signal history and subscribers
pub struct Store {
    pool: PgPool,
}

/// Aggregate performance over all closed signals
#[derive(Debug, Clone, Default)]
pub struct SignalStats {
    pub total_closed: i64,
    pub wins: i64,
    pub losses: i64,
    pub win_rate_pct: f64,
    pub avg_win_pct: Option<f64>,
    pub avg_loss_pct: Option<f64>,
}

fn status_str(status: IdeaStatus) -> &'static str {
    match status {
        IdeaStatus::Open => "OPEN",
        IdeaStatus::ClosedWin => "CLOSED_WIN",
        IdeaStatus::ClosedLoss => "CLOSED_LOSS",
    }
}

/// Signed move in percent, positive when the trade went the idea's way
fn profit_pct(side: Side, entry: f64, exit: f64) -> f64 {
    let raw = (exit - entry) / entry * 100.0;
    match side {
        Side::Long => raw,
        Side::Short => -raw,
    }
}

impl Store {
    /// Connect and run pending migrations
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres");

        Ok(Self { pool })
    }

    /// Record a freshly accepted idea as an open history row
    pub async fn save_open_signal(&self, idea: &TradeIdea) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signals_history (
                id, symbol, side, entry_price, stop_price, targets,
                rationale, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'OPEN', $8)
            "#,
        )
        .bind(idea.id)
        .bind(&idea.symbol)
        .bind(idea.side.as_str())
        .bind(idea.entry)
        .bind(idea.stop)
        .bind(&idea.targets)
        .bind(&idea.rationale)
        .bind(idea.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Saved open signal {} for {}", idea.id, idea.symbol);

        Ok(())
    }

    /// Close the newest open row for a symbol, computing the realized move
    /// from the stored entry. A symbol with no open row is a no-op.
    pub async fn close_latest_open(
        &self,
        symbol: &str,
        exit_price: f64,
        outcome: IdeaStatus,
    ) -> Result<()> {
        let row = sqlx::query(
            r#"
            SELECT id, side, entry_price
            FROM signals_history
            WHERE symbol = $1 AND status = 'OPEN'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            tracing::warn!("No open signal row for {}, nothing to close", symbol);
            return Ok(());
        };

        let id: Uuid = row.get("id");
        let side_str: String = row.get("side");
        let entry_price: f64 = row.get("entry_price");

        let side = match side_str.as_str() {
            "LONG" => Side::Long,
            "SHORT" => Side::Short,
            _ => return Err(format!("Invalid side {side_str:?} on signal {id}").into()),
        };

        sqlx::query(
            r#"
            UPDATE signals_history
            SET status = $1, exit_price = $2, profit_pct = $3, closed_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(status_str(outcome))
        .bind(exit_price)
        .bind(profit_pct(side, entry_price, exit_price))
        .bind(id)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Closed signal {} for {} at {}", id, symbol, exit_price);

        Ok(())
    }

    /// Win/loss aggregates over the whole closed history
    pub async fn signal_stats(&self) -> Result<SignalStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status != 'OPEN') AS total_closed,
                COUNT(*) FILTER (WHERE status = 'CLOSED_WIN') AS wins,
                COUNT(*) FILTER (WHERE status = 'CLOSED_LOSS') AS losses,
                AVG(profit_pct) FILTER (WHERE status = 'CLOSED_WIN') AS avg_win_pct,
                AVG(profit_pct) FILTER (WHERE status = 'CLOSED_LOSS') AS avg_loss_pct
            FROM signals_history
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let total_closed: i64 = row.get("total_closed");
        let wins: i64 = row.get("wins");
        let losses: i64 = row.get("losses");

        Ok(SignalStats {
            total_closed,
            wins,
            losses,
            win_rate_pct: if total_closed > 0 {
                wins as f64 / total_closed as f64 * 100.0
            } else {
                0.0
            },
            avg_win_pct: row.get("avg_win_pct"),
            avg_loss_pct: row.get("avg_loss_pct"),
        })
    }

    /// Subscribers whose paid access is still current
    pub async fn premium_subscribers(&self) -> Result<Vec<Subscriber>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, username, status, subscribed_until,
                   selected_pairs, deposit, risk_per_trade
            FROM subscribers
            WHERE status = 'PREMIUM'
              AND (subscribed_until IS NULL OR subscribed_until > NOW())
            ORDER BY user_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut subscribers = Vec::new();
        for row in rows {
            subscribers.push(Subscriber {
                user_id: row.get("user_id"),
                username: row.get("username"),
                status: row.get("status"),
                subscribed_until: row.get("subscribed_until"),
                selected_pairs: row.get("selected_pairs"),
                deposit: row.get("deposit"),
                risk_per_trade: row.get("risk_per_trade"),
            });
        }

        tracing::debug!("Loaded {} premium subscribers", subscribers.len());

        Ok(subscribers)
    }

    /// Demote every premium subscriber whose paid period ran out.
    /// Returns the affected user ids so the caller can notify them.
    pub async fn expire_lapsed(&self) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            UPDATE subscribers
            SET status = 'EXPIRED'
            WHERE status = 'PREMIUM'
              AND subscribed_until IS NOT NULL
              AND subscribed_until < NOW()
            RETURNING user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let expired: Vec<i64> = rows.iter().map(|r| r.get("user_id")).collect();
        if !expired.is_empty() {
            tracing::info!("Expired {} lapsed subscriptions", expired.len());
        }

        Ok(expired)
    }

    /// Register or refresh a subscriber row
    pub async fn upsert_subscriber(&self, subscriber: &Subscriber) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscribers (
                user_id, username, status, subscribed_until,
                selected_pairs, deposit, risk_per_trade
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE SET
                username = EXCLUDED.username,
                status = EXCLUDED.status,
                subscribed_until = EXCLUDED.subscribed_until,
                selected_pairs = EXCLUDED.selected_pairs,
                deposit = EXCLUDED.deposit,
                risk_per_trade = EXCLUDED.risk_per_trade
            "#,
        )
        .bind(subscriber.user_id)
        .bind(&subscriber.username)
        .bind(&subscriber.status)
        .bind(subscriber.subscribed_until)
        .bind(&subscriber.selected_pairs)
        .bind(subscriber.deposit)
        .bind(subscriber.risk_per_trade)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[cfg(test)]
    async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM signals_history")
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM subscribers")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
