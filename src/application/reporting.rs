use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DateRange, MovementType, ProductId, Quantity, ReportPeriod, StockTransaction};

/// Inbound and outbound volume per period bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementReport {
    pub product_id: Option<ProductId>,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    pub period: ReportPeriod,
    pub buckets: Vec<MovementBucket>,
    pub total_inbound: Quantity,
    pub total_outbound: Quantity,
    pub net: Quantity,
    pub count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MovementBucket {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub inbound: Quantity,
    pub outbound: Quantity,
    pub net: Quantity,
    pub count: i64,
}

/// Bucket `transactions` into consecutive periods covering `range`.
/// Entries outside the range are ignored; empty buckets are kept.
pub fn build_movement_report(
    product_id: Option<ProductId>,
    range: DateRange,
    period: ReportPeriod,
    transactions: &[StockTransaction],
) -> MovementReport {
    let mut buckets: Vec<MovementBucket> = period
        .split(range)
        .into_iter()
        .map(|bucket| MovementBucket {
            period_start: bucket.start,
            period_end: bucket.end,
            ..Default::default()
        })
        .collect();

    for tx in transactions.iter().filter(|tx| range.contains(tx.created_at)) {
        let Some(bucket) = buckets
            .iter_mut()
            .find(|b| b.period_start <= tx.created_at && tx.created_at < b.period_end)
        else {
            continue;
        };
        match tx.movement_type {
            MovementType::Inbound => bucket.inbound += tx.quantity,
            MovementType::Outbound => bucket.outbound += tx.quantity,
        }
        bucket.net += tx.signed_quantity();
        bucket.count += 1;
    }

    let total_inbound = buckets.iter().map(|b| b.inbound).sum();
    let total_outbound = buckets.iter().map(|b| b.outbound).sum();
    let count = buckets.iter().map(|b| b.count).sum();

    MovementReport {
        product_id,
        from_date: range.start,
        to_date: range.end,
        period,
        buckets,
        total_inbound,
        total_outbound,
        net: total_inbound - total_outbound,
        count,
    }
}
