//! History views over queued records: filtering and summary statistics

use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use serde::Serialize;

use super::record::TransactionRecord;
use crate::intent::{Amount, Outcome};

/// Amount boundaries in paise (₹1,000 and ₹5,000)
const LOW_CEILING: u64 = 1_000 * 100;
const MEDIUM_CEILING: u64 = 5_000 * 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DateRange {
    #[default]
    All,
    Today,
    /// Last 7 days
    Week,
    /// Last 30 days
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AmountRange {
    #[default]
    All,
    /// Up to ₹1,000
    Low,
    /// Above ₹1,000 up to ₹5,000
    Medium,
    /// Above ₹5,000
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StatusFilter {
    #[default]
    All,
    Synced,
    Pending,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryFilter {
    pub date_range: DateRange,
    pub amount_range: AmountRange,
    pub status: StatusFilter,
}

impl HistoryFilter {
    pub fn is_active(&self) -> bool {
        self.date_range != DateRange::All
            || self.amount_range != AmountRange::All
            || self.status != StatusFilter::All
    }

    /// Keep matching records, preserving order. Day boundaries are UTC.
    pub fn apply(&self, records: &[TransactionRecord], now: DateTime<Utc>) -> Vec<TransactionRecord> {
        records
            .iter()
            .filter(|r| self.matches(r, now))
            .cloned()
            .collect()
    }

    pub fn matches(&self, record: &TransactionRecord, now: DateTime<Utc>) -> bool {
        self.matches_date(record.timestamp, now)
            && self.matches_amount(record.amount)
            && match self.status {
                StatusFilter::All => true,
                StatusFilter::Synced => record.synced,
                StatusFilter::Pending => !record.synced,
            }
    }

    fn matches_date(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let today = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);
        let tomorrow = today + Duration::days(1);
        let from = match self.date_range {
            DateRange::All => return true,
            DateRange::Today => today,
            DateRange::Week => today - Duration::days(7),
            DateRange::Month => today - Duration::days(30),
        };
        at >= from && at < tomorrow
    }

    fn matches_amount(&self, amount: Amount) -> bool {
        let paise = amount.paise();
        match self.amount_range {
            AmountRange::All => true,
            AmountRange::Low => paise <= LOW_CEILING,
            AmountRange::Medium => paise > LOW_CEILING && paise <= MEDIUM_CEILING,
            AmountRange::High => paise > MEDIUM_CEILING,
        }
    }
}

/// Summary over a set of records
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total: usize,
    pub synced: usize,
    pub pending: usize,
    pub declined: usize,
    /// Sum of every record the user did not decline, two decimals
    pub total_amount: String,
}

impl HistoryStats {
    pub fn from_records(records: &[TransactionRecord]) -> Self {
        let synced = records.iter().filter(|r| r.synced).count();
        let declined = records
            .iter()
            .filter(|r| r.outcome == Outcome::Declined)
            .count();
        let paise: u64 = records
            .iter()
            .filter(|r| r.outcome != Outcome::Declined)
            .map(|r| r.amount.paise())
            .sum();

        Self {
            total: records.len(),
            synced,
            pending: records.len() - synced,
            declined,
            total_amount: format!("{}.{:02}", paise / 100, paise % 100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::UpiId;
    use crate::queue::record::{NewTransaction, TxType};

    fn record(amount: &str, at: DateTime<Utc>, synced: bool) -> TransactionRecord {
        let mut r = TransactionRecord::create(
            NewTransaction {
                upi_id: UpiId::parse("user@bank").unwrap(),
                amount: amount.parse().unwrap(),
                note: None,
                pocket: "Food".into(),
                tx_type: TxType::Debit,
                payee: None,
            },
            at,
        );
        r.synced = synced;
        r
    }

    #[test]
    fn test_amount_ranges() {
        let now = Utc::now();
        let records = vec![
            record("1000", now, false),
            record("1000.01", now, false),
            record("5000", now, false),
            record("5000.50", now, false),
        ];
        let count = |range| {
            HistoryFilter {
                amount_range: range,
                ..Default::default()
            }
            .apply(&records, now)
            .len()
        };
        assert_eq!(count(AmountRange::Low), 1);
        assert_eq!(count(AmountRange::Medium), 2);
        assert_eq!(count(AmountRange::High), 1);
        assert_eq!(count(AmountRange::All), 4);
    }

    #[test]
    fn test_date_ranges() {
        let now = Utc::now();
        let records = vec![
            record("1", now, false),
            record("1", now - Duration::days(3), false),
            record("1", now - Duration::days(20), false),
            record("1", now - Duration::days(90), false),
        ];
        let count = |range| {
            HistoryFilter {
                date_range: range,
                ..Default::default()
            }
            .apply(&records, now)
            .len()
        };
        assert_eq!(count(DateRange::Today), 1);
        assert_eq!(count(DateRange::Week), 2);
        assert_eq!(count(DateRange::Month), 3);
        assert_eq!(count(DateRange::All), 4);
    }

    #[test]
    fn test_status_filter_and_stats() {
        let now = Utc::now();
        let mut declined = record("20", now, false);
        declined.outcome = Outcome::Declined;
        let records = vec![record("10.50", now, true), record("4.25", now, false), declined];

        let pending = HistoryFilter {
            status: StatusFilter::Pending,
            ..Default::default()
        };
        assert!(pending.is_active());
        assert_eq!(pending.apply(&records, now).len(), 2);

        let stats = HistoryStats::from_records(&records);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.synced, 1);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.declined, 1);
        assert_eq!(stats.total_amount, "14.75");
    }
}
