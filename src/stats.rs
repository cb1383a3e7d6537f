// 📊 Aggregations - totals by type, totals by person

use serde::Serialize;
use std::collections::HashMap;

use crate::record::{TransactionCategory, TransactionRecord};

/// Count and sum for one transaction type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeStat {
    pub category: TransactionCategory,
    pub count: i64,
    pub total: f64,
}

/// Totals per type for one counterparty, shaped for a chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonSummary {
    pub name: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

/// Parallel arrays for the dashboard charts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub counts: Vec<i64>,
    pub totals: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterpartyStat {
    pub name: String,
    pub count: usize,
    pub total: f64,
}

impl From<&[TypeStat]> for ChartData {
    fn from(stats: &[TypeStat]) -> Self {
        ChartData {
            labels: stats.iter().map(|s| s.category.label().to_string()).collect(),
            counts: stats.iter().map(|s| s.count).collect(),
            totals: stats.iter().map(|s| s.total).collect(),
        }
    }
}

/// Per-type count and total, types in first-seen order
pub fn type_stats<'a, I>(records: I) -> Vec<TypeStat>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    let mut stats: Vec<TypeStat> = Vec::new();

    for record in records {
        match stats.iter_mut().find(|s| s.category == record.category()) {
            Some(stat) => {
                stat.count += 1;
                stat.total += record.amount();
            }
            None => stats.push(TypeStat {
                category: record.category(),
                count: 1,
                total: record.amount(),
            }),
        }
    }

    stats
}

/// Totals per type for the given person's transactions.
///
/// Labels keep the order in which each type first appears.
pub fn person_summary<'a, I>(name: &str, records: I) -> PersonSummary
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    let stats = type_stats(records.into_iter().filter(|r| r.name() == name));

    PersonSummary {
        name: name.to_string(),
        labels: stats.iter().map(|s| s.category.label().to_string()).collect(),
        values: stats.iter().map(|s| s.total).collect(),
    }
}

/// Counterparties with the largest total, biggest first
pub fn top_counterparties<'a, I>(records: I, limit: usize) -> Vec<CounterpartyStat>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    let mut by_name: HashMap<&str, (usize, f64)> = HashMap::new();

    for record in records {
        let entry = by_name.entry(record.name()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += record.amount();
    }

    let mut result: Vec<CounterpartyStat> = by_name
        .into_iter()
        .map(|(name, (count, total))| CounterpartyStat {
            name: name.to_string(),
            count,
            total,
        })
        .collect();

    result.sort_by(|a, b| b.total.total_cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
    result.truncate(limit);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ExtractedFields;

    fn record(name: &str, amount: f64, category: TransactionCategory) -> TransactionRecord {
        TransactionRecord {
            fields: ExtractedFields {
                counterparty_name: name.to_string(),
                amount,
                category,
                ..ExtractedFields::unknown()
            },
            date: "1 May 2024".to_string(),
        }
    }

    fn sample() -> Vec<TransactionRecord> {
        vec![
            record("John Doe", 5000.0, TransactionCategory::Incoming),
            record("Jane Smith", 1000.0, TransactionCategory::Payment),
            record("John Doe", 2500.0, TransactionCategory::Payment),
            record("John Doe", 500.0, TransactionCategory::Incoming),
            record("Bank", 40000.0, TransactionCategory::BankDeposit),
        ]
    }

    #[test]
    fn test_type_stats() {
        let records = sample();
        let stats = type_stats(&records);

        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].category, TransactionCategory::Incoming);
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[0].total, 5500.0);
        assert_eq!(stats[1].total, 3500.0);
    }

    #[test]
    fn test_person_summary() {
        let records = sample();
        let summary = person_summary("John Doe", &records);

        assert_eq!(summary.name, "John Doe");
        assert_eq!(summary.labels, vec!["Incoming", "Payment"]);
        assert_eq!(summary.values, vec![5500.0, 2500.0]);
    }

    #[test]
    fn test_person_summary_unknown_person() {
        let records = sample();
        let summary = person_summary("Nobody", &records);

        assert!(summary.labels.is_empty());
        assert!(summary.values.is_empty());
    }

    #[test]
    fn test_chart_data() {
        let records = sample();
        let stats = type_stats(&records);
        let chart = ChartData::from(stats.as_slice());

        assert_eq!(chart.labels, vec!["Incoming", "Payment", "Bank Deposit"]);
        assert_eq!(chart.counts, vec![2, 2, 1]);
        assert_eq!(chart.totals, vec![5500.0, 3500.0, 40000.0]);
    }

    #[test]
    fn test_top_counterparties() {
        let records = sample();
        let top = top_counterparties(&records, 2);

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].name, "Bank");
        assert_eq!(top[1].name, "John Doe");
        assert_eq!(top[1].count, 3);
        assert_eq!(top[1].total, 8000.0);
    }
}
