use serde::Serialize;

use super::domain::{round2, ApplicationRecord, ApplicationStatus, LoanDecision};
use super::repository::{ApplicationRepository, RepositoryError};

/// Dashboard roll-up over every stored application.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub total_applications: usize,
    pub approved: usize,
    pub rejected: usize,
    pub approval_rate: f64,
    pub rejection_rate: f64,
    pub average_income: f64,
    pub average_loan_amount: f64,
    pub pending_review: usize,
}

impl AnalyticsSummary {
    /// Rates are percentages; the loan average is in full currency units.
    pub fn from_records(records: &[ApplicationRecord]) -> Self {
        let total = records.len();
        if total == 0 {
            return Self::default();
        }

        let approved = records
            .iter()
            .filter(|record| record.decision == LoanDecision::Approved)
            .count();
        let rejected = records
            .iter()
            .filter(|record| record.decision == LoanDecision::Rejected)
            .count();
        let pending_review = records
            .iter()
            .filter(|record| record.status == ApplicationStatus::PendingReview)
            .count();

        let total_f = total as f64;
        let income_sum: f64 = records.iter().map(|r| r.fields.applicant_income).sum();
        let loan_sum: f64 = records.iter().map(|r| r.fields.loan_amount_full()).sum();

        Self {
            total_applications: total,
            approved,
            rejected,
            approval_rate: round2(approved as f64 / total_f * 100.0),
            rejection_rate: round2(rejected as f64 / total_f * 100.0),
            average_income: round2(income_sum / total_f),
            average_loan_amount: round2(loan_sum / total_f),
            pending_review,
        }
    }
}

/// Scans a repository on demand; holds no state of its own.
pub struct AnalyticsAggregator<'a, R: ?Sized> {
    repository: &'a R,
}

impl<'a, R> AnalyticsAggregator<'a, R>
where
    R: ApplicationRepository + ?Sized,
{
    pub fn new(repository: &'a R) -> Self {
        Self { repository }
    }

    pub fn summarize(&self) -> Result<AnalyticsSummary, RepositoryError> {
        let records = self.repository.records()?;
        Ok(AnalyticsSummary::from_records(&records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::repository::InMemoryApplicationStore;

    #[test]
    fn empty_store_summarizes_to_zeroes() {
        let store = InMemoryApplicationStore::new();
        let summary = AnalyticsAggregator::new(&store)
            .summarize()
            .expect("summary");
        assert_eq!(summary, AnalyticsSummary::default());
        assert_eq!(summary.approval_rate, 0.0);
        assert_eq!(summary.average_loan_amount, 0.0);
    }
}
