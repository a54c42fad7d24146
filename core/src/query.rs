//! Board queries: filtering, column grouping, header stats.
//!
//! Pure functions over a case slice; nothing here touches state.

use std::cmp::Reverse;

use serde::Serialize;

use crate::model::{Case, CaseStage, InsuranceStatus, PartsStatus, Priority};

/// Board filter. `None` on a dimension means "all".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseFilter {
    /// Case-insensitive substring over name, phone, registration and model.
    pub search: String,
    pub priority: Option<Priority>,
    pub stage: Option<CaseStage>,
    pub insurance: Option<InsuranceStatus>,
    pub parts: Option<PartsStatus>,
}

impl CaseFilter {
    pub fn matches(&self, case: &Case) -> bool {
        self.matches_search(case)
            && self.priority.is_none_or(|p| case.priority == p)
            && self.stage.is_none_or(|s| case.stage == s)
            && self.insurance.is_none_or(|s| case.insurance_status == s)
            && self.parts.is_none_or(|s| case.parts_status == s)
    }

    fn matches_search(&self, case: &Case) -> bool {
        let query = self.search.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        [
            &case.customer_name,
            &case.customer_phone,
            &case.registration_number,
            &case.vehicle_model,
        ]
        .into_iter()
        .any(|field| field.to_lowercase().contains(&query))
    }
}

/// Cases matching `filter`, in input order.
pub fn filter_cases<'a>(cases: &'a [Case], filter: &CaseFilter) -> Vec<&'a Case> {
    cases.iter().filter(|case| filter.matches(case)).collect()
}

/// Column order: urgent first, then most recently updated. Stable.
pub fn sort_column(cases: &mut [&Case]) {
    cases.sort_by_key(|case| (case.priority != Priority::Urgent, Reverse(case.updated_at)));
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardColumn<'a> {
    pub stage: CaseStage,
    pub cases: Vec<&'a Case>,
}

/// One column per stage, in workflow order.
#[derive(Debug, Clone, Serialize)]
pub struct Board<'a> {
    pub columns: Vec<BoardColumn<'a>>,
}

impl<'a> Board<'a> {
    pub fn column(&self, stage: CaseStage) -> &[&'a Case] {
        self.columns
            .iter()
            .find(|column| column.stage == stage)
            .map(|column| column.cases.as_slice())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.columns.iter().map(|column| column.cases.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Filter and group into ordered columns.
pub fn build_board<'a>(cases: &'a [Case], filter: &CaseFilter) -> Board<'a> {
    let visible = filter_cases(cases, filter);
    let columns = CaseStage::ORDER
        .into_iter()
        .map(|stage| {
            let mut column: Vec<&Case> = visible
                .iter()
                .copied()
                .filter(|case| case.stage == stage)
                .collect();
            sort_column(&mut column);
            BoardColumn {
                stage,
                cases: column,
            }
        })
        .collect();
    Board { columns }
}

/// Header counters, computed over the unfiltered collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BoardStats {
    pub total: usize,
    /// Urgent and not yet closed.
    pub urgent: usize,
    /// Damage assessment, repair, or insurance claim.
    pub in_workshop: usize,
    pub ready_for_delivery: usize,
    pub closed: usize,
    pub active: usize,
}

impl BoardStats {
    pub fn from_cases(cases: &[Case]) -> Self {
        let mut stats = Self {
            total: cases.len(),
            ..Default::default()
        };
        for case in cases {
            if case.priority == Priority::Urgent && !case.is_closed() {
                stats.urgent += 1;
            }
            match case.stage {
                CaseStage::DamageAssessment
                | CaseStage::RepairInProgress
                | CaseStage::InsuranceClaim => stats.in_workshop += 1,
                CaseStage::ReadyForDelivery => stats.ready_for_delivery += 1,
                CaseStage::CaseClosed => stats.closed += 1,
                CaseStage::NewIntake => {}
            }
        }
        stats.active = stats.total - stats.closed;
        stats
    }
}
