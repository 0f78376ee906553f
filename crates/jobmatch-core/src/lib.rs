//! Core domain model and matching predicates for JobMatch.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "jobmatch-core";

/// One job posting. Field names on the wire follow the published JSON
/// contract (`type`, `salaryRange`); snapshots that still carry the
/// database-style `salary_range` spelling deserialize through the alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub company: String,
    pub title: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub employment_type: Option<String>,
    #[serde(
        rename = "salaryRange",
        alias = "salary_range",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub salary_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

/// Read-only category reference record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub subcategories: Vec<String>,
}

/// Exact-equality filters over opportunity attributes. Present keys AND
/// together; an absent key imposes no restriction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpportunityFilters {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub employment_type: Option<String>,
    pub company: Option<String>,
}

impl OpportunityFilters {
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.subcategory.is_none()
            && self.employment_type.is_none()
            && self.company.is_none()
    }

    pub fn matches(&self, opportunity: &Opportunity) -> bool {
        key_matches(&self.category, Some(&opportunity.category))
            && key_matches(&self.subcategory, opportunity.subcategory.as_deref())
            && key_matches(&self.employment_type, opportunity.employment_type.as_deref())
            && key_matches(&self.company, Some(&opportunity.company))
    }
}

fn key_matches(filter: &Option<String>, value: Option<&str>) -> bool {
    match filter {
        Some(expected) => value == Some(expected.as_str()),
        None => true,
    }
}

/// Case-insensitive search predicate: substring match against title, company,
/// or description, or whole-string equality against any skills entry.
pub fn matches_query(opportunity: &Opportunity, query: &str) -> bool {
    let needle = query.to_lowercase();
    opportunity.title.to_lowercase().contains(&needle)
        || opportunity.company.to_lowercase().contains(&needle)
        || opportunity.description.to_lowercase().contains(&needle)
        || opportunity
            .skills
            .iter()
            .any(|skill| skill.to_lowercase() == needle)
}

/// First-seen-order deduplication, preserving input order.
pub fn distinct_strings<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(*value))
        .map(str::to_string)
        .collect()
}

/// Aggregate counts over the current opportunity set. Computed per request,
/// never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_opportunities: usize,
    pub total_categories: usize,
    pub total_companies: usize,
    pub total_locations: usize,
    pub category_counts: BTreeMap<String, usize>,
    pub companies: Vec<String>,
    pub locations: Vec<String>,
}

impl Stats {
    pub fn compute(opportunities: &[Opportunity], categories: &[Category]) -> Self {
        let mut category_counts: BTreeMap<String, usize> = BTreeMap::new();
        for opportunity in opportunities {
            *category_counts.entry(opportunity.category.clone()).or_default() += 1;
        }

        let companies =
            distinct_strings(opportunities.iter().map(|o| o.company.as_str()));
        let locations =
            distinct_strings(opportunities.iter().filter_map(|o| o.location.as_deref()));

        Self {
            total_opportunities: opportunities.len(),
            total_categories: categories.len(),
            total_companies: companies.len(),
            total_locations: locations.len(),
            category_counts,
            companies,
            locations,
        }
    }
}
