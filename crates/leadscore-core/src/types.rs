//! Domain records exchanged with the scoring service.
//!
//! The service is lenient about nulls and stores an offer's target roles and
//! industries as comma-joined text, so deserialization here normalises both
//! into the shapes the rest of the client works with.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Intent
// ---------------------------------------------------------------------------

/// The service's categorical judgment of a lead's likelihood to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown intent '{0}' (expected high, medium or low)")]
pub struct UnknownIntent(pub String);

impl Intent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::High => "High",
            Intent::Medium => "Medium",
            Intent::Low => "Low",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = UnknownIntent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Intent::High),
            "medium" => Ok(Intent::Medium),
            "low" => Ok(Intent::Low),
            _ => Err(UnknownIntent(s.to_string())),
        }
    }
}

impl Serialize for Intent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Lenient on the wire: the service stores whatever label its model returned,
/// and falls back to Low itself, so an unrecognised or missing label reads as
/// [`Intent::Low`] rather than failing the whole listing.
impl<'de> Deserialize<'de> for Intent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(Intent::Low);
        };
        Ok(raw.parse().unwrap_or_else(|UnknownIntent(label)| {
            tracing::warn!(intent = %label, "unrecognised intent label, reading as Low");
            Intent::Low
        }))
    }
}

/// Result filter used by listings and exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntentFilter {
    #[default]
    All,
    Only(Intent),
}

impl IntentFilter {
    #[must_use]
    pub fn matches(self, intent: Intent) -> bool {
        match self {
            IntentFilter::All => true,
            IntentFilter::Only(wanted) => wanted == intent,
        }
    }
}

impl FromStr for IntentFilter {
    type Err = UnknownIntent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(IntentFilter::All);
        }
        s.parse().map(IntentFilter::Only)
    }
}

// ---------------------------------------------------------------------------
// Offer / Lead / ScoredResult
// ---------------------------------------------------------------------------

/// A product or offer that leads are scored against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: i64,
    pub name: String,
    pub value_props: String,
    pub ideal_use_cases: String,
    #[serde(default, deserialize_with = "list_or_comma_joined")]
    pub target_roles: Vec<String>,
    #[serde(default, deserialize_with = "list_or_comma_joined")]
    pub target_industries: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A prospect parsed by the service from an uploaded batch file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub role: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub company: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub industry: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub location: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub linkedin_bio: String,
}

/// One lead's score against an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub lead: Lead,
    /// Id of the offer the lead was scored against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<i64>,
    pub ai_intent: Intent,
    #[serde(default)]
    pub final_score: f64,
    #[serde(default)]
    pub rules_score: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListOrText {
    List(Vec<String>),
    Text(String),
}

fn list_or_comma_joined<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items: Vec<String> = match Option::<ListOrText>::deserialize(deserializer)? {
        None => return Ok(Vec::new()),
        Some(ListOrText::List(items)) => items,
        Some(ListOrText::Text(text)) => text.split(',').map(str::to_owned).collect(),
    };
    Ok(items
        .into_iter()
        .map(|item| item.trim().to_owned())
        .filter(|item| !item.is_empty())
        .collect())
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_parses_case_insensitively() {
        assert_eq!("high".parse::<Intent>().unwrap(), Intent::High);
        assert_eq!(" Medium ".parse::<Intent>().unwrap(), Intent::Medium);
        assert_eq!("LOW".parse::<Intent>().unwrap(), Intent::Low);
        assert!("urgent".parse::<Intent>().is_err());
    }

    #[test]
    fn unrecognised_intent_label_reads_as_low() {
        let results: Vec<ScoredResult> = serde_json::from_value(serde_json::json!([
            {"lead": {"name": "Ava"}, "ai_intent": "Moderate", "final_score": 5},
            {"lead": {"name": "Ben"}, "ai_intent": null, "final_score": 2},
            {"lead": {"name": "Cy"}, "ai_intent": "high", "final_score": 9}
        ]))
        .unwrap();

        let intents: Vec<Intent> = results.iter().map(|r| r.ai_intent).collect();
        assert_eq!(intents, vec![Intent::Low, Intent::Low, Intent::High]);
    }

    #[test]
    fn intent_filter_parses_all_and_single_intent() {
        assert_eq!("all".parse::<IntentFilter>().unwrap(), IntentFilter::All);
        assert_eq!(
            "high".parse::<IntentFilter>().unwrap(),
            IntentFilter::Only(Intent::High)
        );
        assert!(IntentFilter::All.matches(Intent::Low));
        assert!(!IntentFilter::Only(Intent::High).matches(Intent::Low));
    }

    #[test]
    fn offer_accepts_comma_joined_targets() {
        let offer: Offer = serde_json::from_value(serde_json::json!({
            "id": 3,
            "name": "AI Outreach Automation",
            "value_props": "24/7 outreach",
            "ideal_use_cases": "B2B SaaS mid-market",
            "target_roles": "Head of Growth, VP Sales,,",
            "target_industries": null,
            "added_by": 1,
            "created_at": "2025-09-20T10:15:00.123456Z"
        }))
        .unwrap();

        assert_eq!(offer.target_roles, vec!["Head of Growth", "VP Sales"]);
        assert!(offer.target_industries.is_empty());
        assert!(offer.created_at.is_some());
    }

    #[test]
    fn offer_accepts_list_targets() {
        let offer: Offer = serde_json::from_value(serde_json::json!({
            "id": 4,
            "name": "Payroll Suite",
            "value_props": "Fewer errors",
            "ideal_use_cases": "Retail chains",
            "target_roles": ["CFO", " Controller "]
        }))
        .unwrap();

        assert_eq!(offer.target_roles, vec!["CFO", "Controller"]);
        assert!(offer.target_industries.is_empty());
        assert!(offer.created_at.is_none());
    }

    #[test]
    fn scored_result_tolerates_null_lead_fields() {
        let result: ScoredResult = serde_json::from_value(serde_json::json!({
            "id": 11,
            "lead": {
                "id": 7,
                "name": "Ava Patel",
                "role": null,
                "company": "FlowMetrics",
                "industry": null,
                "location": null,
                "linkedin_bio": null
            },
            "offer": 3,
            "rules_score": 0,
            "ai_intent": "High",
            "final_score": 8,
            "reasoning": "Decision maker in a target industry."
        }))
        .unwrap();

        assert_eq!(result.lead.name, "Ava Patel");
        assert_eq!(result.lead.role, "");
        assert_eq!(result.ai_intent, Intent::High);
        assert!((result.final_score - 8.0).abs() < f64::EPSILON);
        assert_eq!(result.offer, Some(3));
    }
}
