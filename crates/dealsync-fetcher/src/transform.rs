//! Deal-to-order transform
//!
//! Pure functions turning a CRM [`Deal`] into the internal [`OrderRecord`]
//! shape. The customer details live in a free-text comment block
//! (`Key: value` lines filled in by the intake form), so extraction is
//! line-oriented and tolerant of missing keys. A transform failure is typed
//! so the sync cycle can count it and keep going.

use crate::source::Deal;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

/// Internal order shape persisted by the store, keyed by the CRM deal id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    pub external_id: String,
    pub title: String,
    pub customer_name: Option<String>,
    pub customer_mobile: Option<String>,
    pub address: Option<String>,
    pub amount: Option<f64>,
    pub time_slot: Option<String>,
    pub stage: Option<String>,
    pub source_created_at: Option<DateTime<Utc>>,
    pub source_modified_at: Option<DateTime<Utc>>,
}

/// A single deal could not be turned into an order
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("deal has no external identifier")]
    MissingId,

    #[error("deal {0}: unparseable amount {1:?}")]
    InvalidAmount(String, String),
}

fn field_line() -> &'static Regex {
    static FIELD_LINE: OnceLock<Regex> = OnceLock::new();
    FIELD_LINE.get_or_init(|| {
        Regex::new(r"(?m)^\s*([A-Za-z][A-Za-z /]*?)\s*[:\-]\s*(\S.*?)\s*$")
            .expect("field line pattern")
    })
}

/// Customer details extracted from the free-text comment block
#[derive(Debug, Default, Clone, PartialEq)]
struct CommentFields {
    name: Option<String>,
    mobile: Option<String>,
    address: Option<String>,
    time_slot: Option<String>,
}

fn parse_comment_fields(comments: &str) -> CommentFields {
    let mut fields = CommentFields::default();

    for caps in field_line().captures_iter(comments) {
        let key = caps[1].to_lowercase();
        let value = caps[2].to_string();

        match key.as_str() {
            "name" | "customer" | "customer name" => fields.name.get_or_insert(value),
            "mobile" | "phone" | "mobile no" | "contact" => {
                match normalize_mobile(&value) {
                    Some(mobile) => fields.mobile.get_or_insert(mobile),
                    None => continue,
                }
            }
            "address" | "location" | "service address" => fields.address.get_or_insert(value),
            "time slot" | "slot" | "preferred time" => fields.time_slot.get_or_insert(value),
            _ => continue,
        };
    }

    fields
}

/// Reduce a phone field to a bare 10-digit subscriber number
///
/// Accepts punctuation and a country prefix; anything that does not end in
/// 10 digits is rejected rather than stored half-parsed.
fn normalize_mobile(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 10 {
        return None;
    }
    Some(digits[digits.len() - 10..].to_string())
}

/// Transform one CRM deal into the internal order shape
///
/// Pure; the caller decides what a failure means for the batch.
pub fn transform_deal(deal: &Deal) -> Result<OrderRecord, TransformError> {
    if deal.id.trim().is_empty() {
        return Err(TransformError::MissingId);
    }

    let amount = match deal.opportunity.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.replace(',', "")
                .parse::<f64>()
                .map_err(|_| TransformError::InvalidAmount(deal.id.clone(), raw.to_string()))?,
        ),
    };

    let fields = deal
        .comments
        .as_deref()
        .map(parse_comment_fields)
        .unwrap_or_default();

    Ok(OrderRecord {
        external_id: deal.id.trim().to_string(),
        title: deal.title.clone(),
        customer_name: fields.name,
        customer_mobile: fields.mobile,
        address: fields.address,
        amount,
        time_slot: fields.time_slot,
        stage: deal.stage.clone(),
        source_created_at: deal.date_create,
        source_modified_at: deal.date_modify,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deal(id: &str) -> Deal {
        Deal {
            id: id.to_string(),
            title: "AC repair".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parses_comment_block() {
        let mut d = deal("101");
        d.comments = Some(
            "Name: Asha Rao\nMobile: +91-98765 43210\nAddress: 12 MG Road, Bengaluru\nTime Slot: 10am - 12pm"
                .to_string(),
        );
        d.opportunity = Some("1,500.00".to_string());
        d.stage = Some("NEW".to_string());

        let order = transform_deal(&d).unwrap();
        assert_eq!(order.external_id, "101");
        assert_eq!(order.customer_name.as_deref(), Some("Asha Rao"));
        assert_eq!(order.customer_mobile.as_deref(), Some("9876543210"));
        assert_eq!(order.address.as_deref(), Some("12 MG Road, Bengaluru"));
        assert_eq!(order.time_slot.as_deref(), Some("10am - 12pm"));
        assert_eq!(order.amount, Some(1500.0));
        assert_eq!(order.stage.as_deref(), Some("NEW"));
    }

    #[test]
    fn test_missing_fields_become_none() {
        let order = transform_deal(&deal("7")).unwrap();
        assert!(order.customer_name.is_none());
        assert!(order.customer_mobile.is_none());
        assert!(order.amount.is_none());
    }

    #[test]
    fn test_short_mobile_is_rejected() {
        let mut d = deal("8");
        d.comments = Some("Mobile: 12345".to_string());

        let order = transform_deal(&d).unwrap();
        assert!(order.customer_mobile.is_none());
    }

    #[test]
    fn test_missing_id_fails() {
        assert_eq!(transform_deal(&deal("  ")), Err(TransformError::MissingId));
    }

    #[test]
    fn test_garbage_amount_fails() {
        let mut d = deal("9");
        d.opportunity = Some("call for quote".to_string());

        match transform_deal(&d) {
            Err(TransformError::InvalidAmount(id, raw)) => {
                assert_eq!(id, "9");
                assert_eq!(raw, "call for quote");
            }
            other => panic!("expected InvalidAmount, got {:?}", other),
        }
    }

    #[test]
    fn test_first_occurrence_of_a_key_wins() {
        let parsed = parse_comment_fields("Name: First\nName: Second");
        assert_eq!(parsed.name.as_deref(), Some("First"));
    }
}
