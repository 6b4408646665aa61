//! Reference numbers and contact data mentioned in a customer message.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static CUSTOMER_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)cust\d+").unwrap());
static ORDER_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)ord\d+").unwrap());
static TRACKING_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)trk\d+").unwrap());
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Entities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// First occurrence of each entity kind.
pub fn extract_entities(message: &str) -> Entities {
    let first = |re: &Regex| re.find(message).map(|m| m.as_str().to_string());
    Entities {
        customer_id: first(&CUSTOMER_ID),
        order_id: first(&ORDER_ID),
        tracking_id: first(&TRACKING_ID),
        email: first(&EMAIL),
    }
}
