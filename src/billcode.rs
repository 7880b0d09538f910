//! Bill code parsing
//!
//! Bill codes arrive from traffic exports as either `"Agency:Customer"` or a
//! bare `"Customer"`. Only the first colon separates the two halves; customer
//! names may themselves contain colons.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBillCode {
    pub agency_name: Option<String>,
    pub customer_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillCodeError {
    Empty,
    Malformed(String),
}

impl std::fmt::Display for BillCodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Bill code cannot be empty"),
            Self::Malformed(code) => write!(f, "Invalid bill code format: {}", code),
        }
    }
}

impl std::error::Error for BillCodeError {}

/// Parse a bill code into agency and customer halves.
///
/// `"IW Group:CMS"` → agency `IW Group`, customer `CMS`.
/// `"CMS"` → no agency, customer `CMS`.
pub fn parse_bill_code(bill_code: &str) -> Result<ParsedBillCode, BillCodeError> {
    let bill_code = bill_code.trim();
    if bill_code.is_empty() {
        return Err(BillCodeError::Empty);
    }

    match bill_code.split_once(':') {
        Some((agency, customer)) => {
            let agency = agency.trim();
            let customer = customer.trim();
            if agency.is_empty() || customer.is_empty() {
                return Err(BillCodeError::Malformed(bill_code.to_string()));
            }
            Ok(ParsedBillCode {
                agency_name: Some(agency.to_string()),
                customer_name: customer.to_string(),
            })
        }
        None => Ok(ParsedBillCode {
            agency_name: None,
            customer_name: bill_code.to_string(),
        }),
    }
}
