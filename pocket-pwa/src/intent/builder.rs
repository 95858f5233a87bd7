//! UPI deep-link construction and validation
//!
//! Builds `upi://pay?pa=..&am=..&cu=INR&tn=..&tr=..[&mc=..]` URIs. Parameter
//! order is fixed so generated links are stable across runs.

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::ValidationError;

/// Scheme and host shared by every generic UPI link
pub const UPI_PREFIX: &str = "upi://pay";

/// Currency sent with every intent
pub const CURRENCY: &str = "INR";

static UPI_ID_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[a-zA-Z0-9._-]+@[a-zA-Z0-9.-]+$").expect("static pattern compiles")
});

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// ============================================================================
// UPI address
// ============================================================================

/// A payee address of the form `user@bank`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UpiId(String);

impl UpiId {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Missing);
        }
        if !UPI_ID_PATTERN.is_match(trimmed) {
            return Err(ValidationError::InvalidUpiId(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Part before the `@`
    pub fn handle(&self) -> &str {
        self.0.split('@').next().unwrap_or_default()
    }
}

/// Quick syntactic check used by forms before building anything
pub fn is_valid_upi_id(raw: &str) -> bool {
    UpiId::parse(raw).is_ok()
}

impl TryFrom<String> for UpiId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UpiId> for String {
    fn from(id: UpiId) -> Self {
        id.0
    }
}

impl fmt::Display for UpiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Amount
// ============================================================================

/// A strictly positive rupee amount, held as whole paise
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    /// Largest accepted amount, far above any UPI transfer limit
    const MAX_PAISE: u64 = 1_000_000_000_000;

    pub fn from_paise(paise: u64) -> Result<Self, ValidationError> {
        if paise == 0 || paise > Self::MAX_PAISE {
            return Err(ValidationError::InvalidAmount(paise.to_string()));
        }
        Ok(Self(paise))
    }

    /// Round a float to two decimals; NaN, infinities and values that round
    /// to zero or below are rejected
    pub fn from_f64(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::InvalidAmount(value.to_string()));
        }
        let paise = (value * 100.0).round();
        if paise <= 0.0 || paise > Self::MAX_PAISE as f64 {
            return Err(ValidationError::InvalidAmount(value.to_string()));
        }
        Ok(Self(paise as u64))
    }

    pub fn paise(&self) -> u64 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Indian-locale display, e.g. `₹1,50,000.00`
    pub fn display_inr(&self) -> String {
        let rupees = self.0 / 100;
        let paise = self.0 % 100;
        let digits = rupees.to_string();
        let grouped = if digits.len() <= 3 {
            digits
        } else {
            let (head, tail) = digits.split_at(digits.len() - 3);
            let mut groups: Vec<&str> = Vec::new();
            let mut end = head.len();
            while end > 2 {
                groups.push(&head[end - 2..end]);
                end -= 2;
            }
            groups.push(&head[..end]);
            groups.reverse();
            format!("{},{}", groups.join(","), tail)
        };
        format!("₹{}.{:02}", grouped, paise)
    }
}

impl FromStr for Amount {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Missing);
        }
        let value: f64 = trimmed
            .parse()
            .map_err(|_| ValidationError::InvalidAmount(trimmed.to_string()))?;
        Self::from_f64(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Amount::from_f64(n),
            Raw::Text(s) => s.parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Intent URI
// ============================================================================

/// A fully built deep-link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentUri(String);

impl IntentUri {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Query string without the leading `?`
    pub fn query(&self) -> &str {
        self.0.split_once('?').map(|(_, q)| q).unwrap_or_default()
    }

    /// Same query under another scheme/host, e.g. `phonepe://pay`
    pub fn with_prefix(&self, prefix: &str) -> IntentUri {
        IntentUri(format!("{}?{}", prefix, self.query()))
    }
}

impl fmt::Display for IntentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated payment parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub upi_id: UpiId,
    pub amount: Amount,
    pub note: Option<String>,
    pub transaction_id: Option<String>,
    pub merchant_code: Option<String>,
}

impl PaymentRequest {
    pub fn new(upi_id: UpiId, amount: Amount) -> Self {
        Self {
            upi_id,
            amount,
            note: None,
            transaction_id: None,
            merchant_code: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = Some(id.into());
        self
    }

    pub fn with_merchant_code(mut self, code: impl Into<String>) -> Self {
        self.merchant_code = Some(code.into());
        self
    }

    /// Note sent in `tn`; falls back to "Payment to <payee>"
    pub fn effective_note(&self) -> String {
        match self.note.as_deref().map(str::trim) {
            Some(note) if !note.is_empty() => note.to_string(),
            _ => format!("Payment to {}", self.upi_id),
        }
    }
}

/// Build the intent URI for validated parameters.
///
/// A transaction reference is generated when none is supplied.
pub fn build_intent(request: &PaymentRequest) -> IntentUri {
    let transaction_id = request
        .transaction_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(generate_transaction_id);

    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("pa", request.upi_id.as_str())
        .append_pair("am", &request.amount.to_string())
        .append_pair("cu", CURRENCY)
        .append_pair("tn", &request.effective_note())
        .append_pair("tr", &transaction_id);
    if let Some(code) = request.merchant_code.as_deref().filter(|c| !c.is_empty()) {
        query.append_pair("mc", code);
    }

    IntentUri(format!("{}?{}", UPI_PREFIX, query.finish()))
}

/// Validate raw inputs and build the intent URI
pub fn build(
    upi_id: &str,
    amount: &str,
    note: Option<&str>,
    transaction_id: Option<&str>,
    merchant_code: Option<&str>,
) -> Result<IntentUri, ValidationError> {
    let mut request = PaymentRequest::new(UpiId::parse(upi_id)?, amount.parse()?);
    request.note = note.map(str::to_string);
    request.transaction_id = transaction_id.map(str::to_string);
    request.merchant_code = merchant_code.map(str::to_string);
    Ok(build_intent(&request))
}

/// `TXN<epoch millis><random base-36>`. Collisions are possible but unlikely
/// and only affect reference quality.
pub fn generate_transaction_id() -> String {
    format!(
        "TXN{}{}",
        chrono::Utc::now().timestamp_millis(),
        random_base36(9)
    )
}

/// Random lowercase base-36 string
pub fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

// ============================================================================
// Parsing scanned payloads
// ============================================================================

/// Fields read from a scanned `upi://` QR payload. Values are raw so the
/// form can be prefilled and validated on submit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedIntent {
    pub upi_id: String,
    pub amount: String,
    pub note: String,
    pub merchant_code: String,
    pub transaction_id: String,
    pub currency: String,
}

/// Parse a decoded QR payload into its UPI fields
pub fn parse_intent(payload: &str) -> Result<ScannedIntent, ValidationError> {
    let payload = payload.trim();
    if !payload.to_ascii_lowercase().starts_with("upi://") {
        return Err(ValidationError::InvalidIntent(
            "expected \"upi://\" prefix".to_string(),
        ));
    }

    let query = payload.split_once('?').map(|(_, q)| q).unwrap_or_default();
    let mut scanned = ScannedIntent {
        currency: CURRENCY.to_string(),
        ..ScannedIntent::default()
    };
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = value.into_owned();
        match key.as_ref() {
            "pa" => scanned.upi_id = value,
            "am" => scanned.amount = value,
            "tn" => scanned.note = value,
            "mc" => scanned.merchant_code = value,
            "tr" => scanned.transaction_id = value,
            "cu" if !value.is_empty() => scanned.currency = value,
            _ => {}
        }
    }

    if scanned.upi_id.is_empty() {
        return Err(ValidationError::InvalidIntent("missing payee address".into()));
    }
    Ok(scanned)
}
