use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Flight,
    Hotel,
    Visa,
    Itinerary,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flight => "flight",
            Self::Hotel => "hotel",
            Self::Visa => "visa",
            Self::Itinerary => "itinerary",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "flight" | "boarding_pass" | "e_ticket" => Some(Self::Flight),
            "hotel" | "booking" | "accommodation" => Some(Self::Hotel),
            "visa" => Some(Self::Visa),
            "itinerary" => Some(Self::Itinerary),
            _ => None,
        }
    }
}

/// One field from the document service. Values arrive as text; thresholds
/// have already been applied upstream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub name: String,
    pub value: String,
    pub confidence: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentExtraction {
    pub document_type: DocumentType,
    pub fields: Vec<ExtractedField>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

impl DocumentExtraction {
    pub fn new(document_type: DocumentType) -> Self {
        Self { document_type, fields: Vec::new(), received_at: None }
    }

    pub fn with_field(mut self, name: &str, value: &str, confidence: f32) -> Self {
        self.fields.push(ExtractedField {
            name: name.to_owned(),
            value: value.to_owned(),
            confidence,
        });
        self
    }

    /// First non-blank value for any of the given field names.
    pub fn field(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| {
            self.fields
                .iter()
                .find(|field| field.name.eq_ignore_ascii_case(name) && !field.value.trim().is_empty())
                .map(|field| field.value.trim())
        })
    }
}
