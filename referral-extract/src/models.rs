use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ExtractionError, Result};

/// Marker stored in every field the model did not supply
pub const PLACEHOLDER: &str = "not found";

/// Upload formats accepted for the image tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Jpeg,
    Png,
    Pdf,
}

impl MediaType {
    pub fn from_mime(mime: &str) -> Result<Self> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Ok(MediaType::Jpeg),
            "image/png" => Ok(MediaType::Png),
            "application/pdf" => Ok(MediaType::Pdf),
            _ => Err(ExtractionError::UnsupportedMediaType(mime.to_string())),
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Pdf => "application/pdf",
        }
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, MediaType::Pdf)
    }
}

/// One uploaded page or file
#[derive(Clone, Serialize, Deserialize)]
pub struct ImageAttachment {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub media_type: MediaType,
    pub file_name: Option<String>,
}

impl ImageAttachment {
    pub fn new(data: Vec<u8>, media_type: MediaType) -> Self {
        Self {
            data,
            media_type,
            file_name: None,
        }
    }

    /// Validates the mime string before anything else touches the bytes.
    pub fn from_mime(data: Vec<u8>, mime: &str) -> Result<Self> {
        let media_type = MediaType::from_mime(mime)?;
        Ok(Self::new(data, media_type))
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("bytes", &self.data.len())
            .field("media_type", &self.media_type)
            .field("file_name", &self.file_name)
            .finish()
    }
}

/// Input for one extraction: pasted text or one or more uploaded pages
#[derive(Debug, Clone)]
pub enum ExtractionRequest {
    Text(String),
    Images(Vec<ImageAttachment>),
}

impl ExtractionRequest {
    pub fn text(text: impl Into<String>) -> Self {
        ExtractionRequest::Text(text.into())
    }

    /// Single photographed page.
    pub fn image(data: Vec<u8>, mime: &str) -> Result<Self> {
        Ok(ExtractionRequest::Images(vec![ImageAttachment::from_mime(
            data, mime,
        )?]))
    }

    pub fn images(images: Vec<ImageAttachment>) -> Self {
        ExtractionRequest::Images(images)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionRequest::Text(_) => "text",
            ExtractionRequest::Images(_) => "images",
        }
    }

    /// Rejects requests that would send nothing useful to the model.
    pub fn validate(&self) -> Result<()> {
        match self {
            ExtractionRequest::Text(text) if text.trim().is_empty() => Err(
                ExtractionError::InvalidInput("Referral text cannot be empty".to_string()),
            ),
            ExtractionRequest::Images(images) if images.is_empty() => Err(
                ExtractionError::InvalidInput("At least one file is required".to_string()),
            ),
            ExtractionRequest::Images(images) => {
                match images.iter().find(|image| image.data.is_empty()) {
                    Some(empty) => Err(ExtractionError::InvalidInput(format!(
                        "Uploaded file {} is empty",
                        empty.file_name.as_deref().unwrap_or("(unnamed)")
                    ))),
                    None => Ok(()),
                }
            }
            ExtractionRequest::Text(_) => Ok(()),
        }
    }
}

/// The fixed keys of an extraction result, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    DateOfBirth,
    ChiefComplaint,
    History,
    Medications,
    Allergies,
    AcpPreferences,
    Diagnosis,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Name,
        Field::DateOfBirth,
        Field::ChiefComplaint,
        Field::History,
        Field::Medications,
        Field::Allergies,
        Field::AcpPreferences,
        Field::Diagnosis,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::DateOfBirth => "date_of_birth",
            Field::ChiefComplaint => "chief_complaint",
            Field::History => "history",
            Field::Medications => "medications",
            Field::Allergies => "allergies",
            Field::AcpPreferences => "acp_preferences",
            Field::Diagnosis => "diagnosis",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Field::Name => "氏名",
            Field::DateOfBirth => "生年月日",
            Field::ChiefComplaint => "主訴",
            Field::History => "既往歴",
            Field::Medications => "内服薬",
            Field::Allergies => "アレルギー",
            Field::AcpPreferences => "ACP（意向）",
            Field::Diagnosis => "病名",
        }
    }
}

/// Flat record of the eight extracted fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub name: String,
    pub date_of_birth: String,
    pub chief_complaint: String,
    pub history: String,
    pub medications: String,
    pub allergies: String,
    pub acp_preferences: String,
    pub diagnosis: String,
}

impl Default for ExtractionResult {
    fn default() -> Self {
        Self {
            name: PLACEHOLDER.to_string(),
            date_of_birth: PLACEHOLDER.to_string(),
            chief_complaint: PLACEHOLDER.to_string(),
            history: PLACEHOLDER.to_string(),
            medications: PLACEHOLDER.to_string(),
            allergies: PLACEHOLDER.to_string(),
            acp_preferences: PLACEHOLDER.to_string(),
            diagnosis: PLACEHOLDER.to_string(),
        }
    }
}

impl ExtractionResult {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Name => &self.name,
            Field::DateOfBirth => &self.date_of_birth,
            Field::ChiefComplaint => &self.chief_complaint,
            Field::History => &self.history,
            Field::Medications => &self.medications,
            Field::Allergies => &self.allergies,
            Field::AcpPreferences => &self.acp_preferences,
            Field::Diagnosis => &self.diagnosis,
        }
    }

    fn slot(&mut self, field: Field) -> &mut String {
        match field {
            Field::Name => &mut self.name,
            Field::DateOfBirth => &mut self.date_of_birth,
            Field::ChiefComplaint => &mut self.chief_complaint,
            Field::History => &mut self.history,
            Field::Medications => &mut self.medications,
            Field::Allergies => &mut self.allergies,
            Field::AcpPreferences => &mut self.acp_preferences,
            Field::Diagnosis => &mut self.diagnosis,
        }
    }

    /// Stores a value; blank values leave the placeholder in place.
    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        let value = value.into();
        let value = value.trim();
        if !value.is_empty() {
            *self.slot(field) = value.to_string();
        }
    }

    /// Appends on a new line if the field already holds a value.
    pub fn append(&mut self, field: Field, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        if self.is_found(field) {
            let slot = self.slot(field);
            slot.push('\n');
            slot.push_str(value);
        } else {
            self.set(field, value);
        }
    }

    pub fn is_found(&self, field: Field) -> bool {
        self.get(field) != PLACEHOLDER
    }

    pub fn found_count(&self) -> usize {
        Field::ALL.iter().filter(|f| self.is_found(**f)).count()
    }

    pub fn entries(&self) -> impl Iterator<Item = (Field, &str)> + '_ {
        Field::ALL.into_iter().map(move |field| (field, self.get(field)))
    }

    /// Copy-paste friendly rendering for pasting into an EHR.
    pub fn to_plain_text(&self) -> String {
        let rule = "=".repeat(40);
        let mut out = Vec::new();
        for (field, value) in self.entries() {
            out.push(rule.clone());
            out.push(format!("【{}】", field.label()));
            out.push(rule.clone());
            out.push(value.to_string());
            out.push(String::new());
        }
        out.join("\n")
    }
}

/// One finished extraction as handed back to the UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub request_id: String,
    pub extracted_at: DateTime<Utc>,
    pub result: ExtractionResult,
    pub raw_completion: String,
}
