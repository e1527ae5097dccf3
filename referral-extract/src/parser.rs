//! Turns a model completion into an [`ExtractionResult`].
//!
//! Parsing never fails. JSON is tried first (both the flat object the prompt
//! asks for and the nested first-visit chart some models still return); when
//! the completion is not JSON, labelled `key: value` text is read instead.
//! Whatever cannot be found keeps the placeholder.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::models::{ExtractionResult, Field};

/// JSON paths read for each field; the first non-empty one wins unless the
/// field combines all of them.
struct JsonSource {
    field: Field,
    paths: &'static [&'static [&'static str]],
    combine: bool,
}

const JSON_SOURCES: &[JsonSource] = &[
    JsonSource {
        field: Field::Name,
        paths: &[&["name"], &["patient_name"], &["patient_info", "name"], &["氏名"], &["患者名"]],
        combine: false,
    },
    JsonSource {
        field: Field::DateOfBirth,
        paths: &[
            &["date_of_birth"],
            &["birth_date"],
            &["dob"],
            &["patient_info", "birth_date"],
            &["patient_info", "date_of_birth"],
            &["生年月日"],
        ],
        combine: false,
    },
    JsonSource {
        field: Field::ChiefComplaint,
        paths: &[
            &["chief_complaint"],
            &["soap", "subjective"],
            &["clinical_course", "reason_for_referral"],
            &["主訴"],
        ],
        combine: false,
    },
    JsonSource {
        field: Field::History,
        paths: &[&["history"], &["medical_history"], &["past_medical_history"], &["既往歴"]],
        combine: false,
    },
    JsonSource {
        field: Field::Medications,
        paths: &[
            &["medications"],
            &["current_medications"],
            &["prn_medications"],
            &["内服薬"],
        ],
        combine: true,
    },
    JsonSource {
        field: Field::Allergies,
        paths: &[&["allergies"], &["allergy"], &["アレルギー"]],
        combine: false,
    },
    JsonSource {
        field: Field::AcpPreferences,
        paths: &[
            &["acp_preferences"],
            &["acp"],
            &["advance_care_planning"],
            &["ACP"],
        ],
        combine: false,
    },
    JsonSource {
        field: Field::Diagnosis,
        paths: &[&["diagnosis"], &["diagnoses"], &["病名"]],
        combine: false,
    },
];

/// Extra labels recognised in plain-text completions, on top of each
/// field's key and display label.
const TEXT_ALIASES: &[(&str, Field)] = &[
    ("patient name", Field::Name),
    ("patient_name", Field::Name),
    ("患者氏名", Field::Name),
    ("患者名", Field::Name),
    ("患者", Field::Name),
    ("名前", Field::Name),
    ("お名前", Field::Name),
    ("date of birth", Field::DateOfBirth),
    ("birth_date", Field::DateOfBirth),
    ("birthdate", Field::DateOfBirth),
    ("dob", Field::DateOfBirth),
    ("誕生日", Field::DateOfBirth),
    ("chief complaint", Field::ChiefComplaint),
    ("complaint", Field::ChiefComplaint),
    ("紹介理由", Field::ChiefComplaint),
    ("紹介目的", Field::ChiefComplaint),
    ("medical history", Field::History),
    ("medical_history", Field::History),
    ("past medical history", Field::History),
    ("past_medical_history", Field::History),
    ("既往", Field::History),
    ("病歴", Field::History),
    ("medication", Field::Medications),
    ("current_medications", Field::Medications),
    ("prn_medications", Field::Medications),
    ("処方薬", Field::Medications),
    ("処方", Field::Medications),
    ("服薬", Field::Medications),
    ("常用薬", Field::Medications),
    ("頓服薬", Field::Medications),
    ("内服", Field::Medications),
    ("薬剤", Field::Medications),
    ("allergy", Field::Allergies),
    ("薬剤アレルギー", Field::Allergies),
    ("食物アレルギー", Field::Allergies),
    ("アレルギー歴", Field::Allergies),
    ("acp", Field::AcpPreferences),
    ("advance care planning", Field::AcpPreferences),
    ("advance_care_planning", Field::AcpPreferences),
    ("dnr", Field::AcpPreferences),
    ("意向", Field::AcpPreferences),
    ("本人の意向", Field::AcpPreferences),
    ("急変時対応", Field::AcpPreferences),
    ("diagnoses", Field::Diagnosis),
    ("診断名", Field::Diagnosis),
    ("診断", Field::Diagnosis),
];

static LABELS: LazyLock<HashMap<String, Field>> = LazyLock::new(|| {
    let mut labels = HashMap::new();
    for field in Field::ALL {
        labels.insert(field.key().to_lowercase(), field);
        labels.insert(field.label().to_lowercase(), field);
    }
    for (alias, field) in TEXT_ALIASES {
        labels.insert(alias.to_lowercase(), *field);
    }
    labels
});

/// Label alternation, longest first so `患者名` beats `患者`.
static LABEL_ALTERNATION: LazyLock<String> = LazyLock::new(|| {
    let mut labels: Vec<&String> = LABELS.keys().collect();
    labels.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
    labels
        .iter()
        .map(|label| regex::escape(label))
        .collect::<Vec<_>>()
        .join("|")
});

/// `label:` preceded by start of line or a delimiter; markdown and bracket
/// decorations around the label are allowed.
static LABEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"(?i)(?:^|[\s{{、，,;；・•\-\*])[\*\[【「"'#\s]*(?P<label>{})[\*\]】」"'\s]*[:：=]"#,
        *LABEL_ALTERNATION
    ))
    .expect("label pattern compiles")
});

/// A line that is only a label, e.g. `【病名】` or `## 既往歴`.
static HEADING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"(?i)^\s*(?:#+\s*)?[\*\[【「"'\s]*(?P<label>{})[\*\]】」"'\s]*[:：]?\s*$"#,
        *LABEL_ALTERNATION
    ))
    .expect("heading pattern compiles")
});

/// Parse a raw completion. Never fails; missing fields keep the placeholder.
pub fn parse_response(raw: &str) -> ExtractionResult {
    let text = strip_code_fences(raw);

    // JSON that names none of the fields is incidental, e.g. `備考：{}`
    let result = match parse_json(text).filter(|r| r.found_count() > 0) {
        Some(result) => {
            debug!(found = result.found_count(), "Parsed completion as JSON");
            result
        }
        None => {
            let result = parse_key_values(text);
            debug!(found = result.found_count(), "Parsed completion as key/value text");
            result
        }
    };

    if result.found_count() == 0 {
        warn!(
            completion_length = raw.len(),
            "No fields recognised in completion"
        );
    }
    result
}

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// First JSON object in the completion that yields at least one field.
fn parse_json(text: &str) -> Option<ExtractionResult> {
    json_objects(text)
        .map(|object| fields_from_object(&object))
        .find(|result| result.found_count() > 0)
}

fn fields_from_object(object: &Map<String, Value>) -> ExtractionResult {
    let mut result = ExtractionResult::default();

    for source in JSON_SOURCES {
        let mut values = source
            .paths
            .iter()
            .filter_map(|path| lookup(object, path))
            .filter_map(render_value);

        if source.combine {
            for value in values {
                result.append(source.field, &value);
            }
        } else if let Some(value) = values.next() {
            result.set(source.field, value);
        }
    }

    result
}

/// Candidate objects, lazily: the whole text, then the first complete JSON
/// value starting at each `{`, so prose like `{JSON}形式で` before the real
/// object is skipped.
fn json_objects(text: &str) -> impl Iterator<Item = Map<String, Value>> + '_ {
    let whole = serde_json::from_str::<Value>(text)
        .ok()
        .and_then(first_object);

    let embedded = text.match_indices('{').filter_map(move |(start, _)| {
        serde_json::Deserializer::from_str(&text[start..])
            .into_iter::<Value>()
            .next()?
            .ok()
            .and_then(first_object)
    });

    whole.into_iter().chain(embedded)
}

/// An object, or the first object of an array.
fn first_object(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(object) => Some(object),
        Value::Array(items) => items.into_iter().find_map(|item| match item {
            Value::Object(object) => Some(object),
            _ => None,
        }),
        _ => None,
    }
}

fn lookup<'a>(object: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let value = object
        .get(*first)
        .or_else(|| {
            object
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(first))
                .map(|(_, value)| value)
        })?;

    if rest.is_empty() {
        Some(value)
    } else {
        lookup(value.as_object()?, rest)
    }
}

/// Flatten a JSON value into display text; `None` when there is nothing to show.
fn render_value(value: &Value) -> Option<String> {
    let rendered = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(render_value)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(entries) => entries
            .iter()
            .filter_map(|(key, value)| render_value(value).map(|v| format!("{}: {}", key, v)))
            .collect::<Vec<_>>()
            .join("\n"),
    };

    if rendered.is_empty() {
        None
    } else {
        Some(rendered)
    }
}

fn parse_key_values(text: &str) -> ExtractionResult {
    let mut result = ExtractionResult::default();
    // Field collecting continuation lines after a bare heading
    let mut section: Option<Field> = None;

    for line in text.lines() {
        let matches: Vec<_> = LABEL_PATTERN.captures_iter(line).collect();

        if matches.is_empty() {
            if let Some(field) = HEADING_PATTERN
                .captures(line)
                .and_then(|caps| field_for(&caps["label"]))
            {
                section = Some(field);
            } else if is_json_closer(line) {
                section = None;
            } else if let Some(field) = section {
                result.append(field, &section_item(line));
            }
            continue;
        }

        for (i, caps) in matches.iter().enumerate() {
            let (Some(whole), Some(label)) = (caps.get(0), caps.name("label")) else {
                continue;
            };
            let Some(field) = field_for(label.as_str()) else {
                continue;
            };

            let end = matches
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(line.len());
            let value = clean_value(&line[whole.end()..end]);

            // `"history": [` opens a list whose items follow on later lines
            if value.is_empty() || value == "[" || value == "{" {
                section = Some(field);
            } else if value.starts_with('[') || value.starts_with('{') {
                result.append(field, &inline_json(value));
                section = (!value.ends_with(']') && !value.ends_with('}')).then_some(field);
            } else {
                result.append(field, value);
                section = None;
            }
        }
    }

    result
}

fn field_for(label: &str) -> Option<Field> {
    LABELS.get(&label.trim().to_lowercase()).copied()
}

fn clean_value(raw: &str) -> &str {
    raw.trim()
        .trim_end_matches([',', '、', '，', ';', '；'])
        .trim()
        .trim_matches(['"', '*'])
        .trim()
}

/// A JSON value written inline after a label. Truncated arrays keep
/// whatever items are complete.
fn inline_json(value: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<Value>(value) {
        return render_value(&parsed).unwrap_or_default();
    }
    value
        .trim_start_matches(['[', '{'])
        .trim_end_matches([']', '}'])
        .split(',')
        .map(clean_value)
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// One continuation line under a section: a bullet, a quoted list item or a
/// `"key": value` pair from a nested object.
fn section_item(line: &str) -> String {
    let item = strip_bullet(line);
    if item.starts_with('"') {
        if let Some((key, value)) = item.split_once("\":") {
            return format!("{}: {}", key.trim_matches('"'), clean_value(value));
        }
    }
    clean_value(item).to_string()
}

/// `]`, `},` and the like end an open list or object.
fn is_json_closer(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| matches!(c, ']' | '}' | ',' | ' '))
}

fn strip_bullet(line: &str) -> &str {
    line.trim()
        .trim_start_matches(['-', '*', '・', '•'])
        .trim()
}
