use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use orbit_core::{Skill, SkillContent};
use serde::{Deserialize, Serialize};

/// Raw shape of a skill YAML document: a `metadata{}` section and a
/// `content{}` section, matching the Skill Engine's input format exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SkillDocument {
    metadata: SkillMetadataDoc,
    content: SkillContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SkillMetadataDoc {
    name: String,
    version: String,
    effective_date: String,
    #[serde(default)]
    tags: Vec<String>,
}

/// One structured validation failure. Validation never throws — it
/// accumulates every problem it finds so a dry-run can report them all at
/// once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse and validate a skill YAML document.
///
/// Rejects missing required fields, malformed dates, and empty
/// `instructions` — returning every problem found, not just the first.
pub fn parse(yaml: &str) -> Result<Skill, Vec<ValidationError>> {
    let doc: SkillDocument = match serde_yaml_ng::from_str(yaml) {
        Ok(d) => d,
        Err(e) => return Err(vec![ValidationError(format!("malformed skill document: {e}"))]),
    };

    let mut errors = Vec::new();

    if doc.metadata.name.trim().is_empty() {
        errors.push(ValidationError("metadata.name must not be empty".into()));
    }
    if doc.metadata.version.trim().is_empty() {
        errors.push(ValidationError("metadata.version must not be empty".into()));
    }
    if doc.content.instructions.trim().is_empty() {
        errors.push(ValidationError("content.instructions must not be empty".into()));
    }

    let effective_date = match parse_date(&doc.metadata.effective_date) {
        Ok(d) => Some(d),
        Err(e) => {
            errors.push(ValidationError(format!(
                "metadata.effective_date '{}' is malformed: {e}",
                doc.metadata.effective_date
            )));
            None
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(Skill {
        name: doc.metadata.name,
        version: doc.metadata.version,
        // unwrap is safe: any parse failure above already returned Err.
        effective_date: effective_date.expect("effective_date validated above"),
        content: doc.content,
        tags: doc.metadata.tags,
    })
}

/// Dump a [`Skill`] back to the YAML document shape `parse` accepts. A
/// round trip through `dump` then `parse` yields an equal model (ignoring
/// insignificant whitespace), per the Skill Engine's round-trip property.
pub fn dump(skill: &Skill) -> Result<String, serde_yaml_ng::Error> {
    let doc = SkillDocument {
        metadata: SkillMetadataDoc {
            name: skill.name.clone(),
            version: skill.version.clone(),
            effective_date: skill.effective_date.date_naive().to_string(),
            tags: skill.tags.clone(),
        },
        content: skill.content.clone(),
    };
    serde_yaml_ng::to_string(&doc)
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| e.to_string())?;
    let naive_midnight = naive.and_hms_opt(0, 0, 0).ok_or("invalid time of day")?;
    Ok(Utc.from_utc_datetime(&naive_midnight))
}
