use crate::document::{self, ValidationError};
use chrono::{DateTime, TimeZone, Utc};
use orbit_core::{OrbitError, OrbitResult, Skill};
use orbit_store::SkillStore;
use std::sync::Arc;
use tracing::info;

/// The Skill Engine (C4): loads, validates, and version-selects rule packs
/// by effective date.
///
/// Skills live in the Store; `select` always reads a fresh snapshot from
/// it, so a concurrent administrative insert is visible to the next
/// dispatch without restarting anything (the hot-reload requirement of
/// §4.4).
pub struct SkillEngine<S: SkillStore> {
    store: Arc<S>,
}

impl<S: SkillStore> SkillEngine<S> {
    /// Wrap a [`SkillStore`] with validation and date-effective selection.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Validate a YAML skill document without persisting it. Dry-run
    /// friendly: returns every problem found, never throws.
    pub fn validate(yaml: &str) -> Result<Skill, Vec<ValidationError>> {
        document::parse(yaml)
    }

    /// Validate and persist a new skill version. Fails with
    /// [`OrbitError::IntegrityViolation`] if `(name, effective_date)` is
    /// already taken (enforced by the underlying store), or
    /// [`OrbitError::Validation`] if the document itself is malformed.
    pub async fn load(&self, yaml: &str) -> OrbitResult<Skill> {
        let skill = document::parse(yaml).map_err(|errors| {
            OrbitError::Validation(
                errors
                    .into_iter()
                    .map(|e| e.0)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;
        self.store.put(skill.clone()).await?;
        info!(skill = %skill.name, version = %skill.version, "skill loaded");
        Ok(skill)
    }

    /// Select the effective version of `name` for `tax_year`: the record
    /// with the greatest `effective_date <= Jan 1 of tax_year`. Returns
    /// `Ok(None)` — "absent" — rather than an error when no version
    /// qualifies.
    pub async fn select(&self, name: &str, tax_year: i32) -> OrbitResult<Option<Skill>> {
        let cutoff = jan_first(tax_year);
        let versions = self.store.versions_of(name).await?;
        Ok(versions
            .into_iter()
            .filter(|s| s.effective_date <= cutoff)
            .max_by_key(|s| s.effective_date))
    }

    /// Select every skill in `names` for `tax_year`, silently dropping
    /// names that resolve to "absent" — the Context Builder's contract
    /// (§4.6 step 3) for the `task_type → [skill_name…]` map.
    pub async fn select_many(&self, names: &[String], tax_year: i32) -> OrbitResult<Vec<Skill>> {
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            if let Some(skill) = self.select(name, tax_year).await? {
                selected.push(skill);
            }
        }
        Ok(selected)
    }
}

fn jan_first(tax_year: i32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(tax_year, 1, 1, 0, 0, 0)
        .single()
        .expect("tax_year produces a valid calendar date")
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_store::FileSkillStore;

    async fn engine() -> SkillEngine<FileSkillStore> {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(FileSkillStore::new(tmp.path().to_path_buf()).await.unwrap());
        std::mem::forget(tmp);
        SkillEngine::new(store)
    }

    fn doc(name: &str, effective_date: &str) -> String {
        format!(
            "metadata:\n  name: {name}\n  version: \"1.0.0\"\n  effective_date: \"{effective_date}\"\n  tags: []\ncontent:\n  instructions: \"do the thing\"\n"
        )
    }

    #[tokio::test]
    async fn selects_greatest_effective_date_not_exceeding_cutoff() {
        let engine = engine().await;
        engine.load(&doc("w2", "2022-01-01")).await.unwrap();
        engine.load(&doc("w2", "2023-06-01")).await.unwrap();
        engine.load(&doc("w2", "2024-03-01")).await.unwrap();

        let selected = engine.select("w2", 2024).await.unwrap().unwrap();
        assert_eq!(
            selected.effective_date,
            Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn returns_absent_when_no_version_qualifies() {
        let engine = engine().await;
        engine.load(&doc("w2", "2025-01-01")).await.unwrap();
        let selected = engine.select("w2", 2024).await.unwrap();
        assert!(selected.is_none());
    }

    #[tokio::test]
    async fn select_many_drops_absent_names() {
        let engine = engine().await;
        engine.load(&doc("w2", "2022-01-01")).await.unwrap();
        let names = vec!["w2".to_string(), "nonexistent".to_string()];
        let selected = engine.select_many(&names, 2024).await.unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "w2");
    }
}
