use async_trait::async_trait;
use orbit_core::{OrbitError, OrbitResult, Skill};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Durable record of skills. Enforces `(name, effective_date)` uniqueness —
/// a violation is an [`OrbitError::IntegrityViolation`], never silently
/// overwritten.
#[async_trait]
pub trait SkillStore: Send + Sync {
    /// Insert a new skill version.
    async fn put(&self, skill: Skill) -> OrbitResult<()>;

    /// All versions of every skill, for selection and hot reload.
    async fn all(&self) -> OrbitResult<Vec<Skill>>;

    /// All versions of one skill name, any order.
    async fn versions_of(&self, name: &str) -> OrbitResult<Vec<Skill>>;
}

/// File-backed skill store: one JSON file holding all versions of one
/// skill name.
pub struct FileSkillStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Vec<Skill>>>,
}

impl FileSkillStore {
    /// Open (creating if absent) a skill store rooted at `dir`, loading
    /// every `*.json` file's versions into the in-memory cache.
    pub async fn new(dir: PathBuf) -> OrbitResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        let mut cache = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if !name.ends_with(".json") {
                continue;
            }
            let data = tokio::fs::read_to_string(entry.path()).await?;
            let versions: Vec<Skill> = serde_json::from_str(&data)?;
            if let Some(first) = versions.first() {
                cache.insert(first.name.clone(), versions);
            }
        }
        Ok(Self {
            dir,
            cache: RwLock::new(cache),
        })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl SkillStore for FileSkillStore {
    async fn put(&self, skill: Skill) -> OrbitResult<()> {
        let mut cache = self.cache.write().await;
        let versions = cache.entry(skill.name.clone()).or_default();
        if versions
            .iter()
            .any(|s| s.effective_date == skill.effective_date)
        {
            return Err(OrbitError::IntegrityViolation(format!(
                "skill '{}' already has a version effective {}",
                skill.name, skill.effective_date
            )));
        }
        versions.push(skill.clone());
        let json = serde_json::to_string_pretty(versions)?;
        tokio::fs::write(self.path(&skill.name), json).await?;
        Ok(())
    }

    async fn all(&self) -> OrbitResult<Vec<Skill>> {
        Ok(self.cache.read().await.values().flatten().cloned().collect())
    }

    async fn versions_of(&self, name: &str) -> OrbitResult<Vec<Skill>> {
        Ok(self.cache.read().await.get(name).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_core::SkillContent;

    fn skill(name: &str, effective: chrono::DateTime<chrono::Utc>) -> Skill {
        Skill {
            name: name.into(),
            version: "1.0.0".into(),
            effective_date: effective,
            content: SkillContent {
                instructions: "do the thing".into(),
                examples: vec![],
                constraints: vec![],
                escalation_triggers: vec![],
            },
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_name_and_effective_date() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileSkillStore::new(tmp.path().to_path_buf()).await.unwrap();
        let when = chrono::Utc::now();
        store.put(skill("w2_extraction", when)).await.unwrap();
        let err = store.put(skill("w2_extraction", when)).await.unwrap_err();
        assert!(matches!(err, OrbitError::IntegrityViolation(_)));
    }
}
