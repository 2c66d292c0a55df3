use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::entity::workflow_definition::WorkflowDefinition;
use crate::domain::entity::workflow_step::{AssignmentKind, StepAssignment, WorkflowStep};

/// DefinitionLoader はディスク上の YAML ファイルから承認フロー定義を読み込む。
pub struct DefinitionLoader {
    definition_dir: PathBuf,
}

impl DefinitionLoader {
    pub fn new(definition_dir: impl Into<PathBuf>) -> Self {
        Self {
            definition_dir: definition_dir.into(),
        }
    }

    /// ディレクトリ内の全 .yaml/.yml ファイルを読み込む。
    /// ディレクトリが存在しない場合は空のリストを返す。
    pub async fn load_all(&self) -> anyhow::Result<Vec<WorkflowDefinition>> {
        if !self.definition_dir.exists() {
            tracing::warn!(
                dir = %self.definition_dir.display(),
                "definition directory does not exist, returning empty list"
            );
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.definition_dir).await?;
        let mut definitions = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase();
            if ext != "yaml" && ext != "yml" {
                continue;
            }

            match self.load_file(&path).await {
                Ok(def) => {
                    tracing::info!(
                        file = %path.display(),
                        service_code = %def.service_code,
                        steps = def.step_count(),
                        "loaded workflow definition"
                    );
                    definitions.push(def);
                }
                Err(e) => {
                    tracing::warn!(
                        file = %path.display(),
                        error = %e,
                        "failed to load workflow definition, skipping"
                    );
                }
            }
        }

        Ok(definitions)
    }

    pub async fn load_file(&self, path: &Path) -> anyhow::Result<WorkflowDefinition> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to read file {}: {}", path.display(), e))?;
        definition_from_yaml(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse definition from {}: {}", path.display(), e))
    }
}

#[derive(Debug, Deserialize)]
struct DefinitionFile {
    service_code: String,
    #[serde(default)]
    operation_code: String,
    name: String,
    #[serde(default)]
    description: String,
    steps: Vec<StepFile>,
}

#[derive(Debug, Deserialize)]
struct StepFile {
    order: i32,
    #[serde(default)]
    code: String,
    name: String,
    #[serde(default)]
    time_limit_hours: i32,
    #[serde(default)]
    require_comment: bool,
    assignments: Vec<AssignmentFile>,
}

#[derive(Debug, Deserialize)]
struct AssignmentFile {
    kind: AssignmentKind,
    identity: String,
    #[serde(default)]
    factory_id: Option<i64>,
    #[serde(default)]
    department_ids: Vec<i64>,
    #[serde(default)]
    priority: i32,
}

/// YAML 文字列を検証し、ID を採番した WorkflowDefinition に変換する。
pub fn definition_from_yaml(content: &str) -> anyhow::Result<WorkflowDefinition> {
    let file: DefinitionFile = serde_yaml::from_str(content)?;
    if file.service_code.trim().is_empty() {
        anyhow::bail!("service_code must not be empty");
    }
    if file.steps.is_empty() {
        anyhow::bail!("definition {} has no steps", file.service_code);
    }

    let mut seen = HashSet::new();
    for step in &file.steps {
        if !seen.insert(step.order) {
            anyhow::bail!("duplicate step order {} in {}", step.order, file.service_code);
        }
        if step.assignments.iter().any(|a| a.identity.trim().is_empty()) {
            anyhow::bail!("step {} has an assignment without identity", step.order);
        }
    }

    let mut def = WorkflowDefinition::new(file.service_code, file.operation_code, file.name);
    def.description = file.description;
    def.steps = file
        .steps
        .into_iter()
        .map(|s| {
            let code = if s.code.is_empty() {
                format!("S{}", s.order)
            } else {
                s.code
            };
            let mut step = WorkflowStep::new(def.id, code, s.name, s.order);
            step.time_limit_hours = s.time_limit_hours;
            step.require_comment = s.require_comment;
            step.assignments = s
                .assignments
                .into_iter()
                .map(|a| {
                    let mut assignment = StepAssignment::new(step.id, a.kind, a.identity)
                        .with_departments(a.department_ids);
                    assignment.factory_id = a.factory_id;
                    assignment.priority = a.priority;
                    assignment
                })
                .collect();
            step
        })
        .collect();
    def.steps.sort_by_key(|s| s.order);
    Ok(def)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_temp_dir() -> TempDir {
        tempfile::tempdir().expect("failed to create temp dir")
    }

    const PURCHASE_YAML: &str = r#"
service_code: WEITWPURI05
operation_code: PURI05
name: Purchase requisition
steps:
  - order: 20
    name: Factory manager
    time_limit_hours: 48
    assignments:
      - kind: GROUP
        identity: MGR
        factory_id: 1
  - order: 10
    code: LEAD
    name: Team lead
    assignments:
      - kind: USER
        identity: "1"
        department_ids: [3, 4]
"#;

    const EXPENSE_YAML: &str = r#"
service_code: WEITWEXP01
name: Expense report
steps:
  - order: 10
    name: Accounting
    assignments:
      - kind: GROUP
        identity: ACC
"#;

    const NO_STEPS_YAML: &str = r#"
service_code: WEITWEMPTY
name: Empty
steps: []
"#;

    // ---- definition_from_yaml のテスト ----

    #[test]
    fn test_definition_from_yaml() {
        let def = definition_from_yaml(PURCHASE_YAML).unwrap();
        assert_eq!(def.service_code, "WEITWPURI05");
        assert_eq!(def.operation_code, "PURI05");
        assert!(def.is_active);

        let orders: Vec<i32> = def.steps.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![10, 20]);
        assert_eq!(def.steps[0].step_code, "LEAD");
        assert_eq!(def.steps[1].step_code, "S20");
        assert_eq!(def.steps[1].time_limit_hours, 48);
        assert!(def.steps.iter().all(|s| s.definition_id == def.id));

        let lead = &def.steps[0].assignments[0];
        assert_eq!(lead.kind, AssignmentKind::User);
        assert_eq!(lead.step_id, def.steps[0].id);
        assert_eq!(lead.department_ids, vec![3, 4]);
        let manager = &def.steps[1].assignments[0];
        assert!(manager.is_group());
        assert_eq!(manager.factory_id, Some(1));
    }

    #[test]
    fn test_definition_without_steps_is_rejected() {
        let err = definition_from_yaml(NO_STEPS_YAML).unwrap_err();
        assert!(err.to_string().contains("has no steps"));
    }

    #[test]
    fn test_duplicate_step_order_is_rejected() {
        let yaml = r#"
service_code: WEITWDUP
name: Duplicate
steps:
  - order: 10
    name: A
    assignments: [{ kind: USER, identity: alice }]
  - order: 10
    name: B
    assignments: [{ kind: USER, identity: bob }]
"#;
        let err = definition_from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate step order 10"));
    }

    #[test]
    fn test_unknown_assignment_kind_is_rejected() {
        let yaml = r#"
service_code: WEITWBAD
name: Bad kind
steps:
  - order: 10
    name: A
    assignments: [{ kind: TEAM, identity: alice }]
"#;
        assert!(definition_from_yaml(yaml).is_err());
    }

    // ---- load_file / load_all のテスト ----

    #[tokio::test]
    async fn test_load_file_not_found() {
        let dir = make_temp_dir();
        let loader = DefinitionLoader::new(dir.path());
        let msg = loader
            .load_file(&dir.path().join("nonexistent.yaml"))
            .await
            .unwrap_err()
            .to_string();
        assert!(msg.contains("failed to read file"), "unexpected error: {msg}");
    }

    #[tokio::test]
    async fn test_load_all_nonexistent_dir() {
        let loader = DefinitionLoader::new("/tmp/k1s0-approval-test-nonexistent-dir-xyz");
        assert!(loader.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_all_skips_invalid_and_non_yaml_files() {
        let dir = make_temp_dir();
        fs::write(dir.path().join("purchase.yaml"), PURCHASE_YAML).unwrap();
        fs::write(dir.path().join("expense.yml"), EXPENSE_YAML).unwrap();
        fs::write(dir.path().join("empty.yaml"), NO_STEPS_YAML).unwrap();
        fs::write(dir.path().join("readme.txt"), "some text").unwrap();

        let loader = DefinitionLoader::new(dir.path());
        let mut definitions = loader.load_all().await.unwrap();
        definitions.sort_by(|a, b| a.service_code.cmp(&b.service_code));

        let codes: Vec<&str> = definitions.iter().map(|d| d.service_code.as_str()).collect();
        assert_eq!(codes, vec!["WEITWEXP01", "WEITWPURI05"]);
    }
}
