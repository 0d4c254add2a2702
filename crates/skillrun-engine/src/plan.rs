//! What a task run is allowed to see, loaded from the content backend.

use tracing::debug;

use skillrun_core::{Agent, Isolation, PermissionMode, ProviderConfig, Skill, Task, TaskType};

use crate::catalog::DataAccess;
use crate::error::RunError;
use crate::prompt::build_system_prompt;

/// The capability set and conversation settings of one run.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub agent: Agent,
    /// Skills whose instructions are loaded, in selection order.
    pub skills: Vec<Skill>,
    /// Single selected skill; nothing else reachable.
    pub forced: bool,
    pub project_providers: Vec<ProviderConfig>,
    pub agent_providers: Vec<ProviderConfig>,
    /// One entry per selected skill, same order as `skills`.
    pub skill_providers: Vec<Vec<ProviderConfig>>,
    /// Empty allows every discovered tool.
    pub allow_list: Vec<String>,
    pub model: String,
    pub permission_mode: PermissionMode,
    pub system_prompt: String,
}

impl RunPlan {
    /// Resolve the agent, skills and provider tiers for `task`.
    pub async fn load(
        data: &dyn DataAccess,
        task: &Task,
        project_providers: &[ProviderConfig],
    ) -> Result<Self, RunError> {
        let agent = data.get_agent(&task.agent_id).await?;

        let (skills, forced) = match task.task_type {
            TaskType::Skill => {
                let skill_id = task.skill_id.as_deref().ok_or_else(|| {
                    RunError::InvalidTask("skill tasks require a skillId".to_string())
                })?;
                (vec![data.get_skill(skill_id).await?], true)
            }
            TaskType::Agent => {
                let mut skills = Vec::with_capacity(agent.skill_ids.len());
                for id in &agent.skill_ids {
                    skills.push(data.get_skill(id).await?);
                }
                (skills, false)
            }
        };

        let agent_providers = data.list_tool_providers(&agent.tool_provider_ids).await?;
        let mut skill_providers = Vec::with_capacity(skills.len());
        for skill in &skills {
            skill_providers.push(data.list_tool_providers(&skill.tool_provider_ids).await?);
        }

        let allow_list = if forced {
            skills[0].allowed_tools.clone()
        } else {
            agent.allowed_tools.clone()
        };
        let permission_mode = task
            .permission_mode
            .or(agent.permission_mode)
            .unwrap_or_default();
        let system_prompt = build_system_prompt(&agent, &skills, forced, &task.input_values);

        debug!(
            task_id = %task.id,
            agent = %agent.id,
            skills = skills.len(),
            forced,
            "Run plan loaded"
        );

        Ok(Self {
            model: agent.model.clone(),
            agent,
            skills,
            forced,
            project_providers: project_providers.to_vec(),
            agent_providers,
            skill_providers,
            allow_list,
            permission_mode,
            system_prompt,
        })
    }

    /// Isolation metadata for the task record.
    pub fn isolation(&self, providers: &[ProviderConfig]) -> Isolation {
        Isolation {
            forced: self.forced,
            skill_ids: self.skills.iter().map(|s| s.id.clone()).collect(),
            providers: providers.iter().map(|p| p.name.clone()).collect(),
            allowed_tools: self.allow_list.clone(),
            other_skills_reachable: !self.forced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogDocument, FileCatalog};
    use serde_json::json;
    use skillrun_core::{NewTask, TransportConfig};
    use std::collections::BTreeMap;

    fn provider(name: &str) -> ProviderConfig {
        ProviderConfig::new(
            name,
            TransportConfig::InProcess {
                handle: name.to_string(),
            },
        )
    }

    fn catalog() -> FileCatalog {
        let mut agent = Agent::new("a1", "Researcher", "claude-sonnet-4");
        agent.skill_ids = vec!["s1".into(), "s2".into()];
        agent.tool_provider_ids = vec!["web".into()];
        agent.allowed_tools = vec!["WebFetch".into(), "Bash".into()];
        agent.permission_mode = Some(PermissionMode::AcceptEdits);

        let mut fetch = Skill::new("s1", "fetch", "Fetch {{url}}");
        fetch.allowed_tools = vec!["WebFetch".into()];
        fetch.tool_provider_ids = vec!["fetcher".into()];
        let summarize = Skill::new("s2", "summarize", "Summarize the page");

        FileCatalog::new(CatalogDocument {
            agents: vec![agent],
            skills: vec![fetch, summarize],
            tool_providers: vec![provider("web"), provider("fetcher")],
        })
    }

    fn task(task_type: TaskType, skill_id: Option<&str>) -> Task {
        Task::new(NewTask {
            name: "t".into(),
            agent_id: "a1".into(),
            task_type,
            skill_id: skill_id.map(String::from),
            user_prompt: "go".into(),
            input_values: BTreeMap::from([("url".to_string(), json!("https://example.com"))]),
            permission_mode: None,
        })
    }

    #[tokio::test]
    async fn skill_task_is_forced_and_restricted() {
        let plan = RunPlan::load(&catalog(), &task(TaskType::Skill, Some("s1")), &[provider("proj")])
            .await
            .unwrap();

        assert!(plan.forced);
        assert_eq!(plan.allow_list, vec!["WebFetch".to_string()]);
        assert_eq!(plan.skill_providers.len(), 1);
        assert_eq!(plan.skill_providers[0][0].name, "fetcher");
        assert!(plan.system_prompt.contains("Fetch https://example.com"));
        assert!(!plan.system_prompt.contains("Summarize"));

        let isolation = plan.isolation(&[provider("fetcher")]);
        assert!(isolation.forced);
        assert!(!isolation.other_skills_reachable);
        assert_eq!(isolation.skill_ids, vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn agent_task_loads_every_skill() {
        let plan = RunPlan::load(&catalog(), &task(TaskType::Agent, None), &[])
            .await
            .unwrap();

        assert!(!plan.forced);
        assert_eq!(plan.skills.len(), 2);
        assert_eq!(plan.allow_list.len(), 2);
        assert_eq!(plan.permission_mode, PermissionMode::AcceptEdits);
        assert_eq!(plan.agent_providers[0].name, "web");
        assert!(plan.isolation(&[]).other_skills_reachable);
    }

    #[tokio::test]
    async fn skill_task_without_skill_is_invalid() {
        let err = RunPlan::load(&catalog(), &task(TaskType::Skill, None), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::InvalidTask(_)));
    }

    #[tokio::test]
    async fn unknown_skill_is_reported() {
        let err = RunPlan::load(&catalog(), &task(TaskType::Skill, Some("zzz")), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Catalog(crate::error::CatalogError::SkillNotFound(_))));
    }
}
