//! Specialist roles, capability tags and task types.
//!
//! These three closed enumerations drive assignment: every [`TaskType`] carries
//! an ordered list of preferred [`Role`]s and the [`Capability`] a worker needs
//! to execute it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Role declared by a worker when it is spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Team leader, splits and coordinates work.
    Leader,
    Architect,
    Backend,
    Frontend,
    Testing,
    Security,
    Devops,
    Documentation,
}

impl Role {
    /// All roles in declaration order.
    pub const ALL: [Role; 8] = [
        Role::Leader,
        Role::Architect,
        Role::Backend,
        Role::Frontend,
        Role::Testing,
        Role::Security,
        Role::Devops,
        Role::Documentation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Leader => "leader",
            Role::Architect => "architect",
            Role::Backend => "backend",
            Role::Frontend => "frontend",
            Role::Testing => "testing",
            Role::Security => "security",
            Role::Devops => "devops",
            Role::Documentation => "documentation",
        }
    }

    /// Human-readable specialist title.
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Leader => "Team Leader",
            Role::Architect => "Architecture Specialist",
            Role::Backend => "Backend Specialist",
            Role::Frontend => "Frontend Specialist",
            Role::Testing => "Testing Specialist",
            Role::Security => "Security Specialist",
            Role::Devops => "DevOps Specialist",
            Role::Documentation => "Documentation Specialist",
        }
    }

    /// Badge shown next to the specialist in activity feeds.
    pub fn emoji(&self) -> &'static str {
        match self {
            Role::Leader => "🚀",
            Role::Architect => "🏛️",
            Role::Backend => "⚙️",
            Role::Frontend => "🎨",
            Role::Testing => "🧪",
            Role::Security => "🛡️",
            Role::Devops => "📦",
            Role::Documentation => "📝",
        }
    }

    /// Capabilities a freshly spawned worker of this role advertises.
    pub fn default_capabilities(&self) -> Vec<Capability> {
        match self {
            Role::Leader => vec![Capability::Planning, Capability::SystemDesign],
            Role::Architect => vec![Capability::SystemDesign, Capability::DataModeling],
            Role::Backend => vec![Capability::ApiDevelopment, Capability::DataModeling],
            Role::Frontend => vec![Capability::UiDevelopment],
            Role::Testing => vec![Capability::TestAutomation],
            Role::Security => vec![Capability::SecurityReview],
            Role::Devops => vec![Capability::Deployment],
            Role::Documentation => vec![Capability::TechnicalWriting],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown role '{}'", s)))
    }
}

/// Capability tag advertised by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Planning,
    SystemDesign,
    ApiDevelopment,
    DataModeling,
    UiDevelopment,
    TestAutomation,
    SecurityReview,
    Deployment,
    TechnicalWriting,
}

impl Capability {
    pub const ALL: [Capability; 9] = [
        Capability::Planning,
        Capability::SystemDesign,
        Capability::ApiDevelopment,
        Capability::DataModeling,
        Capability::UiDevelopment,
        Capability::TestAutomation,
        Capability::SecurityReview,
        Capability::Deployment,
        Capability::TechnicalWriting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Planning => "planning",
            Capability::SystemDesign => "system_design",
            Capability::ApiDevelopment => "api_development",
            Capability::DataModeling => "data_modeling",
            Capability::UiDevelopment => "ui_development",
            Capability::TestAutomation => "test_automation",
            Capability::SecurityReview => "security_review",
            Capability::Deployment => "deployment",
            Capability::TechnicalWriting => "technical_writing",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown capability '{}'", s)))
    }
}

/// Declared type of a task, used for role matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Coordination,
    Architecture,
    ApiDesign,
    Backend,
    Database,
    Frontend,
    UiDesign,
    Testing,
    Security,
    Deployment,
    Documentation,
    /// Catch-all type with no preferred role.
    General,
}

impl TaskType {
    pub const ALL: [TaskType; 12] = [
        TaskType::Coordination,
        TaskType::Architecture,
        TaskType::ApiDesign,
        TaskType::Backend,
        TaskType::Database,
        TaskType::Frontend,
        TaskType::UiDesign,
        TaskType::Testing,
        TaskType::Security,
        TaskType::Deployment,
        TaskType::Documentation,
        TaskType::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Coordination => "coordination",
            TaskType::Architecture => "architecture",
            TaskType::ApiDesign => "api_design",
            TaskType::Backend => "backend",
            TaskType::Database => "database",
            TaskType::Frontend => "frontend",
            TaskType::UiDesign => "ui_design",
            TaskType::Testing => "testing",
            TaskType::Security => "security",
            TaskType::Deployment => "deployment",
            TaskType::Documentation => "documentation",
            TaskType::General => "general",
        }
    }

    /// Acceptable roles for this task type, best fit first.
    pub fn preferred_roles(&self) -> &'static [Role] {
        match self {
            TaskType::Coordination => &[Role::Leader, Role::Architect],
            TaskType::Architecture => &[Role::Architect, Role::Leader, Role::Backend],
            TaskType::ApiDesign => &[Role::Backend, Role::Architect],
            TaskType::Backend => &[Role::Backend],
            TaskType::Database => &[Role::Backend, Role::Architect],
            TaskType::Frontend => &[Role::Frontend],
            TaskType::UiDesign => &[Role::Frontend, Role::Architect],
            TaskType::Testing => &[Role::Testing, Role::Backend, Role::Frontend],
            TaskType::Security => &[Role::Security, Role::Backend],
            TaskType::Deployment => &[Role::Devops, Role::Backend],
            TaskType::Documentation => &[Role::Documentation, Role::Architect],
            TaskType::General => &[],
        }
    }

    /// Position of `role` in the preferred list, if it is listed at all.
    pub fn role_rank(&self, role: Role) -> Option<usize> {
        self.preferred_roles().iter().position(|r| *r == role)
    }

    /// Capability a worker must carry to execute this task type natively.
    pub fn required_capability(&self) -> Capability {
        match self {
            TaskType::Coordination => Capability::Planning,
            TaskType::Architecture => Capability::SystemDesign,
            TaskType::ApiDesign | TaskType::Backend => Capability::ApiDevelopment,
            TaskType::Database => Capability::DataModeling,
            TaskType::Frontend | TaskType::UiDesign => Capability::UiDevelopment,
            TaskType::Testing => Capability::TestAutomation,
            TaskType::Security => Capability::SecurityReview,
            TaskType::Deployment => Capability::Deployment,
            TaskType::Documentation | TaskType::General => Capability::TechnicalWriting,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown task type '{}'", s)))
    }
}
