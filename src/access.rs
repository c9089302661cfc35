use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const POLICY_FILE_NAME: &str = "access_policy.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Admin,
    Student,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

/// Identity-to-role mapping for portal sign-in. Loaded per workspace and
/// replaceable at runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPolicy {
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub students: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_domain: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NotListed,
    NotAdmin,
    InvalidDomain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
}

impl AccessDecision {
    fn allow(role: Role) -> Self {
        Self {
            allowed: true,
            role: Some(role),
            reason: None,
        }
    }

    fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            role: None,
            reason: Some(reason),
        }
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn normalize_domain(raw: &str) -> String {
    let d = raw.trim().to_lowercase();
    if d.starts_with('@') {
        d
    } else {
        format!("@{d}")
    }
}

impl AccessPolicy {
    /// Normalises every address and drops blanks and duplicates.
    pub fn normalized(self) -> Self {
        let clean = |list: Vec<String>| {
            let mut out: Vec<String> = list
                .iter()
                .map(|e| normalize_email(e))
                .filter(|e| !e.is_empty())
                .collect();
            out.sort();
            out.dedup();
            out
        };
        Self {
            admins: clean(self.admins),
            students: clean(self.students),
            student_domain: self
                .student_domain
                .filter(|d| !d.trim().is_empty())
                .map(|d| normalize_domain(&d)),
        }
    }

    pub fn is_admin(&self, email: &str) -> bool {
        let e = normalize_email(email);
        self.admins.iter().any(|a| *a == e)
    }

    pub fn is_listed_student(&self, email: &str) -> bool {
        let e = normalize_email(email);
        self.students.iter().any(|s| *s == e)
    }

    /// True when no domain is configured.
    pub fn on_student_domain(&self, email: &str) -> bool {
        match &self.student_domain {
            Some(domain) => normalize_email(email).ends_with(domain.as_str()),
            None => true,
        }
    }

    pub fn resolve(&self, email: &str, requested: Option<Role>) -> AccessDecision {
        let admin = self.is_admin(email);
        let student = self.is_listed_student(email);
        match requested {
            Some(Role::Admin) if admin => AccessDecision::allow(Role::Admin),
            Some(Role::Admin) => AccessDecision::deny(DenyReason::NotAdmin),
            Some(Role::Student) if student => AccessDecision::allow(Role::Student),
            Some(Role::Student) if admin => AccessDecision::allow(Role::Admin),
            Some(Role::Student) if !self.on_student_domain(email) => {
                AccessDecision::deny(DenyReason::InvalidDomain)
            }
            Some(Role::Student) => AccessDecision::deny(DenyReason::NotListed),
            None if admin => AccessDecision::allow(Role::Admin),
            None if student => AccessDecision::allow(Role::Student),
            None => AccessDecision::deny(DenyReason::NotListed),
        }
    }
}

pub fn load_policy_file(path: &Path) -> anyhow::Result<AccessPolicy> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    let policy: AccessPolicy = serde_json::from_str(&text)
        .with_context(|| format!("invalid access policy in {}", path.to_string_lossy()))?;
    Ok(policy.normalized())
}
