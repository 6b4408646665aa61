use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use handoff_provider::AnswerEngineConfig;
use handoff_schema::{CustomerProfile, EscalationReason, EscalationRule};
use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierRules;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub env: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "handoff".to_string(),
            env: "dev".to_string(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_timeout_minutes() -> u64 {
    30
}

fn default_context_messages() -> usize {
    10
}

fn default_sweep_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
    /// How many prior messages the answer engine sees.
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: default_timeout_minutes(),
            context_messages: default_context_messages(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Sqlite,
}

fn default_ticket_path() -> String {
    "data/tickets".to_string()
}

fn default_retention_days() -> i64 {
    30
}

fn default_cleanup_interval_minutes() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketStorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Directory for the file backend, database file for sqlite.
    #[serde(default = "default_ticket_path")]
    pub path: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_cleanup_interval_minutes")]
    pub cleanup_interval_minutes: u64,
}

impl Default for TicketStorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_ticket_path(),
            retention_days: default_retention_days(),
            cleanup_interval_minutes: default_cleanup_interval_minutes(),
        }
    }
}

fn default_answer_ms() -> u64 {
    15_000
}

fn default_persist_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_answer_ms")]
    pub answer_ms: u64,
    #[serde(default = "default_persist_ms")]
    pub persist_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            answer_ms: default_answer_ms(),
            persist_ms: default_persist_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeywordRule {
    pub keyword: String,
    pub reason: EscalationReason,
}

impl KeywordRule {
    pub fn new(keyword: impl Into<String>, reason: EscalationReason) -> Self {
        Self {
            keyword: keyword.into(),
            reason,
        }
    }
}

pub fn default_keywords() -> Vec<KeywordRule> {
    use EscalationReason::{Complaint, ManualIntervention};
    vec![
        KeywordRule::new("beschwerde", Complaint),
        KeywordRule::new("unzufrieden", Complaint),
        KeywordRule::new("sofort", Complaint),
        KeywordRule::new("complaint", Complaint),
        KeywordRule::new("unhappy", Complaint),
        KeywordRule::new("mitarbeiter", ManualIntervention),
        KeywordRule::new("employee", ManualIntervention),
        KeywordRule::new("manager", ManualIntervention),
    ]
}

pub fn default_emotional_patterns() -> Vec<String> {
    [
        r"\b(sehr|extrem|total)\s+(wütend|verärgert|frustriert|unzufrieden)\b",
        r"\b(very|extremely|really)\s+(angry|upset|frustrated)\b",
        r"\b(sofort|sofortig|dringend|urgent)\b",
        r"\b(chef|vorgesetzter|supervisor)\b",
        r"\b(reklamation|beanstandung)\b",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

pub fn default_departments() -> BTreeMap<EscalationReason, String> {
    use EscalationReason::*;
    [
        (LowConfidence, "kundenservice"),
        (RepeatedQuestions, "kundenservice"),
        (EmotionalDistress, "kundenservice"),
        (VipCustomer, "vip-support"),
        (CriticalIssue, "management"),
        (TechnicalProblem, "technik"),
        (Complaint, "beschwerdemanagement"),
        (ComplexRequest, "kundenservice"),
        (ManualIntervention, "kundenservice"),
    ]
    .into_iter()
    .map(|(reason, dept)| (reason, dept.to_string()))
    .collect()
}

fn default_threshold() -> f64 {
    0.7
}

fn default_department() -> String {
    "kundenservice".to_string()
}

/// System-wide escalation tables, used for any tenant that does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<KeywordRule>,
    #[serde(default = "default_emotional_patterns")]
    pub emotional_patterns: Vec<String>,
    #[serde(default = "default_departments")]
    pub departments: BTreeMap<EscalationReason, String>,
    #[serde(default = "default_department")]
    pub default_department: String,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_threshold(),
            keywords: default_keywords(),
            emotional_patterns: default_emotional_patterns(),
            departments: default_departments(),
            default_department: default_department(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MainConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub tickets: TicketStorageConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub answer_engine: AnswerEngineConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub tenant_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub support_contact: String,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
    #[serde(default)]
    pub escalation_rules: Vec<EscalationRule>,
    /// Replaces the system keyword table for this tenant when present.
    #[serde(default)]
    pub keywords: Option<Vec<KeywordRule>>,
    #[serde(default)]
    pub customers: Vec<CustomerProfile>,
}

impl TenantConfig {
    pub fn new(tenant_id: impl Into<String>, support_contact: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            display_name: None,
            support_contact: support_contact.into(),
            confidence_threshold: None,
            escalation_rules: Vec::new(),
            keywords: None,
            customers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HandoffConfig {
    pub main: MainConfig,
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
}

pub fn resolve_env_var(raw: &str) -> String {
    let mut output = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let candidate = &rest[start + 2..];
        let Some(end) = candidate.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = &candidate[..end];
        output.push_str(&std::env::var(key).unwrap_or_default());
        rest = &candidate[end + 1..];
    }

    output.push_str(rest);
    output
}

pub fn load_config(root: &Path) -> Result<HandoffConfig> {
    let mut main: MainConfig = read_yaml_file(&root.join("main.yaml"))?;
    let mut tenants = read_yaml_dir::<TenantConfig>(&root.join("tenants.d"))?;

    resolve_main_env(&mut main);
    resolve_tenants_env(&mut tenants);

    let config = HandoffConfig { main, tenants };
    validate_config(&config)?;
    Ok(config)
}

const MAX_SESSION_TIMEOUT_MINUTES: u64 = 60 * 24 * 365;
const MAX_RETENTION_DAYS: i64 = 365 * 100;
const MAX_CLEANUP_INTERVAL_MINUTES: u64 = 60 * 24 * 365;

pub fn validate_config(config: &HandoffConfig) -> Result<()> {
    let main = &config.main;
    validate_threshold("escalation.confidence_threshold", main.escalation.confidence_threshold)?;
    if main.session.timeout_minutes == 0 {
        return Err(anyhow!("session.timeout_minutes must be positive"));
    }
    if main.timeouts.answer_ms == 0 || main.timeouts.persist_ms == 0 {
        return Err(anyhow!("timeouts must be positive"));
    }
    if main.session.timeout_minutes > MAX_SESSION_TIMEOUT_MINUTES {
        return Err(anyhow!(
            "session.timeout_minutes must be at most {MAX_SESSION_TIMEOUT_MINUTES}"
        ));
    }
    if main.tickets.retention_days <= 0 || main.tickets.retention_days > MAX_RETENTION_DAYS {
        return Err(anyhow!(
            "tickets.retention_days must be within 1..={MAX_RETENTION_DAYS}"
        ));
    }
    if main.tickets.cleanup_interval_minutes > MAX_CLEANUP_INTERVAL_MINUTES {
        return Err(anyhow!(
            "tickets.cleanup_interval_minutes must be at most {MAX_CLEANUP_INTERVAL_MINUTES}"
        ));
    }
    if main.escalation.default_department.trim().is_empty() {
        return Err(anyhow!("escalation.default_department must not be empty"));
    }
    ClassifierRules::compile(&main.escalation.keywords, &main.escalation.emotional_patterns)
        .context("invalid system escalation tables")?;

    let mut seen = HashSet::new();
    for tenant in &config.tenants {
        if tenant.tenant_id.trim().is_empty() {
            return Err(anyhow!("tenant_id must not be empty"));
        }
        if !seen.insert(tenant.tenant_id.as_str()) {
            return Err(anyhow!("duplicate tenant_id: {}", tenant.tenant_id));
        }
        if let Some(threshold) = tenant.confidence_threshold {
            validate_threshold(&format!("{}.confidence_threshold", tenant.tenant_id), threshold)?;
        }
        for rule in &tenant.escalation_rules {
            if rule.trigger.trim().is_empty() || rule.department.trim().is_empty() {
                return Err(anyhow!(
                    "tenant {}: escalation rules need a trigger and a department",
                    tenant.tenant_id
                ));
            }
        }
        if let Some(keywords) = &tenant.keywords {
            ClassifierRules::compile(keywords, &main.escalation.emotional_patterns)
                .with_context(|| format!("tenant {}: invalid keyword table", tenant.tenant_id))?;
        }
    }

    Ok(())
}

fn validate_threshold(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{name} must be within [0, 1], got {value}"));
    }
    Ok(())
}

fn read_yaml_file<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))
}

fn read_yaml_dir<T>(dir: &Path) -> Result<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
{
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("failed to read config dir: {}", dir.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read dir entry: {}", dir.display()))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("yaml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut items = Vec::with_capacity(paths.len());
    for path in paths {
        items.push(read_yaml_file::<T>(&path)?);
    }
    Ok(items)
}

fn resolve_main_env(main: &mut MainConfig) {
    main.app.name = resolve_env_var(&main.app.name);
    main.app.env = resolve_env_var(&main.app.env);
    main.server.host = resolve_env_var(&main.server.host);
    main.tickets.path = resolve_env_var(&main.tickets.path);

    if let Some(base_url) = &mut main.answer_engine.base_url {
        *base_url = resolve_env_var(base_url);
    }
    if let Some(api_key) = &mut main.answer_engine.api_key {
        *api_key = resolve_env_var(api_key);
    }
}

fn resolve_tenants_env(tenants: &mut [TenantConfig]) {
    for tenant in tenants {
        tenant.tenant_id = resolve_env_var(&tenant.tenant_id);
        tenant.support_contact = resolve_env_var(&tenant.support_contact);
        if let Some(name) = &mut tenant.display_name {
            *name = resolve_env_var(name);
        }
    }
}
