use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use handoff_schema::{EscalationReason, EscalationRule};

use crate::classifier::ClassifierRules;
use crate::config::{EscalationConfig, HandoffConfig, TenantConfig};

/// Everything the router needs to know about one tenant, resolved against
/// the system defaults.
#[derive(Debug, Clone)]
pub struct TenantProfile {
    pub tenant_id: String,
    pub display_name: String,
    pub support_contact: String,
    pub confidence_threshold: f64,
    pub escalation_rules: Vec<EscalationRule>,
    pub classifier: ClassifierRules,
    pub departments: BTreeMap<EscalationReason, String>,
    pub default_department: String,
}

impl TenantProfile {
    pub fn build(tenant: &TenantConfig, system: &EscalationConfig) -> Result<Self> {
        let keywords = tenant.keywords.as_ref().unwrap_or(&system.keywords);
        let classifier = ClassifierRules::compile(keywords, &system.emotional_patterns)
            .with_context(|| format!("tenant {}", tenant.tenant_id))?;

        Ok(Self {
            tenant_id: tenant.tenant_id.clone(),
            display_name: tenant
                .display_name
                .clone()
                .unwrap_or_else(|| tenant.tenant_id.clone()),
            support_contact: tenant.support_contact.clone(),
            confidence_threshold: tenant
                .confidence_threshold
                .unwrap_or(system.confidence_threshold),
            escalation_rules: tenant.escalation_rules.clone(),
            classifier,
            departments: system.departments.clone(),
            default_department: system.default_department.clone(),
        })
    }
}

/// Read-only tenant lookup, built once at startup.
#[derive(Debug, Default)]
pub struct TenantRegistry {
    tenants: HashMap<String, Arc<TenantProfile>>,
}

impl TenantRegistry {
    pub fn from_config(config: &HandoffConfig) -> Result<Self> {
        let mut registry = Self::default();
        for tenant in &config.tenants {
            registry.insert(TenantProfile::build(tenant, &config.main.escalation)?);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, profile: TenantProfile) {
        self.tenants
            .insert(profile.tenant_id.clone(), Arc::new(profile));
    }

    pub fn lookup(&self, tenant: &str) -> Option<Arc<TenantProfile>> {
        self.tenants.get(tenant).cloned()
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    /// Sorted tenant ids.
    pub fn tenant_ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.tenants.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeywordRule;

    #[test]
    fn tenant_inherits_system_defaults() {
        let mut config = HandoffConfig::default();
        config
            .tenants
            .push(TenantConfig::new("heine", "service@heine.de"));

        let registry = TenantRegistry::from_config(&config).unwrap();
        let heine = registry.lookup("heine").unwrap();
        assert_eq!(heine.confidence_threshold, 0.7);
        assert_eq!(heine.display_name, "heine");
        assert_eq!(heine.default_department, "kundenservice");
        assert!(registry.lookup("unknown").is_none());
    }

    #[test]
    fn tenant_keyword_table_replaces_default() {
        let mut config = HandoffConfig::default();
        let mut tenant = TenantConfig::new("subbrand1", "hilfe@subbrand1.de");
        tenant.keywords = Some(vec![KeywordRule::new(
            "storno",
            EscalationReason::ComplexRequest,
        )]);
        tenant.confidence_threshold = Some(0.5);
        config.tenants.push(tenant);

        let registry = TenantRegistry::from_config(&config).unwrap();
        let profile = registry.lookup("subbrand1").unwrap();
        assert_eq!(profile.confidence_threshold, 0.5);
        assert_eq!(
            crate::classifier::classify("Storno bitte", 0.9, &profile.classifier, 0.5),
            Some(EscalationReason::ComplexRequest)
        );
        assert_eq!(
            crate::classifier::classify("Beschwerde", 0.9, &profile.classifier, 0.5),
            None
        );
    }
}
