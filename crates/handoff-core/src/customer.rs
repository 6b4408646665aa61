use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use handoff_schema::CustomerProfile;

use crate::config::HandoffConfig;

/// Source of customer data (VIP flag, display name) keyed by tenant and customer id.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn lookup(&self, tenant: &str, customer_id: &str) -> Result<Option<CustomerProfile>>;
}

/// Customer profiles listed in the tenant configuration files.
#[derive(Debug, Default)]
pub struct StaticCustomerDirectory {
    customers: HashMap<(String, String), CustomerProfile>,
}

impl StaticCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &HandoffConfig) -> Self {
        let mut directory = Self::new();
        for tenant in &config.tenants {
            for customer in &tenant.customers {
                directory.insert(&tenant.tenant_id, customer.clone());
            }
        }
        directory
    }

    pub fn insert(&mut self, tenant: &str, profile: CustomerProfile) {
        self.customers
            .insert((tenant.to_string(), profile.customer_id.clone()), profile);
    }

    pub fn len(&self) -> usize {
        self.customers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
    }
}

#[async_trait]
impl CustomerDirectory for StaticCustomerDirectory {
    async fn lookup(&self, tenant: &str, customer_id: &str) -> Result<Option<CustomerProfile>> {
        Ok(self
            .customers
            .get(&(tenant.to_string(), customer_id.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TenantConfig;

    #[tokio::test]
    async fn lookup_is_tenant_scoped() {
        let mut config = HandoffConfig::default();
        let mut heine = TenantConfig::new("heine", "service@heine.de");
        heine.customers.push(CustomerProfile {
            customer_id: "cust001".into(),
            is_vip: true,
            display_name: Some("Erika Mustermann".into()),
        });
        config.tenants.push(heine);
        config
            .tenants
            .push(TenantConfig::new("subbrand1", "hilfe@subbrand1.de"));

        let directory = StaticCustomerDirectory::from_config(&config);
        assert_eq!(directory.len(), 1);

        let found = directory.lookup("heine", "cust001").await.unwrap().unwrap();
        assert!(found.is_vip);
        assert!(directory
            .lookup("subbrand1", "cust001")
            .await
            .unwrap()
            .is_none());
    }
}
