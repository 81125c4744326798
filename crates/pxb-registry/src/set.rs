use dashmap::DashMap;
use pxb_common::EntityRecord;
use std::sync::Arc;

use crate::registry::EntityRegistry;

/// Registries keyed by user, one per identity a test acts as
#[derive(Debug)]
pub struct RegistrySet {
    admin_user: String,
    users: DashMap<String, Arc<EntityRegistry>>,
}

impl RegistrySet {
    pub fn new(admin_user: impl Into<String>) -> Self {
        Self {
            admin_user: admin_user.into(),
            users: DashMap::new(),
        }
    }

    pub fn admin_user(&self) -> &str {
        &self.admin_user
    }

    pub fn admin(&self) -> Arc<EntityRegistry> {
        let admin = self.admin_user.clone();
        self.for_user(&admin)
    }

    /// Registry for `user`, created on first use
    pub fn for_user(&self, user: &str) -> Arc<EntityRegistry> {
        self.users
            .entry(user.to_string())
            .or_insert_with(|| Arc::new(EntityRegistry::for_owner(user)))
            .clone()
    }

    pub fn users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.users.iter().map(|e| e.key().clone()).collect();
        users.sort();
        users
    }

    /// Every user's registry, non-admin users first
    ///
    /// Entities a non-admin user created may depend on admin entities, so
    /// teardown visits those users before the admin.
    pub fn teardown_order(&self) -> Vec<Arc<EntityRegistry>> {
        let mut registries: Vec<Arc<EntityRegistry>> = self
            .users()
            .into_iter()
            .filter(|user| *user != self.admin_user)
            .filter_map(|user| self.users.get(&user).map(|r| r.clone()))
            .collect();
        if let Some(admin) = self.users.get(&self.admin_user) {
            registries.push(admin.clone());
        }
        registries
    }

    /// Snapshot of every record across users
    pub fn items(&self) -> Vec<EntityRecord> {
        self.teardown_order()
            .iter()
            .flat_map(|registry| registry.items())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.users.iter().all(|entry| entry.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pxb_common::{EntityId, EntityKind};

    #[test]
    fn test_for_user_is_stable() {
        let set = RegistrySet::new("admin");
        let first = set.for_user("tp-user-1");
        first.put(EntityKind::Backup, "bkp", EntityId::new("1"));

        let second = set.for_user("tp-user-1");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.get(EntityKind::Backup, "bkp"), Some(EntityId::new("1")));
    }

    #[test]
    fn test_users_are_isolated() {
        let set = RegistrySet::new("admin");
        set.admin().put(EntityKind::Backup, "bkp", EntityId::new("admin-id"));
        set.for_user("tp-user-1")
            .put(EntityKind::Backup, "bkp", EntityId::new("user-id"));

        assert_eq!(set.admin().get(EntityKind::Backup, "bkp"), Some(EntityId::new("admin-id")));
        assert_eq!(
            set.for_user("tp-user-1").get(EntityKind::Backup, "bkp"),
            Some(EntityId::new("user-id"))
        );
        assert_eq!(set.items().len(), 2);
    }

    #[test]
    fn test_teardown_order_puts_admin_last() {
        let set = RegistrySet::new("admin");
        set.admin();
        set.for_user("zeta");
        set.for_user("alpha");

        let owners: Vec<Option<String>> = set
            .teardown_order()
            .iter()
            .map(|r| r.owner().map(str::to_string))
            .collect();

        assert_eq!(
            owners,
            vec![
                Some("alpha".to_string()),
                Some("zeta".to_string()),
                Some("admin".to_string())
            ]
        );
    }

    #[test]
    fn test_is_empty() {
        let set = RegistrySet::new("admin");
        assert!(set.is_empty());

        set.for_user("tp-user-1");
        assert!(set.is_empty());

        set.admin().put(EntityKind::Rule, "pre-exec", EntityId::new("r1"));
        assert!(!set.is_empty());
    }
}
