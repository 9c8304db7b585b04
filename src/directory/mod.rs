use anyhow::Result;
use std::sync::Arc;

use crate::store::Store;
use crate::utils::normalize_phone;

pub use crate::store::User;

/// Outcome of a ban request, so callers can word the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanOutcome {
    Banned,
    AlreadyBanned,
    NotFound,
    /// Admins cannot be banned, full stop.
    IsAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnbanOutcome {
    Unbanned,
    NotBanned,
    NotFound,
}

/// User lookup and moderation policy over the store. Admin status is granted
/// here, once, when a configured admin number first shows up; the rest of the
/// system reads the stored flag instead of re-deriving it.
pub struct UserDirectory {
    store: Arc<Store>,
    admin_digits: Vec<String>,
}

impl UserDirectory {
    pub fn new(store: Arc<Store>, admin_numbers: &[String]) -> Self {
        let admin_digits = admin_numbers
            .iter()
            .map(|n| normalize_phone(n))
            .filter(|n| !n.is_empty())
            .collect();
        Self {
            store,
            admin_digits,
        }
    }

    /// Touch the user row for an inbound event: creates it on first contact,
    /// advances last-seen, and bootstraps the admin flag for configured numbers.
    pub fn get_or_create(&self, phone: &str, name: Option<&str>) -> Result<User> {
        let digits = normalize_phone(phone);
        let bootstrap_admin = self.admin_digits.contains(&digits);
        self.store.get_or_create_user(&digits, name, bootstrap_admin)
    }

    pub fn get(&self, phone: &str) -> Result<Option<User>> {
        self.store.get_user(&normalize_phone(phone))
    }

    pub fn ban(&self, phone: &str) -> Result<BanOutcome> {
        let digits = normalize_phone(phone);
        match self.store.get_user(&digits)? {
            None => Ok(BanOutcome::NotFound),
            Some(user) if user.is_admin => Ok(BanOutcome::IsAdmin),
            Some(user) if user.is_banned => Ok(BanOutcome::AlreadyBanned),
            Some(_) => {
                self.store.set_banned(&digits, true)?;
                Ok(BanOutcome::Banned)
            }
        }
    }

    pub fn unban(&self, phone: &str) -> Result<UnbanOutcome> {
        let digits = normalize_phone(phone);
        match self.store.get_user(&digits)? {
            None => Ok(UnbanOutcome::NotFound),
            Some(user) if !user.is_banned => Ok(UnbanOutcome::NotBanned),
            Some(_) => {
                self.store.set_banned(&digits, false)?;
                Ok(UnbanOutcome::Unbanned)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(admins: &[&str]) -> (tempfile::TempDir, UserDirectory) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::new(dir.path().join("test.db")).unwrap());
        let admins: Vec<String> = admins.iter().map(|s| s.to_string()).collect();
        (dir, UserDirectory::new(store, &admins))
    }

    #[test]
    fn configured_admin_is_bootstrapped_on_first_contact() {
        let (_dir, directory) = directory(&["+1 (555) 010-9999"]);
        let user = directory.get_or_create("15550109999", Some("Root")).unwrap();
        assert!(user.is_admin);

        let other = directory.get_or_create("15550100000", None).unwrap();
        assert!(!other.is_admin);
    }

    #[test]
    fn ban_refuses_admins() {
        let (_dir, directory) = directory(&["1999"]);
        directory.get_or_create("1999", None).unwrap();
        directory.get_or_create("1555", None).unwrap();

        assert_eq!(directory.ban("1999").unwrap(), BanOutcome::IsAdmin);
        assert_eq!(directory.ban("1555").unwrap(), BanOutcome::Banned);
        assert_eq!(directory.ban("1555").unwrap(), BanOutcome::AlreadyBanned);
        assert_eq!(directory.ban("1777").unwrap(), BanOutcome::NotFound);

        assert!(directory.get("1555").unwrap().unwrap().is_banned);
        assert!(!directory.get("1999").unwrap().unwrap().is_banned);
    }

    #[test]
    fn unban_restores_access() {
        let (_dir, directory) = directory(&[]);
        directory.get_or_create("1555", None).unwrap();
        directory.ban("1555").unwrap();
        assert_eq!(directory.unban("1555").unwrap(), UnbanOutcome::Unbanned);
        assert!(!directory.get("1555").unwrap().unwrap().is_banned);
        assert_eq!(directory.unban("1555").unwrap(), UnbanOutcome::NotBanned);
        assert_eq!(directory.unban("404").unwrap(), UnbanOutcome::NotFound);
    }
}
