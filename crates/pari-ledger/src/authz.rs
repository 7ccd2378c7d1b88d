//! Admin capability check.
//!
//! The allow-list is owned by deployment configuration; this crate only
//! consults it through [`Authorizer`].

use std::collections::BTreeSet;

use pari_schemas::Principal;

pub trait Authorizer: Send + Sync {
    fn is_authorized(&self, principal: &Principal) -> bool;
}

/// Case-insensitive email allow-list.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    emails: BTreeSet<String>,
}

impl AllowList {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let emails = emails
            .into_iter()
            .map(|e| e.as_ref().trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { emails }
    }

    /// Parse a comma-separated list (`a@x.com, b@y.com`).
    pub fn from_csv(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

impl Authorizer for AllowList {
    fn is_authorized(&self, principal: &Principal) -> bool {
        self.emails.contains(&principal.email.to_ascii_lowercase())
    }
}
