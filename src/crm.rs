//! CRM collaborator seam.
//!
//! Contacts live in the CRM. The dialer only reads them: by id when an
//! operator attaches specific contacts, and by filter for bulk attach.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::contact::ContactRef;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmContact {
    pub id: ContactRef,
    pub phone_number: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    /// CRM lifecycle status, e.g. "new" or "contacted".
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Bulk-attach query.
///
/// Empty `statuses` or `tags` match everything; otherwise a contact must
/// have one of the statuses and at least one of the tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactFilter {
    pub statuses: Vec<String>,
    pub tags: Vec<String>,
    pub exclude_ids: HashSet<ContactRef>,
    /// When false, matching contacts already in the campaign are re-armed
    /// and counted as added.
    pub exclude_existing: bool,
}

impl Default for ContactFilter {
    fn default() -> Self {
        Self {
            statuses: Vec::new(),
            tags: Vec::new(),
            exclude_ids: HashSet::new(),
            exclude_existing: true,
        }
    }
}

impl ContactFilter {
    pub fn with_statuses(statuses: &[&str]) -> Self {
        Self {
            statuses: statuses.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn matches(&self, contact: &CrmContact) -> bool {
        if self.exclude_ids.contains(&contact.id) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.iter().any(|s| *s == contact.status) {
            return false;
        }
        if !self.tags.is_empty() && !contact.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }
        true
    }
}

#[async_trait]
pub trait Crm: Send + Sync {
    /// Fetch contacts by id. Unknown ids are omitted from the result.
    async fn get_contacts(&self, ids: &[ContactRef]) -> Result<Vec<CrmContact>>;

    /// Contacts matching `filter`, ordered by id.
    async fn query(&self, filter: &ContactFilter) -> Result<Vec<CrmContact>>;
}

/// CRM backed by a fixed contact list.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCrm {
    contacts: Vec<CrmContact>,
}

impl InMemoryCrm {
    pub fn new(mut contacts: Vec<CrmContact>) -> Self {
        contacts.sort_by_key(|c| c.id);
        Self { contacts }
    }

    /// Load a JSON array of contacts. Ids must be unique.
    pub fn from_json(raw: &str) -> Result<Self> {
        let contacts: Vec<CrmContact> = serde_json::from_str(raw)?;
        let mut seen = HashSet::new();
        for contact in &contacts {
            if !seen.insert(contact.id) {
                return Err(Error::Crm(format!("duplicate contact id {}", contact.id)));
            }
        }
        Ok(Self::new(contacts))
    }

    pub fn ids(&self) -> Vec<ContactRef> {
        self.contacts.iter().map(|c| c.id).collect()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}

#[async_trait]
impl Crm for InMemoryCrm {
    async fn get_contacts(&self, ids: &[ContactRef]) -> Result<Vec<CrmContact>> {
        let wanted: HashSet<&ContactRef> = ids.iter().collect();
        Ok(self
            .contacts
            .iter()
            .filter(|c| wanted.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn query(&self, filter: &ContactFilter) -> Result<Vec<CrmContact>> {
        Ok(self
            .contacts
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }
}
