//! # Entity Metadata
//!
//! Accessors for the hidden bookkeeping fields of an entity:
//!
//! - `_kmd` - `{ local, authtoken, ect, lmt }`
//! - `_acl` - `{ creator, gr, gw, r, w }`
//!
//! Setters mutate the entity's `_kmd` object in place, creating it when it is
//! missing. Unknown keys inside `_kmd` and `_acl` are preserved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::{Entity, ACL_FIELD, KMD_FIELD};
use crate::error::CoreResult;

const LOCAL_KEY: &str = "local";
const AUTHTOKEN_KEY: &str = "authtoken";
const ECT_KEY: &str = "ect";
const LMT_KEY: &str = "lmt";

// =============================================================================
// Typed Views
// =============================================================================

/// Typed snapshot of `_kmd`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub local: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authtoken: Option<String>,

    /// Entity creation time (server clock).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ect: Option<DateTime<Utc>>,

    /// Last modified time (server clock).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lmt: Option<DateTime<Utc>>,
}

/// Typed snapshot of `_acl`.
///
/// The sync engine never interprets ACLs; this view exists for applications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,

    /// Globally readable.
    #[serde(default, rename = "gr", skip_serializing_if = "Option::is_none")]
    pub globally_readable: Option<bool>,

    /// Globally writable.
    #[serde(default, rename = "gw", skip_serializing_if = "Option::is_none")]
    pub globally_writable: Option<bool>,

    #[serde(default, rename = "r", skip_serializing_if = "Vec::is_empty")]
    pub readers: Vec<String>,

    #[serde(default, rename = "w", skip_serializing_if = "Vec::is_empty")]
    pub writers: Vec<String>,
}

impl Acl {
    pub fn add_reader(&mut self, user_id: impl Into<String>) -> &mut Self {
        let user_id = user_id.into();
        if !self.readers.contains(&user_id) {
            self.readers.push(user_id);
        }
        self
    }

    pub fn remove_reader(&mut self, user_id: &str) -> &mut Self {
        self.readers.retain(|r| r != user_id);
        self
    }

    pub fn add_writer(&mut self, user_id: impl Into<String>) -> &mut Self {
        let user_id = user_id.into();
        if !self.writers.contains(&user_id) {
            self.writers.push(user_id);
        }
        self
    }

    pub fn remove_writer(&mut self, user_id: &str) -> &mut Self {
        self.writers.retain(|w| w != user_id);
        self
    }

    /// Returns true if the user may read, per the ACL alone.
    pub fn can_read(&self, user_id: &str) -> bool {
        self.globally_readable.unwrap_or(true)
            || self.creator.as_deref() == Some(user_id)
            || self.readers.iter().any(|r| r == user_id)
            || self.writers.iter().any(|w| w == user_id)
    }

    /// Returns true if the user may write, per the ACL alone.
    pub fn can_write(&self, user_id: &str) -> bool {
        self.globally_writable.unwrap_or(false)
            || self.creator.as_deref() == Some(user_id)
            || self.writers.iter().any(|w| w == user_id)
    }
}

// =============================================================================
// Entity Accessors
// =============================================================================

impl Entity {
    fn kmd(&self) -> Option<&Map<String, Value>> {
        self.get(KMD_FIELD).and_then(Value::as_object)
    }

    /// Applies `f` to `_kmd`, replacing it with an empty object if absent or malformed.
    fn update_kmd(&mut self, f: impl FnOnce(&mut Map<String, Value>)) {
        let map = self.as_map_mut();
        match map.get_mut(KMD_FIELD) {
            Some(Value::Object(kmd)) => f(kmd),
            _ => {
                let mut kmd = Map::new();
                f(&mut kmd);
                map.insert(KMD_FIELD.to_string(), Value::Object(kmd));
            }
        }
    }

    /// True iff `_kmd.local === true`.
    pub fn is_local(&self) -> bool {
        self.kmd()
            .and_then(|kmd| kmd.get(LOCAL_KEY))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Marks the entity as created offline.
    pub fn mark_local(&mut self) {
        self.update_kmd(|kmd| {
            kmd.insert(LOCAL_KEY.to_string(), Value::Bool(true));
        });
    }

    /// Removes the `_kmd.local` flag.
    pub fn clear_local(&mut self) {
        if let Some(Value::Object(kmd)) = self.as_map_mut().get_mut(KMD_FIELD) {
            kmd.remove(LOCAL_KEY);
        }
    }

    pub fn authtoken(&self) -> Option<&str> {
        self.kmd()
            .and_then(|kmd| kmd.get(AUTHTOKEN_KEY))
            .and_then(Value::as_str)
    }

    /// Sets or clears `_kmd.authtoken`.
    pub fn set_authtoken(&mut self, token: Option<String>) {
        self.update_kmd(|kmd| match token {
            Some(token) => {
                kmd.insert(AUTHTOKEN_KEY.to_string(), Value::String(token));
            }
            None => {
                kmd.remove(AUTHTOKEN_KEY);
            }
        });
    }

    /// True if the entity carries a credential (user documents do).
    pub fn has_authtoken(&self) -> bool {
        self.authtoken().is_some_and(|t| !t.is_empty())
    }

    pub fn ect(&self) -> Option<DateTime<Utc>> {
        self.kmd_timestamp(ECT_KEY)
    }

    pub fn lmt(&self) -> Option<DateTime<Utc>> {
        self.kmd_timestamp(LMT_KEY)
    }

    /// Raw `_kmd.lmt` value, compared verbatim by delta fetch.
    pub fn lmt_raw(&self) -> Option<&Value> {
        self.kmd().and_then(|kmd| kmd.get(LMT_KEY))
    }

    fn kmd_timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.kmd()
            .and_then(|kmd| kmd.get(key))
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Typed view of `_kmd`. Unparseable timestamps read as `None`.
    pub fn metadata(&self) -> Metadata {
        Metadata {
            local: self.is_local(),
            authtoken: self.authtoken().map(str::to_string),
            ect: self.ect(),
            lmt: self.lmt(),
        }
    }

    /// Typed view of `_acl`; an absent ACL reads as the default.
    pub fn acl(&self) -> CoreResult<Acl> {
        match self.get(ACL_FIELD) {
            Some(value) if !value.is_null() => Ok(serde_json::from_value(value.clone())?),
            _ => Ok(Acl::default()),
        }
    }

    pub fn set_acl(&mut self, acl: &Acl) -> CoreResult<()> {
        let value = serde_json::to_value(acl)?;
        self.insert(ACL_FIELD, value);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
