//! User profile model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timestamp::store_time;
use crate::store::{Collection, Document, Record};
use crate::{Error, Result};

/// A marketplace member, keyed by their session identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable id, equal to the session identity
    pub uid: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Seller flag
    #[serde(default)]
    pub status: bool,
    #[serde(with = "store_time")]
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build the profile written once at registration.
    pub fn register(
        uid: impl Into<String>,
        registration: Registration,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let registration = registration.normalized()?;
        Ok(Self {
            uid: uid.into(),
            name: registration.name,
            email: registration.email,
            phone_number: Some(registration.phone_number),
            location: None,
            status: registration.seller,
            created_at: now,
        })
    }

    /// Whether this user is flagged as a seller.
    pub const fn is_seller(&self) -> bool {
        self.status
    }
}

impl Record for User {
    const COLLECTION: Collection = Collection::Users;

    fn assign_id(&mut self, id: &str) {
        if self.uid.is_empty() {
            self.uid = id.to_string();
        }
    }
}

/// Fields captured by the sign-up form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub seller: bool,
}

impl Registration {
    fn normalized(self) -> Result<Self> {
        let name = self.name.trim().to_string();
        let email = self.email.trim().to_string();
        let phone_number = self.phone_number.trim().to_string();
        if name.is_empty() || email.is_empty() || phone_number.is_empty() {
            return Err(Error::InvalidInput("All fields are required.".to_string()));
        }
        Ok(Self {
            name,
            email,
            phone_number,
            seller: self.seller,
        })
    }
}

/// Partial profile edit. `Some` fields overwrite, `None` fields are untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<bool>,
}

impl UserPatch {
    #[must_use]
    pub fn location(value: impl Into<String>) -> Self {
        Self {
            location: Some(value.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn name(value: impl Into<String>) -> Self {
        Self {
            name: Some(value.into()),
            ..Self::default()
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone_number.is_none()
            && self.location.is_none()
            && self.status.is_none()
    }

    /// Wire names of the fields this patch overwrites.
    pub fn touched_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push("name".to_string());
        }
        if self.phone_number.is_some() {
            fields.push("phoneNumber".to_string());
        }
        if self.location.is_some() {
            fields.push("location".to_string());
        }
        if self.status.is_some() {
            fields.push("status".to_string());
        }
        fields
    }

    /// Reject blank name or phone number before anything is applied.
    pub fn validate(&self) -> Result<()> {
        let blank = |value: &Option<String>| value.as_ref().is_some_and(|v| v.trim().is_empty());
        if blank(&self.name) || blank(&self.phone_number) {
            return Err(Error::InvalidInput("Some fields are blank.".to_string()));
        }
        Ok(())
    }

    pub fn apply_to(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name.clone_from(name);
        }
        if let Some(phone_number) = &self.phone_number {
            user.phone_number = Some(phone_number.clone());
        }
        if let Some(location) = &self.location {
            user.location = Some(location.clone());
        }
        if let Some(status) = self.status {
            user.status = status;
        }
    }

    /// Whether `user` already carries every value this patch sets.
    pub fn is_reflected_in(&self, user: &User) -> bool {
        self.name.as_ref().map_or(true, |name| &user.name == name)
            && self
                .phone_number
                .as_ref()
                .map_or(true, |phone| user.phone_number.as_ref() == Some(phone))
            && self
                .location
                .as_ref()
                .map_or(true, |location| user.location.as_ref() == Some(location))
            && self.status.map_or(true, |status| user.status == status)
    }

    /// Whether `left` and `right` agree on every field this patch sets.
    pub fn same_touched_values(&self, left: &User, right: &User) -> bool {
        (self.name.is_none() || left.name == right.name)
            && (self.phone_number.is_none() || left.phone_number == right.phone_number)
            && (self.location.is_none() || left.location == right.location)
            && (self.status.is_none() || left.status == right.status)
    }

    pub fn to_document(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(fields) => Ok(fields),
            _ => Err(Error::Serialization("profile patch is not an object".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_user() -> User {
        User {
            uid: "u1".to_string(),
            name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            phone_number: Some("98200".to_string()),
            location: None,
            status: true,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
        }
    }

    #[test]
    fn user_uses_camel_case_wire_fields() {
        let encoded = serde_json::to_value(sample_user()).unwrap();
        assert_eq!(
            encoded,
            json!({
                "uid": "u1",
                "name": "Asha",
                "email": "asha@example.com",
                "phoneNumber": "98200",
                "status": true,
                "createdAt": { "seconds": 1_700_000_000, "nanoseconds": 0 }
            })
        );
    }

    #[test]
    fn register_requires_all_fields() {
        let registration = Registration {
            name: "Ravi".to_string(),
            email: " ".to_string(),
            phone_number: "1".to_string(),
            seller: false,
        };
        assert!(User::register("u2", registration, Utc::now()).is_err());
    }

    #[test]
    fn register_trims_inputs() {
        let registration = Registration {
            name: " Ravi ".to_string(),
            email: "ravi@example.com".to_string(),
            phone_number: " 99 ".to_string(),
            seller: true,
        };
        let user = User::register("u2", registration, Utc::now()).unwrap();
        assert_eq!(user.name, "Ravi");
        assert_eq!(user.phone_number.as_deref(), Some("99"));
        assert!(user.is_seller());
    }

    #[test]
    fn patch_serializes_only_touched_fields() {
        let patch = UserPatch::location("Nashik");
        assert_eq!(
            serde_json::Value::Object(patch.to_document().unwrap()),
            json!({ "location": "Nashik" })
        );
        assert_eq!(patch.touched_fields(), vec!["location".to_string()]);
    }

    #[test]
    fn patch_apply_and_reflection() {
        let mut user = sample_user();
        let patch = UserPatch {
            location: Some("Nashik".to_string()),
            status: Some(false),
            ..UserPatch::default()
        };
        assert!(!patch.is_reflected_in(&user));

        patch.apply_to(&mut user);
        assert_eq!(user.location.as_deref(), Some("Nashik"));
        assert!(!user.status);
        assert!(patch.is_reflected_in(&user));
    }

    #[test]
    fn patch_rejects_blank_name() {
        assert!(UserPatch::name("  ").validate().is_err());
        assert!(UserPatch::location("").validate().is_ok());
    }
}
