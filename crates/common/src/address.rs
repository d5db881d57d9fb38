use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AddressId, UserId};

/// Editable fields of a saved address.
///
/// Region names are free text; the `*_id` fields reference an external
/// region catalog and are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFields {
    #[serde(default)]
    pub label: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub subdistrict: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub province_id: Option<i64>,
    #[serde(default)]
    pub city_id: Option<i64>,
    #[serde(default)]
    pub subdistrict_id: Option<i64>,
}

impl AddressFields {
    /// Returns the name of the first required field that is blank, if any.
    pub fn first_missing_field(&self) -> Option<&'static str> {
        [
            ("name", &self.name),
            ("phone", &self.phone),
            ("address", &self.address),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }
}

/// A saved shipping address owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAddress {
    pub id: AddressId,
    pub user_id: UserId,
    #[serde(flatten)]
    pub fields: AddressFields,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAddress {
    /// Returns the address as a single line.
    ///
    /// Street, subdistrict, city, province and postal code, skipping blank
    /// parts.
    pub fn full_address(&self) -> String {
        let f = &self.fields;
        [
            &f.address,
            &f.subdistrict,
            &f.city,
            &f.province,
            &f.postal_code,
        ]
        .into_iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}
