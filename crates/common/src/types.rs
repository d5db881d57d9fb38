use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
///
/// Each identifier gets its own type so cart, item, address and user ids
/// cannot be mixed up at call sites.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Declares a string-backed identifier newtype.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is empty or only whitespace.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

uuid_id!(
    /// Identifier of an authenticated user.
    UserId
);

uuid_id!(
    /// Identifier of a cart row.
    CartId
);

uuid_id!(
    /// Identifier of a cart line item.
    CartItemId
);

uuid_id!(
    /// Identifier of a saved user address.
    AddressId
);

string_id!(
    /// Anonymous session identifier issued to guests.
    SessionId
);

string_id!(
    /// Product identifier from the external catalog.
    ProductId
);

string_id!(
    /// Product variant identifier (size, color, ...).
    VariantId
);

/// The owner of a cart.
///
/// A cart belongs either to an authenticated user or to an anonymous
/// session, never both. The guest-to-user merge is the only way line items
/// change owner kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartOwner {
    /// Cart of an authenticated user.
    User(UserId),
    /// Cart of an anonymous session.
    Guest(SessionId),
}

impl CartOwner {
    /// Returns the user id for a user-owned cart.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            CartOwner::User(id) => Some(*id),
            CartOwner::Guest(_) => None,
        }
    }

    /// Returns the session id for a guest cart.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            CartOwner::User(_) => None,
            CartOwner::Guest(id) => Some(id),
        }
    }

    /// Returns true if the cart belongs to an anonymous session.
    pub fn is_guest(&self) -> bool {
        matches!(self, CartOwner::Guest(_))
    }
}

impl std::fmt::Display for CartOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartOwner::User(id) => write!(f, "user:{id}"),
            CartOwner::Guest(id) => write!(f, "guest:{id}"),
        }
    }
}

impl From<UserId> for CartOwner {
    fn from(id: UserId) -> Self {
        CartOwner::User(id)
    }
}

impl From<SessionId> for CartOwner {
    fn from(id: SessionId) -> Self {
        CartOwner::Guest(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_new_creates_unique_ids() {
        let id1 = UserId::new();
        let id2 = UserId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn cart_item_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = CartItemId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
    }

    #[test]
    fn product_id_string_conversion() {
        let id = ProductId::new("SKU-001");
        assert_eq!(id.as_str(), "SKU-001");

        let id2: ProductId = "SKU-002".into();
        assert_eq!(id2.as_str(), "SKU-002");
    }

    #[test]
    fn blank_string_ids() {
        assert!(SessionId::new("   ").is_blank());
        assert!(ProductId::new("").is_blank());
        assert!(!VariantId::new("XL").is_blank());
    }

    #[test]
    fn cart_owner_accessors() {
        let user = UserId::new();
        let owner = CartOwner::from(user);
        assert_eq!(owner.user_id(), Some(user));
        assert!(owner.session_id().is_none());
        assert!(!owner.is_guest());

        let guest = CartOwner::from(SessionId::new("sess-1"));
        assert!(guest.is_guest());
        assert_eq!(guest.session_id().map(SessionId::as_str), Some("sess-1"));
        assert_eq!(guest.to_string(), "guest:sess-1");
    }

    #[test]
    fn cart_owner_serializes_as_tagged_variant() {
        let owner = CartOwner::Guest(SessionId::new("abc"));
        let json = serde_json::to_value(&owner).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "guest", "id": "abc"}));
    }
}
