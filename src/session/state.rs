//! Opaque gateway authentication state
//!
//! The gateway owns the format of this material; it is stored and handed
//! back byte for byte. Over JSON transports every blob travels as base64.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Full auth state handed to the gateway on connect
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    /// Primary credential blob
    #[serde(with = "b64")]
    pub creds: Vec<u8>,
    /// Named key entries
    #[serde(default, with = "b64_map")]
    pub keys: BTreeMap<String, Vec<u8>>,
}

impl AuthState {
    /// Whether the state carries a credential
    pub fn has_credentials(&self) -> bool {
        !self.creds.is_empty()
    }
}

/// Incremental rotation reported by the gateway
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUpdate {
    /// Replacement credential blob, if it changed
    #[serde(default, with = "b64_opt")]
    pub creds: Option<Vec<u8>>,
    /// Key entries to write (`Some`) or delete (`None`)
    #[serde(default, with = "b64_opt_map")]
    pub keys: BTreeMap<String, Option<Vec<u8>>>,
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

mod b64_opt {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_some(&STANDARD.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

mod b64_map {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<String, Vec<u8>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        map.iter()
            .map(|(k, v)| (k.as_str(), STANDARD.encode(v)))
            .collect::<BTreeMap<_, _>>()
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        BTreeMap::<String, String>::deserialize(d)?
            .into_iter()
            .map(|(k, v)| {
                STANDARD
                    .decode(v)
                    .map(|bytes| (k, bytes))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

mod b64_opt_map {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<String, Option<Vec<u8>>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        map.iter()
            .map(|(k, v)| (k.as_str(), v.as_ref().map(|b| STANDARD.encode(b))))
            .collect::<BTreeMap<_, _>>()
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<String, Option<Vec<u8>>>, D::Error> {
        BTreeMap::<String, Option<String>>::deserialize(d)?
            .into_iter()
            .map(|(k, v)| {
                v.map(|text| STANDARD.decode(text))
                    .transpose()
                    .map(|bytes| (k, bytes))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_update_json_shape() {
        let json = serde_json::json!({
            "creds": "aGVsbG8=",
            "keys": { "pre-key:1": "b25l", "pre-key:2": null }
        });

        let update: AuthUpdate = serde_json::from_value(json).unwrap();
        assert_eq!(update.creds.as_deref(), Some(&b"hello"[..]));
        assert_eq!(update.keys.get("pre-key:1"), Some(&Some(b"one".to_vec())));
        assert_eq!(update.keys.get("pre-key:2"), Some(&None));
    }

    #[test]
    fn test_auth_update_without_creds() {
        let update: AuthUpdate = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(update.creds.is_none());
        assert!(update.keys.is_empty());
    }

    #[test]
    fn test_auth_state_serializes_as_base64() {
        let state = AuthState {
            creds: b"hello".to_vec(),
            keys: BTreeMap::new(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["creds"], "aGVsbG8=");
        assert!(state.has_credentials());
    }
}
