//! Serde helpers for the decimal-string wire representation of amounts.
//!
//! The hub and the chain-service exchange all quantities as base-10 strings,
//! while the core works in `U256`. These modules bridge the two at the
//! (de)serialization boundary.

/// `U256` as a base-10 string, e.g. `"1000000000000000000"`.
pub mod amount_str {
    use alloy_primitives::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let repr = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        repr.parse().map_err(D::Error::custom)
    }
}

/// Optional `U256` as a base-10 string.
pub mod optional_amount_str {
    use alloy_primitives::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&value.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<U256>, D::Error> {
        let repr = <Option<std::borrow::Cow<'de, str>>>::deserialize(deserializer)?;
        repr.map(|repr| repr.parse().map_err(D::Error::custom)).transpose()
    }
}

/// `HashMap<u64, U256>` keyed by stringified chain ids with base-10 string
/// values, the shape of the hub's `minAmounts` responses.
pub mod amount_map {
    use alloy_primitives::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::collections::HashMap;

    pub fn serialize<S: Serializer>(
        value: &HashMap<u64, U256>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let repr: HashMap<String, String> =
            value.iter().map(|(chain, amount)| (chain.to_string(), amount.to_string())).collect();
        serde::Serialize::serialize(&repr, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<u64, U256>, D::Error> {
        let repr = <HashMap<String, String>>::deserialize(deserializer)?;
        repr.into_iter()
            .map(|(chain, amount)| {
                let chain = chain.parse().map_err(D::Error::custom)?;
                let amount = amount.parse().map_err(D::Error::custom)?;
                Ok((chain, amount))
            })
            .collect()
    }
}

/// `HashMap<u64, V>` with stringified keys, for formats whose map keys are
/// always strings (TOML tables, JSON objects).
pub mod u64_key_map {
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;

    pub fn serialize<S: Serializer, V: Serialize>(
        value: &HashMap<u64, V>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let repr: HashMap<String, &V> =
            value.iter().map(|(key, value)| (key.to_string(), value)).collect();
        repr.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>, V: Deserialize<'de>>(
        deserializer: D,
    ) -> Result<HashMap<u64, V>, D::Error> {
        let repr = <HashMap<String, V>>::deserialize(deserializer)?;
        repr.into_iter()
            .map(|(key, value)| Ok((key.parse().map_err(D::Error::custom)?, value)))
            .collect()
    }
}
