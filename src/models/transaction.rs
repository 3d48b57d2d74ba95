use serde::{de, Deserialize, Deserializer, Serialize};

/// A transaction as served inside a full `eth_getBlockByNumber` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub hash: String,
    #[serde(rename = "blockNumber", deserialize_with = "deserialize_hex_quantity")]
    pub block_number: u64,
    pub from: String,
    /// `None` for contract creation.
    pub to: Option<String>,
    /// Wei amount, kept as the node's hex quantity string.
    #[serde(default)]
    pub value: String,
}

impl Transaction {
    /// Addresses taking part in the transaction, sender first.
    pub fn participants(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.from.as_str()).chain(self.to.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub hash: String,
    #[serde(deserialize_with = "deserialize_hex_quantity")]
    pub number: u64,
    #[serde(rename = "parentHash")]
    pub parent_hash: String,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// Parse an Ethereum hex quantity such as `"0x5bad55"`.
pub fn parse_hex_quantity(value: &str) -> Result<u64, String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map_err(|e| format!("invalid hex quantity '{}': {}", value, e))
}

/// Format a height the way JSON-RPC expects block parameters.
pub fn to_hex_quantity(value: u64) -> String {
    format!("0x{:x}", value)
}

fn deserialize_hex_quantity<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_hex_quantity(&raw).map_err(de::Error::custom)
}
