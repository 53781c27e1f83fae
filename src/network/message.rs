//! Network message types for the gossip protocol
//!
//! Messages travel as newline-delimited JSON frames of the shape
//! `{"type": <string>, "data": <payload>}`. The tag is parsed first;
//! frames with unknown types fail to decode and are ignored by the
//! receiver.

use crate::core::{Block, Transaction};
use serde::{Deserialize, Serialize};

/// A gossip message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Message {
    /// Announce a signed transaction
    NewTransaction(Transaction),
    /// Announce a freshly mined block
    NewBlock(Block),
}

impl Message {
    /// Serialize to a single JSON line (no trailing newline)
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a JSON line
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Message type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::NewTransaction(_) => "new_transaction",
            Message::NewBlock(_) => "new_block",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let tx = Transaction::coinbase("miner", 50);
        let line = Message::NewTransaction(tx.clone()).to_line().unwrap();

        assert!(line.starts_with(r#"{"type":"new_transaction","data":"#));

        match Message::from_line(&line).unwrap() {
            Message::NewTransaction(decoded) => assert_eq!(decoded, tx),
            other => panic!("wrong variant: {}", other.type_name()),
        }
    }

    #[test]
    fn test_block_round_trip() {
        let block = Block::new(
            1,
            vec![Transaction::coinbase("miner", 50)],
            "abc".to_string(),
            1,
        );
        let line = Message::NewBlock(block.clone()).to_line().unwrap();
        match Message::from_line(&line).unwrap() {
            Message::NewBlock(decoded) => assert_eq!(decoded, block),
            other => panic!("wrong variant: {}", other.type_name()),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(Message::from_line(r#"{"type":"block_request","data":{"height":3}}"#).is_err());
        assert!(Message::from_line("not json at all").is_err());
    }
}
