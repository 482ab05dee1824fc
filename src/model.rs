//! Records exchanged with the storage layer and serialized to clients.
//!
//! Field names on the wire are PascalCase (`Height`, `TimeStamp`, `TxFrom`, ...)
//! so indexers and front-ends can use the same keys for form posts and JSON.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Block {
    pub height: i64,
    pub time_stamp: i64,
    pub count_txs: i64,
    pub hash: String,
    pub prev_hash: String,
    pub merkle_hash: String,
    pub state_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Transaction {
    pub tx_type: i64,
    pub time_stamp: i64,
    pub block_height: i64,
    pub hash: String,
    pub permission: String,
    pub tx_from: String,
    pub address: String,
}

impl Transaction {
    /// Whether `name` appears as sender or target of this transaction. The
    /// empty name is never an account, so it matches nothing.
    pub fn involves(&self, name: &str) -> bool {
        !name.is_empty() && (self.tx_from == name || self.address == name)
    }

    /// Non-empty account names referenced by this transaction, sender first.
    pub fn account_names(&self) -> impl Iterator<Item = &str> {
        let target = (self.address != self.tx_from).then_some(self.address.as_str());
        std::iter::once(self.tx_from.as_str())
            .chain(target)
            .filter(|name| !name.is_empty())
    }
}

/// An account as seen through the transactions that mention it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Account {
    pub name: String,
    /// Height of the block holding the first transaction naming this account.
    pub created_height: i64,
    pub created_at: i64,
    pub tx_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx(from: &str, to: &str) -> Transaction {
        Transaction {
            tx_type: 1,
            time_stamp: 1_530_000_000,
            block_height: 4,
            hash: "tx-hash".to_string(),
            permission: "active".to_string(),
            tx_from: from.to_string(),
            address: to.to_string(),
        }
    }

    #[test]
    fn test_block_wire_names() {
        let block = Block {
            height: 7,
            time_stamp: 1_530_000_000,
            count_txs: 2,
            hash: "h".to_string(),
            prev_hash: "p".to_string(),
            merkle_hash: "m".to_string(),
            state_hash: "s".to_string(),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["Height"], 7);
        assert_eq!(json["TimeStamp"], 1_530_000_000i64);
        assert_eq!(json["CountTxs"], 2);
        assert_eq!(json["PrevHash"], "p");
        assert_eq!(json["MerkleHash"], "m");
        assert_eq!(json["StateHash"], "s");
    }

    #[test]
    fn test_transaction_wire_names() {
        let json = serde_json::to_value(sample_tx("alice", "bob")).unwrap();
        assert_eq!(json["TxType"], 1);
        assert_eq!(json["BlockHeight"], 4);
        assert_eq!(json["TxFrom"], "alice");
        assert_eq!(json["Address"], "bob");
    }

    #[test]
    fn test_account_names_skip_empty_and_duplicates() {
        let tx = sample_tx("alice", "bob");
        let names: Vec<_> = tx.account_names().collect();
        assert_eq!(names, vec!["alice", "bob"]);

        let tx = sample_tx("", "bob");
        let names: Vec<_> = tx.account_names().collect();
        assert_eq!(names, vec!["bob"]);

        let tx = sample_tx("alice", "alice");
        let names: Vec<_> = tx.account_names().collect();
        assert_eq!(names, vec!["alice"]);

        assert_eq!(sample_tx("", "").account_names().count(), 0);
    }

    #[test]
    fn test_involves() {
        let tx = sample_tx("alice", "bob");
        assert!(tx.involves("alice"));
        assert!(tx.involves("bob"));
        assert!(!tx.involves("carol"));
    }

    #[test]
    fn test_empty_name_involves_nothing() {
        assert!(!sample_tx("", "bob").involves(""));
        assert!(!sample_tx("alice", "").involves(""));
    }
}
