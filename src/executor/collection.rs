//! Client-side record of tracked transactions.

use crate::executor::transaction::Transaction;
use crate::executor::types::TxId;

/// Transactions the application is interested in, queryable by predicate.
#[derive(Debug, Clone, Default)]
pub struct TxCollection {
    transactions: Vec<Transaction>,
}

impl TxCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tx: Transaction) {
        self.transactions.push(tx);
    }

    /// Remove the record for `id`. Returns the removed transaction, if any.
    pub fn remove(&mut self, id: TxId) -> Option<Transaction> {
        let index = self.transactions.iter().position(|tx| tx.id() == id)?;
        Some(self.transactions.remove(index))
    }

    pub fn get<P>(&self, mut predicate: P) -> Vec<Transaction>
    where
        P: FnMut(&Transaction) -> bool,
    {
        self.transactions
            .iter()
            .filter(|tx| predicate(tx))
            .cloned()
            .collect()
    }

    pub fn has<P>(&self, predicate: P) -> bool
    where
        P: FnMut(&Transaction) -> bool,
    {
        self.transactions.iter().any(predicate)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::gas::GasSetting;
    use crate::ledger::types::{TxIntent, TxOverrides};
    use alloy::primitives::{Address, U256};

    fn tx(id: u64, method: &str) -> Transaction {
        let mut intent = TxIntent::transfer(Address::ZERO, U256::ZERO);
        intent.method = method.to_string();
        Transaction::new(TxId(id), intent, TxOverrides::default(), Some(GasSetting::Average)).0
    }

    #[test]
    fn test_add_query_remove() {
        let mut collection = TxCollection::new();
        collection.add(tx(1, "move"));
        collection.add(tx(2, "upgrade"));
        collection.add(tx(3, "move"));

        let moves = collection.get(|tx| tx.intent().method == "move");
        assert_eq!(moves.iter().map(Transaction::id).collect::<Vec<_>>(), vec![TxId(1), TxId(3)]);
        assert!(collection.has(|tx| tx.intent().method == "upgrade"));

        assert_eq!(collection.remove(TxId(2)).map(|tx| tx.id()), Some(TxId(2)));
        assert!(collection.remove(TxId(2)).is_none());
        assert!(!collection.has(|tx| tx.intent().method == "upgrade"));
        assert_eq!(collection.len(), 2);
    }
}
