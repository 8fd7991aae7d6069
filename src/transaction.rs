use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    account::AccountError,
    capabilities::{Capabilities, Timestamp},
};

pub type TransactionId = String;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            _ => Err(AccountError::InvalidTransactionType(s.to_string())),
        }
    }
}

/// A single credit or debit against one account. Immutable once created.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Transaction {
    id: TransactionId,
    account_id: String,
    #[serde(rename = "type")]
    kind: TransactionKind,
    amount: Decimal,
    timestamp: Timestamp,
}

impl Transaction {
    pub fn new(
        account_id: &str,
        kind: TransactionKind,
        amount: Decimal,
        caps: &Capabilities,
    ) -> Result<Self, AccountError> {
        if account_id.is_empty() {
            return Err(AccountError::InvalidAccountId);
        }
        if amount <= Decimal::ZERO {
            return Err(AccountError::InvalidAmount(amount));
        }
        Ok(Self {
            id: caps.new_id(),
            account_id: account_id.to_string(),
            kind,
            amount,
            timestamp: caps.now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Amount with the sign it has on the account balance.
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TransactionKind::Deposit => self.amount,
            TransactionKind::Withdrawal => -self.amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::prelude::FromPrimitive;

    use super::*;
    use crate::capabilities::fakes;

    #[test]
    fn parse_kind() {
        assert_eq!(
            "deposit".parse::<TransactionKind>().unwrap(),
            TransactionKind::Deposit
        );
        assert_eq!(
            " Withdrawal ".parse::<TransactionKind>().unwrap(),
            TransactionKind::Withdrawal
        );
        let err = "chargeback".parse::<TransactionKind>().unwrap_err();
        assert!(matches!(err, AccountError::InvalidTransactionType(_)));
        assert_eq!(err.to_string(), "Invalid transaction type `chargeback`");
    }

    #[test]
    fn new_transaction() {
        let caps = fakes::deterministic();
        let txn = Transaction::new(
            "acc",
            TransactionKind::Withdrawal,
            Decimal::from_u32(7).unwrap(),
            &caps,
        )
        .unwrap();
        assert_eq!(txn.id(), "id-0");
        assert_eq!(txn.account_id(), "acc");
        assert_eq!(txn.signed_amount(), Decimal::from_i32(-7).unwrap());

        let err = Transaction::new("", TransactionKind::Deposit, Decimal::ONE, &caps).unwrap_err();
        assert!(matches!(err, AccountError::InvalidAccountId));

        let err =
            Transaction::new("acc", TransactionKind::Deposit, Decimal::ZERO, &caps).unwrap_err();
        assert!(matches!(err, AccountError::InvalidAmount(_)));
    }

    #[test]
    fn serializes_kind_as_type() {
        let caps = fakes::deterministic();
        let txn = Transaction::new("acc", TransactionKind::Deposit, Decimal::ONE, &caps).unwrap();
        let mut buf = Vec::new();
        {
            let mut writer = csv::Writer::from_writer(&mut buf);
            writer.serialize(&txn).unwrap();
            writer.flush().unwrap();
        }
        let out = String::from_utf8(buf).unwrap();
        let header = out.lines().next().unwrap();
        assert_eq!(header, "id,account_id,type,amount,timestamp");
        assert!(out.contains(",deposit,1,"));
    }
}
